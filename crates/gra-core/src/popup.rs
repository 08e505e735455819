//! Popup placement.
//!
//! Placement is two-phase: a [`PendingPopup`] holds content that has not been
//! measured yet and is never drawn; once the renderer has measured it, the
//! pending popup becomes a placed [`Popup`] clamped inside its container.

use crate::artifact::ArtifactContent;
use crate::GraphKind;

pub const POPUP_OFFSET: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub w: i32,
    pub h: i32,
}

/// Offsets the popup from `anchor`, pulls it back inside `container` when it
/// would overflow, and never returns a negative coordinate.
pub fn place(anchor: Position, popup: Size, container: Size) -> Position {
    let mut x = anchor.x + POPUP_OFFSET;
    let mut y = anchor.y + POPUP_OFFSET;
    if x + popup.w > container.w {
        x = container.w - popup.w - POPUP_OFFSET;
    }
    if y + popup.h > container.h {
        y = container.h - popup.h - POPUP_OFFSET;
    }
    Position {
        x: x.max(0),
        y: y.max(0),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingPopup {
    pub anchor: Position,
    pub content: ArtifactContent,
    pub target: GraphKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub position: Position,
    pub size: Size,
    pub content: ArtifactContent,
    pub target: GraphKind,
}

impl PendingPopup {
    pub fn new(anchor: Position, content: ArtifactContent, target: GraphKind) -> Self {
        Self {
            anchor,
            content,
            target,
        }
    }

    /// Second phase: `measured` is the content-dependent size reported by the renderer.
    pub fn place(self, measured: Size, container: Size) -> Popup {
        Popup {
            position: place(self.anchor, measured, container),
            size: measured,
            content: self.content,
            target: self.target,
        }
    }
}
