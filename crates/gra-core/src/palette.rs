use crate::{TaskState, TaskType};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(input: &str) -> Option<Self> {
        let hex = input.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Blends each channel halfway toward white, rounding halves up.
    pub fn pastel(self) -> Self {
        fn mix(channel: u8) -> u8 {
            ((u16::from(channel) + 256) / 2) as u8
        }
        Self::new(mix(self.r), mix(self.g), mix(self.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Visual encoding constants, injected into the projector rather than read from globals.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub executable: Rgb,
    pub exploratory: Rgb,
    pub container: Rgb,
    pub decomposition: Rgb,
    pub unknown_type: Rgb,
    pub border_completed: Rgb,
    pub border_failed: Rgb,
    pub border_neutral: Rgb,
    pub fill_completed: Rgb,
    pub fill_failed: Rgb,
    pub fill_working: Rgb,
    pub fill_default: Rgb,
    pub dimmed_fill: Rgb,
    pub dimmed_border: Rgb,
    pub size_normal: u16,
    pub size_highlighted: u16,
    pub size_dimmed: u16,
    pub label_max_chars: usize,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            executable: Rgb::new(0x00, 0x7b, 0xff),
            exploratory: Rgb::new(0xff, 0x98, 0x00),
            container: Rgb::new(0x88, 0x88, 0x88),
            decomposition: Rgb::new(0x9c, 0x27, 0xb0),
            unknown_type: Rgb::new(0x00, 0x00, 0x00),
            border_completed: Rgb::new(0x28, 0xa7, 0x45),
            border_failed: Rgb::new(0xdc, 0x35, 0x45),
            border_neutral: Rgb::new(0x6c, 0x75, 0x7d),
            fill_completed: Rgb::new(0xd4, 0xed, 0xda),
            fill_failed: Rgb::new(0xf8, 0xd7, 0xda),
            fill_working: Rgb::new(0xff, 0xf3, 0xcd),
            fill_default: Rgb::new(0xd3, 0xd3, 0xd3),
            dimmed_fill: Rgb::new(0xee, 0xee, 0xee),
            dimmed_border: Rgb::new(0xcc, 0xcc, 0xcc),
            size_normal: 25,
            size_highlighted: 40,
            size_dimmed: 15,
            label_max_chars: 35,
        }
    }
}

impl Palette {
    pub fn type_color(&self, task_type: TaskType) -> Rgb {
        match task_type {
            TaskType::Executable => self.executable,
            TaskType::Exploratory => self.exploratory,
            TaskType::Container => self.container,
            TaskType::Decomposition => self.decomposition,
            TaskType::Unknown => self.unknown_type,
        }
    }

    pub fn state_border(&self, state: &TaskState) -> Rgb {
        match state {
            TaskState::Completed => self.border_completed,
            state if state.is_failure() => self.border_failed,
            _ => self.border_neutral,
        }
    }

    /// Flat fill used by the planning graph.
    pub fn state_fill(&self, state: &TaskState) -> Rgb {
        match state {
            TaskState::Completed => self.fill_completed,
            TaskState::Working => self.fill_working,
            state if state.is_failure() => self.fill_failed,
            _ => self.fill_default,
        }
    }
}
