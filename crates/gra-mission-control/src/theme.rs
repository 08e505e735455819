use gra_core::palette::Rgb;
use gra_core::store::{GraHealth, SyncPhase};
use ratatui::style::Color;

#[derive(Clone, Copy)]
pub struct Theme {
    pub bg: Color,
    pub surface: Color,
    pub border: Color,
    pub focus: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
}

pub fn theme() -> Theme {
    Theme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        focus: Color::Rgb(56, 189, 248),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
    }
}

pub fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

pub fn health_color(health: GraHealth, theme: Theme) -> Color {
    match health {
        GraHealth::Online => theme.ok,
        GraHealth::Offline => theme.critical,
        GraHealth::Unknown => theme.muted,
    }
}

pub fn phase_color(phase: &SyncPhase, theme: Theme) -> Color {
    match phase {
        SyncPhase::Idle => theme.muted,
        SyncPhase::Loading => theme.warn,
        SyncPhase::Loaded => theme.ok,
        SyncPhase::Error(_) => theme.critical,
    }
}
