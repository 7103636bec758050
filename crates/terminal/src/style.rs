//! ANSI styling helpers shared by prompts, titles and menus.

use crossterm::style::{Color, Stylize};

/// Accent color used for titles and prompt labels (xterm-256 "royal blue 1").
pub const ACCENT: Color = Color::AnsiValue(63);

/// Color used for the message of the day.
pub const NOTICE: Color = Color::AnsiValue(227);

/// Renders a heading: ` ----= <title> =----` in the accent color with a bold title.
pub fn title(text: &str) -> String {
    format!(
        "{}{}{}",
        " ----= ".with(ACCENT),
        text.bold(),
        " =----".with(ACCENT)
    )
}

/// Renders text in the accent color.
pub fn accent(text: &str) -> String {
    text.with(ACCENT).to_string()
}

/// Renders text in the notice color.
pub fn notice(text: &str) -> String {
    text.with(NOTICE).to_string()
}

/// Renders text in bold.
pub fn bold(text: &str) -> String {
    text.bold().to_string()
}
