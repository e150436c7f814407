//! Terminal styling for command output

use colored::{ColoredString, Colorize};

/// Style helpers shared by every printed view.
pub struct Theme;

impl Theme {
    pub fn header(text: &str) -> ColoredString {
        text.bold()
    }

    pub fn primary(text: &str) -> ColoredString {
        text.bold()
    }

    pub fn value(text: &str) -> ColoredString {
        text.cyan()
    }

    pub fn muted(text: &str) -> ColoredString {
        text.dimmed()
    }

    pub fn success(text: &str) -> ColoredString {
        text.green()
    }

    pub fn warning(text: &str) -> ColoredString {
        text.yellow()
    }

    pub fn command(text: &str) -> ColoredString {
        text.cyan().bold()
    }

    pub fn divider(width: usize) -> ColoredString {
        "─".repeat(width).dimmed()
    }

    pub fn divider_bold(width: usize) -> ColoredString {
        "━".repeat(width).normal()
    }
}
