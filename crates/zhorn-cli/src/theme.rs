//! Terminal styling.

use colored::Colorize;

pub(crate) struct Theme;

impl Theme {
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text.green())
    }

    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }
}
