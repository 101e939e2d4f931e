use console::style;
use std::fmt::Display;

/// Green bold: fully converged runs, valid plans
pub fn success<D: Display>(text: D) -> String {
    style(text).green().bold().to_string()
}

/// Yellow bold: partial failures, drift
pub fn warn<D: Display>(text: D) -> String {
    style(text).yellow().bold().to_string()
}

/// Red bold: halted runs, configuration errors
pub fn error<D: Display>(text: D) -> String {
    style(text).red().bold().to_string()
}

/// Dim: secondary text
pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}
