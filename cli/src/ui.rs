//! Terminal output helpers.
//!
//! Progress lines from the generator are printed plain by the reporter;
//! these helpers cover the tool's own messages.

use colored::Colorize;

pub mod symbols {
    pub const ARROW: &str = "→";
    pub const SUCCESS: &str = "✓";
    pub const FAILURE: &str = "✗";
    pub const WARNING: &str = "!";
}

pub fn print_step(message: &str) {
    eprintln!("{} {}", symbols::ARROW.blue().bold(), message);
}

pub fn print_success(message: &str) {
    eprintln!("{} {}", symbols::SUCCESS.green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", symbols::FAILURE.red().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", symbols::WARNING.yellow().bold(), message);
}

/// One-line summary of a generation pass.
pub fn print_summary(report: &qface_generator::RunReport) {
    if report.is_success() {
        print_success(&report.to_string());
    } else {
        print_error(&report.to_string());
    }
}
