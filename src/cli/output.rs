//! Shared CLI output helpers for consistent operator-facing text.

use std::fmt::Display;

use owo_colors::OwoColorize;

use crate::risk::RiskLevel;

/// Print the application header with name and version.
pub fn header(version: &str) {
    println!("{} {}", "perpwatch".bold(), version.dimmed());
    println!();
}

/// Print a section header.
pub fn section(title: &str) {
    println!();
    println!("{}", title.bold());
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    println!("  {:<14} {}", label.dimmed(), value);
}

/// Print a success line.
pub fn success(message: &str) {
    println!("  {} {}", "✓".green(), message);
}

/// Print a warning line.
pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message);
}

/// Print an error line.
pub fn error(message: &str) {
    eprintln!("  {} {}", "×".red(), message);
}

/// Print a single-line note.
pub fn note(message: &str) {
    println!("  {}", message.dimmed());
}

/// Print pre-rendered multi-line content, indented.
pub fn lines(content: &str) {
    for line in content.lines() {
        println!("  {line}");
    }
}

/// Print a JSON document on one line.
pub fn json_output(value: serde_json::Value) {
    println!("{value}");
}

/// Risk level label colored by severity.
pub fn level(level: RiskLevel) -> String {
    match level {
        RiskLevel::Safe => level.green().to_string(),
        RiskLevel::Low => level.cyan().to_string(),
        RiskLevel::Medium => level.yellow().to_string(),
        RiskLevel::High => level.magenta().to_string(),
        RiskLevel::Critical => level.red().bold().to_string(),
    }
}

/// Signed value colored green when positive and red when negative.
pub fn signed(value: f64, rendered: impl Display) -> String {
    if value > 0.0 {
        rendered.green().to_string()
    } else if value < 0.0 {
        rendered.red().to_string()
    } else {
        rendered.to_string()
    }
}
