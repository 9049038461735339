//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format an energy quantity in kWh
pub fn format_energy(kwh: f64) -> String {
    format!("{:.2} kWh", kwh)
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    // Try to parse and format nicely, otherwise return as-is
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        ts.to_string()
    }
}

/// Color device status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "active" => status.green().to_string(),
        "maintenance" => status.yellow().to_string(),
        "inactive" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color classification based on value
pub fn color_classification(classification: &str) -> String {
    match classification.to_lowercase().as_str() {
        "valid" => classification.green().to_string(),
        "uncertain" => classification.yellow().to_string(),
        "quarantine" => classification.red().to_string(),
        _ => classification.to_string(),
    }
}

/// Color alert severity based on value
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "info" => severity.blue().to_string(),
        "warning" => severity.yellow().to_string(),
        "critical" => severity.red().to_string(),
        _ => severity.to_string(),
    }
}

/// Color validity percentage based on value
pub fn color_validity(percentage: f64) -> String {
    let formatted = format!("{:.1}%", percentage);
    if percentage >= 95.0 {
        formatted.green().to_string()
    } else if percentage >= 80.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
