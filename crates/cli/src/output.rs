//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an optional score, `-` when absent
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{:.2}", value),
        None => "-".to_string(),
    }
}

/// Format utilization-hours
pub fn format_hours(hours: Option<f64>) -> String {
    match hours {
        Some(value) if value >= 10_000.0 => format!("{:.1}k", value / 1000.0),
        Some(value) => format!("{:.1}", value),
        None => "-".to_string(),
    }
}

/// Color a score on the 0-10 scale
pub fn color_score(score: Option<f64>) -> String {
    let formatted = format_score(score);
    match score {
        Some(value) if value >= 7.0 => formatted.green().to_string(),
        Some(value) if value >= 4.0 => formatted.yellow().to_string(),
        Some(_) => formatted.red().to_string(),
        None => formatted.dimmed().to_string(),
    }
}
