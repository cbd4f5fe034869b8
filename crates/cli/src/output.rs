//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use insight_lib::{Confidence, CorrelationStrength, Severity, Trend};
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

/// Print `rows` as a table, or `data` as JSON
pub fn print_results<R: Tabled, D: Serialize + ?Sized>(
    title: &str,
    rows: Vec<R>,
    data: &D,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(data)?,
        OutputFormat::Table => {
            println!("{}", title.bold());
            if rows.is_empty() {
                print_warning("Nothing to report");
                return Ok(());
            }
            let count = rows.len();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
            println!("\nTotal: {}", count);
        }
    }
    Ok(())
}

pub fn print_json<D: Serialize + ?Sized>(data: &D) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an optional value with a fallback dash
pub fn format_optional(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, suffix),
        None => "-".to_string(),
    }
}

/// Color a z-score by magnitude
pub fn color_z_score(z: f64, threshold: f64) -> String {
    let formatted = format!("{:+.2}", z);
    if z.abs() > threshold * 2.0 {
        formatted.red().bold().to_string()
    } else if z.abs() > threshold {
        formatted.red().to_string()
    } else if z.abs() > threshold / 2.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

pub fn color_severity(severity: Severity) -> String {
    let label = severity.to_string();
    match severity {
        Severity::Critical => label.red().bold().to_string(),
        Severity::High => label.red().to_string(),
        Severity::Medium => label.yellow().to_string(),
        Severity::Low => label.blue().to_string(),
    }
}

pub fn color_strength(strength: CorrelationStrength) -> String {
    let label = strength.to_string();
    match strength {
        CorrelationStrength::VeryStrong => label.magenta().bold().to_string(),
        CorrelationStrength::Strong => label.magenta().to_string(),
        _ => label,
    }
}

pub fn color_trend(trend: Trend) -> String {
    let label = trend.to_string();
    match trend {
        Trend::Increasing => label.red().to_string(),
        Trend::Decreasing => label.green().to_string(),
        Trend::Stable => label,
    }
}

pub fn color_confidence(confidence: Confidence) -> String {
    let label = confidence.to_string();
    match confidence {
        Confidence::High => label.green().to_string(),
        Confidence::Medium => label.yellow().to_string(),
        Confidence::Low => label.red().to_string(),
    }
}

/// Entity id with its display name when known
pub fn entity_label(entity_id: &str, display_name: Option<&str>) -> String {
    match display_name {
        Some(name) if name != entity_id => format!("{} ({})", entity_id, name),
        _ => entity_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(Some(17.04), "h"), "17.0h");
        assert_eq!(format_optional(None, "h"), "-");
    }

    #[test]
    fn test_entity_label() {
        assert_eq!(entity_label("web-1", Some("frontend")), "web-1 (frontend)");
        assert_eq!(entity_label("web-1", Some("web-1")), "web-1");
        assert_eq!(entity_label("web-1", None), "web-1");
    }
}
