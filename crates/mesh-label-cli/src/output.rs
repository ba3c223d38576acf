//! Output formatting for command results.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a result as pretty JSON. Text output is handled by the caller.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }

    if let OutputFormat::Json = format {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize output"),
        }
    }
}

/// Print a success line in text mode.
pub fn success(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }

    if let OutputFormat::Text = format {
        println!("{} {}", "✓".green().bold(), msg);
    }
}

/// Print a warning line to stderr in text mode.
pub fn warning(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }

    if let OutputFormat::Text = format {
        eprintln!("{} {}", "⚠".yellow().bold(), msg);
    }
}

/// `yes`/`no` for boolean fields in text output.
pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
