// shard-invalidator - Selective cache-shard invalidation for PostgreSQL-backed parameters
// Copyright (C) 2025 shard-invalidator contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Output formatting for shard-invalidator.

use crate::cli::args::OutputFormat;
use crate::core::config::Config;
use crate::core::error::InvalidatorError;
use crate::core::types::InvalidationReport;
use crate::listener::ListenerSummary;
use chrono::{DateTime, Utc};
use comfy_table::{presets::ASCII_BORDERS_ONLY_CONDENSED, presets::UTF8_FULL, Table};
use console::style;
use serde::Serialize;

/// Output formatter
pub struct Output {
    format: OutputFormat,
    colors: bool,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    report: &'a InvalidationReport,
    saved_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
}

#[derive(Serialize)]
struct ParsedTimestamp<'a> {
    input: &'a str,
    utc: String,
    unix_micros: i64,
}

impl Output {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format, colors: true }
    }

    /// Disable colors
    pub fn no_colors(mut self, disable: bool) -> Self {
        if disable {
            self.colors = false;
        }
        self
    }

    /// Print the efficiency report emitted at shutdown
    pub fn print_report(&self, report: &InvalidationReport, summary: Option<&ListenerSummary>) {
        match self.format {
            OutputFormat::Human => {
                if let Some(summary) = summary {
                    self.info(&format!(
                        "stopped after {} notification(s): {}",
                        summary.received, summary.stop
                    ));
                }
                self.print_table(vec!["metric", "value"], report_rows(report));
            }
            OutputFormat::Json => self.print_json(&ReportDocument {
                report,
                saved_ratio: report.saved_ratio(),
                received: summary.map(|s| s.received),
                stop_reason: summary.map(|s| s.stop.to_string()),
            }),
            OutputFormat::Plain => println!("{}", plain_report(report)),
        }
    }

    /// Print the effective configuration with secrets masked
    pub fn print_config(&self, config: &Config) {
        let mut shown = config.clone();
        if shown.store.password.is_some() {
            shown.store.password = Some("********".to_string());
        }
        match self.format {
            OutputFormat::Json => self.print_json(&shown),
            OutputFormat::Human | OutputFormat::Plain => match toml::to_string_pretty(&shown) {
                Ok(text) => print!("{}", text),
                Err(e) => self.error(&format!("cannot render configuration: {}", e)),
            },
        }
    }

    /// Print a parsed store timestamp
    pub fn print_timestamp(&self, input: &str, parsed: DateTime<Utc>) {
        let utc = parsed.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true);
        match self.format {
            OutputFormat::Human => {
                if self.colors {
                    println!("{} {}", style(input).bold(), style(format!("-> {}", utc)).green());
                } else {
                    println!("{} -> {}", input, utc);
                }
            }
            OutputFormat::Json => self.print_json(&ParsedTimestamp {
                input,
                utc,
                unix_micros: parsed.timestamp_micros(),
            }),
            OutputFormat::Plain => println!("{}", utc),
        }
    }

    /// Print a fatal error with its code and hint
    pub fn print_fatal(&self, err: &InvalidatorError) {
        self.error(&format!("[{}]: {}", err.code(), err));
        if let Some(hint) = err.suggestion() {
            if self.colors {
                eprintln!("  {} {}", style("hint:").cyan(), hint);
            } else {
                eprintln!("  hint: {}", hint);
            }
        }
    }

    /// Print as JSON
    fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        if let Ok(json) = serde_json::to_string_pretty(data) {
            println!("{}", json);
        }
    }

    /// Print metric rows as a table
    fn print_table(&self, headers: Vec<&str>, rows: Vec<Vec<String>>) {
        let mut table = Table::new();
        if self.colors {
            table.load_preset(UTF8_FULL);
        } else {
            table.load_preset(ASCII_BORDERS_ONLY_CONDENSED);
        }
        table.set_header(headers);
        for row in rows {
            table.add_row(row);
        }
        println!("{}", table);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colors {
            eprintln!("{}{}", style("error").red().bold(), message_tail(message));
        } else {
            eprintln!("error{}", message_tail(message));
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colors {
            println!("{} {}", style("::").bold().cyan(), message);
        } else {
            println!(":: {}", message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.colors {
            println!("{} {}", style("✓").green().bold(), message);
        } else {
            println!("+ {}", message);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new(OutputFormat::Human)
    }
}

// "[E001]: msg" reads as "error[E001]: msg"; anything else gets a colon.
fn message_tail(message: &str) -> String {
    if message.starts_with('[') {
        message.to_string()
    } else {
        format!(": {}", message)
    }
}

/// The one-line summary the daemon has always printed on exit
pub fn plain_report(report: &InvalidationReport) -> String {
    format!(
        "total queries:{} saved queries:{}",
        report.total_shard_checks, report.saved_checks
    )
}

fn report_rows(report: &InvalidationReport) -> Vec<Vec<String>> {
    vec![
        vec!["notifications processed".to_string(), report.notifications_processed.to_string()],
        vec!["notifications dropped".to_string(), report.notifications_dropped.to_string()],
        vec!["total shard checks".to_string(), report.total_shard_checks.to_string()],
        vec!["saved checks".to_string(), report.saved_checks.to_string()],
        vec!["invalidations sent".to_string(), report.invalidations_sent.to_string()],
        vec!["invalidation failures".to_string(), report.invalidation_failures.to_string()],
        vec!["saved ratio".to_string(), format!("{:.1}%", report.saved_ratio() * 100.0)],
    ]
}
