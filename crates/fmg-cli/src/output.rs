//! Output formatting for fmgctl (pretty, json)

use clap::ValueEnum;
use colored::Colorize;
use fmg_ops::DispatchFailure;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Tables and colored text (default)
    #[default]
    Pretty,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet && !self.is_json() {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet && !self.is_json() {
            println!("{}", msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print typed rows as a table or a JSON array
    pub fn print_rows<T: Tabled + Serialize>(&self, rows: &[T]) {
        match self.format {
            OutputFormat::Pretty => {
                if rows.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(rows));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
    }

    /// Print an operation result. Arrays of objects render as a table.
    pub fn print_value(&self, value: &Value) {
        if self.format == OutputFormat::Pretty {
            if let Some(table) = value_table(value) {
                println!("{}", table);
                return;
            }
        }
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
        );
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Pretty => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }

    /// Report a failed operation. JSON mode writes the failure object to stdout.
    pub fn print_failure(&self, failure: &DispatchFailure) {
        match self.format {
            OutputFormat::Pretty => {
                self.error(&format!("Error: {}", failure));
                if failure.effect_unknown {
                    self.warn("The request may have been applied; check the appliance before retrying");
                }
            }
            OutputFormat::Json => println!("{}", failure.to_json()),
        }
    }
}

/// Render an array of flat objects as a table. Columns follow the first
/// appearance of each key; nested values are shown as compact JSON.
pub fn value_table(value: &Value) -> Option<String> {
    let items = value.as_array()?;
    if items.is_empty() || !items.iter().all(Value::is_object) {
        return None;
    }

    let mut columns: Vec<&str> = Vec::new();
    for item in items.iter().filter_map(Value::as_object) {
        for key in item.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|col| col.to_string()));
    for item in items {
        builder.push_record(columns.iter().map(|col| cell(item.get(*col))));
    }
    Some(builder.build().to_string())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
