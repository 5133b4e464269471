//! Table, JSON, YAML and plain rendering of command results

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Bordered table
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// A result row: column headers plus the cells for one item
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Print rows in the chosen format
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("Nothing to show.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => match serde_json::to_string_pretty(items) {
            Ok(json) => println!("{}", json),
            Err(e) => print_error(&format!("Failed to encode JSON: {}", e)),
        },
        OutputFormat::Yaml => match serde_yaml::to_string(items) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => print_error(&format!("Failed to encode YAML: {}", e)),
        },
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print a section title, tables only
pub fn print_title(title: &str, format: OutputFormat) {
    if matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        println!();
        println!("{}", title.bold());
    }
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "!".yellow(), message);
}

/// Yes/no cell
pub fn flag(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_render_as_words() {
        assert_eq!(flag(true), "yes");
        assert_eq!(flag(false), "no");
    }
}
