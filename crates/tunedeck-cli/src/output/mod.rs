//! CLI output helpers
//!
//! Every command renders through here: the default table view is for a human
//! at the kiosk terminal, `--format json` keeps the same data scriptable.
//! Status lines (success/info) honor `--quiet`; errors always reach stderr.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// How command results are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "unknown output format '{}' (expected table or json)",
                other
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        })
    }
}

/// Render result rows in the selected format
///
/// Commands print their own message when there is nothing to show, so this
/// only ever sees populated row sets.
pub fn print_rows<T>(rows: &[T], format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + Tabled,
{
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
    }
    Ok(())
}

/// Confirmation of a completed mutation, suppressed by `--quiet`
pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message.green());
    }
}

/// Progress or guidance line, suppressed by `--quiet`
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

/// Failure line; goes to stderr and ignores `--quiet`
pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}
