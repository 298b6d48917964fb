//! `leadable sheets`: spreadsheet picker.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use leadable_core::config;
use leadable_sync::build_client;
use leadable_sync::drive::{list_spreadsheets, SpreadsheetEntry};

use super::home_dir;

/// Arguments for `leadable sheets`.
#[derive(Args, Debug)]
pub struct SheetsArgs {
    /// Google OAuth bearer token.
    #[arg(long)]
    pub google_token: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SheetRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "sheet id")]
    id: String,
}

impl SheetsArgs {
    pub fn run(self) -> Result<()> {
        let config = config::load_at(&home_dir()?).context("failed to load config")?;
        let client =
            build_client(config.request_timeout()).context("failed to build HTTP client")?;
        let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
        let sheets = runtime
            .block_on(list_spreadsheets(
                &client,
                &config.drive_api_base,
                &self.google_token,
            ))
            .context("failed to list spreadsheets")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&sheets).context("failed to serialize sheets")?
            );
            return Ok(());
        }
        print_table(sheets);
        Ok(())
    }
}

fn print_table(sheets: Vec<SpreadsheetEntry>) {
    if sheets.is_empty() {
        println!("No spreadsheets found.");
        return;
    }
    let rows: Vec<SheetRow> = sheets
        .into_iter()
        .map(|s| SheetRow {
            name: s.name,
            id: s.id,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
