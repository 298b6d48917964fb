//! `leadable sync`: manage syncs on the running daemon.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use leadable_core::{Frequency, SyncName, SyncSpec};
use leadable_daemon::{
    request_create, request_delete, request_list, request_set_frequency, request_start,
    request_stop, DaemonError, SyncSnapshot, TaskState,
};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    /// Register a new sync and, unless `--no-start`, start it.
    Create(CreateArgs),
    /// Show every sync with its state and last status.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Start polling.
    Start { name: String },
    /// Stop polling; the sync stays registered.
    Stop { name: String },
    /// Stop and forget a sync.
    Delete { name: String },
    /// Change the polling interval; applies from the next wait.
    Frequency {
        name: String,
        /// Preset ("5 minutes" … "1 day") or a number of minutes.
        frequency: String,
    },
}

/// Arguments for `leadable sync create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Sync name; defaults to `Sync_<n>`.
    #[arg(long)]
    pub name: Option<String>,

    /// Ad-platform access token.
    #[arg(long)]
    pub source_token: String,

    /// Ad account identifier.
    #[arg(long)]
    pub account_id: String,

    /// Lead form identifier.
    #[arg(long)]
    pub form_id: String,

    /// Destination spreadsheet identifier.
    #[arg(long)]
    pub sheet_id: String,

    /// Google OAuth bearer token.
    #[arg(long)]
    pub google_token: String,

    /// Preset ("5 minutes" … "1 day") or a number of minutes.
    #[arg(long, default_value = "5 minutes")]
    pub frequency: String,

    /// Register the sync without starting it.
    #[arg(long)]
    pub no_start: bool,
}

impl From<CreateArgs> for SyncSpec {
    fn from(args: CreateArgs) -> Self {
        SyncSpec {
            name: args.name,
            source_token: args.source_token,
            account_id: args.account_id,
            form_id: args.form_id,
            sheet_id: args.sheet_id,
            frequency: args.frequency,
            google_token: args.google_token,
        }
    }
}

#[derive(Tabled)]
struct SyncTableRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "every")]
    every: String,
    #[tabled(rename = "form")]
    form: String,
    #[tabled(rename = "sheet")]
    sheet: String,
    #[tabled(rename = "last status")]
    last_status: String,
}

pub fn run(command: SyncCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        SyncCommand::Create(args) => {
            // Catch obvious typos before talking to the daemon.
            Frequency::from_label(&args.frequency)?;
            let autostart = !args.no_start;
            let snapshot = request_create(&home, args.into(), autostart)
                .map_err(not_running_hint)
                .context("failed to create sync")?;
            println!(
                "created {} ({}, every {})",
                snapshot.name.0.bold(),
                state_label(snapshot.state),
                snapshot.frequency_label
            );
        }
        SyncCommand::List { json } => {
            let syncs = request_list(&home)
                .map_err(not_running_hint)
                .context("failed to list syncs")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&syncs).context("failed to serialize syncs")?
                );
            } else {
                print_table(syncs);
            }
        }
        SyncCommand::Start { name } => {
            let snapshot = request_start(&home, SyncName(name))
                .map_err(not_running_hint)
                .context("failed to start sync")?;
            print_state(&snapshot);
        }
        SyncCommand::Stop { name } => {
            let snapshot = request_stop(&home, SyncName(name))
                .map_err(not_running_hint)
                .context("failed to stop sync")?;
            print_state(&snapshot);
        }
        SyncCommand::Delete { name } => {
            request_delete(&home, SyncName(name.clone()))
                .map_err(not_running_hint)
                .context("failed to delete sync")?;
            println!("deleted {name}");
        }
        SyncCommand::Frequency { name, frequency } => {
            let snapshot = request_set_frequency(&home, SyncName(name), frequency)
                .map_err(not_running_hint)
                .context("failed to change frequency")?;
            println!("{} now runs every {}", snapshot.name, snapshot.frequency_label);
        }
    }

    Ok(())
}

fn not_running_hint(err: DaemonError) -> anyhow::Error {
    match err {
        DaemonError::DaemonNotRunning { .. } => {
            anyhow::Error::new(err).context("start it with `leadable daemon start`")
        }
        other => other.into(),
    }
}

fn print_state(snapshot: &SyncSnapshot) {
    println!("{}: {}", snapshot.name, state_label(snapshot.state));
}

fn print_table(syncs: Vec<SyncSnapshot>) {
    if syncs.is_empty() {
        println!("No syncs configured.");
        return;
    }

    let running = syncs
        .iter()
        .filter(|s| s.state == TaskState::Running)
        .count();
    println!(
        "Leadable v{} | {} syncs | {} running",
        env!("CARGO_PKG_VERSION"),
        syncs.len(),
        running
    );

    let rows: Vec<SyncTableRow> = syncs
        .into_iter()
        .map(|s| SyncTableRow {
            name: s.name.0,
            state: state_label(s.state),
            every: s.frequency_label,
            form: s.form_id,
            sheet: s.sheet_id,
            last_status: s.last_status.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn state_label(state: TaskState) -> String {
    match state {
        TaskState::Idle => "IDLE".bright_black().bold().to_string(),
        TaskState::Running => "RUNNING".green().bold().to_string(),
        TaskState::Stopping => "STOPPING".yellow().bold().to_string(),
    }
}
