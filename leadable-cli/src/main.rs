//! Leadable: sync ad-platform leads into spreadsheets.
//!
//! # Usage
//!
//! ```text
//! leadable daemon start|stop|status
//! leadable sync create --source-token <t> --account-id <id> --form-id <id> \
//!                      --sheet-id <id> --google-token <t> [--name <n>] [--frequency <f>] [--no-start]
//! leadable sync list [--json]
//! leadable sync start|stop|delete <name>
//! leadable sync frequency <name> <frequency>
//! leadable sheets --google-token <t> [--json]
//! leadable auth url
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{auth::AuthCommand, daemon::DaemonCommand, sheets::SheetsArgs, sync::SyncCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "leadable",
    version,
    about = "Poll lead forms and append new leads to spreadsheets",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the background sync engine.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Create, inspect and control syncs on the running daemon.
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },

    /// List spreadsheets visible to a Google access token.
    Sheets(SheetsArgs),

    /// Google sign-in helpers.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Sync { command } => commands::sync::run(command),
        Commands::Sheets(args) => args.run(),
        Commands::Auth { command } => commands::auth::run(command),
    }
}
