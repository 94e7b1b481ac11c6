//! # staffdesk
//!
//! Command-line front end for the employee detail view over a local SQLite
//! document store:
//! - **import** / **list** employee documents
//! - **show** a record, printing each load state as a JSON event line, with
//!   optional retries of degraded or failed loads
//! - **save** operator edits, **advance** / **transaction** appends and
//!   advance status changes

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use staffdesk_shared::constants::APP_NAME;
use staffdesk_shared::{AdvanceStatus, TransactionKind};
use staffdesk_store::SqliteSource;

use crate::commands::{parse_lowercase, Context};
use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(
    name = "staffdesk",
    version,
    about = "Employee records from the command line",
    arg_required_else_help = true
)]
struct Cli {
    /// Document database (overrides STAFFDESK_DB_PATH).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import employees from a JSON file (one document or an array).
    Import { file: PathBuf },

    /// List employees.
    #[command(alias = "ls")]
    List,

    /// Open an employee's detail view.
    Show {
        id: String,
        /// Retry a degraded or failed load up to this many times.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Save edits given as a JSON object, e.g. '{"salary": 9000}'.
    Save { id: String, edits: String },

    /// Record a salary advance.
    Advance {
        id: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Change the status of an advance (pending, approved, rejected, paid).
    AdvanceStatus {
        id: String,
        advance_id: String,
        #[arg(value_parser = parse_lowercase::<AdvanceStatus>)]
        status: AdvanceStatus,
    },

    /// Record a transaction.
    Transaction {
        id: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        date: NaiveDate,
        /// salary, advance, bonus, deduction or reimbursement
        #[arg(long = "type", value_parser = parse_lowercase::<TransactionKind>)]
        kind: TransactionKind,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    staffdesk_client::init_tracing();

    let cli = Cli::parse();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let mut config = CliConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    info!(?config, "Loaded configuration");

    let db = config
        .open_database()
        .context("failed to open the document database")?;
    let ctx = Context::new(SqliteSource::new(db), config.load);

    if let Err(e) = run(&ctx, cli.command).await {
        error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(ctx: &Context, command: Command) -> Result<(), CliError> {
    match command {
        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let ids = commands::import(ctx, &raw).await?;
            info!(count = ids.len(), file = %file.display(), "import finished");
        }
        Command::List => {
            commands::list(ctx).await?;
        }
        Command::Show { id, retries } => {
            commands::show(ctx, &id, retries).await?;
        }
        Command::Save { id, edits } => {
            commands::save(ctx, &id, &edits).await?;
        }
        Command::Advance {
            id,
            amount,
            date,
            reason,
        } => {
            commands::add_advance(ctx, &id, amount, date, reason).await?;
        }
        Command::AdvanceStatus {
            id,
            advance_id,
            status,
        } => {
            commands::set_advance_status(ctx, &id, &advance_id, status).await?;
        }
        Command::Transaction {
            id,
            amount,
            date,
            kind,
            description,
        } => {
            commands::add_transaction(ctx, &id, amount, date, kind, description).await?;
        }
    }
    Ok(())
}
