use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sqlx_sqlite_unit_mgr::JournalMode;

mod commands;
mod error;
pub mod scenario;

pub use error::{Error, Result};
pub use scenario::{DeleteStrategy, Scenario, ScenarioOutcome};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
   name = "wal-cleanup",
   version,
   about = "Check that deleting a SQLite database removes its -wal, -shm and -journal files"
)]
pub struct Cli {
   /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
   #[arg(short, long, action = clap::ArgAction::Count, global = true)]
   pub verbose: u8,

   #[command(subcommand)]
   pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
   /// Create a database, delete it, and report any file left behind
   Check {
      /// Directory holding the database files
      #[arg(long)]
      dir: PathBuf,

      /// Database file name
      #[arg(long, default_value = "wal-test.db")]
      name: String,

      /// Journal mode to enable before writing
      #[arg(long, default_value = "wal")]
      mode: JournalMode,

      /// Write stale -wal/-shm files after closing, as a crash would
      #[arg(long)]
      simulate_crash: bool,

      /// Delete only the primary file to reproduce the leak
      #[arg(long)]
      baseline: bool,

      /// Print the outcome as JSON
      #[arg(long)]
      json: bool,
   },
   /// Show which files of a database exist
   Inspect {
      #[arg(long)]
      dir: PathBuf,

      #[arg(long)]
      name: String,

      #[arg(long)]
      json: bool,
   },
   /// Delete every file of a database, opened or not
   Purge {
      #[arg(long)]
      dir: PathBuf,

      #[arg(long)]
      name: String,

      /// Give up confirming removal after this many milliseconds
      #[arg(long, default_value_t = 5000)]
      timeout_ms: u64,

      #[arg(long)]
      json: bool,
   },
}

/// Install the fmt subscriber on stderr. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: u8) {
   use tracing_subscriber::EnvFilter;

   let default_level = match verbose {
      0 => "warn",
      1 => "debug",
      _ => "trace",
   };
   let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

   // A second initialization (e.g. from tests) keeps the first subscriber
   let _ = tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .try_init();
}

/// Run `cli`, printing results to stdout.
pub async fn run(cli: Cli) -> Result<ExitCode> {
   run_to(cli, &mut std::io::stdout()).await
}

/// Run `cli`, writing results to `out`. Logs still go to stderr.
pub async fn run_to(cli: Cli, out: &mut impl Write) -> Result<ExitCode> {
   match cli.command {
      Commands::Check {
         dir,
         name,
         mode,
         simulate_crash,
         baseline,
         json,
      } => {
         let scenario = Scenario {
            name,
            directory: dir,
            journal_mode: mode,
            simulate_crash,
            strategy: if baseline {
               DeleteStrategy::PrimaryOnly
            } else {
               DeleteStrategy::Manager
            },
         };
         commands::check(scenario, json, out).await
      }
      Commands::Inspect { dir, name, json } => commands::inspect(&name, &dir, json, out).await,
      Commands::Purge {
         dir,
         name,
         timeout_ms,
         json,
      } => commands::purge(&name, &dir, timeout_ms, json, out).await,
   }
}
