use std::process::ExitCode;

use clap::Parser;
use sqlite_wal_cleanup::{Cli, init_logging, run};

#[tokio::main]
async fn main() -> ExitCode {
   let cli = Cli::parse();
   init_logging(cli.verbose);

   match run(cli).await {
      Ok(code) => code,
      Err(e) => {
         eprintln!("error [{}]: {e}", e.error_code());
         ExitCode::from(2)
      }
   }
}
