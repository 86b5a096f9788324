use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use serde::Serialize;
use sqlx_sqlite_unit_mgr::DatabaseUnitManager;

use crate::{Error, Result, Scenario};

fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
   serde_json::to_writer_pretty(&mut *out, value)?;
   writeln!(out)?;
   Ok(())
}

pub(crate) async fn check(scenario: Scenario, json: bool, out: &mut impl Write) -> Result<ExitCode> {
   let manager = DatabaseUnitManager::new();
   let outcome = scenario.run(&manager).await?;

   if json {
      write_json(out, &outcome)?;
   } else {
      for line in &outcome.steps {
         writeln!(out, "{line}")?;
      }
      if let Some(deletion) = &outcome.deletion {
         writeln!(out)?;
         write!(out, "{deletion}")?;
      }
   }

   Ok(if outcome.passed() {
      ExitCode::SUCCESS
   } else {
      ExitCode::FAILURE
   })
}

pub(crate) async fn inspect(
   name: &str,
   dir: &Path,
   json: bool,
   out: &mut impl Write,
) -> Result<ExitCode> {
   let manager = DatabaseUnitManager::new();
   let report = manager.inspect(name, dir).await?;

   if json {
      write_json(out, &report)?;
   } else {
      write!(out, "{report}")?;
   }
   Ok(ExitCode::SUCCESS)
}

pub(crate) async fn purge(
   name: &str,
   dir: &Path,
   timeout_ms: u64,
   json: bool,
   out: &mut impl Write,
) -> Result<ExitCode> {
   let manager = DatabaseUnitManager::new();
   let timeout = Duration::from_millis(timeout_ms);

   let (report, code) = match manager.purge_with_timeout(name, dir, timeout).await {
      Ok(report) => (report, ExitCode::SUCCESS),
      Err(sqlx_sqlite_unit_mgr::Error::PartialDeletion(report)) => (*report, ExitCode::FAILURE),
      Err(e) => return Err(Error::from(e)),
   };

   if json {
      write_json(out, &report)?;
   } else {
      write!(out, "{report}")?;
   }
   Ok(code)
}
