//! The WAL cleanup check: create a WAL database, delete it, look for leftovers

use std::path::PathBuf;

use serde::Serialize;
use sqlx_sqlite_unit_mgr::{
   ArtifactReport, ArtifactRole, DatabaseUnitManager, DeletionReport, FileSystem, JournalMode,
};
use tracing::{debug, info};

use crate::{Error, Result};

/// How the database is deleted in step 6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
   /// Full delete through the unit manager, including the orphan sweep
   Manager,
   /// Remove only the primary file, the way a naive "delete database" call
   /// does. Used to demonstrate the leak.
   PrimaryOnly,
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct Scenario {
   pub name: String,
   pub directory: PathBuf,
   pub journal_mode: JournalMode,
   /// Write `-wal`/`-shm` files after closing, as a crash would leave them
   pub simulate_crash: bool,
   pub strategy: DeleteStrategy,
}

impl Scenario {
   pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
      Self {
         name: name.into(),
         directory: directory.into(),
         journal_mode: JournalMode::Wal,
         simulate_crash: false,
         strategy: DeleteStrategy::Manager,
      }
   }
}

/// Everything observed during a run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
   /// Numbered step log, in the order the steps ran
   pub steps: Vec<String>,
   pub before: ArtifactReport,
   pub after: ArtifactReport,
   /// Present when the manager performed the delete, even if incomplete
   pub deletion: Option<DeletionReport>,
}

impl ScenarioOutcome {
   /// Artifacts still on disk after the delete
   pub fn leftovers(&self) -> Vec<ArtifactRole> {
      self.after.present_roles()
   }

   pub fn passed(&self) -> bool {
      self.after.is_empty()
   }
}

struct StepLog(Vec<String>);

impl StepLog {
   fn push(&mut self, line: impl Into<String>) {
      let line = line.into();
      debug!("{}", line.trim_end());
      self.0.push(line);
   }

   fn files(&mut self, report: &ArtifactReport, after_delete: bool) {
      for role in [ArtifactRole::Primary, ArtifactRole::Wal, ArtifactRole::Shm] {
         let exists = report.exists(role);
         let verdict = match (exists, after_delete) {
            (true, false) => "EXISTS",
            (false, false) => "missing",
            (true, true) => "EXISTS <- BUG! Not cleaned up",
            (false, true) => "missing (ok)",
         };
         self.push(format!("   {:<8} {verdict}", format!("{}:", role)));
      }
   }
}

impl Scenario {
   /// Run the check against `manager`.
   ///
   /// A partial deletion is part of the outcome, not an error; any other
   /// failure aborts the run.
   pub async fn run<F: FileSystem>(&self, manager: &DatabaseUnitManager<F>) -> Result<ScenarioOutcome> {
      let mut log = StepLog(Vec::new());

      log.push("1. Opening database...");
      let db = manager
         .open(&self.name, &self.directory, JournalMode::Rollback)
         .await?;

      log.push(format!("2. Enabling {} mode...", self.journal_mode));
      manager.set_journal_mode(&db, self.journal_mode).await?;

      log.push("3. Creating table and inserting data...");
      manager
         .execute(
            &db,
            "CREATE TABLE IF NOT EXISTS test (id INTEGER PRIMARY KEY, value TEXT);
             INSERT INTO test (value) VALUES ('hello');",
         )
         .await?;

      log.push("4. Closing database...");
      manager.close(&db).await?;

      if self.simulate_crash {
         log.push("   Simulating crash leftovers (-wal, -shm)...");
         for role in [ArtifactRole::Wal, ArtifactRole::Shm] {
            let path = db.artifact_path(role);
            manager
               .file_system()
               .write(&path, b"stale side file")
               .await
               .map_err(Error::Io)?;
         }
      }

      log.push("5. Checking files BEFORE delete:");
      let before = manager.inspect(&self.name, &self.directory).await?;
      log.files(&before, false);

      let deletion = match self.strategy {
         DeleteStrategy::Manager => {
            log.push("6. Deleting database via unit manager...");
            match manager.delete(&db).await {
               Ok(report) => Some(report),
               Err(sqlx_sqlite_unit_mgr::Error::PartialDeletion(report)) => {
                  log.push("   Delete incomplete, see deletion report");
                  Some(*report)
               }
               Err(e) => return Err(e.into()),
            }
         }
         DeleteStrategy::PrimaryOnly => {
            log.push("6. Deleting primary file only...");
            manager
               .file_system()
               .remove(&db.primary_path())
               .await
               .map_err(Error::Io)?;
            None
         }
      };

      log.push("7. Checking files AFTER delete:");
      let after = manager.inspect(&self.name, &self.directory).await?;
      log.files(&after, true);

      if after.is_empty() {
         log.push("All files cleaned up correctly");
      } else {
         log.push(format!(
            "BUG REPRODUCED: {:?} were NOT deleted",
            after.present_roles()
         ));
      }

      info!(
         name = %self.name,
         strategy = ?self.strategy,
         leftovers = after.present_roles().len(),
         "Cleanup check finished"
      );

      Ok(ScenarioOutcome {
         steps: log.0,
         before,
         after,
         deletion,
      })
   }
}
