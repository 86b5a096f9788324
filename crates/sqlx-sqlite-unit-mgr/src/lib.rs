//! # sqlx-sqlite-unit-mgr
//!
//! Owns every file backing a SQLite database and makes sure deleting the
//! database deletes all of them.
//!
//! A database in WAL mode is not one file but up to three: `<name>`,
//! `<name>-wal` and `<name>-shm`, plus `<name>-journal` in rollback mode.
//! Removing only the primary file leaves stale WAL content behind, which
//! SQLite will happily replay into the next database created under the same
//! name.
//!
//! ## Core Types
//!
//! - **[`DatabaseUnitManager`]**: Opens, closes, deletes and inspects logical databases
//! - **[`LogicalDatabase`]**: Record of one database and its lifecycle state
//! - **[`ArtifactReport`]**: Existence, size and mtime of every file of a database
//! - **[`DeletionReport`]**: Per-file outcome of a delete
//! - **[`Error`]**: Error type for all operations
//!
//! ## Deletion
//!
//! - **Declared set**: the files the current journal mode accounts for
//! - **Orphan probe**: every other side file with the same stem, whatever the mode
//! - **Verified**: files are re-probed after removal; the database is only
//!   marked deleted when all of them are confirmed gone
//!
//! ```no_run
//! use sqlx_sqlite_unit_mgr::{DatabaseUnitManager, JournalMode};
//!
//! # async fn run() -> sqlx_sqlite_unit_mgr::Result<()> {
//! let manager = DatabaseUnitManager::new();
//! let db = manager.open("app.db", "/tmp/data", JournalMode::Wal).await?;
//! manager.execute(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY)").await?;
//! manager.close(&db).await?;
//!
//! let report = manager.delete(&db).await?;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

mod artifact;
mod config;
mod database;
mod deletion;
mod error;
mod fs;
mod journal;
mod manager;

// Re-export public types
pub use artifact::{Artifact, ArtifactReport, ArtifactRole, ArtifactStatus, artifact_path};
pub use config::UnitManagerConfig;
pub use database::{ExecuteResult, SqliteDatabase};
pub use deletion::{ArtifactOutcome, DeletionReport, Removal, Verification};
pub use error::{Error, Result};
pub use fs::{FileStat, FileSystem, TokioFileSystem};
pub use journal::{JournalMode, ParseJournalModeError};
pub use manager::{DatabaseUnitManager, LifecycleState, LogicalDatabase};
