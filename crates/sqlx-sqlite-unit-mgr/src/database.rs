//! SQLite engine handle used by the manager

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Pool, Sqlite};
use tracing::debug;

use crate::config::UnitManagerConfig;
use crate::error::{Error, Result};
use crate::journal::JournalMode;

/// Result of a passthrough statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResult {
   /// The number of rows affected by the statement.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   pub last_insert_id: i64,
}

/// Open handle on one SQLite database file.
///
/// ## Architecture
///
/// A single-connection pool (max_connections=1). Every statement runs on the
/// same connection, so journal-mode switches never race another connection
/// of ours and closing the pool releases every file handle we hold.
///
/// ## State Management
///
/// - **`closed`**: Prevents use after the handle has been closed
/// - **`path`**: Primary file path, attached to engine errors
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Single read-write connection pool
   pool: Pool<Sqlite>,

   /// Marks the handle as closed to prevent further statements
   closed: AtomicBool,

   /// Path to the primary database file
   path: PathBuf,
}

impl SqliteDatabase {
   /// Open (creating if missing) the database at `path`.
   ///
   /// No journal mode is forced at connect time; the caller sets it with
   /// [`SqliteDatabase::set_journal_mode`].
   pub async fn connect(path: impl AsRef<Path>, config: &UnitManagerConfig) -> Result<Self> {
      let path = path.as_ref().to_path_buf();

      let options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .busy_timeout(config.busy_timeout);

      let pool = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(0)
         .idle_timeout(Some(config.idle_timeout))
         .connect_with(options)
         .await
         .map_err(|e| Error::engine(&path, e))?;

      debug!(path = %path.display(), "Opened engine handle");

      Ok(Self {
         pool,
         closed: AtomicBool::new(false),
         path,
      })
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::Acquire)
   }

   fn pool(&self) -> Result<&Pool<Sqlite>> {
      if self.is_closed() {
         return Err(Error::engine(&self.path, sqlx::Error::PoolClosed));
      }
      Ok(&self.pool)
   }

   /// Run `statement` verbatim. Multiple `;`-separated statements are allowed.
   pub async fn execute(&self, statement: &str) -> Result<ExecuteResult> {
      let result = self
         .pool()?
         .execute(statement)
         .await
         .map_err(|e| Error::engine(&self.path, e))?;

      Ok(ExecuteResult {
         rows_affected: result.rows_affected(),
         last_insert_id: result.last_insert_rowid(),
      })
   }

   /// Issue `PRAGMA journal_mode` and return the mode SQLite reports back.
   ///
   /// SQLite answers with the mode actually in effect, which differs from the
   /// requested one when the switch is refused.
   pub async fn set_journal_mode(&self, mode: JournalMode) -> Result<JournalMode> {
      let statement = format!("PRAGMA journal_mode = {}", mode.pragma_value());
      let reply: String = sqlx::query_scalar(&statement)
         .fetch_one(self.pool()?)
         .await
         .map_err(|e| Error::engine(&self.path, e))?;

      reply.parse::<JournalMode>().map_err(|e| {
         Error::engine(
            &self.path,
            sqlx::Error::Protocol(format!("journal_mode pragma: {e}")),
         )
      })
   }

   /// Close the connection and release the database files.
   ///
   /// Idempotent. Waits for the connection to finish closing, at which point
   /// SQLite has checkpointed the WAL if it could.
   pub async fn close(&self) {
      if self.closed.swap(true, Ordering::AcqRel) {
         return;
      }
      self.pool.close().await;
      debug!(path = %self.path.display(), "Closed engine handle");
   }
}
