//! SQLite journal modes and the artifact roles each one implies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRole;

/// Journaling mode of a logical database.
///
/// SQLite has several rollback-journal flavours (`DELETE`, `TRUNCATE`,
/// `PERSIST`, `MEMORY`, `OFF`). They all share the same on-disk footprint
/// from this crate's point of view and collapse into [`JournalMode::Rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
   Rollback,
   Wal,
}

impl JournalMode {
   /// Value passed to `PRAGMA journal_mode = ...` to switch into this mode
   pub fn pragma_value(self) -> &'static str {
      match self {
         JournalMode::Rollback => "DELETE",
         JournalMode::Wal => "WAL",
      }
   }

   /// Roles that are expected on disk for a database in this mode.
   ///
   /// The primary file is always expected. WAL and SHM files belong to WAL
   /// mode; the rollback journal only exists while a transaction is active.
   pub fn expected_roles(self, transaction_active: bool) -> Vec<ArtifactRole> {
      match self {
         JournalMode::Wal => vec![ArtifactRole::Primary, ArtifactRole::Wal, ArtifactRole::Shm],
         JournalMode::Rollback if transaction_active => {
            vec![ArtifactRole::Primary, ArtifactRole::RollbackJournal]
         }
         JournalMode::Rollback => vec![ArtifactRole::Primary],
      }
   }
}

impl fmt::Display for JournalMode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         JournalMode::Rollback => f.write_str("rollback"),
         JournalMode::Wal => f.write_str("wal"),
      }
   }
}

/// Error returned when a string is not a known journal mode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown journal mode: {0:?}")]
pub struct ParseJournalModeError(pub String);

impl FromStr for JournalMode {
   type Err = ParseJournalModeError;

   /// Accepts both our own names and whatever SQLite reports back from
   /// `PRAGMA journal_mode`.
   fn from_str(s: &str) -> Result<Self, Self::Err> {
      match s.trim().to_ascii_lowercase().as_str() {
         "wal" => Ok(JournalMode::Wal),
         "rollback" | "delete" | "truncate" | "persist" | "memory" | "off" => {
            Ok(JournalMode::Rollback)
         }
         _ => Err(ParseJournalModeError(s.to_string())),
      }
   }
}
