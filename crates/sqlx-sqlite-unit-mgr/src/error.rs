//! Error types for sqlx-sqlite-unit-mgr

use std::path::PathBuf;

use thiserror::Error;

use crate::deletion::DeletionReport;
use crate::manager::LifecycleState;

/// Errors that may occur while managing the files of a logical database
#[derive(Error, Debug)]
pub enum Error {
   /// Operation attempted on a database in the wrong lifecycle state
   #[error("cannot {operation} database '{name}' while it is {state}")]
   InvalidState {
      name: String,
      state: LifecycleState,
      operation: &'static str,
   },

   /// Database name cannot be used as a file name stem
   #[error("invalid database name: {0:?}")]
   InvalidName(String),

   /// The SQLite engine failed to open, execute or close. Never retried.
   #[error("engine error for {}: {source}", .path.display())]
   Engine {
      path: PathBuf,
      #[source]
      source: sqlx::Error,
   },

   /// A probe or removal failed for a reason other than "not found"
   #[error("file system error for {}: {source}", .path.display())]
   FileSystem {
      path: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// One or more artifacts could not be confirmed absent after deletion.
   /// The report lists every artifact and what happened to it.
   #[error("{} artifact(s) of '{}' could not be confirmed absent", .0.remaining().count(), .0.name)]
   PartialDeletion(Box<DeletionReport>),
}

impl Error {
   pub(crate) fn engine(path: impl Into<PathBuf>, source: sqlx::Error) -> Self {
      Error::Engine {
         path: path.into(),
         source,
      }
   }

   pub(crate) fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
      Error::FileSystem {
         path: path.into(),
         source,
      }
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::InvalidState { .. } => "INVALID_STATE",
         Error::InvalidName(_) => "INVALID_NAME",
         Error::Engine { .. } => "ENGINE_ERROR",
         Error::FileSystem { .. } => "FILE_SYSTEM_ERROR",
         Error::PartialDeletion(_) => "PARTIAL_DELETION",
      }
   }

   /// The deletion report carried by a [`Error::PartialDeletion`]
   pub fn deletion_report(&self) -> Option<&DeletionReport> {
      match self {
         Error::PartialDeletion(report) => Some(report),
         _ => None,
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
