/// Errors surfaced by the diagnostic harness
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the database unit manager.
   #[error(transparent)]
   UnitManager(#[from] sqlx_sqlite_unit_mgr::Error),

   /// I/O error when writing output.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   /// Report could not be encoded as JSON.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::UnitManager(e) => e.error_code(),
         Error::Io(_) => "IO_ERROR",
         Error::Json(_) => "JSON_ERROR",
      }
   }
}

pub type Result<T> = std::result::Result<T, Error>;
