//! Configuration for the database unit manager

use std::time::Duration;

/// Configuration for [`DatabaseUnitManager`](crate::DatabaseUnitManager)
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_unit_mgr::UnitManagerConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = UnitManagerConfig::default();
///
/// // Override just one field
/// let config = UnitManagerConfig {
///     verify_timeout: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct UnitManagerConfig {
   /// Idle timeout for the engine connection
   ///
   /// The connection is closed after sitting idle this long and reopened on
   /// the next statement. The journal mode is stored in the database file,
   /// so reopening doesn't change it.
   ///
   /// Default: 30 seconds
   pub idle_timeout: Duration,

   /// How long SQLite waits on a locked database before failing a statement
   ///
   /// Default: 5 seconds
   pub busy_timeout: Duration,

   /// Upper bound on the re-probe that confirms artifacts are gone after a
   /// delete
   ///
   /// A file held open by another process can stall the probe. When the
   /// timeout elapses the delete fails with a partial-deletion error instead
   /// of blocking.
   ///
   /// Default: 5 seconds
   pub verify_timeout: Duration,
}

impl Default for UnitManagerConfig {
   fn default() -> Self {
      Self {
         idle_timeout: Duration::from_secs(30),
         busy_timeout: Duration::from_secs(5),
         verify_timeout: Duration::from_secs(5),
      }
   }
}
