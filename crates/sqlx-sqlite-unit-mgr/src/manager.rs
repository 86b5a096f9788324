//! Lifecycle of logical databases and ownership of their files

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, trace, warn};

use crate::artifact::{Artifact, ArtifactReport, ArtifactRole, ArtifactStatus, artifact_path};
use crate::config::UnitManagerConfig;
use crate::database::{ExecuteResult, SqliteDatabase};
use crate::deletion::{ArtifactOutcome, DeletionReport, Removal, Verification};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::journal::JournalMode;

/// Lifecycle stage of a logical database.
///
/// ```text
/// Created --open--> Open --close--> Closed --open--> Open
/// Open|Closed --delete--> Deleted (terminal)
/// Open --set_journal_mode--> Open
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
   /// Referenced by name but never opened
   Created,
   Open,
   Closed,
   Deleted,
}

impl fmt::Display for LifecycleState {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let s = match self {
         LifecycleState::Created => "created",
         LifecycleState::Open => "open",
         LifecycleState::Closed => "closed",
         LifecycleState::Deleted => "deleted",
      };
      f.write_str(s)
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UnitKey {
   directory: PathBuf,
   name: String,
}

impl UnitKey {
   fn new(name: &str, directory: &Path) -> Result<Self> {
      let invalid = name.is_empty()
         || name == "."
         || name == ".."
         || name.contains(['/', '\\', '\0']);
      if invalid {
         return Err(Error::InvalidName(name.to_string()));
      }

      // Relative spellings and `..` collapse here; symlinks are resolved
      // later against the file system
      let absolute =
         std::path::absolute(directory).map_err(|e| Error::file_system(directory, e))?;
      let mut normalized = PathBuf::new();
      for component in absolute.components() {
         match component {
            Component::CurDir => {}
            Component::ParentDir => {
               normalized.pop();
            }
            other => normalized.push(other),
         }
      }

      Ok(Self {
         directory: normalized,
         name: name.to_string(),
      })
   }
}

#[derive(Debug)]
struct UnitState {
   state: LifecycleState,
   journal_mode: JournalMode,
   handle: Option<SqliteDatabase>,
}

/// A logical database: the primary file and its side files, owned as a unit.
///
/// Cheap to clone; clones refer to the same record. The record keeps its
/// final state after deletion so stale clones fail with
/// [`Error::InvalidState`] instead of touching a newer database of the same
/// name.
#[derive(Clone)]
pub struct LogicalDatabase {
   key: Arc<UnitKey>,
   inner: Arc<AsyncMutex<UnitState>>,
}

impl LogicalDatabase {
   fn new(key: UnitKey) -> Self {
      Self {
         key: Arc::new(key),
         inner: Arc::new(AsyncMutex::new(UnitState {
            state: LifecycleState::Created,
            // SQLite's default until told otherwise
            journal_mode: JournalMode::Rollback,
            handle: None,
         })),
      }
   }

   pub fn name(&self) -> &str {
      &self.key.name
   }

   pub fn directory(&self) -> &Path {
      &self.key.directory
   }

   pub fn primary_path(&self) -> PathBuf {
      self.artifact_path(ArtifactRole::Primary)
   }

   pub fn artifact_path(&self, role: ArtifactRole) -> PathBuf {
      artifact_path(&self.key.directory, &self.key.name, role)
   }

   /// Current lifecycle state. Waits for any in-flight operation on this
   /// database to finish.
   pub async fn state(&self) -> LifecycleState {
      self.inner.lock().await.state
   }

   /// Journal mode last reported by the engine
   pub async fn journal_mode(&self) -> JournalMode {
      self.inner.lock().await.journal_mode
   }

   /// Whether both values refer to the same record
   pub fn same_record(&self, other: &LogicalDatabase) -> bool {
      Arc::ptr_eq(&self.inner, &other.inner)
   }

   fn require(
      &self,
      unit: &UnitState,
      allowed: &[LifecycleState],
      operation: &'static str,
   ) -> Result<()> {
      if allowed.contains(&unit.state) {
         return Ok(());
      }
      Err(Error::InvalidState {
         name: self.key.name.clone(),
         state: unit.state,
         operation,
      })
   }

   fn open_handle<'a>(
      &self,
      unit: &'a UnitState,
      operation: &'static str,
   ) -> Result<&'a SqliteDatabase> {
      self.require(unit, &[LifecycleState::Open], operation)?;
      unit.handle.as_ref().ok_or_else(|| Error::InvalidState {
         name: self.key.name.clone(),
         state: unit.state,
         operation,
      })
   }
}

impl fmt::Debug for LogicalDatabase {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("LogicalDatabase")
         .field("name", &self.key.name)
         .field("directory", &self.key.directory)
         .finish()
   }
}

/// Sole owner of the on-disk footprint of the logical databases it manages.
///
/// Operations on one name are serialized; different names are independent.
/// The manager never caches whether a file exists: every decision is taken
/// on a fresh probe of the file system.
pub struct DatabaseUnitManager<F: FileSystem = TokioFileSystem> {
   fs: F,
   config: UnitManagerConfig,
   units: Mutex<HashMap<UnitKey, LogicalDatabase>>,
}

impl DatabaseUnitManager<TokioFileSystem> {
   pub fn new() -> Self {
      Self::with_config(UnitManagerConfig::default())
   }

   pub fn with_config(config: UnitManagerConfig) -> Self {
      Self::with_file_system(TokioFileSystem, config)
   }
}

impl Default for DatabaseUnitManager<TokioFileSystem> {
   fn default() -> Self {
      Self::new()
   }
}

impl<F: FileSystem> DatabaseUnitManager<F> {
   pub fn with_file_system(fs: F, config: UnitManagerConfig) -> Self {
      Self {
         fs,
         config,
         units: Mutex::new(HashMap::new()),
      }
   }

   pub fn config(&self) -> &UnitManagerConfig {
      &self.config
   }

   pub fn file_system(&self) -> &F {
      &self.fs
   }

   fn registered(&self, key: &UnitKey) -> LogicalDatabase {
      self
         .units
         .lock()
         .entry(key.clone())
         .or_insert_with(|| LogicalDatabase::new(key.clone()))
         .clone()
   }

   /// Registry key for `name`. An existing directory is keyed by its
   /// canonical path, so every spelling of it reaches the same record.
   async fn resolve(&self, name: &str, directory: &Path) -> Result<UnitKey> {
      let key = UnitKey::new(name, directory)?;
      self.canonical(key).await
   }

   async fn canonical(&self, mut key: UnitKey) -> Result<UnitKey> {
      match self.fs.canonicalize(&key.directory).await {
         Ok(canonical) => key.directory = canonical,
         // Nothing on disk to alias yet
         Err(e) if e.kind() == io::ErrorKind::NotFound => {}
         Err(e) => return Err(Error::file_system(&key.directory, e)),
      }
      Ok(key)
   }

   /// Drop a record that was never opened once nobody else holds it.
   /// `held` counts the references owned by the caller.
   fn evict_unopened(&self, db: &LogicalDatabase, held: usize) {
      let mut units = self.units.lock();
      // The registry entry is one more reference
      let unshared = Arc::strong_count(&db.inner) == held + 1;
      if unshared && units.get(&db.key).is_some_and(|current| current.same_record(db)) {
         units.remove(&db.key);
         trace!(name = %db.name(), "Evicted unopened record");
      }
   }

   fn forget(&self, db: &LogicalDatabase) {
      let mut units = self.units.lock();
      if units.get(&db.key).is_some_and(|current| current.same_record(db)) {
         units.remove(&db.key);
      }
   }

   /// Lock the live record for `key`, skipping records deleted while we
   /// waited for the lock.
   async fn lock_live(&self, key: &UnitKey) -> (LogicalDatabase, OwnedMutexGuard<UnitState>) {
      loop {
         let db = self.registered(key);
         let unit = Arc::clone(&db.inner).lock_owned().await;
         if unit.state != LifecycleState::Deleted {
            return (db, unit);
         }
         trace!(name = %key.name, "Record was deleted while waiting, retrying");
      }
   }

   /// Get the record for `name` without opening it.
   ///
   /// A name never opened yields a record in the `Created` state, on which
   /// everything except `open` fails.
   pub async fn reference(
      &self,
      name: &str,
      directory: impl AsRef<Path>,
   ) -> Result<LogicalDatabase> {
      let key = self.resolve(name, directory.as_ref()).await?;
      Ok(self.registered(&key))
   }

   /// Open `name` in `directory` with the given journal mode.
   ///
   /// Creates the directory if needed and lets SQLite create the primary
   /// file. Calling this for a database that is already open returns the
   /// existing record without reopening anything.
   pub async fn open(
      &self,
      name: &str,
      directory: impl AsRef<Path>,
      journal_mode: JournalMode,
   ) -> Result<LogicalDatabase> {
      let requested = UnitKey::new(name, directory.as_ref())?;
      self
         .fs
         .create_dir_all(&requested.directory)
         .await
         .map_err(|e| Error::file_system(&requested.directory, e))?;
      let key = self.canonical(requested).await?;
      let (db, mut unit) = self.lock_live(&key).await;

      if unit.state == LifecycleState::Open {
         if unit.journal_mode != journal_mode {
            warn!(
               name = %key.name,
               current = %unit.journal_mode,
               requested = %journal_mode,
               "Database already open with a different journal mode; use set_journal_mode to switch"
            );
         }
         debug!(name = %key.name, "Database already open, reusing record");
         return Ok(db);
      }

      let (handle, effective) = match Self::connect(&db, journal_mode, &self.config).await {
         Ok(connected) => connected,
         Err(e) => {
            if unit.state == LifecycleState::Created {
               // `db` and the guard's clone
               self.evict_unopened(&db, 2);
            }
            return Err(e);
         }
      };

      if effective != journal_mode {
         warn!(
            name = %key.name,
            requested = %journal_mode,
            effective = %effective,
            "Engine did not switch journal mode"
         );
      }

      unit.journal_mode = effective;
      unit.handle = Some(handle);
      unit.state = LifecycleState::Open;

      info!(name = %key.name, journal_mode = %effective, "Opened database");
      Ok(db)
   }

   async fn connect(
      db: &LogicalDatabase,
      journal_mode: JournalMode,
      config: &UnitManagerConfig,
   ) -> Result<(SqliteDatabase, JournalMode)> {
      let handle = SqliteDatabase::connect(db.primary_path(), config).await?;
      match handle.set_journal_mode(journal_mode).await {
         Ok(effective) => Ok((handle, effective)),
         Err(e) => {
            handle.close().await;
            Err(e)
         }
      }
   }

   /// Run a statement on an open database. The statement is passed to SQLite
   /// untouched.
   pub async fn execute(&self, db: &LogicalDatabase, statement: &str) -> Result<ExecuteResult> {
      let unit = db.inner.lock().await;
      let handle = db.open_handle(&unit, "execute on")?;
      handle.execute(statement).await
   }

   /// Switch the journal mode of an open database.
   ///
   /// Records the mode the engine reports as effective, then probes the
   /// files. Side files the new mode doesn't account for are logged; they
   /// are left for `delete` to sweep. The returned report reflects the disk
   /// right after the switch.
   pub async fn set_journal_mode(
      &self,
      db: &LogicalDatabase,
      journal_mode: JournalMode,
   ) -> Result<ArtifactReport> {
      let mut unit = db.inner.lock().await;
      let handle = db.open_handle(&unit, "set journal mode of")?;

      let effective = handle.set_journal_mode(journal_mode).await?;
      let previous = std::mem::replace(&mut unit.journal_mode, effective);
      debug!(name = %db.name(), %previous, %effective, "Journal mode switched");

      let report = self.probe(&db.key).await?;
      let unexpected = report.unexpected_roles(&effective.expected_roles(false));
      if !unexpected.is_empty() {
         warn!(
            name = %db.name(),
            journal_mode = %effective,
            leftovers = ?unexpected,
            "Side files remain after journal mode switch"
         );
      }

      Ok(report)
   }

   /// Close an open database.
   ///
   /// Files are left on disk; in WAL mode the `-wal` and `-shm` files may
   /// legitimately outlive the connection.
   pub async fn close(&self, db: &LogicalDatabase) -> Result<()> {
      let mut unit = db.inner.lock().await;
      db.require(&unit, &[LifecycleState::Open], "close")?;

      if let Some(handle) = unit.handle.take() {
         handle.close().await;
      }
      unit.state = LifecycleState::Closed;

      info!(name = %db.name(), "Closed database");
      Ok(())
   }

   /// Delete an open or closed database and every file belonging to it.
   ///
   /// Uses [`UnitManagerConfig::verify_timeout`] for the final re-probe.
   pub async fn delete(&self, db: &LogicalDatabase) -> Result<DeletionReport> {
      self.delete_with_timeout(db, self.config.verify_timeout).await
   }

   /// Like [`DatabaseUnitManager::delete`] with an explicit re-probe timeout
   pub async fn delete_with_timeout(
      &self,
      db: &LogicalDatabase,
      verify_timeout: Duration,
   ) -> Result<DeletionReport> {
      let mut unit = db.inner.lock().await;
      db.require(
         &unit,
         &[LifecycleState::Open, LifecycleState::Closed],
         "delete",
      )?;
      self.delete_locked(db, &mut unit, verify_timeout).await
   }

   /// Delete every file of `name` whether or not it was opened by this
   /// manager.
   ///
   /// This is the recovery path for files left behind by a crash or by
   /// another process. A live record for the name is closed first and ends
   /// up `Deleted`. Purging a name with nothing on disk succeeds with a
   /// report where nothing existed.
   pub async fn purge(&self, name: &str, directory: impl AsRef<Path>) -> Result<DeletionReport> {
      self
         .purge_with_timeout(name, directory, self.config.verify_timeout)
         .await
   }

   /// Like [`DatabaseUnitManager::purge`] with an explicit re-probe timeout
   pub async fn purge_with_timeout(
      &self,
      name: &str,
      directory: impl AsRef<Path>,
      verify_timeout: Duration,
   ) -> Result<DeletionReport> {
      let key = self.resolve(name, directory.as_ref()).await?;
      let (db, mut unit) = self.lock_live(&key).await;
      self.delete_locked(&db, &mut unit, verify_timeout).await
   }

   async fn delete_locked(
      &self,
      db: &LogicalDatabase,
      unit: &mut UnitState,
      verify_timeout: Duration,
   ) -> Result<DeletionReport> {
      // Most platforms won't remove files we still hold open
      if let Some(handle) = unit.handle.take() {
         handle.close().await;
         unit.state = LifecycleState::Closed;
      }

      let declared = unit.journal_mode.expected_roles(false);
      let artifacts = Artifact::all(&db.key.directory, &db.key.name);

      // Probe every role, not only the declared ones: a crash or an earlier
      // session in another journal mode can leave side files behind.
      let mut existed = Vec::with_capacity(artifacts.len());
      for artifact in &artifacts {
         let exists = self
            .fs
            .exists(&artifact.path)
            .await
            .map_err(|e| Error::file_system(&artifact.path, e))?;
         if exists && !declared.contains(&artifact.role) {
            warn!(
               name = %db.name(),
               role = %artifact.role,
               path = %artifact.path.display(),
               "Found orphaned artifact"
            );
         }
         existed.push(exists);
      }

      // One attempt per artifact; retries are up to the caller
      let mut removals = Vec::with_capacity(artifacts.len());
      for (artifact, existed) in artifacts.iter().zip(&existed) {
         let removal = match self.fs.remove(&artifact.path).await {
            Ok(()) if *existed => Removal::Removed,
            Ok(()) => Removal::NotPresent,
            Err(e) => {
               warn!(
                  path = %artifact.path.display(),
                  error = %e,
                  "Failed to remove artifact"
               );
               Removal::Failed(e.to_string())
            }
         };
         removals.push(removal);
      }

      let mut verifications = Vec::with_capacity(artifacts.len());
      let reprobe = async {
         for artifact in &artifacts {
            let verification = match self.fs.exists(&artifact.path).await {
               Ok(false) => Verification::Absent,
               Ok(true) => Verification::Present,
               Err(e) => Verification::Unverified(e.to_string()),
            };
            verifications.push(verification);
         }
      };
      if tokio::time::timeout(verify_timeout, reprobe).await.is_err() {
         warn!(name = %db.name(), timeout = ?verify_timeout, "Re-probe after removal timed out");
         let message = format!("re-probe timed out after {verify_timeout:?}");
         verifications.resize(artifacts.len(), Verification::Unverified(message));
      }

      let outcomes = artifacts
         .into_iter()
         .zip(existed)
         .zip(removals)
         .zip(verifications)
         .map(|(((artifact, existed_before), removal), verification)| ArtifactOutcome {
            declared: declared.contains(&artifact.role),
            role: artifact.role,
            path: artifact.path,
            existed_before,
            removal,
            verification,
         })
         .collect();

      let report = DeletionReport {
         name: db.key.name.clone(),
         directory: db.key.directory.clone(),
         outcomes,
      };

      if !report.is_complete() {
         warn!(
            name = %db.name(),
            remaining = report.remaining().count(),
            "Database files remain after delete"
         );
         return Err(Error::PartialDeletion(Box::new(report)));
      }

      unit.state = LifecycleState::Deleted;
      self.forget(db);

      info!(
         name = %db.name(),
         orphans = report.orphans().count(),
         "Deleted database"
      );
      Ok(report)
   }

   /// Probe all four artifacts of `name`. Never modifies anything and works
   /// whether or not the name was ever opened.
   pub async fn inspect(&self, name: &str, directory: impl AsRef<Path>) -> Result<ArtifactReport> {
      let key = self.resolve(name, directory.as_ref()).await?;
      self.probe(&key).await
   }

   async fn probe(&self, key: &UnitKey) -> Result<ArtifactReport> {
      let mut artifacts = indexmap::IndexMap::with_capacity(ArtifactRole::ALL.len());

      for artifact in Artifact::all(&key.directory, &key.name) {
         let stat = self
            .fs
            .stat(&artifact.path)
            .await
            .map_err(|e| Error::file_system(&artifact.path, e))?;

         let role = artifact.role;
         let status = match stat {
            Some(stat) => ArtifactStatus {
               role,
               path: artifact.path,
               exists: true,
               size: Some(stat.size),
               modified: stat.modified.map(OffsetDateTime::from),
            },
            None => ArtifactStatus::missing(artifact),
         };
         artifacts.insert(role, status);
      }

      Ok(ArtifactReport {
         name: key.name.clone(),
         directory: key.directory.clone(),
         artifacts,
      })
   }
}
