//! The physical files that make up one logical database

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Role a file plays for its logical database.
///
/// All artifacts are siblings in one directory and share the database name
/// as their stem: `<name>`, `<name>-wal`, `<name>-shm`, `<name>-journal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
   Primary,
   Wal,
   Shm,
   RollbackJournal,
}

impl ArtifactRole {
   /// Every role, in the order reports list them
   pub const ALL: [ArtifactRole; 4] = [
      ArtifactRole::Primary,
      ArtifactRole::Wal,
      ArtifactRole::Shm,
      ArtifactRole::RollbackJournal,
   ];

   /// File name suffix appended to the database name
   pub fn suffix(self) -> &'static str {
      match self {
         ArtifactRole::Primary => "",
         ArtifactRole::Wal => "-wal",
         ArtifactRole::Shm => "-shm",
         ArtifactRole::RollbackJournal => "-journal",
      }
   }

   /// Short label used in human-readable tables
   pub fn label(self) -> &'static str {
      match self {
         ArtifactRole::Primary => "main db",
         ArtifactRole::Wal => "-wal",
         ArtifactRole::Shm => "-shm",
         ArtifactRole::RollbackJournal => "-journal",
      }
   }
}

impl fmt::Display for ArtifactRole {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.pad(self.label())
   }
}

/// One physical file belonging to a logical database.
///
/// Existence is not stored here. It is observed from the file system at the
/// time of each check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
   pub role: ArtifactRole,
   pub path: PathBuf,
}

impl Artifact {
   pub fn new(directory: &Path, name: &str, role: ArtifactRole) -> Self {
      Self {
         role,
         path: artifact_path(directory, name, role),
      }
   }

   /// All four possible artifacts for `name` in `directory`
   pub fn all(directory: &Path, name: &str) -> Vec<Artifact> {
      ArtifactRole::ALL
         .iter()
         .map(|role| Artifact::new(directory, name, *role))
         .collect()
   }
}

/// Derive the path of the artifact playing `role` for database `name`
pub fn artifact_path(directory: &Path, name: &str, role: ArtifactRole) -> PathBuf {
   directory.join(format!("{}{}", name, role.suffix()))
}

/// Observed state of one artifact at the time of an inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
   pub role: ArtifactRole,
   pub path: PathBuf,
   pub exists: bool,
   /// Size in bytes, when the file exists
   pub size: Option<u64>,
   /// Best-effort last modification time; some platforms don't report it
   #[serde(with = "time::serde::rfc3339::option")]
   pub modified: Option<OffsetDateTime>,
}

impl ArtifactStatus {
   pub fn missing(artifact: Artifact) -> Self {
      Self {
         role: artifact.role,
         path: artifact.path,
         exists: false,
         size: None,
         modified: None,
      }
   }
}

/// Result of probing every possible artifact of one database name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
   pub name: String,
   pub directory: PathBuf,
   pub artifacts: IndexMap<ArtifactRole, ArtifactStatus>,
}

impl ArtifactReport {
   pub fn exists(&self, role: ArtifactRole) -> bool {
      self.artifacts.get(&role).is_some_and(|status| status.exists)
   }

   /// Roles whose file currently exists
   pub fn present_roles(&self) -> Vec<ArtifactRole> {
      self
         .artifacts
         .values()
         .filter(|status| status.exists)
         .map(|status| status.role)
         .collect()
   }

   /// Present roles that are not in `expected`
   pub fn unexpected_roles(&self, expected: &[ArtifactRole]) -> Vec<ArtifactRole> {
      self
         .present_roles()
         .into_iter()
         .filter(|role| !expected.contains(role))
         .collect()
   }

   /// True when no artifact of the database is on disk
   pub fn is_empty(&self) -> bool {
      self.artifacts.values().all(|status| !status.exists)
   }
}

impl fmt::Display for ArtifactReport {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      writeln!(f, "{} in {}", self.name, self.directory.display())?;
      for status in self.artifacts.values() {
         if status.exists {
            let size = status.size.map(|s| s.to_string()).unwrap_or_default();
            let modified = status
               .modified
               .and_then(|m| m.format(&Rfc3339).ok())
               .unwrap_or_else(|| "-".to_string());
            writeln!(
               f,
               "   {:<9} EXISTS   {:>10} bytes  {}",
               status.role, size, modified
            )?;
         } else {
            writeln!(f, "   {:<9} missing", status.role)?;
         }
      }
      Ok(())
   }
}
