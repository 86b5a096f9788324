//! Per-artifact outcome of deleting a logical database

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::artifact::ArtifactRole;

/// What happened when removal of one artifact was attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Removal {
   /// The file existed and was removed
   Removed,
   /// Nothing to remove at the time of the attempt
   NotPresent,
   /// The removal call failed; the message is the file-system error
   Failed(String),
}

/// Result of the re-probe after removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Verification {
   Absent,
   Present,
   /// The probe failed or timed out, so absence could not be confirmed
   Unverified(String),
}

/// Deletion outcome for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactOutcome {
   pub role: ArtifactRole,
   pub path: PathBuf,
   /// Whether the journal mode declared this artifact, as opposed to it being
   /// found by the orphan probe
   pub declared: bool,
   pub existed_before: bool,
   pub removal: Removal,
   pub verification: Verification,
}

impl ArtifactOutcome {
   /// Present before deletion without the journal mode accounting for it
   pub fn is_orphan(&self) -> bool {
      self.existed_before && !self.declared
   }

   pub fn is_absent(&self) -> bool {
      self.verification == Verification::Absent
   }
}

/// Structured report of a delete or purge, one entry per artifact role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
   pub name: String,
   pub directory: PathBuf,
   pub outcomes: Vec<ArtifactOutcome>,
}

impl DeletionReport {
   /// True when every artifact is confirmed absent
   pub fn is_complete(&self) -> bool {
      self.outcomes.iter().all(ArtifactOutcome::is_absent)
   }

   /// Artifacts that could not be confirmed absent
   pub fn remaining(&self) -> impl Iterator<Item = &ArtifactOutcome> {
      self.outcomes.iter().filter(|o| !o.is_absent())
   }

   /// Artifacts found on disk that the journal mode did not account for
   pub fn orphans(&self) -> impl Iterator<Item = &ArtifactOutcome> {
      self.outcomes.iter().filter(|o| o.is_orphan())
   }

   pub fn outcome(&self, role: ArtifactRole) -> Option<&ArtifactOutcome> {
      self.outcomes.iter().find(|o| o.role == role)
   }

   /// Whether any artifact existed before the deletion started
   pub fn anything_existed(&self) -> bool {
      self.outcomes.iter().any(|o| o.existed_before)
   }
}

impl fmt::Display for DeletionReport {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      writeln!(f, "delete {} in {}", self.name, self.directory.display())?;
      for outcome in &self.outcomes {
         let before = if outcome.existed_before { "existed" } else { "absent" };
         let origin = if outcome.is_orphan() { " (orphan)" } else { "" };
         let removal = match &outcome.removal {
            Removal::Removed => "removed".to_string(),
            Removal::NotPresent => "nothing to remove".to_string(),
            Removal::Failed(msg) => format!("FAILED: {msg}"),
         };
         let after = match &outcome.verification {
            Verification::Absent => "gone".to_string(),
            Verification::Present => "STILL PRESENT".to_string(),
            Verification::Unverified(msg) => format!("UNVERIFIED: {msg}"),
         };
         writeln!(
            f,
            "   {:<9} {before}{origin}, {removal}, {after}",
            outcome.role
         )?;
      }
      Ok(())
   }
}
