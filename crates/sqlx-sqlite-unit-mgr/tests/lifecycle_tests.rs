//! Integration tests for the database unit lifecycle against real SQLite
//! files in a temporary directory.

use std::path::Path;

use sqlx_sqlite_unit_mgr::{
   ArtifactRole, DatabaseUnitManager, Error, FileSystem, JournalMode, LifecycleState,
   TokioFileSystem,
};
use tempfile::TempDir;

async fn write_leftovers(dir: &Path, name: &str, roles: &[ArtifactRole]) {
   for role in roles {
      let path = sqlx_sqlite_unit_mgr::artifact_path(dir, name, *role);
      TokioFileSystem
         .write(&path, b"stale bytes from a previous session")
         .await
         .unwrap();
   }
}

// ============================================================================
// Core regression: nothing survives a delete
// ============================================================================

#[tokio::test]
async fn test_wal_write_close_delete_leaves_nothing() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager
      .open("wal-test.db", temp.path(), JournalMode::Wal)
      .await
      .unwrap();
   assert_eq!(db.journal_mode().await, JournalMode::Wal);

   manager
      .execute(
         &db,
         "CREATE TABLE IF NOT EXISTS test (id INTEGER PRIMARY KEY, value TEXT);
          INSERT INTO test (value) VALUES ('hello');",
      )
      .await
      .unwrap();
   manager.close(&db).await.unwrap();

   let before = manager.inspect("wal-test.db", temp.path()).await.unwrap();
   assert!(before.exists(ArtifactRole::Primary));

   let report = manager.delete(&db).await.unwrap();
   assert!(report.is_complete());
   assert!(report.outcome(ArtifactRole::Primary).unwrap().existed_before);
   assert_eq!(db.state().await, LifecycleState::Deleted);

   let after = manager.inspect("wal-test.db", temp.path()).await.unwrap();
   for role in ArtifactRole::ALL {
      assert!(!after.exists(role), "{role} should be gone");
   }
}

#[tokio::test]
async fn test_rollback_mode_delete_leaves_nothing() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager
      .open("t1", temp.path(), JournalMode::Rollback)
      .await
      .unwrap();
   assert_eq!(db.journal_mode().await, JournalMode::Rollback);

   manager
      .execute(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t DEFAULT VALUES;")
      .await
      .unwrap();
   manager.close(&db).await.unwrap();

   let report = manager.delete(&db).await.unwrap();
   assert!(report.is_complete());
   assert_eq!(report.orphans().count(), 0);
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_open_wal_database_closes_first() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   manager
      .execute(&db, "CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('x');")
      .await
      .unwrap();

   // WAL and SHM next to an open WAL database are expected, not a leak
   let open = manager.inspect("t1", temp.path()).await.unwrap();
   assert!(open.exists(ArtifactRole::Primary));
   assert!(open.exists(ArtifactRole::Wal));
   assert!(open.exists(ArtifactRole::Shm));
   assert!(open.unexpected_roles(&JournalMode::Wal.expected_roles(false)).is_empty());

   let report = manager.delete(&db).await.unwrap();
   assert!(report.is_complete());
   assert_eq!(db.state().await, LifecycleState::Deleted);
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

// ============================================================================
// Orphaned artifacts
// ============================================================================

#[tokio::test]
async fn test_purge_removes_crash_leftovers_never_opened() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();
   write_leftovers(temp.path(), "t2", &[ArtifactRole::Wal, ArtifactRole::Shm]).await;

   let report = manager.purge("t2", temp.path()).await.unwrap();

   assert!(report.is_complete());
   let orphans: Vec<ArtifactRole> = report.orphans().map(|o| o.role).collect();
   assert_eq!(orphans, vec![ArtifactRole::Wal, ArtifactRole::Shm]);
   assert!(!report.outcome(ArtifactRole::Primary).unwrap().existed_before);

   let after = manager.inspect("t2", temp.path()).await.unwrap();
   assert!(after.is_empty());
}

#[tokio::test]
async fn test_delete_sweeps_side_files_the_journal_mode_does_not_declare() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager
      .open("t1", temp.path(), JournalMode::Rollback)
      .await
      .unwrap();
   manager.execute(&db, "CREATE TABLE t (id INTEGER)").await.unwrap();
   manager.close(&db).await.unwrap();

   write_leftovers(
      temp.path(),
      "t1",
      &[ArtifactRole::Wal, ArtifactRole::Shm, ArtifactRole::RollbackJournal],
   )
   .await;

   let report = manager.delete(&db).await.unwrap();
   assert!(report.is_complete());
   assert_eq!(report.orphans().count(), 3);
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_of_open_database_marks_record_deleted() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   manager.execute(&db, "CREATE TABLE t (id INTEGER)").await.unwrap();

   let report = manager.purge("t1", temp.path()).await.unwrap();
   assert!(report.is_complete());
   assert_eq!(db.state().await, LifecycleState::Deleted);

   let err = manager.execute(&db, "SELECT 1").await.unwrap_err();
   assert!(matches!(
      err,
      Error::InvalidState {
         state: LifecycleState::Deleted,
         ..
      }
   ));
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_second_delete_reports_nothing_existed() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   manager.execute(&db, "CREATE TABLE t (id INTEGER)").await.unwrap();
   manager.close(&db).await.unwrap();
   manager.delete(&db).await.unwrap();

   // The record itself is terminal
   let err = manager.delete(&db).await.unwrap_err();
   assert_eq!(err.error_code(), "INVALID_STATE");

   // Deleting the name again finds nothing and succeeds
   let report = manager.purge("t1", temp.path()).await.unwrap();
   assert!(report.is_complete());
   assert!(!report.anything_existed());
   assert!(report.outcomes.iter().all(|o| !o.existed_before));
}

#[tokio::test]
async fn test_open_twice_returns_existing_record() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let first = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   let second = manager
      .open("t1", temp.path(), JournalMode::Rollback)
      .await
      .unwrap();

   assert!(first.same_record(&second));
   assert_eq!(second.state().await, LifecycleState::Open);
   // The second call doesn't switch modes
   assert_eq!(second.journal_mode().await, JournalMode::Wal);

   manager.delete(&first).await.unwrap();
}

#[tokio::test]
async fn test_aliased_directory_reaches_the_same_record() {
   let temp = TempDir::new().unwrap();
   std::fs::create_dir(temp.path().join("sub")).unwrap();
   let aliased = temp.path().join("sub").join("..");
   let manager = DatabaseUnitManager::new();

   let a = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   let b = manager.open("t1", &aliased, JournalMode::Wal).await.unwrap();
   assert!(a.same_record(&b));
   manager.execute(&b, "CREATE TABLE t (id INTEGER)").await.unwrap();

   manager.delete(&a).await.unwrap();

   // No second handle is left writing to unlinked files
   assert_eq!(b.state().await, LifecycleState::Deleted);
   let err = manager.execute(&b, "SELECT 1").await.unwrap_err();
   assert_eq!(err.error_code(), "INVALID_STATE");
   assert!(manager.inspect("t1", &aliased).await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_reaches_the_same_record() {
   let temp = TempDir::new().unwrap();
   let real = temp.path().join("real");
   let link = temp.path().join("link");
   std::fs::create_dir(&real).unwrap();
   std::os::unix::fs::symlink(&real, &link).unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager.open("t1", &real, JournalMode::Wal).await.unwrap();
   let via_link = manager.reference("t1", &link).await.unwrap();
   assert!(db.same_record(&via_link));

   let report = manager.purge("t1", &link).await.unwrap();
   assert!(report.outcome(ArtifactRole::Primary).unwrap().existed_before);
   assert_eq!(db.state().await, LifecycleState::Deleted);
}

#[tokio::test]
async fn test_reopen_closed_database_keeps_data() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   manager
      .execute(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
      .await
      .unwrap();
   manager
      .execute(&db, "INSERT INTO t (v) VALUES ('a')")
      .await
      .unwrap();
   manager.close(&db).await.unwrap();
   assert_eq!(db.state().await, LifecycleState::Closed);

   let reopened = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   assert!(reopened.same_record(&db));
   let result = manager
      .execute(&reopened, "INSERT INTO t (v) VALUES ('b')")
      .await
      .unwrap();
   assert_eq!(result.last_insert_id, 2);

   manager.delete(&reopened).await.unwrap();
}

// ============================================================================
// State machine
// ============================================================================

#[tokio::test]
async fn test_never_opened_record_only_allows_open() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();
   let db = manager.reference("t1", temp.path()).await.unwrap();

   let errors = [
      manager.close(&db).await.unwrap_err(),
      manager.delete(&db).await.unwrap_err(),
      manager.execute(&db, "SELECT 1").await.unwrap_err(),
      manager
         .set_journal_mode(&db, JournalMode::Wal)
         .await
         .unwrap_err(),
   ];
   for err in errors {
      assert!(
         matches!(
            err,
            Error::InvalidState {
               state: LifecycleState::Created,
               ..
            }
         ),
         "unexpected error: {err}"
      );
   }

   // Nothing was created on disk by the failed calls
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleted_record_rejects_everything() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();
   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   manager.delete(&db).await.unwrap();

   assert_eq!(manager.close(&db).await.unwrap_err().error_code(), "INVALID_STATE");
   assert_eq!(manager.delete(&db).await.unwrap_err().error_code(), "INVALID_STATE");
   assert_eq!(
      manager
         .set_journal_mode(&db, JournalMode::Rollback)
         .await
         .unwrap_err()
         .error_code(),
      "INVALID_STATE"
   );

   // Inspection by name still works
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_close_twice_is_invalid() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();
   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();

   manager.close(&db).await.unwrap();
   let err = manager.close(&db).await.unwrap_err();
   assert!(matches!(
      err,
      Error::InvalidState {
         state: LifecycleState::Closed,
         operation: "close",
         ..
      }
   ));

   manager.delete(&db).await.unwrap();
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   for name in ["", "../escape", "a/b"] {
      let err = manager
         .open(name, temp.path(), JournalMode::Wal)
         .await
         .unwrap_err();
      assert!(matches!(err, Error::InvalidName(_)), "{name:?}");
   }
   assert!(manager.inspect("", temp.path()).await.is_err());
}

// ============================================================================
// Journal mode switches
// ============================================================================

#[tokio::test]
async fn test_switch_wal_to_rollback_recomputes_expected_set() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager.open("t1", temp.path(), JournalMode::Wal).await.unwrap();
   manager
      .execute(&db, "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);")
      .await
      .unwrap();

   let report = manager
      .set_journal_mode(&db, JournalMode::Rollback)
      .await
      .unwrap();
   assert_eq!(db.journal_mode().await, JournalMode::Rollback);
   assert!(report.exists(ArtifactRole::Primary));
   assert!(!report.exists(ArtifactRole::Wal));

   manager.close(&db).await.unwrap();
   let deletion = manager.delete(&db).await.unwrap();
   assert!(deletion.is_complete());
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_switch_rollback_to_wal() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let db = manager
      .open("t1", temp.path(), JournalMode::Rollback)
      .await
      .unwrap();
   manager.set_journal_mode(&db, JournalMode::Wal).await.unwrap();
   manager
      .execute(&db, "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);")
      .await
      .unwrap();
   assert_eq!(db.journal_mode().await, JournalMode::Wal);

   let open = manager.inspect("t1", temp.path()).await.unwrap();
   assert!(open.exists(ArtifactRole::Wal));

   let report = manager.delete(&db).await.unwrap();
   assert!(report.outcome(ArtifactRole::Wal).unwrap().declared);
   assert!(manager.inspect("t1", temp.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inspect_reports_size_and_mtime() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();
   let wal = sqlx_sqlite_unit_mgr::artifact_path(temp.path(), "t1", ArtifactRole::Wal);
   TokioFileSystem.write(&wal, &[7u8; 128]).await.unwrap();

   let report = manager.inspect("t1", temp.path()).await.unwrap();

   let status = &report.artifacts[&ArtifactRole::Wal];
   assert!(status.exists);
   assert_eq!(status.size, Some(128));
   assert!(status.modified.is_some());

   let missing = &report.artifacts[&ArtifactRole::Shm];
   assert!(!missing.exists);
   assert_eq!(missing.size, None);
   assert_eq!(missing.modified, None);
}

// ============================================================================
// Independence and serialization
// ============================================================================

#[tokio::test]
async fn test_names_are_independent() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let a = manager.open("a.db", temp.path(), JournalMode::Wal).await.unwrap();
   let b = manager.open("b.db", temp.path(), JournalMode::Wal).await.unwrap();
   manager.execute(&b, "CREATE TABLE t (id INTEGER)").await.unwrap();

   manager.delete(&a).await.unwrap();

   assert_eq!(b.state().await, LifecycleState::Open);
   assert!(
      manager
         .inspect("b.db", temp.path())
         .await
         .unwrap()
         .exists(ArtifactRole::Primary)
   );
   manager.delete(&b).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_open_and_purge_stay_consistent() {
   let temp = TempDir::new().unwrap();
   let manager = DatabaseUnitManager::new();

   let (opened, purged) = tokio::join!(
      manager.open("t1", temp.path(), JournalMode::Wal),
      manager.purge("t1", temp.path()),
   );
   let db = opened.unwrap();
   assert!(purged.unwrap().is_complete());

   let report = manager.inspect("t1", temp.path()).await.unwrap();
   match db.state().await {
      // Purge ran after open: the record and its files are gone
      LifecycleState::Deleted => assert!(report.is_empty()),
      // Purge ran first and found nothing; open created the database after
      LifecycleState::Open => {
         assert!(report.exists(ArtifactRole::Primary));
         manager.delete(&db).await.unwrap();
      }
      other => panic!("unexpected state {other}"),
   }
}
