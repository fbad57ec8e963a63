use crate::env;
use crate::session::*;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Helper function to create a test session root
fn create_test_root() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

fn memory_manager(root: &TempDir) -> (SessionManager, MemoryLocker) {
    let locker = MemoryLocker::new();
    let manager = SessionManager::new(
        SessionStore::new(root.path().join("session")),
        Arc::new(locker.clone()),
    );
    (manager, locker)
}

fn completed(source: &str, bytes: u64) -> ProgressDelta {
    ProgressDelta::Completed {
        source: source.to_string(),
        target: format!("/dst/{}", source),
        bytes,
    }
}

#[tokio::test]
async fn test_session_root_creation_is_idempotent() {
    let root = create_test_root();
    let store = SessionStore::new(root.path().join("session"));

    assert!(!store.session_root_exists());
    store.create_session_root().await.unwrap();
    store.create_session_root().await.unwrap();
    assert!(store.session_root_exists());
}

#[tokio::test]
async fn test_session_save_load_delete_cycle() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.create().await.unwrap();
    assert!(session.header().await.command_args.is_none());
    assert_eq!(session.id().as_str().len(), SESSION_ID_LEN);

    manager.save(&session).await.unwrap();
    manager.close(&session).await.unwrap();

    let saved = manager.store().load(session.id()).await.unwrap();
    assert_eq!(saved.id(), session.id());
    assert_eq!(saved.header().await, session.header().await);

    manager.delete(&saved).await.unwrap();
    let result = manager.store().load(session.id()).await;
    assert!(matches!(result, Err(SessionError::NotFound { .. })));
}

#[tokio::test]
async fn test_save_load_round_trip_preserves_header() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager
        .begin(
            "cp",
            vec!["--recursive".to_string(), "src".to_string(), "dst".to_string()],
        )
        .await
        .unwrap();
    manager
        .checkpoint(
            &session,
            ProgressDelta::Planned {
                objects: 3,
                bytes: 30,
            },
        )
        .await;
    manager.checkpoint(&session, completed("src/a", 10)).await;
    manager
        .checkpoint(
            &session,
            ProgressDelta::Note {
                key: "marker".to_string(),
                value: serde_json::json!({"offset": 7}),
            },
        )
        .await;
    manager.save(&session).await.unwrap();

    let loaded = manager.store().load(session.id()).await.unwrap();
    let header = loaded.header().await;
    assert_eq!(header, session.header().await);
    assert_eq!(header.state, SessionState::Resumable);
    assert_eq!(header.command_line(), "cp --recursive src dst");
    assert!(header.saved_at.is_some());
}

#[tokio::test]
async fn test_resume_without_save_is_not_found() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.create().await.unwrap();
    manager.close(&session).await.unwrap();

    let result = manager.resume(session.id().as_str()).await;
    assert!(matches!(result, Err(SessionError::NotFound { .. })));
    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_of_open_unsaved_session_is_not_found() {
    let root = create_test_root();
    let manager = SessionManager::with_file_locks(root.path().join("session"));

    // The creator still holds the lock, but nothing was ever saved
    let session = manager.create().await.unwrap();
    let result = manager.resume(session.id().as_str()).await;
    assert!(matches!(result, Err(SessionError::NotFound { .. })));

    // Once saved, the held lock is what stops a second writer
    manager.save(&session).await.unwrap();
    let result = manager.resume(session.id().as_str()).await;
    assert!(matches!(result, Err(SessionError::SessionBusy { .. })));

    manager.close(&session).await.unwrap();
}

#[tokio::test]
async fn test_resume_unknown_and_malformed_ids() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    for id in ["invalid-id", "invalid", "AbCdEfGh"] {
        let result = manager.resume(id).await;
        assert!(
            matches!(result, Err(SessionError::NotFound { .. })),
            "{} should not be found",
            id
        );
    }
}

#[tokio::test]
async fn test_resume_restores_last_saved_progress() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager
        .begin("cp", vec!["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    manager.checkpoint(&session, completed("one", 1)).await;
    manager.save(&session).await.unwrap();
    let saved_progress = session.progress().await;

    // Newer progress that never reaches disk
    manager.checkpoint(&session, completed("two", 2)).await;
    manager.close(&session).await.unwrap();

    let resumed = manager.resume(session.id().as_str()).await.unwrap();
    let progress = resumed.progress().await;
    assert_eq!(progress, saved_progress);
    assert!(progress.is_completed("one"));
    assert!(!progress.is_completed("two"));
    assert_eq!(
        resumed.command_args().await,
        Some(CommandArgs::new("cp", vec!["a".to_string(), "b".to_string()]))
    );
}

#[tokio::test]
async fn test_resume_of_locked_session_is_busy() {
    let root = create_test_root();
    let (manager, locker) = memory_manager(&root);

    let session = manager.begin("cp", Vec::new()).await.unwrap();
    manager.save(&session).await.unwrap();
    assert!(locker.is_locked(session.id()));

    let result = manager.resume(session.id().as_str()).await;
    assert!(matches!(result, Err(SessionError::SessionBusy { .. })));

    manager.close(&session).await.unwrap();
    assert!(!locker.is_locked(session.id()));
    let resumed = manager.resume(session.id().as_str()).await.unwrap();
    assert!(resumed.is_locked());
}

#[tokio::test]
async fn test_file_locks_guard_sessions_across_managers() {
    let root = create_test_root();
    let first = SessionManager::with_file_locks(root.path().join("session"));
    let second = SessionManager::with_file_locks(root.path().join("session"));

    let session = first.begin("cp", Vec::new()).await.unwrap();
    first.save(&session).await.unwrap();

    let result = second.resume(session.id().as_str()).await;
    assert!(matches!(result, Err(SessionError::SessionBusy { .. })));

    first.close(&session).await.unwrap();
    assert!(second.resume(session.id().as_str()).await.is_ok());
}

#[tokio::test]
async fn test_close_is_idempotent_and_keeps_saved_data() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.begin("mirror", Vec::new()).await.unwrap();
    manager.save(&session).await.unwrap();

    manager.close(&session).await.unwrap();
    manager.close(&session).await.unwrap();
    assert!(!session.is_locked());
    assert_eq!(manager.list().await.unwrap(), vec![session.id().clone()]);
}

#[tokio::test]
async fn test_save_after_delete_fails() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.begin("cp", Vec::new()).await.unwrap();
    manager.save(&session).await.unwrap();
    manager.delete(&session).await.unwrap();

    assert!(session.is_deleted());
    assert!(matches!(
        manager.save(&session).await,
        Err(SessionError::NotFound { .. })
    ));
    // Deleting twice is fine
    manager.store().delete(session.id()).await.unwrap();
}

#[tokio::test]
async fn test_clear_all_on_empty_root() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    assert!(manager.clear(ClearTarget::All).await.unwrap().is_empty());
    assert!(manager.clear(ClearTarget::All).await.unwrap().is_empty());
    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_one_and_all() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let session = manager.begin("cp", Vec::new()).await.unwrap();
        manager.save(&session).await.unwrap();
        manager.close(&session).await.unwrap();
        ids.push(session.id().clone());
    }
    ids.sort();
    assert_eq!(manager.list().await.unwrap(), ids);

    let cleared = manager
        .clear(ClearTarget::One(ids[0].to_string()))
        .await
        .unwrap();
    assert_eq!(cleared, vec![ids[0].clone()]);

    let result = manager.clear(ClearTarget::One(ids[0].to_string())).await;
    assert!(matches!(result, Err(SessionError::NotFound { .. })));

    let cleared = manager.clear(ClearTarget::All).await.unwrap();
    assert_eq!(cleared, ids[1..].to_vec());
    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_skips_busy_sessions() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let busy = manager.begin("cp", Vec::new()).await.unwrap();
    manager.save(&busy).await.unwrap();

    let result = manager.clear(ClearTarget::One(busy.id().to_string())).await;
    assert!(matches!(result, Err(SessionError::SessionBusy { .. })));

    let cleared = manager.clear(ClearTarget::All).await.unwrap();
    assert!(cleared.is_empty());
    assert_eq!(manager.list().await.unwrap(), vec![busy.id().clone()]);
}

#[tokio::test]
async fn test_clear_target_parsing() {
    assert_eq!(ClearTarget::parse("all"), ClearTarget::All);
    assert_eq!(
        ClearTarget::parse("AbCdEfGh"),
        ClearTarget::One("AbCdEfGh".to_string())
    );
}

#[tokio::test]
async fn test_load_corrupt_header() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.begin("cp", Vec::new()).await.unwrap();
    manager.save(&session).await.unwrap();
    std::fs::write(manager.store().header_path(session.id()), b"{\"version\": 1, \"creat").unwrap();

    let result = manager.store().load(session.id()).await;
    assert!(matches!(result, Err(SessionError::CorruptFormat { .. })));
}

#[tokio::test]
async fn test_load_newer_format_is_incompatible() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.begin("cp", Vec::new()).await.unwrap();
    manager.save(&session).await.unwrap();

    let path = manager.store().header_path(session.id());
    let mut value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    value["version"] = serde_json::json!(SESSION_FORMAT_VERSION + 1);
    value["shape_from_the_future"] = serde_json::json!(true);
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    match manager.store().load(session.id()).await {
        Err(SessionError::IncompatibleVersion {
            found, supported, ..
        }) => {
            assert_eq!(found, SESSION_FORMAT_VERSION + 1);
            assert_eq!(supported, SESSION_FORMAT_VERSION);
        }
        other => panic!("expected IncompatibleVersion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_save_leaves_no_temp_files() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.begin("cp", Vec::new()).await.unwrap();
    for i in 0..5 {
        manager
            .checkpoint(&session, completed(&format!("obj{}", i), i))
            .await;
        manager.save(&session).await.unwrap();
    }

    let names: Vec<String> = std::fs::read_dir(session.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&env::session::HEADER_FILE_NAME.to_string()));
    assert!(
        !names
            .iter()
            .any(|n| n.starts_with(env::session::TEMP_FILE_PREFIX))
    );

    let loaded = manager.store().load(session.id()).await.unwrap();
    assert_eq!(loaded.progress().await.transferred_objects, 5);
}

#[tokio::test]
async fn test_list_ignores_foreign_entries() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);

    let session = manager.begin("cp", Vec::new()).await.unwrap();
    manager.save(&session).await.unwrap();

    let session_root = manager.store().root().to_path_buf();
    std::fs::create_dir(session_root.join("not-a-session")).unwrap();
    std::fs::write(session_root.join("README"), b"x").unwrap();

    assert_eq!(manager.list().await.unwrap(), vec![session.id().clone()]);
}

#[tokio::test]
async fn test_concurrent_checkpoints_are_all_recorded() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);
    let session = manager.begin("cp", Vec::new()).await.unwrap();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                session
                    .checkpoint(completed(&format!("w{}-{}", worker, i), 1))
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let progress = session.progress().await;
    assert_eq!(progress.transferred_objects, 200);
    assert_eq!(progress.completed.len(), 200);
}

#[tokio::test]
async fn test_interrupt_performs_final_save() {
    let root = create_test_root();
    let (manager, locker) = memory_manager(&root);
    let session = manager.begin("cp", Vec::new()).await.unwrap();

    manager.checkpoint(&session, completed("first", 1)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = manager
        .run_interruptible(&session, std::future::pending::<()>(), cancel)
        .await;

    match outcome {
        RunOutcome::Interrupted { saved } => assert!(saved.is_ok()),
        RunOutcome::Completed(_) => panic!("operation should have been interrupted"),
    }
    assert!(!locker.is_locked(session.id()));

    let resumed = manager.resume(session.id().as_str()).await.unwrap();
    assert!(resumed.progress().await.is_completed("first"));
}

#[tokio::test]
async fn test_interrupt_reports_failed_save() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);
    let session = manager.begin("cp", Vec::new()).await.unwrap();
    manager.delete(&session).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = manager
        .run_interruptible(&session, std::future::pending::<()>(), cancel)
        .await;

    assert!(matches!(
        outcome,
        RunOutcome::Interrupted { saved: Err(_) }
    ));
}

#[tokio::test]
async fn test_uninterrupted_operation_completes() {
    let root = create_test_root();
    let (manager, _) = memory_manager(&root);
    let session = manager.begin("cp", Vec::new()).await.unwrap();

    let outcome = manager
        .run_interruptible(&session, async { 42 }, CancellationToken::new())
        .await;
    assert!(matches!(outcome, RunOutcome::Completed(42)));
    assert!(session.is_locked());
}

/// Locker that refuses every request
#[derive(Debug)]
struct RefusingLocker;

impl SessionLocker for RefusingLocker {
    fn try_lock(
        &self,
        id: &SessionId,
        _session_root: &std::path::Path,
    ) -> Result<SessionLease, SessionError> {
        Err(SessionError::SessionBusy { id: id.to_string() })
    }
}

#[tokio::test]
async fn test_create_removes_directory_when_lock_fails() {
    let root = create_test_root();
    let manager = SessionManager::new(
        SessionStore::new(root.path().join("session")),
        Arc::new(RefusingLocker),
    );

    let result = manager.create().await;
    assert!(matches!(result, Err(SessionError::SessionBusy { .. })));
    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_all_with_unreadable_root_succeeds() {
    let root = create_test_root();
    // A file where the session root directory should be
    let session_root = root.path().join("session");
    std::fs::write(&session_root, b"not a directory").unwrap();
    let manager = SessionManager::new(
        SessionStore::new(session_root.clone()),
        Arc::new(MemoryLocker::new()),
    );

    let cleared = manager.clear(ClearTarget::All).await.unwrap();
    assert!(cleared.is_empty());
}
