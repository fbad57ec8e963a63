//! `session list | resume | clear`

use crate::commands::{Invoke, SessionRun, run_session};
use crate::session::{
    ClearTarget, SessionError, SessionHeader, SessionId, SessionManager, SessionState,
};
use crate::storage::human_size;
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Hint printed whenever a session is left behind for later
pub fn resume_hint(id: &SessionId) -> String {
    format!("To continue, run: objsync session resume {}", id)
}

fn summarize(id: &SessionId, header: &SessionHeader) -> String {
    let saved = header
        .saved_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never saved".to_string());
    let state = match header.state {
        SessionState::Fresh => "fresh",
        SessionState::Resumable => "resumable",
    };
    let progress = &header.progress;
    format!(
        "{} [{}] {} ({}, {}/{} objects, {} of {}, {:.0}%)\n    {}",
        id,
        saved,
        state,
        header.root_path.display(),
        progress.transferred_objects,
        progress.total_objects,
        human_size(progress.transferred_bytes),
        human_size(progress.total_bytes),
        progress.completion_percentage(),
        header.command_line()
    )
}

/// Print every session with its command and progress.
///
/// Unreadable sessions are still listed, with the reason they can't be
/// loaded. Returns the number of sessions found.
pub async fn list_sessions(
    manager: &SessionManager,
    out: &mut impl Write,
) -> Result<usize, SessionError> {
    let ids = manager.list().await?;
    if ids.is_empty() {
        writeln!(out, "No saved sessions.").map_err(write_error)?;
        return Ok(0);
    }

    for id in &ids {
        let line = match manager.inspect(id).await {
            Ok(session) => summarize(id, &session.header().await),
            Err(e) => format!("{} <unreadable: {}>", id, e),
        };
        writeln!(out, "{}", line).map_err(write_error)?;
    }
    Ok(ids.len())
}

fn write_error(e: io::Error) -> SessionError {
    SessionError::io("Failed to write session listing", e)
}

/// Delete one session or `all`, printing what was removed
pub async fn clear_sessions(
    manager: &SessionManager,
    target: &str,
    out: &mut impl Write,
) -> Result<Vec<SessionId>, SessionError> {
    let target = ClearTarget::parse(target);
    let cleared = manager.clear(target.clone()).await?;

    match target {
        ClearTarget::One(_) => {
            for id in &cleared {
                writeln!(out, "Session {} cleared.", id).map_err(write_error)?;
            }
        }
        ClearTarget::All => {
            writeln!(out, "Cleared {} sessions.", cleared.len()).map_err(write_error)?;
        }
    }
    Ok(cleared)
}

/// Reload a session and run its command to completion.
///
/// Lookup failures come back as `Err` before anything runs; everything after
/// that is described by the returned [`SessionRun`].
pub async fn resume_session(
    manager: &SessionManager,
    id: &str,
    invoker: &dyn Invoke,
    cancel: CancellationToken,
) -> Result<(SessionId, SessionRun), SessionError> {
    let session = manager.resume(id).await?;
    let header = session.header().await;
    if header.command_args.is_none() {
        warn!("Session {} has no stored command", session.id());
    }
    println!(
        "Resuming session {}: {} ({} objects already done)",
        session.id(),
        header.command_line(),
        header.progress.transferred_objects
    );

    let run = run_session(manager, &session, invoker, cancel).await;
    Ok((session.id().clone(), run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryLocker, ProgressDelta, Session, SessionStore};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Succeed;

    #[async_trait]
    impl Invoke for Succeed {
        async fn invoke(&self, _manager: &SessionManager, session: &Session) -> Result<()> {
            assert!(session.is_completed("src/a").await);
            Ok(())
        }
    }

    fn manager(root: &TempDir) -> SessionManager {
        SessionManager::new(
            SessionStore::new(root.path().to_path_buf()),
            Arc::new(MemoryLocker::new()),
        )
    }

    async fn saved_session(manager: &SessionManager) -> SessionId {
        let session = manager
            .begin("cp", vec!["--".to_string(), "src".to_string(), "dst".to_string()])
            .await
            .unwrap();
        session
            .checkpoint(ProgressDelta::Planned {
                objects: 2,
                bytes: 2048,
            })
            .await;
        session
            .checkpoint(ProgressDelta::Completed {
                source: "src/a".to_string(),
                target: "dst/a".to_string(),
                bytes: 1024,
            })
            .await;
        manager.save(&session).await.unwrap();
        manager.close(&session).await.unwrap();
        session.id().clone()
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_list_with_no_sessions() {
        let root = TempDir::new().unwrap();
        let mut out = Vec::new();
        let count = list_sessions(&manager(&root), &mut out).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(output(out), "No saved sessions.\n");
    }

    #[tokio::test]
    async fn test_list_shows_command_and_progress() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        let id = saved_session(&manager).await;

        let mut out = Vec::new();
        assert_eq!(list_sessions(&manager, &mut out).await.unwrap(), 1);
        let text = output(out);
        assert!(text.starts_with(id.as_str()));
        assert!(text.contains("resumable"));
        assert!(text.contains("1/2 objects"));
        assert!(text.contains("1.0KiB of 2.0KiB"));
        assert!(text.contains("cp -- src dst"));
    }

    #[tokio::test]
    async fn test_list_reports_unreadable_sessions() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        let id = saved_session(&manager).await;
        std::fs::write(manager.store().header_path(&id), b"{broken").unwrap();

        let mut out = Vec::new();
        list_sessions(&manager, &mut out).await.unwrap();
        assert!(output(out).contains("<unreadable:"));
    }

    #[tokio::test]
    async fn test_clear_one_and_all() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        let first = saved_session(&manager).await;
        saved_session(&manager).await;

        let mut out = Vec::new();
        let cleared = clear_sessions(&manager, first.as_str(), &mut out)
            .await
            .unwrap();
        assert_eq!(cleared, vec![first.clone()]);
        assert!(output(out).contains(&format!("Session {} cleared.", first)));

        let result = clear_sessions(&manager, first.as_str(), &mut Vec::new()).await;
        assert!(matches!(result, Err(SessionError::NotFound { .. })));

        let mut out = Vec::new();
        clear_sessions(&manager, "all", &mut out).await.unwrap();
        assert_eq!(output(out), "Cleared 1 sessions.\n");
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_runs_and_removes_session() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        let id = saved_session(&manager).await;

        let (resumed, run) =
            resume_session(&manager, id.as_str(), &Succeed, CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(resumed, id);
        assert!(matches!(run, SessionRun::Finished));
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_unknown_session() {
        let root = TempDir::new().unwrap();
        let result = resume_session(
            &manager(&root),
            "invalid-id",
            &Succeed,
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(SessionError::NotFound { .. })));
    }
}
