//! Command implementations and the contract used to replay them.
//!
//! Resumable commands (`cp`, `mirror`) run through [`run_session`], which
//! owns the session for the duration of the operation: it deletes the session
//! on success, saves it on failure and performs the final save on interrupt.

pub mod copy;
pub mod list;
pub mod session;

use crate::cli::{Config, CopyArgs, MirrorArgs};
use crate::session::{RunOutcome, SaveReport, Session, SessionError, SessionManager};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the command stored in a session
#[async_trait]
pub trait Invoke: Send + Sync {
    async fn invoke(&self, manager: &SessionManager, session: &Session) -> Result<()>;
}

/// Transfer knobs taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub parallel: usize,
    pub save_every: u32,
}

impl From<&Config> for TransferSettings {
    fn from(config: &Config) -> Self {
        Self {
            parallel: config.parallel.max(1),
            save_every: config.save_every.max(1),
        }
    }
}

/// Dispatches sessions to the commands that can be resumed
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    settings: TransferSettings,
}

impl CommandRegistry {
    pub fn new(settings: TransferSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Invoke for CommandRegistry {
    async fn invoke(&self, manager: &SessionManager, session: &Session) -> Result<()> {
        let header = session.header().await;
        let command_args = header
            .command_args
            .as_ref()
            .ok_or_else(|| anyhow!("Session {} has no command to run", session.id()))?;

        match command_args.command.as_str() {
            CopyArgs::COMMAND => {
                let args = CopyArgs::from_argv(&command_args.args)
                    .with_context(|| format!("Invalid arguments stored in session {}", session.id()))?;
                copy::run_copy(manager, session, &args, &header.root_path, self.settings).await?;
            }
            MirrorArgs::COMMAND => {
                let args = MirrorArgs::from_argv(&command_args.args)
                    .with_context(|| format!("Invalid arguments stored in session {}", session.id()))?;
                copy::run_mirror(manager, session, &args, &header.root_path, self.settings).await?;
            }
            other => return Err(anyhow!("Command '{}' cannot be resumed", other)),
        }
        Ok(())
    }
}

/// How a session-backed command ended
#[derive(Debug)]
pub enum SessionRun {
    /// Finished; the session was deleted
    Finished,
    /// Failed; `saved` tells whether the session can be resumed
    Failed { error: anyhow::Error, saved: bool },
    Interrupted {
        saved: Result<SaveReport, SessionError>,
    },
}

/// Drive `session` through `invoker` until it completes, fails or is cancelled
pub async fn run_session(
    manager: &SessionManager,
    session: &Session,
    invoker: &dyn Invoke,
    cancel: CancellationToken,
) -> SessionRun {
    let outcome = manager
        .run_interruptible(session, invoker.invoke(manager, session), cancel)
        .await;

    match outcome {
        RunOutcome::Completed(Ok(())) => {
            if let Err(e) = manager.delete(session).await {
                warn!("Finished session {} could not be removed: {}", session.id(), e);
            }
            info!("Session {} finished", session.id());
            SessionRun::Finished
        }
        RunOutcome::Completed(Err(error)) => {
            let saved = match manager.save(session).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Failed to save session {}: {}", session.id(), e);
                    false
                }
            };
            if let Err(e) = manager.close(session).await {
                warn!("Failed to close session {}: {}", session.id(), e);
            }
            SessionRun::Failed { error, saved }
        }
        RunOutcome::Interrupted { saved } => SessionRun::Interrupted { saved },
    }
}

/// Cancellation token fired by Ctrl-C
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}
