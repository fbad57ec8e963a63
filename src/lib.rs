//! # objsync
//!
//! A command-line client for object storage with resumable bulk operations.
//! Long-running `cp` and `mirror` runs are backed by sessions persisted on
//! disk, so an interrupted run can be listed, resumed or discarded later.
//!
//! ## Architecture Overview
//!
//! - **[`session`]**: Session identity, crash-safe persistence, advisory
//!   locking and the lifecycle manager
//! - **[`storage`]**: Storage client abstraction and the local filesystem backend
//! - **[`commands`]**: `ls`, `cp`, `mirror` and the `session` subcommands
//! - **[`cli`]**: Argument parsing and configuration discovery
//! - **[`env`]**: Path constants and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use objsync::session::{ProgressDelta, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = SessionManager::with_file_locks("/tmp/objsync/session");
//!     let session = manager.begin("cp", vec!["--".into(), "a".into(), "b".into()]).await?;
//!
//!     session
//!         .checkpoint(ProgressDelta::Planned { objects: 1, bytes: 5 })
//!         .await;
//!     manager.save(&session).await?;
//!     manager.close(&session).await?;
//!
//!     let resumed = manager.resume(session.id().as_str()).await?;
//!     println!("Resumed {}", resumed.id());
//!     Ok(())
//! }
//! ```

/// Resumable session engine.
///
/// Identity generation, the on-disk session store with atomic saves, the
/// locking abstraction and the lifecycle manager that ties them together.
pub mod session;

/// Storage client abstraction used by the transfer commands.
pub mod storage;

/// Command implementations and the invocation contract used on resume.
pub mod commands;

/// Environment constants and path utilities.
///
/// Centralizes all hardcoded paths and directory names used throughout
/// the application.
pub mod env;

// CLI module for command-line interface
pub mod cli;

// Re-export main session types
pub use session::{Session, SessionError, SessionId, SessionManager, SessionStore};

// Re-export storage types
pub use storage::{LocalClient, StorageClient, StorageError};

// Re-export command types
pub use commands::{CommandRegistry, Invoke, SessionRun, TransferSettings};
