use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Header format written by this build
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Persisted description of one resumable operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    /// Working directory of the process that began the session
    pub root_path: PathBuf,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub command_args: Option<CommandArgs>,
    #[serde(default)]
    pub progress: Progress,
}

/// Whether a saved session carries any progress worth resuming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Fresh,
    Resumable,
}

/// The command and argument list that produced a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    pub command: String,
    pub args: Vec<String>,
}

/// Progress of the operation a session backs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub transferred_objects: u64,
    pub transferred_bytes: u64,
    /// Completed sources, keyed by source URL
    pub completed: BTreeMap<String, CompletedTransfer>,
    pub last_completed: Option<String>,
    pub notes: BTreeMap<String, serde_json::Value>,
}

/// A finished source → target transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTransfer {
    pub target: String,
    pub bytes: u64,
}

/// In-memory update to a session's progress record
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressDelta {
    /// Size of the whole transfer set; replaces earlier plans
    Planned { objects: u64, bytes: u64 },
    /// One source finished; repeated reports for the same source are ignored
    Completed {
        source: String,
        target: String,
        bytes: u64,
    },
    Note {
        key: String,
        value: serde_json::Value,
    },
}

impl SessionHeader {
    /// Header of a session that has not been populated by a command yet
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            created_at: Utc::now(),
            saved_at: None,
            root_path,
            state: SessionState::Fresh,
            command_args: None,
            progress: Progress::default(),
        }
    }

    /// One-line description of the stored command
    pub fn command_line(&self) -> String {
        match &self.command_args {
            Some(args) if args.args.is_empty() => args.command.clone(),
            Some(args) => format!("{} {}", args.command, args.args.join(" ")),
            None => "<no command>".to_string(),
        }
    }
}

impl CommandArgs {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl Progress {
    pub fn is_empty(&self) -> bool {
        self.total_objects == 0
            && self.total_bytes == 0
            && self.completed.is_empty()
            && self.notes.is_empty()
    }

    pub fn is_completed(&self, source: &str) -> bool {
        self.completed.contains_key(source)
    }

    /// Merge a delta into the record. Returns false when it changed nothing.
    pub fn apply(&mut self, delta: ProgressDelta) -> bool {
        match delta {
            ProgressDelta::Planned { objects, bytes } => {
                self.total_objects = objects;
                self.total_bytes = bytes;
                true
            }
            ProgressDelta::Completed {
                source,
                target,
                bytes,
            } => {
                if self.completed.contains_key(&source) {
                    return false;
                }
                self.transferred_objects += 1;
                self.transferred_bytes += bytes;
                self.last_completed = Some(source.clone());
                self.completed
                    .insert(source, CompletedTransfer { target, bytes });
                true
            }
            ProgressDelta::Note { key, value } => {
                self.notes.insert(key, value);
                true
            }
        }
    }

    /// Get completion percentage by object count
    pub fn completion_percentage(&self) -> f32 {
        if self.total_objects == 0 {
            0.0
        } else {
            (self.transferred_objects as f32 / self.total_objects as f32) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(source: &str, bytes: u64) -> ProgressDelta {
        ProgressDelta::Completed {
            source: source.to_string(),
            target: format!("dst/{}", source),
            bytes,
        }
    }

    #[test]
    fn test_new_header_has_no_command() {
        let header = SessionHeader::new(PathBuf::from("/work"));
        assert_eq!(header.version, SESSION_FORMAT_VERSION);
        assert!(header.command_args.is_none());
        assert!(header.progress.is_empty());
        assert_eq!(header.state, SessionState::Fresh);
        assert_eq!(header.command_line(), "<no command>");
    }

    #[test]
    fn test_completed_is_idempotent() {
        let mut progress = Progress::default();
        assert!(progress.apply(completed("a", 10)));
        assert!(progress.apply(completed("b", 5)));
        assert!(!progress.apply(completed("a", 10)));

        assert_eq!(progress.transferred_objects, 2);
        assert_eq!(progress.transferred_bytes, 15);
        assert_eq!(progress.last_completed.as_deref(), Some("b"));
        assert!(progress.is_completed("a"));
        assert!(!progress.is_completed("c"));
    }

    #[test]
    fn test_planned_replaces_totals() {
        let mut progress = Progress::default();
        progress.apply(ProgressDelta::Planned {
            objects: 4,
            bytes: 400,
        });
        progress.apply(completed("a", 100));
        assert_eq!(progress.completion_percentage(), 25.0);

        progress.apply(ProgressDelta::Planned {
            objects: 2,
            bytes: 200,
        });
        assert_eq!(progress.total_objects, 2);
        assert_eq!(progress.completion_percentage(), 50.0);
    }

    #[test]
    fn test_header_loads_with_missing_optional_fields() {
        let json = r#"{
            "version": 1,
            "created_at": "2024-05-01T10:00:00Z",
            "root_path": "/work"
        }"#;
        let header: SessionHeader = serde_json::from_str(json).unwrap();
        assert!(header.command_args.is_none());
        assert!(header.saved_at.is_none());
        assert!(header.progress.is_empty());
    }
}
