//! CLI-specific functionality for objsync
//!
//! This module contains all CLI-related code: argument parsing and
//! configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, Commands, CopyArgs, ListArgs, MirrorArgs, SessionCommand};
pub use config::{Config, ConfigDiscovery, ConfigError, DiscoveryEnv, ResolvedConfig};
