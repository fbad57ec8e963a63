//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `ls`: List objects and folders
//! - `cp`: Copy objects, resumable through sessions
//! - `mirror`: Mirror a folder, resumable through sessions
//! - `session list|resume|clear`: Manage interrupted operations
//! - `config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "objsync")]
#[command(author = "Objsync Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Object storage client with resumable bulk copy and mirror")]
#[command(long_about = None)]
pub struct Args {
    /// Configuration directory (default: ~/.objsync)
    #[arg(long = "config-dir", global = true, env = "OBJSYNC_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// Behave like the operating system tool, e.g. `ls` without arguments lists `.`
    #[arg(long = "mimic", global = true)]
    pub mimic: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List files and folders
    Ls(ListArgs),
    /// Copy one or more objects to a target
    Cp(CopyArgs),
    /// Mirror a folder to a target folder
    Mirror(MirrorArgs),
    /// Manage interrupted copy and mirror sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Show configuration discovery information
    Config,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ListArgs {
    /// List incomplete uploads of objects
    #[arg(short = 'I', long = "incomplete")]
    pub incomplete: bool,

    /// Targets to list; a trailing `...` lists recursively
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct CopyArgs {
    /// Copy folders recursively
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,

    /// Sources followed by the target
    #[arg(value_name = "SOURCE... TARGET", num_args = 2.., required = true)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct MirrorArgs {
    /// Folder to mirror
    pub source: String,
    /// Folder to mirror into
    pub target: String,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// List all saved sessions
    List,
    /// Resume an interrupted session
    Resume {
        /// Session ID
        id: String,
    },
    /// Delete a session, or `all` sessions
    Clear {
        /// Session ID or `all`
        target: String,
    },
}

/// Standalone parsers used to replay the argument lists stored in sessions
#[derive(Debug, Parser)]
#[command(name = "cp")]
struct CopyReplay {
    #[command(flatten)]
    args: CopyArgs,
}

#[derive(Debug, Parser)]
#[command(name = "mirror")]
struct MirrorReplay {
    #[command(flatten)]
    args: MirrorArgs,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }
}

impl CopyArgs {
    pub const COMMAND: &'static str = "cp";

    pub fn sources(&self) -> &[String] {
        &self.paths[..self.paths.len().saturating_sub(1)]
    }

    pub fn target(&self) -> &str {
        self.paths.last().map(String::as_str).unwrap_or_default()
    }

    /// Canonical argument list, as stored in the session
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if self.recursive {
            argv.push("--recursive".to_string());
        }
        argv.push("--".to_string());
        argv.extend(self.paths.iter().cloned());
        argv
    }

    pub fn from_argv(argv: &[String]) -> Result<Self, clap::Error> {
        let replay = CopyReplay::try_parse_from(
            std::iter::once(Self::COMMAND.to_string()).chain(argv.iter().cloned()),
        )?;
        Ok(replay.args)
    }
}

impl MirrorArgs {
    pub const COMMAND: &'static str = "mirror";

    pub fn to_argv(&self) -> Vec<String> {
        vec!["--".to_string(), self.source.clone(), self.target.clone()]
    }

    pub fn from_argv(argv: &[String]) -> Result<Self, clap::Error> {
        let replay = MirrorReplay::try_parse_from(
            std::iter::once(Self::COMMAND.to_string()).chain(argv.iter().cloned()),
        )?;
        Ok(replay.args)
    }
}
