//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit directory: `--config-dir` or `OBJSYNC_CONFIG_DIR`
//! 2. Current directory: `./objsync.toml`
//! 3. User config: `~/.objsync/config.toml`
//! 4. Built-in defaults

use crate::env;
use crate::session::{FileLocker, NoopLocker, SessionLocker, SessionManager, SessionStore};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine home directory, set {}", env::CONFIG_DIR_ENV)]
    NoHomeDir,

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// User-tunable settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where sessions live; defaults to `<config dir>/session`
    pub session_root: Option<PathBuf>,
    /// Completed objects between periodic session saves
    pub save_every: u32,
    /// Concurrent transfer workers
    pub parallel: usize,
    /// Guard sessions with advisory file locks
    pub lock_sessions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_root: None,
            save_every: 16,
            parallel: 4,
            lock_sessions: true,
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel == 0 {
            return Err(ConfigError::Invalid("parallel must be at least 1".to_string()));
        }
        if self.save_every == 0 {
            return Err(ConfigError::Invalid("save_every must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Configuration after discovery, with every path resolved
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub session_root: PathBuf,
    pub config: Config,
}

impl ResolvedConfig {
    /// Session store handle for this configuration
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.session_root.clone())
    }

    /// Session manager with the configured locking policy
    pub fn session_manager(&self) -> SessionManager {
        let locker: Arc<dyn SessionLocker> = if self.config.lock_sessions {
            Arc::new(FileLocker)
        } else {
            Arc::new(NoopLocker)
        };
        SessionManager::new(self.session_store(), locker)
    }
}

/// Inputs to discovery, captured up front so it can run against any paths
#[derive(Debug, Clone, Default)]
pub struct DiscoveryEnv {
    pub config_dir: Option<PathBuf>,
    pub current_dir: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
}

impl DiscoveryEnv {
    /// Capture the process environment.
    ///
    /// `config_dir` comes from the CLI, which also reads `OBJSYNC_CONFIG_DIR`.
    pub fn from_process(config_dir: Option<PathBuf>) -> Self {
        Self {
            config_dir,
            current_dir: std_env::current_dir().ok(),
            home_dir: Self::get_home_dir(),
        }
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover(discovery: &DiscoveryEnv) -> Result<ResolvedConfig, ConfigError> {
        let config_dir = match (&discovery.config_dir, &discovery.home_dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(home)) => env::app_dir_path(home),
            (None, None) => return Err(ConfigError::NoHomeDir),
        };

        let config_file = Self::find_config_file(discovery, &config_dir);
        let config = match &config_file {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                Config::from_toml_file(path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Config::default()
            }
        };

        let session_root = match &config.session_root {
            Some(root) if root.is_relative() => config_dir.join(root),
            Some(root) => root.clone(),
            None => env::session_root_path(&config_dir),
        };

        Ok(ResolvedConfig {
            config_dir,
            config_file,
            session_root,
            config,
        })
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file(discovery: &DiscoveryEnv, config_dir: &Path) -> Option<PathBuf> {
        for candidate in Self::get_config_candidates(discovery, config_dir) {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates(discovery: &DiscoveryEnv, config_dir: &Path) -> Vec<PathBuf> {
        // An explicit directory is authoritative
        if discovery.config_dir.is_some() {
            return vec![env::config_file_path(config_dir)];
        }

        let mut candidates = Vec::new();
        if let Some(current_dir) = &discovery.current_dir {
            candidates.push(env::local_config_file_path(current_dir));
        }
        candidates.push(env::config_file_path(config_dir));
        candidates
    }

    /// Print where configuration and sessions are read from
    pub fn show_discovery_info(resolved: &ResolvedConfig) {
        println!("Config directory: {}", resolved.config_dir.display());
        match &resolved.config_file {
            Some(path) => println!("Config file:      {}", path.display()),
            None => println!("Config file:      <none, using defaults>"),
        }
        println!("Session root:     {}", resolved.session_root.display());
        println!("Parallel:         {}", resolved.config.parallel);
        println!("Save every:       {} objects", resolved.config.save_every);
        println!(
            "Session locks:    {}",
            if resolved.config.lock_sessions {
                "on"
            } else {
                "off"
            }
        );
    }
}
