//! Environment constants and path utilities for objsync.
//!
//! This module centralizes the directory and file names used on disk, so the
//! session layout and the configuration hierarchy are defined in one place.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory in the user's home)
pub const APP_DIR_NAME: &str = ".objsync";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "objsync.toml";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "OBJSYNC_CONFIG_DIR";

/// Session-related directory and file names
pub mod session {
    /// Sessions directory name within the configuration directory
    pub const SESSIONS_DIR_NAME: &str = "session";

    /// Session header file name
    pub const HEADER_FILE_NAME: &str = "session.json";

    /// Advisory lock file name
    pub const LOCK_FILE_NAME: &str = "session.lock";

    /// Prefix of in-flight header writes, renamed into place on commit
    pub const TEMP_FILE_PREFIX: &str = ".session.json.";

    /// Suffix of in-flight header writes
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";
}

/// Storage-related names
pub mod storage {
    /// Suffix of partially written objects
    pub const PART_SUFFIX: &str = ".part";
}

/// Build the application directory path from a home directory
pub fn app_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(APP_DIR_NAME)
}

/// Build the configuration file path inside a configuration directory
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Build the local configuration file path in the current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Build the session root path inside a configuration directory
pub fn session_root_path(config_dir: &Path) -> PathBuf {
    config_dir.join(session::SESSIONS_DIR_NAME)
}

/// Build a specific session directory path
pub fn session_dir_path(session_root: &Path, session_id: &str) -> PathBuf {
    session_root.join(session_id)
}

/// Build the session header file path
pub fn session_header_file_path(session_root: &Path, session_id: &str) -> PathBuf {
    session_dir_path(session_root, session_id).join(session::HEADER_FILE_NAME)
}

/// Build the session lock file path
pub fn session_lock_file_path(session_root: &Path, session_id: &str) -> PathBuf {
    session_dir_path(session_root, session_id).join(session::LOCK_FILE_NAME)
}

/// Build a unique temporary header path inside the session directory
pub fn session_temp_file_path(session_root: &Path, session_id: &str, nonce: &str) -> PathBuf {
    session_dir_path(session_root, session_id).join(format!(
        "{}{}{}",
        session::TEMP_FILE_PREFIX,
        nonce,
        session::TEMP_FILE_SUFFIX
    ))
}

/// Build the path an object is written to before it is renamed into place
pub fn part_file_path(object_path: &Path) -> PathBuf {
    let mut name = object_path.as_os_str().to_os_string();
    name.push(storage::PART_SUFFIX);
    PathBuf::from(name)
}
