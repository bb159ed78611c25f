//! Default paths for studyhall components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/studyhalld/studyhalld.sock` or `/tmp/studyhalld-$USER/studyhalld.sock`
//! - Data: `$XDG_DATA_HOME/studyhalld` or `~/.local/share/studyhalld`
//! - Config: `$XDG_CONFIG_HOME/studyhall/config.toml` or `~/.config/studyhall/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const STUDYHALL_SOCKET_ENV: &str = "STUDYHALL_SOCKET";

/// Environment variable for overriding the data directory
pub const STUDYHALL_DATA_DIR_ENV: &str = "STUDYHALL_DATA_DIR";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "studyhalld.sock";

/// Application subdirectory name
const APP_DIR: &str = "studyhalld";

/// Config subdirectory name
const CONFIG_DIR: &str = "studyhall";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$STUDYHALL_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/studyhalld/studyhalld.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/studyhalld-$USER/studyhalld.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(STUDYHALL_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the STUDYHALL_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$STUDYHALL_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/studyhalld` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/studyhalld` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(STUDYHALL_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the STUDYHALL_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(CONFIG_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(CONFIG_DIR).join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_contains_app_dir() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("studyhalld"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn data_dir_contains_app_dir() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("studyhalld"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }
}
