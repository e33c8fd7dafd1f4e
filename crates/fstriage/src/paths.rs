//! Path resolution for fstriage
//!
//! Home directory priority:
//! 1) FSTRIAGE_HOME
//! 2) HOME/USERPROFILE joined with `.fstriage`
//! 3) ./.fstriage

use crate::error::{Result, TriageError};
use std::io;
use std::path::{Component, Path, PathBuf};

pub const HOME_ENV: &str = "FSTRIAGE_HOME";

/// Resolve the fstriage home directory.
pub fn fstriage_home() -> PathBuf {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return PathBuf::from(override_path);
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".fstriage");
    }
    PathBuf::from(".").join(".fstriage")
}

/// Default inventory store: <home>/inventory.sqlite3
pub fn default_db_path() -> PathBuf {
    fstriage_home().join("inventory.sqlite3")
}

/// Default config file: <home>/config.toml
pub fn default_config_path() -> PathBuf {
    fstriage_home().join("config.toml")
}

/// Log directory: <home>/logs
pub fn logs_dir() -> PathBuf {
    fstriage_home().join("logs")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

/// Make `path` absolute without touching the filesystem.
///
/// Relative paths are joined onto the current directory; `.` segments are
/// dropped and `..` pops the previous segment. Symlinks are not resolved, so
/// the result names the same entry the user typed.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root/prefix
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check that a scan target exists, is a directory and can be listed.
pub fn validate_target(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(TriageError::InvalidTarget(format!(
            "Path not found: {}",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(TriageError::InvalidTarget(format!(
            "Not a directory: {}",
            path.display()
        )));
    }
    std::fs::read_dir(path).map_err(|e| TriageError::io(path, e))?;
    Ok(())
}
