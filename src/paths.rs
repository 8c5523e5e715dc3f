//! Directory resolution for data, cache, and lock files.

use std::path::PathBuf;

/// Base directory for persistent data (dev store, lock sentinels).
///
/// Uses `REWARMD_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/rewarmd` or
/// `~/.local/share/rewarmd`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REWARMD_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("rewarmd")
}

/// Base directory for config.
///
/// Uses `REWARMD_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/rewarmd` or
/// `~/.config/rewarmd`.
pub(crate) fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REWARMD_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("rewarmd")
}

pub(crate) fn default_cache_root() -> PathBuf {
    data_dir().join("cache")
}

pub(crate) fn default_lock_dir() -> PathBuf {
    data_dir().join("locks")
}

pub(crate) fn default_store_path() -> PathBuf {
    data_dir().join("store.json")
}
