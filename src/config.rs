//! Config loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-cycle time budget. Heartbeat staleness window is three times this.
    pub max_cycle_seconds: u64,
    /// Sleep between cycles that finish under budget.
    pub idle_sleep_ms: u64,
    /// Max stale-queue rows fetched per cycle.
    pub stale_batch_limit: usize,
    /// Max chain-repair candidate rows fetched per sub-task per cycle.
    pub chain_batch_limit: usize,
    /// A serialized facet file is due for refresh once older than this.
    pub filter_max_age_secs: u64,
    /// A cache entry is eligible for low-priority re-warm once older than this.
    pub old_cache_max_age_secs: u64,
    /// Per-cycle item quota for the old-cache warmup phase, before the
    /// chain-repair deduction.
    pub old_warmup_quota: usize,
    /// Root of the shared cache directory tree (`filter/<instance>/...`).
    pub cache_root: PathBuf,
    /// Directory holding advisory lock sentinel files.
    pub lock_dir: PathBuf,
    /// Backing file for the dev store (`rewarmd run` without an embedding app).
    pub store_path: PathBuf,
    pub renderer: RendererConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cycle_seconds: 60,
            idle_sleep_ms: 1_000,
            stale_batch_limit: 100,
            chain_batch_limit: 500,
            filter_max_age_secs: 86_400,
            old_cache_max_age_secs: 604_800,
            old_warmup_quota: 60,
            cache_root: paths::default_cache_root(),
            lock_dir: paths::default_lock_dir(),
            store_path: paths::default_store_path(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config {
    pub fn max_cycle(&self) -> Duration {
        Duration::from_secs(self.max_cycle_seconds)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn filter_max_age(&self) -> Duration {
        Duration::from_secs(self.filter_max_age_secs)
    }

    pub fn old_cache_max_age(&self) -> Duration {
        Duration::from_secs(self.old_cache_max_age_secs)
    }
}

/// Hook commands invoked for cache regeneration.
///
/// The rendering engine lives in the embedding application; the daemon only
/// knows how to call it. `{slug}`, `{instance}`, and `{path}` placeholders
/// are substituted before invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub warm_cmd: Option<String>,
    pub filter_cmd: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },
    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("failed to write {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
}

pub fn config_path() -> PathBuf {
    paths::config_dir().join("config.toml")
}

pub fn load() -> Result<Config, ConfigError> {
    let path = config_path();
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load config, falling back to defaults (and writing them out) when the
/// file is missing or malformed. Env overrides are applied either way.
pub fn load_or_init() -> Config {
    let path = config_path();
    let mut cfg = if path.exists() {
        match load_from(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                Config::default()
            }
        }
    } else {
        let cfg = Config::default();
        if let Err(e) = write_config(&path, &cfg) {
            tracing::warn!("failed to write default config: {e}");
        }
        cfg
    };
    apply_env_overrides(&mut cfg);
    cfg
}

pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("REWARMD_MAX_CYCLE_SECONDS")
        && let Ok(secs) = v.trim().parse::<u64>()
        && secs > 0
    {
        cfg.max_cycle_seconds = secs;
    }
    if let Some(v) = lookup("REWARMD_CACHE_ROOT")
        && !v.trim().is_empty()
    {
        cfg.cache_root = PathBuf::from(v);
    }
    if let Some(v) = lookup("REWARMD_LOCK_DIR")
        && !v.trim().is_empty()
    {
        cfg.lock_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("REWARMD_STORE_PATH")
        && !v.trim().is_empty()
    {
        cfg.store_path = PathBuf::from(v);
    }
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    let contents = toml::to_string_pretty(cfg).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_err = |reason: String| ConfigError::Write {
        path: path.to_path_buf(),
        reason,
    };
    let dir = path
        .parent()
        .ok_or_else(|| write_err("path has no parent directory".to_string()))?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
    fs::write(temp.path(), data).map_err(|e| write_err(e.to_string()))?;
    temp.persist(path).map_err(|e| write_err(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.max_cycle_seconds = 30;
        cfg.old_warmup_quota = 20;
        cfg.renderer.warm_cmd = Some("app render {slug}".to_string());
        write_config(&path, &cfg).expect("write config");

        let loaded = load_from(&path).expect("load config");
        assert_eq!(loaded.max_cycle_seconds, 30);
        assert_eq!(loaded.old_warmup_quota, 20);
        assert_eq!(loaded.renderer.warm_cmd.as_deref(), Some("app render {slug}"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply_overrides_from(&mut cfg, |key| match key {
            "REWARMD_MAX_CYCLE_SECONDS" => Some("15".to_string()),
            "REWARMD_CACHE_ROOT" => Some("/srv/cache".to_string()),
            _ => None,
        });
        assert_eq!(cfg.max_cycle_seconds, 15);
        assert_eq!(cfg.cache_root, PathBuf::from("/srv/cache"));
        assert_eq!(cfg.lock_dir, paths::default_lock_dir());
    }

    #[test]
    fn env_overrides_reject_garbage() {
        let mut cfg = Config::default();
        apply_overrides_from(&mut cfg, |key| match key {
            "REWARMD_MAX_CYCLE_SECONDS" => Some("zero".to_string()),
            "REWARMD_LOCK_DIR" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.max_cycle_seconds, 60);
        assert_eq!(cfg.lock_dir, paths::default_lock_dir());
    }
}
