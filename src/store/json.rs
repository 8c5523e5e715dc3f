//! File-backed dev store.
//!
//! `rewarmd run` without an embedding application needs a working backend;
//! this one keeps the whole store state in a single JSON document with
//! atomic rewrites. Production deployments implement [`Store`] over the
//! real relational backend instead.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{ChainCandidate, ParentRow, StaleEntry, Store, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct JsonState {
    values: BTreeMap<String, String>,
    stale_queue: Vec<StaleEntry>,
    old_cache: Vec<OldCacheRow>,
    product_candidates: Vec<ChainCandidate>,
    variant_candidates: Vec<ChainCandidate>,
    parents: BTreeMap<i64, ParentRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OldCacheRow {
    slug: String,
    warmed_at_ms: u64,
}

#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    state: Mutex<JsonState>,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::MalformedValue {
                    key: path.display().to_string(),
                    reason: e.to_string(),
                })?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => JsonState::default(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut JsonState) -> T,
        persist: bool,
    ) -> Result<T, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("dev store mutex poisoned".to_string()))?;
        let out = f(&mut state);
        if persist {
            self.persist(&state)?;
        }
        Ok(out)
    }

    fn persist(&self, state: &JsonState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let temp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(temp.as_file(), state).map_err(|e| StoreError::MalformedValue {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Store for JsonStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_state(|s| s.values.get(key).cloned(), false)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_state(
            |s| {
                s.values.insert(key.to_string(), value.to_string());
            },
            true,
        )
    }

    fn clear_value(&self, key: &str) -> Result<(), StoreError> {
        self.with_state(
            |s| {
                s.values.remove(key);
            },
            true,
        )
    }

    fn stale_entries(&self, limit: usize) -> Result<Vec<StaleEntry>, StoreError> {
        self.with_state(|s| s.stale_queue.iter().take(limit).cloned().collect(), false)
    }

    fn remove_stale_entry(&self, slug: &str, instance_id: &str) -> Result<(), StoreError> {
        self.with_state(
            |s| {
                if let Some(pos) = s
                    .stale_queue
                    .iter()
                    .position(|e| e.slug == slug && e.instance_id == instance_id)
                {
                    s.stale_queue.remove(pos);
                }
            },
            true,
        )
    }

    fn old_cache_slugs(&self, max_age: Duration, limit: usize) -> Result<Vec<String>, StoreError> {
        let cutoff = now_ms().saturating_sub(max_age.as_millis() as u64);
        self.with_state(
            |s| {
                s.old_cache
                    .iter()
                    .filter(|row| row.warmed_at_ms < cutoff)
                    .take(limit)
                    .map(|row| row.slug.clone())
                    .collect()
            },
            false,
        )
    }

    fn products_with_stale_brand(&self, limit: usize) -> Result<Vec<ChainCandidate>, StoreError> {
        self.with_state(
            |s| s.product_candidates.iter().take(limit).cloned().collect(),
            false,
        )
    }

    fn variants_with_stale_chain(&self, limit: usize) -> Result<Vec<ChainCandidate>, StoreError> {
        self.with_state(
            |s| s.variant_candidates.iter().take(limit).cloned().collect(),
            false,
        )
    }

    fn parent_row(&self, id: i64) -> Result<Option<ParentRow>, StoreError> {
        self.with_state(|s| s.parents.get(&id).cloned(), false)
    }

    fn set_children_brand(
        &self,
        parent_id: i64,
        brand_id: Option<i64>,
    ) -> Result<u64, StoreError> {
        self.with_state(
            |s| {
                let before = s.product_candidates.len();
                s.product_candidates.retain(|c| c.parent_id != parent_id);
                let _ = brand_id;
                (before - s.product_candidates.len()) as u64
            },
            true,
        )
    }

    fn set_children_chain(
        &self,
        parent_id: i64,
        brand_id: Option<i64>,
        serie_id: Option<i64>,
    ) -> Result<u64, StoreError> {
        self.with_state(
            |s| {
                let before = s.variant_candidates.len();
                s.variant_candidates.retain(|c| c.parent_id != parent_id);
                let _ = (brand_id, serie_id);
                (before - s.variant_candidates.len()) as u64
            },
            true,
        )
    }

    fn dedup_cache(&self) -> Result<u64, StoreError> {
        // The dev store has no duplicate rows to collapse; the operation is
        // honored as an idempotent no-op.
        Ok(0)
    }

    fn dedup_search_index(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}
