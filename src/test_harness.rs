//! In-process fakes for exercising the daemon without a real backend.
//!
//! Not part of the public API; shared between unit and integration tests.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::daemon::budget::Budget;
use crate::renderer::{RenderError, Renderer};
use crate::store::{ChainCandidate, ParentRow, StaleEntry, Store, StoreError};

/// Store fake with fully scriptable state and call recording.
///
/// Clones share state, so a test can hand one handle to the scheduler and
/// keep another for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub values: BTreeMap<String, String>,
    pub stale_queue: Vec<StaleEntry>,
    pub old_slugs: Vec<String>,
    pub old_limits_seen: Vec<usize>,
    pub product_candidates: Vec<ChainCandidate>,
    pub variant_candidates: Vec<ChainCandidate>,
    pub parents: BTreeMap<i64, ParentRow>,
    pub parent_fetches: BTreeMap<i64, u64>,
    pub brand_updates: Vec<(i64, Option<i64>)>,
    pub chain_updates: Vec<(i64, Option<i64>, Option<i64>)>,
    pub dedup_cache_calls: u64,
    pub dedup_index_calls: u64,
    /// When set, every `get_value` fails; simulates lost connectivity.
    pub fail_value_reads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store poisoned")
    }

    pub fn push_stale(&self, slug: &str, instance_id: &str, in_cache: bool) {
        self.state().stale_queue.push(StaleEntry {
            slug: slug.to_string(),
            instance_id: instance_id.to_string(),
            in_cache,
        });
    }

    pub fn push_parent(&self, id: i64, brand_id: Option<i64>, serie_id: Option<i64>) {
        self.state().parents.insert(
            id,
            ParentRow {
                id,
                brand_id,
                serie_id,
            },
        );
    }
}

impl Store for MemoryStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let state = self.state();
        if state.fail_value_reads {
            return Err(StoreError::Unavailable("scripted outage".to_string()));
        }
        Ok(state.values.get(key).cloned())
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state().values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear_value(&self, key: &str) -> Result<(), StoreError> {
        self.state().values.remove(key);
        Ok(())
    }

    fn stale_entries(&self, limit: usize) -> Result<Vec<StaleEntry>, StoreError> {
        Ok(self.state().stale_queue.iter().take(limit).cloned().collect())
    }

    fn remove_stale_entry(&self, slug: &str, instance_id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        if let Some(pos) = state
            .stale_queue
            .iter()
            .position(|e| e.slug == slug && e.instance_id == instance_id)
        {
            state.stale_queue.remove(pos);
        }
        Ok(())
    }

    fn old_cache_slugs(&self, _max_age: Duration, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut state = self.state();
        state.old_limits_seen.push(limit);
        Ok(state.old_slugs.iter().take(limit).cloned().collect())
    }

    fn products_with_stale_brand(&self, limit: usize) -> Result<Vec<ChainCandidate>, StoreError> {
        Ok(self
            .state()
            .product_candidates
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn variants_with_stale_chain(&self, limit: usize) -> Result<Vec<ChainCandidate>, StoreError> {
        Ok(self
            .state()
            .variant_candidates
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn parent_row(&self, id: i64) -> Result<Option<ParentRow>, StoreError> {
        let mut state = self.state();
        *state.parent_fetches.entry(id).or_insert(0) += 1;
        Ok(state.parents.get(&id).cloned())
    }

    fn set_children_brand(
        &self,
        parent_id: i64,
        brand_id: Option<i64>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.brand_updates.push((parent_id, brand_id));
        let before = state.product_candidates.len();
        state.product_candidates.retain(|c| c.parent_id != parent_id);
        Ok((before - state.product_candidates.len()) as u64)
    }

    fn set_children_chain(
        &self,
        parent_id: i64,
        brand_id: Option<i64>,
        serie_id: Option<i64>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.chain_updates.push((parent_id, brand_id, serie_id));
        let before = state.variant_candidates.len();
        state.variant_candidates.retain(|c| c.parent_id != parent_id);
        Ok((before - state.variant_candidates.len()) as u64)
    }

    fn dedup_cache(&self) -> Result<u64, StoreError> {
        self.state().dedup_cache_calls += 1;
        Ok(0)
    }

    fn dedup_search_index(&self) -> Result<u64, StoreError> {
        self.state().dedup_index_calls += 1;
        Ok(0)
    }
}

/// Renderer fake recording every call, with per-slug scripted failures.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRenderer {
    inner: Arc<Mutex<RendererState>>,
}

#[derive(Debug, Default)]
struct RendererState {
    warmed: Vec<String>,
    rebuilt: Vec<(String, PathBuf)>,
    fail_slugs: HashSet<String>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_slug(&self, slug: &str) {
        self.inner
            .lock()
            .expect("renderer poisoned")
            .fail_slugs
            .insert(slug.to_string());
    }

    pub fn warmed(&self) -> Vec<String> {
        self.inner.lock().expect("renderer poisoned").warmed.clone()
    }

    pub fn rebuilt(&self) -> Vec<(String, PathBuf)> {
        self.inner.lock().expect("renderer poisoned").rebuilt.clone()
    }
}

impl Renderer for ScriptedRenderer {
    fn warm_element(&self, slug: &str) -> Result<(), RenderError> {
        let mut state = self.inner.lock().expect("renderer poisoned");
        if state.fail_slugs.contains(slug) {
            return Err(RenderError::Element {
                slug: slug.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.warmed.push(slug.to_string());
        Ok(())
    }

    fn rebuild_filter(&self, instance_id: &str, path: &Path) -> Result<(), RenderError> {
        self.inner
            .lock()
            .expect("renderer poisoned")
            .rebuilt
            .push((instance_id.to_string(), path.to_path_buf()));
        Ok(())
    }
}

/// Budget that reports late after a fixed number of checks.
#[derive(Debug)]
pub struct TripBudget {
    checks_left: usize,
}

impl TripBudget {
    pub fn after(checks: usize) -> Self {
        Self {
            checks_left: checks,
        }
    }
}

impl Budget for TripBudget {
    fn running_late(&mut self) -> bool {
        if self.checks_left == 0 {
            return true;
        }
        self.checks_left -= 1;
        false
    }
}

/// Budget that is never late.
#[derive(Debug, Default)]
pub struct NeverLate;

impl Budget for NeverLate {
    fn running_late(&mut self) -> bool {
        false
    }
}

/// Create `<cache_root>/filter/<instance_id>/<name>` with trivial content.
pub fn write_filter_file(cache_root: &Path, instance_id: &str, name: &str) -> PathBuf {
    let dir = cache_root.join("filter").join(instance_id);
    fs::create_dir_all(&dir).expect("create filter dir");
    let path = dir.join(name);
    fs::write(&path, b"{}").expect("write filter file");
    path
}
