//! Contract the daemon consumes from the persistence backend.
//!
//! The relational source of truth lives in the embedding application; the
//! daemon only sees named system values, ordered count-limited candidate
//! queries, bulk update-by-predicate, and two dedup operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod json;

pub use json::JsonStore;

/// An element flagged stale by mutation code elsewhere in the system.
///
/// Queue rows are removed once visited, success or not; re-flagging is the
/// retry mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleEntry {
    pub slug: String,
    pub instance_id: String,
    pub in_cache: bool,
}

/// A child row whose denormalized parent-derived fields have drifted.
///
/// Fields mirror what the backing query happens to return; `brand_id` and
/// `serie_id` are genuinely optional on the source rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCandidate {
    pub id: i64,
    pub parent_id: i64,
    #[serde(default)]
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub serie_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRow {
    pub id: i64,
    #[serde(default)]
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub serie_id: Option<i64>,
}

/// Persistence backend as seen by the daemon.
///
/// Methods take `&self`; implementations are expected to provide their own
/// interior mutability (a connection handle, a mutex around dev-store
/// state). All calls are synchronous and may block.
pub trait Store {
    /// Read a small named system value (heartbeat id, cursor, ...).
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a small named system value.
    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a named system value. Absent keys are not an error.
    fn clear_value(&self, key: &str) -> Result<(), StoreError>;

    /// Up to `limit` queued stale-cache rows, in store order.
    fn stale_entries(&self, limit: usize) -> Result<Vec<StaleEntry>, StoreError>;

    /// Remove one visited stale-queue row.
    fn remove_stale_entry(&self, slug: &str, instance_id: &str) -> Result<(), StoreError>;

    /// Slugs whose cache entry is older than `max_age`, up to `limit`.
    fn old_cache_slugs(&self, max_age: Duration, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Product rows whose cached `brand_id` disagrees with their serie parent.
    fn products_with_stale_brand(&self, limit: usize) -> Result<Vec<ChainCandidate>, StoreError>;

    /// Variant rows whose `brand_id`/`serie_id` disagree with their product
    /// parent.
    fn variants_with_stale_chain(&self, limit: usize) -> Result<Vec<ChainCandidate>, StoreError>;

    /// Fetch one parent row by id. `None` if deleted since the candidate
    /// query ran.
    fn parent_row(&self, id: i64) -> Result<Option<ParentRow>, StoreError>;

    /// Bulk-propagate `brand_id` to every child of `parent_id`. Returns the
    /// number of rows changed.
    fn set_children_brand(&self, parent_id: i64, brand_id: Option<i64>)
    -> Result<u64, StoreError>;

    /// Bulk-propagate `brand_id` and `serie_id` to every child of
    /// `parent_id`. Returns the number of rows changed.
    fn set_children_chain(
        &self,
        parent_id: i64,
        brand_id: Option<i64>,
        serie_id: Option<i64>,
    ) -> Result<u64, StoreError>;

    /// Drop duplicate rendered-cache rows. Idempotent, safe every cycle.
    fn dedup_cache(&self) -> Result<u64, StoreError>;

    /// Drop duplicate search-index rows. Idempotent, safe every cycle.
    fn dedup_search_index(&self) -> Result<u64, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store value {key:?} is malformed: {reason}")]
    MalformedValue { key: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
