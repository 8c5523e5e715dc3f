//! Heartbeat-based singleton leadership.
//!
//! Cooperative, non-fenced election: writing a fresh `daemon.id` IS the
//! election. The loser self-detects at its next cycle boundary and exits
//! voluntarily. An old leader can therefore complete one more unit of work
//! before noticing displacement; acceptable because every phase is
//! idempotent.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use uuid::Uuid;

use crate::store::{Store, StoreError};

pub const KEY_DAEMON_ID: &str = "daemon.id";
pub const KEY_LAST_ALIVE: &str = "daemon.last_alive";

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug)]
pub struct LeaderGuard {
    daemon_id: String,
}

impl LeaderGuard {
    /// Try to become the leader.
    ///
    /// Without `force`, a heartbeat younger than `stale_after` means another
    /// instance is presumably live and the caller should exit. A malformed
    /// stored timestamp counts as stale.
    pub fn acquire(
        store: &dyn Store,
        stale_after: Duration,
        force: bool,
    ) -> Result<Self, LeaderError> {
        let now = now_ms();
        if !force && let Some(raw) = store.get_value(KEY_LAST_ALIVE)? {
            let last = raw.trim().parse::<u64>().unwrap_or(0);
            let age = now.saturating_sub(last);
            if age < stale_after.as_millis() as u64 {
                return Err(LeaderError::AnotherLive { age_ms: age });
            }
        }

        let daemon_id = Uuid::new_v4().to_string();
        store.set_value(KEY_DAEMON_ID, &daemon_id)?;
        store.set_value(KEY_LAST_ALIVE, &now.to_string())?;
        Ok(Self { daemon_id })
    }

    /// Re-read the stored id and compare to ours.
    ///
    /// `false` means a newer instance elected itself; the caller must log
    /// and terminate voluntarily. A Store error here is fatal: leadership
    /// cannot be determined without the Store.
    pub fn still_leader(&self, store: &dyn Store) -> Result<bool, LeaderError> {
        let stored = store.get_value(KEY_DAEMON_ID)?;
        Ok(stored.as_deref() == Some(self.daemon_id.as_str()))
    }

    /// Refresh `last_alive`; called once per cycle.
    pub fn heartbeat(&self, store: &dyn Store) -> Result<(), LeaderError> {
        store.set_value(KEY_LAST_ALIVE, &now_ms().to_string())?;
        Ok(())
    }

    pub fn daemon_id(&self) -> &str {
        &self.daemon_id
    }
}

#[derive(Debug, Error)]
pub enum LeaderError {
    #[error("another daemon heartbeat is only {age_ms}ms old; refusing takeover")]
    AnotherLive { age_ms: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::MemoryStore;

    const WINDOW: Duration = Duration::from_secs(180);

    #[test]
    fn only_one_acquire_succeeds_inside_the_window() {
        let store = MemoryStore::new();
        let first = LeaderGuard::acquire(&store, WINDOW, false).expect("first acquire");
        match LeaderGuard::acquire(&store, WINDOW, false) {
            Err(LeaderError::AnotherLive { .. }) => {}
            other => panic!("expected AnotherLive, got {other:?}"),
        }
        assert!(first.still_leader(&store).expect("still leader"));
    }

    #[test]
    fn acquire_succeeds_once_the_heartbeat_goes_stale() {
        let store = MemoryStore::new();
        let old = now_ms() - WINDOW.as_millis() as u64 - 1_000;
        store
            .set_value(KEY_LAST_ALIVE, &old.to_string())
            .expect("seed heartbeat");
        store
            .set_value(KEY_DAEMON_ID, "previous-crash")
            .expect("seed id");

        let guard = LeaderGuard::acquire(&store, WINDOW, false).expect("takeover");
        assert!(guard.still_leader(&store).expect("still leader"));
    }

    #[test]
    fn force_bypasses_the_liveness_check() {
        let store = MemoryStore::new();
        let _first = LeaderGuard::acquire(&store, WINDOW, false).expect("first");
        let second = LeaderGuard::acquire(&store, WINDOW, true).expect("forced");
        assert!(second.still_leader(&store).expect("new leader"));
    }

    #[test]
    fn displaced_leader_detects_the_newer_instance() {
        let store = MemoryStore::new();
        let first = LeaderGuard::acquire(&store, WINDOW, false).expect("first");
        let second = LeaderGuard::acquire(&store, WINDOW, true).expect("forced second");

        assert!(!first.still_leader(&store).expect("first displaced"));
        assert!(second.still_leader(&store).expect("second leads"));
    }

    #[test]
    fn malformed_heartbeat_counts_as_stale() {
        let store = MemoryStore::new();
        store
            .set_value(KEY_LAST_ALIVE, "not-a-timestamp")
            .expect("seed");
        LeaderGuard::acquire(&store, WINDOW, false).expect("takeover over garbage");
    }

    #[test]
    fn heartbeat_refreshes_last_alive() {
        let store = MemoryStore::new();
        let guard = LeaderGuard::acquire(&store, WINDOW, false).expect("acquire");
        store
            .set_value(KEY_LAST_ALIVE, "0")
            .expect("age out the heartbeat");
        guard.heartbeat(&store).expect("heartbeat");

        let raw = store
            .get_value(KEY_LAST_ALIVE)
            .expect("read")
            .expect("present");
        let written: u64 = raw.parse().expect("numeric");
        assert!(now_ms() - written < WINDOW.as_millis() as u64);
    }

    #[test]
    fn store_failure_during_leadership_check_is_an_error() {
        let store = MemoryStore::new();
        let guard = LeaderGuard::acquire(&store, WINDOW, false).expect("acquire");
        store.state().fail_value_reads = true;
        assert!(matches!(
            guard.still_leader(&store),
            Err(LeaderError::Store(_))
        ));
    }
}
