//! The main loop: leadership check, heartbeat, phases in fixed order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::daemon::budget::{Budget, CycleBudget};
use crate::daemon::leader::LeaderGuard;
use crate::daemon::phases::{
    ChainRepair, CycleContext, FilterCacheRefresh, OldCacheWarmup, Phase, StaleCacheWarmup,
};
use crate::daemon::report::CycleReport;
use crate::lock::AdvisoryLocks;
use crate::renderer::Renderer;
use crate::store::Store;

/// Why the loop returned. Exits are always voluntary; there are no special
/// exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A newer instance elected itself.
    Displaced,
    /// SIGTERM/SIGINT.
    ShutdownRequested,
}

pub struct CycleScheduler {
    store: Box<dyn Store>,
    renderer: Box<dyn Renderer>,
    locks: AdvisoryLocks,
    leader: LeaderGuard,
    phases: Vec<Box<dyn Phase>>,
    max_cycle: Duration,
    idle_sleep: Duration,
    shutdown: Arc<AtomicBool>,
    cycles: u64,
}

impl CycleScheduler {
    pub fn new(
        cfg: &Config,
        store: Box<dyn Store>,
        renderer: Box<dyn Renderer>,
        locks: AdvisoryLocks,
        leader: LeaderGuard,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        // Fixed phase order, every cycle.
        let phases: Vec<Box<dyn Phase>> = vec![
            Box::new(StaleCacheWarmup::new(cfg.stale_batch_limit)),
            Box::new(FilterCacheRefresh::new(
                cfg.cache_root.clone(),
                cfg.filter_max_age(),
            )),
            Box::new(ChainRepair::new(cfg.chain_batch_limit)),
            Box::new(OldCacheWarmup::new(
                cfg.old_warmup_quota,
                cfg.old_cache_max_age(),
            )),
        ];
        Self {
            store,
            renderer,
            locks,
            leader,
            phases,
            max_cycle: cfg.max_cycle(),
            idle_sleep: cfg.idle_sleep(),
            shutdown,
            cycles: 0,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Run until displaced, shut down, or hit by an unrecoverable Store
    /// error while checking leadership.
    pub fn run(&mut self) -> crate::Result<ExitReason> {
        let mut previous: Option<(CycleReport, Duration)> = None;
        loop {
            if let Some((report, elapsed)) = previous.take() {
                let over_budget = elapsed > self.max_cycle;
                if !over_budget {
                    std::thread::sleep(self.idle_sleep);
                }
                report.flush(elapsed, over_budget);
            }

            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(ExitReason::ShutdownRequested);
            }
            if !self.leader.still_leader(self.store.as_ref())? {
                tracing::warn!(
                    daemon_id = self.leader.daemon_id(),
                    "displaced by a newer instance"
                );
                return Ok(ExitReason::Displaced);
            }
            self.leader.heartbeat(self.store.as_ref())?;

            let mut budget = CycleBudget::start(self.max_cycle);
            let report = self.run_cycle(&mut budget);
            previous = Some((report, budget.elapsed()));
        }
    }

    /// One pass over every phase. Exposed separately so tests can drive
    /// single cycles with scripted budgets.
    pub fn run_cycle(&mut self, budget: &mut dyn Budget) -> CycleReport {
        let mut report = CycleReport::new(self.cycles);
        self.cycles += 1;

        let Self {
            store,
            renderer,
            locks,
            phases,
            ..
        } = self;
        for phase in phases.iter_mut() {
            let result = {
                let mut cx = CycleContext {
                    store: store.as_ref(),
                    renderer: renderer.as_ref(),
                    locks: &mut *locks,
                    budget: &mut *budget,
                    report: &mut report,
                };
                phase.run(&mut cx)
            };
            if let Err(err) = result {
                report.record_error(phase.name(), err.to_string());
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::leader::{KEY_DAEMON_ID, LeaderGuard};
    use crate::session::SessionContext;
    use crate::store::Store as _;
    use crate::test_harness::{MemoryStore, NeverLate, ScriptedRenderer};

    fn scheduler(store: MemoryStore, renderer: ScriptedRenderer) -> (CycleScheduler, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::default();
        cfg.cache_root = dir.path().join("cache");
        cfg.lock_dir = dir.path().join("locks");
        let session = SessionContext::new(&cfg.lock_dir);
        let locks = AdvisoryLocks::new(&session);
        let leader =
            LeaderGuard::acquire(&store, cfg.max_cycle() * 3, false).expect("acquire leadership");
        let scheduler = CycleScheduler::new(
            &cfg,
            Box::new(store),
            Box::new(renderer),
            locks,
            leader,
            Arc::new(AtomicBool::new(false)),
        );
        (scheduler, dir)
    }

    #[test]
    fn one_cycle_runs_the_full_scenario() {
        let store = MemoryStore::new();
        store.push_stale("A", "shop-1", true);
        store.push_stale("B", "shop-1", false);
        store.push_stale("C", "shop-1", true);
        let renderer = ScriptedRenderer::new();
        let (mut scheduler, _dir) = scheduler(store.clone(), renderer.clone());

        let report = scheduler.run_cycle(&mut NeverLate);

        assert_eq!(renderer.warmed(), vec!["A".to_string(), "C".to_string()]);
        assert!(store.state().stale_queue.is_empty());
        assert_eq!(store.state().dedup_cache_calls, 1);
        assert_eq!(store.state().dedup_index_calls, 1);
        assert!(report.errors().is_empty());
    }

    #[test]
    fn chain_work_throttles_old_warmup_in_the_same_cycle() {
        let store = MemoryStore::new();
        store.push_parent(10, Some(1), None);
        {
            let mut state = store.state();
            for id in 0..10 {
                state.product_candidates.push(crate::store::ChainCandidate {
                    id,
                    parent_id: 10,
                    brand_id: None,
                    serie_id: None,
                });
            }
        }
        let renderer = ScriptedRenderer::new();
        let (mut scheduler, _dir) = scheduler(store.clone(), renderer);

        let report = scheduler.run_cycle(&mut NeverLate);

        assert_eq!(report.chain_affected(), 10);
        assert_eq!(store.state().old_limits_seen, vec![50]);
    }

    #[test]
    fn displaced_scheduler_exits_the_loop() {
        let store = MemoryStore::new();
        let renderer = ScriptedRenderer::new();
        let (mut scheduler, _dir) = scheduler(store.clone(), renderer);

        store
            .set_value(KEY_DAEMON_ID, "someone-else")
            .expect("displace");
        assert_eq!(scheduler.run().expect("run"), ExitReason::Displaced);
    }

    #[test]
    fn shutdown_flag_exits_before_any_work() {
        let store = MemoryStore::new();
        store.push_stale("A", "shop-1", true);
        let renderer = ScriptedRenderer::new();
        let (mut scheduler, _dir) = scheduler(store.clone(), renderer.clone());
        scheduler.shutdown.store(true, Ordering::Relaxed);

        assert_eq!(scheduler.run().expect("run"), ExitReason::ShutdownRequested);
        assert!(renderer.warmed().is_empty());
    }

    #[test]
    fn store_outage_during_leadership_check_is_fatal() {
        let store = MemoryStore::new();
        let renderer = ScriptedRenderer::new();
        let (mut scheduler, _dir) = scheduler(store.clone(), renderer);

        store.state().fail_value_reads = true;
        assert!(scheduler.run().is_err());
    }
}
