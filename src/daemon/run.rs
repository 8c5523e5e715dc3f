//! Daemon runner (single-binary mode).
//!
//! `rewarmd run` starts the reconciliation loop against the configured dev
//! store and hook commands. Embedding applications build the scheduler
//! directly with their own [`crate::store::Store`] implementation.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config;
use crate::daemon::leader::{LeaderError, LeaderGuard};
use crate::daemon::scheduler::{CycleScheduler, ExitReason};
use crate::lock::AdvisoryLocks;
use crate::renderer::CommandRenderer;
use crate::session::SessionContext;
use crate::store::JsonStore;
use crate::Result;

/// Run the daemon in the current process.
///
/// Returns once leadership is refused or lost, or on a shutdown signal;
/// otherwise loops forever.
pub fn run_daemon(force: bool) -> Result<()> {
    let cfg = config::load_or_init();

    let store = JsonStore::open(&cfg.store_path)?;
    let renderer = CommandRenderer::new(cfg.renderer.clone());
    let session = SessionContext::new(&cfg.lock_dir);
    let locks = AdvisoryLocks::new(&session);

    let stale_after = cfg.max_cycle() * 3;
    let leader = match LeaderGuard::acquire(&store, stale_after, force) {
        Ok(leader) => leader,
        Err(LeaderError::AnotherLive { age_ms }) => {
            tracing::error!(
                age_ms,
                "another daemon heartbeat is still live; use --force after a crash"
            );
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    tracing::info!(daemon_id = leader.daemon_id(), force, "acquired leadership");

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())?;

    let mut scheduler = CycleScheduler::new(
        &cfg,
        Box::new(store),
        Box::new(renderer),
        locks,
        leader,
        shutdown,
    );
    match scheduler.run()? {
        ExitReason::Displaced => {
            tracing::warn!("a newer daemon instance took over, exiting");
        }
        ExitReason::ShutdownRequested => {
            tracing::info!("shutdown signal received, exiting");
        }
    }
    Ok(())
}
