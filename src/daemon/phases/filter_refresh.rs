//! Facet/filter cache refresh over the shared cache directory tree.
//!
//! Scans `<cache_root>/filter/<instance_id>/*.serialized` in sorted order
//! and rebuilds files older than the staleness threshold. The scan is
//! resumable across interruptions and restarts via a cursor persisted in
//! the Store; see [`crate::daemon::cursor`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::{CycleContext, Phase};
use crate::daemon::cursor::{ResumePoint, filter_token};
use crate::daemon::report::PhaseStats;

/// Store key holding the resume token of an interrupted pass.
pub const FILTER_CURSOR_KEY: &str = "filter.cursor";

/// Advisory lock shared with on-demand rebuilds in the live application.
const PHASE_LOCK: &str = "filter-cache-refresh";

const FILTER_EXTENSION: &str = "serialized";

pub struct FilterCacheRefresh {
    cache_root: PathBuf,
    max_age: Duration,
}

impl FilterCacheRefresh {
    pub fn new(cache_root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            cache_root: cache_root.into(),
            max_age,
        }
    }

    fn scan(&self, cx: &mut CycleContext<'_>, stats: &mut PhaseStats) -> crate::Result<()> {
        let mut resume = ResumePoint::new(cx.store.get_value(FILTER_CURSOR_KEY)?);
        let now = SystemTime::now();

        for instance_dir in sorted_subdirs(&self.cache_root.join("filter"))? {
            let instance_id = match instance_dir.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };

            for path in sorted_filter_files(&instance_dir)? {
                let file_name = match path.file_name() {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => continue,
                };
                let token = filter_token(&instance_id, &file_name);

                // Files already covered by the interrupted pass are not
                // units of work; the budget check does not apply to them.
                if resume.should_skip(&token) {
                    stats.skipped += 1;
                    continue;
                }

                self.visit(cx, stats, &instance_id, &path, now);

                if cx.budget.running_late() {
                    cx.store.set_value(FILTER_CURSOR_KEY, &token)?;
                    return Ok(());
                }
            }
        }

        // Clean completion, including the pass where a deleted cursor file
        // made the skip filter match nothing.
        cx.store.clear_value(FILTER_CURSOR_KEY)?;
        Ok(())
    }

    fn visit(
        &self,
        cx: &mut CycleContext<'_>,
        stats: &mut PhaseStats,
        instance_id: &str,
        path: &Path,
        now: SystemTime,
    ) {
        let age = match file_age(path, now) {
            Ok(Some(age)) => age,
            Ok(None) => {
                // Deleted by another process mid-scan; the tree is shared.
                stats.skipped += 1;
                return;
            }
            Err(err) => {
                stats.failed += 1;
                cx.report.record_error(self.name(), err.to_string());
                return;
            }
        };

        if age <= self.max_age {
            stats.skipped += 1;
            return;
        }

        match cx.renderer.rebuild_filter(instance_id, path) {
            Ok(()) => stats.processed += 1,
            Err(err) => {
                stats.failed += 1;
                cx.report.record_error(self.name(), err.to_string());
            }
        }
    }
}

impl Phase for FilterCacheRefresh {
    fn name(&self) -> &'static str {
        "filter-cache-refresh"
    }

    fn run(&mut self, cx: &mut CycleContext<'_>) -> crate::Result<()> {
        let mut stats = PhaseStats::default();

        if !cx.locks.acquire(PHASE_LOCK)? {
            // Another session is already rebuilding filter caches.
            tracing::debug!("filter refresh lock contended, skipping this cycle");
            cx.report.merge(self.name(), stats);
            return Ok(());
        }

        let result = self.scan(cx, &mut stats);

        if let Err(err) = cx.locks.release(PHASE_LOCK) {
            cx.report
                .record_error(self.name(), format!("lock release: {err}"));
        }
        cx.report.merge(self.name(), stats);
        result
    }
}

fn file_age(path: &Path, now: SystemTime) -> io::Result<Option<Duration>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mtime = meta.modified()?;
    Ok(Some(now.duration_since(mtime).unwrap_or_default()))
}

fn sorted_subdirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn sorted_filter_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(FILTER_EXTENSION)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
