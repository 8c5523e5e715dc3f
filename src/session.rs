//! Session identity shared by leader election and advisory locking.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Per-process (or, in tests, per-simulated-session) context.
///
/// Reifies what the original system kept in ambient globals: the session id
/// and the directory its lock sentinels live in. Constructing several of
/// these in one test process simulates several application sessions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session_id: String,
    lock_dir: PathBuf,
}

impl SessionContext {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            lock_dir: lock_dir.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }
}
