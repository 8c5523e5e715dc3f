//! File-existence advisory locks.
//!
//! A lock is held iff its sentinel file exists. Acquisition is a single
//! atomic create-if-absent; splitting it into an existence check plus a
//! create would open a race window between cooperating processes.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionContext;

/// Characters that cannot appear in a sentinel filename.
const SENTINEL_ESCAPE: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'/')
    .add(b'\\')
    .add(b' ')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|');

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelMeta {
    pub identifier: String,
    pub session_id: String,
    pub pid: u32,
}

/// Session-scoped advisory lock registry.
///
/// Reentrant within the session: a second `acquire` of an identifier this
/// session already holds is a no-op returning `true`. Exclusive across
/// sessions: the sentinel file arbitrates.
#[derive(Debug)]
pub struct AdvisoryLocks {
    session_id: String,
    dir: PathBuf,
    held: HashSet<String>,
}

impl AdvisoryLocks {
    pub fn new(session: &SessionContext) -> Self {
        Self {
            session_id: session.session_id().to_string(),
            dir: session.lock_dir().to_path_buf(),
            held: HashSet::new(),
        }
    }

    /// Try to take the lock. `Ok(false)` means another session holds it.
    pub fn acquire(&mut self, identifier: &str) -> Result<bool, LockError> {
        if self.held.contains(identifier) {
            return Ok(true);
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.sentinel_path(identifier);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        let file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(err) => return Err(LockError::Io(err)),
        };

        let meta = SentinelMeta {
            identifier: identifier.to_string(),
            session_id: self.session_id.clone(),
            pid: std::process::id(),
        };
        // Metadata is advisory too: useful for operator cleanup after a
        // holder dies, never consulted for mutual exclusion.
        if let Err(err) = serde_json::to_writer(&file, &meta) {
            tracing::warn!(identifier, "failed to write sentinel metadata: {err}");
        }

        self.held.insert(identifier.to_string());
        Ok(true)
    }

    /// Release a lock held by this session.
    ///
    /// A missing sentinel (stolen, cleaned up by an operator, or
    /// double-released) is reported as an error but must be treated as
    /// non-fatal by callers.
    pub fn release(&mut self, identifier: &str) -> Result<(), LockError> {
        if !self.held.remove(identifier) {
            return Err(LockError::NotHeld {
                identifier: identifier.to_string(),
            });
        }
        let path = self.sentinel_path(identifier);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(LockError::SentinelMissing {
                identifier: identifier.to_string(),
            }),
            Err(err) => Err(LockError::Io(err)),
        }
    }

    pub fn holds(&self, identifier: &str) -> bool {
        self.held.contains(identifier)
    }

    fn sentinel_path(&self, identifier: &str) -> PathBuf {
        let escaped = utf8_percent_encode(identifier, SENTINEL_ESCAPE).to_string();
        self.dir.join(format!("{escaped}.lock"))
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {identifier:?} is not held by this session")]
    NotHeld { identifier: String },
    #[error("sentinel for lock {identifier:?} already gone at release")]
    SentinelMissing { identifier: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
