//! Resume tokens for interruptible directory scans.
//!
//! A persisted token names the last item processed before an interruption.
//! The next pass replays the same ordered candidate sequence and skips
//! everything up to and including the token. If the token's item vanished
//! between passes the filter never matches and the pass proceeds from the
//! top; that looseness is accepted behavior, not something to repair.

/// Skip-until filter over an ordered sequence of opaque tokens.
#[derive(Debug)]
pub struct ResumePoint {
    token: Option<String>,
}

impl ResumePoint {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn is_set(&self) -> bool {
        self.token.is_some()
    }

    /// True while the resume point has not been reached. The call matching
    /// the token also returns true (that item was the last one processed)
    /// and clears the filter for everything after it.
    pub fn should_skip(&mut self, token: &str) -> bool {
        match self.token.as_deref() {
            Some(t) if t == token => {
                self.token = None;
                true
            }
            Some(_) => true,
            None => false,
        }
    }
}

/// Token for one serialized filter file: `<instance_id>/<filename>`.
pub fn filter_token(instance_id: &str, file_name: &str) -> String {
    format!("{instance_id}/{file_name}")
}
