//! Per-request replay policy
//!
//! A logical request starts `Fresh`. The first 401 on a non-auth request asks for
//! a session refresh; once the request is replayed it becomes `Retried`, and any
//! further 401 is surfaced to the caller. `Terminal` means no more recovery will
//! be attempted for this request.

/// Replay state of one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Fresh,
    Retried,
    Terminal,
}

/// What to do with a 401
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Refresh the session, then replay
    Refresh,
    /// Hand the failure to the caller unchanged
    Surface,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    state: RetryState,
    auth_endpoint: bool,
}

impl RetryPolicy {
    pub const fn new(auth_endpoint: bool) -> Self {
        Self {
            state: RetryState::Fresh,
            auth_endpoint,
        }
    }

    pub const fn state(&self) -> RetryState {
        self.state
    }

    pub fn on_unauthorized(&mut self) -> Verdict {
        if self.state == RetryState::Fresh && !self.auth_endpoint {
            Verdict::Refresh
        } else {
            self.state = RetryState::Terminal;
            Verdict::Surface
        }
    }

    /// The request is about to be dispatched again with a fresh token
    pub fn on_replay(&mut self) {
        if self.state == RetryState::Fresh {
            self.state = RetryState::Retried;
        }
    }

    /// The session could not be recovered
    pub fn on_refresh_failed(&mut self) {
        self.state = RetryState::Terminal;
    }
}
