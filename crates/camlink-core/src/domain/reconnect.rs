//! Bounded reconnect budget.
//!
//! The supervisor in the recorder crate owns the timers; this module owns the
//! arithmetic.  A [`ReconnectState`] is armed when a recording starts, spends
//! one unit of budget per stream closure, refills on every successful
//! connection, and disarms itself when the budget runs out.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of reconnect attempts before a recording is abandoned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between a closure and the next attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Immutable reconnect limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// What the supervisor should do after a stream closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Not recording; nothing to do.
    Idle,
    /// Try again after `delay`.  `attempt` is 1-based.
    Retry {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// Budget spent; recording must stop.
    Exhausted { attempts: u32 },
}

/// Mutable budget owned by one supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts_used: u32,
    active: bool,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recording started: budget full, supervision on.
    pub fn arm(&mut self) {
        self.attempts_used = 0;
        self.active = true;
    }

    /// A recording stopped.
    pub fn disarm(&mut self) {
        self.active = false;
    }

    /// A connection succeeded; the budget refills.
    pub fn on_connected(&mut self) {
        self.attempts_used = 0;
    }

    /// The stream closed (or a retry failed).  Spends one unit of budget if
    /// any remains.
    pub fn on_stream_closed(&mut self, policy: &ReconnectPolicy) -> ReconnectDecision {
        if !self.active {
            return ReconnectDecision::Idle;
        }
        if self.attempts_used >= policy.max_attempts {
            self.active = false;
            return ReconnectDecision::Exhausted {
                attempts: self.attempts_used,
            };
        }
        self.attempts_used += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts_used,
            max_attempts: policy.max_attempts,
            delay: policy.retry_delay,
        }
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
