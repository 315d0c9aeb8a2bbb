//! Closed-state detection across transport handles with differing capabilities.
//!
//! # Why a probe? (for beginners)
//!
//! Different WebSocket implementations expose "is this connection closed?"
//! in different ways.  Some keep a boolean flag, some only remember the close
//! code the peer sent, and some expose nothing at all.  Rather than branching
//! on concrete types, every handle implements [`LivenessSource`] and answers
//! only the questions it can.  The default method bodies answer
//! [`Indicator::Unavailable`], so a handle opts in to exactly the indicators
//! it has.
//!
//! [`LivenessProbe::is_closed`] walks the indicators in a fixed order:
//!
//! 1. the closed flag, if exposed;
//! 2. otherwise the close code, if exposed (a present code means closed);
//! 3. otherwise "open", logged at debug level.
//!
//! The probe never fails.  Introspection errors and panics both count as
//! "open" and are kept as diagnostics.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

/// Whether a handle exposes a given indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator<T> {
    Unavailable,
    Available(T),
}

/// Raised by a [`LivenessSource`] that failed while inspecting itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("liveness introspection failed: {0}")]
pub struct ProbeError(pub String);

/// A transport handle that may expose closed-state indicators.
pub trait LivenessSource {
    /// Direct closed/open flag.
    fn closed_flag(&self) -> Result<Indicator<bool>, ProbeError> {
        Ok(Indicator::Unavailable)
    }

    /// Close code received from (or sent to) the peer; `Some` means closed.
    fn close_code(&self) -> Result<Indicator<Option<u16>>, ProbeError> {
        Ok(Indicator::Unavailable)
    }
}

/// Which indicator decided a [`Verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedBy {
    Flag,
    CloseCode,
    /// Nothing was exposed; assumed open.
    NoIndicator,
    /// Introspection failed or panicked; assumed open.
    ProbeFailure,
}

/// Full result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub closed: bool,
    pub decided_by: ClosedBy,
}

impl Verdict {
    fn open(decided_by: ClosedBy) -> Self {
        Self { closed: false, decided_by }
    }
}

/// Decides whether a transport handle is closed.
///
/// Holds only diagnostics; one probe can be shared by every read of a session.
#[derive(Debug, Default)]
pub struct LivenessProbe {
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl LivenessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `handle` reports itself closed.  Never panics.
    pub fn is_closed<H: LivenessSource + ?Sized>(&self, handle: &H) -> bool {
        self.probe(handle).closed
    }

    /// Like [`is_closed`](Self::is_closed) but also reports which indicator
    /// decided.
    pub fn probe<H: LivenessSource + ?Sized>(&self, handle: &H) -> Verdict {
        match catch_unwind(AssertUnwindSafe(|| evaluate(handle))) {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                self.record_failure(e.0);
                Verdict::open(ClosedBy::ProbeFailure)
            }
            Err(payload) => {
                self.record_failure(panic_message(payload.as_ref()));
                Verdict::open(ClosedBy::ProbeFailure)
            }
        }
    }

    /// Number of probes that failed since creation.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Message of the most recent failed probe, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_failure(&self, message: String) {
        warn!(error = %message, "liveness probe failed; treating connection as open");
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

fn evaluate<H: LivenessSource + ?Sized>(handle: &H) -> Result<Verdict, ProbeError> {
    if let Indicator::Available(closed) = handle.closed_flag()? {
        return Ok(Verdict { closed, decided_by: ClosedBy::Flag });
    }
    if let Indicator::Available(code) = handle.close_code()? {
        return Ok(Verdict { closed: code.is_some(), decided_by: ClosedBy::CloseCode });
    }
    debug!("transport exposes no closed-state indicator; assuming open");
    Ok(Verdict::open(ClosedBy::NoIndicator))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}
