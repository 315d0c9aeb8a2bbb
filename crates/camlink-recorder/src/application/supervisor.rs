//! `ReconnectSupervisor`: bounded, delayed reconnection during a recording.
//!
//! ```text
//!            start(raw)                      stream closed
//!  Idle ──────────────────▶ Armed ─────────────────────────────┐
//!   ▲                         ▲                                 ▼
//!   │ stop() /                │ connected              attempts < max ?
//!   │ exhausted               │ (budget refills)        │yes          │no
//!   │                         │                         ▼             ▼
//!   │                     reconnect ok ◀── sleep(delay) ─ Retry    Exhausted
//!   │                                         │                      │
//!   │                              reconnect failed ──▶ (decide again)│
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The supervisor owns the timers and the [`ReconnectState`] budget; the
//! actual reconnect and the forced stop are delegated to a
//! [`SupervisedTarget`] (the recorder).  At most one retry is outstanding.
//! `stop()` bumps a generation counter so a timer that fires afterwards is a
//! no-op.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use camlink_core::{ReconnectDecision, ReconnectPolicy, ReconnectState};
use tracing::{debug, info, warn};

use crate::application::events::{EventSink, RecorderEvent};
use crate::application::recorder::RecorderError;

/// What the supervisor drives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SupervisedTarget: Send + Sync {
    /// Resolves `raw_address` again and connects.
    async fn reconnect(&self, raw_address: &str) -> Result<(), RecorderError>;

    /// The budget is spent; end the recording.
    async fn stop_recording(&self, attempts: u32);
}

struct SupervisorState {
    budget: ReconnectState,
    raw_address: Option<String>,
    generation: u64,
    retry_pending: bool,
}

struct Shared {
    policy: ReconnectPolicy,
    events: Arc<dyn EventSink>,
    target: Arc<dyn SupervisedTarget>,
    state: Mutex<SupervisorState>,
}

/// Follow-up work decided under the lock and performed after releasing it.
enum Action {
    Nothing,
    ScheduleRetry {
        generation: u64,
        raw_address: String,
        attempt: u32,
        max_attempts: u32,
        delay: std::time::Duration,
    },
    GiveUp {
        attempts: u32,
    },
}

pub struct ReconnectSupervisor {
    shared: Arc<Shared>,
}

impl ReconnectSupervisor {
    pub fn new(
        policy: ReconnectPolicy,
        events: Arc<dyn EventSink>,
        target: Arc<dyn SupervisedTarget>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                policy,
                events,
                target,
                state: Mutex::new(SupervisorState {
                    budget: ReconnectState::new(),
                    raw_address: None,
                    generation: 0,
                    retry_pending: false,
                }),
            }),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    /// Arms supervision for a recording of `raw_address`.
    pub fn start(&self, raw_address: &str) {
        let mut state = self.shared.lock();
        state.budget.arm();
        state.raw_address = Some(raw_address.to_string());
        state.generation += 1;
        state.retry_pending = false;
        debug!(raw_address, generation = state.generation, "supervisor armed");
    }

    /// Disarms supervision; a pending retry becomes a no-op.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        state.budget.disarm();
        state.raw_address = None;
        state.generation += 1;
        state.retry_pending = false;
        debug!(generation = state.generation, "supervisor disarmed");
    }

    /// A connection succeeded; the budget refills.
    pub fn on_connected(&self) {
        self.shared.lock().budget.on_connected();
    }

    /// The stream of an established connection closed.
    pub fn notify_stream_closed(&self) {
        let action = {
            let mut state = self.shared.lock();
            if state.retry_pending {
                debug!("stream closed while a retry is pending; ignoring");
                return;
            }
            self.shared.decide(&mut state)
        };
        Shared::perform(&self.shared, action);
    }

    pub fn attempts_used(&self) -> u32 {
        self.shared.lock().budget.attempts_used()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().budget.is_active()
    }

    pub fn retry_pending(&self) -> bool {
        self.shared.lock().retry_pending
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decide(&self, state: &mut SupervisorState) -> Action {
        match state.budget.on_stream_closed(&self.policy) {
            ReconnectDecision::Idle => Action::Nothing,
            ReconnectDecision::Retry {
                attempt,
                max_attempts,
                delay,
            } => match state.raw_address.clone() {
                Some(raw_address) => {
                    state.retry_pending = true;
                    Action::ScheduleRetry {
                        generation: state.generation,
                        raw_address,
                        attempt,
                        max_attempts,
                        delay,
                    }
                }
                None => Action::Nothing,
            },
            ReconnectDecision::Exhausted { attempts } => {
                state.retry_pending = false;
                Action::GiveUp { attempts }
            }
        }
    }

    fn perform(shared: &Arc<Shared>, action: Action) {
        match action {
            Action::Nothing => {}
            Action::ScheduleRetry {
                generation,
                raw_address,
                attempt,
                max_attempts,
                delay,
            } => {
                info!(attempt, max_attempts, ?delay, "reconnect scheduled");
                shared.events.on_event(&RecorderEvent::ReconnectScheduled {
                    attempt,
                    max_attempts,
                    delay,
                });
                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.fire_retry(generation, raw_address).await;
                });
            }
            Action::GiveUp { attempts } => {
                warn!(attempts, "reconnect budget exhausted; stopping recording");
                shared.events.on_event(&RecorderEvent::ReconnectExhausted { attempts });
                let target = Arc::clone(&shared.target);
                tokio::spawn(async move { target.stop_recording(attempts).await });
            }
        }
    }

    async fn fire_retry(self: Arc<Self>, generation: u64, raw_address: String) {
        {
            let mut state = self.lock();
            if state.generation != generation || !state.budget.is_active() {
                debug!(generation, "retry timer fired after stop; ignoring");
                return;
            }
            state.retry_pending = false;
        }

        let result = self.target.reconnect(&raw_address).await;

        let action = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            match result {
                Ok(()) => {
                    info!("reconnected");
                    Action::Nothing
                }
                Err(e) => {
                    warn!(error = %e, "reconnect attempt failed");
                    self.decide(&mut state)
                }
            }
        };
        Shared::perform(&self, action);
    }
}
