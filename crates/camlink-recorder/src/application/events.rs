//! Outbound interfaces: structured recorder events and the frame sink.
//!
//! A GUI, the CLI, or a test plugs in by implementing [`EventSink`] and
//! [`FrameSink`].  Plain closures implement both.

use std::fmt;
use std::time::Duration;

use camlink_core::{DeviceTelemetry, Frame, Transition};
use serde::Serialize;
use tracing::{info, warn};

/// Why a recording ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// `stop_recording()` was called.
    Requested,
    /// The initial connection failed.
    ConnectFailed,
    /// The reconnect budget ran out.
    ReconnectExhausted { attempts: u32 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => f.write_str("stopped by request"),
            StopReason::ConnectFailed => f.write_str("initial connection failed"),
            StopReason::ReconnectExhausted { attempts } => {
                write!(f, "reconnect failed after {attempts} attempts")
            }
        }
    }
}

/// Everything the recorder reports to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecorderEvent {
    StateChanged(Transition),
    RecordingStarted { address: String },
    RecordingStopped { reason: StopReason, frames: u64 },
    ReconnectScheduled {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    ReconnectExhausted { attempts: u32 },
    Telemetry(DeviceTelemetry),
    /// No message for `silent_for`; the recorder keeps waiting.
    StreamStalled { silent_for: Duration },
}

impl RecorderEvent {
    /// One-line human readable message for status bars and logs.
    pub fn summary(&self) -> String {
        match self {
            RecorderEvent::StateChanged(t) => t.to_string(),
            RecorderEvent::RecordingStarted { address } => format!("recording from {address}"),
            RecorderEvent::RecordingStopped { reason, frames } => {
                format!("recording stopped ({reason}), {frames} frames")
            }
            RecorderEvent::ReconnectScheduled {
                attempt,
                max_attempts,
                delay,
            } => format!(
                "reconnecting in {}s (attempt {attempt}/{max_attempts})",
                delay.as_secs_f32()
            ),
            RecorderEvent::ReconnectExhausted { attempts } => {
                format!("reconnect failed after {attempts} attempts; recording stopped")
            }
            RecorderEvent::Telemetry(t) => t.summary(),
            RecorderEvent::StreamStalled { silent_for } => {
                format!("no data for {}s", silent_for.as_secs())
            }
        }
    }
}

pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &RecorderEvent);
}

impl<F> EventSink for F
where
    F: Fn(&RecorderEvent) + Send + Sync,
{
    fn on_event(&self, event: &RecorderEvent) {
        self(event)
    }
}

/// Receives each frame once, in arrival order.  Must not block for long; it
/// runs on the receive pump.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}

impl<F> FrameSink for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn on_frame(&self, frame: &Frame) {
        self(frame)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_event(&self, event: &RecorderEvent) {
        let summary = event.summary();
        match event {
            RecorderEvent::ReconnectExhausted { .. } | RecorderEvent::StreamStalled { .. } => {
                warn!(target: "camlink::events", "{summary}")
            }
            RecorderEvent::RecordingStopped {
                reason: StopReason::ReconnectExhausted { .. } | StopReason::ConnectFailed,
                ..
            } => warn!(target: "camlink::events", "{summary}"),
            _ => info!(target: "camlink::events", "{summary}"),
        }
    }
}
