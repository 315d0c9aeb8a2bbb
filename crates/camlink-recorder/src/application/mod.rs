//! Application layer: the recording use case.
//!
//! # What lives here? (for beginners)
//!
//! - **`recorder`** – [`Recorder`], the facade the GUI or CLI talks to:
//!   `start_recording`, `stop_recording`, `get_status`, `send_command`.  It
//!   owns one `ConnectionSession` per recording and a receive pump that
//!   feeds frames to the [`FrameSink`] and the throughput counter.
//!
//! - **`supervisor`** – [`ReconnectSupervisor`], which turns "the stream
//!   closed" into at most `max_attempts` delayed reconnects and stops the
//!   recording when the budget is spent.
//!
//! - **`events`** – [`RecorderEvent`] plus the [`EventSink`] and
//!   [`FrameSink`] outbound seams.

pub mod events;
pub mod recorder;
pub mod supervisor;

pub use events::{EventSink, FrameSink, RecorderEvent, StopReason, TracingEventSink};
pub use recorder::{Recorder, RecorderError, RecorderSettings, RecorderStatus};
pub use supervisor::{ReconnectSupervisor, SupervisedTarget};
