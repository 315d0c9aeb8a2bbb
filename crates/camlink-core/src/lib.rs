//! # camlink-core
//!
//! Shared library for CamLink containing the connection-lifecycle domain
//! logic and the device message codec used by the recorder.
//!
//! It has zero dependencies on sockets, async runtimes, or the filesystem.
//! Everything here can be unit-tested with plain `#[test]` functions.
//!
//! # Architecture overview (for beginners)
//!
//! A CamLink device (for example an ESP32 camera) streams JPEG frames over a
//! WebSocket.  The recorder application connects to it, stores the frames,
//! and keeps the stream alive while a recording is running.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure rules with no I/O: how a user-typed address becomes
//!   a list of WebSocket URIs to try, how to decide whether a transport
//!   handle is closed, the connection state machine vocabulary, the bounded
//!   reconnect budget, and the frames-per-second counter.
//!
//! - **`protocol`** – What travels over the WebSocket: binary image frames,
//!   JSON telemetry from the device, and JSON commands to the device.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `camlink_core::AddressResolver` instead of the full module path.
pub use domain::address::{AddressCandidates, AddressError, AddressResolver, DeviceKind};
pub use domain::connection::{CandidateFailure, ConnectionState, Transition, TransitionReason};
pub use domain::liveness::{
    ClosedBy, Indicator, LivenessProbe, LivenessSource, ProbeError, Verdict,
};
pub use domain::reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectState};
pub use domain::throughput::{ThroughputMonitor, ThroughputSample};
pub use protocol::codec::{decode_binary, decode_text, encode_command, CodecError};
pub use protocol::messages::{DeviceCommand, DeviceMessage, DeviceTelemetry, Frame, FrameFormat};
