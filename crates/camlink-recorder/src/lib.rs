//! camlink-recorder library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does camlink-recorder do? (for beginners)
//!
//! A camera device streams JPEG frames over a WebSocket.  Wi-Fi drops,
//! device reboots, and power blips all end that stream.  The recorder:
//!
//! 1. Turns the address the user typed (`192.168.22.215`, `ws://cam/ws`,
//!    `https://cam`) into an ordered list of WebSocket URIs and tries them
//!    until one connects.
//! 2. Reads frames and telemetry, writes the frames to disk, and measures the
//!    frame rate.
//! 3. Notices when the stream closes, even when the socket library only
//!    exposes a close code, and reconnects after a fixed delay, up to a
//!    fixed number of attempts.
//! 4. Stops the recording and says so when the attempts run out.

/// Application layer: the recorder facade, the reconnect supervisor, events.
pub mod application;

/// Infrastructure layer: WebSocket transport, session, config, frame store.
pub mod infrastructure;
