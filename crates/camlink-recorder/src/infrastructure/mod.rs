//! Infrastructure layer: everything that touches sockets, files, or the
//! environment.
//!
//! Modules:
//!
//! - [`transport`] – WebSocket connector/transport seams, the
//!   `tokio-tungstenite` implementation, and a scripted mock.
//! - [`session`] – `ConnectionSession`, the per-recording connection state
//!   machine.
//! - [`config`] – TOML configuration file.
//! - [`frame_store`] – writes frames to a per-recording folder.

pub mod config;
pub mod frame_store;
pub mod session;
pub mod transport;
