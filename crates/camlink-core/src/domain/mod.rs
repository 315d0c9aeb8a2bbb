//! Domain entities for CamLink.
//!
//! This module contains pure connection-lifecycle rules with no
//! infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of a Clean Architecture codebase is the **domain**.
//! Domain code has **no** imports from network libraries, async runtimes, or
//! UI frameworks, so it compiles and tests anywhere.  The recorder crate
//! wires these types to real sockets and timers; the decisions themselves
//! (which URI to try, whether to retry, how fast frames arrive) live here.

/// Raw user input → ordered WebSocket candidate URIs.
pub mod address;

/// Connection state machine vocabulary shared by session and observers.
pub mod connection;

/// "Is this transport closed?" across handles with differing capabilities.
pub mod liveness;

/// Bounded reconnect budget.
pub mod reconnect;

/// Rolling frames-per-second counter.
pub mod throughput;
