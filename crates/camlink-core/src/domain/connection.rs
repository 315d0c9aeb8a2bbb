//! Connection state machine vocabulary.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Connected
//!      ▲                          │                          │
//!      └──── all candidates fail ─┘      remote close /      │
//!      ▲                                 read failure        │
//!      └─────────────────────────────────────────────────────┤
//!      ▲                                                     │
//!      └──────────── Closing ◀────────── disconnect() ───────┘
//! ```
//!
//! The session owns the machine; observers only ever see [`Transition`]s.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of one connection session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(label)
    }
}

/// One candidate URI that failed to connect, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub uri: String,
    pub error: String,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.uri, self.error)
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionReason {
    /// `connect()` was called with these candidates.
    ConnectRequested { candidates: Vec<String> },
    /// The handshake with `uri` completed.
    Handshake { uri: String },
    /// Every candidate failed.
    AllCandidatesFailed { tried: Vec<CandidateFailure> },
    /// The peer closed the stream, optionally with a close code.
    RemoteClosed { code: Option<u16> },
    /// A read failed and the transport reports it closed.
    ReadFailed { error: String },
    /// The local side asked to disconnect.
    LocalDisconnect,
}

impl TransitionReason {
    /// `true` when the stream ended underneath an established connection.
    ///
    /// Only these transitions drive the reconnect supervisor.
    pub fn is_stream_closed(&self) -> bool {
        matches!(
            self,
            TransitionReason::RemoteClosed { .. } | TransitionReason::ReadFailed { .. }
        )
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionReason::ConnectRequested { candidates } => {
                write!(f, "connect requested ({} candidates)", candidates.len())
            }
            TransitionReason::Handshake { uri } => write!(f, "handshake with {uri}"),
            TransitionReason::AllCandidatesFailed { tried } => {
                write!(f, "all {} candidates failed", tried.len())
            }
            TransitionReason::RemoteClosed { code: Some(code) } => {
                write!(f, "remote closed (code {code})")
            }
            TransitionReason::RemoteClosed { code: None } => f.write_str("remote closed"),
            TransitionReason::ReadFailed { error } => write!(f, "read failed: {error}"),
            TransitionReason::LocalDisconnect => f.write_str("local disconnect"),
        }
    }
}

/// A state change reported to the session observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reason: TransitionReason,
}

impl Transition {
    pub fn new(from: ConnectionState, to: ConnectionState, reason: TransitionReason) -> Self {
        Self { from, to, reason }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.reason)
    }
}
