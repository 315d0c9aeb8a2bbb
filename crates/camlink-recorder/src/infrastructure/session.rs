//! `ConnectionSession`: one logical link to one device.
//!
//! The session owns the connection state machine (see
//! [`camlink_core::domain::connection`]) and the transport of the current
//! connection epoch.  It never reconnects on its own; that is the
//! supervisor's job.  What it guarantees:
//!
//! - candidates are tried strictly in order, first success wins;
//! - every transition is reported to the observer exactly once, after the
//!   session's internal lock is released;
//! - a stream closure is reported to the observer *before* `receive()`
//!   returns [`SessionError::StreamClosed`];
//! - `disconnect()` is idempotent and wakes a pending `receive()` or
//!   `connect()`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camlink_core::{
    decode_binary, decode_text, encode_command, AddressCandidates, CandidateFailure, ClosedBy,
    CodecError, ConnectionState, DeviceCommand, DeviceMessage, Indicator, LivenessProbe,
    LivenessSource, Transition, TransitionReason,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::infrastructure::transport::{Connector, InboundMessage, Transport, TransportError};

/// Consecutive failed reads on a transport that still reports itself open
/// before the stream is given up as closed.
pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 3;

/// Errors returned by [`ConnectionSession`] operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// Every candidate failed to complete a handshake.
    #[error("could not connect to any candidate: {}", describe_failures(.tried))]
    ConnectFailed { tried: Vec<CandidateFailure> },

    /// The established stream ended.
    #[error("stream closed: {detail}")]
    StreamClosed { code: Option<u16>, detail: String },

    /// The operation needs a connected session.
    #[error("session is not connected")]
    NotConnected,

    /// `connect()` was called while the session was not disconnected.
    #[error("session is already {0}")]
    AlreadyActive(ConnectionState),

    /// `disconnect()` interrupted an in-flight `connect()`.
    #[error("connect cancelled by disconnect")]
    Cancelled,

    /// A read or write failed while the transport still reports itself open.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The command could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn describe_failures(tried: &[CandidateFailure]) -> String {
    tried
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Receives every state transition of a session.
///
/// Called synchronously on the task that caused the transition.  Must not
/// block; spawn if follow-up work is async.
pub trait SessionObserver: Send + Sync {
    fn on_transition(&self, transition: &Transition);
}

impl<F> SessionObserver for F
where
    F: Fn(&Transition) + Send + Sync,
{
    fn on_transition(&self, transition: &Transition) {
        self(transition)
    }
}

struct SessionInner {
    state: ConnectionState,
    /// Bumped by every `connect()`; stale attempts compare against it.
    epoch: u64,
    uri: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    frames_in_epoch: u64,
    read_failures: u32,
}

/// One connection to one device, owned by the recording that created it.
pub struct ConnectionSession {
    connector: Arc<dyn Connector>,
    observer: Arc<dyn SessionObserver>,
    probe: LivenessProbe,
    inner: Mutex<SessionInner>,
    /// Bumped by `disconnect()` to wake pending reads and handshakes.
    shutdown: watch::Sender<u64>,
}

impl ConnectionSession {
    pub fn new(connector: Arc<dyn Connector>, observer: Arc<dyn SessionObserver>) -> Self {
        let (shutdown, _) = watch::channel(0);
        Self {
            connector,
            observer,
            probe: LivenessProbe::new(),
            inner: Mutex::new(SessionInner {
                state: ConnectionState::Disconnected,
                epoch: 0,
                uri: None,
                transport: None,
                frames_in_epoch: 0,
                read_failures: 0,
            }),
            shutdown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The URI of the current connection, if connected.
    pub fn connected_uri(&self) -> Option<String> {
        self.lock().uri.clone()
    }

    /// Number of `connect()` calls so far; frames carry it as their epoch.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Tries `candidates` in order, each bounded by `timeout_per_candidate`.
    ///
    /// Returns the URI that connected.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyActive`] if not disconnected.
    /// - [`SessionError::ConnectFailed`] with one entry per candidate when
    ///   all fail.
    /// - [`SessionError::Cancelled`] if `disconnect()` ran meanwhile.
    pub async fn connect(
        &self,
        candidates: &AddressCandidates,
        timeout_per_candidate: Duration,
    ) -> Result<String, SessionError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let epoch = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Disconnected {
                return Err(SessionError::AlreadyActive(inner.state));
            }
            inner.state = ConnectionState::Connecting;
            inner.epoch += 1;
            inner.epoch
        };
        self.notify(Transition::new(
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            TransitionReason::ConnectRequested {
                candidates: candidates.as_slice().to_vec(),
            },
        ));

        let mut tried = Vec::with_capacity(candidates.len());
        for uri in candidates {
            debug!(uri = %uri, epoch, "trying candidate");
            let attempt = tokio::time::timeout(timeout_per_candidate, self.connector.connect(uri));
            let outcome = tokio::select! {
                outcome = attempt => outcome,
                _ = shutdown_rx.changed() => {
                    debug!(uri = %uri, "connect cancelled");
                    return Err(SessionError::Cancelled);
                }
            };

            let error = match outcome {
                Ok(Ok(transport)) => return self.accept(epoch, uri, Arc::from(transport)).await,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("handshake timed out after {timeout_per_candidate:?}"),
            };
            warn!(uri = %uri, %error, "candidate failed");
            tried.push(CandidateFailure {
                uri: uri.clone(),
                error,
            });
        }

        let still_ours = {
            let mut inner = self.lock();
            let ours = inner.epoch == epoch && inner.state == ConnectionState::Connecting;
            if ours {
                inner.state = ConnectionState::Disconnected;
            }
            ours
        };
        if !still_ours {
            return Err(SessionError::Cancelled);
        }
        self.notify(Transition::new(
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            TransitionReason::AllCandidatesFailed { tried: tried.clone() },
        ));
        Err(SessionError::ConnectFailed { tried })
    }

    async fn accept(
        &self,
        epoch: u64,
        uri: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<String, SessionError> {
        let accepted = {
            let mut inner = self.lock();
            let ours = inner.epoch == epoch && inner.state == ConnectionState::Connecting;
            if ours {
                inner.state = ConnectionState::Connected;
                inner.uri = Some(uri.to_string());
                inner.transport = Some(Arc::clone(&transport));
                inner.frames_in_epoch = 0;
                inner.read_failures = 0;
            }
            ours
        };
        if !accepted {
            // disconnect() won the race; do not leak the socket.
            let _ = transport.close().await;
            return Err(SessionError::Cancelled);
        }
        info!(uri, epoch, "connected");
        self.notify(Transition::new(
            ConnectionState::Connecting,
            ConnectionState::Connected,
            TransitionReason::Handshake { uri: uri.to_string() },
        ));
        Ok(uri.to_string())
    }

    /// Waits for the next frame or telemetry message.
    ///
    /// Undersized frames and malformed telemetry are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`SessionError::StreamClosed`] when the transport is (or becomes)
    ///   closed.  The `Connected → Disconnected` transition has already been
    ///   reported when this is returned.
    /// - [`SessionError::NotConnected`] if not connected, or if
    ///   `disconnect()` interrupted the read.
    /// - [`SessionError::Transport`] for a failed read on a transport whose
    ///   closed flag still says open, up to
    ///   [`MAX_CONSECUTIVE_READ_FAILURES`] in a row.
    pub async fn receive(&self) -> Result<DeviceMessage, SessionError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let (transport, epoch) = {
            let inner = self.lock();
            match (&inner.transport, inner.state) {
                (Some(transport), ConnectionState::Connected) => {
                    (Arc::clone(transport), inner.epoch)
                }
                _ => return Err(SessionError::NotConnected),
            }
        };

        loop {
            if self.probe.is_closed(transport.as_ref()) {
                let code = reported_close_code(transport.as_ref());
                debug!(?code, "liveness probe reports transport closed before read");
                return Err(self.stream_closed(epoch, TransitionReason::RemoteClosed { code }));
            }

            let read = tokio::select! {
                read = transport.recv() => read,
                _ = shutdown_rx.changed() => return Err(SessionError::NotConnected),
            };

            match read {
                Ok(InboundMessage::Binary(payload)) => {
                    let index = {
                        let mut inner = self.lock();
                        inner.read_failures = 0;
                        inner.frames_in_epoch
                    };
                    match decode_binary(payload, epoch, index) {
                        Ok(frame) => {
                            self.lock().frames_in_epoch += 1;
                            return Ok(DeviceMessage::Frame(frame));
                        }
                        Err(e) => warn!(error = %e, "skipping binary message"),
                    }
                }
                Ok(InboundMessage::Text(text)) => {
                    self.lock().read_failures = 0;
                    match decode_text(&text) {
                        Ok(telemetry) => return Ok(DeviceMessage::Telemetry(telemetry)),
                        Err(e) => warn!(error = %e, %text, "skipping text message"),
                    }
                }
                Err(TransportError::Closed { code, reason }) => {
                    debug!(?code, %reason, "transport signalled closure");
                    let reason = TransitionReason::RemoteClosed { code };
                    return Err(self.stream_closed(epoch, reason));
                }
                Err(e) => return Err(self.read_failed(epoch, transport.as_ref(), e)),
            }
        }
    }

    /// Sends a JSON command to the device.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`], [`SessionError::Codec`] for an empty
    /// command, or [`SessionError::Transport`] if the write fails.
    pub async fn send_command(&self, command: &DeviceCommand) -> Result<(), SessionError> {
        let text = encode_command(command)?;
        debug!(%command, "sending command");
        self.send_text(text).await
    }

    /// Sends a raw text message over the current connection.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] or [`SessionError::Transport`].
    pub async fn send_text(&self, text: String) -> Result<(), SessionError> {
        let transport = {
            let inner = self.lock();
            match (&inner.transport, inner.state) {
                (Some(transport), ConnectionState::Connected) => Arc::clone(transport),
                _ => return Err(SessionError::NotConnected),
            }
        };
        transport.send_text(text).await?;
        Ok(())
    }

    /// Closes the connection from any state and ends in `Disconnected`.
    ///
    /// A no-op when already disconnected or while another disconnect is in
    /// progress.
    pub async fn disconnect(&self) {
        let (from, transport) = {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::Closing => return,
                from => {
                    inner.state = ConnectionState::Closing;
                    (from, inner.transport.take())
                }
            }
        };
        self.shutdown.send_modify(|generation| *generation += 1);
        self.notify(Transition::new(
            from,
            ConnectionState::Closing,
            TransitionReason::LocalDisconnect,
        ));

        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "error while closing transport");
            }
        }

        {
            let mut inner = self.lock();
            inner.state = ConnectionState::Disconnected;
            inner.uri = None;
        }
        info!("disconnected");
        self.notify(Transition::new(
            ConnectionState::Closing,
            ConnectionState::Disconnected,
            TransitionReason::LocalDisconnect,
        ));
    }

    /// Classifies a failed read that carried no closure signal.
    ///
    /// Only a closed flag that positively reads "open" keeps the session
    /// connected; a close code, a missing indicator, or a probe failure
    /// cannot vouch for the link.  Even then, a run of
    /// [`MAX_CONSECUTIVE_READ_FAILURES`] ends the stream.
    fn read_failed(
        &self,
        epoch: u64,
        transport: &dyn Transport,
        error: TransportError,
    ) -> SessionError {
        let verdict = self.probe.probe(transport);
        let vouched_open = !verdict.closed && verdict.decided_by == ClosedBy::Flag;
        if vouched_open {
            let failures = {
                let mut inner = self.lock();
                inner.read_failures += 1;
                inner.read_failures
            };
            if failures < MAX_CONSECUTIVE_READ_FAILURES {
                warn!(error = %error, failures, "read failed but transport reports open");
                return SessionError::Transport(error);
            }
            warn!(error = %error, failures, "repeated read failures; giving up on stream");
        } else {
            debug!(?verdict, error = %error, "read failed and transport cannot vouch for itself");
        }
        self.stream_closed(
            epoch,
            TransitionReason::ReadFailed {
                error: error.to_string(),
            },
        )
    }

    /// Moves `Connected → Disconnected` for `epoch` and reports it.
    fn stream_closed(&self, epoch: u64, reason: TransitionReason) -> SessionError {
        let still_current = {
            let mut inner = self.lock();
            let current = inner.epoch == epoch && inner.state == ConnectionState::Connected;
            if current {
                inner.state = ConnectionState::Disconnected;
                inner.transport = None;
                inner.uri = None;
            }
            current
        };

        let code = match &reason {
            TransitionReason::RemoteClosed { code } => *code,
            _ => None,
        };
        let detail = reason.to_string();
        if still_current {
            warn!(%detail, "stream closed");
            self.notify(Transition::new(
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                reason,
            ));
        }
        SessionError::StreamClosed { code, detail }
    }

    fn notify(&self, transition: Transition) {
        debug!(%transition, "session transition");
        self.observer.on_transition(&transition);
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn reported_close_code<H: LivenessSource + ?Sized>(handle: &H) -> Option<u16> {
    match handle.close_code() {
        Ok(Indicator::Available(code)) => code,
        _ => None,
    }
}
