//! WebSocket transport to the camera.
//!
//! The session layer talks to the device only through two seams:
//!
//! - [`Connector`] performs one handshake against one URI;
//! - [`Transport`] is the established link: read, write, close, and answer
//!   liveness questions via [`LivenessSource`].
//!
//! [`WsConnector`] / [`WsTransport`] implement them over `tokio-tungstenite`.
//! The [`mock`] module provides scripted in-memory versions for tests.
//!
//! Only plain `ws://` is enabled; `wss://` candidates fail their handshake
//! with a TLS-not-enabled error and the session moves on to the next one.

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use camlink_core::{Indicator, LivenessSource, ProbeError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

/// Errors raised by a [`Connector`] or [`Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The WebSocket handshake with `uri` failed.
    #[error("handshake with {uri} failed: {reason}")]
    Handshake { uri: String, reason: String },

    /// The stream is closed; `code` is the peer's close code when one was sent.
    #[error("connection closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// An I/O error on the established connection.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The peer violated the WebSocket protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A data-bearing message from the device.  Control frames never surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Binary(Vec<u8>),
    Text(String),
}

/// An established link to the device.
///
/// Methods take `&self` so that a pending `recv` does not block `send_text`
/// or `close` issued from another task.
#[async_trait]
pub trait Transport: LivenessSource + Send + Sync {
    /// Waits for the next binary or text message.
    async fn recv(&self) -> Result<InboundMessage, TransportError>;

    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Starts the closing handshake.  Closing an already-closed transport is
    /// not an error.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Box<dyn Transport>, TransportError>;
}

// ── tokio-tungstenite implementation ──────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects with [`tokio_tungstenite::connect_async`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, uri: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) = connect_async(uri).await.map_err(|e| TransportError::Handshake {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        debug!(uri, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsTransport::new(stream)))
    }
}

/// An established tungstenite WebSocket.
///
/// The stream is split so reads and writes lock independently.  Closure is
/// tracked locally: both the closed flag and the peer's close code are
/// exposed to the liveness probe.
pub struct WsTransport {
    reader: tokio::sync::Mutex<SplitStream<WsStream>>,
    writer: tokio::sync::Mutex<SplitSink<WsStream, WsMessage>>,
    closed: AtomicBool,
    close_code: Mutex<Option<u16>>,
}

impl WsTransport {
    fn new(stream: WsStream) -> Self {
        let (writer, reader) = stream.split();
        Self {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            closed: AtomicBool::new(false),
            close_code: Mutex::new(None),
        }
    }

    fn mark_closed(&self, code: Option<u16>) {
        self.closed.store(true, Ordering::SeqCst);
        if code.is_some() {
            *self.close_code.lock().unwrap_or_else(PoisonError::into_inner) = code;
        }
    }

    fn closed_error(&self, reason: impl Into<String>) -> TransportError {
        TransportError::Closed {
            code: *self.close_code.lock().unwrap_or_else(PoisonError::into_inner),
            reason: reason.into(),
        }
    }
}

impl LivenessSource for WsTransport {
    fn closed_flag(&self) -> Result<Indicator<bool>, ProbeError> {
        Ok(Indicator::Available(self.closed.load(Ordering::SeqCst)))
    }

    fn close_code(&self) -> Result<Indicator<Option<u16>>, ProbeError> {
        let code = *self
            .close_code
            .lock()
            .map_err(|_| ProbeError("close code lock poisoned".to_string()))?;
        Ok(Indicator::Available(code))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&self) -> Result<InboundMessage, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(WsMessage::Binary(bytes))) => return Ok(InboundMessage::Binary(bytes)),
                Some(Ok(WsMessage::Text(text))) => return Ok(InboundMessage::Text(text)),
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, "close frame without status".to_string()),
                    };
                    debug!(?code, %reason, "peer sent close frame");
                    self.mark_closed(code);
                    return Err(self.closed_error(reason));
                }
                // tungstenite answers pings itself.
                Some(Ok(other)) => trace!(?other, "skipping control frame"),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    self.mark_closed(None);
                    return Err(self.closed_error("stream ended"));
                }
                // Any other tungstenite error leaves the stream unusable.
                Some(Err(WsError::Protocol(e))) => {
                    self.mark_closed(None);
                    return Err(TransportError::Protocol(e.to_string()));
                }
                Some(Err(e)) => {
                    self.mark_closed(None);
                    return Err(TransportError::Io(e.to_string()));
                }
            }
        }
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error("send on closed connection"));
        }
        let mut writer = self.writer.lock().await;
        writer.send(WsMessage::Text(text)).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                self.mark_closed(None);
                self.closed_error("send on closed connection")
            }
            other => TransportError::Io(other.to_string()),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        match writer.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }
}
