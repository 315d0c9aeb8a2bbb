//! Scripted in-memory transport for testing sessions and recorders.
//!
//! # Why a mock transport?
//!
//! Real sockets make reconnect tests slow and flaky: closing at exactly the
//! right moment, refusing exactly the second candidate, or hanging a
//! handshake forever all need a cooperating server.  The mock replaces the
//! network with a channel that the test drives directly.
//!
//! - [`MockConnector`] answers each `connect(uri)` from a per-URI script of
//!   [`MockOutcome`]s and records every URI it was asked for.  An unscripted
//!   URI is refused.
//! - [`MockTransport::pair`] returns the transport plus a
//!   [`MockTransportHandle`] playing the device: it pushes frames and text,
//!   closes the stream, fails a read, or silently flips the closed flag.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = Arc::new(MockConnector::new());
//! let device = connector.accept("ws://cam/ws");
//! connector.refuse("ws://cam", "connection refused");
//!
//! session.connect(&candidates, Duration::from_secs(1)).await?;
//! device.send_frame(vec![0xFF; 200]);
//! device.close_remotely(Some(1006));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use camlink_core::{Indicator, LivenessSource, ProbeError};
use tokio::sync::mpsc;

use super::{Connector, InboundMessage, Transport, TransportError};

/// Which closed-state indicators a [`MockTransport`] exposes to the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockIndicators {
    /// Both the closed flag and the close code.
    #[default]
    FlagAndCode,
    /// Only the close code.
    CodeOnly,
    /// Nothing; the probe always assumes open.
    Opaque,
}

enum Scripted {
    Message(InboundMessage),
    Close(Option<u16>),
    Fail(String),
}

#[derive(Default)]
struct LinkState {
    closed: AtomicBool,
    closed_locally: AtomicBool,
    close_code: Mutex<Option<u16>>,
    sent: Mutex<Vec<String>>,
}

impl LinkState {
    fn mark_closed(&self, code: Option<u16>) {
        self.closed.store(true, Ordering::SeqCst);
        if code.is_some() {
            *self.close_code.lock().unwrap_or_else(PoisonError::into_inner) = code;
        }
    }

    fn code(&self) -> Option<u16> {
        *self.close_code.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The recorder's end of an in-memory link.
pub struct MockTransport {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Scripted>>,
    link: Arc<LinkState>,
    indicators: MockIndicators,
}

/// The device's end of an in-memory link.
#[derive(Clone)]
pub struct MockTransportHandle {
    outbound: mpsc::UnboundedSender<Scripted>,
    link: Arc<LinkState>,
}

impl MockTransport {
    /// A linked transport/handle pair exposing both indicators.
    pub fn pair() -> (MockTransport, MockTransportHandle) {
        Self::pair_with(MockIndicators::default())
    }

    pub fn pair_with(indicators: MockIndicators) -> (MockTransport, MockTransportHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(LinkState::default());
        (
            MockTransport {
                inbound: tokio::sync::Mutex::new(rx),
                link: Arc::clone(&link),
                indicators,
            },
            MockTransportHandle { outbound: tx, link },
        )
    }
}

impl MockTransportHandle {
    /// Pushes one binary message.  Returns `false` if the transport is gone.
    pub fn send_frame(&self, payload: Vec<u8>) -> bool {
        self.push(Scripted::Message(InboundMessage::Binary(payload)))
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Scripted::Message(InboundMessage::Text(text.into())))
    }

    /// The next read observes a close frame carrying `code`.
    pub fn close_remotely(&self, code: Option<u16>) -> bool {
        self.push(Scripted::Close(code))
    }

    /// The next read fails without the link being closed.
    pub fn fail_read(&self, error: impl Into<String>) -> bool {
        self.push(Scripted::Fail(error.into()))
    }

    /// Flips the closed state without delivering anything.  Only a liveness
    /// probe notices.
    pub fn drop_silently(&self, code: Option<u16>) {
        self.link.mark_closed(code);
    }

    /// Text messages the recorder sent, in order.
    pub fn sent(&self) -> Vec<String> {
        self.link.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `true` once the recorder called `close()`.
    pub fn closed_locally(&self) -> bool {
        self.link.closed_locally.load(Ordering::SeqCst)
    }

    fn push(&self, item: Scripted) -> bool {
        self.outbound.send(item).is_ok()
    }
}

impl LivenessSource for MockTransport {
    fn closed_flag(&self) -> Result<Indicator<bool>, ProbeError> {
        Ok(match self.indicators {
            MockIndicators::FlagAndCode => {
                Indicator::Available(self.link.closed.load(Ordering::SeqCst))
            }
            MockIndicators::CodeOnly | MockIndicators::Opaque => Indicator::Unavailable,
        })
    }

    fn close_code(&self) -> Result<Indicator<Option<u16>>, ProbeError> {
        Ok(match self.indicators {
            MockIndicators::FlagAndCode | MockIndicators::CodeOnly => {
                Indicator::Available(self.link.code())
            }
            MockIndicators::Opaque => Indicator::Unavailable,
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&self) -> Result<InboundMessage, TransportError> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(Scripted::Message(message)) => Ok(message),
            Some(Scripted::Close(code)) => {
                self.link.mark_closed(code);
                Err(TransportError::Closed {
                    code,
                    reason: "closed by mock peer".to_string(),
                })
            }
            Some(Scripted::Fail(error)) => Err(TransportError::Io(error)),
            None => {
                self.link.mark_closed(None);
                Err(TransportError::Closed {
                    code: None,
                    reason: "mock peer dropped".to_string(),
                })
            }
        }
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.link.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                code: self.link.code(),
                reason: "send on closed connection".to_string(),
            });
        }
        self.link
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.link.closed_locally.store(true, Ordering::SeqCst);
        self.link.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What [`MockConnector`] does for one connection attempt.
pub enum MockOutcome {
    Accept(MockTransport),
    Refuse(String),
    /// Never completes; only a timeout or cancellation ends the attempt.
    Hang,
}

/// A [`Connector`] answering from per-URI scripts.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    attempts: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `outcome` for the next attempt against `uri`.
    pub fn script(&self, uri: &str, outcome: MockOutcome) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uri.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queues an accepted connection and returns the device-side handle.
    pub fn accept(&self, uri: &str) -> MockTransportHandle {
        self.accept_with(uri, MockIndicators::default())
    }

    /// Like [`accept`](Self::accept), with a transport exposing only
    /// `indicators`.
    pub fn accept_with(&self, uri: &str, indicators: MockIndicators) -> MockTransportHandle {
        let (transport, handle) = MockTransport::pair_with(indicators);
        self.script(uri, MockOutcome::Accept(transport));
        handle
    }

    pub fn refuse(&self, uri: &str, reason: &str) {
        self.script(uri, MockOutcome::Refuse(reason.to_string()));
    }

    pub fn hang(&self, uri: &str) {
        self.script(uri, MockOutcome::Hang);
    }

    /// Every URI passed to `connect`, in call order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, uri: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(uri.to_string());

        let outcome = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(uri)
            .and_then(VecDeque::pop_front);

        match outcome {
            Some(MockOutcome::Accept(transport)) => Ok(Box::new(transport)),
            Some(MockOutcome::Refuse(reason)) => Err(TransportError::Handshake {
                uri: uri.to_string(),
                reason,
            }),
            Some(MockOutcome::Hang) => std::future::pending().await,
            None => Err(TransportError::Handshake {
                uri: uri.to_string(),
                reason: "connection refused (unscripted)".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_uri_is_refused_and_recorded() {
        let connector = MockConnector::new();
        let result = connector.connect("ws://nowhere").await;
        assert!(matches!(result, Err(TransportError::Handshake { .. })));
        assert_eq!(connector.attempts(), vec!["ws://nowhere".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_messages_arrive_in_order_then_close() {
        // Arrange
        let (transport, device) = MockTransport::pair();
        device.send_text("{}");
        device.send_frame(vec![1, 2, 3]);
        device.close_remotely(Some(1000));

        // Act / Assert
        assert_eq!(transport.recv().await, Ok(InboundMessage::Text("{}".into())));
        assert_eq!(transport.recv().await, Ok(InboundMessage::Binary(vec![1, 2, 3])));
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::Closed { code: Some(1000), .. })
        ));
        assert_eq!(transport.close_code(), Ok(Indicator::Available(Some(1000))));
    }

    #[tokio::test]
    async fn test_send_text_is_recorded_until_closed() {
        let (transport, device) = MockTransport::pair();
        transport.send_text("a".into()).await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.send_text("b".into()).await.is_err());
        assert_eq!(device.sent(), vec!["a".to_string()]);
        assert!(device.closed_locally());
    }

    #[test]
    fn test_opaque_mock_exposes_no_indicator() {
        let (transport, device) = MockTransport::pair_with(MockIndicators::Opaque);
        device.drop_silently(Some(1006));
        assert_eq!(transport.closed_flag(), Ok(Indicator::Unavailable));
        assert_eq!(transport.close_code(), Ok(Indicator::Unavailable));
    }
}
