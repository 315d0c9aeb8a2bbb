//! `Recorder`: the inbound interface used by the GUI or the CLI.
//!
//! ```text
//! start_recording(raw)
//!   │  AddressResolver ──▶ candidates
//!   │  new ConnectionSession (owned by this recording)
//!   │  supervisor.start(raw)
//!   ▼
//! session.connect(candidates) ──▶ spawn receive pump
//!                                   │ frames    ──▶ ThroughputMonitor + FrameSink
//!                                   │ telemetry ──▶ EventSink
//!                                   │ closed    ──▶ (observer) supervisor.notify_stream_closed()
//!                                   ▼
//!                  supervisor timer ──▶ reconnect(raw) ──▶ session.connect(...) ──▶ new pump
//! ```
//!
//! The session observer and the supervisor target both hold only a `Weak`
//! reference back to the recorder, so dropping the last [`Recorder`] handle
//! tears everything down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use camlink_core::{
    AddressCandidates, AddressError, AddressResolver, ConnectionState, DeviceCommand,
    DeviceKind, DeviceMessage, DeviceTelemetry, ReconnectPolicy, ThroughputMonitor, Transition,
};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::events::{EventSink, FrameSink, RecorderEvent, StopReason};
use crate::application::supervisor::{ReconnectSupervisor, SupervisedTarget};
use crate::infrastructure::session::{ConnectionSession, SessionError, SessionObserver};
use crate::infrastructure::transport::Connector;

/// Errors returned by [`Recorder`] operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecorderError {
    /// The address could not be turned into candidates.  Never retried.
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The reconnect budget ran out and the recording was stopped.
    #[error("reconnect failed after {attempts} attempts; recording stopped")]
    ReconnectExhausted { attempts: u32 },

    #[error("a recording is already running")]
    AlreadyRecording,

    #[error("no recording is running")]
    NotRecording,
}

/// Runtime settings for a [`Recorder`].
///
/// | Field               | Default |
/// |---------------------|---------|
/// | `policy`            | 5 attempts, 5 s apart |
/// | `connect_timeout`   | 10 s per candidate |
/// | `stall_warning`     | 60 s    |
/// | `throughput_window` | 1 s     |
/// | `device_kind`       | unknown (no mDNS fallback) |
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub stall_warning: Duration,
    pub throughput_window: Duration,
    pub device_kind: DeviceKind,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            stall_warning: Duration::from_secs(60),
            throughput_window: camlink_core::domain::throughput::DEFAULT_WINDOW,
            device_kind: DeviceKind::Unknown,
        }
    }
}

/// Snapshot returned by [`Recorder::get_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub state: ConnectionState,
    pub recording: bool,
    /// Frames per second over the last complete window.
    pub fps: f64,
    /// Reconnect attempts spent since the last successful connection.
    pub reconnect_attempt: u32,
    pub max_attempts: u32,
    pub frames_received: u64,
    /// The raw address the recording was started with.
    pub address: Option<String>,
    pub connected_uri: Option<String>,
    pub telemetry: DeviceTelemetry,
}

/// The live part of one recording.
struct Recording {
    id: u64,
    raw_address: String,
    session: Arc<ConnectionSession>,
    pump: Option<JoinHandle<()>>,
}

struct Core {
    settings: RecorderSettings,
    resolver: AddressResolver,
    connector: Arc<dyn Connector>,
    events: Arc<dyn EventSink>,
    frames: Arc<dyn FrameSink>,
    supervisor: ReconnectSupervisor,
    recording: Mutex<Option<Recording>>,
    next_recording_id: Mutex<u64>,
    throughput: Mutex<ThroughputMonitor>,
    telemetry: Mutex<DeviceTelemetry>,
}

/// Keeps a device stream alive for the length of a recording.
///
/// Cheap to clone; clones share the same recording.
#[derive(Clone)]
pub struct Recorder {
    core: Arc<Core>,
}

impl Recorder {
    pub fn new(
        settings: RecorderSettings,
        connector: Arc<dyn Connector>,
        events: Arc<dyn EventSink>,
        frames: Arc<dyn FrameSink>,
    ) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<Core>| {
            let target: Arc<dyn SupervisedTarget> = Arc::new(SupervisorLink { core: weak.clone() });
            Core {
                resolver: AddressResolver::new().with_device_kind(settings.device_kind),
                supervisor: ReconnectSupervisor::new(settings.policy, Arc::clone(&events), target),
                throughput: Mutex::new(ThroughputMonitor::with_window(
                    settings.throughput_window,
                    now(),
                )),
                settings,
                connector,
                events,
                frames,
                recording: Mutex::new(None),
                next_recording_id: Mutex::new(0),
                telemetry: Mutex::new(DeviceTelemetry::default()),
            }
        });
        Self { core }
    }

    /// Resolves `raw_address`, connects, and starts streaming.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::InvalidAddress`] immediately for bad input.
    /// - [`RecorderError::AlreadyRecording`] if a recording is running.
    /// - [`RecorderError::Session`] if the initial connection fails; no
    ///   reconnect is attempted and the recording is not started.
    pub async fn start_recording(&self, raw_address: &str) -> Result<(), RecorderError> {
        let core = &self.core;
        let candidates = core.resolver.resolve(raw_address)?;

        let (id, session) = {
            let mut recording = lock(&core.recording);
            if recording.is_some() {
                return Err(RecorderError::AlreadyRecording);
            }
            let id = {
                let mut next = lock(&core.next_recording_id);
                *next += 1;
                *next
            };
            let observer: Arc<dyn SessionObserver> = Arc::new(SessionLink {
                core: Arc::downgrade(core),
                recording_id: id,
            });
            let session = Arc::new(ConnectionSession::new(Arc::clone(&core.connector), observer));
            *recording = Some(Recording {
                id,
                raw_address: raw_address.trim().to_string(),
                session: Arc::clone(&session),
                pump: None,
            });
            (id, session)
        };

        *lock(&core.throughput) =
            ThroughputMonitor::with_window(core.settings.throughput_window, now());
        *lock(&core.telemetry) = DeviceTelemetry::default();
        core.supervisor.start(raw_address.trim());
        info!(raw_address, %candidates, kind = %core.resolver.device_kind(), "recording started");
        core.events.on_event(&RecorderEvent::RecordingStarted {
            address: raw_address.trim().to_string(),
        });

        if let Err(e) = core.connect_and_pump(id, &session, &candidates).await {
            error!(error = %e, "initial connection failed");
            core.supervisor.stop();
            core.finish(id, StopReason::ConnectFailed).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Ends the recording: cancels pending retries and disconnects.
    ///
    /// # Errors
    ///
    /// [`RecorderError::NotRecording`] if nothing is running.
    pub async fn stop_recording(&self) -> Result<(), RecorderError> {
        let id = lock(&self.core.recording)
            .as_ref()
            .map(|r| r.id)
            .ok_or(RecorderError::NotRecording)?;
        self.core.supervisor.stop();
        self.core.finish(id, StopReason::Requested).await;
        Ok(())
    }

    /// Sends a JSON command to the device.
    ///
    /// # Errors
    ///
    /// [`RecorderError::NotRecording`] or the session's send error.
    pub async fn send_command(&self, command: &DeviceCommand) -> Result<(), RecorderError> {
        let session = lock(&self.core.recording)
            .as_ref()
            .map(|r| Arc::clone(&r.session))
            .ok_or(RecorderError::NotRecording)?;
        session.send_command(command).await?;
        Ok(())
    }

    pub fn get_status(&self) -> RecorderStatus {
        let core = &self.core;
        let (state, recording, address, connected_uri) = match lock(&core.recording).as_ref() {
            Some(r) => (
                r.session.state(),
                true,
                Some(r.raw_address.clone()),
                r.session.connected_uri(),
            ),
            None => (ConnectionState::Disconnected, false, None, None),
        };
        let (fps, frames_received) = {
            let mut throughput = lock(&core.throughput);
            (throughput.current_rate_at(now()), throughput.total_frames())
        };
        RecorderStatus {
            state,
            recording,
            fps,
            reconnect_attempt: core.supervisor.attempts_used(),
            max_attempts: core.supervisor.policy().max_attempts,
            frames_received,
            address,
            connected_uri,
            telemetry: lock(&core.telemetry).clone(),
        }
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.core.recording).is_some()
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.core.settings
    }
}

impl Core {
    /// Connects `session` and, on success, spawns its receive pump.
    async fn connect_and_pump(
        self: &Arc<Self>,
        id: u64,
        session: &Arc<ConnectionSession>,
        candidates: &AddressCandidates,
    ) -> Result<(), SessionError> {
        session.connect(candidates, self.settings.connect_timeout).await?;

        let adopted = {
            let mut recording = lock(&self.recording);
            match recording.as_mut() {
                Some(r) if r.id == id => {
                    let pump = tokio::spawn(receive_pump(
                        Arc::downgrade(self),
                        Arc::clone(session),
                        self.settings.stall_warning,
                    ));
                    if let Some(old) = r.pump.replace(pump) {
                        // The previous epoch's pump has already returned.
                        old.abort();
                    }
                    true
                }
                _ => false,
            }
        };
        if !adopted {
            debug!(id, "recording ended during connect; closing orphaned connection");
            session.disconnect().await;
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    /// Tears down recording `id` and reports why it ended.
    async fn finish(&self, id: u64, reason: StopReason) {
        let taken = {
            let mut recording = lock(&self.recording);
            match recording.as_ref() {
                Some(r) if r.id == id => recording.take(),
                _ => None,
            }
        };
        let Some(recording) = taken else {
            debug!(id, "recording already finished");
            return;
        };

        recording.session.disconnect().await;
        if let Some(pump) = recording.pump {
            if let Err(e) = pump.await {
                if e.is_panic() {
                    error!("receive pump panicked");
                }
            }
        }

        let frames = lock(&self.throughput).total_frames();
        info!(%reason, frames, "recording stopped");
        self.events
            .on_event(&RecorderEvent::RecordingStopped { reason, frames });
    }

    fn current_recording(&self) -> Option<(u64, String, Arc<ConnectionSession>)> {
        lock(&self.recording)
            .as_ref()
            .map(|r| (r.id, r.raw_address.clone(), Arc::clone(&r.session)))
    }

    fn on_frame(&self, frame: &camlink_core::Frame) {
        lock(&self.throughput).on_frame_received_at(now());
        self.frames.on_frame(frame);
    }

    fn on_telemetry(&self, telemetry: DeviceTelemetry) {
        lock(&self.telemetry).merge(telemetry.clone());
        self.events.on_event(&RecorderEvent::Telemetry(telemetry));
    }
}

/// Reads from `session` until the stream closes or the session disconnects.
async fn receive_pump(core: Weak<Core>, session: Arc<ConnectionSession>, stall_warning: Duration) {
    debug!(epoch = session.epoch(), "receive pump started");
    loop {
        let received = tokio::time::timeout(stall_warning, session.receive()).await;
        let Some(core) = core.upgrade() else {
            return;
        };
        match received {
            Err(_) => {
                warn!(?stall_warning, "no data from device");
                core.events.on_event(&RecorderEvent::StreamStalled {
                    silent_for: stall_warning,
                });
            }
            Ok(Ok(DeviceMessage::Frame(frame))) => core.on_frame(&frame),
            Ok(Ok(DeviceMessage::Telemetry(telemetry))) => core.on_telemetry(telemetry),
            Ok(Err(SessionError::StreamClosed { .. })) => {
                debug!("receive pump exiting: stream closed");
                return;
            }
            Ok(Err(SessionError::NotConnected)) => {
                debug!("receive pump exiting: session disconnected");
                return;
            }
            Ok(Err(e)) => warn!(error = %e, "transient receive error"),
        }
    }
}

/// Session observer for one recording.
struct SessionLink {
    core: Weak<Core>,
    recording_id: u64,
}

impl SessionObserver for SessionLink {
    fn on_transition(&self, transition: &Transition) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        core.events
            .on_event(&RecorderEvent::StateChanged(transition.clone()));

        let current = core
            .current_recording()
            .is_some_and(|(id, _, _)| id == self.recording_id);
        if !current {
            return;
        }
        if transition.to == ConnectionState::Connected {
            lock(&core.throughput).reset(now());
            core.supervisor.on_connected();
        } else if transition.to == ConnectionState::Disconnected
            && transition.reason.is_stream_closed()
        {
            core.supervisor.notify_stream_closed();
        }
    }
}

/// Reconnect target handed to the supervisor.
struct SupervisorLink {
    core: Weak<Core>,
}

#[async_trait]
impl SupervisedTarget for SupervisorLink {
    async fn reconnect(&self, raw_address: &str) -> Result<(), RecorderError> {
        let core = self.core.upgrade().ok_or(RecorderError::NotRecording)?;
        let candidates = core.resolver.resolve(raw_address)?;
        let (id, _, session) = core.current_recording().ok_or(RecorderError::NotRecording)?;
        core.connect_and_pump(id, &session, &candidates).await?;
        Ok(())
    }

    async fn stop_recording(&self, attempts: u32) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if let Some((id, _, _)) = core.current_recording() {
            core.finish(id, StopReason::ReconnectExhausted { attempts }).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Monotonic "now" that follows tokio's clock, so paused-time tests see
/// consistent frame rates.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::session::MAX_CONSECUTIVE_READ_FAILURES;
    use crate::infrastructure::transport::mock::{MockConnector, MockIndicators};
    use camlink_core::Frame;

    const DELAY: Duration = Duration::from_secs(5);

    fn jpeg(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[0] = 0xFF;
        bytes[1] = 0xD8;
        bytes
    }

    struct Harness {
        recorder: Recorder,
        connector: Arc<MockConnector>,
        events: Arc<Mutex<Vec<RecorderEvent>>>,
        frames: Arc<Mutex<Vec<Frame>>>,
    }

    fn harness(max_attempts: u32) -> Harness {
        let connector = Arc::new(MockConnector::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let event_log = Arc::clone(&events);
        let frame_log = Arc::clone(&frames);
        let settings = RecorderSettings {
            policy: ReconnectPolicy {
                max_attempts,
                retry_delay: DELAY,
            },
            connect_timeout: Duration::from_secs(1),
            ..RecorderSettings::default()
        };
        let recorder = Recorder::new(
            settings,
            connector.clone(),
            Arc::new(move |e: &RecorderEvent| event_log.lock().unwrap().push(e.clone())),
            Arc::new(move |f: &Frame| frame_log.lock().unwrap().push(f.clone())),
        );
        Harness {
            recorder,
            connector,
            events,
            frames,
        }
    }

    fn count<F: Fn(&RecorderEvent) -> bool>(events: &Mutex<Vec<RecorderEvent>>, f: F) -> usize {
        events.lock().unwrap().iter().filter(|e| f(e)).count()
    }

    /// Lets spawned pumps and timers run without advancing time much.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_recording_streams_frames_to_sink() {
        // Arrange
        let h = harness(5);
        let device = h.connector.accept("ws://cam");

        // Act
        h.recorder.start_recording("cam").await.unwrap();
        device.send_frame(jpeg(128));
        device.send_frame(jpeg(256));
        settle().await;

        // Assert
        let frames = h.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].index, 1);
        let status = h.recorder.get_status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.frames_received, 2);
        assert_eq!(status.connected_uri.as_deref(), Some("ws://cam"));
        assert!(status.recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_fails_without_connecting() {
        let h = harness(5);
        let err = h.recorder.start_recording("ftp://cam").await.unwrap_err();
        assert!(matches!(err, RecorderError::InvalidAddress(_)));
        assert_eq!(h.connector.attempt_count(), 0);
        assert!(!h.recorder.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_connect_failure_does_not_schedule_retries() {
        // Arrange
        let h = harness(5);

        // Act
        let err = h.recorder.start_recording("cam").await.unwrap_err();
        tokio::time::sleep(DELAY * 3).await;

        // Assert
        assert!(matches!(err, RecorderError::Session(SessionError::ConnectFailed { .. })));
        assert_eq!(h.connector.attempt_count(), 2);
        assert!(!h.recorder.is_recording());
        assert_eq!(
            count(&h.events, |e| matches!(e, RecorderEvent::ReconnectScheduled { .. })),
            0
        );
        assert_eq!(
            count(&h.events, |e| matches!(
                e,
                RecorderEvent::RecordingStopped { reason: StopReason::ConnectFailed, .. }
            )),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_reconnects_after_delay_and_resets_attempts() {
        // Arrange
        let h = harness(5);
        let first = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();
        let second = h.connector.accept("ws://cam");

        // Act
        first.close_remotely(Some(1006));
        settle().await;
        let during_outage = h.recorder.get_status();
        tokio::time::sleep(DELAY).await;
        second.send_frame(jpeg(300));
        settle().await;

        // Assert
        assert_eq!(during_outage.state, ConnectionState::Disconnected);
        assert_eq!(during_outage.reconnect_attempt, 1);
        let status = h.recorder.get_status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.reconnect_attempt, 0);
        let frames = h.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].epoch, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_on_opaque_transport_schedules_reconnect() {
        // Arrange: the first connection exposes no closed-state indicator.
        let h = harness(5);
        let first = h.connector.accept_with("ws://cam", MockIndicators::Opaque);
        h.recorder.start_recording("cam").await.unwrap();
        let second = h.connector.accept("ws://cam");

        // Act
        first.close_remotely(Some(1006));
        settle().await;
        let during_outage = h.recorder.get_status();
        tokio::time::sleep(DELAY).await;
        second.send_frame(jpeg(300));
        settle().await;

        // Assert
        assert_eq!(during_outage.state, ConnectionState::Disconnected);
        assert_eq!(during_outage.reconnect_attempt, 1);
        assert_eq!(
            count(&h.events, |e| matches!(
                e,
                RecorderEvent::ReconnectScheduled { attempt: 1, .. }
            )),
            1
        );
        assert_eq!(h.connector.attempt_count(), 2);
        assert_eq!(h.recorder.get_status().state, ConnectionState::Connected);
        let frames = h.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].epoch, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_device_handle_schedules_reconnect() {
        // Arrange
        let h = harness(5);
        let first = h.connector.accept_with("ws://cam", MockIndicators::Opaque);
        h.recorder.start_recording("cam").await.unwrap();
        let _second = h.connector.accept("ws://cam");

        // Act
        drop(first);
        settle().await;
        let during_outage = h.recorder.get_status();
        tokio::time::sleep(DELAY).await;

        // Assert
        assert_eq!(during_outage.state, ConnectionState::Disconnected);
        assert_eq!(during_outage.reconnect_attempt, 1);
        assert_eq!(h.recorder.get_status().state, ConnectionState::Connected);
        assert_eq!(h.connector.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_read_failures_end_stream_and_reconnect() {
        // Arrange: the closed flag keeps saying open while every read fails.
        let h = harness(5);
        let first = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();
        let _second = h.connector.accept("ws://cam");

        // Act
        for _ in 0..MAX_CONSECUTIVE_READ_FAILURES {
            first.fail_read("hiccup");
        }
        settle().await;
        let during_outage = h.recorder.get_status();
        tokio::time::sleep(DELAY).await;

        // Assert
        assert_eq!(during_outage.state, ConnectionState::Disconnected);
        assert_eq!(
            count(&h.events, |e| matches!(
                e,
                RecorderEvent::ReconnectScheduled { attempt: 1, .. }
            )),
            1
        );
        assert_eq!(h.recorder.get_status().state, ConnectionState::Connected);
        assert_eq!(h.connector.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_stops_recording_with_no_extra_attempt() {
        // Arrange
        let h = harness(2);
        let device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        // Act: the device disappears for good
        device.close_remotely(None);
        tokio::time::sleep(DELAY * 10).await;

        // Assert: 1 initial + 2 retries × 2 candidates
        assert_eq!(h.connector.attempt_count(), 1 + 2 * 2);
        assert!(!h.recorder.is_recording());
        assert_eq!(
            count(&h.events, |e| matches!(e, RecorderEvent::ReconnectExhausted { attempts: 2 })),
            1
        );
        assert_eq!(
            count(&h.events, |e| matches!(
                e,
                RecorderEvent::RecordingStopped {
                    reason: StopReason::ReconnectExhausted { attempts: 2 },
                    ..
                }
            )),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_pending_retry_prevents_attempt() {
        // Arrange
        let h = harness(5);
        let device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();
        device.close_remotely(None);
        settle().await;

        // Act
        h.recorder.stop_recording().await.unwrap();
        tokio::time::sleep(DELAY * 2).await;

        // Assert
        assert_eq!(h.connector.attempt_count(), 1);
        let status = h.recorder.get_status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_recording_disconnects_and_reports() {
        let h = harness(5);
        let device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        h.recorder.stop_recording().await.unwrap();

        assert!(device.closed_locally());
        assert_eq!(
            count(&h.events, |e| matches!(
                e,
                RecorderEvent::RecordingStopped { reason: StopReason::Requested, .. }
            )),
            1
        );
        assert_eq!(h.recorder.stop_recording().await, Err(RecorderError::NotRecording));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected_while_recording() {
        let h = harness(5);
        let _device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        assert_eq!(
            h.recorder.start_recording("cam").await,
            Err(RecorderError::AlreadyRecording)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_is_merged_into_status() {
        let h = harness(5);
        let device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        device.send_text(r#"{"battery": 80}"#);
        device.send_text(r#"{"brightness": 12}"#);
        settle().await;

        let telemetry = h.recorder.get_status().telemetry;
        assert_eq!(telemetry.battery, Some(80.0));
        assert_eq!(telemetry.brightness, Some(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_emits_stall_warning_without_reconnecting() {
        let h = harness(5);
        let _device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(
            count(&h.events, |e| matches!(e, RecorderEvent::StreamStalled { .. })),
            1
        );
        assert_eq!(h.recorder.get_status().state, ConnectionState::Connected);
        assert_eq!(h.connector.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fps_reflects_previous_window() {
        let h = harness(5);
        let device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        for _ in 0..12 {
            device.send_frame(jpeg(200));
        }
        settle().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.recorder.get_status().fps, 12.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_command_goes_to_device() {
        let h = harness(5);
        let device = h.connector.accept("ws://cam");
        h.recorder.start_recording("cam").await.unwrap();

        h.recorder
            .send_command(&DeviceCommand::set_brightness(200))
            .await
            .unwrap();

        assert_eq!(device.sent(), vec![r#"{"brightness":200}"#.to_string()]);
    }
}
