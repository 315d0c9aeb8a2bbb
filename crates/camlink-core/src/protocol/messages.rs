//! Messages exchanged with a CamLink device.
//!
//! The device side of the link is deliberately simple:
//!
//! - **binary** WebSocket messages carry one encoded image each (JPEG in
//!   practice);
//! - **text** WebSocket messages carry a JSON object with telemetry such as
//!   battery level and LED brightness;
//! - the recorder may send **text** JSON objects back as commands.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Image encoding detected from the payload's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    Jpeg,
    Unknown,
}

impl FrameFormat {
    /// JPEG start-of-image marker.
    const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

    pub fn detect(payload: &[u8]) -> Self {
        if payload.starts_with(&Self::JPEG_SOI) {
            FrameFormat::Jpeg
        } else {
            FrameFormat::Unknown
        }
    }

    /// File extension used when a frame is written to disk.
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Unknown => "bin",
        }
    }
}

/// One image received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Connection epoch the frame arrived on; bumps on every new connection.
    pub epoch: u64,
    /// 0-based position of the frame within its epoch.
    pub index: u64,
    pub format: FrameFormat,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Telemetry pushed by the device as a JSON text message.
///
/// All fields are optional; firmware versions differ in what they report.
/// Unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    /// Battery charge in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f32>,
    /// LED brightness as reported by the firmware.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i64>,
    /// Free-form status line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceTelemetry {
    /// Merges the fields present in `update` over `self`.
    pub fn merge(&mut self, update: DeviceTelemetry) {
        if update.battery.is_some() {
            self.battery = update.battery;
        }
        if update.brightness.is_some() {
            self.brightness = update.brightness;
        }
        if update.status.is_some() {
            self.status = update.status;
        }
        self.extra.extend(update.extra);
    }

    /// Short single-line rendering, e.g. `status ok | battery 87% | brightness 120`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = &self.status {
            parts.push(format!("status {status}"));
        }
        if let Some(battery) = self.battery {
            parts.push(format!("battery {battery}%"));
        }
        if let Some(brightness) = self.brightness {
            parts.push(format!("brightness {brightness}"));
        }
        if parts.is_empty() {
            "no telemetry".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

/// Anything `receive()` can yield.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Frame(Frame),
    Telemetry(DeviceTelemetry),
}

/// A JSON object sent to the device.
///
/// # Examples
///
/// ```rust
/// use camlink_core::DeviceCommand;
///
/// let cmd = DeviceCommand::set_brightness(80);
/// assert_eq!(camlink_core::encode_command(&cmd).unwrap(), r#"{"brightness":80}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceCommand(Map<String, Value>);

impl DeviceCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) one key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set_brightness(level: u8) -> Self {
        Self::new().with("brightness", level)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for DeviceCommand {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "command [{}]", keys.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_jpeg_by_soi_marker() {
        assert_eq!(FrameFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), FrameFormat::Jpeg);
        assert_eq!(FrameFormat::detect(b"PNG"), FrameFormat::Unknown);
        assert_eq!(FrameFormat::detect(&[]), FrameFormat::Unknown);
    }

    #[test]
    fn test_telemetry_merge_keeps_fields_missing_from_update() {
        // Arrange
        let mut current = DeviceTelemetry {
            battery: Some(90.0),
            brightness: Some(100),
            ..Default::default()
        };
        let update = DeviceTelemetry {
            brightness: Some(40),
            ..Default::default()
        };

        // Act
        current.merge(update);

        // Assert
        assert_eq!(current.battery, Some(90.0));
        assert_eq!(current.brightness, Some(40));
    }

    #[test]
    fn test_telemetry_summary_lists_known_fields() {
        let t = DeviceTelemetry {
            status: Some("ok".into()),
            battery: Some(87.0),
            brightness: Some(120),
            ..Default::default()
        };
        assert_eq!(t.summary(), "status ok | battery 87% | brightness 120");
        assert_eq!(DeviceTelemetry::default().summary(), "no telemetry");
    }

    #[test]
    fn test_command_builder_overwrites_same_key() {
        let cmd = DeviceCommand::new().with("brightness", 10).with("brightness", 20);
        assert_eq!(cmd.fields().get("brightness"), Some(&Value::from(20)));
    }
}
