//! Codec between raw WebSocket payloads and device messages.
//!
//! Binary payloads are frames; anything shorter than [`MIN_FRAME_BYTES`] is a
//! truncated or keep-alive blob, not an image.  Text payloads are JSON
//! telemetry objects.

use thiserror::Error;

use crate::protocol::messages::{DeviceCommand, DeviceTelemetry, Frame, FrameFormat};

/// Smallest binary payload accepted as an image.
pub const MIN_FRAME_BYTES: usize = 100;

/// Errors that can occur while decoding device payloads or encoding commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The binary payload is too short to be an image.
    #[error("frame too small: need at least {min} bytes, got {len}")]
    FrameTooSmall { len: usize, min: usize },

    /// A text message was not a JSON telemetry object.
    #[error("invalid telemetry: {0}")]
    InvalidTelemetry(String),

    /// A command without any keys.
    #[error("command has no fields")]
    EmptyCommand,

    /// The command could not be serialized.
    #[error("command serialization failed: {0}")]
    Serialize(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Wraps a binary payload into a [`Frame`].
///
/// # Errors
///
/// Returns [`CodecError::FrameTooSmall`] if `payload` is shorter than
/// [`MIN_FRAME_BYTES`].
pub fn decode_binary(payload: Vec<u8>, epoch: u64, index: u64) -> Result<Frame, CodecError> {
    if payload.len() < MIN_FRAME_BYTES {
        return Err(CodecError::FrameTooSmall {
            len: payload.len(),
            min: MIN_FRAME_BYTES,
        });
    }
    Ok(Frame {
        epoch,
        index,
        format: FrameFormat::detect(&payload),
        payload,
    })
}

/// Parses a text payload as telemetry.
///
/// # Errors
///
/// Returns [`CodecError::InvalidTelemetry`] for malformed JSON or a JSON value
/// that is not an object with the expected field types.
pub fn decode_text(text: &str) -> Result<DeviceTelemetry, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::InvalidTelemetry(e.to_string()))
}

/// Serializes a command to the JSON text sent over the wire.
///
/// # Errors
///
/// Returns [`CodecError::EmptyCommand`] for a command with no fields.
pub fn encode_command(command: &DeviceCommand) -> Result<String, CodecError> {
    if command.is_empty() {
        return Err(CodecError::EmptyCommand);
    }
    serde_json::to_string(command).map_err(|e| CodecError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[0] = 0xFF;
        bytes[1] = 0xD8;
        bytes
    }

    #[test]
    fn test_decode_binary_accepts_minimum_size() {
        let frame = decode_binary(jpeg(MIN_FRAME_BYTES), 3, 7).unwrap();
        assert_eq!(frame.epoch, 3);
        assert_eq!(frame.index, 7);
        assert_eq!(frame.format, FrameFormat::Jpeg);
        assert_eq!(frame.len(), MIN_FRAME_BYTES);
    }

    #[test]
    fn test_decode_binary_rejects_short_payload() {
        assert_eq!(
            decode_binary(vec![0xFF, 0xD8, 0x00], 0, 0),
            Err(CodecError::FrameTooSmall { len: 3, min: MIN_FRAME_BYTES })
        );
    }

    #[test]
    fn test_decode_text_reads_known_fields_and_keeps_extras() {
        // Arrange
        let text = r#"{"battery": 76.5, "brightness": 128, "status": "streaming", "fw": "1.2"}"#;

        // Act
        let telemetry = decode_text(text).unwrap();

        // Assert
        assert_eq!(telemetry.battery, Some(76.5));
        assert_eq!(telemetry.brightness, Some(128));
        assert_eq!(telemetry.status.as_deref(), Some("streaming"));
        assert_eq!(telemetry.extra.get("fw").and_then(|v| v.as_str()), Some("1.2"));
    }

    #[test]
    fn test_decode_text_accepts_integer_battery() {
        assert_eq!(decode_text(r#"{"battery": 50}"#).unwrap().battery, Some(50.0));
    }

    #[test]
    fn test_decode_text_rejects_non_json() {
        assert!(matches!(decode_text("hello"), Err(CodecError::InvalidTelemetry(_))));
    }

    #[test]
    fn test_encode_command_rejects_empty() {
        assert_eq!(encode_command(&DeviceCommand::new()), Err(CodecError::EmptyCommand));
    }

    #[test]
    fn test_encode_command_produces_compact_json() {
        let cmd = DeviceCommand::new().with("capture", true);
        assert_eq!(encode_command(&cmd).unwrap(), r#"{"capture":true}"#);
    }
}
