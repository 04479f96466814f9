//! JSON text-frame codec for the tasksync wire protocol.
//!
//! Each WebSocket text frame carries exactly one JSON object: an [`Action`]
//! going out or a [`ServerEvent`] coming in.

use crate::action::Action;
use crate::event::ServerEvent;

/// Error type for codec encode/decode operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// The frame is not valid JSON or does not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Encodes an [`Action`] into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Encode` if the action cannot be serialized.
pub fn encode_action(action: &Action) -> Result<String, CodecError> {
    serde_json::to_string(action).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes an [`Action`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the frame is not a recognized action.
pub fn decode_action(frame: &str) -> Result<Action, CodecError> {
    serde_json::from_str(frame).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encodes a [`ServerEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Encode` if the event cannot be serialized.
pub fn encode_event(event: &ServerEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the frame is not valid JSON, has an
/// unknown `type`, or lacks a field its type requires (such as `tasks`).
pub fn decode_event(frame: &str) -> Result<ServerEvent, CodecError> {
    serde_json::from_str(frame).map_err(|e| CodecError::Decode(e.to_string()))
}
