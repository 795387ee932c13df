//! Frame: the wire envelope for every canvas event.
//!
//! ARCHITECTURE
//! ============
//! Every websocket message is a JSON text frame `{"event": <name>, "data": <payload>}`.
//! Inbound frames are decoded into `ClientEvent` at the boundary: the envelope
//! is parsed, mutation payloads are run through the validator, and only then
//! are typed payloads constructed. Outbound traffic is always a `ServerEvent`.
//!
//! DESIGN
//! ======
//! - High-frequency relay events (`drawing`, `texture`) keep their payload as
//!   an opaque JSON object and are forwarded verbatim.
//! - Mutation events (`draw`, `shapeCreate`, `brushEffect` traces) are typed.
//! - Errors implement `ErrorCode` and render into a single `error` event
//!   addressed to the originating session.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::services::validate::{self, ValidationError, ValidationLimits};
use crate::state::Element;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Stroke width used when a finalized stroke omits `strokeWidth`.
pub const DEFAULT_STROKE_WIDTH: f64 = 4.0;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error events.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed frame: {0}")]
    BadFrame(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid {event} payload: {reason}")]
    BadPayload { event: &'static str, reason: String },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{0} requires an admin session")]
    Forbidden(&'static str),
}

impl ErrorCode for EventError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadFrame(_) => "E_BAD_FRAME",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::BadPayload { .. } => "E_BAD_PAYLOAD",
            Self::Invalid(e) => e.error_code(),
            Self::Forbidden(_) => "E_FORBIDDEN",
        }
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Blend mode of a stroke. Accepts the canvas API names on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMode {
    #[default]
    #[serde(alias = "source-over")]
    Normal,
    #[serde(alias = "destination-out")]
    Erase,
}

/// Finalized stroke (`draw`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokePayload {
    pub id: String,
    pub points: Vec<f64>,
    #[serde(default, alias = "color", skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default = "default_stroke_width", alias = "width")]
    pub stroke_width: f64,
    #[serde(default, alias = "globalCompositeOperation")]
    pub composite_mode: CompositeMode,
}

fn default_stroke_width() -> f64 {
    DEFAULT_STROKE_WIDTH
}

/// Predefined shape (`shapeCreate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePayload {
    pub id: String,
    #[serde(rename = "type")]
    pub shape_type: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// A permanent mark left behind by a brush effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePayload {
    #[serde(default)]
    pub id: Option<String>,
    pub shape_type: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

/// Brush effect. Traces are kept raw until each one has been validated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushEffectPayload {
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub permanent_traces: Vec<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

// =============================================================================
// INBOUND
// =============================================================================

/// Raw envelope before per-event decoding.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns `BadFrame` if the text is not a JSON envelope.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(|e| EventError::BadFrame(e.to_string()))
    }
}

/// Typed client → server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Drawing(Map<String, Value>),
    Draw(StrokePayload),
    Texture(Map<String, Value>),
    BrushEffect(BrushEffectPayload),
    ShapeCreate(ShapePayload),
    DeleteShape { id: String },
    ClearCanvas,
    Undo,
    AdminResetBrushEffects,
    CleanupUserEffects { user_id: Option<Value> },
    Ping(i64),
}

impl ClientEvent {
    /// Decode and validate an envelope into a typed event.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEvent` for unrecognized names, `Invalid` when a
    /// mutation payload fails validation, and `BadPayload` when the payload
    /// does not have the event's shape.
    pub fn from_envelope(envelope: Envelope, limits: &ValidationLimits) -> Result<Self, EventError> {
        let Envelope { event, data } = envelope;
        match event.as_str() {
            "drawing" => Ok(Self::Drawing(object_payload("drawing", data)?)),
            "texture" => Ok(Self::Texture(object_payload("texture", data)?)),
            "draw" => {
                validate::validate_payload(&data, limits)?;
                Ok(Self::Draw(typed_payload("draw", data)?))
            }
            "shapeCreate" => {
                validate::validate_payload(&data, limits)?;
                let shape: ShapePayload = typed_payload("shapeCreate", data)?;
                Ok(Self::ShapeCreate(shape))
            }
            "brushEffect" => {
                let effect: BrushEffectPayload = typed_payload("brushEffect", data)?;
                validate::validate_traces(&effect.permanent_traces, limits)?;
                Ok(Self::BrushEffect(effect))
            }
            "deleteShape" => {
                let id = data
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| bad_payload("deleteShape", "id required"))?;
                Ok(Self::DeleteShape { id: id.to_owned() })
            }
            "clearCanvas" => Ok(Self::ClearCanvas),
            "undo" => Ok(Self::Undo),
            "adminResetBrushEffects" => Ok(Self::AdminResetBrushEffects),
            "cleanupUserEffects" => Ok(Self::CleanupUserEffects { user_id: data.get("userId").cloned() }),
            "ping" => {
                #[allow(clippy::cast_possible_truncation)]
                let client_ms = data
                    .as_i64()
                    .or_else(|| data.as_f64().map(|f| f as i64))
                    .ok_or_else(|| bad_payload("ping", "numeric timestamp required"))?;
                Ok(Self::Ping(client_ms))
            }
            _ => Err(EventError::UnknownEvent(event)),
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Drawing(_) => "drawing",
            Self::Draw(_) => "draw",
            Self::Texture(_) => "texture",
            Self::BrushEffect(_) => "brushEffect",
            Self::ShapeCreate(_) => "shapeCreate",
            Self::DeleteShape { .. } => "deleteShape",
            Self::ClearCanvas => "clearCanvas",
            Self::Undo => "undo",
            Self::AdminResetBrushEffects => "adminResetBrushEffects",
            Self::CleanupUserEffects { .. } => "cleanupUserEffects",
            Self::Ping(_) => "ping",
        }
    }

    /// High-frequency events are not logged per frame.
    #[must_use]
    pub fn is_high_frequency(&self) -> bool {
        matches!(self, Self::Drawing(_) | Self::Texture(_) | Self::BrushEffect(_) | Self::Ping(_))
    }
}

fn bad_payload(event: &'static str, reason: impl Into<String>) -> EventError {
    EventError::BadPayload { event, reason: reason.into() }
}

fn object_payload(event: &'static str, data: Value) -> Result<Map<String, Value>, EventError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(bad_payload(event, "payload must be an object")),
    }
}

fn typed_payload<T: serde::de::DeserializeOwned>(event: &'static str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|e| bad_payload(event, e.to_string()))
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Server → client event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    InitShapes(Vec<Element>),
    Drawing(Map<String, Value>),
    Draw(StrokePayload),
    Texture(Map<String, Value>),
    BrushEffect(Map<String, Value>),
    ShapeCreate(ShapePayload),
    DeleteShape {
        id: String,
    },
    ClearCanvas,
    RestoreShapes(Vec<Element>),
    AdminResetBrushEffects,
    CleanupUserEffects {
        #[serde(rename = "socketId")]
        socket_id: Uuid,
        #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
        user_id: Option<Value>,
    },
    Pong(i64),
    Error {
        code: String,
        message: String,
        retryable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

impl ServerEvent {
    /// Structured error event for the originating session.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized), event: Option<&str>) -> Self {
        Self::Error {
            code: err.error_code().to_owned(),
            message: err.to_string(),
            retryable: err.retryable(),
            event: event.map(str::to_owned),
        }
    }

    /// Wire name of the event, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitShapes(_) => "initShapes",
            Self::Drawing(_) => "drawing",
            Self::Draw(_) => "draw",
            Self::Texture(_) => "texture",
            Self::BrushEffect(_) => "brushEffect",
            Self::ShapeCreate(_) => "shapeCreate",
            Self::DeleteShape { .. } => "deleteShape",
            Self::ClearCanvas => "clearCanvas",
            Self::RestoreShapes(_) => "restoreShapes",
            Self::AdminResetBrushEffects => "adminResetBrushEffects",
            Self::CleanupUserEffects { .. } => "cleanupUserEffects",
            Self::Pong(_) => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
