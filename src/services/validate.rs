//! Payload validation for mutations entering shared state.
//!
//! Pure checks over the raw JSON payload, run before any typed decode or
//! store mutation. The first failing check wins and names the field, so a
//! rejected client can be told exactly what was wrong.

use serde_json::{Map, Value};

use crate::config::env_parse;

const DEFAULT_MAX_POINTS: usize = 1000;
const DEFAULT_MAX_ID_LEN: usize = 100;
const DEFAULT_MAX_TRACES: usize = 64;
const MIN_SIZE: f64 = 1.0;
const MAX_SIZE: f64 = 50.0;

/// Fields carrying a `#RRGGBB` color.
const COLOR_FIELDS: [&str; 3] = ["color", "stroke", "fill"];
/// The one color keyword a shape config may carry.
const TRANSPARENT: &str = "transparent";
/// Fields carrying a brush/stroke size.
const SIZE_FIELDS: [&str; 3] = ["width", "size", "strokeWidth"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationLimits {
    /// Maximum flat coordinate count of a `points` array.
    pub max_points: usize,
    pub max_id_len: usize,
    /// Maximum permanent traces carried by one brush effect.
    pub max_traces: usize,
    pub min_size: f64,
    pub max_size: f64,
}

impl ValidationLimits {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_points: env_parse("MAX_POINTS", DEFAULT_MAX_POINTS),
            max_traces: env_parse("MAX_TRACES", DEFAULT_MAX_TRACES),
            ..Self::default()
        }
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            max_id_len: DEFAULT_MAX_ID_LEN,
            max_traces: DEFAULT_MAX_TRACES,
            min_size: MIN_SIZE,
            max_size: MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload must be an object")]
    NotAnObject,
    #[error("id is required")]
    MissingId,
    #[error("id must be a non-empty string of at most {max} characters")]
    InvalidId { max: usize },
    #[error("{field} must be a #RRGGBB hex color")]
    InvalidColor { field: &'static str },
    #[error("points must be an array of finite numbers")]
    PointsNotNumeric,
    #[error("points must hold an even number of coordinates, got {0}")]
    OddPoints(usize),
    #[error("too many coordinates: {len} exceeds {max}")]
    TooManyPoints { len: usize, max: usize },
    #[error("too many permanent traces: {len} exceeds {max}")]
    TooManyTraces { len: usize, max: usize },
    #[error("{field} must be a number")]
    SizeNotNumeric { field: &'static str },
    #[error("{field} must be within [{min}, {max}], got {value}")]
    SizeOutOfRange { field: &'static str, value: f64, min: f64, max: f64 },
}

impl crate::frame::ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotAnObject | Self::TooManyTraces { .. } => "E_INVALID_PAYLOAD",
            Self::MissingId | Self::InvalidId { .. } => "E_INVALID_ID",
            Self::InvalidColor { .. } => "E_INVALID_COLOR",
            Self::PointsNotNumeric | Self::OddPoints(_) | Self::TooManyPoints { .. } => "E_INVALID_POINTS",
            Self::SizeNotNumeric { .. } | Self::SizeOutOfRange { .. } => "E_INVALID_SIZE",
        }
    }
}

/// Validate a mutation payload (`draw`, `shapeCreate`).
///
/// # Errors
///
/// Returns the first failed check, in order: object, id, colors (including
/// those of a nested shape `config`), points, sizes.
pub fn validate_payload(payload: &Value, limits: &ValidationLimits) -> Result<(), ValidationError> {
    let obj = payload.as_object().ok_or(ValidationError::NotAnObject)?;
    match obj.get("id") {
        Some(id) => check_id(id, limits)?,
        None => return Err(ValidationError::MissingId),
    }
    check_colors(obj)?;
    if let Some(Value::Object(config)) = obj.get("config") {
        check_config_colors(config)?;
    }
    if let Some(points) = obj.get("points") {
        check_points(points, limits)?;
    }
    check_sizes(obj, limits)
}

/// Validate the permanent traces of one brush effect. The batch size is
/// checked before any trace is looked at.
///
/// # Errors
///
/// Returns `TooManyTraces` or the first failing trace's error.
pub fn validate_traces(traces: &[Value], limits: &ValidationLimits) -> Result<(), ValidationError> {
    if traces.len() > limits.max_traces {
        return Err(ValidationError::TooManyTraces { len: traces.len(), max: limits.max_traces });
    }
    traces.iter().try_for_each(|trace| validate_trace(trace, limits))
}

/// Validate one permanent trace from a brush effect.
///
/// The id is optional here (the server assigns one); colors live in `attrs`.
///
/// # Errors
///
/// Returns the first failed check.
pub fn validate_trace(trace: &Value, limits: &ValidationLimits) -> Result<(), ValidationError> {
    let obj = trace.as_object().ok_or(ValidationError::NotAnObject)?;
    if let Some(id) = obj.get("id").filter(|v| !v.is_null()) {
        check_id(id, limits)?;
    }
    match obj.get("attrs") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(attrs)) => {
            check_colors(attrs)?;
            match attrs.get("points") {
                Some(points) => check_points(points, limits),
                None => Ok(()),
            }
        }
        Some(_) => Err(ValidationError::NotAnObject),
    }
}

/// `#RRGGBB`, case-insensitive.
#[must_use]
pub fn is_hex_color(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

fn check_id(id: &Value, limits: &ValidationLimits) -> Result<(), ValidationError> {
    let invalid = ValidationError::InvalidId { max: limits.max_id_len };
    let s = id.as_str().ok_or_else(|| invalid.clone())?;
    if s.is_empty() || s.chars().count() > limits.max_id_len {
        return Err(invalid);
    }
    Ok(())
}

fn check_colors(obj: &Map<String, Value>) -> Result<(), ValidationError> {
    for field in COLOR_FIELDS {
        let Some(value) = obj.get(field) else {
            continue;
        };
        if !value.as_str().is_some_and(is_hex_color) {
            return Err(ValidationError::InvalidColor { field });
        }
    }
    Ok(())
}

/// Shape configs are canvas-library attributes, where an unfilled shape
/// carries `fill: "transparent"`. That keyword is the only non-hex value
/// allowed.
fn check_config_colors(config: &Map<String, Value>) -> Result<(), ValidationError> {
    for field in COLOR_FIELDS {
        let Some(value) = config.get(field) else {
            continue;
        };
        let ok = value.as_str().is_some_and(|s| s == TRANSPARENT || is_hex_color(s));
        if !ok {
            return Err(ValidationError::InvalidColor { field });
        }
    }
    Ok(())
}

fn check_points(points: &Value, limits: &ValidationLimits) -> Result<(), ValidationError> {
    let arr = points.as_array().ok_or(ValidationError::PointsNotNumeric)?;
    if arr.len() > limits.max_points {
        return Err(ValidationError::TooManyPoints { len: arr.len(), max: limits.max_points });
    }
    if !arr.iter().all(|v| v.as_f64().is_some_and(f64::is_finite)) {
        return Err(ValidationError::PointsNotNumeric);
    }
    if arr.len() % 2 != 0 {
        return Err(ValidationError::OddPoints(arr.len()));
    }
    Ok(())
}

fn check_sizes(obj: &Map<String, Value>, limits: &ValidationLimits) -> Result<(), ValidationError> {
    for field in SIZE_FIELDS {
        let Some(value) = obj.get(field) else {
            continue;
        };
        let n = value.as_f64().ok_or(ValidationError::SizeNotNumeric { field })?;
        if !(limits.min_size..=limits.max_size).contains(&n) {
            return Err(ValidationError::SizeOutOfRange { field, value: n, min: limits.min_size, max: limits.max_size });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
