//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the one live canvas: the element store, the undo log, the outbound
//! channel of every connected client, and the persistence handle. All of it
//! sits behind a single lock so a mutation and its fan-out are one step.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::{CanvasConfig, Config};
use crate::frame::{CompositeMode, ServerEvent, ShapePayload, StrokePayload, TracePayload};
use crate::services::history::HistoryLog;
use crate::services::persistence::PersistHandle;
use crate::services::shapes::ShapeStore;

/// Outbound channel to one connected client.
pub type ClientTx = mpsc::Sender<Arc<ServerEvent>>;

// =============================================================================
// ELEMENT
// =============================================================================

/// One drawable unit of shared state. Serialized flat, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(flatten)]
    pub body: ElementBody,
    /// Server-assigned milliseconds since epoch. Monotonic per id.
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ElementBody {
    #[serde(rename_all = "camelCase")]
    Stroke {
        points: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<String>,
        stroke_width: f64,
        #[serde(default)]
        composite_mode: CompositeMode,
    },
    #[serde(rename_all = "camelCase")]
    PermanentTrace {
        shape_type: String,
        #[serde(default)]
        attrs: Map<String, Value>,
    },
    PredefinedShape {
        #[serde(rename = "type")]
        shape_type: String,
        #[serde(default)]
        config: Map<String, Value>,
    },
}

impl Element {
    #[must_use]
    pub fn from_stroke(payload: StrokePayload) -> Self {
        Self {
            id: payload.id,
            body: ElementBody::Stroke {
                points: payload.points,
                stroke: payload.stroke,
                stroke_width: payload.stroke_width,
                composite_mode: payload.composite_mode,
            },
            timestamp: 0,
        }
    }

    #[must_use]
    pub fn from_shape(payload: ShapePayload) -> Self {
        Self {
            id: payload.id,
            body: ElementBody::PredefinedShape { shape_type: payload.shape_type, config: payload.config },
            timestamp: 0,
        }
    }

    #[must_use]
    pub fn from_trace(id: String, payload: TracePayload) -> Self {
        Self {
            id,
            body: ElementBody::PermanentTrace { shape_type: payload.shape_type, attrs: payload.attrs },
            timestamp: 0,
        }
    }

    /// Wire name of the element kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.body {
            ElementBody::Stroke { .. } => "stroke",
            ElementBody::PermanentTrace { .. } => "permanentTrace",
            ElementBody::PredefinedShape { .. } => "predefinedShape",
        }
    }

    /// The `draw` payload for a stroke element.
    #[cfg(test)]
    #[must_use]
    pub fn to_stroke_payload(&self) -> Option<StrokePayload> {
        let ElementBody::Stroke { points, stroke, stroke_width, composite_mode } = &self.body else {
            return None;
        };
        Some(StrokePayload {
            id: self.id.clone(),
            points: points.clone(),
            stroke: stroke.clone(),
            stroke_width: *stroke_width,
            composite_mode: *composite_mode,
        })
    }

    /// The `shapeCreate` payload for a predefined shape element.
    #[cfg(test)]
    #[must_use]
    pub fn to_shape_payload(&self) -> Option<ShapePayload> {
        let ElementBody::PredefinedShape { shape_type, config } = &self.body else {
            return None;
        };
        Some(ShapePayload { id: self.id.clone(), shape_type: shape_type.clone(), config: config.clone() })
    }
}

// =============================================================================
// CANVAS STATE
// =============================================================================

/// The live canvas. Owned by `AppState`, mutated only under its write lock.
pub struct CanvasState {
    pub shapes: ShapeStore,
    pub history: HistoryLog,
    /// Connected clients: `client_id` -> sender for outgoing events.
    pub clients: HashMap<Uuid, ClientTx>,
    /// Best-effort mirror to durable storage. `None` runs memory-only.
    pub persist: Option<PersistHandle>,
    pub config: CanvasConfig,
}

impl CanvasState {
    #[must_use]
    pub fn new(config: CanvasConfig, persist: Option<PersistHandle>) -> Self {
        Self {
            shapes: ShapeStore::new(),
            history: HistoryLog::new(config.max_history),
            clients: HashMap::new(),
            persist,
            config,
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub canvas: Arc<RwLock<CanvasState>>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, persist: Option<PersistHandle>) -> Self {
        let canvas = CanvasState::new(config.canvas, persist);
        Self { canvas: Arc::new(RwLock::new(canvas)), config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
