//! Canvas service: mutations, undo, join/part, fan-out, and the sweep.
//!
//! DESIGN
//! ======
//! Every function here takes the `CanvasState` the caller already holds the
//! lock for. A mutation touches the shape store, the undo log and the
//! persistence queue in one call; the caller then fans the resulting event
//! out before releasing the lock, so every client sees mutations in the
//! order they were applied.
//!
//! Fan-out is best-effort: each client has a bounded channel and a full one
//! drops that event for that client only.
//!
//! ERROR HANDLING
//! ==============
//! Payloads arrive already validated. Brush-effect traces are checked again
//! here as a batch, size bound first: one bad trace or an oversized batch
//! rejects the whole effect before anything is stored. Persistence failures never surface (see
//! `services::persistence`).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::frame::{BrushEffectPayload, EventError, ServerEvent, ShapePayload, StrokePayload, TracePayload, now_ms};
use crate::services::history::HistoryEntry;
use crate::services::persistence::{PersistOp, mirror};
use crate::services::simplify::reduce_stroke;
use crate::services::validate::validate_traces;
use crate::state::{AppState, CanvasState, ClientTx, Element};

/// Upper bound (exclusive) of the random suffix in generated trace ids.
const TRACE_ID_RAND_RANGE: u32 = 100_000;
/// Random suffixes tried before counting up.
const TRACE_ID_RANDOM_ATTEMPTS: usize = 8;

// =============================================================================
// JOIN / PART
// =============================================================================

/// Register a client and return the snapshot it should start from.
pub fn join(canvas: &mut CanvasState, client_id: Uuid, tx: ClientTx) -> Vec<Element> {
    canvas.clients.insert(client_id, tx);
    let snapshot = canvas.shapes.all();
    info!(%client_id, clients = canvas.clients.len(), shapes = snapshot.len(), "canvas: client joined");
    snapshot
}

/// Unregister a client and tell the others to drop its transient effects.
/// The shape store is untouched.
pub fn part(canvas: &mut CanvasState, client_id: Uuid) {
    if canvas.clients.remove(&client_id).is_none() {
        return;
    }
    broadcast(canvas, ServerEvent::CleanupUserEffects { socket_id: client_id, user_id: None }, Some(client_id));
    info!(%client_id, clients = canvas.clients.len(), "canvas: client left");
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Send an event to every connected client except `exclude`.
pub fn broadcast(canvas: &CanvasState, event: ServerEvent, exclude: Option<Uuid>) {
    let event = Arc::new(event);
    for (client_id, tx) in &canvas.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        if tx.try_send(Arc::clone(&event)).is_err() {
            debug!(%client_id, event = event.name(), "canvas: client channel full; dropping event");
        }
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Store a finalized stroke, reducing oversized point lists first.
/// Returns the stored form for broadcast.
pub fn commit_stroke(canvas: &mut CanvasState, mut payload: StrokePayload) -> StrokePayload {
    let before = payload.points.len();
    payload.points = reduce_stroke(&payload.points, &canvas.config.simplify);
    if payload.points.len() != before {
        debug!(id = %payload.id, before, after = payload.points.len(), "canvas: stroke simplified");
    }

    let stored = canvas.shapes.upsert(Element::from_stroke(payload.clone()));
    canvas.history.record(HistoryEntry::DrawAdd(stored.clone()));
    mirror(canvas.persist.as_ref(), PersistOp::Save(stored));
    payload
}

/// Store a predefined shape.
pub fn commit_shape(canvas: &mut CanvasState, payload: ShapePayload) -> ShapePayload {
    let stored = canvas.shapes.upsert(Element::from_shape(payload.clone()));
    canvas.history.record(HistoryEntry::DrawAdd(stored.clone()));
    mirror(canvas.persist.as_ref(), PersistOp::Save(stored));
    payload
}

/// Validate and store the permanent traces of a brush effect.
///
/// # Errors
///
/// Returns the first trace failure; nothing is stored in that case.
pub fn commit_traces(canvas: &mut CanvasState, traces: &[Value]) -> Result<Vec<Element>, EventError> {
    validate_traces(traces, &canvas.config.validation)?;
    let mut decoded = Vec::with_capacity(traces.len());
    for raw in traces {
        let trace: TracePayload = serde_json::from_value(raw.clone())
            .map_err(|e| EventError::BadPayload { event: "brushEffect", reason: e.to_string() })?;
        decoded.push(trace);
    }

    let now = now_ms();
    let mut stored = Vec::with_capacity(decoded.len());
    let mut batch_ids = HashSet::with_capacity(decoded.len());
    for mut trace in decoded {
        let id = match trace.id.take().filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => generate_trace_id(canvas, &batch_ids, now),
        };
        batch_ids.insert(id.clone());
        stored.push(canvas.shapes.upsert_at(Element::from_trace(id, trace), now));
    }

    if !stored.is_empty() {
        mirror(canvas.persist.as_ref(), PersistOp::SaveMany(stored.clone()));
    }
    Ok(stored)
}

/// Payload relayed to peers for a brush effect: the client's fields, the
/// stored traces, and the sender's id and server clock.
#[must_use]
pub fn brush_broadcast(payload: BrushEffectPayload, traces: &[Element], socket_id: Uuid, now: i64) -> Map<String, Value> {
    let mut data = payload.rest;
    if let Some(interface) = payload.interface {
        data.insert("interface".into(), Value::String(interface));
    }
    data.insert("permanentTraces".into(), serde_json::to_value(traces).unwrap_or_default());
    data.insert("socketId".into(), Value::String(socket_id.to_string()));
    data.insert("serverTimestamp".into(), Value::from(now));
    data
}

/// Delete an element. Returns the removed copy; a missing id is a no-op.
pub fn delete_element(canvas: &mut CanvasState, id: &str) -> Option<Element> {
    let removed = canvas.shapes.delete(id)?;
    canvas.history.record(HistoryEntry::DeleteRemove(removed.clone()));
    mirror(canvas.persist.as_ref(), PersistOp::Delete(id.to_owned()));
    Some(removed)
}

/// Empty the canvas, keeping the removed set for undo. Returns how many
/// elements were removed.
pub fn clear(canvas: &mut CanvasState) -> usize {
    if canvas.shapes.is_empty() {
        debug!("canvas: clearing an already empty store");
    }
    let removed = canvas.shapes.clear();
    let count = removed.len();
    canvas.history.record(HistoryEntry::ClearRemoveAll(removed));
    mirror(canvas.persist.as_ref(), PersistOp::Clear);
    count
}

// =============================================================================
// UNDO
// =============================================================================

/// What an undo did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Reversal {
    /// An added element was removed again.
    Deleted(String),
    /// Removed elements were put back, re-stamped.
    Restored(Vec<Element>),
}

impl Reversal {
    /// Event announcing the reversal to every client.
    #[must_use]
    pub fn into_event(self) -> ServerEvent {
        match self {
            Self::Deleted(id) => ServerEvent::DeleteShape { id },
            Self::Restored(elements) => ServerEvent::RestoreShapes(elements),
        }
    }
}

/// Reverse the most recent recorded mutation. `None` when the log is empty.
pub fn undo(canvas: &mut CanvasState) -> Option<Reversal> {
    if canvas.history.is_empty() {
        info!("canvas: undo requested with empty history");
        return None;
    }
    let entry = canvas.history.pop()?;
    info!(action = entry.label(), remaining = canvas.history.len(), capacity = canvas.history.capacity(), "canvas: undo");

    let reversal = match entry {
        HistoryEntry::DrawAdd(element) => {
            canvas.shapes.delete(&element.id);
            mirror(canvas.persist.as_ref(), PersistOp::Delete(element.id.clone()));
            Reversal::Deleted(element.id)
        }
        HistoryEntry::DeleteRemove(element) => restore(canvas, vec![element]),
        HistoryEntry::ClearRemoveAll(elements) => restore(canvas, elements),
    };
    Some(reversal)
}

fn restore(canvas: &mut CanvasState, elements: Vec<Element>) -> Reversal {
    let restored = canvas.shapes.restore(elements);
    if !restored.is_empty() {
        mirror(canvas.persist.as_ref(), PersistOp::SaveMany(restored.clone()));
    }
    Reversal::Restored(restored)
}

// =============================================================================
// SWEEP / HYDRATION
// =============================================================================

/// Apply the capacity and TTL limits at `now`. Eviction is silent to clients
/// and mirrored to persistence. Returns the evicted ids.
pub fn sweep_at(canvas: &mut CanvasState, now: i64) -> Vec<String> {
    let evicted = canvas.shapes.sweep_at(now, canvas.config.max_shapes, canvas.config.shape_ttl_ms);
    if !evicted.is_empty() {
        info!(evicted = evicted.len(), remaining = canvas.shapes.len(), "canvas: sweep evicted elements");
        mirror(canvas.persist.as_ref(), PersistOp::DeleteMany(evicted.clone()));
    }
    evicted
}

/// Seed the store from persisted elements, then apply the limits once.
pub fn load(canvas: &mut CanvasState, elements: Vec<Element>) {
    let count = elements.len();
    canvas.shapes.load(elements);
    let evicted = sweep_at(canvas, now_ms());
    info!(loaded = count, evicted = evicted.len(), "canvas: store hydrated");
}

/// Run the sweep on a fixed interval for the life of the process.
pub fn spawn_sweep_task(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let mut canvas = state.canvas.write().await;
            sweep_at(&mut canvas, now_ms());
        }
    })
}

// =============================================================================
// HELPERS
// =============================================================================

/// `trace_<ms>_<n>`, unique against the store and the current batch. Falls
/// back to counting up from the top of the random range once random
/// suffixes keep colliding.
fn generate_trace_id(canvas: &CanvasState, batch: &HashSet<String>, now: i64) -> String {
    let taken = |id: &str| canvas.shapes.contains(id) || batch.contains(id);
    let mut rng = rand::rng();
    for _ in 0..TRACE_ID_RANDOM_ATTEMPTS {
        let id = format!("trace_{now}_{}", rng.random_range(0..TRACE_ID_RAND_RANGE));
        if !taken(&id) {
            return id;
        }
    }
    (u64::from(TRACE_ID_RAND_RANGE)..)
        .map(|n| format!("trace_{now}_{n}"))
        .find(|id| !taken(id))
        .unwrap_or_else(|| format!("trace_{now}_{}", Uuid::new_v4()))
}

#[cfg(test)]
#[path = "canvas_test.rs"]
mod tests;
