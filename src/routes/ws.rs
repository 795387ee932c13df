//! WebSocket handler: the canvas event loop for one connection.
//!
//! DESIGN
//! ======
//! On upgrade, builds a `Session` from the query string, registers the
//! client and sends it the `initShapes` snapshot, then enters a `select!`
//! loop:
//! - Incoming client frames → decode + validate → dispatch by event
//! - Events fanned out by peers → forward to client
//!
//! Handler functions return an `Outcome`; the dispatch layer owns all
//! outbound concerns. Mutations are applied and fanned out under one canvas
//! write lock; relays only need the read lock.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register + snapshot under one lock → `initShapes`
//! 2. Client sends events → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast)
//! 4. Close → unregister → `cleanupUserEffects` to peers

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{ClientEvent, Envelope, ErrorCode, EventError, ServerEvent, now_ms};
use crate::services::canvas;
use crate::services::session::Session;
use crate::state::{AppState, CanvasState};

/// Outbound buffer per client. A full buffer drops broadcasts for that client.
const CLIENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send events directly.
#[derive(Debug)]
enum Outcome {
    /// Send to every client, including the sender.
    Broadcast(ServerEvent),
    /// Send to every client except the sender.
    BroadcastExcludeSender(ServerEvent),
    /// Send to the sender only.
    Reply(ServerEvent),
    /// Nothing to send (throttled, or an empty undo).
    Quiet,
}

// =============================================================================
// UPGRADE
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub interface: Option<String>,
    pub token: Option<String>,
}

pub async fn handle_ws(State(state): State<AppState>, Query(params): Query<WsParams>, ws: WebSocketUpgrade) -> Response {
    let session = Session::connect(
        state.config.admin_token.as_deref(),
        params.interface.as_deref(),
        params.token.as_deref(),
    );
    ws.on_upgrade(move |socket| run_ws(socket, state, session))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, mut session: Session) {
    let client_id = session.client_id;

    // Per-connection channel for receiving events fanned out by peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Arc<ServerEvent>>(CLIENT_CHANNEL_CAPACITY);

    let snapshot = {
        let mut canvas = state.canvas.write().await;
        canvas::join(&mut canvas, client_id, client_tx)
    };
    info!(
        %client_id,
        interface = session.interface.as_str(),
        role = session.role.as_str(),
        "ws: client connected"
    );

    if send_event(&mut socket, &ServerEvent::InitShapes(snapshot)).await.is_err() {
        disconnect(&state, client_id).await;
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut session, &text).await;
                        if send_events(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    disconnect(&state, client_id).await;
}

async fn disconnect(state: &AppState, client_id: Uuid) {
    let mut canvas = state.canvas.write().await;
    canvas::part(&mut canvas, client_id);
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// EVENT DISPATCH
// =============================================================================

/// Decode and process one inbound text frame and return events for the sender.
///
/// Kept apart from the socket so tests can drive dispatch directly.
async fn process_inbound_text(state: &AppState, session: &mut Session, text: &str) -> Vec<ServerEvent> {
    let client_id = session.client_id;
    let limits = state.config.canvas.validation;

    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%client_id, code = e.error_code(), error = %e, "ws: invalid inbound frame");
            return vec![ServerEvent::error_from(&e, None)];
        }
    };
    let raw_name = envelope.event.clone();
    let event = match ClientEvent::from_envelope(envelope, &limits) {
        Ok(event) => event,
        Err(e) => {
            warn!(%client_id, code = e.error_code(), error = %e, event = %raw_name, "ws: rejected inbound event");
            return vec![ServerEvent::error_from(&e, Some(&raw_name))];
        }
    };

    if !event.is_high_frequency() {
        info!(%client_id, event = event.name(), "ws: recv event");
    }

    if let Err(e) = session.authorize(&event) {
        warn!(%client_id, code = e.error_code(), event = event.name(), "ws: event refused");
        return vec![ServerEvent::error_from(&e, Some(event.name()))];
    }

    let name = event.name();
    let result = if mutates(&event) {
        let mut canvas = state.canvas.write().await;
        handle_mutation(&mut canvas, session, event).map(|outcome| apply_outcome(&canvas, client_id, outcome))
    } else {
        let outcome = handle_relay(state, session, event);
        let canvas = state.canvas.read().await;
        Ok(apply_outcome(&canvas, client_id, outcome))
    };

    match result {
        Ok(replies) => replies,
        Err(e) => {
            warn!(%client_id, code = e.error_code(), error = %e, event = name, "ws: event rejected");
            vec![ServerEvent::error_from(&e, Some(name))]
        }
    }
}

/// Fan out an outcome while the caller still holds the canvas lock.
/// Returns the events addressed to the sender.
fn apply_outcome(canvas: &CanvasState, client_id: Uuid, outcome: Outcome) -> Vec<ServerEvent> {
    match outcome {
        Outcome::Broadcast(event) => {
            canvas::broadcast(canvas, event, None);
            vec![]
        }
        Outcome::BroadcastExcludeSender(event) => {
            canvas::broadcast(canvas, event, Some(client_id));
            vec![]
        }
        Outcome::Reply(event) => vec![event],
        Outcome::Quiet => vec![],
    }
}

fn mutates(event: &ClientEvent) -> bool {
    matches!(
        event,
        ClientEvent::Draw(_)
            | ClientEvent::ShapeCreate(_)
            | ClientEvent::BrushEffect(_)
            | ClientEvent::DeleteShape { .. }
            | ClientEvent::ClearCanvas
            | ClientEvent::Undo
    )
}

// =============================================================================
// HANDLERS
// =============================================================================

fn handle_mutation(canvas: &mut CanvasState, session: &mut Session, event: ClientEvent) -> Result<Outcome, EventError> {
    let client_id = session.client_id;
    match event {
        ClientEvent::Draw(payload) => {
            let stored = canvas::commit_stroke(canvas, payload);
            Ok(Outcome::BroadcastExcludeSender(ServerEvent::Draw(stored)))
        }
        ClientEvent::ShapeCreate(payload) => {
            let stored = canvas::commit_shape(canvas, payload);
            Ok(Outcome::BroadcastExcludeSender(ServerEvent::ShapeCreate(stored)))
        }
        ClientEvent::BrushEffect(payload) => {
            let throttle = canvas.config.throttle;
            let now = Instant::now();
            if !session.brush_ready(&throttle, payload.interface.as_deref(), now) {
                return Ok(Outcome::Quiet);
            }
            let traces = canvas::commit_traces(canvas, &payload.permanent_traces)?;
            session.record_brush(now);
            if !traces.is_empty() {
                debug!(%client_id, traces = traces.len(), "ws: stored permanent traces");
            }
            let data = canvas::brush_broadcast(payload, &traces, client_id, now_ms());
            Ok(Outcome::BroadcastExcludeSender(ServerEvent::BrushEffect(data)))
        }
        ClientEvent::DeleteShape { id } => {
            let removed = canvas::delete_element(canvas, &id);
            info!(%client_id, %id, found = removed.is_some(), "ws: delete shape");
            Ok(Outcome::Broadcast(ServerEvent::DeleteShape { id }))
        }
        ClientEvent::ClearCanvas => {
            let removed = canvas::clear(canvas);
            info!(%client_id, removed, clients = canvas.clients.len(), "ws: canvas cleared");
            Ok(Outcome::Broadcast(ServerEvent::ClearCanvas))
        }
        ClientEvent::Undo => Ok(canvas::undo(canvas).map_or(Outcome::Quiet, |r| Outcome::Broadcast(r.into_event()))),
        other => Err(EventError::UnknownEvent(other.name().to_owned())),
    }
}

fn handle_relay(state: &AppState, session: &mut Session, event: ClientEvent) -> Outcome {
    match event {
        // Live preview only; it never enters the store and is relayed unvalidated.
        ClientEvent::Drawing(data) => Outcome::BroadcastExcludeSender(ServerEvent::Drawing(data)),
        ClientEvent::Texture(data) => {
            if session.allow_texture(&state.config.canvas.throttle) {
                Outcome::BroadcastExcludeSender(ServerEvent::Texture(data))
            } else {
                Outcome::Quiet
            }
        }
        ClientEvent::AdminResetBrushEffects => {
            info!(client_id = %session.client_id, "ws: brush effects reset");
            Outcome::Broadcast(ServerEvent::AdminResetBrushEffects)
        }
        ClientEvent::CleanupUserEffects { user_id } => {
            Outcome::BroadcastExcludeSender(ServerEvent::CleanupUserEffects { socket_id: session.client_id, user_id })
        }
        ClientEvent::Ping(client_ms) => Outcome::Reply(ServerEvent::Pong(now_ms().saturating_sub(client_ms))),
        other => {
            // Mutations never reach here; `mutates` routes them to the write path.
            warn!(event = other.name(), "ws: mutation routed to relay path");
            Outcome::Quiet
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Send replies in order, stopping at the first failure.
async fn send_events(socket: &mut WebSocket, events: &[ServerEvent]) -> Result<(), ()> {
    for event in events {
        send_event(socket, event).await?;
    }
    Ok(())
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, event = event.name(), "ws: failed to serialize event");
            return Err(());
        }
    };
    if let ServerEvent::Error { code, message, .. } = event {
        warn!(code = %code, message = %message, "ws: send error event");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
