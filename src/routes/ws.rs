//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client id plus a random display identity and
//! enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Broadcast frames from room peers → forward to client
//! - Throttle tick → drain any pending cursor position
//!
//! Handler functions validate, call into the services, and return an
//! `Outcome` saying what the sender gets back. Peer fan-out for board
//! mutations lives in the edit service, under the same lock as the commit,
//! so peers see deltas in commit order.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`, name, color
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close → broadcast `room:part` → presence cleanup

use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::board::CursorPoint;
use crate::frame::{Data, Frame};
use crate::services;
use crate::services::ai::AiAction;
use crate::services::edit::{NoteInput, StrokeInput};
use crate::state::AppState;
use crate::throttle::{CursorGate, cursor_interval};

/// Palette for notes created without an explicit color.
const NOTE_COLORS: [&str; 6] = ["#FFEAA7", "#FF6B6B", "#4ECDC4", "#DDA0DD", "#98D8C8", "#F7DC6F"];

const DEFAULT_NOTE_WIDTH: f64 = 150.0;
const DEFAULT_NOTE_HEIGHT: f64 = 100.0;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions: what goes back to the sender.
/// Peer fan-out for board mutations happens inside the edit service, under
/// the same lock as the commit, so peers observe deltas in commit order.
enum Outcome {
    /// Send done+data to sender only.
    Reply(Data),
    /// Send empty done to sender only.
    Done,
    /// Reply to sender with one payload, broadcast different data to peers.
    ReplyAndBroadcast { reply: Data, broadcast: Data },
    /// Nothing to send. Cursor traffic and presence already fanned out.
    Silent,
}

/// Mutable per-connection display identity (updated by `presence:set`).
struct Identity {
    name: String,
    color: String,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (name, color) = services::room::random_identity();
    let mut identity = Identity { name, color };

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("client_id", client_id.to_string())
        .with_data("name", identity.name.clone())
        .with_data("color", identity.color.clone());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, name = %identity.name, "ws: client connected");

    // Which room this client has joined, and its cursor throttle.
    let mut current_room: Option<String> = None;
    let mut gate = CursorGate::new(cursor_interval());
    let mut ticker = tokio::time::interval(cursor_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let frames = process_inbound_text(
                            &state, &mut current_room, client_id, &mut identity, &client_tx, &mut gate, &text,
                        )
                        .await;
                        for frame in frames {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let (Some(room_id), Some(point)) = (current_room.as_deref(), gate.flush(Instant::now())) {
                    services::presence::broadcast_cursor(&state, room_id, client_id, point).await;
                }
            }
        }
    }

    // Tell peers BEFORE cleanup (part_room may evict the room).
    if let Some(room_id) = current_room {
        let mut part_data = Data::new();
        part_data.insert("client_id".into(), serde_json::json!(client_id));
        let part_frame = Frame::request("room:part", part_data).with_room_id(room_id.clone());
        services::room::broadcast(&state, &room_id, &part_frame, Some(client_id)).await;

        services::room::part_room(&state, &room_id, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the
/// sender. Split from the socket loop so tests can exercise dispatch
/// without a live transport.
async fn process_inbound_text(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    identity: &mut Identity,
    client_tx: &mpsc::Sender<Frame>,
    gate: &mut CursorGate,
    text: &str,
) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the connection identity as `from`.
    req.from = Some(client_id.to_string());

    let prefix = req.prefix();
    if prefix != "cursor" {
        info!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
    }

    let result = match prefix {
        "room" => handle_room(state, current_room, client_id, identity, client_tx, &req).await,
        "stroke" => handle_stroke(state, current_room.as_deref(), client_id, &req).await,
        "note" => handle_note(state, current_room.as_deref(), client_id, &req).await,
        "board" => handle_board(state, current_room.as_deref(), client_id, &req).await,
        "history" => handle_history(state, current_room.as_deref(), &req).await,
        "cursor" => handle_cursor(state, current_room.as_deref(), client_id, gate, &req).await,
        "presence" => handle_presence(state, current_room.as_deref(), client_id, identity, &req).await,
        "ai" => handle_ai(state, current_room.as_deref(), &req).await,
        _ => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(Outcome::Reply(data)) => {
            vec![req.done_with(data)]
        }
        Ok(Outcome::Done) => {
            vec![req.done()]
        }
        Ok(Outcome::ReplyAndBroadcast { reply, broadcast }) => {
            let sender_frame = req.done_with(reply);
            if let Some(rid) = current_room.clone() {
                let notif = Frame::request(&req.syscall, broadcast).with_room_id(rid.clone());
                services::room::broadcast(state, &rid, &notif, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Ok(Outcome::Silent) => vec![],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// ROOM HANDLERS
// =============================================================================

async fn handle_room(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    identity: &Identity,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    match req.op() {
        "join" => {
            let Some(room_id) = req
                .room_id
                .clone()
                .or_else(|| req.data.get("room_id").and_then(|v| v.as_str()).map(String::from))
            else {
                return Err(req.error("room_id required"));
            };
            if room_id.is_empty() {
                return Err(req.error("room_id required"));
            }

            // Part the current room if already joined. The old room's peers
            // get the same `room:part` notice the disconnect path sends.
            if let Some(old_room) = current_room.take() {
                let mut part_data = Data::new();
                part_data.insert("client_id".into(), serde_json::json!(client_id));
                let part_frame = Frame::request("room:part", part_data).with_room_id(old_room.clone());
                services::room::broadcast(state, &old_room, &part_frame, Some(client_id)).await;

                services::room::part_room(state, &old_room, client_id).await;
            }

            let (snapshot, peers) = services::room::join_room(
                state,
                &room_id,
                client_id,
                &identity.name,
                &identity.color,
                client_tx.clone(),
            )
            .await;
            *current_room = Some(room_id);

            let mut reply = Data::new();
            reply.insert("strokes".into(), serde_json::to_value(&snapshot.strokes).unwrap_or_default());
            reply.insert("notes".into(), serde_json::to_value(&snapshot.notes).unwrap_or_default());
            reply.insert("peers".into(), serde_json::to_value(&peers).unwrap_or_default());

            let mut broadcast = Data::new();
            broadcast.insert("client_id".into(), serde_json::json!(client_id));
            broadcast.insert("name".into(), serde_json::json!(identity.name));
            broadcast.insert("color".into(), serde_json::json!(identity.color));

            Ok(Outcome::ReplyAndBroadcast { reply, broadcast })
        }
        op => Err(req.error(format!("unknown room op: {op}"))),
    }
}

// =============================================================================
// STROKE HANDLERS
// =============================================================================

async fn handle_stroke(
    state: &AppState,
    current_room: Option<&str>,
    client_id: Uuid,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(room_id) = current_room else {
        return Err(req.error("must join a room first"));
    };

    match req.op() {
        "add" => {
            let Some(points) = req.data.get("points").and_then(parse_points) else {
                return Err(req.error("points required (flat number array)"));
            };
            let Some(color) = req.data.get("color").and_then(|v| v.as_str()) else {
                return Err(req.error("color required"));
            };
            let Some(size) = req.data.get("size").and_then(serde_json::Value::as_f64) else {
                return Err(req.error("size required"));
            };
            if !size.is_finite() || size <= 0.0 {
                return Err(req.error("size must be positive"));
            }

            let input = StrokeInput { points, color: color.to_string(), size };
            match services::edit::add_stroke(state, room_id, client_id, input).await {
                Ok(stroke) => Ok(Outcome::Reply(services::edit::stroke_data(&stroke))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown stroke op: {op}"))),
    }
}

// =============================================================================
// NOTE HANDLERS
// =============================================================================

async fn handle_note(
    state: &AppState,
    current_room: Option<&str>,
    client_id: Uuid,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(room_id) = current_room else {
        return Err(req.error("must join a room first"));
    };

    match req.op() {
        "create" => {
            let (Some(x), Some(y)) = (
                req.data.get("x").and_then(serde_json::Value::as_f64),
                req.data.get("y").and_then(serde_json::Value::as_f64),
            ) else {
                return Err(req.error("x and y required"));
            };
            let text = req
                .data
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let color = req
                .data
                .get("color")
                .and_then(|v| v.as_str())
                .map_or_else(random_note_color, String::from);
            let width = req
                .data
                .get("width")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_NOTE_WIDTH);
            let height = req
                .data
                .get("height")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_NOTE_HEIGHT);
            if width <= 0.0 || height <= 0.0 {
                return Err(req.error("width and height must be positive"));
            }

            let input = NoteInput { x, y, text, color, width, height };
            match services::edit::create_note(state, room_id, client_id, input).await {
                Ok(note) => Ok(Outcome::Reply(services::edit::note_data(&note))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "update" => {
            let Some(note_id) = parse_id(&req.data) else {
                return Err(req.error("id required"));
            };
            let patch = crate::board::NotePatch {
                x: req.data.get("x").and_then(serde_json::Value::as_f64),
                y: req.data.get("y").and_then(serde_json::Value::as_f64),
                text: req.data.get("text").and_then(|v| v.as_str()).map(String::from),
                color: req.data.get("color").and_then(|v| v.as_str()).map(String::from),
                width: req.data.get("width").and_then(serde_json::Value::as_f64),
                height: req.data.get("height").and_then(serde_json::Value::as_f64),
            };
            if patch.width.is_some_and(|w| w <= 0.0) || patch.height.is_some_and(|h| h <= 0.0) {
                return Err(req.error("width and height must be positive"));
            }

            match services::edit::update_note(state, room_id, client_id, note_id, &patch).await {
                // Vanished id or empty patch: expected race, silent no-op.
                Ok(None) => Ok(Outcome::Done),
                Ok(Some(note)) => Ok(Outcome::Reply(services::edit::note_data(&note))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "delete" => {
            let Some(note_id) = parse_id(&req.data) else {
                return Err(req.error("id required"));
            };
            match services::edit::delete_note(state, room_id, client_id, note_id).await {
                Ok(true) => {
                    let mut data = Data::new();
                    data.insert("id".into(), serde_json::json!(note_id));
                    Ok(Outcome::Reply(data))
                }
                // Already gone: idempotent.
                Ok(false) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown note op: {op}"))),
    }
}

// =============================================================================
// BOARD + HISTORY HANDLERS
// =============================================================================

async fn handle_board(
    state: &AppState,
    current_room: Option<&str>,
    client_id: Uuid,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(room_id) = current_room else {
        return Err(req.error("must join a room first"));
    };

    match req.op() {
        // An already-empty board is a quiet no-op like the other vanished
        // targets; peers hear nothing.
        "clear" => match services::edit::clear_board(state, room_id, client_id).await {
            Ok(_) => Ok(Outcome::Done),
            Err(e) => Err(req.error_from(&e)),
        },
        op => Err(req.error(format!("unknown board op: {op}"))),
    }
}

async fn handle_history(state: &AppState, current_room: Option<&str>, req: &Frame) -> Result<Outcome, Frame> {
    let Some(room_id) = current_room else {
        return Err(req.error("must join a room first"));
    };

    let result = match req.op() {
        "undo" => services::edit::undo(state, room_id).await,
        "redo" => services::edit::redo(state, room_id).await,
        "pause" => {
            return match services::edit::pause_history(state, room_id).await {
                Ok(()) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&e)),
            };
        }
        "resume" => {
            return match services::edit::resume_history(state, room_id).await {
                Ok(()) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&e)),
            };
        }
        op => return Err(req.error(format!("unknown history op: {op}"))),
    };

    match result {
        // The edit service already synced everyone on change; an empty
        // stack is a silent no-op. Either way the sender just gets an ack.
        Ok(_) => Ok(Outcome::Done),
        Err(e) => Err(req.error_from(&e)),
    }
}

// =============================================================================
// CURSOR + PRESENCE HANDLERS
// =============================================================================

async fn handle_cursor(
    state: &AppState,
    current_room: Option<&str>,
    client_id: Uuid,
    gate: &mut CursorGate,
    req: &Frame,
) -> Result<Outcome, Frame> {
    // Silently ignore cursor traffic before joining.
    let Some(room_id) = current_room else {
        return Ok(Outcome::Silent);
    };

    match req.op() {
        "move" => {
            let (Some(x), Some(y)) = (
                req.data.get("x").and_then(serde_json::Value::as_f64),
                req.data.get("y").and_then(serde_json::Value::as_f64),
            ) else {
                return Ok(Outcome::Silent);
            };
            let point = CursorPoint { x, y };
            if let Some(point) = gate.offer(point, Instant::now()) {
                services::presence::broadcast_cursor(state, room_id, client_id, point).await;
            } else {
                // Held by the gate: record it now, broadcast on the tick.
                services::presence::set_cursor(state, room_id, client_id, point).await;
            }
            Ok(Outcome::Silent)
        }
        "leave" => {
            // Leaving is terminal for the burst: drop anything pending.
            gate.clear();
            services::presence::broadcast_cursor_left(state, room_id, client_id).await;
            Ok(Outcome::Silent)
        }
        _ => Ok(Outcome::Silent),
    }
}

async fn handle_presence(
    state: &AppState,
    current_room: Option<&str>,
    client_id: Uuid,
    identity: &mut Identity,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(room_id) = current_room else {
        return Err(req.error("must join a room first"));
    };

    match req.op() {
        "set" => {
            let name = req.data.get("name").and_then(|v| v.as_str());
            let color = req.data.get("color").and_then(|v| v.as_str());
            if name.is_none() && color.is_none() {
                return Err(req.error("name or color required"));
            }

            if let Some((name, color)) = services::presence::set_identity(state, room_id, client_id, name, color).await
            {
                identity.name = name;
                identity.color = color;
            }
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown presence op: {op}"))),
    }
}

// =============================================================================
// AI HANDLER
// =============================================================================

async fn handle_ai(state: &AppState, current_room: Option<&str>, req: &Frame) -> Result<Outcome, Frame> {
    let Some(room_id) = current_room else {
        return Err(req.error("must join a room first"));
    };

    match req.op() {
        "run" => {
            let Some(action) = req
                .data
                .get("action")
                .and_then(|v| v.as_str())
                .and_then(AiAction::parse)
            else {
                return Err(req.error("action required: organize or summarize"));
            };

            // Snapshot the note texts, then call out without holding anything.
            let texts = {
                let rooms = state.rooms.read().await;
                let Some(room) = rooms.get(room_id).cloned() else {
                    return Err(req.error("room not loaded"));
                };
                drop(rooms);
                let room = room.lock().await;
                room.board.notes().iter().map(|n| n.text.clone()).collect::<Vec<_>>()
            };

            let result = state.ai.run(action, &texts).await;
            let mut data = Data::new();
            data.insert("result".into(), serde_json::json!(result));
            Ok(Outcome::Reply(data))
        }
        op => Err(req.error(format!("unknown ai op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    let is_cursor = frame.syscall.starts_with("cursor:");
    if !is_cursor {
        if frame.status == crate::frame::Status::Error {
            let message = frame
                .data
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            warn!(id = %frame.id, syscall = %frame.syscall, message, "ws: send frame status=Error");
        } else {
            info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
        }
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

fn parse_points(value: &serde_json::Value) -> Option<Vec<f64>> {
    let array = value.as_array()?;
    array
        .iter()
        .map(|v| v.as_f64().filter(|n| n.is_finite()))
        .collect()
}

fn parse_id(data: &Data) -> Option<Uuid> {
    data.get("id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
}

fn random_note_color() -> String {
    let mut rng = rand::rng();
    NOTE_COLORS[rng.random_range(0..NOTE_COLORS.len())].to_string()
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
