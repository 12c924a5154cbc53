//! Presence service — ephemeral cursor and identity broadcast.
//!
//! DESIGN
//! ======
//! Each connection exclusively owns its presence record, so updates are
//! plain last-writer-wins: no history, no conflict resolution. Cursor
//! positions are broadcast to room peers and immediately forgotten — never
//! persisted, never undoable. Outbound rate limiting lives in the
//! connection loop's [`crate::throttle::CursorGate`]; this service applies
//! whatever the gate lets through.

use uuid::Uuid;

use crate::board::CursorPoint;
use crate::frame::{Data, Frame};
use crate::state::AppState;

/// Record a cursor position without broadcasting. Used while the owner's
/// throttle gate is holding the position; the record itself is always
/// last-writer-wins fresh.
pub async fn set_cursor(state: &AppState, room_id: &str, client_id: Uuid, point: CursorPoint) {
    let _ = update_record(state, room_id, client_id, Some(point)).await;
}

/// Record a cursor position and broadcast it to room peers except the
/// owner. Unknown connection ids are ignored.
pub async fn broadcast_cursor(state: &AppState, room_id: &str, client_id: Uuid, point: CursorPoint) {
    let Some((name, color)) = update_record(state, room_id, client_id, Some(point)).await else {
        return;
    };

    let mut data = Data::new();
    data.insert("client_id".into(), serde_json::json!(client_id));
    data.insert("x".into(), serde_json::json!(point.x));
    data.insert("y".into(), serde_json::json!(point.y));
    data.insert("name".into(), serde_json::json!(name));
    data.insert("color".into(), serde_json::json!(color));

    let frame = Frame::request("cursor:moved", data).with_room_id(room_id);
    super::room::broadcast(state, room_id, &frame, Some(client_id)).await;
}

/// Clear a cursor to absent (pointer left the canvas) and tell the peers.
pub async fn broadcast_cursor_left(state: &AppState, room_id: &str, client_id: Uuid) {
    if update_record(state, room_id, client_id, None).await.is_none() {
        return;
    }

    let mut data = Data::new();
    data.insert("client_id".into(), serde_json::json!(client_id));

    let frame = Frame::request("cursor:left", data).with_room_id(room_id);
    super::room::broadcast(state, room_id, &frame, Some(client_id)).await;
}

/// Last-writer-wins identity update for one connection. Broadcasts the new
/// identity to peers. Returns the resulting (name, color).
pub async fn set_identity(
    state: &AppState,
    room_id: &str,
    client_id: Uuid,
    name: Option<&str>,
    color: Option<&str>,
) -> Option<(String, String)> {
    let identity = {
        let rooms = state.rooms.read().await;
        let room = rooms.get(room_id).cloned()?;
        drop(rooms);

        let mut room = room.lock().await;
        let record = room.presence.get_mut(&client_id)?;
        if let Some(name) = name {
            record.name = name.to_owned();
        }
        if let Some(color) = color {
            record.color = color.to_owned();
        }
        (record.name.clone(), record.color.clone())
    };

    let mut data = Data::new();
    data.insert("client_id".into(), serde_json::json!(client_id));
    data.insert("name".into(), serde_json::json!(identity.0));
    data.insert("color".into(), serde_json::json!(identity.1));

    let frame = Frame::request("presence:set", data).with_room_id(room_id);
    super::room::broadcast(state, room_id, &frame, Some(client_id)).await;
    Some(identity)
}

/// Update the stored cursor for a connection, returning its identity.
async fn update_record(
    state: &AppState,
    room_id: &str,
    client_id: Uuid,
    cursor: Option<CursorPoint>,
) -> Option<(String, String)> {
    let rooms = state.rooms.read().await;
    let room = rooms.get(room_id).cloned()?;
    drop(rooms);

    let mut room = room.lock().await;
    let record = room.presence.get_mut(&client_id)?;
    record.cursor = cursor;
    Some((record.name.clone(), record.color.clone()))
}
