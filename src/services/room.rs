//! Room service — connection lifecycle, identity, and fan-out.
//!
//! DESIGN
//! ======
//! Rooms are created lazily on first join and addressed by opaque strings.
//! Each new connection gets a unique client id and a randomly generated
//! display name and color. On part, the connection's presence record is
//! destroyed and the board is left untouched; whether an empty room's state
//! survives is the `ROOM_RETENTION` policy, not a correctness rule.
//!
//! ERROR HANDLING
//! ==============
//! Broadcast is best-effort `try_send`: a slow or disconnected peer loses
//! frames rather than delaying anyone else's mutation.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::board::BoardSnapshot;
use crate::frame::Frame;
use crate::state::{AppState, PresenceRecord, Room, RoomRetention};

// =============================================================================
// IDENTITY
// =============================================================================

const PRESENCE_COLORS: [&str; 8] =
    ["#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F"];

const NAME_ADJECTIVES: [&str; 6] = ["Swift", "Clever", "Bold", "Calm", "Bright", "Lucky"];
const NAME_ANIMALS: [&str; 6] = ["Fox", "Owl", "Bear", "Wolf", "Hawk", "Deer"];

/// Generate a connect-time display name and color.
#[must_use]
pub fn random_identity() -> (String, String) {
    let mut rng = rand::rng();
    let adjective = NAME_ADJECTIVES[rng.random_range(0..NAME_ADJECTIVES.len())];
    let animal = NAME_ANIMALS[rng.random_range(0..NAME_ANIMALS.len())];
    let color = PRESENCE_COLORS[rng.random_range(0..PRESENCE_COLORS.len())];
    (format!("{adjective} {animal}"), color.to_string())
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// A peer already in the room, reported to a joining client.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub client_id: Uuid,
    pub name: String,
    pub color: String,
    pub cursor: Option<crate::board::CursorPoint>,
}

/// Join a room, creating it lazily on first connection. Returns the board
/// snapshot and the current peer roster.
pub async fn join_room(
    state: &AppState,
    room_id: &str,
    client_id: Uuid,
    name: &str,
    color: &str,
    tx: mpsc::Sender<Frame>,
) -> (BoardSnapshot, Vec<PeerInfo>) {
    // The map write-lock is held across the insert below: releasing it
    // earlier would let eviction's empty-room re-check run between the
    // handle clone and the insert and orphan the joiner. Lock order (map,
    // then room) matches the eviction path.
    let mut rooms = state.rooms.write().await;
    let room = Arc::clone(
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new()))),
    );
    let mut room = room.lock().await;
    let peers = room
        .presence
        .iter()
        .map(|(id, record)| PeerInfo {
            client_id: *id,
            name: record.name.clone(),
            color: record.color.clone(),
            cursor: record.cursor,
        })
        .collect();

    room.clients.insert(client_id, tx);
    room.presence.insert(
        client_id,
        PresenceRecord { cursor: None, name: name.to_owned(), color: color.to_owned() },
    );

    info!(room_id, %client_id, clients = room.clients.len(), "client joined room");
    (room.board.snapshot(), peers)
}

/// Leave a room. Destroys the connection's presence record and leaves the
/// board untouched. When the last connection leaves, the room is evicted or
/// retained per the configured policy.
pub async fn part_room(state: &AppState, room_id: &str, client_id: Uuid) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(room_id).cloned() else {
        return;
    };
    drop(rooms);

    let now_empty = {
        let mut room = room.lock().await;
        room.clients.remove(&client_id);
        room.presence.remove(&client_id);
        info!(room_id, %client_id, remaining = room.clients.len(), "client left room");
        room.clients.is_empty()
    };

    if now_empty && state.retention == RoomRetention::Evict {
        let mut rooms = state.rooms.write().await;
        // Re-check under the write lock: a new client may have joined since.
        let still_empty = match rooms.get(room_id) {
            Some(room) => room.lock().await.clients.is_empty(),
            None => false,
        };
        if still_empty {
            rooms.remove(room_id);
            info!(room_id, "evicted empty room");
        }
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast a frame to all clients in a room, optionally excluding one.
pub async fn broadcast(state: &AppState, room_id: &str, frame: &Frame, exclude: Option<Uuid>) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(room_id).cloned() else {
        return;
    };
    drop(rooms);

    let room = room.lock().await;
    for (client_id, tx) in &room.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = tx.try_send(frame.clone());
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
