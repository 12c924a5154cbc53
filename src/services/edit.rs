//! Edit service — committed board mutations and history operations.
//!
//! DESIGN
//! ======
//! Every function here takes the room's lock once and, inside it, applies
//! the mutation to the board, records its inverse in the history controller,
//! and enqueues the peer notification — one combined action. Two
//! concurrently submitted mutations therefore behave as some total order of
//! their individual application, and peers observe deltas in exactly that
//! order: fanning out after releasing the lock would let two commits
//! broadcast in the opposite order and leave every peer rendering the
//! losing value. `try_send` never blocks, so holding the lock across the
//! enqueue keeps the mutation path fast and fire-and-forget.
//!
//! Undo/redo replay goes through [`crate::history::History`] directly and
//! is never re-recorded.
//!
//! ERROR HANDLING
//! ==============
//! The only error is addressing a room that was never joined. Updating or
//! deleting a vanished note, clearing an empty board, and undo/redo on
//! empty stacks resolve as `Ok(None)` / `Ok(false)` — expected outcomes of
//! concurrency races, not faults — and fan nothing out.

use tracing::info;
use uuid::Uuid;

use crate::board::{BoardSnapshot, NotePatch, StickyNote, Stroke};
use crate::frame::{Data, Frame};
use crate::history::Entry;
use crate::state::{AppState, Room, SharedRoom};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("room not loaded: {0}")]
    RoomNotLoaded(String),
}

impl crate::frame::ErrorCode for EditError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::RoomNotLoaded(_) => "E_ROOM_NOT_LOADED",
        }
    }
}

/// Fields for a new stroke, validated at the transport edge.
#[derive(Debug, Clone)]
pub struct StrokeInput {
    pub points: Vec<f64>,
    pub color: String,
    pub size: f64,
}

/// Fields for a new note. Absent optional fields already defaulted.
#[derive(Debug, Clone)]
pub struct NoteInput {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: String,
    pub width: f64,
    pub height: f64,
}

async fn room(state: &AppState, room_id: &str) -> Result<SharedRoom, EditError> {
    let rooms = state.rooms.read().await;
    rooms
        .get(room_id)
        .cloned()
        .ok_or_else(|| EditError::RoomNotLoaded(room_id.to_string()))
}

// =============================================================================
// WIRE PAYLOADS
// =============================================================================

/// Wire payload for a committed stroke.
#[must_use]
pub fn stroke_data(stroke: &Stroke) -> Data {
    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(stroke.id));
    data.insert("points".into(), serde_json::json!(stroke.points));
    data.insert("color".into(), serde_json::json!(stroke.color));
    data.insert("size".into(), serde_json::json!(stroke.size));
    data
}

/// Wire payload for a full note.
#[must_use]
pub fn note_data(note: &StickyNote) -> Data {
    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(note.id));
    data.insert("x".into(), serde_json::json!(note.x));
    data.insert("y".into(), serde_json::json!(note.y));
    data.insert("text".into(), serde_json::json!(note.text));
    data.insert("color".into(), serde_json::json!(note.color));
    data.insert("width".into(), serde_json::json!(note.width));
    data.insert("height".into(), serde_json::json!(note.height));
    data
}

fn snapshot_data(snapshot: &BoardSnapshot) -> Data {
    let mut data = Data::new();
    data.insert("strokes".into(), serde_json::to_value(&snapshot.strokes).unwrap_or_default());
    data.insert("notes".into(), serde_json::to_value(&snapshot.notes).unwrap_or_default());
    data
}

/// Enqueue a delta for room clients while the room lock is still held, so
/// peers observe deltas in commit order. Best-effort per client: a full
/// channel loses the frame rather than delaying the mutation.
fn notify_peers(room: &Room, room_id: &str, syscall: &str, data: Data, exclude: Option<Uuid>) {
    let frame = Frame::request(syscall, data).with_room_id(room_id);
    for (client_id, tx) in &room.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        let _ = tx.try_send(frame.clone());
    }
}

// =============================================================================
// BOARD MUTATIONS
// =============================================================================

/// Append a finished stroke and notify peers. Strokes are immutable once
/// created.
pub async fn add_stroke(
    state: &AppState,
    room_id: &str,
    origin: Uuid,
    input: StrokeInput,
) -> Result<Stroke, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    let stroke = Stroke { id: Uuid::new_v4(), points: input.points, color: input.color, size: input.size };
    let result = stroke.clone();
    room.board.append_stroke(stroke);
    room.history.record(Entry::RemoveStroke(result.id));
    notify_peers(&room, room_id, "stroke:add", stroke_data(&result), Some(origin));

    Ok(result)
}

/// Create a sticky note at the top of the z-order and notify peers.
pub async fn create_note(
    state: &AppState,
    room_id: &str,
    origin: Uuid,
    input: NoteInput,
) -> Result<StickyNote, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    let note = StickyNote {
        id: Uuid::new_v4(),
        x: input.x,
        y: input.y,
        text: input.text,
        color: input.color,
        width: input.width,
        height: input.height,
    };
    let result = note.clone();
    room.board.append_note(note);
    room.history.record(Entry::RemoveNote(result.id));
    notify_peers(&room, room_id, "note:create", note_data(&result), Some(origin));

    Ok(result)
}

/// Merge the supplied fields into a note and notify peers. Returns the
/// merged note, or `Ok(None)` when the patch is empty or the id vanished —
/// both silent no-ops that record and broadcast nothing.
pub async fn update_note(
    state: &AppState,
    room_id: &str,
    origin: Uuid,
    note_id: Uuid,
    patch: &NotePatch,
) -> Result<Option<StickyNote>, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    if patch.is_empty() {
        return Ok(None);
    }
    let Some(prior) = room.board.update_note(note_id, patch) else {
        return Ok(None);
    };
    room.history.record(Entry::PatchNote { id: note_id, patch: prior });

    let merged = room.board.note(note_id).cloned();
    if let Some(note) = &merged {
        notify_peers(&room, room_id, "note:update", note_data(note), Some(origin));
    }
    Ok(merged)
}

/// Delete a note by identity and notify peers. Idempotent: a vanished id is
/// `Ok(false)` and broadcasts nothing.
pub async fn delete_note(
    state: &AppState,
    room_id: &str,
    origin: Uuid,
    note_id: Uuid,
) -> Result<bool, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    let Some((index, note)) = room.board.remove_note(note_id) else {
        return Ok(false);
    };
    room.history.record(Entry::InsertNote { index, note });

    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(note_id));
    notify_peers(&room, room_id, "note:delete", data, Some(origin));

    Ok(true)
}

/// Atomically empty the board and notify peers. Recorded as one history
/// unit so undoing a clear is O(1), not N re-insertions. Clearing an empty
/// board commits and broadcasts nothing; returns whether anything was
/// cleared.
pub async fn clear_board(state: &AppState, room_id: &str, origin: Uuid) -> Result<bool, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    if room.board.is_empty() {
        return Ok(false);
    }
    let (strokes, notes) = room.board.clear_all();
    info!(room_id, strokes = strokes.len(), notes = notes.len(), "board cleared");
    room.history.record(Entry::RestoreBoard { strokes, notes });
    notify_peers(&room, room_id, "board:clear", Data::new(), Some(origin));

    Ok(true)
}

// =============================================================================
// HISTORY OPERATIONS
// =============================================================================

/// Undo the most recent committed mutation, whichever client made it, and
/// sync every connection (undoer included) with the rewritten board.
/// Returns the post-undo snapshot, or `Ok(None)` on an empty stack.
pub async fn undo(state: &AppState, room_id: &str) -> Result<Option<BoardSnapshot>, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    let Room { board, history, .. } = &mut *room;
    if !history.undo(board) {
        return Ok(None);
    }
    let snapshot = board.snapshot();
    notify_peers(&room, room_id, "board:sync", snapshot_data(&snapshot), None);
    Ok(Some(snapshot))
}

/// Redo the most recently undone mutation. Symmetric to [`undo`].
pub async fn redo(state: &AppState, room_id: &str) -> Result<Option<BoardSnapshot>, EditError> {
    let room = room(state, room_id).await?;
    let mut room = room.lock().await;

    let Room { board, history, .. } = &mut *room;
    if !history.redo(board) {
        return Ok(None);
    }
    let snapshot = board.snapshot();
    notify_peers(&room, room_id, "board:sync", snapshot_data(&snapshot), None);
    Ok(Some(snapshot))
}

/// Stop recording individual history entries (start of an interactive
/// gesture such as a live note drag).
pub async fn pause_history(state: &AppState, room_id: &str) -> Result<(), EditError> {
    let room = room(state, room_id).await?;
    room.lock().await.history.pause();
    Ok(())
}

/// Resume recording, collapsing everything committed since `pause` into one
/// undoable step.
pub async fn resume_history(state: &AppState, room_id: &str) -> Result<(), EditError> {
    let room = room(state, room_id).await?;
    room.lock().await.history.resume();
    Ok(())
}

#[cfg(test)]
#[path = "edit_test.rs"]
mod tests;
