//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the live room map and the AI client. Each room is wrapped in its
//! own `Mutex`, so rooms are independent units of concurrency: the outer
//! map is write-locked only for lazy creation and eviction, while every
//! board and history mutation serializes on the room's lock alone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::board::{Board, CursorPoint};
use crate::frame::Frame;
use crate::history::History;
use crate::services::ai::AiClient;

// =============================================================================
// PRESENCE
// =============================================================================

/// Per-connection ephemeral display state. Never persisted, never recorded
/// in history.
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    /// Current pointer position, or `None` when the pointer left the canvas.
    pub cursor: Option<CursorPoint>,
    pub name: String,
    pub color: String,
}

// =============================================================================
// ROOM
// =============================================================================

/// Live state for one room: the authoritative board, the shared undo/redo
/// controller, and the connected clients with their presence records.
pub struct Room {
    pub board: Board,
    pub history: History,
    /// Connected clients: `client_id` -> sender for outgoing frames.
    pub clients: HashMap<Uuid, mpsc::Sender<Frame>>,
    pub presence: HashMap<Uuid, PresenceRecord>,
}

impl Room {
    #[must_use]
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            history: History::new(),
            clients: HashMap::new(),
            presence: HashMap::new(),
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one room's serialized state.
pub type SharedRoom = Arc<Mutex<Room>>;

// =============================================================================
// APP STATE
// =============================================================================

/// What happens to a room's state when its last connection leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomRetention {
    /// Discard the room (default): a later join starts from an empty board.
    Evict,
    /// Keep the room in memory for rejoining.
    Retain,
}

impl RoomRetention {
    /// Parse from `ROOM_RETENTION` (`evict` default, or `retain`).
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("ROOM_RETENTION").as_deref() {
            Ok("retain") => Self::Retain,
            _ => Self::Evict,
        }
    }
}

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum — all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<String, SharedRoom>>>,
    pub ai: Arc<AiClient>,
    pub retention: RoomRetention,
}

impl AppState {
    #[must_use]
    pub fn new(ai: AiClient, retention: RoomRetention) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), ai: Arc::new(ai), retention }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
