//! Board — geometry types and the per-room state store.
//!
//! DESIGN
//! ======
//! A board is two append-ordered collections: freehand strokes and sticky
//! notes. Append order is z-order, so later elements draw on top. All
//! structural operations are identity-keyed: callers pass ids, never
//! indexes, which keeps concurrent insert/delete races from corrupting
//! positions. Operations on vanished ids resolve silently — they are
//! expected outcomes of legitimate races, not errors.
//!
//! Strokes are immutable once created: a stroke is appended whole at
//! pointer-release and later only removed (undo or board clear). Notes are
//! mutable through field-wise partial patches so a position-only drag never
//! clobbers concurrently edited text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// GEOMETRY TYPES
// =============================================================================

/// A 2D cursor coordinate on the unbounded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPoint {
    pub x: f64,
    pub y: f64,
}

/// A finished freehand stroke. `points` is a flat `[x0, y0, x1, y1, ...]`
/// list; fewer than 4 values is accepted and simply renders as nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: Uuid,
    pub points: Vec<f64>,
    pub color: String,
    pub size: f64,
}

/// A sticky note. Mutable via [`NotePatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: String,
    pub width: f64,
    pub height: f64,
}

/// Partial update for a sticky note. Only supplied fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl NotePatch {
    /// True when no field is supplied. An empty patch is a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.text.is_none()
            && self.color.is_none()
            && self.width.is_none()
            && self.height.is_none()
    }
}

/// Read-only copy of a board's collections, in z-order. Sent to joining
/// clients and after undo/redo as a `board:sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub strokes: Vec<Stroke>,
    pub notes: Vec<StickyNote>,
}

// =============================================================================
// BOARD
// =============================================================================

/// The authoritative board state for one room. Mutated only through these
/// primitives, always under the room's lock.
#[derive(Debug, Default)]
pub struct Board {
    strokes: Vec<Stroke>,
    notes: Vec<StickyNote>,
}

impl Board {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    #[must_use]
    pub fn notes(&self) -> &[StickyNote] {
        &self.notes
    }

    #[must_use]
    pub fn note(&self, id: Uuid) -> Option<&StickyNote> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Append a stroke at the top of the z-order.
    pub fn append_stroke(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Re-insert a stroke at its prior z-position (undo of a removal).
    /// Indexes past the end clamp to an append.
    pub fn insert_stroke(&mut self, index: usize, stroke: Stroke) {
        let index = index.min(self.strokes.len());
        self.strokes.insert(index, stroke);
    }

    /// Remove a stroke by identity. Returns its z-position and value, or
    /// `None` if the id is gone.
    pub fn remove_stroke(&mut self, id: Uuid) -> Option<(usize, Stroke)> {
        let index = self.strokes.iter().position(|s| s.id == id)?;
        Some((index, self.strokes.remove(index)))
    }

    /// Append a note at the top of the z-order.
    pub fn append_note(&mut self, note: StickyNote) {
        self.notes.push(note);
    }

    /// Re-insert a note at its prior z-position (undo of a deletion).
    pub fn insert_note(&mut self, index: usize, note: StickyNote) {
        let index = index.min(self.notes.len());
        self.notes.insert(index, note);
    }

    /// Merge the supplied fields into the note with this id. Returns the
    /// inverse patch (the prior values of exactly the supplied fields), or
    /// `None` when the id vanished — the caller treats that as a silent
    /// no-op, never a recreate.
    pub fn update_note(&mut self, id: Uuid, patch: &NotePatch) -> Option<NotePatch> {
        let note = self.notes.iter_mut().find(|n| n.id == id)?;
        let mut prior = NotePatch::default();
        if let Some(x) = patch.x {
            prior.x = Some(std::mem::replace(&mut note.x, x));
        }
        if let Some(y) = patch.y {
            prior.y = Some(std::mem::replace(&mut note.y, y));
        }
        if let Some(text) = &patch.text {
            prior.text = Some(std::mem::replace(&mut note.text, text.clone()));
        }
        if let Some(color) = &patch.color {
            prior.color = Some(std::mem::replace(&mut note.color, color.clone()));
        }
        if let Some(width) = patch.width {
            prior.width = Some(std::mem::replace(&mut note.width, width));
        }
        if let Some(height) = patch.height {
            prior.height = Some(std::mem::replace(&mut note.height, height));
        }
        Some(prior)
    }

    /// Remove a note by identity. Idempotent: a vanished id returns `None`.
    pub fn remove_note(&mut self, id: Uuid) -> Option<(usize, StickyNote)> {
        let index = self.notes.iter().position(|n| n.id == id)?;
        Some((index, self.notes.remove(index)))
    }

    /// Atomically empty both collections, returning the drained contents so
    /// the whole clear can be undone as one unit.
    pub fn clear_all(&mut self) -> (Vec<Stroke>, Vec<StickyNote>) {
        (std::mem::take(&mut self.strokes), std::mem::take(&mut self.notes))
    }

    /// Restore a full snapshot (undo of a clear).
    pub fn restore(&mut self, strokes: Vec<Stroke>, notes: Vec<StickyNote>) {
        self.strokes = strokes;
        self.notes = notes;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.notes.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot { strokes: self.strokes.clone(), notes: self.notes.clone() }
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
