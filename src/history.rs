//! History — shared undo/redo over the room's edit stream.
//!
//! DESIGN
//! ======
//! Every committed mutation leaves behind an inverse [`Entry`] on the undo
//! stack. Applying an entry to the board returns the entry that undoes *it*,
//! so undo and redo are the same mechanism walking opposite stacks. The
//! stacks are room-global: any connected client may undo any client's edit.
//!
//! The controller is a two-state machine. While `Recording`, each committed
//! mutation pushes one entry. While `Paused`, mutations still apply to the
//! board but their inverses are buffered; `resume` collapses the buffer into
//! a single batch entry so an interactive gesture (a live note drag emitting
//! tens of small writes) undoes as one step, not one per pixel.
//!
//! ERROR HANDLING
//! ==============
//! `undo` and `redo` on empty stacks are silent no-ops, never errors.
//! Callers do not check stack depth beforehand.

use crate::board::{Board, NotePatch, StickyNote, Stroke};
use uuid::Uuid;

// =============================================================================
// ENTRY
// =============================================================================

/// An inverse-operation descriptor: enough information to undo one committed
/// mutation by replaying it against the board.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Undoes an appended stroke.
    RemoveStroke(Uuid),
    /// Undoes a stroke removal by restoring it at its prior z-position.
    InsertStroke { index: usize, stroke: Stroke },
    /// Undoes an appended note.
    RemoveNote(Uuid),
    /// Undoes a note deletion by restoring the full prior value.
    InsertNote { index: usize, note: StickyNote },
    /// Undoes a partial update by restoring the prior field values.
    PatchNote { id: Uuid, patch: NotePatch },
    /// Undoes a board clear in one step.
    RestoreBoard { strokes: Vec<Stroke>, notes: Vec<StickyNote> },
    /// Undoes a board restore.
    ClearBoard,
    /// A coalesced gesture, applied last-to-first. Buffered inverses are
    /// pushed in commit order, so undoing walks them newest-first.
    Batch(Vec<Entry>),
}

impl Entry {
    /// Apply this entry to the board and return its inverse. Returns `None`
    /// when the target vanished; the caller drops the entry silently.
    pub fn apply(self, board: &mut Board) -> Option<Entry> {
        match self {
            Entry::RemoveStroke(id) => {
                let (index, stroke) = board.remove_stroke(id)?;
                Some(Entry::InsertStroke { index, stroke })
            }
            Entry::InsertStroke { index, stroke } => {
                let id = stroke.id;
                board.insert_stroke(index, stroke);
                Some(Entry::RemoveStroke(id))
            }
            Entry::RemoveNote(id) => {
                let (index, note) = board.remove_note(id)?;
                Some(Entry::InsertNote { index, note })
            }
            Entry::InsertNote { index, note } => {
                let id = note.id;
                board.insert_note(index, note);
                Some(Entry::RemoveNote(id))
            }
            Entry::PatchNote { id, patch } => {
                let prior = board.update_note(id, &patch)?;
                Some(Entry::PatchNote { id, patch: prior })
            }
            Entry::RestoreBoard { strokes, notes } => {
                board.restore(strokes, notes);
                Some(Entry::ClearBoard)
            }
            Entry::ClearBoard => {
                let (strokes, notes) = board.clear_all();
                Some(Entry::RestoreBoard { strokes, notes })
            }
            Entry::Batch(entries) => {
                // Entries apply last-to-first; collecting each step's inverse
                // in that walk order yields a batch that, walked the same
                // way, replays the whole gesture in the opposite direction.
                let mut inverses = Vec::with_capacity(entries.len());
                for entry in entries.into_iter().rev() {
                    if let Some(inverse) = entry.apply(board) {
                        inverses.push(inverse);
                    }
                }
                if inverses.is_empty() {
                    return None;
                }
                Some(Entry::Batch(inverses))
            }
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Recording mode of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Recording,
    Paused,
}

/// Per-room undo/redo controller.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<Entry>,
    redo_stack: Vec<Entry>,
    mode: Mode,
    /// Inverses buffered while paused, in commit order.
    buffered: Vec<Entry>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self { undo_stack: Vec::new(), redo_stack: Vec::new(), mode: Mode::Recording, buffered: Vec::new() }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Record the inverse of a freshly committed mutation. Any committed
    /// mutation invalidates the redo stack, paused or not.
    pub fn record(&mut self, inverse: Entry) {
        self.redo_stack.clear();
        match self.mode {
            Mode::Recording => self.undo_stack.push(inverse),
            Mode::Paused => self.buffered.push(inverse),
        }
    }

    /// Enter paused mode. No-op if already paused.
    pub fn pause(&mut self) {
        self.mode = Mode::Paused;
    }

    /// Exit paused mode, collapsing any buffered mutations into one undoable
    /// entry. Returns whether an entry was flushed. No-op when nothing
    /// changed while paused.
    pub fn resume(&mut self) -> bool {
        self.mode = Mode::Recording;
        if self.buffered.is_empty() {
            return false;
        }
        let buffered = std::mem::take(&mut self.buffered);
        self.undo_stack.push(Entry::Batch(buffered));
        true
    }

    /// Undo the most recent committed mutation. Returns whether the board
    /// changed; an empty stack is a silent no-op.
    pub fn undo(&mut self, board: &mut Board) -> bool {
        let Some(entry) = self.undo_stack.pop() else {
            return false;
        };
        if let Some(inverse) = entry.apply(board) {
            self.redo_stack.push(inverse);
        }
        true
    }

    /// Redo the most recently undone mutation. Symmetric to [`Self::undo`].
    pub fn redo(&mut self, board: &mut Board) -> bool {
        let Some(entry) = self.redo_stack.pop() else {
            return false;
        };
        if let Some(inverse) = entry.apply(board) {
            self.undo_stack.push(inverse);
        }
        true
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
