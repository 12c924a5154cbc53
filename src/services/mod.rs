//! Domain services used by the WebSocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the room lifecycle and mutation logic so route
//! handlers can stay focused on protocol translation and field extraction.

pub mod ai;
pub mod edit;
pub mod presence;
pub mod room;
