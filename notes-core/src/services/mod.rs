//! Services module
//!
//! Business logic that coordinates between the UI shell and the repository.

pub mod filter;
pub mod notes;

pub use filter::{CompositionRule, NoteFilter, QueryIntent};
pub use notes::NotesService;
