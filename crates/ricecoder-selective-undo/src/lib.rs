#![warn(missing_docs)]

//! Selective undo for ricecoder
//!
//! Records every fine-grained edit made to a file and lets any subset of
//! them be undone later, not only the most recent one. Each edit owns
//! segments tracked in the file's current coordinates; overlapping effects
//! become conflicts, touching segments become chunks, and undoing a chunk
//! yields either one replacement text or a set of alternatives to choose from.
//!
//! ```
//! use ricecoder_selective_undo::{
//!     EditEvent, FileKey, HistoryManager, OperationId, SelectiveUndoEngine, SkipConflicts,
//!     StringDocument, UndoSelection,
//! };
//!
//! let manager = HistoryManager::new();
//! let key = FileKey::new("demo", "src/main.rs");
//! manager.record_edit(&key, EditEvent::insert(OperationId::new(1, 1), 0, "foo")).unwrap();
//! manager.record_edit(&key, EditEvent::insert(OperationId::new(1, 2), 3, "bar")).unwrap();
//!
//! let mut doc = StringDocument::new("foobar");
//! let engine = SelectiveUndoEngine::new(&manager);
//! let selection = UndoSelection::Ids(vec![OperationId::new(1, 1)]);
//! engine.do_selective_undo(&key, &selection, &mut doc, &SkipConflicts).unwrap();
//! assert_eq!(doc.as_str(), "bar");
//! ```

pub mod change;
pub mod chunk;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod history;
pub mod models;
pub mod persistence;
pub mod segment;
pub mod text;
mod transform;

// Re-export public API
pub use change::EditRecord;
pub use chunk::{determine_chunks, has_conflict_outside_chunk, Chunk, ChunkCopy, ChunkSummary};
pub use config::UndoConfig;
pub use document::{Document, DocumentProvider, InMemoryDocuments, StringDocument, TextReplacement};
pub use engine::{
    ConflictResolver, ConflictedChunk, MultiFileUndoReport, SelectiveUndoEngine, SkipConflicts,
    UndoAlternative, UndoPlan, UndoPreview, UndoReport, UndoSelection,
};
pub use error::{Result, SelectiveUndoError};
pub use history::{ConflictGraph, FileHistory, HistoryListener, HistoryManager};
pub use models::{EditEvent, EditEventKind, EditKind, FileKey, OperationId};
pub use persistence::HistorySnapshot;
pub use segment::{ClosedSegment, Segment, SegmentArena, SegmentId, SegmentKind};
