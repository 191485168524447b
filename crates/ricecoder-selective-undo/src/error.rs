//! Error types for the selective undo system

use thiserror::Error;

use crate::models::{FileKey, OperationId};

/// Errors that can occur while recording edits or computing selective undo
#[derive(Debug, Error)]
pub enum SelectiveUndoError {
    /// Malformed or unsupported edit event. Indicates a bug in the recorder.
    #[error("Invalid edit event: {0}")]
    InvalidEvent(String),

    /// A segment or chunk does not fit the file's current coordinate space
    #[error("Segment invariant violated: {0}")]
    SegmentInvariant(String),

    /// Operation not present in any recorded history
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// No history has been recorded for the file
    #[error("No history for file: {0}")]
    FileNotFound(FileKey),

    /// No file is currently active
    #[error("No active file")]
    NoActiveFile,

    /// The external document could not be read or modified
    #[error("Document error: {0}")]
    Document(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SelectiveUndoError {
    /// Create a new InvalidEvent error with context
    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    /// Create a new SegmentInvariant error with context
    pub fn segment_invariant(msg: impl Into<String>) -> Self {
        Self::SegmentInvariant(msg.into())
    }

    /// Create a new Document error with context
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Create a new Config error with context
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is a recoverable lookup miss rather than a defect
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OperationNotFound(_) | Self::FileNotFound(_) | Self::NoActiveFile
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SelectiveUndoError>;
