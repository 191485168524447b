//! Boundary to the editor-owned documents that undo results are applied to

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectiveUndoError};
use crate::models::{EditEvent, FileKey, OperationId};
use crate::text::{char_len, splice};

/// A mutable text buffer owned by the editor
pub trait Document {
    /// Current contents
    fn text(&self) -> Result<String>;

    /// Replace chars `[start, end)` with `text`
    fn replace(&mut self, start: usize, end: usize, text: &str) -> Result<()>;
}

/// Looks up the document of a file when undo spans several files
pub trait DocumentProvider {
    /// The open document of `file_key`
    fn document(&mut self, file_key: &FileKey) -> Result<&mut dyn Document>;
}

/// In-memory [`Document`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringDocument {
    content: String,
}

impl StringDocument {
    /// Create a document holding `content`
    pub fn new(content: impl Into<String>) -> Self {
        StringDocument {
            content: content.into(),
        }
    }

    /// Current contents without cloning
    pub fn as_str(&self) -> &str {
        &self.content
    }
}

impl Document for StringDocument {
    fn text(&self) -> Result<String> {
        Ok(self.content.clone())
    }

    fn replace(&mut self, start: usize, end: usize, text: &str) -> Result<()> {
        self.content = splice(&self.content, start, end, text).ok_or_else(|| {
            SelectiveUndoError::document(format!(
                "range [{}, {}) is outside a document of {} chars",
                start,
                end,
                char_len(&self.content)
            ))
        })?;
        Ok(())
    }
}

/// In-memory [`DocumentProvider`] keyed by file
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocuments {
    documents: HashMap<FileKey, StringDocument>,
}

impl InMemoryDocuments {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `file_key` with `content`, replacing any previous document
    pub fn open(&mut self, file_key: FileKey, content: impl Into<String>) {
        self.documents.insert(file_key, StringDocument::new(content));
    }

    /// Contents of an open document
    pub fn content(&self, file_key: &FileKey) -> Option<&str> {
        self.documents.get(file_key).map(StringDocument::as_str)
    }
}

impl DocumentProvider for InMemoryDocuments {
    fn document(&mut self, file_key: &FileKey) -> Result<&mut dyn Document> {
        self.documents
            .get_mut(file_key)
            .map(|document| document as &mut dyn Document)
            .ok_or_else(|| SelectiveUndoError::document(format!("{} is not open", file_key)))
    }
}

/// A text change committed to a document.
///
/// Offsets are in the document's coordinates right before the change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextReplacement {
    /// First replaced char
    pub start: usize,
    /// One past the last replaced char
    pub end: usize,
    /// Text currently in `[start, end)`
    pub old_text: String,
    /// Text put in its place
    pub new_text: String,
}

impl TextReplacement {
    /// Create a replacement of `[start, start + len(old_text))`
    pub fn new(start: usize, old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        let old_text = old_text.into();
        TextReplacement {
            start,
            end: start + char_len(&old_text),
            old_text,
            new_text: new_text.into(),
        }
    }

    /// Whether applying it changes nothing
    pub fn is_noop(&self) -> bool {
        self.old_text == self.new_text
    }

    /// Whether the replaced ranges of `self` and `other` share a char or touch at an insertion
    pub fn overlaps(&self, other: &TextReplacement) -> bool {
        if self.start == self.end || other.start == other.end {
            return self.start <= other.end && other.start <= self.end;
        }
        self.start < other.end && other.start < self.end
    }

    /// Apply to `document`
    pub fn apply(&self, document: &mut dyn Document) -> Result<()> {
        document.replace(self.start, self.end, &self.new_text)
    }

    /// The edit event recording this replacement, `None` for a no-op
    pub fn to_event(&self, id: OperationId) -> Option<EditEvent> {
        if self.is_noop() {
            return None;
        }
        let event = match (self.old_text.is_empty(), self.new_text.is_empty()) {
            (true, _) => EditEvent::insert(id, self.start, self.new_text.clone()),
            (_, true) => EditEvent::delete(id, self.start, self.old_text.clone()),
            _ => EditEvent::replace(id, self.start, self.old_text.clone(), self.new_text.clone()),
        };
        Some(event)
    }
}
