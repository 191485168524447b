//! Identifiers and raw edit events

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectiveUndoError};
use crate::text::char_len;

/// Identifies one independent edit timeline: a file inside a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    /// Name of the project owning the file
    pub project_name: String,
    /// Full path of the file
    pub file_path: String,
}

impl FileKey {
    /// Create a new file key
    pub fn new(project_name: impl Into<String>, file_path: impl Into<String>) -> Self {
        FileKey {
            project_name: project_name.into(),
            file_path: file_path.into(),
        }
    }

    /// The last component of the file path
    pub fn file_name_only(&self) -> &str {
        Path::new(&self.file_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.file_path)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_name, self.file_path)
    }
}

/// Global identifier of one recorded edit.
///
/// Ordering is lexicographic: the session id first, the command index breaks
/// ties inside a session. This is the happens-before order of all edits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OperationId {
    /// Editing session the edit belongs to
    pub session_id: i64,
    /// Sequence number of the edit inside its session
    pub command_index: i64,
}

impl OperationId {
    /// Create a new operation id
    pub fn new(session_id: i64, command_index: i64) -> Self {
        OperationId {
            session_id,
            command_index,
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session_id, self.command_index)
    }
}

/// Classification of an edit record, fixed when the record is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    /// Pure insertion
    Insert,
    /// Pure deletion
    Delete,
    /// Deletion followed by an insertion at the same offset
    Replace,
}

impl EditKind {
    /// Index used by timeline renderers to colour operations
    pub fn type_index(&self) -> usize {
        match self {
            EditKind::Insert => 0,
            EditKind::Delete => 1,
            EditKind::Replace => 2,
        }
    }

    /// Human-readable name of the kind
    pub fn type_name(&self) -> &'static str {
        match self {
            EditKind::Insert => "Insert",
            EditKind::Delete => "Delete",
            EditKind::Replace => "Replace",
        }
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Payload of a raw edit event. Offsets and lengths count chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditEventKind {
    /// Text inserted at `offset`
    Insert {
        /// Insertion point
        offset: usize,
        /// Inserted text
        text: String,
    },
    /// `length` chars removed at `offset`
    Delete {
        /// Start of the removed range
        offset: usize,
        /// Number of removed chars
        length: usize,
        /// The removed text
        deleted_text: String,
    },
    /// `old_length` chars at `offset` replaced by `new_length` chars
    Replace {
        /// Start of the replaced range
        offset: usize,
        /// Number of removed chars
        old_length: usize,
        /// Number of inserted chars
        new_length: usize,
        /// The removed text
        deleted_text: String,
        /// The inserted text
        inserted_text: String,
    },
}

/// One raw document change as delivered by the external recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEvent {
    /// Identifier assigned by the recorder
    pub id: OperationId,
    /// When the edit started
    pub timestamp: DateTime<Utc>,
    /// When the edit was finalized
    pub timestamp2: DateTime<Utc>,
    /// What changed
    pub kind: EditEventKind,
}

impl EditEvent {
    /// Create an event with both timestamps set to now
    pub fn new(id: OperationId, kind: EditEventKind) -> Self {
        let now = Utc::now();
        EditEvent {
            id,
            timestamp: now,
            timestamp2: now,
            kind,
        }
    }

    /// Insertion of `text` at `offset`
    pub fn insert(id: OperationId, offset: usize, text: impl Into<String>) -> Self {
        Self::new(
            id,
            EditEventKind::Insert {
                offset,
                text: text.into(),
            },
        )
    }

    /// Deletion of `deleted_text` starting at `offset`
    pub fn delete(id: OperationId, offset: usize, deleted_text: impl Into<String>) -> Self {
        let deleted_text = deleted_text.into();
        Self::new(
            id,
            EditEventKind::Delete {
                offset,
                length: char_len(&deleted_text),
                deleted_text,
            },
        )
    }

    /// Replacement of `deleted_text` at `offset` by `inserted_text`
    pub fn replace(
        id: OperationId,
        offset: usize,
        deleted_text: impl Into<String>,
        inserted_text: impl Into<String>,
    ) -> Self {
        let deleted_text = deleted_text.into();
        let inserted_text = inserted_text.into();
        Self::new(
            id,
            EditEventKind::Replace {
                offset,
                old_length: char_len(&deleted_text),
                new_length: char_len(&inserted_text),
                deleted_text,
                inserted_text,
            },
        )
    }

    /// Override the recorder timestamps
    pub fn with_timestamps(mut self, started: DateTime<Utc>, finished: DateTime<Utc>) -> Self {
        self.timestamp = started;
        self.timestamp2 = finished;
        self
    }

    /// Offset the edit starts at
    pub fn offset(&self) -> usize {
        match &self.kind {
            EditEventKind::Insert { offset, .. }
            | EditEventKind::Delete { offset, .. }
            | EditEventKind::Replace { offset, .. } => *offset,
        }
    }

    /// Text removed by the edit, empty for insertions
    pub fn deleted_text(&self) -> &str {
        match &self.kind {
            EditEventKind::Insert { .. } => "",
            EditEventKind::Delete { deleted_text, .. }
            | EditEventKind::Replace { deleted_text, .. } => deleted_text,
        }
    }

    /// Text added by the edit, empty for deletions
    pub fn inserted_text(&self) -> &str {
        match &self.kind {
            EditEventKind::Insert { text, .. } => text,
            EditEventKind::Delete { .. } => "",
            EditEventKind::Replace { inserted_text, .. } => inserted_text,
        }
    }

    /// Number of chars removed
    pub fn deleted_length(&self) -> usize {
        match &self.kind {
            EditEventKind::Insert { .. } => 0,
            EditEventKind::Delete { length, .. } => *length,
            EditEventKind::Replace { old_length, .. } => *old_length,
        }
    }

    /// Number of chars added
    pub fn inserted_length(&self) -> usize {
        match &self.kind {
            EditEventKind::Insert { text, .. } => char_len(text),
            EditEventKind::Delete { .. } => 0,
            EditEventKind::Replace { new_length, .. } => *new_length,
        }
    }

    /// Validate the event for consistency
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            EditEventKind::Insert { text, .. } => {
                if text.is_empty() {
                    return Err(SelectiveUndoError::invalid_event(format!(
                        "insert {} has no text",
                        self.id
                    )));
                }
            }
            EditEventKind::Delete {
                length,
                deleted_text,
                ..
            } => {
                if *length == 0 {
                    return Err(SelectiveUndoError::invalid_event(format!(
                        "delete {} removes nothing",
                        self.id
                    )));
                }
                if char_len(deleted_text) != *length {
                    return Err(SelectiveUndoError::invalid_event(format!(
                        "delete {} declares {} chars but carries {}",
                        self.id,
                        length,
                        char_len(deleted_text)
                    )));
                }
            }
            EditEventKind::Replace {
                old_length,
                new_length,
                deleted_text,
                inserted_text,
                ..
            } => {
                if char_len(deleted_text) != *old_length || char_len(inserted_text) != *new_length
                {
                    return Err(SelectiveUndoError::invalid_event(format!(
                        "replace {} lengths do not match its texts",
                        self.id
                    )));
                }
                if *old_length == 0 && *new_length == 0 {
                    return Err(SelectiveUndoError::invalid_event(format!(
                        "replace {} changes nothing",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate and classify the event.
    ///
    /// A replacement that removes nothing is an insertion, one that adds
    /// nothing is a deletion.
    pub fn classify(&self) -> Result<EditKind> {
        self.validate()?;
        let kind = match &self.kind {
            EditEventKind::Insert { .. } => EditKind::Insert,
            EditEventKind::Delete { .. } => EditKind::Delete,
            EditEventKind::Replace {
                old_length: 0, ..
            } => EditKind::Insert,
            EditEventKind::Replace {
                new_length: 0, ..
            } => EditKind::Delete,
            EditEventKind::Replace { .. } => EditKind::Replace,
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: i64) -> OperationId {
        OperationId::new(1, index)
    }

    #[test]
    fn test_operation_id_ordering() {
        let mut ids = vec![
            OperationId::new(2, 1),
            OperationId::new(1, 10),
            OperationId::new(1, 2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                OperationId::new(1, 2),
                OperationId::new(1, 10),
                OperationId::new(2, 1)
            ]
        );
    }

    #[test]
    fn test_file_key_equality_uses_both_fields() {
        let a = FileKey::new("proj", "/src/Main.java");
        let b = FileKey::new("proj", "/src/Main.java");
        let c = FileKey::new("other", "/src/Main.java");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.file_name_only(), "Main.java");
        assert_eq!(a.to_string(), "proj:/src/Main.java");
    }

    #[test]
    fn test_classify_basic_kinds() {
        assert_eq!(EditEvent::insert(id(1), 0, "a").classify().unwrap(), EditKind::Insert);
        assert_eq!(EditEvent::delete(id(2), 0, "a").classify().unwrap(), EditKind::Delete);
        assert_eq!(
            EditEvent::replace(id(3), 0, "a", "b").classify().unwrap(),
            EditKind::Replace
        );
    }

    #[test]
    fn test_classify_degenerate_replace() {
        assert_eq!(
            EditEvent::replace(id(1), 0, "", "b").classify().unwrap(),
            EditKind::Insert
        );
        assert_eq!(
            EditEvent::replace(id(2), 0, "a", "").classify().unwrap(),
            EditKind::Delete
        );
        assert!(EditEvent::replace(id(3), 0, "", "").classify().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_events() {
        assert!(EditEvent::insert(id(1), 0, "").validate().is_err());
        let bad_delete = EditEvent::new(
            id(2),
            EditEventKind::Delete {
                offset: 0,
                length: 3,
                deleted_text: "ab".to_string(),
            },
        );
        assert!(matches!(
            bad_delete.validate(),
            Err(SelectiveUndoError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_lengths_count_chars() {
        let event = EditEvent::replace(id(1), 2, "é", "漢字");
        assert_eq!(event.deleted_length(), 1);
        assert_eq!(event.inserted_length(), 2);
        assert_eq!(event.offset(), 2);
    }

    #[test]
    fn test_event_serialization() {
        let event = EditEvent::replace(id(7), 4, "old", "new");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"replace\""));
        let back: EditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
