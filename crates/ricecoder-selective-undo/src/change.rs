//! Runtime edit records

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectiveUndoError};
use crate::models::{EditEvent, EditKind, FileKey, OperationId};
use crate::segment::{Segment, SegmentArena, SegmentId};
use crate::transform::{dispatch, ApplyOutcome, SourceEdit, TargetSegments};

const MARKER_PREVIEW_CHARS: usize = 40;

/// One recorded edit together with the segments it currently owns.
///
/// Segments live in the file history's [`SegmentArena`]; the record keeps
/// their handles. Records compare by [`OperationId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRecord {
    event: EditEvent,
    kind: EditKind,
    belongs_to: FileKey,
    segments: Vec<SegmentId>,
    deletion_point: Option<SegmentId>,
}

impl EditRecord {
    /// Wrap a raw event and allocate its initial segments.
    ///
    /// Fails with [`SelectiveUndoError::InvalidEvent`] for malformed events.
    pub fn new(event: EditEvent, belongs_to: FileKey, arena: &mut SegmentArena) -> Result<Self> {
        let kind = event.classify()?;
        let id = event.id;
        let offset = event.offset();

        let mut segments = Vec::with_capacity(2);
        let mut deletion_point = None;
        if matches!(kind, EditKind::Delete | EditKind::Replace) {
            let point = arena.alloc(Segment::deletion(id, offset, event.deleted_text()));
            deletion_point = Some(point);
            segments.push(point);
        }
        if matches!(kind, EditKind::Insert | EditKind::Replace) {
            segments.push(arena.alloc(Segment::insertion(id, offset, event.inserted_text())));
        }

        Ok(EditRecord {
            event,
            kind,
            belongs_to,
            segments,
            deletion_point,
        })
    }

    /// Identifier of the underlying event
    pub fn id(&self) -> OperationId {
        self.event.id
    }

    /// Insert, Delete or Replace
    pub fn kind(&self) -> EditKind {
        self.kind
    }

    /// The raw event this record wraps
    pub fn event(&self) -> &EditEvent {
        &self.event
    }

    /// File the edit was made in
    pub fn belongs_to(&self) -> &FileKey {
        &self.belongs_to
    }

    /// Handles of the segments currently owned by this record
    pub fn segment_ids(&self) -> &[SegmentId] {
        &self.segments
    }

    /// Handle of the deletion point, for deletions and replacements
    pub fn deletion_point(&self) -> Option<SegmentId> {
        self.deletion_point
    }

    /// Resolve every owned segment in `arena`
    pub fn all_segments<'a>(&self, arena: &'a SegmentArena) -> Vec<&'a Segment> {
        self.segments.iter().filter_map(|id| arena.get(*id)).collect()
    }

    /// Whether any owned segment touches `[start, end)`
    pub fn intersects(&self, arena: &SegmentArena, start: usize, end: usize) -> bool {
        self.all_segments(arena)
            .iter()
            .any(|segment| segment.intersects(start, end))
    }

    /// Short description used for editor markers
    pub fn marker_message(&self) -> String {
        let preview = |text: &str| -> String {
            let flat = text.replace("\r\n", "\n").replace(['\r', '\n'], "⏎");
            if flat.chars().count() > MARKER_PREVIEW_CHARS {
                let cut: String = flat.chars().take(MARKER_PREVIEW_CHARS).collect();
                format!("{}...", cut)
            } else {
                flat
            }
        };
        match self.kind {
            EditKind::Insert => format!("Inserted \"{}\"", preview(self.event.inserted_text())),
            EditKind::Delete => format!("Deleted \"{}\"", preview(self.event.deleted_text())),
            EditKind::Replace => format!(
                "Replaced \"{}\" with \"{}\"",
                preview(self.event.deleted_text()),
                preview(self.event.inserted_text())
            ),
        }
    }

    fn source_edit(&self) -> SourceEdit {
        SourceEdit {
            id: self.id(),
            kind: self.kind,
            offset: self.event.offset(),
            deleted_length: self.event.deleted_length(),
            inserted_length: self.event.inserted_length(),
        }
    }

    /// Apply a newer insertion onto this record
    pub fn apply_insert(&mut self, insert: &EditRecord, arena: &mut SegmentArena) -> Result<bool> {
        self.apply_from(insert, EditKind::Insert, arena)
    }

    /// Apply a newer deletion onto this record
    pub fn apply_delete(&mut self, delete: &EditRecord, arena: &mut SegmentArena) -> Result<bool> {
        self.apply_from(delete, EditKind::Delete, arena)
    }

    /// Apply a newer replacement onto this record
    pub fn apply_replace(
        &mut self,
        replace: &EditRecord,
        arena: &mut SegmentArena,
    ) -> Result<bool> {
        self.apply_from(replace, EditKind::Replace, arena)
    }

    /// Apply `self`, the newer record, onto `target`.
    ///
    /// Returns whether the two records now conflict.
    pub fn apply_to(&self, target: &mut EditRecord, arena: &mut SegmentArena) -> Result<bool> {
        match self.kind {
            EditKind::Insert => target.apply_insert(self, arena),
            EditKind::Delete => target.apply_delete(self, arena),
            EditKind::Replace => target.apply_replace(self, arena),
        }
    }

    fn apply_from(
        &mut self,
        source: &EditRecord,
        expected: EditKind,
        arena: &mut SegmentArena,
    ) -> Result<bool> {
        if source.kind != expected {
            return Err(SelectiveUndoError::invalid_event(format!(
                "{} is a {}, not a {}",
                source.id(),
                source.kind,
                expected
            )));
        }
        if source.id() <= self.id() {
            return Err(SelectiveUndoError::invalid_event(format!(
                "{} cannot be applied onto later or equal operation {}",
                source.id(),
                self.id()
            )));
        }

        let edit = source.source_edit();
        let mut outcome = ApplyOutcome::default();
        {
            let mut target = TargetSegments {
                owner: self.id(),
                ids: &mut self.segments,
                arena: &mut *arena,
            };
            dispatch(source.kind, self.kind)(&edit, &mut target, &mut outcome)?;
        }

        if !outcome.closed.is_empty() {
            let point = source.deletion_point.ok_or_else(|| {
                SelectiveUndoError::segment_invariant(format!(
                    "{} closed segments without a deletion point",
                    source.id()
                ))
            })?;
            let closer = arena.get_mut(point).ok_or_else(|| {
                SelectiveUndoError::segment_invariant(format!(
                    "deletion point of {} is not in the arena",
                    source.id()
                ))
            })?;
            for entry in outcome.closed {
                closer.push_closed(entry);
            }
        }

        Ok(outcome.conflict)
    }
}

impl PartialEq for EditRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EditRecord {}

impl PartialOrd for EditRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EditRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl fmt::Display for EditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {} ({})",
            self.event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.belongs_to.file_name_only(),
            self.id()
        )
    }
}
