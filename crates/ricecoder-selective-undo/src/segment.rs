//! Segments: the live document ranges owned by edit records
//!
//! An insertion piece covers chars an edit inserted that are still in the
//! document. A deletion point is a zero-width position standing for text an
//! edit removed. When a later deletion swallows a piece (or a point), the
//! swallowed segment is *closed*: it collapses to zero width at the deletion
//! point, and the deletion remembers where inside its removed text the
//! segment used to sit so undo can put it back.

use serde::{Deserialize, Serialize};

use crate::models::OperationId;
use crate::text::char_len;

/// Stable handle of a segment inside a [`SegmentArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub usize);

/// What a segment stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Inserted text
    Insertion,
    /// Removed text, zero width in the document
    Deletion,
}

/// A segment swallowed by a deletion point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedSegment {
    /// The swallowed segment
    pub segment: SegmentId,
    /// Position of the segment inside the deleted text
    pub relative_offset: usize,
    /// Width the segment had before it was swallowed
    pub prior_length: usize,
    /// Whether the segment was already closed before
    pub prior_closed: bool,
}

/// A contiguous half-open range `[offset, offset + length)` of the current document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    owner: OperationId,
    kind: SegmentKind,
    offset: usize,
    length: usize,
    text: String,
    closed: bool,
    closed_segments: Vec<ClosedSegment>,
}

impl Segment {
    /// A live piece of inserted text
    pub fn insertion(owner: OperationId, offset: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Segment {
            owner,
            kind: SegmentKind::Insertion,
            offset,
            length: char_len(&text),
            text,
            closed: false,
            closed_segments: Vec::new(),
        }
    }

    /// A deletion point carrying the removed text
    pub fn deletion(owner: OperationId, offset: usize, deleted_text: impl Into<String>) -> Self {
        Segment {
            owner,
            kind: SegmentKind::Deletion,
            offset,
            length: 0,
            text: deleted_text.into(),
            closed: false,
            closed_segments: Vec::new(),
        }
    }

    /// The edit record owning this segment
    pub fn owner(&self) -> OperationId {
        self.owner
    }

    /// Insertion piece or deletion point
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Start of the segment in current document coordinates
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Current width in the document
    pub fn length(&self) -> usize {
        self.length
    }

    /// Inserted text of the piece, or removed text of the point
    pub fn text(&self) -> &str {
        &self.text
    }

    /// End of the segment; equals the offset for zero-width segments
    pub fn effective_end_offset(&self) -> usize {
        self.offset + self.length
    }

    /// Whether a later deletion swallowed this segment
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the segment occupies no chars of the document
    pub fn is_zero_width(&self) -> bool {
        self.length == 0
    }

    /// Whether this is a piece of text still present in the document
    pub fn is_live_text(&self) -> bool {
        self.kind == SegmentKind::Insertion && !self.closed && self.length > 0
    }

    /// Segments swallowed by this deletion point
    pub fn closed_segments(&self) -> &[ClosedSegment] {
        &self.closed_segments
    }

    /// Whether the segment touches the half-open region `[start, end)`.
    ///
    /// Pieces must share at least one char; deletion points must lie inside
    /// the region. Closed segments never match.
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        if self.closed {
            return false;
        }
        if self.length == 0 {
            start <= self.offset && self.offset < end
        } else {
            start < self.effective_end_offset() && self.offset < end
        }
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub(crate) fn set_length(&mut self, length: usize) {
        self.length = length;
    }

    pub(crate) fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
    }

    pub(crate) fn push_closed(&mut self, entry: ClosedSegment) {
        self.closed_segments.push(entry);
    }

    pub(crate) fn set_closed_segments(&mut self, entries: Vec<ClosedSegment>) {
        self.closed_segments = entries;
    }

    /// Split a live piece at `at` chars from its start. `self` keeps the head,
    /// the returned segment holds the tail.
    pub(crate) fn split_off(&mut self, at: usize) -> Segment {
        let tail_text: String = self.text.chars().skip(at).collect();
        let head_text: String = self.text.chars().take(at).collect();
        self.text = head_text;
        let tail_len = self.length - at;
        self.length = at;
        Segment {
            owner: self.owner,
            kind: self.kind,
            offset: self.offset + at,
            length: tail_len,
            text: tail_text,
            closed: self.closed,
            closed_segments: Vec::new(),
        }
    }
}

/// Owns every segment of one file history; segments are addressed by [`SegmentId`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentArena {
    segments: Vec<Segment>,
}

impl SegmentArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a segment and return its handle
    pub fn alloc(&mut self, segment: Segment) -> SegmentId {
        self.segments.push(segment);
        SegmentId(self.segments.len() - 1)
    }

    /// Look a segment up
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(id.0)
    }

    /// Number of segments ever allocated
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segment has been allocated
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate over all segments with their handles
    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| (SegmentId(idx), segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OperationId {
        OperationId::new(1, 1)
    }

    #[test]
    fn test_insertion_segment_range() {
        let segment = Segment::insertion(owner(), 3, "héllo");
        assert_eq!(segment.offset(), 3);
        assert_eq!(segment.length(), 5);
        assert_eq!(segment.effective_end_offset(), 8);
        assert!(segment.is_live_text());
    }

    #[test]
    fn test_deletion_segment_is_zero_width() {
        let segment = Segment::deletion(owner(), 4, "gone");
        assert_eq!(segment.length(), 0);
        assert_eq!(segment.effective_end_offset(), 4);
        assert!(segment.is_zero_width());
        assert!(!segment.is_live_text());
        assert_eq!(segment.text(), "gone");
    }

    #[test]
    fn test_intersects_piece_and_point() {
        let piece = Segment::insertion(owner(), 2, "abc");
        assert!(piece.intersects(0, 3));
        assert!(!piece.intersects(0, 2));
        assert!(!piece.intersects(5, 9));

        let point = Segment::deletion(owner(), 5, "x");
        assert!(point.intersects(5, 6));
        assert!(!point.intersects(0, 5));
        assert!(!point.intersects(6, 9));
    }

    #[test]
    fn test_closed_segment_never_intersects() {
        let mut piece = Segment::insertion(owner(), 2, "abc");
        piece.set_length(0);
        piece.set_closed(true);
        assert!(!piece.intersects(0, 10));
    }

    #[test]
    fn test_split_off() {
        let mut piece = Segment::insertion(owner(), 10, "abcdef");
        let tail = piece.split_off(2);
        assert_eq!(piece.text(), "ab");
        assert_eq!(piece.length(), 2);
        assert_eq!(tail.text(), "cdef");
        assert_eq!(tail.offset(), 12);
        assert_eq!(tail.length(), 4);
    }

    #[test]
    fn test_arena_handles_are_stable() {
        let mut arena = SegmentArena::new();
        let a = arena.alloc(Segment::insertion(owner(), 0, "a"));
        let b = arena.alloc(Segment::deletion(owner(), 1, "b"));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a).unwrap().text(), "a");
        assert_eq!(arena.get(b).unwrap().kind(), SegmentKind::Deletion);
        assert!(arena.get(SegmentId(5)).is_none());
    }
}
