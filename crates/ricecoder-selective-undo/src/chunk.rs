//! Chunks: groups of touching segments undone as one unit

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, SelectiveUndoError};
use crate::history::FileHistory;
use crate::models::{FileKey, OperationId};
use crate::segment::{ClosedSegment, Segment, SegmentId, SegmentKind};
use crate::text::{char_len, line_of_offset, splice};

/// A run of segments where every segment overlaps or touches its predecessor.
///
/// Holds snapshots of the segments taken when the chunk was built, so it
/// stays valid while the history keeps growing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    file_key: FileKey,
    segments: Vec<(SegmentId, Segment)>,
    involved: Vec<OperationId>,
    start_offset: usize,
    end_offset: usize,
}

/// What an editor needs to list a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// File the chunk lives in
    pub file_key: FileKey,
    /// First char covered
    pub start_offset: usize,
    /// One past the last char covered
    pub end_offset: usize,
    /// Operations owning the chunk's segments, in operation order
    pub involved: Vec<OperationId>,
    /// Whether an involved operation conflicts with one outside the chunk
    pub has_conflict_outside_chunk: bool,
}

impl Chunk {
    /// Build a chunk covering every given segment, however far apart
    pub fn spanning(file_key: FileKey, mut segments: Vec<(SegmentId, Segment)>) -> Result<Self> {
        if segments.is_empty() {
            return Err(SelectiveUndoError::segment_invariant(format!(
                "empty chunk in {}",
                file_key
            )));
        }
        segments.sort_by(|(a_id, a), (b_id, b)| {
            a.offset()
                .cmp(&b.offset())
                .then(a.owner().cmp(&b.owner()))
                .then(a_id.cmp(b_id))
        });
        let start_offset = segments[0].1.offset();
        let end_offset = segments
            .iter()
            .map(|(_, segment)| segment.effective_end_offset())
            .max()
            .unwrap_or(start_offset);
        let involved: BTreeSet<OperationId> =
            segments.iter().map(|(_, segment)| segment.owner()).collect();

        Ok(Chunk {
            file_key,
            segments,
            involved: involved.into_iter().collect(),
            start_offset,
            end_offset,
        })
    }

    /// File the chunk lives in
    pub fn file_key(&self) -> &FileKey {
        &self.file_key
    }

    /// Segment snapshots ordered by offset
    pub fn segments(&self) -> &[(SegmentId, Segment)] {
        &self.segments
    }

    /// Offset of the first segment
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// Largest effective end among the segments
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    /// Number of chars covered
    pub fn chunk_length(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Distinct owners of the segments, in operation order
    pub fn involved_changes(&self) -> &[OperationId] {
        &self.involved
    }

    /// Whether `id` owns a segment of this chunk
    pub fn involves(&self, id: OperationId) -> bool {
        self.involved.binary_search(&id).is_ok()
    }

    /// Order by start offset, then by end offset
    pub fn cmp_location(&self, other: &Chunk) -> Ordering {
        self.start_offset
            .cmp(&other.start_offset)
            .then(self.end_offset.cmp(&other.end_offset))
    }

    /// "file: line N" or "file: lines N-M", one-based, against the current text
    pub fn label(&self, doc_text: &str) -> String {
        let first = line_of_offset(doc_text, self.start_offset) + 1;
        let last = line_of_offset(doc_text, self.end_offset.max(self.start_offset + 1) - 1) + 1;
        if first == last {
            format!("{}: line {}", self.file_key.file_name_only(), first)
        } else {
            format!("{}: lines {}-{}", self.file_key.file_name_only(), first, last)
        }
    }

    /// Summary with the outside-conflict flag computed against `history`
    pub fn summary(&self, history: &FileHistory) -> ChunkSummary {
        ChunkSummary {
            file_key: self.file_key.clone(),
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            involved: self.involved.clone(),
            has_conflict_outside_chunk: has_conflict_outside_chunk(self, history),
        }
    }

    /// Independent copy whose closed-segment links point into the copy
    pub fn copy_chunk(&self) -> ChunkCopy {
        let local: HashMap<SegmentId, usize> = self
            .segments
            .iter()
            .enumerate()
            .map(|(idx, (id, _))| (*id, idx))
            .collect();

        let segments = self
            .segments
            .iter()
            .map(|(_, segment)| {
                let mut copy = segment.clone();
                let remapped: Vec<ClosedSegment> = segment
                    .closed_segments()
                    .iter()
                    .filter_map(|entry| {
                        local.get(&entry.segment).map(|idx| ClosedSegment {
                            segment: SegmentId(*idx),
                            ..entry.clone()
                        })
                    })
                    .collect();
                copy.set_closed_segments(remapped);
                copy
            })
            .collect::<Vec<_>>();

        ChunkCopy {
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            removed: vec![false; segments.len()],
            segments,
        }
    }
}

/// Group the segments of `ids` into chunks, ordered by location.
///
/// Unknown ids are ignored; resolve them against the history first.
pub fn determine_chunks(history: &FileHistory, ids: &[OperationId]) -> Result<Vec<Chunk>> {
    let mut segments = record_segments(history, ids)?;
    segments.sort_by(|(a_id, a), (b_id, b)| {
        a.offset()
            .cmp(&b.offset())
            .then(a.owner().cmp(&b.owner()))
            .then(a_id.cmp(b_id))
    });

    let mut groups: Vec<Vec<(SegmentId, Segment)>> = Vec::new();
    let mut running_end = 0usize;
    for (id, segment) in segments {
        let end = segment.effective_end_offset();
        match groups.last_mut() {
            Some(group) if segment.offset() <= running_end => {
                running_end = running_end.max(end);
                group.push((id, segment));
            }
            _ => {
                running_end = end;
                groups.push(vec![(id, segment)]);
            }
        }
    }

    let chunks = groups
        .into_iter()
        .map(|group| Chunk::spanning(history.key().clone(), group))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        file = %history.key(),
        operations = ids.len(),
        chunks = chunks.len(),
        "Determined chunks"
    );
    Ok(chunks)
}

/// Snapshots of every segment owned by the records of `ids`
pub(crate) fn record_segments(
    history: &FileHistory,
    ids: &[OperationId],
) -> Result<Vec<(SegmentId, Segment)>> {
    let mut segments = Vec::new();
    for record in history.filter_by_ids(ids) {
        for id in record.segment_ids() {
            let segment = history.arena().get(*id).ok_or_else(|| {
                SelectiveUndoError::segment_invariant(format!(
                    "segment {} of {} is not in the arena",
                    id.0,
                    record.id()
                ))
            })?;
            segments.push((*id, segment.clone()));
        }
    }
    Ok(segments)
}

/// Whether an involved operation of `chunk` conflicts with one the chunk does not involve
pub fn has_conflict_outside_chunk(chunk: &Chunk, history: &FileHistory) -> bool {
    conflicts_outside_chunk(chunk, history).next().is_some()
}

/// Operations outside `chunk` that conflict with one of its involved operations
pub fn conflicting_outside_chunk(chunk: &Chunk, history: &FileHistory) -> Vec<OperationId> {
    let outside: BTreeSet<OperationId> = conflicts_outside_chunk(chunk, history).collect();
    outside.into_iter().collect()
}

fn conflicts_outside_chunk<'a>(
    chunk: &'a Chunk,
    history: &'a FileHistory,
) -> impl Iterator<Item = OperationId> + 'a {
    chunk.involved.iter().flat_map(move |id| {
        history
            .conflict_graph()
            .neighbors(*id)
            .into_iter()
            .filter(move |other| !chunk.involves(*other))
    })
}

/// Scratch copy of a chunk's segments; undoing mutates only the copy
#[derive(Debug, Clone)]
pub struct ChunkCopy {
    start_offset: usize,
    end_offset: usize,
    segments: Vec<Segment>,
    removed: Vec<bool>,
}

impl ChunkCopy {
    /// Start of the copied span in current document coordinates
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// End of the copied span in current document coordinates
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    /// Copied segments; closed-segment links use indices into this slice
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Undo every operation owning a copied segment, latest first.
    ///
    /// `span_text` is the current text of `[start_offset, end_offset)`; the
    /// returned text replaces it. Each operation first loses its live inserted
    /// pieces, then gets its deleted text back at its deletion point, which
    /// reopens the segments that deletion had swallowed.
    pub fn undo(mut self, span_text: &str) -> Result<String> {
        let expected = self.end_offset - self.start_offset;
        if char_len(span_text) != expected {
            return Err(SelectiveUndoError::segment_invariant(format!(
                "chunk [{}, {}) does not match {} chars of document text",
                self.start_offset,
                self.end_offset,
                char_len(span_text)
            )));
        }

        let owners: BTreeSet<OperationId> = self.segments.iter().map(Segment::owner).collect();
        let mut text = span_text.to_string();
        for owner in owners.into_iter().rev() {
            self.remove_pieces(owner, &mut text)?;
            self.reinsert_deletion(owner, &mut text)?;
        }
        Ok(text)
    }

    fn remove_pieces(&mut self, owner: OperationId, text: &mut String) -> Result<()> {
        let mut pieces: Vec<usize> = (0..self.segments.len())
            .filter(|idx| {
                let segment = &self.segments[*idx];
                !self.removed[*idx] && segment.owner() == owner && segment.is_live_text()
            })
            .collect();
        pieces.sort_by_key(|idx| std::cmp::Reverse(self.segments[*idx].offset()));

        for idx in pieces {
            let start = self.segments[idx].offset();
            let end = self.segments[idx].effective_end_offset();
            let width = end - start;
            *text = self.splice_local(text, start, end, "")?;
            self.removed[idx] = true;

            for (other, segment) in self.segments.iter_mut().enumerate() {
                if self.removed[other] {
                    continue;
                }
                let offset = segment.offset();
                if offset >= end {
                    segment.set_offset(offset - width);
                } else if offset > start {
                    segment.set_offset(start);
                }
            }
            trace!(operation = %owner, start, end, "removed piece");
        }
        Ok(())
    }

    fn reinsert_deletion(&mut self, owner: OperationId, text: &mut String) -> Result<()> {
        let point = (0..self.segments.len()).find(|idx| {
            let segment = &self.segments[*idx];
            !self.removed[*idx]
                && segment.owner() == owner
                && segment.kind() == SegmentKind::Deletion
                && !segment.is_closed()
        });
        let Some(point) = point else {
            return Ok(());
        };

        let at = self.segments[point].offset();
        let restored_text = self.segments[point].text().to_string();
        let width = char_len(&restored_text);
        let entries = self.segments[point].closed_segments().to_vec();
        *text = self.splice_local(text, at, at, &restored_text)?;
        self.removed[point] = true;

        let reopened: BTreeSet<usize> = entries.iter().map(|entry| entry.segment.0).collect();
        for (idx, segment) in self.segments.iter_mut().enumerate() {
            if self.removed[idx] || reopened.contains(&idx) {
                continue;
            }
            if segment.offset() >= at {
                segment.set_offset(segment.offset() + width);
            }
        }
        for entry in entries {
            let idx = entry.segment.0;
            if self.removed.get(idx).copied().unwrap_or(true) {
                continue;
            }
            let segment = &mut self.segments[idx];
            segment.set_offset(at + entry.relative_offset);
            segment.set_length(entry.prior_length);
            segment.set_closed(entry.prior_closed);
        }
        trace!(operation = %owner, at, width, "reinserted deleted text");
        Ok(())
    }

    fn splice_local(&self, text: &str, start: usize, end: usize, replacement: &str) -> Result<String> {
        let local_start = start.checked_sub(self.start_offset);
        let local_end = end.checked_sub(self.start_offset);
        local_start
            .zip(local_end)
            .and_then(|(from, to)| splice(text, from, to, replacement))
            .ok_or_else(|| {
                SelectiveUndoError::segment_invariant(format!(
                    "range [{}, {}) falls outside chunk starting at {}",
                    start, end, self.start_offset
                ))
            })
    }
}
