//! Applying a newer edit onto the segments of an older one
//!
//! Every `(source kind, target kind)` pair has its own entry in [`DISPATCH`].
//! The entries are built from two phases that act on one kind of segment at
//! a time:
//!
//! - the insert phase shifts segments at or after the insertion point and
//!   splits pieces that strictly contain it,
//! - the delete phase shifts segments after the removed range, splits off and
//!   closes the overlapped part of pieces, closes points strictly inside the
//!   range and pins points sitting on its boundaries.

use tracing::trace;

use crate::error::{Result, SelectiveUndoError};
use crate::models::{EditKind, OperationId};
use crate::segment::{ClosedSegment, Segment, SegmentArena, SegmentId, SegmentKind};

/// The effect of a newer record in the coordinates it was applied in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceEdit {
    pub id: OperationId,
    pub kind: EditKind,
    pub offset: usize,
    pub deleted_length: usize,
    pub inserted_length: usize,
}

/// Segments of the older record being updated
pub(crate) struct TargetSegments<'a> {
    pub owner: OperationId,
    pub ids: &'a mut Vec<SegmentId>,
    pub arena: &'a mut SegmentArena,
}

/// What applying a source onto a target produced
#[derive(Debug, Default)]
pub(crate) struct ApplyOutcome {
    /// Target segments swallowed or pinned by the source deletion point
    pub closed: Vec<ClosedSegment>,
    /// Whether undoing either record alone would touch the other's text
    pub conflict: bool,
}

pub(crate) type ApplyFn = fn(&SourceEdit, &mut TargetSegments<'_>, &mut ApplyOutcome) -> Result<()>;

/// Rows are indexed by the source kind, columns by the target kind, both in
/// `EditKind::type_index` order.
pub(crate) const DISPATCH: [[ApplyFn; 3]; 3] = [
    [insert_onto_insert, insert_onto_delete, insert_onto_replace],
    [delete_onto_insert, delete_onto_delete, delete_onto_replace],
    [replace_onto_insert, replace_onto_delete, replace_onto_replace],
];

/// Look up the rule for a source/target pair
pub(crate) fn dispatch(source: EditKind, target: EditKind) -> ApplyFn {
    DISPATCH[source.type_index()][target.type_index()]
}

fn insert_onto_insert(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    _outcome: &mut ApplyOutcome,
) -> Result<()> {
    insert_phase(source, target, SegmentKind::Insertion, &[])
}

fn insert_onto_delete(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    _outcome: &mut ApplyOutcome,
) -> Result<()> {
    insert_phase(source, target, SegmentKind::Deletion, &[])
}

fn insert_onto_replace(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    _outcome: &mut ApplyOutcome,
) -> Result<()> {
    insert_phase(source, target, SegmentKind::Deletion, &[])?;
    insert_phase(source, target, SegmentKind::Insertion, &[])
}

fn delete_onto_insert(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    delete_phase(source, target, SegmentKind::Insertion, outcome)
}

fn delete_onto_delete(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    delete_phase(source, target, SegmentKind::Deletion, outcome)
}

fn delete_onto_replace(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    delete_phase(source, target, SegmentKind::Deletion, outcome)?;
    delete_phase(source, target, SegmentKind::Insertion, outcome)
}

fn replace_onto_insert(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    delete_phase(source, target, SegmentKind::Insertion, outcome)?;
    let pinned = pinned_ids(outcome);
    insert_phase(source, target, SegmentKind::Insertion, &pinned)
}

fn replace_onto_delete(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    delete_phase(source, target, SegmentKind::Deletion, outcome)?;
    let pinned = pinned_ids(outcome);
    insert_phase(source, target, SegmentKind::Deletion, &pinned)
}

fn replace_onto_replace(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    delete_phase(source, target, SegmentKind::Deletion, outcome)?;
    delete_phase(source, target, SegmentKind::Insertion, outcome)?;
    let pinned = pinned_ids(outcome);
    insert_phase(source, target, SegmentKind::Deletion, &pinned)?;
    insert_phase(source, target, SegmentKind::Insertion, &pinned)
}

/// Segments recorded by the delete half of a replace stay with its deletion
/// point instead of moving past the inserted text.
fn pinned_ids(outcome: &ApplyOutcome) -> Vec<SegmentId> {
    outcome.closed.iter().map(|entry| entry.segment).collect()
}

fn segment_mut(arena: &mut SegmentArena, id: SegmentId) -> Result<&mut Segment> {
    arena.get_mut(id).ok_or_else(|| {
        SelectiveUndoError::segment_invariant(format!("segment {} is not in the arena", id.0))
    })
}

fn insert_phase(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    kind: SegmentKind,
    pinned: &[SegmentId],
) -> Result<()> {
    let at = source.offset;
    let added = source.inserted_length;
    if added == 0 {
        return Ok(());
    }

    let original = std::mem::take(target.ids);
    let mut rebuilt = Vec::with_capacity(original.len() + 1);
    for id in original {
        rebuilt.push(id);
        let segment = segment_mut(target.arena, id)?;
        if segment.kind() != kind {
            continue;
        }

        if segment.is_zero_width() {
            if segment.offset() >= at && !pinned.contains(&id) {
                segment.set_offset(segment.offset() + added);
            }
        } else if segment.offset() >= at {
            segment.set_offset(segment.offset() + added);
        } else if at < segment.effective_end_offset() {
            let mut tail = segment.split_off(at - segment.offset());
            tail.set_offset(at + added);
            trace!(
                owner = %target.owner,
                source = %source.id,
                at,
                "split piece around insertion"
            );
            rebuilt.push(target.arena.alloc(tail));
        }
    }
    *target.ids = rebuilt;
    Ok(())
}

fn delete_phase(
    source: &SourceEdit,
    target: &mut TargetSegments<'_>,
    kind: SegmentKind,
    outcome: &mut ApplyOutcome,
) -> Result<()> {
    let start = source.offset;
    let removed = source.deleted_length;
    let end = start + removed;
    if removed == 0 {
        return Ok(());
    }

    let original = std::mem::take(target.ids);
    let mut rebuilt = Vec::with_capacity(original.len() + 2);
    for id in original {
        rebuilt.push(id);
        let segment = segment_mut(target.arena, id)?;
        if segment.kind() != kind {
            continue;
        }

        let offset = segment.offset();
        if segment.is_zero_width() {
            if offset < start {
                continue;
            }
            if offset > end {
                segment.set_offset(offset - removed);
                continue;
            }

            let strictly_inside = offset > start && offset < end;
            outcome.closed.push(ClosedSegment {
                segment: id,
                relative_offset: offset - start,
                prior_length: 0,
                prior_closed: segment.is_closed(),
            });
            segment.set_offset(start);
            if strictly_inside {
                segment.set_closed(true);
                outcome.conflict = true;
            }
            continue;
        }

        let piece_end = segment.effective_end_offset();
        if piece_end <= start {
            continue;
        }
        if offset >= end {
            segment.set_offset(offset - removed);
            continue;
        }

        // The piece overlaps the removed range: keep the head, close the
        // overlapped middle, move the tail to the deletion point.
        let overlap_start = offset.max(start);
        let overlap_end = piece_end.min(end);

        let middle_id = if overlap_start > offset {
            let middle = segment.split_off(overlap_start - offset);
            let middle_id = target.arena.alloc(middle);
            rebuilt.push(middle_id);
            middle_id
        } else {
            id
        };

        let middle = segment_mut(target.arena, middle_id)?;
        let tail = (overlap_end < piece_end).then(|| middle.split_off(overlap_end - overlap_start));
        middle.set_length(0);
        middle.set_closed(true);
        middle.set_offset(start);
        outcome.closed.push(ClosedSegment {
            segment: middle_id,
            relative_offset: overlap_start - start,
            prior_length: overlap_end - overlap_start,
            prior_closed: false,
        });
        outcome.conflict = true;

        if let Some(mut tail) = tail {
            tail.set_offset(start);
            rebuilt.push(target.arena.alloc(tail));
        }
    }
    *target.ids = rebuilt;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(kind: EditKind, offset: usize, deleted: usize, inserted: usize) -> SourceEdit {
        SourceEdit {
            id: OperationId::new(1, 99),
            kind,
            offset,
            deleted_length: deleted,
            inserted_length: inserted,
        }
    }

    fn run(
        source: &SourceEdit,
        target_kind: EditKind,
        arena: &mut SegmentArena,
        ids: &mut Vec<SegmentId>,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let mut target = TargetSegments {
            owner: OperationId::new(1, 1),
            ids,
            arena,
        };
        dispatch(source.kind, target_kind)(source, &mut target, &mut outcome).unwrap();
        outcome
    }

    fn piece(arena: &mut SegmentArena, offset: usize, text: &str) -> Vec<SegmentId> {
        vec![arena.alloc(Segment::insertion(OperationId::new(1, 1), offset, text))]
    }

    fn point(arena: &mut SegmentArena, offset: usize, text: &str) -> Vec<SegmentId> {
        vec![arena.alloc(Segment::deletion(OperationId::new(1, 1), offset, text))]
    }

    fn ranges(arena: &SegmentArena, ids: &[SegmentId]) -> Vec<(usize, usize, String)> {
        ids.iter()
            .map(|id| {
                let s = arena.get(*id).unwrap();
                (s.offset(), s.length(), s.text().to_string())
            })
            .collect()
    }

    #[test]
    fn test_insert_onto_insert_shifts_and_splits() {
        let mut arena = SegmentArena::new();
        let mut ids = piece(&mut arena, 2, "abcd");

        let outcome = run(&source(EditKind::Insert, 4, 0, 3), EditKind::Insert, &mut arena, &mut ids);
        assert!(!outcome.conflict);
        assert!(outcome.closed.is_empty());
        assert_eq!(
            ranges(&arena, &ids),
            vec![(2, 2, "ab".to_string()), (7, 2, "cd".to_string())]
        );

        run(&source(EditKind::Insert, 0, 0, 1), EditKind::Insert, &mut arena, &mut ids);
        assert_eq!(
            ranges(&arena, &ids),
            vec![(3, 2, "ab".to_string()), (8, 2, "cd".to_string())]
        );
    }

    #[test]
    fn test_insert_at_piece_end_leaves_it_alone() {
        let mut arena = SegmentArena::new();
        let mut ids = piece(&mut arena, 0, "foo");
        run(&source(EditKind::Insert, 3, 0, 3), EditKind::Insert, &mut arena, &mut ids);
        assert_eq!(ranges(&arena, &ids), vec![(0, 3, "foo".to_string())]);
    }

    #[test]
    fn test_insert_onto_delete_moves_point_at_insertion() {
        let mut arena = SegmentArena::new();
        let mut ids = point(&mut arena, 5, "xyz");
        run(&source(EditKind::Insert, 5, 0, 2), EditKind::Delete, &mut arena, &mut ids);
        assert_eq!(ranges(&arena, &ids), vec![(7, 0, "xyz".to_string())]);
    }

    #[test]
    fn test_delete_inside_piece_splits_and_conflicts() {
        let mut arena = SegmentArena::new();
        let mut ids = piece(&mut arena, 0, "abcdef");
        let outcome = run(&source(EditKind::Delete, 2, 2, 0), EditKind::Insert, &mut arena, &mut ids);

        assert!(outcome.conflict);
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].relative_offset, 0);
        assert_eq!(outcome.closed[0].prior_length, 2);
        assert_eq!(
            ranges(&arena, &ids),
            vec![
                (0, 2, "ab".to_string()),
                (2, 0, "cd".to_string()),
                (2, 2, "ef".to_string())
            ]
        );
        assert!(arena.get(ids[1]).unwrap().is_closed());
    }

    #[test]
    fn test_delete_covering_piece_closes_it() {
        let mut arena = SegmentArena::new();
        let mut ids = piece(&mut arena, 3, "abc");
        let outcome = run(&source(EditKind::Delete, 1, 6, 0), EditKind::Insert, &mut arena, &mut ids);

        assert!(outcome.conflict);
        assert_eq!(outcome.closed[0].relative_offset, 2);
        let closed = arena.get(ids[0]).unwrap();
        assert!(closed.is_closed());
        assert_eq!(closed.offset(), 1);
        assert_eq!(closed.length(), 0);
        assert_eq!(closed.text(), "abc");
    }

    #[test]
    fn test_delete_before_piece_shifts_without_conflict() {
        let mut arena = SegmentArena::new();
        let mut ids = piece(&mut arena, 5, "abc");
        let outcome = run(&source(EditKind::Delete, 1, 4, 0), EditKind::Insert, &mut arena, &mut ids);
        assert!(!outcome.conflict);
        assert_eq!(ranges(&arena, &ids), vec![(1, 3, "abc".to_string())]);
    }

    #[test]
    fn test_delete_pins_boundary_points_without_conflict() {
        let mut arena = SegmentArena::new();
        let mut ids = point(&mut arena, 6, "old");
        let outcome = run(&source(EditKind::Delete, 2, 4, 0), EditKind::Delete, &mut arena, &mut ids);

        assert!(!outcome.conflict);
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].relative_offset, 4);
        let pinned = arena.get(ids[0]).unwrap();
        assert_eq!(pinned.offset(), 2);
        assert!(!pinned.is_closed());
    }

    #[test]
    fn test_delete_around_point_closes_it() {
        let mut arena = SegmentArena::new();
        let mut ids = point(&mut arena, 4, "old");
        let outcome = run(&source(EditKind::Delete, 2, 4, 0), EditKind::Delete, &mut arena, &mut ids);
        assert!(outcome.conflict);
        assert!(arena.get(ids[0]).unwrap().is_closed());
        assert_eq!(outcome.closed[0].relative_offset, 2);
    }

    #[test]
    fn test_replace_keeps_closed_points_at_deletion() {
        let mut arena = SegmentArena::new();
        let mut ids = point(&mut arena, 2, "old");
        let outcome = run(&source(EditKind::Replace, 2, 3, 4), EditKind::Delete, &mut arena, &mut ids);

        assert!(!outcome.conflict);
        assert_eq!(arena.get(ids[0]).unwrap().offset(), 2);
    }

    #[test]
    fn test_replace_moves_following_pieces_past_inserted_text() {
        let mut arena = SegmentArena::new();
        let mut ids = piece(&mut arena, 5, "tail");
        let outcome = run(&source(EditKind::Replace, 2, 3, 1), EditKind::Insert, &mut arena, &mut ids);

        assert!(!outcome.conflict);
        assert_eq!(ranges(&arena, &ids), vec![(3, 4, "tail".to_string())]);
    }

    #[test]
    fn test_replace_onto_replace_touches_both_segment_kinds() {
        let mut arena = SegmentArena::new();
        let owner = OperationId::new(1, 1);
        let mut ids = vec![
            arena.alloc(Segment::deletion(owner, 0, "was")),
            arena.alloc(Segment::insertion(owner, 0, "now")),
        ];
        let outcome = run(&source(EditKind::Replace, 1, 1, 2), EditKind::Replace, &mut arena, &mut ids);

        assert!(outcome.conflict);
        assert_eq!(
            ranges(&arena, &ids),
            vec![
                (0, 0, "was".to_string()),
                (0, 1, "n".to_string()),
                (1, 0, "o".to_string()),
                (3, 1, "w".to_string())
            ]
        );
    }

    #[test]
    fn test_dispatch_table_covers_every_pair() {
        let kinds = [EditKind::Insert, EditKind::Delete, EditKind::Replace];
        for source_kind in kinds {
            for target_kind in kinds {
                let mut arena = SegmentArena::new();
                let mut ids = piece(&mut arena, 10, "zz");
                run(&source(source_kind, 0, 1, 1), target_kind, &mut arena, &mut ids);
            }
        }
    }
}
