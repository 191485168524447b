//! Selective undo: undoing an arbitrary subset of recorded edits
//!
//! The engine reads file histories owned by a [`HistoryManager`], groups the
//! selected operations into chunks and computes, per chunk, the text that
//! replaces the chunk's span once those operations are undone. Chunks whose
//! operations conflict with unselected ones come back as a list of
//! alternatives for a [`ConflictResolver`] to pick from. Live history is
//! never modified; every computation runs on a [`ChunkCopy`](crate::ChunkCopy).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::change::EditRecord;
use crate::chunk::{
    conflicting_outside_chunk, determine_chunks, record_segments, Chunk, ChunkSummary,
};
use crate::config::UndoConfig;
use crate::document::{Document, DocumentProvider, TextReplacement};
use crate::error::{Result, SelectiveUndoError};
use crate::history::{FileHistory, HistoryManager};
use crate::models::{FileKey, OperationId};
use crate::text::{line_of_offset, slice};

const UNDO_SELECTED: &str = "Undo only the selected operations";
const UNDO_WITH_CONFLICTING: &str = "Also undo the conflicting operations";
const KEEP_CURRENT: &str = "Keep the current code";

/// Which operations of a file to undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoSelection {
    /// Explicit operations
    Ids(Vec<OperationId>),
    /// Operations with a segment touching `[start, end)`
    Region {
        /// First char of the region
        start: usize,
        /// One past the last char of the region
        end: usize,
    },
    /// Every operation recorded after the given one
    After(OperationId),
    /// The most recent operation touching `[start, end)`
    LatestInRegion {
        /// First char of the region
        start: usize,
        /// One past the last char of the region
        end: usize,
    },
}

/// One way of resolving a conflicted chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoAlternative {
    /// Human readable description
    pub description: String,
    /// The change to the document this alternative makes
    pub replacement: TextReplacement,
    /// Operations this alternative undoes
    pub undone: Vec<OperationId>,
}

/// A chunk that cannot be undone without a human choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictedChunk {
    /// The chunk
    pub chunk: ChunkSummary,
    /// Location label, e.g. "Main.java: lines 3-5"
    pub label: String,
    /// Current text of the chunk with surrounding context lines
    pub context: String,
    /// Candidate results, never empty
    pub alternatives: Vec<UndoAlternative>,
    /// Operations outside the chunk that conflict with it
    pub conflicting: Vec<OperationId>,
}

/// Outcome of previewing a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoPreview {
    /// The chunk undoes to a single text
    Resolved {
        /// The chunk
        chunk: ChunkSummary,
        /// Replacement of the chunk span
        replacement: TextReplacement,
    },
    /// The chunk conflicts with operations outside it
    Conflicted(ConflictedChunk),
}

impl UndoPreview {
    /// The previewed chunk
    pub fn chunk(&self) -> &ChunkSummary {
        match self {
            UndoPreview::Resolved { chunk, .. } => chunk,
            UndoPreview::Conflicted(conflict) => &conflict.chunk,
        }
    }

    /// Whether a choice among alternatives is needed
    pub fn is_conflicted(&self) -> bool {
        matches!(self, UndoPreview::Conflicted(_))
    }
}

/// Previews of every chunk of a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPlan {
    /// File the plan is for
    pub file_key: FileKey,
    /// One preview per chunk, ordered by location
    pub previews: Vec<UndoPreview>,
    /// Selected ids absent from the file's history
    pub not_found: Vec<OperationId>,
}

/// Picks an alternative for a conflicted chunk
pub trait ConflictResolver {
    /// Index into `conflict.alternatives`, or `None` to leave the chunk alone
    fn choose(&self, conflict: &ConflictedChunk) -> Option<usize>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&ConflictedChunk) -> Option<usize>,
{
    fn choose(&self, conflict: &ConflictedChunk) -> Option<usize> {
        self(conflict)
    }
}

/// Resolver that leaves every conflicted chunk untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipConflicts;

impl ConflictResolver for SkipConflicts {
    fn choose(&self, _conflict: &ConflictedChunk) -> Option<usize> {
        None
    }
}

/// What a selective undo did to one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReport {
    /// File the report is for
    pub file_key: FileKey,
    /// Replacements in the order they were applied; each is expressed in the
    /// document as left by the previous one
    pub applied: Vec<TextReplacement>,
    /// Chunks left untouched
    pub skipped: Vec<ChunkSummary>,
    /// Selected ids absent from the file's history
    pub not_found: Vec<OperationId>,
}

impl UndoReport {
    fn empty(file_key: FileKey, not_found: Vec<OperationId>) -> Self {
        UndoReport {
            file_key,
            applied: Vec::new(),
            skipped: Vec::new(),
            not_found,
        }
    }

    /// Whether the document was left unchanged
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Per-file outcome of an undo spanning several files
#[derive(Debug)]
pub struct MultiFileUndoReport {
    /// Result of each file, independent of the others
    pub files: BTreeMap<FileKey, Result<UndoReport>>,
    /// Ids not recorded in any file
    pub not_found: Vec<OperationId>,
}

/// Computes and applies selective undo over the histories of a [`HistoryManager`]
pub struct SelectiveUndoEngine<'a> {
    manager: &'a HistoryManager,
    config: UndoConfig,
}

impl<'a> SelectiveUndoEngine<'a> {
    /// Create an engine using the manager's config
    pub fn new(manager: &'a HistoryManager) -> Self {
        Self::with_config(manager, manager.config().clone())
    }

    /// Create an engine with an explicit config
    pub fn with_config(manager: &'a HistoryManager, config: UndoConfig) -> Self {
        SelectiveUndoEngine { manager, config }
    }

    /// The config in effect
    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    /// Selected operations present in the history, and the ids that are not
    pub fn resolve_selection(
        &self,
        file_key: &FileKey,
        selection: &UndoSelection,
    ) -> Result<(Vec<OperationId>, Vec<OperationId>)> {
        self.manager
            .with_history(file_key, |history| resolve(history, selection))
    }

    /// Chunks of the selected operations, ordered by location
    pub fn chunks(&self, file_key: &FileKey, selection: &UndoSelection) -> Result<Vec<Chunk>> {
        self.manager.with_history(file_key, |history| {
            let (ids, _) = resolve(history, selection);
            determine_chunks(history, &ids)
        })?
    }

    /// Summaries of the chunks of the selected operations
    pub fn list_chunks(
        &self,
        file_key: &FileKey,
        selection: &UndoSelection,
    ) -> Result<Vec<ChunkSummary>> {
        self.manager.with_history(file_key, |history| {
            let (ids, _) = resolve(history, selection);
            let chunks = determine_chunks(history, &ids)?;
            Ok(chunks.iter().map(|chunk| chunk.summary(history)).collect())
        })?
    }

    /// Preview undoing `chunk` against the current document text
    pub fn preview_chunk(&self, chunk: &Chunk, doc_text: &str) -> Result<UndoPreview> {
        self.manager
            .with_history(chunk.file_key(), |history| self.preview_in(history, chunk, doc_text))?
    }

    /// Preview every chunk of a selection
    pub fn plan(
        &self,
        file_key: &FileKey,
        selection: &UndoSelection,
        doc_text: &str,
    ) -> Result<UndoPlan> {
        self.manager.with_history(file_key, |history| {
            let (ids, not_found) = resolve(history, selection);
            for id in &not_found {
                warn!("Operation {} not found in {}", id, file_key);
            }
            let chunks = determine_chunks(history, &ids)?;
            let previews = chunks
                .iter()
                .map(|chunk| self.preview_in(history, chunk, doc_text))
                .collect::<Result<Vec<_>>>()?;
            debug!(
                file = %file_key,
                selected = ids.len(),
                chunks = previews.len(),
                conflicted = previews.iter().filter(|p| p.is_conflicted()).count(),
                "Planned selective undo"
            );
            Ok(UndoPlan {
                file_key: file_key.clone(),
                previews,
                not_found,
            })
        })?
    }

    /// Undo the selected operations of `file_key` in `document`.
    ///
    /// Conflict-free chunks are applied directly; conflicted ones go through
    /// `resolver`. A chosen replacement overlapping one already chosen is
    /// skipped. Unknown ids are reported, not fatal.
    pub fn do_selective_undo(
        &self,
        file_key: &FileKey,
        selection: &UndoSelection,
        document: &mut dyn Document,
        resolver: &dyn ConflictResolver,
    ) -> Result<UndoReport> {
        let text = document.text()?;
        let plan = self.plan(file_key, selection, &text)?;
        let mut report = UndoReport::empty(file_key.clone(), plan.not_found);

        let mut chosen: Vec<TextReplacement> = Vec::new();
        for preview in plan.previews {
            let (summary, replacement) = match preview {
                UndoPreview::Resolved { chunk, replacement } => (chunk, replacement),
                UndoPreview::Conflicted(conflict) => {
                    let picked = resolver
                        .choose(&conflict)
                        .and_then(|idx| conflict.alternatives.get(idx))
                        .map(|alternative| alternative.replacement.clone());
                    match picked {
                        Some(replacement) => (conflict.chunk, replacement),
                        None => {
                            warn!("Skipping conflicted chunk {}", conflict.label);
                            report.skipped.push(conflict.chunk);
                            continue;
                        }
                    }
                }
            };

            if replacement.is_noop() {
                continue;
            }
            if chosen.iter().any(|other| other.overlaps(&replacement)) {
                warn!(
                    "Skipping chunk [{}, {}) overlapping an earlier choice",
                    summary.start_offset, summary.end_offset
                );
                report.skipped.push(summary);
                continue;
            }
            chosen.push(replacement);
        }

        chosen.sort_by(|a, b| b.start.cmp(&a.start));
        for replacement in &chosen {
            replacement.apply(document)?;
        }
        info!(
            "Selective undo in {}: {} applied, {} skipped",
            file_key,
            chosen.len(),
            report.skipped.len()
        );
        report.applied = chosen;
        Ok(report)
    }

    /// Undo `ids` across every file they were recorded in.
    ///
    /// Files are handled independently: one failing leaves the others applied.
    pub fn do_selective_undo_on_multiple_files(
        &self,
        ids: &[OperationId],
        documents: &mut dyn DocumentProvider,
        resolver: &dyn ConflictResolver,
    ) -> MultiFileUndoReport {
        let (grouped, not_found) = self.manager.group_by_file(ids);
        let mut files = BTreeMap::new();
        for (file_key, file_ids) in grouped {
            let selection = UndoSelection::Ids(file_ids);
            let result = documents.document(&file_key).and_then(|document| {
                self.do_selective_undo(&file_key, &selection, document, resolver)
            });
            if let Err(e) = &result {
                warn!("Selective undo failed in {}: {}", file_key, e);
            }
            files.insert(file_key, result);
        }
        MultiFileUndoReport { files, not_found }
    }

    fn preview_in(&self, history: &FileHistory, chunk: &Chunk, doc_text: &str) -> Result<UndoPreview> {
        let summary = chunk.summary(history);
        let current = span_text(doc_text, chunk.start_offset(), chunk.end_offset())?;
        let selected = TextReplacement {
            start: chunk.start_offset(),
            end: chunk.end_offset(),
            old_text: current.to_string(),
            new_text: chunk.copy_chunk().undo(current)?,
        };
        if !summary.has_conflict_outside_chunk {
            return Ok(UndoPreview::Resolved {
                chunk: summary,
                replacement: selected,
            });
        }

        let mut alternatives = Vec::new();
        push_unique(
            &mut alternatives,
            UndoAlternative {
                description: UNDO_SELECTED.to_string(),
                replacement: selected,
                undone: chunk.involved_changes().to_vec(),
            },
        );

        let expanded = self.expand_conflicts(history, chunk.involved_changes());
        push_unique(
            &mut alternatives,
            UndoAlternative {
                description: UNDO_WITH_CONFLICTING.to_string(),
                replacement: undo_spanning(history, &expanded, doc_text)?,
                undone: expanded,
            },
        );

        if self.config.include_keep_current_alternative {
            push_unique(
                &mut alternatives,
                UndoAlternative {
                    description: KEEP_CURRENT.to_string(),
                    replacement: TextReplacement {
                        start: chunk.start_offset(),
                        end: chunk.end_offset(),
                        old_text: current.to_string(),
                        new_text: current.to_string(),
                    },
                    undone: Vec::new(),
                },
            );
        }

        Ok(UndoPreview::Conflicted(ConflictedChunk {
            label: chunk.label(doc_text),
            context: context_lines(
                doc_text,
                chunk.start_offset(),
                chunk.end_offset(),
                self.config.context_lines,
            ),
            conflicting: conflicting_outside_chunk(chunk, history),
            chunk: summary,
            alternatives,
        }))
    }

    /// `seed` plus the operations conflicting with it, following conflicts of
    /// conflicts when configured to, at most `max_conflict_expansion` added
    fn expand_conflicts(&self, history: &FileHistory, seed: &[OperationId]) -> Vec<OperationId> {
        let graph = history.conflict_graph();
        let mut expanded: BTreeSet<OperationId> = seed.iter().copied().collect();
        let mut frontier: Vec<OperationId> = seed.to_vec();
        let mut added = 0usize;

        'expand: while let Some(id) = frontier.pop() {
            for neighbor in graph.neighbors(id) {
                if added >= self.config.max_conflict_expansion {
                    debug!("Conflict expansion capped at {} operations", added);
                    break 'expand;
                }
                if expanded.insert(neighbor) {
                    added += 1;
                    if self.config.expand_conflicts_transitively {
                        frontier.push(neighbor);
                    }
                }
            }
        }
        expanded.into_iter().collect()
    }
}

fn resolve(history: &FileHistory, selection: &UndoSelection) -> (Vec<OperationId>, Vec<OperationId>) {
    let ids = |records: Vec<&EditRecord>| -> Vec<OperationId> {
        records.iter().map(|record| record.id()).collect()
    };
    match selection {
        UndoSelection::Ids(wanted) => {
            let wanted: BTreeSet<OperationId> = wanted.iter().copied().collect();
            let (found, missing): (Vec<OperationId>, Vec<OperationId>) =
                wanted.into_iter().partition(|id| history.contains(*id));
            (found, missing)
        }
        UndoSelection::Region { start, end } => (ids(history.filter_by_region(*start, *end)), Vec::new()),
        UndoSelection::After(id) => (ids(history.filter_after(*id)), Vec::new()),
        UndoSelection::LatestInRegion { start, end } => (
            history
                .latest_in_region(*start, *end)
                .map(|record| vec![record.id()])
                .unwrap_or_default(),
            Vec::new(),
        ),
    }
}

/// Undo `ids` over the span covering all of their segments
fn undo_spanning(
    history: &FileHistory,
    ids: &[OperationId],
    doc_text: &str,
) -> Result<TextReplacement> {
    let chunk = Chunk::spanning(history.key().clone(), record_segments(history, ids)?)?;
    let current = span_text(doc_text, chunk.start_offset(), chunk.end_offset())?;
    Ok(TextReplacement {
        start: chunk.start_offset(),
        end: chunk.end_offset(),
        old_text: current.to_string(),
        new_text: chunk.copy_chunk().undo(current)?,
    })
}

fn span_text(doc_text: &str, start: usize, end: usize) -> Result<&str> {
    slice(doc_text, start, end).ok_or_else(|| {
        SelectiveUndoError::segment_invariant(format!(
            "chunk [{}, {}) lies outside the document",
            start, end
        ))
    })
}

fn push_unique(alternatives: &mut Vec<UndoAlternative>, candidate: UndoAlternative) {
    let duplicate = alternatives.iter().any(|existing| {
        existing.replacement.start == candidate.replacement.start
            && existing.replacement.end == candidate.replacement.end
            && existing.replacement.new_text == candidate.replacement.new_text
    });
    if !duplicate {
        alternatives.push(candidate);
    }
}

/// Lines touching `[start, end)` plus `context` lines on each side
fn context_lines(doc_text: &str, start: usize, end: usize, context: usize) -> String {
    let lines: Vec<&str> = doc_text.split('\n').collect();
    let first = line_of_offset(doc_text, start);
    let last = line_of_offset(doc_text, end);
    let from = first.saturating_sub(context);
    let to = (last + context).min(lines.len().saturating_sub(1));
    lines[from..=to].join("\n")
}
