//! End-to-end workflows for selective undo across an editing session

use std::sync::Arc;
use std::thread;

use ricecoder_selective_undo::{
    ConflictedChunk, Document, EditEvent, FileKey, HistoryManager, HistorySnapshot, InMemoryDocuments,
    OperationId, SelectiveUndoEngine, SkipConflicts, StringDocument, UndoPreview, UndoSelection,
};

/// Simulated editor buffer that records every change it makes
struct Editor {
    key: FileKey,
    doc: StringDocument,
    session: i64,
    next: i64,
}

impl Editor {
    fn new(key: FileKey, session: i64) -> Self {
        Editor {
            key,
            doc: StringDocument::new(""),
            session,
            next: 1,
        }
    }

    fn next_id(&mut self) -> OperationId {
        let id = OperationId::new(self.session, self.next);
        self.next += 1;
        id
    }

    fn type_text(&mut self, manager: &HistoryManager, at: usize, text: &str) -> OperationId {
        let id = self.next_id();
        self.doc.replace(at, at, text).unwrap();
        manager.record_edit(&self.key, EditEvent::insert(id, at, text)).unwrap();
        id
    }

    fn erase(&mut self, manager: &HistoryManager, at: usize, len: usize) -> OperationId {
        let id = self.next_id();
        let removed: String = self.doc.as_str().chars().skip(at).take(len).collect();
        self.doc.replace(at, at + len, "").unwrap();
        manager.record_edit(&self.key, EditEvent::delete(id, at, removed)).unwrap();
        id
    }
}

#[test]
fn test_undo_inserted_line_keeps_surrounding_code() {
    let manager = HistoryManager::new();
    let key = manager.active_file_changed("demo", "/src/lib.rs");
    let mut editor = Editor::new(key.clone(), 1);

    let signature = editor.type_text(&manager, 0, "fn add(a: i32, b: i32) -> i32 {\n");
    let body = editor.type_text(&manager, 32, "    a + b\n}\n");
    let debug_line = editor.type_text(&manager, 32, "    println!(\"adding\");\n");
    assert_eq!(
        editor.doc.as_str(),
        "fn add(a: i32, b: i32) -> i32 {\n    println!(\"adding\");\n    a + b\n}\n"
    );

    let engine = SelectiveUndoEngine::new(&manager);
    let report = engine
        .do_selective_undo(
            &key,
            &UndoSelection::Ids(vec![debug_line]),
            &mut editor.doc,
            &SkipConflicts,
        )
        .unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(
        editor.doc.as_str(),
        "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n"
    );

    assert!(manager.get_conflicts(signature).unwrap().is_empty());
    assert!(manager.get_conflicts(body).unwrap().is_empty());
}

#[test]
fn test_stepwise_undo_in_region_then_redo() {
    let manager = HistoryManager::new();
    let key = FileKey::new("demo", "/src/lib.rs");
    let mut editor = Editor::new(key.clone(), 1);

    editor.type_text(&manager, 0, "let total = 0;\n");
    editor.type_text(&manager, 15, "let count = 0;\n");
    editor.type_text(&manager, 14, " // sum");
    assert_eq!(editor.doc.as_str(), "let total = 0; // sum\nlet count = 0;\n");

    let engine = SelectiveUndoEngine::new(&manager);
    let region = UndoSelection::LatestInRegion { start: 0, end: 15 };
    let selected_only = |_: &ConflictedChunk| Some(0);

    // Each committed undo is recorded, so the next step in the region undoes
    // the undo itself.
    for expected in [
        "let total = 0;\nlet count = 0;\n",
        "let total = 0; // sum\nlet count = 0;\n",
    ] {
        let report = engine
            .do_selective_undo(&key, &region, &mut editor.doc, &selected_only)
            .unwrap();
        assert_eq!(editor.doc.as_str(), expected);
        for replacement in &report.applied {
            let id = editor.next_id();
            manager.record_replacement(&key, id, replacement).unwrap();
        }
    }
    assert_eq!(manager.query(&key).unwrap().len(), 5);
}

#[test]
fn test_deleted_code_comes_back() {
    let manager = HistoryManager::new();
    let key = FileKey::new("demo", "/src/main.rs");
    let mut editor = Editor::new(key.clone(), 1);

    editor.type_text(&manager, 0, "fn main() {\n    run();\n}\n");
    let erase = editor.erase(&manager, 12, 11);
    assert_eq!(editor.doc.as_str(), "fn main() {\n}\n");

    let engine = SelectiveUndoEngine::new(&manager);
    let plan = engine
        .plan(&key, &UndoSelection::Ids(vec![erase]), editor.doc.as_str())
        .unwrap();
    let UndoPreview::Conflicted(conflict) = &plan.previews[0] else {
        panic!("expected a conflict");
    };
    assert_eq!(conflict.label, "main.rs: line 2");
    let rendered = serde_json::to_string(&plan.previews[0]).unwrap();
    assert!(rendered.contains("Undo only the selected operations"));

    let selected_only = |_: &ConflictedChunk| Some(0);
    engine
        .do_selective_undo(&key, &UndoSelection::Ids(vec![erase]), &mut editor.doc, &selected_only)
        .unwrap();
    assert_eq!(editor.doc.as_str(), "fn main() {\n    run();\n}\n");
}

#[test]
fn test_concurrent_sessions_on_separate_files() {
    let manager = Arc::new(HistoryManager::new());
    let handles: Vec<_> = (1..=4)
        .map(|session| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let key = FileKey::new("demo", format!("/src/file{}.rs", session));
                let mut editor = Editor::new(key, session);
                for _ in 0..10 {
                    let end = editor.doc.as_str().len();
                    editor.type_text(&manager, end, "x");
                }
                editor
            })
        })
        .collect();

    let mut documents = InMemoryDocuments::new();
    let mut all_ids = Vec::new();
    for handle in handles {
        let editor = handle.join().unwrap();
        for index in 1..editor.next {
            all_ids.push(OperationId::new(editor.session, index));
        }
        documents.open(editor.key.clone(), editor.doc.as_str());
    }
    assert_eq!(manager.files().len(), 4);

    let engine = SelectiveUndoEngine::new(&manager);
    let report = engine.do_selective_undo_on_multiple_files(&all_ids, &mut documents, &SkipConflicts);
    assert_eq!(report.files.len(), 4);
    for key in manager.files() {
        assert_eq!(documents.content(&key), Some(""));
    }
}

#[test]
fn test_snapshot_moves_history_between_sessions() {
    let key = FileKey::new("demo", "/src/lib.rs");
    let json = {
        let manager = HistoryManager::new();
        let mut editor = Editor::new(key.clone(), 1);
        editor.type_text(&manager, 0, "alpha beta");
        editor.erase(&manager, 5, 5);
        HistorySnapshot::capture(&manager, &key)
            .unwrap()
            .to_json()
            .unwrap()
    };

    let manager = HistoryManager::new();
    HistorySnapshot::from_json(&json)
        .unwrap()
        .restore(&manager)
        .unwrap();
    let records = manager.query(&key).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].marker_message(), "Deleted \" beta\"");
}
