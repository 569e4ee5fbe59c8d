//! Session lifecycle, configuration and sessions sharing one document.

use editor_state::{
    Clipboard, ClipboardEntry, CommentConfig, ConfigPatch, DecorationId, DecorationKind,
    DecorationProperties, Document, EditorError, EditorSession, LanguageConfig, LayerId,
    MarkerId, MemoryClipboard, Point, Range, SelectionId, SequentialIdGenerator, TextChange,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

fn session(text: &str) -> EditorSession {
    EditorSession::builder()
        .text(text)
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap()
}

#[test]
fn test_read_only_rejects_edits() {
    let mut s = session("locked");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let _sub = s.on_did_change_read_only(move |value| log.borrow_mut().push(*value));

    s.set_read_only(true).unwrap();
    s.set_read_only(true).unwrap();
    assert!(s.is_read_only());
    assert_eq!(*seen.borrow(), vec![true]);

    if cfg!(debug_assertions) {
        assert!(matches!(s.insert_text("x"), Err(EditorError::ReadOnly)));
    } else {
        s.insert_text("x").unwrap();
    }
    assert_eq!(s.text(), "locked");

    // Cursor motion is still allowed.
    s.set_cursor_buffer_position(Point::new(0, 3));
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 3)]);

    s.set_read_only(false).unwrap();
    s.insert_text("-").unwrap();
    assert_eq!(s.text(), "loc-ked");
}

#[test]
fn test_config_json_rejects_unknown_keys() {
    let mut s = session("");
    let err = s.update_json(r#"{"tab_length": 2, "softWrap": true}"#).unwrap_err();
    assert!(matches!(err, EditorError::UnknownConfigKey(key) if key == "softWrap"));
    assert_eq!(s.config().tab_length, 4);

    let update = s.update_json(r#"{"tab_length": 2}"#).unwrap();
    assert!(update.relayout);
    assert_eq!(s.config().tab_length, 2);
    assert!(s.update_json(r#"{"tab_length": 2}"#).unwrap().is_empty());
}

#[test]
fn test_invalid_config_leaves_settings_unchanged() {
    let mut s = session("");
    let err = s
        .update(&ConfigPatch {
            tab_length: Some(0),
            soft_tabs: Some(false),
            ..ConfigPatch::default()
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::InvalidConfig(_)));
    assert_eq!(s.config().tab_length, 4);
    assert!(s.config().soft_tabs);
}

#[test]
fn test_sessions_share_one_document() {
    let document = Rc::new(RefCell::new(Document::with_ids(
        "alpha\nbeta",
        Arc::new(SequentialIdGenerator::new()),
    )));
    let mut left = EditorSession::builder()
        .document(document.clone())
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap();
    let mut right = EditorSession::builder()
        .document(document.clone())
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap();
    assert_eq!(document.borrow().retain_count(), 2);

    right.set_cursor_buffer_position(Point::new(1, 4));
    right.fold_buffer_range(Range::new((0, 1), (0, 4)));

    let changes: Rc<RefCell<Vec<TextChange>>> = Rc::default();
    let log = changes.clone();
    let _sub =
        right.on_did_change_text(move |batch| log.borrow_mut().extend(batch.iter().cloned()));

    left.insert_text("> ").unwrap();
    assert_eq!(right.text(), "> alpha\nbeta");
    right.sync();
    assert_eq!(changes.borrow().len(), 1);
    assert_eq!(changes.borrow()[0].new_text, "> ");

    // The other session's fold and cursor track the edit; the editing session has no fold.
    assert_eq!(right.folds(), vec![Range::new((0, 3), (0, 6))]);
    assert_eq!(right.cursor_buffer_positions(), vec![Point::new(1, 4)]);
    assert!(left.folds().is_empty());

    left.destroy();
    assert!(!document.borrow().is_destroyed());
    right.insert_text("!").unwrap();
    assert_eq!(right.text(), "> alpha\nbeta!");

    right.destroy();
    assert!(document.borrow().is_destroyed());
}

#[test]
fn test_destroyed_session_ignores_calls() {
    let mut s = session("text");
    let count = Rc::new(RefCell::new(0));
    let counter = count.clone();
    let _sub = s.on_did_destroy(move |_| *counter.borrow_mut() += 1);
    s.destroy();
    s.destroy();
    drop(s);
    assert_eq!(*count.borrow(), 1);

    let mut s = session("text");
    let mut other = s.copy().unwrap();
    s.destroy();
    assert!(s.is_destroyed());
    s.insert_text("x").unwrap();
    assert!(!s.undo().unwrap());

    s.transact(|s| s.insert_text("y")).unwrap();
    s.transact_grouped(Duration::ZERO, |s| s.insert_text("z")).unwrap();
    assert!(s.create_checkpoint().is_none());
    let checkpoint = other.create_checkpoint().unwrap();
    assert!(!s.group_changes_since_checkpoint(checkpoint));

    assert!(s.fold_buffer_range(Range::new((0, 0), (0, 2))).is_none());
    assert!(s.destroy_folds_intersecting_buffer_range(Range::new((0, 0), (0, 4))).is_empty());
    assert!(s.unfold_buffer_row(0).is_empty());
    assert_eq!(s.unfold_all(), 0);
    assert_eq!(s.add_cursor_at_buffer_position(Point::new(0, 2)), SelectionId(0));

    let properties = DecorationProperties::new(DecorationKind::Highlight, "found");
    let err = s.decorate_marker(LayerId(1), MarkerId(1), properties).unwrap_err();
    assert!(matches!(err, EditorError::SessionDestroyed(id) if id == s.id()));
    assert!(s.destroy_decoration(DecorationId(1)).is_none());

    // The document and the surviving session are untouched.
    assert_eq!(other.text(), "text");
    assert!(!other.undo().unwrap());
    other.insert_text("a").unwrap();
    assert_eq!(other.text(), "atext");
}

#[test]
fn test_edits_on_destroyed_document_fail() {
    let mut s = session("text");
    let document = s.document();
    let mut other = s.copy().unwrap();
    s.destroy();
    other.destroy();
    assert!(document.borrow().is_destroyed());

    let fresh = EditorSession::builder()
        .document(document)
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build();
    assert!(matches!(fresh, Err(EditorError::DocumentDestroyed(_))));
}

#[test]
fn test_pending_session_copy_is_not_pending() {
    let mut s = EditorSession::builder()
        .text("abc")
        .clipboard(Rc::new(MemoryClipboard::new()))
        .pending(true)
        .build()
        .unwrap();
    let copy = s.copy().unwrap();
    assert!(s.is_pending());
    assert!(!copy.is_pending());

    let fired = Rc::new(RefCell::new(0));
    let counter = fired.clone();
    let _sub = s.on_did_terminate_pending_state(move |_| *counter.borrow_mut() += 1);
    s.set_cursor_buffer_position(Point::new(0, 1));
    assert!(s.is_pending());
    s.insert_text("x").unwrap();
    s.insert_text("y").unwrap();
    assert!(!s.is_pending());
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn test_set_text_in_buffer_range_returns_new_range() {
    let mut s = session("hello world");
    let range = s
        .set_text_in_buffer_range(Range::new((0, 6), (0, 11)), "there\nfriend")
        .unwrap();
    assert_eq!(range, Range::new((0, 6), (1, 6)));
    assert_eq!(s.text(), "hello there\nfriend");
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "hello world");
}

#[test]
fn test_mini_session_stays_on_one_line() {
    let clipboard = Rc::new(MemoryClipboard::new());
    let mut s = EditorSession::builder()
        .text("abc")
        .clipboard(clipboard.clone())
        .language(LanguageConfig::new("rust", CommentConfig::line("//")))
        .build()
        .unwrap();
    s.set_mini(true).unwrap();
    s.set_cursor_buffer_position(Point::new(0, 1));

    s.insert_newline().unwrap();
    assert_eq!(s.line_count(), 1);
    s.duplicate_lines().unwrap();
    assert_eq!(s.line_count(), 1);
    s.delete_line().unwrap();
    assert_eq!(s.line_count(), 1);
    s.move_line_up().unwrap();
    s.move_line_down().unwrap();
    assert_eq!(s.line_count(), 1);
    s.join_lines().unwrap();
    s.toggle_line_comments().unwrap();
    assert_eq!(s.line_count(), 1);
    assert_eq!(s.text(), "abc");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 1)]);

    s.insert_text("x\ny").unwrap();
    assert_eq!(s.line_count(), 1);
    assert_eq!(s.text(), "axybc");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 3)]);

    clipboard.write(ClipboardEntry::plain("1\r\n2"));
    s.paste_text().unwrap();
    assert_eq!(s.line_count(), 1);
    assert_eq!(s.text(), "axy12bc");

    s.set_text("one\ntwo").unwrap();
    assert_eq!(s.text(), "onetwo");
    let range = s
        .set_text_in_buffer_range(Range::new((0, 0), (0, 3)), "a\nb")
        .unwrap();
    assert_eq!(range, Range::new((0, 0), (0, 2)));
    assert_eq!(s.text(), "abtwo");

    s.set_mini(false).unwrap();
    s.set_cursor_buffer_position(Point::new(0, 2));
    s.insert_newline().unwrap();
    assert_eq!(s.line_count(), 2);
}

#[test]
fn test_selection_count_sees_edits_from_other_sessions() {
    let mut left = session("abcd");
    let mut right = left.copy().unwrap();
    right.set_cursor_buffer_position(Point::new(0, 1));
    right.add_cursor_at_buffer_position(Point::new(0, 3));
    assert_eq!(right.selection_count(), 2);

    left.set_text_in_buffer_range(Range::new((0, 1), (0, 3)), "").unwrap();
    assert_eq!(right.selection_count(), 1);
    assert_eq!(right.cursor_buffer_positions(), vec![Point::new(0, 1)]);
}
