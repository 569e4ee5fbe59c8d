//! Transactions, undo grouping and checkpoints, driven through sessions.

use editor_state::{
    EditorError, EditorSession, ManualClock, MemoryClipboard, Motion, Point, Range,
};
use std::rc::Rc;
use std::time::Duration;

fn session_with_clock(text: &str) -> (EditorSession, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new());
    let session = EditorSession::builder()
        .text(text)
        .clock(clock.clone())
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap();
    (session, clock)
}

#[test]
fn test_rapid_typing_groups_into_one_entry() {
    let (mut s, clock) = session_with_clock("");
    for ch in ["a", "b", "c"] {
        s.insert_text(ch).unwrap();
        clock.advance(Duration::from_millis(50));
    }
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::ZERO]);
    assert!(!s.undo().unwrap());
}

#[test]
fn test_pause_starts_a_new_entry() {
    let (mut s, clock) = session_with_clock("");
    s.insert_text("a").unwrap();
    clock.advance(Duration::from_millis(50));
    s.insert_text("b").unwrap();
    clock.advance(Duration::from_secs(2));
    s.insert_text("c").unwrap();
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "ab");
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "");
}

#[test]
fn test_cursor_motion_breaks_grouping() {
    let (mut s, clock) = session_with_clock("xy");
    s.insert_text("a").unwrap();
    clock.advance(Duration::from_millis(10));
    s.move_cursors(Motion::Right, 1);
    s.insert_text("b").unwrap();
    assert_eq!(s.text(), "axby");
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "axy");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 2)]);
}

#[test]
fn test_zero_interval_disables_grouping() {
    let (mut s, _clock) = session_with_clock("");
    s.update_json(r#"{"undo_grouping_interval_ms": 0}"#).unwrap();
    s.insert_text("a").unwrap();
    s.insert_text("b").unwrap();
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "a");
}

#[test]
fn test_redo_restores_text_and_selection() {
    let (mut s, _clock) = session_with_clock("hello");
    s.set_selected_buffer_range(Range::new((0, 0), (0, 5)), false);
    s.insert_text("bye").unwrap();
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "hello");
    assert_eq!(s.selected_buffer_ranges(), vec![Range::new((0, 0), (0, 5))]);
    assert!(s.redo().unwrap());
    assert_eq!(s.text(), "bye");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 3)]);
    assert!(!s.redo().unwrap());
}

#[test]
fn test_failed_transaction_leaves_no_trace() {
    let (mut s, _clock) = session_with_clock("keep");
    s.set_cursor_buffer_position(Point::new(0, 4));
    let result: Result<(), EditorError> = s.transact(|s| {
        s.insert_text(" one").unwrap();
        s.insert_newline().unwrap();
        s.insert_text("two").unwrap();
        Err(EditorError::Aborted("stop".into()))
    });
    assert!(matches!(result, Err(EditorError::Aborted(_))));
    assert_eq!(s.text(), "keep");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 4)]);
    assert!(!s.undo().unwrap());
}

#[test]
fn test_nested_transactions_undo_together() {
    let (mut s, clock) = session_with_clock("");
    s.transact(|s| {
        s.insert_text("a")?;
        s.transact(|s| s.insert_text("b"))?;
        s.insert_text("c")
    })
    .unwrap();
    clock.advance(Duration::from_secs(5));
    s.insert_text("d").unwrap();
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "abc");
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "");
}

#[test]
fn test_undo_inside_transaction_is_rejected() {
    let (mut s, _clock) = session_with_clock("");
    let err = s
        .transact(|s| {
            s.insert_text("a")?;
            s.undo()
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::TransactionOpen));
    assert_eq!(s.text(), "");
}

#[test]
fn test_checkpoints() {
    let (mut s, clock) = session_with_clock("");
    let checkpoint = s.create_checkpoint().unwrap();
    for ch in ["a", "b", "c"] {
        s.insert_text(ch).unwrap();
        clock.advance(Duration::from_secs(1));
    }
    assert!(s.group_changes_since_checkpoint(checkpoint));
    assert!(s.undo().unwrap());
    assert_eq!(s.text(), "");
    assert!(s.redo().unwrap());

    let checkpoint = s.create_checkpoint().unwrap();
    s.insert_text("d").unwrap();
    assert!(s.revert_to_checkpoint(checkpoint).unwrap());
    assert_eq!(s.text(), "abc");
}

#[test]
fn test_undo_is_shared_between_sessions_of_a_document() {
    let (mut a, _clock) = session_with_clock("");
    let mut b = a.copy().unwrap();
    a.insert_text("shared").unwrap();
    assert_eq!(b.text(), "shared");
    assert!(b.undo().unwrap());
    assert_eq!(a.text(), "");
}
