//! Multi-cursor editing, merging and the row-oriented line operations.

use editor_state::{
    ClipboardEntry, CommentConfig, EditorSession, LanguageConfig, MemoryClipboard,
    MergeCandidate, Motion, Point, Range, SelectionId, merge_ranges,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

fn session(text: &str) -> EditorSession {
    EditorSession::builder()
        .text(text)
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap()
}

fn cursors(session: &mut EditorSession, points: &[(usize, usize)]) {
    let ranges: Vec<(Range, bool)> = points
        .iter()
        .map(|&(row, column)| (Range::empty(Point::new(row, column)), false))
        .collect();
    session.set_selected_buffer_ranges(&ranges);
}

#[test]
fn test_multi_cursor_insert_at_row_starts() {
    let mut s = session("ab\ncd");
    cursors(&mut s, &[(0, 0), (1, 0)]);
    s.insert_text("X").unwrap();
    assert_eq!(s.text(), "Xab\nXcd");
    assert_eq!(
        s.selected_buffer_ranges(),
        vec![
            Range::empty(Point::new(0, 1)),
            Range::empty(Point::new(1, 1))
        ]
    );
}

#[test]
fn test_multi_cursor_insert_mid_row() {
    let mut s = session("ab\ncd");
    cursors(&mut s, &[(0, 1), (1, 1)]);
    s.insert_text("x").unwrap();
    assert_eq!(s.text(), "axb\ncxd");
    assert_eq!(s.selection_count(), 2);
}

#[test]
fn test_cursors_on_the_same_row_shift_together() {
    let mut s = session("abc");
    cursors(&mut s, &[(0, 0), (0, 1), (0, 2)]);
    s.insert_text("-").unwrap();
    assert_eq!(s.text(), "-a-b-c");
    assert_eq!(
        s.cursor_buffer_positions(),
        vec![Point::new(0, 1), Point::new(0, 3), Point::new(0, 5)]
    );
}

#[test]
fn test_backspace_at_document_start_is_noop() {
    let mut s = session("abc");
    s.backspace().unwrap();
    assert_eq!(s.text(), "abc");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::ZERO]);
}

#[test]
fn test_backspaces_that_collide_merge() {
    let mut s = session("ab");
    cursors(&mut s, &[(0, 1), (0, 2)]);
    s.backspace().unwrap();
    s.backspace().unwrap();
    assert_eq!(s.text(), "");
    assert_eq!(s.selection_count(), 1);
}

#[test]
fn test_merge_keeps_oldest_reversed_flag() {
    let mut s = session("0123456789");
    s.set_selected_buffer_range(Range::new((0, 2), (0, 6)), true);
    let newer = s.add_selection_for_buffer_range(Range::new((0, 4), (0, 8)), false);
    let selections = s.selections();
    assert_eq!(selections.len(), 1);
    assert_ne!(selections[0].id, newer);
    assert_eq!(selections[0].range, Range::new((0, 2), (0, 8)));
    assert!(selections[0].reversed);
}

#[test]
fn test_touching_selections_stay_separate() {
    let mut s = session("0123456789");
    s.set_selected_buffer_range(Range::new((0, 0), (0, 3)), false);
    s.add_selection_for_buffer_range(Range::new((0, 3), (0, 6)), false);
    assert_eq!(s.selection_count(), 2);
}

#[test]
fn test_cursor_at_selection_edge_merges() {
    let mut s = session("0123456789");
    s.set_selected_buffer_range(Range::new((0, 0), (0, 5)), false);
    s.add_cursor_at_buffer_position(Point::new(0, 5));
    assert_eq!(s.selected_buffer_ranges(), vec![Range::new((0, 0), (0, 5))]);

    s.add_cursor_at_buffer_position(Point::new(0, 0));
    assert_eq!(s.selection_count(), 1);

    s.add_cursor_at_buffer_position(Point::new(0, 6));
    assert_eq!(s.selection_count(), 2);
}

#[test]
fn test_random_merges_are_disjoint_and_idempotent() {
    let mut rng = StdRng::seed_from_u64(42);
    for round in 0..200 {
        let candidates: Vec<MergeCandidate> = (0..rng.gen_range(1..12))
            .map(|i| {
                let a = (rng.gen_range(0..3), rng.gen_range(0..6));
                let b = (rng.gen_range(0..3), rng.gen_range(0..6));
                MergeCandidate {
                    id: SelectionId(i),
                    seq: i,
                    range: Range::new(a, b),
                }
            })
            .collect();
        let groups = merge_ranges(candidates.clone(), true);
        for pair in groups.windows(2) {
            assert!(
                pair[0].range.end <= pair[1].range.start && pair[0].range != pair[1].range,
                "round {round}: {pair:?}"
            );
        }
        let total: usize = groups.iter().map(|g| 1 + g.absorbed.len()).sum();
        assert_eq!(total, candidates.len());

        let again: Vec<MergeCandidate> = groups
            .iter()
            .map(|g| MergeCandidate {
                id: g.survivor,
                seq: g.survivor.0,
                range: g.range,
            })
            .collect();
        let regrouped = merge_ranges(again, true);
        assert!(regrouped.iter().all(|g| g.absorbed.is_empty()));
        assert_eq!(
            regrouped.iter().map(|g| g.range).collect::<Vec<_>>(),
            groups.iter().map(|g| g.range).collect::<Vec<_>>()
        );
    }
}

#[test]
fn test_move_line_down_carries_fold() {
    let mut s = session("r0\nr1\nr2\nr3\nr4\nr5");
    s.fold_buffer_range(Range::new((2, 2), (4, 2)));
    s.set_cursor_buffer_position(Point::new(1, 0));
    s.move_line_down().unwrap();
    assert_eq!(s.text(), "r0\nr2\nr3\nr4\nr1\nr5");
    assert_eq!(s.folds(), vec![Range::new((1, 2), (3, 2))]);
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(4, 0)]);
    assert_eq!(s.screen_line_count(), 4);
}

#[test]
fn test_move_line_up_over_fold() {
    let mut s = session("r0\nr1\nr2\nr3\nr4");
    s.fold_buffer_range(Range::new((1, 2), (3, 2)));
    s.set_cursor_buffer_position(Point::new(4, 1));
    s.move_line_up().unwrap();
    assert_eq!(s.text(), "r0\nr4\nr1\nr2\nr3");
    assert_eq!(s.folds(), vec![Range::new((2, 2), (4, 2))]);
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(1, 1)]);
}

#[test]
fn test_move_line_at_edges_is_noop() {
    let mut s = session("a\nb");
    s.move_line_up().unwrap();
    assert_eq!(s.text(), "a\nb");
    s.set_cursor_buffer_position(Point::new(1, 0));
    s.move_line_down().unwrap();
    assert_eq!(s.text(), "a\nb");
}

#[test]
fn test_delete_line_and_duplicate() {
    let mut s = session("one\ntwo\nthree");
    s.set_cursor_buffer_position(Point::new(1, 2));
    s.duplicate_lines().unwrap();
    assert_eq!(s.text(), "one\ntwo\ntwo\nthree");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(2, 2)]);
    s.delete_line().unwrap();
    assert_eq!(s.text(), "one\ntwo\nthree");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(2, 2)]);
}

#[test]
fn test_indent_and_outdent() {
    let mut s = session("a\nb");
    s.set_selected_buffer_range(Range::new((0, 0), (1, 1)), false);
    s.indent().unwrap();
    assert_eq!(s.text(), "    a\n    b");
    assert_eq!(s.selected_buffer_ranges(), vec![Range::new((0, 0), (1, 5))]);
    s.outdent().unwrap();
    assert_eq!(s.text(), "a\nb");

    s.set_cursor_buffer_position(Point::new(0, 1));
    s.indent().unwrap();
    assert_eq!(s.text(), "a   \nb");
}

#[test]
fn test_newline_keeps_indentation() {
    let mut s = session("    let x = 1;");
    s.move_cursors(Motion::EndOfLine, 1);
    s.insert_newline().unwrap();
    assert_eq!(s.text(), "    let x = 1;\n    ");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(1, 4)]);
}

#[test]
fn test_toggle_line_comments() {
    let mut s = EditorSession::builder()
        .text("fn a() {}\n    b();")
        .language(LanguageConfig::new("rust", CommentConfig::line("//")))
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap();
    s.select_all();
    s.toggle_line_comments().unwrap();
    assert_eq!(s.text(), "// fn a() {}\n//     b();");
    s.toggle_line_comments().unwrap();
    assert_eq!(s.text(), "fn a() {}\n    b();");
}

#[test]
fn test_block_comment_fallback() {
    let mut s = EditorSession::builder()
        .text("body")
        .language(LanguageConfig::new("css", CommentConfig::block("/*", "*/")))
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap();
    s.toggle_line_comments().unwrap();
    assert_eq!(s.text(), "/* body */");
    s.toggle_line_comments().unwrap();
    assert_eq!(s.text(), "body");
}

#[test]
fn test_cut_and_paste_distribute_pieces() {
    let clipboard = Rc::new(MemoryClipboard::new());
    let mut s = EditorSession::builder()
        .text("ab cd")
        .clipboard(clipboard.clone())
        .build()
        .unwrap();
    s.set_selected_buffer_ranges(&[
        (Range::new((0, 0), (0, 2)), false),
        (Range::new((0, 3), (0, 5)), false),
    ]);
    s.cut_selected_text().unwrap();
    assert_eq!(s.text(), " ");
    let entry = editor_state::Clipboard::read(clipboard.as_ref()).unwrap();
    assert_eq!(entry.text, "ab\ncd");
    assert_eq!(entry.selections, vec!["ab".to_string(), "cd".to_string()]);

    s.paste_text().unwrap();
    assert_eq!(s.text(), "ab cd");
}

#[test]
fn test_copy_empty_cursor_copies_whole_line() {
    let clipboard = Rc::new(MemoryClipboard::new());
    let mut s = EditorSession::builder()
        .text("first\nsecond")
        .clipboard(clipboard.clone())
        .build()
        .unwrap();
    s.set_cursor_buffer_position(Point::new(0, 2));
    s.copy_selected_text();
    let entry: ClipboardEntry = editor_state::Clipboard::read(clipboard.as_ref()).unwrap();
    assert!(entry.full_line);
    assert_eq!(entry.text, "first\n");

    s.set_cursor_buffer_position(Point::new(1, 3));
    s.paste_text().unwrap();
    assert_eq!(s.text(), "first\nfirst\nsecond");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(2, 3)]);
}

#[test]
fn test_add_selection_below_skips_short_rows() {
    let mut s = session("abcdef\nab\nabcdef");
    s.set_selected_buffer_range(Range::new((0, 3), (0, 5)), false);
    s.add_selection_below();
    assert_eq!(
        s.selected_buffer_ranges(),
        vec![Range::new((0, 3), (0, 5)), Range::new((2, 3), (2, 5))]
    );
}

#[test]
fn test_add_cursor_above_keeps_column() {
    let mut s = session("abcdef\nabcdef");
    s.set_cursor_buffer_position(Point::new(1, 4));
    s.add_selection_above();
    assert_eq!(
        s.cursor_buffer_positions(),
        vec![Point::new(0, 4), Point::new(1, 4)]
    );
}

#[test]
fn test_word_motion_and_selection() {
    let mut s = session("hello big_world");
    s.set_cursor_buffer_position(Point::new(0, 8));
    s.select_word();
    assert_eq!(s.selected_text(), "big_world");
    s.upper_case().unwrap();
    assert_eq!(s.text(), "hello BIG_WORLD");
    s.move_cursors(Motion::BeginningOfLine, 1);
    s.delete_to_end_of_word().unwrap();
    assert_eq!(s.text(), " BIG_WORLD");
}

#[test]
fn test_join_lines() {
    let mut s = session("a\n    b\nc");
    s.join_lines().unwrap();
    assert_eq!(s.text(), "a b\nc");
    assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 1)]);
}

#[test]
fn test_consolidate_keeps_oldest() {
    let mut s = session("a\nb\nc");
    let first = s.selections()[0].id;
    s.add_cursor_at_buffer_position(Point::new(1, 0));
    s.add_cursor_at_buffer_position(Point::new(2, 0));
    assert!(s.consolidate_selections());
    let remaining = s.selections();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, first);
}
