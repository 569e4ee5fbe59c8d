//! Buffer/screen translation through a session: soft wrap, folds, tabs and wide
//! characters, plus randomized round trips.

use editor_state::{
    ClipDirection, ConfigPatch, EditorSession, MemoryClipboard, Point, Range, ScreenPoint,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;
use std::time::{Duration, Instant};

fn session(text: &str) -> EditorSession {
    EditorSession::builder()
        .text(text)
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap()
}

fn wrap_at(session: &mut EditorSession, width: usize) {
    session
        .update(&ConfigPatch {
            soft_wrapped: Some(true),
            editor_width_in_chars: Some(width),
            ..ConfigPatch::default()
        })
        .unwrap();
}

#[test]
fn test_soft_wrap_without_spaces() {
    let mut s = session("abcdefghijklmno");
    wrap_at(&mut s, 10);
    assert_eq!(s.screen_line_count(), 2);
    assert_eq!(s.screen_line(0).unwrap().text, "abcdefghij");
    assert_eq!(s.screen_line(1).unwrap().text, "klmno");
    assert_eq!(
        s.screen_position_for_buffer_position(Point::new(0, 10)),
        ScreenPoint::new(1, 0)
    );
    assert_eq!(
        s.buffer_position_for_screen_position(ScreenPoint::new(1, 0), ClipDirection::Closest),
        Point::new(0, 10)
    );
}

#[test]
fn test_unwrapping_restores_single_rows() {
    let mut s = session("abcdefghijklmno\nxyz");
    wrap_at(&mut s, 10);
    assert_eq!(s.screen_line_count(), 3);
    s.update(&ConfigPatch {
        soft_wrapped: Some(false),
        ..ConfigPatch::default()
    })
    .unwrap();
    assert_eq!(s.screen_line_count(), 2);
    assert_eq!(s.screen_row_for_buffer_row(1), 1);
}

#[test]
fn test_mini_disables_wrapping() {
    let mut s = session("abcdefghijklmno");
    wrap_at(&mut s, 10);
    s.set_mini(true).unwrap();
    assert_eq!(s.screen_line_count(), 1);
    s.set_mini(false).unwrap();
    assert_eq!(s.screen_line_count(), 2);
}

#[test]
fn test_fold_collapses_rows_and_follows_edits() {
    let mut s = session("0\n1\n2\n3\n4\n5");
    s.fold_buffer_range(Range::new((1, 1), (3, 1)));
    assert_eq!(s.screen_line_count(), 4);
    assert_eq!(s.buffer_row_for_screen_row(2), 4);
    assert!(s.is_folded_at_buffer_row(2));

    // Interior positions snap to the fold boundary.
    let inside = s.screen_position_for_buffer_position(Point::new(2, 0));
    assert_eq!(inside, ScreenPoint::new(1, 1));

    // An edit above the fold moves it down.
    s.set_cursor_buffer_position(Point::new(0, 0));
    s.insert_text("new\n").unwrap();
    assert_eq!(s.folds(), vec![Range::new((2, 1), (4, 1))]);
    assert_eq!(s.screen_line_count(), 5);

    assert_eq!(s.unfold_buffer_row(3).len(), 1);
    assert_eq!(s.screen_line_count(), 7);
}

#[test]
fn test_tabs_and_wide_characters() {
    let mut s = session("\tx\n日本語x");
    assert_eq!(
        s.screen_position_for_buffer_position(Point::new(0, 1)),
        ScreenPoint::new(0, 4)
    );
    assert_eq!(
        s.screen_position_for_buffer_position(Point::new(1, 3)),
        ScreenPoint::new(1, 6)
    );
    assert_eq!(
        s.buffer_position_for_screen_position(ScreenPoint::new(1, 6), ClipDirection::Closest),
        Point::new(1, 3)
    );
    s.update(&ConfigPatch {
        tab_length: Some(2),
        ..ConfigPatch::default()
    })
    .unwrap();
    assert_eq!(
        s.screen_position_for_buffer_position(Point::new(0, 1)),
        ScreenPoint::new(0, 2)
    );
}

#[test]
fn test_out_of_range_positions_clamp() {
    let mut s = session("ab\ncd");
    assert_eq!(
        s.screen_position_for_buffer_position(Point::new(10, 10)),
        ScreenPoint::new(1, 2)
    );
    assert_eq!(
        s.buffer_position_for_screen_position(ScreenPoint::new(0, 99), ClipDirection::Closest),
        Point::new(0, 2)
    );
}

#[test]
fn test_background_work_completes() {
    let text = vec!["the quick brown fox"; 200].join("\n");
    let mut s = session(&text);
    wrap_at(&mut s, 8);
    let mut rounds = 0;
    while s.do_background_work(Instant::now() + Duration::from_millis(5)) {
        rounds += 1;
        assert!(rounds < 10_000);
    }
    let rows_per_line = s.screen_row_for_buffer_row(1);
    assert!(rows_per_line > 1);
    assert_eq!(s.screen_row_for_buffer_row(199), 199 * rows_per_line);
}

const WORDS: &[&str] = &["ab", "cde", "\tf", "日本", "xyz", "g", "hijklmnopq"];

fn random_text(rng: &mut StdRng) -> String {
    let rows = rng.gen_range(1..8);
    (0..rows)
        .map(|_| {
            let words = rng.gen_range(0..8);
            (0..words)
                .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_random_round_trips() {
    for seed in 0..40 {
        let mut rng = StdRng::seed_from_u64(seed);
        let text = random_text(&mut rng);
        let mut s = session(&text);
        s.update(&ConfigPatch {
            atomic_soft_tabs: Some(false),
            ..ConfigPatch::default()
        })
        .unwrap();
        if rng.gen_bool(0.5) {
            wrap_at(&mut s, rng.gen_range(6..20));
        }

        let rows = s.line_count();
        let mut fold = None;
        if rows > 2 && rng.gen_bool(0.5) {
            let start = rng.gen_range(0..rows - 1);
            let end = rng.gen_range(start + 1..rows);
            let range = Range::new((start, 0), (end, 0));
            if s.fold_buffer_range(range).is_some() {
                fold = Some(range);
            }
        }

        for row in 0..rows {
            let len = s.line(row).chars().count();
            for column in 0..=len {
                let point = Point::new(row, column);
                if fold.is_some_and(|f| f.strictly_contains(point)) {
                    continue;
                }
                let screen = s.screen_position_for_buffer_position(point);
                let back = s.buffer_position_for_screen_position(screen, ClipDirection::Closest);
                assert_eq!(back, point, "seed {seed}, text {text:?}, screen {screen:?}");
            }
        }
    }
}

#[test]
fn test_random_edits_keep_layout_consistent() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut s = session(&random_text(&mut rng));
    wrap_at(&mut s, 9);
    for _ in 0..60 {
        let rows = s.line_count();
        let row = rng.gen_range(0..rows);
        let len = s.line(row).chars().count();
        let column = rng.gen_range(0..=len);
        s.set_cursor_buffer_position(Point::new(row, column));
        if rng.gen_bool(0.3) {
            s.backspace().unwrap();
        } else {
            s.insert_text(WORDS[rng.gen_range(0..WORDS.len())]).unwrap();
        }

        // A fresh session over the same text must lay out identically.
        let mut fresh = session(&s.text());
        wrap_at(&mut fresh, 9);
        let count = s.screen_line_count();
        assert_eq!(count, fresh.screen_line_count());
        let ours: Vec<String> = s.screen_lines(0, count).into_iter().map(|l| l.text).collect();
        let theirs: Vec<String> = fresh
            .screen_lines(0, count)
            .into_iter()
            .map(|l| l.text)
            .collect();
        assert_eq!(ours, theirs);
    }
}
