//! Cursor state and motion.
//!
//! A [`Cursor`] is the head of a selection marker plus a goal screen column. Motions are
//! computed by a [`Navigator`], which borrows the document and the coordinate translator and
//! turns a start position and a [`Motion`] into a target position. Vertical motions target the
//! goal column on the screen, so a cursor moving through short and wrapped lines returns to
//! its original column; every other motion clears the goal.

use crate::display::DisplayLayer;
use crate::document::Document;
use crate::ids::MarkerId;
use crate::point::{ClipDirection, Point, Range, ScreenPoint};
use crate::text::{
    CharClass, char_class, char_len, is_blank, leading_whitespace_len, next_grapheme_column,
    previous_grapheme_column,
};
use regex::Regex;
use std::sync::LazyLock;

static SUBWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{Lu}+\p{Ll}*|\p{Ll}+|\p{N}+|[^\p{L}\p{N}\s]+|\s+|\p{L}+")
        .expect("subword pattern is valid")
});

/// A cursor motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motion {
    /// One grapheme (or one atomic soft tab, or one fold) left.
    Left,
    /// One grapheme (or one atomic soft tab, or one fold) right.
    Right,
    /// One screen row up, towards the goal column.
    Up,
    /// One screen row down, towards the goal column.
    Down,
    /// Start of the document.
    Top,
    /// End of the document.
    Bottom,
    /// Column 0 of the buffer row.
    BeginningOfLine,
    /// End of the buffer row.
    EndOfLine,
    /// Start of the screen row.
    BeginningOfScreenLine,
    /// End of the screen row.
    EndOfScreenLine,
    /// First non-whitespace character, toggling with column 0.
    FirstCharacterOfLine,
    /// Start of the current or previous word.
    BeginningOfWord,
    /// End of the current or next word.
    EndOfWord,
    /// Start of the next word.
    BeginningOfNextWord,
    /// Previous change of character class.
    PreviousWordBoundary,
    /// Next change of character class.
    NextWordBoundary,
    /// Previous camel-case, snake-case or class boundary.
    PreviousSubwordBoundary,
    /// Next camel-case, snake-case or class boundary.
    NextSubwordBoundary,
    /// First blank row after the current paragraph.
    BeginningOfNextParagraph,
    /// First blank row before the current paragraph.
    BeginningOfPreviousParagraph,
    /// Up by a page of the given number of rows.
    PageUp(usize),
    /// Down by a page of the given number of rows.
    PageDown(usize),
}

impl Motion {
    /// Returns `true` for motions that keep the goal column.
    pub fn is_vertical(self) -> bool {
        matches!(
            self,
            Motion::Up | Motion::Down | Motion::PageUp(_) | Motion::PageDown(_)
        )
    }
}

/// The cursor of one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Marker whose head is the cursor position.
    pub marker: MarkerId,
    /// Hosts hide cursors of non-empty selections.
    pub visible: bool,
    /// Screen column targeted by vertical motion.
    pub goal_column: Option<usize>,
}

impl Cursor {
    /// A visible cursor with no goal column.
    pub fn new(marker: MarkerId) -> Self {
        Self {
            marker,
            visible: true,
            goal_column: None,
        }
    }
}

/// Computes motion targets over a document and its screen layout.
pub struct Navigator<'a> {
    document: &'a Document,
    display: &'a DisplayLayer,
    non_word: &'a str,
}

impl<'a> Navigator<'a> {
    /// A navigator using `non_word` as the punctuation set for word motion.
    pub fn new(document: &'a Document, display: &'a DisplayLayer, non_word: &'a str) -> Self {
        Self {
            document,
            display,
            non_word,
        }
    }

    /// Apply `motion` `count` times from `from`. Returns the target and the goal column to
    /// keep (always `None` after horizontal motion).
    pub fn apply(
        &self,
        motion: Motion,
        from: Point,
        goal: Option<usize>,
        count: usize,
    ) -> (Point, Option<usize>) {
        let from = self.document.clip_position(from);
        match motion {
            Motion::Up => self.vertical(from, goal, count.max(1), false),
            Motion::Down => self.vertical(from, goal, count.max(1), true),
            Motion::PageUp(rows) => self.vertical(from, goal, rows.max(1) * count.max(1), false),
            Motion::PageDown(rows) => self.vertical(from, goal, rows.max(1) * count.max(1), true),
            _ => {
                let mut point = from;
                for _ in 0..count.max(1) {
                    let next = self.step(motion, point);
                    if next == point {
                        break;
                    }
                    point = next;
                }
                (point, None)
            }
        }
    }

    fn step(&self, motion: Motion, from: Point) -> Point {
        match motion {
            Motion::Left => self.left(from),
            Motion::Right => self.right(from),
            Motion::Top => Point::ZERO,
            Motion::Bottom => self.document.max_point(),
            Motion::BeginningOfLine => Point::new(from.row, 0),
            Motion::EndOfLine => Point::new(from.row, self.document.line_length(from.row)),
            Motion::BeginningOfScreenLine => {
                let screen = self.display.translate_to_screen(self.document, from);
                self.display.translate_to_buffer(
                    self.document,
                    ScreenPoint::new(screen.row, 0),
                    ClipDirection::Backward,
                )
            }
            Motion::EndOfScreenLine => {
                let screen = self.display.translate_to_screen(self.document, from);
                self.display.translate_to_buffer(
                    self.document,
                    ScreenPoint::new(screen.row, usize::MAX),
                    ClipDirection::Backward,
                )
            }
            Motion::FirstCharacterOfLine => {
                let first = leading_whitespace_len(&self.document.line(from.row));
                Point::new(from.row, if from.column == first { 0 } else { first })
            }
            Motion::BeginningOfWord => self.beginning_of_word(from),
            Motion::EndOfWord => self.end_of_word(from),
            Motion::BeginningOfNextWord => self.beginning_of_next_word(from),
            Motion::PreviousWordBoundary => self.previous_word_boundary(from),
            Motion::NextWordBoundary => self.next_word_boundary(from),
            Motion::PreviousSubwordBoundary => self.previous_subword_boundary(from),
            Motion::NextSubwordBoundary => self.next_subword_boundary(from),
            Motion::BeginningOfNextParagraph => self.next_paragraph(from),
            Motion::BeginningOfPreviousParagraph => self.previous_paragraph(from),
            Motion::Up | Motion::Down | Motion::PageUp(_) | Motion::PageDown(_) => from,
        }
    }

    fn atomic_tab_length(&self) -> Option<usize> {
        let config = self.display.config();
        (config.atomic_soft_tabs && config.tab_length > 1).then_some(config.tab_length)
    }

    fn left(&self, from: Point) -> Point {
        if let Some(fold) = self.display.fold_ending_at(self.document, from) {
            return fold.start;
        }
        if from.column == 0 {
            if from.row == 0 {
                return from;
            }
            let row = from.row - 1;
            let end = Point::new(row, self.document.line_length(row));
            return match self.display.fold_containing(self.document, end) {
                Some(fold) => fold.start,
                None => end,
            };
        }
        let line = self.document.line(from.row);
        if let Some(tab) = self.atomic_tab_length() {
            let spaces = line.chars().take_while(|c| *c == ' ').count();
            if from.column % tab == 0 && from.column >= tab && from.column <= spaces {
                return Point::new(from.row, from.column - tab);
            }
        }
        Point::new(from.row, previous_grapheme_column(&line, from.column))
    }

    fn right(&self, from: Point) -> Point {
        if let Some(fold) = self.display.fold_starting_at(self.document, from) {
            return fold.end;
        }
        let line = self.document.line(from.row);
        let len = char_len(&line);
        if from.column >= len {
            if from.row + 1 >= self.document.line_count() {
                return from;
            }
            return Point::new(from.row + 1, 0);
        }
        if let Some(tab) = self.atomic_tab_length() {
            let spaces = line.chars().take_while(|c| *c == ' ').count();
            if from.column % tab == 0 && from.column + tab <= spaces {
                return Point::new(from.row, from.column + tab);
            }
        }
        Point::new(from.row, next_grapheme_column(&line, from.column))
    }

    fn vertical(
        &self,
        from: Point,
        goal: Option<usize>,
        rows: usize,
        down: bool,
    ) -> (Point, Option<usize>) {
        let screen = self.display.translate_to_screen(self.document, from);
        let goal = goal.unwrap_or(screen.column);
        let target_row = if down {
            let last = self.display.last_screen_row(self.document);
            if screen.row >= last {
                return (self.document.max_point(), Some(goal));
            }
            (screen.row + rows).min(last)
        } else {
            if screen.row == 0 {
                return (Point::ZERO, Some(goal));
            }
            screen.row.saturating_sub(rows)
        };
        let point = self.display.translate_to_buffer(
            self.document,
            ScreenPoint::new(target_row, goal),
            ClipDirection::Closest,
        );
        let point = self
            .display
            .clip_soft_tab(self.document, point, ClipDirection::Closest);
        (point, Some(goal))
    }

    fn class_at(&self, line: &[char], column: usize) -> CharClass {
        char_class(line[column], self.non_word, self.display.classifier())
    }

    fn chars(&self, row: usize) -> Vec<char> {
        self.document.line(row).chars().collect()
    }

    fn beginning_of_word(&self, from: Point) -> Point {
        let mut row = from.row;
        let mut column = from.column;
        let mut line = self.chars(row);
        // Skip whitespace backwards, across rows.
        loop {
            while column > 0 && self.class_at(&line, column - 1) == CharClass::Whitespace {
                column -= 1;
            }
            if column > 0 || row == 0 {
                break;
            }
            row -= 1;
            line = self.chars(row);
            column = line.len();
            if line.is_empty() {
                return Point::new(row, 0);
            }
        }
        if column == 0 {
            return Point::new(row, 0);
        }
        let class = self.class_at(&line, column - 1);
        while column > 0 && self.class_at(&line, column - 1) == class {
            column -= 1;
        }
        Point::new(row, column)
    }

    fn end_of_word(&self, from: Point) -> Point {
        let last_row = self.document.line_count() - 1;
        let mut row = from.row;
        let mut column = from.column;
        let mut line = self.chars(row);
        loop {
            while column < line.len() && self.class_at(&line, column) == CharClass::Whitespace {
                column += 1;
            }
            if column < line.len() || row == last_row {
                break;
            }
            row += 1;
            line = self.chars(row);
            column = 0;
        }
        if column >= line.len() {
            return Point::new(row, line.len());
        }
        let class = self.class_at(&line, column);
        while column < line.len() && self.class_at(&line, column) == class {
            column += 1;
        }
        Point::new(row, column)
    }

    fn beginning_of_next_word(&self, from: Point) -> Point {
        let last_row = self.document.line_count() - 1;
        let mut row = from.row;
        let mut column = from.column;
        let mut line = self.chars(row);
        if column < line.len() {
            let class = self.class_at(&line, column);
            if class != CharClass::Whitespace {
                while column < line.len() && self.class_at(&line, column) == class {
                    column += 1;
                }
            }
        }
        loop {
            while column < line.len() && self.class_at(&line, column) == CharClass::Whitespace {
                column += 1;
            }
            if column < line.len() {
                return Point::new(row, column);
            }
            if row == last_row {
                return self.document.max_point();
            }
            row += 1;
            line = self.chars(row);
            column = 0;
        }
    }

    fn previous_word_boundary(&self, from: Point) -> Point {
        if from.column == 0 {
            return self.left(from);
        }
        let line = self.chars(from.row);
        let column = from.column.min(line.len());
        let class = self.class_at(&line, column - 1);
        let mut target = column - 1;
        while target > 0 && self.class_at(&line, target - 1) == class {
            target -= 1;
        }
        Point::new(from.row, target)
    }

    fn next_word_boundary(&self, from: Point) -> Point {
        let line = self.chars(from.row);
        if from.column >= line.len() {
            return self.right(from);
        }
        let class = self.class_at(&line, from.column);
        let mut target = from.column + 1;
        while target < line.len() && self.class_at(&line, target) == class {
            target += 1;
        }
        Point::new(from.row, target)
    }

    fn subword_boundaries(&self, row: usize) -> Vec<usize> {
        let line = self.document.line(row);
        let mut boundaries = vec![0];
        for m in SUBWORD.find_iter(&line) {
            let start = char_len(&line[..m.start()]);
            let token: Vec<char> = m.as_str().chars().collect();
            // "HTTPServer" splits as "HTTP" + "Server".
            let upper = token.iter().take_while(|c| c.is_uppercase()).count();
            if upper >= 2 && upper < token.len() {
                boundaries.push(start + upper - 1);
            }
            boundaries.push(start);
            boundaries.push(start + token.len());
        }
        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries
    }

    fn previous_subword_boundary(&self, from: Point) -> Point {
        if from.column == 0 {
            return self.left(from);
        }
        let target = self
            .subword_boundaries(from.row)
            .into_iter()
            .rev()
            .find(|b| *b < from.column)
            .unwrap_or(0);
        Point::new(from.row, target)
    }

    fn next_subword_boundary(&self, from: Point) -> Point {
        if from.column >= self.document.line_length(from.row) {
            return self.right(from);
        }
        let target = self
            .subword_boundaries(from.row)
            .into_iter()
            .find(|b| *b > from.column)
            .unwrap_or_else(|| self.document.line_length(from.row));
        Point::new(from.row, target)
    }

    fn next_paragraph(&self, from: Point) -> Point {
        let line_count = self.document.line_count();
        let mut previous_blank = is_blank(&self.document.line(from.row));
        for row in from.row + 1..line_count {
            let blank = is_blank(&self.document.line(row));
            if blank && !previous_blank {
                return Point::new(row, 0);
            }
            previous_blank = blank;
        }
        self.document.max_point()
    }

    fn previous_paragraph(&self, from: Point) -> Point {
        let mut next_blank = is_blank(&self.document.line(from.row));
        for row in (0..from.row).rev() {
            let blank = is_blank(&self.document.line(row));
            if blank && !next_blank {
                return Point::new(row, 0);
            }
            next_blank = blank;
        }
        Point::ZERO
    }

    /// The run of same-class characters around `point`. At a boundary, a word is preferred
    /// over whitespace and the run before the point over the run after it.
    pub fn current_word_range(&self, point: Point) -> Range {
        let point = self.document.clip_position(point);
        let line = self.chars(point.row);
        if line.is_empty() {
            return Range::empty(point);
        }
        let before = (point.column > 0).then(|| self.class_at(&line, point.column - 1));
        let after = (point.column < line.len()).then(|| self.class_at(&line, point.column));
        let anchor = match (before, after) {
            (Some(b), Some(CharClass::Whitespace)) if b != CharClass::Whitespace => {
                point.column - 1
            }
            (_, Some(_)) => point.column,
            (Some(_), None) => point.column - 1,
            (None, None) => return Range::empty(point),
        };
        let class = self.class_at(&line, anchor);
        let mut start = anchor;
        while start > 0 && self.class_at(&line, start - 1) == class {
            start -= 1;
        }
        let mut end = anchor + 1;
        while end < line.len() && self.class_at(&line, end) == class {
            end += 1;
        }
        Range::new((point.row, start), (point.row, end))
    }

    /// Returns `true` if `point` is at column 0.
    pub fn is_at_beginning_of_line(&self, point: Point) -> bool {
        point.column == 0
    }

    /// Returns `true` if `point` is at the end of its row.
    pub fn is_at_end_of_line(&self, point: Point) -> bool {
        point.column >= self.document.line_length(point.row)
    }

    /// Returns `true` if the characters on both sides of `point` are whitespace.
    pub fn is_surrounded_by_whitespace(&self, point: Point) -> bool {
        let line = self.chars(point.row);
        let start = point.column.saturating_sub(1);
        let end = (point.column + 1).min(line.len());
        start < end && line[start..end].iter().all(|c| c.is_whitespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayConfig;
    use crate::ids::SequentialIdGenerator;
    use editor_state_lang::DEFAULT_NON_WORD_CHARACTERS;
    use std::sync::Arc;

    fn setup(text: &str, config: DisplayConfig) -> (Document, DisplayLayer) {
        let mut doc = Document::with_ids(text, Arc::new(SequentialIdGenerator::new()));
        let display = DisplayLayer::new(&mut doc, config);
        (doc, display)
    }

    fn go(doc: &Document, display: &DisplayLayer, motion: Motion, from: (usize, usize)) -> Point {
        Navigator::new(doc, display, DEFAULT_NON_WORD_CHARACTERS)
            .apply(motion, from.into(), None, 1)
            .0
    }

    #[test]
    fn test_horizontal_motion_wraps_rows() {
        let (doc, display) = setup("ab\ncd", DisplayConfig::default());
        assert_eq!(go(&doc, &display, Motion::Left, (1, 0)), Point::new(0, 2));
        assert_eq!(go(&doc, &display, Motion::Right, (0, 2)), Point::new(1, 0));
        assert_eq!(go(&doc, &display, Motion::Left, (0, 0)), Point::new(0, 0));
        assert_eq!(go(&doc, &display, Motion::Right, (1, 2)), Point::new(1, 2));
    }

    #[test]
    fn test_atomic_soft_tabs() {
        let (doc, display) = setup("        x", DisplayConfig::default());
        assert_eq!(go(&doc, &display, Motion::Right, (0, 0)), Point::new(0, 4));
        assert_eq!(go(&doc, &display, Motion::Left, (0, 8)), Point::new(0, 4));
        assert_eq!(go(&doc, &display, Motion::Right, (0, 8)), Point::new(0, 9));
    }

    #[test]
    fn test_vertical_motion_keeps_goal_column() {
        let (doc, display) = setup("abcdef\nab\nabcdef", DisplayConfig::default());
        let nav = Navigator::new(&doc, &display, DEFAULT_NON_WORD_CHARACTERS);
        let (p, goal) = nav.apply(Motion::Down, Point::new(0, 5), None, 1);
        assert_eq!(p, Point::new(1, 2));
        assert_eq!(goal, Some(5));
        let (p, _) = nav.apply(Motion::Down, p, goal, 1);
        assert_eq!(p, Point::new(2, 5));
        let (p, _) = nav.apply(Motion::Down, p, goal, 1);
        assert_eq!(p, Point::new(2, 6));
        let (p, _) = nav.apply(Motion::Up, Point::new(0, 3), None, 1);
        assert_eq!(p, Point::ZERO);
    }

    #[test]
    fn test_word_motion() {
        let (doc, display) = setup("foo.bar  baz\n  qux", DisplayConfig::default());
        assert_eq!(go(&doc, &display, Motion::BeginningOfWord, (0, 9)), Point::new(0, 4));
        assert_eq!(go(&doc, &display, Motion::EndOfWord, (0, 0)), Point::new(0, 3));
        assert_eq!(
            go(&doc, &display, Motion::BeginningOfNextWord, (0, 4)),
            Point::new(0, 9)
        );
        assert_eq!(
            go(&doc, &display, Motion::BeginningOfNextWord, (0, 9)),
            Point::new(1, 2)
        );
        assert_eq!(go(&doc, &display, Motion::BeginningOfWord, (1, 2)), Point::new(0, 9));
        assert_eq!(go(&doc, &display, Motion::NextWordBoundary, (0, 0)), Point::new(0, 3));
        assert_eq!(
            go(&doc, &display, Motion::PreviousWordBoundary, (0, 9)),
            Point::new(0, 7)
        );
    }

    #[test]
    fn test_wide_runs_are_one_word() {
        let (doc, display) = setup("ab中文字cd", DisplayConfig::default());
        assert_eq!(go(&doc, &display, Motion::NextWordBoundary, (0, 2)), Point::new(0, 5));
        let nav = Navigator::new(&doc, &display, DEFAULT_NON_WORD_CHARACTERS);
        assert_eq!(
            nav.current_word_range(Point::new(0, 3)),
            Range::new((0, 2), (0, 5))
        );
    }

    #[test]
    fn test_subword_motion() {
        let (doc, display) = setup("parseHTTPServer_value", DisplayConfig::default());
        let mut p = Point::ZERO;
        let mut stops = Vec::new();
        for _ in 0..6 {
            p = go(&doc, &display, Motion::NextSubwordBoundary, (p.row, p.column));
            stops.push(p.column);
        }
        assert_eq!(stops, vec![5, 9, 15, 16, 21, 21]);
        assert_eq!(
            go(&doc, &display, Motion::PreviousSubwordBoundary, (0, 15)),
            Point::new(0, 9)
        );
    }

    #[test]
    fn test_paragraph_and_line_motion() {
        let (doc, display) = setup("a\nb\n\nc\n\n  d", DisplayConfig::default());
        assert_eq!(
            go(&doc, &display, Motion::BeginningOfNextParagraph, (0, 0)),
            Point::new(2, 0)
        );
        assert_eq!(
            go(&doc, &display, Motion::BeginningOfPreviousParagraph, (5, 0)),
            Point::new(4, 0)
        );
        assert_eq!(
            go(&doc, &display, Motion::FirstCharacterOfLine, (5, 3)),
            Point::new(5, 2)
        );
        assert_eq!(
            go(&doc, &display, Motion::FirstCharacterOfLine, (5, 2)),
            Point::new(5, 0)
        );
    }

    #[test]
    fn test_fold_is_one_step() {
        let (mut doc, mut display) = setup("abc\ndef\nghi", DisplayConfig::default());
        display.fold_buffer_range(&mut doc, Range::new((0, 1), (1, 2)));
        display.refresh_folds(&doc);
        assert_eq!(go(&doc, &display, Motion::Right, (0, 1)), Point::new(1, 2));
        assert_eq!(go(&doc, &display, Motion::Left, (1, 2)), Point::new(0, 1));
        assert_eq!(go(&doc, &display, Motion::Down, (0, 0)), Point::new(2, 0));
    }

    #[test]
    fn test_screen_line_motion_with_soft_wrap() {
        let config = DisplayConfig {
            soft_wrap_column: Some(6),
            ..DisplayConfig::default()
        };
        let (doc, display) = setup("abc def ghi", config);
        assert_eq!(
            go(&doc, &display, Motion::BeginningOfScreenLine, (0, 9)),
            Point::new(0, 8)
        );
        assert_eq!(
            go(&doc, &display, Motion::EndOfScreenLine, (0, 1)),
            Point::new(0, 3)
        );
        assert_eq!(go(&doc, &display, Motion::Down, (0, 1)), Point::new(0, 5));
    }
}
