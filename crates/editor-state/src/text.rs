//! Text helpers shared by the document, the layout and the cursor logic.
//!
//! Columns are counted in `char`s throughout. Grapheme-aware helpers convert between char
//! columns and extended grapheme cluster boundaries so that combining sequences and Hangul
//! jamo clusters move as one unit.

use crate::layout::{CharClassifier, CharKind};
use crate::point::Point;
use unicode_segmentation::UnicodeSegmentation;

/// The extent (rows and trailing column) covered by `text`.
pub fn extent_of(text: &str) -> Point {
    let mut rows = 0;
    let mut column = 0;
    for ch in text.chars() {
        if ch == '\n' {
            rows += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    Point::new(rows, column)
}

/// Number of `char`s in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of char column `column` in `line`, clamped to the line length.
pub fn byte_index(line: &str, column: usize) -> usize {
    line.char_indices()
        .nth(column)
        .map(|(i, _)| i)
        .unwrap_or(line.len())
}

/// Slice of `line` between two char columns.
pub fn slice_columns(line: &str, start: usize, end: usize) -> &str {
    let a = byte_index(line, start);
    let b = byte_index(line, end.max(start));
    &line[a..b]
}

/// Number of leading spaces and tabs, in chars.
pub fn leading_whitespace_len(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Returns `true` if the line holds nothing but spaces and tabs.
pub fn is_blank(line: &str) -> bool {
    line.chars().all(|c| c == ' ' || c == '\t')
}

/// Visual width of the leading whitespace of `line`, with tabs expanded to `tab_length`.
pub fn indent_columns(line: &str, tab_length: usize) -> usize {
    let tab_length = tab_length.max(1);
    let mut columns = 0;
    for ch in line.chars() {
        match ch {
            ' ' => columns += 1,
            '\t' => columns += tab_length - columns % tab_length,
            _ => break,
        }
    }
    columns
}

/// Whitespace that indents by `columns`, using spaces or tabs.
pub fn indent_string(columns: usize, soft_tabs: bool, tab_length: usize) -> String {
    if soft_tabs || tab_length == 0 {
        " ".repeat(columns)
    } else {
        let mut s = "\t".repeat(columns / tab_length);
        s.push_str(&" ".repeat(columns % tab_length));
        s
    }
}

/// Char column of the grapheme boundary preceding `column`.
pub fn previous_grapheme_column(line: &str, column: usize) -> usize {
    let target = byte_index(line, column);
    let mut previous = 0;
    for (i, _) in line.grapheme_indices(true) {
        if i >= target {
            break;
        }
        previous = i;
    }
    char_len(&line[..previous])
}

/// Char column of the grapheme boundary following `column`.
pub fn next_grapheme_column(line: &str, column: usize) -> usize {
    let target = byte_index(line, column);
    for (i, g) in line.grapheme_indices(true) {
        if i + g.len() > target {
            return char_len(&line[..i + g.len()]);
        }
    }
    char_len(line)
}

/// If `column` sits inside a run of leading spaces that forms a complete soft tab, the soft
/// tab's start and end columns.
pub fn soft_tab_around(line: &str, column: usize, tab_length: usize) -> Option<(usize, usize)> {
    if tab_length < 2 {
        return None;
    }
    let leading_spaces = line.chars().take_while(|c| *c == ' ').count();
    let start = column / tab_length * tab_length;
    let end = start + tab_length;
    (column % tab_length != 0 && end <= leading_spaces).then_some((start, end))
}

/// Word-motion class of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Space, tab or newline.
    Whitespace,
    /// Part of an identifier-like word.
    Word,
    /// A member of the non-word character set.
    Punctuation,
    /// Double-width or Korean text; a run of it moves as one unit.
    Wide,
}

/// Classify `ch` for word motion.
pub fn char_class(ch: char, non_word: &str, classifier: &dyn CharClassifier) -> CharClass {
    if ch.is_whitespace() {
        CharClass::Whitespace
    } else if non_word.contains(ch) {
        CharClass::Punctuation
    } else {
        match classifier.classify(ch) {
            CharKind::DoubleWidth | CharKind::Korean => CharClass::Wide,
            _ => CharClass::Word,
        }
    }
}

/// Split a row of text into lines without their terminators.
///
/// `"a\nb\n"` yields `["a", "b", ""]`.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::UnicodeClassifier;

    #[test]
    fn test_extent() {
        assert_eq!(extent_of(""), Point::new(0, 0));
        assert_eq!(extent_of("abc"), Point::new(0, 3));
        assert_eq!(extent_of("ab\ncd\n"), Point::new(2, 0));
        assert_eq!(extent_of("ab\n中文"), Point::new(1, 2));
    }

    #[test]
    fn test_grapheme_columns() {
        // "e" + combining acute accent is a single grapheme of two chars.
        let line = "ae\u{301}b";
        assert_eq!(next_grapheme_column(line, 1), 3);
        assert_eq!(previous_grapheme_column(line, 3), 1);
        assert_eq!(previous_grapheme_column(line, 0), 0);
        assert_eq!(next_grapheme_column(line, 4), 4);
    }

    #[test]
    fn test_indent_helpers() {
        assert_eq!(indent_columns("\t  x", 4), 6);
        assert_eq!(indent_string(6, false, 4), "\t  ");
        assert_eq!(indent_string(3, true, 4), "   ");
        assert_eq!(leading_whitespace_len("  \tfoo"), 3);
        assert!(is_blank(" \t "));
    }

    #[test]
    fn test_soft_tab_around() {
        let line = "        x";
        assert_eq!(soft_tab_around(line, 2, 4), Some((0, 4)));
        assert_eq!(soft_tab_around(line, 4, 4), None);
        assert_eq!(soft_tab_around(line, 6, 4), Some((4, 8)));
        assert_eq!(soft_tab_around("  x", 1, 4), None);
    }

    #[test]
    fn test_char_class() {
        let classifier = UnicodeClassifier;
        let non_word = "./";
        assert_eq!(char_class('a', non_word, &classifier), CharClass::Word);
        assert_eq!(char_class('.', non_word, &classifier), CharClass::Punctuation);
        assert_eq!(char_class(' ', non_word, &classifier), CharClass::Whitespace);
        assert_eq!(char_class('中', non_word, &classifier), CharClass::Wide);
        assert_eq!(char_class('한', non_word, &classifier), CharClass::Wide);
    }
}
