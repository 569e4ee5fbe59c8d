//! Structured records of text edits.
//!
//! Every committed edit produces one [`TextChange`]. The document hands them to marker
//! layers for rebasing, keeps them in history for undo, and queues them for every subscriber
//! so consumers can update incrementally without diffing text.

use crate::point::{Point, Range};
use crate::text::extent_of;

/// One replacement of `old_range` (holding `old_text`) by `new_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    /// Replaced range, in coordinates before the edit.
    pub old_range: Range,
    /// Range occupied by the inserted text, in coordinates after the edit.
    pub new_range: Range,
    /// Text that used to be in `old_range`.
    pub old_text: String,
    /// Text now in `new_range`.
    pub new_text: String,
}

impl TextChange {
    /// Build a change replacing `old_text` at `start` with `new_text`.
    pub fn new(start: Point, old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        let old_text = old_text.into();
        let new_text = new_text.into();
        Self {
            old_range: Range::new(start, start.traverse(extent_of(&old_text))),
            new_range: Range::new(start, start.traverse(extent_of(&new_text))),
            old_text,
            new_text,
        }
    }

    /// The change that undoes this one.
    pub fn inverted(&self) -> TextChange {
        TextChange {
            old_range: self.new_range,
            new_range: self.old_range,
            old_text: self.new_text.clone(),
            new_text: self.old_text.clone(),
        }
    }

    /// Net change in row count.
    pub fn row_delta(&self) -> isize {
        self.new_range.end.row as isize - self.old_range.end.row as isize
    }

    /// Returns `true` if the change neither removes nor inserts anything.
    pub fn is_noop(&self) -> bool {
        self.old_text.is_empty() && self.new_text.is_empty()
    }
}
