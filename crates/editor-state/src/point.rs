//! Positions and ranges in buffer and screen space.
//!
//! Buffer coordinates address raw document text: `row` is a zero-based line index and `column`
//! counts Unicode scalar values (`char`) from the start of the line. Screen coordinates address
//! the rendered layout after folds, soft wraps and tab expansion. The two spaces use distinct
//! types so they cannot be mixed without going through the translator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in buffer space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Point {
    /// Zero-based buffer row.
    pub row: usize,
    /// Zero-based column in characters.
    pub column: usize,
}

impl Point {
    /// The origin.
    pub const ZERO: Point = Point { row: 0, column: 0 };

    /// Create a new buffer point.
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Move `self` past text whose extent is `extent`.
    ///
    /// A multi-row extent resets the column to the extent's column.
    pub fn traverse(self, extent: Point) -> Point {
        if extent.row == 0 {
            Point::new(self.row, self.column + extent.column)
        } else {
            Point::new(self.row + extent.row, extent.column)
        }
    }

    /// Inverse of [`Point::traverse`]: the extent that leads from `start` to `self`.
    pub fn traversal_from(self, start: Point) -> Point {
        if self.row == start.row {
            Point::new(0, self.column.saturating_sub(start.column))
        } else {
            Point::new(self.row - start.row, self.column)
        }
    }
}

impl From<(usize, usize)> for Point {
    fn from((row, column): (usize, usize)) -> Self {
        Self::new(row, column)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// A position in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScreenPoint {
    /// Zero-based screen row.
    pub row: usize,
    /// Zero-based screen column.
    pub column: usize,
}

impl ScreenPoint {
    /// Create a new screen point.
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl From<(usize, usize)> for ScreenPoint {
    fn from((row, column): (usize, usize)) -> Self {
        Self::new(row, column)
    }
}

/// An ordered pair of buffer points (`start <= end`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Range {
    /// Inclusive start.
    pub start: Point,
    /// Exclusive end.
    pub end: Point,
}

impl Range {
    /// Create a range, swapping the endpoints if they are out of order.
    pub fn new(a: impl Into<Point>, b: impl Into<Point>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// An empty range at `point`.
    pub fn empty(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    /// Returns `true` if `start == end`.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if the range spans more than one row.
    pub fn is_single_line(&self) -> bool {
        self.start.row == self.end.row
    }

    /// Rows touched by this range, inclusive on both ends.
    pub fn rows(&self) -> (usize, usize) {
        (self.start.row, self.end.row)
    }

    /// Returns `true` if `point` lies within `start..=end`.
    pub fn contains_point(&self, point: Point) -> bool {
        self.start <= point && point <= self.end
    }

    /// Returns `true` if `point` lies strictly between the endpoints.
    pub fn strictly_contains(&self, point: Point) -> bool {
        self.start < point && point < self.end
    }

    /// Returns `true` if the two ranges share at least one position (boundaries included).
    pub fn touches(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns `true` if the two ranges overlap with positive length.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Shift both endpoints by `delta` rows, keeping columns.
    pub fn translate_rows(&self, delta: isize) -> Range {
        let shift = |p: Point| Point::new(p.row.saturating_add_signed(delta), p.column);
        Range {
            start: shift(self.start),
            end: shift(self.end),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.start, self.end)
    }
}

/// An ordered pair of screen points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenRange {
    /// Inclusive start.
    pub start: ScreenPoint,
    /// Exclusive end.
    pub end: ScreenPoint,
}

impl ScreenRange {
    /// Create a screen range, swapping the endpoints if needed.
    pub fn new(a: impl Into<ScreenPoint>, b: impl Into<ScreenPoint>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Returns `true` if `start == end`.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// How to resolve a position that falls where the cursor cannot rest
/// (inside an expanded tab, an atomic soft tab, or past the end of a wrapped row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipDirection {
    /// Prefer the earlier valid position.
    Backward,
    /// Prefer the later valid position.
    Forward,
    /// Pick whichever valid position is nearer, ties going backward.
    #[default]
    Closest,
}
