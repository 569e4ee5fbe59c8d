//! Character measurement and soft wrapping.
//!
//! The translator breaks each display line (one buffer row, or several joined by folds) into
//! *units*: characters, expanded tabs and fold placeholders. Every unit has a number of screen
//! columns it occupies and a visual width used to decide where rows wrap. Screen columns count
//! rendered characters, so a double-width character is one column wide but two units of
//! visual width.
//!
//! Widths come from a pluggable [`CharClassifier`] combined with [`CharWidthRatios`], so hosts
//! can feed real font metrics.

use crate::point::Point;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

/// Default tab length (in columns).
pub const DEFAULT_TAB_LENGTH: usize = 4;

const WIDTH_EPSILON: f64 = 1e-9;

/// Width class of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharKind {
    /// Ordinary width.
    Normal,
    /// East Asian wide or fullwidth (CJK ideographs, fullwidth forms).
    DoubleWidth,
    /// Halfwidth forms (halfwidth katakana, halfwidth Hangul).
    HalfWidth,
    /// Hangul syllables and jamo.
    Korean,
    /// Combining marks and other zero-width characters.
    ZeroWidth,
}

/// Decides the width class of characters.
pub trait CharClassifier {
    /// Classify `ch`.
    fn classify(&self, ch: char) -> CharKind;
}

/// Classifier based on UAX #11 widths plus the Hangul and halfwidth blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeClassifier;

impl CharClassifier for UnicodeClassifier {
    fn classify(&self, ch: char) -> CharKind {
        let cp = ch as u32;
        if (0xAC00..=0xD7A3).contains(&cp)
            || (0x1100..=0x11FF).contains(&cp)
            || (0x3130..=0x318F).contains(&cp)
            || (0xA960..=0xA97F).contains(&cp)
            || (0xD7B0..=0xD7FF).contains(&cp)
        {
            // Combining jamo report zero width on their own.
            return match ch.width() {
                Some(0) => CharKind::ZeroWidth,
                _ => CharKind::Korean,
            };
        }
        if (0xFF61..=0xFFDC).contains(&cp) || (0xFFE8..=0xFFEE).contains(&cp) {
            return CharKind::HalfWidth;
        }
        match ch.width() {
            Some(0) => CharKind::ZeroWidth,
            Some(2) => CharKind::DoubleWidth,
            _ => CharKind::Normal,
        }
    }
}

/// Visual width of each [`CharKind`], relative to a normal character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharWidthRatios {
    /// Width of [`CharKind::DoubleWidth`] characters.
    pub double_width: f64,
    /// Width of [`CharKind::HalfWidth`] characters.
    pub half_width: f64,
    /// Width of [`CharKind::Korean`] characters.
    pub korean: f64,
    /// Width of [`CharKind::ZeroWidth`] characters.
    pub zero_width: f64,
}

impl Default for CharWidthRatios {
    fn default() -> Self {
        Self {
            double_width: 2.0,
            half_width: 0.5,
            korean: 2.0,
            zero_width: 0.0,
        }
    }
}

impl CharWidthRatios {
    /// Width of a character of class `kind`.
    pub fn width(&self, kind: CharKind) -> f64 {
        match kind {
            CharKind::Normal => 1.0,
            CharKind::DoubleWidth => self.double_width,
            CharKind::HalfWidth => self.half_width,
            CharKind::Korean => self.korean,
            CharKind::ZeroWidth => self.zero_width,
        }
    }
}

/// Decides where a row may be soft wrapped.
pub trait WrapPolicy {
    /// Returns `true` if a row may break between `previous` and `next`.
    fn is_wrap_boundary(&self, previous: char, next: char, classifier: &dyn CharClassifier)
    -> bool;
}

/// Break after whitespace, and on either side of wide characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWrapPolicy;

impl WrapPolicy for DefaultWrapPolicy {
    fn is_wrap_boundary(
        &self,
        previous: char,
        next: char,
        classifier: &dyn CharClassifier,
    ) -> bool {
        let wide = |c: char| {
            matches!(
                classifier.classify(c),
                CharKind::DoubleWidth | CharKind::Korean
            )
        };
        (previous.is_whitespace() && !next.is_whitespace()) || wide(previous) || wide(next)
    }
}

/// What a layout unit renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    /// A single character other than tab.
    Char(char),
    /// A tab, expanded to the next tab stop.
    Tab,
    /// A fold placeholder standing for the buffer text up to `end`.
    Fold {
        /// Buffer position just past the folded text.
        end: Point,
    },
}

/// One renderable piece of a display line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Unit {
    pub kind: UnitKind,
    /// Buffer position of the unit's start (the fold start for placeholders).
    pub buffer: Point,
    /// Screen columns occupied.
    pub columns: usize,
    /// Visual width, in normal-character units.
    pub width: f64,
    /// Part of the line's leading whitespace.
    pub leading: bool,
    /// A space inside a leading soft tab, at a non tab-stop column.
    pub soft_tab_interior: bool,
}

impl Unit {
    /// The character this unit contributes to wrap decisions.
    pub fn boundary_char(&self, placeholder: char) -> char {
        match self.kind {
            UnitKind::Char(c) => c,
            UnitKind::Tab => '\t',
            UnitKind::Fold { .. } => placeholder,
        }
    }

    /// Buffer position just past this unit.
    pub fn buffer_end(&self) -> Point {
        match self.kind {
            UnitKind::Fold { end } => end,
            _ => Point::new(self.buffer.row, self.buffer.column + 1),
        }
    }

    fn is_whitespace(&self) -> bool {
        match self.kind {
            UnitKind::Char(c) => c.is_whitespace(),
            UnitKind::Tab => true,
            UnitKind::Fold { .. } => false,
        }
    }
}

/// Start of one screen row within a display line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowSpan {
    /// Index of the first unit on the row.
    pub start_unit: usize,
    /// Columns of soft-wrap indentation preceding the first unit.
    pub indent: usize,
}

/// Inputs of the wrapping pass.
pub(crate) struct WrapParams<'a> {
    pub wrap_column: usize,
    pub indent: usize,
    pub atomic_soft_tabs: bool,
    pub placeholder: char,
    pub policy: &'a dyn WrapPolicy,
    pub classifier: &'a dyn CharClassifier,
}

/// Columns of hanging indentation for continuation rows, capped so that at least one
/// column of content remains.
pub(crate) fn continuation_indent(
    leading_columns: usize,
    hanging_indent: usize,
    wrap_column: usize,
) -> usize {
    (leading_columns + hanging_indent).min(wrap_column.saturating_sub(1))
}

/// Split `units` into screen rows no wider than `params.wrap_column`.
///
/// A row breaks at the last eligible boundary at or before the limit. When the row has no
/// eligible boundary the break is forced at the overflowing unit, moved out of atomic soft
/// tabs when those are enabled. Whitespace never causes a break on its own; it hangs past
/// the limit.
pub(crate) fn wrap_units(units: &[Unit], params: &WrapParams<'_>) -> Vec<RowSpan> {
    let mut rows = vec![RowSpan {
        start_unit: 0,
        indent: 0,
    }];
    let limit = params.wrap_column as f64;
    let mut row_start = 0usize;
    let mut width = 0.0f64;
    let mut last_boundary: Option<usize> = None;
    let mut i = 0usize;

    while i < units.len() {
        let unit = &units[i];
        if i > row_start && is_eligible(units, i, params) {
            last_boundary = Some(i);
        }

        if !unit.is_whitespace() && i > row_start && width + unit.width > limit + WIDTH_EPSILON {
            let break_at = match last_boundary {
                Some(b) if b > row_start => Some(b),
                _ => forced_break(units, i, row_start, params.atomic_soft_tabs),
            };
            if let Some(break_at) = break_at {
                rows.push(RowSpan {
                    start_unit: break_at,
                    indent: params.indent,
                });
                row_start = break_at;
                width = params.indent as f64;
                last_boundary = None;
                i = break_at;
                continue;
            }
        }

        width += unit.width;
        i += 1;
    }

    rows
}

fn is_eligible(units: &[Unit], i: usize, params: &WrapParams<'_>) -> bool {
    if params.atomic_soft_tabs && units[i].soft_tab_interior {
        return false;
    }
    let previous = units[i - 1].boundary_char(params.placeholder);
    let next = units[i].boundary_char(params.placeholder);
    params
        .policy
        .is_wrap_boundary(previous, next, params.classifier)
}

fn forced_break(units: &[Unit], at: usize, row_start: usize, atomic: bool) -> Option<usize> {
    if !atomic || !units[at].soft_tab_interior {
        return Some(at);
    }
    let mut back = at;
    while back > row_start && units[back].soft_tab_interior {
        back -= 1;
    }
    if back > row_start {
        return Some(back);
    }
    let mut forward = at;
    while forward < units.len() && units[forward].soft_tab_interior {
        forward += 1;
    }
    (forward < units.len()).then_some(forward)
}
