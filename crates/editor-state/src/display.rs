//! Buffer ↔ screen coordinate translation.
//!
//! # Overview
//!
//! A [`DisplayLayer`] turns the rows of a [`Document`] into screen rows:
//!
//! ```text
//! buffer rows ──► display lines ──► screen rows
//!                 (folds join       (soft wrap splits
//!                  several rows)     one display line)
//! ```
//!
//! Folds are markers in a dedicated marker layer of the document, so they move with the
//! text and are destroyed when an edit overlaps their boundaries. A fold renders as a single
//! placeholder character, and every buffer position strictly inside it translates to the
//! fold start.
//!
//! # Incremental layout
//!
//! Layout is cached per buffer row in a *slot*: `Pending` (not laid out yet), `Hidden` (inside
//! a fold) or `Laid` (wrap points known). Edits and configuration changes only turn slots back
//! into `Pending`; actual layout happens when a translation needs a row or when the host
//! grants idle time through [`DisplayLayer::do_background_work`], which proceeds top to
//! bottom and resumes where it stopped.
//!
//! Every change to the screen layout is reported as a [`DisplayChange`]. A display line that
//! has not been laid out yet is reported as exactly one screen row; laying it out later emits
//! a follow-up change if it turns out to wrap. Applying the records in order therefore always
//! reproduces the current screen row structure.

use crate::delta::TextChange;
use crate::document::{Document, SubscriberId};
use crate::ids::{LayerId, MarkerId};
use crate::layout::{
    CharClassifier, CharWidthRatios, DEFAULT_TAB_LENGTH, DefaultWrapPolicy, RowSpan,
    UnicodeClassifier, Unit, UnitKind, WrapParams, WrapPolicy, continuation_indent, wrap_units,
};
use crate::marker::{
    InvalidationStrategy, Inclusivity, LayerOptions, MarkerOptions, invalidates, rebase_range,
};
use crate::point::{ClipDirection, Point, Range, ScreenPoint, ScreenRange};
use crate::text::{char_len, indent_columns, leading_whitespace_len, soft_tab_around};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// Placeholder rendered in place of folded text.
pub const DEFAULT_FOLD_PLACEHOLDER: char = '⋯';

/// Replacement characters for invisible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Invisibles {
    /// Shown instead of a space.
    pub space: Option<char>,
    /// Shown in the first column of an expanded tab.
    pub tab: Option<char>,
    /// Shown instead of a carriage return.
    pub cr: Option<char>,
    /// Appended after the last character of a line that ends with a newline.
    pub eol: Option<char>,
}

impl Default for Invisibles {
    fn default() -> Self {
        Self {
            space: Some('·'),
            tab: Some('»'),
            cr: Some('¤'),
            eol: Some('¬'),
        }
    }
}

/// Parameters of the coordinate translation.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    /// Columns between tab stops.
    pub tab_length: usize,
    /// Wrap rows wider than this many columns; `None` disables soft wrap.
    pub soft_wrap_column: Option<usize>,
    /// Extra indentation of continuation rows, on top of the line's own indentation.
    pub soft_wrap_hanging_indent: usize,
    /// Tag leading whitespace for indent guides.
    pub show_indent_guides: bool,
    /// Render invisible characters.
    pub invisibles: Option<Invisibles>,
    /// Treat each leading soft tab as one unbreakable unit.
    pub atomic_soft_tabs: bool,
    /// Visual widths of the character classes.
    pub char_widths: CharWidthRatios,
    /// Character shown in place of folded text.
    pub fold_placeholder: char,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tab_length: DEFAULT_TAB_LENGTH,
            soft_wrap_column: None,
            soft_wrap_hanging_indent: 0,
            show_indent_guides: false,
            invisibles: None,
            atomic_soft_tabs: true,
            char_widths: CharWidthRatios::default(),
            fold_placeholder: DEFAULT_FOLD_PLACEHOLDER,
        }
    }
}

/// One change to the screen layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayChange {
    /// Screen rows replaced, as whole rows (`end` is the first row after them).
    pub old_screen_range: ScreenRange,
    /// Screen rows now occupying the same place.
    pub new_screen_range: ScreenRange,
    /// Buffer rows the old screen rows rendered.
    pub old_buffer_range: Range,
    /// Buffer rows the new screen rows render.
    pub new_buffer_range: Range,
}

/// Semantic tag of a piece of screen line text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenTagKind {
    /// Plain buffer text.
    Text,
    /// The fold placeholder.
    Fold,
    /// A rendered invisible character (and the padding of an expanded tab).
    Invisible,
    /// One tab stop of leading whitespace, for indent guides.
    LeadingWhitespace,
    /// Indentation inserted before a continuation row.
    SoftWrapIndent,
    /// The end-of-line invisible.
    LineEnding,
}

/// A tagged run of screen line text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenTag {
    /// What the run represents.
    pub kind: ScreenTagKind,
    /// Length in characters.
    pub len: usize,
}

/// Rendered content of one screen row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLine {
    /// Screen row.
    pub screen_row: usize,
    /// Buffer row of the first character (or of the line, when empty).
    pub buffer_row: usize,
    /// Rendered text.
    pub text: String,
    /// Tags covering `text` from left to right.
    pub tags: Vec<ScreenTag>,
    /// Returns `true` for continuation rows produced by soft wrap.
    pub soft_wrapped: bool,
}

#[derive(Debug, Clone)]
struct LineLayout {
    rows: Vec<RowSpan>,
}

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Hidden,
    Laid(LineLayout),
}

impl Slot {
    fn screen_rows(&self) -> usize {
        match self {
            Slot::Pending => 1,
            Slot::Hidden => 0,
            Slot::Laid(layout) => layout.rows.len(),
        }
    }
}

#[derive(Debug, Default)]
struct LayoutState {
    slots: Vec<Slot>,
    /// `starts[r]` is the screen row of buffer row `r`; a valid prefix only.
    starts: Vec<usize>,
    /// Every row before this one is laid out or hidden.
    laid_prefix: usize,
    /// Merged, non-overlapping fold spans the slots currently reflect.
    folds: Vec<Range>,
    changes: Vec<DisplayChange>,
    dirty: Vec<(usize, usize)>,
}

/// Maps buffer coordinates to screen coordinates for one editor session.
pub struct DisplayLayer {
    fold_layer: LayerId,
    subscriber: SubscriberId,
    config: DisplayConfig,
    classifier: Rc<dyn CharClassifier>,
    wrap_policy: Rc<dyn WrapPolicy>,
    state: RefCell<LayoutState>,
}

impl fmt::Debug for DisplayLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("DisplayLayer")
            .field("fold_layer", &self.fold_layer)
            .field("config", &self.config)
            .field("rows", &state.slots.len())
            .field("laid_prefix", &state.laid_prefix)
            .finish()
    }
}

fn fold_options() -> MarkerOptions {
    MarkerOptions::exclusive(InvalidationStrategy::Overlap)
}

impl DisplayLayer {
    /// Create a translator with a fresh fold layer in `document`.
    pub fn new(document: &mut Document, config: DisplayConfig) -> Self {
        let fold_layer = document.add_marker_layer(LayerOptions {
            maintain_history: false,
            destroy_invalidated: true,
        });
        Self::attach(document, fold_layer, config)
    }

    /// Create a translator over an existing fold layer of `document`.
    pub fn attach(document: &mut Document, fold_layer: LayerId, config: DisplayConfig) -> Self {
        let subscriber = document.subscribe();
        let layer = Self {
            fold_layer,
            subscriber,
            config,
            classifier: Rc::new(UnicodeClassifier),
            wrap_policy: Rc::new(DefaultWrapPolicy),
            state: RefCell::new(LayoutState::default()),
        };
        {
            let mut state = layer.state.borrow_mut();
            state.folds = fold_spans(document, fold_layer);
            state.slots = vec![Slot::Pending; document.line_count()];
            state.starts = vec![0];
            let last = state.slots.len() - 1;
            mark_region(&mut state, 0, last);
        }
        layer
    }

    /// Replace the character classifier. Triggers a full relayout.
    pub fn set_classifier(&mut self, classifier: Rc<dyn CharClassifier>) {
        self.classifier = classifier;
        let config = self.config.clone();
        self.reset(config);
    }

    /// Replace the wrap boundary policy. Triggers a full relayout.
    pub fn set_wrap_policy(&mut self, policy: Rc<dyn WrapPolicy>) {
        self.wrap_policy = policy;
        let config = self.config.clone();
        self.reset(config);
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &dyn CharClassifier {
        self.classifier.as_ref()
    }

    /// Identity of the fold layer, which also identifies this translator when serialized.
    pub fn fold_layer(&self) -> LayerId {
        self.fold_layer
    }

    /// Current configuration.
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// A new translator over the same document with a copy of this one's folds.
    pub fn copy(&self, document: &mut Document) -> DisplayLayer {
        let fold_layer = document
            .copy_marker_layer(self.fold_layer)
            .unwrap_or_else(|| {
                document.add_marker_layer(LayerOptions {
                    maintain_history: false,
                    destroy_invalidated: true,
                })
            });
        let mut copy = Self::attach(document, fold_layer, self.config.clone());
        copy.classifier = self.classifier.clone();
        copy.wrap_policy = self.wrap_policy.clone();
        copy
    }

    /// Remove the fold layer from `document` and stop following its changes.
    pub fn destroy(&self, document: &mut Document) {
        document.destroy_marker_layer(self.fold_layer);
        document.unsubscribe(self.subscriber);
        let mut state = self.state.borrow_mut();
        state.slots.clear();
        state.starts = vec![0];
        state.changes.clear();
        state.dirty.clear();
    }

    /// Apply a new configuration atomically. Every row is laid out again lazily; one change
    /// record covering the whole screen is queued.
    pub fn reset(&mut self, config: DisplayConfig) {
        self.config = config;
        let state = self.state.get_mut();
        let rows = state.slots.len();
        if rows == 0 {
            return;
        }
        let old_total = screen_start(state, rows);
        state.starts = vec![0];
        state.laid_prefix = 0;
        mark_region(state, 0, rows - 1);
        let new_total = screen_start(state, rows);
        let buffer = Range::new((0, 0), (rows, 0));
        state.changes.push(DisplayChange {
            old_screen_range: ScreenRange::new((0, 0), (old_total, 0)),
            new_screen_range: ScreenRange::new((0, 0), (new_total, 0)),
            old_buffer_range: buffer,
            new_buffer_range: buffer,
        });
        tracing::debug!(rows, "display layer reset");
    }

    /// Account for a committed text change.
    ///
    /// Changes must be applied in the order the document committed them. The cached fold
    /// spans are rebased the same way the fold markers were; call
    /// [`DisplayLayer::refresh_folds`] afterwards to pick up folds created or destroyed
    /// explicitly.
    pub fn apply_text_change(&mut self, change: &TextChange) {
        let state = self.state.get_mut();
        if state.slots.is_empty() {
            return;
        }
        let old_folds = std::mem::take(&mut state.folds);
        state.folds = rebase_spans(&old_folds, change);
        let (first, old_last) = expand_region(
            &old_folds,
            &state.folds,
            change.old_range.start.row,
            change.old_range.end.row,
            change.row_delta(),
        );
        replace_region(state, first, old_last, change.row_delta());
    }

    /// Re-read the fold layer and relayout the rows whose folding changed.
    pub fn refresh_folds(&mut self, document: &Document) {
        let state = self.state.get_mut();
        let new_folds = fold_spans(document, self.fold_layer);
        if new_folds == state.folds || state.slots.is_empty() {
            state.folds = new_folds;
            return;
        }
        let old_folds = std::mem::replace(&mut state.folds, new_folds);

        let mut intervals: Vec<(usize, usize)> = old_folds
            .iter()
            .filter(|f| !state.folds.contains(f))
            .chain(state.folds.iter().filter(|f| !old_folds.contains(f)))
            .map(|f| expand_region(&old_folds, &state.folds, f.start.row, f.end.row, 0))
            .collect();
        intervals.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (a, b) in intervals {
            match merged.last_mut() {
                Some(last) if a <= last.1 + 1 => last.1 = last.1.max(b),
                _ => merged.push((a, b)),
            }
        }
        for (first, last) in merged {
            let last = last.min(state.slots.len() - 1);
            let (first, last) = expand_region(&old_folds, &state.folds, first, last, 0);
            replace_region(state, first, last, 0);
        }
        tracing::trace!(folds = state.folds.len(), "folds refreshed");
    }

    /// Catch up with every change `document` committed since the last call: rebase, pick up
    /// fold changes and lay out the touched regions. Returns `true` if text changed.
    pub fn update(&mut self, document: &mut Document) -> bool {
        let changes = document.take_changes(self.subscriber);
        for change in &changes {
            self.apply_text_change(change);
        }
        self.refresh_folds(document);
        self.flush(document);
        !changes.is_empty()
    }

    /// Lay out the regions touched since the last call, so that their change records are
    /// available immediately.
    pub fn flush(&mut self, document: &Document) {
        let dirty = std::mem::take(&mut self.state.get_mut().dirty);
        for (first, last) in dirty {
            for row in first..=last {
                self.lay_out_row(document, row);
            }
        }
    }

    /// Drain queued change records.
    pub fn take_changes(&mut self) -> Vec<DisplayChange> {
        std::mem::take(&mut self.state.get_mut().changes)
    }

    /// Lay out rows in order until `deadline`, processing at least one row. Returns `true`
    /// if rows remain.
    pub fn do_background_work(&mut self, document: &Document, deadline: Instant) -> bool {
        let total = self.state.get_mut().slots.len();
        let mut processed = 0usize;
        loop {
            let next = self.state.get_mut().laid_prefix;
            if next >= total {
                tracing::trace!(processed, "background layout complete");
                return false;
            }
            self.lay_out_row(document, next);
            self.state.get_mut().laid_prefix = next + 1;
            processed += 1;
            if Instant::now() >= deadline {
                return true;
            }
        }
    }

    /// Returns `true` if every row has been laid out.
    pub fn is_fully_laid_out(&self) -> bool {
        let state = self.state.borrow();
        state.laid_prefix >= state.slots.len()
    }

    // --- folds -----------------------------------------------------------------------

    /// Fold `range`. Empty ranges are ignored. The screen updates on the next
    /// [`DisplayLayer::refresh_folds`].
    pub fn fold_buffer_range(&self, document: &mut Document, range: Range) -> Option<MarkerId> {
        let range = document.clip_range(range);
        if range.is_empty() {
            return None;
        }
        document
            .marker_layer_mut(self.fold_layer)
            .map(|layer| layer.mark_range(range, fold_options()))
    }

    /// Destroy every fold touching `range` and return their ranges.
    pub fn destroy_folds_intersecting_buffer_range(
        &self,
        document: &mut Document,
        range: Range,
    ) -> Vec<Range> {
        let Some(layer) = document.marker_layer_mut(self.fold_layer) else {
            return Vec::new();
        };
        let hits: Vec<(MarkerId, Range)> = layer
            .find_intersecting(range)
            .into_iter()
            .map(|m| (m.id(), m.range()))
            .collect();
        for (id, _) in &hits {
            layer.destroy_marker(*id);
        }
        hits.into_iter().map(|(_, r)| r).collect()
    }

    /// Destroy folds whose rows include `row`.
    pub fn unfold_buffer_row(&self, document: &mut Document, row: usize) -> Vec<Range> {
        let len = document.line_length(row);
        self.destroy_folds_intersecting_buffer_range(document, Range::new((row, 0), (row, len)))
    }

    /// Destroy every fold.
    pub fn unfold_all(&self, document: &mut Document) -> usize {
        match document.marker_layer_mut(self.fold_layer) {
            Some(layer) => {
                let count = layer.len();
                layer.clear();
                count
            }
            None => 0,
        }
    }

    /// Ranges of every fold, ordered by position. Reads the document directly.
    pub fn folds(&self, document: &Document) -> Vec<Range> {
        let mut folds: Vec<Range> = document
            .marker_layer(self.fold_layer)
            .map(|layer| layer.markers().map(|m| m.range()).collect())
            .unwrap_or_default();
        folds.sort();
        folds
    }

    /// Number of folds.
    pub fn fold_count(&self, document: &Document) -> usize {
        document
            .marker_layer(self.fold_layer)
            .map_or(0, |layer| layer.len())
    }

    /// Last buffer row of the display line containing `row`.
    pub fn fold_end_row_for_buffer_row(&self, document: &Document, row: usize) -> usize {
        self.display_line_rows(document, row).1
    }

    /// Returns `true` if a fold covers any part of `row`.
    pub fn is_folded_at_buffer_row(&self, document: &Document, row: usize) -> bool {
        fold_spans(document, self.fold_layer)
            .iter()
            .any(|f| f.start.row <= row && row <= f.end.row)
    }

    /// First and last buffer rows of the display line containing `row`. Reads the document
    /// directly, so it is accurate even mid-transaction.
    pub fn display_line_rows(&self, document: &Document, row: usize) -> (usize, usize) {
        let spans = fold_spans(document, self.fold_layer);
        let start = display_start(&spans, row);
        (start, display_end(&spans, start))
    }

    /// The fold span strictly containing `point`, if any. Reads the document directly.
    pub fn fold_containing(&self, document: &Document, point: Point) -> Option<Range> {
        fold_spans(document, self.fold_layer)
            .into_iter()
            .find(|f| f.strictly_contains(point))
    }

    /// The fold span starting exactly at `point`, if any.
    pub fn fold_starting_at(&self, document: &Document, point: Point) -> Option<Range> {
        fold_spans(document, self.fold_layer)
            .into_iter()
            .find(|f| f.start == point)
    }

    /// The fold span ending exactly at `point`, if any.
    pub fn fold_ending_at(&self, document: &Document, point: Point) -> Option<Range> {
        fold_spans(document, self.fold_layer)
            .into_iter()
            .find(|f| f.end == point)
    }

    // --- translation ---------------------------------------------------------------------

    /// Number of screen rows.
    pub fn screen_line_count(&self, document: &Document) -> usize {
        let rows = self.state.borrow().slots.len();
        if rows == 0 {
            return 0;
        }
        self.ensure_laid_through(document, rows - 1);
        screen_start(&mut self.state.borrow_mut(), rows)
    }

    /// Last valid screen row.
    pub fn last_screen_row(&self, document: &Document) -> usize {
        self.screen_line_count(document).saturating_sub(1)
    }

    /// Translate a buffer position to the screen. Out-of-range input clamps; positions
    /// strictly inside a fold snap to the fold start.
    pub fn translate_to_screen(&self, document: &Document, point: Point) -> ScreenPoint {
        let mut point = document.clip_position(point);
        let folds = self.state.borrow().folds.clone();
        if let Some(fold) = folds.iter().find(|f| f.strictly_contains(point)) {
            point = fold.start;
        }
        let row = display_start(&folds, point.row);
        self.ensure_laid_through(document, row);
        let (start, layout) = {
            let mut state = self.state.borrow_mut();
            let start = screen_start(&mut state, row);
            match state.slots.get(row) {
                Some(Slot::Laid(layout)) => (start, layout.clone()),
                _ => return ScreenPoint::new(start, 0),
            }
        };
        let (units, _) = self.units(document, &folds, row);
        let u = units.partition_point(|unit| unit.buffer < point);
        let j = layout.rows.partition_point(|r| r.start_unit <= u) - 1;
        let span = layout.rows[j];
        let column = span.indent
            + units[span.start_unit..u]
                .iter()
                .map(|unit| unit.columns)
                .sum::<usize>();
        ScreenPoint::new(start + j, column)
    }

    /// Translate a screen position to the buffer. Rows past the end clamp to the end of the
    /// document; columns inside an expanded tab resolve according to `clip`; columns past the
    /// end of a wrapped row resolve to its last character (or, with
    /// [`ClipDirection::Forward`], to the start of the next row).
    pub fn translate_to_buffer(
        &self,
        document: &Document,
        screen: ScreenPoint,
        clip: ClipDirection,
    ) -> Point {
        let Some((row, j)) = self.locate_screen_row(document, screen.row) else {
            return document.max_point();
        };
        let folds = self.state.borrow().folds.clone();
        let layout = match &self.state.borrow().slots[row] {
            Slot::Laid(layout) => layout.clone(),
            _ => return Point::new(row, 0),
        };
        let (units, eol) = self.units(document, &folds, row);
        let span = layout.rows[j];
        let end = layout
            .rows
            .get(j + 1)
            .map(|r| r.start_unit)
            .unwrap_or(units.len());

        let mut column = span.indent;
        if screen.column < column && span.start_unit < end {
            return units[span.start_unit].buffer;
        }
        for unit in &units[span.start_unit..end] {
            if screen.column < column + unit.columns {
                let offset = screen.column - column;
                if offset == 0 {
                    return unit.buffer;
                }
                let forward = match clip {
                    ClipDirection::Backward => false,
                    ClipDirection::Forward => true,
                    ClipDirection::Closest => offset * 2 > unit.columns,
                };
                return if forward {
                    unit.buffer_end()
                } else {
                    unit.buffer
                };
            }
            column += unit.columns;
        }

        if j + 1 == layout.rows.len() || end == span.start_unit {
            eol
        } else if clip == ClipDirection::Forward {
            units[end].buffer
        } else {
            units[end - 1].buffer
        }
    }

    /// Translate a buffer range.
    pub fn translate_range_to_screen(&self, document: &Document, range: Range) -> ScreenRange {
        ScreenRange::new(
            self.translate_to_screen(document, range.start),
            self.translate_to_screen(document, range.end),
        )
    }

    /// Translate a screen range.
    pub fn translate_range_to_buffer(&self, document: &Document, range: ScreenRange) -> Range {
        Range::new(
            self.translate_to_buffer(document, range.start, ClipDirection::Backward),
            self.translate_to_buffer(document, range.end, ClipDirection::Forward),
        )
    }

    /// The nearest screen position a cursor may occupy.
    pub fn clip_screen_position(
        &self,
        document: &Document,
        screen: ScreenPoint,
        clip: ClipDirection,
    ) -> ScreenPoint {
        let point = self.translate_to_buffer(document, screen, clip);
        let point = self.clip_soft_tab(document, point, clip);
        self.translate_to_screen(document, point)
    }

    /// Move `point` out of the interior of a leading soft tab when atomic soft tabs are on.
    pub fn clip_soft_tab(&self, document: &Document, point: Point, clip: ClipDirection) -> Point {
        if !self.config.atomic_soft_tabs {
            return point;
        }
        let line = document.line(point.row);
        match soft_tab_around(&line, point.column, self.config.tab_length) {
            Some((start, end)) => {
                let forward = match clip {
                    ClipDirection::Backward => false,
                    ClipDirection::Forward => true,
                    ClipDirection::Closest => (point.column - start) * 2 > end - start,
                };
                Point::new(point.row, if forward { end } else { start })
            }
            None => point,
        }
    }

    /// Buffer row rendered at the start of `screen_row`.
    pub fn buffer_row_for_screen_row(&self, document: &Document, screen_row: usize) -> usize {
        self.translate_to_buffer(
            document,
            ScreenPoint::new(screen_row, 0),
            ClipDirection::Backward,
        )
        .row
    }

    /// First screen row rendering `buffer_row`.
    pub fn screen_row_for_buffer_row(&self, document: &Document, buffer_row: usize) -> usize {
        self.translate_to_screen(document, Point::new(buffer_row, 0))
            .row
    }

    /// Last screen row rendering `buffer_row`.
    pub fn last_screen_row_of_buffer_row(&self, document: &Document, buffer_row: usize) -> usize {
        let len = document.line_length(buffer_row);
        self.translate_to_screen(document, Point::new(buffer_row, len))
            .row
    }

    /// Buffer rows rendered by screen rows `start..end`.
    pub fn buffer_rows_for_screen_rows(
        &self,
        document: &Document,
        start: usize,
        end: usize,
    ) -> Vec<usize> {
        (start..end)
            .map(|row| self.buffer_row_for_screen_row(document, row))
            .collect()
    }

    /// Rendered content of `screen_row`, or `None` past the end.
    pub fn screen_line(&self, document: &Document, screen_row: usize) -> Option<ScreenLine> {
        let (row, j) = self.locate_screen_row(document, screen_row)?;
        let folds = self.state.borrow().folds.clone();
        let layout = match &self.state.borrow().slots[row] {
            Slot::Laid(layout) => layout.clone(),
            _ => return None,
        };
        let (units, eol) = self.units(document, &folds, row);
        let span = layout.rows[j];
        let end = layout
            .rows
            .get(j + 1)
            .map(|r| r.start_unit)
            .unwrap_or(units.len());

        let mut builder = LineBuilder::default();
        if span.indent > 0 {
            builder.push_str(&" ".repeat(span.indent), ScreenTagKind::SoftWrapIndent);
        }
        let invisibles = self.config.invisibles;
        let tab_length = self.config.tab_length.max(1);
        let mut column = span.indent;
        for unit in &units[span.start_unit..end] {
            let guide = unit.leading && self.config.show_indent_guides;
            match unit.kind {
                UnitKind::Char(c) => {
                    let replacement = match c {
                        ' ' => invisibles.and_then(|i| i.space),
                        '\r' => invisibles.and_then(|i| i.cr),
                        _ => None,
                    };
                    let kind = if guide {
                        ScreenTagKind::LeadingWhitespace
                    } else if replacement.is_some() {
                        ScreenTagKind::Invisible
                    } else {
                        ScreenTagKind::Text
                    };
                    let split = guide && column % tab_length == 0;
                    builder.push(replacement.unwrap_or(c), kind, split);
                }
                UnitKind::Tab => {
                    let replacement = invisibles.and_then(|i| i.tab);
                    let kind = if guide {
                        ScreenTagKind::LeadingWhitespace
                    } else if replacement.is_some() {
                        ScreenTagKind::Invisible
                    } else {
                        ScreenTagKind::Text
                    };
                    let first = replacement.unwrap_or(' ');
                    builder.push(first, kind, guide);
                    for _ in 1..unit.columns {
                        builder.push(' ', kind, false);
                    }
                }
                UnitKind::Fold { .. } => {
                    builder.push(self.config.fold_placeholder, ScreenTagKind::Fold, true);
                }
            }
            column += unit.columns;
        }
        let last_row_of_line = j + 1 == layout.rows.len();
        if last_row_of_line
            && eol.row + 1 < document.line_count()
            && let Some(eol_char) = invisibles.and_then(|i| i.eol)
        {
            builder.push(eol_char, ScreenTagKind::LineEnding, true);
        }

        let buffer_row = units
            .get(span.start_unit)
            .map(|u| u.buffer.row)
            .unwrap_or(row);
        Some(ScreenLine {
            screen_row,
            buffer_row,
            text: builder.text,
            tags: builder.tags,
            soft_wrapped: j > 0,
        })
    }

    /// Rendered content of screen rows `start..end`.
    pub fn screen_lines(&self, document: &Document, start: usize, end: usize) -> Vec<ScreenLine> {
        (start..end)
            .map_while(|row| self.screen_line(document, row))
            .collect()
    }

    // --- internals -----------------------------------------------------------------------

    fn ensure_laid_through(&self, document: &Document, row: usize) {
        loop {
            let next = {
                let state = self.state.borrow();
                if state.slots.is_empty() || state.laid_prefix > row.min(state.slots.len() - 1) {
                    return;
                }
                state.laid_prefix
            };
            self.lay_out_row(document, next);
            self.state.borrow_mut().laid_prefix = next + 1;
        }
    }

    fn locate_screen_row(&self, document: &Document, screen_row: usize) -> Option<(usize, usize)> {
        loop {
            let (row, laid) = {
                let mut state = self.state.borrow_mut();
                let rows = state.slots.len();
                while *state.starts.last()? <= screen_row && state.starts.len() <= rows {
                    let k = state.starts.len() - 1;
                    let next = state.starts[k] + state.slots[k].screen_rows();
                    state.starts.push(next);
                }
                if *state.starts.last()? <= screen_row {
                    return None;
                }
                let row = state.starts.partition_point(|&s| s <= screen_row) - 1;
                (row, state.laid_prefix > row)
            };
            if laid {
                let state = self.state.borrow();
                return Some((row, screen_row - state.starts[row]));
            }
            self.ensure_laid_through(document, row);
        }
    }

    fn lay_out_row(&self, document: &Document, row: usize) {
        let folds = {
            let state = self.state.borrow();
            match state.slots.get(row) {
                Some(Slot::Pending) => state.folds.clone(),
                _ => return,
            }
        };
        let (units, _) = self.units(document, &folds, row);
        let rows = match self.config.soft_wrap_column {
            Some(wrap_column) if wrap_column > 0 => {
                let line = document.line(row);
                let indent = continuation_indent(
                    indent_columns(&line, self.config.tab_length),
                    self.config.soft_wrap_hanging_indent,
                    wrap_column,
                );
                wrap_units(
                    &units,
                    &WrapParams {
                        wrap_column,
                        indent,
                        atomic_soft_tabs: self.config.atomic_soft_tabs,
                        placeholder: self.config.fold_placeholder,
                        policy: self.wrap_policy.as_ref(),
                        classifier: self.classifier.as_ref(),
                    },
                )
            }
            _ => vec![RowSpan {
                start_unit: 0,
                indent: 0,
            }],
        };

        let mut state = self.state.borrow_mut();
        let count = rows.len();
        let end_row = display_end(&state.folds, row);
        let start = screen_start(&mut state, row);
        state.slots[row] = Slot::Laid(LineLayout { rows });
        if count != 1 {
            state.starts.truncate(row + 1);
            let buffer = Range::new((row, 0), (end_row + 1, 0));
            state.changes.push(DisplayChange {
                old_screen_range: ScreenRange::new((start, 0), (start + 1, 0)),
                new_screen_range: ScreenRange::new((start, 0), (start + count, 0)),
                old_buffer_range: buffer,
                new_buffer_range: buffer,
            });
        }
    }

    /// Units of the display line starting at `row`, and the buffer position of its end.
    fn units(&self, document: &Document, folds: &[Range], start_row: usize) -> (Vec<Unit>, Point) {
        let tab_length = self.config.tab_length.max(1);
        let mut units = Vec::new();
        let mut screen_column = 0usize;
        let mut row = start_row;
        let mut column = 0usize;

        loop {
            let line = document.line(row);
            let chars: Vec<char> = line.chars().collect();
            let leading = if row == start_row {
                leading_whitespace_len(&line)
            } else {
                0
            };
            let here = Point::new(row, column);
            let next_fold = folds
                .get(folds.partition_point(|f| f.start < here))
                .filter(|f| f.start.row == row)
                .copied();
            let stop = next_fold
                .map(|f| f.start.column)
                .unwrap_or(chars.len())
                .min(chars.len());

            for (c, &ch) in chars.iter().enumerate().take(stop).skip(column) {
                let (kind, columns, width) = if ch == '\t' {
                    let columns = tab_length - screen_column % tab_length;
                    (UnitKind::Tab, columns, columns as f64)
                } else {
                    let width = self
                        .config
                        .char_widths
                        .width(self.classifier.classify(ch));
                    (UnitKind::Char(ch), 1, width)
                };
                let is_leading = c < leading;
                units.push(Unit {
                    kind,
                    buffer: Point::new(row, c),
                    columns,
                    width,
                    leading: is_leading,
                    soft_tab_interior: is_leading
                        && ch == ' '
                        && soft_tab_around(&line, c, tab_length).is_some(),
                });
                screen_column += columns;
            }

            match next_fold {
                Some(fold) => {
                    units.push(Unit {
                        kind: UnitKind::Fold { end: fold.end },
                        buffer: fold.start,
                        columns: 1,
                        width: 1.0,
                        leading: false,
                        soft_tab_interior: false,
                    });
                    screen_column += 1;
                    row = fold.end.row;
                    column = fold.end.column;
                }
                None => return (units, Point::new(row, char_len(&line))),
            }
        }
    }
}

#[derive(Default)]
struct LineBuilder {
    text: String,
    tags: Vec<ScreenTag>,
}

impl LineBuilder {
    fn push(&mut self, ch: char, kind: ScreenTagKind, split: bool) {
        self.text.push(ch);
        match self.tags.last_mut() {
            Some(last) if last.kind == kind && !split && kind != ScreenTagKind::Fold => {
                last.len += 1
            }
            _ => self.tags.push(ScreenTag { kind, len: 1 }),
        }
    }

    fn push_str(&mut self, s: &str, kind: ScreenTagKind) {
        self.text.push_str(s);
        self.tags.push(ScreenTag {
            kind,
            len: char_len(s),
        });
    }
}

/// Merged fold spans of `layer`, ordered by start.
fn fold_spans(document: &Document, layer: LayerId) -> Vec<Range> {
    let mut ranges: Vec<Range> = document
        .marker_layer(layer)
        .map(|l| {
            l.markers()
                .map(|m| m.range())
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();
    ranges.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    merge_spans(ranges)
}

fn merge_spans(sorted: Vec<Range>) -> Vec<Range> {
    let mut merged: Vec<Range> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start < last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

fn rebase_spans(folds: &[Range], change: &TextChange) -> Vec<Range> {
    let rebased: Vec<Range> = folds
        .iter()
        .filter(|f| !invalidates(InvalidationStrategy::Overlap, **f, change))
        .map(|f| rebase_range(*f, change, Inclusivity::Exclusive, Inclusivity::Exclusive))
        .filter(|f| !f.is_empty())
        .collect();
    merge_spans(rebased)
}

/// First buffer row of the display line containing `row`.
fn display_start(folds: &[Range], mut row: usize) -> usize {
    loop {
        let i = folds.partition_point(|f| f.end.row < row);
        match folds.get(i) {
            Some(f) if f.start.row < row => row = f.start.row,
            _ => return row,
        }
    }
}

/// Last buffer row of the display line starting at `row`.
fn display_end(folds: &[Range], mut row: usize) -> usize {
    loop {
        let i = folds.partition_point(|f| f.start.row <= row);
        match i.checked_sub(1).map(|i| folds[i]) {
            Some(f) if f.start.row == row && f.end.row > row => row = f.end.row,
            _ => return row,
        }
    }
}

/// Grow `first..=old_last` (old rows) until it is aligned to display lines both before and
/// after the change. Rows after the region map to new rows by `delta`.
fn expand_region(
    old_folds: &[Range],
    new_folds: &[Range],
    first: usize,
    old_last: usize,
    delta: isize,
) -> (usize, usize) {
    let mut first = first;
    let mut old_last = old_last;
    loop {
        let new_last = old_last.saturating_add_signed(delta);
        let f = display_start(old_folds, first).min(display_start(new_folds, first));
        let old_end = display_end(old_folds, display_start(old_folds, old_last));
        let new_end = display_end(new_folds, display_start(new_folds, new_last));
        let l = old_end.max(new_end.saturating_add_signed(-delta));
        if f == first && l == old_last {
            return (first, old_last);
        }
        first = f;
        old_last = l;
    }
}

/// Replace old rows `first..=old_last` by `old_last - first + 1 + delta` pending rows and
/// record the screen change.
fn replace_region(state: &mut LayoutState, first: usize, old_last: usize, delta: isize) {
    let old_last = old_last.min(state.slots.len() - 1);
    let start = screen_start(state, first);
    let old_count: usize = state.slots[first..=old_last]
        .iter()
        .map(Slot::screen_rows)
        .sum();
    let new_last = old_last.saturating_add_signed(delta);
    let new_rows = new_last + 1 - first;
    state
        .slots
        .splice(first..=old_last, std::iter::repeat_n(Slot::Pending, new_rows));
    state.starts.truncate(first + 1);
    state.laid_prefix = state.laid_prefix.min(first);
    mark_region(state, first, new_last);
    let new_count: usize = state.slots[first..=new_last]
        .iter()
        .map(Slot::screen_rows)
        .sum();
    state.dirty.push((first, new_last));
    state.changes.push(DisplayChange {
        old_screen_range: ScreenRange::new((start, 0), (start + old_count, 0)),
        new_screen_range: ScreenRange::new((start, 0), (start + new_count, 0)),
        old_buffer_range: Range::new((first, 0), (old_last + 1, 0)),
        new_buffer_range: Range::new((first, 0), (new_last + 1, 0)),
    });
}

/// Reset slots `first..=last` to pending display-line starts and hidden fold interiors.
fn mark_region(state: &mut LayoutState, first: usize, last: usize) {
    for row in first..=last {
        state.slots[row] = if display_start(&state.folds, row) == row {
            Slot::Pending
        } else {
            Slot::Hidden
        };
    }
}

/// Screen row at which buffer row `row` starts (`row == slots.len()` gives the total).
fn screen_start(state: &mut LayoutState, row: usize) -> usize {
    let row = row.min(state.slots.len());
    while state.starts.len() <= row {
        let k = state.starts.len() - 1;
        let next = state.starts[k] + state.slots[k].screen_rows();
        state.starts.push(next);
    }
    state.starts[row]
}
