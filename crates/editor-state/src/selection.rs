//! Selections and the edits they perform.
//!
//! A [`Selection`] is a marker in the session's selection layer plus a [`Cursor`] at its
//! head. Edits run through an [`EditContext`], which borrows the document, the display layer
//! and the session's collaborators for the duration of one transaction. Because every
//! selection marker lives in the same layer, each edit rebases the other selections
//! automatically; row-oriented operations (line moves, duplication, comment toggling) first
//! collapse the selections into disjoint row blocks.
//!
//! After any batch of changes the session runs [`merge_ranges`] so that no two selections
//! overlap.

use crate::clipboard::ClipboardEntry;
use crate::config::SessionConfig;
use crate::cursor::{Cursor, Motion, Navigator};
use crate::display::DisplayLayer;
use crate::document::Document;
use crate::error::Result;
use crate::ids::{LayerId, MarkerId, SelectionId};
use crate::indent::IndentPolicy;
use crate::marker::{InvalidationStrategy, Marker, MarkerOptions};
use crate::point::{ClipDirection, Point, Range, ScreenPoint};
use crate::text::{
    char_len, indent_columns, indent_string, is_blank, leading_whitespace_len, slice_columns,
    split_lines,
};
use editor_state_lang::LanguageConfig;

/// Options of a selection marker: exclusive on both ends, never invalidated.
pub(crate) fn selection_marker_options() -> MarkerOptions {
    MarkerOptions::exclusive(InvalidationStrategy::Never)
}

/// One selection of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Identity within the session.
    pub id: SelectionId,
    /// Creation order; the lowest one survives a merge.
    pub seq: u64,
    /// Cursor at the head of the selection.
    pub cursor: Cursor,
}

impl Selection {
    /// Marker backing this selection.
    pub fn marker(&self) -> MarkerId {
        self.cursor.marker
    }
}

/// Options of [`EditContext::insert_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOptions {
    /// Indent a lone newline through the indent policy.
    pub auto_indent: bool,
    /// Leave the inserted text selected.
    pub select: bool,
    /// Allow the edit on a read-only session.
    pub bypass_read_only: bool,
}

/// Input of [`merge_ranges`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeCandidate {
    /// Selection identity.
    pub id: SelectionId,
    /// Creation order.
    pub seq: u64,
    /// Current range.
    pub range: Range,
}

/// A set of selections that collapsed into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup {
    /// The selection that stays: the oldest of the group.
    pub survivor: SelectionId,
    /// Union of every member's range.
    pub range: Range,
    /// Selections to destroy.
    pub absorbed: Vec<SelectionId>,
}

/// Merge overlapping ranges.
///
/// Two ranges merge when the later one starts strictly before the earlier one ends, or when
/// they touch and one of them is empty. Equal empty ranges merge only if `merge_empty` is
/// set. Non-empty ranges that merely touch stay apart. The result is ordered by position and
/// does not depend on input order.
pub fn merge_ranges(mut candidates: Vec<MergeCandidate>, merge_empty: bool) -> Vec<MergeGroup> {
    candidates.sort_by_key(|c| (c.range.start, c.range.end, c.seq));
    let mut groups: Vec<(u64, MergeGroup)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some((seq, group)) = groups.last_mut() {
            let merge = if candidate.range == group.range {
                !candidate.range.is_empty() || merge_empty
            } else {
                candidate.range.start < group.range.end
                    || (candidate.range.start == group.range.end
                        && (candidate.range.is_empty() || group.range.is_empty()))
            };
            if merge {
                group.range = group.range.union(&candidate.range);
                if candidate.seq < *seq {
                    group.absorbed.push(group.survivor);
                    group.survivor = candidate.id;
                    *seq = candidate.seq;
                } else {
                    group.absorbed.push(candidate.id);
                }
                continue;
            }
        }
        groups.push((
            candidate.seq,
            MergeGroup {
                survivor: candidate.id,
                range: candidate.range,
                absorbed: Vec::new(),
            },
        ));
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

/// Rows a range covers for line-oriented commands. A multi-row range ending at column 0
/// does not include its last row.
fn selected_rows(range: Range) -> (usize, usize) {
    if range.end.row > range.start.row && range.end.column == 0 {
        (range.start.row, range.end.row - 1)
    } else {
        range.rows()
    }
}

fn merge_blocks(mut blocks: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    blocks.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(blocks.len());
    for (start, end) in blocks {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Visual column of char column `column` in `line`, with tabs expanded.
fn expanded_column(line: &str, column: usize, tab_length: usize) -> usize {
    let tab_length = tab_length.max(1);
    line.chars().take(column).fold(0, |acc, ch| {
        if ch == '\t' {
            acc + tab_length - acc % tab_length
        } else {
            acc + 1
        }
    })
}

/// Everything one batch of selection edits needs, borrowed from the session.
pub struct EditContext<'a> {
    pub(crate) document: &'a mut Document,
    pub(crate) display: &'a mut DisplayLayer,
    pub(crate) layer: LayerId,
    pub(crate) config: &'a SessionConfig,
    pub(crate) language: &'a LanguageConfig,
    pub(crate) indent: &'a dyn IndentPolicy,
}

impl<'a> EditContext<'a> {
    /// The document being edited.
    pub fn document(&self) -> &Document {
        self.document
    }

    fn marker(&self, selection: &Selection) -> Option<&Marker> {
        self.document
            .marker_layer(self.layer)?
            .get(selection.marker())
    }

    /// Current range of `selection`.
    pub fn range(&self, selection: &Selection) -> Range {
        self.marker(selection)
            .map_or(Range::empty(Point::ZERO), |m| m.range())
    }

    /// Whether the head of `selection` precedes its tail.
    pub fn is_reversed(&self, selection: &Selection) -> bool {
        self.marker(selection).is_some_and(|m| m.is_reversed())
    }

    /// Cursor position of `selection`.
    pub fn head(&self, selection: &Selection) -> Point {
        self.marker(selection).map_or(Point::ZERO, |m| m.head())
    }

    fn tail(&self, selection: &Selection) -> Point {
        self.marker(selection).map_or(Point::ZERO, |m| m.tail())
    }

    /// Text covered by `selection`.
    pub fn text(&self, selection: &Selection) -> String {
        self.document.text_in_range(self.range(selection))
    }

    /// Move `selection` to `range`, clipped to the document.
    pub fn set_range(&mut self, selection: &Selection, range: Range, reversed: bool) {
        let range = self.document.clip_range(range);
        if let Some(layer) = self.document.marker_layer_mut(self.layer) {
            layer.set_range(selection.marker(), range, reversed);
        }
    }

    fn set_cursor(&mut self, selection: &Selection, point: Point) {
        self.set_range(selection, Range::empty(point), false);
    }

    fn sync(&mut self) {
        self.display.update(self.document);
    }

    /// A navigator over the current layout.
    fn navigator(&mut self) -> Navigator<'_> {
        self.sync();
        Navigator::new(
            self.document,
            self.display,
            &self.config.non_word_characters,
        )
    }

    fn replace(&mut self, range: Range, text: &str) -> Result<Range> {
        self.document.set_text_in_range(range, text)
    }

    fn lines_text(&self, start: usize, end: usize) -> String {
        self.document.text_in_range(Range::new(
            (start, 0),
            (end, self.document.line_length(end)),
        ))
    }

    fn set_indentation(&mut self, row: usize, columns: usize) -> Result<()> {
        let line = self.document.line(row);
        let leading = leading_whitespace_len(&line);
        let indent = indent_string(columns, self.config.soft_tabs, self.config.tab_length);
        if slice_columns(&line, 0, leading) != indent {
            self.replace(Range::new((row, 0), (row, leading)), &indent)?;
        }
        Ok(())
    }

    /// Disjoint, fold-aware row blocks covered by `selections`, top to bottom. Adjacent
    /// blocks are joined.
    pub fn row_blocks<'s>(
        &self,
        selections: impl IntoIterator<Item = &'s Selection>,
    ) -> Vec<(usize, usize)> {
        let blocks = selections
            .into_iter()
            .map(|selection| {
                let (start, end) = selected_rows(self.range(selection));
                let (first, _) = self.display.display_line_rows(self.document, start);
                let (_, last) = self.display.display_line_rows(self.document, end);
                (first, last)
            })
            .collect();
        merge_blocks(blocks)
    }

    // --- cursor motion and selection shaping -----------------------------------------

    /// Move the cursor of `selection`, collapsing it.
    ///
    /// Horizontal motion out of a non-empty selection lands on the corresponding boundary;
    /// vertical motion starts from it.
    pub fn move_cursor(&mut self, selection: &mut Selection, motion: Motion, count: usize) {
        let range = self.range(selection);
        let head = self.head(selection);
        let goal = selection.cursor.goal_column;
        let (target, goal) = match motion {
            Motion::Left if !range.is_empty() => (range.start, None),
            Motion::Right if !range.is_empty() => (range.end, None),
            _ => {
                let from = match motion {
                    Motion::Up | Motion::PageUp(_) if !range.is_empty() => range.start,
                    Motion::Down | Motion::PageDown(_) if !range.is_empty() => range.end,
                    _ => head,
                };
                self.navigator().apply(motion, from, goal, count)
            }
        };
        self.set_cursor(selection, target);
        selection.cursor.goal_column = goal;
    }

    /// Move the head of `selection`, keeping its tail.
    pub fn select_to(&mut self, selection: &mut Selection, motion: Motion, count: usize) {
        let head = self.head(selection);
        let tail = self.tail(selection);
        let goal = selection.cursor.goal_column;
        let (target, goal) = self.navigator().apply(motion, head, goal, count);
        self.set_range(selection, Range::new(tail, target), target < tail);
        selection.cursor.goal_column = goal;
    }

    /// Select the word under the cursor.
    pub fn select_word(&mut self, selection: &mut Selection) {
        let head = self.head(selection);
        let word = self.navigator().current_word_range(head);
        self.set_range(selection, word, false);
        selection.cursor.goal_column = None;
    }

    /// Extend `selection` to whole rows, including the trailing newline.
    pub fn select_line(&mut self, selection: &mut Selection) {
        let (start, end) = selected_rows(self.range(selection));
        let end = if end + 1 < self.document.line_count() {
            Point::new(end + 1, 0)
        } else {
            self.document.max_point()
        };
        self.set_range(selection, Range::new((start, 0), end), false);
        selection.cursor.goal_column = None;
    }

    /// Collapse `selection` onto its head.
    pub fn clear(&mut self, selection: &mut Selection) {
        let head = self.head(selection);
        self.set_cursor(selection, head);
    }

    /// The range a selection added above or below `selection` would cover, searching past
    /// rows too short to hold a non-empty selection.
    pub fn range_beside(&mut self, selection: &Selection, below: bool) -> Option<Range> {
        self.sync();
        let range = self.range(selection);
        let document: &Document = self.document;
        let display: &DisplayLayer = self.display;
        let start = display.translate_to_screen(document, range.start);
        let end = display.translate_to_screen(document, range.end);
        let span = end.row - start.row;
        let (start_column, end_column) = if range.is_empty() {
            let column = selection.cursor.goal_column.unwrap_or(start.column);
            (column, column)
        } else {
            (start.column, end.column)
        };
        let last = display.last_screen_row(document);
        let mut delta = 0;
        loop {
            delta += 1;
            let (first_row, last_row) = if below {
                let first = end.row + delta;
                (first, first + span)
            } else {
                let last_row = start.row.checked_sub(delta)?;
                (last_row.checked_sub(span)?, last_row)
            };
            if last_row > last {
                return None;
            }
            let a = display.translate_to_buffer(
                document,
                ScreenPoint::new(first_row, start_column),
                ClipDirection::Closest,
            );
            if range.is_empty() {
                return Some(Range::empty(a));
            }
            let b = display.translate_to_buffer(
                document,
                ScreenPoint::new(last_row, end_column),
                ClipDirection::Closest,
            );
            let fits = display.translate_to_screen(document, a).column == start_column
                && display.translate_to_screen(document, b).column == end_column;
            if fits && a < b {
                return Some(Range::new(a, b));
            }
        }
    }

    // --- text entry ------------------------------------------------------------------

    /// Replace the selection with `text`. Returns the range of the inserted text.
    pub fn insert_text(
        &mut self,
        selection: &mut Selection,
        text: &str,
        options: InsertOptions,
    ) -> Result<Range> {
        let range = self.range(selection);
        let inserted = if options.auto_indent && self.config.auto_indent && text == "\n" {
            let inserted = self.replace(range, "\n")?;
            let row = inserted.end.row;
            let columns = self
                .indent
                .suggested_indent(self.document, row, self.config.tab_length);
            self.set_indentation(row, columns)?;
            let column = leading_whitespace_len(&self.document.line(row));
            Range::new(inserted.start, (row, column))
        } else {
            self.replace(range, text)?
        };
        if options.select {
            self.set_range(selection, inserted, false);
        }
        selection.cursor.goal_column = None;
        Ok(inserted)
    }

    /// Insert a line break, indenting the new row.
    pub fn insert_newline(&mut self, selection: &mut Selection) -> Result<Range> {
        let options = InsertOptions {
            auto_indent: true,
            ..InsertOptions::default()
        };
        self.insert_text(selection, "\n", options)
    }

    /// Shift pasted continuation lines so that the shallowest one lines up with the row
    /// being pasted into. Text pasted after non-whitespace is left alone.
    fn normalize_paste_indent(&self, at: Point, text: &str) -> String {
        let lines = split_lines(text);
        if lines.len() < 2 {
            return text.to_string();
        }
        let line = self.document.line(at.row);
        let prefix = slice_columns(&line, 0, at.column);
        if !is_blank(prefix) {
            return text.to_string();
        }
        let tab_length = self.config.tab_length;
        let target =
            indent_columns(&line, tab_length).min(expanded_column(&line, at.column, tab_length));
        let Some(shallowest) = lines[1..]
            .iter()
            .filter(|l| !is_blank(l))
            .map(|l| indent_columns(l, tab_length))
            .min()
        else {
            return text.to_string();
        };
        let mut out = String::with_capacity(text.len());
        out.push_str(lines[0]);
        for l in &lines[1..] {
            out.push('\n');
            if is_blank(l) {
                continue;
            }
            let columns = indent_columns(l, tab_length) - shallowest + target;
            out.push_str(&indent_string(columns, self.config.soft_tabs, tab_length));
            out.push_str(l.trim_start_matches([' ', '\t']));
        }
        out
    }

    // --- deletion --------------------------------------------------------------------

    /// Delete the selection, or if it is empty, the text between the cursor and the target
    /// of `motion`.
    fn delete_with_motion(&mut self, selection: &mut Selection, motion: Motion) -> Result<()> {
        let range = self.range(selection);
        let range = if range.is_empty() {
            let (target, _) = self.navigator().apply(motion, range.start, None, 1);
            Range::new(range.start, target)
        } else {
            range
        };
        if !range.is_empty() {
            self.replace(range, "")?;
        }
        selection.cursor.goal_column = None;
        Ok(())
    }

    /// Delete the selection or the character after the cursor.
    pub fn delete(&mut self, selection: &mut Selection) -> Result<()> {
        self.delete_with_motion(selection, Motion::Right)
    }

    /// Delete the selection or the character before the cursor. Does nothing at the start
    /// of the document.
    pub fn backspace(&mut self, selection: &mut Selection) -> Result<()> {
        self.delete_with_motion(selection, Motion::Left)
    }

    /// Delete back to the beginning of the word.
    pub fn delete_to_beginning_of_word(&mut self, selection: &mut Selection) -> Result<()> {
        self.delete_with_motion(selection, Motion::BeginningOfWord)
    }

    /// Delete forward to the end of the word.
    pub fn delete_to_end_of_word(&mut self, selection: &mut Selection) -> Result<()> {
        self.delete_with_motion(selection, Motion::EndOfWord)
    }

    /// Delete back to column 0; at column 0 join with the previous row.
    pub fn delete_to_beginning_of_line(&mut self, selection: &mut Selection) -> Result<()> {
        let head = self.head(selection);
        let motion = if head.column == 0 {
            Motion::Left
        } else {
            Motion::BeginningOfLine
        };
        self.delete_with_motion(selection, motion)
    }

    /// Delete to the end of the row; at the end join with the next row.
    pub fn delete_to_end_of_line(&mut self, selection: &mut Selection) -> Result<()> {
        let head = self.head(selection);
        let motion = if head.column >= self.document.line_length(head.row) {
            Motion::Right
        } else {
            Motion::EndOfLine
        };
        self.delete_with_motion(selection, motion)
    }

    /// Delete every row touched by `selections`. Cursors keep their column where the
    /// following row allows it.
    pub fn delete_lines(&mut self, selections: &mut [Selection]) -> Result<()> {
        let columns: Vec<usize> = selections.iter().map(|s| self.head(s).column).collect();
        let blocks = self.row_blocks(selections.iter());
        for (start, end) in blocks.into_iter().rev() {
            let last_row = self.document.line_count() - 1;
            let range = if end < last_row {
                Range::new((start, 0), (end + 1, 0))
            } else if start > 0 {
                Range::new(
                    (start - 1, self.document.line_length(start - 1)),
                    self.document.max_point(),
                )
            } else {
                Range::new(Point::ZERO, self.document.max_point())
            };
            self.replace(range, "")?;
        }
        for (selection, column) in selections.iter_mut().zip(columns) {
            let row = self.head(selection).row;
            let column = column.min(self.document.line_length(row));
            self.set_cursor(selection, Point::new(row, column));
            selection.cursor.goal_column = None;
        }
        Ok(())
    }

    // --- indentation -----------------------------------------------------------------

    fn indent_unit(&self) -> String {
        if self.config.soft_tabs {
            " ".repeat(self.config.tab_length.max(1))
        } else {
            "\t".to_string()
        }
    }

    /// Indent: empty selections insert whitespace up to the next tab stop; non-empty ones
    /// indent each non-blank row they touch by one unit.
    pub fn indent(&mut self, selections: &mut [Selection]) -> Result<()> {
        let tab_length = self.config.tab_length.max(1);
        let starts: Vec<Range> = selections.iter().map(|s| self.range(s)).collect();
        for selection in selections.iter_mut() {
            let range = self.range(selection);
            if !range.is_empty() {
                continue;
            }
            let text = if self.config.soft_tabs {
                let line = self.document.line(range.start.row);
                let column = expanded_column(&line, range.start.column, tab_length);
                " ".repeat(tab_length - column % tab_length)
            } else {
                "\t".to_string()
            };
            self.replace(range, &text)?;
            selection.cursor.goal_column = None;
        }

        let unit = self.indent_unit();
        let blocks = self.row_blocks(
            selections
                .iter()
                .zip(&starts)
                .filter(|(_, range)| !range.is_empty())
                .map(|(s, _)| s),
        );
        for (start, end) in blocks {
            for row in start..=end {
                if !is_blank(&self.document.line(row)) {
                    self.replace(Range::empty(Point::new(row, 0)), &unit)?;
                }
            }
        }
        // Selections that started at column 0 keep starting there.
        for (selection, before) in selections.iter().zip(starts) {
            if before.is_empty() || before.start.column != 0 {
                continue;
            }
            let range = self.range(selection);
            let reversed = self.is_reversed(selection);
            self.set_range(
                selection,
                Range::new((range.start.row, 0), range.end),
                reversed,
            );
        }
        Ok(())
    }

    /// Remove one indentation unit from every row touched by `selections`.
    pub fn outdent(&mut self, selections: &[Selection]) -> Result<()> {
        let tab_length = self.config.tab_length.max(1);
        for (start, end) in self.row_blocks(selections) {
            for row in start..=end {
                let line = self.document.line(row);
                let width = if line.starts_with('\t') {
                    1
                } else {
                    line.chars().take(tab_length).take_while(|c| *c == ' ').count()
                };
                if width > 0 {
                    self.replace(Range::new((row, 0), (row, width)), "")?;
                }
            }
        }
        Ok(())
    }

    /// Re-indent every non-blank row touched by `selections` through the indent policy.
    pub fn auto_indent_selected_rows(&mut self, selections: &[Selection]) -> Result<()> {
        for (start, end) in self.row_blocks(selections) {
            for row in start..=end {
                if is_blank(&self.document.line(row)) {
                    continue;
                }
                let columns =
                    self.indent
                        .suggested_indent(self.document, row, self.config.tab_length);
                self.set_indentation(row, columns)?;
            }
        }
        Ok(())
    }

    // --- case ------------------------------------------------------------------------

    /// Upper- or lower-case the selection, or the word under an empty cursor.
    pub fn change_case(&mut self, selection: &mut Selection, upper: bool) -> Result<()> {
        let range = self.range(selection);
        let reversed = self.is_reversed(selection);
        let target = if range.is_empty() {
            self.navigator().current_word_range(range.start)
        } else {
            range
        };
        if target.is_empty() {
            return Ok(());
        }
        let text = self.document.text_in_range(target);
        let changed = if upper {
            text.to_uppercase()
        } else {
            text.to_lowercase()
        };
        if changed == text {
            return Ok(());
        }
        let inserted = self.replace(target, &changed)?;
        if range.is_empty() {
            self.set_cursor(selection, range.start);
        } else {
            self.set_range(selection, inserted, reversed);
        }
        Ok(())
    }

    // --- line operations -------------------------------------------------------------

    fn ranges_in_rows(
        &self,
        selections: &[Selection],
        start: usize,
        end: usize,
    ) -> Vec<(usize, Range, bool)> {
        selections
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let range = self.range(s);
                (range.start.row >= start && range.end.row <= end)
                    .then(|| (i, range, self.is_reversed(s)))
            })
            .collect()
    }

    /// Swap each row block with the display line above it. Folds move with their text. Does
    /// nothing if any block starts at row 0.
    pub fn move_lines_up(&mut self, selections: &[Selection]) -> Result<()> {
        let blocks = self.row_blocks(selections);
        if blocks.first().is_some_and(|b| b.0 == 0) {
            return Ok(());
        }
        for (start, end) in blocks {
            let (above, _) = self.display.display_line_rows(self.document, start - 1);
            let shift = (start - above) as isize;
            let block_len = (end - start + 1) as isize;
            let region = Range::new((above, 0), (end, self.document.line_length(end)));

            let moved = self.ranges_in_rows(selections, start, end);
            let folds = self
                .display
                .destroy_folds_intersecting_buffer_range(self.document, region);
            let text = format!(
                "{}\n{}",
                self.lines_text(start, end),
                self.lines_text(above, start - 1)
            );
            self.replace(region, &text)?;

            for (i, range, reversed) in moved {
                self.set_range(&selections[i], range.translate_rows(-shift), reversed);
            }
            for fold in folds {
                let delta = if fold.start.row >= start { -shift } else { block_len };
                self.display
                    .fold_buffer_range(self.document, fold.translate_rows(delta));
            }
        }
        Ok(())
    }

    /// Swap each row block with the display line below it. Folds move with their text.
    /// Does nothing if any block ends at the last row.
    pub fn move_lines_down(&mut self, selections: &[Selection]) -> Result<()> {
        let blocks = self.row_blocks(selections);
        let last_row = self.document.line_count() - 1;
        if blocks.last().is_some_and(|b| b.1 >= last_row) {
            return Ok(());
        }
        for (start, end) in blocks.into_iter().rev() {
            let (_, below) = self.display.display_line_rows(self.document, end + 1);
            let shift = (below - end) as isize;
            let block_len = (end - start + 1) as isize;
            let region = Range::new((start, 0), (below, self.document.line_length(below)));

            let moved = self.ranges_in_rows(selections, start, end);
            let folds = self
                .display
                .destroy_folds_intersecting_buffer_range(self.document, region);
            let text = format!(
                "{}\n{}",
                self.lines_text(end + 1, below),
                self.lines_text(start, end)
            );
            self.replace(region, &text)?;

            for (i, range, reversed) in moved {
                self.set_range(&selections[i], range.translate_rows(shift), reversed);
            }
            for fold in folds {
                let delta = if fold.start.row > end { -block_len } else { shift };
                self.display
                    .fold_buffer_range(self.document, fold.translate_rows(delta));
            }
        }
        Ok(())
    }

    /// Duplicate each row block below itself; selections move onto the copy.
    pub fn duplicate_lines(&mut self, selections: &[Selection]) -> Result<()> {
        for (start, end) in self.row_blocks(selections).into_iter().rev() {
            let moved = self.ranges_in_rows(selections, start, end);
            let text = format!("\n{}", self.lines_text(start, end));
            let at = Point::new(end, self.document.line_length(end));
            self.replace(Range::empty(at), &text)?;
            let block_len = (end - start + 1) as isize;
            for (i, range, reversed) in moved {
                self.set_range(&selections[i], range.translate_rows(block_len), reversed);
            }
        }
        Ok(())
    }

    /// Join the rows of the selection (or the cursor row and the next one), separating
    /// their content with one space.
    pub fn join_lines(&mut self, selection: &mut Selection) -> Result<()> {
        let range = self.range(selection);
        let reversed = self.is_reversed(selection);
        let last = self.document.line_count() - 1;
        let (start, end) = range.rows();
        let end = end.max(start + 1).min(last);
        if start >= end {
            return Ok(());
        }
        let mut join_point = None;
        for _ in start..end {
            let line = self.document.line(start);
            let next = self.document.line(start + 1);
            let kept = char_len(line.trim_end());
            let next_leading = leading_whitespace_len(&next);
            let separator = if kept == 0 || next_leading == char_len(&next) {
                ""
            } else {
                " "
            };
            self.replace(
                Range::new((start, kept), (start + 1, next_leading)),
                separator,
            )?;
            join_point = Some(Point::new(start, kept));
        }
        if range.is_empty() {
            if let Some(point) = join_point {
                self.set_cursor(selection, point);
            }
        } else {
            let end = Point::new(start, self.document.line_length(start));
            self.set_range(selection, Range::new(range.start, end), reversed);
        }
        selection.cursor.goal_column = None;
        Ok(())
    }

    /// Comment or uncomment every row block with the language's comment tokens. Line
    /// tokens are preferred; block tokens wrap the whole block.
    pub fn toggle_line_comments(&mut self, selections: &[Selection]) -> Result<()> {
        let comments = self.language.comments.clone();
        let line_token = comments.line_token().map(str::to_string);
        let block_tokens = comments
            .block_tokens()
            .map(|(open, close)| (open.to_string(), close.to_string()));
        for (start, end) in self.row_blocks(selections).into_iter().rev() {
            if let Some(token) = &line_token {
                self.toggle_line_token(start, end, token)?;
            } else if let Some((open, close)) = &block_tokens {
                self.toggle_block_tokens(start, end, open, close)?;
            }
        }
        Ok(())
    }

    fn toggle_line_token(&mut self, start: usize, end: usize, token: &str) -> Result<()> {
        let rows: Vec<usize> = (start..=end)
            .filter(|r| !is_blank(&self.document.line(*r)))
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        let commented = rows
            .iter()
            .all(|r| self.document.line(*r).trim_start().starts_with(token));
        let token_len = char_len(token);
        if commented {
            for row in rows {
                let line = self.document.line(row);
                let leading = leading_whitespace_len(&line);
                let after = slice_columns(&line, leading + token_len, leading + token_len + 1);
                let width = token_len + usize::from(after == " ");
                self.replace(Range::new((row, leading), (row, leading + width)), "")?;
            }
        } else {
            let column = rows
                .iter()
                .map(|r| leading_whitespace_len(&self.document.line(*r)))
                .min()
                .unwrap_or(0);
            let text = format!("{token} ");
            for row in rows {
                self.replace(Range::empty(Point::new(row, column)), &text)?;
            }
        }
        Ok(())
    }

    fn toggle_block_tokens(
        &mut self,
        start: usize,
        end: usize,
        open: &str,
        close: &str,
    ) -> Result<()> {
        let first = self.document.line(start);
        let last = self.document.line(end);
        let leading = leading_whitespace_len(&first);
        let (open_len, close_len) = (char_len(open), char_len(close));
        let last_len = char_len(last.trim_end());
        let wrapped = first.trim_start().starts_with(open)
            && last.trim_end().ends_with(close)
            && (start != end || last_len >= leading + open_len + close_len);

        if !wrapped {
            if is_blank(&first) && start == end {
                return Ok(());
            }
            self.replace(Range::empty(Point::new(end, last_len)), &format!(" {close}"))?;
            self.replace(Range::empty(Point::new(start, leading)), &format!("{open} "))?;
            return Ok(());
        }

        let mut close_start = last_len - close_len;
        let floor = if start == end { leading + open_len } else { 0 };
        if close_start > floor && slice_columns(&last, close_start - 1, close_start) == " " {
            close_start -= 1;
        }
        self.replace(Range::new((end, close_start), (end, last_len)), "")?;

        let first = self.document.line(start);
        let mut open_end = leading + open_len;
        if slice_columns(&first, open_end, open_end + 1) == " " {
            open_end += 1;
        }
        self.replace(Range::new((start, leading), (start, open_end)), "")?;
        Ok(())
    }

    // --- clipboard -------------------------------------------------------------------

    /// The clipboard entry for `selections`. When every selection is empty, whole rows are
    /// copied instead.
    pub fn clipboard_entry(&self, selections: &[Selection]) -> ClipboardEntry {
        let full_line = selections.iter().all(|s| self.range(s).is_empty());
        let pieces: Vec<String> = selections
            .iter()
            .map(|s| {
                let range = self.range(s);
                if full_line {
                    format!("{}\n", self.document.line(range.start.row))
                } else {
                    self.document.text_in_range(range)
                }
            })
            .collect();
        ClipboardEntry {
            text: if full_line {
                pieces.concat()
            } else {
                pieces.join("\n")
            },
            selections: pieces,
            full_line,
        }
    }

    /// Delete what [`EditContext::clipboard_entry`] would copy.
    pub fn cut(&mut self, selections: &mut [Selection]) -> Result<ClipboardEntry> {
        let entry = self.clipboard_entry(selections);
        if entry.full_line {
            self.delete_lines(selections)?;
        } else {
            for selection in selections.iter_mut() {
                let range = self.range(selection);
                if !range.is_empty() {
                    self.replace(range, "")?;
                }
                selection.cursor.goal_column = None;
            }
        }
        Ok(entry)
    }

    /// Paste `entry`. With as many selections as copied pieces, each selection receives
    /// its own piece. Whole-row entries pasted at an empty cursor go above the cursor row.
    pub fn paste(&mut self, selections: &mut [Selection], entry: &ClipboardEntry) -> Result<()> {
        let distribute = selections.len() > 1 && entry.selections.len() == selections.len();
        for (i, selection) in selections.iter_mut().enumerate() {
            let text = if distribute {
                entry.selections[i].as_str()
            } else {
                entry.text.as_str()
            };
            let range = self.range(selection);
            if entry.full_line && range.is_empty() {
                let mut text = text.to_string();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                self.replace(Range::empty(Point::new(range.start.row, 0)), &text)?;
            } else {
                let text = if self.config.auto_indent_on_paste {
                    self.normalize_paste_indent(range.start, text)
                } else {
                    text.to_string()
                };
                self.replace(range, &text)?;
            }
            selection.cursor.goal_column = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u64, seq: u64, a: (usize, usize), b: (usize, usize)) -> MergeCandidate {
        MergeCandidate {
            id: SelectionId(id),
            seq,
            range: Range::new(a, b),
        }
    }

    #[test]
    fn test_merge_overlapping_keeps_oldest() {
        let groups = merge_ranges(
            vec![
                candidate(2, 5, (0, 3), (0, 8)),
                candidate(1, 1, (0, 0), (0, 5)),
                candidate(3, 2, (1, 0), (1, 2)),
            ],
            true,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].survivor, SelectionId(1));
        assert_eq!(groups[0].range, Range::new((0, 0), (0, 8)));
        assert_eq!(groups[0].absorbed, vec![SelectionId(2)]);
        assert!(groups[1].absorbed.is_empty());
    }

    #[test]
    fn test_touching_ranges_stay_apart() {
        let groups = merge_ranges(
            vec![
                candidate(1, 1, (0, 0), (0, 2)),
                candidate(2, 2, (0, 2), (0, 4)),
                candidate(3, 3, (0, 6), (0, 6)),
            ],
            true,
        );
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_cursor_on_selection_boundary_merges() {
        let at_end = merge_ranges(
            vec![
                candidate(1, 2, (0, 0), (0, 5)),
                candidate(2, 1, (0, 5), (0, 5)),
            ],
            true,
        );
        assert_eq!(at_end.len(), 1);
        assert_eq!(at_end[0].survivor, SelectionId(2));
        assert_eq!(at_end[0].range, Range::new((0, 0), (0, 5)));

        let at_start = merge_ranges(
            vec![
                candidate(1, 1, (0, 0), (0, 5)),
                candidate(2, 2, (0, 0), (0, 0)),
            ],
            false,
        );
        assert_eq!(at_start.len(), 1);
        assert_eq!(at_start[0].absorbed, vec![SelectionId(2)]);

        let between = merge_ranges(
            vec![
                candidate(1, 1, (0, 0), (0, 3)),
                candidate(2, 2, (0, 3), (0, 3)),
                candidate(3, 3, (0, 3), (0, 6)),
            ],
            true,
        );
        assert_eq!(between.len(), 2);
        assert_eq!(between[0].range, Range::new((0, 0), (0, 3)));
        assert_eq!(between[1].range, Range::new((0, 3), (0, 6)));
    }

    #[test]
    fn test_coinciding_empty_ranges_follow_policy() {
        let input = vec![
            candidate(1, 3, (2, 1), (2, 1)),
            candidate(2, 1, (2, 1), (2, 1)),
        ];
        let merged = merge_ranges(input.clone(), true);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].survivor, SelectionId(2));
        assert_eq!(merge_ranges(input, false).len(), 2);
    }

    #[test]
    fn test_merge_is_order_independent_and_idempotent() {
        let mut input = vec![
            candidate(1, 1, (0, 4), (0, 9)),
            candidate(2, 2, (0, 1), (0, 5)),
            candidate(3, 3, (0, 8), (1, 0)),
            candidate(4, 4, (3, 0), (3, 0)),
        ];
        let forward = merge_ranges(input.clone(), true);
        input.reverse();
        assert_eq!(merge_ranges(input, true), forward);
        assert_eq!(forward[0].range, Range::new((0, 1), (1, 0)));

        let again: Vec<MergeCandidate> = forward
            .iter()
            .enumerate()
            .map(|(i, g)| MergeCandidate {
                id: g.survivor,
                seq: i as u64,
                range: g.range,
            })
            .collect();
        let twice = merge_ranges(again, true);
        assert!(twice.iter().all(|g| g.absorbed.is_empty()));
        assert_eq!(twice.len(), forward.len());
    }

    #[test]
    fn test_row_blocks_helpers() {
        assert_eq!(selected_rows(Range::new((1, 2), (3, 0))), (1, 2));
        assert_eq!(selected_rows(Range::new((1, 0), (1, 0))), (1, 1));
        assert_eq!(merge_blocks(vec![(4, 5), (0, 1), (2, 2), (8, 9)]), vec![(0, 5), (8, 9)]);
        assert_eq!(expanded_column("\ta", 2, 4), 5);
    }
}
