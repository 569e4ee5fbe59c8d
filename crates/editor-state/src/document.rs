//! The shared text document.
//!
//! A [`Document`] owns the text (a [`ropey::Rope`]), the marker layers that track positions
//! in it, and the undo history. Every edit goes through [`Document::set_text_in_range`],
//! which commits in a fixed order:
//!
//! 1. the rope is updated and the version bumped;
//! 2. every marker layer rebases its markers (invalidating per policy);
//! 3. the change is queued for every subscriber;
//! 4. the change is recorded in the open transaction, or in history directly.
//!
//! Consumers such as editor sessions pull queued changes with [`Document::take_changes`]
//! and update their derived state afterwards.

use crate::delta::TextChange;
use crate::error::{DocumentLoadError, EditorError, Result};
use crate::event::{Emitter, Subscription};
use crate::history::{
    CheckpointId, DEFAULT_MAX_UNDO_ENTRIES, History, HistoryEntry, LayerSnapshots,
};
use crate::ids::{Clock, DocumentId, IdGenerator, LayerId, SequentialIdGenerator, SystemClock};
use crate::line_ending::{LineEnding, normalize};
use crate::marker::{LayerOptions, MarkerLayer};
use crate::point::{Point, Range};
use ropey::Rope;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Identifies one consumer's change queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

#[derive(Debug)]
struct TransactionFrame {
    /// Index into `open_changes` where this level began.
    first_change: usize,
    before: LayerSnapshots,
    grouping_interval: Duration,
}

/// A mutable text document shared by editor sessions.
pub struct Document {
    id: DocumentId,
    text: Rope,
    line_ending: LineEnding,
    version: u64,
    path: Option<PathBuf>,
    layers: BTreeMap<LayerId, MarkerLayer>,
    history: History,
    transactions: Vec<TransactionFrame>,
    open_changes: Vec<TextChange>,
    subscribers: BTreeMap<SubscriberId, Vec<TextChange>>,
    next_subscriber: u64,
    ids: Arc<dyn IdGenerator>,
    clock: Rc<dyn Clock>,
    retain_count: usize,
    destroyed: bool,
    did_destroy: Emitter<DocumentId>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("lines", &self.line_count())
            .field("layers", &self.layers.len())
            .field("retain_count", &self.retain_count)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Document {
    /// Create a document with its own id generator and the system clock.
    pub fn new(text: &str) -> Self {
        Self::with_ids(text, Arc::new(SequentialIdGenerator::new()))
    }

    /// Create a document drawing identities from `ids`.
    pub fn with_ids(text: &str, ids: Arc<dyn IdGenerator>) -> Self {
        Self::with_services(text, ids, Rc::new(SystemClock::new()))
    }

    /// Create a document with an explicit id generator and clock.
    pub fn with_services(text: &str, ids: Arc<dyn IdGenerator>, clock: Rc<dyn Clock>) -> Self {
        let line_ending = LineEnding::detect(text);
        Self {
            id: DocumentId::next(ids.as_ref()),
            text: Rope::from_str(&normalize(text)),
            line_ending,
            version: 0,
            path: None,
            layers: BTreeMap::new(),
            history: History::new(DEFAULT_MAX_UNDO_ENTRIES),
            transactions: Vec::new(),
            open_changes: Vec::new(),
            subscribers: BTreeMap::new(),
            next_subscriber: 1,
            ids,
            clock,
            retain_count: 0,
            destroyed: false,
            did_destroy: Emitter::new(),
        }
    }

    /// Load a document from disk.
    pub fn open(
        path: impl AsRef<Path>,
        ids: Arc<dyn IdGenerator>,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(DocumentLoadError::Read)?;
        let mut document = Self::with_services(&text, ids, clock);
        document.path = Some(path.to_path_buf());
        tracing::debug!(document = %document.id, path = %path.display(), "document opened");
        Ok(document)
    }

    /// Write the text to `path` with the document's line ending and remember the path.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.line_ending.apply(&self.text()))?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Identity.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// File the document was opened from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Line ending used when saving.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Change the line ending used when saving.
    pub fn set_line_ending(&mut self, line_ending: LineEnding) {
        self.line_ending = line_ending;
    }

    /// Incremented by every committed change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The id generator shared with everything attached to this document.
    pub fn ids(&self) -> Arc<dyn IdGenerator> {
        self.ids.clone()
    }

    /// The clock used for undo grouping.
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    // --- text --------------------------------------------------------------------------

    /// Whole text, with `\n` line endings.
    pub fn text(&self) -> String {
        self.text.to_string()
    }

    /// Text between two clipped positions.
    pub fn text_in_range(&self, range: Range) -> String {
        let range = self.clip_range(range);
        let start = self.char_index(range.start);
        let end = self.char_index(range.end);
        self.text.slice(start..end).to_string()
    }

    /// Number of rows; an empty document has one.
    pub fn line_count(&self) -> usize {
        self.text.len_lines()
    }

    /// Text of `row` without its newline; empty past the end.
    pub fn line(&self, row: usize) -> String {
        if row >= self.line_count() {
            return String::new();
        }
        let mut line = self.text.line(row).to_string();
        if line.ends_with('\n') {
            line.pop();
        }
        line
    }

    /// Length of `row` in chars, excluding its newline.
    pub fn line_length(&self, row: usize) -> usize {
        if row >= self.line_count() {
            return 0;
        }
        let line = self.text.line(row);
        let len = line.len_chars();
        if len > 0 && line.char(len - 1) == '\n' {
            len - 1
        } else {
            len
        }
    }

    /// Returns `true` if the document holds no text.
    pub fn is_empty(&self) -> bool {
        self.text.len_chars() == 0
    }

    /// Position just past the last character.
    pub fn max_point(&self) -> Point {
        let row = self.line_count() - 1;
        Point::new(row, self.line_length(row))
    }

    /// The nearest valid position.
    pub fn clip_position(&self, point: Point) -> Point {
        let last = self.line_count() - 1;
        if point.row > last {
            return self.max_point();
        }
        Point::new(point.row, point.column.min(self.line_length(point.row)))
    }

    /// Clip both ends of `range`.
    pub fn clip_range(&self, range: Range) -> Range {
        Range::new(self.clip_position(range.start), self.clip_position(range.end))
    }

    /// Position of the `index`-th char, clamped to the end.
    pub fn position_for_character_index(&self, index: usize) -> Point {
        let index = index.min(self.text.len_chars());
        let row = self.text.char_to_line(index);
        Point::new(row, index - self.text.line_to_char(row))
    }

    /// Char index of a clipped position.
    pub fn character_index_for_position(&self, point: Point) -> usize {
        self.char_index(self.clip_position(point))
    }

    fn char_index(&self, point: Point) -> usize {
        self.text.line_to_char(point.row) + point.column
    }

    // --- edits -------------------------------------------------------------------------

    /// Replace `range` with `text` and return the range of the inserted text.
    ///
    /// Newlines in `text` are normalized to `\n`. A replacement that changes nothing is not
    /// committed.
    pub fn set_text_in_range(&mut self, range: Range, text: &str) -> Result<Range> {
        if self.destroyed {
            return Err(EditorError::DocumentDestroyed(self.id));
        }
        let range = self.clip_range(range);
        let new_text = normalize(text);
        let old_text = self.text_in_range(range);
        let change = TextChange::new(range.start, old_text, new_text);
        if change.old_text == change.new_text {
            return Ok(change.new_range);
        }
        let new_range = change.new_range;

        if self.transactions.is_empty() {
            let before = self.history_snapshots();
            self.apply(&change);
            let entry = HistoryEntry {
                changes: vec![change],
                before,
                after: self.history_snapshots(),
                timestamp: self.clock.now(),
                grouping_interval: Duration::ZERO,
            };
            self.history.push(entry);
        } else {
            self.apply(&change);
            self.open_changes.push(change);
        }
        Ok(new_range)
    }

    /// Insert `text` at `point`.
    pub fn insert(&mut self, point: Point, text: &str) -> Result<Range> {
        self.set_text_in_range(Range::empty(point), text)
    }

    /// Delete `range`.
    pub fn delete(&mut self, range: Range) -> Result<Range> {
        self.set_text_in_range(range, "")
    }

    /// Replace the whole text.
    pub fn set_text(&mut self, text: &str) -> Result<Range> {
        let all = Range::new(Point::ZERO, self.max_point());
        self.set_text_in_range(all, text)
    }

    fn apply(&mut self, change: &TextChange) {
        let start = self.char_index(change.old_range.start);
        let end = self.char_index(change.old_range.end);
        self.text.remove(start..end);
        self.text.insert(start, &change.new_text);
        self.version += 1;
        for layer in self.layers.values_mut() {
            layer.apply_change(change);
        }
        for queue in self.subscribers.values_mut() {
            queue.push(change.clone());
        }
    }

    // --- change queues -----------------------------------------------------------------

    /// Start queueing committed changes for a new consumer.
    pub fn subscribe(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.insert(id, Vec::new());
        id
    }

    /// Drain the changes committed since the last call, oldest first.
    pub fn take_changes(&mut self, subscriber: SubscriberId) -> Vec<TextChange> {
        self.subscribers
            .get_mut(&subscriber)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Returns `true` if `subscriber` has undrained changes.
    pub fn has_pending_changes(&self, subscriber: SubscriberId) -> bool {
        self.subscribers
            .get(&subscriber)
            .is_some_and(|queue| !queue.is_empty())
    }

    /// Stop queueing changes for `subscriber`.
    pub fn unsubscribe(&mut self, subscriber: SubscriberId) {
        self.subscribers.remove(&subscriber);
    }

    // --- marker layers -----------------------------------------------------------------

    /// Create an empty marker layer.
    pub fn add_marker_layer(&mut self, options: LayerOptions) -> LayerId {
        let id = LayerId::next(self.ids.as_ref());
        self.layers
            .insert(id, MarkerLayer::new(id, self.ids.clone(), options));
        id
    }

    /// The layer `id`, if it exists.
    pub fn marker_layer(&self, id: LayerId) -> Option<&MarkerLayer> {
        self.layers.get(&id)
    }

    /// The layer `id`, mutably.
    pub fn marker_layer_mut(&mut self, id: LayerId) -> Option<&mut MarkerLayer> {
        self.layers.get_mut(&id)
    }

    /// Copy layer `id` (markers get new identities) and return the copy's id.
    pub fn copy_marker_layer(&mut self, id: LayerId) -> Option<LayerId> {
        let new_id = LayerId::next(self.ids.as_ref());
        let copy = self.layers.get(&id)?.copy(new_id);
        self.layers.insert(new_id, copy);
        Some(new_id)
    }

    /// Destroy layer `id` and its markers.
    pub fn destroy_marker_layer(&mut self, id: LayerId) -> bool {
        match self.layers.remove(&id) {
            Some(mut layer) => {
                layer.destroy();
                true
            }
            None => false,
        }
    }

    /// Ids of every layer.
    pub fn marker_layer_ids(&self) -> Vec<LayerId> {
        self.layers.keys().copied().collect()
    }

    fn history_snapshots(&self) -> LayerSnapshots {
        self.layers
            .values()
            .filter(|layer| layer.maintains_history())
            .map(|layer| (layer.id(), layer.snapshot()))
            .collect()
    }

    fn restore_snapshots(&mut self, snapshots: &LayerSnapshots) {
        for (id, snapshot) in snapshots {
            if let Some(layer) = self.layers.get_mut(id) {
                layer.restore(snapshot);
            }
        }
    }

    // --- transactions and history ------------------------------------------------------

    /// Open a transaction. Nested transactions flatten into the outermost one.
    pub fn begin_transaction(&mut self, grouping_interval: Duration) {
        let before = self.history_snapshots();
        self.transactions.push(TransactionFrame {
            first_change: self.open_changes.len(),
            before,
            grouping_interval,
        });
    }

    /// Close the innermost transaction. Closing the outermost records its changes as one
    /// undo entry. Returns `false` if no transaction was open.
    pub fn commit_transaction(&mut self) -> bool {
        let Some(frame) = self.transactions.pop() else {
            return false;
        };
        if !self.transactions.is_empty() {
            return true;
        }
        let changes = std::mem::take(&mut self.open_changes);
        if changes.is_empty() {
            return true;
        }
        let entry = HistoryEntry {
            changes,
            before: frame.before,
            after: self.history_snapshots(),
            timestamp: self.clock.now(),
            grouping_interval: frame.grouping_interval,
        };
        self.history.push(entry);
        true
    }

    /// Revert every change of the innermost transaction and close it. Returns `false` if no
    /// transaction was open.
    pub fn abort_transaction(&mut self) -> bool {
        let Some(frame) = self.transactions.pop() else {
            return false;
        };
        let reverted = self.open_changes.split_off(frame.first_change);
        for change in reverted.iter().rev() {
            self.apply(&change.inverted());
        }
        self.restore_snapshots(&frame.before);
        tracing::debug!(document = %self.id, reverted = reverted.len(), "transaction aborted");
        true
    }

    /// Run `f` inside a transaction, reverting everything it did if it fails.
    pub fn transact<T>(
        &mut self,
        grouping_interval: Duration,
        f: impl FnOnce(&mut Document) -> Result<T>,
    ) -> Result<T> {
        self.begin_transaction(grouping_interval);
        match f(self) {
            Ok(value) => {
                self.commit_transaction();
                Ok(value)
            }
            Err(err) => {
                self.abort_transaction();
                Err(err)
            }
        }
    }

    /// Returns `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.transactions.is_empty()
    }

    /// Keep the next transaction out of the current undo entry.
    pub fn break_undo_grouping(&mut self) {
        self.history.break_grouping();
    }

    /// Revert the most recent undo entry. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.in_transaction() {
            return Err(EditorError::TransactionOpen);
        }
        let Some(entry) = self.history.pop_undo() else {
            return Ok(false);
        };
        for change in entry.changes.iter().rev() {
            self.apply(&change.inverted());
        }
        self.restore_snapshots(&entry.before);
        self.history.push_redo(entry);
        Ok(true)
    }

    /// Reapply the most recently undone entry. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        if self.in_transaction() {
            return Err(EditorError::TransactionOpen);
        }
        let Some(entry) = self.history.pop_redo() else {
            return Ok(false);
        };
        for change in &entry.changes {
            self.apply(change);
        }
        self.restore_snapshots(&entry.after);
        self.history.push_undone(entry);
        Ok(true)
    }

    /// Number of undo entries.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    /// Number of redo entries.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Mark the current position in history.
    pub fn create_checkpoint(&mut self) -> CheckpointId {
        self.history.create_checkpoint()
    }

    /// Revert every entry recorded after `checkpoint`, discarding them. Returns `false` if
    /// the checkpoint is no longer reachable.
    pub fn revert_to_checkpoint(&mut self, checkpoint: CheckpointId) -> Result<bool> {
        if self.in_transaction() {
            return Err(EditorError::TransactionOpen);
        }
        let Some(depth) = self.history.checkpoint_depth(checkpoint) else {
            return Ok(false);
        };
        while self.history.undo_depth() > depth {
            let Some(entry) = self.history.pop_undo() else {
                break;
            };
            for change in entry.changes.iter().rev() {
                self.apply(&change.inverted());
            }
            self.restore_snapshots(&entry.before);
        }
        Ok(true)
    }

    /// Merge every entry recorded after `checkpoint` into one. Returns `false` if the
    /// checkpoint is no longer reachable.
    pub fn group_changes_since_checkpoint(&mut self, checkpoint: CheckpointId) -> bool {
        match self.history.checkpoint_depth(checkpoint) {
            Some(depth) => {
                self.history.group_since(depth);
                true
            }
            None => false,
        }
    }

    /// Drop all undo and redo entries.
    pub fn clear_undo_stack(&mut self) {
        self.history.clear();
    }

    // --- lifetime ----------------------------------------------------------------------

    /// Register one more holder.
    pub fn retain(&mut self) {
        self.retain_count += 1;
    }

    /// Drop one holder. The last release tears the document down and returns `true`.
    pub fn release(&mut self) -> bool {
        if self.retain_count == 0 {
            return false;
        }
        self.retain_count -= 1;
        if self.retain_count > 0 {
            return false;
        }
        self.destroy();
        true
    }

    /// Number of holders.
    pub fn retain_count(&self) -> usize {
        self.retain_count
    }

    /// Returns `true` once the document has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Notified once when the document is torn down.
    pub fn on_did_destroy(&self, callback: impl FnMut(&DocumentId) + 'static) -> Subscription {
        self.did_destroy.subscribe(callback)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for layer in self.layers.values_mut() {
            layer.destroy();
        }
        self.layers.clear();
        self.subscribers.clear();
        self.transactions.clear();
        self.open_changes.clear();
        self.history.clear();
        tracing::debug!(document = %self.id, "document destroyed");
        self.did_destroy.emit(&self.id);
        self.did_destroy.clear();
    }
}
