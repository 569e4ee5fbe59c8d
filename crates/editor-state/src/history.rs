//! Undo/redo history with time-based grouping and checkpoints.

use crate::delta::TextChange;
use crate::ids::LayerId;
use crate::marker::LayerSnapshot;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on retained undo entries; the oldest entries are dropped first.
pub const DEFAULT_MAX_UNDO_ENTRIES: usize = 1000;

/// Snapshots of every history-maintained marker layer.
pub(crate) type LayerSnapshots = Vec<(LayerId, LayerSnapshot)>;

/// A position in the undo history that can be reverted to or grouped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub u64);

#[derive(Debug, Clone)]
pub(crate) struct HistoryEntry {
    pub changes: Vec<TextChange>,
    pub before: LayerSnapshots,
    pub after: LayerSnapshots,
    pub timestamp: Duration,
    pub grouping_interval: Duration,
}

#[derive(Debug)]
pub(crate) struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
    grouping_broken: bool,
    checkpoints: Vec<(CheckpointId, usize)>,
    next_checkpoint: u64,
}

impl History {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            grouping_broken: false,
            checkpoints: Vec::new(),
            next_checkpoint: 1,
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Prevent the next entry from merging into the current last one.
    pub fn break_grouping(&mut self) {
        self.grouping_broken = true;
    }

    /// Record a committed transaction, merging it into the previous entry when both were
    /// committed within their grouping intervals.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo_stack.clear();
        let broken = std::mem::take(&mut self.grouping_broken);
        let depth = self.undo_stack.len();

        if !broken
            && !entry.grouping_interval.is_zero()
            && let Some(last) = self.undo_stack.last_mut()
        {
            let interval = entry.grouping_interval.min(last.grouping_interval);
            if entry.timestamp.saturating_sub(last.timestamp) < interval {
                tracing::trace!(depth, "grouped into previous undo entry");
                last.changes.extend(entry.changes);
                last.after = entry.after;
                last.timestamp = entry.timestamp;
                last.grouping_interval = entry.grouping_interval;
                return;
            }
        }

        if self.undo_stack.len() >= self.max_entries {
            self.undo_stack.remove(0);
            self.checkpoints.retain_mut(|(_, depth)| {
                if *depth == 0 {
                    return false;
                }
                *depth -= 1;
                true
            });
        }
        self.undo_stack.push(entry);
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.grouping_broken = true;
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.grouping_broken = true;
        self.redo_stack.pop()
    }

    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo_stack.push(entry);
    }

    /// Put an entry back on the undo stack without touching the redo stack.
    pub fn push_undone(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
    }

    pub fn create_checkpoint(&mut self) -> CheckpointId {
        let id = CheckpointId(self.next_checkpoint);
        self.next_checkpoint += 1;
        self.checkpoints.push((id, self.undo_stack.len()));
        self.grouping_broken = true;
        id
    }

    /// Undo depth recorded by `checkpoint`, if it is still reachable.
    pub fn checkpoint_depth(&self, checkpoint: CheckpointId) -> Option<usize> {
        self.checkpoints
            .iter()
            .find(|(id, _)| *id == checkpoint)
            .map(|(_, depth)| *depth)
            .filter(|depth| *depth <= self.undo_stack.len())
    }

    /// Collapse every entry recorded after `depth` into one.
    pub fn group_since(&mut self, depth: usize) {
        if depth + 1 >= self.undo_stack.len() {
            return;
        }
        let mut tail = self.undo_stack.split_off(depth);
        let mut merged = tail.remove(0);
        for entry in tail {
            merged.changes.extend(entry.changes);
            merged.after = entry.after;
            merged.timestamp = entry.timestamp;
        }
        self.undo_stack.push(merged);
        self.checkpoints.retain(|(_, d)| *d <= depth + 1);
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.checkpoints.clear();
        self.grouping_broken = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;

    fn entry(text: &str, at_ms: u64, interval_ms: u64) -> HistoryEntry {
        HistoryEntry {
            changes: vec![TextChange::new(Point::ZERO, "", text)],
            before: Vec::new(),
            after: Vec::new(),
            timestamp: Duration::from_millis(at_ms),
            grouping_interval: Duration::from_millis(interval_ms),
        }
    }

    #[test]
    fn test_grouping_within_interval() {
        let mut history = History::new(DEFAULT_MAX_UNDO_ENTRIES);
        history.push(entry("a", 0, 300));
        history.push(entry("b", 100, 300));
        assert_eq!(history.undo_depth(), 1);
        history.push(entry("c", 500, 300));
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_break_grouping_and_zero_interval() {
        let mut history = History::new(DEFAULT_MAX_UNDO_ENTRIES);
        history.push(entry("a", 0, 300));
        history.break_grouping();
        history.push(entry("b", 10, 300));
        history.push(entry("c", 20, 0));
        assert_eq!(history.undo_depth(), 3);
    }

    #[test]
    fn test_max_entries_drops_oldest() {
        let mut history = History::new(2);
        let checkpoint = history.create_checkpoint();
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            history.push(entry(text, i as u64 * 1000, 0));
        }
        assert_eq!(history.undo_depth(), 2);
        assert_eq!(history.checkpoint_depth(checkpoint), None);
    }

    #[test]
    fn test_group_since_checkpoint() {
        let mut history = History::new(DEFAULT_MAX_UNDO_ENTRIES);
        history.push(entry("a", 0, 0));
        let checkpoint = history.create_checkpoint();
        history.push(entry("b", 1000, 0));
        history.push(entry("c", 2000, 0));
        let depth = history.checkpoint_depth(checkpoint).unwrap();
        history.group_since(depth);
        assert_eq!(history.undo_depth(), 2);
        let last = history.pop_undo().unwrap();
        assert_eq!(last.changes.len(), 2);
    }
}
