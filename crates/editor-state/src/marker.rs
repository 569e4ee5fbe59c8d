//! Markers: ranges that follow the text as it is edited.
//!
//! # Overview
//!
//! A [`Marker`] anchors a buffer range (or a single position) with a stable [`MarkerId`].
//! Markers live in a [`MarkerLayer`], and every layer is owned by the
//! [`Document`](crate::Document), which rebases all of its layers after each committed edit:
//!
//! - positions before the edit stay where they are;
//! - positions after the replaced range shift by the edit's net extent;
//! - positions on or inside the replaced range follow the boundary's [`Inclusivity`]:
//!   an inclusive start stays at the edit start and an exclusive start moves past the new text,
//!   an inclusive end moves past the new text and an exclusive end stays at the edit start.
//!
//! Independently of moving, an edit may *invalidate* a marker according to its
//! [`InvalidationStrategy`]. Layers created with `destroy_invalidated` drop such markers on
//! the spot; other layers keep them and clear [`Marker::valid`].
//!
//! Layers that `maintain_history` are snapshotted around every transaction so that undo and
//! redo put their markers back exactly.
//!
//! Callbacks registered with [`MarkerLayer::on_did_create_marker`] and
//! [`MarkerLayer::on_did_update`] run while the owning document is mutably borrowed; they
//! must not borrow the document again.

use crate::delta::TextChange;
use crate::event::{Emitter, Subscription};
use crate::ids::{IdGenerator, LayerId, MarkerId};
use crate::point::{Point, Range};
use std::collections::BTreeMap;
use std::sync::Arc;

/// When an edit makes a marker invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationStrategy {
    /// Never.
    Never,
    /// When a non-empty edit covers the whole marker.
    Surround,
    /// When an edit crosses either boundary or covers the whole marker.
    #[default]
    Overlap,
    /// When an edit reaches into the marker's interior.
    Inside,
    /// When an edit touches the marker anywhere, boundaries included.
    Touch,
}

/// Whether text inserted exactly at a boundary ends up inside the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inclusivity {
    /// Insertions at the boundary are absorbed.
    #[default]
    Inclusive,
    /// Insertions at the boundary stay outside.
    Exclusive,
}

/// Creation options for a marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkerOptions {
    /// Invalidation policy.
    pub invalidate: InvalidationStrategy,
    /// Behavior of the start boundary.
    pub start: Inclusivity,
    /// Behavior of the end boundary.
    pub end: Inclusivity,
    /// Head before tail.
    pub reversed: bool,
    /// Free-form properties, for example a decoration class.
    pub properties: BTreeMap<String, String>,
}

impl MarkerOptions {
    /// Both boundaries exclusive, with the given invalidation policy.
    pub fn exclusive(invalidate: InvalidationStrategy) -> Self {
        Self {
            invalidate,
            start: Inclusivity::Exclusive,
            end: Inclusivity::Exclusive,
            ..Self::default()
        }
    }

    /// Set the reversed flag.
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    /// Attach a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An anchored range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    id: MarkerId,
    range: Range,
    reversed: bool,
    tailed: bool,
    valid: bool,
    invalidate: InvalidationStrategy,
    start_inclusivity: Inclusivity,
    end_inclusivity: Inclusivity,
    properties: BTreeMap<String, String>,
}

impl Marker {
    fn new(id: MarkerId, range: Range, tailed: bool, options: MarkerOptions) -> Self {
        Self {
            id,
            range,
            reversed: options.reversed && !range.is_empty(),
            tailed,
            valid: true,
            invalidate: options.invalidate,
            start_inclusivity: options.start,
            end_inclusivity: options.end,
            properties: options.properties,
        }
    }

    /// Identity.
    pub fn id(&self) -> MarkerId {
        self.id
    }

    /// Current range.
    pub fn range(&self) -> Range {
        self.range
    }

    /// Returns `true` if the head precedes the tail.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Returns `true` if the marker has a tail (an anchor distinct from its head).
    pub fn has_tail(&self) -> bool {
        self.tailed
    }

    /// Returns `false` once an edit has invalidated the marker.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The active end.
    pub fn head(&self) -> Point {
        if self.reversed {
            self.range.start
        } else {
            self.range.end
        }
    }

    /// The anchored end.
    pub fn tail(&self) -> Point {
        if self.reversed {
            self.range.end
        } else {
            self.range.start
        }
    }

    /// Invalidation policy.
    pub fn invalidation(&self) -> InvalidationStrategy {
        self.invalidate
    }

    /// Free-form properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    fn options(&self) -> MarkerOptions {
        MarkerOptions {
            invalidate: self.invalidate,
            start: self.start_inclusivity,
            end: self.end_inclusivity,
            reversed: self.reversed,
            properties: self.properties.clone(),
        }
    }

    /// Move the marker to account for `change`. Returns `true` if its range changed.
    fn rebase(&mut self, change: &TextChange) -> bool {
        let new_range = rebase_range(
            self.range,
            change,
            self.start_inclusivity,
            self.end_inclusivity,
        );
        let moved = new_range != self.range;
        self.range = new_range;
        if self.range.is_empty() {
            self.reversed = false;
        }
        moved
    }
}

/// Translate `point` across `change`, treating it as a start or end boundary.
pub(crate) fn rebase_point(
    point: Point,
    change: &TextChange,
    inclusivity: Inclusivity,
    is_start: bool,
) -> Point {
    let start = change.old_range.start;
    let old_end = change.old_range.end;
    let new_end = change.new_range.end;

    if point < start {
        return point;
    }
    if point > old_end || (point == old_end && start < old_end) {
        return new_end.traverse(point.traversal_from(old_end));
    }
    match (is_start, inclusivity) {
        (true, Inclusivity::Inclusive) | (false, Inclusivity::Exclusive) => start,
        (true, Inclusivity::Exclusive) | (false, Inclusivity::Inclusive) => new_end,
    }
}

/// Translate a range across `change` with the given boundary behaviors.
pub(crate) fn rebase_range(
    range: Range,
    change: &TextChange,
    start: Inclusivity,
    end: Inclusivity,
) -> Range {
    let new_start = rebase_point(range.start, change, start, true);
    let new_end = rebase_point(range.end, change, end, false).max(new_start);
    Range {
        start: new_start,
        end: new_end,
    }
}

/// Whether `change` invalidates a marker at `range` under `strategy`.
pub(crate) fn invalidates(
    strategy: InvalidationStrategy,
    range: Range,
    change: &TextChange,
) -> bool {
    let s = change.old_range.start;
    let e = change.old_range.end;
    let surround = s < e && s <= range.start && range.end <= e;
    match strategy {
        InvalidationStrategy::Never => false,
        InvalidationStrategy::Surround => surround,
        InvalidationStrategy::Overlap => {
            let crosses_start = s < range.start && range.start < e;
            let crosses_end = s < range.end && range.end < e;
            surround || crosses_start || crosses_end
        }
        InvalidationStrategy::Inside => surround || (s < range.end && e > range.start),
        InvalidationStrategy::Touch => s <= range.end && e >= range.start,
    }
}

/// Layer-wide behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerOptions {
    /// Snapshot the layer into undo history.
    pub maintain_history: bool,
    /// Destroy markers as soon as an edit invalidates them.
    pub destroy_invalidated: bool,
}

/// Saved state of every marker in a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSnapshot {
    markers: Vec<Marker>,
}

impl LayerSnapshot {
    /// Ranges in the snapshot, keyed by marker.
    pub fn ranges(&self) -> impl Iterator<Item = (MarkerId, Range)> + '_ {
        self.markers.iter().map(|m| (m.id, m.range))
    }
}

/// A named collection of markers.
pub struct MarkerLayer {
    id: LayerId,
    options: LayerOptions,
    markers: BTreeMap<MarkerId, Marker>,
    ids: Arc<dyn IdGenerator>,
    did_create_marker: Emitter<MarkerId>,
    did_update: Emitter<LayerId>,
}

impl std::fmt::Debug for MarkerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerLayer")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("markers", &self.markers.len())
            .finish()
    }
}

impl MarkerLayer {
    /// Create an empty layer.
    pub fn new(id: LayerId, ids: Arc<dyn IdGenerator>, options: LayerOptions) -> Self {
        Self {
            id,
            options,
            markers: BTreeMap::new(),
            ids,
            did_create_marker: Emitter::new(),
            did_update: Emitter::new(),
        }
    }

    /// Identity.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Layer behavior flags.
    pub fn options(&self) -> LayerOptions {
        self.options
    }

    /// Returns `true` if undo history snapshots this layer.
    pub fn maintains_history(&self) -> bool {
        self.options.maintain_history
    }

    /// Mark `range` and return the new marker's id.
    pub fn mark_range(&mut self, range: Range, options: MarkerOptions) -> MarkerId {
        self.insert_marker(range, true, options)
    }

    /// Mark a single position. The marker has no tail.
    pub fn mark_position(&mut self, point: Point, options: MarkerOptions) -> MarkerId {
        self.insert_marker(Range::empty(point), false, options)
    }

    fn insert_marker(&mut self, range: Range, tailed: bool, options: MarkerOptions) -> MarkerId {
        let id = MarkerId::next(self.ids.as_ref());
        self.markers
            .insert(id, Marker::new(id, range, tailed, options));
        tracing::trace!(layer = %self.id, marker = %id, %range, "marker created");
        self.did_create_marker.emit(&id);
        self.did_update.emit(&self.id);
        id
    }

    /// Look up a marker.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    /// Returns `true` if the marker exists in this layer.
    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(&id)
    }

    /// All markers, in id order.
    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// All marker ids, in id order.
    pub fn marker_ids(&self) -> Vec<MarkerId> {
        self.markers.keys().copied().collect()
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns `true` if the layer has no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Replace a marker's range and orientation. Returns `false` if the marker is unknown.
    pub fn set_range(&mut self, id: MarkerId, range: Range, reversed: bool) -> bool {
        let Some(marker) = self.markers.get_mut(&id) else {
            return false;
        };
        marker.range = range;
        marker.reversed = reversed && !range.is_empty();
        marker.tailed = true;
        self.did_update.emit(&self.id);
        true
    }

    /// Move the head, keeping the tail if there is one.
    pub fn set_head_position(&mut self, id: MarkerId, head: Point) -> bool {
        let Some(marker) = self.markers.get(&id) else {
            return false;
        };
        if !marker.tailed {
            let range = Range::empty(head);
            return self.set_untailed(id, range);
        }
        let tail = marker.tail();
        self.set_range(id, Range::new(tail, head), head < tail)
    }

    /// Move the tail, creating one if necessary.
    pub fn set_tail_position(&mut self, id: MarkerId, tail: Point) -> bool {
        let Some(marker) = self.markers.get(&id) else {
            return false;
        };
        let head = marker.head();
        self.set_range(id, Range::new(tail, head), head < tail)
    }

    /// Collapse the marker onto its head and drop the tail.
    pub fn clear_tail(&mut self, id: MarkerId) -> bool {
        let Some(marker) = self.markers.get(&id) else {
            return false;
        };
        let range = Range::empty(marker.head());
        self.set_untailed(id, range)
    }

    fn set_untailed(&mut self, id: MarkerId, range: Range) -> bool {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.range = range;
            marker.reversed = false;
            marker.tailed = false;
            self.did_update.emit(&self.id);
            true
        } else {
            false
        }
    }

    /// Destroy a marker. Returns `false` if it did not exist.
    pub fn destroy_marker(&mut self, id: MarkerId) -> bool {
        let removed = self.markers.remove(&id).is_some();
        if removed {
            self.did_update.emit(&self.id);
        }
        removed
    }

    /// Destroy every marker.
    pub fn clear(&mut self) {
        if !self.markers.is_empty() {
            self.markers.clear();
            self.did_update.emit(&self.id);
        }
    }

    /// Markers whose range touches `range`, ordered by start position.
    pub fn find_intersecting(&self, range: Range) -> Vec<&Marker> {
        let mut found: Vec<&Marker> = self
            .markers
            .values()
            .filter(|m| m.range.touches(&range))
            .collect();
        found.sort_by_key(|m| (m.range.start, m.range.end));
        found
    }

    /// Markers whose range contains `point`, ordered by start position.
    pub fn find_containing(&self, point: Point) -> Vec<&Marker> {
        self.find_intersecting(Range::empty(point))
    }

    /// A new layer holding copies of every marker under fresh identities.
    pub fn copy(&self, id: LayerId) -> MarkerLayer {
        let mut layer = MarkerLayer::new(id, self.ids.clone(), self.options);
        for marker in self.markers.values() {
            let new_id = MarkerId::next(self.ids.as_ref());
            let mut copied = marker.clone();
            copied.id = new_id;
            layer.markers.insert(new_id, copied);
        }
        layer
    }

    /// Capture every marker.
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            markers: self.markers.values().cloned().collect(),
        }
    }

    /// Put every marker back as captured, keeping identities.
    pub fn restore(&mut self, snapshot: &LayerSnapshot) {
        let created: Vec<MarkerId> = snapshot
            .markers
            .iter()
            .map(|m| m.id)
            .filter(|id| !self.markers.contains_key(id))
            .collect();
        self.markers = snapshot.markers.iter().map(|m| (m.id, m.clone())).collect();
        for id in &created {
            self.did_create_marker.emit(id);
        }
        self.did_update.emit(&self.id);
    }

    /// Rebase every marker across `change`, invalidating as their policies dictate.
    pub(crate) fn apply_change(&mut self, change: &TextChange) {
        let mut changed = false;
        let mut destroyed = Vec::new();
        for marker in self.markers.values_mut() {
            if invalidates(marker.invalidate, marker.range, change) {
                if self.options.destroy_invalidated {
                    destroyed.push(marker.id);
                    continue;
                }
                changed |= marker.valid;
                marker.valid = false;
            }
            changed |= marker.rebase(change);
        }
        for id in destroyed {
            tracing::trace!(layer = %self.id, marker = %id, "invalidated marker destroyed");
            self.markers.remove(&id);
            changed = true;
        }
        if changed {
            self.did_update.emit(&self.id);
        }
    }

    /// Notified with the id of every marker created in this layer.
    pub fn on_did_create_marker(&self, callback: impl FnMut(&MarkerId) + 'static) -> Subscription {
        self.did_create_marker.subscribe(callback)
    }

    /// Notified once per batch of marker changes.
    pub fn on_did_update(&self, callback: impl FnMut(&LayerId) + 'static) -> Subscription {
        self.did_update.subscribe(callback)
    }

    /// Options a marker was created with, for re-creating it elsewhere.
    pub fn marker_options(&self, id: MarkerId) -> Option<MarkerOptions> {
        self.markers.get(&id).map(Marker::options)
    }

    pub(crate) fn destroy(&mut self) {
        self.markers.clear();
        self.did_create_marker.clear();
        self.did_update.clear();
    }
}
