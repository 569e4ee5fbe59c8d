//! Marker-anchored decorations.
//!
//! Decorations attach presentation hints (a class name and a kind) to markers so that a
//! renderer can style line backgrounds, gutters or ranges without the session knowing how they
//! are painted. A decoration lives as long as its marker; [`DecorationManager::prune`] drops
//! the ones whose marker has been destroyed.

use crate::display::DisplayLayer;
use crate::document::Document;
use crate::ids::{DecorationId, IdGenerator, LayerId, MarkerId};
use crate::point::Range;
use std::collections::BTreeMap;

/// Class of the decoration every selection carries on its cursor row.
pub const CURSOR_LINE_CLASS: &str = "cursor-line";

/// Where a decoration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecorationKind {
    /// Whole screen rows spanned by the marker.
    Line,
    /// Gutter cells of the rows spanned by the marker.
    LineNumber,
    /// The marker's text range.
    Highlight,
    /// The marker's head position.
    Cursor,
}

/// Presentation hints of a decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecorationProperties {
    /// Where the decoration applies.
    pub kind: DecorationKind,
    /// Renderer-defined class name.
    pub class: String,
    /// Apply only while the marker is empty.
    pub only_empty: bool,
    /// Apply only while the marker is non-empty.
    pub only_non_empty: bool,
    /// For line kinds, apply to the head row only.
    pub only_head: bool,
}

impl DecorationProperties {
    /// Properties with every flag off.
    pub fn new(kind: DecorationKind, class: impl Into<String>) -> Self {
        Self {
            kind,
            class: class.into(),
            only_empty: false,
            only_non_empty: false,
            only_head: false,
        }
    }

    /// The decoration each selection carries on its cursor row.
    pub fn cursor_line() -> Self {
        Self {
            only_head: true,
            ..Self::new(DecorationKind::Line, CURSOR_LINE_CLASS)
        }
    }
}

/// A decoration of one marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    /// Identity.
    pub id: DecorationId,
    /// Layer holding the marker.
    pub layer: LayerId,
    /// Decorated marker.
    pub marker: MarkerId,
    /// Presentation hints.
    pub properties: DecorationProperties,
}

/// A decoration resolved against the current screen layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenDecoration {
    /// The decoration.
    pub decoration: Decoration,
    /// First screen row it applies to.
    pub start_row: usize,
    /// Last screen row it applies to.
    pub end_row: usize,
}

/// Decorations of one session.
#[derive(Debug, Default)]
pub struct DecorationManager {
    decorations: BTreeMap<DecorationId, Decoration>,
}

impl DecorationManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decorate `marker` of `layer`.
    pub fn decorate_marker(
        &mut self,
        ids: &dyn IdGenerator,
        layer: LayerId,
        marker: MarkerId,
        properties: DecorationProperties,
    ) -> Decoration {
        let decoration = Decoration {
            id: DecorationId::next(ids),
            layer,
            marker,
            properties,
        };
        self.decorations.insert(decoration.id, decoration.clone());
        decoration
    }

    /// Remove a decoration.
    pub fn destroy_decoration(&mut self, id: DecorationId) -> Option<Decoration> {
        self.decorations.remove(&id)
    }

    /// Remove every decoration of `marker`.
    pub fn destroy_decorations_for_marker(&mut self, marker: MarkerId) -> Vec<Decoration> {
        let ids: Vec<DecorationId> = self
            .decorations
            .values()
            .filter(|d| d.marker == marker)
            .map(|d| d.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.decorations.remove(&id))
            .collect()
    }

    /// Remove decorations whose marker no longer exists.
    pub fn prune(&mut self, document: &Document) -> Vec<Decoration> {
        let dead: Vec<DecorationId> = self
            .decorations
            .values()
            .filter(|d| {
                !document
                    .marker_layer(d.layer)
                    .is_some_and(|layer| layer.contains(d.marker))
            })
            .map(|d| d.id)
            .collect();
        dead.into_iter()
            .filter_map(|id| self.decorations.remove(&id))
            .collect()
    }

    /// Look up a decoration.
    pub fn get(&self, id: DecorationId) -> Option<&Decoration> {
        self.decorations.get(&id)
    }

    /// Every decoration, by id.
    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.decorations.values()
    }

    /// Number of decorations.
    pub fn len(&self) -> usize {
        self.decorations.len()
    }

    /// Returns `true` if there are no decorations.
    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.decorations.clear();
    }

    /// Decorations applying to any screen row in `start..=end`, with their row spans.
    pub fn decorations_for_screen_row_range(
        &self,
        document: &Document,
        display: &DisplayLayer,
        start: usize,
        end: usize,
    ) -> Vec<ScreenDecoration> {
        let mut found = Vec::new();
        for decoration in self.decorations.values() {
            let Some(marker) = document
                .marker_layer(decoration.layer)
                .and_then(|layer| layer.get(decoration.marker))
            else {
                continue;
            };
            let properties = &decoration.properties;
            let range = marker.range();
            if (properties.only_empty && !range.is_empty())
                || (properties.only_non_empty && range.is_empty())
            {
                continue;
            }
            let range = if properties.only_head || properties.kind == DecorationKind::Cursor {
                Range::empty(marker.head())
            } else {
                range
            };
            let screen = display.translate_range_to_screen(document, range);
            let mut end_row = screen.end.row;
            // A line decoration ending at column 0 does not cover that row.
            if properties.kind == DecorationKind::Line
                && !range.is_empty()
                && screen.end.column == 0
                && end_row > screen.start.row
            {
                end_row -= 1;
            }
            if screen.start.row <= end && end_row >= start {
                found.push(ScreenDecoration {
                    decoration: decoration.clone(),
                    start_row: screen.start.row,
                    end_row,
                });
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayConfig;
    use crate::ids::SequentialIdGenerator;
    use crate::marker::{LayerOptions, MarkerOptions};
    use std::sync::Arc;

    #[test]
    fn test_row_range_query_and_prune() {
        let ids = Arc::new(SequentialIdGenerator::new());
        let mut doc = Document::with_ids("a\nb\nc\nd", ids.clone());
        let display = DisplayLayer::new(&mut doc, DisplayConfig::default());
        let layer = doc.add_marker_layer(LayerOptions::default());
        let marker = doc
            .marker_layer_mut(layer)
            .unwrap()
            .mark_range(Range::new((1, 0), (3, 0)), MarkerOptions::default());

        let mut manager = DecorationManager::new();
        let line = manager.decorate_marker(
            ids.as_ref(),
            layer,
            marker,
            DecorationProperties::new(DecorationKind::Line, "block"),
        );
        let head = manager.decorate_marker(
            ids.as_ref(),
            layer,
            marker,
            DecorationProperties::cursor_line(),
        );

        let hits = manager.decorations_for_screen_row_range(&doc, &display, 0, 0);
        assert!(hits.is_empty());
        let hits = manager.decorations_for_screen_row_range(&doc, &display, 2, 3);
        assert_eq!(hits.len(), 2);
        let block = hits.iter().find(|h| h.decoration.id == line.id).unwrap();
        assert_eq!((block.start_row, block.end_row), (1, 2));
        let cursor = hits.iter().find(|h| h.decoration.id == head.id).unwrap();
        assert_eq!(cursor.start_row, 3);

        doc.marker_layer_mut(layer).unwrap().destroy_marker(marker);
        assert_eq!(manager.prune(&doc).len(), 2);
        assert!(manager.is_empty());
    }
}
