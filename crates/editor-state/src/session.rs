//! Editor sessions.
//!
//! An [`EditorSession`] is one editor's view of a shared [`Document`]: its own coordinate
//! translator, its own selection layer, its configuration facets and its observers. Several
//! sessions may share a document; each one pulls the document's committed changes through its
//! own change queue.
//!
//! Every public entry point first calls [`EditorSession::sync`], which processes pending
//! changes in a fixed order:
//!
//! 1. drain the committed text changes (markers were already rebased by the document);
//! 2. rebase and relayout the translator;
//! 3. reconcile selections with the selection layer and merge overlapping ones;
//! 4. notify observers.
//!
//! # Example
//!
//! ```rust
//! use editor_state::{EditorSession, MemoryClipboard, Point};
//! use std::rc::Rc;
//!
//! let mut session = EditorSession::builder()
//!     .text("hello\nworld")
//!     .clipboard(Rc::new(MemoryClipboard::new()))
//!     .build()
//!     .unwrap();
//! session.set_cursor_buffer_position(Point::new(1, 0));
//! session.insert_text("big ").unwrap();
//! assert_eq!(session.text(), "hello\nbig world");
//! ```

use crate::clipboard::Clipboard;
use crate::config::{ConfigPatch, ConfigUpdate, STOPPED_CHANGING_INTERVAL, SessionConfig};
use crate::cursor::{Cursor, Motion};
use crate::decorations::{
    Decoration, DecorationManager, DecorationProperties, ScreenDecoration,
};
use crate::delta::TextChange;
use crate::display::{DisplayChange, DisplayLayer, ScreenLine};
use crate::document::{Document, SubscriberId};
use crate::error::{EditorError, Result};
use crate::event::{Emitter, Subscription};
use crate::history::CheckpointId;
use crate::ids::{
    Clock, DecorationId, IdGenerator, LayerId, MarkerId, SelectionId, SequentialIdGenerator,
    SessionId,
};
use crate::indent::{IndentPolicy, PreserveIndent};
use crate::marker::LayerOptions;
use crate::point::{ClipDirection, Point, Range, ScreenPoint, ScreenRange};
use crate::selection::{
    EditContext, InsertOptions, MergeCandidate, Selection, merge_ranges,
    selection_marker_options,
};
use editor_state_lang::LanguageConfig;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cursor moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPositionChange {
    /// The selection owning the cursor.
    pub selection: SelectionId,
    /// Previous buffer position.
    pub old_buffer_position: Point,
    /// New buffer position.
    pub new_buffer_position: Point,
    /// Previous screen position.
    pub old_screen_position: ScreenPoint,
    /// New screen position.
    pub new_screen_position: ScreenPoint,
    /// The move was caused by a text change rather than by cursor motion.
    pub text_changed: bool,
}

/// A selection's range changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRangeChange {
    /// The selection.
    pub selection: SelectionId,
    /// Previous range.
    pub old_range: Range,
    /// New range.
    pub new_range: Range,
}

/// Read-only view of one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    /// Identity, shared with its cursor.
    pub id: SelectionId,
    /// Buffer range.
    pub range: Range,
    /// Head before tail.
    pub reversed: bool,
    /// Cursor position.
    pub head: Point,
    /// Screen column targeted by vertical motion.
    pub goal_column: Option<usize>,
}

#[derive(Default)]
struct SessionEvents {
    cursor_position: Emitter<CursorPositionChange>,
    selection_range: Emitter<SelectionRangeChange>,
    add_selection: Emitter<SelectionId>,
    remove_selection: Emitter<SelectionId>,
    change: Emitter<Vec<DisplayChange>>,
    change_text: Emitter<Vec<TextChange>>,
    stop_changing: Emitter<()>,
    add_decoration: Emitter<Decoration>,
    remove_decoration: Emitter<Decoration>,
    read_only: Emitter<bool>,
    mini: Emitter<bool>,
    terminate_pending: Emitter<()>,
    destroy: Emitter<SessionId>,
}

impl SessionEvents {
    fn clear(&self) {
        self.cursor_position.clear();
        self.selection_range.clear();
        self.add_selection.clear();
        self.remove_selection.clear();
        self.change.clear();
        self.change_text.clear();
        self.stop_changing.clear();
        self.add_decoration.clear();
        self.remove_decoration.clear();
        self.read_only.clear();
        self.mini.clear();
        self.terminate_pending.clear();
        self.destroy.clear();
    }
}

/// Notifications gathered while the document is borrowed, emitted afterwards.
#[derive(Default)]
struct Outbox {
    text: Vec<TextChange>,
    display: Vec<DisplayChange>,
    added: Vec<SelectionId>,
    removed: Vec<SelectionId>,
    cursors: Vec<CursorPositionChange>,
    ranges: Vec<SelectionRangeChange>,
    decorations_added: Vec<Decoration>,
    decorations_removed: Vec<Decoration>,
    terminate_pending: bool,
}

#[derive(Debug, Clone, Copy)]
struct Reported {
    range: Range,
    head: Point,
    screen: ScreenPoint,
}

/// Configures and creates an [`EditorSession`].
pub struct SessionBuilder {
    document: Option<Rc<RefCell<Document>>>,
    text: Option<String>,
    ids: Option<Arc<dyn IdGenerator>>,
    clock: Option<Rc<dyn Clock>>,
    clipboard: Option<Rc<dyn Clipboard>>,
    indent: Rc<dyn IndentPolicy>,
    language: LanguageConfig,
    config: SessionConfig,
    suppress_cursor_creation: bool,
    pending: bool,
    session_id: Option<SessionId>,
    fold_layer: Option<LayerId>,
    selection_layer: Option<LayerId>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            document: None,
            text: None,
            ids: None,
            clock: None,
            clipboard: None,
            indent: Rc::new(PreserveIndent),
            language: LanguageConfig::plain(),
            config: SessionConfig::default(),
            suppress_cursor_creation: false,
            pending: false,
            session_id: None,
            fold_layer: None,
            selection_layer: None,
        }
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("has_document", &self.document.is_some())
            .field("has_clipboard", &self.clipboard.is_some())
            .field("language", &self.language.id)
            .field("config", &self.config)
            .field("pending", &self.pending)
            .finish()
    }
}

impl SessionBuilder {
    /// Edit an existing, possibly shared, document.
    pub fn document(mut self, document: Rc<RefCell<Document>>) -> Self {
        self.document = Some(document);
        self
    }

    /// Start a fresh document holding `text`. Ignored when a document is supplied.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Identity source for the session and, for fresh documents, the document.
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Time source for stopped-changing notifications and fresh documents.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Clipboard used by cut, copy and paste. Required.
    pub fn clipboard(mut self, clipboard: Rc<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    /// Indentation policy; defaults to [`PreserveIndent`].
    pub fn indent_policy(mut self, policy: Rc<dyn IndentPolicy>) -> Self {
        self.indent = policy;
        self
    }

    /// Language settings. Its word separators and indent width take precedence over the
    /// configuration.
    pub fn language(mut self, language: LanguageConfig) -> Self {
        self.language = language;
        self
    }

    /// Initial configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Do not create the initial cursor.
    pub fn suppress_cursor_creation(mut self, suppress: bool) -> Self {
        self.suppress_cursor_creation = suppress;
        self
    }

    /// Start in the pending (preview) state.
    pub fn pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }

    pub(crate) fn session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Reuse existing layers of the document when they are still present.
    pub(crate) fn reattach(mut self, fold_layer: LayerId, selection_layer: LayerId) -> Self {
        self.fold_layer = Some(fold_layer);
        self.selection_layer = Some(selection_layer);
        self
    }

    pub(crate) fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Create the session.
    pub fn build(self) -> Result<EditorSession> {
        let clipboard = self.clipboard.ok_or(EditorError::ClipboardNotConfigured)?;
        let mut config = self.config;
        if let Some(non_word) = &self.language.non_word_characters {
            config.non_word_characters = non_word.clone();
        }
        if let Some(width) = self.language.indent_width {
            config.tab_length = width;
        }
        config.validate()?;

        let document = match self.document {
            Some(document) => document,
            None => {
                let ids: Arc<dyn IdGenerator> = self
                    .ids
                    .clone()
                    .unwrap_or_else(|| Arc::new(SequentialIdGenerator::new()));
                let text = self.text.as_deref().unwrap_or("");
                let document = match &self.clock {
                    Some(clock) => Document::with_services(text, ids, clock.clone()),
                    None => Document::with_ids(text, ids),
                };
                Rc::new(RefCell::new(document))
            }
        };

        let (ids, clock, display, selection_layer, subscriber, adopt) = {
            let mut doc = document.borrow_mut();
            if doc.is_destroyed() {
                return Err(EditorError::DocumentDestroyed(doc.id()));
            }
            doc.retain();
            let ids = self.ids.unwrap_or_else(|| doc.ids());
            let clock = self.clock.unwrap_or_else(|| doc.clock());
            let display = match self.fold_layer.filter(|id| doc.marker_layer(*id).is_some()) {
                Some(fold_layer) => {
                    DisplayLayer::attach(&mut doc, fold_layer, config.display_config())
                }
                None => DisplayLayer::new(&mut doc, config.display_config()),
            };
            let existing = self
                .selection_layer
                .filter(|id| doc.marker_layer(*id).is_some());
            let selection_layer = existing.unwrap_or_else(|| {
                doc.add_marker_layer(LayerOptions {
                    maintain_history: true,
                    destroy_invalidated: false,
                })
            });
            let subscriber = doc.subscribe();
            (ids, clock, display, selection_layer, subscriber, existing.is_some())
        };

        let id = self
            .session_id
            .unwrap_or_else(|| SessionId::next(ids.as_ref()));
        let mut session = EditorSession {
            id,
            document,
            subscriber,
            display,
            selection_layer,
            selections: Vec::new(),
            next_seq: 0,
            config,
            language: self.language,
            indent: self.indent,
            clipboard,
            ids,
            clock,
            decorations: DecorationManager::new(),
            cursor_lines: BTreeMap::new(),
            reported: BTreeMap::new(),
            suppress_cursor_creation: self.suppress_cursor_creation,
            pending: self.pending,
            destroyed: false,
            last_change_at: None,
            first_visible_screen_row: 0,
            events: SessionEvents::default(),
        };
        session.sync();
        tracing::debug!(session = %session.id, adopted = adopt, "editor session created");
        Ok(session)
    }
}

/// One editor's state over a shared document.
pub struct EditorSession {
    id: SessionId,
    document: Rc<RefCell<Document>>,
    subscriber: SubscriberId,
    display: DisplayLayer,
    selection_layer: LayerId,
    selections: Vec<Selection>,
    next_seq: u64,
    config: SessionConfig,
    language: LanguageConfig,
    indent: Rc<dyn IndentPolicy>,
    clipboard: Rc<dyn Clipboard>,
    ids: Arc<dyn IdGenerator>,
    clock: Rc<dyn Clock>,
    decorations: DecorationManager,
    cursor_lines: BTreeMap<SelectionId, DecorationId>,
    reported: BTreeMap<SelectionId, Reported>,
    suppress_cursor_creation: bool,
    pending: bool,
    destroyed: bool,
    last_change_at: Option<Duration>,
    first_visible_screen_row: usize,
    events: SessionEvents,
}

impl fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorSession")
            .field("id", &self.id)
            .field("selections", &self.selections.len())
            .field("config", &self.config)
            .field("pending", &self.pending)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl EditorSession {
    /// Start configuring a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    // --- identity and lifecycle ------------------------------------------------------

    /// Identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The shared document.
    pub fn document(&self) -> Rc<RefCell<Document>> {
        self.document.clone()
    }

    /// The translator's fold layer.
    pub fn fold_layer(&self) -> LayerId {
        self.display.fold_layer()
    }

    /// The layer holding this session's selection markers.
    pub fn selection_layer(&self) -> LayerId {
        self.selection_layer
    }

    /// Returns `true` once [`EditorSession::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Returns `true` while the session is a preview that the next edit makes permanent.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Leave the pending state. Notifies once.
    pub fn terminate_pending_state(&mut self) {
        if self.pending && !self.destroyed {
            self.pending = false;
            self.events.terminate_pending.emit(&());
        }
    }

    /// A new session over the same document with a copy of this session's folds and
    /// selections.
    pub fn copy(&mut self) -> Result<EditorSession> {
        self.sync();
        let (display, selection_layer, subscriber) = {
            let mut doc = self.document.borrow_mut();
            if doc.is_destroyed() {
                return Err(EditorError::DocumentDestroyed(doc.id()));
            }
            let selection_layer = doc
                .copy_marker_layer(self.selection_layer)
                .ok_or(EditorError::UnknownMarkerLayer(self.selection_layer))?;
            doc.retain();
            let display = self.display.copy(&mut doc);
            let subscriber = doc.subscribe();
            (display, selection_layer, subscriber)
        };
        let mut copy = EditorSession {
            id: SessionId::next(self.ids.as_ref()),
            document: self.document.clone(),
            subscriber,
            display,
            selection_layer,
            selections: Vec::new(),
            next_seq: 0,
            config: self.config.clone(),
            language: self.language.clone(),
            indent: self.indent.clone(),
            clipboard: self.clipboard.clone(),
            ids: self.ids.clone(),
            clock: self.clock.clone(),
            decorations: DecorationManager::new(),
            cursor_lines: BTreeMap::new(),
            reported: BTreeMap::new(),
            suppress_cursor_creation: self.suppress_cursor_creation,
            pending: false,
            destroyed: false,
            last_change_at: None,
            first_visible_screen_row: self.first_visible_screen_row,
            events: SessionEvents::default(),
        };
        copy.sync();
        tracing::debug!(session = %self.id, copy = %copy.id, "editor session copied");
        Ok(copy)
    }

    /// Tear the session down: stop listening to the document, destroy the translator and
    /// the selections, release the document, notify destroy observers once, then drop
    /// every observer. Later calls do nothing.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let removed: Vec<SelectionId> = self.selections.iter().map(|s| s.id).collect();
        match self.document.try_borrow_mut() {
            Ok(mut doc) => {
                doc.unsubscribe(self.subscriber);
                self.display.destroy(&mut doc);
                doc.destroy_marker_layer(self.selection_layer);
                self.selections.clear();
                self.decorations.clear();
                self.cursor_lines.clear();
                doc.release();
            }
            Err(_) => {
                tracing::warn!(
                    session = %self.id,
                    "document busy during destroy; layers left in place"
                );
                self.selections.clear();
            }
        }
        for id in &removed {
            self.events.remove_selection.emit(id);
        }
        tracing::debug!(session = %self.id, "editor session destroyed");
        self.events.destroy.emit(&self.id);
        self.events.clear();
    }

    /// Process pending document changes and notify observers.
    pub fn sync(&mut self) {
        if self.destroyed {
            return;
        }
        let mut out = Outbox::default();
        let shared = self.document.clone();
        {
            let Ok(mut guard) = shared.try_borrow_mut() else {
                tracing::trace!(session = %self.id, "document borrowed; sync deferred");
                return;
            };
            let document = &mut *guard;
            if document.is_destroyed() {
                return;
            }
            out.text = document.take_changes(self.subscriber);
            self.display.update(document);
            out.display = self.display.take_changes();
            self.reconcile(document, &mut out);
            self.merge(document, &mut out);
            self.refresh_cursor_lines(document, &mut out);
            self.collect_positions(document, &mut out);
            if !out.text.is_empty() {
                self.last_change_at = Some(self.clock.now());
                if self.pending {
                    self.pending = false;
                    out.terminate_pending = true;
                }
            }
        }
        self.emit(out);
    }

    fn new_selection(&mut self, marker: MarkerId) -> Selection {
        let selection = Selection {
            id: SelectionId::next(self.ids.as_ref()),
            seq: self.next_seq,
            cursor: Cursor::new(marker),
        };
        self.next_seq += 1;
        selection
    }

    /// Drop selections whose marker disappeared and adopt markers that have no selection.
    fn reconcile(&mut self, document: &mut Document, out: &mut Outbox) {
        let orphans: Vec<MarkerId> = {
            let Some(layer) = document.marker_layer(self.selection_layer) else {
                out.removed.extend(self.selections.drain(..).map(|s| s.id));
                return;
            };
            self.selections.retain(|s| {
                let alive = layer.contains(s.marker());
                if !alive {
                    out.removed.push(s.id);
                }
                alive
            });
            let known: BTreeSet<MarkerId> = self.selections.iter().map(Selection::marker).collect();
            let mut orphans: Vec<MarkerId> = layer
                .marker_ids()
                .into_iter()
                .filter(|id| !known.contains(id))
                .collect();
            orphans.sort();
            orphans
        };
        for marker in orphans {
            let selection = self.new_selection(marker);
            out.added.push(selection.id);
            self.selections.push(selection);
        }
        if self.selections.is_empty() && !self.suppress_cursor_creation {
            if let Some(layer) = document.marker_layer_mut(self.selection_layer) {
                let marker =
                    layer.mark_range(Range::empty(Point::ZERO), selection_marker_options());
                let selection = self.new_selection(marker);
                out.added.push(selection.id);
                self.selections.push(selection);
            }
        }
    }

    fn merge(&mut self, document: &mut Document, out: &mut Outbox) {
        let Some(layer) = document.marker_layer_mut(self.selection_layer) else {
            return;
        };
        let candidates: Vec<MergeCandidate> = self
            .selections
            .iter()
            .filter_map(|s| {
                layer.get(s.marker()).map(|m| MergeCandidate {
                    id: s.id,
                    seq: s.seq,
                    range: m.range(),
                })
            })
            .collect();
        let groups = merge_ranges(candidates, true);
        let mut by_id: BTreeMap<SelectionId, Selection> =
            self.selections.drain(..).map(|s| (s.id, s)).collect();
        for group in groups {
            let Some(survivor) = by_id.remove(&group.survivor) else {
                continue;
            };
            if !group.absorbed.is_empty() {
                let current = layer.get(survivor.marker()).map(|m| (m.range(), m.is_reversed()));
                if let Some((range, reversed)) = current
                    && range != group.range
                {
                    layer.set_range(survivor.marker(), group.range, reversed);
                }
                for id in &group.absorbed {
                    if let Some(absorbed) = by_id.remove(id) {
                        layer.destroy_marker(absorbed.marker());
                        out.removed.push(absorbed.id);
                    }
                }
                tracing::trace!(
                    session = %self.id,
                    survivor = %survivor.id,
                    absorbed = group.absorbed.len(),
                    "selections merged"
                );
            }
            self.selections.push(survivor);
        }
    }

    fn refresh_cursor_lines(&mut self, document: &Document, out: &mut Outbox) {
        out.decorations_removed.extend(self.decorations.prune(document));
        let decorations = &self.decorations;
        self.cursor_lines.retain(|_, id| decorations.get(*id).is_some());

        let live: BTreeSet<SelectionId> = self.selections.iter().map(|s| s.id).collect();
        let mini = self.config.mini;
        let stale: Vec<SelectionId> = self
            .cursor_lines
            .keys()
            .filter(|id| mini || !live.contains(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(decoration) = self
                .cursor_lines
                .remove(&id)
                .and_then(|d| self.decorations.destroy_decoration(d))
            {
                out.decorations_removed.push(decoration);
            }
        }
        if mini {
            return;
        }
        for selection in &self.selections {
            if self.cursor_lines.contains_key(&selection.id) {
                continue;
            }
            let decoration = self.decorations.decorate_marker(
                self.ids.as_ref(),
                self.selection_layer,
                selection.marker(),
                DecorationProperties::cursor_line(),
            );
            self.cursor_lines.insert(selection.id, decoration.id);
            out.decorations_added.push(decoration);
        }
    }

    fn collect_positions(&mut self, document: &Document, out: &mut Outbox) {
        let text_changed = !out.text.is_empty();
        let Some(layer) = document.marker_layer(self.selection_layer) else {
            self.reported.clear();
            return;
        };
        let mut next = BTreeMap::new();
        for selection in &self.selections {
            let Some(marker) = layer.get(selection.marker()) else {
                continue;
            };
            let now = Reported {
                range: marker.range(),
                head: marker.head(),
                screen: self.display.translate_to_screen(document, marker.head()),
            };
            if let Some(before) = self.reported.get(&selection.id) {
                if before.head != now.head || before.screen != now.screen {
                    out.cursors.push(CursorPositionChange {
                        selection: selection.id,
                        old_buffer_position: before.head,
                        new_buffer_position: now.head,
                        old_screen_position: before.screen,
                        new_screen_position: now.screen,
                        text_changed,
                    });
                }
                if before.range != now.range {
                    out.ranges.push(SelectionRangeChange {
                        selection: selection.id,
                        old_range: before.range,
                        new_range: now.range,
                    });
                }
            }
            next.insert(selection.id, now);
        }
        self.reported = next;
    }

    fn emit(&self, out: Outbox) {
        for id in &out.removed {
            self.events.remove_selection.emit(id);
        }
        for id in &out.added {
            self.events.add_selection.emit(id);
        }
        if !out.text.is_empty() {
            self.events.change_text.emit(&out.text);
        }
        if !out.display.is_empty() {
            self.events.change.emit(&out.display);
        }
        for decoration in &out.decorations_removed {
            self.events.remove_decoration.emit(decoration);
        }
        for decoration in &out.decorations_added {
            self.events.add_decoration.emit(decoration);
        }
        for change in &out.cursors {
            self.events.cursor_position.emit(change);
        }
        for change in &out.ranges {
            self.events.selection_range.emit(change);
        }
        if out.terminate_pending {
            self.events.terminate_pending.emit(&());
        }
    }

    /// Notify stopped-changing observers if the quiet interval has passed since the last
    /// text change. Returns `true` if they were notified.
    pub fn tick(&mut self) -> bool {
        self.sync();
        let Some(at) = self.last_change_at else {
            return false;
        };
        if self.clock.now().saturating_sub(at) < STOPPED_CHANGING_INTERVAL {
            return false;
        }
        self.last_change_at = None;
        self.events.stop_changing.emit(&());
        true
    }

    /// Lay out rows ahead of demand until `deadline`. Returns `true` if rows remain.
    pub fn do_background_work(&mut self, deadline: Instant) -> bool {
        self.sync();
        let doc = self.document.borrow();
        self.display.do_background_work(&doc, deadline)
    }

    // --- configuration ---------------------------------------------------------------

    /// Current configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Language settings.
    pub fn language(&self) -> &LanguageConfig {
        &self.language
    }

    /// Replace the language settings.
    pub fn set_language(&mut self, language: LanguageConfig) {
        if let Some(non_word) = &language.non_word_characters {
            self.config.non_word_characters = non_word.clone();
        }
        self.language = language;
    }

    /// Apply a configuration patch atomically. Every layout-affecting change is folded into
    /// a single translator reset.
    pub fn update(&mut self, patch: &ConfigPatch) -> Result<ConfigUpdate> {
        self.sync();
        let update = self.config.apply(patch)?;
        if update.is_empty() {
            return Ok(update);
        }
        if update.relayout {
            self.display.reset(self.config.display_config());
        }
        tracing::debug!(
            session = %self.id,
            changed = ?update.changed,
            relayout = update.relayout,
            "session config updated"
        );
        self.sync();
        if update.contains("read_only") {
            self.events.read_only.emit(&self.config.read_only);
        }
        if update.contains("mini") {
            self.events.mini.emit(&self.config.mini);
        }
        Ok(update)
    }

    /// Apply a configuration patch given as a JSON object.
    pub fn update_json(&mut self, json: &str) -> Result<ConfigUpdate> {
        let patch = ConfigPatch::from_json(json)?;
        self.update(&patch)
    }

    /// Returns `true` if mutations are rejected.
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Toggle the read-only facet.
    pub fn set_read_only(&mut self, read_only: bool) -> Result<ConfigUpdate> {
        self.update(&ConfigPatch {
            read_only: Some(read_only),
            ..ConfigPatch::default()
        })
    }

    /// Returns `true` in single-line entry mode.
    pub fn is_mini(&self) -> bool {
        self.config.mini
    }

    /// Toggle single-line entry mode. A mini session never wraps, has no cursor-line
    /// decorations, ignores line-oriented operations and drops inserted line breaks.
    pub fn set_mini(&mut self, mini: bool) -> Result<ConfigUpdate> {
        self.update(&ConfigPatch {
            mini: Some(mini),
            ..ConfigPatch::default()
        })
    }

    /// First screen row the host shows, as last recorded.
    pub fn first_visible_screen_row(&self) -> usize {
        self.first_visible_screen_row
    }

    /// Record the first screen row the host shows.
    pub fn set_first_visible_screen_row(&mut self, row: usize) {
        self.first_visible_screen_row = row;
    }

    /// `Ok(true)` if a mutation may proceed. A read-only session rejects it with
    /// [`EditorError::ReadOnly`] in debug builds and ignores it otherwise.
    fn check_writable(&self, bypass_read_only: bool) -> Result<bool> {
        if !self.config.read_only || bypass_read_only {
            return Ok(true);
        }
        if cfg!(debug_assertions) {
            Err(EditorError::ReadOnly)
        } else {
            tracing::warn!(session = %self.id, "mutation of a read-only session ignored");
            Ok(false)
        }
    }

    /// `false` in mini mode, where line-oriented operations do nothing.
    fn allows_line_operations(&self, operation: &'static str) -> bool {
        if self.config.mini {
            tracing::trace!(session = %self.id, operation, "line operation ignored in mini mode");
            return false;
        }
        true
    }

    /// `text` with its line breaks removed in mini mode.
    fn single_line<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.config.mini && text.contains(['\n', '\r']) {
            Cow::Owned(text.replace(['\n', '\r'], ""))
        } else {
            Cow::Borrowed(text)
        }
    }

    // --- edit plumbing ---------------------------------------------------------------

    /// Run `f` over every selection inside one transaction. If `f` fails, the transaction
    /// is rolled back and the error returned.
    fn edit<T: Default>(
        &mut self,
        bypass_read_only: bool,
        f: impl FnOnce(&mut EditContext<'_>, &mut [Selection]) -> Result<T>,
    ) -> Result<T> {
        if self.destroyed || !self.check_writable(bypass_read_only)? {
            return Ok(T::default());
        }
        self.sync();
        let interval = self.config.undo_grouping_interval();
        let mut selections = std::mem::take(&mut self.selections);
        let result = {
            let mut guard = self.document.borrow_mut();
            let document = &mut *guard;
            if document.is_destroyed() {
                Err(EditorError::DocumentDestroyed(document.id()))
            } else {
                document.begin_transaction(interval);
                let result = {
                    let mut context = EditContext {
                        document: &mut *document,
                        display: &mut self.display,
                        layer: self.selection_layer,
                        config: &self.config,
                        language: &self.language,
                        indent: self.indent.as_ref(),
                    };
                    f(&mut context, selections.as_mut_slice())
                };
                if result.is_ok() {
                    document.commit_transaction();
                } else {
                    document.abort_transaction();
                }
                result
            }
        };
        self.selections = selections;
        self.sync();
        result
    }

    /// Run `f` over every selection without editing text. Breaks undo grouping.
    fn shape<T>(&mut self, f: impl FnOnce(&mut EditContext<'_>, &mut [Selection]) -> T) -> T {
        self.sync();
        let mut selections = std::mem::take(&mut self.selections);
        let value = {
            let mut guard = self.document.borrow_mut();
            let document = &mut *guard;
            if !self.destroyed {
                document.break_undo_grouping();
            }
            let mut context = EditContext {
                document,
                display: &mut self.display,
                layer: self.selection_layer,
                config: &self.config,
                language: &self.language,
                indent: self.indent.as_ref(),
            };
            f(&mut context, selections.as_mut_slice())
        };
        self.selections = selections;
        self.sync();
        value
    }

    /// Run `f` as one transaction grouped with the configured interval. Nested
    /// transactions flatten into the outermost; if `f` fails every change it made is
    /// rolled back.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut EditorSession) -> Result<T>) -> Result<T> {
        let interval = self.config.undo_grouping_interval();
        self.transact_grouped(interval, f)
    }

    /// [`EditorSession::transact`] with an explicit grouping interval.
    pub fn transact_grouped<T>(
        &mut self,
        grouping_interval: Duration,
        f: impl FnOnce(&mut EditorSession) -> Result<T>,
    ) -> Result<T> {
        if self.destroyed {
            return f(self);
        }
        self.sync();
        self.document
            .borrow_mut()
            .begin_transaction(grouping_interval);
        let result = f(self);
        {
            let mut doc = self.document.borrow_mut();
            if result.is_ok() {
                doc.commit_transaction();
            } else {
                doc.abort_transaction();
            }
        }
        self.sync();
        result
    }

    // --- history ---------------------------------------------------------------------

    fn history(&mut self, f: impl FnOnce(&mut Document) -> Result<bool>) -> Result<bool> {
        if self.destroyed || !self.check_writable(false)? {
            return Ok(false);
        }
        self.sync();
        let done = f(&mut *self.document.borrow_mut())?;
        self.sync();
        Ok(done)
    }

    /// Revert the last undo entry, restoring selections. Returns `false` if there was
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.history(Document::undo)
    }

    /// Reapply the last undone entry. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.history(Document::redo)
    }

    /// Mark the current position in history. `None` once the session is destroyed.
    pub fn create_checkpoint(&mut self) -> Option<CheckpointId> {
        if self.destroyed {
            return None;
        }
        Some(self.document.borrow_mut().create_checkpoint())
    }

    /// Revert everything recorded after `checkpoint`.
    pub fn revert_to_checkpoint(&mut self, checkpoint: CheckpointId) -> Result<bool> {
        self.history(|doc| doc.revert_to_checkpoint(checkpoint))
    }

    /// Merge everything recorded after `checkpoint` into one undo entry.
    pub fn group_changes_since_checkpoint(&mut self, checkpoint: CheckpointId) -> bool {
        if self.destroyed {
            return false;
        }
        self.document
            .borrow_mut()
            .group_changes_since_checkpoint(checkpoint)
    }

    // --- text ------------------------------------------------------------------------

    /// Whole document text.
    pub fn text(&self) -> String {
        self.document.borrow().text()
    }

    /// Text of buffer row `row`.
    pub fn line(&self, row: usize) -> String {
        self.document.borrow().line(row)
    }

    /// Number of buffer rows.
    pub fn line_count(&self) -> usize {
        self.document.borrow().line_count()
    }

    /// Replace the whole text.
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        let text = self.single_line(text).into_owned();
        self.edit(false, |context, _| {
            context.document.set_text(&text)?;
            Ok(())
        })
    }

    /// Replace the text of `range`, independent of the selections.
    pub fn set_text_in_buffer_range(&mut self, range: Range, text: &str) -> Result<Range> {
        let text = self.single_line(text).into_owned();
        self.edit(false, |context, _| {
            context.document.set_text_in_range(range, &text)
        })
    }

    // --- selection edits -------------------------------------------------------------

    /// Replace every selection with `text`.
    pub fn insert_text(&mut self, text: &str) -> Result<()> {
        self.insert_text_with(text, InsertOptions::default())
    }

    /// Replace every selection with `text`, with options. Line breaks are dropped in mini
    /// mode.
    pub fn insert_text_with(&mut self, text: &str, options: InsertOptions) -> Result<()> {
        let text = self.single_line(text).into_owned();
        self.edit(options.bypass_read_only, |context, selections| {
            for selection in selections.iter_mut() {
                context.insert_text(selection, &text, options)?;
            }
            Ok(())
        })
    }

    /// Insert an auto-indented line break at every selection. Does nothing in mini mode.
    pub fn insert_newline(&mut self) -> Result<()> {
        if !self.allows_line_operations("insert_newline") {
            return Ok(());
        }
        self.edit(false, |context, selections| {
            for selection in selections.iter_mut() {
                context.insert_newline(selection)?;
            }
            Ok(())
        })
    }

    fn each(
        &mut self,
        op: fn(&mut EditContext<'_>, &mut Selection) -> Result<()>,
    ) -> Result<()> {
        self.edit(false, |context, selections| {
            for selection in selections.iter_mut() {
                op(context, selection)?;
            }
            Ok(())
        })
    }

    /// Delete the selections or the character after each cursor.
    pub fn delete(&mut self) -> Result<()> {
        self.each(|context, selection| context.delete(selection))
    }

    /// Delete the selections or the character before each cursor.
    pub fn backspace(&mut self) -> Result<()> {
        self.each(|context, selection| context.backspace(selection))
    }

    /// Delete back to the beginning of the word.
    pub fn delete_to_beginning_of_word(&mut self) -> Result<()> {
        self.each(|context, selection| context.delete_to_beginning_of_word(selection))
    }

    /// Delete forward to the end of the word.
    pub fn delete_to_end_of_word(&mut self) -> Result<()> {
        self.each(|context, selection| context.delete_to_end_of_word(selection))
    }

    /// Delete back to the beginning of the row.
    pub fn delete_to_beginning_of_line(&mut self) -> Result<()> {
        self.each(|context, selection| context.delete_to_beginning_of_line(selection))
    }

    /// Delete forward to the end of the row.
    pub fn delete_to_end_of_line(&mut self) -> Result<()> {
        self.each(|context, selection| context.delete_to_end_of_line(selection))
    }

    /// Delete every row touched by a selection.
    pub fn delete_line(&mut self) -> Result<()> {
        if !self.allows_line_operations("delete_line") {
            return Ok(());
        }
        self.edit(false, |context, selections| context.delete_lines(selections))
    }

    /// Indent at empty cursors and indent the rows of non-empty selections.
    pub fn indent(&mut self) -> Result<()> {
        self.edit(false, |context, selections| context.indent(selections))
    }

    /// Remove one indentation unit from every selected row.
    pub fn outdent(&mut self) -> Result<()> {
        self.edit(false, |context, selections| context.outdent(selections))
    }

    /// Re-indent every selected row through the indent policy.
    pub fn auto_indent_selected_rows(&mut self) -> Result<()> {
        if !self.allows_line_operations("auto_indent_selected_rows") {
            return Ok(());
        }
        self.edit(false, |context, selections| {
            context.auto_indent_selected_rows(selections)
        })
    }

    /// Upper-case the selections (or the words under empty cursors).
    pub fn upper_case(&mut self) -> Result<()> {
        self.each(|context, selection| context.change_case(selection, true))
    }

    /// Lower-case the selections (or the words under empty cursors).
    pub fn lower_case(&mut self) -> Result<()> {
        self.each(|context, selection| context.change_case(selection, false))
    }

    /// Move the selected rows up one display line.
    pub fn move_line_up(&mut self) -> Result<()> {
        if !self.allows_line_operations("move_line_up") {
            return Ok(());
        }
        self.edit(false, |context, selections| context.move_lines_up(selections))
    }

    /// Move the selected rows down one display line.
    pub fn move_line_down(&mut self) -> Result<()> {
        if !self.allows_line_operations("move_line_down") {
            return Ok(());
        }
        self.edit(false, |context, selections| context.move_lines_down(selections))
    }

    /// Duplicate the selected rows below themselves.
    pub fn duplicate_lines(&mut self) -> Result<()> {
        if !self.allows_line_operations("duplicate_lines") {
            return Ok(());
        }
        self.edit(false, |context, selections| context.duplicate_lines(selections))
    }

    /// Join each selection's rows (or the cursor row with the next).
    pub fn join_lines(&mut self) -> Result<()> {
        if !self.allows_line_operations("join_lines") {
            return Ok(());
        }
        self.each(|context, selection| context.join_lines(selection))
    }

    /// Comment or uncomment the selected rows.
    pub fn toggle_line_comments(&mut self) -> Result<()> {
        if !self.allows_line_operations("toggle_line_comments") {
            return Ok(());
        }
        self.edit(false, |context, selections| {
            context.toggle_line_comments(selections)
        })
    }

    /// Copy the selections to the clipboard and delete them.
    pub fn cut_selected_text(&mut self) -> Result<()> {
        let entry = self.edit(false, |context, selections| context.cut(selections))?;
        if !entry.selections.is_empty() {
            self.clipboard.write(entry);
        }
        Ok(())
    }

    /// Copy the selections to the clipboard.
    pub fn copy_selected_text(&mut self) {
        let entry = self.shape(|context, selections| context.clipboard_entry(selections));
        self.clipboard.write(entry);
    }

    /// Paste the clipboard at every selection.
    pub fn paste_text(&mut self) -> Result<()> {
        let Some(mut entry) = self.clipboard.read() else {
            return Ok(());
        };
        if self.config.mini {
            entry.text = self.single_line(&entry.text).into_owned();
            for piece in &mut entry.selections {
                *piece = self.single_line(piece).into_owned();
            }
            entry.full_line = false;
        }
        self.edit(false, |context, selections| context.paste(selections, &entry))
    }

    // --- selections ------------------------------------------------------------------

    /// Every selection, ordered by position.
    pub fn selections(&mut self) -> Vec<SelectionState> {
        self.sync();
        let doc = self.document.borrow();
        let Some(layer) = doc.marker_layer(self.selection_layer) else {
            return Vec::new();
        };
        self.selections
            .iter()
            .filter_map(|s| {
                let marker = layer.get(s.marker())?;
                Some(SelectionState {
                    id: s.id,
                    range: marker.range(),
                    reversed: marker.is_reversed(),
                    head: marker.head(),
                    goal_column: s.cursor.goal_column,
                })
            })
            .collect()
    }

    /// Number of selections.
    pub fn selection_count(&mut self) -> usize {
        self.sync();
        self.selections.len()
    }

    /// Ranges of every selection, ordered by position.
    pub fn selected_buffer_ranges(&mut self) -> Vec<Range> {
        self.selections().into_iter().map(|s| s.range).collect()
    }

    /// Cursor positions, ordered by position.
    pub fn cursor_buffer_positions(&mut self) -> Vec<Point> {
        self.selections().into_iter().map(|s| s.head).collect()
    }

    /// Cursor screen positions, ordered by position.
    pub fn cursor_screen_positions(&mut self) -> Vec<ScreenPoint> {
        let heads = self.cursor_buffer_positions();
        let doc = self.document.borrow();
        heads
            .into_iter()
            .map(|head| self.display.translate_to_screen(&doc, head))
            .collect()
    }

    /// Text of every selection joined by newlines.
    pub fn selected_text(&mut self) -> String {
        let ranges = self.selected_buffer_ranges();
        let doc = self.document.borrow();
        ranges
            .into_iter()
            .map(|r| doc.text_in_range(r))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn selection_state(&mut self, id: SelectionId) -> Result<SelectionState> {
        self.selections()
            .into_iter()
            .find(|s| s.id == id)
            .ok_or(EditorError::UnknownSelection(id))
    }

    /// Range of selection `id`.
    pub fn selection_range(&mut self, id: SelectionId) -> Result<Range> {
        Ok(self.selection_state(id)?.range)
    }

    /// Text of selection `id`.
    pub fn selection_text(&mut self, id: SelectionId) -> Result<String> {
        let range = self.selection_range(id)?;
        Ok(self.document.borrow().text_in_range(range))
    }

    /// Returns `true` if selection `id` is empty.
    pub fn is_selection_empty(&mut self, id: SelectionId) -> Result<bool> {
        Ok(self.selection_state(id)?.range.is_empty())
    }

    /// Returns `true` if the head of selection `id` precedes its tail.
    pub fn is_selection_reversed(&mut self, id: SelectionId) -> Result<bool> {
        Ok(self.selection_state(id)?.reversed)
    }

    /// Add a selection. Returns its id; it may be merged away immediately if it overlaps
    /// an older selection.
    pub fn add_selection_for_buffer_range(&mut self, range: Range, reversed: bool) -> SelectionId {
        if self.destroyed {
            return SelectionId(0);
        }
        let marker = {
            let mut doc = self.document.borrow_mut();
            let range = doc.clip_range(range);
            doc.break_undo_grouping();
            doc.marker_layer_mut(self.selection_layer).map(|layer| {
                layer.mark_range(range, selection_marker_options().reversed(reversed))
            })
        };
        let Some(marker) = marker else {
            return SelectionId(0);
        };
        let selection = self.new_selection(marker);
        let id = selection.id;
        self.selections.push(selection);
        self.events.add_selection.emit(&id);
        self.sync();
        id
    }

    /// Add an empty selection at `point`.
    pub fn add_cursor_at_buffer_position(&mut self, point: Point) -> SelectionId {
        self.add_selection_for_buffer_range(Range::empty(point), false)
    }

    /// Destroy selection `id`. The last selection cannot be removed.
    pub fn remove_selection(&mut self, id: SelectionId) -> Result<bool> {
        let index = self
            .selections
            .iter()
            .position(|s| s.id == id)
            .ok_or(EditorError::UnknownSelection(id))?;
        if self.selections.len() == 1 {
            return Ok(false);
        }
        let selection = self.selections.remove(index);
        if let Some(layer) = self
            .document
            .borrow_mut()
            .marker_layer_mut(self.selection_layer)
        {
            layer.destroy_marker(selection.marker());
        }
        self.events.remove_selection.emit(&id);
        self.sync();
        Ok(true)
    }

    /// Move selection `id`.
    pub fn set_selection_buffer_range(
        &mut self,
        id: SelectionId,
        range: Range,
        reversed: bool,
    ) -> Result<()> {
        if !self.selections.iter().any(|s| s.id == id) {
            return Err(EditorError::UnknownSelection(id));
        }
        self.shape(|context, selections| {
            if let Some(selection) = selections.iter_mut().find(|s| s.id == id) {
                context.set_range(selection, range, reversed);
                selection.cursor.goal_column = None;
            }
        });
        Ok(())
    }

    /// Keep only the oldest selection. Returns `true` if others were removed.
    pub fn consolidate_selections(&mut self) -> bool {
        self.sync();
        if self.selections.len() < 2 {
            return false;
        }
        let oldest = self
            .selections
            .iter()
            .min_by_key(|s| s.seq)
            .map(|s| s.id);
        let (keep, removed): (Vec<Selection>, Vec<Selection>) =
            std::mem::take(&mut self.selections)
                .into_iter()
                .partition(|s| Some(s.id) == oldest);
        self.selections = keep;
        {
            let mut doc = self.document.borrow_mut();
            if let Some(layer) = doc.marker_layer_mut(self.selection_layer) {
                for selection in &removed {
                    layer.destroy_marker(selection.marker());
                }
            }
        }
        for selection in &removed {
            self.events.remove_selection.emit(&selection.id);
        }
        self.sync();
        true
    }

    /// Replace every selection with one covering `range`.
    pub fn set_selected_buffer_range(&mut self, range: Range, reversed: bool) {
        self.set_selected_buffer_ranges(&[(range, reversed)]);
    }

    /// Replace the selections with one per range, reusing existing selections in order.
    pub fn set_selected_buffer_ranges(&mut self, ranges: &[(Range, bool)]) {
        if ranges.is_empty() || self.destroyed {
            return;
        }
        self.sync();
        let surplus = if self.selections.len() > ranges.len() {
            self.selections.split_off(ranges.len())
        } else {
            Vec::new()
        };
        let mut created = Vec::new();
        {
            let mut guard = self.document.borrow_mut();
            let document = &mut *guard;
            document.break_undo_grouping();
            let clipped: Vec<(Range, bool)> = ranges
                .iter()
                .map(|(range, reversed)| (document.clip_range(*range), *reversed))
                .collect();
            let Some(layer) = document.marker_layer_mut(self.selection_layer) else {
                return;
            };
            for selection in &surplus {
                layer.destroy_marker(selection.marker());
            }
            for (selection, (range, reversed)) in self.selections.iter_mut().zip(&clipped) {
                layer.set_range(selection.marker(), *range, *reversed);
                selection.cursor.goal_column = None;
            }
            for (range, reversed) in clipped.iter().skip(self.selections.len()) {
                let options = selection_marker_options().reversed(*reversed);
                created.push(layer.mark_range(*range, options));
            }
        }
        for selection in &surplus {
            self.events.remove_selection.emit(&selection.id);
        }
        for marker in created {
            let selection = self.new_selection(marker);
            self.events.add_selection.emit(&selection.id);
            self.selections.push(selection);
        }
        self.sync();
    }

    /// Collapse to one cursor at `point`.
    pub fn set_cursor_buffer_position(&mut self, point: Point) {
        self.set_selected_buffer_range(Range::empty(point), false);
    }

    /// Collapse to one cursor at the buffer position under `screen`.
    pub fn set_cursor_screen_position(&mut self, screen: ScreenPoint) {
        self.sync();
        let point = {
            let doc = self.document.borrow();
            self.display
                .translate_to_buffer(&doc, screen, ClipDirection::Closest)
        };
        self.set_cursor_buffer_position(point);
    }

    /// Move every cursor, collapsing its selection.
    pub fn move_cursors(&mut self, motion: Motion, count: usize) {
        self.shape(|context, selections| {
            for selection in selections.iter_mut() {
                context.move_cursor(selection, motion, count);
            }
        });
    }

    /// Extend every selection by moving its head.
    pub fn select_to(&mut self, motion: Motion, count: usize) {
        self.shape(|context, selections| {
            for selection in selections.iter_mut() {
                context.select_to(selection, motion, count);
            }
        });
    }

    /// Select the word under each cursor.
    pub fn select_word(&mut self) {
        self.shape(|context, selections| {
            for selection in selections.iter_mut() {
                context.select_word(selection);
            }
        });
    }

    /// Extend each selection to whole rows.
    pub fn select_line(&mut self) {
        self.shape(|context, selections| {
            for selection in selections.iter_mut() {
                context.select_line(selection);
            }
        });
    }

    /// Select the whole document with one selection.
    pub fn select_all(&mut self) {
        let end = self.document.borrow().max_point();
        self.set_selected_buffer_range(Range::new(Point::ZERO, end), false);
    }

    /// Collapse every selection onto its head.
    pub fn clear_selections(&mut self) {
        self.shape(|context, selections| {
            for selection in selections.iter_mut() {
                context.clear(selection);
            }
        });
    }

    fn add_selections_beside(&mut self, below: bool) {
        let additions: Vec<(Range, bool, Option<usize>)> = self.shape(|context, selections| {
            selections
                .iter()
                .filter_map(|selection| {
                    let range = context.range_beside(selection, below)?;
                    Some((
                        range,
                        context.is_reversed(selection),
                        selection.cursor.goal_column,
                    ))
                })
                .collect()
        });
        for (range, reversed, goal) in additions {
            let id = self.add_selection_for_buffer_range(range, reversed);
            if let Some(selection) = self.selections.iter_mut().find(|s| s.id == id) {
                selection.cursor.goal_column = goal;
            }
        }
    }

    /// Add a selection on the screen row below each selection.
    pub fn add_selection_below(&mut self) {
        self.add_selections_beside(true);
    }

    /// Add a selection on the screen row above each selection.
    pub fn add_selection_above(&mut self) {
        self.add_selections_beside(false);
    }

    // --- folds -----------------------------------------------------------------------

    /// Fold `range`.
    pub fn fold_buffer_range(&mut self, range: Range) -> Option<MarkerId> {
        if self.destroyed {
            return None;
        }
        let marker = {
            let mut doc = self.document.borrow_mut();
            self.display.fold_buffer_range(&mut doc, range)
        };
        self.sync();
        marker
    }

    /// Fold every non-empty selection.
    pub fn fold_selected_ranges(&mut self) -> usize {
        let ranges: Vec<Range> = self
            .selected_buffer_ranges()
            .into_iter()
            .filter(|r| !r.is_empty())
            .collect();
        ranges
            .into_iter()
            .filter_map(|range| self.fold_buffer_range(range))
            .count()
    }

    /// Destroy folds touching `range`.
    pub fn destroy_folds_intersecting_buffer_range(&mut self, range: Range) -> Vec<Range> {
        if self.destroyed {
            return Vec::new();
        }
        let ranges = {
            let mut doc = self.document.borrow_mut();
            self.display
                .destroy_folds_intersecting_buffer_range(&mut doc, range)
        };
        self.sync();
        ranges
    }

    /// Unfold every fold covering `row`.
    pub fn unfold_buffer_row(&mut self, row: usize) -> Vec<Range> {
        if self.destroyed {
            return Vec::new();
        }
        let ranges = {
            let mut doc = self.document.borrow_mut();
            self.display.unfold_buffer_row(&mut doc, row)
        };
        self.sync();
        ranges
    }

    /// Unfold everything.
    pub fn unfold_all(&mut self) -> usize {
        if self.destroyed {
            return 0;
        }
        let count = {
            let mut doc = self.document.borrow_mut();
            self.display.unfold_all(&mut doc)
        };
        self.sync();
        count
    }

    /// Every fold, ordered by position.
    pub fn folds(&self) -> Vec<Range> {
        self.display.folds(&self.document.borrow())
    }

    /// Returns `true` if a fold covers part of `row`.
    pub fn is_folded_at_buffer_row(&self, row: usize) -> bool {
        self.display
            .is_folded_at_buffer_row(&self.document.borrow(), row)
    }

    // --- translation -----------------------------------------------------------------

    /// Screen position of a buffer position.
    pub fn screen_position_for_buffer_position(&mut self, point: Point) -> ScreenPoint {
        self.sync();
        self.display
            .translate_to_screen(&self.document.borrow(), point)
    }

    /// Buffer position under a screen position.
    pub fn buffer_position_for_screen_position(
        &mut self,
        screen: ScreenPoint,
        clip: ClipDirection,
    ) -> Point {
        self.sync();
        self.display
            .translate_to_buffer(&self.document.borrow(), screen, clip)
    }

    /// Screen range of a buffer range.
    pub fn screen_range_for_buffer_range(&mut self, range: Range) -> ScreenRange {
        self.sync();
        self.display
            .translate_range_to_screen(&self.document.borrow(), range)
    }

    /// Buffer range of a screen range.
    pub fn buffer_range_for_screen_range(&mut self, range: ScreenRange) -> Range {
        self.sync();
        self.display
            .translate_range_to_buffer(&self.document.borrow(), range)
    }

    /// Nearest screen position a cursor may occupy.
    pub fn clip_screen_position(
        &mut self,
        screen: ScreenPoint,
        clip: ClipDirection,
    ) -> ScreenPoint {
        self.sync();
        self.display
            .clip_screen_position(&self.document.borrow(), screen, clip)
    }

    /// Number of screen rows.
    pub fn screen_line_count(&mut self) -> usize {
        self.sync();
        self.display.screen_line_count(&self.document.borrow())
    }

    /// Rendered content of one screen row.
    pub fn screen_line(&mut self, row: usize) -> Option<ScreenLine> {
        self.sync();
        self.display.screen_line(&self.document.borrow(), row)
    }

    /// Rendered content of screen rows `start..end`.
    pub fn screen_lines(&mut self, start: usize, end: usize) -> Vec<ScreenLine> {
        self.sync();
        self.display
            .screen_lines(&self.document.borrow(), start, end)
    }

    /// Buffer row rendered at the start of `screen_row`.
    pub fn buffer_row_for_screen_row(&mut self, screen_row: usize) -> usize {
        self.sync();
        self.display
            .buffer_row_for_screen_row(&self.document.borrow(), screen_row)
    }

    /// First screen row rendering `buffer_row`.
    pub fn screen_row_for_buffer_row(&mut self, buffer_row: usize) -> usize {
        self.sync();
        self.display
            .screen_row_for_buffer_row(&self.document.borrow(), buffer_row)
    }

    // --- decorations -----------------------------------------------------------------

    /// Decorate a marker of any layer of the document.
    pub fn decorate_marker(
        &mut self,
        layer: LayerId,
        marker: MarkerId,
        properties: DecorationProperties,
    ) -> Result<Decoration> {
        if self.destroyed {
            return Err(EditorError::SessionDestroyed(self.id));
        }
        let known = self
            .document
            .borrow()
            .marker_layer(layer)
            .map(|l| l.contains(marker));
        match known {
            None => return Err(EditorError::UnknownMarkerLayer(layer)),
            Some(false) => {
                tracing::debug!(
                    session = %self.id,
                    %marker,
                    "decorating a marker that does not exist"
                );
            }
            Some(true) => {}
        }
        let decoration = self
            .decorations
            .decorate_marker(self.ids.as_ref(), layer, marker, properties);
        self.events.add_decoration.emit(&decoration);
        Ok(decoration)
    }

    /// Remove a decoration.
    pub fn destroy_decoration(&mut self, id: DecorationId) -> Option<Decoration> {
        if self.destroyed {
            return None;
        }
        let decoration = self.decorations.destroy_decoration(id)?;
        self.cursor_lines.retain(|_, d| *d != id);
        self.events.remove_decoration.emit(&decoration);
        Some(decoration)
    }

    /// Every decoration.
    pub fn decorations(&self) -> Vec<Decoration> {
        self.decorations.iter().cloned().collect()
    }

    /// Decorations applying to screen rows `start..=end`.
    pub fn decorations_for_screen_row_range(
        &mut self,
        start: usize,
        end: usize,
    ) -> Vec<ScreenDecoration> {
        self.sync();
        self.decorations.decorations_for_screen_row_range(
            &self.document.borrow(),
            &self.display,
            start,
            end,
        )
    }

    // --- events ----------------------------------------------------------------------

    /// A cursor moved.
    pub fn on_did_change_cursor_position(
        &self,
        callback: impl FnMut(&CursorPositionChange) + 'static,
    ) -> Subscription {
        self.events.cursor_position.subscribe(callback)
    }

    /// A selection's range changed.
    pub fn on_did_change_selection_range(
        &self,
        callback: impl FnMut(&SelectionRangeChange) + 'static,
    ) -> Subscription {
        self.events.selection_range.subscribe(callback)
    }

    /// A selection was added.
    pub fn on_did_add_selection(
        &self,
        callback: impl FnMut(&SelectionId) + 'static,
    ) -> Subscription {
        self.events.add_selection.subscribe(callback)
    }

    /// A selection was removed (merged, destroyed or dropped with the session).
    pub fn on_did_remove_selection(
        &self,
        callback: impl FnMut(&SelectionId) + 'static,
    ) -> Subscription {
        self.events.remove_selection.subscribe(callback)
    }

    /// The screen changed; receives the translator's change records.
    pub fn on_did_change(
        &self,
        callback: impl FnMut(&Vec<DisplayChange>) + 'static,
    ) -> Subscription {
        self.events.change.subscribe(callback)
    }

    /// The text changed; receives the committed changes in order.
    pub fn on_did_change_text(
        &self,
        callback: impl FnMut(&Vec<TextChange>) + 'static,
    ) -> Subscription {
        self.events.change_text.subscribe(callback)
    }

    /// No text change for the quiet interval, as observed by [`EditorSession::tick`].
    pub fn on_did_stop_changing(&self, callback: impl FnMut(&()) + 'static) -> Subscription {
        self.events.stop_changing.subscribe(callback)
    }

    /// A decoration was added.
    pub fn on_did_add_decoration(
        &self,
        callback: impl FnMut(&Decoration) + 'static,
    ) -> Subscription {
        self.events.add_decoration.subscribe(callback)
    }

    /// A decoration was removed.
    pub fn on_did_remove_decoration(
        &self,
        callback: impl FnMut(&Decoration) + 'static,
    ) -> Subscription {
        self.events.remove_decoration.subscribe(callback)
    }

    /// The read-only facet changed.
    pub fn on_did_change_read_only(&self, callback: impl FnMut(&bool) + 'static) -> Subscription {
        self.events.read_only.subscribe(callback)
    }

    /// The mini facet changed.
    pub fn on_did_change_mini(&self, callback: impl FnMut(&bool) + 'static) -> Subscription {
        self.events.mini.subscribe(callback)
    }

    /// The pending state ended.
    pub fn on_did_terminate_pending_state(
        &self,
        callback: impl FnMut(&()) + 'static,
    ) -> Subscription {
        self.events.terminate_pending.subscribe(callback)
    }

    /// The session was destroyed. Fires once.
    pub fn on_did_destroy(&self, callback: impl FnMut(&SessionId) + 'static) -> Subscription {
        self.events.destroy.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::ids::ManualClock;
    use std::cell::Cell;

    fn session(text: &str) -> EditorSession {
        EditorSession::builder()
            .text(text)
            .ids(Arc::new(SequentialIdGenerator::new()))
            .clipboard(Rc::new(MemoryClipboard::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_clipboard() {
        let err = EditorSession::builder().text("x").build().unwrap_err();
        assert!(matches!(err, EditorError::ClipboardNotConfigured));
    }

    #[test]
    fn test_initial_cursor_and_suppression() {
        let mut s = session("abc");
        assert_eq!(s.cursor_buffer_positions(), vec![Point::ZERO]);

        let mut bare = EditorSession::builder()
            .text("abc")
            .clipboard(Rc::new(MemoryClipboard::new()))
            .suppress_cursor_creation(true)
            .build()
            .unwrap();
        assert!(bare.selections().is_empty());
    }

    #[test]
    fn test_multi_cursor_insert() {
        let mut s = session("ab\ncd");
        s.set_selected_buffer_ranges(&[
            (Range::empty(Point::new(0, 1)), false),
            (Range::empty(Point::new(1, 1)), false),
        ]);
        s.insert_text("x").unwrap();
        assert_eq!(s.text(), "axb\ncxd");
        assert_eq!(
            s.cursor_buffer_positions(),
            vec![Point::new(0, 2), Point::new(1, 2)]
        );
    }

    #[test]
    fn test_overlapping_selections_merge() {
        let mut s = session("hello world");
        s.set_selected_buffer_range(Range::new((0, 0), (0, 5)), false);
        let removed = Rc::new(Cell::new(0));
        let counter = removed.clone();
        let _sub = s.on_did_remove_selection(move |_| counter.set(counter.get() + 1));
        s.add_selection_for_buffer_range(Range::new((0, 3), (0, 8)), false);
        assert_eq!(s.selected_buffer_ranges(), vec![Range::new((0, 0), (0, 8))]);
        assert_eq!(removed.get(), 1);
    }

    #[test]
    fn test_pending_terminates_on_first_edit() {
        let mut s = EditorSession::builder()
            .text("abc")
            .clipboard(Rc::new(MemoryClipboard::new()))
            .pending(true)
            .build()
            .unwrap();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let _sub = s.on_did_terminate_pending_state(move |_| counter.set(counter.get() + 1));
        s.move_cursors(Motion::Right, 1);
        assert!(s.is_pending());
        s.insert_text("x").unwrap();
        assert!(!s.is_pending());
        s.insert_text("y").unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_stop_changing_after_quiet_interval() {
        let clock = Rc::new(ManualClock::new());
        let mut s = EditorSession::builder()
            .text("")
            .clock(clock.clone())
            .clipboard(Rc::new(MemoryClipboard::new()))
            .build()
            .unwrap();
        s.insert_text("a").unwrap();
        clock.advance(Duration::from_millis(100));
        assert!(!s.tick());
        clock.advance(STOPPED_CHANGING_INTERVAL);
        assert!(s.tick());
        assert!(!s.tick());
    }

    #[test]
    fn test_cursor_line_decorations_follow_mini() {
        let mut s = session("a\nb");
        s.add_cursor_at_buffer_position(Point::new(1, 0));
        assert_eq!(s.decorations().len(), 2);
        s.set_mini(true).unwrap();
        assert!(s.decorations().is_empty());
        s.set_mini(false).unwrap();
        assert_eq!(s.decorations().len(), 2);
    }

    #[test]
    fn test_destroy_is_ordered_and_idempotent() {
        let mut s = session("abc");
        let doc = s.document();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let _sub = s.on_did_destroy(move |_| counter.set(counter.get() + 1));
        let layers_before = doc.borrow().marker_layer_ids().len();
        assert_eq!(layers_before, 2);
        s.destroy();
        s.destroy();
        assert_eq!(fired.get(), 1);
        assert!(s.is_destroyed());
        assert!(doc.borrow().is_destroyed());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut s = session("one two");
        s.set_cursor_buffer_position(Point::new(0, 3));
        let mut copy = s.copy().unwrap();
        assert_eq!(copy.cursor_buffer_positions(), vec![Point::new(0, 3)]);
        copy.move_cursors(Motion::EndOfLine, 1);
        assert_eq!(s.cursor_buffer_positions(), vec![Point::new(0, 3)]);
        copy.insert_text("!").unwrap();
        assert_eq!(s.text(), "one two!");
        drop(copy);
        assert!(!s.document().borrow().is_destroyed());
    }
}
