//! Versioned session persistence.
//!
//! A [`SerializedSession`] records which document a session edits, which marker layers hold
//! its folds and selections, and the configuration facets a host wants restored. Records
//! written by a different [`SERIALIZATION_VERSION`] are ignored on load rather than
//! migrated.

use crate::document::Document;
use crate::error::{DocumentLoadError, EditorError, Result};
use crate::ids::{Clock, DocumentId, IdGenerator, LayerId, SessionId};
use crate::session::{EditorSession, SessionBuilder};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

/// Version written by [`EditorSession::serialize`].
pub const SERIALIZATION_VERSION: u32 = 1;

/// Persisted state of an [`EditorSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SerializedSession {
    /// Format version.
    pub version: u32,
    /// Session identity.
    pub id: SessionId,
    /// Document the session edits.
    pub document_id: DocumentId,
    /// Fold layer of the coordinate translator.
    pub display_layer_id: LayerId,
    /// Layer holding the selection markers.
    pub selections_marker_layer_id: LayerId,
    /// Columns between tab stops.
    pub tab_length: usize,
    /// Indent with spaces.
    pub soft_tabs: bool,
    /// Wrap long lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_wrapped: Option<bool>,
    /// Older name of `soft_wrapped`, still accepted on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_wrap: Option<bool>,
    /// Wrap at the preferred line length.
    pub soft_wrap_at_preferred_line_length: bool,
    /// Preferred line length.
    pub preferred_line_length: usize,
    /// Reject mutations.
    pub read_only: bool,
    /// Gutter hint.
    pub show_line_numbers: bool,
    /// Sizing hint.
    pub auto_height: bool,
    /// Sizing hint.
    pub auto_width: bool,
    /// First screen row the host showed.
    #[serde(default)]
    pub first_visible_screen_row: usize,
}

impl SerializedSession {
    /// Parse a record from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the record as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Resolves document ids recorded in a [`SerializedSession`].
pub trait DocumentSource {
    /// The document with this id.
    ///
    /// Return [`DocumentLoadError::Read`] when the document's contents cannot be read; the
    /// session being restored is then skipped. Any other error aborts the restore.
    fn load(
        &mut self,
        id: DocumentId,
    ) -> std::result::Result<Rc<RefCell<Document>>, DocumentLoadError>;
}

/// A [`DocumentSource`] over documents already in memory or known by path.
pub struct DocumentRegistry {
    open: BTreeMap<DocumentId, Rc<RefCell<Document>>>,
    paths: BTreeMap<DocumentId, PathBuf>,
    ids: Arc<dyn IdGenerator>,
    clock: Rc<dyn Clock>,
}

impl std::fmt::Debug for DocumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRegistry")
            .field("open", &self.open.keys().collect::<Vec<_>>())
            .field("paths", &self.paths)
            .finish()
    }
}

impl DocumentRegistry {
    /// An empty registry; documents opened from disk use `ids` and `clock`.
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Rc<dyn Clock>) -> Self {
        Self {
            open: BTreeMap::new(),
            paths: BTreeMap::new(),
            ids,
            clock,
        }
    }

    /// Register a live document under its own id.
    pub fn insert(&mut self, document: Rc<RefCell<Document>>) -> DocumentId {
        let id = document.borrow().id();
        self.open.insert(id, document);
        id
    }

    /// Resolve `id` by opening `path` on first use.
    pub fn insert_path(&mut self, id: DocumentId, path: impl Into<PathBuf>) {
        self.paths.insert(id, path.into());
    }
}

impl DocumentSource for DocumentRegistry {
    fn load(
        &mut self,
        id: DocumentId,
    ) -> std::result::Result<Rc<RefCell<Document>>, DocumentLoadError> {
        if let Some(document) = self.open.get(&id).filter(|d| !d.borrow().is_destroyed()) {
            return Ok(document.clone());
        }
        let Some(path) = self.paths.get(&id) else {
            return Err(DocumentLoadError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no document registered for {id}"),
            )));
        };
        let document = match Document::open(path, self.ids.clone(), self.clock.clone()) {
            Ok(document) => document,
            Err(EditorError::DocumentLoad(err)) => return Err(err),
            Err(EditorError::Io(err)) => return Err(DocumentLoadError::Io(err)),
            Err(other) => {
                return Err(DocumentLoadError::Io(io::Error::other(other.to_string())));
            }
        };
        let document = Rc::new(RefCell::new(document));
        self.open.insert(id, document.clone());
        Ok(document)
    }
}

impl EditorSession {
    /// Capture the persistable state.
    pub fn serialize(&self) -> SerializedSession {
        let config = self.config();
        SerializedSession {
            version: SERIALIZATION_VERSION,
            id: self.id(),
            document_id: self.document().borrow().id(),
            display_layer_id: self.fold_layer(),
            selections_marker_layer_id: self.selection_layer(),
            tab_length: config.tab_length,
            soft_tabs: config.soft_tabs,
            soft_wrapped: Some(config.soft_wrapped),
            soft_wrap: None,
            soft_wrap_at_preferred_line_length: config.soft_wrap_at_preferred_line_length,
            preferred_line_length: config.preferred_line_length,
            read_only: config.read_only,
            show_line_numbers: config.show_line_numbers,
            auto_height: config.auto_height,
            auto_width: config.auto_width,
            first_visible_screen_row: self.first_visible_screen_row(),
        }
    }

    /// Restore a session from `state`.
    ///
    /// Returns `Ok(None)` when the record has a different version or its document cannot be
    /// read. Folds and selections are reattached when their layers still exist in the
    /// document; otherwise the session starts with fresh layers. `builder` supplies the
    /// services (clipboard, clock, indent policy) the record does not carry.
    pub fn deserialize(
        state: &SerializedSession,
        documents: &mut dyn DocumentSource,
        builder: SessionBuilder,
    ) -> Result<Option<EditorSession>> {
        if state.version != SERIALIZATION_VERSION {
            tracing::debug!(
                found = state.version,
                expected = SERIALIZATION_VERSION,
                "ignoring serialized session with another version"
            );
            return Ok(None);
        }
        let document = match documents.load(state.document_id) {
            Ok(document) => document,
            Err(DocumentLoadError::Read(err)) => {
                tracing::warn!(
                    document = %state.document_id,
                    error = %err,
                    "document unreadable; session not restored"
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let mut builder = builder
            .document(document)
            .session_id(state.id)
            .reattach(state.display_layer_id, state.selections_marker_layer_id);
        let config = builder.config_mut();
        config.tab_length = state.tab_length;
        config.soft_tabs = state.soft_tabs;
        if let Some(soft_wrapped) = state.soft_wrapped.or(state.soft_wrap) {
            config.soft_wrapped = soft_wrapped;
        }
        config.soft_wrap_at_preferred_line_length = state.soft_wrap_at_preferred_line_length;
        config.preferred_line_length = state.preferred_line_length;
        config.read_only = state.read_only;
        config.show_line_numbers = state.show_line_numbers;
        config.auto_height = state.auto_height;
        config.auto_width = state.auto_width;

        let mut session = builder.build()?;
        session.set_first_visible_screen_row(state.first_visible_screen_row);
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::ids::{ManualClock, SequentialIdGenerator};
    use crate::point::{Point, Range};

    fn services() -> (Arc<dyn IdGenerator>, Rc<dyn Clock>) {
        (
            Arc::new(SequentialIdGenerator::new()),
            Rc::new(ManualClock::new()),
        )
    }

    fn builder() -> SessionBuilder {
        EditorSession::builder().clipboard(Rc::new(MemoryClipboard::new()))
    }

    #[test]
    fn test_legacy_soft_wrap_key() {
        let json = r#"{
            "version": 1, "id": 9, "document_id": 1,
            "display_layer_id": 2, "selections_marker_layer_id": 3,
            "tab_length": 4, "soft_tabs": false, "soft_wrap": true,
            "soft_wrap_at_preferred_line_length": false, "preferred_line_length": 80,
            "read_only": false, "show_line_numbers": true,
            "auto_height": true, "auto_width": false
        }"#;
        let state = SerializedSession::from_json(json).unwrap();
        assert_eq!(state.soft_wrapped, None);
        assert_eq!(state.soft_wrap, Some(true));
        assert_eq!(state.first_visible_screen_row, 0);
    }

    #[test]
    fn test_restore_reattaches_layers() {
        let (ids, clock) = services();
        let document = Rc::new(RefCell::new(Document::with_services(
            "alpha\nbeta\ngamma",
            ids.clone(),
            clock.clone(),
        )));
        let mut registry = DocumentRegistry::new(ids.clone(), clock);
        registry.insert(document.clone());

        let mut original = builder().document(document.clone()).build().unwrap();
        original.set_selected_buffer_range(Range::new((1, 0), (1, 4)), false);
        original.fold_buffer_range(Range::new((2, 1), (2, 3)));
        original.set_first_visible_screen_row(1);
        let state = original.serialize();
        let json = state.to_json().unwrap();

        let mut restored = EditorSession::deserialize(
            &SerializedSession::from_json(&json).unwrap(),
            &mut registry,
            builder(),
        )
        .unwrap()
        .expect("same version");
        assert_eq!(restored.id(), original.id());
        assert_eq!(restored.selection_layer(), original.selection_layer());
        assert_eq!(
            restored.selected_buffer_ranges(),
            vec![Range::new((1, 0), (1, 4))]
        );
        assert_eq!(restored.folds(), vec![Range::new((2, 1), (2, 3))]);
        assert_eq!(restored.first_visible_screen_row(), 1);
        assert_eq!(
            restored.screen_position_for_buffer_position(Point::new(2, 3)).column,
            2
        );
    }

    #[test]
    fn test_version_mismatch_is_skipped() {
        let (ids, clock) = services();
        let mut session = builder().ids(ids.clone()).text("x").build().unwrap();
        let mut state = session.serialize();
        state.version = SERIALIZATION_VERSION + 1;
        let mut registry = DocumentRegistry::new(ids, clock);
        registry.insert(session.document());
        assert!(
            EditorSession::deserialize(&state, &mut registry, builder())
                .unwrap()
                .is_none()
        );
        session.destroy();
    }

    #[test]
    fn test_unreadable_document_is_skipped() {
        let (ids, clock) = services();
        let mut registry = DocumentRegistry::new(ids.clone(), clock);
        let missing = DocumentId::next(ids.as_ref());
        registry.insert_path(missing, "/nonexistent/editor-state/restore.txt");
        let state = SerializedSession {
            version: SERIALIZATION_VERSION,
            id: SessionId(1),
            document_id: missing,
            display_layer_id: LayerId(1),
            selections_marker_layer_id: LayerId(2),
            tab_length: 2,
            soft_tabs: true,
            soft_wrapped: None,
            soft_wrap: None,
            soft_wrap_at_preferred_line_length: false,
            preferred_line_length: 80,
            read_only: false,
            show_line_numbers: true,
            auto_height: true,
            auto_width: false,
            first_visible_screen_row: 0,
        };
        assert!(
            EditorSession::deserialize(&state, &mut registry, builder())
                .unwrap()
                .is_none()
        );

        let unknown = SerializedSession {
            document_id: DocumentId(999),
            ..state
        };
        let err = EditorSession::deserialize(&unknown, &mut registry, builder()).unwrap_err();
        assert!(matches!(err, EditorError::DocumentLoad(DocumentLoadError::Io(_))));
    }
}
