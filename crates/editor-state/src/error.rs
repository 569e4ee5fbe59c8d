//! Error types.

use crate::ids::{DocumentId, LayerId, SelectionId, SessionId};
use thiserror::Error;

/// Errors raised by editing operations.
///
/// Out-of-range positions are never errors: they clamp. Overlapping selections are never
/// errors: they merge.
#[derive(Debug, Error)]
pub enum EditorError {
    /// A mutating call reached a read-only session without the override flag.
    #[error("attempt to mutate a read-only editor session")]
    ReadOnly,

    /// A session was built without the clipboard it needs for cut/copy/paste.
    #[error("an editor session requires a clipboard; call SessionBuilder::clipboard first")]
    ClipboardNotConfigured,

    /// A configuration patch named a key that does not exist.
    #[error("unknown configuration key `{0}`")]
    UnknownConfigKey(String),

    /// A configuration value is out of its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The document has been torn down.
    #[error("document {0} has been destroyed")]
    DocumentDestroyed(DocumentId),

    /// The session has been torn down.
    #[error("editor session {0} has been destroyed")]
    SessionDestroyed(SessionId),

    /// No marker layer with this id exists in the document.
    #[error("unknown marker layer {0}")]
    UnknownMarkerLayer(LayerId),

    /// No selection with this id exists in the session.
    #[error("unknown selection {0}")]
    UnknownSelection(SelectionId),

    /// Undo/redo or checkpoint operations are not allowed while a transaction is open.
    #[error("operation not allowed inside an open transaction")]
    TransactionOpen,

    /// A transaction body asked for the transaction to be rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// A document could not be loaded during deserialization.
    #[error(transparent)]
    DocumentLoad(#[from] DocumentLoadError),

    /// I/O failure while opening or saving a document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a configuration patch or serialized session.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a [`DocumentSource`](crate::serialize::DocumentSource).
#[derive(Debug, Error)]
pub enum DocumentLoadError {
    /// The backing file could not be read. Deserialization skips the session.
    #[error("failed to read document contents: {0}")]
    Read(#[source] std::io::Error),

    /// Any other I/O failure. Deserialization propagates it.
    #[error("failed to load document: {0}")]
    Io(#[source] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EditorError>;
