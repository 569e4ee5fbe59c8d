#![warn(missing_docs)]
//! Editor State - Headless Editing-State Core
//!
//! # Overview
//!
//! `editor-state` holds everything an editor needs to know about a document except how to
//! paint it: the text, markers that survive edits, undo history, and for each editor session
//! a coordinate translator (soft wrap, folds, tabs, wide characters), cursors and
//! selections. Hosts render from the translator's screen rows and drive sessions through
//! method calls or [`Command`] values.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  EditorSession / Command interface          │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Selections & cursors (merge, multi-edit)   │  ← Editing
//! ├─────────────────────────────────────────────┤
//! │  DisplayLayer (wrap, folds, tabs, widths)   │  ← Buffer ⇄ screen
//! ├─────────────────────────────────────────────┤
//! │  Marker layers & undo history               │  ← Edit-stable ranges
//! ├─────────────────────────────────────────────┤
//! │  Document (rope storage, change queues)     │  ← Text
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_state::{ConfigPatch, EditorSession, MemoryClipboard, Point, ScreenPoint};
//! use std::rc::Rc;
//!
//! let mut session = EditorSession::builder()
//!     .text("abcdefghijklmno")
//!     .clipboard(Rc::new(MemoryClipboard::new()))
//!     .build()
//!     .unwrap();
//! session
//!     .update(&ConfigPatch {
//!         soft_wrapped: Some(true),
//!         editor_width_in_chars: Some(10),
//!         ..ConfigPatch::default()
//!     })
//!     .unwrap();
//! assert_eq!(session.screen_line_count(), 2);
//! assert_eq!(
//!     session.screen_position_for_buffer_position(Point::new(0, 12)),
//!     ScreenPoint::new(1, 2)
//! );
//! ```
//!
//! # Threading
//!
//! Sessions and documents are single-threaded: a document is shared between sessions as
//! `Rc<RefCell<Document>>` and every session pulls its changes synchronously.
//!
//! # Module Description
//!
//! - [`document`] - Text storage, marker layers, transactions and undo
//! - [`marker`] - Edit-stable ranges
//! - [`display`] - Buffer/screen coordinate translation
//! - [`session`] - Editor sessions
//! - [`commands`] - Command interface
//! - [`serialize`] - Versioned session persistence

pub mod clipboard;
pub mod commands;
pub mod config;
pub mod cursor;
pub mod decorations;
pub mod delta;
pub mod display;
pub mod document;
pub mod error;
pub mod event;
mod history;
pub mod ids;
pub mod indent;
pub mod layout;
pub mod line_ending;
pub mod marker;
pub mod point;
mod selection;
pub mod serialize;
pub mod session;
mod text;

pub use clipboard::{Clipboard, ClipboardEntry, MemoryClipboard};
pub use commands::{
    Command, CommandResult, CursorCommand, EditCommand, FoldCommand, SelectCommand,
    SessionCommand,
};
pub use config::{ConfigPatch, ConfigUpdate, STOPPED_CHANGING_INTERVAL, SessionConfig};
pub use cursor::{Cursor, Motion};
pub use decorations::{
    Decoration, DecorationKind, DecorationManager, DecorationProperties, ScreenDecoration,
};
pub use delta::TextChange;
pub use editor_state_lang::{CommentConfig, LanguageConfig};
pub use display::{
    DisplayChange, DisplayConfig, DisplayLayer, Invisibles, ScreenLine, ScreenTag, ScreenTagKind,
};
pub use document::{Document, SubscriberId};
pub use error::{DocumentLoadError, EditorError, Result};
pub use event::{Emitter, Subscription};
pub use history::{CheckpointId, DEFAULT_MAX_UNDO_ENTRIES};
pub use ids::{
    Clock, DecorationId, DocumentId, IdGenerator, LayerId, ManualClock, MarkerId, SelectionId,
    SequentialIdGenerator, SessionId, SystemClock,
};
pub use indent::{IndentPolicy, PreserveIndent};
pub use layout::{
    CharClassifier, CharKind, CharWidthRatios, DefaultWrapPolicy, UnicodeClassifier, WrapPolicy,
};
pub use line_ending::LineEnding;
pub use marker::{
    Inclusivity, InvalidationStrategy, LayerOptions, LayerSnapshot, Marker, MarkerLayer,
    MarkerOptions,
};
pub use point::{ClipDirection, Point, Range, ScreenPoint, ScreenRange};
pub use selection::{InsertOptions, MergeCandidate, MergeGroup, merge_ranges};
pub use serialize::{DocumentRegistry, DocumentSource, SERIALIZATION_VERSION, SerializedSession};
pub use session::{
    CursorPositionChange, EditorSession, SelectionRangeChange, SelectionState, SessionBuilder,
};
