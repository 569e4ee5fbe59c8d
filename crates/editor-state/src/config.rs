//! Session configuration and structured configuration patches.
//!
//! [`SessionConfig`] holds every setting of an editor session. Hosts change it with a
//! [`ConfigPatch`], whose fields are all optional. Patches are applied through a fixed table
//! of per-field handlers; each handler reports whether its change affects layout, and the
//! session folds every layout-affecting change into a single translator reset.

use crate::display::{DEFAULT_FOLD_PLACEHOLDER, DisplayConfig, Invisibles};
use crate::error::{EditorError, Result};
use crate::layout::{CharWidthRatios, DEFAULT_TAB_LENGTH};
use editor_state_lang::DEFAULT_NON_WORD_CHARACTERS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quiet period after which the session reports that the text stopped changing.
pub const STOPPED_CHANGING_INTERVAL: Duration = Duration::from_millis(300);

/// Default window for merging consecutive transactions into one undo entry.
pub const DEFAULT_UNDO_GROUPING_INTERVAL_MS: u64 = 300;

/// Default preferred line length.
pub const DEFAULT_PREFERRED_LINE_LENGTH: usize = 80;

/// Every setting of an editor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Columns between tab stops.
    pub tab_length: usize,
    /// Indent with spaces instead of tabs.
    pub soft_tabs: bool,
    /// Wrap long lines.
    pub soft_wrapped: bool,
    /// Wrap at the smaller of the editor width and the preferred line length.
    pub soft_wrap_at_preferred_line_length: bool,
    /// Preferred line length, in columns.
    pub preferred_line_length: usize,
    /// Editor width in columns; `0` when the host has not measured it yet.
    pub editor_width_in_chars: usize,
    /// Extra indentation of wrapped continuation rows.
    pub soft_wrap_hanging_indent: usize,
    /// Render invisible characters.
    pub show_invisibles: bool,
    /// Replacement characters used when `show_invisibles` is on.
    pub invisibles: Invisibles,
    /// Tag leading whitespace for indent guides.
    pub show_indent_guides: bool,
    /// Move over leading soft tabs as if they were tab characters.
    pub atomic_soft_tabs: bool,
    /// Visual widths used for wrapping.
    pub char_widths: CharWidthRatios,
    /// Placeholder rendered in place of folded text.
    pub fold_placeholder: char,
    /// Reject mutations that do not opt out of the guard.
    pub read_only: bool,
    /// Single-line entry mode: no wrapping, no invisibles, no cursor-line decorations.
    pub mini: bool,
    /// Hint for the host's gutter.
    pub show_line_numbers: bool,
    /// Hint: grow with the content vertically.
    pub auto_height: bool,
    /// Hint: grow with the content horizontally.
    pub auto_width: bool,
    /// Hint: allow scrolling past the last row.
    pub scroll_past_end: bool,
    /// Indent new lines through the indent policy.
    pub auto_indent: bool,
    /// Re-indent pasted multi-line text.
    pub auto_indent_on_paste: bool,
    /// Characters that end words, in addition to whitespace.
    pub non_word_characters: String,
    /// Window for merging consecutive edits into one undo entry, in milliseconds.
    pub undo_grouping_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tab_length: DEFAULT_TAB_LENGTH,
            soft_tabs: true,
            soft_wrapped: false,
            soft_wrap_at_preferred_line_length: false,
            preferred_line_length: DEFAULT_PREFERRED_LINE_LENGTH,
            editor_width_in_chars: 0,
            soft_wrap_hanging_indent: 0,
            show_invisibles: false,
            invisibles: Invisibles::default(),
            show_indent_guides: false,
            atomic_soft_tabs: true,
            char_widths: CharWidthRatios::default(),
            fold_placeholder: DEFAULT_FOLD_PLACEHOLDER,
            read_only: false,
            mini: false,
            show_line_numbers: true,
            auto_height: true,
            auto_width: false,
            scroll_past_end: false,
            auto_indent: true,
            auto_indent_on_paste: true,
            non_word_characters: DEFAULT_NON_WORD_CHARACTERS.to_string(),
            undo_grouping_interval_ms: DEFAULT_UNDO_GROUPING_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Parse a full configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        check_keys(&value)?;
        let config: SessionConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Column at which rows wrap, if soft wrap is in effect.
    pub fn soft_wrap_column(&self) -> Option<usize> {
        if self.mini || !self.soft_wrapped {
            return None;
        }
        let width = if self.editor_width_in_chars == 0 {
            self.preferred_line_length
        } else {
            self.editor_width_in_chars
        };
        let column = if self.soft_wrap_at_preferred_line_length {
            width.min(self.preferred_line_length)
        } else {
            width
        };
        Some(column.max(1))
    }

    /// Translator parameters derived from this configuration.
    pub fn display_config(&self) -> DisplayConfig {
        DisplayConfig {
            tab_length: self.tab_length,
            soft_wrap_column: self.soft_wrap_column(),
            soft_wrap_hanging_indent: self.soft_wrap_hanging_indent,
            show_indent_guides: self.show_indent_guides && !self.mini,
            invisibles: (self.show_invisibles && !self.mini).then_some(self.invisibles),
            atomic_soft_tabs: self.atomic_soft_tabs,
            char_widths: self.char_widths,
            fold_placeholder: self.fold_placeholder,
        }
    }

    /// Undo grouping window.
    pub fn undo_grouping_interval(&self) -> Duration {
        Duration::from_millis(self.undo_grouping_interval_ms)
    }

    /// Reject values outside their domain.
    pub fn validate(&self) -> Result<()> {
        if self.tab_length == 0 {
            return Err(EditorError::InvalidConfig("tab_length must be at least 1".into()));
        }
        if self.preferred_line_length == 0 {
            return Err(EditorError::InvalidConfig(
                "preferred_line_length must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Apply `patch`, all or nothing.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<ConfigUpdate> {
        let mut next = self.clone();
        let mut update = ConfigUpdate::default();
        for &(key, handler) in HANDLERS {
            if let Some(affects_layout) = handler(patch, &mut next) {
                update.changed.push(key);
                update.relayout |= affects_layout;
            }
        }
        next.validate()?;
        *self = next;
        Ok(update)
    }
}

/// Outcome of applying a [`ConfigPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// Keys whose value changed, in table order.
    pub changed: Vec<&'static str>,
    /// At least one change requires a translator reset.
    pub relayout: bool,
}

impl ConfigUpdate {
    /// Returns `true` if `key` changed.
    pub fn contains(&self, key: &str) -> bool {
        self.changed.iter().any(|changed| *changed == key)
    }

    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

type Handler = fn(&ConfigPatch, &mut SessionConfig) -> Option<bool>;

macro_rules! config_patch {
    ($($field:ident : $ty:ty => $layout:expr),* $(,)?) => {
        /// A partial configuration update; absent fields are left alone.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct ConfigPatch {
            $(
                #[allow(missing_docs)]
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        const HANDLERS: &[(&str, Handler)] = &[$(
            (stringify!($field), {
                fn apply(patch: &ConfigPatch, config: &mut SessionConfig) -> Option<bool> {
                    match &patch.$field {
                        Some(value) if *value != config.$field => {
                            config.$field = value.clone();
                            Some($layout)
                        }
                        _ => None,
                    }
                }
                apply
            }),
        )*];
    };
}

config_patch! {
    tab_length: usize => true,
    soft_tabs: bool => false,
    soft_wrapped: bool => true,
    soft_wrap_at_preferred_line_length: bool => true,
    preferred_line_length: usize => true,
    editor_width_in_chars: usize => true,
    soft_wrap_hanging_indent: usize => true,
    show_invisibles: bool => true,
    invisibles: Invisibles => true,
    show_indent_guides: bool => true,
    atomic_soft_tabs: bool => true,
    char_widths: CharWidthRatios => true,
    fold_placeholder: char => true,
    read_only: bool => false,
    mini: bool => true,
    show_line_numbers: bool => false,
    auto_height: bool => false,
    auto_width: bool => false,
    scroll_past_end: bool => false,
    auto_indent: bool => false,
    auto_indent_on_paste: bool => false,
    non_word_characters: String => false,
    undo_grouping_interval_ms: u64 => false,
}

impl ConfigPatch {
    /// Parse a patch from a JSON object. An unrecognized key fails with
    /// [`EditorError::UnknownConfigKey`].
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        check_keys(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Names of every configurable key.
    pub fn keys() -> impl Iterator<Item = &'static str> {
        HANDLERS.iter().map(|(key, _)| *key)
    }
}

fn check_keys(value: &serde_json::Value) -> Result<()> {
    let Some(object) = value.as_object() else {
        return Err(EditorError::InvalidConfig(
            "configuration must be a JSON object".into(),
        ));
    };
    match object
        .keys()
        .find(|key| !HANDLERS.iter().any(|(known, _)| *known == key.as_str()))
    {
        Some(key) => Err(EditorError::UnknownConfigKey(key.clone())),
        None => Ok(()),
    }
}
