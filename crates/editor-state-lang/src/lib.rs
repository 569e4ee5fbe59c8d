#![warn(missing_docs)]
//! `editor-state-lang` - per-language data consumed by `editor-state`.
//!
//! Nothing here parses or highlights source code. The structs describe the handful of
//! language facts the editing core needs for line-oriented operations: which tokens start a
//! comment, which characters break a word, and how wide one indentation step is.

use serde::{Deserialize, Serialize};

/// Characters that never belong to a word when no language override is present.
pub const DEFAULT_NON_WORD_CHARACTERS: &str = "/\\()\"':,.;<>~!@#$%^&*|+=[]{}`?-…";

/// Comment tokens for a language.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentConfig {
    /// Token that comments out the rest of a line (`//`, `#`, `--`).
    pub line: Option<String>,
    /// Opening token of a block comment (`/*`).
    pub block_start: Option<String>,
    /// Closing token of a block comment (`*/`).
    pub block_end: Option<String>,
}

impl CommentConfig {
    /// Line comments only.
    pub fn line(token: impl Into<String>) -> Self {
        Self {
            line: Some(token.into()),
            ..Self::default()
        }
    }

    /// Block comments only.
    pub fn block(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            line: None,
            block_start: Some(start.into()),
            block_end: Some(end.into()),
        }
    }

    /// Line comments, with block comments as well.
    pub fn line_and_block(
        line: impl Into<String>,
        block_start: impl Into<String>,
        block_end: impl Into<String>,
    ) -> Self {
        Self {
            line: Some(line.into()),
            block_start: Some(block_start.into()),
            block_end: Some(block_end.into()),
        }
    }

    /// The line token, if one is configured and non-empty.
    pub fn line_token(&self) -> Option<&str> {
        self.line.as_deref().filter(|s| !s.is_empty())
    }

    /// Both block tokens, if configured and non-empty.
    pub fn block_tokens(&self) -> Option<(&str, &str)> {
        let start = self.block_start.as_deref().filter(|s| !s.is_empty())?;
        let end = self.block_end.as_deref().filter(|s| !s.is_empty())?;
        Some((start, end))
    }
}

/// Everything the editing core wants to know about the language of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Language identifier (`rust`, `python`, `plain`).
    pub id: String,
    /// Comment tokens used by comment toggling.
    pub comments: CommentConfig,
    /// Override of the characters treated as word separators by word motion.
    pub non_word_characters: Option<String>,
    /// Preferred indentation step in columns, if the language mandates one.
    pub indent_width: Option<usize>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self::plain()
    }
}

impl LanguageConfig {
    /// Plain text: no comment tokens, default word separators.
    pub fn plain() -> Self {
        Self {
            id: "plain".to_string(),
            comments: CommentConfig::default(),
            non_word_characters: None,
            indent_width: None,
        }
    }

    /// Build a config with the given id and comment tokens.
    pub fn new(id: impl Into<String>, comments: CommentConfig) -> Self {
        Self {
            id: id.into(),
            comments,
            non_word_characters: None,
            indent_width: None,
        }
    }

    /// Builtin presets looked up by file extension (without the dot).
    pub fn for_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "rs" => Self::new("rust", CommentConfig::line_and_block("//", "/*", "*/")),
            "c" | "h" | "cc" | "cpp" | "hpp" | "java" | "js" | "ts" | "go" | "swift" | "kt" => {
                Self::new(ext, CommentConfig::line_and_block("//", "/*", "*/"))
            }
            "py" => {
                let mut config = Self::new("python", CommentConfig::line("#"));
                config.indent_width = Some(4);
                config
            }
            "sh" | "bash" | "toml" | "yaml" | "yml" | "rb" => {
                Self::new(ext, CommentConfig::line("#"))
            }
            "sql" | "lua" | "hs" => Self::new(ext, CommentConfig::line("--")),
            "css" => Self::new("css", CommentConfig::block("/*", "*/")),
            "html" | "xml" => Self::new(ext, CommentConfig::block("<!--", "-->")),
            _ => Self::plain(),
        }
    }

    /// The effective word separator set.
    pub fn non_word_characters(&self) -> &str {
        self.non_word_characters
            .as_deref()
            .unwrap_or(DEFAULT_NON_WORD_CHARACTERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_tokens() {
        let config = CommentConfig::line_and_block("//", "/*", "*/");
        assert_eq!(config.line_token(), Some("//"));
        assert_eq!(config.block_tokens(), Some(("/*", "*/")));

        let empty = CommentConfig::line("");
        assert_eq!(empty.line_token(), None);
        assert_eq!(empty.block_tokens(), None);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LanguageConfig::for_extension("RS").id, "rust");
        assert_eq!(
            LanguageConfig::for_extension("py").comments.line_token(),
            Some("#")
        );
        let plain = LanguageConfig::for_extension("unknown");
        assert_eq!(plain.id, "plain");
        assert_eq!(plain.non_word_characters(), DEFAULT_NON_WORD_CHARACTERS);
    }
}
