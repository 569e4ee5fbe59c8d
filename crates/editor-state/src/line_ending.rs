//! Newline handling at the document boundary.
//!
//! Documents hold LF-only text. Content read from disk keeps note of the newline sequence it
//! used so that saving writes the same one back.

use serde::{Deserialize, Serialize};

/// Newline sequence written when a document is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    /// `"\n"`.
    #[default]
    Lf,
    /// `"\r\n"`.
    Crlf,
}

impl LineEnding {
    /// The dominant newline of `text`: CRLF if CRLF lines outnumber bare LF lines.
    pub fn detect(text: &str) -> Self {
        let crlf = text.matches("\r\n").count();
        let lf = text.matches('\n').count() - crlf;
        if crlf > lf { Self::Crlf } else { Self::Lf }
    }

    /// The newline sequence itself.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
        }
    }

    /// Expand LF-only `text` to this newline sequence.
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

/// Rewrite every CRLF and lone CR in `text` to LF.
pub fn normalize(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(LineEnding::detect("a\nb\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a\r\nb\r\n"), LineEnding::Crlf);
        assert_eq!(LineEnding::detect("a\r\nb\nc\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect(""), LineEnding::Lf);
    }

    #[test]
    fn test_normalize_and_apply() {
        let text = normalize("one\r\ntwo\rthree\n");
        assert_eq!(text, "one\ntwo\nthree\n");
        assert_eq!(LineEnding::Crlf.apply(&text), "one\r\ntwo\r\nthree\r\n");
    }
}
