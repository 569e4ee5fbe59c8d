//! Clipboard collaborator.
//!
//! Cut and copy write an entry holding the concatenated text plus the text of every
//! selection, so that pasting into the same number of cursors distributes one piece per
//! cursor. Hosts bridge to the system clipboard by implementing [`Clipboard`].

use std::cell::RefCell;

/// One clipboard write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardEntry {
    /// Text of every copied selection joined by newlines.
    pub text: String,
    /// Text of each copied selection, in selection order.
    pub selections: Vec<String>,
    /// The entry was copied from empty selections as whole lines.
    pub full_line: bool,
}

impl ClipboardEntry {
    /// An entry holding plain text, as written by another application.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            selections: vec![text.clone()],
            text,
            full_line: false,
        }
    }
}

/// Storage for cut/copy/paste.
pub trait Clipboard {
    /// Replace the clipboard contents.
    fn write(&self, entry: ClipboardEntry);

    /// Current contents, if any.
    fn read(&self) -> Option<ClipboardEntry>;
}

/// In-process clipboard.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    entry: RefCell<Option<ClipboardEntry>>,
}

impl MemoryClipboard {
    /// An empty clipboard.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for MemoryClipboard {
    fn write(&self, entry: ClipboardEntry) {
        *self.entry.borrow_mut() = Some(entry);
    }

    fn read(&self) -> Option<ClipboardEntry> {
        self.entry.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_clipboard() {
        let clipboard = MemoryClipboard::new();
        assert_eq!(clipboard.read(), None);
        clipboard.write(ClipboardEntry::plain("abc"));
        let entry = clipboard.read().unwrap();
        assert_eq!(entry.text, "abc");
        assert_eq!(entry.selections, vec!["abc".to_string()]);
    }
}
