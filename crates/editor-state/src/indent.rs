//! Indentation policy collaborator.
//!
//! The session asks an [`IndentPolicy`] how deep a row should be indented whenever it
//! auto-indents (new lines, pasted text, explicit re-indent). Language-aware hosts plug in
//! their own policy; [`PreserveIndent`] keeps the indentation of the nearest non-blank row
//! above.

use crate::document::Document;
use crate::text::{indent_columns, is_blank};

/// Suggests indentation for rows.
pub trait IndentPolicy {
    /// Suggested indentation of `row`, in columns.
    fn suggested_indent(&self, document: &Document, row: usize, tab_length: usize) -> usize;
}

/// Indent like the closest preceding non-blank row.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveIndent;

impl IndentPolicy for PreserveIndent {
    fn suggested_indent(&self, document: &Document, row: usize, tab_length: usize) -> usize {
        (0..row.min(document.line_count()))
            .rev()
            .map(|r| document.line(r))
            .find(|line| !is_blank(line))
            .map_or(0, |line| indent_columns(&line, tab_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserve_indent_skips_blank_rows() {
        let doc = Document::new("fn main() {\n    let x = 1;\n\n");
        assert_eq!(PreserveIndent.suggested_indent(&doc, 3, 4), 4);
        assert_eq!(PreserveIndent.suggested_indent(&doc, 1, 4), 0);
        assert_eq!(PreserveIndent.suggested_indent(&doc, 0, 4), 0);
    }
}
