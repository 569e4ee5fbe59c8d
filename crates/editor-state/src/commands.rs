//! Command interface.
//!
//! Frontends that prefer a message-style API can drive a session with [`Command`] values
//! instead of calling its methods directly.
//!
//! # Example
//!
//! ```rust
//! use editor_state::{Command, CommandResult, EditCommand, EditorSession, MemoryClipboard};
//! use std::rc::Rc;
//!
//! let mut session = EditorSession::builder()
//!     .clipboard(Rc::new(MemoryClipboard::new()))
//!     .build()
//!     .unwrap();
//! session
//!     .execute(Command::Edit(EditCommand::InsertText { text: "hi".into() }))
//!     .unwrap();
//! assert_eq!(session.execute(Command::Session(editor_state::SessionCommand::GetText)).unwrap(),
//!     CommandResult::Text("hi".into()));
//! ```

use crate::config::ConfigPatch;
use crate::cursor::Motion;
use crate::error::Result;
use crate::ids::SelectionId;
use crate::point::{Point, Range};
use crate::session::EditorSession;

/// Text editing commands. Each applies to every selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    /// Replace every selection with text.
    InsertText {
        /// Text to insert.
        text: String,
    },
    /// Auto-indented line break.
    InsertNewline,
    /// Indent (or insert a tab stop at empty cursors).
    Indent,
    /// Remove one indentation level.
    Outdent,
    /// Delete backwards.
    Backspace,
    /// Delete forwards.
    Delete,
    /// Delete to the start of the word.
    DeleteToBeginningOfWord,
    /// Delete to the end of the word.
    DeleteToEndOfWord,
    /// Delete to column 0.
    DeleteToBeginningOfLine,
    /// Delete to the end of the row.
    DeleteToEndOfLine,
    /// Delete whole rows.
    DeleteLine,
    /// Move rows up.
    MoveLineUp,
    /// Move rows down.
    MoveLineDown,
    /// Duplicate rows.
    DuplicateLines,
    /// Join rows.
    JoinLines,
    /// Toggle line comments.
    ToggleLineComments,
    /// Upper-case.
    UpperCase,
    /// Lower-case.
    LowerCase,
    /// Cut to the clipboard.
    Cut,
    /// Copy to the clipboard.
    Copy,
    /// Paste from the clipboard.
    Paste,
    /// Undo the last entry.
    Undo,
    /// Redo the last undone entry.
    Redo,
}

/// Cursor motion commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCommand {
    /// Move every cursor, collapsing selections.
    Move {
        /// Motion to apply.
        motion: Motion,
        /// Repeat count.
        count: usize,
    },
    /// Collapse to one cursor.
    MoveTo {
        /// Target position.
        position: Point,
    },
    /// Add a cursor.
    AddCursor {
        /// Position of the new cursor.
        position: Point,
    },
}

/// Selection commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectCommand {
    /// Extend every selection by a motion.
    To {
        /// Motion to apply to each head.
        motion: Motion,
        /// Repeat count.
        count: usize,
    },
    /// Replace the selections with one range.
    Set {
        /// New range.
        range: Range,
        /// Head before tail.
        reversed: bool,
    },
    /// Replace the selections with several ranges.
    SetMany {
        /// `(range, reversed)` pairs.
        ranges: Vec<(Range, bool)>,
    },
    /// Add a selection.
    Add {
        /// Range of the new selection.
        range: Range,
        /// Head before tail.
        reversed: bool,
    },
    /// Select the word under each cursor.
    Word,
    /// Select whole rows.
    Line,
    /// Select everything.
    All,
    /// Add selections on the row below.
    AddBelow,
    /// Add selections on the row above.
    AddAbove,
    /// Collapse every selection.
    Clear,
    /// Keep only the oldest selection.
    Consolidate,
}

/// Fold commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldCommand {
    /// Fold a range.
    Fold {
        /// Range to fold.
        range: Range,
    },
    /// Fold every non-empty selection.
    FoldSelection,
    /// Unfold a buffer row.
    Unfold {
        /// Row to unfold.
        row: usize,
    },
    /// Unfold everything.
    UnfoldAll,
}

/// Session-level commands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Apply a configuration patch.
    Configure(ConfigPatch),
    /// Return the whole text.
    GetText,
    /// Return the selected text.
    GetSelectedText,
    /// Leave the pending state.
    TerminatePending,
}

/// Unified command enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Text edits.
    Edit(EditCommand),
    /// Cursor motion.
    Cursor(CursorCommand),
    /// Selection shaping.
    Select(SelectCommand),
    /// Folding.
    Fold(FoldCommand),
    /// Session settings and queries.
    Session(SessionCommand),
}

/// Command execution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Done, nothing to report.
    Success,
    /// Text produced by a query.
    Text(String),
    /// Whether the command changed anything.
    Changed(bool),
    /// A selection created by the command.
    Selection(SelectionId),
}

impl EditorSession {
    /// Execute one command.
    pub fn execute(&mut self, command: Command) -> Result<CommandResult> {
        tracing::trace!(session = %self.id(), ?command, "executing command");
        match command {
            Command::Edit(edit) => self.execute_edit(edit),
            Command::Cursor(cursor) => Ok(self.execute_cursor(cursor)),
            Command::Select(select) => Ok(self.execute_select(select)),
            Command::Fold(fold) => Ok(self.execute_fold(fold)),
            Command::Session(session) => self.execute_session(session),
        }
    }

    /// Execute commands as one transaction; if any fails, every change is rolled back.
    pub fn execute_batch(&mut self, commands: Vec<Command>) -> Result<Vec<CommandResult>> {
        self.transact(|session| {
            commands
                .into_iter()
                .map(|command| session.execute(command))
                .collect()
        })
    }

    fn execute_edit(&mut self, command: EditCommand) -> Result<CommandResult> {
        match command {
            EditCommand::InsertText { text } => self.insert_text(&text)?,
            EditCommand::InsertNewline => self.insert_newline()?,
            EditCommand::Indent => self.indent()?,
            EditCommand::Outdent => self.outdent()?,
            EditCommand::Backspace => self.backspace()?,
            EditCommand::Delete => self.delete()?,
            EditCommand::DeleteToBeginningOfWord => self.delete_to_beginning_of_word()?,
            EditCommand::DeleteToEndOfWord => self.delete_to_end_of_word()?,
            EditCommand::DeleteToBeginningOfLine => self.delete_to_beginning_of_line()?,
            EditCommand::DeleteToEndOfLine => self.delete_to_end_of_line()?,
            EditCommand::DeleteLine => self.delete_line()?,
            EditCommand::MoveLineUp => self.move_line_up()?,
            EditCommand::MoveLineDown => self.move_line_down()?,
            EditCommand::DuplicateLines => self.duplicate_lines()?,
            EditCommand::JoinLines => self.join_lines()?,
            EditCommand::ToggleLineComments => self.toggle_line_comments()?,
            EditCommand::UpperCase => self.upper_case()?,
            EditCommand::LowerCase => self.lower_case()?,
            EditCommand::Cut => self.cut_selected_text()?,
            EditCommand::Copy => self.copy_selected_text(),
            EditCommand::Paste => self.paste_text()?,
            EditCommand::Undo => return Ok(CommandResult::Changed(self.undo()?)),
            EditCommand::Redo => return Ok(CommandResult::Changed(self.redo()?)),
        }
        Ok(CommandResult::Success)
    }

    fn execute_cursor(&mut self, command: CursorCommand) -> CommandResult {
        match command {
            CursorCommand::Move { motion, count } => self.move_cursors(motion, count),
            CursorCommand::MoveTo { position } => self.set_cursor_buffer_position(position),
            CursorCommand::AddCursor { position } => {
                return CommandResult::Selection(self.add_cursor_at_buffer_position(position));
            }
        }
        CommandResult::Success
    }

    fn execute_select(&mut self, command: SelectCommand) -> CommandResult {
        match command {
            SelectCommand::To { motion, count } => self.select_to(motion, count),
            SelectCommand::Set { range, reversed } => {
                self.set_selected_buffer_range(range, reversed)
            }
            SelectCommand::SetMany { ranges } => self.set_selected_buffer_ranges(&ranges),
            SelectCommand::Add { range, reversed } => {
                return CommandResult::Selection(
                    self.add_selection_for_buffer_range(range, reversed),
                );
            }
            SelectCommand::Word => self.select_word(),
            SelectCommand::Line => self.select_line(),
            SelectCommand::All => self.select_all(),
            SelectCommand::AddBelow => self.add_selection_below(),
            SelectCommand::AddAbove => self.add_selection_above(),
            SelectCommand::Clear => self.clear_selections(),
            SelectCommand::Consolidate => {
                return CommandResult::Changed(self.consolidate_selections());
            }
        }
        CommandResult::Success
    }

    fn execute_fold(&mut self, command: FoldCommand) -> CommandResult {
        let changed = match command {
            FoldCommand::Fold { range } => self.fold_buffer_range(range).is_some(),
            FoldCommand::FoldSelection => self.fold_selected_ranges() > 0,
            FoldCommand::Unfold { row } => !self.unfold_buffer_row(row).is_empty(),
            FoldCommand::UnfoldAll => self.unfold_all() > 0,
        };
        CommandResult::Changed(changed)
    }

    fn execute_session(&mut self, command: SessionCommand) -> Result<CommandResult> {
        Ok(match command {
            SessionCommand::Configure(patch) => {
                CommandResult::Changed(!self.update(&patch)?.is_empty())
            }
            SessionCommand::GetText => CommandResult::Text(self.text()),
            SessionCommand::GetSelectedText => CommandResult::Text(self.selected_text()),
            SessionCommand::TerminatePending => {
                let was_pending = self.is_pending();
                self.terminate_pending_state();
                CommandResult::Changed(was_pending)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use std::rc::Rc;

    fn session(text: &str) -> EditorSession {
        EditorSession::builder()
            .text(text)
            .clipboard(Rc::new(MemoryClipboard::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_edit_and_query() {
        let mut s = session("one\ntwo");
        s.execute(Command::Cursor(CursorCommand::MoveTo {
            position: Point::new(1, 3),
        }))
        .unwrap();
        s.execute(Command::Edit(EditCommand::InsertText { text: "!".into() }))
            .unwrap();
        assert_eq!(
            s.execute(Command::Session(SessionCommand::GetText)).unwrap(),
            CommandResult::Text("one\ntwo!".into())
        );
        assert_eq!(
            s.execute(Command::Edit(EditCommand::Undo)).unwrap(),
            CommandResult::Changed(true)
        );
        assert_eq!(s.text(), "one\ntwo");
    }

    #[test]
    fn test_copy_paste_round_trip() {
        let mut s = session("abc");
        s.execute(Command::Select(SelectCommand::All)).unwrap();
        s.execute(Command::Edit(EditCommand::Copy)).unwrap();
        s.execute(Command::Cursor(CursorCommand::Move {
            motion: Motion::EndOfLine,
            count: 1,
        }))
        .unwrap();
        s.execute(Command::Edit(EditCommand::Paste)).unwrap();
        assert_eq!(s.text(), "abcabc");
    }

    #[test]
    fn test_batch_rolls_back_on_error() {
        let mut s = session("keep");
        let result = s.execute_batch(vec![
            Command::Edit(EditCommand::InsertText { text: "x".into() }),
            Command::Session(SessionCommand::Configure(ConfigPatch {
                tab_length: Some(0),
                ..ConfigPatch::default()
            })),
        ]);
        assert!(result.is_err());
        assert_eq!(s.text(), "keep");
    }
}
