//! Undo history of server-confirmed commands.

use metrics::counter;
use tracing::{debug, info};

use crate::application::ports::Transport;

use super::{Command, CommandCell, CommandError};

const SOURCE: &str = "application::commands::undo";
pub(crate) const METRIC_COMMAND_PUSH_TOTAL: &str = "graphsync_command_push_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The command was absorbed by the current top and discarded.
    Merged,
}

/// Ordered command history with a current position.
///
/// Cells below `index` are applied; cells at or above it can be redone.
#[derive(Debug)]
pub struct UndoStack {
    cells: Vec<CommandCell>,
    index: usize,
    limit: usize,
    clean_index: Option<usize>,
}

impl UndoStack {
    /// `limit` bounds the history depth; the oldest entries are dropped.
    pub fn new(limit: usize) -> Self {
        Self {
            cells: Vec::new(),
            index: 0,
            limit: limit.max(1),
            clean_index: Some(0),
        }
    }

    /// Record a confirmed command.
    ///
    /// Any undone history is dropped first. The command then either merges
    /// into the current top or is pushed, which runs its (no-op) first redo.
    pub async fn push(
        &mut self,
        command: Box<dyn Command>,
        transport: &dyn Transport,
    ) -> Result<PushOutcome, CommandError> {
        if self.index < self.cells.len() {
            debug!(
                target_module = SOURCE,
                dropped = self.cells.len() - self.index,
                "Redo history truncated"
            );
            self.cells.truncate(self.index);
            if self.clean_index.is_some_and(|clean| clean > self.index) {
                self.clean_index = None;
            }
        }

        if command.is_mergeable()
            && let Some(top) = self.cells.last_mut()
            && top.merge_with(command.as_ref())
        {
            if self.clean_index == Some(self.index) {
                self.clean_index = None;
            }
            counter!(METRIC_COMMAND_PUSH_TOTAL, "outcome" => "merged").increment(1);
            debug!(target_module = SOURCE, command = %top.text(), "Command merged into top");
            return Ok(PushOutcome::Merged);
        }

        let mut cell = CommandCell::new(command);
        cell.redo(transport).await?;
        info!(
            target_module = SOURCE,
            command = %cell.text(),
            depth = self.index + 1,
            "Command pushed"
        );
        self.cells.push(cell);
        self.index += 1;
        counter!(METRIC_COMMAND_PUSH_TOTAL, "outcome" => "pushed").increment(1);

        if self.cells.len() > self.limit {
            let excess = self.cells.len() - self.limit;
            self.cells.drain(..excess);
            self.index -= excess;
            self.clean_index = self.clean_index.and_then(|clean| clean.checked_sub(excess));
        }

        Ok(PushOutcome::Pushed)
    }

    /// Undo the command below the current position.
    ///
    /// On failure the position does not move.
    pub async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        if self.index == 0 {
            return Err(CommandError::NothingToUndo);
        }
        let cell = &mut self.cells[self.index - 1];
        cell.undo(transport).await?;
        debug!(target_module = SOURCE, command = %cell.text(), "Command undone");
        self.index -= 1;
        Ok(())
    }

    pub async fn redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        let Some(cell) = self.cells.get_mut(self.index) else {
            return Err(CommandError::NothingToRedo);
        };
        cell.redo(transport).await?;
        debug!(target_module = SOURCE, command = %cell.text(), "Command redone");
        self.index += 1;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.cells.len()
    }

    pub fn text_for_undo(&self) -> Option<String> {
        self.index.checked_sub(1).map(|top| self.cells[top].text())
    }

    pub fn text_for_redo(&self) -> Option<String> {
        self.cells.get(self.index).map(CommandCell::text)
    }

    /// Labels of every entry, oldest first.
    pub fn texts(&self) -> Vec<String> {
        self.cells.iter().map(CommandCell::text).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.index)
    }

    /// Mark the current position as matching the saved state.
    pub fn set_clean(&mut self) {
        self.clean_index = Some(self.index);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.index = 0;
        self.clean_index = Some(0);
    }
}
