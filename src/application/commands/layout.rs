//! Selection and node placement commands.

use std::any::Any;
use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::application::ports::{Request, Transport};
use crate::domain::types::Position;

use super::{Command, CommandError, send};

#[derive(Debug, Clone)]
pub struct SelectCommand {
    old: BTreeSet<String>,
    new: BTreeSet<String>,
    mergeable: bool,
}

impl SelectCommand {
    pub fn new(old: BTreeSet<String>, new: BTreeSet<String>, mergeable: bool) -> Self {
        Self { old, new, mergeable }
    }
}

#[async_trait]
impl Command for SelectCommand {
    fn text(&self) -> String {
        match self.new.len() {
            0 => "Clear selection".to_string(),
            1 => format!("Select {}", self.new.iter().next().map(String::as_str).unwrap_or_default()),
            count => format!("Select {count} operations"),
        }
    }

    fn is_mergeable(&self) -> bool {
        self.mergeable
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, Request::Select { ops: self.new.clone() }).await?;
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, Request::Select { ops: self.old.clone() }).await?;
        Ok(())
    }

    /// The selection is a single global field, so any two eligible selects merge.
    fn merge_with(&mut self, other: &dyn Command) -> bool {
        let Some(other) = other.as_any().downcast_ref::<SelectCommand>() else {
            return false;
        };
        if !self.mergeable || !other.mergeable {
            return false;
        }
        self.new = other.new.clone();
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionChange {
    pub op: String,
    pub old: Position,
    pub new: Position,
}

/// Repositions one or more operations as a single drag.
#[derive(Debug, Clone)]
pub struct MoveOpsCommand {
    changes: Vec<PositionChange>,
    mergeable: bool,
}

impl MoveOpsCommand {
    pub fn new(changes: Vec<PositionChange>, mergeable: bool) -> Self {
        Self { changes, mergeable }
    }

    pub fn changes(&self) -> &[PositionChange] {
        &self.changes
    }
}

#[async_trait]
impl Command for MoveOpsCommand {
    fn text(&self) -> String {
        match self.changes.as_slice() {
            [change] => format!("Move {}", change.op),
            changes => format!("Move {} operations", changes.len()),
        }
    }

    fn is_mergeable(&self) -> bool {
        self.mergeable
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for change in &self.changes {
            send(
                transport,
                Request::Move {
                    op: change.op.clone(),
                    position: change.new,
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for change in self.changes.iter().rev() {
            send(
                transport,
                Request::Move {
                    op: change.op.clone(),
                    position: change.old,
                },
            )
            .await?;
        }
        Ok(())
    }

    fn merge_with(&mut self, other: &dyn Command) -> bool {
        let Some(other) = other.as_any().downcast_ref::<MoveOpsCommand>() else {
            return false;
        };
        let same_targets = self.changes.len() == other.changes.len()
            && self
                .changes
                .iter()
                .zip(&other.changes)
                .all(|(mine, theirs)| mine.op == theirs.op);
        if !self.mergeable || !other.mergeable || !same_targets {
            return false;
        }
        for (mine, theirs) in self.changes.iter_mut().zip(&other.changes) {
            mine.new = theirs.new;
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
