//! Undoable commands whose effect runs on the server.
//!
//! A command is only ever built after the server confirmed the mutation it
//! describes, so its first redo must not re-apply anything. [`CommandCell`]
//! owns that first-redo flag; concrete commands only implement the later,
//! real re-application in [`Command::delayed_redo`].

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use crate::application::ports::{Reply, Request, RequestError, Transport};
use crate::domain::error::DomainError;

mod dispatcher;
mod feeds;
mod graph;
mod layout;
mod params;
mod undo;

pub use dispatcher::{CommandDispatcher, Dispatched, Placement};
pub use feeds::FeedCommand;
pub use graph::{ClearGraphCommand, CreateOpCommand, EraseOpCommand};
pub use layout::{MoveOpsCommand, PositionChange, SelectCommand};
pub use params::{ParamChange, SetActivationCommand, SetParamsCommand};
pub use undo::{PushOutcome, UndoStack};

const SOURCE: &str = "application::commands";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

/// One confirmed, undoable mutation.
#[async_trait]
pub trait Command: Send + Sync + fmt::Debug {
    /// Label for menus, e.g. "Set src1:count".
    fn text(&self) -> String;

    fn is_mergeable(&self) -> bool {
        false
    }

    /// Re-apply the effect after an undo.
    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError>;

    /// Apply the inverse effect.
    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError>;

    /// Absorb `other` into `self`. Only same-kind, merge-eligible commands
    /// targeting the same fields merge; `self` keeps its old values and adopts
    /// the new ones.
    fn merge_with(&mut self, _other: &dyn Command) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// Send `request` and fail on rejection.
pub(crate) async fn send(transport: &dyn Transport, request: Request) -> Result<Reply, CommandError> {
    Ok(transport.issue(request).await?)
}

/// Stack slot wrapping a command with its first-redo flag.
#[derive(Debug)]
pub struct CommandCell {
    command: Box<dyn Command>,
    is_first_redo: bool,
}

impl CommandCell {
    pub fn new(command: Box<dyn Command>) -> Self {
        Self {
            command,
            is_first_redo: true,
        }
    }

    /// The first call only clears the flag: the effect already happened on
    /// the server. Later calls re-apply through [`Command::delayed_redo`].
    pub async fn redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        if self.is_first_redo {
            self.is_first_redo = false;
            return Ok(());
        }
        self.command.delayed_redo(transport).await
    }

    pub async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        self.command.undo(transport).await
    }

    pub fn merge_with(&mut self, other: &dyn Command) -> bool {
        self.command.merge_with(other)
    }

    pub fn text(&self) -> String {
        self.command.text()
    }

    pub fn command(&self) -> &dyn Command {
        self.command.as_ref()
    }

    pub fn is_first_redo(&self) -> bool {
        self.is_first_redo
    }
}

/// Parent command whose children undo and redo as one unit.
#[derive(Debug)]
pub struct MacroCommand {
    text: String,
    children: Vec<Box<dyn Command>>,
}

impl MacroCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: Box<dyn Command>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> impl Iterator<Item = &dyn Command> {
        self.children.iter().map(|child| child.as_ref())
    }
}

#[async_trait]
impl Command for MacroCommand {
    fn text(&self) -> String {
        self.text.clone()
    }

    /// On a failing child, the children already redone are undone again so
    /// the server is left as it was before the call.
    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for index in 0..self.children.len() {
            if let Err(error) = self.children[index].delayed_redo(transport).await {
                warn!(
                    target_module = SOURCE,
                    command = %self.text,
                    child = index,
                    error = %error,
                    "Macro redo stopped at failing child; rolling back"
                );
                for (done, child) in self.children[..index].iter_mut().enumerate().rev() {
                    report_rollback(&self.text, done, child.undo(transport).await);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// On a failing child, the children already undone are redone again so
    /// the undo position and the server keep agreeing.
    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for index in (0..self.children.len()).rev() {
            if let Err(error) = self.children[index].undo(transport).await {
                warn!(
                    target_module = SOURCE,
                    command = %self.text,
                    child = index,
                    error = %error,
                    "Macro undo stopped at failing child; rolling back"
                );
                let start = index + 1;
                for (offset, child) in self.children[start..].iter_mut().enumerate() {
                    report_rollback(&self.text, start + offset, child.delayed_redo(transport).await);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A failed rollback leaves the server partly applied; there is nothing
/// further to compensate with, so it is only reported.
fn report_rollback(command: &str, child: usize, result: Result<(), CommandError>) {
    if let Err(error) = result {
        error!(
            target_module = SOURCE,
            command,
            child,
            error = %error,
            "Macro rollback failed; server state diverges from history"
        );
    }
}
