//! Structural commands: create, erase and clear.

use std::any::Any;
use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::application::ports::{CreateOpParams, Reply, Request, Transport};
use crate::domain::types::Feed;

use super::{Command, CommandError, send};

/// Re-create an operation and return the name the server gave it.
async fn recreate(transport: &dyn Transport, params: &CreateOpParams) -> Result<String, CommandError> {
    match send(transport, Request::CreateOp(params.clone())).await? {
        Reply::Created { op } => Ok(op),
        Reply::Done => Ok(params.name.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct CreateOpCommand {
    params: CreateOpParams,
}

impl CreateOpCommand {
    /// `params.name` must be the name the server confirmed.
    pub fn new(params: CreateOpParams) -> Self {
        Self { params }
    }

    pub fn op(&self) -> &str {
        &self.params.name
    }
}

#[async_trait]
impl Command for CreateOpCommand {
    fn text(&self) -> String {
        format!("Create {}", self.params.name)
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        self.params.name = recreate(transport, &self.params).await?;
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(
            transport,
            Request::EraseOp {
                op: self.params.name.clone(),
            },
        )
        .await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Erase with enough recorded state to bring the operation and its feeds back.
#[derive(Debug, Clone)]
pub struct EraseOpCommand {
    record: CreateOpParams,
    feeds: Vec<Feed>,
}

impl EraseOpCommand {
    pub fn new(record: CreateOpParams, feeds: Vec<Feed>) -> Self {
        Self { record, feeds }
    }
}

#[async_trait]
impl Command for EraseOpCommand {
    fn text(&self) -> String {
        format!("Erase {}", self.record.name)
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(
            transport,
            Request::EraseOp {
                op: self.record.name.clone(),
            },
        )
        .await?;
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        self.record.name = recreate(transport, &self.record).await?;
        for feed in &self.feeds {
            send(transport, Request::Connect(feed.clone())).await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClearGraphCommand {
    ops: Vec<CreateOpParams>,
    feeds: Vec<Feed>,
    selected: BTreeSet<String>,
}

impl ClearGraphCommand {
    pub fn new(ops: Vec<CreateOpParams>, feeds: Vec<Feed>, selected: BTreeSet<String>) -> Self {
        Self {
            ops,
            feeds,
            selected,
        }
    }
}

#[async_trait]
impl Command for ClearGraphCommand {
    fn text(&self) -> String {
        "Clear graph".to_string()
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, Request::ClearGraph).await?;
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for op in &mut self.ops {
            op.name = recreate(transport, op).await?;
        }
        for feed in &self.feeds {
            send(transport, Request::Connect(feed.clone())).await?;
        }
        if !self.selected.is_empty() {
            send(
                transport,
                Request::Select {
                    ops: self.selected.clone(),
                },
            )
            .await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::RecordingTransport;
    use super::*;
    use crate::domain::types::PlugName;

    #[tokio::test]
    async fn create_undo_erases_and_redo_recreates() {
        let transport = RecordingTransport::default();
        let params = CreateOpParams::new("Source", "src1");
        let mut command = CreateOpCommand::new(params.clone());

        command.undo(&transport).await.expect("undo");
        command.delayed_redo(&transport).await.expect("redo");
        assert_eq!(
            transport.requests(),
            vec![
                Request::EraseOp {
                    op: "src1".to_string()
                },
                Request::CreateOp(params)
            ]
        );
        assert_eq!(command.op(), "src1");
    }

    #[tokio::test]
    async fn erase_undo_restores_feeds_after_the_operation() {
        let transport = RecordingTransport::default();
        let feed = Feed::new(
            PlugName::new("src1", "out").expect("plug"),
            PlugName::new("view1", "in").expect("plug"),
        );
        let record = CreateOpParams::new("Source", "src1");
        let mut command = EraseOpCommand::new(record.clone(), vec![feed.clone()]);

        command.undo(&transport).await.expect("undo");
        assert_eq!(
            transport.requests(),
            vec![Request::CreateOp(record), Request::Connect(feed)]
        );
    }

    #[test]
    fn structural_commands_never_merge() {
        let mut create = CreateOpCommand::new(CreateOpParams::new("Source", "a"));
        let other = CreateOpCommand::new(CreateOpParams::new("Source", "a"));
        assert!(!create.is_mergeable());
        assert!(!create.merge_with(&other));

        let mut clear = ClearGraphCommand::new(Vec::new(), Vec::new(), BTreeSet::new());
        assert!(!clear.merge_with(&ClearGraphCommand::new(Vec::new(), Vec::new(), BTreeSet::new())));
    }
}
