//! Request sequencing and success-gated undo recording.
//!
//! Every user action follows the same path: issue one request, await its
//! reply, pull the resulting notifications into the [`GraphStore`], re-check
//! that the targets still exist, and only then build the command and place it.
//! A rejected request builds nothing, so the history never holds a mutation
//! the server did not apply.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::ports::{CreateOpParams, Reply, Request, ServerQuery, Transport};
use crate::domain::error::DomainError;
use crate::domain::types::{Activation, Feed, FrameId, ParamValue, Position};
use crate::graph::{GraphStore, Operation};

use super::{
    ClearGraphCommand, Command, CommandError, CreateOpCommand, EraseOpCommand, FeedCommand,
    MacroCommand, MoveOpsCommand, ParamChange, PositionChange, PushOutcome, SelectCommand,
    SetActivationCommand, SetParamsCommand, UndoStack,
};

const SOURCE: &str = "application::commands::dispatcher";
pub(crate) const METRIC_REQUEST_FAILED_TOTAL: &str = "graphsync_request_failed_total";
pub(crate) const METRIC_STALE_CALLBACK_TOTAL: &str = "graphsync_stale_callback_total";

/// Where a confirmed command goes.
#[derive(Debug)]
pub enum Placement<'a> {
    /// Fire-and-forget: no undo entry.
    Untracked,
    /// Child of a compound action that has not been pushed yet.
    Child(&'a mut MacroCommand),
    /// Pushed onto the undo stack, merging with the top when eligible.
    Stack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Applied without an undo entry.
    Applied,
    /// Added to a parent compound command.
    Grouped,
    Pushed,
    Merged,
    /// The target disappeared while the request was in flight; nothing recorded.
    Stale,
}

impl From<PushOutcome> for Dispatched {
    fn from(outcome: PushOutcome) -> Self {
        match outcome {
            PushOutcome::Pushed => Dispatched::Pushed,
            PushOutcome::Merged => Dispatched::Merged,
        }
    }
}

pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    query: Arc<dyn ServerQuery>,
    stack: UndoStack,
    batch_limit: usize,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        query: Arc<dyn ServerQuery>,
        undo_limit: usize,
        batch_limit: usize,
    ) -> Self {
        Self {
            transport,
            query,
            stack: UndoStack::new(undo_limit),
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn stack(&self) -> &UndoStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut UndoStack {
        &mut self.stack
    }

    pub fn query(&self) -> &dyn ServerQuery {
        self.query.as_ref()
    }

    /// Apply every pending server notification to `store`, in delivery order.
    pub fn pump(&self, store: &mut GraphStore) -> usize {
        let mut applied = 0;
        loop {
            let batch = self.transport.drain_notifications(self.batch_limit);
            if batch.is_empty() {
                break;
            }
            applied += store.apply_all(batch, self.query.as_ref());
        }
        if applied > 0 {
            debug!(target_module = SOURCE, applied, "Server notifications applied");
        }
        applied
    }

    /// Issue one request and, on success, bring the store up to date.
    async fn issue(&self, store: &mut GraphStore, request: Request) -> Result<Reply, CommandError> {
        let request_id = Uuid::new_v4();
        let kind = request.kind();
        debug!(target_module = SOURCE, %request_id, kind = %kind, "Request issued");

        match self.transport.issue(request).await {
            Ok(reply) => {
                self.pump(store);
                Ok(reply)
            }
            Err(error) => {
                counter!(METRIC_REQUEST_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
                warn!(
                    target_module = SOURCE,
                    %request_id,
                    kind = %kind,
                    error = %error,
                    "Request failed; nothing recorded"
                );
                Err(error.into())
            }
        }
    }

    fn stale(&self, kind: &'static str, target: &str) -> Dispatched {
        counter!(METRIC_STALE_CALLBACK_TOTAL).increment(1);
        debug!(
            target_module = SOURCE,
            kind,
            target,
            "Target vanished while request was in flight; result dropped"
        );
        Dispatched::Stale
    }

    async fn place(
        &mut self,
        command: Box<dyn Command>,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        match placement {
            Placement::Untracked => Ok(Dispatched::Applied),
            Placement::Child(parent) => {
                parent.push(command);
                Ok(Dispatched::Grouped)
            }
            Placement::Stack => {
                let outcome = self.stack.push(command, self.transport.as_ref()).await?;
                Ok(outcome.into())
            }
        }
    }

    fn require_op<'s>(
        store: &'s GraphStore,
        op: &str,
    ) -> Result<&'s Operation, CommandError> {
        store
            .query_const_op(op)
            .ok_or_else(|| DomainError::not_found("operation", op).into())
    }

    /// Create an operation. Returns the name the server assigned.
    pub async fn create_op(
        &mut self,
        store: &mut GraphStore,
        params: CreateOpParams,
        placement: Placement<'_>,
    ) -> Result<(String, Dispatched), CommandError> {
        let reply = self.issue(store, Request::CreateOp(params.clone())).await?;
        let name = match reply {
            Reply::Created { op } => op,
            Reply::Done => params.name.clone(),
        };
        if !store.contains(&name) {
            return Ok((name.clone(), self.stale("create_op", &name)));
        }

        let confirmed = CreateOpParams {
            name: name.clone(),
            ..params
        };
        let dispatched = self
            .place(Box::new(CreateOpCommand::new(confirmed)), placement)
            .await?;
        Ok((name, dispatched))
    }

    pub async fn erase_op(
        &mut self,
        store: &mut GraphStore,
        op: &str,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let record = Self::record(Self::require_op(store, op)?);
        let feeds = store.feeds_of(op);

        self.issue(store, Request::EraseOp { op: op.to_string() }).await?;
        self.place(Box::new(EraseOpCommand::new(record, feeds)), placement)
            .await
    }

    fn record(op: &Operation) -> CreateOpParams {
        CreateOpParams {
            type_name: op.type_name().to_string(),
            name: op.name().to_string(),
            params: op.params().clone(),
            position: op.position(),
            activation: op.activation(),
        }
    }

    /// Set many parameters as one undoable batch.
    ///
    /// One request per entry. If a request fails part way, the entries that
    /// already succeeded are still recorded before the error is returned.
    pub async fn set_params(
        &mut self,
        store: &mut GraphStore,
        writes: Vec<(String, String, ParamValue)>,
        mergeable: bool,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let mut planned = Vec::with_capacity(writes.len());
        for (op, param, new) in writes {
            let old = Self::require_op(store, &op)?
                .param(&param)
                .cloned()
                .ok_or_else(|| {
                    DomainError::not_found("parameter", format!("{op}:{param}"))
                })?;
            planned.push(ParamChange { op, param, old, new });
        }

        let mut confirmed = Vec::with_capacity(planned.len());
        let mut failure = None;
        let mut stale = 0;
        for change in planned {
            let request = Request::SetParam {
                op: change.op.clone(),
                param: change.param.clone(),
                value: change.new.clone(),
            };
            if let Err(error) = self.issue(store, request).await {
                failure = Some(error);
                break;
            }
            if store.contains(&change.op) {
                confirmed.push(change);
            } else {
                self.stale("set_param", &change.op);
                stale += 1;
            }
        }

        let dispatched = if confirmed.is_empty() {
            if stale > 0 { Dispatched::Stale } else { Dispatched::Applied }
        } else {
            self.place(Box::new(SetParamsCommand::new(confirmed, mergeable)), placement)
                .await?
        };
        match failure {
            Some(error) => Err(error),
            None => Ok(dispatched),
        }
    }

    pub async fn set_param(
        &mut self,
        store: &mut GraphStore,
        op: &str,
        param: &str,
        value: ParamValue,
        mergeable: bool,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        self.set_params(
            store,
            vec![(op.to_string(), param.to_string(), value)],
            mergeable,
            placement,
        )
        .await
    }

    pub async fn connect(
        &mut self,
        store: &mut GraphStore,
        feed: Feed,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        self.change_feed(store, feed, true, placement).await
    }

    pub async fn disconnect(
        &mut self,
        store: &mut GraphStore,
        feed: Feed,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        self.change_feed(store, feed, false, placement).await
    }

    async fn change_feed(
        &mut self,
        store: &mut GraphStore,
        feed: Feed,
        connect: bool,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let request = if connect {
            Request::Connect(feed.clone())
        } else {
            Request::Disconnect(feed.clone())
        };
        self.issue(store, request).await?;

        for end in [feed.from.op(), feed.to.op()] {
            if !store.contains(end) {
                return Ok(self.stale("feed", end));
            }
        }
        self.place(Box::new(FeedCommand::new(feed, connect)), placement)
            .await
    }

    pub async fn select(
        &mut self,
        store: &mut GraphStore,
        ops: BTreeSet<String>,
        mergeable: bool,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let old = store.selected().clone();
        self.issue(store, Request::Select { ops }).await?;
        let new = store.selected().clone();
        self.place(Box::new(SelectCommand::new(old, new, mergeable)), placement)
            .await
    }

    /// Reposition operations as one drag.
    pub async fn move_ops(
        &mut self,
        store: &mut GraphStore,
        moves: Vec<(String, Position)>,
        mergeable: bool,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let mut planned = Vec::with_capacity(moves.len());
        for (op, new) in moves {
            let old = Self::require_op(store, &op)?.position();
            planned.push(PositionChange { op, old, new });
        }

        let mut confirmed = Vec::with_capacity(planned.len());
        let mut failure = None;
        let mut stale = 0;
        for change in planned {
            let request = Request::Move {
                op: change.op.clone(),
                position: change.new,
            };
            if let Err(error) = self.issue(store, request).await {
                failure = Some(error);
                break;
            }
            if store.contains(&change.op) {
                confirmed.push(change);
            } else {
                self.stale("move", &change.op);
                stale += 1;
            }
        }

        let dispatched = if confirmed.is_empty() {
            if stale > 0 { Dispatched::Stale } else { Dispatched::Applied }
        } else {
            self.place(Box::new(MoveOpsCommand::new(confirmed, mergeable)), placement)
                .await?
        };
        match failure {
            Some(error) => Err(error),
            None => Ok(dispatched),
        }
    }

    pub async fn set_activation(
        &mut self,
        store: &mut GraphStore,
        op: &str,
        activation: Activation,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let old = Self::require_op(store, op)?.activation();
        self.issue(
            store,
            Request::SetActivation {
                op: op.to_string(),
                activation,
            },
        )
        .await?;
        if !store.contains(op) {
            return Ok(self.stale("set_activation", op));
        }
        self.place(
            Box::new(SetActivationCommand::new(op, old, activation)),
            placement,
        )
        .await
    }

    pub async fn clear_graph(
        &mut self,
        store: &mut GraphStore,
        placement: Placement<'_>,
    ) -> Result<Dispatched, CommandError> {
        let ops: Vec<CreateOpParams> = store.mutable_ops().map(Self::record).collect();
        let feeds: Vec<Feed> = store.feeds().iter().cloned().collect();
        let selected = store.selected().clone();

        self.issue(store, Request::ClearGraph).await?;
        info!(target_module = SOURCE, ops = ops.len(), feeds = feeds.len(), "Graph cleared");
        self.place(Box::new(ClearGraphCommand::new(ops, feeds, selected)), placement)
            .await
    }

    /// Paste: create each operation, offset it, then select the pasted set,
    /// recorded as one undo entry.
    ///
    /// If a step fails, what already happened is still recorded so the
    /// history matches the server, and the error is returned.
    pub async fn paste(
        &mut self,
        store: &mut GraphStore,
        items: Vec<CreateOpParams>,
        offset: Position,
    ) -> Result<(Vec<String>, Dispatched), CommandError> {
        let mut group = MacroCommand::new(format!("Paste {} operations", items.len()));
        let mut created = Vec::with_capacity(items.len());

        let outcome = self
            .paste_into(store, items, offset, &mut group, &mut created)
            .await;

        let dispatched = if group.is_empty() {
            Dispatched::Applied
        } else {
            self.place(Box::new(group), Placement::Stack).await?
        };
        outcome.map(|()| (created, dispatched))
    }

    async fn paste_into(
        &mut self,
        store: &mut GraphStore,
        items: Vec<CreateOpParams>,
        offset: Position,
        group: &mut MacroCommand,
        created: &mut Vec<String>,
    ) -> Result<(), CommandError> {
        let mut moves = Vec::with_capacity(items.len());
        for params in items {
            let target = Position::new(params.position.x + offset.x, params.position.y + offset.y);
            let (name, dispatched) = self
                .create_op(store, params, Placement::Child(&mut *group))
                .await?;
            if dispatched == Dispatched::Grouped {
                moves.push((name.clone(), target));
                created.push(name);
            }
        }
        if created.is_empty() {
            return Ok(());
        }

        self.move_ops(store, moves, false, Placement::Child(&mut *group))
            .await?;
        let selection: BTreeSet<String> = created.iter().cloned().collect();
        self.select(store, selection, false, Placement::Child(group))
            .await?;
        Ok(())
    }

    /// Fire-and-forget: change the frame the editor displays.
    pub async fn set_visible_frame(
        &mut self,
        store: &mut GraphStore,
        frame: FrameId,
    ) -> Result<Dispatched, CommandError> {
        self.issue(store, Request::SetVisibleFrame { frame }).await?;
        Ok(Dispatched::Applied)
    }

    pub async fn set_project_path(
        &mut self,
        store: &mut GraphStore,
        path: PathBuf,
    ) -> Result<Dispatched, CommandError> {
        self.issue(store, Request::SetProjectPath { path }).await?;
        Ok(Dispatched::Applied)
    }

    /// Ask the server to compute the next frame.
    pub async fn step(&mut self, store: &mut GraphStore) -> Result<Dispatched, CommandError> {
        self.issue(store, Request::Step).await?;
        Ok(Dispatched::Applied)
    }

    pub async fn undo(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        let result = self.stack.undo(self.transport.as_ref()).await;
        self.pump(store);
        result
    }

    pub async fn redo(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        let result = self.stack.redo(self.transport.as_ref()).await;
        self.pump(store);
        result
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("stack", &self.stack)
            .field("batch_limit", &self.batch_limit)
            .finish()
    }
}
