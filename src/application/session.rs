//! Editor-facing facade over the graph mirror and the command pipeline.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::application::commands::{CommandDispatcher, CommandError, Dispatched, Placement, UndoStack};
use crate::application::ports::{CreateOpParams, ServerQuery, Transport};
use crate::cache::{BodySource, CacheConfig};
use crate::config::Settings;
use crate::domain::error::DomainError;
use crate::domain::types::{Activation, Feed, FrameId, ParamValue, Position};
use crate::graph::{DEFAULT_EVENT_BACKLOG_LIMIT, GraphSnapshot, GraphStore, Listener, Notice};

const SOURCE: &str = "application::session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub undo_limit: usize,
    pub notification_batch_limit: usize,
    /// Delivered events kept for [`EditorSession::drain_events`].
    pub event_backlog_limit: usize,
    pub cache: CacheConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            undo_limit: 200,
            notification_batch_limit: 256,
            event_backlog_limit: DEFAULT_EVENT_BACKLOG_LIMIT,
            cache: CacheConfig::default(),
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            undo_limit: settings.session.undo_limit.get(),
            notification_batch_limit: settings.session.notification_batch_limit.get(),
            event_backlog_limit: settings.session.event_backlog_limit,
            cache: CacheConfig::from(&settings.cache),
        }
    }
}

/// One editor connected to one server.
///
/// Every tracked edit lands on the undo stack; use [`EditorSession::parts_mut`]
/// to place commands elsewhere.
#[derive(Debug)]
pub struct EditorSession {
    store: GraphStore,
    dispatcher: CommandDispatcher,
}

impl EditorSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        query: Arc<dyn ServerQuery>,
        config: SessionConfig,
    ) -> Self {
        let mut store = GraphStore::with_event_backlog(config.cache, config.event_backlog_limit);
        store.sync_frames(query.as_ref());
        let dispatcher = CommandDispatcher::new(
            transport,
            query,
            config.undo_limit,
            config.notification_batch_limit,
        );
        dispatcher.pump(&mut store);
        info!(
            target_module = SOURCE,
            undo_limit = config.undo_limit,
            visible_frame = store.visible_frame(),
            "Editor session attached"
        );
        Self { store, dispatcher }
    }

    /// Attach to a server that serves both requests and queries.
    pub fn attach<S>(server: Arc<S>, config: SessionConfig) -> Self
    where
        S: Transport + ServerQuery + 'static,
    {
        let transport: Arc<dyn Transport> = server.clone();
        let query: Arc<dyn ServerQuery> = server;
        Self::new(transport, query, config)
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn history(&self) -> &UndoStack {
        self.dispatcher.stack()
    }

    pub fn history_mut(&mut self) -> &mut UndoStack {
        self.dispatcher.stack_mut()
    }

    pub fn parts_mut(&mut self) -> (&mut CommandDispatcher, &mut GraphStore) {
        (&mut self.dispatcher, &mut self.store)
    }

    /// Apply notifications that arrived outside a request, e.g. from another client.
    pub fn sync(&mut self) -> usize {
        self.dispatcher.pump(&mut self.store)
    }

    pub async fn create_op(&mut self, params: CreateOpParams) -> Result<String, CommandError> {
        let (name, _) = self
            .dispatcher
            .create_op(&mut self.store, params, Placement::Stack)
            .await?;
        Ok(name)
    }

    pub async fn erase_op(&mut self, op: &str) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .erase_op(&mut self.store, op, Placement::Stack)
            .await
    }

    /// Set one parameter. Consecutive mergeable edits of the same target
    /// collapse into one undo entry.
    pub async fn set_param(
        &mut self,
        op: &str,
        param: &str,
        value: ParamValue,
        mergeable: bool,
    ) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .set_param(&mut self.store, op, param, value, mergeable, Placement::Stack)
            .await
    }

    pub async fn set_params(
        &mut self,
        writes: Vec<(String, String, ParamValue)>,
        mergeable: bool,
    ) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .set_params(&mut self.store, writes, mergeable, Placement::Stack)
            .await
    }

    pub async fn connect(&mut self, feed: Feed) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .connect(&mut self.store, feed, Placement::Stack)
            .await
    }

    pub async fn disconnect(&mut self, feed: Feed) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .disconnect(&mut self.store, feed, Placement::Stack)
            .await
    }

    pub async fn select(
        &mut self,
        ops: BTreeSet<String>,
        mergeable: bool,
    ) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .select(&mut self.store, ops, mergeable, Placement::Stack)
            .await
    }

    pub async fn move_ops(
        &mut self,
        moves: Vec<(String, Position)>,
        mergeable: bool,
    ) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .move_ops(&mut self.store, moves, mergeable, Placement::Stack)
            .await
    }

    pub async fn set_activation(
        &mut self,
        op: &str,
        activation: Activation,
    ) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .set_activation(&mut self.store, op, activation, Placement::Stack)
            .await
    }

    pub async fn clear_graph(&mut self) -> Result<Dispatched, CommandError> {
        self.dispatcher
            .clear_graph(&mut self.store, Placement::Stack)
            .await
    }

    pub async fn paste(
        &mut self,
        items: Vec<CreateOpParams>,
        offset: Position,
    ) -> Result<Vec<String>, CommandError> {
        let (created, _) = self.dispatcher.paste(&mut self.store, items, offset).await?;
        Ok(created)
    }

    pub async fn set_visible_frame(&mut self, frame: FrameId) -> Result<(), CommandError> {
        self.dispatcher
            .set_visible_frame(&mut self.store, frame)
            .await?;
        Ok(())
    }

    pub async fn set_project_path(&mut self, path: PathBuf) -> Result<(), CommandError> {
        self.dispatcher.set_project_path(&mut self.store, path).await?;
        Ok(())
    }

    pub async fn step(&mut self) -> Result<(), CommandError> {
        self.dispatcher.step(&mut self.store).await?;
        Ok(())
    }

    pub async fn undo(&mut self) -> Result<(), CommandError> {
        self.dispatcher.undo(&mut self.store).await
    }

    pub async fn redo(&mut self) -> Result<(), CommandError> {
        self.dispatcher.redo(&mut self.store).await
    }

    /// Bodies of `op:plug` as the editor should display them at the visible frame.
    pub fn bodies(&mut self, op: &str, plug: &str) -> Result<BodySource<'_>, DomainError> {
        let visible = self.store.visible_frame();
        self.store
            .resolve_bodies(op, plug, visible, self.dispatcher.query())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.store.subscribe(listener);
    }

    pub fn drain_events(&mut self) -> Vec<Notice> {
        self.store.drain_events()
    }
}
