//! Mirror of confirmed server graph state.
//!
//! The store changes only in reaction to server notifications. Each
//! notification is applied to completion, then the events it produced are
//! delivered, so listeners never observe a half-applied change.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::application::ports::{OpDescriptor, ServerNotification, ServerQuery};
use crate::cache::{
    BodySource, CacheConfig, OpCacheController, PlugCacheController, RefreshOutcome, SourceKind,
    TopologyView, resolve_source,
};
use crate::domain::error::DomainError;
use crate::domain::types::{
    Activation, Condition, Feed, FrameId, GLOBAL_OP, ParamValue, PlugName, Position,
};

use super::entities::Operation;
use super::events::{DEFAULT_EVENT_BACKLOG_LIMIT, EventBus, GraphEvent, Listener, Notice};
use super::snapshot::{GraphSnapshot, OpSnapshot};

const SOURCE: &str = "graph::store";

/// Index of every operation, plug and feed the server has confirmed.
#[derive(Debug)]
pub struct GraphStore {
    ops: BTreeMap<String, Operation>,
    by_type: BTreeMap<String, BTreeSet<String>>,
    by_family: BTreeMap<String, BTreeSet<String>>,
    selected: BTreeSet<String>,
    feeds: BTreeSet<Feed>,
    placeholder_ops: BTreeSet<String>,
    visible_frame: FrameId,
    computing_frame: FrameId,
    project_path: Option<PathBuf>,
    config: CacheConfig,
    events: EventBus,
}

impl GraphStore {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_event_backlog(config, DEFAULT_EVENT_BACKLOG_LIMIT)
    }

    /// Keep at most `backlog_limit` delivered events for [`GraphStore::drain_events`].
    pub fn with_event_backlog(config: CacheConfig, backlog_limit: usize) -> Self {
        let mut store = Self {
            ops: BTreeMap::new(),
            by_type: BTreeMap::new(),
            by_family: BTreeMap::new(),
            selected: BTreeSet::new(),
            feeds: BTreeSet::new(),
            placeholder_ops: BTreeSet::new(),
            visible_frame: 0,
            computing_frame: 0,
            project_path: None,
            config,
            events: EventBus::with_backlog_limit(backlog_limit),
        };
        store.install_sentinel();
        store
    }

    /// Adopt the server's current frames, e.g. at session start.
    pub fn sync_frames(&mut self, query: &dyn ServerQuery) {
        self.visible_frame = query.current_visible_frame();
        self.computing_frame = query.computing_frame();
    }

    fn install_sentinel(&mut self) {
        let sentinel = Operation::sentinel(GLOBAL_OP);
        self.index(&sentinel);
        self.ops.insert(GLOBAL_OP.to_string(), sentinel);
    }

    fn index(&mut self, op: &Operation) {
        self.by_type
            .entry(op.type_name().to_string())
            .or_default()
            .insert(op.name().to_string());
        self.by_family
            .entry(op.family().to_string())
            .or_default()
            .insert(op.name().to_string());
        if op.is_placeholder() {
            self.placeholder_ops.insert(op.name().to_string());
        }
    }

    fn unindex(&mut self, op: &Operation) {
        for (index, key) in [
            (&mut self.by_type, op.type_name()),
            (&mut self.by_family, op.family()),
        ] {
            if let Some(names) = index.get_mut(key) {
                names.remove(op.name());
                if names.is_empty() {
                    index.remove(key);
                }
            }
        }
        self.placeholder_ops.remove(op.name());
    }

    /// Apply one confirmed notification and deliver the events it produced.
    pub fn apply(&mut self, notification: ServerNotification, query: &dyn ServerQuery) {
        match notification {
            ServerNotification::OpCreated(descriptor) => self.on_op_created(descriptor, query),
            ServerNotification::OpErased { op } => self.on_op_erased(&op, query),
            ServerNotification::FeedChanged { feed, connected } => {
                self.on_feed_changed(feed, connected, query)
            }
            ServerNotification::ValueChanged { op, param, value } => {
                self.on_value_changed(&op, param, value, query)
            }
            ServerNotification::SelectionChanged { selected } => self.on_selection_changed(selected),
            ServerNotification::PositionChanged { op, position } => {
                self.on_position_changed(&op, position)
            }
            ServerNotification::ActivationChanged { op, activation } => {
                self.on_activation_changed(&op, activation)
            }
            ServerNotification::GraphCleared => self.on_graph_cleared(),
            ServerNotification::StepBegun { frame, ops } => self.on_step_begun(frame, &ops),
            ServerNotification::StepEnded { frame } => self.on_step_ended(frame, query),
            ServerNotification::ProjectPathChanged { path } => {
                self.on_project_path_changed(path, query)
            }
            ServerNotification::VisibleFrameChanged { frame } => {
                self.on_visible_frame_changed(frame, query)
            }
        }
        self.events.flush();
    }

    pub fn apply_all(
        &mut self,
        notifications: impl IntoIterator<Item = ServerNotification>,
        query: &dyn ServerQuery,
    ) -> usize {
        let mut count = 0;
        for notification in notifications {
            self.apply(notification, query);
            count += 1;
        }
        count
    }

    fn on_op_created(&mut self, descriptor: OpDescriptor, query: &dyn ServerQuery) {
        if self.ops.contains_key(&descriptor.name) {
            warn!(
                target_module = SOURCE,
                op = %descriptor.name,
                "Creation notice for an existing operation ignored"
            );
            return;
        }

        let op = Operation::from_descriptor(descriptor, query, self.config);
        info!(
            target_module = SOURCE,
            op = op.name(),
            type_name = op.type_name(),
            plugs = op.plugs().len(),
            placeholder = op.is_placeholder(),
            "Operation created"
        );
        self.index(&op);
        let name = op.name().to_string();
        self.ops.insert(name.clone(), op);
        self.events.publish(GraphEvent::OpCreated { op: name.clone() });
        self.events.publish(GraphEvent::StateChanged { op: name });
    }

    fn on_op_erased(&mut self, name: &str, query: &dyn ServerQuery) {
        if name == GLOBAL_OP {
            warn!(target_module = SOURCE, op = name, "The global operation cannot be erased");
            return;
        }
        let Some(mut op) = self.ops.remove(name) else {
            debug!(target_module = SOURCE, op = name, "Erase notice for unknown operation");
            return;
        };

        self.unindex(&op);
        let was_selected = self.selected.remove(name);
        let dropped: Vec<Feed> = self.feeds.iter().filter(|feed| feed.touches(name)).cloned().collect();
        let mut consumers = BTreeSet::new();
        for feed in &dropped {
            self.feeds.remove(feed);
            if feed.from.op() == name && feed.to.op() != name {
                consumers.insert(feed.to.op().to_string());
            }
        }
        let affected: BTreeSet<String> = dropped
            .iter()
            .flat_map(|feed| self.policy_scope(feed))
            .filter(|end| end != name)
            .collect();
        op.release_caches();
        drop(op);

        info!(
            target_module = SOURCE,
            op = name,
            feeds_dropped = dropped.len(),
            "Operation erased"
        );

        for op in &affected {
            self.reevaluate_policies(op, query);
        }
        for consumer in &consumers {
            self.refresh_downstream(consumer, query);
        }

        self.events.publish(GraphEvent::OpErased { op: name.to_string() });
        if was_selected {
            self.publish_selection();
        }
        self.publish_state_for_all();
    }

    fn on_feed_changed(&mut self, feed: Feed, connected: bool, query: &dyn ServerQuery) {
        let changed = if connected {
            self.feeds.insert(feed.clone())
        } else {
            self.feeds.remove(&feed)
        };
        if !changed {
            debug!(target_module = SOURCE, feed = %feed, connected, "Feed already in requested state");
            return;
        }

        info!(target_module = SOURCE, feed = %feed, connected, "Feed changed");

        for op in self.policy_scope(&feed) {
            self.reevaluate_policies(&op, query);
        }
        self.refresh_downstream(feed.to.op(), query);
        self.publish_state_for_all();
    }

    /// Operations whose derived policies can change when `feed` appears or
    /// disappears: both ends, plus the producers feeding its source, whose
    /// output counts include one level of placeholder feeds past their
    /// direct consumers.
    fn policy_scope(&self, feed: &Feed) -> BTreeSet<String> {
        let mut scope = BTreeSet::from([feed.from.op().to_string(), feed.to.op().to_string()]);
        scope.extend(
            self.feeds
                .iter()
                .filter(|upstream| upstream.to.op() == feed.from.op())
                .map(|upstream| upstream.from.op().to_string()),
        );
        scope
    }

    /// `origin` followed by every operation reachable from it through
    /// confirmed feeds, breadth first.
    fn downstream_of(&self, origin: &str) -> Vec<String> {
        let mut order = vec![origin.to_string()];
        let mut visited = BTreeSet::from([origin.to_string()]);
        let mut frontier = VecDeque::from([origin.to_string()]);
        while let Some(producer) = frontier.pop_front() {
            for feed in self.feeds.iter().filter(|feed| feed.from.op() == producer) {
                let consumer = feed.to.op().to_string();
                if visited.insert(consumer.clone()) {
                    order.push(consumer.clone());
                    frontier.push_back(consumer);
                }
            }
        }
        order
    }

    /// Re-check the historical caches of `origin` and everything it feeds.
    /// The server revises downstream results along with the edited operation.
    fn refresh_downstream(&mut self, origin: &str, query: &dyn ServerQuery) {
        if query.is_frame_live(self.visible_frame) || !self.ops.contains_key(origin) {
            return;
        }
        let frame = self.visible_frame;
        for name in self.downstream_of(origin) {
            self.refresh_op(&name, frame, query);
        }
    }

    /// Re-derive the cache policies of one operation from the current feed set.
    fn reevaluate_policies(&mut self, name: &str, query: &dyn ServerQuery) {
        let view = TopologyView::new(&self.feeds, &self.placeholder_ops);
        let Some(op) = self.ops.get_mut(name) else {
            return;
        };

        let mut rebuilt = Vec::new();
        for plug in op.plugs_mut() {
            let plug_name = plug.name().clone();
            let Some(controller) = plug.live_cache_mut() else {
                continue;
            };
            if let Some(change) = controller.on_topology_changed(view.for_output_plug(&plug_name), query) {
                self.events.publish(GraphEvent::CachePolicyChanged {
                    op: name.to_string(),
                    plug: Some(plug_name.clone()),
                    from: change.from,
                    to: change.to,
                });
                rebuilt.push(plug_name);
            }
        }

        let mut historical_changed = false;
        if let Some(controller) = op.historical_cache_mut()
            && let Some(change) = controller.set_policy(view.for_op(name).policy())
        {
            self.events.publish(GraphEvent::CachePolicyChanged {
                op: name.to_string(),
                plug: None,
                from: change.from,
                to: change.to,
            });
            historical_changed = true;
        }

        for plug in &rebuilt {
            self.announce_live_rebuild(plug);
        }
        if historical_changed && !query.is_frame_live(self.visible_frame) {
            let frame = self.visible_frame;
            self.refresh_op(name, frame, query);
        }
    }

    /// Tell listeners a live cache was rebuilt, then every plug it feeds.
    /// Placeholder consumers pass the notice on through their own outputs.
    fn announce_live_rebuild(&mut self, origin: &PlugName) {
        self.events.publish(GraphEvent::LiveBodyCacheChanged {
            plug: origin.clone(),
            origin: origin.clone(),
        });

        let mut frontier = VecDeque::from([origin.clone()]);
        let mut visited = BTreeSet::from([origin.clone()]);
        while let Some(producer) = frontier.pop_front() {
            let consumers: Vec<PlugName> = self
                .feeds
                .iter()
                .filter(|feed| feed.from == producer)
                .map(|feed| feed.to.clone())
                .collect();
            for consumer in consumers {
                if !visited.insert(consumer.clone()) {
                    continue;
                }
                self.events.publish(GraphEvent::LiveBodyCacheChanged {
                    plug: consumer.clone(),
                    origin: origin.clone(),
                });
                if self.placeholder_ops.contains(consumer.op()) {
                    frontier.extend(
                        self.feeds
                            .iter()
                            .filter(|feed| feed.from.op() == consumer.op())
                            .map(|feed| feed.from.clone()),
                    );
                }
            }
        }
    }

    fn on_value_changed(
        &mut self,
        name: &str,
        param: String,
        value: ParamValue,
        query: &dyn ServerQuery,
    ) {
        let Some(op) = self.ops.get_mut(name) else {
            debug!(target_module = SOURCE, op = name, "Value notice for unknown operation");
            return;
        };
        debug!(target_module = SOURCE, op = name, param = %param, value = %value, "Parameter changed");
        op.set_param(&param, value);
        self.events.publish(GraphEvent::ParameterChanged {
            op: name.to_string(),
            param,
        });
        self.events.publish(GraphEvent::StateChanged { op: name.to_string() });

        self.refresh_downstream(name, query);
    }

    fn on_selection_changed(&mut self, selected: BTreeSet<String>) {
        self.selected = selected
            .into_iter()
            .filter(|name| self.ops.contains_key(name))
            .collect();
        self.publish_selection();
    }

    fn on_position_changed(&mut self, name: &str, position: Position) {
        let Some(op) = self.ops.get_mut(name) else {
            return;
        };
        op.set_position(position);
        self.events.publish(GraphEvent::PositionChanged {
            op: name.to_string(),
            position,
        });
    }

    fn on_activation_changed(&mut self, name: &str, activation: Activation) {
        let Some(op) = self.ops.get_mut(name) else {
            return;
        };
        info!(target_module = SOURCE, op = name, activation = activation.as_str(), "Activation changed");
        op.set_activation(activation);
        self.events.publish(GraphEvent::StateChanged { op: name.to_string() });
    }

    fn on_graph_cleared(&mut self) {
        let count = self.ops.len().saturating_sub(1);
        for op in self.ops.values_mut() {
            op.release_caches();
        }
        self.ops.clear();
        self.by_type.clear();
        self.by_family.clear();
        self.placeholder_ops.clear();
        self.selected.clear();
        self.feeds.clear();
        self.install_sentinel();

        info!(target_module = SOURCE, erased = count, "Graph cleared");
        self.events.publish(GraphEvent::GraphCleared);
        self.publish_selection();
    }

    fn on_step_begun(&mut self, frame: FrameId, stepping: &[String]) {
        debug!(target_module = SOURCE, frame, ops = stepping.len(), "Step begun");
        for name in stepping {
            if let Some(op) = self.ops.get_mut(name) {
                op.set_condition(Condition::Stepping);
                for plug in op.plugs() {
                    if let Some(controller) = plug.live_cache() {
                        controller.on_step_begin();
                    }
                }
                self.events.publish(GraphEvent::StateChanged { op: name.clone() });
            }
        }
    }

    fn on_step_ended(&mut self, frame: FrameId, query: &dyn ServerQuery) {
        self.computing_frame = frame;

        let mut rebuilt = Vec::new();
        let mut settled = Vec::new();
        for op in self.ops.values_mut() {
            if op.condition() == Condition::Stepping {
                op.set_condition(Condition::Idle);
                settled.push(op.name().to_string());
            }
            for plug in op.plugs_mut() {
                let plug_name = plug.name().clone();
                if let Some(controller) = plug.live_cache_mut()
                    && controller.on_step_end(query).is_some()
                {
                    rebuilt.push(plug_name);
                }
            }
        }

        debug!(target_module = SOURCE, frame, rebuilt = rebuilt.len(), "Step ended");
        for name in settled {
            self.events.publish(GraphEvent::StateChanged { op: name });
        }
        for plug in &rebuilt {
            self.announce_live_rebuild(plug);
        }
        self.events.publish(GraphEvent::StepEnded { frame });
    }

    fn on_project_path_changed(&mut self, path: PathBuf, query: &dyn ServerQuery) {
        info!(target_module = SOURCE, path = %path.display(), "Project path changed");
        self.project_path = Some(path);
        if !query.is_frame_live(self.visible_frame) {
            self.refresh_all(query);
        }
    }

    fn on_visible_frame_changed(&mut self, frame: FrameId, query: &dyn ServerQuery) {
        debug!(target_module = SOURCE, from = self.visible_frame, to = frame, "Visible frame changed");
        self.visible_frame = frame;
        self.events.publish(GraphEvent::VisibleFrameChanged { frame });
        if !query.is_frame_live(frame) {
            self.refresh_all(query);
        }
    }

    fn refresh_all(&mut self, query: &dyn ServerQuery) {
        let bearing: Vec<String> = self
            .ops
            .values()
            .filter(|op| op.historical_cache().is_some())
            .map(|op| op.name().to_string())
            .collect();
        let frame = self.visible_frame;
        for name in bearing {
            self.refresh_op(&name, frame, query);
        }
    }

    fn refresh_op(&mut self, name: &str, frame: FrameId, query: &dyn ServerQuery) {
        let Some(controller) = self.ops.get_mut(name).and_then(Operation::historical_cache_mut)
        else {
            return;
        };
        let outcome = controller.refresh(frame, query);
        if outcome.changed() {
            self.events.publish(GraphEvent::HistoricalBodyCacheChanged {
                op: name.to_string(),
                ok: matches!(outcome, RefreshOutcome::Updated(_)),
            });
        }
    }

    /// Resolve which cache a read of `op:plug` at `visible` must use.
    ///
    /// Re-evaluated on every call. A historical read forces a refresh of the
    /// operation's cache for that frame first.
    pub fn resolve_bodies(
        &mut self,
        op: &str,
        plug: &str,
        visible: FrameId,
        query: &dyn ServerQuery,
    ) -> Result<BodySource<'_>, DomainError> {
        let operation = self
            .ops
            .get(op)
            .ok_or_else(|| DomainError::not_found("operation", op))?;
        let target = operation
            .plug(plug)
            .ok_or_else(|| DomainError::not_found("plug", PlugName::compose(op, plug)))?;
        if target.live_cache().is_none() {
            return Err(DomainError::validation(format!(
                "`{}` is not a body output",
                target.name()
            )));
        }

        let kind = resolve_source(query.is_frame_live(visible), operation.activation());
        debug!(target_module = SOURCE, op, plug, visible, source = kind.as_str(), "Body source resolved");

        if kind == SourceKind::Historical {
            self.refresh_op(op, visible, query);
            self.events.flush();
        }

        let operation = self
            .ops
            .get(op)
            .ok_or_else(|| DomainError::not_found("operation", op))?;
        match kind {
            SourceKind::Live => operation
                .plug(plug)
                .and_then(|target| target.live_cache())
                .map(|controller| BodySource::Live(controller.cache()))
                .ok_or_else(|| DomainError::invariant("live cache vanished during resolution")),
            SourceKind::Historical => operation
                .historical_cache()
                .map(|controller| BodySource::Historical(controller.cache()))
                .ok_or_else(|| {
                    DomainError::invariant(format!("operation `{op}` has no historical cache"))
                }),
        }
    }

    fn publish_selection(&mut self) {
        self.events.publish(GraphEvent::SelectionChanged {
            selected: self.selected.iter().cloned().collect(),
        });
    }

    fn publish_state_for_all(&mut self) {
        let names: Vec<String> = self.ops.keys().cloned().collect();
        for op in names {
            self.events.publish(GraphEvent::StateChanged { op });
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn query_const_op(&self, name: &str) -> Option<&Operation> {
        self.ops.get(name)
    }

    /// Every operation, sentinel included, in name order.
    pub fn const_ops(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values()
    }

    /// Operations the user may edit: everything but the sentinel.
    pub fn mutable_ops(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values().filter(|op| op.name() != GLOBAL_OP)
    }

    pub fn ops_by_type(&self, type_name: &str) -> Vec<&Operation> {
        self.lookup(self.by_type.get(type_name))
    }

    pub fn ops_by_family(&self, family: &str) -> Vec<&Operation> {
        self.lookup(self.by_family.get(family))
    }

    fn lookup(&self, names: Option<&BTreeSet<String>>) -> Vec<&Operation> {
        names
            .into_iter()
            .flatten()
            .filter_map(|name| self.ops.get(name))
            .collect()
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn unselected(&self) -> Vec<&str> {
        self.mutable_ops()
            .map(Operation::name)
            .filter(|name| !self.selected.contains(*name))
            .collect()
    }

    pub fn feeds(&self) -> &BTreeSet<Feed> {
        &self.feeds
    }

    /// Feeds touching `op`, in feed order.
    pub fn feeds_of(&self, op: &str) -> Vec<Feed> {
        self.feeds.iter().filter(|feed| feed.touches(op)).cloned().collect()
    }

    pub fn plug_cache(&self, plug: &PlugName) -> Option<&PlugCacheController> {
        self.ops.get(plug.op())?.plug(plug.plug())?.live_cache()
    }

    pub fn op_cache(&self, op: &str) -> Option<&OpCacheController> {
        self.ops.get(op)?.historical_cache()
    }

    pub fn visible_frame(&self) -> FrameId {
        self.visible_frame
    }

    pub fn computing_frame(&self) -> FrameId {
        self.computing_frame
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    /// Number of operations, sentinel excluded.
    pub fn len(&self) -> usize {
        self.ops.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.events.subscribe(listener);
    }

    /// Take every event delivered so far.
    pub fn drain_events(&mut self) -> Vec<Notice> {
        self.events.drain()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            ops: self
                .mutable_ops()
                .map(|op| {
                    (
                        op.name().to_string(),
                        OpSnapshot {
                            type_name: op.type_name().to_string(),
                            params: op.params().clone(),
                            position: op.position(),
                            activation: op.activation(),
                        },
                    )
                })
                .collect(),
            feeds: self.feeds.clone(),
            selected: self.selected.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::application::ports::{
        HistoricalSnapshot, HistoricalStamp, HistoricalStatus, PlugDecl, PlugResource, QueryError,
    };
    use crate::domain::bodies::BodyHandle;
    use crate::domain::types::{CachePolicy, PlugKind};

    /// Live frame 5, historical data only at frame 2.
    #[derive(Default)]
    struct StubServer {
        live_calls: Mutex<usize>,
        historical_calls: Mutex<usize>,
    }

    impl ServerQuery for StubServer {
        fn plug_resource(&self, _plug: &PlugName) -> Option<PlugResource> {
            Some(PlugResource(7))
        }

        fn live_bodies(&self, plug: &PlugName) -> Result<Vec<BodyHandle>, QueryError> {
            *self.live_calls.lock().expect("lock") += 1;
            Ok(vec![BodyHandle {
                name: format!("{}-live", plug.op()),
                elements: vec![[0.0, 1.0, 2.0]],
                channels: vec!["P".to_string()],
            }])
        }

        fn historical_status(&self, _op: &str, frame: FrameId, held: Option<HistoricalStamp>) -> HistoricalStatus {
            match (frame, held) {
                (2, Some(_)) => HistoricalStatus::UpToDate,
                (2, None) => HistoricalStatus::NeedsUpdate,
                _ => HistoricalStatus::NotOk,
            }
        }

        fn historical_bodies(&self, op: &str, frame: FrameId) -> Result<HistoricalSnapshot, QueryError> {
            *self.historical_calls.lock().expect("lock") += 1;
            Ok(HistoricalSnapshot {
                stamp: HistoricalStamp { frame, revision: 0 },
                bodies: vec![BodyHandle {
                    name: format!("{op}-past"),
                    elements: vec![[3.0, 3.0, 3.0]],
                    channels: vec!["P".to_string()],
                }],
            })
        }

        fn current_visible_frame(&self) -> FrameId {
            5
        }

        fn computing_frame(&self) -> FrameId {
            5
        }
    }

    fn created(name: &str, type_name: &str, placeholder: bool, plugs: &[(&str, PlugKind)]) -> ServerNotification {
        ServerNotification::OpCreated(OpDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            family: if placeholder { "viewer" } else { "generator" }.to_string(),
            placeholder,
            plugs: plugs
                .iter()
                .map(|(plug, kind)| PlugDecl {
                    name: plug.to_string(),
                    kind: *kind,
                })
                .collect(),
            params: BTreeMap::new(),
            position: Position::default(),
            activation: Activation::Active,
        })
    }

    fn plug(op: &str, name: &str) -> PlugName {
        PlugName::new(op, name).expect("plug")
    }

    fn feed(connected: bool) -> ServerNotification {
        ServerNotification::FeedChanged {
            feed: Feed::new(plug("a", "out"), plug("v", "in")),
            connected,
        }
    }

    fn store_with_pair(server: &StubServer) -> GraphStore {
        let mut store = GraphStore::new(CacheConfig::default());
        store.sync_frames(server);
        store.apply(created("a", "Source", false, &[("out", PlugKind::BodyOutput)]), server);
        store.apply(created("v", "Viewer", true, &[("in", PlugKind::BodyInput)]), server);
        store.drain_events();
        store
    }

    fn live_changes_for(events: &[Notice], target: &PlugName) -> usize {
        events
            .iter()
            .filter(|notice| {
                matches!(&notice.kind, GraphEvent::LiveBodyCacheChanged { plug, .. } if plug == target)
            })
            .count()
    }

    #[test]
    fn new_store_holds_only_the_sentinel() {
        let store = GraphStore::new(CacheConfig::default());
        assert!(store.contains(GLOBAL_OP));
        assert!(store.is_empty());
        assert_eq!(store.mutable_ops().count(), 0);
    }

    #[test]
    fn creation_indexes_by_type_and_family() {
        let server = StubServer::default();
        let store = store_with_pair(&server);
        assert_eq!(store.ops_by_type("Source").len(), 1);
        assert_eq!(store.ops_by_family("viewer")[0].name(), "v");
        assert_eq!(store.unselected(), vec!["a", "v"]);
    }

    #[test]
    fn placeholder_feed_switches_producer_to_full_cache_once() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);

        store.apply(feed(true), &server);
        let events = store.drain_events();
        let producer = plug("a", "out");

        let controller = store.plug_cache(&producer).expect("live cache");
        assert_eq!(controller.policy(), CachePolicy::FullCache);
        assert_eq!(controller.cache().len(), 1);
        assert_eq!(live_changes_for(&events, &producer), 1);
        assert_eq!(live_changes_for(&events, &plug("v", "in")), 1);
    }

    #[test]
    fn erasing_the_consumer_reverts_policy_and_clears() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        store.apply(feed(true), &server);

        store.apply(ServerNotification::OpErased { op: "v".to_string() }, &server);
        let controller = store.plug_cache(&plug("a", "out")).expect("live cache");
        assert_eq!(controller.policy(), CachePolicy::NoCache);
        assert_eq!(controller.cache().len(), 0);
        assert!(store.feeds().is_empty());
        assert!(store.ops_by_family("viewer").is_empty());
    }

    #[test]
    fn erase_event_follows_index_removal() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        store.apply(ServerNotification::OpErased { op: "a".to_string() }, &server);
        let events = store.drain_events();
        let erased = events
            .iter()
            .position(|notice| notice.kind == GraphEvent::OpErased { op: "a".to_string() })
            .expect("erase event");
        assert!(events[erased + 1..]
            .iter()
            .all(|notice| notice.kind != GraphEvent::StateChanged { op: "a".to_string() }));
    }

    #[test]
    fn frame_switch_reads_historical_with_one_fetch() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        store.apply(feed(true), &server);

        let source = store.resolve_bodies("a", "out", 5, &server).expect("resolves");
        assert!(source.is_live());

        store.apply(ServerNotification::VisibleFrameChanged { frame: 2 }, &server);
        let source = store.resolve_bodies("a", "out", 2, &server).expect("resolves");
        assert_eq!(source.kind(), SourceKind::Historical);
        assert!(source.cache().contains("a-past"));
        assert_eq!(*server.historical_calls.lock().expect("lock"), 1);
    }

    #[test]
    fn inactive_operation_reads_historical_on_live_frame() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        store.apply(
            ServerNotification::ActivationChanged {
                op: "a".to_string(),
                activation: Activation::Inactive,
            },
            &server,
        );
        let source = store.resolve_bodies("a", "out", 5, &server).expect("resolves");
        assert_eq!(source.kind(), SourceKind::Historical);
    }

    #[test]
    fn step_end_rebuilds_caching_plugs_only() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        store.apply(
            ServerNotification::StepBegun {
                frame: 6,
                ops: vec!["a".to_string()],
            },
            &server,
        );
        assert_eq!(store.query_const_op("a").expect("a").condition(), Condition::Stepping);
        store.apply(ServerNotification::StepEnded { frame: 6 }, &server);
        assert_eq!(*server.live_calls.lock().expect("lock"), 0);
        assert_eq!(store.query_const_op("a").expect("a").condition(), Condition::Idle);
        assert_eq!(store.computing_frame(), 6);

        store.apply(feed(true), &server);
        store.apply(ServerNotification::StepEnded { frame: 7 }, &server);
        assert_eq!(*server.live_calls.lock().expect("lock"), 2);
    }

    #[test]
    fn clear_keeps_only_a_fresh_sentinel() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        store.apply(feed(true), &server);
        store.apply(
            ServerNotification::SelectionChanged {
                selected: BTreeSet::from(["a".to_string()]),
            },
            &server,
        );

        store.apply(ServerNotification::GraphCleared, &server);
        assert!(store.is_empty());
        assert!(store.contains(GLOBAL_OP));
        assert!(store.feeds().is_empty());
        assert!(store.selected().is_empty());
        assert_eq!(store.ops_by_type(GLOBAL_OP).len(), 1);
    }

    #[test]
    fn listeners_see_consistent_state() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        store.subscribe(Box::new(move |notice: &Notice| {
            sink.lock().expect("lock").push(notice.kind.name());
        }));
        store.apply(feed(true), &server);
        let seen = seen.lock().expect("lock");
        assert!(seen.contains(&"cache_policy_changed"));
        assert!(seen.contains(&"live_body_cache_changed"));
    }

    #[test]
    fn unknown_resolution_targets_are_errors() {
        let server = StubServer::default();
        let mut store = store_with_pair(&server);
        assert!(matches!(
            store.resolve_bodies("ghost", "out", 5, &server),
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            store.resolve_bodies("v", "in", 5, &server),
            Err(DomainError::Validation { .. })
        ));
    }
}
