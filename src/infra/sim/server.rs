//! Single-process stand-in for the authoritative graph server.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::mem;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::application::ports::{
    CreateOpParams, HistoricalSnapshot, HistoricalStamp, HistoricalStatus, OpDescriptor,
    PlugResource, QueryError, Reply, Request, RequestError, RequestKind, ServerNotification,
    ServerQuery, Transport,
};
use crate::domain::bodies::BodyHandle;
use crate::domain::types::{
    Activation, Feed, FrameId, GLOBAL_OP, ParamValue, PlugKind, PlugName, Position,
};
use crate::infra::lock::mutex_lock;

use super::catalog::{self, CATALOG, Cook, OpType};
use super::queue::NotificationQueue;

const SOURCE: &str = "infra::sim::server";
const INJECTED_FAILURE: &str = "injected failure";
const MAX_COOK_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKind {
    PlugResource,
    LiveBodies,
    HistoricalStatus,
    HistoricalBodies,
}

#[derive(Debug, Clone)]
struct SimOp {
    op_type: &'static OpType,
    params: BTreeMap<String, ParamValue>,
    position: Position,
    activation: Activation,
    resources: BTreeMap<String, PlugResource>,
    revision: u64,
    archived: BTreeSet<FrameId>,
}

#[derive(Debug, Default)]
struct ServerState {
    ops: BTreeMap<String, SimOp>,
    feeds: BTreeSet<Feed>,
    selected: BTreeSet<String>,
    computing_frame: FrameId,
    visible_frame: FrameId,
    project_path: Option<PathBuf>,
    next_resource: u64,
    next_revision: u64,
    failures: BTreeSet<RequestKind>,
    erase_after: Option<String>,
    poisoned: BTreeSet<String>,
    disconnected: bool,
    requests: usize,
    queries: BTreeMap<QueryKind, usize>,
}

/// In-memory graph server with deterministic bodies and fault injection.
///
/// Requests are applied atomically; each success enqueues its notifications
/// before the reply is returned.
#[derive(Debug, Default)]
pub struct InMemoryServer {
    state: Mutex<ServerState>,
    queue: NotificationQueue,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &'static [OpType] {
        CATALOG
    }

    /// Reject the next request of `kind`.
    pub fn fail_next(&self, kind: RequestKind) {
        mutex_lock(&self.state, SOURCE, "fail_next").failures.insert(kind);
    }

    /// After the next successful request, erase `op` as another client would.
    pub fn erase_after_next_request(&self, op: impl Into<String>) {
        mutex_lock(&self.state, SOURCE, "erase_after_next_request").erase_after = Some(op.into());
    }

    /// Corrupt the first body `op` produces with a non-finite element.
    pub fn poison(&self, op: impl Into<String>) {
        mutex_lock(&self.state, SOURCE, "poison").poisoned.insert(op.into());
    }

    /// Every later request fails with [`RequestError::Disconnected`].
    pub fn disconnect(&self) {
        mutex_lock(&self.state, SOURCE, "disconnect").disconnected = true;
    }

    pub fn request_count(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "request_count").requests
    }

    pub fn query_count(&self, kind: QueryKind) -> usize {
        mutex_lock(&self.state, SOURCE, "query_count")
            .queries
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "reset_counters");
        state.requests = 0;
        state.queries.clear();
    }

    pub fn op_names(&self) -> Vec<String> {
        mutex_lock(&self.state, SOURCE, "op_names")
            .ops
            .keys()
            .cloned()
            .collect()
    }

    pub fn pending_notifications(&self) -> usize {
        self.queue.len()
    }

    fn counted(&self, kind: QueryKind) -> std::sync::MutexGuard<'_, ServerState> {
        let mut state = mutex_lock(&self.state, SOURCE, "query");
        *state.queries.entry(kind).or_default() += 1;
        state
    }
}

fn rejected(kind: RequestKind, message: impl Into<String>) -> RequestError {
    RequestError::rejected(kind, message)
}

impl ServerState {
    fn handle(
        &mut self,
        request: Request,
        queue: &NotificationQueue,
    ) -> Result<Reply, RequestError> {
        match request {
            Request::CreateOp(params) => self.create_op(params, queue),
            Request::EraseOp { op } => {
                self.erase_op(&op, RequestKind::EraseOp, queue)?;
                Ok(Reply::Done)
            }
            Request::SetParam { op, param, value } => self.set_param(op, param, value, queue),
            Request::Connect(feed) => self.connect(feed, queue),
            Request::Disconnect(feed) => self.disconnect(feed, queue),
            Request::Select { ops } => {
                if let Some(unknown) = ops.iter().find(|op| !self.ops.contains_key(*op)) {
                    return Err(rejected(
                        RequestKind::Select,
                        format!("unknown operation `{unknown}`"),
                    ));
                }
                self.selected = ops.clone();
                queue.publish(ServerNotification::SelectionChanged { selected: ops });
                Ok(Reply::Done)
            }
            Request::Move { op, position } => {
                self.op_mut(&op, RequestKind::Move)?.position = position;
                queue.publish(ServerNotification::PositionChanged { op, position });
                Ok(Reply::Done)
            }
            Request::SetActivation { op, activation } => {
                self.op_mut(&op, RequestKind::SetActivation)?.activation = activation;
                queue.publish(ServerNotification::ActivationChanged { op, activation });
                Ok(Reply::Done)
            }
            Request::ClearGraph => {
                self.ops.clear();
                self.feeds.clear();
                self.selected.clear();
                self.poisoned.clear();
                queue.publish(ServerNotification::GraphCleared);
                Ok(Reply::Done)
            }
            Request::SetProjectPath { path } => {
                self.project_path = Some(path.clone());
                let every: Vec<String> = self.ops.keys().cloned().collect();
                self.bump(every);
                queue.publish(ServerNotification::ProjectPathChanged { path });
                Ok(Reply::Done)
            }
            Request::SetVisibleFrame { frame } => {
                if frame < 0 || frame > self.computing_frame {
                    return Err(rejected(
                        RequestKind::SetVisibleFrame,
                        format!(
                            "frame {frame} outside computed range 0..={}",
                            self.computing_frame
                        ),
                    ));
                }
                self.visible_frame = frame;
                queue.publish(ServerNotification::VisibleFrameChanged { frame });
                Ok(Reply::Done)
            }
            Request::Step => {
                self.step(queue);
                Ok(Reply::Done)
            }
        }
    }

    fn op_mut(&mut self, name: &str, kind: RequestKind) -> Result<&mut SimOp, RequestError> {
        self.ops
            .get_mut(name)
            .ok_or_else(|| rejected(kind, format!("unknown operation `{name}`")))
    }

    fn create_op(
        &mut self,
        params: CreateOpParams,
        queue: &NotificationQueue,
    ) -> Result<Reply, RequestError> {
        let kind = RequestKind::CreateOp;
        let op_type = catalog::lookup(&params.type_name).ok_or_else(|| {
            rejected(kind, format!("unknown operation type `{}`", params.type_name))
        })?;

        let mut values = op_type.default_params();
        for (name, value) in params.params {
            let Some(slot) = values.get_mut(&name) else {
                return Err(rejected(kind, format!("`{}` has no parameter `{name}`", op_type.name)));
            };
            if mem::discriminant(slot) != mem::discriminant(&value) {
                return Err(rejected(kind, format!("parameter `{name}` has the wrong type")));
            }
            *slot = value;
        }

        let name = self.unique_name(&params.name, op_type.name);
        let mut resources = BTreeMap::new();
        for plug in op_type.plugs.iter().filter(|plug| !plug.optional) {
            self.next_resource += 1;
            resources.insert(plug.name.to_string(), PlugResource(self.next_resource));
        }
        self.next_revision += 1;
        let op = SimOp {
            op_type,
            params: values,
            position: params.position,
            activation: params.activation,
            resources,
            revision: self.next_revision,
            archived: BTreeSet::new(),
        };

        queue.publish(ServerNotification::OpCreated(describe(&name, &op)));
        self.ops.insert(name.clone(), op);
        Ok(Reply::Created { op: name })
    }

    fn unique_name(&self, requested: &str, type_name: &str) -> String {
        let base = match requested.trim() {
            "" => type_name.to_lowercase(),
            trimmed => trimmed.to_string(),
        };
        let taken = |candidate: &str| candidate == GLOBAL_OP || self.ops.contains_key(candidate);
        if !taken(&base) {
            return base;
        }
        let mut suffix = 1_u64;
        loop {
            let candidate = format!("{base}{suffix}");
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn erase_op(
        &mut self,
        name: &str,
        kind: RequestKind,
        queue: &NotificationQueue,
    ) -> Result<(), RequestError> {
        if !self.ops.contains_key(name) {
            return Err(rejected(kind, format!("unknown operation `{name}`")));
        }
        let mut downstream = self.downstream_of(name);
        downstream.remove(name);
        self.ops.remove(name);
        self.feeds.retain(|feed| !feed.touches(name));
        self.selected.remove(name);
        self.poisoned.remove(name);
        self.bump(downstream);
        queue.publish(ServerNotification::OpErased {
            op: name.to_string(),
        });
        Ok(())
    }

    fn set_param(
        &mut self,
        op: String,
        param: String,
        value: ParamValue,
        queue: &NotificationQueue,
    ) -> Result<Reply, RequestError> {
        let kind = RequestKind::SetParam;
        let slot = self
            .op_mut(&op, kind)?
            .params
            .get_mut(&param)
            .ok_or_else(|| rejected(kind, format!("`{op}` has no parameter `{param}`")))?;
        if mem::discriminant(slot) != mem::discriminant(&value) {
            return Err(rejected(kind, format!("parameter `{param}` has the wrong type")));
        }
        *slot = value.clone();

        let affected = self.downstream_of(&op);
        self.bump(affected);
        queue.publish(ServerNotification::ValueChanged { op, param, value });
        Ok(Reply::Done)
    }

    fn plug_kind(&self, plug: &PlugName, kind: RequestKind) -> Result<PlugKind, RequestError> {
        let op = self
            .ops
            .get(plug.op())
            .ok_or_else(|| rejected(kind, format!("unknown operation `{}`", plug.op())))?;
        if !op.resources.contains_key(plug.plug()) {
            return Err(rejected(kind, format!("`{plug}` has no server resource")));
        }
        op.op_type
            .plug(plug.plug())
            .map(|spec| spec.kind)
            .ok_or_else(|| rejected(kind, format!("unknown plug `{plug}`")))
    }

    fn connect(&mut self, feed: Feed, queue: &NotificationQueue) -> Result<Reply, RequestError> {
        let kind = RequestKind::Connect;
        let from = self.plug_kind(&feed.from, kind)?;
        let to = self.plug_kind(&feed.to, kind)?;
        if !from.can_feed(to) {
            return Err(rejected(kind, format!("`{}` cannot feed `{}`", feed.from, feed.to)));
        }
        if self.feeds.iter().any(|existing| existing.to == feed.to) {
            return Err(rejected(kind, format!("`{}` is already fed", feed.to)));
        }
        if self.downstream_of(feed.to.op()).contains(feed.from.op()) {
            return Err(rejected(kind, format!("`{feed}` would create a cycle")));
        }

        self.feeds.insert(feed.clone());
        let affected = self.downstream_of(feed.to.op());
        self.bump(affected);
        queue.publish(ServerNotification::FeedChanged {
            feed,
            connected: true,
        });
        Ok(Reply::Done)
    }

    fn disconnect(&mut self, feed: Feed, queue: &NotificationQueue) -> Result<Reply, RequestError> {
        if !self.feeds.remove(&feed) {
            return Err(rejected(
                RequestKind::Disconnect,
                format!("`{feed}` is not connected"),
            ));
        }
        let affected = self.downstream_of(feed.to.op());
        self.bump(affected);
        queue.publish(ServerNotification::FeedChanged {
            feed,
            connected: false,
        });
        Ok(Reply::Done)
    }

    /// Archive the current frame, then compute the next one.
    fn step(&mut self, queue: &NotificationQueue) {
        let archived = self.computing_frame;
        let frame = archived + 1;
        let follow = self.visible_frame == archived;

        for op in self.ops.values_mut() {
            if op.op_type.body_outputs().next().is_some() {
                op.archived.insert(archived);
            }
        }
        self.computing_frame = frame;

        let cooking = self
            .ops
            .iter()
            .filter(|(_, op)| op.activation == Activation::Active)
            .map(|(name, _)| name.clone())
            .collect();
        queue.publish(ServerNotification::StepBegun {
            frame,
            ops: cooking,
        });
        if follow {
            self.visible_frame = frame;
            queue.publish(ServerNotification::VisibleFrameChanged { frame });
        }
        queue.publish(ServerNotification::StepEnded { frame });
        info!(target_module = SOURCE, archived, frame, "Simulation stepped");
    }

    /// `op` plus every operation reachable through feeds from it.
    fn downstream_of(&self, op: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::from([op.to_string()]);
        let mut pending = VecDeque::from([op.to_string()]);
        while let Some(current) = pending.pop_front() {
            for feed in self.feeds.iter().filter(|feed| feed.from.op() == current) {
                if seen.insert(feed.to.op().to_string()) {
                    pending.push_back(feed.to.op().to_string());
                }
            }
        }
        seen
    }

    fn bump(&mut self, ops: impl IntoIterator<Item = String>) {
        for name in ops {
            if let Some(op) = self.ops.get_mut(&name) {
                self.next_revision += 1;
                op.revision = self.next_revision;
            }
        }
    }

    fn has_history(&self, op: &SimOp, frame: FrameId) -> bool {
        op.archived.contains(&frame) || frame == self.computing_frame
    }

    fn cook(&self, name: &str, frame: FrameId, depth: usize) -> Vec<BodyHandle> {
        let Some(op) = self.ops.get(name) else {
            return Vec::new();
        };
        if depth > MAX_COOK_DEPTH {
            warn!(target_module = SOURCE, op = name, "Cook depth exceeded; returning no bodies");
            return Vec::new();
        }

        let mut bodies = match op.op_type.cook {
            Cook::Generate => catalog::generate(name, &op.params, frame),
            Cook::Transform => {
                catalog::transform(name, &op.params, self.gather(name, "in", frame, depth))
            }
            Cook::Merge => {
                let mut merged = self.gather(name, "in", frame, depth);
                merged.extend(self.gather(name, "other", frame, depth));
                merged
            }
            Cook::PassThrough => self.gather(name, "in", frame, depth),
            Cook::Field => Vec::new(),
        };

        if self.poisoned.contains(name)
            && let Some(body) = bodies.first_mut()
            && let Some(element) = body.elements.first_mut()
        {
            element[0] = f32::NAN;
        }
        bodies
    }

    fn gather(&self, op: &str, input: &str, frame: FrameId, depth: usize) -> Vec<BodyHandle> {
        self.feeds
            .iter()
            .filter(|feed| feed.to.op() == op && feed.to.plug() == input)
            .flat_map(|feed| self.cook(feed.from.op(), frame, depth + 1))
            .collect()
    }
}

fn describe(name: &str, op: &SimOp) -> OpDescriptor {
    OpDescriptor {
        name: name.to_string(),
        type_name: op.op_type.name.to_string(),
        family: op.op_type.family.to_string(),
        placeholder: op.op_type.placeholder,
        plugs: op.op_type.declarations(),
        params: op.params.clone(),
        position: op.position,
        activation: op.activation,
    }
}

#[async_trait]
impl Transport for InMemoryServer {
    async fn issue(&self, request: Request) -> Result<Reply, RequestError> {
        let kind = request.kind();
        let mut state = mutex_lock(&self.state, SOURCE, "issue");
        state.requests += 1;

        if state.disconnected {
            return Err(RequestError::Disconnected);
        }
        if state.failures.remove(&kind) {
            debug!(target_module = SOURCE, kind = %kind, "Injected request failure");
            return Err(rejected(kind, INJECTED_FAILURE));
        }

        let reply = state.handle(request, &self.queue)?;

        if let Some(op) = state.erase_after.take() {
            debug!(target_module = SOURCE, op = %op, "Erasing operation behind the editor's back");
            if let Err(error) = state.erase_op(&op, RequestKind::EraseOp, &self.queue) {
                warn!(target_module = SOURCE, op = %op, error = %error, "Scheduled erase failed");
            }
        }
        Ok(reply)
    }

    fn drain_notifications(&self, limit: usize) -> Vec<ServerNotification> {
        self.queue
            .drain(limit)
            .into_iter()
            .map(|queued| queued.notification)
            .collect()
    }
}

impl ServerQuery for InMemoryServer {
    fn plug_resource(&self, plug: &PlugName) -> Option<PlugResource> {
        let state = self.counted(QueryKind::PlugResource);
        state
            .ops
            .get(plug.op())
            .and_then(|op| op.resources.get(plug.plug()))
            .copied()
    }

    fn live_bodies(&self, plug: &PlugName) -> Result<Vec<BodyHandle>, QueryError> {
        let state = self.counted(QueryKind::LiveBodies);
        let op = state
            .ops
            .get(plug.op())
            .ok_or_else(|| QueryError::missing(plug.long_name()))?;
        let is_body_output = op
            .op_type
            .body_outputs()
            .any(|spec| spec.name == plug.plug());
        if !is_body_output {
            return Err(QueryError::missing(plug.long_name()));
        }
        Ok(state.cook(plug.op(), state.computing_frame, 0))
    }

    fn historical_status(
        &self,
        op: &str,
        frame: FrameId,
        held: Option<HistoricalStamp>,
    ) -> HistoricalStatus {
        let state = self.counted(QueryKind::HistoricalStatus);
        let Some(sim) = state.ops.get(op) else {
            return HistoricalStatus::NotOk;
        };
        if !state.has_history(sim, frame) {
            return HistoricalStatus::NotOk;
        }
        let stamp = HistoricalStamp {
            frame,
            revision: sim.revision,
        };
        if held == Some(stamp) {
            HistoricalStatus::UpToDate
        } else {
            HistoricalStatus::NeedsUpdate
        }
    }

    fn historical_bodies(&self, op: &str, frame: FrameId) -> Result<HistoricalSnapshot, QueryError> {
        let state = self.counted(QueryKind::HistoricalBodies);
        let sim = state
            .ops
            .get(op)
            .filter(|sim| state.has_history(sim, frame))
            .ok_or_else(|| QueryError::missing(format!("{op}@{frame}")))?;
        Ok(HistoricalSnapshot {
            stamp: HistoricalStamp {
                frame,
                revision: sim.revision,
            },
            bodies: state.cook(op, frame, 0),
        })
    }

    fn current_visible_frame(&self) -> FrameId {
        mutex_lock(&self.state, SOURCE, "current_visible_frame").visible_frame
    }

    fn computing_frame(&self) -> FrameId {
        mutex_lock(&self.state, SOURCE, "computing_frame").computing_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(server: &InMemoryServer) -> Vec<ServerNotification> {
        server.drain_notifications(usize::MAX)
    }

    async fn create(server: &InMemoryServer, type_name: &str, name: &str) -> String {
        match server
            .issue(Request::CreateOp(CreateOpParams::new(type_name, name)))
            .await
            .expect("create")
        {
            Reply::Created { op } => op,
            Reply::Done => panic!("create must name the operation"),
        }
    }

    fn feed(from: &str, out: &str, to: &str, input: &str) -> Feed {
        Feed::new(
            PlugName::new(from, out).expect("plug"),
            PlugName::new(to, input).expect("plug"),
        )
    }

    #[tokio::test]
    async fn duplicate_names_are_made_unique() {
        let server = InMemoryServer::new();
        assert_eq!(create(&server, "Source", "src").await, "src");
        assert_eq!(create(&server, "Source", "src").await, "src1");
        assert_eq!(create(&server, "Source", "").await, "source");
        assert_eq!(create(&server, "Source", GLOBAL_OP).await, "Global1");
    }

    #[tokio::test]
    async fn optional_plugs_have_no_resource() {
        let server = InMemoryServer::new();
        let op = create(&server, "Transform", "xf").await;
        assert!(server.plug_resource(&PlugName::new(&op, "aux").expect("plug")).is_none());
        assert!(server.plug_resource(&PlugName::new(&op, "out").expect("plug")).is_some());
    }

    #[tokio::test]
    async fn rejected_requests_emit_nothing() {
        let server = InMemoryServer::new();
        create(&server, "Source", "src").await;
        drain(&server);

        let error = server
            .issue(Request::Connect(feed("src", "out", "src", "out")))
            .await
            .expect_err("output cannot feed output");
        assert!(matches!(error, RequestError::Rejected { kind: RequestKind::Connect, .. }));
        assert!(drain(&server).is_empty());
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let server = InMemoryServer::new();
        create(&server, "Transform", "a").await;
        create(&server, "Transform", "b").await;
        server
            .issue(Request::Connect(feed("a", "out", "b", "in")))
            .await
            .expect("connect");
        assert!(
            server
                .issue(Request::Connect(feed("b", "out", "a", "in")))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_next_request_of_its_kind() {
        let server = InMemoryServer::new();
        create(&server, "Source", "src").await;
        server.fail_next(RequestKind::SetParam);
        let request = Request::SetParam {
            op: "src".to_string(),
            param: "count".to_string(),
            value: ParamValue::Int(8),
        };
        assert!(server.issue(request.clone()).await.is_err());
        assert!(server.issue(request).await.is_ok());
    }

    #[tokio::test]
    async fn step_archives_and_follows_the_live_frame() {
        let server = InMemoryServer::new();
        create(&server, "Source", "src").await;
        drain(&server);

        server.issue(Request::Step).await.expect("step");
        assert_eq!(server.computing_frame(), 1);
        assert_eq!(server.current_visible_frame(), 1);
        let notifications = drain(&server);
        assert!(matches!(notifications[0], ServerNotification::StepBegun { frame: 1, .. }));
        assert_eq!(notifications[1], ServerNotification::VisibleFrameChanged { frame: 1 });
        assert_eq!(notifications[2], ServerNotification::StepEnded { frame: 1 });

        assert_eq!(
            server.historical_status("src", 0, None),
            HistoricalStatus::NeedsUpdate
        );
        assert_eq!(server.historical_status("src", 5, None), HistoricalStatus::NotOk);
    }

    #[tokio::test]
    async fn parameter_change_invalidates_downstream_history() {
        let server = InMemoryServer::new();
        create(&server, "Source", "src").await;
        create(&server, "Transform", "xf").await;
        server
            .issue(Request::Connect(feed("src", "out", "xf", "in")))
            .await
            .expect("connect");
        server.issue(Request::Step).await.expect("step");

        let held = server.historical_bodies("xf", 0).expect("history").stamp;
        assert_eq!(server.historical_status("xf", 0, Some(held)), HistoricalStatus::UpToDate);

        server
            .issue(Request::SetParam {
                op: "src".to_string(),
                param: "scale".to_string(),
                value: ParamValue::Float(3.0),
            })
            .await
            .expect("set");
        assert_eq!(
            server.historical_status("xf", 0, Some(held)),
            HistoricalStatus::NeedsUpdate
        );
    }

    #[tokio::test]
    async fn bodies_flow_through_feeds() {
        let server = InMemoryServer::new();
        create(&server, "Source", "src").await;
        create(&server, "Viewer", "view").await;
        server
            .issue(Request::Connect(feed("src", "out", "view", "in")))
            .await
            .expect("connect");

        let bodies = server
            .live_bodies(&PlugName::new("view", "out").expect("plug"))
            .expect("live");
        assert_eq!(bodies.len(), 2);
        assert_eq!(server.query_count(QueryKind::LiveBodies), 1);
    }

    #[tokio::test]
    async fn scheduled_erase_follows_the_next_request() {
        let server = InMemoryServer::new();
        create(&server, "Source", "src").await;
        drain(&server);
        server.erase_after_next_request("src");
        server
            .issue(Request::Move {
                op: "src".to_string(),
                position: Position::new(1.0, 1.0),
            })
            .await
            .expect("move");
        let notifications = drain(&server);
        assert_eq!(
            notifications.last(),
            Some(&ServerNotification::OpErased {
                op: "src".to_string()
            })
        );
        assert!(server.op_names().is_empty());
    }
}
