//! Port traits describing the server the editor talks to.
//!
//! The wire protocol lives outside this crate; here the server is an opaque
//! request/reply transport plus a synchronous query surface and an ordered
//! stream of change notifications.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::bodies::BodyHandle;
use crate::domain::types::{Activation, Feed, FrameId, ParamValue, PlugKind, PlugName, Position};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("server rejected {kind} request: {message}")]
    Rejected { kind: RequestKind, message: String },
    #[error("server transport disconnected")]
    Disconnected,
}

impl RequestError {
    pub fn rejected(kind: RequestKind, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("server resource missing: {what}")]
    MissingResource { what: String },
    #[error("server query surface unavailable")]
    Unavailable,
}

impl QueryError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingResource { what: what.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestKind {
    CreateOp,
    EraseOp,
    SetParam,
    Connect,
    Disconnect,
    Select,
    Move,
    SetActivation,
    ClearGraph,
    SetProjectPath,
    SetVisibleFrame,
    Step,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::CreateOp => "create_op",
            RequestKind::EraseOp => "erase_op",
            RequestKind::SetParam => "set_param",
            RequestKind::Connect => "connect",
            RequestKind::Disconnect => "disconnect",
            RequestKind::Select => "select",
            RequestKind::Move => "move",
            RequestKind::SetActivation => "set_activation",
            RequestKind::ClearGraph => "clear_graph",
            RequestKind::SetProjectPath => "set_project_path",
            RequestKind::SetVisibleFrame => "set_visible_frame",
            RequestKind::Step => "step",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the server needs to (re-)create an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOpParams {
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub activation: Activation,
}

impl CreateOpParams {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            params: BTreeMap::new(),
            position: Position::default(),
            activation: Activation::Active,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateOp(CreateOpParams),
    EraseOp { op: String },
    SetParam { op: String, param: String, value: ParamValue },
    Connect(Feed),
    Disconnect(Feed),
    Select { ops: BTreeSet<String> },
    Move { op: String, position: Position },
    SetActivation { op: String, activation: Activation },
    ClearGraph,
    SetProjectPath { path: PathBuf },
    SetVisibleFrame { frame: FrameId },
    Step,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::CreateOp(_) => RequestKind::CreateOp,
            Request::EraseOp { .. } => RequestKind::EraseOp,
            Request::SetParam { .. } => RequestKind::SetParam,
            Request::Connect(_) => RequestKind::Connect,
            Request::Disconnect(_) => RequestKind::Disconnect,
            Request::Select { .. } => RequestKind::Select,
            Request::Move { .. } => RequestKind::Move,
            Request::SetActivation { .. } => RequestKind::SetActivation,
            Request::ClearGraph => RequestKind::ClearGraph,
            Request::SetProjectPath { .. } => RequestKind::SetProjectPath,
            Request::SetVisibleFrame { .. } => RequestKind::SetVisibleFrame,
            Request::Step => RequestKind::Step,
        }
    }
}

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    /// The server may rename a created operation to keep long names unique.
    Created { op: String },
}

/// A plug as declared by the server for an operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlugDecl {
    pub name: String,
    pub kind: PlugKind,
}

/// Opaque server-side handle backing a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlugResource(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct OpDescriptor {
    pub name: String,
    pub type_name: String,
    pub family: String,
    /// Placeholder operations stand in for editor-side viewers.
    pub placeholder: bool,
    pub plugs: Vec<PlugDecl>,
    pub params: BTreeMap<String, ParamValue>,
    pub position: Position,
    pub activation: Activation,
}

/// Confirmed server-side change, delivered in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    OpCreated(OpDescriptor),
    OpErased { op: String },
    FeedChanged { feed: Feed, connected: bool },
    ValueChanged { op: String, param: String, value: ParamValue },
    SelectionChanged { selected: BTreeSet<String> },
    PositionChanged { op: String, position: Position },
    ActivationChanged { op: String, activation: Activation },
    GraphCleared,
    StepBegun { frame: FrameId, ops: Vec<String> },
    StepEnded { frame: FrameId },
    ProjectPathChanged { path: PathBuf },
    VisibleFrameChanged { frame: FrameId },
}

/// Identifies exactly which historical data a cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalStamp {
    pub frame: FrameId,
    pub revision: u64,
}

/// Answer to the cheap validity check on a historical cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricalStatus {
    UpToDate,
    NeedsUpdate,
    /// The frame has no data for this operation.
    NotOk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSnapshot {
    pub stamp: HistoricalStamp,
    pub bodies: Vec<BodyHandle>,
}

/// Asynchronous request channel. A reply arrives at most once per request and
/// replies arrive in issue order.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn issue(&self, request: Request) -> Result<Reply, RequestError>;

    /// Take up to `limit` pending notifications in delivery order.
    fn drain_notifications(&self, limit: usize) -> Vec<ServerNotification>;
}

/// Synchronous, read-only view of server state.
pub trait ServerQuery: Send + Sync {
    /// `None` when the server has no resource for this plug.
    fn plug_resource(&self, plug: &PlugName) -> Option<PlugResource>;

    fn live_bodies(&self, plug: &PlugName) -> Result<Vec<BodyHandle>, QueryError>;

    fn historical_status(
        &self,
        op: &str,
        frame: FrameId,
        held: Option<HistoricalStamp>,
    ) -> HistoricalStatus;

    fn historical_bodies(&self, op: &str, frame: FrameId)
    -> Result<HistoricalSnapshot, QueryError>;

    fn current_visible_frame(&self) -> FrameId;

    /// The frame the server is computing right now.
    fn computing_frame(&self) -> FrameId;

    fn is_frame_live(&self, frame: FrameId) -> bool {
        frame == self.computing_frame()
    }
}
