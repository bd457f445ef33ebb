//! Graph change notifications.
//!
//! Events are queued while the store mutates and delivered in publish order,
//! to listeners in subscription order, once the store is consistent again.

use std::collections::VecDeque;
use std::fmt;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::domain::types::{CachePolicy, FrameId, PlugName, Position};

const SOURCE: &str = "graph::events";
pub(crate) const METRIC_EVENT_BACKLOG_DROPPED_TOTAL: &str = "graphsync_event_backlog_dropped_total";

/// Delivered notices kept for polling readers before the oldest are dropped.
pub const DEFAULT_EVENT_BACKLOG_LIMIT: usize = 1024;

/// Monotonic sequence number of a published event.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    OpCreated { op: String },
    /// Published after the operation left every index.
    OpErased { op: String },
    /// Derived state of an operation may have changed.
    StateChanged { op: String },
    ParameterChanged { op: String, param: String },
    SelectionChanged { selected: Vec<String> },
    PositionChanged { op: String, position: Position },
    /// The live cache of `plug` changed because `origin` was rebuilt. For the
    /// rebuilt plug itself `origin == plug`; downstream consumers get a copy.
    LiveBodyCacheChanged { plug: PlugName, origin: PlugName },
    /// `ok == false` means the frame has no data and the cache is empty.
    HistoricalBodyCacheChanged { op: String, ok: bool },
    CachePolicyChanged {
        op: String,
        plug: Option<PlugName>,
        from: CachePolicy,
        to: CachePolicy,
    },
    VisibleFrameChanged { frame: FrameId },
    StepEnded { frame: FrameId },
    GraphCleared,
}

impl GraphEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::OpCreated { .. } => "op_created",
            GraphEvent::OpErased { .. } => "op_erased",
            GraphEvent::StateChanged { .. } => "state_changed",
            GraphEvent::ParameterChanged { .. } => "parameter_changed",
            GraphEvent::SelectionChanged { .. } => "selection_changed",
            GraphEvent::PositionChanged { .. } => "position_changed",
            GraphEvent::LiveBodyCacheChanged { .. } => "live_body_cache_changed",
            GraphEvent::HistoricalBodyCacheChanged { .. } => "historical_body_cache_changed",
            GraphEvent::CachePolicyChanged { .. } => "cache_policy_changed",
            GraphEvent::VisibleFrameChanged { .. } => "visible_frame_changed",
            GraphEvent::StepEnded { .. } => "step_ended",
            GraphEvent::GraphCleared => "graph_cleared",
        }
    }
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A delivered event with its ordering metadata.
#[derive(Debug, Clone)]
pub struct Notice {
    pub epoch: Epoch,
    pub kind: GraphEvent,
    pub at: OffsetDateTime,
}

pub type Listener = Box<dyn FnMut(&Notice) + Send>;

/// Ordered listener list with a bounded delivered-event backlog for polling
/// readers. Once the backlog is full the oldest notices are dropped.
pub struct EventBus {
    next_epoch: Epoch,
    pending: Vec<Notice>,
    delivered: VecDeque<Notice>,
    backlog_limit: usize,
    listeners: Vec<Listener>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_backlog_limit(DEFAULT_EVENT_BACKLOG_LIMIT)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limit of zero keeps no backlog; listeners still see every event.
    pub fn with_backlog_limit(backlog_limit: usize) -> Self {
        Self {
            next_epoch: 0,
            pending: Vec::new(),
            delivered: VecDeque::new(),
            backlog_limit,
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Listeners run in registration order.
    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Queue an event; nothing is delivered until [`EventBus::flush`].
    pub fn publish(&mut self, kind: GraphEvent) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        debug!(
            target_module = SOURCE,
            event_epoch = epoch,
            event_kind = %kind,
            "Graph event queued"
        );

        self.pending.push(Notice {
            epoch,
            kind,
            at: OffsetDateTime::now_utc(),
        });
    }

    /// Deliver every queued event in publish order.
    pub fn flush(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for notice in pending {
            for listener in &mut self.listeners {
                listener(&notice);
            }
            self.delivered.push_back(notice);
        }

        let overflow = self.delivered.len().saturating_sub(self.backlog_limit);
        if overflow > 0 {
            self.delivered.drain(..overflow);
            counter!(METRIC_EVENT_BACKLOG_DROPPED_TOTAL).increment(overflow as u64);
            debug!(
                target_module = SOURCE,
                dropped = overflow,
                limit = self.backlog_limit,
                "Event backlog full; oldest notices dropped"
            );
        }

        info!(
            target_module = SOURCE,
            count,
            listeners = self.listeners.len(),
            "Graph events delivered"
        );
        count
    }

    /// Take every delivered event in FIFO order.
    pub fn drain(&mut self) -> Vec<Notice> {
        self.delivered.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.delivered.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("next_epoch", &self.next_epoch)
            .field("pending", &self.pending.len())
            .field("delivered", &self.delivered.len())
            .field("backlog_limit", &self.backlog_limit)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
