//! Ordered notification queue of the in-memory server.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::ServerNotification;
use crate::infra::lock::mutex_lock;

const SOURCE: &str = "infra::sim::queue";
const METRIC_QUEUE_LEN: &str = "graphsync_sim_notification_queue_len";

/// Monotonic epoch for ordering notifications.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct QueuedNotification {
    pub id: Uuid,
    pub epoch: Epoch,
    pub notification: ServerNotification,
    pub timestamp: OffsetDateTime,
}

/// FIFO queue; notifications leave in exactly the order they were published.
#[derive(Debug)]
pub struct NotificationQueue {
    queue: Mutex<VecDeque<QueuedNotification>>,
    epoch_counter: AtomicU64,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, notification: ServerNotification) {
        let queued = QueuedNotification {
            id: Uuid::new_v4(),
            epoch: self.next_epoch(),
            notification,
            timestamp: OffsetDateTime::now_utc(),
        };

        // Observable: log notification enqueue
        debug!(
            target_module = SOURCE,
            notification_id = %queued.id,
            notification_epoch = queued.epoch,
            notification = ?queued.notification,
            "Server notification enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(queued);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Drain up to `limit` notifications in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<QueuedNotification> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained: Vec<_> = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
