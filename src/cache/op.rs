//! Historical body cache controller for one operation.
//!
//! Keyed by the visible frame rather than by step events: value changes,
//! project-path changes and frame switches ask the server whether the held
//! data is still valid and only then refetch.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::application::ports::{HistoricalStamp, HistoricalStatus, QueryError, ServerQuery};
use crate::domain::types::{CachePolicy, FrameId};

use super::config::CacheConfig;
use super::plug::{METRIC_CACHE_REBUILD_MS, METRIC_CACHE_REBUILD_TOTAL, PolicyChange};
use super::store::{BodyCache, FillReport};

const SOURCE: &str = "cache::op";

/// Result of one historical refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The operation caches nothing, so the server was not asked.
    Skipped,
    /// The server confirmed the held data is current.
    UpToDate,
    /// The cache was cleared and refilled.
    Updated(FillReport),
    /// The frame has no data; the cache was cleared.
    NotOk,
    /// The query surface did not answer; the cache was left as it was.
    Unavailable,
}

impl RefreshOutcome {
    /// True when listeners must be told the cache changed.
    pub fn changed(&self) -> bool {
        matches!(self, RefreshOutcome::Updated(_) | RefreshOutcome::NotOk)
    }
}

#[derive(Debug)]
pub struct OpCacheController {
    op: String,
    policy: CachePolicy,
    cache: BodyCache,
    stamp: Option<HistoricalStamp>,
    config: CacheConfig,
}

impl OpCacheController {
    pub fn new(op: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            op: op.into(),
            policy: CachePolicy::NoCache,
            cache: BodyCache::new(),
            stamp: None,
            config,
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn cache(&self) -> &BodyCache {
        &self.cache
    }

    /// Frame and revision of the held data, if any.
    pub fn stamp(&self) -> Option<HistoricalStamp> {
        self.stamp
    }

    fn effective_policy(&self) -> CachePolicy {
        if self.config.enable_historical_cache {
            self.policy
        } else {
            CachePolicy::NoCache
        }
    }

    /// Adopt a new derived policy. A change invalidates whatever was held so
    /// the next refresh refetches under the new trimming.
    pub fn set_policy(&mut self, policy: CachePolicy) -> Option<PolicyChange> {
        if policy == self.policy {
            return None;
        }
        let change = PolicyChange {
            from: self.policy,
            to: policy,
        };
        info!(
            target_module = SOURCE,
            op = %self.op,
            from = %change.from,
            to = %change.to,
            "Historical cache policy changed"
        );
        self.policy = policy;
        self.invalidate();
        Some(change)
    }

    /// Drop held data and forget which frame it belonged to.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.stamp = None;
    }

    /// Re-evaluate the cache for `frame`.
    pub fn refresh(&mut self, frame: FrameId, query: &dyn ServerQuery) -> RefreshOutcome {
        let policy = self.effective_policy();
        if !policy.caches_anything() {
            if !self.cache.is_empty() {
                self.invalidate();
            }
            return RefreshOutcome::Skipped;
        }

        match query.historical_status(&self.op, frame, self.stamp) {
            HistoricalStatus::UpToDate => {
                debug!(target_module = SOURCE, op = %self.op, frame, "Historical cache up to date");
                RefreshOutcome::UpToDate
            }
            HistoricalStatus::NotOk => {
                self.invalidate();
                debug!(target_module = SOURCE, op = %self.op, frame, "No historical data for frame");
                RefreshOutcome::NotOk
            }
            HistoricalStatus::NeedsUpdate => self.reload(frame, policy, query),
        }
    }

    fn reload(
        &mut self,
        frame: FrameId,
        policy: CachePolicy,
        query: &dyn ServerQuery,
    ) -> RefreshOutcome {
        let started_at = Instant::now();
        let snapshot = match query.historical_bodies(&self.op, frame) {
            Ok(snapshot) => snapshot,
            Err(QueryError::MissingResource { what }) => {
                self.invalidate();
                debug!(
                    target_module = SOURCE,
                    op = %self.op,
                    frame,
                    what,
                    "Historical bodies missing"
                );
                return RefreshOutcome::NotOk;
            }
            Err(QueryError::Unavailable) => {
                warn!(
                    target_module = SOURCE,
                    op = %self.op,
                    frame,
                    "Historical query unavailable; cache left untouched"
                );
                return RefreshOutcome::Unavailable;
            }
        };

        let report = self.cache.refill(
            &self.op,
            snapshot.bodies,
            policy,
            false,
            self.config.materialize_renderables,
        );
        self.stamp = Some(snapshot.stamp);

        counter!(METRIC_CACHE_REBUILD_TOTAL, "cache" => "historical").increment(1);
        histogram!(METRIC_CACHE_REBUILD_MS, "cache" => "historical")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target_module = SOURCE,
            op = %self.op,
            frame,
            revision = snapshot.stamp.revision,
            bodies = report.inserted,
            failures = report.materialize_failures,
            "Historical cache reloaded"
        );
        RefreshOutcome::Updated(report)
    }
}
