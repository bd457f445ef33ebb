//! Live body cache controller for one body-output plug.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::application::ports::{QueryError, ServerQuery};
use crate::domain::types::{CachePolicy, PlugName};

use super::config::CacheConfig;
use super::policy::Topology;
use super::store::{BodyCache, FillReport};

const SOURCE: &str = "cache::plug";
pub(crate) const METRIC_CACHE_REBUILD_TOTAL: &str = "graphsync_cache_rebuild_total";
pub(crate) const METRIC_CACHE_REBUILD_MS: &str = "graphsync_cache_rebuild_ms";

/// A policy transition observed by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyChange {
    pub from: CachePolicy,
    pub to: CachePolicy,
}

/// Owns the live cache of one body-output plug.
///
/// States mirror [`CachePolicy`]. Step-begin never touches the cache,
/// step-end rebuilds it, and a topology change rebuilds only when the derived
/// policy changed.
#[derive(Debug)]
pub struct PlugCacheController {
    plug: PlugName,
    policy: CachePolicy,
    cache: BodyCache,
    config: CacheConfig,
}

impl PlugCacheController {
    pub fn new(plug: PlugName, config: CacheConfig) -> Self {
        Self {
            plug,
            policy: CachePolicy::NoCache,
            cache: BodyCache::new(),
            config,
        }
    }

    pub fn plug(&self) -> &PlugName {
        &self.plug
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Read accessor; nothing outside the controller mutates the cache.
    pub fn cache(&self) -> &BodyCache {
        &self.cache
    }

    fn effective_policy(&self) -> CachePolicy {
        if self.config.enable_live_cache {
            self.policy
        } else {
            CachePolicy::NoCache
        }
    }

    pub fn on_step_begin(&self) {
        debug!(
            target_module = SOURCE,
            plug = %self.plug,
            "Step begun; live cache left untouched"
        );
    }

    /// Rebuild after the server finished a step. Returns `None` when the plug
    /// caches nothing.
    pub fn on_step_end(&mut self, query: &dyn ServerQuery) -> Option<FillReport> {
        if !self.effective_policy().caches_anything() {
            return None;
        }
        Some(self.rebuild(query))
    }

    /// Re-derive the policy from fresh consumer counts.
    pub fn on_topology_changed(
        &mut self,
        topology: Topology,
        query: &dyn ServerQuery,
    ) -> Option<PolicyChange> {
        let next = topology.policy();
        if next == self.policy {
            return None;
        }

        let change = PolicyChange {
            from: self.policy,
            to: next,
        };
        info!(
            target_module = SOURCE,
            plug = %self.plug,
            from = %change.from,
            to = %change.to,
            downstream = topology.downstream,
            placeholders = topology.placeholders,
            "Live cache policy changed"
        );
        self.policy = next;
        self.rebuild(query);
        Some(change)
    }

    /// Clear unconditionally, then refill from the server under the current policy.
    pub fn rebuild(&mut self, query: &dyn ServerQuery) -> FillReport {
        let started_at = Instant::now();
        self.cache.clear();

        let policy = self.effective_policy();
        if !policy.caches_anything() {
            return FillReport::default();
        }

        let handles = match query.live_bodies(&self.plug) {
            Ok(handles) => handles,
            Err(QueryError::MissingResource { what }) => {
                warn!(
                    target_module = SOURCE,
                    plug = %self.plug,
                    what,
                    "Live bodies missing; cache left empty"
                );
                Vec::new()
            }
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    plug = %self.plug,
                    error = %error,
                    "Live body query failed; cache left empty"
                );
                Vec::new()
            }
        };

        let owner = self.plug.long_name();
        let report = self.cache.refill(
            &owner,
            handles,
            policy,
            true,
            self.config.materialize_renderables,
        );

        counter!(METRIC_CACHE_REBUILD_TOTAL, "cache" => "live").increment(1);
        histogram!(METRIC_CACHE_REBUILD_MS, "cache" => "live")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target_module = SOURCE,
            plug = %self.plug,
            policy = %policy,
            bodies = report.inserted,
            failures = report.materialize_failures,
            "Live cache rebuilt"
        );
        report
    }

    /// Drop every cached body, e.g. when the owning operation goes away.
    pub fn release(&mut self) {
        self.cache.clear();
        self.policy = CachePolicy::NoCache;
    }
}
