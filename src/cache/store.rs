//! Body cache storage.
//!
//! A [`BodyCache`] is the sole owner of its bodies. Controllers fill it from
//! server handles; everyone else reads through the controller's accessor.

use std::collections::BTreeMap;

use metrics::counter;
use tracing::warn;

use crate::domain::bodies::{Body, BodyHandle, BodySummary};
use crate::domain::types::CachePolicy;

const SOURCE: &str = "cache::store";
const METRIC_MATERIALIZE_FAILED: &str = "graphsync_body_materialize_failed_total";

/// Name → owned body map for one plug or one operation.
#[derive(Debug, Default)]
pub struct BodyCache {
    bodies: BTreeMap<String, Body>,
}

/// What happened while refilling a cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    pub inserted: usize,
    pub materialize_failures: usize,
}

impl BodyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a body, returning the one it replaced.
    pub fn insert(&mut self, body: Body) -> Option<Body> {
        self.bodies.insert(body.name().to_string(), body)
    }

    pub fn get(&self, name: &str) -> Option<&Body> {
        self.bodies.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Body> {
        self.bodies.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bodies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bodies.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// Name and summary of every body, in name order.
    pub fn summaries(&self) -> Vec<(String, BodySummary)> {
        self.bodies
            .iter()
            .map(|(name, body)| (name.clone(), body.summary().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Drop every owned body.
    pub fn clear(&mut self) {
        self.bodies.clear();
    }

    /// Clear, then insert `handles` trimmed according to `policy`.
    ///
    /// `StatsOnly` keeps summaries only. `FullCache` additionally builds the
    /// renderable form when `materialize` is set; a body that fails to
    /// materialize is kept with its summary and logged.
    pub fn refill(
        &mut self,
        owner: &str,
        handles: Vec<BodyHandle>,
        policy: CachePolicy,
        live: bool,
        materialize: bool,
    ) -> FillReport {
        self.clear();
        let mut report = FillReport::default();
        if !policy.caches_anything() {
            return report;
        }

        for handle in handles {
            let mut body = Body::from_handle(handle, live);
            match policy {
                CachePolicy::StatsOnly => body.discard_elements(),
                CachePolicy::FullCache if materialize => {
                    if let Err(error) = body.materialize_renderable() {
                        report.materialize_failures += 1;
                        counter!(METRIC_MATERIALIZE_FAILED).increment(1);
                        warn!(
                            target_module = SOURCE,
                            owner,
                            body = body.name(),
                            error = %error,
                            "Failed to materialize renderable body"
                        );
                    }
                }
                CachePolicy::FullCache | CachePolicy::NoCache => {}
            }
            self.insert(body);
            report.inserted += 1;
        }

        report
    }
}
