//! Cache policy derivation from feed topology.
//!
//! Policies are never stored as independent truth: controllers recompute them
//! from the confirmed feed set every time a feed is added or removed.

use std::collections::BTreeSet;

use crate::domain::types::{CachePolicy, Feed, PlugName};

/// Derive a cache policy from consumer counts.
///
/// A placeholder consumer stands in for an editor viewer and forces full
/// caching; any other consumer only needs summaries.
pub fn resolve_policy(downstream: u32, placeholders: u32) -> CachePolicy {
    if placeholders > 0 {
        CachePolicy::FullCache
    } else if downstream > 0 {
        CachePolicy::StatsOnly
    } else {
        CachePolicy::NoCache
    }
}

/// Consumer counts for one plug or one operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub downstream: u32,
    pub placeholders: u32,
}

impl Topology {
    pub fn policy(self) -> CachePolicy {
        resolve_policy(self.downstream, self.placeholders)
    }

    fn count(&mut self, placeholder: bool) {
        if placeholder {
            self.placeholders += 1;
        } else {
            self.downstream += 1;
        }
    }
}

impl std::ops::Add for Topology {
    type Output = Topology;

    fn add(self, rhs: Topology) -> Topology {
        Topology {
            downstream: self.downstream + rhs.downstream,
            placeholders: self.placeholders + rhs.placeholders,
        }
    }
}

/// Borrowed view over the confirmed feed set used to count consumers.
#[derive(Debug, Clone, Copy)]
pub struct TopologyView<'a> {
    feeds: &'a BTreeSet<Feed>,
    placeholder_ops: &'a BTreeSet<String>,
}

impl<'a> TopologyView<'a> {
    pub fn new(feeds: &'a BTreeSet<Feed>, placeholder_ops: &'a BTreeSet<String>) -> Self {
        Self {
            feeds,
            placeholder_ops,
        }
    }

    fn is_placeholder(&self, feed: &Feed) -> bool {
        self.placeholder_ops.contains(feed.to.op())
    }

    /// Counts for an output plug: every feed leaving it, plus placeholder
    /// feeds leaving the outputs of each directly fed operation.
    pub fn for_output_plug(&self, plug: &PlugName) -> Topology {
        let mut topology = Topology::default();
        for feed in self.feeds.iter().filter(|feed| &feed.from == plug) {
            topology.count(self.is_placeholder(feed));

            let consumer = feed.to.op();
            if self.placeholder_ops.contains(consumer) {
                continue;
            }
            let transitive = self
                .feeds
                .iter()
                .filter(|next| next.from.op() == consumer && self.is_placeholder(next))
                .count();
            topology.placeholders += transitive as u32;
        }
        topology
    }

    /// Counts for an input plug: the feeds arriving at it.
    pub fn for_input_plug(&self, plug: &PlugName) -> Topology {
        let mut topology = Topology::default();
        for feed in self.feeds.iter().filter(|feed| &feed.to == plug) {
            topology.count(self.is_placeholder(feed));
        }
        topology
    }

    /// Sum over every plug of `op` that takes part in at least one feed.
    pub fn for_op(&self, op: &str) -> Topology {
        let outputs: BTreeSet<&PlugName> = self
            .feeds
            .iter()
            .filter(|feed| feed.from.op() == op)
            .map(|feed| &feed.from)
            .collect();
        let inputs: BTreeSet<&PlugName> = self
            .feeds
            .iter()
            .filter(|feed| feed.to.op() == op)
            .map(|feed| &feed.to)
            .collect();

        let outgoing = outputs
            .into_iter()
            .map(|plug| self.for_output_plug(plug))
            .fold(Topology::default(), |acc, next| acc + next);
        inputs
            .into_iter()
            .map(|plug| self.for_input_plug(plug))
            .fold(outgoing, |acc, next| acc + next)
    }
}
