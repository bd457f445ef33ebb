//! Body caches.
//!
//! Two cache kinds share one storage type:
//!
//! - **Live**: one cache per body-output plug, holding the frame the server is
//!   computing. Rebuilt on step end and on policy change.
//! - **Historical**: one cache per operation, holding a previously computed
//!   frame. Refreshed on value, project-path and visible-frame changes.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `graphsync.toml`:
//!
//! ```toml
//! [cache]
//! enable_live_cache = true
//! enable_historical_cache = true
//! materialize_renderables = true
//! ```

mod config;
mod live;
mod op;
mod plug;
mod policy;
mod store;

pub use config::CacheConfig;
pub use live::{BodySource, SourceKind, resolve_source};
pub use op::{OpCacheController, RefreshOutcome};
pub use plug::{PlugCacheController, PolicyChange};
pub use policy::{Topology, TopologyView, resolve_policy};
pub use store::{BodyCache, FillReport};
