//! Graph mirror: operations, plugs, feeds and the change notifications
//! derived from them.

mod entities;
mod events;
mod snapshot;
mod store;

pub use entities::{OpCaching, Operation, Plug, PlugRole};
pub use events::{DEFAULT_EVENT_BACKLOG_LIMIT, Epoch, EventBus, GraphEvent, Listener, Notice};
pub use snapshot::{GraphSnapshot, OpSnapshot};
pub use store::GraphStore;
