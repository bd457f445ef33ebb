//! In-memory reference server used by the replay binary and the tests.

mod catalog;
mod queue;
mod server;

pub use catalog::{CATALOG, Cook, OpType, ParamDefault, PlugSpec, lookup};
pub use queue::{NotificationQueue, QueuedNotification};
pub use server::{InMemoryServer, QueryKind};
