pub mod error;
pub(crate) mod lock;
pub mod replay;
pub mod sim;
pub mod telemetry;
