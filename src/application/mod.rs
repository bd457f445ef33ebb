pub mod commands;
pub mod error;
pub mod ports;
pub mod session;
