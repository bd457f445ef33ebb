//! Client-side consistency layer between an interactive graph editor and an
//! authoritative, asynchronous simulation server.
//!
//! The crate has two intertwined halves:
//!
//! - **Commands** ([`application::commands`]): every graph mutation runs on the
//!   server first; an undoable command is only built once the server confirms it.
//! - **Body caches** ([`cache`]): per-plug live caches and per-operation
//!   historical caches whose policy is re-derived from feed topology.
//!
//! [`graph::GraphStore`] mirrors confirmed server state and routes every server
//! notification to the cache controllers that care about it.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod graph;
pub mod infra;
