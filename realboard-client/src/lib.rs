//! Client-side reconciliation engine for a realtime collaborative board.
//!
//! Keeps a locally mutable board projection consistent with a multi-user
//! server of record: the action executor applies the local user's
//! mutations optimistically and confirms or rolls them back against the
//! write API, while the event reconciler merges foreign pushed events
//! with minimal in-place patches, falling back to scoped reloads (lanes
//! before cards) when a payload does not suffice.

pub mod actions;
pub mod api;
pub mod config;
pub mod directory;
pub mod engine;
pub mod http;
pub mod loader;
pub mod reconciler;
pub mod testutil;
pub mod transport;

pub use engine::BoardEngine;
