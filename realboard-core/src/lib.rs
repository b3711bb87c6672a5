//! Data layer for the realboard client engine.
//!
//! Holds the board model (lanes, cards, votes, comments, presence), the
//! lane/column mapper, the in-memory board store and the realtime event
//! protocol. No I/O happens here; the `realboard-client` crate owns the
//! HTTP and WebSocket sides.

pub mod events;
pub mod lanes;
pub mod store;
pub mod types;
