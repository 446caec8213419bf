//! Shared Waypoint stream, cursor, checkpoint, and state model types.
//!
//! This crate is dependency-boundary-safe for the state store, the engine,
//! and any connector that produces records for a checkpointing sequence.

pub mod checkpoint;
pub mod cursor;
pub mod state;
pub mod stream;
