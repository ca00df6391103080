//! SQLite-backed store for snapshots and computed responses.
//!
//! Values live in `cache_entries`; external keys are aliases in `cache_keys`
//! pointing at an entry id, so one entry may be reachable under many keys.
//!
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Glob-pattern alias pruning

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use hash::{compute_response_key, response_key_pattern};
pub use store::{CacheEntry, glob_escape};
