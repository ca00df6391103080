//! Core types and shared functionality for disscache.
//!
//! This crate provides:
//! - Cache store with multi-key aliasing on a SQLite backend
//! - Resource snapshots and cached responses with compressed delivery
//! - The response cache reconciling both against resource providers
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod response;
pub mod snapshot;

pub use cache::{CacheDb, CacheEntry};
pub use config::AppConfig;
pub use engine::{CacheTtl, ComputeResponse, ResourceProvider, ResponseCache};
pub use error::{ComputeError, Error};
pub use response::{CachedResponse, HeaderValue};
pub use snapshot::{ResourceSnapshot, SearchConfig};
