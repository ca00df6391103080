//! Network-facing collaborators of the disscache response cache.
//!
//! This crate provides the HTTP resource provider resolving identifiers
//! against a repository, and the blob cache holding resource binaries.

pub mod blob;
pub mod repo;

#[cfg(test)]
pub(crate) mod testing;

pub use blob::{BlobCache, CleanStats, EvictionPolicy};
pub use repo::{HttpProvider, ProviderConfig, blob_http_client, canonicalize, http_client};
