//! Resource snapshots and the search options passed to providers.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much of a resource's neighbourhood a provider should describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchConfig {
    /// Metadata read mode understood by the repository, e.g. `resource` or `parents`.
    #[serde(default = "default_metadata_mode")]
    pub metadata_mode: String,

    /// Property linking a resource to its parent.
    #[serde(default)]
    pub parent_property: String,

    /// Restrict the resource's own description to these properties.
    #[serde(default)]
    pub resource_properties: Vec<String>,

    /// Restrict related resources' descriptions to these properties.
    #[serde(default)]
    pub relatives_properties: Vec<String>,
}

fn default_metadata_mode() -> String {
    "resource".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            metadata_mode: default_metadata_mode(),
            parent_property: String::new(),
            resource_properties: Vec::new(),
            relatives_properties: Vec::new(),
        }
    }
}

/// Capture of a resource's identity and description at fetch time.
///
/// `metadata` holds the description graph in N-Triples form. `ids` lists
/// every identifier the resource is known under, the canonical `uri`
/// included; the snapshot is stored under all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub uri: String,
    #[serde(default)]
    pub ids: BTreeSet<String>,
    pub metadata: String,

    #[serde(skip)]
    from_store: bool,
}

impl PartialEq for ResourceSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.ids == other.ids && self.metadata == other.metadata
    }
}

impl Eq for ResourceSnapshot {}

impl ResourceSnapshot {
    pub fn new(uri: impl Into<String>, metadata: impl Into<String>) -> Self {
        let uri = uri.into();
        let ids = BTreeSet::from([uri.clone()]);
        Self { uri, ids, metadata: metadata.into(), from_store: false }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.add_id(id);
        self
    }

    pub fn add_id(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    /// Whether this value was decoded from the store rather than fetched.
    ///
    /// Such snapshots are never written back.
    pub fn is_from_store(&self) -> bool {
        self.from_store
    }

    /// Keys the snapshot is stored under: its identifiers plus the URI.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.ids.clone();
        keys.insert(self.uri.clone());
        keys.into_iter().collect()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::CorruptEntry(format!("snapshot {}: {e}", self.uri)))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        let mut snapshot: Self =
            serde_json::from_slice(data).map_err(|e| Error::CorruptEntry(format!("snapshot: {e}")))?;
        snapshot.from_store = true;
        Ok(snapshot)
    }
}
