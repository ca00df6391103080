//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (DISSCACHE_*)
//! 2. TOML config file (if DISSCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::engine::CacheTtl;
use crate::snapshot::SearchConfig;

mod validation;

pub use validation::ConfigError;

/// Deepest supported local-access shard nesting.
pub const MAX_LOCAL_ACCESS_LEVEL: u8 = 8;

/// Cache lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Soft TTL of resource snapshots.
    #[serde(default = "default_resource_ttl")]
    pub resource: u64,

    /// Hard TTL of resource snapshots. Defaults to ten times `resource`.
    #[serde(default)]
    pub hard_resource: Option<u64>,

    /// TTL of computed responses.
    #[serde(default = "default_response_ttl")]
    pub response: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self { resource: default_resource_ttl(), hard_resource: None, response: default_response_ttl() }
    }
}

impl TtlConfig {
    /// Convert to the engine's lifetimes.
    pub fn to_cache_ttl(&self) -> CacheTtl {
        let ttl = CacheTtl::new(seconds(self.resource), seconds(self.response));
        match self.hard_resource {
            Some(hard) => ttl.with_hard_resource(seconds(hard)),
            None => ttl,
        }
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Direct filesystem access to the binaries of one namespace.
///
/// A resource `<namespace><id>` lives at `<dir>/<id % 100>/.../<id>` with
/// `level` two-digit shard directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccess {
    pub dir: PathBuf,
    #[serde(default = "default_level")]
    pub level: u8,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (DISSCACHE_*)
/// 2. TOML config file (if DISSCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via DISSCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root directory of the blob cache.
    ///
    /// Set via DISSCACHE_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub ttl: TtlConfig,

    /// Identifier prefixes the service answers for.
    ///
    /// Set via DISSCACHE_ALLOWED_NAMESPACES environment variable.
    #[serde(default = "default_allowed_namespaces")]
    pub allowed_namespaces: Vec<String>,

    /// Namespaces whose binaries are read from local storage, keyed by
    /// namespace prefix.
    #[serde(default)]
    pub local_access: BTreeMap<String, LocalAccess>,

    /// Ask the repository for modification dates when revalidating.
    ///
    /// When off every revalidation reports "unknown" and only the hard TTL
    /// invalidates snapshots.
    #[serde(default)]
    pub check_modification_date: bool,

    #[serde(default = "default_modification_date_property")]
    pub modification_date_property: String,

    /// Property listing the identifiers of a resource.
    #[serde(default = "default_id_property")]
    pub id_property: String,

    #[serde(default)]
    pub search: SearchConfig,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via DISSCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via DISSCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Size limit enforced by blob cache cleaning, in megabytes.
    #[serde(default = "default_blob_max_size_mb")]
    pub blob_max_size_mb: u64,

    /// `oldest_first` or `largest_first`.
    #[serde(default = "default_blob_eviction_policy")]
    pub blob_eviction_policy: String,

    /// Interval between scheduled blob cache cleanings; 0 disables them.
    #[serde(default = "default_blob_clean_interval_secs")]
    pub blob_clean_interval_secs: u64,
}

fn default_resource_ttl() -> u64 {
    3_600
}

fn default_response_ttl() -> u64 {
    31_536_000 // one year
}

fn default_level() -> u8 {
    2
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./disscache.sqlite")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./disscache-blobs")
}

fn default_allowed_namespaces() -> Vec<String> {
    vec!["https://".into()]
}

fn default_modification_date_property() -> String {
    "https://vocabs.acdh.oeaw.ac.at/schema#hasUpdatedDate".into()
}

fn default_id_property() -> String {
    "https://vocabs.acdh.oeaw.ac.at/schema#hasIdentifier".into()
}

fn default_user_agent() -> String {
    "disscache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    10
}

fn default_blob_max_size_mb() -> u64 {
    1_024
}

fn default_blob_eviction_policy() -> String {
    "oldest_first".into()
}

fn default_blob_clean_interval_secs() -> u64 {
    3_600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            ttl: TtlConfig::default(),
            allowed_namespaces: default_allowed_namespaces(),
            local_access: BTreeMap::new(),
            check_modification_date: false,
            modification_date_property: default_modification_date_property(),
            id_property: default_id_property(),
            search: SearchConfig::default(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            blob_max_size_mb: default_blob_max_size_mb(),
            blob_eviction_policy: default_blob_eviction_policy(),
            blob_clean_interval_secs: default_blob_clean_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Blob cache size limit in bytes.
    pub fn blob_max_size_bytes(&self) -> u64 {
        self.blob_max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Interval of the scheduled blob cleaning, if enabled.
    pub fn blob_clean_interval(&self) -> Option<Duration> {
        (self.blob_clean_interval_secs > 0).then(|| Duration::from_secs(self.blob_clean_interval_secs))
    }

    /// Whether `id` falls under one of the allowed namespaces.
    pub fn is_allowed(&self, id: &str) -> bool {
        self.allowed_namespaces.iter().any(|nmsp| id.starts_with(nmsp.as_str()))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `DISSCACHE_`
    /// 2. TOML file from `DISSCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("DISSCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("DISSCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
