//! Repository access over HTTP.
//!
//! ### Identifier resolution
//! - Canonicalize the identifier (see [`url::canonicalize`])
//! - `HEAD` it, following redirects
//! - The final URL minus a trailing `/metadata` is the resource URI
//! - 401 is `Unauthorized`, any other non-200 is `NotFound`
//!
//! ### Metadata
//! - `GET <uri>/metadata` as N-Triples
//! - The search configuration travels as request headers
//! - Identifiers and modification dates are read from the description

pub mod ntriples;
pub mod url;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, ClientBuilder, StatusCode, header};
use std::time::{Duration, Instant};

use disscache_core::engine::ResourceProvider;
use disscache_core::{AppConfig, Error, ResourceSnapshot, SearchConfig};

pub use self::url::{UrlError, canonicalize};
use self::url::{metadata_url, resource_uri};

const NTRIPLES: &str = "application/n-triples";

const HEADER_METADATA_MODE: &str = "X-METADATA-READ-MODE";
const HEADER_PARENT_PROPERTY: &str = "X-PARENT-PROPERTY";
const HEADER_RESOURCE_PROPERTIES: &str = "X-RESOURCE-PROPERTIES";
const HEADER_RELATIVES_PROPERTIES: &str = "X-RELATIVES-PROPERTIES";

/// Configuration for the HTTP provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// User agent string (default: "disscache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 10)
    pub max_redirects: usize,

    /// Whether modification dates are read at all (default: false)
    pub check_modification_date: bool,

    pub modification_date_property: String,

    pub id_property: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        AppConfig::default().into()
    }
}

impl From<&AppConfig> for ProviderConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            check_modification_date: config.check_modification_date,
            modification_date_property: config.modification_date_property.clone(),
            id_property: config.id_property.clone(),
        }
    }
}

impl From<AppConfig> for ProviderConfig {
    fn from(config: AppConfig) -> Self {
        Self::from(&config)
    }
}

fn client_builder(user_agent: &str, max_redirects: usize) -> ClientBuilder {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .use_rustls_tls()
        .gzip(true)
        .deflate(true)
}

/// Build the HTTP client for metadata requests. `timeout` bounds each
/// request as a whole.
pub fn http_client(user_agent: &str, timeout: Duration, max_redirects: usize) -> Result<Client, Error> {
    client_builder(user_agent, max_redirects)
        .timeout(timeout)
        .build()
        .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {e}")))
}

/// Build the HTTP client for binary downloads.
///
/// `idle_timeout` bounds connecting and every single read, never the whole
/// transfer, so large binaries may take as long as they need.
pub fn blob_http_client(user_agent: &str, idle_timeout: Duration, max_redirects: usize) -> Result<Client, Error> {
    client_builder(user_agent, max_redirects)
        .connect_timeout(idle_timeout)
        .read_timeout(idle_timeout)
        .build()
        .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {e}")))
}

/// Resource provider talking to a repository's REST interface.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    http: Client,
    config: ProviderConfig,
}

impl HttpProvider {
    /// Create a new provider with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let http = http_client(&config.user_agent, config.timeout, config.max_redirects)?;
        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Resolve an identifier to the URI of the resource it denotes.
    pub async fn resolve(&self, id: &str) -> Result<String, Error> {
        let url = canonicalize(id)?;
        let response = self
            .http
            .head(url.as_str())
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("network error: {e}")))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(Error::Unauthorized(id.to_string())),
            status => {
                return Err(Error::NotFound(format!(
                    "{id} can not be resolved (HTTP status code {})",
                    status.as_u16()
                )));
            }
        }

        let uri = resource_uri(response.url());
        tracing::debug!(id, uri = %uri, "resolved identifier");
        Ok(uri)
    }

    /// Fetch the N-Triples description of the resource `uri`.
    pub async fn metadata(&self, uri: &str, search: &SearchConfig) -> Result<String, Error> {
        let start = Instant::now();
        let mut request = self
            .http
            .get(metadata_url(uri))
            .header(header::ACCEPT, NTRIPLES)
            .header(HEADER_METADATA_MODE, &search.metadata_mode);
        if !search.parent_property.is_empty() {
            request = request.header(HEADER_PARENT_PROPERTY, &search.parent_property);
        }
        if !search.resource_properties.is_empty() {
            request = request.header(HEADER_RESOURCE_PROPERTIES, search.resource_properties.join(","));
        }
        if !search.relatives_properties.is_empty() {
            request = request.header(HEADER_RELATIVES_PROPERTIES, search.relatives_properties.join(","));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("network error: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(uri.to_string()));
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::NotFound(uri.to_string()));
        }
        if !status.is_success() {
            return Err(Error::HttpError(format!("{uri}: status {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {e}")))?;

        tracing::debug!(
            "fetched metadata of {} in {}ms ({} bytes)",
            uri,
            start.elapsed().as_millis(),
            body.len()
        );
        Ok(body)
    }
}

#[async_trait]
impl ResourceProvider for HttpProvider {
    async fn get_resource_by_id(&self, id: &str, search: &SearchConfig) -> Result<ResourceSnapshot, Error> {
        let uri = self.resolve(id).await?;
        let metadata = self.metadata(&uri, search).await?;

        let ids = ntriples::objects(&metadata, &uri, &self.config.id_property);
        let mut snapshot = ResourceSnapshot::new(uri, metadata);
        for term in ids {
            snapshot.add_id(term.value());
        }
        Ok(snapshot)
    }

    async fn get_modification_timestamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, Error> {
        if !self.config.check_modification_date {
            return Ok(None);
        }

        let uri = self.resolve(id).await?;
        let property = &self.config.modification_date_property;
        let search = SearchConfig {
            metadata_mode: "resource".into(),
            resource_properties: vec![property.clone()],
            ..SearchConfig::default()
        };
        let metadata = self.metadata(&uri, &search).await?;

        let Some(term) = ntriples::objects(&metadata, &uri, property).into_iter().next() else {
            tracing::debug!(uri = %uri, property = %property, "no modification date");
            return Ok(None);
        };
        let parsed = parse_timestamp(term.value());
        if parsed.is_none() {
            tracing::warn!(uri = %uri, value = term.value(), "unparsable modification date");
        }
        Ok(parsed)
    }
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO one taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}
