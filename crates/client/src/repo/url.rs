//! Identifier URL canonicalization.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for disscache_core::Error {
    fn from(err: UrlError) -> Self {
        disscache_core::Error::InvalidUrl(err.to_string())
    }
}

/// Path suffix under which a repository serves a resource's metadata.
const METADATA_SUFFIX: &str = "/metadata";

/// Canonicalize an identifier before it is resolved.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resource URI behind a resolved URL: the URL minus a trailing `/metadata`.
pub fn resource_uri(resolved: &url::Url) -> String {
    let s = resolved.as_str();
    s.strip_suffix(METADATA_SUFFIX).unwrap_or(s).to_string()
}

/// URL serving the metadata of the resource `uri`.
pub fn metadata_url(uri: &str) -> String {
    format!("{}{METADATA_SUFFIX}", uri.trim_end_matches('/'))
}
