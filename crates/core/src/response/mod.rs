//! Cached HTTP-like responses.
//!
//! A response body is either kept inline or refers to a file on disk. The
//! persisted form is a JSON record with `body`, `responseCode`, `headers` and
//! `file` fields; `hit` is never persisted.

pub mod delivery;

use crate::Error;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use delivery::{BufferedSink, ContentEncoding, ResponseSink, negotiate_encoding};

/// One or many values of a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    One(String),
    Many(Vec<String>),
}

impl HeaderValue {
    pub fn values(&self) -> &[String] {
        match self {
            HeaderValue::One(v) => std::slice::from_ref(v),
            HeaderValue::Many(v) => v,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::One(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::One(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        HeaderValue::Many(values)
    }
}

/// Response body: inline bytes or a path to a file holding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Inline(Vec<u8>),
    File(PathBuf),
}

/// A computed response as stored in and served from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: Body,
    pub status: u16,
    pub headers: BTreeMap<String, HeaderValue>,
    /// Set only when the response was served from the store.
    pub hit: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    body: String,
    response_code: u16,
    #[serde(default)]
    headers: BTreeMap<String, HeaderValue>,
    #[serde(default)]
    file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_encoding: Option<String>,
}

const BASE64_ENCODING: &str = "base64";

impl CachedResponse {
    pub fn new(body: impl Into<Vec<u8>>, status: u16) -> Self {
        Self { body: Body::Inline(body.into()), status, headers: BTreeMap::new(), hit: false }
    }

    pub fn file(path: impl Into<PathBuf>, status: u16) -> Self {
        Self { body: Body::File(path.into()), status, headers: BTreeMap::new(), hit: false }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.body, Body::File(_))
    }

    /// For file-backed responses, whether the referenced file still exists.
    pub fn body_available(&self) -> bool {
        match &self.body {
            Body::Inline(_) => true,
            Body::File(path) => path.is_file(),
        }
    }

    /// Encode into the persisted JSON record.
    pub fn serialize(&self) -> Result<String, Error> {
        let (body, file, body_encoding) = match &self.body {
            Body::File(path) => (path.to_string_lossy().into_owned(), true, None),
            Body::Inline(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => (text.to_string(), false, None),
                Err(_) => (BASE64.encode(bytes), false, Some(BASE64_ENCODING.to_string())),
            },
        };
        let wire = WireResponse { body, response_code: self.status, headers: self.headers.clone(), file, body_encoding };
        serde_json::to_string(&wire).map_err(|e| Error::CorruptEntry(format!("response: {e}")))
    }

    /// Decode a persisted record. The result is always marked as a hit.
    pub fn deserialize(data: &str) -> Result<Self, Error> {
        let wire: WireResponse =
            serde_json::from_str(data).map_err(|e| Error::CorruptEntry(format!("response: {e}")))?;

        let body = if wire.file {
            Body::File(PathBuf::from(wire.body))
        } else {
            match wire.body_encoding.as_deref() {
                None => Body::Inline(wire.body.into_bytes()),
                Some(BASE64_ENCODING) => Body::Inline(
                    BASE64
                        .decode(wire.body.as_bytes())
                        .map_err(|e| Error::CorruptEntry(format!("response body: {e}")))?,
                ),
                Some(other) => return Err(Error::CorruptEntry(format!("unknown body encoding {other:?}"))),
            }
        };

        Ok(Self { body, status: wire.response_code, headers: wire.headers, hit: true })
    }
}
