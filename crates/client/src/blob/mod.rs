//! Filesystem cache for resource binaries.
//!
//! Binaries of namespaces with local access are read in place from sharded
//! storage. Everything else is downloaded once into
//! `<cache dir>/<sha256 of url>/ref` and served from there.

mod clean;

pub use clean::{CleanStats, EvictionPolicy};

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode, header};
use sha2::{Digest, Sha256};

use disscache_core::config::LocalAccess;
use disscache_core::{AppConfig, Error};

use crate::repo::blob_http_client;

/// Name of the file holding a downloaded binary inside its directory.
pub const REF_FILE_NAME: &str = "ref";

/// Blob cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct BlobCache {
    dir: PathBuf,
    local_access: BTreeMap<String, LocalAccess>,
    http: Client,
}

impl BlobCache {
    pub fn new(dir: impl Into<PathBuf>, local_access: BTreeMap<String, LocalAccess>, http: Client) -> Self {
        Self { dir: dir.into(), local_access, http }
    }

    /// Blob cache described by the application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let http = blob_http_client(&config.user_agent, config.timeout(), config.max_redirects)?;
        Ok(Self::new(&config.cache_dir, config.local_access.clone(), http))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate an empty file only the current user can access.
    ///
    /// Without `name` a fresh unique name is generated. With one, the file
    /// `<cache dir>/<name>` is created or truncated.
    pub fn mint(&self, name: Option<&str>) -> Result<PathBuf, Error> {
        create_private_dir(&self.dir)?;

        let Some(name) = name.filter(|n| !n.is_empty()) else {
            let (_, path) = tempfile::Builder::new()
                .prefix("blob")
                .tempfile_in(&self.dir)?
                .keep()
                .map_err(|e| Error::Io(e.error))?;
            return Ok(path);
        };

        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::InvalidInput(format!("invalid blob name {name:?}")));
        }

        let path = self.dir.join(name);
        fs::File::create(&path)?;
        set_private(&path, 0o600)?;
        Ok(path)
    }

    /// Local path holding the binary of `url`.
    ///
    /// URLs in a namespace with local access map straight to their sharded
    /// location, without checking access rights; a missing file there is
    /// [`Error::NoBinaryContent`]. Other URLs are downloaded on first use.
    /// A download answered with anything but 200 is [`Error::NoFileAtSource`];
    /// one whose content type differs from a non-empty
    /// `expected_content_type` is [`Error::NoBinaryContent`] and leaves
    /// nothing on disk.
    pub async fn resolve_reference(&self, url: &str, expected_content_type: Option<&str>) -> Result<PathBuf, Error> {
        if let Some(local) = self.local_path(url) {
            let path = local?;
            if !path.is_file() {
                return Err(Error::NoBinaryContent(format!("{url}: resource has no binary content")));
            }
            tracing::debug!(url, path = %path.display(), "local access");
            return Ok(path);
        }

        let path = self.cached_path(url);
        if !path.is_file() {
            self.download(&path, url, expected_content_type.filter(|m| !m.is_empty())).await?;
        }
        Ok(path)
    }

    /// Sharded location of `url` under its local-access namespace, if any.
    fn local_path(&self, url: &str) -> Option<Result<PathBuf, Error>> {
        let (_, access) = self.local_access.iter().find(|(nmsp, _)| url.starts_with(nmsp.as_str()))?;

        let last = url.rsplit('/').next().unwrap_or_default();
        let Ok(id) = last.parse::<u64>() else {
            return Some(Err(Error::NoBinaryContent(format!("{url}: not a repository resource id"))));
        };
        Some(Ok(shard_path(&access.dir, access.level, id)))
    }

    fn cached_path(&self, url: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(url.as_bytes()));
        self.dir.join(hash).join(REF_FILE_NAME)
    }

    async fn download(&self, path: &Path, url: &str, expected_content_type: Option<&str>) -> Result<(), Error> {
        tracing::info!(url, "downloading binary");

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("network error: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(Error::NoFileAtSource(format!("{url}: HTTP status {}", response.status().as_u16())));
        }

        let actual = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("lacking content type")
            .to_string();
        if let Some(expected) = expected_content_type
            && media_type(expected) != media_type(&actual)
        {
            // most probably a redirect to the metadata
            tracing::error!(url, actual = %actual, expected, "content type mismatch");
            return Err(Error::NoBinaryContent(format!("{url}: the requested file misses binary content")));
        }

        let parent = path.parent().unwrap_or(&self.dir);
        create_private_dir(parent)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(REF_FILE_NAME)
            .suffix(".tmp")
            .tempfile_in(parent)?;

        let mut size = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {e}")))?
        {
            tmp.write_all(&chunk)?;
            size += chunk.len();
        }
        tmp.flush()?;

        match tmp.persist_noclobber(path) {
            Ok(_) => tracing::debug!(url, size, path = %path.display(), "binary cached"),
            // someone else published it first; keep theirs
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(url, "binary cached concurrently");
            }
            Err(e) => return Err(Error::Io(e.error)),
        }
        Ok(())
    }
}

/// `<dir>/<id % 100>/<id / 100 % 100>/.../<id>` with `level` shard
/// directories.
pub fn shard_path(dir: &Path, level: u8, id: u64) -> PathBuf {
    let mut path = dir.to_path_buf();
    let mut part = id;
    for _ in 0..level {
        path.push(format!("{:02}", part % 100));
        part /= 100;
    }
    path.push(id.to_string());
    path
}

fn media_type(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

#[cfg(unix)]
fn set_private(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_private(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
