//! The GET facility: turn a fetch path into document text.
//!
//! [`FsLoader`] reads from a directory tree, [`HttpLoader`] issues HTTP GETs
//! against a base URL. Both resolve relative paths the way a browser resolves
//! a relative request from a page: against the page's directory, with a
//! leading `/` meaning the site root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::ReadoutError;
use crate::paths::{normalize_from, normalize_path, percent_decode};

/// Maximum size of a fetched local document (16 MiB).
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Default timeout for one HTTP fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Loader: Send + Sync {
    /// Fetch the body at `path`.
    async fn load(&self, path: &str) -> Result<String, ReadoutError>;
}

/// Where fetch paths are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Dir(PathBuf),
    Url(Url),
}

impl Origin {
    /// `http://` and `https://` values are base URLs, anything else a directory.
    ///
    /// A base URL is treated as a directory: a missing trailing `/` is added so
    /// `https://host/docs` resolves `a.md` to `https://host/docs/a.md`.
    pub fn parse(value: &str) -> Result<Self, ReadoutError> {
        let lower = value.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Ok(Origin::Dir(PathBuf::from(value)));
        }
        let mut url = Url::parse(value).map_err(|e| ReadoutError::BadUrl {
            path: value.to_owned(),
            reason: e.to_string(),
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Origin::Url(url))
    }
}

/// Reads documents from disk, confined to `root`.
///
/// An unconfined loader uses the filesystem root as `root`.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
    base: Vec<String>,
}

impl FsLoader {
    /// `root` bounds every read; relative paths resolve from `base`, which must
    /// lie inside `root`. Both are expected to be canonical already.
    pub fn new(root: PathBuf, base: &Path) -> Result<Self, ReadoutError> {
        let rel = base
            .strip_prefix(&root)
            .map_err(|_| ReadoutError::OutsideRoot {
                path: base.display().to_string(),
            })?;
        let base = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(Self { root, base })
    }

    /// A loader that may read anywhere; `base` is expected to be canonical.
    pub fn unconfined(base: &Path) -> Result<Self, ReadoutError> {
        let root = base.ancestors().last().unwrap_or(base).to_path_buf();
        Self::new(root, base)
    }

    /// Map a fetch path to a file location without touching the disk.
    ///
    /// A `?query` or `#fragment` suffix names no part of the file and is
    /// dropped.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ReadoutError> {
        let file_part = path.split(['?', '#']).next().unwrap_or(path);
        let decoded = percent_decode(file_part).unwrap_or_else(|_| file_part.to_owned());
        let rel = if decoded.starts_with('/') {
            normalize_path(&decoded)
        } else {
            normalize_from(&self.base, &decoded)
        };
        match rel {
            Some(rel) => Ok(self.root.join(rel)),
            None => Err(ReadoutError::OutsideRoot {
                path: path.to_owned(),
            }),
        }
    }
}

#[async_trait]
impl Loader for FsLoader {
    async fn load(&self, path: &str) -> Result<String, ReadoutError> {
        let file = self.resolve(path)?;

        let canonical = match tokio::fs::canonicalize(&file).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReadoutError::NotFound {
                    path: path.to_owned(),
                });
            }
            Err(source) => return Err(ReadoutError::Io { path: file, source }),
        };
        // Symlinks may point anywhere; check the real location.
        if !canonical.starts_with(&self.root) {
            return Err(ReadoutError::OutsideRoot {
                path: path.to_owned(),
            });
        }

        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|source| ReadoutError::Io {
                path: canonical.clone(),
                source,
            })?;
        if !meta.is_file() {
            return Err(ReadoutError::NotFound {
                path: path.to_owned(),
            });
        }
        if meta.len() > MAX_FILE_SIZE {
            return Err(ReadoutError::TooLarge {
                path: canonical,
                size: meta.len(),
                limit: MAX_FILE_SIZE,
            });
        }

        let bytes = tokio::fs::read(&canonical)
            .await
            .map_err(|source| ReadoutError::Io {
                path: canonical.clone(),
                source,
            })?;
        String::from_utf8(bytes).map_err(|_| ReadoutError::NotUtf8 {
            path: path.to_owned(),
        })
    }
}

/// Fetches documents over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: reqwest::Client,
    base: Url,
}

impl HttpLoader {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ReadoutError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ReadoutError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self { client, base })
    }

    /// URL reference resolution of `path` against the base.
    pub fn resolve(&self, path: &str) -> Result<Url, ReadoutError> {
        self.base.join(path).map_err(|e| ReadoutError::BadUrl {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn load(&self, path: &str) -> Result<String, ReadoutError> {
        let url = self.resolve(path)?;
        let url_text = url.to_string();

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ReadoutError::Http {
                url: url_text.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ReadoutError::Status {
                url: url_text,
                status: status.as_u16(),
            });
        }

        resp.text()
            .await
            .map_err(|source| ReadoutError::Http { url: url_text, source })
    }
}
