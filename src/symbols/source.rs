//! Where assembly and symbol bytes come from.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{LoaderError, LoaderResult};

/// Fetches the files the runtime reports as loaded.
pub trait AssemblySource: Send + Sync + 'static {
    /// Read the file at `url`. `Ok(None)` means it does not exist.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LoaderResult<Option<Vec<u8>>>>;
}

/// Resolves urls against a local directory.
///
/// The scheme and authority of the url are dropped and the remaining path is
/// joined onto the root, so `http://localhost:8000/managed/App.dll` maps to
/// `<root>/managed/App.dll`.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for `url`.
    pub fn resolve(&self, url: &str) -> PathBuf {
        let path = match url.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
            None => url,
        };
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.root.join(path.trim_start_matches('/'))
    }
}

impl AssemblySource for FileSystemSource {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LoaderResult<Option<Vec<u8>>>> {
        Box::pin(async move {
            let path = self.resolve(url);
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(url, path = %path.display(), "file not found");
                    Ok(None)
                }
                Err(source) => Err(LoaderError::Fetch {
                    url: url.to_owned(),
                    source,
                }),
            }
        })
    }
}

/// In-memory files keyed by url.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().insert(url.into(), bytes.into());
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with_file(self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }
}

impl AssemblySource for MemorySource {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LoaderResult<Option<Vec<u8>>>> {
        let bytes = self.files.lock().get(url).cloned();
        Box::pin(async move { Ok(bytes) })
    }
}
