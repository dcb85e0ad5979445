//! Assembly and symbol loading
//!
//! The runtime reports the urls of the files it has loaded. Binaries are paired
//! with their symbol files and each pair is fetched and parsed at most once per
//! assembly name, however many callers ask for it concurrently.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;

use super::error::{LoaderError, LoaderResult};
use super::model::AssemblyInfo;
use super::reader::{SymbolReader, assembly_name_from_url};
use super::source::AssemblySource;

/// Looks up assemblies referenced by name during symbol lookups.
pub trait AssemblyResolver: Send + Sync + 'static {
    fn resolve(&self, name: &str) -> Option<Arc<AssemblyInfo>>;
}

/// A binary and, when available, its symbol file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugItem {
    pub url: String,
    pub symbols_url: Option<String>,
}

impl DebugItem {
    /// Assembly name derived from the binary's file name.
    pub fn name(&self) -> &str {
        assembly_name_from_url(&self.url)
    }
}

fn has_extension(url: &str, extension: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.len() > extension.len()
        && path
            .get(path.len() - extension.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(extension))
}

fn with_extension(url: &str, extension: &str) -> Option<String> {
    let dot = url.rfind('.')?;
    if url[dot..].contains('/') {
        return None;
    }
    Some(format!("{}{extension}", &url[..dot]))
}

/// Pair every loaded binary with the loaded symbol file of the same path.
pub fn pair_loaded_files(files: &[String]) -> Vec<DebugItem> {
    files
        .iter()
        .filter(|file| has_extension(file, ".dll") || has_extension(file, ".exe"))
        .map(|binary| {
            let symbols_url = with_extension(binary, ".pdb").and_then(|expected| {
                files
                    .iter()
                    .find(|file| file.eq_ignore_ascii_case(&expected))
                    .cloned()
            });
            DebugItem {
                url: binary.clone(),
                symbols_url,
            }
        })
        .collect()
}

type Slot = Arc<OnceCell<Option<Arc<AssemblyInfo>>>>;

/// Loads assemblies on demand, once per name.
pub struct AssemblyLoader {
    source: Arc<dyn AssemblySource>,
    reader: Arc<dyn SymbolReader>,
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicUsize,
}

impl AssemblyLoader {
    pub fn new(source: Arc<dyn AssemblySource>, reader: Arc<dyn SymbolReader>) -> Self {
        Self {
            source,
            reader,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Load every item concurrently. Items that fail are left out.
    pub async fn load(&self, items: &[DebugItem]) -> Vec<Arc<AssemblyInfo>> {
        join_all(items.iter().map(|item| self.load_one(item)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Load one item, or return the earlier outcome for the same name.
    ///
    /// Failures are cached too: an assembly that could not be loaded is not
    /// fetched again.
    pub async fn load_one(&self, item: &DebugItem) -> Option<Arc<AssemblyInfo>> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(item.name().to_ascii_lowercase()).or_default())
        };
        slot.get_or_init(|| async {
            match self.fetch(item).await {
                Ok(assembly) => {
                    tracing::debug!(
                        assembly = %assembly.name,
                        documents = assembly.sources.len(),
                        methods = assembly.method_count(),
                        "loaded assembly"
                    );
                    Some(Arc::new(assembly))
                }
                Err(err) => {
                    tracing::warn!(url = %item.url, error = %err, "failed to load assembly");
                    None
                }
            }
        })
        .await
        .clone()
    }

    async fn fetch(&self, item: &DebugItem) -> LoaderResult<AssemblyInfo> {
        let symbols = async {
            match &item.symbols_url {
                Some(url) => self.source.fetch(url).await,
                None => Ok(None),
            }
        };
        let (image, symbols) = tokio::try_join!(self.source.fetch(&item.url), symbols)?;
        let image = image.ok_or_else(|| LoaderError::NotFound(item.url.clone()))?;
        let symbols = match (&item.symbols_url, &symbols) {
            (Some(url), Some(bytes)) => Some((url.as_str(), bytes.as_slice())),
            _ => None,
        };
        let definition = self.reader.read(&item.url, &image, symbols)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(AssemblyInfo::new(id, item.url.clone(), definition))
    }

    /// Every assembly loaded so far.
    pub fn loaded(&self) -> Vec<Arc<AssemblyInfo>> {
        let mut loaded: Vec<_> = self
            .slots
            .lock()
            .values()
            .filter_map(|slot| slot.get().cloned().flatten())
            .collect();
        loaded.sort_by_key(|assembly| assembly.id);
        loaded
    }
}

impl AssemblyResolver for AssemblyLoader {
    fn resolve(&self, name: &str) -> Option<Arc<AssemblyInfo>> {
        self.loaded()
            .into_iter()
            .find(|assembly| assembly.matches_name(name))
    }
}
