//! Symbol readers turn fetched bytes into an [`AssemblyDefinition`].

use super::error::{LoaderError, LoaderResult};
use super::model::AssemblyDefinition;

/// Parses the debug information of one assembly.
pub trait SymbolReader: Send + Sync + 'static {
    /// Read the assembly at `url` from its image and optional symbol file.
    fn read(
        &self,
        url: &str,
        image: &[u8],
        symbols: Option<(&str, &[u8])>,
    ) -> LoaderResult<AssemblyDefinition>;
}

/// Reads JSON symbol manifests.
///
/// The manifest lists the assembly name, its documents and, per method, the
/// token, sequence points, parameters and local scopes. The image bytes are not
/// inspected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestReader;

impl SymbolReader for ManifestReader {
    fn read(
        &self,
        url: &str,
        _image: &[u8],
        symbols: Option<(&str, &[u8])>,
    ) -> LoaderResult<AssemblyDefinition> {
        let Some((symbols_url, bytes)) = symbols else {
            return Ok(AssemblyDefinition::without_symbols(assembly_name_from_url(
                url,
            )));
        };
        serde_json::from_slice(bytes).map_err(|source| LoaderError::InvalidSymbols {
            url: symbols_url.to_owned(),
            source,
        })
    }
}

/// File stem of the last path segment of `url`.
pub fn assembly_name_from_url(url: &str) -> &str {
    let file = url.rsplit(['/', '\\']).next().unwrap_or(url);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}
