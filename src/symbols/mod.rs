//! Managed symbol information
//!
//! The store maps assembly name + method token + IL offset to source positions
//! and back. The loader fills it from the files the runtime reports as loaded.

pub mod error;
pub mod loader;
pub mod model;
pub mod reader;
pub mod source;
pub mod store;

pub use error::{LoaderError, LoaderResult};
pub use loader::{AssemblyLoader, AssemblyResolver, DebugItem, pair_loaded_files};
pub use model::{
    AssemblyDefinition, AssemblyInfo, DOTNET_SCHEME, IlLocation, MethodInfo, SequencePoint,
    SourceFile, SourceId, SourceLocation, VariableInfo, is_dotnet_url,
};
pub use reader::{ManifestReader, SymbolReader};
pub use source::{AssemblySource, FileSystemSource, MemorySource};
pub use store::{DebugStore, SymbolStore};
