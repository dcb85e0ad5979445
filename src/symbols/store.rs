//! Symbol store: translates between IL coordinates and source positions.

use std::sync::Arc;

use super::loader::AssemblyResolver;
use super::model::{AssemblyInfo, MethodInfo, SourceFile, SourceId, SourceLocation};
use crate::debugger::breakpoint::BreakpointRequest;

/// Lookups the debugger needs from loaded symbols.
pub trait SymbolStore: Send + Sync + 'static {
    /// Where a breakpoint requested by the IDE should bind, if anywhere.
    fn find_best_breakpoint(&self, request: &BreakpointRequest) -> Option<SourceLocation>;

    /// Every breakable location between `start` and `end` (inclusive). `None`
    /// when the two are in different documents or the document is unknown.
    fn find_possible_breakpoints(
        &self,
        start: &SourceLocation,
        end: &SourceLocation,
    ) -> Option<Vec<SourceLocation>>;

    fn file_by_id(&self, id: &SourceId) -> Option<&SourceFile>;

    /// First document matched by a breakpoint request's url or url pattern.
    fn file_for_request(&self, request: &BreakpointRequest) -> Option<&SourceFile>;

    fn assembly_by_name(&self, name: &str) -> Option<Arc<AssemblyInfo>>;

    /// Every document of every loaded assembly.
    fn all_sources(&self) -> Vec<&SourceFile>;

    /// Method `token` of assembly `assembly`.
    fn method(&self, assembly: &str, token: u32) -> Option<Arc<MethodInfo>> {
        self.assembly_by_name(assembly)?
            .method_by_token(token)
            .cloned()
    }
}

/// [`SymbolStore`] over a fixed set of loaded assemblies.
#[derive(Default)]
pub struct DebugStore {
    assemblies: Vec<Arc<AssemblyInfo>>,
    resolver: Option<Arc<dyn AssemblyResolver>>,
}

impl DebugStore {
    pub fn new(assemblies: Vec<Arc<AssemblyInfo>>) -> Self {
        Self {
            assemblies,
            resolver: None,
        }
    }

    /// Resolve assembly names not in this store through `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<dyn AssemblyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn assemblies(&self) -> &[Arc<AssemblyInfo>] {
        &self.assemblies
    }

    fn assembly_by_id(&self, id: usize) -> Option<&Arc<AssemblyInfo>> {
        self.assemblies.iter().find(|assembly| assembly.id == id)
    }
}

impl std::fmt::Debug for DebugStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugStore")
            .field(
                "assemblies",
                &self.assemblies.iter().map(|a| &a.name).collect::<Vec<_>>(),
            )
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl SymbolStore for DebugStore {
    fn find_best_breakpoint(&self, request: &BreakpointRequest) -> Option<SourceLocation> {
        let file = self.file_for_request(request)?;
        let assembly = self.assembly_by_id(file.id.assembly)?;
        let wanted = (request.line, request.column);

        // First sequence point on the requested line that does not end before
        // the requested column.
        assembly
            .methods_in(file.id)
            .into_iter()
            .flat_map(|method| {
                method
                    .sequence_points
                    .iter()
                    .filter(|sp| !sp.is_hidden())
                    .filter(move |sp| sp.start().0 == request.line && sp.end() >= wanted)
                    .map(move |sp| (sp.start().1, sp.offset, method))
            })
            .min_by_key(|(column, offset, method)| (*column, method.token, *offset))
            .and_then(|(_, offset, method)| method.location_by_il(offset))
    }

    fn find_possible_breakpoints(
        &self,
        start: &SourceLocation,
        end: &SourceLocation,
    ) -> Option<Vec<SourceLocation>> {
        if start.id != end.id {
            return None;
        }
        let file = self.file_by_id(&start.id)?;
        let assembly = self.assembly_by_id(file.id.assembly)?;
        let span = ((start.line, start.column), (end.line, end.column));
        let mut locations: Vec<_> = assembly
            .methods_in(file.id)
            .into_iter()
            .flat_map(|method| method.locations_between(span.0, span.1))
            .collect();
        locations.sort_by_key(|location| (location.line, location.column));
        Some(locations)
    }

    fn file_by_id(&self, id: &SourceId) -> Option<&SourceFile> {
        self.assembly_by_id(id.assembly)?.sources.get(id.document)
    }

    fn file_for_request(&self, request: &BreakpointRequest) -> Option<&SourceFile> {
        self.assemblies
            .iter()
            .flat_map(|assembly| assembly.sources.iter())
            .find(|file| request.matches(file))
    }

    fn assembly_by_name(&self, name: &str) -> Option<Arc<AssemblyInfo>> {
        if let Some(assembly) = self.assemblies.iter().find(|a| a.matches_name(name)) {
            return Some(Arc::clone(assembly));
        }
        self.resolver.as_ref()?.resolve(name)
    }

    fn all_sources(&self) -> Vec<&SourceFile> {
        self.assemblies
            .iter()
            .flat_map(|assembly| assembly.sources.iter())
            .collect()
    }
}
