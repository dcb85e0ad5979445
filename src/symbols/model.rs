//! Symbol data model
//!
//! Line and column numbers stored in symbol data are 1-based. Every
//! [`SourceLocation`] handed out by this module is 0-based, the convention the
//! debugger protocol uses.

use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Scheme shared by script ids and document urls of managed sources.
pub const DOTNET_SCHEME: &str = "dotnet://";

/// Script id of a managed source document: `dotnet://<assembly>_<document>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    /// Id of the owning assembly.
    pub assembly: usize,
    /// Index of the document within the assembly.
    pub document: usize,
}

impl SourceId {
    pub fn new(assembly: usize, document: usize) -> Self {
        Self { assembly, document }
    }

    /// Parse a script id. Returns `None` for anything that is not a managed id.
    pub fn parse(id: &str) -> Option<Self> {
        let rest = strip_scheme(id)?;
        let (assembly, document) = rest.split_once('_')?;
        Some(Self {
            assembly: assembly.parse().ok()?,
            document: document.parse().ok()?,
        })
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DOTNET_SCHEME}{}_{}", self.assembly, self.document)
    }
}

/// True if `url` uses the managed scheme (case-insensitive).
pub fn is_dotnet_url(url: &str) -> bool {
    strip_scheme(url).is_some()
}

fn strip_scheme(url: &str) -> Option<&str> {
    let prefix = url.get(..DOTNET_SCHEME.len())?;
    prefix
        .eq_ignore_ascii_case(DOTNET_SCHEME)
        .then(|| &url[DOTNET_SCHEME.len()..])
}

/// IL coordinates of a location: the unit of breakpoint placement understood
/// by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlLocation {
    pub assembly: String,
    pub method_token: u32,
    pub offset: u32,
}

/// A 0-based position in a managed source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub id: SourceId,
    pub line: u32,
    pub column: u32,
    /// IL coordinates, present for locations derived from a sequence point.
    pub il: Option<IlLocation>,
}

impl SourceLocation {
    /// A location with no IL binding, as received from the IDE.
    pub fn new(id: SourceId, line: u32, column: u32) -> Self {
        Self {
            id,
            line,
            column,
            il: None,
        }
    }

    /// Parse a protocol `Location` object. `columnNumber` defaults to 0.
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = SourceId::parse(value.get("scriptId")?.as_str()?)?;
        let line = value.get("lineNumber")?.as_u64()?;
        let column = match value.get("columnNumber") {
            Some(column) => column.as_u64()?,
            None => 0,
        };
        Some(Self::new(
            id,
            u32::try_from(line).ok()?,
            u32::try_from(column).ok()?,
        ))
    }

    /// Protocol `Location` object.
    pub fn to_json(&self) -> Value {
        json!({
            "scriptId": self.id.to_string(),
            "lineNumber": self.line,
            "columnNumber": self.column,
        })
    }

    /// IL offset of this location, if bound.
    pub fn il_offset(&self) -> Option<u32> {
        self.il.as_ref().map(|il| il.offset)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.line, self.column)?;
        if let Some(il) = &self.il {
            write!(f, " ({}@{:#x}+{})", il.assembly, il.method_token, il.offset)?;
        }
        Ok(())
    }
}

/// Mapping between an IL offset and a source span (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SequencePoint {
    pub offset: u32,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SequencePoint {
    /// Line number compilers use for sequence points hidden from the debugger.
    pub const HIDDEN_LINE: u32 = 0xfeefee;

    pub fn is_hidden(&self) -> bool {
        self.start_line == Self::HIDDEN_LINE
    }

    /// 0-based start position.
    pub fn start(&self) -> (u32, u32) {
        (
            self.start_line.saturating_sub(1),
            self.start_column.saturating_sub(1),
        )
    }

    /// 0-based end position.
    pub fn end(&self) -> (u32, u32) {
        (
            self.end_line.saturating_sub(1),
            self.end_column.saturating_sub(1),
        )
    }

    /// True if the 0-based span `[start, end]` overlaps this sequence point.
    pub fn overlaps(&self, start: (u32, u32), end: (u32, u32)) -> bool {
        start <= self.end() && self.start() <= end
    }

    /// True if the 0-based position lies within this sequence point.
    pub fn contains(&self, position: (u32, u32)) -> bool {
        self.overlaps(position, position)
    }
}

/// A local variable slot in symbol data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalVariable {
    pub name: String,
    pub index: i32,
    #[serde(default)]
    pub hidden: bool,
}

/// IL range in which a set of locals is live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalScope {
    pub start_offset: u32,
    pub end_offset: u32,
    #[serde(default)]
    pub locals: Vec<LocalVariable>,
}

/// A variable the runtime can be asked about.
///
/// Parameters use negative indices (`-1` for the first parameter), locals
/// their slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub index: i32,
}

/// A method with debug information.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub token: u32,
    pub name: String,
    pub assembly: String,
    pub source: SourceId,
    pub sequence_points: Vec<SequencePoint>,
    pub parameters: Vec<String>,
    pub scopes: Vec<LocalScope>,
}

impl MethodInfo {
    fn location_of(&self, sp: &SequencePoint) -> SourceLocation {
        let (line, column) = sp.start();
        SourceLocation {
            id: self.source,
            line,
            column,
            il: Some(IlLocation {
                assembly: self.assembly.clone(),
                method_token: self.token,
                offset: sp.offset,
            }),
        }
    }

    fn visible_points(&self) -> impl Iterator<Item = &SequencePoint> {
        self.sequence_points.iter().filter(|sp| !sp.is_hidden())
    }

    /// Locations of every visible sequence point overlapping the 0-based span.
    pub fn locations_between(&self, start: (u32, u32), end: (u32, u32)) -> Vec<SourceLocation> {
        self.visible_points()
            .filter(|sp| sp.overlaps(start, end))
            .map(|sp| self.location_of(sp))
            .collect()
    }

    /// Source location of the last sequence point at or before `offset`.
    pub fn location_by_il(&self, offset: u32) -> Option<SourceLocation> {
        self.visible_points()
            .filter(|sp| sp.offset <= offset)
            .max_by_key(|sp| sp.offset)
            .map(|sp| self.location_of(sp))
    }

    /// Start of the method body.
    pub fn start_location(&self) -> Option<SourceLocation> {
        self.visible_points()
            .min_by_key(|sp| sp.offset)
            .map(|sp| self.location_of(sp))
    }

    /// End of the method body.
    pub fn end_location(&self) -> Option<SourceLocation> {
        let last = self.visible_points().max_by_key(|sp| sp.offset)?;
        let (line, column) = last.end();
        Some(SourceLocation {
            line,
            column,
            ..self.location_of(last)
        })
    }

    /// Parameters followed by the locals live at `offset`.
    pub fn live_vars_at(&self, offset: u32) -> Vec<VariableInfo> {
        let parameters = self
            .parameters
            .iter()
            .enumerate()
            .map(|(i, name)| VariableInfo {
                name: name.clone(),
                index: -(i as i32 + 1),
            });
        let locals = self
            .scopes
            .iter()
            .filter(|scope| scope.start_offset <= offset && offset < scope.end_offset)
            .flat_map(|scope| scope.locals.iter())
            .filter(|local| !local.hidden)
            .map(|local| VariableInfo {
                name: local.name.clone(),
                index: local.index,
            });
        parameters.chain(locals).collect()
    }
}

/// A source document of an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: SourceId,
    /// Name of the owning assembly.
    pub assembly: String,
    /// Document name as recorded in the symbols (usually an absolute path).
    pub url: String,
    /// Document name with separators normalised and drive colons removed.
    pub debugger_file_name: String,
    /// `dotnet://<assembly>/<debugger_file_name>`.
    pub dotnet_url: String,
    pub hash: String,
}

impl SourceFile {
    fn new(id: SourceId, assembly: &str, document: &DocumentDefinition) -> Self {
        let debugger_file_name = document.name.replace('\\', "/").replace(':', "");
        let dotnet_url = format!(
            "{DOTNET_SCHEME}{assembly}/{}",
            debugger_file_name.trim_start_matches('/')
        );
        let hash = match &document.hash {
            Some(hash) => hash.clone(),
            None => blake3::hash(document.name.as_bytes()).to_hex().to_string(),
        };
        Self {
            id,
            assembly: assembly.to_owned(),
            url: document.name.clone(),
            debugger_file_name,
            dotnet_url,
            hash,
        }
    }

    /// Path of the document on the local disk, when its url names one.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.url.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        let path = PathBuf::from(&self.url);
        path.is_absolute().then_some(path)
    }

    /// Parameters of the `Debugger.scriptParsed` event announcing this document.
    pub fn script_parsed(&self, context_id: Option<i64>, aux_data: Option<&Value>) -> Value {
        json!({
            "scriptId": self.id.to_string(),
            "url": self.url,
            "executionContextId": context_id,
            "executionContextAuxData": aux_data,
            "hash": self.hash,
            "dotNetUrl": self.dotnet_url,
        })
    }
}

/// A loaded assembly and its debug information.
#[derive(Debug, Clone)]
pub struct AssemblyInfo {
    pub id: usize,
    pub name: String,
    pub url: String,
    pub sources: Vec<SourceFile>,
    methods: HashMap<u32, Arc<MethodInfo>>,
}

impl AssemblyInfo {
    /// Build an assembly from parsed symbol data.
    pub fn new(id: usize, url: impl Into<String>, definition: AssemblyDefinition) -> Self {
        let AssemblyDefinition {
            name,
            documents,
            methods,
        } = definition;
        let sources = documents
            .iter()
            .enumerate()
            .map(|(index, document)| SourceFile::new(SourceId::new(id, index), &name, document))
            .collect::<Vec<_>>();
        let methods = methods
            .into_iter()
            .filter(|method| method.document < sources.len())
            .map(|method| {
                let info = MethodInfo {
                    token: method.token,
                    name: method.name,
                    assembly: name.clone(),
                    source: SourceId::new(id, method.document),
                    sequence_points: method.sequence_points,
                    parameters: method.parameters,
                    scopes: method.scopes,
                };
                (info.token, Arc::new(info))
            })
            .collect();
        Self {
            id,
            name,
            url: url.into(),
            sources,
            methods,
        }
    }

    /// True if `name` refers to this assembly. Comparison ignores case and a
    /// trailing `.dll`/`.exe`.
    pub fn matches_name(&self, name: &str) -> bool {
        fn bare(name: &str) -> &str {
            let lower = name.len().saturating_sub(4);
            match name.get(lower..) {
                Some(ext)
                    if ext.eq_ignore_ascii_case(".dll") || ext.eq_ignore_ascii_case(".exe") =>
                {
                    &name[..lower]
                }
                _ => name,
            }
        }
        bare(&self.name).eq_ignore_ascii_case(bare(name))
    }

    pub fn method_by_token(&self, token: u32) -> Option<&Arc<MethodInfo>> {
        self.methods.get(&token)
    }

    /// Methods whose body lives in `source`, in token order.
    pub fn methods_in(&self, source: SourceId) -> Vec<&Arc<MethodInfo>> {
        let mut methods: Vec<_> = self
            .methods
            .values()
            .filter(|method| method.source == source)
            .collect();
        methods.sort_by_key(|method| method.token);
        methods
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

/// Document entry of a symbol file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentDefinition {
    pub name: String,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Method entry of a symbol file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MethodDefinition {
    pub token: u32,
    pub name: String,
    /// Index into the assembly's documents.
    #[serde(default)]
    pub document: usize,
    #[serde(default)]
    pub sequence_points: Vec<SequencePoint>,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<LocalScope>,
}

/// Parsed debug information of one assembly, before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssemblyDefinition {
    pub name: String,
    #[serde(default)]
    pub documents: Vec<DocumentDefinition>,
    #[serde(default)]
    pub methods: Vec<MethodDefinition>,
}

impl AssemblyDefinition {
    /// An assembly without debug information.
    pub fn without_symbols(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Vec::new(),
            methods: Vec::new(),
        }
    }
}
