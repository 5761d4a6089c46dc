//! Symbol kind classification.

use std::fmt;
use std::str::FromStr;

/// Category of a symbol
///
/// The numeric ids follow the DbgHelp `SymTagEnum` numbering. They are what
/// the offset cache writes to disk, so they must never be renumbered.
///
/// [`SymbolKind::Export`] is synthetic: export-table lookups go through the
/// host's export capability rather than through debug info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum SymbolKind
{
    Null = 0,
    Exe = 1,
    Compiland = 2,
    CompilandDetails = 3,
    CompilandEnv = 4,
    Function = 5,
    Block = 6,
    Data = 7,
    Annotation = 8,
    Label = 9,
    PublicSymbol = 10,
    Udt = 11,
    Enum = 12,
    FunctionType = 13,
    PointerType = 14,
    ArrayType = 15,
    BaseType = 16,
    Typedef = 17,
    BaseClass = 18,
    Friend = 19,
    FunctionArgType = 20,
    FuncDebugStart = 21,
    FuncDebugEnd = 22,
    UsingNamespace = 23,
    VTableShape = 24,
    VTable = 25,
    Custom = 26,
    Thunk = 27,
    CustomType = 28,
    ManagedType = 29,
    Dimension = 30,
    CallSite = 31,
    InlineSite = 32,
    BaseInterface = 33,
    VectorType = 34,
    MatrixType = 35,
    HlslType = 36,
    Caller = 37,
    Callee = 38,
    Export = 39,
    HeapAllocationSite = 40,
    CoffGroup = 41,
}

impl SymbolKind
{
    /// Every kind, in id order.
    pub const ALL: [SymbolKind; 42] = [
        SymbolKind::Null,
        SymbolKind::Exe,
        SymbolKind::Compiland,
        SymbolKind::CompilandDetails,
        SymbolKind::CompilandEnv,
        SymbolKind::Function,
        SymbolKind::Block,
        SymbolKind::Data,
        SymbolKind::Annotation,
        SymbolKind::Label,
        SymbolKind::PublicSymbol,
        SymbolKind::Udt,
        SymbolKind::Enum,
        SymbolKind::FunctionType,
        SymbolKind::PointerType,
        SymbolKind::ArrayType,
        SymbolKind::BaseType,
        SymbolKind::Typedef,
        SymbolKind::BaseClass,
        SymbolKind::Friend,
        SymbolKind::FunctionArgType,
        SymbolKind::FuncDebugStart,
        SymbolKind::FuncDebugEnd,
        SymbolKind::UsingNamespace,
        SymbolKind::VTableShape,
        SymbolKind::VTable,
        SymbolKind::Custom,
        SymbolKind::Thunk,
        SymbolKind::CustomType,
        SymbolKind::ManagedType,
        SymbolKind::Dimension,
        SymbolKind::CallSite,
        SymbolKind::InlineSite,
        SymbolKind::BaseInterface,
        SymbolKind::VectorType,
        SymbolKind::MatrixType,
        SymbolKind::HlslType,
        SymbolKind::Caller,
        SymbolKind::Callee,
        SymbolKind::Export,
        SymbolKind::HeapAllocationSite,
        SymbolKind::CoffGroup,
    ];

    /// Stable numeric id (the value written to the cache file).
    pub const fn id(self) -> u32
    {
        self as u32
    }

    /// Look a kind up by its numeric id.
    ///
    /// ```rust
    /// use nativelookup_core::types::SymbolKind;
    ///
    /// assert_eq!(SymbolKind::from_id(10), Some(SymbolKind::PublicSymbol));
    /// assert_eq!(SymbolKind::from_id(42), None);
    /// ```
    pub fn from_id(id: u32) -> Option<Self>
    {
        Self::ALL.get(usize::try_from(id).ok()?).copied()
    }

    /// Whether lookups of this kind go through debug info (everything but exports).
    pub const fn is_debug_info(self) -> bool
    {
        !matches!(self, SymbolKind::Export)
    }

    /// Short lowercase label, accepted back by [`FromStr`].
    pub const fn label(self) -> &'static str
    {
        match self {
            SymbolKind::Null => "null",
            SymbolKind::Exe => "exe",
            SymbolKind::Compiland => "compiland",
            SymbolKind::CompilandDetails => "compiland-details",
            SymbolKind::CompilandEnv => "compiland-env",
            SymbolKind::Function => "function",
            SymbolKind::Block => "block",
            SymbolKind::Data => "data",
            SymbolKind::Annotation => "annotation",
            SymbolKind::Label => "label",
            SymbolKind::PublicSymbol => "public",
            SymbolKind::Udt => "udt",
            SymbolKind::Enum => "enum",
            SymbolKind::FunctionType => "function-type",
            SymbolKind::PointerType => "pointer-type",
            SymbolKind::ArrayType => "array-type",
            SymbolKind::BaseType => "base-type",
            SymbolKind::Typedef => "typedef",
            SymbolKind::BaseClass => "base-class",
            SymbolKind::Friend => "friend",
            SymbolKind::FunctionArgType => "function-arg-type",
            SymbolKind::FuncDebugStart => "func-debug-start",
            SymbolKind::FuncDebugEnd => "func-debug-end",
            SymbolKind::UsingNamespace => "using-namespace",
            SymbolKind::VTableShape => "vtable-shape",
            SymbolKind::VTable => "vtable",
            SymbolKind::Custom => "custom",
            SymbolKind::Thunk => "thunk",
            SymbolKind::CustomType => "custom-type",
            SymbolKind::ManagedType => "managed-type",
            SymbolKind::Dimension => "dimension",
            SymbolKind::CallSite => "call-site",
            SymbolKind::InlineSite => "inline-site",
            SymbolKind::BaseInterface => "base-interface",
            SymbolKind::VectorType => "vector-type",
            SymbolKind::MatrixType => "matrix-type",
            SymbolKind::HlslType => "hlsl-type",
            SymbolKind::Caller => "caller",
            SymbolKind::Callee => "callee",
            SymbolKind::Export => "export",
            SymbolKind::HeapAllocationSite => "heap-allocation-site",
            SymbolKind::CoffGroup => "coff-group",
        }
    }
}

impl fmt::Display for SymbolKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.label())
    }
}

impl FromStr for SymbolKind
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        if let Ok(id) = wanted.parse::<u32>() {
            return SymbolKind::from_id(id).ok_or_else(|| format!("Unknown symbol kind id: {id}"));
        }
        match wanted.as_str() {
            "public-symbol" | "publicsymbol" | "pub" => return Ok(SymbolKind::PublicSymbol),
            "func" | "fn" => return Ok(SymbolKind::Function),
            _ => {}
        }
        SymbolKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.label() == wanted)
            .ok_or_else(|| format!("Unknown symbol kind: {s}. Use e.g. 'export', 'public', 'function' or 'data'"))
    }
}
