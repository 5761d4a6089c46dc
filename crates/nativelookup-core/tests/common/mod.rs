//! Shared fakes for integration tests
//!
//! Every fake counts its calls so tests can assert that cached answers never
//! reach the host capabilities again.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nativelookup_core::config::LibraryConfig;
use nativelookup_core::error::OsError;
use nativelookup_core::host::{
    DebugInfoProvider, EventSink, ExportTable, Host, ModuleDebugInfo, ModuleEnumerator, ProviderEvent, ProviderSymbol,
    SymbolSource,
};
use nativelookup_core::types::{Address, BuildSignature, ModuleInfo, SymbolKind};

pub const BASE: u64 = 0x1000_0000;
pub const ERROR_PROC_NOT_FOUND: i32 = 127;
pub const ERROR_FILE_NOT_FOUND: i32 = 2;

pub fn module() -> ModuleInfo
{
    ModuleInfo::new("UnityPlayer.dll", "/game/UnityPlayer.dll", Address::new(BASE), 0x0100_0000)
}

pub fn signature() -> BuildSignature
{
    BuildSignature::new(
        [0x78, 0x56, 0x34, 0x12, 0xbc, 0x9a, 0xf0, 0xde, 1, 2, 3, 4, 5, 6, 7, 8],
        2,
    )
}

pub fn library_config(cache_dir: &Path) -> LibraryConfig
{
    LibraryConfig {
        cache_directory: Some(cache_dir.join("symbols")),
        debug_info_store: cache_dir.join(".debuginfo"),
        symbol_servers: vec!["https://symbolserver.unity3d.com/".to_string()],
    }
}

/// Fixed module list
#[derive(Default)]
pub struct StaticModules
{
    pub modules: Arc<Mutex<Vec<ModuleInfo>>>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticModules
{
    pub fn new(modules: Vec<ModuleInfo>) -> Self
    {
        Self {
            modules: Arc::new(Mutex::new(modules)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ModuleEnumerator for StaticModules
{
    fn loaded_modules(&self) -> Result<Vec<ModuleInfo>, OsError>
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.modules.lock().unwrap().clone())
    }
}

/// Export table with call counting; names map to module-relative offsets
#[derive(Default)]
pub struct CountingExports
{
    pub exports: HashMap<String, u64>,
    pub calls: Arc<AtomicUsize>,
}

impl CountingExports
{
    pub fn new(exports: &[(&str, u64)]) -> Self
    {
        Self {
            exports: exports.iter().map(|(name, offset)| ((*name).to_string(), *offset)).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ExportTable for CountingExports
{
    fn export_address(&self, module: &ModuleInfo, name: &str) -> Result<Address, OsError>
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.exports.get(name) {
            Some(offset) => Ok(module.base + *offset),
            None => Err(OsError::new(ERROR_PROC_NOT_FOUND)),
        }
    }
}

/// What the scripted provider observed
#[derive(Default)]
pub struct ProviderStats
{
    pub initializations: AtomicUsize,
    pub cleanups: AtomicUsize,
    pub loads: AtomicUsize,
    pub enumerations: AtomicUsize,
    pub search_paths: Mutex<Vec<String>>,
}

impl ProviderStats
{
    pub fn loads(&self) -> usize
    {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn enumerations(&self) -> usize
    {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn search_paths(&self) -> Vec<String>
    {
        self.search_paths.lock().unwrap().clone()
    }
}

/// Debug-info provider replaying a fixed symbol list
///
/// The signature is always reported. Full debug info is only reported for
/// sessions whose search path is non-empty, like a real symbol handler that
/// needs the search path to find the symbol file.
pub struct ScriptedProvider
{
    pub signature: Option<BuildSignature>,
    pub source: SymbolSource,
    pub symbols: Vec<(SymbolKind, String, i64)>,
    pub fail_initialize: Option<i32>,
    pub fail_load: Option<i32>,
    /// Enumeration reports this many symbols, then fails
    pub fail_enumeration_after: Option<usize>,
    pub stats: Arc<ProviderStats>,
    active: Option<(Address, String)>,
    sink: Option<EventSink>,
}

impl ScriptedProvider
{
    pub fn new(symbols: &[(SymbolKind, &str, i64)]) -> Self
    {
        Self {
            signature: Some(signature()),
            source: SymbolSource::Full,
            symbols: symbols
                .iter()
                .map(|(kind, name, offset)| (*kind, (*name).to_string(), *offset))
                .collect(),
            fail_initialize: None,
            fail_load: None,
            fail_enumeration_after: None,
            stats: Arc::new(ProviderStats::default()),
            active: None,
            sink: None,
        }
    }

    fn emit(&mut self, event: ProviderEvent<'_>)
    {
        if let Some(sink) = self.sink.as_mut() {
            sink(event);
        }
    }
}

impl DebugInfoProvider for ScriptedProvider
{
    fn initialize(&mut self, base: Address, search_path: &str) -> Result<(), OsError>
    {
        assert!(self.active.is_none(), "session opened while another is active");
        self.stats.initializations.fetch_add(1, Ordering::SeqCst);
        self.stats.search_paths.lock().unwrap().push(search_path.to_string());
        if let Some(code) = self.fail_initialize {
            return Err(OsError::new(code));
        }
        self.active = Some((base, search_path.to_string()));
        Ok(())
    }

    fn cleanup(&mut self, base: Address)
    {
        if self.active.as_ref().is_some_and(|(active, _)| *active == base) {
            self.stats.cleanups.fetch_add(1, Ordering::SeqCst);
            self.active = None;
            self.sink = None;
        }
    }

    fn register_callback(&mut self, _base: Address, sink: EventSink) -> Result<(), OsError>
    {
        self.sink = Some(sink);
        Ok(())
    }

    fn load_debug_info(&mut self, base: Address, _module: &ModuleInfo) -> Result<Address, OsError>
    {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        self.emit(ProviderEvent::LoadStarted);
        self.emit(ProviderEvent::Diagnostic("SYMSRV:  looking for foo.pdb\r\n"));
        if let Some(code) = self.fail_load {
            self.emit(ProviderEvent::LoadFailed);
            return Err(OsError::new(code));
        }
        self.emit(ProviderEvent::LoadSucceeded);
        Ok(base)
    }

    fn query_module_info(&mut self, _base: Address) -> Result<ModuleDebugInfo, OsError>
    {
        let searching = self.active.as_ref().is_some_and(|(_, path)| !path.is_empty());
        Ok(ModuleDebugInfo {
            signature: self.signature,
            source: if searching { self.source } else { SymbolSource::Exports },
            symbol_file: None,
        })
    }

    fn enumerate_symbols(
        &mut self,
        base: Address,
        filter: &str,
        visitor: &mut dyn FnMut(&ProviderSymbol<'_>) -> bool,
    ) -> Result<(), OsError>
    {
        assert_eq!(filter, "*");
        self.stats.enumerations.fetch_add(1, Ordering::SeqCst);
        for (index, (kind, name, offset)) in self.symbols.iter().enumerate() {
            if self.fail_enumeration_after == Some(index) {
                return Err(OsError::new(ERROR_FILE_NOT_FOUND));
            }
            let symbol = ProviderSymbol {
                kind: *kind,
                name: name.as_str(),
                address: base.with_offset(*offset),
            };
            if !visitor(&symbol) {
                break;
            }
        }
        Ok(())
    }
}

/// Host built from fakes, with handles to their counters
pub struct FakeHost
{
    pub host: Host,
    pub export_calls: Arc<AtomicUsize>,
    pub module_calls: Arc<AtomicUsize>,
    pub modules: Arc<Mutex<Vec<ModuleInfo>>>,
    pub provider: Arc<ProviderStats>,
}

impl FakeHost
{
    pub fn new(exports: CountingExports, provider: ScriptedProvider) -> Self
    {
        Self::with_modules(vec![module()], exports, provider)
    }

    pub fn with_modules(modules: Vec<ModuleInfo>, exports: CountingExports, provider: ScriptedProvider) -> Self
    {
        let modules = StaticModules::new(modules);
        let export_calls = Arc::clone(&exports.calls);
        let module_calls = Arc::clone(&modules.calls);
        let module_list = Arc::clone(&modules.modules);
        let stats = Arc::clone(&provider.stats);
        Self {
            host: Host::new(modules, exports, provider),
            export_calls,
            module_calls,
            modules: module_list,
            provider: stats,
        }
    }

    pub fn export_calls(&self) -> usize
    {
        self.export_calls.load(Ordering::SeqCst)
    }

    pub fn module_calls(&self) -> usize
    {
        self.module_calls.load(Ordering::SeqCst)
    }
}

/// Standard fixture: export `Bar` at +0x1000, a few debug-info symbols.
pub fn standard_host() -> FakeHost
{
    FakeHost::new(
        CountingExports::new(&[("Bar", 0x1000), ("mono_get_root_domain", 0x2040)]),
        ScriptedProvider::new(&[
            (SymbolKind::Function, "PlayerLoop", 0x0052_3410),
            (SymbolKind::PublicSymbol, "?PlayerLoop@@YAXXZ", 0x0052_3410),
            (SymbolKind::Data, "gMainThreadId", 0x00f0_0010),
            (SymbolKind::Label, "loop_head", 0x0052_3500),
        ]),
    )
}
