//! # Native Library
//!
//! [`NativeLibrary`] is the handle clients resolve symbols through. There is
//! one per loaded module per process (see [`ModuleRegistry`]).
//!
//! ## Lookup Tiers
//!
//! 1. The in-memory [`SymbolCache`], filled from disk when the library is
//!    opened. A recorded absence answers `None` without any further work.
//! 2. For [`SymbolKind::Export`], the host's export table.
//! 3. For every other kind, the full [`SymbolTable`], built from debug info
//!    the first time it is needed.
//!
//! Every answer produced by tier 2 or 3 is recorded, absences included, and
//! the cache file is rewritten immediately.
//!
//! ## Debug Info Policy
//!
//! Debug info is acquired on the first non-export miss, or right away when
//! the symbol server list changes while nothing has been tried yet. A failed
//! acquisition is never retried for the lifetime of the library.
//!
//! A module without usable debug info still answers export lookups. Misses
//! for other kinds are recorded as absent and persisted like any other miss,
//! so later runs answer them without trying again.
//!
//! [`ModuleRegistry`]: crate::registry::ModuleRegistry

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::config::LibraryConfig;
use crate::error::{LookupError, LookupResult};
use crate::host::Host;
use crate::symbols::{
    Acquisition, CachedOffset, DebugInfoLoader, DebugInfoState, ExportResolver, SearchPath, SymbolCache, SymbolTable,
};
use crate::types::{Address, ModuleIdentity, ModuleInfo, SymbolKind};

/// Symbol resolution for one loaded module
#[derive(Debug)]
pub struct NativeLibrary
{
    module: ModuleInfo,
    identity: Option<ModuleIdentity>,
    host: Host,
    state: Mutex<LibraryState>,
}

#[derive(Debug)]
struct LibraryState
{
    config: LibraryConfig,
    debug_info: DebugInfoState,
    cache: SymbolCache,
    table: Option<Arc<SymbolTable>>,
    last_error: Option<i32>,
}

impl NativeLibrary
{
    /// Open a library for an already-loaded module
    ///
    /// Derives the build identity from the image and loads the offset cache
    /// for that identity, if one exists. A module whose identity cannot be
    /// derived is still usable; its offsets are just not persisted.
    ///
    /// ## Errors
    ///
    /// Returns `ModuleInvalid` if the module has a null base address.
    pub fn open(module: ModuleInfo, host: Host, config: LibraryConfig) -> LookupResult<Self>
    {
        if module.base.is_null() {
            return Err(LookupError::ModuleInvalid { name: module.name });
        }

        let mut debug_info = DebugInfoState::Unloaded;
        let mut last_error = None;
        let identity = match DebugInfoLoader::new(&host.debug_info, &module).derive_signature() {
            Ok(Some(signature)) => Some(ModuleIdentity::new(module.name.clone(), signature)),
            Ok(None) => {
                warn!(module = %module.name, "image carries no build signature, offsets will not be persisted");
                None
            }
            Err(err) => {
                warn!(module = %module.name, "could not derive build signature: {err}");
                debug_info = DebugInfoState::Failed;
                last_error = Some(err.code);
                None
            }
        };

        let library = Self {
            module,
            identity,
            host,
            state: Mutex::new(LibraryState {
                config,
                debug_info,
                cache: SymbolCache::new(),
                table: None,
                last_error,
            }),
        };
        library.load_cache();

        debug!(
            module = %library.module.name,
            base = %library.module.base,
            identity = ?library.identity.as_ref().map(ToString::to_string),
            "opened native library"
        );
        Ok(library)
    }

    /// Module this library resolves symbols in.
    pub fn module(&self) -> &ModuleInfo
    {
        &self.module
    }

    /// Module file name.
    pub fn name(&self) -> &str
    {
        &self.module.name
    }

    /// Load address of the module.
    pub fn base_address(&self) -> Address
    {
        self.module.base
    }

    /// Build identity, if the image carries a signature.
    pub fn identity(&self) -> Option<&ModuleIdentity>
    {
        self.identity.as_ref()
    }

    /// Platform error code of the most recent failed capability call.
    pub fn last_error(&self) -> Option<i32>
    {
        self.state().last_error
    }

    /// Where debug-info acquisition stands.
    pub fn debug_info_state(&self) -> DebugInfoState
    {
        self.state().debug_info
    }

    /// Whether full debug info has been loaded.
    pub fn has_debug_info(&self) -> bool
    {
        self.debug_info_state() == DebugInfoState::Loaded
    }

    /// Current per-library configuration.
    pub fn config(&self) -> LibraryConfig
    {
        self.state().config.clone()
    }

    /// `<cache dir>/<file>.<signature>.tsv`, when persistence is possible.
    pub fn cache_file_path(&self) -> Option<PathBuf>
    {
        self.cache_path(&self.state())
    }

    /// Search path an acquisition would use right now.
    pub fn search_path(&self) -> SearchPath
    {
        let state = self.state();
        SearchPath::new(&state.config.debug_info_store, &state.config.symbol_servers)
    }

    /// Copy of the in-memory offset cache.
    pub fn cache_snapshot(&self) -> SymbolCache
    {
        self.state().cache.clone()
    }

    /// Move the offset cache to `directory` (`None` disables persistence)
    ///
    /// Entries already on disk in the new location are merged in; entries
    /// known in memory win. The merged cache is written back.
    pub fn set_cache_directory(&self, directory: Option<PathBuf>)
    {
        let mut state = self.state();
        state.config.cache_directory = directory;
        if let Some(path) = self.cache_path(&state) {
            let added = state.cache.merge(SymbolCache::load_or_default(&path));
            debug!(module = %self.module.name, path = %path.display(), added, "cache directory changed");
            self.persist(&state);
        }
    }

    /// Replace the symbol servers used by future acquisitions
    ///
    /// If the usable servers differ from before and debug info has not been
    /// tried yet, it is acquired right away against the new list. An
    /// acquisition that already failed is not retried.
    pub fn set_symbol_servers(&self, servers: Vec<String>)
    {
        let mut state = self.state();
        let before = SearchPath::new(&state.config.debug_info_store, &state.config.symbol_servers);
        let after = SearchPath::new(&state.config.debug_info_store, &servers);
        state.config.symbol_servers = servers;

        if before.servers() == after.servers() || state.debug_info != DebugInfoState::Unloaded {
            return;
        }
        debug!(module = %self.module.name, search_path = %after, "symbol servers changed, acquiring debug info");
        self.ensure_table(&mut state);
    }

    /// Merge the cache file for this identity into memory.
    ///
    /// Returns the number of entries added. Unreadable or corrupt files are
    /// logged and count as empty.
    pub fn load_cache(&self) -> usize
    {
        let mut state = self.state();
        match self.cache_path(&state) {
            Some(path) => state.cache.merge(SymbolCache::load_or_default(&path)),
            None => 0,
        }
    }

    /// Write the cache file now
    ///
    /// Lookups already write through; this is for callers that want to see
    /// the error.
    ///
    /// ## Errors
    ///
    /// Returns `CacheIo` if the file cannot be written.
    pub fn flush(&self) -> LookupResult<()>
    {
        let state = self.state();
        match self.cache_path(&state) {
            Some(path) => state.cache.store(&path),
            None => Ok(()),
        }
    }

    /// Offset of the exported `name` relative to the module base
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// # use nativelookup_core::prelude::*;
    /// # fn demo(library: &NativeLibrary) {
    /// if let Some(offset) = library.exported_function_offset("mono_get_root_domain") {
    ///     println!("exported at +{offset:#x}");
    /// }
    /// # }
    /// ```
    pub fn exported_function_offset(&self, name: &str) -> Option<i64>
    {
        let mut state = self.state();
        if let Some(hit) = state.cache.get(SymbolKind::Export, name) {
            return hit.offset();
        }

        let value = match ExportResolver::new(self.host.exports.as_ref(), &self.module).resolve(name) {
            Ok(offset) => CachedOffset::from_raw(offset),
            Err(err) => {
                debug!(module = %self.module.name, symbol = name, "export not found: {err}");
                state.last_error = Some(err.code);
                CachedOffset::Absent
            }
        };
        state.cache.insert(SymbolKind::Export, name, value);
        self.persist(&state);
        value.offset()
    }

    /// Offset of `name` of kind `kind` relative to the module base
    ///
    /// Exports go through the export table; every other kind through debug
    /// info, which is acquired on the first such miss.
    pub fn symbol_offset(&self, kind: SymbolKind, name: &str) -> Option<i64>
    {
        if kind == SymbolKind::Export {
            return self.exported_function_offset(name);
        }

        let mut state = self.state();
        if let Some(hit) = state.cache.get(kind, name) {
            return hit.offset();
        }

        let value = match self.ensure_table(&mut state) {
            Some(table) => table
                .get(kind, name)
                .map_or(CachedOffset::Absent, CachedOffset::from_raw),
            None => CachedOffset::Absent,
        };
        state.cache.insert(kind, name, value);
        self.persist(&state);
        value.offset()
    }

    /// Absolute in-process address of a symbol.
    pub fn symbol_address(&self, kind: SymbolKind, name: &str) -> Option<Address>
    {
        self.symbol_offset(kind, name)
            .map(|offset| self.module.base.with_offset(offset))
    }

    /// Acquire debug info now instead of on the first miss
    ///
    /// Returns whether full debug info is available afterwards.
    pub fn acquire_debug_info(&self) -> bool
    {
        let mut state = self.state();
        self.ensure_table(&mut state).is_some()
    }

    /// The full symbol table, building it if needed
    ///
    /// `None` when the module has no usable debug info.
    pub fn symbol_table(&self) -> Option<Arc<SymbolTable>>
    {
        let mut state = self.state();
        self.ensure_table(&mut state)
    }

    /// Drop the in-memory symbol table
    ///
    /// The next lookup rebuilds it from the downstream store without going
    /// back to the symbol servers. Handles returned by
    /// [`symbol_table`](Self::symbol_table) stay valid.
    pub fn release_symbol_table(&self)
    {
        if self.state().table.take().is_some() {
            debug!(module = %self.module.name, "released symbol table");
        }
    }

    fn state(&self) -> MutexGuard<'_, LibraryState>
    {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_path(&self, state: &LibraryState) -> Option<PathBuf>
    {
        let directory = state.config.cache_directory()?;
        let identity = self.identity.as_ref()?;
        Some(directory.join(identity.cache_file_name()))
    }

    /// Write-through after a recorded lookup. A file that cannot be written is
    /// removed so a stale copy is never read back.
    fn persist(&self, state: &LibraryState)
    {
        let Some(path) = self.cache_path(state) else {
            return;
        };
        if let Err(err) = state.cache.store(&path) {
            error!(module = %self.module.name, "Exception while writing cache: {err}");
            if let Err(remove) = fs::remove_file(&path) {
                debug!(path = %path.display(), "could not remove cache file: {remove}");
            }
        }
    }

    fn ensure_table(&self, state: &mut LibraryState) -> Option<Arc<SymbolTable>>
    {
        if let Some(table) = &state.table {
            return Some(Arc::clone(table));
        }

        let search_path = match state.debug_info {
            DebugInfoState::Failed => return None,
            DebugInfoState::Unloaded => SearchPath::new(&state.config.debug_info_store, &state.config.symbol_servers),
            DebugInfoState::Loaded => SearchPath::new(&state.config.debug_info_store, &[]),
        };

        match DebugInfoLoader::new(&self.host.debug_info, &self.module).acquire(&search_path) {
            Acquisition::Loaded { table, error } => {
                if let Some(err) = error {
                    error!(module = %self.module.name, "last error {}: {err}", err.code);
                    state.last_error = Some(err.code);
                }
                info!(module = %self.module.name, symbols = table.len(), "symbol table ready");
                let table = Arc::new(table);
                state.debug_info = DebugInfoState::Loaded;
                state.table = Some(Arc::clone(&table));
                Some(table)
            }
            Acquisition::Unavailable { error, source } => {
                if let Some(err) = &error {
                    state.last_error = Some(err.code);
                }
                warn!(
                    module = %self.module.name,
                    loaded = %source,
                    error = ?error.map(|err| err.to_string()),
                    "debug info unavailable, only exports can be resolved"
                );
                state.debug_info = DebugInfoState::Failed;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::error::OsError;
    use crate::host::{DebugInfoProvider, EventSink, ExportTable, ModuleDebugInfo, ModuleEnumerator, ProviderSymbol};

    struct NoModules;

    impl ModuleEnumerator for NoModules
    {
        fn loaded_modules(&self) -> Result<Vec<ModuleInfo>, OsError>
        {
            Ok(Vec::new())
        }
    }

    struct NoExports;

    impl ExportTable for NoExports
    {
        fn export_address(&self, _module: &ModuleInfo, _name: &str) -> Result<Address, OsError>
        {
            Err(OsError::new(127))
        }
    }

    struct BrokenProvider;

    impl DebugInfoProvider for BrokenProvider
    {
        fn initialize(&mut self, _base: Address, _search_path: &str) -> Result<(), OsError>
        {
            Err(OsError::new(87))
        }

        fn cleanup(&mut self, _base: Address) {}

        fn register_callback(&mut self, _base: Address, _sink: EventSink) -> Result<(), OsError>
        {
            Ok(())
        }

        fn load_debug_info(&mut self, base: Address, _module: &ModuleInfo) -> Result<Address, OsError>
        {
            Ok(base)
        }

        fn query_module_info(&mut self, _base: Address) -> Result<ModuleDebugInfo, OsError>
        {
            Ok(ModuleDebugInfo::default())
        }

        fn enumerate_symbols(
            &mut self,
            _base: Address,
            _filter: &str,
            _visitor: &mut dyn FnMut(&ProviderSymbol<'_>) -> bool,
        ) -> Result<(), OsError>
        {
            Ok(())
        }
    }

    fn host() -> Host
    {
        Host::new(NoModules, NoExports, BrokenProvider)
    }

    #[test]
    fn test_null_base_is_invalid()
    {
        let module = ModuleInfo::new("gone.so", "/gone.so", Address::ZERO, 0);
        let result = NativeLibrary::open(module, host(), LibraryConfig::default());
        assert!(matches!(result, Err(LookupError::ModuleInvalid { name }) if name == "gone.so"));
    }

    #[test]
    fn test_signature_failure_degrades()
    {
        let module = ModuleInfo::new("foo.so", "/foo.so", Address::new(0x1000_0000), 0x1000);
        let library = NativeLibrary::open(module, host(), LibraryConfig::default()).unwrap();

        assert_eq!(library.identity(), None);
        assert_eq!(library.last_error(), Some(87));
        assert_eq!(library.debug_info_state(), DebugInfoState::Failed);
        assert_eq!(library.cache_file_path(), None);
        assert_eq!(library.symbol_offset(SymbolKind::Function, "main"), None);
        assert_eq!(
            library.cache_snapshot().get(SymbolKind::Function, "main"),
            Some(CachedOffset::Absent)
        );

        assert_eq!(library.exported_function_offset("Bar"), None);
        assert_eq!(library.last_error(), Some(127));
    }
}
