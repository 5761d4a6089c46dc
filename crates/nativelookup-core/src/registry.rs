//! # Module Registry
//!
//! Finds or creates the single [`NativeLibrary`] for a loaded module.
//!
//! The registry only holds weak references: a library lives as long as some
//! client (or a [`NativeFunction`](crate::function::NativeFunction)) keeps an
//! `Arc` to it. Entries are keyed by file name and base address, so a module
//! that was unloaded and mapped again gets a fresh library.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::config::LookupConfig;
use crate::error::LookupResult;
use crate::host::Host;
use crate::library::NativeLibrary;
use crate::types::{ModuleInfo, ModuleKey};

/// Process-wide index of live [`NativeLibrary`] handles
#[derive(Debug)]
pub struct ModuleRegistry
{
    host: Host,
    config: LookupConfig,
    known: Mutex<HashMap<ModuleKey, Known>>,
}

#[derive(Debug)]
struct Known
{
    module: ModuleInfo,
    library: Weak<NativeLibrary>,
}

impl ModuleRegistry
{
    pub fn new(host: Host, config: LookupConfig) -> Self
    {
        Self {
            host,
            config,
            known: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Host
    {
        &self.host
    }

    pub fn config(&self) -> &LookupConfig
    {
        &self.config
    }

    /// Library for the first loaded module matching `predicate`
    ///
    /// Live handles found earlier are checked before the loader's module
    /// list is read. `Ok(None)` means no loaded module matched.
    ///
    /// ## Errors
    ///
    /// - `OsCall` if the module list cannot be read
    /// - `ModuleInvalid` if the matching module has no base address
    pub fn find<P>(&self, predicate: P) -> LookupResult<Option<Arc<NativeLibrary>>>
    where
        P: Fn(&ModuleInfo) -> bool,
    {
        let mut known = self.known();

        let live = known
            .values()
            .filter(|entry| predicate(&entry.module))
            .find_map(|entry| entry.library.upgrade());
        if let Some(library) = live {
            return Ok(Some(library));
        }

        let modules = self.host.modules.loaded_modules()?;
        let Some(module) = modules.into_iter().find(|module| predicate(module)) else {
            return Ok(None);
        };

        let key = module.key();
        if let Some(library) = known.get(&key).and_then(|entry| entry.library.upgrade()) {
            return Ok(Some(library));
        }

        let library = Arc::new(NativeLibrary::open(
            module.clone(),
            self.host.clone(),
            self.config.library_config(),
        )?);
        debug!(module = %key, "registered native library");
        known.insert(
            key,
            Known {
                module,
                library: Arc::downgrade(&library),
            },
        );
        Ok(Some(library))
    }

    /// Library for the module whose file name equals `name`, ignoring ASCII case
    ///
    /// ## Errors
    ///
    /// See [`find`](Self::find).
    pub fn find_by_name(&self, name: &str) -> LookupResult<Option<Arc<NativeLibrary>>>
    {
        self.find(|module| module.name.eq_ignore_ascii_case(name))
    }

    /// Drop entries whose library is gone or whose module is no longer loaded
    ///
    /// Returns the number of entries removed.
    ///
    /// ## Errors
    ///
    /// Returns `OsCall` if the module list cannot be read.
    pub fn prune(&self) -> LookupResult<usize>
    {
        let loaded: Vec<ModuleKey> = self
            .host
            .modules
            .loaded_modules()?
            .iter()
            .map(ModuleInfo::key)
            .collect();

        let mut known = self.known();
        let before = known.len();
        known.retain(|key, entry| entry.library.strong_count() > 0 && loaded.contains(key));
        let removed = before - known.len();
        if removed > 0 {
            debug!(removed, "pruned module registry");
        }
        Ok(removed)
    }

    /// Live libraries currently registered.
    pub fn libraries(&self) -> Vec<Arc<NativeLibrary>>
    {
        self.known()
            .values()
            .filter_map(|entry| entry.library.upgrade())
            .collect()
    }

    fn known(&self) -> MutexGuard<'_, HashMap<ModuleKey, Known>>
    {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
