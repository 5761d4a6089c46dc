//! # Host Capabilities
//!
//! The interfaces the lookup engine consumes from its environment.
//!
//! The engine never talks to the OS directly. Everything platform-specific
//! sits behind three capabilities:
//!
//! - [`ModuleEnumerator`]: which native modules are loaded, and where
//! - [`ExportTable`]: absolute address of a name in a module's export table
//! - [`DebugInfoProvider`]: a single-session debug-info loader (the DbgHelp
//!   `Sym*` family on Windows, an object-file reader elsewhere)
//!
//! [`Host`] bundles one of each. [`Host::native`] wires up the implementations
//! in [`crate::platform`]; tests wire up fakes.
//!
//! ## Provider sessions
//!
//! A debug-info provider can only hold one module session at a time.
//! [`ProviderHandle`] owns the provider behind a mutex and hands out
//! [`ProviderSession`] guards: the lock is held for the whole
//! initialize → load → query → enumerate sequence and `cleanup` runs when the
//! guard drops, on every exit path.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{LookupResult, OsError};
use crate::types::{Address, BuildSignature, ModuleInfo, SymbolKind};

/// Lists the native modules loaded in the current process
pub trait ModuleEnumerator: Send + Sync
{
    /// Snapshot of the loaded modules, in loader order.
    ///
    /// ## Errors
    ///
    /// Returns the platform error if the module list cannot be read.
    fn loaded_modules(&self) -> Result<Vec<ModuleInfo>, OsError>;
}

/// Looks names up in a module's export table
pub trait ExportTable: Send + Sync
{
    /// Absolute address of `name` exported by `module`.
    ///
    /// ## Errors
    ///
    /// Returns the platform error (e.g. `ERROR_PROC_NOT_FOUND`) when the
    /// module does not export `name`.
    fn export_address(&self, module: &ModuleInfo, name: &str) -> Result<Address, OsError>;
}

/// Event raised by a provider while it loads debug info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent<'a>
{
    /// Free-form diagnostic line (symbol server chatter, search attempts)
    Diagnostic(&'a str),
    /// Loading of debug info started
    LoadStarted,
    /// Debug info was loaded
    LoadSucceeded,
    /// Debug info could not be loaded
    LoadFailed,
}

/// Callback receiving provider events for one session.
pub type EventSink = Box<dyn FnMut(ProviderEvent<'_>) + Send>;

/// What kind of symbol information a provider managed to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolSource
{
    /// Nothing loaded
    #[default]
    None,
    /// Only the export/dynamic symbol table
    Exports,
    /// Full debug info (PDB, DWARF or a complete symbol table)
    Full,
}

impl fmt::Display for SymbolSource
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolSource::None => "none",
            SymbolSource::Exports => "exports",
            SymbolSource::Full => "full debug info",
        };
        f.write_str(label)
    }
}

/// Module descriptor returned by [`DebugInfoProvider::query_module_info`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDebugInfo
{
    /// Build signature, if the image carries one
    pub signature: Option<BuildSignature>,
    /// Kind of symbol information currently loaded
    pub source: SymbolSource,
    /// File the symbols were loaded from, if any
    pub symbol_file: Option<PathBuf>,
}

/// One symbol reported during enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSymbol<'a>
{
    pub kind: SymbolKind,
    pub name: &'a str,
    /// Absolute in-process address
    pub address: Address,
}

/// Single-session debug-info loader
///
/// Every method is keyed by the module base address, which doubles as the
/// session identifier. Callers go through [`ProviderHandle`], which makes sure
/// only one session exists at a time.
pub trait DebugInfoProvider: Send
{
    /// Start a session using `search_path` (`cache*<dir>;srv*<url>;...`).
    ///
    /// An empty search path restricts loading to the image itself.
    ///
    /// ## Errors
    ///
    /// Returns the platform error if the session cannot be created.
    fn initialize(&mut self, base: Address, search_path: &str) -> Result<(), OsError>;

    /// Tear the session down. Must tolerate sessions that were never initialized.
    fn cleanup(&mut self, base: Address);

    /// Route provider events for this session to `sink`.
    ///
    /// ## Errors
    ///
    /// Returns the platform error if the callback cannot be registered.
    fn register_callback(&mut self, base: Address, sink: EventSink) -> Result<(), OsError>;

    /// Load debug info for `module`; returns the base the symbols were loaded at.
    ///
    /// ## Errors
    ///
    /// Returns the platform error if no image or symbol file could be loaded.
    fn load_debug_info(&mut self, base: Address, module: &ModuleInfo) -> Result<Address, OsError>;

    /// Describe what was loaded.
    ///
    /// ## Errors
    ///
    /// Returns the platform error if nothing is loaded for `base`.
    fn query_module_info(&mut self, base: Address) -> Result<ModuleDebugInfo, OsError>;

    /// Report every symbol whose name matches `filter` (`*` matches all).
    ///
    /// The visitor returns `false` to stop early.
    ///
    /// ## Errors
    ///
    /// Returns the platform error if enumeration fails part way; symbols
    /// already handed to the visitor stay valid.
    fn enumerate_symbols(
        &mut self,
        base: Address,
        filter: &str,
        visitor: &mut dyn FnMut(&ProviderSymbol<'_>) -> bool,
    ) -> Result<(), OsError>;
}

/// Shared, serialized access to a [`DebugInfoProvider`]
#[derive(Clone)]
pub struct ProviderHandle
{
    inner: Arc<Mutex<Box<dyn DebugInfoProvider>>>,
}

impl ProviderHandle
{
    pub fn new(provider: impl DebugInfoProvider + 'static) -> Self
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(provider))),
        }
    }

    /// Open a session for the module at `base`
    ///
    /// Blocks until no other session is open. Any leftover session for the
    /// same base is cleaned up first.
    ///
    /// ## Errors
    ///
    /// Returns the provider's error if initialization fails; the lock is
    /// released before returning.
    pub fn open(&self, base: Address, search_path: &str) -> Result<ProviderSession<'_>, OsError>
    {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.cleanup(base);
        guard.initialize(base, search_path)?;
        Ok(ProviderSession { guard, base })
    }
}

impl fmt::Debug for ProviderHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ProviderHandle").finish_non_exhaustive()
    }
}

/// An open provider session; cleaned up on drop
pub struct ProviderSession<'a>
{
    guard: MutexGuard<'a, Box<dyn DebugInfoProvider>>,
    base: Address,
}

impl ProviderSession<'_>
{
    /// Session key (module base address).
    pub fn base(&self) -> Address
    {
        self.base
    }

    /// ## Errors
    ///
    /// See [`DebugInfoProvider::register_callback`].
    pub fn register_callback(&mut self, sink: EventSink) -> Result<(), OsError>
    {
        self.guard.register_callback(self.base, sink)
    }

    /// ## Errors
    ///
    /// See [`DebugInfoProvider::load_debug_info`].
    pub fn load(&mut self, module: &ModuleInfo) -> Result<Address, OsError>
    {
        self.guard.load_debug_info(self.base, module)
    }

    /// ## Errors
    ///
    /// See [`DebugInfoProvider::query_module_info`].
    pub fn query(&mut self) -> Result<ModuleDebugInfo, OsError>
    {
        self.guard.query_module_info(self.base)
    }

    /// ## Errors
    ///
    /// See [`DebugInfoProvider::enumerate_symbols`].
    pub fn enumerate(
        &mut self,
        filter: &str,
        visitor: &mut dyn FnMut(&ProviderSymbol<'_>) -> bool,
    ) -> Result<(), OsError>
    {
        self.guard.enumerate_symbols(self.base, filter, visitor)
    }
}

impl Drop for ProviderSession<'_>
{
    fn drop(&mut self)
    {
        self.guard.cleanup(self.base);
    }
}

/// The three capabilities the engine runs against
#[derive(Clone)]
pub struct Host
{
    pub modules: Arc<dyn ModuleEnumerator>,
    pub exports: Arc<dyn ExportTable>,
    pub debug_info: ProviderHandle,
}

impl Host
{
    pub fn new(
        modules: impl ModuleEnumerator + 'static,
        exports: impl ExportTable + 'static,
        debug_info: impl DebugInfoProvider + 'static,
    ) -> Self
    {
        Self {
            modules: Arc::new(modules),
            exports: Arc::new(exports),
            debug_info: ProviderHandle::new(debug_info),
        }
    }

    /// Capabilities backed by the current platform's loader
    ///
    /// ## Errors
    ///
    /// Returns `InvalidArgument` on platforms without a native backend; such
    /// hosts must assemble a [`Host`] from their own capabilities.
    pub fn native() -> LookupResult<Self>
    {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            Ok(Self::new(
                crate::platform::NativeModules,
                crate::platform::DlsymExports,
                crate::platform::ObjectDebugInfoProvider::new(),
            ))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(crate::error::LookupError::InvalidArgument(format!(
                "no native host backend for {}",
                std::env::consts::OS
            )))
        }
    }
}

impl fmt::Debug for Host
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
