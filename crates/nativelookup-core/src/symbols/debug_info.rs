//! # Debug Info Loading
//!
//! Drives a [`DebugInfoProvider`](crate::host::DebugInfoProvider) session to
//! derive a module's build identity and to populate its full symbol table.
//!
//! ## Sessions
//!
//! Both operations open a [`ProviderSession`](crate::host::ProviderSession),
//! which serializes access to the provider and cleans the session up when it
//! goes out of scope:
//!
//! - **Identity derivation**: empty search path (the image and nothing else),
//!   load, query the signature.
//! - **Acquisition**: full search path (downstream store, then every symbol
//!   server), event sink, load, query, enumerate with the catch-all filter.
//!
//! ## Search Path Syntax
//!
//! ```text
//! cache*<downstream store>;srv*<server 1>;srv*<server 2>
//! ```
//!
//! Server entries containing a space or `*` cannot be expressed in this syntax
//! and are dropped.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::SymbolTable;
use crate::error::OsError;
use crate::host::{EventSink, ProviderEvent, ProviderHandle, SymbolSource};
use crate::types::{BuildSignature, ModuleInfo};

/// Filter handed to the provider for full enumeration.
pub const ALL_SYMBOLS: &str = "*";

/// Ordered list of places a provider may find debug info in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath
{
    store: PathBuf,
    servers: Vec<String>,
}

impl SearchPath
{
    /// Search `store` first, then each usable server in order.
    pub fn new(store: impl Into<PathBuf>, servers: &[String]) -> Self
    {
        let servers = servers
            .iter()
            .filter(|server| {
                let usable = is_usable_server(server);
                if !usable {
                    debug!(server = server.as_str(), "dropping symbol server with unsupported characters");
                }
                usable
            })
            .cloned()
            .collect();

        Self {
            store: store.into(),
            servers,
        }
    }

    /// Downstream store
    pub fn store(&self) -> &Path
    {
        &self.store
    }

    /// Servers that survived filtering
    pub fn servers(&self) -> &[String]
    {
        &self.servers
    }

    /// The path as structured entries.
    pub fn entries(&self) -> Vec<SearchPathEntry>
    {
        std::iter::once(SearchPathEntry::Cache(self.store.clone()))
            .chain(self.servers.iter().cloned().map(SearchPathEntry::Server))
            .collect()
    }
}

impl fmt::Display for SearchPath
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "cache*{}", self.store.display())?;
        for server in &self.servers {
            write!(f, ";srv*{server}")?;
        }
        Ok(())
    }
}

/// Whether a server URL can be expressed in search path syntax.
pub fn is_usable_server(server: &str) -> bool
{
    !server.is_empty() && !server.contains([' ', '*'])
}

/// One element of a provider search path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPathEntry
{
    /// `cache*<dir>`: downstream store, searched first and filled from servers
    Cache(PathBuf),
    /// `srv*<url>`: symbol server
    Server(String),
    /// Bare directory searched as-is
    Directory(PathBuf),
}

impl SearchPathEntry
{
    /// Split a search path string back into entries
    ///
    /// Providers use this to interpret the string they are initialized with.
    /// A `srv*` element with several `*`-separated parts (`srv*<cache>*<url>`)
    /// is reported as its last part.
    pub fn parse_list(search_path: &str) -> Vec<SearchPathEntry>
    {
        search_path
            .split(';')
            .map(str::trim)
            .filter(|element| !element.is_empty())
            .map(|element| {
                if let Some(dir) = element.strip_prefix("cache*") {
                    SearchPathEntry::Cache(PathBuf::from(dir))
                } else if let Some(rest) = element.strip_prefix("srv*") {
                    let target = rest.rsplit('*').next().unwrap_or(rest);
                    SearchPathEntry::Server(target.to_string())
                } else {
                    SearchPathEntry::Directory(PathBuf::from(element))
                }
            })
            .collect()
    }
}

/// Debug-info lifecycle of one library
///
/// `Failed` is terminal: once an acquisition attempt fails it is never
/// retried for the lifetime of the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugInfoState
{
    #[default]
    Unloaded,
    Loaded,
    Failed,
}

impl fmt::Display for DebugInfoState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            DebugInfoState::Unloaded => "unloaded",
            DebugInfoState::Loaded => "loaded",
            DebugInfoState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Outcome of [`DebugInfoLoader::acquire`]
#[derive(Debug)]
pub enum Acquisition
{
    /// Full debug info was loaded and enumerated
    Loaded
    {
        table: SymbolTable,
        /// Set when enumeration stopped part way; `table` holds what was seen
        error: Option<OsError>,
    },
    /// No full debug info could be loaded
    Unavailable
    {
        /// Capability failure, if one caused this
        error: Option<OsError>,
        /// What the provider did manage to load
        source: SymbolSource,
    },
}

/// Debug-info operations for one module
pub struct DebugInfoLoader<'a>
{
    handle: &'a ProviderHandle,
    module: &'a ModuleInfo,
}

impl<'a> DebugInfoLoader<'a>
{
    pub fn new(handle: &'a ProviderHandle, module: &'a ModuleInfo) -> Self
    {
        Self { handle, module }
    }

    /// Read the module's build signature from the image alone
    ///
    /// `Ok(None)` means the image carries no signature.
    ///
    /// ## Errors
    ///
    /// Returns the first capability error.
    pub fn derive_signature(&self) -> Result<Option<BuildSignature>, OsError>
    {
        let mut session = self.handle.open(self.module.base, "")?;
        session.load(self.module)?;
        let info = session.query()?;
        debug!(
            module = %self.module.name,
            signature = ?info.signature.map(|signature| signature.to_string()),
            "derived build signature"
        );
        Ok(info.signature)
    }

    /// Load full debug info through `search_path` and enumerate every symbol.
    pub fn acquire(&self, search_path: &SearchPath) -> Acquisition
    {
        let unavailable = |error: OsError| Acquisition::Unavailable {
            error: Some(error),
            source: SymbolSource::None,
        };
        let path = search_path.to_string();
        debug!(module = %self.module.name, search_path = %path, "acquiring debug info");

        let mut session = match self.handle.open(self.module.base, &path) {
            Ok(session) => session,
            Err(err) => return unavailable(err),
        };
        if let Err(err) = session.register_callback(event_sink(self.module.name.clone())) {
            return unavailable(err);
        }
        if let Err(err) = session.load(self.module) {
            return unavailable(err);
        }
        let info = match session.query() {
            Ok(info) => info,
            Err(err) => return unavailable(err),
        };
        if info.source != SymbolSource::Full {
            debug!(module = %self.module.name, source = %info.source, "no full debug info");
            return Acquisition::Unavailable {
                error: None,
                source: info.source,
            };
        }

        let base = self.module.base;
        let mut table = SymbolTable::new();
        let result = session.enumerate(ALL_SYMBOLS, &mut |symbol| {
            table.insert(symbol.kind, symbol.name, symbol.address.offset_from(base));
            true
        });
        if let Err(err) = &result {
            warn!(module = %self.module.name, symbols = table.len(), "symbol enumeration stopped early: {err}");
        } else {
            debug!(module = %self.module.name, symbols = table.len(), "enumerated symbols");
        }

        Acquisition::Loaded {
            table,
            error: result.err(),
        }
    }
}

/// Event sink forwarding provider chatter to the log.
fn event_sink(module: String) -> EventSink
{
    Box::new(move |event: ProviderEvent<'_>| match event {
        ProviderEvent::Diagnostic(text) => {
            let text = strip_control(text);
            if !text.is_empty() {
                debug!(module = %module, "{text}");
            }
        }
        ProviderEvent::LoadStarted => info!(module = %module, "loading debug info"),
        ProviderEvent::LoadSucceeded => info!(module = %module, "debug info loaded"),
        ProviderEvent::LoadFailed => warn!(module = %module, "debug info load failed"),
    })
}

/// Remove control characters (providers end lines with `\r\n`, `\b` etc).
fn strip_control(text: &str) -> String
{
    text.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}
