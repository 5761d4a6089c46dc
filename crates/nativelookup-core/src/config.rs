//! # Configuration
//!
//! Process-wide lookup settings and the per-library configuration derived
//! from them.
//!
//! ## Environment Variables
//!
//! - `NATIVELOOKUP_CACHE_DIR`: Root directory for the offset cache and the
//!   downstream debug-info store (default: `~/.nativelookup`)
//! - `NATIVELOOKUP_SYMBOL_SERVERS`: `;`-separated symbol server URLs
//! - `NATIVELOOKUP_NO_PERSIST`: When set to anything but `0`/`false`, offsets
//!   are not written to disk

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

const CACHE_DIR_ENV: &str = "NATIVELOOKUP_CACHE_DIR";
const SERVERS_ENV: &str = "NATIVELOOKUP_SYMBOL_SERVERS";
const NO_PERSIST_ENV: &str = "NATIVELOOKUP_NO_PERSIST";

/// Process-wide lookup configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig
{
    /// Root of everything this crate writes to disk
    pub cache_root: PathBuf,
    /// Symbol servers handed to every new library, in priority order
    pub symbol_servers: Vec<String>,
    /// Whether resolved offsets are persisted
    pub persist: bool,
}

impl LookupConfig
{
    /// Configuration rooted at `cache_root`, no servers, persistence on.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self
    {
        Self {
            cache_root: cache_root.into(),
            symbol_servers: Vec::new(),
            persist: true,
        }
    }

    /// Read configuration from the environment
    ///
    /// Falls back to `~/.nativelookup`, or to `<tmp>/nativelookup` when no home
    /// directory is available.
    pub fn from_env() -> Self
    {
        let cache_root = env::var_os(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".nativelookup")))
            .unwrap_or_else(|| env::temp_dir().join("nativelookup"));

        let symbol_servers = env::var(SERVERS_ENV)
            .map(|value| parse_server_list(&value))
            .unwrap_or_default();

        let persist = env::var(NO_PERSIST_ENV)
            .map(|value| matches!(value.trim(), "" | "0" | "false"))
            .unwrap_or(true);

        Self {
            cache_root,
            symbol_servers,
            persist,
        }
    }

    /// Builder-style server override.
    #[must_use]
    pub fn with_symbol_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbol_servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Directory holding the `<module>.<signature>.tsv` offset caches.
    pub fn symbol_cache_dir(&self) -> PathBuf
    {
        self.cache_root.join("symbols")
    }

    /// Downstream store for debug info fetched from symbol servers (`cache*`).
    pub fn debug_info_store(&self) -> PathBuf
    {
        self.cache_root.join(".debuginfo")
    }

    /// Create the cache directories
    ///
    /// ## Errors
    ///
    /// Returns the underlying I/O error if a directory cannot be created.
    pub fn ensure_directories(&self) -> std::io::Result<()>
    {
        fs::create_dir_all(self.symbol_cache_dir())?;
        fs::create_dir_all(self.debug_info_store())?;
        debug!(root = %self.cache_root.display(), "cache directories ready");
        Ok(())
    }

    /// Configuration handed to a newly constructed library.
    pub fn library_config(&self) -> LibraryConfig
    {
        LibraryConfig {
            cache_directory: self.persist.then(|| self.symbol_cache_dir()),
            debug_info_store: self.debug_info_store(),
            symbol_servers: self.symbol_servers.clone(),
        }
    }
}

impl Default for LookupConfig
{
    fn default() -> Self
    {
        Self::from_env()
    }
}

/// Per-library configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryConfig
{
    /// Where the offset cache lives; `None` disables persistence
    pub cache_directory: Option<PathBuf>,
    /// Local downstream store used as the first search path entry
    pub debug_info_store: PathBuf,
    /// Remote sources, in priority order
    pub symbol_servers: Vec<String>,
}

impl LibraryConfig
{
    pub fn cache_directory(&self) -> Option<&Path>
    {
        self.cache_directory.as_deref()
    }
}

/// Split a `;`-separated server list, dropping empty entries.
pub fn parse_server_list(value: &str) -> Vec<String>
{
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}
