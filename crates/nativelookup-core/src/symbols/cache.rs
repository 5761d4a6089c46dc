//! # Symbol Cache
//!
//! Per-module memo of every offset lookup, including the misses.
//!
//! The cache answers repeated lookups without touching the export table or
//! the debug info, and it is persisted to a tab-separated file keyed by the
//! module's build identity so the next process run starts warm.
//!
//! ## File Format
//!
//! One line per entry:
//!
//! ```text
//! <kind id>\t<symbol name>\t0x<offset, lowercase hex, at least 8 digits>
//! ```
//!
//! An offset of `0x00000000` records a confirmed absence. A file with any
//! malformed line is rejected as a whole.
//!
//! ## Usage
//!
//! ```rust
//! use nativelookup_core::symbols::{CachedOffset, SymbolCache};
//! use nativelookup_core::types::SymbolKind;
//!
//! let mut cache = SymbolCache::new();
//! cache.insert(SymbolKind::Export, "Bar", CachedOffset::from_raw(0x1000));
//! cache.insert(SymbolKind::Export, "Missing", CachedOffset::Absent);
//!
//! let text = cache.render();
//! assert_eq!(text, "39\tBar\t0x00001000\n39\tMissing\t0x00000000\n");
//! assert_eq!(SymbolCache::parse(&text).unwrap(), cache);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, error};

use crate::error::{LookupError, LookupResult};
use crate::types::SymbolKind;

/// A remembered lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedOffset
{
    /// The symbol lives at this module-relative offset
    Resolved(i64),
    /// The symbol was looked up and is not there
    Absent,
}

impl CachedOffset
{
    /// On-disk marker for [`CachedOffset::Absent`].
    pub const SENTINEL: i64 = 0;

    /// Interpret a raw offset; the sentinel maps to [`CachedOffset::Absent`].
    ///
    /// A symbol sitting exactly at the module base cannot be told apart from
    /// the sentinel once written, so it is treated as absent from the start.
    pub const fn from_raw(raw: i64) -> Self
    {
        if raw == Self::SENTINEL {
            CachedOffset::Absent
        } else {
            CachedOffset::Resolved(raw)
        }
    }

    /// Value written to disk.
    pub const fn raw(self) -> i64
    {
        match self {
            CachedOffset::Resolved(offset) => offset,
            CachedOffset::Absent => Self::SENTINEL,
        }
    }

    /// `Some(offset)` when resolved.
    pub const fn offset(self) -> Option<i64>
    {
        match self {
            CachedOffset::Resolved(offset) => Some(offset),
            CachedOffset::Absent => None,
        }
    }
}

/// Offset cache for one module: kind → name → [`CachedOffset`]
///
/// Ordered maps keep the rendered file stable between runs.
///
/// ## Thread Safety
///
/// The cache is not thread-safe. [`NativeLibrary`](crate::library::NativeLibrary)
/// keeps it behind its own mutex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolCache
{
    entries: BTreeMap<SymbolKind, BTreeMap<String, CachedOffset>>,
}

impl SymbolCache
{
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Remembered result for `(kind, name)`, or `None` if never looked up.
    pub fn get(&self, kind: SymbolKind, name: &str) -> Option<CachedOffset>
    {
        self.entries.get(&kind)?.get(name).copied()
    }

    pub fn insert(&mut self, kind: SymbolKind, name: impl Into<String>, value: CachedOffset)
    {
        self.entries.entry(kind).or_default().insert(name.into(), value);
    }

    /// Add every entry of `other` that this cache does not already know.
    ///
    /// Returns how many entries were added.
    pub fn merge(&mut self, other: SymbolCache) -> usize
    {
        let mut added = 0;
        for (kind, symbols) in other.entries {
            let slot = self.entries.entry(kind).or_default();
            for (name, value) in symbols {
                if !slot.contains_key(&name) {
                    slot.insert(name, value);
                    added += 1;
                }
            }
        }
        added
    }

    /// Iterate over `(kind, name, value)` in kind id, then name order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolKind, &str, CachedOffset)> + '_
    {
        self.entries
            .iter()
            .flat_map(|(kind, symbols)| symbols.iter().map(move |(name, value)| (*kind, name.as_str(), *value)))
    }

    pub fn len(&self) -> usize
    {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Parse the `.tsv` format
    ///
    /// ## Errors
    ///
    /// Returns `CacheFormat` for the first line with the wrong column count, a
    /// missing `0x` prefix, a non-hex offset, or an unknown kind id.
    pub fn parse(text: &str) -> LookupResult<Self>
    {
        let mut cache = SymbolCache::new();
        for (index, line) in text.lines().enumerate() {
            let number = index + 1;
            let line = line.strip_suffix('\r').unwrap_or(line);
            let invalid = |reason: &str| LookupError::CacheFormat {
                line: number,
                reason: reason.to_string(),
            };

            let columns: Vec<&str> = line.split('\t').collect();
            let [kind, name, offset] = columns.as_slice() else {
                return Err(invalid(&format!("expected 3 columns, found {}", columns.len())));
            };

            let kind = kind
                .parse::<u32>()
                .ok()
                .and_then(SymbolKind::from_id)
                .ok_or_else(|| invalid(&format!("unknown symbol kind '{kind}'")))?;

            let digits = offset
                .strip_prefix("0x")
                .ok_or_else(|| invalid("offset did not start with '0x'"))?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid(&format!("offset '{offset}' is not hexadecimal")));
            }
            let raw = u64::from_str_radix(digits, 16).map_err(|err| invalid(&format!("offset '{offset}': {err}")))?;

            #[allow(clippy::cast_possible_wrap)]
            cache.insert(kind, *name, CachedOffset::from_raw(raw as i64));
        }
        Ok(cache)
    }

    /// Render the `.tsv` format.
    ///
    /// Names containing tabs or line breaks would corrupt the file and are
    /// left out.
    pub fn render(&self) -> String
    {
        let mut out = String::new();
        for (kind, name, value) in self.iter() {
            if name.contains(['\t', '\n', '\r']) {
                debug!(symbol = name, "skipping unrepresentable symbol name");
                continue;
            }
            #[allow(clippy::cast_sign_loss)]
            let raw = value.raw() as u64;
            out.push_str(&format!("{}\t{}\t0x{:08x}\n", kind.id(), name, raw));
        }
        out
    }

    /// Read a cache file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// ## Errors
    ///
    /// - `CacheIo` if the file exists but cannot be read
    /// - `CacheFormat` if any line is malformed
    pub fn load(path: &Path) -> LookupResult<Option<Self>>
    {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LookupError::CacheIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&text).map(Some)
    }

    /// Read a cache file, treating every failure as an empty cache
    ///
    /// Failures are logged; a corrupt cache must never take the host down.
    pub fn load_or_default(path: &Path) -> Self
    {
        match Self::load(path) {
            Ok(Some(cache)) => {
                debug!(path = %path.display(), entries = cache.len(), "loaded symbol cache");
                cache
            }
            Ok(None) => Self::default(),
            Err(err) => {
                error!(path = %path.display(), "Exception while loading cache, it will be regenerated: {err}");
                Self::default()
            }
        }
    }

    /// Write the cache to `path`
    ///
    /// The content goes to a uniquely named temporary file in the same
    /// directory and is renamed over the target, so a crash mid-write leaves
    /// the previous file intact and concurrent writers never share a file.
    ///
    /// ## Errors
    ///
    /// Returns `CacheIo` if the directory, the temporary file or the rename fails.
    pub fn store(&self, path: &Path) -> LookupResult<()>
    {
        let wrap = |source: io::Error| LookupError::CacheIo {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(wrap)?;

        let mut staging = NamedTempFile::new_in(parent).map_err(wrap)?;
        staging.write_all(self.render().as_bytes()).map_err(wrap)?;
        staging.persist(path).map_err(|err| wrap(err.error))?;
        Ok(())
    }
}
