//! # Symbols
//!
//! Symbol tables, the persistent offset cache, and the two resolvers that
//! fill it.
//!
//! - [`SymbolTable`]: every symbol the debug info knows about, grouped by kind
//! - [`cache`]: the per-module offset cache and its `.tsv` file format
//! - [`debug_info`]: search paths, build identity derivation and lazy
//!   acquisition of the full symbol table
//! - [`exports`]: export-table resolution
//! - [`demangle`]: display helpers for mangled names

pub mod cache;
pub mod debug_info;
pub mod demangle;
pub mod exports;

use std::collections::HashMap;

pub use cache::{CachedOffset, SymbolCache};
pub use debug_info::{Acquisition, DebugInfoLoader, DebugInfoState, SearchPath, SearchPathEntry};
pub use exports::ExportResolver;

use crate::types::SymbolKind;

/// Full symbol table of one module: kind → name → module-relative offset
///
/// Built at most once per library from debug info. It can be dropped at any
/// time and rebuilt from the locally cached debug info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable
{
    kinds: HashMap<SymbolKind, HashMap<String, i64>>,
}

impl SymbolTable
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Record a symbol. A later record for the same kind and name wins.
    pub fn insert(&mut self, kind: SymbolKind, name: impl Into<String>, offset: i64)
    {
        self.kinds.entry(kind).or_default().insert(name.into(), offset);
    }

    /// Offset of `name` within `kind`.
    pub fn get(&self, kind: SymbolKind, name: &str) -> Option<i64>
    {
        self.kinds.get(&kind)?.get(name).copied()
    }

    /// All symbols of one kind.
    pub fn symbols_of(&self, kind: SymbolKind) -> Option<&HashMap<String, i64>>
    {
        self.kinds.get(&kind).filter(|symbols| !symbols.is_empty())
    }

    /// Kinds with at least one symbol, in id order.
    pub fn kinds(&self) -> Vec<SymbolKind>
    {
        let mut kinds: Vec<SymbolKind> = self
            .kinds
            .iter()
            .filter(|(_, symbols)| !symbols.is_empty())
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort_unstable();
        kinds
    }

    /// Iterate over `(kind, name, offset)` in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolKind, &str, i64)> + '_
    {
        self.kinds
            .iter()
            .flat_map(|(kind, symbols)| symbols.iter().map(move |(name, offset)| (*kind, name.as_str(), *offset)))
    }

    /// Total number of symbols across all kinds.
    pub fn len(&self) -> usize
    {
        self.kinds.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_insert_and_get()
    {
        let mut table = SymbolTable::new();
        table.insert(SymbolKind::Function, "PlayerLoop", 0x1234);
        table.insert(SymbolKind::PublicSymbol, "?PlayerLoop@@YAXXZ", 0x1234);

        assert_eq!(table.get(SymbolKind::Function, "PlayerLoop"), Some(0x1234));
        assert_eq!(table.get(SymbolKind::Data, "PlayerLoop"), None);
        assert_eq!(table.len(), 2);
        assert_eq!(table.kinds(), vec![SymbolKind::Function, SymbolKind::PublicSymbol]);
    }

    #[test]
    fn test_later_record_wins()
    {
        let mut table = SymbolTable::new();
        table.insert(SymbolKind::Function, "helper", 0x10);
        table.insert(SymbolKind::Function, "helper", 0x20);
        assert_eq!(table.get(SymbolKind::Function, "helper"), Some(0x20));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_table()
    {
        let table = SymbolTable::new();
        assert!(table.is_empty());
        assert!(table.kinds().is_empty());
        assert!(table.symbols_of(SymbolKind::Function).is_none());
    }
}
