//! Symbol demangling utilities.
//!
//! Object-file symbol tables carry raw linker names. Enumeration reports
//! those raw names as [`SymbolKind::PublicSymbol`](crate::types::SymbolKind)
//! entries and the readable form as `Function`/`Data` entries, matching how a
//! PDB distinguishes public symbols from debug-info symbols.
//!
//! ## Symbol Mangling
//!
//! - **Rust**: legacy (`_ZN...E`) and v0 (`_R...`) schemes, demangled with
//!   `rustc-demangle`
//! - **C++**: Itanium `_Z...` names outside the Rust subset are left as-is
//! - **C**: unmangled
//!
//! Mach-O prefixes every C-level symbol with an underscore; the loader strips
//! it for `dlsym`, and [`strip_macho_prefix`] does the same here.

use rustc_demangle::try_demangle;

/// Readable name for `raw`, or `None` when it is not a Rust-mangled name.
///
/// The trailing hash of legacy Rust symbols is dropped (`{:#}` formatting).
pub fn demangle(raw: &str) -> Option<String>
{
    try_demangle(raw).ok().map(|demangled| format!("{demangled:#}"))
}

/// Name to index a symbol under for source-level lookups.
pub fn display_name(raw: &str) -> String
{
    demangle(raw).unwrap_or_else(|| raw.to_string())
}

/// Drop the leading underscore Mach-O adds to C-level names.
pub fn strip_macho_prefix(raw: &str) -> &str
{
    raw.strip_prefix('_').unwrap_or(raw)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_demangle_legacy_rust()
    {
        assert_eq!(
            demangle("_ZN4core3fmt5write17h0123456789abcdefE").as_deref(),
            Some("core::fmt::write")
        );
    }

    #[test]
    fn test_display_name_passes_c_names_through()
    {
        assert_eq!(display_name("puts"), "puts");
        assert_eq!(demangle("puts"), None);
    }

    #[test]
    fn test_strip_macho_prefix()
    {
        assert_eq!(strip_macho_prefix("_malloc"), "malloc");
        assert_eq!(strip_macho_prefix("malloc"), "malloc");
    }
}
