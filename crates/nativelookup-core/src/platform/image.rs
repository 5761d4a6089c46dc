//! Object file parsing for the debug-info provider.
//!
//! An [`ObjectImage`] is a module image or a detached debug file read fully
//! into memory. It knows the file's build signature, its preferred load
//! address, which symbol tables it carries, and how to hand its DWARF
//! sections to `gimli`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{BinaryFormat, Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind as ObjectSymbolKind};
use once_cell::sync::OnceCell;

use super::dwarf;
use crate::error::OsError;
use crate::symbols::demangle::{display_name, strip_macho_prefix};
use crate::types::{BuildSignature, SymbolKind};

pub(crate) type OwnedReader = EndianArcSlice<RunTimeEndian>;
pub(crate) type OwnedDwarf = Dwarf<OwnedReader>;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
];

/// Map a parse failure to the provider's error shape.
pub(crate) fn invalid_image(path: &Path, detail: impl std::fmt::Display) -> OsError
{
    OsError::with_message(libc::EINVAL, format!("{}: {detail}", path.display()))
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> Result<Option<Arc<[u8]>>, object::Error>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section.uncompressed_data()?;
            if data.is_empty() {
                continue;
            }
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }
    Ok(None)
}

/// A parsed module image or debug file
pub(crate) struct ObjectImage
{
    path: PathBuf,
    data: Arc<[u8]>,
    format: BinaryFormat,
    endian: RunTimeEndian,
    file_base: u64,
    signature: Option<BuildSignature>,
    build_id: Option<Vec<u8>>,
    has_symtab: bool,
    has_exports: bool,
    debug_sections: HashMap<&'static str, Arc<[u8]>>,
    dwarf_cache: OnceCell<OwnedDwarf>,
}

impl ObjectImage
{
    pub(crate) fn open(path: &Path) -> Result<Self, OsError>
    {
        let bytes = fs::read(path).map_err(|err| {
            OsError::with_message(
                err.raw_os_error().unwrap_or(libc::ENOENT),
                format!("{}: {err}", path.display()),
            )
        })?;
        Self::parse(path.to_path_buf(), Arc::from(bytes))
    }

    pub(crate) fn parse(path: PathBuf, data: Arc<[u8]>) -> Result<Self, OsError>
    {
        let file = object::File::parse(&*data).map_err(|err| invalid_image(&path, err))?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let build_id = file
            .build_id()
            .ok()
            .flatten()
            .map(<[u8]>::to_vec)
            .or_else(|| file.mach_uuid().ok().flatten().map(|uuid| uuid.to_vec()));
        let signature = match file.pdb_info() {
            Ok(Some(info)) => Some(BuildSignature::new(info.guid(), info.age())),
            _ => build_id.as_deref().map(BuildSignature::from_build_id),
        };

        let has_symtab = file.symbol_table().is_some();
        let has_exports = file.dynamic_symbol_table().is_some()
            || file.exports().map(|exports| !exports.is_empty()).unwrap_or(false);

        let mut debug_sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            if let Some(bytes) = load_section_bytes(&file, aliases).map_err(|err| invalid_image(&path, err))? {
                debug_sections.insert(*canonical, bytes);
            }
        }

        let file_base = preferred_base(&file);
        let format = file.format();

        Ok(Self {
            path,
            data,
            format,
            endian,
            file_base,
            signature,
            build_id,
            has_symtab,
            has_exports,
            debug_sections,
            dwarf_cache: OnceCell::new(),
        })
    }

    pub(crate) fn path(&self) -> &Path
    {
        &self.path
    }

    /// Link-time address the module base corresponds to.
    pub(crate) fn file_base(&self) -> u64
    {
        self.file_base
    }

    pub(crate) fn signature(&self) -> Option<BuildSignature>
    {
        self.signature
    }

    /// Raw GNU build id or Mach-O UUID.
    pub(crate) fn build_id(&self) -> Option<&[u8]>
    {
        self.build_id.as_deref()
    }

    pub(crate) fn has_dwarf(&self) -> bool
    {
        self.debug_sections.contains_key(".debug_info")
    }

    /// Carries a full symbol table or DWARF.
    pub(crate) fn is_full(&self) -> bool
    {
        self.has_symtab || self.has_dwarf()
    }

    pub(crate) fn has_exports(&self) -> bool
    {
        self.has_exports
    }

    fn dwarf(&self) -> Result<&OwnedDwarf, gimli::Error>
    {
        self.dwarf_cache
            .get_or_try_init(|| Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section))))
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let key = match id {
            SectionId::DebugAbbrev => ".debug_abbrev",
            SectionId::DebugAddr => ".debug_addr",
            SectionId::DebugInfo => ".debug_info",
            SectionId::DebugLine => ".debug_line",
            SectionId::DebugLineStr => ".debug_line_str",
            SectionId::DebugRanges => ".debug_ranges",
            SectionId::DebugRngLists => ".debug_rnglists",
            SectionId::DebugStr => ".debug_str",
            SectionId::DebugStrOffsets => ".debug_str_offsets",
            SectionId::DebugLoc => ".debug_loc",
            SectionId::DebugLocLists => ".debug_loclists",
            _ => "",
        };

        let data = self
            .debug_sections
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }

    /// Report every defined symbol with its link-time address
    ///
    /// Symbol table entries come first (raw name as `PublicSymbol`, readable
    /// name as `Function` or `Data`), then DWARF. The visitor returns `false`
    /// to stop.
    pub(crate) fn visit_symbols(&self, visit: &mut dyn FnMut(SymbolKind, &str, u64) -> bool) -> Result<(), OsError>
    {
        let file = object::File::parse(&*self.data).map_err(|err| invalid_image(&self.path, err))?;

        for symbol in file.symbols() {
            if !symbol.is_definition() || symbol.address() == 0 {
                continue;
            }
            let Ok(raw) = symbol.name() else {
                continue;
            };
            let raw = if self.format == BinaryFormat::MachO {
                strip_macho_prefix(raw)
            } else {
                raw
            };
            if raw.is_empty() {
                continue;
            }

            let address = symbol.address();
            if !visit(SymbolKind::PublicSymbol, raw, address) {
                return Ok(());
            }
            let kind = match symbol.kind() {
                ObjectSymbolKind::Text => SymbolKind::Function,
                ObjectSymbolKind::Data | ObjectSymbolKind::Tls => SymbolKind::Data,
                _ => continue,
            };
            if !visit(kind, &display_name(raw), address) {
                return Ok(());
            }
        }

        if self.has_dwarf() {
            let dwarf = self.dwarf().map_err(|err| invalid_image(&self.path, err))?;
            dwarf::visit_symbols(dwarf, visit).map_err(|err| invalid_image(&self.path, err))?;
        }
        Ok(())
    }
}

/// Address the image expects to be loaded at
///
/// PE: the image base. Mach-O: the `__TEXT` segment. ELF: the lowest
/// loadable segment, matching how the loader reports module bases.
fn preferred_base(file: &object::File<'_>) -> u64
{
    match file.format() {
        BinaryFormat::Pe => file.relative_address_base(),
        BinaryFormat::MachO => file
            .segments()
            .find(|segment| matches!(segment.name(), Ok(Some("__TEXT"))))
            .map(|segment| segment.address())
            .unwrap_or(0),
        _ => file
            .segments()
            .map(|segment| segment.address())
            .min()
            .unwrap_or(0),
    }
}
