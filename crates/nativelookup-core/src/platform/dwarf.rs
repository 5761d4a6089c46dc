//! DWARF symbol walking.
//!
//! Reports the DWARF entries that have a fixed address in the image:
//!
//! - `DW_TAG_subprogram` with a `DW_AT_low_pc` → [`SymbolKind::Function`]
//! - `DW_TAG_label` with a `DW_AT_low_pc` → [`SymbolKind::Label`]
//! - `DW_TAG_variable` located by a lone `DW_OP_addr` → [`SymbolKind::Data`]
//!
//! Names come from `DW_AT_linkage_name` when it is a Rust-mangled name and
//! from `DW_AT_name` otherwise, following `DW_AT_specification` and
//! `DW_AT_abstract_origin` one level for out-of-line definitions.

use gimli::{constants, AttributeValue, DebuggingInformationEntry, Operation, Reader, Unit};

use super::image::{OwnedDwarf, OwnedReader};
use crate::symbols::demangle::demangle;
use crate::types::SymbolKind;

/// Walk every unit, handing `(kind, name, link-time address)` to `visit`
/// until it returns `false`.
pub(crate) fn visit_symbols(
    dwarf: &OwnedDwarf,
    visit: &mut dyn FnMut(SymbolKind, &str, u64) -> bool,
) -> gimli::Result<()>
{
    let mut headers = dwarf.units();
    while let Some(header) = headers.next()? {
        let unit = dwarf.unit(header)?;
        let mut cursor = unit.entries();
        while let Some((_delta, entry)) = cursor.next_dfs()? {
            let (kind, address) = match entry.tag() {
                constants::DW_TAG_subprogram => (SymbolKind::Function, low_pc(dwarf, &unit, entry)?),
                constants::DW_TAG_label => (SymbolKind::Label, low_pc(dwarf, &unit, entry)?),
                constants::DW_TAG_variable => (SymbolKind::Data, static_address(dwarf, &unit, entry)?),
                _ => continue,
            };
            let Some(address) = address.filter(|address| *address != 0) else {
                continue;
            };
            let Some(name) = symbol_name(dwarf, &unit, entry)? else {
                continue;
            };
            if !visit(kind, &name, address) {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn low_pc(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
) -> gimli::Result<Option<u64>>
{
    match entry.attr(constants::DW_AT_low_pc)? {
        Some(attr) => dwarf.attr_address(unit, attr.value()),
        None => Ok(None),
    }
}

/// Address of a variable whose location is a single `DW_OP_addr`/`DW_OP_addrx`.
///
/// Thread-locals and stack variables have longer expressions and are skipped.
fn static_address(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
) -> gimli::Result<Option<u64>>
{
    let Some(attr) = entry.attr(constants::DW_AT_location)? else {
        return Ok(None);
    };
    let AttributeValue::Exprloc(expression) = attr.value() else {
        return Ok(None);
    };

    let mut operations = expression.operations(unit.encoding());
    let address = match operations.next()? {
        Some(Operation::Address { address }) => address,
        Some(Operation::AddressIndex { index }) => dwarf.address(unit, index)?,
        _ => return Ok(None),
    };
    if operations.next()?.is_some() {
        return Ok(None);
    }
    Ok(Some(address))
}

fn symbol_name(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
) -> gimli::Result<Option<String>>
{
    if let Some(name) = own_name(dwarf, unit, entry)? {
        return Ok(Some(name));
    }
    for reference in [constants::DW_AT_specification, constants::DW_AT_abstract_origin] {
        if let Some(attr) = entry.attr(reference)? {
            if let AttributeValue::UnitRef(offset) = attr.value() {
                let target = unit.entry(offset)?;
                return own_name(dwarf, unit, &target);
            }
        }
    }
    Ok(None)
}

fn own_name(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
) -> gimli::Result<Option<String>>
{
    let linkage = match entry.attr(constants::DW_AT_linkage_name)? {
        Some(attr) => Some(attr_to_string(dwarf, unit, attr.value())?),
        None => None,
    };
    if let Some(readable) = linkage.as_deref().and_then(demangle) {
        return Ok(Some(readable));
    }
    if let Some(attr) = entry.attr(constants::DW_AT_name)? {
        return Ok(Some(attr_to_string(dwarf, unit, attr.value())?));
    }
    Ok(linkage)
}

fn attr_to_string(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    value: AttributeValue<OwnedReader>,
) -> gimli::Result<String>
{
    let reader = dwarf.attr_string(unit, value)?;
    Ok(reader.to_string_lossy()?.into_owned())
}
