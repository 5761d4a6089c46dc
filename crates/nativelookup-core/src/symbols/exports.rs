//! Export-table resolution.

use tracing::trace;

use crate::error::OsError;
use crate::host::ExportTable;
use crate::types::ModuleInfo;

/// Resolves names through a module's export table
///
/// This is the cheap path: one loader call, no debug info, no disk access.
pub struct ExportResolver<'a>
{
    exports: &'a dyn ExportTable,
    module: &'a ModuleInfo,
}

impl<'a> ExportResolver<'a>
{
    pub fn new(exports: &'a dyn ExportTable, module: &'a ModuleInfo) -> Self
    {
        Self { exports, module }
    }

    /// Offset of the exported `name` relative to the module base
    ///
    /// ## Errors
    ///
    /// Returns the loader's error when `name` is not exported. A null
    /// address from a loader that does not report an error is treated the
    /// same way.
    pub fn resolve(&self, name: &str) -> Result<i64, OsError>
    {
        let address = self.exports.export_address(self.module, name)?;
        if address.is_null() {
            return Err(OsError::with_message(0, format!("{name} resolved to a null address")));
        }
        let offset = address.offset_from(self.module.base);
        trace!(module = %self.module.name, symbol = name, offset, "export resolved");
        Ok(offset)
    }
}
