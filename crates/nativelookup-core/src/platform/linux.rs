//! Module enumeration on Linux.

use std::ffi::{CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use libc::{c_int, c_void, dl_phdr_info, size_t, PT_LOAD};

use crate::error::OsError;
use crate::host::ModuleEnumerator;
use crate::types::{Address, ModuleInfo};

/// Loaded modules as reported by `dl_iterate_phdr`
///
/// The base of a module is its load bias plus the lowest `PT_LOAD` address,
/// i.e. where its first byte is mapped. The main program is reported under
/// the path of the current executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeModules;

impl ModuleEnumerator for NativeModules
{
    fn loaded_modules(&self) -> Result<Vec<ModuleInfo>, OsError>
    {
        let mut modules: Vec<ModuleInfo> = Vec::new();
        // SAFETY: the callback only runs during this call and is the only
        // user of the pointer to `modules`.
        unsafe {
            libc::dl_iterate_phdr(Some(collect_module), (&mut modules as *mut Vec<ModuleInfo>).cast());
        }
        Ok(modules)
    }
}

unsafe extern "C" fn collect_module(info: *mut dl_phdr_info, _size: size_t, data: *mut c_void) -> c_int
{
    let modules = &mut *data.cast::<Vec<ModuleInfo>>();
    let info = &*info;

    let headers = if info.dlpi_phdr.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum))
    };
    let mut low = u64::MAX;
    let mut high = 0_u64;
    for header in headers.iter().filter(|header| header.p_type == PT_LOAD) {
        let start = header.p_vaddr as u64;
        low = low.min(start);
        high = high.max(start.saturating_add(header.p_memsz as u64));
    }
    if low >= high {
        return 0;
    }

    let mut path = if info.dlpi_name.is_null() {
        PathBuf::new()
    } else {
        PathBuf::from(OsStr::from_bytes(CStr::from_ptr(info.dlpi_name).to_bytes()))
    };
    if path.as_os_str().is_empty() {
        match std::env::current_exe() {
            Ok(exe) => path = exe,
            Err(_) => return 0,
        }
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let base = (info.dlpi_addr as u64).wrapping_add(low);
    modules.push(ModuleInfo::new(name, path, Address::new(base), high - low));
    0
}
