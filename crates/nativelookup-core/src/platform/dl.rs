//! Export lookup through the dynamic loader.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use libc::{c_void, RTLD_GLOBAL, RTLD_LAZY, RTLD_NOLOAD, RTLD_NOW};

use crate::error::OsError;
use crate::host::ExportTable;
use crate::types::{Address, ModuleInfo};

/// Export table backed by `dlopen(RTLD_NOLOAD)` + `dlsym`
///
/// The module is never loaded by a lookup; a module that is no longer mapped
/// fails with the loader's message. Addresses outside the module's mapping
/// (symbols `dlsym` found in a dependency) are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DlsymExports;

impl ExportTable for DlsymExports
{
    fn export_address(&self, module: &ModuleInfo, name: &str) -> Result<Address, OsError>
    {
        let symbol = CString::new(name)
            .map_err(|_| OsError::with_message(libc::EINVAL, format!("symbol name {name:?} contains NUL")))?;
        let handle = LoaderHandle::open(module)?;

        // SAFETY: `handle` is a live loader handle and `symbol` is NUL-terminated.
        let address = unsafe {
            libc::dlerror();
            libc::dlsym(handle.0, symbol.as_ptr())
        };
        if address.is_null() {
            let message = dl_error().unwrap_or_else(|| format!("{name} not found in {}", module.name));
            return Err(OsError::with_message(libc::ENOENT, message));
        }

        let address = Address::from(address as usize);
        if !module.contains(address) {
            return Err(OsError::with_message(
                libc::ENOENT,
                format!("{name} resolved to {address}, outside {}", module.name),
            ));
        }
        Ok(address)
    }
}

/// Map the shared library at `path` into the process for good
///
/// The loader reference is leaked: the library stays loaded until exit, so
/// offsets resolved against it remain valid.
///
/// ## Errors
///
/// Returns `EINVAL` for a path containing NUL and `ENOENT` with the loader's
/// message when `dlopen` fails.
pub fn load_library(path: &Path) -> Result<(), OsError>
{
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| OsError::with_message(libc::EINVAL, "library path contains NUL"))?;

    // SAFETY: the path is NUL-terminated. Running the library's initializers
    // is what the caller asked for.
    let handle = unsafe { libc::dlopen(c_path.as_ptr(), RTLD_NOW | RTLD_GLOBAL) };
    if handle.is_null() {
        let message = dl_error().unwrap_or_else(|| format!("cannot load {}", path.display()));
        return Err(OsError::with_message(libc::ENOENT, message));
    }
    tracing::debug!(path = %path.display(), "loaded shared library");
    Ok(())
}

/// Loader reference dropped with `dlclose`
struct LoaderHandle(*mut c_void);

impl LoaderHandle
{
    fn open(module: &ModuleInfo) -> Result<Self, OsError>
    {
        let is_main_program = std::env::current_exe().is_ok_and(|exe| exe == module.path);
        let path = if is_main_program {
            None
        } else {
            let bytes = module.path.as_os_str().as_bytes();
            Some(CString::new(bytes).map_err(|_| OsError::with_message(libc::EINVAL, "module path contains NUL"))?)
        };

        // SAFETY: the path is NUL-terminated; RTLD_NOLOAD never maps new code.
        let handle = unsafe {
            match &path {
                Some(path) => libc::dlopen(path.as_ptr(), RTLD_LAZY | RTLD_NOLOAD),
                None => libc::dlopen(ptr::null(), RTLD_LAZY),
            }
        };
        if handle.is_null() {
            let message = dl_error().unwrap_or_else(|| format!("{} is not loaded", module.name));
            return Err(OsError::with_message(libc::ENOENT, message));
        }
        Ok(Self(handle))
    }
}

impl Drop for LoaderHandle
{
    fn drop(&mut self)
    {
        // SAFETY: the handle came from a successful dlopen.
        unsafe {
            libc::dlclose(self.0);
        }
    }
}

fn dl_error() -> Option<String>
{
    // SAFETY: dlerror returns null or a NUL-terminated thread-local string.
    unsafe {
        let message = libc::dlerror();
        (!message.is_null()).then(|| CStr::from_ptr(message).to_string_lossy().into_owned())
    }
}
