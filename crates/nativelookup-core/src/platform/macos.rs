//! Module enumeration on macOS.

use std::ffi::{CStr, OsStr};
use std::os::raw::{c_char, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::error::OsError;
use crate::host::ModuleEnumerator;
use crate::types::{Address, ModuleInfo};

// dyld image list, see dyld(3)
extern "C" {
    fn _dyld_image_count() -> u32;
    fn _dyld_get_image_header(image_index: u32) -> *const c_void;
    fn _dyld_get_image_name(image_index: u32) -> *const c_char;
}

/// Loaded images as reported by dyld
///
/// The base of an image is the address of its Mach-O header. dyld does not
/// report image sizes, so `size` is 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeModules;

impl ModuleEnumerator for NativeModules
{
    fn loaded_modules(&self) -> Result<Vec<ModuleInfo>, OsError>
    {
        // SAFETY: dyld keeps header and name pointers valid while the image is
        // loaded; indices past the end return null, which is skipped.
        let modules = unsafe {
            (0.._dyld_image_count())
                .filter_map(|index| {
                    let header = _dyld_get_image_header(index);
                    let name = _dyld_get_image_name(index);
                    if header.is_null() || name.is_null() {
                        return None;
                    }
                    let path = PathBuf::from(OsStr::from_bytes(CStr::from_ptr(name).to_bytes()));
                    let file_name = path.file_name()?.to_string_lossy().into_owned();
                    Some(ModuleInfo::new(file_name, path, Address::from(header as usize), 0))
                })
                .collect()
        };
        Ok(modules)
    }
}
