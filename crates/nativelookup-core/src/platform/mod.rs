//! # Platform-Specific Implementations
//!
//! Default host capabilities for the platforms this crate supports out of the
//! box:
//!
//! - **Linux**: modules from `dl_iterate_phdr`, exports from `dlsym`
//!   - See: [dl_iterate_phdr(3)](https://man7.org/linux/man-pages/man3/dl_iterate_phdr.3.html)
//! - **macOS**: modules from the dyld image list, exports from `dlsym`
//!   - See: [dyld(3)](https://developer.apple.com/library/archive/documentation/System/Conceptual/ManPages_iPhoneOS/man3/dyld.3.html)
//! - **Any platform**: [`ObjectDebugInfoProvider`], which reads symbol tables
//!   and DWARF from the module image or a detached debug file
//!
//! Windows hosts are expected to provide a DbgHelp-backed
//! [`DebugInfoProvider`](crate::host::DebugInfoProvider) and a
//! `GetProcAddress`-backed [`ExportTable`](crate::host::ExportTable) of their
//! own.

mod dwarf;
mod image;
pub mod object_provider;

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod dl;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub use dl::{load_library, DlsymExports};
#[cfg(target_os = "linux")]
pub use linux::NativeModules;
#[cfg(target_os = "macos")]
pub use macos::NativeModules;
pub use object_provider::ObjectDebugInfoProvider;
