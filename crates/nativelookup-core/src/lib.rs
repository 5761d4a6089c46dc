//! # nativelookup-core
//!
//! Runtime symbol resolution for native modules loaded in the current process.
//!
//! This crate resolves named symbols (exported functions and debug-info
//! symbols) inside a module that is already mapped into the process, without
//! access to that module's source. Resolved offsets are persisted to a small
//! on-disk cache keyed by the module's build signature, so later runs skip the
//! expensive debug-info work entirely.
//!
//! ## Layers
//!
//! - [`host`]: the three capabilities the engine consumes (module enumeration,
//!   export lookup, debug-info provider). The engine never calls the OS itself.
//! - [`symbols`]: the symbol table, the persistent offset cache, the export
//!   resolver and the lazy debug-info loader.
//! - [`library`]: [`NativeLibrary`], the orchestrator clients talk to.
//! - [`registry`]: [`ModuleRegistry`], one live handle per loaded module.
//! - [`function`]: [`NativeFunction`], a typed callable bound to an offset.
//! - [`platform`]: default capability implementations (Linux, macOS, and an
//!   object-file debug-info provider).
//!
//! ## Example
//!
//! ```rust,no_run
//! use nativelookup_core::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ModuleRegistry::new(Host::native()?, LookupConfig::from_env());
//! if let Some(libc) = registry.find_by_name("libc.so.6")? {
//!     let puts = libc.native_function::<unsafe extern "C" fn(*const std::os::raw::c_char) -> i32>("puts");
//!     println!("puts resolved: {}", puts.is_some());
//! }
//! # Ok(())
//! # }
//! ```

#![allow(unsafe_code)] // Required for dynamic loader FFI and function pointer materialization

pub mod config;
pub mod error;
pub mod function;
pub mod host;
pub mod library;
pub mod platform;
pub mod prelude;
pub mod registry;
pub mod symbols;
pub mod types;

pub use config::{LibraryConfig, LookupConfig};
pub use error::{LookupError, LookupResult, OsError};
pub use function::{FunctionPointer, NativeFunction, NativeLibraryExt};
pub use host::Host;
pub use library::NativeLibrary;
pub use registry::ModuleRegistry;
pub use types::{Address, BuildSignature, ModuleIdentity, ModuleInfo, SymbolKind};
