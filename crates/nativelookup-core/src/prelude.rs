//! Common imports for library users

pub use crate::config::{LibraryConfig, LookupConfig};
pub use crate::error::{LookupError, LookupResult, OsError};
pub use crate::function::{FunctionPointer, NativeFunction, NativeLibraryExt};
pub use crate::host::Host;
pub use crate::library::NativeLibrary;
pub use crate::registry::ModuleRegistry;
pub use crate::symbols::{DebugInfoState, SymbolTable};
pub use crate::types::{Address, BuildSignature, ModuleIdentity, ModuleInfo, SymbolKind};
