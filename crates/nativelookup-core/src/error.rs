//! # Error Types
//!
//! Error handling for symbol lookup.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Most lookup operations never return these errors: a missing symbol is an
//! ordinary, cacheable outcome and is reported as `None`. Only library
//! construction aborts the call chain; disk and provider faults are logged and
//! degrade functionality instead of propagating.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Platform error reported by one of the host capabilities
///
/// Capabilities report failures as a raw platform error code (`errno` on
/// Unix, `GetLastError()` on Windows) plus an optional human-readable
/// message. The code is what [`NativeLibrary::last_error`] exposes to callers.
///
/// [`NativeLibrary::last_error`]: crate::library::NativeLibrary::last_error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsError
{
    /// Raw platform error code
    pub code: i32,
    /// Optional detail text (e.g. `dlerror()` output)
    pub message: Option<String>,
}

impl OsError
{
    /// Build an error from a bare platform code.
    pub fn new(code: i32) -> Self
    {
        Self { code, message: None }
    }

    /// Build an error carrying detail text.
    pub fn with_message(code: i32, message: impl Into<String>) -> Self
    {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for OsError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match &self.message {
            Some(message) => write!(f, "os error {}: {message}", self.code),
            None => write!(f, "os error {}", self.code),
        }
    }
}

impl std::error::Error for OsError {}

/// Main error type for lookup operations
///
/// ## Error Categories
///
/// 1. **Module errors**: ModuleNotFound, ModuleInvalid
/// 2. **Debug info errors**: DebugInfoUnavailable
/// 3. **Symbol errors**: SymbolNotFound
/// 4. **Cache errors**: CacheIo, CacheFormat
/// 5. **Platform errors**: OsCall
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum LookupError
{
    /// No loaded module matched the request
    ///
    /// The registry reports this as `Ok(None)`; the variant exists for callers
    /// that want to turn the absence into an error with `ok_or`.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// The matched module has no usable base address
    ///
    /// This happens when the module was unloaded between enumeration and
    /// construction, or when the platform reports a zero mapping.
    #[error("Module invalid: {name} has no valid base address")]
    ModuleInvalid
    {
        /// File name of the rejected module
        name: String,
    },

    /// No debug info could be loaded for the module
    #[error("Debug info unavailable for {module}")]
    DebugInfoUnavailable
    {
        /// File name of the module
        module: String,
        /// Platform error code of the failed attempt, if any
        code: Option<i32>,
    },

    /// Symbol confirmed absent
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Reading or writing the offset cache failed
    #[error("Cache I/O failed for {}: {source}", path.display())]
    CacheIo
    {
        /// Cache file involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The offset cache contains a structurally invalid line
    #[error("Invalid cache line {line}: {reason}")]
    CacheFormat
    {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// A host capability reported a platform error
    #[error("OS call failed: {0}")]
    OsCall(#[from] OsError),

    /// Invalid argument passed to a lookup function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LookupError
{
    /// Platform error code carried by this error, if any.
    pub fn os_code(&self) -> Option<i32>
    {
        match self {
            LookupError::OsCall(err) => Some(err.code),
            LookupError::DebugInfoUnavailable { code, .. } => *code,
            LookupError::CacheIo { source, .. } | LookupError::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Convenience type alias for `Result<T, LookupError>`
///
/// ```rust
/// use nativelookup_core::error::LookupResult;
/// fn foo() -> LookupResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type LookupResult<T> = std::result::Result<T, LookupError>;
