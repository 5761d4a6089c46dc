//! # Native Functions
//!
//! Typed callables bound to a resolved symbol.
//!
//! A [`NativeFunction`] pairs a library with a module-relative offset and a
//! function pointer type. Binding never fails and never touches memory; the
//! pointer is only materialized when [`NativeFunction::callable`] is first
//! called, and the result is memoized.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::os::raw::c_char;
//!
//! use nativelookup_core::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ModuleRegistry::new(Host::native()?, LookupConfig::from_env());
//! let libc = registry.find_by_name("libc.so.6")?.ok_or("libc not loaded")?;
//!
//! type Puts = unsafe extern "C" fn(*const c_char) -> i32;
//! if let Some(puts) = libc.native_function::<Puts>("puts") {
//!     // SAFETY: `puts` has this signature and the string is NUL-terminated.
//!     unsafe { (puts.callable())(c"hello".as_ptr()) };
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::library::NativeLibrary;
use crate::types::{Address, SymbolKind};

/// Function pointer types a [`NativeFunction`] can materialize
///
/// ## Safety
///
/// Implementors must be plain pointer-sized function pointers, so that any
/// code address can be reinterpreted as `Self`.
pub unsafe trait FunctionPointer: Copy + Send + Sync + 'static
{
    /// Reinterpret a code address as this function pointer type.
    ///
    /// ## Safety
    ///
    /// `address` must point to a function with exactly this signature and
    /// calling convention, and must stay mapped while the pointer is used.
    unsafe fn from_address(address: usize) -> Self;
}

macro_rules! impl_function_pointer {
    ($($arg:ident),*) => {
        unsafe impl<R: 'static, $($arg: 'static),*> FunctionPointer for extern "C" fn($($arg),*) -> R
        {
            unsafe fn from_address(address: usize) -> Self
            {
                std::mem::transmute_copy::<usize, Self>(&address)
            }
        }

        unsafe impl<R: 'static, $($arg: 'static),*> FunctionPointer for unsafe extern "C" fn($($arg),*) -> R
        {
            unsafe fn from_address(address: usize) -> Self
            {
                std::mem::transmute_copy::<usize, Self>(&address)
            }
        }
    };
}

impl_function_pointer!();
impl_function_pointer!(A1);
impl_function_pointer!(A1, A2);
impl_function_pointer!(A1, A2, A3);
impl_function_pointer!(A1, A2, A3, A4);
impl_function_pointer!(A1, A2, A3, A4, A5);
impl_function_pointer!(A1, A2, A3, A4, A5, A6);
impl_function_pointer!(A1, A2, A3, A4, A5, A6, A7);
impl_function_pointer!(A1, A2, A3, A4, A5, A6, A7, A8);

/// A symbol of `library` typed as `F`
///
/// Holds its library alive, so the offset always refers to the same mapping.
pub struct NativeFunction<F: FunctionPointer>
{
    library: Arc<NativeLibrary>,
    name: String,
    offset: i64,
    callable: OnceCell<F>,
}

impl<F: FunctionPointer> NativeFunction<F>
{
    /// Bind `name` at `offset` in `library`. Never fails.
    pub fn bind(library: Arc<NativeLibrary>, name: impl Into<String>, offset: i64) -> Self
    {
        Self {
            library,
            name: name.into(),
            offset,
            callable: OnceCell::new(),
        }
    }

    pub fn library(&self) -> &Arc<NativeLibrary>
    {
        &self.library
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Offset relative to the module base.
    pub fn offset(&self) -> i64
    {
        self.offset
    }

    /// Absolute address: module base plus offset.
    pub fn address(&self) -> Address
    {
        self.library.base_address().with_offset(self.offset)
    }

    /// The typed function pointer, materialized on first use
    ///
    /// ## Safety
    ///
    /// `F` must match the native function's real signature and calling
    /// convention. Calling through a mismatched pointer is undefined behavior.
    pub unsafe fn callable(&self) -> F
    {
        // SAFETY: forwarded to the caller.
        *self
            .callable
            .get_or_init(|| unsafe { F::from_address(self.address().as_usize()) })
    }

    /// Whether [`callable`](Self::callable) has been called.
    pub fn is_materialized(&self) -> bool
    {
        self.callable.get().is_some()
    }
}

impl<F: FunctionPointer> fmt::Debug for NativeFunction<F>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("NativeFunction")
            .field("module", &self.library.name())
            .field("name", &self.name)
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Function lookups on a shared library handle
pub trait NativeLibraryExt
{
    /// Bind `name`, looking it up as an export first and as a public symbol
    /// second.
    fn native_function<F: FunctionPointer>(&self, name: &str) -> Option<NativeFunction<F>>;

    /// Bind `name` looked up as `kind` only.
    fn native_function_of_kind<F: FunctionPointer>(&self, kind: SymbolKind, name: &str) -> Option<NativeFunction<F>>;
}

impl NativeLibraryExt for Arc<NativeLibrary>
{
    fn native_function<F: FunctionPointer>(&self, name: &str) -> Option<NativeFunction<F>>
    {
        let offset = self
            .symbol_offset(SymbolKind::Export, name)
            .or_else(|| self.symbol_offset(SymbolKind::PublicSymbol, name))?;
        Some(NativeFunction::bind(Arc::clone(self), name, offset))
    }

    fn native_function_of_kind<F: FunctionPointer>(&self, kind: SymbolKind, name: &str) -> Option<NativeFunction<F>>
    {
        let offset = self.symbol_offset(kind, name)?;
        Some(NativeFunction::bind(Arc::clone(self), name, offset))
    }
}
