//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed memory address
///
/// This wrapper around `u64` keeps absolute in-process addresses apart from
/// module-relative offsets, which are plain `i64` values throughout the crate.
///
/// ## Example
///
/// ```rust
/// use nativelookup_core::types::Address;
///
/// let base = Address::from(0x1000_0000_u64);
/// let symbol = Address::from(0x1000_1000_u64);
/// assert_eq!(symbol.offset_from(base), 0x1000);
/// assert_eq!(base.with_offset(0x1000), symbol);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// A module reporting this as its base is unusable.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Signed distance from `base` to this address
    ///
    /// Computed in 64-bit two's complement, so modules mapped more than 4 GiB
    /// apart still produce exact offsets.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use nativelookup_core::types::Address;
    ///
    /// let base = Address::from(0x7f00_0000_0000_u64);
    /// assert_eq!(Address::from(0x7f00_0000_0010_u64).offset_from(base), 0x10);
    /// assert_eq!(Address::from(0x7eff_ffff_fff0_u64).offset_from(base), -0x10);
    /// ```
    #[allow(clippy::cast_possible_wrap)]
    pub const fn offset_from(self, base: Address) -> i64
    {
        self.0.wrapping_sub(base.0) as i64
    }

    /// Apply a signed module-relative offset to this (base) address.
    pub const fn with_offset(self, offset: i64) -> Self
    {
        Address(self.0.wrapping_add_signed(offset))
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ## Example
    ///
    /// ```rust
    /// use nativelookup_core::types::Address;
    ///
    /// let addr = Address::from(0x1000_u64);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100_u64)));
    /// assert_eq!(addr.checked_add(u64::MAX), None); // Overflow
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Convert to a raw pointer-sized integer for FFI.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize
    {
        self.0 as usize
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
