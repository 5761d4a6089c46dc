//! Loaded module and build identity types.

use std::fmt;
use std::path::{Path, PathBuf};

use super::Address;

/// A native module mapped into the current process
///
/// Produced by the host's module enumerator. `size` may be zero when the
/// platform does not report the mapping's extent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo
{
    /// File name as the loader reports it (e.g. `libc.so.6`, `UnityPlayer.dll`)
    pub name: String,
    /// Full path of the image on disk
    pub path: PathBuf,
    /// Lowest mapped address of the image
    pub base: Address,
    /// Span of the mapped image in bytes (0 if unknown)
    pub size: u64,
}

impl ModuleInfo
{
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, base: Address, size: u64) -> Self
    {
        Self {
            name: name.into(),
            path: path.into(),
            base,
            size,
        }
    }

    /// Registry key for this module.
    pub fn key(&self) -> ModuleKey
    {
        ModuleKey {
            name: self.name.clone(),
            base: self.base,
        }
    }

    /// Whether `address` falls inside the mapped image.
    ///
    /// Always true when the size is unknown.
    pub fn contains(&self, address: Address) -> bool
    {
        if self.size == 0 {
            return address >= self.base;
        }
        address >= self.base && address.value() - self.base.value() < self.size
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }
}

/// Stable key identifying one mapping of one module
///
/// The same file mapped at a different base (after an unload/reload) is a
/// different key, so a stale handle is never handed out for a new mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey
{
    pub name: String,
    pub base: Address,
}

impl fmt::Display for ModuleKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}@{}", self.name, self.base)
    }
}

/// Build signature: {GUID, age}
///
/// Uniquely identifies one build of one binary. For PE images this is the
/// CodeView record (GUID and age of the matching PDB). ELF build ids and
/// Mach-O UUIDs are folded into the same shape: first 16 bytes as the GUID,
/// age 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildSignature
{
    /// GUID bytes in their on-disk order
    pub guid: [u8; 16],
    pub age: u32,
}

impl BuildSignature
{
    pub const fn new(guid: [u8; 16], age: u32) -> Self
    {
        Self { guid, age }
    }

    /// Fold an arbitrary-length build id (ELF `NT_GNU_BUILD_ID`, Mach-O UUID)
    /// into a signature. Shorter ids are zero-padded.
    pub fn from_build_id(build_id: &[u8]) -> Self
    {
        let mut guid = [0_u8; 16];
        let len = build_id.len().min(16);
        guid[..len].copy_from_slice(&build_id[..len]);
        Self { guid, age: 0 }
    }

    /// The GUID as 32 uppercase hex digits in Microsoft field order.
    ///
    /// ```rust
    /// use nativelookup_core::types::BuildSignature;
    ///
    /// let sig = BuildSignature::new(
    ///     [0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
    ///     3,
    /// );
    /// assert_eq!(sig.guid_hex(), "00112233445566778899AABBCCDDEEFF");
    /// assert_eq!(sig.to_string(), "00112233445566778899AABBCCDDEEFF3");
    /// ```
    pub fn guid_hex(&self) -> String
    {
        let g = &self.guid;
        let data1 = u32::from_le_bytes([g[0], g[1], g[2], g[3]]);
        let data2 = u16::from_le_bytes([g[4], g[5]]);
        let data3 = u16::from_le_bytes([g[6], g[7]]);
        let mut out = format!("{data1:08X}{data2:04X}{data3:04X}");
        for byte in &g[8..] {
            out.push_str(&format!("{byte:02X}"));
        }
        out
    }
}

impl fmt::Display for BuildSignature
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}{}", self.guid_hex(), self.age)
    }
}

/// Module identity: file name plus build signature
///
/// Two loads of the same build produce equal identities and therefore share a
/// cache file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity
{
    pub file_name: String,
    pub signature: BuildSignature,
}

impl ModuleIdentity
{
    pub fn new(file_name: impl Into<String>, signature: BuildSignature) -> Self
    {
        Self {
            file_name: file_name.into(),
            signature,
        }
    }

    /// `<file>.<GUID><age>.tsv`
    pub fn cache_file_name(&self) -> String
    {
        format!("{}.{}.tsv", self.file_name, self.signature)
    }
}

impl fmt::Display for ModuleIdentity
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} [{}]", self.file_name, self.signature)
    }
}
