//! Architecture profiles: primitive widths plus byte order.

use std::fmt;
use std::mem::size_of;
use std::str::FromStr;

use crate::codec::{ByteOrder, ScalarClass};
use crate::error::MemtypeError;

/// Which fixed profile to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileTag
{
    /// Widths and byte order of the machine running the decoder
    Native,
    Le32,
    Be32,
    Le64,
    Be64,
}

impl ProfileTag
{
    pub const ALL: [ProfileTag; 5] = [
        ProfileTag::Native,
        ProfileTag::Le32,
        ProfileTag::Be32,
        ProfileTag::Le64,
        ProfileTag::Be64,
    ];

    pub fn as_str(self) -> &'static str
    {
        match self {
            ProfileTag::Native => "native",
            ProfileTag::Le32 => "32le",
            ProfileTag::Be32 => "32be",
            ProfileTag::Le64 => "64le",
            ProfileTag::Be64 => "64be",
        }
    }
}

impl fmt::Display for ProfileTag
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// Immutable set of primitive widths and the byte order they are read in
///
/// Installing a profile into a [`TypeCatalog`](super::TypeCatalog)
/// defines the primitive type names listed in [`PRIMITIVE_NAMES`] and
/// recomputes every derived size.
///
/// ```rust
/// use memtype_core::catalog::ArchitectureProfile;
///
/// let profile: ArchitectureProfile = "32be".parse()?;
/// assert_eq!(profile.pointer, 4);
/// assert_eq!(profile.long, 8);
/// # Ok::<(), memtype_core::MemtypeError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchitectureProfile
{
    pub tag: ProfileTag,
    pub byte_order: ByteOrder,
    pub char: usize,
    pub short: usize,
    pub int: usize,
    pub long: usize,
    pub llong: usize,
    pub size_t: usize,
    pub pointer: usize,
}

/// Type names a profile installs, in installation order.
pub const PRIMITIVE_NAMES: [&str; 13] = [
    "char", "short", "int", "long", "llong", "uchar", "ushort", "uint", "ulong", "ullong", "size_t", "ssize_t",
    "pointer",
];

impl ArchitectureProfile
{
    /// Profile for one of the fixed tags.
    ///
    /// The fixed profiles keep `long` and `llong` at 8 bytes even for the
    /// 32-bit tags; only `size_t`, `ssize_t` and `pointer` shrink.
    pub fn from_tag(tag: ProfileTag) -> Self
    {
        let fixed = |pointer: usize, byte_order: ByteOrder| Self {
            tag,
            byte_order,
            char: 1,
            short: 2,
            int: 4,
            long: 8,
            llong: 8,
            size_t: pointer,
            pointer,
        };

        match tag {
            ProfileTag::Native => Self {
                tag,
                byte_order: ByteOrder::native(),
                char: size_of::<libc::c_char>(),
                short: size_of::<libc::c_short>(),
                int: size_of::<libc::c_int>(),
                long: size_of::<libc::c_long>(),
                llong: size_of::<libc::c_longlong>(),
                size_t: size_of::<libc::size_t>(),
                pointer: size_of::<*const libc::c_void>(),
            },
            ProfileTag::Le32 => fixed(4, ByteOrder::Little),
            ProfileTag::Be32 => fixed(4, ByteOrder::Big),
            ProfileTag::Le64 => fixed(8, ByteOrder::Little),
            ProfileTag::Be64 => fixed(8, ByteOrder::Big),
        }
    }

    pub fn native() -> Self
    {
        Self::from_tag(ProfileTag::Native)
    }

    /// Width and class of one of the [`PRIMITIVE_NAMES`].
    pub fn primitive(&self, name: &str) -> Option<(usize, ScalarClass)>
    {
        let entry = match name {
            "char" => (self.char, ScalarClass::Signed),
            "short" => (self.short, ScalarClass::Signed),
            "int" => (self.int, ScalarClass::Signed),
            "long" => (self.long, ScalarClass::Signed),
            "llong" => (self.llong, ScalarClass::Signed),
            "uchar" => (self.char, ScalarClass::Unsigned),
            "ushort" => (self.short, ScalarClass::Unsigned),
            "uint" => (self.int, ScalarClass::Unsigned),
            "ulong" => (self.long, ScalarClass::Unsigned),
            "ullong" => (self.llong, ScalarClass::Unsigned),
            "size_t" => (self.size_t, ScalarClass::Unsigned),
            "ssize_t" => (self.size_t, ScalarClass::Signed),
            "pointer" => (self.pointer, ScalarClass::Pointer),
            _ => return None,
        };
        Some(entry)
    }
}

impl Default for ArchitectureProfile
{
    fn default() -> Self
    {
        Self::native()
    }
}

impl FromStr for ProfileTag
{
    type Err = MemtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        ProfileTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| MemtypeError::UnknownProfile(s.to_string()))
    }
}

impl FromStr for ArchitectureProfile
{
    type Err = MemtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        s.parse::<ProfileTag>().map(Self::from_tag)
    }
}
