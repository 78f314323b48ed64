//! # Memory Collaborators
//!
//! The decoder never touches a target directly. It goes through two small
//! traits:
//!
//! - [`MemoryReader`]: read `len` bytes at an address
//! - [`MappingSource`]: list the regions currently mapped in the target
//!
//! Implementations in this crate:
//!
//! - [`SparseMemory`]: segments held in memory (tests, loaded dumps)
//! - [`DumpImage`]: a dump directory written by [`write_dump`]
//! - [`ProcessMemory`](crate::platform::linux::ProcessMemory): a live Linux
//!   process through `/proc/<pid>`
//!
//! ## Failure model
//!
//! A read either returns exactly `len` bytes or fails with `ReadFailure`.
//! There are no partial successes; callers decide whether a failed read
//! propagates or degrades.

pub mod dump;
pub mod sparse;

pub use dump::{write_dump, DumpImage, DumpSummary};
pub use sparse::SparseMemory;

use crate::error::{MemtypeError, MemtypeResult};
use crate::types::{Address, MemoryRegion};

/// Byte-addressable source of target memory
pub trait MemoryReader
{
    /// Read exactly `len` bytes starting at `address`.
    ///
    /// ## Errors
    ///
    /// `ReadFailure` if any byte of the range is unmapped or unreadable.
    fn read(&self, address: Address, len: usize) -> MemtypeResult<Vec<u8>>;
}

/// Source of the target's current address-space layout
pub trait MappingSource
{
    /// Regions mapped right now, in the order the source reports them.
    ///
    /// May fail when there is no live target; the address-space index then
    /// falls back to its static maps.
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>;
}

impl<T: MemoryReader + ?Sized> MemoryReader for &T
{
    fn read(&self, address: Address, len: usize) -> MemtypeResult<Vec<u8>>
    {
        (**self).read(address, len)
    }
}

impl<T: MemoryReader + ?Sized> MemoryReader for Box<T>
{
    fn read(&self, address: Address, len: usize) -> MemtypeResult<Vec<u8>>
    {
        (**self).read(address, len)
    }
}

impl<T: MappingSource + ?Sized> MappingSource for &T
{
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>
    {
        (**self).current_mappings()
    }
}

impl<T: MappingSource + ?Sized> MappingSource for Box<T>
{
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>
    {
        (**self).current_mappings()
    }
}

/// Read `terminator.len()`-byte units from `address` until one equals
/// `terminator`
///
/// The terminator itself is not part of the result. With `limit` set, the
/// scan fails with `UnboundedRead` once more than `limit` bytes have been
/// consumed without finding it. `limit: None` scans until a read fails,
/// which makes an unterminated string in mapped memory an unbounded loop.
pub fn read_until_terminator<R>(
    reader: &R,
    address: Address,
    terminator: &[u8],
    limit: Option<usize>,
) -> MemtypeResult<Vec<u8>>
where
    R: MemoryReader + ?Sized,
{
    if terminator.is_empty() {
        return Err(MemtypeError::MalformedInput("empty terminator".to_string()));
    }

    let unit = terminator.len();
    let mut out = Vec::new();
    let mut cursor = address;
    loop {
        if let Some(limit) = limit {
            if out.len() + unit > limit {
                return Err(MemtypeError::UnboundedRead { address, limit });
            }
        }
        let chunk = reader.read(cursor, unit)?;
        if chunk == terminator {
            return Ok(out);
        }
        out.extend_from_slice(&chunk);
        cursor = cursor
            .checked_add(unit as u64)
            .ok_or_else(|| MemtypeError::read_failure(cursor, unit, "scan ran off the end of the address space"))?;
    }
}

/// Zero-terminated byte string, one byte per character (Latin-1).
pub fn read_cstring<R>(reader: &R, address: Address, limit: Option<usize>) -> MemtypeResult<String>
where
    R: MemoryReader + ?Sized,
{
    let bytes = read_until_terminator(reader, address, &[0], limit)?;
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Zero-terminated UTF-16LE string; invalid code units are replaced.
pub fn read_utf16_cstring<R>(reader: &R, address: Address, limit: Option<usize>) -> MemtypeResult<String>
where
    R: MemoryReader + ?Sized,
{
    let bytes = read_until_terminator(reader, address, &[0, 0], limit)?;
    let units: Vec<u16> = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
    Ok(String::from_utf16_lossy(&units))
}
