//! In-memory reader over a sparse set of byte segments.

use std::ops::RangeInclusive;

use rangemap::RangeInclusiveMap;

use super::MemoryReader;
use crate::error::{MemtypeError, MemtypeResult};
use crate::types::{Address, MemoryRegion};

/// Where a mapped range's bytes live
///
/// `index` is distinct for every inserted segment so the range map never
/// coalesces two neighbours into one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SegmentRef
{
    index: usize,
    start: u64,
}

/// Byte segments keyed by inclusive address range
///
/// Later segments shadow earlier ones where they overlap. A read succeeds
/// only if every byte of the requested range is covered by some segment.
///
/// ```rust
/// use memtype_core::memory::{MemoryReader, SparseMemory};
/// use memtype_core::types::Address;
///
/// let mut memory = SparseMemory::new();
/// memory.insert(Address::from(0x1000), vec![1, 2, 3, 4]);
/// assert_eq!(memory.read(Address::from(0x1002), 2)?, vec![3, 4]);
/// assert!(memory.read(Address::from(0x1003), 2).is_err());
/// # Ok::<(), memtype_core::MemtypeError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SparseMemory
{
    segments: Vec<Vec<u8>>,
    by_address: RangeInclusiveMap<u64, SegmentRef>,
}

impl SparseMemory
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Map `bytes` at `start`. Empty segments are ignored.
    ///
    /// Bytes that would run past the end of the address space are dropped.
    pub fn insert(&mut self, start: Address, bytes: Vec<u8>)
    {
        let Some(last) = (bytes.len() as u64).checked_sub(1) else {
            return;
        };
        let end = start.value().saturating_add(last);
        let index = self.segments.len();
        self.segments.push(bytes);
        self.by_address.insert(start.value()..=end, SegmentRef {
            index,
            start: start.value(),
        });
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with_segment(mut self, start: Address, bytes: Vec<u8>) -> Self
    {
        self.insert(start, bytes);
        self
    }

    pub fn is_empty(&self) -> bool
    {
        self.by_address.is_empty()
    }

    /// Mapped ranges in address order, one region per visible piece of a
    /// segment.
    pub fn regions(&self) -> Vec<MemoryRegion>
    {
        self.by_address
            .iter()
            .map(|(range, _)| MemoryRegion::new(Address::from(*range.start()), Address::from(*range.end())))
            .collect()
    }

    fn requested_range(address: Address, len: usize) -> MemtypeResult<RangeInclusive<u64>>
    {
        let last = (len as u64) - 1;
        let end = address
            .value()
            .checked_add(last)
            .ok_or_else(|| MemtypeError::read_failure(address, len, "range wraps the address space"))?;
        Ok(address.value()..=end)
    }
}

impl MemoryReader for SparseMemory
{
    fn read(&self, address: Address, len: usize) -> MemtypeResult<Vec<u8>>
    {
        if len == 0 {
            return Ok(Vec::new());
        }
        let requested = Self::requested_range(address, len)?;
        if let Some(gap) = self.by_address.gaps(&requested).next() {
            return Err(MemtypeError::read_failure(
                address,
                len,
                format!("{:#x} is not mapped", gap.start()),
            ));
        }

        let mut out = Vec::with_capacity(len);
        let mut cursor = *requested.start();
        for (overlap, segment) in self.by_address.overlapping(&requested) {
            // A segment may be split by a later one, so offsets are taken
            // from the segment start, not from the overlap.
            let chunk_end = (*overlap.end()).min(*requested.end());
            let from = usize::try_from(cursor - segment.start)
                .map_err(|_| MemtypeError::read_failure(address, len, "segment offset overflow"))?;
            let to = usize::try_from(chunk_end - segment.start)
                .map_err(|_| MemtypeError::read_failure(address, len, "segment offset overflow"))?;
            let bytes = self
                .segments
                .get(segment.index)
                .and_then(|bytes| bytes.get(from..=to))
                .ok_or_else(|| MemtypeError::read_failure(address, len, "segment shorter than its range"))?;
            out.extend_from_slice(bytes);
            cursor = chunk_end.wrapping_add(1);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_later_segment_shadows_earlier()
    {
        let memory = SparseMemory::new()
            .with_segment(Address::from(0x100), vec![0xaa; 8])
            .with_segment(Address::from(0x102), vec![0xbb; 2]);
        assert_eq!(
            memory.read(Address::from(0x100), 8).unwrap(),
            vec![0xaa, 0xaa, 0xbb, 0xbb, 0xaa, 0xaa, 0xaa, 0xaa]
        );
    }

    #[test]
    fn test_read_across_adjacent_segments()
    {
        let memory = SparseMemory::new()
            .with_segment(Address::from(0x10), vec![1, 2])
            .with_segment(Address::from(0x12), vec![3, 4]);
        assert_eq!(memory.read(Address::from(0x11), 3).unwrap(), vec![2, 3, 4]);
        assert_eq!(memory.regions().len(), 2);
    }

    #[test]
    fn test_gap_fails_whole_read()
    {
        let memory = SparseMemory::new()
            .with_segment(Address::from(0x10), vec![1, 2])
            .with_segment(Address::from(0x14), vec![3, 4]);
        let err = memory.read(Address::from(0x10), 6).unwrap_err();
        assert!(err.is_read_failure());
    }

    #[test]
    fn test_zero_length_read_is_empty()
    {
        let memory = SparseMemory::new();
        assert!(memory.read(Address::from(0x10), 0).unwrap().is_empty());
    }
}
