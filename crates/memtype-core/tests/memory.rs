//! Tests for readers, string scans, dump directories and value search

use memtype_core::catalog::{ArchitectureProfile, ProfileTag};
use memtype_core::codec::Scalar;
use memtype_core::memory::dump::{segment_file_name, MAPS_FILE};
use memtype_core::memory::{
    read_cstring, read_until_terminator, read_utf16_cstring, write_dump, DumpImage, MappingSource, MemoryReader,
    SparseMemory,
};
use memtype_core::scan::find_values;
use memtype_core::types::{Address, MemoryRegion};
use memtype_core::MemtypeError;

fn addr(value: u64) -> Address
{
    Address::from(value)
}

#[test]
fn test_cstring_stops_at_terminator()
{
    let memory = SparseMemory::new().with_segment(addr(0x100), b"abc\0def\0".to_vec());
    assert_eq!(read_cstring(&memory, addr(0x100), None).unwrap(), "abc");
    assert_eq!(read_cstring(&memory, addr(0x104), Some(16)).unwrap(), "def");
    assert_eq!(read_cstring(&memory, addr(0x103), Some(16)).unwrap(), "");
}

#[test]
fn test_cstring_bytes_are_latin1()
{
    let memory = SparseMemory::new().with_segment(addr(0), vec![0x41, 0xe9, 0x00]);
    assert_eq!(read_cstring(&memory, addr(0), None).unwrap(), "A\u{e9}");
}

#[test]
fn test_utf16_cstring()
{
    let bytes = vec![b'h', 0, b'i', 0, 0x3a, 0x26, 0, 0];
    let memory = SparseMemory::new().with_segment(addr(0x10), bytes);
    assert_eq!(read_utf16_cstring(&memory, addr(0x10), None).unwrap(), "hi\u{263a}");
}

#[test]
fn test_terminator_scan_respects_cap()
{
    let memory = SparseMemory::new().with_segment(addr(0), vec![b'x'; 32]);
    assert!(matches!(
        read_cstring(&memory, addr(0), Some(4)),
        Err(MemtypeError::UnboundedRead { limit: 4, .. })
    ));

    // The terminator counts against the cap
    let memory = SparseMemory::new().with_segment(addr(0), b"abcd\0".to_vec());
    assert_eq!(read_cstring(&memory, addr(0), Some(5)).unwrap(), "abcd");
    assert!(read_cstring(&memory, addr(0), Some(4)).is_err());
}

#[test]
fn test_uncapped_scan_ends_at_unmapped_memory()
{
    let memory = SparseMemory::new().with_segment(addr(0), vec![b'x'; 8]);
    let err = read_cstring(&memory, addr(0), None).unwrap_err();
    assert!(err.is_read_failure());
    assert!(matches!(
        read_until_terminator(&memory, addr(0), &[], None),
        Err(MemtypeError::MalformedInput(_))
    ));
}

#[test]
fn test_dump_round_trip()
{
    let memory = SparseMemory::new()
        .with_segment(addr(0x1000), (0..16).collect())
        .with_segment(addr(0x4000), vec![0xaa; 8]);
    let regions = memory.regions();
    assert_eq!(regions.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let summary = write_dump(dir.path(), &regions, &memory).unwrap();
    assert_eq!(summary.written.len(), 2);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.bytes, 24);
    assert!(dir.path().join(MAPS_FILE).exists());
    assert!(dir.path().join("mem_1000_100f.bin").exists());
    assert_eq!(segment_file_name(&regions[1]), "mem_4000_4007.bin");

    let image = DumpImage::load(dir.path()).unwrap();
    assert_eq!(image.current_mappings().unwrap(), regions);
    assert_eq!(image.read(addr(0x100e), 2).unwrap(), vec![14, 15]);
    assert_eq!(image.read(addr(0x4000), 8).unwrap(), vec![0xaa; 8]);
    assert!(image.read(addr(0x100f), 2).is_err());
}

#[test]
fn test_dump_skips_unreadable_regions()
{
    let memory = SparseMemory::new().with_segment(addr(0x1000), vec![1; 4]);
    let regions = vec![
        MemoryRegion::new(addr(0x1000), addr(0x1003)).with_image("[heap]"),
        MemoryRegion::new(addr(0x8000), addr(0x8fff)).with_image("[vvar]"),
    ];

    let dir = tempfile::tempdir().unwrap();
    let summary = write_dump(dir.path(), &regions, &memory).unwrap();
    assert_eq!(summary.written.len(), 1);
    assert_eq!(summary.skipped, vec![regions[1].clone()]);

    // Both regions stay listed, only the readable one has contents
    let image = DumpImage::load(dir.path()).unwrap();
    assert_eq!(image.regions().len(), 2);
    assert_eq!(image.regions()[1].image, "[vvar]");
    assert!(image.read(addr(0x8000), 1).is_err());
}

#[test]
fn test_find_value_in_every_encoding()
{
    let memory = SparseMemory::new().with_segment(addr(0x200), vec![0x34, 0x12, 0x00, 0x00]);
    let profile = ArchitectureProfile::from_tag(ProfileTag::Le64);

    let hits = find_values(&memory, addr(0x200), 4, &profile, Scalar::Unsigned(0x1234)).unwrap();
    let names: Vec<&str> = hits.iter().map(|hit| hit.encoding).collect();
    assert_eq!(names, vec!["u16le", "u32le", "s16le", "s32le"]);
    assert!(hits.iter().all(|hit| hit.offset == 0 && hit.address == addr(0x200)));
    assert!(hits.iter().all(|hit| hit.native_order));
}

#[test]
fn test_find_negative_value()
{
    let memory = SparseMemory::new().with_segment(addr(0), vec![0x00, 0xff]);
    let profile = ArchitectureProfile::from_tag(ProfileTag::Be32);

    let hits = find_values(&memory, addr(0), 2, &profile, Scalar::Signed(-1)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].encoding, "s8");
    assert_eq!(hits[0].offset, 1);

    let hits = find_values(&memory, addr(0), 2, &profile, Scalar::Unsigned(0xff)).unwrap();
    let names: Vec<&str> = hits.iter().map(|hit| hit.encoding).collect();
    assert_eq!(names, vec!["u16be", "s16be", "u8"]);
    assert!(hits[0].native_order);
}

#[test]
fn test_find_requires_readable_range()
{
    let memory = SparseMemory::new().with_segment(addr(0), vec![0; 4]);
    let profile = ArchitectureProfile::from_tag(ProfileTag::Le32);
    let err = find_values(&memory, addr(0), 8, &profile, Scalar::Unsigned(0)).unwrap_err();
    assert!(err.is_read_failure());
}
