//! Tests for map-file parsing and region lookup

use memtype_core::address_space::{parse_map_line, parse_map_lines, AddressSpaceIndex, Query};
use memtype_core::memory::MappingSource;
use memtype_core::types::{Address, MemoryRegion, RegionKind};
use memtype_core::{MemtypeError, MemtypeResult};

struct FixedMappings(Vec<MemoryRegion>);

impl MappingSource for FixedMappings
{
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>
    {
        Ok(self.0.clone())
    }
}

struct NoTarget;

impl MappingSource for NoTarget
{
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>
    {
        Err(MemtypeError::MalformedInput("no live target".to_string()))
    }
}

fn whole_space() -> FixedMappings
{
    FixedMappings(vec![
        MemoryRegion::new(Address::from(0x0), Address::from(0xffff_ffff)).with_image("[whole]"),
    ])
}

#[test]
fn test_malformed_lines_are_skipped()
{
    let lines = [
        "0x1000 0x1fff 0x1000 0x0 first T",
        "abc def",
        "0x2000 0x2fff 0x1000 0x0 second",
        "0x3000 0x3fff zzz 0 broken",
        "12288 16383 4096 0 third D",
    ];
    let regions = parse_map_lines(lines);
    assert_eq!(regions.len(), 3);
    assert_eq!(regions[0].kind, Some(RegionKind::Function));
    assert_eq!(regions[1].kind, None);
    assert_eq!(regions[2].start, Address::from(0x3000));
    assert_eq!(regions[2].kind, Some(RegionKind::Data));

    let mut index = AddressSpaceIndex::new();
    assert_eq!(index.load_static("symbols", lines), 3);
}

#[test]
fn test_numeric_columns_accept_any_base()
{
    let region = parse_map_line("0o10 0b1111 16 0x20").unwrap();
    assert_eq!(region.start, Address::from(8));
    assert_eq!(region.end, Address::from(15));
    assert_eq!(region.size, 16);
    assert_eq!(region.file_offset, 0x20);
    assert!(region.image.is_empty());
    assert!(matches!(parse_map_line("1 2 3"), Err(MemtypeError::MalformedInput(_))));
}

#[test]
fn test_static_region_beats_live_segment()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("symbols", ["0x1000 0x1fff 0x1000 0x0 handler T"]);
    assert_eq!(index.load_live(&whole_space()), 1);

    let symbol = index.lookup(&Query::Address(Address::from(0x1500)));
    assert!(symbol.exists);
    assert_eq!(symbol.start, Address::from(0x1000));
    assert_eq!(symbol.end, Address::from(0x1fff));
    assert_eq!(symbol.image, "handler");
    assert_eq!(symbol.name, "handler");
    assert_eq!(symbol.kind, Some(RegionKind::Function));
    assert_eq!(symbol.offset(), 0x500);

    let outside = index.lookup(&Query::Address(Address::from(0x8000)));
    assert_eq!(outside.image, "[whole]");
}

#[test]
fn test_live_snapshot_is_considered_but_not_kept()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("symbols", ["0x1000 0x1fff 0x1000 0x0 handler T"]);

    let symbol = index.lookup_with_live(&Query::from("0x1500"), &whole_space());
    assert_eq!(symbol.image, "handler");
    let symbol = index.lookup_with_live(&Query::from("0x9000"), &whole_space());
    assert_eq!(symbol.image, "[whole]");
    assert_eq!(index.region_count(), 1);
    assert!(!index.lookup(&Query::from("0x9000")).exists);
}

#[test]
fn test_equal_spans_go_to_first_loaded()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("a", ["0x1000 0x1fff 0x1000 0 first"]);
    index.load_static("b", ["0x1000 0x1fff 0x1000 0 second"]);
    assert_eq!(index.lookup(&Query::from("0x1800")).image, "first");
}

#[test]
fn test_bounds_are_inclusive()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("a", ["0x1000 0x1fff 0x1000 0 only"]);
    assert!(index.lookup(&Query::from("0x1000")).exists);
    assert!(index.lookup(&Query::from("0x1fff")).exists);
    assert!(!index.lookup(&Query::from("0x2000")).exists);
    assert!(!index.lookup(&Query::from("0xfff")).exists);
}

#[test]
fn test_lookup_by_name()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("maps", [
        "0x400000 0x4fffff 0x100000 0x0 r-xp /usr/bin/app",
        "0x401000 0x401fff 0x1000 0x1000 main T",
    ]);

    let symbol = index.lookup(&Query::from("main"));
    assert!(symbol.exists);
    assert_eq!(symbol.address, Address::from(0x401000));
    assert_eq!(symbol.file_offset, 0x1000);
    assert_eq!(index.resolve_address(&Query::from("main")).unwrap(), Address::from(0x401000));

    let missing = index.lookup(&Query::from("nothing"));
    assert!(!missing.exists);
    assert_eq!(missing.to_string(), "No mapping found for nothing");
    assert!(index.resolve_address(&Query::from("nothing")).is_err());
}

#[test]
fn test_display_matches_mapto_layout()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("maps", ["0x401000 0x401fff 0x1000 0x200 main T"]);
    let symbol = index.lookup(&Query::from("0x401010"));
    assert_eq!(
        symbol.to_string(),
        "name 'main' addr 0x401010 range 0x401000-0x401fff size 0x10 mapsize 0x1000 fileoff 0x200 objfile main"
    );
}

#[test]
fn test_unavailable_live_source_falls_back()
{
    let mut index = AddressSpaceIndex::new();
    index.load_static("maps", ["0x1000 0x1fff 0x1000 0 only"]);
    assert_eq!(index.load_live(&NoTarget), 0);
    assert_eq!(index.sets().len(), 1);
    assert!(index.lookup_with_live(&Query::from("0x1001"), &NoTarget).exists);
}

#[test]
fn test_load_map_file()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.map");
    std::fs::write(&path, "0x1000 0x1fff 0x1000 0 one\n\nnot a region\n0x2000 0x2fff 0x1000 0 two\n").unwrap();

    let mut index = AddressSpaceIndex::new();
    assert_eq!(index.load_map_file(&path).unwrap(), 2);
    assert_eq!(index.sets()[0].source, path.display().to_string());
}
