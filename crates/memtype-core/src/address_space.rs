//! # Address Space Index
//!
//! Named address ranges used to turn a symbolic location into an address
//! and to find which mapping an address falls into.
//!
//! Regions come from independently loaded *region sets*: static map files
//! (precise symbol ranges) and snapshots of the live target's mappings
//! (coarse whole-segment ranges). A lookup considers every set together and
//! prefers the **smallest** enclosing region, so a static symbol wins over
//! the segment that contains it. Equal spans go to the region loaded first.
//!
//! ## Map-file format
//!
//! One region per line, whitespace separated:
//!
//! ```text
//! start end size file_offset [perms] [image ...] [T|D]
//! ```
//!
//! The four numeric columns accept any base prefix (`0x`, `0o`, `0b`). A
//! trailing `T` or `D` tags function or data symbols. Everything between the
//! numeric columns and the tag is the owning image name, after an optional
//! `rwxp`-style permission column. Lines that do not parse are skipped.
//!
//! ## Example
//!
//! ```rust
//! use memtype_core::address_space::{AddressSpaceIndex, Query};
//! use memtype_core::types::Address;
//!
//! let mut index = AddressSpaceIndex::new();
//! index.load_static("symbols", ["0x1000 0x1fff 0x1000 0 main_loop T", "bogus line"]);
//!
//! let symbol = index.lookup(&Query::from("0x1500"));
//! assert!(symbol.exists);
//! assert_eq!(symbol.image, "main_loop");
//! assert_eq!(symbol.offset(), 0x500);
//!
//! let by_name = index.lookup(&Query::from("main_loop"));
//! assert_eq!(by_name.address, Address::from(0x1000));
//! ```

use std::fmt;
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::error::{MemtypeError, MemtypeResult};
use crate::memory::MappingSource;
use crate::types::{Address, MemoryRegion, RegionKind};

/// Parse one map-file line.
///
/// ## Errors
///
/// `MalformedInput` if the line has fewer than four columns or one of the
/// numeric columns is not an integer.
pub fn parse_map_line(line: &str) -> MemtypeResult<MemoryRegion>
{
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(MemtypeError::MalformedInput(format!(
            "map line has {} columns, need at least 4",
            tokens.len()
        )));
    }

    let number = |token: &str| {
        parse_int::parse::<u64>(token)
            .map_err(|err| MemtypeError::MalformedInput(format!("map column '{token}': {err}")))
    };
    let start = number(tokens[0])?;
    let end = number(tokens[1])?;
    let size = number(tokens[2])?;
    let file_offset = number(tokens[3])?;

    let mut rest = &tokens[4..];
    let mut kind = None;
    if let Some((last, init)) = rest.split_last() {
        if let Some(tag) = RegionKind::from_tag(last) {
            kind = Some(tag);
            rest = init;
        }
    }
    let mut permissions = None;
    if let Some((first, tail)) = rest.split_first() {
        if looks_like_permissions(first) {
            if *first != "----" {
                permissions = Some((*first).to_string());
            }
            rest = tail;
        }
    }

    Ok(MemoryRegion {
        start: Address::from(start),
        end: Address::from(end),
        size,
        file_offset,
        kind,
        permissions,
        image: rest.join(" "),
    })
}

fn looks_like_permissions(token: &str) -> bool
{
    (3..=4).contains(&token.len()) && token.chars().all(|c| matches!(c, 'r' | 'w' | 'x' | 'p' | 's' | '-'))
}

/// Parse every line that is a valid region, skipping the rest.
pub fn parse_map_lines<I, S>(lines: I) -> Vec<MemoryRegion>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut regions = Vec::new();
    for (number, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        match parse_map_line(line) {
            Ok(region) => regions.push(region),
            Err(err) => warn!(line = number + 1, error = %err, "skipping map line"),
        }
    }
    regions
}

/// One independently loaded list of regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet
{
    /// Where the set came from (file path, `live`, ...)
    pub source: String,
    pub regions: Vec<MemoryRegion>,
}

/// What to look up: an address, or the name of a region's owning image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query
{
    Address(Address),
    Name(String),
}

/// Anything that parses as an integer is an address; everything else is a name.
impl From<&str> for Query
{
    fn from(text: &str) -> Self
    {
        match text.parse::<Address>() {
            Ok(address) => Query::Address(address),
            Err(_) => Query::Name(text.to_string()),
        }
    }
}

impl From<Address> for Query
{
    fn from(address: Address) -> Self
    {
        Query::Address(address)
    }
}

impl fmt::Display for Query
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Query::Address(address) => write!(f, "{address}"),
            Query::Name(name) => f.write_str(name),
        }
    }
}

/// Result of a lookup
///
/// Built fresh for every query; the live address space can change between
/// calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol
{
    /// Whether any region matched
    pub exists: bool,
    pub kind: Option<RegionKind>,
    /// Queried name, or the matching region's image for address queries
    pub name: String,
    /// Queried address, or the region start for name queries
    pub address: Address,
    pub start: Address,
    pub end: Address,
    /// Size column of the matching region
    pub map_size: u64,
    pub file_offset: u64,
    pub image: String,
}

impl ResolvedSymbol
{
    fn missing(query: &Query) -> Self
    {
        let (name, address) = match query {
            Query::Address(address) => (String::new(), *address),
            Query::Name(name) => (name.clone(), Address::ZERO),
        };
        Self {
            exists: false,
            kind: None,
            name,
            address,
            start: Address::ZERO,
            end: Address::ZERO,
            map_size: 0,
            file_offset: 0,
            image: String::new(),
        }
    }

    fn from_region(query: &Query, region: &MemoryRegion) -> Self
    {
        let (name, address) = match query {
            Query::Address(address) => (region.image.clone(), *address),
            Query::Name(name) => (name.clone(), region.start),
        };
        Self {
            exists: true,
            kind: region.kind,
            name,
            address,
            start: region.start,
            end: region.end,
            map_size: region.size,
            file_offset: region.file_offset,
            image: region.image.clone(),
        }
    }

    /// Distance of `address` from the start of the matching region.
    pub fn offset(&self) -> u64
    {
        self.address.offset_from(self.start).unwrap_or(0)
    }
}

impl fmt::Display for ResolvedSymbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if !self.exists {
            return write!(f, "No mapping found for {}", if self.name.is_empty() {
                self.address.to_string()
            } else {
                self.name.clone()
            });
        }
        write!(
            f,
            "name '{}' addr {:#x} range {:#x}-{:#x} size {:#x} mapsize {:#x} fileoff {:#x} objfile {}",
            self.name,
            self.address.value(),
            self.start.value(),
            self.end.value(),
            self.offset(),
            self.map_size,
            self.file_offset,
            self.image
        )
    }
}

/// Region sets plus smallest-enclosing-region lookup
#[derive(Debug, Clone, Default)]
pub struct AddressSpaceIndex
{
    sets: Vec<RegionSet>,
}

impl AddressSpaceIndex
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn sets(&self) -> &[RegionSet]
    {
        &self.sets
    }

    /// Total number of regions across all sets.
    pub fn region_count(&self) -> usize
    {
        self.sets.iter().map(|set| set.regions.len()).sum()
    }

    /// Append an already parsed region set.
    pub fn add_set(&mut self, source: impl Into<String>, regions: Vec<MemoryRegion>)
    {
        self.sets.push(RegionSet {
            source: source.into(),
            regions,
        });
    }

    /// Parse map-file lines into a new region set, skipping malformed lines.
    ///
    /// Returns the number of regions loaded.
    pub fn load_static<I, S>(&mut self, source: impl Into<String>, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let source = source.into();
        let regions = parse_map_lines(lines);
        let count = regions.len();
        debug!(source = %source, count, "loaded static map");
        self.add_set(source, regions);
        count
    }

    /// Read a map file from disk and load it as a region set.
    pub fn load_map_file(&mut self, path: impl AsRef<Path>) -> MemtypeResult<usize>
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Ok(self.load_static(path.display().to_string(), text.lines()))
    }

    /// Append a snapshot of `source`'s current mappings as a region set
    ///
    /// An unavailable source is not an error: lookups keep working against
    /// the static sets and 0 is returned.
    pub fn load_live<M>(&mut self, source: &M) -> usize
    where
        M: MappingSource + ?Sized,
    {
        match source.current_mappings() {
            Ok(regions) => {
                let count = regions.len();
                debug!(count, "loaded live mappings");
                self.add_set("live", regions);
                count
            }
            Err(err) => {
                debug!(error = %err, "live mappings unavailable");
                0
            }
        }
    }

    /// Look `query` up in every loaded set.
    pub fn lookup(&self, query: &Query) -> ResolvedSymbol
    {
        let best = Self::best_match(query, self.sets.iter().flat_map(|set| set.regions.iter()));
        Self::resolved(query, best)
    }

    /// Look `query` up in every loaded set plus a fresh snapshot of `live`,
    /// which is considered after the loaded sets and not retained.
    pub fn lookup_with_live<M>(&self, query: &Query, live: &M) -> ResolvedSymbol
    where
        M: MappingSource + ?Sized,
    {
        let snapshot = live.current_mappings().unwrap_or_else(|err| {
            debug!(error = %err, "live mappings unavailable, using static maps only");
            Vec::new()
        });
        let regions = self.sets.iter().flat_map(|set| set.regions.iter()).chain(snapshot.iter());
        let best = Self::best_match(query, regions);
        Self::resolved(query, best)
    }

    /// Resolve `query` to an address, failing if nothing matches.
    pub fn resolve_address(&self, query: &Query) -> MemtypeResult<Address>
    {
        match query {
            Query::Address(address) => Ok(*address),
            Query::Name(_) => {
                let symbol = self.lookup(query);
                if symbol.exists {
                    Ok(symbol.address)
                } else {
                    Err(MemtypeError::MalformedInput(format!("no region named '{query}'")))
                }
            }
        }
    }

    /// Smallest matching region; the first one seen wins a tie.
    fn best_match<'a, I>(query: &Query, regions: I) -> Option<&'a MemoryRegion>
    where
        I: Iterator<Item = &'a MemoryRegion>,
    {
        let mut best: Option<&MemoryRegion> = None;
        for region in regions {
            let matches = match query {
                Query::Address(address) => region.contains(*address),
                Query::Name(name) => region.image == *name,
            };
            if !matches {
                continue;
            }
            if best.is_none_or(|current| region.span() < current.span()) {
                best = Some(region);
            }
        }
        best
    }

    fn resolved(query: &Query, best: Option<&MemoryRegion>) -> ResolvedSymbol
    {
        match best {
            Some(region) => {
                trace!(query = %query, start = %region.start, end = %region.end, "resolved");
                ResolvedSymbol::from_region(query, region)
            }
            None => ResolvedSymbol::missing(query),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_columns_and_tag()
    {
        let region = parse_map_line("0x400000 0x400fff 4096 0x0 r-xp /usr/bin/app D").unwrap();
        assert_eq!(region.size, 4096);
        assert_eq!(region.permissions.as_deref(), Some("r-xp"));
        assert_eq!(region.kind, Some(RegionKind::Data));
        assert_eq!(region.image, "/usr/bin/app");
    }

    #[test]
    fn test_image_keeps_embedded_spaces()
    {
        let region = parse_map_line("0 0xff 0x100 0 My Program Files").unwrap();
        assert_eq!(region.image, "My Program Files");
        assert_eq!(region.permissions, None);
    }

    #[test]
    fn test_display_parses_back()
    {
        let region = MemoryRegion::new(Address::from(0x10), Address::from(0x1f))
            .with_image("lib")
            .with_kind(RegionKind::Function)
            .with_file_offset(0x200);
        assert_eq!(parse_map_line(&region.to_string()).unwrap(), region);
    }
}
