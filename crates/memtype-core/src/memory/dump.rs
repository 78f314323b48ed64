//! # Memory Dumps
//!
//! A dump directory holds a `maps.txt` in the static map-file format and
//! one `mem_<start>_<end>.bin` file per region (hex bounds, end inclusive).
//! It can be produced from any reader with [`write_dump`] and read back
//! with [`DumpImage::load`], which serves both roles of a live target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{MappingSource, MemoryReader, SparseMemory};
use crate::address_space::parse_map_lines;
use crate::error::{MemtypeError, MemtypeResult};
use crate::types::{Address, MemoryRegion};

/// File name of the region list inside a dump directory.
pub const MAPS_FILE: &str = "maps.txt";

/// File name of the contents of `region` inside a dump directory.
pub fn segment_file_name(region: &MemoryRegion) -> String
{
    format!("mem_{:x}_{:x}.bin", region.start.value(), region.end.value())
}

/// Memory and mappings restored from a dump directory
#[derive(Debug, Clone, Default)]
pub struct DumpImage
{
    regions: Vec<MemoryRegion>,
    memory: SparseMemory,
}

impl DumpImage
{
    /// Load `dir/maps.txt` and every segment file it names
    ///
    /// Regions whose segment file is missing stay listed in the mappings
    /// but are unreadable. A segment file shorter than its region maps only
    /// the bytes it has.
    ///
    /// ## Errors
    ///
    /// `Io` if `maps.txt` or an existing segment file cannot be read.
    pub fn load(dir: impl AsRef<Path>) -> MemtypeResult<Self>
    {
        let dir = dir.as_ref();
        let text = fs::read_to_string(dir.join(MAPS_FILE))?;
        let regions = parse_map_lines(text.lines());

        let mut memory = SparseMemory::new();
        let mut loaded = 0usize;
        for region in &regions {
            let path = dir.join(segment_file_name(region));
            if !path.exists() {
                debug!(path = %path.display(), "segment file missing");
                continue;
            }
            let bytes = fs::read(&path)?;
            if bytes.len() as u64 != region.span() {
                warn!(
                    path = %path.display(),
                    expected = region.span(),
                    actual = bytes.len(),
                    "segment file size does not match its region"
                );
            }
            memory.insert(region.start, bytes);
            loaded += 1;
        }

        debug!(dir = %dir.display(), regions = regions.len(), loaded, "loaded memory dump");
        Ok(Self { regions, memory })
    }

    pub fn regions(&self) -> &[MemoryRegion]
    {
        &self.regions
    }
}

impl MemoryReader for DumpImage
{
    fn read(&self, address: Address, len: usize) -> MemtypeResult<Vec<u8>>
    {
        self.memory.read(address, len)
    }
}

impl MappingSource for DumpImage
{
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>
    {
        Ok(self.regions.clone())
    }
}

/// Outcome of [`write_dump`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary
{
    /// Segment files written
    pub written: Vec<PathBuf>,
    /// Regions listed in `maps.txt` whose bytes could not be read
    pub skipped: Vec<MemoryRegion>,
    /// Total bytes written to segment files
    pub bytes: u64,
}

/// Write `regions` and their contents, read through `reader`, into `dir`
///
/// Every region is listed in `maps.txt`. A region that cannot be read is
/// logged and reported in [`DumpSummary::skipped`] instead of failing the
/// whole dump.
///
/// ## Errors
///
/// `Io` if the directory or one of its files cannot be written.
pub fn write_dump<R>(dir: impl AsRef<Path>, regions: &[MemoryRegion], reader: &R) -> MemtypeResult<DumpSummary>
where
    R: MemoryReader + ?Sized,
{
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut maps = fs::File::create(dir.join(MAPS_FILE))?;
    let mut summary = DumpSummary::default();
    for region in regions {
        writeln!(
            maps,
            "{:<#20x} {:<#20x} {:<#12x} {:<#8x} {} {}",
            region.start.value(),
            region.end.value(),
            region.size,
            region.file_offset,
            region.permissions.as_deref().unwrap_or("----"),
            region.image
        )?;

        let contents = usize::try_from(region.span())
            .map_err(|_| MemtypeError::read_failure(region.start, usize::MAX, "region too large"))
            .and_then(|len| reader.read(region.start, len));
        match contents {
            Ok(bytes) => {
                let path = dir.join(segment_file_name(region));
                fs::write(&path, &bytes)?;
                summary.bytes += bytes.len() as u64;
                summary.written.push(path);
            }
            Err(err) => {
                warn!(start = %region.start, end = %region.end, error = %err, "failed to dump region");
                summary.skipped.push(region.clone());
            }
        }
    }

    debug!(
        dir = %dir.display(),
        written = summary.written.len(),
        skipped = summary.skipped.len(),
        bytes = summary.bytes,
        "wrote memory dump"
    );
    Ok(summary)
}
