//! # Linux Process Memory
//!
//! Reads a live process through procfs.
//!
//! - `/proc/<pid>/mem` is read with positioned reads (`pread`), so one open
//!   file serves any number of concurrent reads
//! - `/proc/<pid>/maps` is re-read on every [`current_mappings`] call since
//!   the target keeps running and its layout can change between calls
//!
//! Access is governed by ptrace access mode checks: reading another user's
//! process, or any process under `kernel.yama.ptrace_scope >= 1` that is not
//! a descendant, needs `CAP_SYS_PTRACE`.
//!
//! [`current_mappings`]: MappingSource::current_mappings

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::{MemtypeError, MemtypeResult};
use crate::memory::{MappingSource, MemoryReader};
use crate::types::{Address, MemoryRegion};

/// Memory of a running process
#[derive(Debug)]
pub struct ProcessMemory
{
    pid: u32,
    mem: File,
}

impl ProcessMemory
{
    /// Open `/proc/<pid>/mem` for reading.
    ///
    /// ## Errors
    ///
    /// `Io` if the process does not exist or access is denied.
    pub fn open(pid: u32) -> MemtypeResult<Self>
    {
        let mem = File::open(proc_path(pid, "mem"))?;
        debug!(pid, "opened process memory");
        Ok(Self { pid, mem })
    }

    pub fn pid(&self) -> u32
    {
        self.pid
    }
}

/// Bytes requested from `/proc/<pid>/mem` per positioned read.
const READ_CHUNK: usize = 4096;

fn proc_path(pid: u32, entry: &str) -> PathBuf
{
    PathBuf::from(format!("/proc/{pid}/{entry}"))
}

impl MemoryReader for ProcessMemory
{
    /// Reads in `READ_CHUNK` pieces so the buffer only grows by bytes the
    /// target actually has.
    fn read(&self, address: Address, len: usize) -> MemtypeResult<Vec<u8>>
    {
        let mut buf = Vec::with_capacity(len.min(READ_CHUNK));
        let mut chunk = [0u8; READ_CHUNK];
        while buf.len() < len {
            let want = (len - buf.len()).min(READ_CHUNK);
            let at = address
                .checked_add(buf.len() as u64)
                .ok_or_else(|| MemtypeError::read_failure(address, len, "range wraps the address space"))?;
            self.mem
                .read_exact_at(&mut chunk[..want], at.value())
                .map_err(|err| MemtypeError::read_failure(address, len, format!("at {at}: {err}")))?;
            buf.extend_from_slice(&chunk[..want]);
        }
        trace!(pid = self.pid, address = %address, len, "read process memory");
        Ok(buf)
    }
}

impl MappingSource for ProcessMemory
{
    fn current_mappings(&self) -> MemtypeResult<Vec<MemoryRegion>>
    {
        let text = std::fs::read_to_string(proc_path(self.pid, "maps"))?;
        let regions: Vec<MemoryRegion> = text.lines().filter_map(parse_proc_maps_line).collect();
        debug!(pid = self.pid, count = regions.len(), "read live mappings");
        Ok(regions)
    }
}

/// Parse one line of `/proc/<pid>/maps`
///
/// `start-end perms offset dev inode [path]`, with `end` exclusive. The
/// returned region has an inclusive end and the mapping length as size.
pub fn parse_proc_maps_line(line: &str) -> Option<MemoryRegion>
{
    let mut fields = line.split_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    let perms = fields.next()?;
    let offset = u64::from_str_radix(fields.next()?, 16).ok()?;
    let _device = fields.next()?;
    let _inode = fields.next()?;
    let path: Vec<&str> = fields.collect();

    let last = end.checked_sub(1).filter(|last| *last >= start)?;
    let mut region = MemoryRegion::new(Address::from(start), Address::from(last))
        .with_file_offset(offset)
        .with_image(path.join(" "));
    region.permissions = Some(perms.to_string());
    Some(region)
}
