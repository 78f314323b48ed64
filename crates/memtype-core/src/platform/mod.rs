//! # Platform-Specific Implementations
//!
//! Live-target collaborators. Each platform gets its own submodule that
//! implements [`MemoryReader`](crate::memory::MemoryReader) and
//! [`MappingSource`](crate::memory::MappingSource) on top of the operating
//! system's process inspection interface:
//!
//! - **Linux**: `/proc/<pid>/mem` and `/proc/<pid>/maps`
//!   - See: [proc_pid_mem(5)](https://man7.org/linux/man-pages/man5/proc_pid_mem.5.html)
//!
//! On other platforms only dump directories are available as a source.

#[cfg(target_os = "linux")]
pub mod linux;
