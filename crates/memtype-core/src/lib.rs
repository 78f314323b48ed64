//! # memtype-core
//!
//! Type-directed decoding of raw memory.
//!
//! Given a declarative type database and a byte-addressable memory source
//! (a live process or a dump), this crate rebuilds typed, nested values
//! without any compiler debug information:
//!
//! - [`catalog`]: the type database, typedef resolution and size closure
//! - [`codec`]: fixed-width scalar encodings selected per architecture profile
//! - [`memory`]: the memory-reading collaborators and terminator scans
//! - [`materialize`]: walks a type against an address into a [`Value`] tree
//! - [`address_space`]: region sets and smallest-enclosing-region lookup
//! - [`scan`]: value search across every known encoding
//!
//! ## Platform Support
//!
//! - **Linux**: live processes through `/proc/<pid>` ([`platform::linux`])
//! - **Everywhere**: dump directories and in-memory segments

pub mod address_space;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod materialize;
pub mod memory;
pub mod platform;
pub mod prelude;
pub mod scan;
pub mod types;

pub use address_space::{AddressSpaceIndex, Query, ResolvedSymbol};
pub use catalog::{ArchitectureProfile, TypeCatalog, TypeDescriptor};
pub use error::{MemtypeError, MemtypeResult};
pub use materialize::{MaterializeOptions, Materializer, PathIndex, Value};
pub use memory::{MappingSource, MemoryReader};
pub use types::{Address, MemoryRegion};
