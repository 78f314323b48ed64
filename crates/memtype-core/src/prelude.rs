//! Common module for library exports

pub use crate::address_space::{AddressSpaceIndex, Query, ResolvedSymbol};
pub use crate::catalog::{ArchitectureProfile, ProfileTag, TypeCatalog, TypeDescriptor};
pub use crate::codec::{ByteOrder, Scalar, ScalarClass, ScalarCodec};
pub use crate::error::{MemtypeError, MemtypeResult};
pub use crate::materialize::{MaterializeOptions, Materializer, PathIndex, Record, Value};
pub use crate::memory::{DumpImage, MappingSource, MemoryReader, SparseMemory};
#[cfg(target_os = "linux")]
pub use crate::platform::linux::ProcessMemory;
pub use crate::types::{Address, MemoryRegion, RegionKind};
