//! # Types
//!
//! Small value types shared by every component: addresses and the named
//! address ranges ("maps") the address-space index is built from.

pub mod address;
pub mod region;

// Re-export all public types
pub use address::Address;
pub use region::{MemoryRegion, RegionKind};
