//! # Value Materializer
//!
//! Walks a named type against an address and builds a [`Value`] tree.
//!
//! ## Decoding rules
//!
//! | Kind | Result |
//! |------|--------|
//! | typedef | the target, same address, same path |
//! | cstring | bytes up to the first zero, capped by `max_string_len` |
//! | struct | members packed back to back, no padding |
//! | union | the raw bytes, never reinterpreted |
//! | array | elements at `address + i * element_size` |
//! | primitive, enum | scalar decoded through the codec |
//! | pointer | the pointee's value when followed, the raw address otherwise |
//!
//! ## Pointers
//!
//! Pointers are followed by default. A pointer is left as a raw address
//! when its type name is in the no-follow set, it is null, it is opaque, or
//! its pointee has no size. The raw address is always recorded in the
//! [`PathIndex`] under the pointer's own path.
//!
//! Two tolerant paths exist, everywhere else errors propagate:
//!
//! - a pointer field whose own bytes cannot be read decodes as address 0
//!   (`zero_fill_pointers`)
//! - a followed pointer whose target cannot be read keeps its raw address;
//!   a string past `max_string_len` is not a read failure and still fails
//!   with `UnboundedRead`
//!
//! Following is guarded by `max_depth` and by a stack of the
//! `(type, address)` pairs being decoded, so a cyclic structure is reported
//! as `PointerCycle` instead of recursing forever.
//!
//! ## Example
//!
//! ```rust
//! use memtype_core::catalog::TypeCatalog;
//! use memtype_core::materialize::Materializer;
//! use memtype_core::memory::SparseMemory;
//! use memtype_core::types::Address;
//!
//! let mut catalog = TypeCatalog::with_profile("32le".parse()?);
//! catalog.load_json(r#"{
//!     "Pair": { "flags": ["struct"], "members": [["lo", "ushort"], ["hi", "ushort"]] }
//! }"#)?;
//! let memory = SparseMemory::new().with_segment(Address::from(0x100), vec![1, 0, 2, 0]);
//!
//! let (value, index) = Materializer::new(&catalog, &memory).materialize("Pair", Address::from(0x100))?;
//! assert_eq!(value.field("hi").and_then(|v| v.as_u64()), Some(2));
//! assert!(index.contains("Pair.ushort"));
//! # Ok::<(), memtype_core::MemtypeError>(())
//! ```

pub mod value;

use std::collections::BTreeSet;

use smallvec::SmallVec;
use tracing::{debug, debug_span, trace, warn};
pub use value::{PathEntry, PathIndex, Record, Value};

use crate::catalog::{TypeCatalog, TypeDescriptor};
use crate::codec::ScalarClass;
use crate::error::{MemtypeError, MemtypeResult};
use crate::memory::{read_cstring, MemoryReader};
use crate::types::Address;

/// Default cap on nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default cap on the length of a `cstring`.
pub const DEFAULT_MAX_STRING_LEN: usize = 4096;

/// Tuning for a materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOptions
{
    /// Pointer type names that are never dereferenced
    pub no_follow: BTreeSet<String>,
    /// Deepest nesting allowed before failing with `DepthExceeded`
    pub max_depth: usize,
    /// Longest `cstring` scanned before failing with `UnboundedRead`;
    /// `None` scans until a read fails
    pub max_string_len: Option<usize>,
    /// Decode unreadable pointer fields as address 0 instead of failing
    pub zero_fill_pointers: bool,
}

impl Default for MaterializeOptions
{
    fn default() -> Self
    {
        Self {
            no_follow: BTreeSet::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_string_len: Some(DEFAULT_MAX_STRING_LEN),
            zero_fill_pointers: true,
        }
    }
}

impl MaterializeOptions
{
    /// Add a pointer type name to the no-follow set.
    #[must_use]
    pub fn no_follow(mut self, type_name: impl Into<String>) -> Self
    {
        self.no_follow.insert(type_name.into());
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self
    {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_max_string_len(mut self, max_string_len: Option<usize>) -> Self
    {
        self.max_string_len = max_string_len;
        self
    }

    #[must_use]
    pub fn with_zero_fill_pointers(mut self, zero_fill_pointers: bool) -> Self
    {
        self.zero_fill_pointers = zero_fill_pointers;
        self
    }
}

/// Builds value trees from a catalog and a memory reader
///
/// Borrows the catalog immutably for its whole lifetime, so the catalog
/// cannot change profile while a materialization is running.
pub struct Materializer<'a, R: MemoryReader + ?Sized>
{
    catalog: &'a TypeCatalog,
    reader: &'a R,
    options: MaterializeOptions,
}

/// State of one top-level call
#[derive(Default)]
struct Walk
{
    index: PathIndex,
    /// `(pointee type, address)` pairs currently being decoded through a pointer
    following: SmallVec<[(String, Address); 8]>,
    /// Innermost node that failed, for error reporting
    failure: Option<(String, Address)>,
}

impl<'a, R: MemoryReader + ?Sized> Materializer<'a, R>
{
    pub fn new(catalog: &'a TypeCatalog, reader: &'a R) -> Self
    {
        Self {
            catalog,
            reader,
            options: MaterializeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: MaterializeOptions) -> Self
    {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MaterializeOptions
    {
        &self.options
    }

    /// Materialize `type_name` at `address`.
    ///
    /// ## Errors
    ///
    /// `Materialize`, wrapping the underlying error together with the path
    /// and address of the node that failed.
    pub fn materialize(&self, type_name: &str, address: Address) -> MemtypeResult<(Value, PathIndex)>
    {
        self.materialize_with_prefix(type_name, address, "")
    }

    /// Like [`materialize`](Self::materialize), with every recorded path
    /// starting at `path_prefix`.
    pub fn materialize_with_prefix(
        &self,
        type_name: &str,
        address: Address,
        path_prefix: &str,
    ) -> MemtypeResult<(Value, PathIndex)>
    {
        let span = debug_span!("materialize", type_name, address = %address);
        let _enter = span.enter();

        let mut walk = Walk::default();
        match self.visit(&mut walk, path_prefix, type_name, address, 0) {
            Ok(value) => {
                debug!(nodes = walk.index.len(), "materialized");
                Ok((value, walk.index))
            }
            Err(source) => {
                let (path, address) = walk
                    .failure
                    .unwrap_or_else(|| (join_path(path_prefix, type_name), address));
                Err(MemtypeError::Materialize {
                    path,
                    address,
                    source: Box::new(source),
                })
            }
        }
    }

    fn visit(&self, walk: &mut Walk, parent: &str, type_name: &str, address: Address, depth: usize) -> MemtypeResult<Value>
    {
        let path = join_path(parent, type_name);
        let result = self.visit_node(walk, &path, type_name, address, depth);
        if result.is_err() && walk.failure.is_none() {
            walk.failure = Some((path, address));
        }
        result
    }

    fn visit_node(
        &self,
        walk: &mut Walk,
        path: &str,
        type_name: &str,
        address: Address,
        depth: usize,
    ) -> MemtypeResult<Value>
    {
        if depth > self.options.max_depth {
            return Err(MemtypeError::DepthExceeded(self.options.max_depth));
        }
        let (resolved, descriptor) = self.catalog.resolve(type_name)?;
        trace!(path, address = %address, kind = descriptor.kind_name(), "visit");

        match descriptor {
            TypeDescriptor::CString => {
                let text = read_cstring(self.reader, address, self.options.max_string_len)?;
                let value = Value::String(text);
                walk.index.push(path, address, value.clone());
                Ok(value)
            }
            TypeDescriptor::Struct { members } => {
                let slot = walk.index.reserve(path, address);
                let mut record = Record::with_capacity(members.len());
                let mut offset = 0u64;
                for member in members {
                    let child = self.visit(walk, path, &member.type_name, address + offset, depth + 1)?;
                    offset += self.catalog.resolve_size(&member.type_name)? as u64;
                    record.push(member.name.clone(), child);
                }
                let value = Value::Record(record);
                walk.index.fill(slot, value.clone());
                Ok(value)
            }
            TypeDescriptor::Union { .. } => {
                let size = self.catalog.resolve_size(resolved)?;
                let value = Value::Bytes(self.reader.read(address, size)?);
                walk.index.push(path, address, value.clone());
                Ok(value)
            }
            TypeDescriptor::Array { element, length } => {
                let slot = walk.index.reserve(path, address);
                let element_size = self.catalog.resolve_size(element)? as u64;
                // `length` is untrusted; grow only as elements are read
                let mut items = Vec::new();
                let mut cursor = address;
                for _ in 0..*length {
                    items.push(self.visit(walk, path, element, cursor, depth + 1)?);
                    cursor = cursor + element_size;
                }
                let value = Value::Array(items);
                walk.index.fill(slot, value.clone());
                Ok(value)
            }
            TypeDescriptor::Primitive { size, class } => {
                let bytes = self.reader.read(address, *size)?;
                let value = Value::from(self.catalog.codec().decode(&bytes, *size, *class)?);
                walk.index.push(path, address, value.clone());
                Ok(value)
            }
            TypeDescriptor::Enum => {
                let width = self.catalog.profile().int;
                let bytes = self.reader.read(address, width)?;
                let value = Value::from(self.catalog.codec().decode(&bytes, width, ScalarClass::Enum)?);
                walk.index.push(path, address, value.clone());
                Ok(value)
            }
            TypeDescriptor::Pointer { pointee } => {
                let raw = self.read_pointer(address)?;
                walk.index.push(path, address, Value::Unsigned(raw));
                match pointee {
                    Some(pointee) if self.should_follow(type_name, resolved, raw)? => {
                        self.follow(walk, path, pointee, Address::from(raw), depth)
                    }
                    _ => Ok(Value::Unsigned(raw)),
                }
            }
            // `resolve` never stops on a typedef
            TypeDescriptor::Typedef { target } => Err(MemtypeError::CyclicType(target.clone())),
        }
    }

    /// Raw value of the pointer stored at `address`.
    fn read_pointer(&self, address: Address) -> MemtypeResult<u64>
    {
        let width = self.catalog.profile().pointer;
        let bytes = match self.reader.read(address, width) {
            Ok(bytes) => bytes,
            Err(err) if self.options.zero_fill_pointers && err.is_read_failure() => {
                warn!(address = %address, error = %err, "pointer field unreadable, using 0");
                vec![0; width]
            }
            Err(err) => return Err(err),
        };
        let scalar = self.catalog.codec().decode(&bytes, width, ScalarClass::Pointer)?;
        Ok(scalar.as_u64().unwrap_or_default())
    }

    fn should_follow(&self, type_name: &str, resolved: &str, raw: u64) -> MemtypeResult<bool>
    {
        if raw == 0 || self.options.no_follow.contains(type_name) || self.options.no_follow.contains(resolved) {
            return Ok(false);
        }
        self.catalog.is_followable(resolved)
    }

    fn follow(&self, walk: &mut Walk, path: &str, pointee: &str, target: Address, depth: usize) -> MemtypeResult<Value>
    {
        if walk.following.iter().any(|(name, at)| name == pointee && *at == target) {
            return Err(MemtypeError::PointerCycle {
                type_name: pointee.to_string(),
                address: target,
            });
        }

        let recorded = walk.index.len();
        walk.following.push((pointee.to_string(), target));
        let result = self.visit(walk, path, pointee, target, depth + 1);
        walk.following.pop();

        match result {
            Ok(value) => Ok(value),
            Err(err @ MemtypeError::ReadFailure { .. }) => {
                debug!(path, target = %target, error = %err, "pointee unreadable, keeping raw address");
                walk.index.truncate(recorded);
                walk.failure = None;
                Ok(Value::Unsigned(target.value()))
            }
            Err(err) => Err(err),
        }
    }
}

fn join_path(parent: &str, type_name: &str) -> String
{
    if parent.is_empty() {
        type_name.to_string()
    } else {
        format!("{parent}.{type_name}")
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_join_path()
    {
        assert_eq!(join_path("", "S"), "S");
        assert_eq!(join_path("S", "int"), "S.int");
    }

    #[test]
    fn test_default_options()
    {
        let options = MaterializeOptions::default();
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(options.max_string_len, Some(DEFAULT_MAX_STRING_LEN));
        assert!(options.zero_fill_pointers);
        assert!(options.no_follow.is_empty());
    }
}
