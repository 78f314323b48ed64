//! # Type Catalog
//!
//! Owns the type database, resolves typedef chains and computes the byte
//! size of every type.
//!
//! Sizes are derived, never trusted from the input: a struct is the sum of
//! its members, a union the largest member, an array `element * length`,
//! enums take the width of `int` and pointers the width of `pointer`.
//! Results are memoized per name; installing a new architecture profile
//! throws the memo away and recomputes every type.
//!
//! ## Concurrency
//!
//! Every mutating operation takes `&mut self`, so a profile change cannot
//! overlap a materialization that borrows the catalog. Callers that share
//! a catalog between threads should put it behind an `RwLock` and take
//! the write side for `load`/`set_architecture_profile`.
//!
//! ## Example
//!
//! ```rust
//! use memtype_core::catalog::{ArchitectureProfile, TypeCatalog};
//!
//! let mut catalog = TypeCatalog::with_profile("64le".parse()?);
//! catalog.load_json(r#"{
//!     "u32le": { "flags": ["unsigned"], "size": 4 },
//!     "u8":    { "flags": ["unsigned"], "size": 1 },
//!     "S":     { "flags": ["struct"], "members": [["a", "u32le"], ["b", "u8"]] }
//! }"#)?;
//! assert_eq!(catalog.resolve_size("S")?, 5);
//! assert_eq!(catalog.resolve_size("pointer")?, 8);
//! # Ok::<(), memtype_core::MemtypeError>(())
//! ```

pub mod descriptor;
pub mod profile;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

pub use descriptor::{Member, TypeDescriptor, TypeFlag};
pub use profile::{ArchitectureProfile, ProfileTag, PRIMITIVE_NAMES};
use tracing::{debug, warn};

use crate::codec::{ScalarClass, ScalarCodec};
use crate::error::{MemtypeError, MemtypeResult};

/// Name of the built-in zero-terminated string type.
pub const CSTRING: &str = "cstring";

/// Name-to-descriptor database with memoized sizes
#[derive(Debug)]
pub struct TypeCatalog
{
    types: BTreeMap<String, TypeDescriptor>,
    profile: ArchitectureProfile,
    sizes: RwLock<HashMap<String, usize>>,
}

impl Default for TypeCatalog
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl TypeCatalog
{
    /// Empty catalog using the `native` profile.
    pub fn new() -> Self
    {
        Self::with_profile(ArchitectureProfile::native())
    }

    /// Empty catalog with the primitives of `profile` installed.
    pub fn with_profile(profile: ArchitectureProfile) -> Self
    {
        let mut catalog = Self {
            types: BTreeMap::new(),
            profile,
            sizes: RwLock::new(HashMap::new()),
        };
        catalog.set_architecture_profile(profile);
        catalog
    }

    pub fn profile(&self) -> ArchitectureProfile
    {
        self.profile
    }

    /// Codec bound to the current profile's byte order.
    pub fn codec(&self) -> ScalarCodec
    {
        ScalarCodec::new(self.profile.byte_order)
    }

    pub fn len(&self) -> usize
    {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool
    {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.types.keys().map(String::as_str)
    }

    /// Merge `entries` into the catalog
    ///
    /// Later entries overwrite earlier ones with the same name. The profile
    /// primitives and `cstring` are reinstalled afterwards, so a database
    /// cannot redefine them, and every size is recomputed.
    pub fn load<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, TypeDescriptor)>,
    {
        let before = self.types.len();
        self.types.extend(entries);
        debug!(added = self.types.len() - before, total = self.types.len(), "merged type entries");
        self.set_architecture_profile(self.profile);
    }

    /// Parse and merge a JSON type database. Returns the number of entries read.
    pub fn load_json(&mut self, json: &str) -> MemtypeResult<usize>
    {
        let entries = descriptor::parse_database(json)?;
        let count = entries.len();
        self.load(entries);
        Ok(count)
    }

    /// Read a JSON type database from disk and merge it.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> MemtypeResult<usize>
    {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let count = self.load_json(&json)?;
        debug!(path = %path.display(), count, "loaded type database");
        Ok(count)
    }

    /// Parse a profile tag and install it.
    ///
    /// ## Errors
    ///
    /// `UnknownProfile` if the tag is not one of `native`, `32le`, `32be`,
    /// `64le`, `64be`.
    pub fn set_profile_tag(&mut self, tag: &str) -> MemtypeResult<()>
    {
        let profile = tag.parse::<ArchitectureProfile>()?;
        self.set_architecture_profile(profile);
        Ok(())
    }

    /// Install the primitives and byte order of `profile`, then recompute
    /// every derived size.
    ///
    /// Types that fail to resolve (dangling references, value cycles) are
    /// logged and left unresolved; `resolve_size` reports the error when
    /// they are asked for.
    pub fn set_architecture_profile(&mut self, profile: ArchitectureProfile)
    {
        for name in PRIMITIVE_NAMES {
            let descriptor = match profile.primitive(name) {
                Some((_, ScalarClass::Pointer)) | None => TypeDescriptor::Pointer { pointee: None },
                Some((size, class)) => TypeDescriptor::Primitive { size, class },
            };
            self.types.insert(name.to_string(), descriptor);
        }
        self.types.insert(CSTRING.to_string(), TypeDescriptor::CString);
        self.profile = profile;
        self.sync();
    }

    /// Throw away memoized sizes and recompute the closure of every type.
    fn sync(&mut self)
    {
        let mut memo = HashMap::with_capacity(self.types.len());
        let mut failed = 0usize;
        for name in self.types.keys() {
            let mut visiting = HashSet::new();
            if let Err(err) = self.compute_closure(&mut memo, &mut visiting, name) {
                failed += 1;
                warn!(type_name = %name, error = %err, "type size could not be resolved");
            }
        }
        debug!(
            profile = %self.profile.tag,
            resolved = memo.len(),
            failed,
            "recomputed type sizes"
        );
        *self.sizes.get_mut().unwrap_or_else(PoisonError::into_inner) = memo;
    }

    /// Descriptor registered under `name`.
    pub fn get(&self, name: &str) -> MemtypeResult<&TypeDescriptor>
    {
        self.types
            .get(name)
            .ok_or_else(|| MemtypeError::UnknownType(name.to_string()))
    }

    /// Follow typedefs from `name` to the first non-typedef descriptor.
    ///
    /// Returns the resolved name together with its descriptor.
    pub fn resolve<'a>(&'a self, name: &'a str) -> MemtypeResult<(&'a str, &'a TypeDescriptor)>
    {
        let mut current = name;
        let mut hops = 0usize;
        loop {
            match self.get(current)? {
                TypeDescriptor::Typedef { target } => {
                    hops += 1;
                    if hops > self.types.len() {
                        return Err(MemtypeError::CyclicType(name.to_string()));
                    }
                    current = target;
                }
                descriptor => return Ok((current, descriptor)),
            }
        }
    }

    /// Byte size of `name`, memoized.
    ///
    /// ## Errors
    ///
    /// - `UnknownType`: `name` or something it contains by value is missing
    /// - `CyclicType`: `name` contains itself by value
    pub fn resolve_size(&self, name: &str) -> MemtypeResult<usize>
    {
        if let Some(size) = self.sizes.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            return Ok(*size);
        }

        let mut memo = self.sizes.write().unwrap_or_else(PoisonError::into_inner);
        let mut visiting = HashSet::new();
        self.compute_closure(&mut memo, &mut visiting, name)
    }

    /// Recursive size computation
    ///
    /// `memo` doubles as the seen set; `visiting` holds the names on the
    /// current recursion path, which is how value-type cycles are caught.
    /// Pointers never recurse into their pointee, so self-referential types
    /// linked through pointers resolve normally.
    fn compute_closure(
        &self,
        memo: &mut HashMap<String, usize>,
        visiting: &mut HashSet<String>,
        name: &str,
    ) -> MemtypeResult<usize>
    {
        if let Some(size) = memo.get(name) {
            return Ok(*size);
        }
        let descriptor = self.get(name)?;
        if !visiting.insert(name.to_string()) {
            return Err(MemtypeError::CyclicType(name.to_string()));
        }

        let size = match descriptor {
            TypeDescriptor::Primitive { size, .. } => Ok(*size),
            TypeDescriptor::CString => Ok(0),
            TypeDescriptor::Enum => Ok(self.profile.int),
            TypeDescriptor::Pointer { .. } => Ok(self.profile.pointer),
            TypeDescriptor::Typedef { target } => self.compute_closure(memo, visiting, target),
            TypeDescriptor::Array { element, length } => {
                self.compute_closure(memo, visiting, element).and_then(|element_size| {
                    element_size.checked_mul(*length).ok_or_else(|| {
                        MemtypeError::MalformedInput(format!("array '{name}' size overflows"))
                    })
                })
            }
            TypeDescriptor::Struct { members } | TypeDescriptor::Union { members } => {
                let is_struct = matches!(descriptor, TypeDescriptor::Struct { .. });
                let mut total = 0usize;
                let mut largest = 0usize;
                let mut result = Ok(());
                for member in members {
                    match self.compute_closure(memo, visiting, &member.type_name) {
                        Ok(member_size) => {
                            total = total.saturating_add(member_size);
                            largest = largest.max(member_size);
                        }
                        Err(err) => {
                            result = Err(err);
                            break;
                        }
                    }
                }
                result.map(|()| {
                    let size = if is_struct { total } else { largest };
                    if size == 0 {
                        debug!(type_name = %name, "zero-sized {} widened to 1 byte", descriptor.kind_name());
                        1
                    } else {
                        size
                    }
                })
            }
        };

        visiting.remove(name);
        let size = size?;
        memo.insert(name.to_string(), size);
        Ok(size)
    }

    /// Follow typedefs and pointer chains from `name` to the first
    /// non-pointer type. Returns `None` when the chain hits an opaque pointer.
    fn chain_end<'a>(&'a self, name: &'a str) -> MemtypeResult<Option<(&'a str, &'a TypeDescriptor)>>
    {
        let mut current = name;
        let mut hops = 0usize;
        loop {
            match self.resolve(current)? {
                (_, TypeDescriptor::Pointer { pointee: Some(pointee) }) => {
                    hops += 1;
                    if hops > self.types.len() {
                        return Err(MemtypeError::CyclicType(name.to_string()));
                    }
                    current = pointee;
                }
                (_, TypeDescriptor::Pointer { pointee: None }) => return Ok(None),
                end => return Ok(Some(end)),
            }
        }
    }

    /// Size of what a pointer ultimately points at
    ///
    /// Follows typedefs and chains of pointers from `name` until a
    /// non-pointer is reached. Returns `None` for an opaque pointer
    /// anywhere in the chain.
    pub fn underlying_size(&self, name: &str) -> MemtypeResult<Option<usize>>
    {
        match self.chain_end(name)? {
            Some((resolved, _)) => self.resolve_size(resolved).map(Some),
            None => Ok(None),
        }
    }

    /// Whether a pointer type has something worth dereferencing: a pointee
    /// chain ending in a `cstring` or in a type of nonzero size.
    ///
    /// Returns `false` for non-pointer types.
    pub fn is_followable(&self, name: &str) -> MemtypeResult<bool>
    {
        let (_, descriptor) = self.resolve(name)?;
        let TypeDescriptor::Pointer { pointee: Some(pointee) } = descriptor else {
            return Ok(false);
        };
        match self.chain_end(pointee)? {
            Some((_, TypeDescriptor::CString)) => Ok(true),
            Some((resolved, _)) => Ok(self.resolve_size(resolved)? != 0),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_profile_installs_every_primitive()
    {
        let catalog = TypeCatalog::with_profile("32le".parse().unwrap());
        for name in PRIMITIVE_NAMES {
            assert!(catalog.contains(name), "{name}");
        }
        assert!(catalog.contains(CSTRING));
        assert_eq!(catalog.resolve_size("ssize_t").unwrap(), 4);
        assert_eq!(catalog.resolve_size("long").unwrap(), 8);
    }

    #[test]
    fn test_memo_is_filled_by_sync()
    {
        let mut catalog = TypeCatalog::new();
        catalog.load(vec![("A".to_string(), TypeDescriptor::Array {
            element: "int".into(),
            length: 3,
        })]);
        let memo = catalog.sizes.read().unwrap();
        assert!(memo.contains_key("A"));
    }
}
