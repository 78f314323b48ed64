//! Type descriptors and the JSON type database format.
//!
//! A database is a JSON object mapping type names to records:
//!
//! ```json
//! {
//!     "u32le":  { "flags": ["unsigned"], "size": 4 },
//!     "Node":   { "flags": ["struct"], "members": [["value", "u32le", ""], ["next", "PNode", "link"]] },
//!     "PNode":  { "flags": ["pointer"], "ref": "Node" },
//!     "Bytes":  { "flags": ["array"], "element": "uchar", "length": 16 },
//!     "Handle": { "flags": ["typedef", "pointer"], "typedef": "PNode" }
//! }
//! ```
//!
//! `size` is only authoritative for primitives; composite sizes are always
//! recomputed by the catalog.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::codec::ScalarClass;
use crate::error::{MemtypeError, MemtypeResult};

/// Flag tags allowed in a record's `flags` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFlag
{
    Signed,
    Unsigned,
    Float,
    Pointer,
    Array,
    Struct,
    Union,
    Enum,
    Typedef,
    Cstring,
}

/// One member of a struct or union
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member
{
    pub name: String,
    pub type_name: String,
    pub comment: String,
}

impl Member
{
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            comment: String::new(),
        }
    }
}

/// Shape of a named type
///
/// Sizes of everything but primitives are derived by the catalog and never
/// stored here.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor
{
    /// Fixed-width scalar read through the codec
    Primitive
    {
        size: usize,
        class: ScalarClass,
    },
    /// Address of a value of `pointee`; `None` is an opaque pointer
    Pointer
    {
        pointee: Option<String>,
    },
    Array
    {
        element: String,
        length: usize,
    },
    /// Members laid out back to back, no padding
    Struct
    {
        members: Vec<Member>,
    },
    /// Members overlaid at offset 0
    Union
    {
        members: Vec<Member>,
    },
    /// Signed integer with the width of `int`
    Enum,
    Typedef
    {
        target: String,
    },
    /// Zero-terminated byte string
    CString,
}

impl TypeDescriptor
{
    /// Short label used in logs and diagnostics.
    pub fn kind_name(&self) -> &'static str
    {
        match self {
            TypeDescriptor::Primitive { .. } => "primitive",
            TypeDescriptor::Pointer { .. } => "pointer",
            TypeDescriptor::Array { .. } => "array",
            TypeDescriptor::Struct { .. } => "struct",
            TypeDescriptor::Union { .. } => "union",
            TypeDescriptor::Enum => "enum",
            TypeDescriptor::Typedef { .. } => "typedef",
            TypeDescriptor::CString => "cstring",
        }
    }

    /// Struct or union members, empty for every other kind.
    pub fn members(&self) -> &[Member]
    {
        match self {
            TypeDescriptor::Struct { members } | TypeDescriptor::Union { members } => members,
            _ => &[],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawType
{
    flags: Vec<TypeFlag>,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default, rename = "ref")]
    pointee: Option<String>,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    length: Option<usize>,
    #[serde(default)]
    members: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    typedef: Option<String>,
}

impl RawType
{
    fn has(&self, flag: TypeFlag) -> bool
    {
        self.flags.contains(&flag)
    }

    /// Flags are checked in a fixed precedence: typedef, enum, pointer,
    /// array, struct, union, cstring, then the scalar classes. Exported
    /// databases tag typedefs with their base kind as well, so `typedef`
    /// must win.
    fn into_descriptor(self, name: &str) -> MemtypeResult<TypeDescriptor>
    {
        let missing = |key: &str| MemtypeError::MalformedInput(format!("type '{name}' is missing '{key}'"));

        if self.has(TypeFlag::Typedef) {
            let target = self.typedef.ok_or_else(|| missing("typedef"))?;
            return Ok(TypeDescriptor::Typedef { target });
        }
        if self.has(TypeFlag::Enum) {
            return Ok(TypeDescriptor::Enum);
        }
        if self.has(TypeFlag::Pointer) {
            let pointee = self.pointee.filter(|p| !p.is_empty());
            return Ok(TypeDescriptor::Pointer { pointee });
        }
        if self.has(TypeFlag::Array) {
            let element = self.element.ok_or_else(|| missing("element"))?;
            let length = self.length.ok_or_else(|| missing("length"))?;
            return Ok(TypeDescriptor::Array { element, length });
        }
        if self.has(TypeFlag::Struct) || self.has(TypeFlag::Union) {
            let is_struct = self.has(TypeFlag::Struct);
            let raw_members = self.members.ok_or_else(|| missing("members"))?;
            let members = raw_members
                .into_iter()
                .enumerate()
                .map(|(index, triple)| parse_member(name, index, triple))
                .collect::<MemtypeResult<Vec<_>>>()?;
            return Ok(if is_struct {
                TypeDescriptor::Struct { members }
            } else {
                TypeDescriptor::Union { members }
            });
        }
        if self.has(TypeFlag::Cstring) {
            return Ok(TypeDescriptor::CString);
        }

        let class = if self.has(TypeFlag::Float) {
            ScalarClass::Float
        } else if self.has(TypeFlag::Signed) {
            ScalarClass::Signed
        } else if self.has(TypeFlag::Unsigned) {
            ScalarClass::Unsigned
        } else {
            return Err(MemtypeError::MalformedInput(format!("type '{name}' has no kind flag")));
        };
        let size = self.size.ok_or_else(|| missing("size"))?;
        Ok(TypeDescriptor::Primitive { size, class })
    }
}

/// Members are `[name, type, comment]`; the comment is optional and an
/// unnamed member (`null` name) gets `field_<index>`.
fn parse_member(owner: &str, index: usize, triple: Vec<Option<String>>) -> MemtypeResult<Member>
{
    let mut parts = triple.into_iter();
    let name = parts.next().flatten();
    let Some(type_name) = parts.next().flatten() else {
        return Err(MemtypeError::MalformedInput(format!(
            "member {index} of '{owner}' has no type name"
        )));
    };
    let comment = parts.next().flatten().unwrap_or_default();

    Ok(Member {
        name: name.unwrap_or_else(|| format!("field_{index}")),
        type_name,
        comment,
    })
}

/// Parse a JSON type database into descriptors.
///
/// ## Errors
///
/// - `Json`: the document is not a JSON object of records
/// - `MalformedInput`: a record lacks a key its kind requires
pub fn parse_database(json: &str) -> MemtypeResult<BTreeMap<String, TypeDescriptor>>
{
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|(name, value)| {
            let record: RawType = serde_json::from_value(value)
                .map_err(|err| MemtypeError::MalformedInput(format!("type '{name}': {err}")))?;
            let descriptor = record.into_descriptor(&name)?;
            Ok((name, descriptor))
        })
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_typedef_flag_wins_over_base_kind()
    {
        let db = parse_database(r#"{"H": {"flags": ["typedef", "pointer"], "typedef": "P", "size": 8}}"#).unwrap();
        assert_eq!(db["H"], TypeDescriptor::Typedef { target: "P".into() });
    }

    #[test]
    fn test_empty_ref_is_opaque()
    {
        let db = parse_database(r#"{"P": {"flags": ["pointer"], "ref": ""}, "Q": {"flags": ["pointer"], "ref": null}}"#)
            .unwrap();
        assert_eq!(db["P"], TypeDescriptor::Pointer { pointee: None });
        assert_eq!(db["Q"], TypeDescriptor::Pointer { pointee: None });
    }

    #[test]
    fn test_member_defaults()
    {
        let db = parse_database(r#"{"S": {"flags": ["struct"], "members": [["a", "u8"], [null, "u8", "pad"]]}}"#).unwrap();
        let members = db["S"].members();
        assert_eq!(members[0], Member::new("a", "u8"));
        assert_eq!(members[1].name, "field_1");
        assert_eq!(members[1].comment, "pad");
    }

    #[test]
    fn test_missing_keys_are_malformed()
    {
        for json in [
            r#"{"A": {"flags": ["array"], "element": "u8"}}"#,
            r#"{"S": {"flags": ["struct"]}}"#,
            r#"{"T": {"flags": ["typedef"]}}"#,
            r#"{"U": {"flags": ["unsigned"]}}"#,
            r#"{"S": {"flags": ["struct"], "members": [["a"]]}}"#,
            r#"{"X": {"flags": []}}"#,
            r#"{"X": {"flags": ["bogus"], "size": 1}}"#,
        ] {
            let err = parse_database(json).unwrap_err();
            assert!(matches!(err, MemtypeError::MalformedInput(_)), "{json}: {err}");
        }
    }
}
