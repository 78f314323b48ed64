//! Materialized value trees and the flattened path index.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::codec::Scalar;
use crate::types::Address;

/// A decoded value
///
/// Serializes to plain JSON: scalars as numbers, strings as strings, arrays
/// and union bytes as lists, records as objects in member order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value
{
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    /// Contents of a `cstring`
    String(String),
    /// Array elements in index order
    Array(Vec<Value>),
    /// Struct members in declaration order
    Record(Record),
    /// Raw bytes of a union
    Bytes(Vec<u8>),
}

impl Value
{
    pub fn as_u64(&self) -> Option<u64>
    {
        match self {
            Value::Unsigned(value) => Some(*value),
            Value::Signed(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64>
    {
        match self {
            Value::Signed(value) => Some(*value),
            Value::Unsigned(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64>
    {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str>
    {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]>
    {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record>
    {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]>
    {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Member `name` of a record value.
    pub fn field(&self, name: &str) -> Option<&Value>
    {
        self.as_record().and_then(|record| record.get(name))
    }
}

impl From<Scalar> for Value
{
    fn from(scalar: Scalar) -> Self
    {
        match scalar {
            Scalar::Unsigned(value) => Value::Unsigned(value),
            Scalar::Signed(value) => Value::Signed(value),
            Scalar::Float(value) => Value::Float(value),
        }
    }
}

impl fmt::Display for Value
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Value::Unsigned(value) => write!(f, "{value:#x}"),
            Value::Signed(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(record) => {
                write!(f, "{{")?;
                for (i, (name, value)) in record.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered member-name to value map
///
/// Member names are unique within a well-formed struct, but a database may
/// repeat one; [`get`](Record::get) then returns the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record
{
    fields: Vec<(String, Value)>,
}

impl Record
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self
    {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value)
    {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value>
    {
        self.fields
            .iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    /// Member at declaration position `index`.
    pub fn get_index(&self, index: usize) -> Option<(&str, &Value)>
    {
        self.fields.get(index).map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize
    {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)>
    {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for Record
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One visited node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathEntry
{
    /// Dot-joined type-name trail from the root
    pub path: String,
    pub address: Address,
    /// Value of the node; the raw address for pointers
    pub value: Value,
}

/// Every node visited by a materialization, in visit order
///
/// Composites are listed before their children. A path can repeat (array
/// elements and same-typed members share one), so lookups by path return
/// the most recent entry and [`get_all`](PathIndex::get_all) the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PathIndex
{
    entries: Vec<PathEntry>,
}

impl PathIndex
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub(crate) fn push(&mut self, path: &str, address: Address, value: Value)
    {
        self.entries.push(PathEntry {
            path: path.to_string(),
            address,
            value,
        });
    }

    /// Reserve a slot for a composite whose value is known only after its
    /// children have been visited.
    pub(crate) fn reserve(&mut self, path: &str, address: Address) -> usize
    {
        self.push(path, address, Value::Array(Vec::new()));
        self.entries.len() - 1
    }

    pub(crate) fn fill(&mut self, slot: usize, value: Value)
    {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.value = value;
        }
    }

    /// Drop every entry from `len` on.
    pub(crate) fn truncate(&mut self, len: usize)
    {
        self.entries.truncate(len);
    }

    /// Most recent entry recorded under `path`.
    pub fn get(&self, path: &str) -> Option<&PathEntry>
    {
        self.entries.iter().rev().find(|entry| entry.path == path)
    }

    /// Every entry recorded under `path`, in visit order.
    pub fn get_all<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a PathEntry> + 'a
    {
        self.entries.iter().filter(move |entry| entry.path == path)
    }

    pub fn contains(&self, path: &str) -> bool
    {
        self.entries.iter().any(|entry| entry.path == path)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathEntry>
    {
        self.entries.iter()
    }
}
