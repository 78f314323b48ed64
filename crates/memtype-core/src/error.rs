//! # Error Types
//!
//! General error handling for type decoding and address lookup.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::codec::{ByteOrder, ScalarClass};
use crate::types::Address;

/// Main error type for catalog, decoding and lookup operations
///
/// ## Error Categories
///
/// 1. **Structural errors**: UnknownType, CyclicType, NoMatchingEncoding
/// 2. **Configuration errors**: UnknownProfile, MalformedInput
/// 3. **Data-acquisition errors**: ReadFailure, UnboundedRead
/// 4. **Guard errors**: DepthExceeded, PointerCycle
/// 5. **Context**: Materialize wraps any of the above with the failing path
///
/// Structural and configuration errors always surface to the caller.
/// Data-acquisition errors are propagated by default; the materializer only
/// substitutes zero bytes for the read of a pointer-typed field.
#[derive(Error, Debug)]
pub enum MemtypeError
{
    /// A type name was referenced but is not present in the catalog
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// The architecture profile tag is not one of `native`, `32le`, `32be`, `64le`, `64be`
    #[error("Unknown architecture profile: {0}")]
    UnknownProfile(String),

    /// Zero or more than one scalar encoding matches the requested tuple
    ///
    /// Ambiguity is treated as a configuration error rather than resolved
    /// silently.
    #[error("No matching encoding for width {width}, order {order}, class {class} ({candidates} candidates)")]
    NoMatchingEncoding
    {
        /// Width in bytes
        width: usize,
        /// Byte order of the active profile
        order: ByteOrder,
        /// Requested scalar class
        class: ScalarClass,
        /// Number of table entries that matched (0 or more than 1)
        candidates: usize,
    },

    /// The memory collaborator could not supply the requested bytes
    #[error("Failed to read {len} bytes at {address}: {reason}")]
    ReadFailure
    {
        /// Start of the failed read
        address: Address,
        /// Number of bytes requested
        len: usize,
        /// Collaborator-specific detail
        reason: String,
    },

    /// A type database entry or map-file line could not be parsed
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A type contains itself by value (directly or through typedefs/arrays/members)
    #[error("Type contains itself by value: {0}")]
    CyclicType(String),

    /// A terminator scan ran past its configured cap
    #[error("No terminator within {limit} bytes starting at {address}")]
    UnboundedRead
    {
        /// Start of the scan
        address: Address,
        /// Configured maximum
        limit: usize,
    },

    /// Nesting went deeper than the configured maximum
    #[error("Maximum nesting depth {0} exceeded")]
    DepthExceeded(usize),

    /// A followed pointer led back to a value that is still being decoded
    #[error("Pointer cycle: {type_name} at {address} is already being decoded")]
    PointerCycle
    {
        /// Pointee type name
        type_name: String,
        /// Address revisited
        address: Address,
    },

    /// A top-level materialize call failed
    ///
    /// Carries the dot-joined type path and address of the node whose
    /// decoding failed, so users see where in the tree things went wrong.
    #[error("Failed to materialize {path} at {address}: {source}")]
    Materialize
    {
        /// Dot-joined type-name path of the failing node
        path: String,
        /// Address the failing node was read from
        address: Address,
        /// Underlying error
        #[source]
        source: Box<MemtypeError>,
    },

    /// JSON parse error while loading a type database
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (for file operations, /proc access, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemtypeError
{
    /// Build a `ReadFailure` for the given range.
    pub fn read_failure(address: Address, len: usize, reason: impl Into<String>) -> Self
    {
        Self::ReadFailure {
            address,
            len,
            reason: reason.into(),
        }
    }

    /// Whether this error came from acquiring bytes rather than from the
    /// type graph or configuration.
    pub fn is_read_failure(&self) -> bool
    {
        match self {
            Self::ReadFailure { .. } | Self::UnboundedRead { .. } => true,
            Self::Materialize { source, .. } => source.is_read_failure(),
            _ => false,
        }
    }
}

/// Convenience type alias for `Result<T, MemtypeError>`
///
/// ```rust
/// use memtype_core::error::MemtypeResult;
/// fn foo() -> MemtypeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type MemtypeResult<T> = std::result::Result<T, MemtypeError>;
