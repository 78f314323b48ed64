//! # Scalar Codec
//!
//! Fixed-width scalar encodings and the rule that picks one for a type.
//!
//! The table below lists every encoding the decoder knows. Selection is by
//! exact tuple match on `(width, byte order, class)`, where single-byte
//! encodings are order independent. Pointers decode through the unsigned
//! encoding of their width and enums through the signed one.
//!
//! ```rust
//! use memtype_core::codec::{ByteOrder, Scalar, ScalarClass, ScalarCodec};
//!
//! let le = ScalarCodec::new(ByteOrder::Little);
//! let be = ScalarCodec::new(ByteOrder::Big);
//! assert_eq!(le.decode(&[0x01, 0x02], 2, ScalarClass::Unsigned)?, Scalar::Unsigned(0x0201));
//! assert_eq!(be.decode(&[0x01, 0x02], 2, ScalarClass::Unsigned)?, Scalar::Unsigned(0x0102));
//! # Ok::<(), memtype_core::MemtypeError>(())
//! ```

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{MemtypeError, MemtypeResult};

/// Byte order of multi-byte scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder
{
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder
{
    /// Byte order of the machine this code runs on.
    pub const fn native() -> Self
    {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

impl fmt::Display for ByteOrder
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ByteOrder::Little => write!(f, "little"),
            ByteOrder::Big => write!(f, "big"),
        }
    }
}

/// Byte order an encoding is defined for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingOrder
{
    /// Single-byte encodings read the same under every order
    Any,
    /// Multi-byte encodings are bound to one order
    Fixed(ByteOrder),
}

impl EncodingOrder
{
    fn matches(self, order: ByteOrder) -> bool
    {
        match self {
            EncodingOrder::Any => true,
            EncodingOrder::Fixed(fixed) => fixed == order,
        }
    }
}

/// How the bytes of a scalar are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarClass
{
    /// Two's-complement signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
    /// IEEE-754 float
    Float,
    /// Pointer; decodes through the unsigned encoding of its width
    Pointer,
    /// Enumeration; decodes through the signed encoding of its width
    Enum,
}

impl ScalarClass
{
    /// Class of the table entry this class decodes through.
    pub const fn encoding_class(self) -> ScalarClass
    {
        match self {
            ScalarClass::Pointer => ScalarClass::Unsigned,
            ScalarClass::Enum => ScalarClass::Signed,
            other => other,
        }
    }
}

impl fmt::Display for ScalarClass
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            ScalarClass::Signed => "signed",
            ScalarClass::Unsigned => "unsigned",
            ScalarClass::Float => "float",
            ScalarClass::Pointer => "pointer",
            ScalarClass::Enum => "enum",
        };
        write!(f, "{label}")
    }
}

/// A decoded scalar
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar
{
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Scalar
{
    /// Value as an address-sized integer, if it is an integer.
    pub fn as_u64(self) -> Option<u64>
    {
        match self {
            Scalar::Unsigned(value) => Some(value),
            Scalar::Signed(value) => Some(value as u64),
            Scalar::Float(_) => None,
        }
    }

    /// Equality used by value scans: integers compare numerically across
    /// signedness, floats compare exactly.
    pub fn loosely_equals(self, other: Scalar) -> bool
    {
        match (self, other) {
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::Float(_), _) | (_, Scalar::Float(_)) => false,
            (Scalar::Unsigned(a), Scalar::Unsigned(b)) => a == b,
            (Scalar::Signed(a), Scalar::Signed(b)) => a == b,
            (Scalar::Unsigned(a), Scalar::Signed(b)) | (Scalar::Signed(b), Scalar::Unsigned(a)) => {
                i128::from(a) == i128::from(b)
            }
        }
    }
}

impl fmt::Display for Scalar
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Scalar::Unsigned(value) => write!(f, "{value}"),
            Scalar::Signed(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
        }
    }
}

/// One entry of the encoding table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding
{
    /// Short name, e.g. `u32le`
    pub name: &'static str,
    /// Width in bytes
    pub width: usize,
    /// Byte order the encoding is defined for
    pub order: EncodingOrder,
    /// `Signed`, `Unsigned` or `Float`
    pub class: ScalarClass,
}

const fn enc(name: &'static str, width: usize, order: EncodingOrder, class: ScalarClass) -> Encoding
{
    Encoding {
        name,
        width,
        order,
        class,
    }
}

const LE: EncodingOrder = EncodingOrder::Fixed(ByteOrder::Little);
const BE: EncodingOrder = EncodingOrder::Fixed(ByteOrder::Big);

/// Every encoding the decoder knows.
pub const ENCODINGS: &[Encoding] = &[
    enc("u8", 1, EncodingOrder::Any, ScalarClass::Unsigned),
    enc("u16le", 2, LE, ScalarClass::Unsigned),
    enc("u16be", 2, BE, ScalarClass::Unsigned),
    enc("u32le", 4, LE, ScalarClass::Unsigned),
    enc("u32be", 4, BE, ScalarClass::Unsigned),
    enc("u64le", 8, LE, ScalarClass::Unsigned),
    enc("u64be", 8, BE, ScalarClass::Unsigned),
    enc("s8", 1, EncodingOrder::Any, ScalarClass::Signed),
    enc("s16le", 2, LE, ScalarClass::Signed),
    enc("s16be", 2, BE, ScalarClass::Signed),
    enc("s32le", 4, LE, ScalarClass::Signed),
    enc("s32be", 4, BE, ScalarClass::Signed),
    enc("s64le", 8, LE, ScalarClass::Signed),
    enc("s64be", 8, BE, ScalarClass::Signed),
    enc("f32le", 4, LE, ScalarClass::Float),
    enc("f32be", 4, BE, ScalarClass::Float),
    enc("f64le", 8, LE, ScalarClass::Float),
    enc("f64be", 8, BE, ScalarClass::Float),
];

static ENCODINGS_BY_NAME: Lazy<HashMap<&'static str, &'static Encoding>> =
    Lazy::new(|| ENCODINGS.iter().map(|encoding| (encoding.name, encoding)).collect());

impl Encoding
{
    /// Look an encoding up by its short name.
    pub fn by_name(name: &str) -> Option<&'static Encoding>
    {
        ENCODINGS_BY_NAME.get(name).copied()
    }

    /// Byte order to use when reading this encoding under `fallback`.
    fn effective_order(&self, fallback: ByteOrder) -> ByteOrder
    {
        match self.order {
            EncodingOrder::Any => fallback,
            EncodingOrder::Fixed(order) => order,
        }
    }

    /// Decode the first `self.width` bytes of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> MemtypeResult<Scalar>
    {
        let Some(raw) = bytes.get(..self.width) else {
            return Err(MemtypeError::MalformedInput(format!(
                "{} needs {} bytes, got {}",
                self.name,
                self.width,
                bytes.len()
            )));
        };

        let mut buf = [0u8; 8];
        match self.effective_order(ByteOrder::Little) {
            ByteOrder::Little => buf[..self.width].copy_from_slice(raw),
            ByteOrder::Big => {
                for (slot, byte) in buf.iter_mut().zip(raw.iter().rev()) {
                    *slot = *byte;
                }
            }
        }
        let bits = u64::from_le_bytes(buf);

        let scalar = match self.class {
            ScalarClass::Float if self.width == 4 => Scalar::Float(f64::from(f32::from_bits(bits as u32))),
            ScalarClass::Float => Scalar::Float(f64::from_bits(bits)),
            ScalarClass::Signed => {
                let shift = 64 - 8 * self.width as u32;
                Scalar::Signed(((bits << shift) as i64) >> shift)
            }
            _ => Scalar::Unsigned(bits),
        };
        Ok(scalar)
    }

    /// Encode `value` into `self.width` bytes.
    ///
    /// Integers that do not fit the width are rejected rather than truncated.
    pub fn encode(&self, value: Scalar) -> MemtypeResult<Vec<u8>>
    {
        let bits_width = 8 * self.width as u32;
        let bits = match (self.class, value) {
            (ScalarClass::Float, Scalar::Float(v)) if self.width == 4 => u64::from((v as f32).to_bits()),
            (ScalarClass::Float, Scalar::Float(v)) => v.to_bits(),
            (ScalarClass::Unsigned, Scalar::Unsigned(v)) => {
                if bits_width < 64 && v >> bits_width != 0 {
                    return Err(self.out_of_range(value));
                }
                v
            }
            (ScalarClass::Signed, Scalar::Signed(v)) => {
                if bits_width < 64 {
                    let min = -(1i64 << (bits_width - 1));
                    let max = (1i64 << (bits_width - 1)) - 1;
                    if v < min || v > max {
                        return Err(self.out_of_range(value));
                    }
                }
                v as u64
            }
            _ => return Err(self.out_of_range(value)),
        };

        let le = bits.to_le_bytes();
        let mut out = le[..self.width].to_vec();
        if self.effective_order(ByteOrder::Little) == ByteOrder::Big {
            out.reverse();
        }
        Ok(out)
    }

    fn out_of_range(&self, value: Scalar) -> MemtypeError
    {
        MemtypeError::MalformedInput(format!("{value} cannot be encoded as {}", self.name))
    }
}

/// Select the unique encoding for `(width, order, class)`.
///
/// ## Errors
///
/// `NoMatchingEncoding` when no entry or more than one entry matches.
pub fn select(width: usize, order: ByteOrder, class: ScalarClass) -> MemtypeResult<&'static Encoding>
{
    let wanted = class.encoding_class();
    let mut candidates = ENCODINGS
        .iter()
        .filter(|e| e.width == width && e.order.matches(order) && e.class == wanted);

    match (candidates.next(), candidates.next()) {
        (Some(encoding), None) => Ok(encoding),
        (first, second) => {
            let candidates = usize::from(first.is_some()) + usize::from(second.is_some()) + candidates.count();
            Err(MemtypeError::NoMatchingEncoding {
                width,
                order,
                class,
                candidates,
            })
        }
    }
}

/// Decode `bytes` as a scalar of the given width, order and class.
pub fn decode(bytes: &[u8], width: usize, order: ByteOrder, class: ScalarClass) -> MemtypeResult<Scalar>
{
    select(width, order, class)?.decode(bytes)
}

/// Encode `value` as a scalar of the given width, order and class.
pub fn encode(value: Scalar, width: usize, order: ByteOrder, class: ScalarClass) -> MemtypeResult<Vec<u8>>
{
    select(width, order, class)?.encode(value)
}

/// Codec bound to the byte order of an architecture profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarCodec
{
    order: ByteOrder,
}

impl ScalarCodec
{
    pub const fn new(order: ByteOrder) -> Self
    {
        Self { order }
    }

    pub const fn order(&self) -> ByteOrder
    {
        self.order
    }

    pub fn select(&self, width: usize, class: ScalarClass) -> MemtypeResult<&'static Encoding>
    {
        select(width, self.order, class)
    }

    pub fn decode(&self, bytes: &[u8], width: usize, class: ScalarClass) -> MemtypeResult<Scalar>
    {
        decode(bytes, width, self.order, class)
    }

    pub fn encode(&self, value: Scalar, width: usize, class: ScalarClass) -> MemtypeResult<Vec<u8>>
    {
        encode(value, width, self.order, class)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_table_names_are_unique()
    {
        assert_eq!(ENCODINGS_BY_NAME.len(), ENCODINGS.len());
    }

    #[test]
    fn test_every_tuple_selects_exactly_one()
    {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            for width in [1, 2, 4, 8] {
                for class in [ScalarClass::Signed, ScalarClass::Unsigned] {
                    assert!(select(width, order, class).is_ok(), "{width} {order} {class}");
                }
            }
            for width in [4, 8] {
                assert!(select(width, order, ScalarClass::Float).is_ok());
            }
        }
    }

    #[test]
    fn test_sign_extension()
    {
        let s16 = Encoding::by_name("s16be").unwrap();
        assert_eq!(s16.decode(&[0xff, 0xfe]).unwrap(), Scalar::Signed(-2));
        let s8 = Encoding::by_name("s8").unwrap();
        assert_eq!(s8.decode(&[0x80]).unwrap(), Scalar::Signed(-128));
    }

    #[test]
    fn test_short_buffer_is_rejected()
    {
        let u32le = Encoding::by_name("u32le").unwrap();
        assert!(u32le.decode(&[1, 2, 3]).is_err());
    }
}
