//! Brute-force value search over a memory range.
//!
//! Every byte offset is decoded with every encoding of the codec table that
//! fits, regardless of the active profile, and compared against a needle.

use serde::Serialize;
use tracing::debug;

use crate::catalog::ArchitectureProfile;
use crate::codec::{EncodingOrder, Scalar, ENCODINGS};
use crate::error::{MemtypeError, MemtypeResult};
use crate::memory::MemoryReader;
use crate::types::Address;

/// One match of a value scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanHit
{
    /// Absolute address of the match
    pub address: Address,
    /// Offset from the scan start
    pub offset: u64,
    /// Name of the encoding that produced the match
    pub encoding: &'static str,
    pub value: Scalar,
    /// Whether the encoding reads in the profile's byte order
    pub native_order: bool,
}

/// Parse a scan needle: `-` prefixed integers are signed, anything with a
/// `.` or spelled `inf`/`nan` is a float, the rest is unsigned in any base.
pub fn parse_needle(text: &str) -> MemtypeResult<Scalar>
{
    let text = text.trim();
    let malformed = |err: &dyn std::fmt::Display| MemtypeError::MalformedInput(format!("invalid value '{text}': {err}"));

    let lower = text.to_ascii_lowercase();
    let looks_float = !lower.starts_with("0x") && (lower.contains('.') || lower.ends_with("inf") || lower == "nan");
    if looks_float {
        return text.parse::<f64>().map(Scalar::Float).map_err(|err| malformed(&err));
    }
    if text.starts_with('-') {
        return parse_int::parse::<i64>(text).map(Scalar::Signed).map_err(|err| malformed(&err));
    }
    parse_int::parse::<u64>(text).map(Scalar::Unsigned).map_err(|err| malformed(&err))
}

/// Scan `len` bytes from `start` for `needle`
///
/// Integers match across signedness (a needle of `-1` finds `0xff` as `s8`
/// but not as `u8`). Hits are ordered by offset, then by table order.
///
/// ## Errors
///
/// `ReadFailure` if the range cannot be read in one piece.
pub fn find_values<R>(
    reader: &R,
    start: Address,
    len: usize,
    profile: &ArchitectureProfile,
    needle: Scalar,
) -> MemtypeResult<Vec<ScanHit>>
where
    R: MemoryReader + ?Sized,
{
    let bytes = reader.read(start, len)?;
    let mut hits = Vec::new();

    for offset in 0..bytes.len() {
        let window = &bytes[offset..];
        for encoding in ENCODINGS.iter().filter(|encoding| encoding.width <= window.len()) {
            let value = encoding.decode(window)?;
            if value.loosely_equals(needle) {
                hits.push(ScanHit {
                    address: start + offset as u64,
                    offset: offset as u64,
                    encoding: encoding.name,
                    value,
                    native_order: match encoding.order {
                        EncodingOrder::Any => true,
                        EncodingOrder::Fixed(order) => order == profile.byte_order,
                    },
                });
            }
        }
    }

    debug!(start = %start, len, needle = %needle, hits = hits.len(), "value scan finished");
    Ok(hits)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_needle()
    {
        assert_eq!(parse_needle("0x10").unwrap(), Scalar::Unsigned(16));
        assert_eq!(parse_needle("-2").unwrap(), Scalar::Signed(-2));
        assert_eq!(parse_needle("1.5").unwrap(), Scalar::Float(1.5));
        assert_eq!(parse_needle("-inf").unwrap(), Scalar::Float(f64::NEG_INFINITY));
        assert!(parse_needle("twelve").is_err());
    }
}
