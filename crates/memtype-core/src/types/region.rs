//! Memory region ("map") types.

use std::fmt;

use super::Address;

/// What a region from a static map file describes
///
/// Map files tag lines with a trailing `T` (function / text) or `D` (data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind
{
    /// `T`: code belonging to a function symbol
    Function,
    /// `D`: a data symbol
    Data,
}

impl RegionKind
{
    /// Parse the single-letter map-file tag.
    pub fn from_tag(tag: &str) -> Option<Self>
    {
        match tag {
            "T" => Some(RegionKind::Function),
            "D" => Some(RegionKind::Data),
            _ => None,
        }
    }

    /// Single-letter map-file tag.
    pub fn tag(self) -> &'static str
    {
        match self {
            RegionKind::Function => "T",
            RegionKind::Data => "D",
        }
    }
}

impl fmt::Display for RegionKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.tag())
    }
}

/// A named address range
///
/// Unlike a kernel mapping, both bounds are **inclusive**: a region covers
/// `start..=end`. The `size` column is carried as written in the source
/// (a symbol size, or the mapping size) and is not required to equal the
/// span of the range.
///
/// ## Example
///
/// ```
/// use memtype_core::types::{Address, MemoryRegion};
///
/// let region = MemoryRegion::new(Address::from(0x1000), Address::from(0x1fff)).with_image("main");
/// assert!(region.contains(Address::from(0x1fff)));
/// assert!(!region.contains(Address::from(0x2000)));
/// assert_eq!(region.span(), 0x1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// First address in the region (inclusive)
    pub start: Address,
    /// Last address in the region (inclusive)
    pub end: Address,
    /// Size column from the map source
    pub size: u64,
    /// Offset of `start` within the backing file
    pub file_offset: u64,
    /// Function/data tag, if the source had one
    pub kind: Option<RegionKind>,
    /// Permission column (`rwxp` style), if the source had one
    pub permissions: Option<String>,
    /// Owning image or symbol name; empty when unknown
    pub image: String,
}

impl MemoryRegion
{
    /// Region covering `start..=end` with the size column set to the span.
    pub fn new(start: Address, end: Address) -> Self
    {
        let mut region = Self {
            start,
            end,
            size: 0,
            file_offset: 0,
            kind: None,
            permissions: None,
            image: String::new(),
        };
        region.size = region.span();
        region
    }

    /// Set the owning image name.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self
    {
        self.image = image.into();
        self
    }

    /// Set the function/data tag.
    #[must_use]
    pub fn with_kind(mut self, kind: RegionKind) -> Self
    {
        self.kind = Some(kind);
        self
    }

    /// Set the file offset column.
    #[must_use]
    pub fn with_file_offset(mut self, file_offset: u64) -> Self
    {
        self.file_offset = file_offset;
        self
    }

    /// Number of addresses covered, `end - start + 1`
    ///
    /// Returns 0 for an inverted range. Saturates for the full 64-bit space.
    pub fn span(&self) -> u64
    {
        match self.end.value().checked_sub(self.start.value()) {
            Some(delta) => delta.saturating_add(1),
            None => 0,
        }
    }

    /// Whether `start <= address <= end`.
    pub fn contains(&self, address: Address) -> bool
    {
        self.start <= address && address <= self.end
    }
}

/// Same column layout as the static map-file format, so a printed region
/// can be parsed back.
impl fmt::Display for MemoryRegion
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{:#x} {:#x} {:#x} {:#x}",
            self.start.value(),
            self.end.value(),
            self.size,
            self.file_offset
        )?;
        write!(f, " {}", self.permissions.as_deref().unwrap_or("----"))?;
        if !self.image.is_empty() {
            write!(f, " {}", self.image)?;
        }
        if let Some(kind) = self.kind {
            write!(f, " {kind}")?;
        }
        Ok(())
    }
}
