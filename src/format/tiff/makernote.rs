//! Vendor makernotes.
//!
//! A makernote is the value of the Exif MakerNote tag. The supported vendors
//! all store an IFD inside it, optionally behind a signature header:
//!
//! | Vendor | Header | Offsets relative to | Byte order |
//! |--------|--------|---------------------|------------|
//! | Canon  | none | outer TIFF header | outer |
//! | Nikon (type 3) | `Nikon\0\x02\x10\0\0` + TIFF header | embedded TIFF header | embedded header |
//! | Sony   | `SONY DSC \0\0\0`, `SONY CAM \0\0\0` or none | outer TIFF header | outer |

use super::component::Component;
use super::parser::{TiffHeader, TIFF_HEADER_SIZE};
use super::tags::Group;
use crate::error::TiffError;
use crate::io::ByteOrder;

/// Signature prefix of a Nikon type 3 makernote, the following three bytes are a version.
const NIKON3_SIGNATURE: &[u8] = b"Nikon\0\x02";
const NIKON3_DEFAULT_HEADER: &[u8; 10] = b"Nikon\0\x02\x10\0\0";
const NIKON3_HEADER_SIZE: usize = 10;

const SONY_SIGNATURES: [&[u8; 12]; 2] = [b"SONY DSC \0\0\0", b"SONY CAM \0\0\0"];

// =============================================================================
// MakernoteKind
// =============================================================================

/// Supported makernote flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakernoteKind {
    Canon,
    Nikon3,
    Sony2,
}

impl MakernoteKind {
    /// Flavour used by cameras of `make`.
    pub fn from_make(make: &str) -> Option<Self> {
        let make = make.trim();
        if make.starts_with("Canon") {
            Some(MakernoteKind::Canon)
        } else if make.starts_with("NIKON") {
            Some(MakernoteKind::Nikon3)
        } else if make.starts_with("SONY") {
            Some(MakernoteKind::Sony2)
        } else {
            None
        }
    }

    pub fn from_group(group: Group) -> Option<Self> {
        match group {
            Group::Canon => Some(MakernoteKind::Canon),
            Group::Nikon3 => Some(MakernoteKind::Nikon3),
            Group::Sony2 => Some(MakernoteKind::Sony2),
            _ => None,
        }
    }

    /// Group of the makernote directory.
    pub fn group(self) -> Group {
        match self {
            MakernoteKind::Canon => Group::Canon,
            MakernoteKind::Nikon3 => Group::Nikon3,
            MakernoteKind::Sony2 => Group::Sony2,
        }
    }

    /// Whether the directory ends with a next-IFD pointer.
    pub fn has_next(self) -> bool {
        !matches!(self, MakernoteKind::Sony2)
    }

    /// Whether offsets inside the makernote are relative to its own header.
    pub fn has_own_base(self) -> bool {
        matches!(self, MakernoteKind::Nikon3)
    }
}

// =============================================================================
// Makernote
// =============================================================================

/// Where a makernote's directory lives inside the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MnLayout {
    pub kind: MakernoteKind,
    /// Bytes before the embedded TIFF header or directory
    pub header: Vec<u8>,
    pub byte_order: ByteOrder,
    /// Absolute position of the directory
    pub ifd_pos: usize,
    /// Absolute position offsets inside the makernote are relative to
    pub base: usize,
}

/// A parsed or newly created makernote.
#[derive(Debug, Clone)]
pub struct Makernote {
    pub kind: MakernoteKind,
    /// Signature bytes, written back verbatim
    pub header: Vec<u8>,
    pub byte_order: ByteOrder,
    /// The vendor directory
    pub ifd: Component,
}

impl Makernote {
    /// An empty makernote for the directory group `group`.
    pub fn create(tag: u16, group: Group, byte_order: ByteOrder) -> Option<Self> {
        let kind = MakernoteKind::from_group(group)?;
        let header = match kind {
            MakernoteKind::Canon => Vec::new(),
            MakernoteKind::Nikon3 => NIKON3_DEFAULT_HEADER.to_vec(),
            MakernoteKind::Sony2 => SONY_SIGNATURES[0].to_vec(),
        };
        Some(Self {
            kind,
            header,
            byte_order,
            ifd: Component::directory(tag, group, kind.has_next()),
        })
    }

    /// Same vendor, header and byte order, without any entries.
    pub fn shell(&self) -> Self {
        Self {
            kind: self.kind,
            header: self.header.clone(),
            byte_order: self.byte_order,
            ifd: Component::directory(self.ifd.tag, self.ifd.group, self.kind.has_next()),
        }
    }

    /// Locate the directory of a makernote whose value is
    /// `data[value_pos..value_pos + size]`.
    ///
    /// `parent_base` is the offset base of the enclosing TIFF structure.
    pub fn locate(
        kind: MakernoteKind,
        data: &[u8],
        value_pos: usize,
        size: usize,
        parent_order: ByteOrder,
        parent_base: usize,
    ) -> Result<MnLayout, TiffError> {
        let value = value_pos
            .checked_add(size)
            .and_then(|end| data.get(value_pos..end))
            .ok_or(TiffError::OffsetOutOfRange {
                offset: value_pos as u64,
                size: size as u64,
                reason: "makernote outside buffer",
            })?;

        match kind {
            MakernoteKind::Canon => Ok(MnLayout {
                kind,
                header: Vec::new(),
                byte_order: parent_order,
                ifd_pos: value_pos,
                base: parent_base,
            }),
            MakernoteKind::Nikon3 => {
                if value.len() < NIKON3_HEADER_SIZE + TIFF_HEADER_SIZE
                    || !value.starts_with(NIKON3_SIGNATURE)
                {
                    return Err(TiffError::Corrupted(
                        "Nikon makernote signature not found".to_string(),
                    ));
                }
                let header = TiffHeader::parse(&value[NIKON3_HEADER_SIZE..]).map_err(|e| {
                    TiffError::Corrupted(format!("Nikon makernote TIFF header: {e}"))
                })?;
                let base = value_pos + NIKON3_HEADER_SIZE;
                Ok(MnLayout {
                    kind,
                    header: value[..NIKON3_HEADER_SIZE].to_vec(),
                    byte_order: header.byte_order,
                    ifd_pos: base + header.ifd0_offset as usize,
                    base,
                })
            }
            MakernoteKind::Sony2 => {
                let header_len = if SONY_SIGNATURES.iter().any(|s| value.starts_with(*s)) {
                    SONY_SIGNATURES[0].len()
                } else {
                    0
                };
                Ok(MnLayout {
                    kind,
                    header: value[..header_len].to_vec(),
                    byte_order: parent_order,
                    ifd_pos: value_pos + header_len,
                    base: parent_base,
                })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
