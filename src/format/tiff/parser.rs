//! TIFF header parsing and writing.
//!
//! # TIFF Header Structure
//!
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Magic (42 = 0x002A)
//! Bytes 4-7: Offset to the first IFD, relative to the header start
//! ```
//!
//! The same header layout is embedded inside some makernotes (Nikon type 3),
//! where it declares the byte order and offset base of the vendor directory.

use crate::error::TiffError;
use crate::io::ByteOrder;

// =============================================================================
// Constants
// =============================================================================

/// Magic number of a classic TIFF header
pub const TIFF_MAGIC: u16 = 42;

/// Size of a classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values below this header
    pub byte_order: ByteOrder,

    /// Magic number following the byte order marker
    pub magic: u16,

    /// Offset to IFD0, relative to the header start
    pub ifd0_offset: u32,
}

impl TiffHeader {
    /// A header with IFD0 directly after it.
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            magic: TIFF_MAGIC,
            ifd0_offset: TIFF_HEADER_SIZE as u32,
        }
    }

    /// Parse a TIFF header from the start of `bytes`.
    ///
    /// # Errors
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `InvalidVersion` if the magic number is not 42
    /// - `InvalidIfdOffset` if IFD0 does not start inside the buffer
    pub fn parse(bytes: &[u8]) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = ByteOrder::from_marker(&bytes[0..2])
            .ok_or_else(|| TiffError::InvalidMagic(u16::from_le_bytes([bytes[0], bytes[1]])))?;

        let magic = byte_order.read_u16(&bytes[2..4]);
        if magic != TIFF_MAGIC {
            return Err(TiffError::InvalidVersion {
                expected: TIFF_MAGIC,
                actual: magic,
            });
        }

        let ifd0_offset = byte_order.read_u32(&bytes[4..8]);
        if ifd0_offset as u64 >= bytes.len() as u64 {
            return Err(TiffError::InvalidIfdOffset(ifd0_offset as u64));
        }

        Ok(TiffHeader {
            byte_order,
            magic,
            ifd0_offset,
        })
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; TIFF_HEADER_SIZE] {
        let mut out = [0u8; TIFF_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.byte_order.marker());
        out[2..4].copy_from_slice(&self.byte_order.u16_bytes(self.magic));
        out[4..8].copy_from_slice(&self.byte_order.u32_bytes(self.ifd0_offset));
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
