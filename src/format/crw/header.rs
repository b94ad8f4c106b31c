//! CIFF header parsing and writing.
//!
//! # CIFF Header Structure
//!
//! ```text
//! Bytes 0-1:  Byte order ("II" or "MM")
//! Bytes 2-5:  Header length, which is also the start of the root heap
//! Bytes 6-13: Signature "HEAPCCDR"
//! Bytes 14..: Version and reserved words up to the header length
//! ```

use crate::error::CrwError;
use crate::io::ByteOrder;

/// Signature following the header length.
pub const CIFF_SIGNATURE: &[u8; 8] = b"HEAPCCDR";

/// Length of the fixed part of the header.
pub const CIFF_HEADER_MIN: usize = 14;

/// Header length written by Canon cameras.
pub const CIFF_HEADER_SIZE: u32 = 26;

/// Version word of a new header.
const CIFF_VERSION: u32 = 0x0001_0002;

/// Parsed CIFF header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiffHeader {
    pub byte_order: ByteOrder,

    /// Offset of the root heap from the start of the file
    pub header_len: u32,

    /// Bytes between the signature and the root heap, kept as read
    pub padding: Vec<u8>,
}

impl CiffHeader {
    /// A header with Canon's default length and version.
    pub fn new(byte_order: ByteOrder) -> Self {
        let mut padding = vec![0u8; CIFF_HEADER_SIZE as usize - CIFF_HEADER_MIN];
        padding[..4].copy_from_slice(&byte_order.u32_bytes(CIFF_VERSION));
        Self {
            byte_order,
            header_len: CIFF_HEADER_SIZE,
            padding,
        }
    }

    /// Parse a CIFF header from the start of `bytes`.
    ///
    /// # Errors
    /// - `FileTooSmall` if the header does not fit
    /// - `InvalidSignature` if the byte order or signature is wrong
    pub fn parse(bytes: &[u8]) -> Result<Self, CrwError> {
        if bytes.len() < CIFF_HEADER_MIN {
            return Err(CrwError::FileTooSmall {
                required: CIFF_HEADER_MIN as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = ByteOrder::from_marker(&bytes[0..2]).ok_or(CrwError::InvalidSignature)?;
        if &bytes[6..14] != CIFF_SIGNATURE {
            return Err(CrwError::InvalidSignature);
        }

        let header_len = byte_order.read_u32(&bytes[2..6]);
        let end = header_len as usize;
        if end < CIFF_HEADER_MIN || end > bytes.len() {
            return Err(CrwError::FileTooSmall {
                required: u64::from(header_len).max(CIFF_HEADER_MIN as u64),
                actual: bytes.len() as u64,
            });
        }

        Ok(Self {
            byte_order,
            header_len,
            padding: bytes[CIFF_HEADER_MIN..end].to_vec(),
        })
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CIFF_HEADER_MIN + self.padding.len());
        out.extend_from_slice(&self.byte_order.marker());
        let len = (CIFF_HEADER_MIN + self.padding.len()) as u32;
        out.extend_from_slice(&self.byte_order.u32_bytes(len));
        out.extend_from_slice(CIFF_SIGNATURE);
        out.extend_from_slice(&self.padding);
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
