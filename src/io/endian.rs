//! Byte order handling shared by the TIFF and CIFF engines.
//!
//! Both container families declare their endianness with a repeated ASCII
//! pair at the start of the structure ("II" for Intel, "MM" for Motorola).
//! Makernotes may switch byte order mid-file, so every parsed node remembers
//! the order its bytes were read with.

use serde::{Deserialize, Serialize};

/// Byte order (endianness) of a metadata structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Detect byte order from the two-byte marker at the start of a header.
    ///
    /// Returns `None` unless the bytes are the identical pair `II` or `MM`.
    pub fn from_marker(bytes: &[u8]) -> Option<Self> {
        match bytes.get(..2)? {
            b"II" => Some(ByteOrder::LittleEndian),
            b"MM" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }

    /// The two marker bytes written at the start of a header.
    pub const fn marker(self) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => *b"II",
            ByteOrder::BigEndian => *b"MM",
        }
    }

    /// Read a u16 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 2 bytes.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 4 bytes.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    /// Read a u64 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 8 bytes.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }

    /// Bounds-checked u16 read at `pos`.
    #[inline]
    pub fn get_u16(self, data: &[u8], pos: usize) -> Option<u16> {
        let end = pos.checked_add(2)?;
        data.get(pos..end).map(|b| self.read_u16(b))
    }

    /// Bounds-checked u32 read at `pos`.
    #[inline]
    pub fn get_u32(self, data: &[u8], pos: usize) -> Option<u32> {
        let end = pos.checked_add(4)?;
        data.get(pos..end).map(|b| self.read_u32(b))
    }

    /// Encode a u16 in this byte order.
    #[inline]
    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    /// Encode a u32 in this byte order.
    #[inline]
    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    /// Encode a u64 in this byte order.
    #[inline]
    pub fn u64_bytes(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    /// Overwrite two bytes at `pos`. Returns `false` if out of bounds.
    pub fn put_u16(self, buf: &mut [u8], pos: usize, value: u16) -> bool {
        match buf.get_mut(pos..pos.saturating_add(2)) {
            Some(slot) => {
                slot.copy_from_slice(&self.u16_bytes(value));
                true
            }
            None => false,
        }
    }

    /// Overwrite four bytes at `pos`. Returns `false` if out of bounds.
    pub fn put_u32(self, buf: &mut [u8], pos: usize, value: u32) -> bool {
        match buf.get_mut(pos..pos.saturating_add(4)) {
            Some(slot) => {
                slot.copy_from_slice(&self.u32_bytes(value));
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Endian Helper Functions
// =============================================================================

/// Read a little-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Read a big-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Read a little-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a big-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a little-endian u64 from a byte slice.
#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Read a big-endian u64 from a byte slice.
#[inline]
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_detection() {
        assert_eq!(ByteOrder::from_marker(b"II*\0"), Some(ByteOrder::LittleEndian));
        assert_eq!(ByteOrder::from_marker(b"MM\0*"), Some(ByteOrder::BigEndian));
        assert_eq!(ByteOrder::from_marker(b"IM"), None);
        assert_eq!(ByteOrder::from_marker(b"I"), None);
    }

    #[test]
    fn test_byte_order_read_u16() {
        let bytes = [0x01, 0x02];
        assert_eq!(ByteOrder::LittleEndian.read_u16(&bytes), 0x0201);
        assert_eq!(ByteOrder::BigEndian.read_u16(&bytes), 0x0102);
    }

    #[test]
    fn test_byte_order_read_u32() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(ByteOrder::LittleEndian.read_u32(&bytes), 0x04030201);
        assert_eq!(ByteOrder::BigEndian.read_u32(&bytes), 0x01020304);
    }

    #[test]
    fn test_checked_reads() {
        let bytes = [0x01, 0x02, 0x03];
        assert_eq!(ByteOrder::BigEndian.get_u16(&bytes, 1), Some(0x0203));
        assert_eq!(ByteOrder::BigEndian.get_u16(&bytes, 2), None);
        assert_eq!(ByteOrder::BigEndian.get_u32(&bytes, 0), None);
        assert_eq!(ByteOrder::BigEndian.get_u32(&bytes, usize::MAX), None);
    }

    #[test]
    fn test_put_values() {
        let mut buf = [0u8; 6];
        assert!(ByteOrder::LittleEndian.put_u16(&mut buf, 0, 0x0102));
        assert!(ByteOrder::BigEndian.put_u32(&mut buf, 2, 0x0304_0506));
        assert_eq!(buf, [0x02, 0x01, 0x03, 0x04, 0x05, 0x06]);
        assert!(!ByteOrder::BigEndian.put_u32(&mut buf, 4, 1));
    }

    #[test]
    fn test_read_u64() {
        assert_eq!(
            read_u64_le(&[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]),
            0x0102030405060708
        );
        assert_eq!(
            read_u64_be(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]),
            0x0102030405060708
        );
    }
}
