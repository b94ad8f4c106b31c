//! Test utilities for integration tests.
//!
//! Builders for synthetic TIFF and CRW files with hand-controlled layouts.

use rawmeta::format::crw::{CiffComponent, CiffHeader};
use rawmeta::ByteOrder;

pub const LE: ByteOrder = ByteOrder::LittleEndian;
pub const BE: ByteOrder = ByteOrder::BigEndian;

// TIFF field types
pub const BYTE: u16 = 1;
pub const ASCII: u16 = 2;
pub const SHORT: u16 = 3;
pub const LONG: u16 = 4;
pub const UNDEFINED: u16 = 7;

// =============================================================================
// TIFF File Builders
// =============================================================================

enum Payload {
    Bytes(Vec<u8>),
    Shorts(Vec<u16>),
    Longs(Vec<u32>),
    /// Value field holds this offset, nothing is written
    Offset(u32),
    /// LONG pointer to a directory written elsewhere
    SubIfd(IfdBuilder),
    /// Directory written as the value itself, as makernotes are
    Embedded(IfdBuilder),
}

struct EntrySpec {
    tag: u16,
    field_type: u16,
    count: u32,
    payload: Payload,
}

/// Builder for one IFD and the directories hanging off it.
#[derive(Default)]
pub struct IfdBuilder {
    entries: Vec<EntrySpec>,
    next: Option<Box<IfdBuilder>>,
    next_offset: Option<u32>,
}

impl IfdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, tag: u16, field_type: u16, count: u32, payload: Payload) -> Self {
        self.entries.push(EntrySpec {
            tag,
            field_type,
            count,
            payload,
        });
        self
    }

    pub fn ascii(self, tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        let count = data.len() as u32;
        self.push(tag, ASCII, count, Payload::Bytes(data))
    }

    pub fn bytes(self, tag: u16, field_type: u16, data: Vec<u8>) -> Self {
        let count = data.len() as u32;
        self.push(tag, field_type, count, Payload::Bytes(data))
    }

    pub fn short(self, tag: u16, values: &[u16]) -> Self {
        self.push(tag, SHORT, values.len() as u32, Payload::Shorts(values.to_vec()))
    }

    pub fn long(self, tag: u16, values: &[u32]) -> Self {
        self.push(tag, LONG, values.len() as u32, Payload::Longs(values.to_vec()))
    }

    /// An entry whose value field is `offset`, whatever lies there.
    pub fn pointing_at(self, tag: u16, field_type: u16, count: u32, offset: u32) -> Self {
        self.push(tag, field_type, count, Payload::Offset(offset))
    }

    pub fn sub_ifd(self, tag: u16, ifd: IfdBuilder) -> Self {
        self.push(tag, LONG, 1, Payload::SubIfd(ifd))
    }

    pub fn makernote(self, tag: u16, ifd: IfdBuilder) -> Self {
        self.push(tag, UNDEFINED, 0, Payload::Embedded(ifd))
    }

    pub fn next(mut self, ifd: IfdBuilder) -> Self {
        self.next = Some(Box::new(ifd));
        self
    }

    /// Raw next-IFD link, e.g. back to this directory.
    pub fn next_offset(mut self, offset: u32) -> Self {
        self.next_offset = Some(offset);
        self
    }

    fn write(&self, buf: &mut Vec<u8>, bo: ByteOrder) -> u32 {
        if buf.len() % 2 == 1 {
            buf.push(0);
        }
        let pos = buf.len();
        let n = self.entries.len();
        buf.resize(pos + 2 + n * 12 + 4, 0);
        bo.put_u16(buf, pos, n as u16);

        for (i, entry) in self.entries.iter().enumerate() {
            let rec = pos + 2 + i * 12;
            bo.put_u16(buf, rec, entry.tag);
            bo.put_u16(buf, rec + 2, entry.field_type);
            bo.put_u32(buf, rec + 4, entry.count);

            let data: Vec<u8> = match &entry.payload {
                Payload::Bytes(data) => data.clone(),
                Payload::Shorts(v) => v.iter().flat_map(|x| bo.u16_bytes(*x)).collect(),
                Payload::Longs(v) => v.iter().flat_map(|x| bo.u32_bytes(*x)).collect(),
                Payload::Offset(offset) => {
                    bo.put_u32(buf, rec + 8, *offset);
                    continue;
                }
                Payload::SubIfd(ifd) => {
                    let child = ifd.write(buf, bo);
                    bo.put_u32(buf, rec + 8, child);
                    continue;
                }
                Payload::Embedded(ifd) => {
                    let start = ifd.write(buf, bo);
                    let len = buf.len() as u32 - start;
                    bo.put_u32(buf, rec + 4, len);
                    bo.put_u32(buf, rec + 8, start);
                    continue;
                }
            };

            if data.len() <= 4 {
                buf[rec + 8..rec + 8 + data.len()].copy_from_slice(&data);
            } else {
                if buf.len() % 2 == 1 {
                    buf.push(0);
                }
                let offset = buf.len() as u32;
                buf.extend_from_slice(&data);
                bo.put_u32(buf, rec + 8, offset);
            }
        }

        let link = pos + 2 + n * 12;
        if let Some(offset) = self.next_offset {
            bo.put_u32(buf, link, offset);
        } else if let Some(next) = &self.next {
            let offset = next.write(buf, bo);
            bo.put_u32(buf, link, offset);
        }
        pos as u32
    }
}

/// Builder for a classic TIFF file.
pub struct TiffBuilder {
    byte_order: ByteOrder,
    ifd0: IfdBuilder,
}

impl TiffBuilder {
    pub fn new(byte_order: ByteOrder, ifd0: IfdBuilder) -> Self {
        Self { byte_order, ifd0 }
    }

    pub fn build(self) -> Vec<u8> {
        let bo = self.byte_order;
        let mut buf = Vec::new();
        buf.extend_from_slice(&bo.marker());
        buf.extend_from_slice(&bo.u16_bytes(42));
        buf.extend_from_slice(&[0; 4]);
        let ifd0 = self.ifd0.write(&mut buf, bo);
        bo.put_u32(&mut buf, 4, ifd0);
        buf
    }
}

/// The file used by most tests: Make "ACME" and Model "X100" in IFD0.
pub fn acme_tiff() -> Vec<u8> {
    TiffBuilder::new(
        LE,
        IfdBuilder::new()
            .ascii(0x010f, "ACME")
            .ascii(0x0110, "X100"),
    )
    .build()
}

// =============================================================================
// CRW File Builders
// =============================================================================

/// A CRW file holding `root`.
pub fn crw_file(byte_order: ByteOrder, root: &CiffComponent) -> Vec<u8> {
    let mut file = CiffHeader::new(byte_order).to_bytes();
    file.extend_from_slice(&root.write_heap(byte_order).unwrap());
    file
}

/// A little-endian CRW file whose root heap has `data_len` zero bytes and a
/// single record `(tag, size, offset)`.
pub fn crw_with_record(tag: u16, size: u32, offset: u32, data_len: usize) -> Vec<u8> {
    let mut file = CiffHeader::new(LE).to_bytes();
    file.extend(std::iter::repeat(0u8).take(data_len));
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&tag.to_le_bytes());
    file.extend_from_slice(&size.to_le_bytes());
    file.extend_from_slice(&offset.to_le_bytes());
    file.extend_from_slice(&(data_len as u32).to_le_bytes());
    file
}
