//! Serializing a component tree into a fresh TIFF buffer.
//!
//! Each directory is laid out as:
//!
//! ```text
//! +-------+------------------------+------+------------+---------------------+--------+
//! | count | entries, sorted by tag | next | value data | sub-IFDs, makernote | strips |
//! +-------+------------------------+------+------------+---------------------+--------+
//! ```
//!
//! followed by the next directory of its chain. Value data starts on even
//! offsets. Offsets are relative to the base of the structure being written
//! (the TIFF header, or the embedded header of a Nikon makernote). Strip
//! offsets and next-IFD pointers are only known after the data they point to
//! has been placed and are patched through the [`OffsetWriter`].

use tracing::debug;

use super::component::{Component, Node};
use super::makernote::Makernote;
use super::parser::TiffHeader;
use super::reader::ENTRY_SIZE;
use super::tags::FieldType;
use crate::error::TiffError;
use crate::io::{ByteOrder, OffsetId, OffsetWriter};
use crate::metadata::Value;

/// Serialize `root` (an IFD0 directory) behind a new TIFF header.
pub fn write_tree(root: &Component, byte_order: ByteOrder) -> Result<Vec<u8>, TiffError> {
    let mut writer = TreeWriter {
        buf: TiffHeader::new(byte_order).to_bytes().to_vec(),
        offsets: OffsetWriter::new(),
        root,
    };
    writer.write_directory(root, byte_order, 0)?;
    writer.offsets.write_offsets(&mut writer.buf);
    debug!(len = writer.buf.len(), slots = writer.offsets.len(), "Wrote TIFF tree");
    Ok(writer.buf)
}

/// Whether `component` produces an entry when written, given its siblings.
fn is_written(component: &Component, siblings: &[Component]) -> bool {
    match &component.node {
        Node::Directory(_) => false,
        Node::SubIfd(sub) => sub.ifds.iter().any(|d| !d.is_prunable()),
        Node::Data(data) => !data.strips.is_empty(),
        Node::Size(size) => sibling_strips(siblings, size.data_tag).is_some(),
        _ => !component.is_prunable(),
    }
}

/// Lengths of the strips of the data entry `data_tag`, if it has any.
fn sibling_strips(siblings: &[Component], data_tag: u16) -> Option<Vec<u32>> {
    siblings.iter().find_map(|c| match &c.node {
        Node::Data(data) if c.tag == data_tag && !data.strips.is_empty() => {
            Some(data.strips.iter().map(|s| s.len() as u32).collect())
        }
        _ => None,
    })
}

fn relative(pos: usize, base: usize) -> Result<u32, TiffError> {
    u32::try_from(pos.saturating_sub(base)).map_err(|_| TiffError::ValueTooLarge(pos as u64))
}

/// Work left for after the value data of a directory.
enum Deferred<'t> {
    SubIfds {
        slots: Vec<usize>,
        ifds: Vec<&'t Component>,
    },
    MakerNote {
        record: usize,
        mn: &'t Makernote,
    },
    Strips {
        record: usize,
        strips: &'t [bytes::Bytes],
    },
}

struct TreeWriter<'t> {
    buf: Vec<u8>,
    offsets: OffsetWriter,
    /// Tree being written, context for array ciphers
    root: &'t Component,
}

impl<'t> TreeWriter<'t> {
    fn align(&mut self) {
        if self.buf.len() % 2 == 1 {
            self.buf.push(0);
        }
    }

    fn write_directory(
        &mut self,
        dir: &'t Component,
        bo: ByteOrder,
        base: usize,
    ) -> Result<usize, TiffError> {
        let Node::Directory(d) = &dir.node else {
            return Err(TiffError::NotSupported("expected a directory"));
        };
        let mut entries: Vec<&Component> = d
            .children
            .iter()
            .filter(|c| is_written(c, &d.children))
            .collect();
        entries.sort_by_key(|c| c.tag);
        let count = u16::try_from(entries.len())
            .map_err(|_| TiffError::ValueTooLarge(entries.len() as u64))?;

        self.align();
        let dir_pos = self.buf.len();
        let next_slot = dir_pos + 2 + entries.len() * ENTRY_SIZE;
        let table_end = next_slot + if d.has_next { 4 } else { 0 };
        self.buf.resize(table_end, 0);
        bo.put_u16(&mut self.buf, dir_pos, count);

        let mut deferred = Vec::new();
        for (i, entry) in entries.into_iter().enumerate() {
            let record = dir_pos + 2 + i * ENTRY_SIZE;
            self.write_entry(entry, &d.children, record, bo, base, &mut deferred)?;
        }

        // Sub-directories first, image data last
        for item in &deferred {
            match item {
                Deferred::SubIfds { slots, ifds } => {
                    for (slot, ifd) in slots.iter().zip(ifds.iter().copied()) {
                        let pos = self.write_directory(ifd, bo, base)?;
                        bo.put_u32(&mut self.buf, *slot, relative(pos, base)?);
                    }
                }
                Deferred::MakerNote { record, mn } => {
                    let start = self.write_makernote(*mn, bo, base)?;
                    let size = u32::try_from(self.buf.len() - start)
                        .map_err(|_| TiffError::ValueTooLarge(self.buf.len() as u64))?;
                    bo.put_u32(&mut self.buf, record + 4, size);
                    bo.put_u32(&mut self.buf, record + 8, relative(start, base)?);
                }
                Deferred::Strips { .. } => {}
            }
        }
        for item in &deferred {
            if let Deferred::Strips { record, strips } = item {
                for (index, strip) in strips.iter().enumerate() {
                    self.align();
                    let pos = self.buf.len();
                    self.buf.extend_from_slice(strip);
                    self.offsets
                        .set_target(OffsetId::Strip { entry: *record, index }, relative(pos, base)?);
                }
            }
        }

        if d.has_next {
            if let Some(next) = d.next.as_deref().filter(|n| !n.is_prunable()) {
                self.offsets.set_origin(OffsetId::NextIfd(dir_pos), next_slot, bo);
                let next_pos = self.write_directory(next, bo, base)?;
                self.offsets
                    .set_target(OffsetId::NextIfd(dir_pos), relative(next_pos, base)?);
            }
        }
        Ok(dir_pos)
    }

    fn write_entry(
        &mut self,
        entry: &'t Component,
        siblings: &'t [Component],
        record: usize,
        bo: ByteOrder,
        base: usize,
        deferred: &mut Vec<Deferred<'t>>,
    ) -> Result<(), TiffError> {
        let entry_base = entry
            .base()
            .ok_or(TiffError::NotSupported("directory inside a directory"))?;
        let long = FieldType::Long.as_u16();

        let (type_id, bytes) = match &entry.node {
            Node::Data(data) => (long, vec![0u8; 4 * data.strips.len()]),
            Node::Size(size) => {
                let lengths = sibling_strips(siblings, size.data_tag).unwrap_or_default();
                (long, Value::Long(lengths).to_bytes(bo))
            }
            Node::SubIfd(sub) => {
                let n = sub.ifds.iter().filter(|d| !d.is_prunable()).count();
                (long, vec![0u8; 4 * n])
            }
            Node::MakerNote(m) => match m.mn.as_deref() {
                Some(mn) => {
                    deferred.push(Deferred::MakerNote { record, mn });
                    (FieldType::Undefined.as_u16(), Vec::new())
                }
                None => (entry_base.type_id, entry_base.bytes_in(bo)),
            },
            Node::Array(arr) => (entry_base.type_id, arr.encode(entry.tag, bo, self.root)),
            _ => (entry_base.type_id, entry_base.bytes_in(bo)),
        };

        let unit = FieldType::size_of_raw(type_id).max(1);
        let count = u32::try_from(bytes.len() / unit)
            .map_err(|_| TiffError::ValueTooLarge(bytes.len() as u64))?;
        bo.put_u16(&mut self.buf, record, entry.tag);
        bo.put_u16(&mut self.buf, record + 2, type_id);
        bo.put_u32(&mut self.buf, record + 4, count);

        let value_pos = if bytes.len() <= FieldType::INLINE_THRESHOLD {
            self.buf[record + 8..record + 8 + bytes.len()].copy_from_slice(&bytes);
            record + 8
        } else {
            self.align();
            let pos = self.buf.len();
            self.buf.extend_from_slice(&bytes);
            bo.put_u32(&mut self.buf, record + 8, relative(pos, base)?);
            pos
        };

        match &entry.node {
            Node::SubIfd(sub) => {
                let ifds: Vec<&Component> = sub.ifds.iter().filter(|d| !d.is_prunable()).collect();
                let slots = (0..ifds.len()).map(|i| value_pos + 4 * i).collect();
                deferred.push(Deferred::SubIfds { slots, ifds });
            }
            Node::Data(data) => {
                for index in 0..data.strips.len() {
                    self.offsets
                        .set_origin(OffsetId::Strip { entry: record, index }, value_pos + 4 * index, bo);
                }
                deferred.push(Deferred::Strips {
                    record,
                    strips: &data.strips,
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Write a makernote at the end of the buffer. Returns its start.
    fn write_makernote(
        &mut self,
        mn: &'t Makernote,
        bo: ByteOrder,
        base: usize,
    ) -> Result<usize, TiffError> {
        self.align();
        let start = self.buf.len();
        self.buf.extend_from_slice(&mn.header);
        if mn.kind.has_own_base() {
            let mn_base = self.buf.len();
            self.buf
                .extend_from_slice(&TiffHeader::new(mn.byte_order).to_bytes());
            self.write_directory(&mn.ifd, mn.byte_order, mn_base)?;
        } else {
            self.write_directory(&mn.ifd, bo, base)?;
        }
        Ok(start)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::config::EngineConfig;
    use crate::format::tiff::reader::read_tree;
    use crate::format::tiff::schema;
    use crate::format::tiff::{tag, ExtTag, Group};

    fn set(root: &mut Component, tag: u16, group: Group, value: Value) {
        let mut path = schema::tiff_path(tag, group);
        let node = root.add_path(tag, &mut path, None).unwrap().unwrap();
        node.base_mut().unwrap().set_value(value);
    }

    fn reparse(bytes: Vec<u8>) -> Component {
        read_tree(&Bytes::from(bytes), &EngineConfig::default()).unwrap().1
    }

    #[test]
    fn test_entries_are_sorted_and_counted() {
        let mut root = schema::create(ExtTag::Root, Group::None);
        set(&mut root, tag::MODEL, Group::Ifd0, Value::Ascii("X100".into()));
        set(&mut root, tag::MAKE, Group::Ifd0, Value::Ascii("ACME".into()));

        let out = write_tree(&root, ByteOrder::LittleEndian).unwrap();
        assert_eq!(&out[..8], b"II\x2a\0\x08\0\0\0");
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), 2);
        assert_eq!(u16::from_le_bytes([out[10], out[11]]), tag::MAKE);

        let tree = reparse(out);
        assert_eq!(
            tree.find(tag::MODEL, Group::Ifd0).and_then(Component::value),
            Some(Value::Ascii("X100".into()))
        );
    }

    #[test]
    fn test_value_data_is_even_aligned() {
        let mut root = schema::create(ExtTag::Root, Group::None);
        set(&mut root, tag::MAKE, Group::Ifd0, Value::Ascii("ODD".into()));
        set(&mut root, tag::MODEL, Group::Ifd0, Value::Ascii("MODEL".into()));
        let out = write_tree(&root, ByteOrder::BigEndian).unwrap();
        let tree = reparse(out);
        for tag in [tag::MAKE, tag::MODEL] {
            let pos = tree.find(tag, Group::Ifd0).unwrap().base().unwrap().value_pos.unwrap();
            assert_eq!(pos % 2, 0);
        }
    }

    #[test]
    fn test_sub_ifd_and_next_chain() {
        let mut root = schema::create(ExtTag::Root, Group::None);
        set(&mut root, tag::DATE_TIME_ORIGINAL, Group::Exif, Value::Ascii("2021:02:03 04:05:06".into()));
        set(&mut root, tag::COMPRESSION, Group::Ifd1, Value::Short(vec![6]));

        let tree = reparse(write_tree(&root, ByteOrder::LittleEndian).unwrap());
        assert!(tree.find(tag::DATE_TIME_ORIGINAL, Group::Exif).is_some());
        assert_eq!(
            tree.find(tag::COMPRESSION, Group::Ifd1).and_then(Component::value),
            Some(Value::Short(vec![6]))
        );
    }

    #[test]
    fn test_strips_and_recomputed_byte_counts() {
        let mut root = schema::create(ExtTag::Root, Group::None);
        set(&mut root, tag::STRIP_OFFSETS, Group::Ifd0, Value::Long(vec![0, 0]));
        set(&mut root, tag::STRIP_BYTE_COUNTS, Group::Ifd0, Value::Long(vec![99, 99]));
        if let Some(Node::Data(data)) = root
            .find_mut(tag::STRIP_OFFSETS, Group::Ifd0)
            .map(|c| &mut c.node)
        {
            data.strips = vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")];
        }

        let tree = reparse(write_tree(&root, ByteOrder::LittleEndian).unwrap());
        let counts = tree.find(tag::STRIP_BYTE_COUNTS, Group::Ifd0).and_then(Component::value);
        assert_eq!(counts, Some(Value::Long(vec![3, 2])));
        let Node::Data(data) = &tree.find(tag::STRIP_OFFSETS, Group::Ifd0).unwrap().node else {
            panic!("expected a data entry");
        };
        assert_eq!(data.data_area(), b"abcde".to_vec());
    }

    #[test]
    fn test_data_entry_without_strips_is_dropped() {
        let mut root = schema::create(ExtTag::Root, Group::None);
        set(&mut root, tag::MAKE, Group::Ifd0, Value::Ascii("ACME".into()));
        set(&mut root, tag::STRIP_OFFSETS, Group::Ifd0, Value::Long(vec![0]));
        set(&mut root, tag::STRIP_BYTE_COUNTS, Group::Ifd0, Value::Long(vec![0]));
        let out = write_tree(&root, ByteOrder::LittleEndian).unwrap();
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), 1);
    }

    #[test]
    fn test_nikon_makernote_round_trip() {
        let mut root = schema::create(ExtTag::Root, Group::None);
        set(&mut root, tag::MAKE, Group::Ifd0, Value::Ascii("NIKON CORPORATION".into()));
        set(&mut root, 0x0004, Group::Nikon3, Value::Ascii("FINE   ".into()));

        let tree = reparse(write_tree(&root, ByteOrder::LittleEndian).unwrap());
        let Node::MakerNote(mn) = &tree.find(tag::MAKER_NOTE, Group::Exif).unwrap().node else {
            panic!("expected a makernote entry");
        };
        let mn = mn.mn.as_deref().unwrap();
        assert_eq!(mn.header, b"Nikon\0\x02\x10\0\0");
        assert_eq!(
            tree.find(0x0004, Group::Nikon3).and_then(Component::value),
            Some(Value::Ascii("FINE   ".into()))
        );
    }
}
