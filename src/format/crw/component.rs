//! CIFF heap components.
//!
//! # Heap Layout
//!
//! ```text
//! +-------------------------+
//! | value data (even-sized) |  <- entries and sub-directory heaps
//! +-------------------------+
//! | count (u16)             |
//! | count x 10-byte records |  <- tag, size, offset (or 8 inline bytes)
//! +-------------------------+
//! | table offset (u32)      |  <- last 4 bytes of the heap
//! +-------------------------+
//! ```
//!
//! The two top bits of a tag say where the value lives, the next three give
//! its type. Offsets are relative to the start of the heap holding the record.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::CrwError;
use crate::io::ByteOrder;

// =============================================================================
// Tag bits
// =============================================================================

/// Size of a directory record.
pub const CIFF_ENTRY_SIZE: usize = 10;

/// Bytes of value data a record can hold.
pub const CIFF_INLINE_SIZE: usize = 8;

const LOCATION_MASK: u16 = 0xc000;
const VALUE_IN_HEAP: u16 = 0x0000;
const VALUE_IN_RECORD: u16 = 0x4000;
const TYPE_MASK: u16 = 0x3800;
const TAG_ID_MASK: u16 = 0x3fff;

/// Value type encoded in bits 11-13 of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiffType {
    Byte,
    Ascii,
    Short,
    Long,
    Mixed,
    Directory,
}

impl CiffType {
    pub const fn from_tag(tag: u16) -> Self {
        match tag & TYPE_MASK {
            0x0000 => CiffType::Byte,
            0x0800 => CiffType::Ascii,
            0x1000 => CiffType::Short,
            0x1800 => CiffType::Long,
            0x2800 | 0x3000 => CiffType::Directory,
            _ => CiffType::Mixed,
        }
    }
}

// =============================================================================
// CiffComponent
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CiffNode {
    Entry(Bytes),
    Directory(Vec<CiffComponent>),
}

/// One record of a CIFF heap, or the root directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CiffComponent {
    /// Raw tag including location and type bits
    pub tag: u16,
    /// Tag id of the enclosing directory (0x0000 for the root's children)
    pub dir: u16,
    /// Heap-relative offset the value was read from
    pub offset: u32,
    pub node: CiffNode,
}

impl CiffComponent {
    /// The root directory of a file.
    pub fn root() -> Self {
        Self::directory(0x0000, 0xffff)
    }

    pub fn directory(tag_id: u16, dir: u16) -> Self {
        Self {
            tag: tag_id & TAG_ID_MASK,
            dir,
            offset: 0,
            node: CiffNode::Directory(Vec::new()),
        }
    }

    pub fn entry(tag_id: u16, dir: u16, data: impl Into<Bytes>) -> Self {
        Self {
            tag: tag_id & TAG_ID_MASK,
            dir,
            offset: 0,
            node: CiffNode::Entry(data.into()),
        }
    }

    /// Tag without the location bits.
    pub const fn tag_id(&self) -> u16 {
        self.tag & TAG_ID_MASK
    }

    pub const fn ciff_type(&self) -> CiffType {
        CiffType::from_tag(self.tag)
    }

    /// Whether the value sits in the 8 spare bytes of the record.
    pub const fn is_inline(&self) -> bool {
        self.tag & LOCATION_MASK == VALUE_IN_RECORD
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.node, CiffNode::Directory(_))
    }

    pub fn data(&self) -> Option<&Bytes> {
        match &self.node {
            CiffNode::Entry(data) => Some(data),
            CiffNode::Directory(_) => None,
        }
    }

    pub fn children(&self) -> &[CiffComponent] {
        match &self.node {
            CiffNode::Directory(children) => children,
            CiffNode::Entry(_) => &[],
        }
    }

    /// Replace the value of an entry. Values larger than a record move to
    /// the heap.
    pub fn set_value(&mut self, data: Vec<u8>) -> Result<(), CrwError> {
        let CiffNode::Entry(current) = &mut self.node else {
            return Err(CrwError::NotSupported("set a value on a directory"));
        };
        if data.len() > CIFF_INLINE_SIZE {
            self.tag &= TAG_ID_MASK;
        }
        *current = Bytes::from(data);
        Ok(())
    }

    /// Depth-first search for an entry with `tag_id` inside directory `dir`.
    pub fn find(&self, tag_id: u16, dir: u16) -> Option<&CiffComponent> {
        self.children().iter().find_map(|child| {
            if child.is_directory() {
                child.find(tag_id, dir)
            } else if child.tag_id() == tag_id && child.dir == dir {
                Some(child)
            } else {
                None
            }
        })
    }

    /// Call `f` for every entry below this directory.
    pub fn visit(&self, f: &mut dyn FnMut(&CiffComponent)) {
        for child in self.children() {
            if child.is_directory() {
                child.visit(f);
            } else {
                f(child);
            }
        }
    }

    /// Find or create the entry `tag_id` at the end of the directory path
    /// `dirs`, creating missing directories on the way.
    pub fn add(&mut self, dirs: &[u16], tag_id: u16) -> Result<&mut CiffComponent, CrwError> {
        let own = self.tag_id();
        let CiffNode::Directory(children) = &mut self.node else {
            return Err(CrwError::NotSupported("add a component below an entry"));
        };

        match dirs.split_first() {
            None => {
                let pos = match children
                    .iter()
                    .position(|c| !c.is_directory() && c.tag_id() == tag_id)
                {
                    Some(pos) => pos,
                    None => {
                        children.push(CiffComponent::entry(tag_id, own, Bytes::new()));
                        children.len() - 1
                    }
                };
                Ok(&mut children[pos])
            }
            Some((&first, rest)) => {
                let pos = match children
                    .iter()
                    .position(|c| c.is_directory() && c.tag_id() == first)
                {
                    Some(pos) => pos,
                    None => {
                        debug!(dir = first, parent = own, "Adding CIFF directory");
                        children.push(CiffComponent::directory(first, own));
                        children.len() - 1
                    }
                };
                children[pos].add(rest, tag_id)
            }
        }
    }

    /// Remove the entry `tag_id` at the end of `dirs`. Directories left
    /// empty by the removal are removed too, this one excepted.
    pub fn remove(&mut self, dirs: &[u16], tag_id: u16) -> bool {
        let CiffNode::Directory(children) = &mut self.node else {
            return false;
        };

        match dirs.split_first() {
            None => match children
                .iter()
                .position(|c| !c.is_directory() && c.tag_id() == tag_id)
            {
                Some(pos) => {
                    children.remove(pos);
                    true
                }
                None => false,
            },
            Some((&first, rest)) => {
                let Some(pos) = children
                    .iter()
                    .position(|c| c.is_directory() && c.tag_id() == first)
                else {
                    return false;
                };
                let removed = children[pos].remove(rest, tag_id);
                if removed && children[pos].children().is_empty() {
                    children.remove(pos);
                }
                removed
            }
        }
    }

    /// Serialize the heap of this directory.
    pub fn write_heap(&self, byte_order: ByteOrder) -> Result<Vec<u8>, CrwError> {
        let children = self.children();
        let mut heap = Vec::new();
        let mut records = Vec::with_capacity(2 + children.len() * CIFF_ENTRY_SIZE);
        records.extend_from_slice(&byte_order.u16_bytes(children.len() as u16));

        for child in children {
            let data = match &child.node {
                CiffNode::Directory(_) => child.write_heap(byte_order)?,
                CiffNode::Entry(data) if child.is_inline() && data.len() <= CIFF_INLINE_SIZE => {
                    records.extend_from_slice(&byte_order.u16_bytes(child.tag));
                    let mut inline = [0u8; CIFF_INLINE_SIZE];
                    inline[..data.len()].copy_from_slice(data);
                    records.extend_from_slice(&inline);
                    continue;
                }
                CiffNode::Entry(data) => data.to_vec(),
            };

            records.extend_from_slice(&byte_order.u16_bytes(child.tag & TAG_ID_MASK));
            records.extend_from_slice(&byte_order.u32_bytes(heap_u32(data.len())?));
            records.extend_from_slice(&byte_order.u32_bytes(heap_u32(heap.len())?));
            heap.extend_from_slice(&data);
            if heap.len() % 2 == 1 {
                heap.push(0);
            }
        }

        let table = heap_u32(heap.len())?;
        heap.extend_from_slice(&records);
        heap.extend_from_slice(&byte_order.u32_bytes(table));
        Ok(heap)
    }
}

fn heap_u32(value: usize) -> Result<u32, CrwError> {
    u32::try_from(value).map_err(|_| CrwError::Corrupted(format!("heap too large: {value} bytes")))
}

// =============================================================================
// Reading
// =============================================================================

/// Reads a CIFF heap into a component tree.
pub struct CiffReader<'a> {
    config: &'a EngineConfig,
    byte_order: ByteOrder,
}

impl<'a> CiffReader<'a> {
    pub fn new(config: &'a EngineConfig, byte_order: ByteOrder) -> Self {
        Self { config, byte_order }
    }

    /// Read the root directory from its heap.
    pub fn read_root(&self, heap: &Bytes) -> Result<CiffComponent, CrwError> {
        let mut root = CiffComponent::root();
        root.node = CiffNode::Directory(self.read_directory(heap, root.tag_id(), 0)?);
        Ok(root)
    }

    fn read_directory(
        &self,
        heap: &Bytes,
        dir: u16,
        depth: usize,
    ) -> Result<Vec<CiffComponent>, CrwError> {
        if depth > self.config.max_depth {
            return Err(CrwError::Corrupted(format!(
                "directory 0x{dir:04x} nested deeper than {}",
                self.config.max_depth
            )));
        }

        let size = heap.len();
        if size < 4 {
            return Err(CrwError::FileTooSmall {
                required: 4,
                actual: size as u64,
            });
        }
        let bo = self.byte_order;
        let table = bo.read_u32(&heap[size - 4..]) as usize;
        let count = bo.get_u16(heap, table).ok_or(CrwError::OffsetOutOfRange {
            offset: table as u64,
            size: 2,
            reason: "directory table outside its heap",
        })? as usize;
        let first = table + 2;
        if first + count * CIFF_ENTRY_SIZE > size {
            return Err(CrwError::Corrupted(format!(
                "directory 0x{dir:04x} has {count} records but only {} bytes",
                size - first
            )));
        }
        debug!(dir, count, size, "Reading CIFF directory");

        let mut children = Vec::with_capacity(count);
        for i in 0..count {
            let rel = first + i * CIFF_ENTRY_SIZE;
            if let Some(child) = self.read_component(heap, rel, dir, depth)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Read the record at `rel`.
    ///
    /// # Errors
    /// - `Corrupted` if the record is truncated
    /// - `OffsetOutOfRange` if the value leaves the heap or overlaps the record
    fn read_component(
        &self,
        heap: &Bytes,
        rel: usize,
        dir: u16,
        depth: usize,
    ) -> Result<Option<CiffComponent>, CrwError> {
        let size = heap.len();
        if rel + CIFF_ENTRY_SIZE > size {
            return Err(CrwError::Corrupted(format!("record at {rel} is truncated")));
        }
        let bo = self.byte_order;
        let tag = bo.read_u16(&heap[rel..]);

        let (offset, data) = match tag & LOCATION_MASK {
            VALUE_IN_HEAP => {
                let len = bo.read_u32(&heap[rel + 2..]) as usize;
                let offset = bo.read_u32(&heap[rel + 6..]) as usize;
                if len > size || offset > size - len {
                    return Err(CrwError::OffsetOutOfRange {
                        offset: offset as u64,
                        size: len as u64,
                        reason: "value outside its heap",
                    });
                }
                let overlaps = if offset < rel {
                    len > rel - offset
                } else {
                    offset < rel + CIFF_ENTRY_SIZE
                };
                if overlaps {
                    return Err(CrwError::OffsetOutOfRange {
                        offset: offset as u64,
                        size: len as u64,
                        reason: "value overlaps its record",
                    });
                }
                (offset, heap.slice(offset..offset + len))
            }
            VALUE_IN_RECORD => (rel + 2, heap.slice(rel + 2..rel + CIFF_ENTRY_SIZE)),
            location => {
                warn!(tag, location, "Skipping CIFF record with unknown location");
                return Ok(None);
            }
        };

        let mut component = CiffComponent {
            tag,
            dir,
            offset: offset as u32,
            node: CiffNode::Entry(Bytes::new()),
        };
        if component.ciff_type() == CiffType::Directory {
            if component.is_inline() {
                return Err(CrwError::Corrupted(format!(
                    "directory 0x{tag:04x} stored inside its record"
                )));
            }
            let children = self.read_directory(&data, component.tag_id(), depth + 1)?;
            component.node = CiffNode::Directory(children);
        } else {
            component.node = CiffNode::Entry(data);
        }
        Ok(Some(component))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LE: ByteOrder = ByteOrder::LittleEndian;

    fn read(heap: Vec<u8>) -> Result<CiffComponent, CrwError> {
        let config = EngineConfig::default();
        CiffReader::new(&config, LE).read_root(&Bytes::from(heap))
    }

    /// A heap with one directory record pointing at `offset`/`size`.
    fn heap_with_record(tag: u16, size: u32, offset: u32, data_len: usize) -> Vec<u8> {
        let mut heap = vec![0u8; data_len];
        let table = heap.len() as u32;
        heap.extend_from_slice(&1u16.to_le_bytes());
        heap.extend_from_slice(&tag.to_le_bytes());
        heap.extend_from_slice(&size.to_le_bytes());
        heap.extend_from_slice(&offset.to_le_bytes());
        heap.extend_from_slice(&table.to_le_bytes());
        heap
    }

    #[test]
    fn test_tag_bits() {
        assert_eq!(CiffType::from_tag(0x080a), CiffType::Ascii);
        assert_eq!(CiffType::from_tag(0x102d), CiffType::Short);
        assert_eq!(CiffType::from_tag(0x1817), CiffType::Long);
        assert_eq!(CiffType::from_tag(0x2008), CiffType::Mixed);
        assert_eq!(CiffType::from_tag(0x300a), CiffType::Directory);
        assert_eq!(CiffType::from_tag(0x2807), CiffType::Directory);

        let inline = CiffComponent {
            tag: 0x5817,
            dir: 0x300a,
            offset: 0,
            node: CiffNode::Entry(Bytes::new()),
        };
        assert!(inline.is_inline());
        assert_eq!(inline.tag_id(), 0x1817);
    }

    #[test]
    fn test_write_then_read() {
        let mut root = CiffComponent::root();
        root.add(&[0x300a, 0x2807], 0x080a)
            .unwrap()
            .set_value(b"Canon\0EOS D30\0".to_vec())
            .unwrap();
        root.add(&[0x300a], 0x1817).unwrap().set_value(vec![1, 0, 0, 0]).unwrap();

        let heap = root.write_heap(LE).unwrap();
        let parsed = read(heap).unwrap();
        let make = parsed.find(0x080a, 0x2807).unwrap();
        assert_eq!(make.data().unwrap().as_ref(), b"Canon\0EOS D30\0");
        assert_eq!(parsed.find(0x1817, 0x300a).unwrap().data().unwrap().as_ref(), &[1, 0, 0, 0]);
        assert_eq!(parsed, {
            let mut expected = root.clone();
            // Offsets are only known after a read
            fix_offsets(&mut expected, &parsed);
            expected
        });
    }

    fn fix_offsets(expected: &mut CiffComponent, parsed: &CiffComponent) {
        expected.offset = parsed.offset;
        if let CiffNode::Directory(children) = &mut expected.node {
            for (e, p) in children.iter_mut().zip(parsed.children()) {
                fix_offsets(e, p);
            }
        }
    }

    #[test]
    fn test_inline_value_stays_in_record() {
        let mut root = CiffComponent::root();
        root.node = CiffNode::Directory(vec![CiffComponent {
            tag: 0x5817,
            dir: 0,
            offset: 0,
            node: CiffNode::Entry(Bytes::from_static(&[7, 0, 0, 0])),
        }]);

        let heap = root.write_heap(LE).unwrap();
        // No value data, just the table
        assert_eq!(heap.len(), 2 + CIFF_ENTRY_SIZE + 4);
        let parsed = read(heap).unwrap();
        let entry = &parsed.children()[0];
        assert!(entry.is_inline());
        assert_eq!(&entry.data().unwrap()[..4], &[7, 0, 0, 0]);
    }

    #[test]
    fn test_growing_inline_value_moves_to_heap() {
        let mut entry = CiffComponent {
            tag: 0x4805,
            dir: 0x300a,
            offset: 0,
            node: CiffNode::Entry(Bytes::from_static(b"short")),
        };
        entry.set_value(b"a much longer comment".to_vec()).unwrap();
        assert!(!entry.is_inline());
        assert_eq!(entry.tag, 0x0805);
    }

    #[test]
    fn test_self_referencing_directory_fails() {
        // Directory record whose value starts at the record itself
        let heap = heap_with_record(0x300a, 4, 2, 0);
        assert!(matches!(
            read(heap),
            Err(CrwError::OffsetOutOfRange {
                reason: "value overlaps its record",
                ..
            })
        ));
    }

    #[test]
    fn test_value_overlapping_record_from_before_fails() {
        // 8 bytes of data, value runs from 4 into the record at 10
        let heap = heap_with_record(0x0805, 8, 4, 8);
        assert!(matches!(read(heap), Err(CrwError::OffsetOutOfRange { .. })));
    }

    #[test]
    fn test_value_outside_heap_fails() {
        let heap = heap_with_record(0x0805, 100, 0, 4);
        assert!(matches!(
            read(heap),
            Err(CrwError::OffsetOutOfRange {
                reason: "value outside its heap",
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_table_fails() {
        let mut heap = vec![0u8; 4];
        heap.extend_from_slice(&5u16.to_le_bytes());
        heap.extend_from_slice(&4u32.to_le_bytes());
        assert!(matches!(read(heap), Err(CrwError::Corrupted(_))));
        assert!(matches!(read(vec![0, 0]), Err(CrwError::FileTooSmall { .. })));
    }

    #[test]
    fn test_remove_prunes_empty_directories() {
        let mut root = CiffComponent::root();
        root.add(&[0x300a, 0x2807], 0x080a).unwrap();
        root.add(&[0x300a], 0x1817).unwrap();

        assert!(root.remove(&[0x300a, 0x2807], 0x080a));
        let props = &root.children()[0];
        assert_eq!(props.tag_id(), 0x300a);
        assert_eq!(props.children().len(), 1);

        assert!(root.remove(&[0x300a], 0x1817));
        assert!(root.children().is_empty());
        assert!(!root.remove(&[0x300a], 0x1817));
    }

    #[test]
    fn test_add_below_entry_fails() {
        let mut entry = CiffComponent::entry(0x0805, 0x300a, Bytes::new());
        assert!(matches!(entry.add(&[], 0x1817), Err(CrwError::NotSupported(_))));
    }
}
