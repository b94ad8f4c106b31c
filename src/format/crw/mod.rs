//! Canon CRW files: a CIFF heap tree behind a short header.
//!
//! # Key Concepts
//!
//! - **Heap**: a block of value data followed by a directory table. A
//!   sub-directory's value is itself a heap, so the tree nests.
//!
//! - **Records**: 10 bytes each. The tag's top bits say whether the value is
//!   in the record itself or elsewhere in the heap.
//!
//! - **Mapping table**: CIFF records have no Exif keys of their own. A static
//!   table translates the known records to and from Exif keys.
//!
//! Writing always serializes the whole heap tree again. Records without a
//! mapping are carried over unchanged.

mod component;
mod header;
mod mapping;

pub use component::{CiffComponent, CiffNode, CiffReader, CiffType, CIFF_ENTRY_SIZE, CIFF_INLINE_SIZE};
pub use header::{CiffHeader, CIFF_HEADER_SIZE, CIFF_SIGNATURE};
pub use mapping::{ciff_timestamp, crw_dirs, exif_date, find_mapping, CrwMapping, CRW_MAPPING, ROOT_DIR};

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::config::EngineConfig;
use crate::error::CrwError;
use crate::format::tiff::{EncodeOutcome, WriteStrategy};
use crate::io::ByteOrder;
use crate::metadata::MetadataBundle;

/// Reads and writes Canon CRW metadata.
#[derive(Debug, Clone, Default)]
pub struct CrwParser {
    config: EngineConfig,
}

impl CrwParser {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse the header and heap tree of `data`.
    pub fn parse(&self, data: &[u8]) -> Result<(CiffHeader, CiffComponent), CrwError> {
        let header = CiffHeader::parse(data)?;
        let heap = Bytes::copy_from_slice(&data[header.header_len as usize..]);
        let root = CiffReader::new(&self.config, header.byte_order).read_root(&heap)?;
        Ok((header, root))
    }

    /// Decode the metadata of `data`.
    pub fn decode(&self, data: &[u8]) -> Result<MetadataBundle, CrwError> {
        let (header, root) = self.parse(data)?;
        let mut bundle = MetadataBundle::default();
        decode_tree(&root, &mut bundle, header.byte_order);
        debug!(exif = bundle.exif.len(), "Decoded CRW metadata");
        Ok(bundle)
    }

    /// Encode `bundle`, updating `original` if given. A new file is written
    /// little-endian.
    pub fn encode(
        &self,
        original: Option<&[u8]>,
        bundle: &MetadataBundle,
    ) -> Result<EncodeOutcome, CrwError> {
        let (header, mut root) = match original {
            Some(data) => self.parse(data)?,
            None => (CiffHeader::new(ByteOrder::LittleEndian), CiffComponent::root()),
        };

        encode_tree(&mut root, bundle, header.byte_order)?;
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&root.write_heap(header.byte_order)?);
        info!(
            before = original.map_or(0, <[u8]>::len),
            after = bytes.len(),
            "Wrote CRW structure"
        );
        Ok(EncodeOutcome {
            bytes,
            strategy: WriteStrategy::Intrusive,
        })
    }
}

/// Populate `bundle` from the records below `root`.
pub fn decode_tree(root: &CiffComponent, bundle: &mut MetadataBundle, byte_order: ByteOrder) {
    root.visit(&mut |component| match find_mapping(component.tag_id(), component.dir) {
        Some(m) => (m.decode)(m, component, bundle, byte_order),
        None => trace!(tag = component.tag_id(), dir = component.dir, "Unmapped CIFF record"),
    });
}

/// Apply `bundle` to the tree: set every mapped record that has metadata,
/// remove the ones that do not.
pub fn encode_tree(
    root: &mut CiffComponent,
    bundle: &MetadataBundle,
    byte_order: ByteOrder,
) -> Result<(), CrwError> {
    for m in CRW_MAPPING.iter() {
        let dirs = crw_dirs(m.crw_dir);
        let existing = root.find(m.crw_tag, m.crw_dir);
        match (m.encode)(m, bundle, existing, byte_order) {
            Some(data) => root.add(&dirs, m.crw_tag)?.set_value(data)?,
            None => {
                if root.remove(&dirs, m.crw_tag) {
                    debug!(tag = m.crw_tag, dir = m.crw_dir, "Removed CIFF record");
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tiff::{tag, Group};
    use crate::metadata::{ExifKey, Value};

    fn camera_bundle() -> MetadataBundle {
        let mut bundle = MetadataBundle::default();
        let exif = &mut bundle.exif;
        exif.set(ExifKey::new(tag::MAKE, Group::Ifd0), Value::Ascii("Canon".into()));
        exif.set(
            ExifKey::new(tag::MODEL, Group::Ifd0),
            Value::Ascii("Canon EOS D30".into()),
        );
        exif.set(
            ExifKey::new(tag::DATE_TIME_ORIGINAL, Group::Exif),
            Value::Ascii("2001:09:09 01:46:40".into()),
        );
        exif.set(ExifKey::new(0x0008, Group::Canon), Value::Long(vec![1001]));
        bundle
    }

    #[test]
    fn test_new_file_round_trip() {
        let parser = CrwParser::default();
        let bundle = camera_bundle();
        let outcome = parser.encode(None, &bundle).unwrap();
        assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
        assert_eq!(&outcome.bytes[0..2], b"II");
        assert_eq!(&outcome.bytes[6..14], CIFF_SIGNATURE);

        let decoded = parser.decode(&outcome.bytes).unwrap();
        for datum in bundle.exif.iter() {
            assert_eq!(decoded.exif.find(&datum.key).map(|d| &d.value), Some(&datum.value));
        }
    }

    #[test]
    fn test_records_land_in_mapped_directories() {
        let parser = CrwParser::default();
        let file = parser.encode(None, &camera_bundle()).unwrap().bytes;
        let (_, root) = parser.parse(&file).unwrap();

        assert!(root.find(0x080a, 0x2807).is_some());
        assert!(root.find(0x180e, 0x300a).is_some());
        assert!(root.find(0x1817, 0x300a).is_some());
        let props = &root.children()[0];
        assert_eq!(props.tag_id(), 0x300a);
    }

    #[test]
    fn test_removed_metadata_prunes_directories() {
        let parser = CrwParser::default();
        let file = parser.encode(None, &camera_bundle()).unwrap().bytes;

        let mut bundle = camera_bundle();
        bundle.exif.erase(&ExifKey::new(tag::MAKE, Group::Ifd0));
        bundle.exif.erase(&ExifKey::new(tag::MODEL, Group::Ifd0));
        let file = parser.encode(Some(&file), &bundle).unwrap().bytes;

        let (_, root) = parser.parse(&file).unwrap();
        assert!(root.find(0x080a, 0x2807).is_none());
        let props = &root.children()[0];
        assert!(props.children().iter().all(|c| c.tag_id() != 0x2807));
        assert!(props.children().iter().any(|c| c.tag_id() == 0x180e));
    }

    #[test]
    fn test_header_padding_and_unmapped_records_survive() {
        let mut header = CiffHeader::new(ByteOrder::BigEndian);
        header.padding[4..8].copy_from_slice(&[1, 2, 3, 4]);
        let mut root = CiffComponent::root();
        root.add(&[0x300a], 0x1804)
            .unwrap()
            .set_value(vec![0, 0, 0, 42])
            .unwrap();
        let mut file = header.to_bytes();
        file.extend_from_slice(&root.write_heap(ByteOrder::BigEndian).unwrap());

        let parser = CrwParser::default();
        let out = parser.encode(Some(&file), &camera_bundle()).unwrap().bytes;
        let (new_header, new_root) = parser.parse(&out).unwrap();
        assert_eq!(new_header, header);
        let unmapped = new_root.find(0x1804, 0x300a).unwrap();
        assert_eq!(unmapped.data().unwrap().as_ref(), &[0, 0, 0, 42]);
    }

    #[test]
    fn test_thumbnail_in_root() {
        let parser = CrwParser::default();
        let mut bundle = MetadataBundle::default();
        let mut datum = crate::metadata::Exifdatum::new(
            ExifKey::new(tag::JPEG_INTERCHANGE_FORMAT, Group::Ifd1),
            Value::Long(vec![0]),
        );
        datum.data_area = Some(vec![0xff, 0xd8, 0xff, 0xd9]);
        bundle.exif.add(datum);

        let file = parser.encode(None, &bundle).unwrap().bytes;
        let (_, root) = parser.parse(&file).unwrap();
        assert_eq!(root.children()[0].tag_id(), 0x2008);

        let decoded = parser.decode(&file).unwrap();
        let length = decoded
            .exif
            .find(&ExifKey::new(tag::JPEG_INTERCHANGE_FORMAT_LENGTH, Group::Ifd1))
            .unwrap();
        assert_eq!(length.value, Value::Long(vec![4]));
    }

    #[test]
    fn test_rejects_non_crw() {
        let parser = CrwParser::default();
        assert_eq!(
            parser.decode(b"II*\0\x08\0\0\0\0\0\0\0\0\0"),
            Err(CrwError::InvalidSignature)
        );
    }
}
