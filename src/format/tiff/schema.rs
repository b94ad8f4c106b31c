//! Static schema tables of the TIFF tree.
//!
//! Two tables describe the shape of every tree the engine can build:
//!
//! - the **tree table** maps a group to its parent `(group, tag)`, which is
//!   enough to compute the path from the root to any node
//! - the **group table** maps `(tag, group)` to the kind of node that
//!   represents the tag, with an `(All, group)` wildcard fallback
//!
//! Both are built once on first use and never mutated.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::binary::{ArrayCfg, ArrayLayout, ArraySet, BinaryArray, BinaryElement};
use super::component::{Component, DataEntry, EntryBase, MnEntry, Node, SizeEntry, SubIfd};
use super::tags::{tag, ExtTag, FieldType, Group};
use super::vendor;
use crate::io::ByteOrder;

// =============================================================================
// TiffPath
// =============================================================================

/// One step of a path: the tag of a node and the group it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathItem {
    pub ext: ExtTag,
    pub group: Group,
}

/// Stack of path items from a target node (bottom) up to the root (top).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TiffPath {
    items: Vec<PathItem>,
}

impl TiffPath {
    pub fn push(&mut self, item: PathItem) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<PathItem> {
        self.items.pop()
    }

    pub fn top(&self) -> Option<PathItem> {
        self.items.last().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the path passes through `item`.
    pub fn contains(&self, item: PathItem) -> bool {
        self.items.contains(&item)
    }
}

// =============================================================================
// Tree table
// =============================================================================

/// child group -> (parent group, tag of the parent entry)
const TREE: &[(Group, Group, ExtTag)] = &[
    (Group::Ifd0, Group::None, ExtTag::Root),
    (Group::Ifd1, Group::Ifd0, ExtTag::Next),
    (Group::Ifd2, Group::Ifd1, ExtTag::Next),
    (Group::Ifd3, Group::Ifd2, ExtTag::Next),
    (Group::Exif, Group::Ifd0, ExtTag::Tag(tag::EXIF_IFD_POINTER)),
    (Group::Gps, Group::Ifd0, ExtTag::Tag(tag::GPS_IFD_POINTER)),
    (Group::Iop, Group::Exif, ExtTag::Tag(tag::INTEROPERABILITY_IFD_POINTER)),
    (Group::SubImage1, Group::Ifd0, ExtTag::Tag(tag::SUB_IFDS)),
    (Group::SubImage2, Group::Ifd0, ExtTag::Tag(tag::SUB_IFDS)),
    (Group::SubImage3, Group::Ifd0, ExtTag::Tag(tag::SUB_IFDS)),
    (Group::SubImage4, Group::Ifd0, ExtTag::Tag(tag::SUB_IFDS)),
    (Group::Canon, Group::Exif, ExtTag::Tag(tag::MAKER_NOTE)),
    (Group::CanonCs, Group::Canon, ExtTag::Tag(0x0001)),
    (Group::CanonSi, Group::Canon, ExtTag::Tag(0x0004)),
    (Group::CanonCf, Group::Canon, ExtTag::Tag(0x000f)),
    (Group::CanonPi, Group::Canon, ExtTag::Tag(0x0012)),
    (Group::CanonFi, Group::Canon, ExtTag::Tag(0x0093)),
    (Group::Nikon3, Group::Exif, ExtTag::Tag(tag::MAKER_NOTE)),
    (Group::NikonPv, Group::Nikon3, ExtTag::Tag(0x0011)),
    (Group::NikonVr, Group::Nikon3, ExtTag::Tag(0x001f)),
    (Group::NikonLd1, Group::Nikon3, ExtTag::Tag(0x0098)),
    (Group::NikonLd2, Group::Nikon3, ExtTag::Tag(0x0098)),
    (Group::NikonLd3, Group::Nikon3, ExtTag::Tag(0x0098)),
    (Group::NikonLd4, Group::Nikon3, ExtTag::Tag(0x0098)),
    (Group::Sony2, Group::Exif, ExtTag::Tag(tag::MAKER_NOTE)),
    (Group::SonyMisc3a, Group::Sony2, ExtTag::Tag(0x9400)),
    (Group::SonyMisc3b, Group::Sony2, ExtTag::Tag(0x9400)),
    (Group::Sony2Fp, Group::Sony2, ExtTag::Tag(0x9402)),
];

static TREE_TABLE: Lazy<HashMap<Group, (Group, ExtTag)>> = Lazy::new(|| {
    TREE.iter()
        .map(|(child, parent, parent_tag)| (*child, (*parent, *parent_tag)))
        .collect()
});

/// Path from the root of a tree to the entry `(tag, group)`.
pub fn tiff_path(tag: u16, group: Group) -> TiffPath {
    let mut path = TiffPath::default();
    let mut item = PathItem {
        ext: ExtTag::Tag(tag),
        group,
    };
    loop {
        path.push(item);
        if item.group == Group::None {
            break;
        }
        let Some((parent, parent_tag)) = TREE_TABLE.get(&item.group) else {
            break;
        };
        item = PathItem {
            ext: *parent_tag,
            group: *parent,
        };
    }
    path
}

// =============================================================================
// Group table
// =============================================================================

/// Node kind to create for a `(tag, group)` key.
#[derive(Debug, Clone, Copy)]
pub enum Factory {
    Directory { group: Group },
    SubIfd(Group),
    MakerNote,
    Data { size_tag: u16 },
    Size { data_tag: u16 },
    Array(&'static ArrayCfg),
    ArraySet(&'static ArraySet),
    Element,
}

/// Groups whose directories may carry image data.
const IMAGE_GROUPS: [Group; 8] = [
    Group::Ifd0,
    Group::Ifd1,
    Group::Ifd2,
    Group::Ifd3,
    Group::SubImage1,
    Group::SubImage2,
    Group::SubImage3,
    Group::SubImage4,
];

/// Offset tags and the byte-count tags that size them.
const DATA_PAIRS: [(u16, u16); 3] = [
    (tag::STRIP_OFFSETS, tag::STRIP_BYTE_COUNTS),
    (tag::TILE_OFFSETS, tag::TILE_BYTE_COUNTS),
    (tag::JPEG_INTERCHANGE_FORMAT, tag::JPEG_INTERCHANGE_FORMAT_LENGTH),
];

static GROUP_TABLE: Lazy<HashMap<(ExtTag, Group), Factory>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut add = |tag: ExtTag, group: Group, factory: Factory| {
        table.insert((tag, group), factory);
    };

    add(ExtTag::Root, Group::None, Factory::Directory { group: Group::Ifd0 });
    add(ExtTag::Next, Group::Ifd0, Factory::Directory { group: Group::Ifd1 });
    add(ExtTag::Next, Group::Ifd1, Factory::Directory { group: Group::Ifd2 });
    add(ExtTag::Next, Group::Ifd2, Factory::Directory { group: Group::Ifd3 });

    add(tag::EXIF_IFD_POINTER.into(), Group::Ifd0, Factory::SubIfd(Group::Exif));
    add(tag::GPS_IFD_POINTER.into(), Group::Ifd0, Factory::SubIfd(Group::Gps));
    add(tag::SUB_IFDS.into(), Group::Ifd0, Factory::SubIfd(Group::SubImage1));
    add(
        tag::INTEROPERABILITY_IFD_POINTER.into(),
        Group::Exif,
        Factory::SubIfd(Group::Iop),
    );
    add(tag::MAKER_NOTE.into(), Group::Exif, Factory::MakerNote);

    for group in IMAGE_GROUPS.into_iter().chain([Group::NikonPv]) {
        for (data_tag, size_tag) in DATA_PAIRS {
            add(data_tag.into(), group, Factory::Data { size_tag });
            add(size_tag.into(), group, Factory::Size { data_tag });
        }
    }

    add(ExtTag::Tag(0x0001), Group::Canon, Factory::Array(&vendor::CANON_CS));
    add(ExtTag::Tag(0x0004), Group::Canon, Factory::Array(&vendor::CANON_SI));
    add(ExtTag::Tag(0x000f), Group::Canon, Factory::Array(&vendor::CANON_CF));
    add(ExtTag::Tag(0x0012), Group::Canon, Factory::Array(&vendor::CANON_PI));
    add(ExtTag::Tag(0x0093), Group::Canon, Factory::Array(&vendor::CANON_FI));

    add(ExtTag::Tag(0x0011), Group::Nikon3, Factory::SubIfd(Group::NikonPv));
    add(ExtTag::Tag(0x001f), Group::Nikon3, Factory::Array(&vendor::NIKON_VR));
    add(ExtTag::Tag(0x0098), Group::Nikon3, Factory::ArraySet(&vendor::NIKON_LD));

    add(ExtTag::Tag(0x9400), Group::Sony2, Factory::ArraySet(&vendor::SONY_MISC3));
    add(ExtTag::Tag(0x9402), Group::Sony2, Factory::Array(&vendor::SONY2_FP));

    for group in [
        Group::CanonCs,
        Group::CanonSi,
        Group::CanonCf,
        Group::CanonPi,
        Group::CanonFi,
        Group::NikonVr,
        Group::NikonLd1,
        Group::NikonLd2,
        Group::NikonLd3,
        Group::NikonLd4,
        Group::SonyMisc3a,
        Group::SonyMisc3b,
        Group::Sony2Fp,
    ] {
        add(ExtTag::All, group, Factory::Element);
    }

    table
});

/// Node kind registered for `(tag, group)`, falling back to the group wildcard.
pub fn factory(ext: ExtTag, group: Group) -> Option<Factory> {
    GROUP_TABLE
        .get(&(ext, group))
        .or_else(|| GROUP_TABLE.get(&(ExtTag::All, group)))
        .copied()
}

/// Create the node the group table designates for `(tag, group)`.
///
/// Tags without a table entry become plain entries.
pub fn create(ext: ExtTag, group: Group) -> Component {
    let tag = ext.tag().unwrap_or(0);
    let bo = ByteOrder::LittleEndian;
    let base = |field_type: FieldType| EntryBase::new(field_type.as_u16(), bo);

    match factory(ext, group) {
        Some(Factory::Directory { group }) => Component::directory(tag, group, true),
        Some(Factory::SubIfd(new_group)) => Component::new(
            tag,
            group,
            Node::SubIfd(SubIfd {
                base: base(FieldType::Long),
                new_group,
                ifds: Vec::new(),
            }),
        ),
        Some(Factory::MakerNote) => Component::new(
            tag,
            group,
            Node::MakerNote(MnEntry {
                base: base(FieldType::Undefined),
                mn_group: None,
                mn: None,
            }),
        ),
        Some(Factory::Data { size_tag }) => Component::new(
            tag,
            group,
            Node::Data(DataEntry {
                base: base(FieldType::Long),
                size_tag,
                strips: Vec::new(),
            }),
        ),
        Some(Factory::Size { data_tag }) => Component::new(
            tag,
            group,
            Node::Size(SizeEntry {
                base: base(FieldType::Long),
                data_tag,
            }),
        ),
        Some(Factory::Array(cfg)) => Component::new(
            tag,
            group,
            Node::Array(BinaryArray::new(
                base(FieldType::Undefined),
                ArrayLayout::Single(cfg),
            )),
        ),
        Some(Factory::ArraySet(set)) => Component::new(
            tag,
            group,
            Node::Array(BinaryArray::new(
                base(FieldType::Undefined),
                ArrayLayout::Set(set),
            )),
        ),
        Some(Factory::Element) => Component::new(
            tag,
            group,
            Node::Element(BinaryElement::new(base(FieldType::Undefined))),
        ),
        None => Component::new(tag, group, Node::Entry(base(FieldType::Undefined))),
    }
}

/// Group of the directory linked as "next" from a directory of `group`.
pub fn next_group(group: Group) -> Option<Group> {
    match factory(ExtTag::Next, group) {
        Some(Factory::Directory { group }) => Some(group),
        _ => None,
    }
}

// =============================================================================
// Tag classification
// =============================================================================

/// Tags describing the layout of image data rather than metadata.
const IMAGE_TAGS: &[u16] = &[
    tag::NEW_SUBFILE_TYPE,
    tag::IMAGE_WIDTH,
    tag::IMAGE_LENGTH,
    tag::BITS_PER_SAMPLE,
    tag::COMPRESSION,
    tag::PHOTOMETRIC_INTERPRETATION,
    tag::STRIP_OFFSETS,
    tag::SAMPLES_PER_PIXEL,
    tag::ROWS_PER_STRIP,
    tag::STRIP_BYTE_COUNTS,
    tag::PLANAR_CONFIGURATION,
    0x013d, // Predictor
    tag::TILE_WIDTH,
    tag::TILE_LENGTH,
    tag::TILE_OFFSETS,
    tag::TILE_BYTE_COUNTS,
    0x0152, // ExtraSamples
    0x0153, // SampleFormat
    0x828d, // CFARepeatPatternDim
    0x828e, // CFAPattern
];

/// Whether `(tag, group)` is image structure of one of the `primary` groups.
pub fn is_image_tag(tag: u16, group: Group, primary: &[Group]) -> bool {
    primary.contains(&group) && IMAGE_TAGS.contains(&tag)
}
