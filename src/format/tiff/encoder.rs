//! Metadata to tree.
//!
//! Two strategies exist:
//!
//! - **Non-intrusive**: patch changed values into a copy of the original
//!   buffer. A value may shrink but never grow, and nothing is relocated.
//!   Any change that cannot be expressed this way (a new or deleted tag, a
//!   grown value, new image data) makes the whole attempt dirty.
//! - **Intrusive**: build a new tree from the schema, copy the image
//!   structure of the primary images from the original tree and add every
//!   metadata entry by path. The result is serialized from scratch.

use bytes::Bytes;
use tracing::{debug, warn};

use super::component::{Component, EntryBase, MnEntry, Node};
use super::decoder::decode_tree;
use super::schema::{self, Factory, PathItem};
use super::tags::{tag, ExtTag, FieldType, Group};
use crate::error::TiffError;
use crate::io::ByteOrder;
use crate::metadata::{ExifKey, IptcData, MetadataBundle, Value};

// =============================================================================
// Primary groups
// =============================================================================

/// Groups that may hold the main image.
const PRIMARY_CANDIDATES: [Group; 5] = [
    Group::Ifd0,
    Group::SubImage1,
    Group::SubImage2,
    Group::SubImage3,
    Group::SubImage4,
];

/// Directories holding a full resolution image rather than a preview.
///
/// A NewSubfileType of 0 marks a primary image. IFD0 without the tag is
/// primary as well.
pub fn primary_groups(root: &Component) -> Vec<Group> {
    PRIMARY_CANDIDATES
        .into_iter()
        .filter(|group| {
            match root
                .find(tag::NEW_SUBFILE_TYPE, *group)
                .and_then(|c| c.value())
                .and_then(|v| v.to_u32(0))
            {
                Some(kind) => kind == 0,
                None => *group == Group::Ifd0,
            }
        })
        .collect()
}

// =============================================================================
// Non-intrusive
// =============================================================================

/// Result of an in-place attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The original buffer with every change applied
    Patched(Vec<u8>),
    /// At least one change needs a rebuild
    Dirty(String),
}

/// Patch `bundle` into a copy of `original`, the buffer `root` was parsed from.
pub fn encode_in_place(original: &[u8], root: &mut Component, bundle: &MetadataBundle) -> PatchOutcome {
    match patch(original, root, bundle) {
        Ok(buf) => PatchOutcome::Patched(buf),
        Err(reason) => {
            debug!(%reason, "In-place update not possible");
            PatchOutcome::Dirty(reason)
        }
    }
}

fn patch(original: &[u8], root: &mut Component, bundle: &MetadataBundle) -> Result<Vec<u8>, String> {
    let mut buf = original.to_vec();

    let mut current = MetadataBundle::default();
    decode_tree(root, &mut current);
    if let Some(gone) = current.exif.iter().find(|d| bundle.exif.find(&d.key).is_none()) {
        return Err(format!("{} was deleted", gone.key));
    }

    let mut element_edits = Vec::new();
    for datum in bundle.exif.iter() {
        let key = datum.key;
        let node = root
            .find(key.tag, key.group)
            .ok_or_else(|| format!("{key} is new"))?;
        match &node.node {
            Node::Directory(_) | Node::SubIfd(_) | Node::Size(_) => {}
            Node::MakerNote(mn) if mn.mn.is_some() => {}
            Node::Data(data) => {
                if datum.data_area.as_ref().is_some_and(|area| *area != data.data_area()) {
                    return Err(format!("image data of {key} changed"));
                }
            }
            Node::Element(element) => {
                if element.base.value() != datum.value {
                    if datum.value.size() != element.base.size() {
                        return Err(format!("{key} changed size"));
                    }
                    element_edits.push((key, datum.value.clone()));
                }
            }
            _ => {
                let Some(base) = node.base() else {
                    continue;
                };
                if base.value() != datum.value {
                    patch_value(&mut buf, base, &datum.value).map_err(|e| format!("{key}: {e}"))?;
                }
            }
        }
    }

    patch_arrays(&mut buf, root, element_edits)?;
    patch_packets(&mut buf, root, bundle)?;
    Ok(buf)
}

/// Apply element edits and re-encode the arrays they belong to.
fn patch_arrays(
    buf: &mut [u8],
    root: &mut Component,
    edits: Vec<(ExifKey, Value)>,
) -> Result<(), String> {
    if edits.is_empty() {
        return Ok(());
    }

    let mut arrays: Vec<(u16, Group)> = Vec::new();
    root.visit(&mut |c| {
        if let Node::Array(arr) = &c.node {
            let touched = arr
                .elements
                .iter()
                .any(|e| edits.iter().any(|(k, _)| k.tag == e.tag && k.group == e.group));
            if touched {
                arrays.push((c.tag, c.group));
            }
        }
    });
    for (key, value) in edits {
        if let Some(base) = root.find_mut(key.tag, key.group).and_then(Component::base_mut) {
            base.set_value(value);
        }
    }

    let tree: &Component = root;
    for (tag, group) in arrays {
        let Some(node) = tree.find(tag, group) else {
            continue;
        };
        let Node::Array(arr) = &node.node else {
            continue;
        };
        let bytes = arr.encode(tag, arr.base.byte_order, tree);
        patch_bytes(buf, &arr.base, arr.base.type_id, &bytes)
            .map_err(|e| format!("array 0x{tag:04x} in {group}: {e}"))?;
    }
    Ok(())
}

fn patch_packets(buf: &mut [u8], root: &Component, bundle: &MetadataBundle) -> Result<(), String> {
    let xmp = root.find(tag::XMP_PACKET, Group::Ifd0).and_then(Component::base);
    match (xmp, bundle.xmp.is_empty()) {
        (None, true) => {}
        (None, false) => return Err("XMP packet is new".to_string()),
        (Some(_), true) => return Err("XMP packet was deleted".to_string()),
        (Some(base), false) => {
            let value = Value::Byte(bundle.xmp.packet.as_bytes().to_vec());
            let current = base.bytes_in(base.byte_order);
            let end = current.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            if current[..end] != *bundle.xmp.packet.as_bytes() {
                patch_value(buf, base, &value).map_err(|e| format!("XMP: {e}"))?;
            }
        }
    }

    let iptc = root.find(tag::IPTC_NAA, Group::Ifd0).and_then(Component::base);
    match (iptc, bundle.iptc.is_empty()) {
        (None, true) => {}
        (None, false) => return Err("IPTC block is new".to_string()),
        (Some(_), true) => return Err("IPTC block was deleted".to_string()),
        (Some(base), false) => {
            if IptcData::from_iim(&base.bytes_in(base.byte_order)) != bundle.iptc {
                let value = Value::Undefined(bundle.iptc.to_iim());
                patch_value(buf, base, &value).map_err(|e| format!("IPTC: {e}"))?;
            }
        }
    }
    Ok(())
}

fn patch_value(buf: &mut [u8], base: &EntryBase, value: &Value) -> Result<(), &'static str> {
    let bytes = value.to_bytes(base.byte_order);
    patch_bytes(buf, base, value.field_type().as_u16(), &bytes)
}

/// Overwrite the value of a parsed entry, updating type and count.
///
/// The value may shrink, in which case the freed bytes are zeroed, or move
/// into the entry record once it fits there.
fn patch_bytes(buf: &mut [u8], base: &EntryBase, type_id: u16, bytes: &[u8]) -> Result<(), &'static str> {
    let (Some(record), Some(value_pos)) = (base.record_pos, base.value_pos) else {
        return Err("entry was not read from this buffer");
    };
    let old = base.data.len();
    let inline = FieldType::INLINE_THRESHOLD;
    if bytes.len() > old.max(inline) || (bytes.len() > inline && old <= inline) {
        return Err("value grew");
    }
    let unit = FieldType::size_of_raw(type_id).max(1);
    let count = u32::try_from(bytes.len() / unit).map_err(|_| "count overflows")?;

    let bo = base.byte_order;
    let region = |start: usize, len: usize| start..start + len;
    if buf.len() < record + 12 || buf.len() < value_pos + old {
        return Err("entry outside buffer");
    }
    bo.put_u16(buf, record + 2, type_id);
    bo.put_u32(buf, record + 4, count);

    if bytes.len() <= inline {
        if old > inline {
            buf[region(value_pos, old)].fill(0);
        }
        let slot = &mut buf[region(record + 8, inline)];
        slot.fill(0);
        slot[..bytes.len()].copy_from_slice(bytes);
    } else {
        buf[region(value_pos, bytes.len())].copy_from_slice(bytes);
        buf[region(value_pos + bytes.len(), old - bytes.len())].fill(0);
    }
    Ok(())
}

// =============================================================================
// Intrusive
// =============================================================================

/// Copy the image structure of the primary images into `target`.
pub struct Copier<'a> {
    primary: &'a [Group],
}

impl<'a> Copier<'a> {
    pub fn new(primary: &'a [Group]) -> Self {
        Self { primary }
    }

    pub fn copy(&self, source: &Component, target: &mut Component) -> Result<usize, TiffError> {
        let mut nodes = Vec::new();
        source.visit(&mut |c| {
            if !c.is_directory() && schema::is_image_tag(c.tag, c.group, self.primary) {
                nodes.push(c.clone());
            }
        });
        let copied = nodes.len();
        for node in nodes {
            let mut path = schema::tiff_path(node.tag, node.group);
            target.add_path(node.tag, &mut path, Some(node))?;
        }
        Ok(copied)
    }
}

/// Build a new tree holding `bundle`.
///
/// `original` is the tree parsed from the file being rewritten, if any. Its
/// makernote header and the image structure of its primary images are kept.
pub fn build_tree(
    original: Option<&Component>,
    bundle: &MetadataBundle,
    byte_order: ByteOrder,
) -> Result<Component, TiffError> {
    let mut root = schema::create(ExtTag::Root, Group::None);
    let primary = original.map(primary_groups).unwrap_or_default();
    if let Some(original) = original {
        let copied = Copier::new(&primary).copy(original, &mut root)?;
        debug!(?primary, copied, "Copied image structure");
    }

    let makernote_item = PathItem {
        ext: ExtTag::Tag(tag::MAKER_NOTE),
        group: Group::Exif,
    };
    for datum in bundle.exif.iter() {
        let ExifKey { tag, group } = datum.key;
        if schema::is_image_tag(tag, group, &primary) {
            continue;
        }
        if matches!(schema::factory(ExtTag::Tag(tag), group), Some(Factory::SubIfd(_))) {
            continue;
        }

        let mut path = schema::tiff_path(tag, group);
        if group != Group::Exif && path.contains(makernote_item) {
            seed_makernote(original, &mut root, byte_order)?;
        }
        let node = match root.add_path(tag, &mut path, None) {
            Ok(Some(node)) => node,
            Ok(None) => continue,
            Err(e) => {
                warn!(key = %datum.key, error = %e, "Cannot place entry");
                continue;
            }
        };
        if let Some(base) = node.base_mut() {
            base.byte_order = byte_order;
            base.set_value(datum.value.clone());
        }
        if let (Node::Data(data), Some(area)) = (&mut node.node, &datum.data_area) {
            data.strips = vec![Bytes::from(area.clone())];
        }
    }
    if let Some(original) = original {
        let seeded = seed_arrays(original, &mut root);
        debug!(seeded, "Seeded binary arrays from the original tree");
    }

    add_packet(&mut root, tag::XMP_PACKET, (!bundle.xmp.is_empty()).then(|| {
        Value::Byte(bundle.xmp.packet.as_bytes().to_vec())
    }))?;
    add_packet(&mut root, tag::IPTC_NAA, (!bundle.iptc.is_empty()).then(|| {
        Value::Undefined(bundle.iptc.to_iim())
    }))?;
    Ok(root)
}

/// Give the new tree the original's makernote header, before any vendor entry is added.
fn seed_makernote(
    original: Option<&Component>,
    root: &mut Component,
    byte_order: ByteOrder,
) -> Result<(), TiffError> {
    if root.find(tag::MAKER_NOTE, Group::Exif).is_some() {
        return Ok(());
    }
    let Some(Node::MakerNote(source)) = original
        .and_then(|o| o.find(tag::MAKER_NOTE, Group::Exif))
        .map(|c| &c.node)
    else {
        return Ok(());
    };
    let Some(mn) = source.mn.as_deref() else {
        return Ok(());
    };

    let shell = Component::new(
        tag::MAKER_NOTE,
        Group::Exif,
        Node::MakerNote(MnEntry {
            base: EntryBase::new(FieldType::Undefined.as_u16(), byte_order),
            mn_group: source.mn_group,
            mn: Some(Box::new(mn.shell())),
        }),
    );
    let mut path = schema::tiff_path(tag::MAKER_NOTE, Group::Exif);
    root.add_path(tag::MAKER_NOTE, &mut path, Some(shell))?;
    Ok(())
}

/// Give every binary array of the new tree the blob its original was
/// decoded from, so bytes no element covers are written back unchanged.
///
/// Only arrays that ended up with the same layout are seeded.
fn seed_arrays(original: &Component, root: &mut Component) -> usize {
    let mut seeded = 0;
    root.visit_mut(&mut |c| {
        let Node::Array(arr) = &mut c.node else {
            return;
        };
        let Some(Node::Array(source)) = original.find(c.tag, c.group).map(|s| &s.node) else {
            return;
        };
        if !source.decoded || arr.plain.is_some() {
            return;
        }
        let same_layout = matches!(
            (arr.cfg, source.cfg),
            (Some(a), Some(b)) if std::ptr::eq(a, b)
        );
        if same_layout {
            arr.plain = source.plain.clone();
            seeded += 1;
        }
    });
    seeded
}

fn add_packet(root: &mut Component, tag: u16, value: Option<Value>) -> Result<(), TiffError> {
    let Some(value) = value else {
        return Ok(());
    };
    let mut path = schema::tiff_path(tag, Group::Ifd0);
    if let Some(base) = root
        .add_path(tag, &mut path, None)?
        .and_then(Component::base_mut)
    {
        base.set_value(value);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
