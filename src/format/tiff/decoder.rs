//! Tree to metadata.
//!
//! Every node is resolved against the decoder table with a three step
//! lookup: camera make plus exact tag, camera make plus group wildcard, then
//! the standard rule that copies the value unchanged. A `Null` rule drops
//! the node from the Exif collection.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::{debug, trace};

use super::component::{Component, Node};
use super::tags::{tag, ExtTag, Group};
use crate::metadata::{ExifKey, Exifdatum, IptcData, MetadataBundle, XmpData};

/// What to do with one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeRule {
    /// Copy type, count and value into the Exif collection
    Standard,
    /// Leave the node out of the Exif collection
    Null,
}

/// Make prefix that matches every camera.
const ANY_MAKE: &str = "*";

const RULES: &[(&str, ExtTag, Group, DecodeRule)] = &[
    (ANY_MAKE, ExtTag::Tag(tag::SUB_IFDS), Group::Ifd0, DecodeRule::Null),
    (ANY_MAKE, ExtTag::Tag(tag::XMP_PACKET), Group::Ifd0, DecodeRule::Null),
    (ANY_MAKE, ExtTag::Tag(tag::IPTC_NAA), Group::Ifd0, DecodeRule::Null),
    ("NIKON", ExtTag::Tag(0x0011), Group::Nikon3, DecodeRule::Null),
];

static RULE_TABLE: Lazy<HashMap<(ExtTag, Group), Vec<(&'static str, DecodeRule)>>> =
    Lazy::new(|| {
        let mut table: HashMap<_, Vec<_>> = HashMap::new();
        for (make, ext, group, rule) in RULES {
            table.entry((*ext, *group)).or_default().push((*make, *rule));
        }
        table
    });

fn lookup(make: &str, ext: ExtTag, group: Group) -> Option<DecodeRule> {
    RULE_TABLE.get(&(ext, group)).and_then(|rules| {
        rules
            .iter()
            .find(|(prefix, _)| *prefix == ANY_MAKE || make.starts_with(prefix))
            .map(|(_, rule)| *rule)
    })
}

/// Rule for `(tag, group)` of a camera of `make`.
pub fn find_rule(make: &str, tag: u16, group: Group) -> DecodeRule {
    lookup(make, ExtTag::Tag(tag), group)
        .or_else(|| lookup(make, ExtTag::All, group))
        .unwrap_or(DecodeRule::Standard)
}

// =============================================================================
// Decoding
// =============================================================================

/// Populate `bundle` from the tree below `root`.
pub fn decode_tree(root: &Component, bundle: &mut MetadataBundle) {
    decode_packets(root, bundle);

    let make = root
        .find(tag::MAKE, Group::Ifd0)
        .and_then(Component::value)
        .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
        .unwrap_or_default();

    root.visit(&mut |component| {
        if let Some(datum) = decode_node(&make, component) {
            trace!(key = %datum.key, "Decoded entry");
            bundle.exif.add(datum);
        }
    });
}

/// Embedded XMP and IPTC packets go to their own collections.
fn decode_packets(root: &Component, bundle: &mut MetadataBundle) {
    if let Some(base) = root.find(tag::XMP_PACKET, Group::Ifd0).and_then(Component::base) {
        let packet = base.bytes_in(base.byte_order);
        let end = packet.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        bundle.xmp = XmpData::new(String::from_utf8_lossy(&packet[..end]));
        debug!(len = end, "Decoded XMP packet");
    }
    if let Some(base) = root.find(tag::IPTC_NAA, Group::Ifd0).and_then(Component::base) {
        bundle.iptc = IptcData::from_iim(&base.bytes_in(base.byte_order));
        debug!(datasets = bundle.iptc.len(), "Decoded IPTC packet");
    }
}

fn decode_node(make: &str, component: &Component) -> Option<Exifdatum> {
    let base = match &component.node {
        Node::Directory(_) => return None,
        Node::Array(arr) if arr.decoded => return None,
        Node::MakerNote(mn) if mn.mn.is_some() => return None,
        _ => component.base()?,
    };
    if find_rule(make, component.tag, component.group) == DecodeRule::Null {
        return None;
    }

    let key = ExifKey::new(component.tag, component.group);
    let mut datum = Exifdatum::new(key, base.value());
    if let Node::Data(entry) = &component.node {
        if !entry.strips.is_empty() {
            datum.data_area = Some(entry.data_area());
        }
    }
    Some(datum)
}

// =============================================================================
// Tests
// =============================================================================
