//! Generic metadata containers populated by the decoders.
//!
//! These are simple, order-preserving collections. The tree
//! engines only use `add`/`find`-style access and never depend on how the
//! entries are stored.
//!
//! - [`ExifData`] holds Exif-like entries keyed by `(group, tag)`
//! - [`IptcData`] holds IPTC IIM datasets
//! - [`XmpData`] holds a raw XMP packet

mod labels;
mod value;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::error::ValueError;
use crate::format::tiff::{tag_by_name, tag_name, Group};

pub use labels::{LabelLookup, NoLabels, StaticLabels};
pub use value::Value;

// =============================================================================
// ExifKey
// =============================================================================

/// Structured key of an Exif-like entry: the group it lives in and its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExifKey {
    pub group: Group,
    pub tag: u16,
}

impl ExifKey {
    pub const fn new(tag: u16, group: Group) -> Self {
        Self { group, tag }
    }

    /// Tag name within the group, falling back to the hex id.
    pub fn tag_name(&self) -> String {
        tag_name(self.tag, self.group)
            .map(str::to_string)
            .unwrap_or_else(|| format!("0x{:04x}", self.tag))
    }
}

impl fmt::Display for ExifKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exif.{}.{}", self.group.name(), self.tag_name())
    }
}

impl FromStr for ExifKey {
    type Err = ValueError;

    /// Parse `Exif.<Group>.<TagName|0xhhhh>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidKey(s.to_string());
        let mut parts = s.split('.');
        if parts.next() != Some("Exif") {
            return Err(invalid());
        }
        let group = parts
            .next()
            .and_then(Group::from_name)
            .ok_or_else(invalid)?;
        let tag_part = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        let tag = match tag_part.strip_prefix("0x") {
            Some(hex) => u16::from_str_radix(hex, 16).map_err(|_| invalid())?,
            None => tag_by_name(tag_part, group).ok_or_else(invalid)?,
        };
        Ok(ExifKey::new(tag, group))
    }
}

// =============================================================================
// Exifdatum / ExifData
// =============================================================================

/// One Exif-like metadata entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exifdatum {
    pub key: ExifKey,
    pub value: Value,
    /// Payload referenced by a data entry (thumbnail or strips), if any
    #[serde(skip)]
    pub data_area: Option<Vec<u8>>,
}

impl Exifdatum {
    pub fn new(key: ExifKey, value: Value) -> Self {
        Self {
            key,
            value,
            data_area: None,
        }
    }

    /// Value rendered for display, consulting the label collaborator first.
    pub fn display(&self, vendor: &str, labels: &dyn LabelLookup) -> String {
        if let Some(code) = self.value.to_u32(0) {
            if self.value.count() == 1 {
                if let Some(label) = labels.label(vendor, self.key, i64::from(code)) {
                    return label;
                }
            }
        }
        self.value.to_string()
    }
}

/// Ordered collection of Exif-like entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExifData {
    entries: Vec<Exifdatum>,
}

impl ExifData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Duplicate keys are kept in insertion order.
    pub fn add(&mut self, datum: Exifdatum) {
        self.entries.push(datum);
    }

    /// Replace the value of the first entry with `key`, or append a new one.
    pub fn set(&mut self, key: ExifKey, value: Value) {
        match self.find_mut(&key) {
            Some(datum) => datum.value = value,
            None => self.add(Exifdatum::new(key, value)),
        }
    }

    pub fn find(&self, key: &ExifKey) -> Option<&Exifdatum> {
        self.entries.iter().find(|d| d.key == *key)
    }

    pub fn find_mut(&mut self, key: &ExifKey) -> Option<&mut Exifdatum> {
        self.entries.iter_mut().find(|d| d.key == *key)
    }

    /// Remove every entry with `key`. Returns whether anything was removed.
    pub fn erase(&mut self, key: &ExifKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|d| d.key != *key);
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exifdatum> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make of the camera, read from `Exif.Image.Make`.
    pub fn make(&self) -> Option<&str> {
        self.find(&ExifKey::new(crate::format::tiff::tag::MAKE, Group::Ifd0))
            .and_then(|d| d.value.as_str())
    }
}

impl<'a> IntoIterator for &'a ExifData {
    type Item = &'a Exifdatum;
    type IntoIter = std::slice::Iter<'a, Exifdatum>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// =============================================================================
// IptcData
// =============================================================================

/// IIM tag marker starting every dataset.
const IIM_MARKER: u8 = 0x1c;

/// One IPTC IIM dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IptcDatum {
    pub record: u8,
    pub dataset: u8,
    #[serde(serialize_with = "serialize_lossy")]
    pub data: Vec<u8>,
}

fn serialize_lossy<S: serde::Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(data))
}

/// IPTC datasets in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IptcData {
    datasets: Vec<IptcDatum>,
}

impl IptcData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an IIM block.
    ///
    /// Parsing stops at the first malformed dataset; datasets read up to that
    /// point are kept.
    pub fn from_iim(data: &[u8]) -> Self {
        let mut iptc = IptcData::new();
        let mut pos = 0;
        while pos < data.len() {
            if data[pos] != IIM_MARKER {
                // Packets are commonly padded to a multiple of four.
                if data[pos..].iter().any(|b| *b != 0) {
                    warn!(pos, "Unexpected byte in IPTC block, ignoring the rest");
                }
                break;
            }
            let Some(header) = data.get(pos..pos + 5) else {
                warn!(pos, "Truncated IPTC dataset header");
                break;
            };
            let len = u16::from_be_bytes([header[3], header[4]]);
            if len & 0x8000 != 0 {
                warn!(pos, "Extended IPTC datasets are not supported");
                break;
            }
            let start = pos + 5;
            let Some(body) = data.get(start..start + len as usize) else {
                warn!(pos, len, "IPTC dataset exceeds the block");
                break;
            };
            iptc.add(header[1], header[2], body.to_vec());
            pos = start + len as usize;
        }
        iptc
    }

    /// Serialize as an IIM block.
    pub fn to_iim(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for d in &self.datasets {
            let len = d.data.len().min(0x7fff) as u16;
            out.extend_from_slice(&[IIM_MARKER, d.record, d.dataset]);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&d.data[..len as usize]);
        }
        out
    }

    pub fn add(&mut self, record: u8, dataset: u8, data: Vec<u8>) {
        self.datasets.push(IptcDatum {
            record,
            dataset,
            data,
        });
    }

    pub fn find(&self, record: u8, dataset: u8) -> Option<&IptcDatum> {
        self.datasets
            .iter()
            .find(|d| d.record == record && d.dataset == dataset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IptcDatum> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

// =============================================================================
// XmpData
// =============================================================================

/// A raw XMP packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XmpData {
    pub packet: String,
}

impl XmpData {
    pub fn new(packet: impl Into<String>) -> Self {
        Self {
            packet: packet.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }
}

// =============================================================================
// MetadataBundle
// =============================================================================

/// The three metadata collections produced by a decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataBundle {
    pub exif: ExifData,
    pub iptc: IptcData,
    pub xmp: XmpData,
}
