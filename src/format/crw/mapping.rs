//! Translation between CIFF records and Exif keys.
//!
//! Each mapping ties a CIFF tag inside a CIFF directory to an Exif key and a
//! pair of conversion functions. Records without a mapping are ignored when
//! decoding and left untouched when encoding.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use tracing::{trace, warn};

use super::component::{CiffComponent, CiffType};
use crate::format::tiff::{tag, FieldType, Group};
use crate::io::ByteOrder;
use crate::metadata::{ExifKey, Exifdatum, MetadataBundle, Value};

/// Reads one record into the bundle.
pub type DecodeFn = fn(&CrwMapping, &CiffComponent, &mut MetadataBundle, ByteOrder);

/// Computes the new raw value of a record from the bundle and the record as
/// it was read, if any. `None` removes the record.
pub type EncodeFn = fn(&CrwMapping, &MetadataBundle, Option<&CiffComponent>, ByteOrder) -> Option<Vec<u8>>;

#[derive(Debug, Clone, Copy)]
pub struct CrwMapping {
    /// CIFF tag id, without location bits
    pub crw_tag: u16,
    /// Tag id of the directory holding the record
    pub crw_dir: u16,
    /// Number of value bytes used, 0 for all
    pub size: usize,
    pub tag: u16,
    pub group: Group,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

impl CrwMapping {
    pub const fn key(&self) -> ExifKey {
        ExifKey::new(self.tag, self.group)
    }
}

const fn mapping(
    crw_tag: u16,
    crw_dir: u16,
    size: usize,
    tag: u16,
    group: Group,
    decode: DecodeFn,
    encode: EncodeFn,
) -> CrwMapping {
    CrwMapping {
        crw_tag,
        crw_dir,
        size,
        tag,
        group,
        decode,
        encode,
    }
}

/// Directory id of the root heap.
pub const ROOT_DIR: u16 = 0x0000;

#[rustfmt::skip]
pub static CRW_MAPPING: [CrwMapping; 15] = [
    mapping(0x0805, 0x300a, 0, tag::USER_COMMENT, Group::Exif, decode_comment, encode_comment),
    mapping(0x080a, 0x2807, 0, tag::MAKE, Group::Ifd0, decode_make_model, encode_make_model),
    mapping(0x080b, 0x3004, 0, 0x0007, Group::Canon, decode_basic, encode_basic),
    mapping(0x0810, 0x2807, 0, 0x0009, Group::Canon, decode_basic, encode_basic),
    mapping(0x0815, 0x2804, 0, 0x0006, Group::Canon, decode_basic, encode_basic),
    mapping(0x1029, 0x300b, 0, 0x0002, Group::Canon, decode_basic, encode_basic),
    mapping(0x102a, 0x300b, 0, 0x0004, Group::CanonSi, decode_array, encode_array),
    mapping(0x102d, 0x300b, 0, 0x0001, Group::CanonCs, decode_array, encode_array),
    mapping(0x1033, 0x300b, 0, 0x000f, Group::CanonCf, decode_array, encode_array),
    mapping(0x1038, 0x300b, 0, 0x0012, Group::CanonPi, decode_array, encode_array),
    mapping(0x1810, 0x300a, 0, tag::PIXEL_X_DIMENSION, Group::Exif, decode_image_info, encode_image_info),
    mapping(0x1817, 0x300a, 4, 0x0008, Group::Canon, decode_basic, encode_basic),
    mapping(0x180e, 0x300a, 0, tag::DATE_TIME_ORIGINAL, Group::Exif, decode_timestamp, encode_timestamp),
    mapping(0x1835, 0x300b, 0, 0x0010, Group::Canon, decode_basic, encode_basic),
    mapping(0x2008, ROOT_DIR, 0, tag::JPEG_INTERCHANGE_FORMAT, Group::Ifd1, decode_thumbnail, encode_thumbnail),
];

/// Parent of each known sub-directory.
const CRW_SUB_DIRS: &[(u16, u16)] = &[
    (0x300a, ROOT_DIR),
    (0x300b, 0x300a),
    (0x3004, 0x300a),
    (0x2807, 0x300a),
    (0x2804, 0x300a),
];

static MAPPING_INDEX: Lazy<HashMap<(u16, u16), &'static CrwMapping>> = Lazy::new(|| {
    CRW_MAPPING
        .iter()
        .map(|m| ((m.crw_tag, m.crw_dir), m))
        .collect()
});

/// Mapping of the record `crw_tag` in directory `crw_dir`.
pub fn find_mapping(crw_tag: u16, crw_dir: u16) -> Option<&'static CrwMapping> {
    MAPPING_INDEX.get(&(crw_tag, crw_dir)).copied()
}

/// Directory path from below the root down to `dir`, e.g. `[0x300a, 0x2807]`.
pub fn crw_dirs(dir: u16) -> Vec<u16> {
    let mut dirs = Vec::new();
    let mut current = dir;
    while current != ROOT_DIR && dirs.len() <= CRW_SUB_DIRS.len() {
        dirs.push(current);
        match CRW_SUB_DIRS.iter().find(|(child, _)| *child == current) {
            Some((_, parent)) => current = *parent,
            None => break,
        }
    }
    dirs.reverse();
    dirs
}

// =============================================================================
// Helpers
// =============================================================================

fn used<'c>(m: &CrwMapping, component: &'c CiffComponent) -> &'c [u8] {
    let data = component.data().map_or(&[][..], |d| d.as_ref());
    if m.size != 0 && data.len() > m.size {
        &data[..m.size]
    } else {
        data
    }
}

fn text(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

fn find_value(bundle: &MetadataBundle, tag: u16, group: Group) -> Option<&Value> {
    bundle.exif.find(&ExifKey::new(tag, group)).map(|d| &d.value)
}

/// Existing value bytes widened to at least `len` bytes.
fn existing_or_zeroed(existing: Option<&CiffComponent>, len: usize) -> Vec<u8> {
    let mut buf = existing
        .and_then(CiffComponent::data)
        .map(|d| d.to_vec())
        .unwrap_or_default();
    if buf.len() < len {
        buf.resize(len, 0);
    }
    buf
}

// =============================================================================
// Basic values
// =============================================================================

fn decode_basic(m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, bo: ByteOrder) {
    let data = used(m, c);
    let value = match c.ciff_type() {
        CiffType::Ascii => Value::Ascii(text(data)),
        CiffType::Short => Value::from_bytes(FieldType::Short, data, bo),
        CiffType::Long => Value::from_bytes(FieldType::Long, data, bo),
        CiffType::Byte => Value::Byte(data.to_vec()),
        CiffType::Mixed | CiffType::Directory => Value::Undefined(data.to_vec()),
    };
    bundle.exif.set(m.key(), value);
}

fn encode_basic(
    m: &CrwMapping,
    bundle: &MetadataBundle,
    _existing: Option<&CiffComponent>,
    bo: ByteOrder,
) -> Option<Vec<u8>> {
    find_value(bundle, m.tag, m.group).map(|v| v.to_bytes(bo))
}

// =============================================================================
// Comment
// =============================================================================

const ASCII_CHARSET: &[u8; 8] = b"ASCII\0\0\0";

fn decode_comment(m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, _bo: ByteOrder) {
    let mut comment = ASCII_CHARSET.to_vec();
    comment.extend_from_slice(text(used(m, c)).as_bytes());
    bundle.exif.set(m.key(), Value::Undefined(comment));
}

fn encode_comment(
    m: &CrwMapping,
    bundle: &MetadataBundle,
    existing: Option<&CiffComponent>,
    _bo: ByteOrder,
) -> Option<Vec<u8>> {
    let mut buf = match find_value(bundle, m.tag, m.group)? {
        Value::Undefined(raw) => raw.strip_prefix(&ASCII_CHARSET[..]).unwrap_or(raw.as_slice()).to_vec(),
        Value::Ascii(s) => s.as_bytes().to_vec(),
        Value::AsciiBytes(raw) => raw.clone(),
        other => {
            warn!(kind = ?other.field_type(), "Comment is not text, dropping it");
            return None;
        }
    };
    buf.push(0);
    // Canon reserves a fixed-size field
    let reserved = existing.and_then(CiffComponent::data).map_or(0, |d| d.len());
    if buf.len() < reserved {
        buf.resize(reserved, 0);
    }
    Some(buf)
}

// =============================================================================
// Make and model
// =============================================================================

fn decode_make_model(_m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, _bo: ByteOrder) {
    let data = c.data().map_or(&[][..], |d| d.as_ref());
    bundle
        .exif
        .set(ExifKey::new(tag::MAKE, Group::Ifd0), Value::Ascii(text(data)));

    let split = data.iter().position(|&b| b == 0).map_or(data.len(), |i| i + 1);
    let rest = &data[split..];
    bundle
        .exif
        .set(ExifKey::new(tag::MODEL, Group::Ifd0), Value::Ascii(text(rest)));
}

fn encode_make_model(
    _m: &CrwMapping,
    bundle: &MetadataBundle,
    _existing: Option<&CiffComponent>,
    _bo: ByteOrder,
) -> Option<Vec<u8>> {
    let make = find_value(bundle, tag::MAKE, Group::Ifd0).and_then(Value::as_str);
    let model = find_value(bundle, tag::MODEL, Group::Ifd0).and_then(Value::as_str);
    if make.is_none() && model.is_none() {
        return None;
    }

    let mut buf = Vec::new();
    for part in [make.unwrap_or_default(), model.unwrap_or_default()] {
        buf.extend_from_slice(part.as_bytes());
        buf.push(0);
    }
    Some(buf)
}

// =============================================================================
// Arrays
// =============================================================================

fn decode_array(m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, bo: ByteOrder) {
    let data = used(m, c);
    for (i, chunk) in data.chunks_exact(2).enumerate() {
        let key = ExifKey::new(i as u16, m.group);
        bundle.exif.set(key, Value::Short(vec![bo.read_u16(chunk)]));
    }
}

fn encode_array(
    m: &CrwMapping,
    bundle: &MetadataBundle,
    existing: Option<&CiffComponent>,
    bo: ByteOrder,
) -> Option<Vec<u8>> {
    let elements: Vec<(u16, u16)> = bundle
        .exif
        .iter()
        .filter(|d| d.key.group == m.group)
        .filter_map(|d| Some((d.key.tag, d.value.to_u32(0)? as u16)))
        .collect();
    if elements.is_empty() {
        return None;
    }

    let original = existing.and_then(CiffComponent::data);
    let mut shorts: Vec<u16> = original
        .map(|d| d.chunks_exact(2).map(|c| bo.read_u16(c)).collect())
        .unwrap_or_default();
    let sized = original.is_some_and(|d| shorts.first() == Some(&(d.len() as u16)));

    for (idx, value) in elements {
        let idx = idx as usize;
        if idx >= shorts.len() {
            shorts.resize(idx + 1, 0);
        }
        shorts[idx] = value;
    }
    if sized {
        shorts[0] = (shorts.len() * 2) as u16;
    }
    Some(shorts.iter().flat_map(|s| bo.u16_bytes(*s)).collect())
}

// =============================================================================
// Image info
// =============================================================================

/// Width, height, pixel aspect ratio, rotation and three bit-depth words.
const IMAGE_INFO_SIZE: usize = 28;

const ROTATIONS: &[(u16, i32)] = &[(1, 0), (3, 180), (6, 90), (8, 270)];

fn orientation(degrees: i32) -> u16 {
    ROTATIONS
        .iter()
        .find(|(_, d)| *d == degrees.rem_euclid(360))
        .map_or(1, |(o, _)| *o)
}

fn degrees(orientation: u16) -> i32 {
    ROTATIONS
        .iter()
        .find(|(o, _)| *o == orientation)
        .map_or(0, |(_, d)| *d)
}

fn decode_image_info(_m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, bo: ByteOrder) {
    let data = c.data().map_or(&[][..], |d| d.as_ref());
    if data.len() < 16 {
        warn!(len = data.len(), "Image info record too short");
        return;
    }
    let width = bo.read_u32(&data[0..4]);
    let height = bo.read_u32(&data[4..8]);
    let rotation = bo.read_u32(&data[12..16]) as i32;

    let exif = &mut bundle.exif;
    exif.set(ExifKey::new(tag::PIXEL_X_DIMENSION, Group::Exif), Value::Long(vec![width]));
    exif.set(ExifKey::new(tag::PIXEL_Y_DIMENSION, Group::Exif), Value::Long(vec![height]));
    exif.set(
        ExifKey::new(tag::ORIENTATION, Group::Ifd0),
        Value::Short(vec![orientation(rotation)]),
    );
}

fn encode_image_info(
    _m: &CrwMapping,
    bundle: &MetadataBundle,
    existing: Option<&CiffComponent>,
    bo: ByteOrder,
) -> Option<Vec<u8>> {
    let width = find_value(bundle, tag::PIXEL_X_DIMENSION, Group::Exif).and_then(|v| v.to_u32(0));
    let height = find_value(bundle, tag::PIXEL_Y_DIMENSION, Group::Exif).and_then(|v| v.to_u32(0));
    let orient = find_value(bundle, tag::ORIENTATION, Group::Ifd0).and_then(|v| v.to_u32(0));
    if width.is_none() && height.is_none() && orient.is_none() {
        return None;
    }

    let fresh = existing.and_then(CiffComponent::data).map_or(true, |d| d.len() < 16);
    let mut buf = existing_or_zeroed(existing, IMAGE_INFO_SIZE);
    if fresh {
        bo.put_u32(&mut buf, 8, 1.0f32.to_bits());
    }
    if let Some(width) = width {
        bo.put_u32(&mut buf, 0, width);
    }
    if let Some(height) = height {
        bo.put_u32(&mut buf, 4, height);
    }
    if let Some(orient) = orient {
        bo.put_u32(&mut buf, 12, degrees(orient as u16) as u32);
    }
    Some(buf)
}

// =============================================================================
// Timestamp
// =============================================================================

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Seconds since the epoch, time zone and zone info.
const TIMESTAMP_SIZE: usize = 12;

/// Exif date of a CIFF timestamp, in UTC.
pub fn exif_date(seconds: u32) -> Option<String> {
    DateTime::from_timestamp(i64::from(seconds), 0).map(|t| t.format(EXIF_DATE_FORMAT).to_string())
}

/// CIFF timestamp of an Exif date, read as UTC.
pub fn ciff_timestamp(date: &str) -> Option<u32> {
    let parsed = NaiveDateTime::parse_from_str(date.trim(), EXIF_DATE_FORMAT).ok()?;
    u32::try_from(parsed.and_utc().timestamp()).ok()
}

fn decode_timestamp(m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, bo: ByteOrder) {
    let data = c.data().map_or(&[][..], |d| d.as_ref());
    let Some(seconds) = bo.get_u32(data, 0) else {
        warn!(len = data.len(), "Timestamp record too short");
        return;
    };
    if let Some(date) = exif_date(seconds) {
        trace!(seconds, %date, "Decoded CIFF timestamp");
        bundle.exif.set(m.key(), Value::Ascii(date));
    }
}

fn encode_timestamp(
    m: &CrwMapping,
    bundle: &MetadataBundle,
    existing: Option<&CiffComponent>,
    bo: ByteOrder,
) -> Option<Vec<u8>> {
    let date = find_value(bundle, m.tag, m.group).and_then(Value::as_str)?;
    let Some(seconds) = ciff_timestamp(date) else {
        warn!(date, "Date cannot be stored as a CIFF timestamp");
        return None;
    };
    let mut buf = existing_or_zeroed(existing, TIMESTAMP_SIZE);
    bo.put_u32(&mut buf, 0, seconds);
    Some(buf)
}

// =============================================================================
// Thumbnail
// =============================================================================

fn decode_thumbnail(m: &CrwMapping, c: &CiffComponent, bundle: &mut MetadataBundle, _bo: ByteOrder) {
    let data = c.data().map_or(&[][..], |d| d.as_ref());
    let mut datum = Exifdatum::new(m.key(), Value::Long(vec![0]));
    datum.data_area = Some(data.to_vec());

    let exif = &mut bundle.exif;
    exif.erase(&m.key());
    exif.add(datum);
    exif.set(
        ExifKey::new(tag::JPEG_INTERCHANGE_FORMAT_LENGTH, Group::Ifd1),
        Value::Long(vec![data.len() as u32]),
    );
}

fn encode_thumbnail(
    m: &CrwMapping,
    bundle: &MetadataBundle,
    _existing: Option<&CiffComponent>,
    _bo: ByteOrder,
) -> Option<Vec<u8>> {
    bundle.exif.find(&m.key())?.data_area.clone()
}

// =============================================================================
// Tests
// =============================================================================
