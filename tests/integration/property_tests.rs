//! Property-based tests using proptest
//!
//! Hostile input must never panic the parsers, and edits must survive an
//! encode/decode cycle whatever strategy the writer picked.

use proptest::prelude::*;

use rawmeta::format::tiff::{nikon_ld_selector, schema, sony_misc3_selector, tag, ExtTag};
use rawmeta::{CrwParser, EngineConfig, ExifKey, Group, TiffParser, Value, WriteStrategy};

use super::test_utils::{acme_tiff, crw_with_record, IfdBuilder, TiffBuilder, ASCII, LE, LONG};

/// Strategy for a classic little-endian TIFF header followed by noise
fn tiff_like_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512).prop_map(|tail| {
        let mut data = b"II*\0\x08\0\0\0".to_vec();
        data.extend(tail);
        data
    })
}

/// Strategy for a CRW header followed by noise
fn crw_like_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512).prop_map(|tail| {
        let mut data = b"II\x1a\0\0\0HEAPCCDR".to_vec();
        data.extend(tail);
        data
    })
}

/// Make plus one entry whose value offset lands anywhere in the first
/// bytes of the file: the header, the records or the next link.
fn aimed_tiff(field_type: u16, count: u32, offset: u32) -> Vec<u8> {
    TiffBuilder::new(
        LE,
        IfdBuilder::new()
            .ascii(tag::MAKE, "ACME")
            .pointing_at(tag::MODEL, field_type, count, offset),
    )
    .build()
}

fn lenient() -> TiffParser {
    TiffParser::new(EngineConfig {
        strict_offsets: false,
        ..EngineConfig::default()
    })
}

/// Strategy for camera model names
fn model_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,12}"
}

proptest! {
    #[test]
    fn test_tiff_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = TiffParser::default().decode(&data);
    }

    #[test]
    fn test_tiff_decode_of_noisy_tree_never_panics(data in tiff_like_strategy()) {
        let _ = TiffParser::default().decode(&data);
    }

    #[test]
    fn test_crw_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = CrwParser::default().decode(&data);
    }

    #[test]
    fn test_crw_decode_of_noisy_heap_never_panics(data in crw_like_strategy()) {
        let _ = CrwParser::default().decode(&data);
    }

    #[test]
    fn test_overlapping_value_offsets_are_contained(count in 5u32..48, offset in 0u32..64) {
        let file = aimed_tiff(ASCII, count, offset);
        let _ = TiffParser::default().decode(&file);
        let bundle = lenient().decode(&file).unwrap();
        prop_assert_eq!(bundle.exif.make(), Some("ACME"));
    }

    #[test]
    fn test_self_referencing_sub_ifd_is_contained(offset in 0u32..64) {
        let file = TiffBuilder::new(
            LE,
            IfdBuilder::new()
                .ascii(tag::MAKE, "ACME")
                .pointing_at(tag::EXIF_IFD_POINTER, LONG, 1, offset),
        )
        .build();
        let _ = TiffParser::default().decode(&file);
        let bundle = lenient().decode(&file).unwrap();
        prop_assert_eq!(bundle.exif.make(), Some("ACME"));
    }

    #[test]
    fn test_overlapping_crw_records_never_panic(size in 0u32..64, offset in 0u32..64) {
        let _ = CrwParser::default().decode(&crw_with_record(0x300a, size, offset, 0));
        let _ = CrwParser::default().decode(&crw_with_record(0x0805, size, offset, 16));
    }

    #[test]
    fn test_model_edit_survives_encode(model in model_strategy()) {
        let parser = TiffParser::default();
        let file = acme_tiff();
        let mut bundle = parser.decode(&file).unwrap();
        let key = ExifKey::new(tag::MODEL, Group::Ifd0);
        bundle.exif.set(key, Value::Ascii(model.clone()));

        let outcome = parser.encode(Some(&file), &bundle).unwrap();
        if outcome.strategy == WriteStrategy::NonIntrusive {
            prop_assert_eq!(outcome.bytes.len(), file.len());
        }

        let decoded = parser.decode(&outcome.bytes).unwrap();
        let value = decoded.exif.find(&key).and_then(|d| d.value.as_str().map(str::to_string));
        prop_assert_eq!(value, Some(model));
    }

    #[test]
    fn test_array_selectors_are_deterministic(data in prop::collection::vec(any::<u8>(), 0..16)) {
        let root = schema::create(ExtTag::Root, Group::None);
        prop_assert_eq!(
            nikon_ld_selector(0x0098, &data, &root),
            nikon_ld_selector(0x0098, &data, &root)
        );
        prop_assert_eq!(
            sony_misc3_selector(0x9400, &data, &root),
            sony_misc3_selector(0x9400, &data, &root)
        );
    }
}

#[test]
fn test_nikon_lens_data_version_selects_first_layout() {
    let root = schema::create(ExtTag::Root, Group::None);
    assert_eq!(nikon_ld_selector(0x0098, b"0100\x01\x02", &root), Some(0));
    assert_eq!(nikon_ld_selector(0x0098, b"0101", &root), Some(1));
    assert_eq!(nikon_ld_selector(0x0098, b"01", &root), None);
}
