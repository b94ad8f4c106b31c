//! End-to-end tests of the TIFF engine through its public entry points.

use bytes::Bytes;

use rawmeta::format::tiff::{read_tree, schema, tag, write_tree, ExtTag, SonyCipher};
use rawmeta::{
    Component, EngineConfig, ExifKey, Group, MetadataBundle, TiffError, TiffParser, Value,
    WriteStrategy,
};

use super::test_utils::{acme_tiff, IfdBuilder, TiffBuilder, ASCII, BE, LE, UNDEFINED};

fn key(tag: u16, group: Group) -> ExifKey {
    ExifKey::new(tag, group)
}

fn ascii(bundle: &MetadataBundle, tag: u16, group: Group) -> Option<String> {
    bundle
        .exif
        .find(&key(tag, group))
        .and_then(|d| d.value.as_str().map(str::to_string))
}

fn lenient() -> TiffParser {
    TiffParser::new(EngineConfig {
        strict_offsets: false,
        ..EngineConfig::default()
    })
}

fn count_group(root: &Component, group: Group) -> usize {
    let mut n = 0;
    root.visit(&mut |c| {
        if c.group == group {
            n += 1;
        }
    });
    n
}

fn count_directories(root: &Component, group: Group) -> usize {
    let mut n = 0;
    root.visit(&mut |c| {
        if c.group == group && c.is_directory() {
            n += 1;
        }
    });
    n
}

// =============================================================================
// Decode / encode round trips
// =============================================================================

#[test]
fn test_acme_end_to_end() {
    let file = acme_tiff();
    let parser = TiffParser::default();

    let bundle = parser.decode(&file).unwrap();
    assert_eq!(bundle.exif.len(), 2);
    let keys: Vec<String> = bundle.exif.iter().map(|d| d.key.to_string()).collect();
    assert_eq!(keys, vec!["Exif.Image.Make", "Exif.Image.Model"]);
    assert_eq!(ascii(&bundle, tag::MODEL, Group::Ifd0).as_deref(), Some("X100"));

    let same = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(same.strategy, WriteStrategy::NonIntrusive);
    assert_eq!(same.bytes, file);
}

#[test]
fn test_shorter_value_is_patched_in_place() {
    let file = acme_tiff();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    bundle
        .exif
        .set(key(tag::MODEL, Group::Ifd0), Value::Ascii("X1".into()));

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::NonIntrusive);
    assert_eq!(outcome.bytes.len(), file.len());
    let decoded = parser.decode(&outcome.bytes).unwrap();
    assert_eq!(ascii(&decoded, tag::MODEL, Group::Ifd0).as_deref(), Some("X1"));
}

#[test]
fn test_longer_value_rebuilds_structure() {
    let file = acme_tiff();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    bundle.exif.set(
        key(tag::MODEL, Group::Ifd0),
        Value::Ascii("X100 Professional".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    assert_eq!(parser.decode(&outcome.bytes).unwrap(), bundle);
}

#[test]
fn test_removed_tag_rebuilds_structure() {
    let file = acme_tiff();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    assert!(bundle.exif.erase(&key(tag::MODEL, Group::Ifd0)));

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    let decoded = parser.decode(&outcome.bytes).unwrap();
    assert_eq!(decoded.exif.len(), 1);
    assert_eq!(decoded.exif.make(), Some("ACME"));
}

#[test]
fn test_new_exif_tag_creates_exif_directory() {
    let file = acme_tiff();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    bundle.exif.set(
        key(tag::DATE_TIME_ORIGINAL, Group::Exif),
        Value::Ascii("2024:05:06 07:08:09".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);

    let (_, root) = parser.parse(&outcome.bytes).unwrap();
    assert!(root.find(tag::EXIF_IFD_POINTER, Group::Ifd0).is_some());
    let decoded = parser.decode(&outcome.bytes).unwrap();
    assert_eq!(
        ascii(&decoded, tag::DATE_TIME_ORIGINAL, Group::Exif).as_deref(),
        Some("2024:05:06 07:08:09")
    );
}

#[test]
fn test_big_endian_with_exif_directory() {
    let file = TiffBuilder::new(
        BE,
        IfdBuilder::new().ascii(tag::MAKE, "ACME").sub_ifd(
            tag::EXIF_IFD_POINTER,
            IfdBuilder::new().ascii(tag::DATE_TIME_ORIGINAL, "2001:02:03 04:05:06"),
        ),
    )
    .build();

    let parser = TiffParser::default();
    let (header, _) = parser.parse(&file).unwrap();
    assert_eq!(header.byte_order, BE);

    let bundle = parser.decode(&file).unwrap();
    assert_eq!(bundle.exif.make(), Some("ACME"));
    assert_eq!(
        ascii(&bundle, tag::DATE_TIME_ORIGINAL, Group::Exif).as_deref(),
        Some("2001:02:03 04:05:06")
    );

    // Updates keep the original byte order
    let mut edited = bundle.clone();
    edited
        .exif
        .set(key(tag::MODEL, Group::Ifd0), Value::Ascii("Model Seven".into()));
    let outcome = parser.encode(Some(&file), &edited).unwrap();
    assert_eq!(&outcome.bytes[0..2], b"MM");
}

#[test]
fn test_new_file_is_little_endian() {
    let parser = TiffParser::default();
    let mut bundle = MetadataBundle::default();
    bundle
        .exif
        .set(key(tag::MAKE, Group::Ifd0), Value::Ascii("ACME".into()));

    let outcome = parser.encode(None, &bundle).unwrap();
    assert_eq!(&outcome.bytes[0..4], &[b'I', b'I', 42, 0]);
    assert_eq!(parser.decode(&outcome.bytes).unwrap(), bundle);
}

// =============================================================================
// Hostile structures
// =============================================================================

#[test]
fn test_added_tag_grows_directory() {
    let file = TiffBuilder::new(LE, IfdBuilder::new().ascii(tag::MAKE, "ACME")).build();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    assert_eq!(bundle.exif.len(), 1);
    bundle
        .exif
        .set(key(tag::MODEL, Group::Ifd0), Value::Ascii("X100".into()));

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    let out = &outcome.bytes;
    let ifd0 = u32::from_le_bytes([out[4], out[5], out[6], out[7]]) as usize;
    assert_eq!(u16::from_le_bytes([out[ifd0], out[ifd0 + 1]]), 2);
    let decoded = parser.decode(out).unwrap();
    assert_eq!(ascii(&decoded, tag::MODEL, Group::Ifd0).as_deref(), Some("X100"));
}

#[test]
fn test_non_utf8_ascii_survives_rebuild() {
    let file = TiffBuilder::new(
        LE,
        IfdBuilder::new()
            .ascii(tag::MAKE, "ACME")
            .bytes(0x013b, ASCII, b"Caf\xe9\0".to_vec()),
    )
    .build();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    let artist = Value::AsciiBytes(b"Caf\xe9".to_vec());
    assert_eq!(
        bundle.exif.find(&key(0x013b, Group::Ifd0)).map(|d| &d.value),
        Some(&artist)
    );
    bundle.exif.set(
        key(tag::MODEL, Group::Ifd0),
        Value::Ascii("A model name too long for the old slot".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    let (_, written) = read_tree(&Bytes::from(outcome.bytes), &EngineConfig::default()).unwrap();
    let base = written.find(0x013b, Group::Ifd0).and_then(Component::base).unwrap();
    assert_eq!(&base.data[..], b"Caf\xe9\0");
}

#[test]
fn test_value_outside_buffer_strict_and_lenient() {
    let file = TiffBuilder::new(
        LE,
        IfdBuilder::new()
            .ascii(tag::MAKE, "ACME")
            .pointing_at(tag::MODEL, ASCII, 16, 0x7fff_0000),
    )
    .build();

    let strict = TiffParser::default().decode(&file);
    assert!(matches!(strict, Err(TiffError::OffsetOutOfRange { .. })));

    let bundle = lenient().decode(&file).unwrap();
    assert_eq!(bundle.exif.make(), Some("ACME"));
    assert!(bundle.exif.find(&key(tag::MODEL, Group::Ifd0)).is_none());
}

#[test]
fn test_value_overlapping_its_own_record() {
    // IFD0 at 8: the second record starts at 8 + 2 + 12 = 22
    let file = TiffBuilder::new(
        LE,
        IfdBuilder::new()
            .ascii(tag::MAKE, "ACME")
            .pointing_at(tag::MODEL, ASCII, 8, 22),
    )
    .build();

    assert!(matches!(
        TiffParser::default().decode(&file),
        Err(TiffError::OffsetOutOfRange { .. })
    ));
    let bundle = lenient().decode(&file).unwrap();
    assert_eq!(bundle.exif.len(), 1);
}

#[test]
fn test_directory_loop_terminates() {
    let file = TiffBuilder::new(
        LE,
        IfdBuilder::new().ascii(tag::MAKE, "ACME").next_offset(8),
    )
    .build();

    let bundle = TiffParser::default().decode(&file).unwrap();
    assert_eq!(bundle.exif.make(), Some("ACME"));
}

#[test]
fn test_sub_ifd_pointing_at_itself_terminates() {
    let file = TiffBuilder::new(
        LE,
        IfdBuilder::new()
            .ascii(tag::MAKE, "ACME")
            .pointing_at(tag::EXIF_IFD_POINTER, 4, 1, 8),
    )
    .build();

    let bundle = TiffParser::default().decode(&file).unwrap();
    assert_eq!(bundle.exif.make(), Some("ACME"));
}

#[test]
fn test_garbage_is_rejected() {
    let parser = TiffParser::default();
    assert!(matches!(parser.decode(b""), Err(TiffError::FileTooSmall { .. })));
    assert!(matches!(
        parser.decode(b"XX*\0\x08\0\0\0"),
        Err(TiffError::InvalidMagic(_))
    ));
    assert!(matches!(
        parser.decode(b"II+\0\x08\0\0\0\0\0"),
        Err(TiffError::InvalidVersion { .. })
    ));
}

// =============================================================================
// Makernotes and binary arrays
// =============================================================================

fn canon_file() -> Vec<u8> {
    let makernote = IfdBuilder::new().short(0x0001, &[8, 1, 2, 3]);
    TiffBuilder::new(
        LE,
        IfdBuilder::new().ascii(tag::MAKE, "Canon").sub_ifd(
            tag::EXIF_IFD_POINTER,
            IfdBuilder::new()
                .ascii(tag::DATE_TIME_ORIGINAL, "2001:02:03 04:05:06")
                .makernote(tag::MAKER_NOTE, makernote),
        ),
    )
    .build()
}

#[test]
fn test_canon_array_elements_are_decoded() {
    let bundle = TiffParser::default().decode(&canon_file()).unwrap();

    assert_eq!(
        bundle.exif.find(&key(0, Group::CanonCs)).map(|d| &d.value),
        Some(&Value::Short(vec![8]))
    );
    assert_eq!(
        bundle.exif.find(&key(3, Group::CanonCs)).map(|d| &d.value),
        Some(&Value::Short(vec![3]))
    );
    // The array itself is replaced by its elements
    assert!(bundle.exif.find(&key(0x0001, Group::Canon)).is_none());
    assert!(bundle.exif.find(&key(tag::MAKER_NOTE, Group::Exif)).is_none());
}

#[test]
fn test_canon_element_edit_in_place() {
    let file = canon_file();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    bundle.exif.set(key(2, Group::CanonCs), Value::Short(vec![7]));

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::NonIntrusive);
    assert_eq!(outcome.bytes.len(), file.len());
    let decoded = parser.decode(&outcome.bytes).unwrap();
    assert_eq!(
        decoded.exif.find(&key(2, Group::CanonCs)).map(|d| &d.value),
        Some(&Value::Short(vec![7]))
    );
}

#[test]
fn test_canon_makernote_survives_rebuild() {
    let file = canon_file();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    bundle.exif.set(
        key(tag::MODEL, Group::Ifd0),
        Value::Ascii("Canon EOS 5D Mark IV".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    let decoded = parser.decode(&outcome.bytes).unwrap();
    for k in [key(0, Group::CanonCs), key(1, Group::CanonCs), key(3, Group::CanonCs)] {
        assert_eq!(decoded.exif.find(&k), bundle.exif.find(&k), "{k}");
    }
}

/// Sony file whose 0x9400 array deciphers to `[9, 1, 2, .., 39]`.
fn sony_file() -> (Vec<u8>, Vec<u8>) {
    let mut plain: Vec<u8> = (0..40).collect();
    plain[0] = 9;
    let makernote = IfdBuilder::new().bytes(0x9400, UNDEFINED, SonyCipher::encipher(&plain));
    let file = TiffBuilder::new(
        LE,
        IfdBuilder::new().ascii(tag::MAKE, "SONY").sub_ifd(
            tag::EXIF_IFD_POINTER,
            IfdBuilder::new().makernote(tag::MAKER_NOTE, makernote),
        ),
    )
    .build();
    (file, plain)
}

fn sony_array_bytes(file: &[u8]) -> Vec<u8> {
    let (_, root) = read_tree(&Bytes::copy_from_slice(file), &EngineConfig::default()).unwrap();
    let base = root.find(0x9400, Group::Sony2).and_then(Component::base).unwrap();
    base.data.to_vec()
}

#[test]
fn test_sony_array_gaps_survive_rebuild() {
    let (file, plain) = sony_file();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    assert_eq!(
        bundle.exif.find(&key(0x0e, Group::SonyMisc3a)).map(|d| &d.value),
        Some(&Value::Long(vec![0x1110_0f0e]))
    );
    // Only the defined offsets are elements
    assert!(bundle.exif.find(&key(0x01, Group::SonyMisc3a)).is_none());
    bundle.exif.set(
        key(tag::MODEL, Group::Ifd0),
        Value::Ascii("DSC-RX100M7 with a long model name".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    assert_eq!(sony_array_bytes(&outcome.bytes), SonyCipher::encipher(&plain));
}

#[test]
fn test_sony_element_edit_keeps_gaps_across_rebuild() {
    let (file, mut plain) = sony_file();
    let parser = TiffParser::default();
    let mut bundle = parser.decode(&file).unwrap();
    bundle.exif.set(key(0x12, Group::SonyMisc3a), Value::Short(vec![0x0107]));
    bundle.exif.set(
        key(tag::MODEL, Group::Ifd0),
        Value::Ascii("ILCE-7M4 with a long model name".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    plain[0x12] = 0x07;
    plain[0x13] = 0x01;
    let written = sony_array_bytes(&outcome.bytes);
    assert_eq!(SonyCipher::decipher(&written), plain);

    let decoded = parser.decode(&outcome.bytes).unwrap();
    assert_eq!(
        decoded.exif.find(&key(0x12, Group::SonyMisc3a)).map(|d| &d.value),
        Some(&Value::Short(vec![0x0107]))
    );
}

// =============================================================================
// Tree operations
// =============================================================================

#[test]
fn test_deep_add_path_is_idempotent() {
    let mut root = schema::create(ExtTag::Root, Group::None);
    for _ in 0..2 {
        let mut path = schema::tiff_path(0x0002, Group::CanonCs);
        root.add_path(0x0002, &mut path, None).unwrap();
    }

    assert_eq!(count_group(&root, Group::CanonCs), 1);
    assert_eq!(count_directories(&root, Group::Exif), 1);
    assert_eq!(count_directories(&root, Group::Canon), 1);
    assert!(root.find(tag::MAKER_NOTE, Group::Exif).is_some());
    assert!(root.find(tag::EXIF_IFD_POINTER, Group::Ifd0).is_some());
}

#[test]
fn test_emptied_directories_are_not_written() {
    let mut root = schema::create(ExtTag::Root, Group::None);
    for (tag, group, value) in [
        (tag::MAKE, Group::Ifd0, "ACME"),
        (tag::DATE_TIME_ORIGINAL, Group::Exif, "2024:01:01 00:00:00"),
    ] {
        let mut path = schema::tiff_path(tag, group);
        let node = root.add_path(tag, &mut path, None).unwrap().unwrap();
        node.base_mut().unwrap().set_value(Value::Ascii(value.into()));
    }
    let mut path = schema::tiff_path(tag::DATE_TIME_ORIGINAL, Group::Exif);
    assert!(root.remove_path(&mut path));

    let bytes = write_tree(&root, LE).unwrap();
    let (_, written) = read_tree(&Bytes::from(bytes), &EngineConfig::default()).unwrap();
    assert!(written.find(tag::MAKE, Group::Ifd0).is_some());
    assert!(written.find(tag::EXIF_IFD_POINTER, Group::Ifd0).is_none());
    assert_eq!(count_directories(&written, Group::Exif), 0);
}
