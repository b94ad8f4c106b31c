//! End-to-end tests of the CRW engine.

use rawmeta::format::crw::{CiffComponent, CiffHeader, CrwParser};
use rawmeta::format::tiff::tag;
use rawmeta::{CrwError, EngineConfig, ExifKey, Group, MetadataBundle, Value, WriteStrategy};

use super::test_utils::{crw_file, crw_with_record, BE, LE};

fn canon_root() -> CiffComponent {
    let mut root = CiffComponent::root();
    root.add(&[0x300a, 0x2807], 0x080a)
        .unwrap()
        .set_value(b"Canon\0Canon EOS D60\0".to_vec())
        .unwrap();
    let mut stamp = 1_000_000_000u32.to_le_bytes().to_vec();
    stamp.extend_from_slice(&[0; 8]);
    root.add(&[0x300a], 0x180e).unwrap().set_value(stamp).unwrap();
    root.add(&[0x300a, 0x300b], 0x102d)
        .unwrap()
        .set_value(vec![6, 0, 1, 0, 4, 0])
        .unwrap();
    root
}

fn value<'a>(bundle: &'a MetadataBundle, tag: u16, group: Group) -> Option<&'a Value> {
    bundle.exif.find(&ExifKey::new(tag, group)).map(|d| &d.value)
}

#[test]
fn test_decode_canon_records() {
    let file = crw_file(LE, &canon_root());
    let bundle = CrwParser::default().decode(&file).unwrap();

    assert_eq!(bundle.exif.make(), Some("Canon"));
    assert_eq!(
        value(&bundle, tag::MODEL, Group::Ifd0),
        Some(&Value::Ascii("Canon EOS D60".into()))
    );
    assert_eq!(
        value(&bundle, tag::DATE_TIME_ORIGINAL, Group::Exif),
        Some(&Value::Ascii("2001:09:09 01:46:40".into()))
    );
    assert_eq!(value(&bundle, 2, Group::CanonCs), Some(&Value::Short(vec![4])));
}

#[test]
fn test_big_endian_file() {
    let file = crw_file(BE, &{
        let mut root = CiffComponent::root();
        root.add(&[0x300a], 0x1817)
            .unwrap()
            .set_value(vec![0, 0, 0x01, 0x02])
            .unwrap();
        root
    });
    let bundle = CrwParser::default().decode(&file).unwrap();
    assert_eq!(
        value(&bundle, 0x0008, Group::Canon),
        Some(&Value::Long(vec![0x0102]))
    );
}

#[test]
fn test_edit_and_reencode() {
    let parser = CrwParser::default();
    let file = crw_file(LE, &canon_root());
    let mut bundle = parser.decode(&file).unwrap();
    bundle.exif.set(
        ExifKey::new(tag::MODEL, Group::Ifd0),
        Value::Ascii("Canon EOS 10D".into()),
    );
    bundle.exif.set(
        ExifKey::new(tag::DATE_TIME_ORIGINAL, Group::Exif),
        Value::Ascii("2003:03:03 03:03:03".into()),
    );

    let outcome = parser.encode(Some(&file), &bundle).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::Intrusive);
    let decoded = parser.decode(&outcome.bytes).unwrap();
    for datum in bundle.exif.iter() {
        assert_eq!(value(&decoded, datum.key.tag, datum.key.group), Some(&datum.value));
    }
}

#[test]
fn test_reencode_is_stable() {
    let parser = CrwParser::default();
    let file = crw_file(LE, &canon_root());
    let bundle = parser.decode(&file).unwrap();

    let first = parser.encode(Some(&file), &bundle).unwrap().bytes;
    let second = parser.encode(Some(&first), &bundle).unwrap().bytes;
    assert_eq!(first, second);
}

#[test]
fn test_erased_metadata_prunes_directories() {
    let parser = CrwParser::default();
    let file = crw_file(LE, &canon_root());
    let mut bundle = parser.decode(&file).unwrap();
    let cs_keys: Vec<ExifKey> = bundle
        .exif
        .iter()
        .map(|d| d.key)
        .filter(|k| k.group == Group::CanonCs)
        .collect();
    for key in cs_keys {
        bundle.exif.erase(&key);
    }

    let out = parser.encode(Some(&file), &bundle).unwrap().bytes;
    let (_, root) = parser.parse(&out).unwrap();
    let props = &root.children()[0];
    assert_eq!(props.tag_id(), 0x300a);
    assert!(props.children().iter().all(|c| c.tag_id() != 0x300b));
    assert!(root.find(0x080a, 0x2807).is_some());
}

#[test]
fn test_self_referencing_directory_is_an_error() {
    // Root heap: table at 0, the only record starts at 2 and claims its
    // sub-directory starts at 2 as well
    let file = crw_with_record(0x300a, 4, 2, 0);
    let result = CrwParser::default().decode(&file);
    assert!(matches!(result, Err(CrwError::OffsetOutOfRange { .. })));
}

#[test]
fn test_value_outside_heap_is_an_error() {
    let file = crw_with_record(0x0805, 64, 0, 8);
    assert!(matches!(
        CrwParser::default().decode(&file),
        Err(CrwError::OffsetOutOfRange { .. })
    ));
}

#[test]
fn test_nesting_limit() {
    let mut root = CiffComponent::root();
    root.add(&[0x300a, 0x300b, 0x3004], 0x1817)
        .unwrap()
        .set_value(vec![1, 0, 0, 0])
        .unwrap();
    let file = crw_file(LE, &root);

    let shallow = CrwParser::new(EngineConfig {
        max_depth: 1,
        ..EngineConfig::default()
    });
    assert!(matches!(shallow.decode(&file), Err(CrwError::Corrupted(_))));
    assert!(CrwParser::default().decode(&file).is_ok());
}

#[test]
fn test_header_is_preserved() {
    let mut header = CiffHeader::new(LE);
    header.padding[8..12].copy_from_slice(b"KEEP");
    let mut file = header.to_bytes();
    file.extend_from_slice(&canon_root().write_heap(LE).unwrap());

    let parser = CrwParser::default();
    let bundle = parser.decode(&file).unwrap();
    let out = parser.encode(Some(&file), &bundle).unwrap().bytes;
    assert_eq!(&out[..26], &file[..26]);
}

#[test]
fn test_tiff_is_not_crw() {
    let file = super::test_utils::acme_tiff();
    assert!(CrwParser::default().decode(&file).is_err());
}
