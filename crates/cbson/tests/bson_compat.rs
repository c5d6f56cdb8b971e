//! 与 `bson` crate 的字节级交叉验证

use bson::spec::BinarySubtype;
use cbson::{deserialize, serialize, Binary, Bson, Code, DecodeOptions, EncodeOptions, ObjectId, Regex, Timestamp};
use chrono::{TimeZone, Utc};

fn reference_bytes(doc: &bson::Document) -> Vec<u8> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf).unwrap();
    buf
}

fn sample() -> (cbson::Document, bson::Document) {
    let oid = [0x4e, 0x4d, 0x66, 0x34, 0x3b, 0x39, 0xb6, 0x84, 0x07, 0x00, 0x00, 0x01];
    let millis = 1_300_000_000_123;

    let ours = cbson::doc! {
        "_id" => ObjectId::from_bytes(oid),
        "name" => "miku",
        "age" => 16,
        "big" => i64::MAX,
        "pi" => 3.5,
        "ok" => true,
        "nil" => Bson::Null,
        "tags" => vec!["a", "b"],
        "inner" => cbson::doc! { "x" => -1 },
        "bin" => Binary::new(vec![1, 2, 3]),
        "when" => Utc.timestamp_millis_opt(millis).unwrap(),
        "re" => Regex::new("^m", "im"),
        "ts" => Timestamp::new(100, 7),
        "sym" => Bson::Symbol("atom".into()),
        "code" => Code::with_scope("x + 1", cbson::doc! { "x" => 1 }),
        "lo" => Bson::MinKey,
        "hi" => Bson::MaxKey,
    };

    let theirs = bson::doc! {
        "_id": bson::oid::ObjectId::from_bytes(oid),
        "name": "miku",
        "age": 16i32,
        "big": i64::MAX,
        "pi": 3.5,
        "ok": true,
        "nil": bson::Bson::Null,
        "tags": ["a", "b"],
        "inner": { "x": -1i32 },
        "bin": bson::Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3] },
        "when": bson::DateTime::from_millis(millis),
        "re": bson::Regex { pattern: "^m".to_string(), options: "im".to_string() },
        "ts": bson::Timestamp { time: 100, increment: 7 },
        "sym": bson::Bson::Symbol("atom".to_string()),
        "code": bson::Bson::JavaScriptCodeWithScope(bson::JavaScriptCodeWithScope {
            code: "x + 1".to_string(),
            scope: bson::doc! { "x": 1i32 },
        }),
        "lo": bson::Bson::MinKey,
        "hi": bson::Bson::MaxKey,
    };

    (ours, theirs)
}

#[test]
fn test_encoding_matches_reference() {
    let (ours, theirs) = sample();
    let encoded = serialize(&ours, &EncodeOptions::default()).unwrap();
    assert_eq!(encoded.to_vec(), reference_bytes(&theirs));
}

#[test]
fn test_reference_reads_our_bytes() {
    let (ours, theirs) = sample();
    let encoded = serialize(&ours, &EncodeOptions::default()).unwrap();
    let parsed = bson::Document::from_reader(&mut &encoded[..]).unwrap();
    assert_eq!(parsed, theirs);
}

#[test]
fn test_we_read_reference_bytes() {
    let (ours, theirs) = sample();
    let decoded = deserialize(&reference_bytes(&theirs), &DecodeOptions { compile_regex: false }).unwrap();
    assert_eq!(decoded, ours);
}

#[test]
fn test_old_binary_matches_reference() {
    let ours = cbson::doc! { "b" => Binary::old(vec![5, 6]) };
    let bytes = serialize(&ours, &EncodeOptions::default()).unwrap();
    let parsed = bson::Document::from_reader(&mut &bytes[..]).unwrap();
    match parsed.get("b") {
        Some(bson::Bson::Binary(binary)) => {
            assert_eq!(binary.subtype, BinarySubtype::BinaryOld);
            assert_eq!(binary.bytes, vec![5, 6]);
        }
        other => panic!("unexpected value: {:?}", other),
    }
}
