use std::io::Cursor;

use crate::compiler::{checked_count, Compiler};
use crate::config::{Options, Version};
use crate::error::Error;
use crate::expression::ExprValue;
use crate::parser::Parser;
use crate::trigger::Script;

const SOURCE: &str = "\
(0:1) when the script starts,
    (1:2) and %count is less than 1,000,
    (5:0) print {Hello %name} to the console.
    (5:1) set %tbl[key] to 0x10 and %plain[] with %obj.member.
(0:2) (0:3) when either happens,
    (6:0) while -2.5 is less than 3,
        (5:9) do nothing.
";

fn parse(input: &str) -> Script {
    Parser::from_text(input, &Options::default()).parse().0
}

fn compile(script: &Script, version: Version) -> Vec<u8> {
    let mut out = Vec::new();
    Compiler::new(version)
        .compile_to(script, &mut out)
        .expect("writing to a Vec");
    out
}

fn decompile(bytes: &[u8]) -> Result<Script, Error> {
    Compiler::default().decompile_from(&mut Cursor::new(bytes))
}

fn all_values(script: &Script) -> Vec<Vec<ExprValue>> {
    script
        .blocks()
        .iter()
        .flat_map(|block| block.iter())
        .map(|trigger| {
            script
                .contents(trigger)
                .iter()
                .map(|expr| expr.value().clone())
                .collect()
        })
        .collect()
}

#[test]
fn round_trip_preserves_blocks_and_contents() {
    let script = parse(SOURCE);
    let decoded = decompile(&compile(&script, Version::default())).expect("valid data");

    assert_eq!(decoded.blocks(), script.blocks());
    assert_eq!(all_values(&decoded), all_values(&script));
    let table = &all_values(&decoded)[3];
    assert_eq!(
        table[2],
        ExprValue::VariableTable {
            name: "%plain".to_string(),
            indexer: None,
        }
    );
}

#[test]
fn header_layout() {
    let script = parse("(5:1) {hi}");
    let bytes = compile(&script, Version::new(7, 3));
    let mut expected = Vec::new();
    for word in [7i32, 3, 1, 1, 5, 1, 1] {
        expected.extend_from_slice(&word.to_le_bytes());
    }
    expected.extend_from_slice(&[1, 2, b'h', b'i']);
    assert_eq!(bytes, expected);
}

#[test]
fn long_strings_use_multi_byte_lengths() {
    let text = "x".repeat(300);
    let script = parse(&format!("(5:1) {{{}}}", text));
    let bytes = compile(&script, Version::default());
    // 300 = 0b10_0101100 -> 0xAC 0x02
    let tag_at = 7 * 4;
    assert_eq!(&bytes[tag_at..tag_at + 3], &[1, 0xAC, 0x02]);

    let decoded = decompile(&bytes).expect("valid data");
    assert_eq!(all_values(&decoded), vec![vec![ExprValue::String(text)]]);
}

#[test]
fn version_one_is_rejected() {
    let script = parse("(0:1)");
    let bytes = compile(&script, Version::new(1, 0));
    match decompile(&bytes) {
        Err(Error::IncompatibleVersion { major: 1, minor: 0 }) => {}
        other => panic!("expected incompatible version, got {:?}", other.map(|s| s.trigger_count())),
    }
}

#[test]
fn versions_six_and_seven_and_newer_load() {
    let script = parse(SOURCE);
    for version in [Version::new(6, 0), Version::new(7, 0), Version::new(7, 12), Version::new(9, 1)] {
        let decoded = decompile(&compile(&script, version)).expect("readable version");
        assert_eq!(decoded.blocks(), script.blocks());
    }
}

#[test]
fn unknown_tags_are_skipped_without_payload() {
    let mut bytes = Vec::new();
    for word in [7i32, 0, 1, 1, 5, 1, 3] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.push(5); // reserved, no payload
    bytes.push(2);
    bytes.extend_from_slice(&4.5f64.to_le_bytes());
    bytes.push(9); // reserved, no payload

    let decoded = decompile(&bytes).expect("valid data");
    assert_eq!(all_values(&decoded), vec![vec![ExprValue::Number(4.5)]]);
    // positions still advance for skipped items
    let trigger = decoded.blocks()[0].get(0);
    assert_eq!(decoded.contents(&trigger)[0].position().column, 2);
}

#[test]
fn truncated_data_is_a_decode_error() {
    let bytes = compile(&parse(SOURCE), Version::default());
    for cut in [0, 3, 8, 20, bytes.len() - 1] {
        assert!(
            matches!(decompile(&bytes[..cut]), Err(Error::Decode(_))),
            "cut at {}",
            cut
        );
    }
}

#[test]
fn invalid_category_is_a_decode_error() {
    let mut bytes = Vec::new();
    for word in [7i32, 0, 1, 1, 4, 1, 0] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    match decompile(&bytes) {
        Err(Error::Decode(message)) => assert_eq!(message, "invalid trigger category 4"),
        other => panic!("expected decode error, got {:?}", other.map(|s| s.trigger_count())),
    }
}

#[test]
fn invalid_utf8_is_a_decode_error() {
    let mut bytes = Vec::new();
    for word in [7i32, 0, 1, 1, 5, 1, 1] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.extend_from_slice(&[1, 2, 0xFF, 0xFE]);
    assert!(matches!(decompile(&bytes), Err(Error::Decode(_))));
}

#[test]
fn negative_counts_are_a_decode_error() {
    let mut bytes = Vec::new();
    for word in [7i32, 0, -1] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    assert!(matches!(decompile(&bytes), Err(Error::Decode(_))));
}

#[test]
fn oversized_counts_are_an_encode_error() {
    assert_eq!(checked_count(3).ok(), Some(3));
    match checked_count(usize::MAX) {
        Err(Error::Encode(message)) => assert!(message.contains("does not fit")),
        other => panic!("expected encode error, got {:?}", other.ok()),
    }
}
