use tcpcarve::search::scan;
use tcpcarve::signatures::{SignatureSpec, SignatureTable};
use tcpcarve::types::SpecType;

fn spec(ext: &str, header: &str, footer: Option<&str>) -> SignatureSpec {
    SignatureSpec {
        ext: ext.to_string(),
        max_len: 1 << 20,
        header: header.to_string(),
        footer: footer.map(str::to_string),
    }
}

#[test]
fn test_header_match_offset_is_pattern_start() {
    let table = SignatureTable::compile(&[spec("bin", "aabbcc", None)]).unwrap();
    let mut threads = Vec::new();
    let results = scan(&table, &mut threads, &[0x00, 0xaa, 0xbb, 0xcc, 0x00]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].spec, SpecType::Header);
    assert_eq!(results[0].offset, 1);
}

#[test]
fn test_footer_match_offset_is_pattern_end() {
    let table = SignatureTable::compile(&[spec("bin", "aabb", Some("ccdd"))]).unwrap();
    let mut threads = Vec::new();
    let results = scan(&table, &mut threads, &[0xaa, 0xbb, 0x00, 0xcc, 0xdd]);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].spec, SpecType::Header);
    assert_eq!(results[0].offset, 0);
    assert_eq!(results[1].spec, SpecType::Footer);
    assert_eq!(results[1].offset, 4);
}

#[test]
fn test_single_byte_footer() {
    let table = SignatureTable::compile(&[spec("gif", "47494638", Some("3b"))]).unwrap();
    let mut threads = Vec::new();
    let results = scan(&table, &mut threads, b";");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].spec, SpecType::Footer);
    assert_eq!(results[0].offset, 0);
}

#[test]
fn test_shared_prefix_patterns_both_found() {
    let table = SignatureTable::compile(&[
        spec("one", "aabbcc", None),
        spec("two", "aabbdd", None),
    ])
    .unwrap();
    let mut threads = Vec::new();
    let payload = [0xaa, 0xbb, 0xcc, 0xaa, 0xbb, 0xdd];
    let results = scan(&table, &mut threads, &payload);
    assert_eq!(results.len(), 2);
    assert_eq!(table.signature(results[0].sig).ext, "one");
    assert_eq!(results[0].offset, 0);
    assert_eq!(table.signature(results[1].sig).ext, "two");
    assert_eq!(results[1].offset, 3);
}

#[test]
fn test_overlapping_matches_all_reported() {
    let table = SignatureTable::compile(&[spec("jpg", "ffd8ff", None)]).unwrap();
    let mut threads = Vec::new();
    let results = scan(&table, &mut threads, &[0xff, 0xd8, 0xff, 0xd8, 0xff]);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].offset, 0);
    assert_eq!(results[1].offset, 2);
}

#[test]
fn test_wildcard_matches_any_byte() {
    let table = SignatureTable::compile(&[spec("gif", "47494638??61", None)]).unwrap();
    let mut threads = Vec::new();
    assert_eq!(scan(&table, &mut threads, b"GIF87a").len(), 1);
    threads.clear();
    assert_eq!(scan(&table, &mut threads, b"GIF89a").len(), 1);
    threads.clear();
    assert_eq!(scan(&table, &mut threads, b"GIF8_a").len(), 1);
    threads.clear();
    assert_eq!(scan(&table, &mut threads, b"GIF8xb").len(), 0);
}

#[test]
fn test_match_straddling_two_payloads() {
    let table = SignatureTable::compile(&[spec("jpg", "ffd8ff", None)]).unwrap();
    let mut threads = Vec::new();
    assert!(scan(&table, &mut threads, &[0xff, 0xd8]).is_empty());
    assert!(!threads.is_empty());
    let results = scan(&table, &mut threads, &[0xff]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].spec, SpecType::Header);
}

#[test]
fn test_rejected_wildcard_pattern_never_matches() {
    let table = SignatureTable::compile(&[
        spec("lit", "0011", None),
        // collides with "0011" and must be rejected without leaving its
        // wildcard fan-out behind in the trie
        spec("wild", "??11", None),
    ])
    .unwrap();
    let mut threads = Vec::new();
    assert!(scan(&table, &mut threads, &[0x42, 0x11]).is_empty());
    threads.clear();
    let results = scan(&table, &mut threads, &[0x00, 0x11]);
    assert_eq!(results.len(), 1);
    assert_eq!(table.signature(results[0].sig).ext, "lit");
}

#[test]
fn test_no_match_leaves_no_threads() {
    let table = SignatureTable::compile(&[spec("png", "89504e47", None)]).unwrap();
    let mut threads = Vec::new();
    let results = scan(&table, &mut threads, &[0x01, 0x02, 0x03, 0x04]);
    assert!(results.is_empty());
    assert!(threads.is_empty());
}
