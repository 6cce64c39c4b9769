use courier_wire::{PrefixTable, decode};
use std::fs;

#[test]
fn vectors_decode_to_canonical_encoding() {
    let dir = "tests/vectors";
    let mut checked = 0;
    for entry in fs::read_dir(dir).expect("read vectors dir") {
        let entry = entry.expect("entry");
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let contents = fs::read_to_string(&path).expect("read vector");
        let value: serde_json::Value = serde_json::from_str(&contents).expect("json");
        let wire = value["wire"].as_str().expect("wire");
        let canonical = value["canonical"].as_str().expect("canonical");

        let mut prefixes = PrefixTable::new();
        if let Some(table) = value["prefixes"].as_object() {
            for (prefix, uri) in table {
                prefixes.register(prefix.as_str(), uri.as_str().expect("prefix uri"));
            }
        }

        let message = decode(wire, &prefixes).expect("decode vector");
        let encoded = message.encode().expect("encode vector");
        assert_eq!(encoded, canonical, "canonical mismatch for {:?}", path);

        // Canonical output must be a fixed point.
        let again = decode(&encoded, &PrefixTable::new()).expect("re-decode");
        assert_eq!(again, message, "re-decode mismatch for {:?}", path);
        checked += 1;
    }
    assert!(checked > 0, "no vectors found");
}
