#![no_main]

use libfuzzer_sys::fuzz_target;
use linebase_core::{decode_line, encode, Collection, Schema};
use serde_json::json;
use std::fs;

// Fuzz target: decoding arbitrary bytes as collection lines
// Goal: malformed input must surface as an error, never a panic

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        for (i, line) in text.lines().enumerate() {
            if let Ok(doc) = decode_line(line, i + 1) {
                // anything that decodes must encode to a single line
                let encoded = encode(&doc).expect("decoded record re-encodes");
                assert!(!encoded.contains('\n'));
            }
        }
    }

    // Same bytes as a whole collection file, through scan and rewrite
    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let path = dir.path().join("fuzz.json");
    if fs::write(&path, data).is_err() {
        return;
    }
    if let Ok(coll) = Collection::open(&path, Schema::empty()) {
        let before = fs::read(&path).unwrap_or_default();
        let counted = coll.count(&json!({}));
        if coll.compact().is_err() {
            // a failed rewrite leaves the file as it was
            assert_eq!(fs::read(&path).unwrap_or_default(), before);
        } else {
            assert!(counted.is_ok());
        }
    }
});
