#![no_main]

use libfuzzer_sys::fuzz_target;
use linebase_core::{Document, Filter};
use serde_json::json;

// Fuzz target: filter parsing and evaluation with arbitrary JSON
// Goal: parse may reject, evaluation must never panic

fuzz_target!(|data: &[u8]| {
    let query = match serde_json::from_slice::<serde_json::Value>(data) {
        Ok(query) => query,
        Err(_) => return,
    };
    let filter = match Filter::parse(&query) {
        Ok(filter) => filter,
        Err(_) => return,
    };

    let records = [
        json!({}),
        json!({"value": 10, "name": "item_1"}),
        json!({"value": "10", "tags": ["a", "b"], "nested": {"x": [1, {"y": null}]}}),
        json!({"value": [1.5, -2, true], "name": null}),
    ];
    for record in records {
        if let Ok(doc) = Document::from_value(record) {
            let first = filter.matches(&doc);
            assert_eq!(first, filter.matches(&doc));
        }
    }
});
