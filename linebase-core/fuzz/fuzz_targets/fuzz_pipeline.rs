#![no_main]

use libfuzzer_sys::fuzz_target;
use linebase_core::{Document, Pipeline};
use serde_json::json;

// Fuzz target: aggregation pipelines from arbitrary JSON
// Goal: every stage either rejects its spec or runs without panicking

fuzz_target!(|data: &[u8]| {
    let spec = match serde_json::from_slice::<serde_json::Value>(data) {
        Ok(spec) => spec,
        Err(_) => return,
    };
    let pipeline = match Pipeline::from_json(&spec) {
        Ok(pipeline) => pipeline,
        Err(_) => return,
    };

    let docs: Vec<Document> = (0..8)
        .filter_map(|i| {
            Document::from_value(json!({
                "i": i,
                "group": i % 3,
                "score": i as f64 * 1.5,
                "name": format!("n{}", i),
                "tags": [i, "t"],
            }))
            .ok()
        })
        .collect();
    let _ = pipeline.execute(docs);
});
