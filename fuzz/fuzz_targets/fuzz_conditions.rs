#![no_main]
use libfuzzer_sys::fuzz_target;
use nexusodm::model::{FieldType, ModelBuilder};
use nexusodm::selector::{Conditions, merge_condition};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else { return };
    // Parsing and merging arbitrary JSON conditions must never panic
    let Ok(conditions) = Conditions::from_json(s) else { return };
    let model = ModelBuilder::new("Band")
        .field("likes", FieldType::Integer)
        .has_many("albums", "Album", "band_id")
        .build();
    let mut selector = bson::Document::new();
    for c in conditions {
        let _ = merge_condition(&mut selector, c, &model, None);
    }
});
