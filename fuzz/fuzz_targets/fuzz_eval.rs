#![no_main]
use libfuzzer_sys::fuzz_target;
use nexusodm::backend::matches;
use nexusodm::utils::json::parse_json_to_bson_document;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else { return };
    // First line is the selector, the rest the document
    let (sel, doc) = s.split_once('\n').unwrap_or((s, "{}"));
    if let (Ok(sel), Ok(doc)) = (parse_json_to_bson_document(sel), parse_json_to_bson_document(doc)) {
        let _ = matches(&doc, &sel);
    }
});
