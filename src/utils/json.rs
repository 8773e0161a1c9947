use crate::errors::{OdmError, Result};

/// Convert a serde_json::Value that must be an object into a bson::Document.
///
/// # Errors
/// Returns `UnsupportedQueryShape` when the value is not an object or not representable as BSON.
pub fn json_value_to_bson_document(val: &serde_json::Value) -> Result<bson::Document> {
    let obj = val
        .as_object()
        .ok_or_else(|| OdmError::UnsupportedQueryShape("expected a JSON object".into()))?;
    bson::Document::try_from(obj.clone())
        .map_err(|e| OdmError::UnsupportedQueryShape(format!("invalid JSON conditions: {e}")))
}

/// Parse a JSON string into a bson::Document. The JSON must be a top-level object.
///
/// # Errors
/// Returns an error when the text is not JSON or not an object.
pub fn parse_json_to_bson_document(json: &str) -> Result<bson::Document> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    json_value_to_bson_document(&val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_bson_success() {
        let d = parse_json_to_bson_document("{\"a\":1,\"b\":\"x\"}").unwrap();
        assert_eq!(d.get_i32("a").unwrap(), 1);
        assert_eq!(d.get_str("b").unwrap(), "x");
    }

    #[test]
    fn json_to_bson_rejects_array() {
        let e = parse_json_to_bson_document("[1,2,3]").unwrap_err();
        assert!(matches!(e, OdmError::UnsupportedQueryShape(_)));
    }

    #[test]
    fn json_to_bson_rejects_garbage() {
        let e = parse_json_to_bson_document("{nope").unwrap_err();
        assert!(matches!(e, OdmError::Json(_)));
    }
}
