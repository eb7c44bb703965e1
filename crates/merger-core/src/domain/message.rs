//! Canonical message encoding.
//!
//! Dedup compares serialized payloads byte for byte, so the same logical
//! payload must always encode to the same string. Object keys are sorted
//! recursively before encoding; array order is part of the payload and is
//! preserved.

use serde_json::{Map, Value};

use super::merge_key::MergeKey;

/// Encode a payload into its canonical stored form.
pub fn canonical(msg: &Value) -> String {
    // A Value holds no non-finite floats, so serialization cannot fail.
    serde_json::to_string(&sorted(msg)).expect("serde_json::Value always serializes")
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), sorted(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Decode one stored payload.
pub fn decode(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Decode a stored sequence, preserving order.
///
/// A malformed entry is a per-message data error: it is reported and
/// dropped so one bad payload cannot poison the whole batch.
pub fn decode_sequence(key: &MergeKey, raw: Vec<String>) -> Vec<Value> {
    let mut out = Vec::with_capacity(raw.len());
    for entry in raw {
        match decode(&entry) {
            Ok(value) => out.push(value),
            Err(e) => {
                tracing::warn!(merge_key = %key, error = %e, "skipping malformed stored payload");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"b": 1, "a": 2}), json!({"a": 2, "b": 1}))]
    #[case(json!({"z": {"y": 1, "x": 2}}), json!({"z": {"x": 2, "y": 1}}))]
    #[case(json!([{"b": 1, "a": 2}]), json!([{"a": 2, "b": 1}]))]
    fn key_order_does_not_change_encoding(#[case] left: Value, #[case] right: Value) {
        assert_eq!(canonical(&left), canonical(&right));
    }

    #[test]
    fn array_order_is_preserved() {
        assert_ne!(canonical(&json!([1, 2, 3])), canonical(&json!([3, 2, 1])));
        assert_eq!(canonical(&json!([1, 2, 3])), "[1,2,3]");
    }

    #[test]
    fn scalars_round_trip() {
        let value = json!({"n": 42, "s": "text", "b": true, "nil": null});
        assert_eq!(decode(&canonical(&value)).unwrap(), value);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let key = MergeKey::new("foo");
        let decoded = decode_sequence(
            &key,
            vec!["[1,2,3]".to_string(), "not json".to_string(), "{\"a\":1}".to_string()],
        );
        assert_eq!(decoded, vec![json!([1, 2, 3]), json!({"a": 1})]);
    }
}
