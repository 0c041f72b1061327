//! Content fingerprints for activity payloads.
//!
//! Payloads are normalized before hashing: object keys sorted at every depth,
//! integral floats collapsed to integers. Two payloads that differ only in
//! field order or in `1.0` vs `1` therefore share a checksum.

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 over the canonical JSON encoding of a payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Checksum {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Deterministic copy of `value` with sorted keys and stable numbers.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), normalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Number(n) => Value::Number(normalize_number(n)),
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Number::from(f as i64)
        }
        _ => n.clone(),
    }
}

/// Canonical compact JSON text of a payload, as stored locally.
pub fn canonical_json(value: &Value) -> String {
    write_canonical(&normalize(value))
}

// Keys are written sorted whether or not serde_json's `preserve_order` is on.
fn write_canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), write_canonical(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(write_canonical).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Fingerprint a payload. Pure: no I/O, same logical payload, same checksum.
pub fn fingerprint(payload: &Value) -> Checksum {
    fingerprint_canonical(&canonical_json(payload))
}

/// Fingerprint text already produced by [`canonical_json`].
pub fn fingerprint_canonical(canonical: &str) -> Checksum {
    let digest = Sha256::digest(canonical.as_bytes());
    Checksum(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value =
            serde_json::from_str(r#"{"id":1,"name":"Run","splits":[{"a":1,"b":2}]}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"splits":[{"b":2,"a":1}],"name":"Run","id":1}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn any_value_change_changes_checksum() {
        let base = json!({"id": 1, "distance": 10000.5, "name": "Run"});
        let changed_number = json!({"id": 1, "distance": 10000.6, "name": "Run"});
        let changed_text = json!({"id": 1, "distance": 10000.5, "name": "Run!"});
        let extra_field = json!({"id": 1, "distance": 10000.5, "name": "Run", "x": null});
        let fp = fingerprint(&base);
        assert_ne!(fp, fingerprint(&changed_number));
        assert_ne!(fp, fingerprint(&changed_text));
        assert_ne!(fp, fingerprint(&extra_field));
    }

    #[test]
    fn integral_floats_match_integers() {
        assert_eq!(
            fingerprint(&json!({"moving_time": 3600.0})),
            fingerprint(&json!({"moving_time": 3600}))
        );
        assert_ne!(
            fingerprint(&json!({"moving_time": 3600.5})),
            fingerprint(&json!({"moving_time": 3600}))
        );
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(fingerprint(&json!([1, 2])), fingerprint(&json!([2, 1])));
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let fp = fingerprint(&json!({}));
        assert_eq!(fp.as_str().len(), 64);
        // sha256("{}")
        assert_eq!(
            fp.as_str(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn canonical_text_is_compact_and_sorted() {
        let v = json!({"b": [true, null], "a": {"d": 1.0, "c": "x"}});
        assert_eq!(canonical_json(&v), r#"{"a":{"c":"x","d":1},"b":[true,null]}"#);
    }
}
