//! Hashing - SHA-256 Checksums and Fingerprints
//!
//! Upload checksums travel with the upload metadata. Crop fingerprints give
//! every stored rectangle a revision that only changes when the rect does.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(sort_value).collect())
        }
        _ => v.clone()
    }
}

/// Revision of a stored crop: sha256(banner_id + preset + canonical rect)
pub fn crop_fingerprint(
    banner_id: &str,
    preset: &str,
    rect: &impl Serialize,
) -> Result<String, serde_json::Error> {
    let canonical_rect = canonical_json(rect)?;
    let combined = format!("{}:{}:{}", banner_id, preset, canonical_rect);
    Ok(sha256_hex(combined.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"width": 1, "left": 2, "top": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"left":2,"top":3,"width":1}"#);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({"left": 0, "top": 156, "width": 1920, "height": 768});
        let b = json!({"height": 768, "width": 1920, "top": 156, "left": 0});
        assert_eq!(
            crop_fingerprint("b1", "wide1920", &a).unwrap(),
            crop_fingerprint("b1", "wide1920", &b).unwrap()
        );
        assert_ne!(
            crop_fingerprint("b1", "wide1920", &a).unwrap(),
            crop_fingerprint("b1", "tablet1024", &a).unwrap()
        );
    }
}
