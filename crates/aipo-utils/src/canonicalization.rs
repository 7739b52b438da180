//! Canonical JSON (RFC 8785) and content digests.

use anyhow::{Context, Result};
use serde::Serialize;

pub const CANONICALIZATION_BACKEND: &str = "jcs-rfc8785";

/// Serialize `value` as JCS canonical JSON.
///
/// Object keys are sorted and whitespace is removed, so equal values always
/// produce byte-identical output.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// Hex BLAKE3 digest of `bytes`.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_jcs_sorts_keys() {
        let value = json!({"b": 1, "a": [true, null], "c": {"z": "x", "y": 2}});
        let jcs = emit_jcs(&value).unwrap();
        assert_eq!(jcs, r#"{"a":[true,null],"b":1,"c":{"y":2,"z":"x"}}"#);
    }

    #[test]
    fn test_content_digest_is_stable_hex() {
        let first = content_digest(b"public class Foo {}");
        let second = content_digest(b"public class Foo {}");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, content_digest(b"public class Bar {}"));
    }
}
