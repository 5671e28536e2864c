//! Field value codecs
//!
//! A codec packs one decoded field value into the bytes stored in the session
//! hash and back. Decoding failures are always surfaced, never mapped to an
//! empty value.

use serde_json::Value;

use sesslock_common::{Result, SessionError};

/// Pack/unpack pair applied to every stored field
pub trait Codec: Send + Sync {
    /// Short identifier, for diagnostics
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| {
            SessionError::Serialization(format!("cannot decode stored field: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec;
        let value = json!({"name": "Alice", "tags": [1, 2, 3], "active": true});
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
        assert_eq!(codec.name(), "json");
    }

    #[test]
    fn test_decode_corrupt_data() {
        let codec = JsonCodec;
        let err = codec.decode(b"\x00\x01 not json").unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
    }
}
