use crate::error::CommResult;
use serde::{Deserialize, Serialize};

/// Trait for encoding and decoding comm message content.
///
/// Comm data is an arbitrary JSON mapping, so codecs must be self-describing.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Encode a serializable value into bytes
    fn encode<T: Serialize>(&self, data: &T) -> CommResult<Vec<u8>>;

    /// Decode bytes into a deserializable value
    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> CommResult<T>;
}

/// Default codec (JSON codec)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, data: &T) -> CommResult<Vec<u8>> {
        Ok(serde_json::to_vec(data)?)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> CommResult<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// MessagePack codec - compact binary, cross-language compatible
#[cfg(feature = "codec-messagepack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

#[cfg(feature = "codec-messagepack")]
impl Codec for MessagePackCodec {
    fn encode<T: Serialize>(&self, data: &T) -> CommResult<Vec<u8>> {
        rmp_serde::to_vec_named(data)
            .map_err(|e| crate::error::CommError::Serialization(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> CommResult<T> {
        rmp_serde::from_slice(data)
            .map_err(|e| crate::error::CommError::Serialization(e.to_string()))
    }
}

/// CBOR codec - binary JSON (RFC 8949), self-describing
#[cfg(feature = "codec-cbor")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

#[cfg(feature = "codec-cbor")]
impl Codec for CborCodec {
    fn encode<T: Serialize>(&self, data: &T) -> CommResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(data, &mut buf)
            .map_err(|e| crate::error::CommError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> CommResult<T> {
        ciborium::from_reader(data)
            .map_err(|e| crate::error::CommError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_keeps_nested_data() {
        let codec = JsonCodec;
        let value = json!({"x": 1, "nested": {"list": [1, 2, 3]}});

        let bytes = codec.encode(&value).unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains("\"nested\""));

        let decoded: serde_json::Value = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let result: CommResult<serde_json::Value> = JsonCodec.decode(b"\xff\x00not json");
        assert!(matches!(
            result,
            Err(crate::error::CommError::Serialization(_))
        ));
    }

    #[cfg(feature = "codec-messagepack")]
    #[test]
    fn test_messagepack_codec() {
        let value = json!({"y": 2});
        let bytes = MessagePackCodec.encode(&value).unwrap();
        let decoded: serde_json::Value = MessagePackCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[cfg(feature = "codec-cbor")]
    #[test]
    fn test_cbor_codec() {
        let value = json!({"y": 2});
        let bytes = CborCodec.encode(&value).unwrap();
        let decoded: serde_json::Value = CborCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }
}
