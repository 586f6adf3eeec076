pub mod metadata;
pub mod types;

use bytes::{Buf, BufMut, BytesMut};

use self::metadata::MessageMetadata;
use self::types::{
    CommContent, CommData, CommId, CommMsgType, MAGIC, MAX_MESSAGE_SIZE, MIN_HEADER_SIZE,
    MessageId, Topic, VERSION,
};
use crate::codec::Codec;
use crate::error::{TransportError, TransportResult};

/// One comm protocol message as it travels over a frame transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CommMessage {
    pub id: MessageId,
    pub msg_type: CommMsgType,
    pub topic: Topic,
    pub content: CommContent,
    pub metadata: MessageMetadata,
}

impl CommMessage {
    pub fn new(msg_type: CommMsgType, topic: Topic, content: CommContent) -> Self {
        Self {
            id: MessageId::new(),
            msg_type,
            topic,
            content,
            metadata: MessageMetadata::new(),
        }
    }

    pub fn open(comm_id: CommId, target: impl Into<String>, data: CommData) -> Self {
        let topic = comm_id.topic();
        Self::new(
            CommMsgType::Open,
            topic,
            CommContent::new(comm_id, data).with_target(target),
        )
    }

    pub fn msg(comm_id: CommId, data: CommData) -> Self {
        let topic = comm_id.topic();
        Self::new(CommMsgType::Msg, topic, CommContent::new(comm_id, data))
    }

    pub fn close(comm_id: CommId, data: CommData) -> Self {
        let topic = comm_id.topic();
        Self::new(CommMsgType::Close, topic, CommContent::new(comm_id, data))
    }

    /// Encode message to wire bytes
    pub fn encode<C: Codec>(&self, codec: &C) -> TransportResult<BytesMut> {
        let topic = self.topic.as_bytes();
        if topic.len() > u16::MAX as usize {
            return Err(TransportError::Protocol("Topic too long".to_string()));
        }

        let payload = codec.encode(&self.content)?;

        let total_size = MIN_HEADER_SIZE + topic.len() + payload.len();
        if total_size > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: total_size,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(total_size);

        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);

        // Body length (excluding magic, version, and length field)
        buf.put_u32_le((total_size - 9) as u32);

        buf.put_u64_le(self.id.0);
        buf.put_u8(self.msg_type.to_u8());

        buf.put_u16_le(topic.len() as u16);
        buf.put_slice(topic);

        buf.put_u64_le(self.metadata.timestamp);

        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(&payload);

        Ok(buf)
    }

    /// Decode message from wire bytes
    pub fn decode<C: Codec>(mut buf: impl Buf, codec: &C) -> TransportResult<Self> {
        if buf.remaining() < MIN_HEADER_SIZE {
            return Err(TransportError::Protocol(
                "Buffer too small for message header".to_string(),
            ));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(TransportError::Protocol(format!(
                "Invalid magic bytes: {:?}",
                magic
            )));
        }

        let version = buf.get_u8();
        if version != VERSION {
            return Err(TransportError::Protocol(format!(
                "Unsupported protocol version: {}",
                version
            )));
        }

        let msg_len = buf.get_u32_le() as usize;
        if buf.remaining() < msg_len {
            return Err(TransportError::Protocol("Incomplete message".to_string()));
        }

        let id = MessageId(buf.get_u64_le());

        let msg_type = CommMsgType::from_u8(buf.get_u8())?;

        let topic_len = buf.get_u16_le() as usize;
        ensure_remaining(&buf, topic_len, "topic")?;
        let mut topic = vec![0u8; topic_len];
        buf.copy_to_slice(&mut topic);
        let topic = Topic::from_bytes(topic);

        ensure_remaining(&buf, 8 + 4, "timestamp")?;
        let metadata = MessageMetadata::default().with_timestamp(buf.get_u64_le());

        let payload_len = buf.get_u32_le() as usize;
        ensure_remaining(&buf, payload_len, "payload")?;
        let mut payload = vec![0u8; payload_len];
        buf.copy_to_slice(&mut payload);

        let content: CommContent = codec.decode(&payload)?;

        if content.comm_id.topic() != topic {
            return Err(TransportError::Protocol(format!(
                "Topic {} does not match comm_id {}",
                topic, content.comm_id
            )));
        }

        Ok(Self {
            id,
            msg_type,
            topic,
            content,
            metadata,
        })
    }
}

fn ensure_remaining(buf: &impl Buf, needed: usize, field: &str) -> TransportResult<()> {
    if buf.remaining() < needed {
        return Err(TransportError::Protocol(format!(
            "Truncated {}: need {} bytes, have {}",
            field,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde_json::json;

    fn data(value: serde_json::Value) -> CommData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_open_message_on_the_wire() {
        let id = CommId::from("0123abcd");
        let msg = CommMessage::open(id.clone(), "example", data(json!({"x": 1})));

        let buf = msg.encode(&JsonCodec).unwrap();
        assert_eq!(&buf[..4], &MAGIC);
        assert_eq!(buf[4], VERSION);

        let decoded = CommMessage::decode(buf, &JsonCodec).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.topic.as_bytes(), b"comm-0123abcd");
        assert_eq!(decoded.content.target.as_deref(), Some("example"));
        assert_eq!(decoded.content.data["x"], json!(1));
    }

    #[test]
    fn test_msg_and_close_carry_no_target() {
        let id = CommId::new();
        let msg = CommMessage::msg(id.clone(), CommData::new());
        let close = CommMessage::close(id, data(json!({"bye": true})));

        let msg = CommMessage::decode(msg.encode(&JsonCodec).unwrap(), &JsonCodec).unwrap();
        let close = CommMessage::decode(close.encode(&JsonCodec).unwrap(), &JsonCodec).unwrap();

        assert_eq!(msg.msg_type, CommMsgType::Msg);
        assert!(msg.content.target.is_none());
        assert_eq!(close.msg_type, CommMsgType::Close);
        assert!(close.content.target.is_none());
        assert_eq!(close.content.data["bye"], json!(true));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let msg = CommMessage::msg(CommId::new(), CommData::new());
        let mut buf = msg.encode(&JsonCodec).unwrap();
        buf[0] = b'Z';

        let err = CommMessage::decode(buf, &JsonCodec).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        let msg = CommMessage::msg(CommId::new(), data(json!({"k": "v"})));
        let buf = msg.encode(&JsonCodec).unwrap();
        let short = buf.freeze().slice(..MIN_HEADER_SIZE + 4);

        assert!(CommMessage::decode(short, &JsonCodec).is_err());
    }

    #[test]
    fn test_decode_rejects_topic_mismatch() {
        let mut msg = CommMessage::msg(CommId::from("aaaa"), CommData::new());
        msg.topic = CommId::from("bbbb").topic();

        let buf = msg.encode(&JsonCodec).unwrap();
        let err = CommMessage::decode(buf, &JsonCodec).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
