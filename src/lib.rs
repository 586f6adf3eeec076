//! xcomm - bidirectional comm channels multiplexed over a shared transport
pub mod codec;
pub mod comm;
pub mod error;
pub mod manager;
pub mod message;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use codec::{Codec, JsonCodec};
pub use comm::{Comm, CommCallback, CommConfig, Role, callback};
pub use error::{CommError, CommResult, TransportError, TransportResult};
pub use manager::{CommManager, TargetHandler};
pub use message::CommMessage;
pub use message::types::{CommContent, CommData, CommId, CommMsgType, MessageId, Topic};
pub use registry::CommRegistry;
pub use transport::channel::{ChannelConfig, ChannelFrameTransport};
pub use transport::{FrameTransport, Publisher, Session, TransportStats};

#[cfg(feature = "codec-cbor")]
pub use codec::CborCodec;
#[cfg(feature = "codec-messagepack")]
pub use codec::MessagePackCodec;
