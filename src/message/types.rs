use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::{CommError, CommResult};

pub const MAGIC: [u8; 4] = [0x58, 0x43, 0x4F, 0x4D]; // XCOM
pub const VERSION: u8 = 1;
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
pub const MIN_HEADER_SIZE: usize = 4 + 1 + 4 + 8 + 1 + 2 + 8 + 4;

/// Target name used when a comm is created without one.
pub const DEFAULT_TARGET: &str = "comm";

/// Payload carried by open, msg and close messages.
pub type CommData = serde_json::Map<String, serde_json::Value>;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn new() -> Self {
        MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique comm identifier, shared by both peers of a comm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommId(String);

impl CommId {
    /// Random 128-bit identifier as 32 lowercase hex characters.
    pub fn new() -> Self {
        CommId(Uuid::new_v4().simple().to_string())
    }

    pub fn from_raw(id: impl Into<String>) -> Self {
        CommId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Routing topic for messages belonging to this comm.
    pub fn topic(&self) -> Topic {
        Topic::for_comm(self)
    }
}

impl Default for CommId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommId {
    fn from(id: &str) -> Self {
        CommId::from_raw(id)
    }
}

impl From<String> for CommId {
    fn from(id: String) -> Self {
        CommId::from_raw(id)
    }
}

/// Transport routing token, `comm-<comm_id>` as ASCII bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(Vec<u8>);

impl Topic {
    pub fn for_comm(comm_id: &CommId) -> Self {
        Topic(format!("comm-{}", comm_id).into_bytes())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Topic(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommMsgType {
    Open = 0,
    Msg = 1,
    Close = 2,
}

impl CommMsgType {
    pub fn from_u8(value: u8) -> CommResult<Self> {
        match value {
            0 => Ok(CommMsgType::Open),
            1 => Ok(CommMsgType::Msg),
            2 => Ok(CommMsgType::Close),
            _ => Err(CommError::InvalidMessage(format!(
                "Unknown comm message type: {}",
                value
            ))),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommMsgType::Open => "comm_open",
            CommMsgType::Msg => "comm_msg",
            CommMsgType::Close => "comm_close",
        }
    }
}

impl std::fmt::Display for CommMsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields published for every comm message; `target` is set on open only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommContent {
    pub data: CommData,
    pub comm_id: CommId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl CommContent {
    pub fn new(comm_id: CommId, data: CommData) -> Self {
        Self {
            data,
            comm_id,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}
