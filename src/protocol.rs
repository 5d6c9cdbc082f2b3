use serde::{Deserialize, Serialize};

/// Monotonically increasing session identity, unique for the process
/// lifetime and never reused.
pub type SessionId = u64;

/// Frame received from a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub text: String,
    pub character: String,
}

/// Frame delivered to a connected client.
///
/// `is_user` is true when the message originated from this client's own
/// pipeline, false when it was fanned out from another session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sender_id: SessionId,
    pub text: String,
    pub is_user: bool,
}

/// Record placed on the shared broadcast queue by a pipeline and fanned
/// out by the hub to every session except the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRecord {
    pub sender_id: SessionId,
    pub text: String,
}
