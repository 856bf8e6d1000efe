//! Protocol envelopes and the message catalogue (§3, §4.1).

pub mod message;

pub use message::MessageType;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `mc` value used by handshake frames before the session key is installed
/// (§3, §4.4).
pub const HANDSHAKE_MC: i64 = -1;

/// The inbound/outbound message envelope: `{ type_int, mc, payload }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub type_int: MessageType,
    #[serde(default = "default_mc")]
    pub mc: i64,
    #[serde(default)]
    pub payload: Value,
}

fn default_mc() -> i64 {
    HANDSHAKE_MC
}

impl Envelope {
    pub fn new(type_int: MessageType, mc: i64, payload: Value) -> Self {
        Self { type_int, mc, payload }
    }
}
