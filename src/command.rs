//! The non-owning handle entities use to talk back to the bridge (§9,
//! "Cyclic references").
//!
//! Entities never own the bridge and never own a connection; they hold a
//! `Weak<dyn CommandSink>` constrained to exactly the one operation they
//! need. If the bridge (and therefore the handle) is gone, or no
//! connection currently exists, sends are silently dropped — a command
//! issued before or after a connection exists is not an error (§7,
//! `CommandBeforeConnection`).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::MessageType;

#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_message(&self, type_int: MessageType, payload: Value) -> Result<()>;
}
