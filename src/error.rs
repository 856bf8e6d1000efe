//! Crate-wide error type.
//!
//! Mirrors the error kinds enumerated in the protocol design: most are
//! fatal to a single connection attempt and drive the supervisor's
//! reconnect loop; a few (`UnknownPayload`, `UnhandledMessageType`,
//! `CommandBeforeConnection`) are swallowed with a log at the call site
//! and never reach a caller.

use thiserror::Error;

/// Errors surfaced by the bridge client.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Server rejected the connection during the handshake (`NACK` at S0,
    /// `CONNECTION_DECLINED` at S1).
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Server sent an unexpected `type_int` at a fixed handshake step.
    #[error("unexpected message during handshake: expected {expected}, got {actual}")]
    HandshakeProtocolError { expected: i64, actual: i64 },

    /// WebSocket connect/read/write failure, or a malformed/undecryptable
    /// frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// A crypto primitive failed (bad PEM, RSA encrypt failure, ...).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// `run()` was called while the bridge was not `Uninitialized`.
    #[error("run() called while bridge is not in the Uninitialized state")]
    InvalidRunState,

    /// JSON (de)serialization of a protocol envelope failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
