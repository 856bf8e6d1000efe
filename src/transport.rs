//! Framed, encrypted message transport (§4.3).
//!
//! Owns the WebSocket, the session key/IV, the bridge-assigned `device_id`,
//! and the per-connection `mc` counter. Sending is serialized behind a
//! single mutex so that the `mc` increment and the corresponding write stay
//! atomic with respect to each other (§5) even when commands arrive from
//! multiple tasks concurrently.

use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::crypto;
use crate::error::{BridgeError, Result};
use crate::protocol::{Envelope, MessageType};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Writer {
    sink: SplitSink<WsStream, Message>,
    key: [u8; 32],
    iv: [u8; 16],
    mc: i64,
}

impl Writer {
    async fn send_value<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let json = serde_json::to_vec(value)?;
        let frame = crypto::encrypt_frame(&self.key, &self.iv, &json);
        let text = String::from_utf8(frame).map_err(|e| BridgeError::Transport(e.to_string()))?;
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

/// A secure, keyed WebSocket connection, ready for framed traffic.
///
/// Constructed by the handshake (§4.4) the moment the AES session key is
/// installed — S4 onward (`LOGIN_SUBMIT`, `TOKEN_VALIDATE`, `TOKEN_RENEW`,
/// `TOKEN_VALIDATE`) are sent through it like any other message and do
/// participate in the `mc` counter; only the three pre-key frames
/// (`CONNECTION_HELLO`, `SECURE_INIT`, `SECURE_KEY`) carry `mc = -1` (§8).
pub struct SecureConnection {
    writer: Mutex<Writer>,
    key: [u8; 32],
    iv: [u8; 16],
    device_id: String,
}

impl SecureConnection {
    /// Build a `SecureConnection` from an already-split WebSocket sink and
    /// stream (the handshake splits the raw socket before a key exists, to
    /// drive the plaintext pre-`SECURE_KEY` steps), plus the negotiated
    /// key/IV. The caller drives the returned stream half with
    /// [`Self::recv_frame`] (for the remaining handshake steps) and then
    /// [`Self::pump`] (once ready).
    pub fn new(sink: SplitSink<WsStream, Message>, key: [u8; 32], iv: [u8; 16], device_id: String) -> Self {
        Self {
            writer: Mutex::new(Writer { sink, key, iv, mc: 0 }),
            key,
            iv,
            device_id,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Increment `mc`, build `{type_int, mc, payload}`, encrypt and send.
    /// Returns the `mc` assigned to this frame.
    pub async fn send_message(&self, type_int: MessageType, payload: serde_json::Value) -> Result<i64> {
        let mut writer = self.writer.lock().await;
        writer.mc += 1;
        let mc = writer.mc;
        let envelope = Envelope::new(type_int, mc, payload);
        writer.send_value(&envelope).await?;
        Ok(mc)
    }

    /// Send a pre-built envelope without touching `mc` (handshake frames).
    pub async fn send_raw(&self, envelope: &Envelope) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send_value(envelope).await
    }

    /// Emit `{ type_int: ACK, ref: mc }` for an inbound frame, unencrypted
    /// field shape per §4.3 (no `mc`/`payload` keys of its own).
    async fn send_ack(&self, mc: i64) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send_value(&serde_json::json!({ "type_int": MessageType::ACK, "ref": mc }))
            .await
    }

    /// Read and decrypt exactly one non-empty frame from `stream`, acking
    /// any frame that carries an `mc` field along the way. Returns
    /// `Ok(None)` on a clean close. Shared by [`Self::recv_next`] (which
    /// additionally requires a `payload` field) and [`Self::recv_frame`]
    /// (which does not).
    async fn read_decrypted(&self, stream: &mut SplitStream<WsStream>) -> Result<Option<serde_json::Value>> {
        loop {
            // tokio-tungstenite reassembles continuation frames into one
            // complete Message before handing it to `next()`, satisfying
            // the "accumulate fragments until end_of_message" requirement.
            let message = match stream.next().await {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            };

            let raw: &[u8] = match &message {
                Message::Text(text) => text.as_bytes(),
                Message::Binary(data) => data,
                Message::Close(_) => {
                    let mut writer = self.writer.lock().await;
                    let _ = writer.sink.send(Message::Close(None)).await;
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            let decrypted = crypto::decrypt_frame(&self.key, &self.iv, raw)?;
            if decrypted.is_empty() || decrypted == b"{}" {
                trace!("discarding empty frame");
                continue;
            }

            let value: serde_json::Value = serde_json::from_slice(&decrypted)?;

            if let Some(mc) = value.get("mc").and_then(serde_json::Value::as_i64) {
                debug!(mc, "acking inbound frame");
                self.send_ack(mc).await?;
            }

            return Ok(Some(value));
        }
    }

    /// Read and decrypt frames from `stream` until one carries a `payload`
    /// field, returning it as an [`Envelope`]. Used by the dispatcher pump,
    /// where a frame without a payload is nothing to dispatch. Returns
    /// `Ok(None)` on a clean close.
    pub async fn recv_next(&self, stream: &mut SplitStream<WsStream>) -> Result<Option<Envelope>> {
        loop {
            let Some(value) = self.read_decrypted(stream).await? else {
                return Ok(None);
            };
            let Some(payload) = value.get("payload") else {
                continue;
            };
            return Ok(Some(Self::envelope_from(&value, payload.clone())));
        }
    }

    /// Read and decrypt exactly one frame from `stream`, returning it as
    /// soon as it arrives regardless of whether it carries a `payload`
    /// field. Used by the handshake's SECURE_READY/ack steps (§4.4), which
    /// the spec describes as "any frame" acking — a frame with no payload
    /// at those steps is not an empty frame to skip, it's the expected
    /// answer. Missing payload defaults to `null`. Returns `Ok(None)` on a
    /// clean close.
    pub async fn recv_frame(&self, stream: &mut SplitStream<WsStream>) -> Result<Option<Envelope>> {
        let Some(value) = self.read_decrypted(stream).await? else {
            return Ok(None);
        };
        let payload = value.get("payload").cloned().unwrap_or(serde_json::Value::Null);
        Ok(Some(Self::envelope_from(&value, payload)))
    }

    fn envelope_from(value: &serde_json::Value, payload: serde_json::Value) -> Envelope {
        let type_int = value
            .get("type_int")
            .and_then(serde_json::Value::as_i64)
            .map(MessageType::from_i64)
            .unwrap_or(MessageType::Other(-1));
        let mc = value.get("mc").and_then(serde_json::Value::as_i64).unwrap_or(-1);
        Envelope::new(type_int, mc, payload)
    }

    /// Drive the receive loop until the socket closes or `cancel` fires,
    /// publishing each dispatchable envelope on `outbound`.
    ///
    /// On entry, sends the three post-handshake priming frames, in order,
    /// each with an empty payload (§4.3).
    pub async fn pump(
        &self,
        mut stream: SplitStream<WsStream>,
        outbound: mpsc::UnboundedSender<Envelope>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.send_message(MessageType::QuerySessionState, serde_json::json!({})).await?;
        self.send_message(MessageType::QueryCatalogue, serde_json::json!({})).await?;
        self.send_message(MessageType::LoginRequest, serde_json::json!({})).await?;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = self.recv_next(&mut stream) => next,
            };

            match next? {
                Some(envelope) => {
                    if outbound.send(envelope).is_err() {
                        warn!("dispatcher dropped, discarding inbound envelope");
                    }
                }
                None => return Ok(()),
            }
        }
    }
}
