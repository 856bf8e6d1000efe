//! Capability → RSA → AES → login → token handshake (§4.4).
//!
//! Modeled as a strict sequence of steps, each consuming one server
//! response and producing the next. Any unexpected `type_int` at a given
//! step is a fatal [`BridgeError::HandshakeProtocolError`], matching the
//! teacher's handler-dispatch pattern of validating the opcode before
//! acting on a packet.

use futures::SinkExt;
use futures::stream::{SplitStream, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::crypto;
use crate::error::{BridgeError, Result};
use crate::protocol::{Envelope, HANDSHAKE_MC, MessageType};
use crate::transport::{SecureConnection, WsStream};

const CLIENT_TYPE: &str = "shl-app";
const CLIENT_ID: &str = "c956e43f999f8004";
const CLIENT_VERSION: &str = "3.0.0";

/// Outcome of a successful handshake: a ready `SecureConnection` and the
/// receive half the caller should hand to [`SecureConnection::pump`].
pub struct HandshakeOutcome {
    pub connection: SecureConnection,
    pub stream: SplitStream<WsStream>,
    pub device_id: String,
}

/// Connect to `ws://{ip}/` and drive the handshake to completion.
pub async fn perform(ip: &str, auth_key: &str) -> Result<HandshakeOutcome> {
    let url = format!("ws://{ip}/");
    let (ws, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| BridgeError::Transport(format!("connect to {url} failed: {e}")))?;
    let (mut sink, mut stream) = ws.split();

    // S0: first server frame carries device_id + connection_id.
    let s0 = recv_plain(&mut stream).await?;
    if s0.get("type_int").and_then(Value::as_i64) == Some(MessageType::NACK) {
        let info = s0.get("info").and_then(Value::as_str).unwrap_or("connection rejected");
        return Err(BridgeError::HandshakeRejected(info.to_string()));
    }
    let payload = s0.get("payload").ok_or_else(|| {
        BridgeError::Transport("initial server frame missing payload".to_string())
    })?;
    let device_id = payload
        .get("device_id")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Transport("initial frame missing device_id".to_string()))?
        .to_string();
    let connection_id = payload.get("connection_id").cloned().unwrap_or(Value::Null);
    debug!(device_id, "handshake S0 complete");

    // S1: CONNECTION_HELLO.
    send_plain(
        &mut sink,
        MessageType::ConnectionHello,
        serde_json::json!({
            "client_type": CLIENT_TYPE,
            "client_id": CLIENT_ID,
            "client_version": CLIENT_VERSION,
            "connection_id": connection_id,
        }),
    )
    .await?;
    let s1 = recv_plain(&mut stream).await?;
    if s1.get("type_int").and_then(Value::as_i64) == Some(MessageType::CONNECTION_DECLINED) {
        let message = s1
            .get("payload")
            .and_then(|p| p.get("error_message"))
            .and_then(Value::as_str)
            .unwrap_or("connection declined");
        return Err(BridgeError::HandshakeRejected(message.to_string()));
    }
    debug!("handshake S1 complete");

    // S2: SECURE_INIT, expect the server's RSA public key.
    send_plain(&mut sink, MessageType::SecureInit, serde_json::json!({})).await?;
    let s2 = recv_plain(&mut stream).await?;
    let public_key_pem = s2
        .get("payload")
        .and_then(|p| p.get("public_key"))
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Transport("SECURE_INIT response missing public_key".to_string()))?;
    debug!("handshake S2 complete");

    // S3: SECURE_KEY, wrapping a freshly generated AES session key/IV.
    let (key, iv) = crypto::random_session_key();
    let secret = crypto::rsa_wrap(public_key_pem, &key, &iv)?;
    send_plain(&mut sink, MessageType::SecureKey, serde_json::json!({ "secret": secret })).await?;

    // From here on, all frames are encrypted (§4.4 S3 note); build the
    // connection now so the rest of the handshake flows through it.
    let connection = SecureConnection::new(sink, key, iv, device_id.clone());

    let s3_response = connection
        .recv_frame(&mut stream)
        .await?
        .ok_or_else(|| BridgeError::Transport("connection closed awaiting SECURE_READY".to_string()))?;
    expect_type(&s3_response, MessageType::SecureReady)?;
    info!("secure session established");

    // S4: LOGIN_SUBMIT. This is the first frame sent through the
    // SecureConnection and so carries mc = 1 (§8).
    let salt = crypto::random_salt();
    let password = crypto::hash_password(&device_id, auth_key, &salt);
    connection
        .send_message(
            MessageType::LoginSubmit,
            serde_json::json!({ "username": "default", "password": password, "salt": salt }),
        )
        .await?;
    let s4 = connection
        .recv_frame(&mut stream)
        .await?
        .ok_or_else(|| BridgeError::Transport("connection closed awaiting LOGIN_ACCEPT".to_string()))?;
    expect_type(&s4, MessageType::LoginAccept)?;
    let token = s4
        .payload
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Transport("LOGIN_ACCEPT missing token".to_string()))?
        .to_string();
    debug!("handshake S4 complete");

    // S5: TOKEN_VALIDATE — any response frame acks the token.
    connection
        .send_message(MessageType::TokenValidate, serde_json::json!({ "token": token }))
        .await?;
    connection.recv_frame(&mut stream).await?;
    debug!("handshake S5 complete");

    // S6: TOKEN_RENEW, expect a fresh token.
    connection
        .send_message(MessageType::TokenRenew, serde_json::json!({ "token": token }))
        .await?;
    let s6 = connection
        .recv_frame(&mut stream)
        .await?
        .ok_or_else(|| BridgeError::Transport("connection closed awaiting TOKEN_RENEWED".to_string()))?;
    expect_type(&s6, MessageType::TokenRenewed)?;
    let new_token = s6
        .payload
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Transport("TOKEN_RENEWED missing token".to_string()))?
        .to_string();
    debug!("handshake S6 complete");

    // S7: TOKEN_VALIDATE with the renewed token completes the handshake.
    connection
        .send_message(MessageType::TokenValidate, serde_json::json!({ "token": new_token }))
        .await?;
    connection.recv_frame(&mut stream).await?;
    info!(device_id, "handshake complete");

    Ok(HandshakeOutcome { connection, stream, device_id })
}

fn expect_type(envelope: &Envelope, expected: MessageType) -> Result<()> {
    if envelope.type_int != expected {
        return Err(BridgeError::HandshakeProtocolError {
            expected: expected.to_i64(),
            actual: envelope.type_int.to_i64(),
        });
    }
    Ok(())
}

async fn send_plain(
    sink: &mut futures::stream::SplitSink<WsStream, Message>,
    type_int: MessageType,
    payload: Value,
) -> Result<()> {
    let envelope = Envelope::new(type_int, HANDSHAKE_MC, payload);
    let json = serde_json::to_string(&envelope)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_type_accepts_matching_type() {
        let envelope = Envelope::new(MessageType::SecureReady, HANDSHAKE_MC, serde_json::json!({}));
        assert!(expect_type(&envelope, MessageType::SecureReady).is_ok());
    }

    #[test]
    fn expect_type_rejects_mismatch_with_both_codes() {
        let envelope = Envelope::new(MessageType::Nack, HANDSHAKE_MC, serde_json::json!({}));
        let err = expect_type(&envelope, MessageType::LoginAccept).unwrap_err();
        match err {
            BridgeError::HandshakeProtocolError { expected, actual } => {
                assert_eq!(expected, MessageType::LOGIN_ACCEPT);
                assert_eq!(actual, MessageType::NACK);
            }
            other => panic!("expected HandshakeProtocolError, got {other:?}"),
        }
    }
}

async fn recv_plain(stream: &mut SplitStream<WsStream>) -> Result<Value> {
    loop {
        let message = stream
            .next()
            .await
            .ok_or_else(|| BridgeError::Transport("connection closed during handshake".to_string()))??;
        match message {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Binary(data) => return Ok(serde_json::from_slice(&data)?),
            Message::Close(_) => {
                return Err(BridgeError::Transport("connection closed during handshake".to_string()));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        }
    }
}
