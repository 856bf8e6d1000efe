//! Shared scripted-mock-bridge harness for the integration tests under
//! `tests/`. Plays the *server* side of the handshake and runtime protocol
//! (§4.3, §4.4) against a real `xcomfort_bridge::Bridge` client, using the
//! same crypto primitive crates the library itself depends on so the wire
//! bytes are genuinely AES/RSA, not a stand-in.
//!
//! Not every test binary in `tests/` exercises every helper here.
#![allow(dead_code)]

use aes::Aes256;
use base64::Engine;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
use futures::stream::{SplitSink, SplitStream, StreamExt};
use futures::SinkExt;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use xcomfort_bridge::protocol::MessageType;

const FRAME_TERMINATOR: u8 = 0x04;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type ServerWs = WebSocketStream<TcpStream>;

fn aes_encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut padded = plaintext.to_vec();
    let pad_len = (16 - (padded.len() % 16)) % 16;
    padded.extend(std::iter::repeat_n(0u8, pad_len));
    let mut encryptor = Aes256CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    for chunk in padded.chunks_mut(16) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    padded
}

fn aes_decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Vec<u8> {
    let mut decryptor = Aes256CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    let mut buf = ciphertext.to_vec();
    for chunk in buf.chunks_mut(16) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    buf.truncate(end);
    buf
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// The password the bridge is expected to send at S4, given the same
/// `device_id`/`auth_key`/`salt` it was handed (§4.2).
pub fn expected_password(device_id: &str, auth_key: &str, salt: &str) -> String {
    let inner = sha256_hex(format!("{device_id}{auth_key}").as_bytes());
    sha256_hex(format!("{salt}{inner}").as_bytes())
}

/// A scripted bridge server: one TCP listener the test can accept
/// connections from, one per simulated reconnect.
pub struct MockServer {
    listener: TcpListener,
    pub addr: String,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock bridge listener");
        let addr = listener.local_addr().expect("local_addr").to_string();
        Self { listener, addr }
    }

    pub async fn accept(&self) -> ServerSession {
        let (stream, _) = self.listener.accept().await.expect("accept TCP connection");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("WebSocket upgrade");
        let (sink, stream) = ws.split();
        ServerSession { sink, stream, key: None, iv: None }
    }
}

/// One accepted connection, driven through the handshake and then able to
/// exchange encrypted runtime frames.
pub struct ServerSession {
    sink: SplitSink<ServerWs, Message>,
    stream: SplitStream<ServerWs>,
    key: Option<[u8; 32]>,
    iv: Option<[u8; 16]>,
}

impl ServerSession {
    async fn send_plain(&mut self, value: Value) {
        let text = serde_json::to_string(&value).expect("serialize plaintext handshake frame");
        self.sink.send(Message::Text(text.into())).await.expect("send plaintext frame");
    }

    async fn recv_plain(&mut self) -> Value {
        loop {
            match self.stream.next().await.expect("stream ended during handshake").expect("ws error") {
                Message::Text(t) => return serde_json::from_str(&t).expect("parse plaintext handshake JSON"),
                Message::Binary(b) => return serde_json::from_slice(&b).expect("parse plaintext handshake JSON"),
                _ => continue,
            }
        }
    }

    pub async fn send_encrypted(&mut self, value: Value) {
        let key = self.key.expect("session key not yet established");
        let iv = self.iv.expect("session iv not yet established");
        let json = serde_json::to_vec(&value).expect("serialize encrypted frame");
        let ciphertext = aes_encrypt(&key, &iv, &json);
        let mut text = base64::engine::general_purpose::STANDARD.encode(&ciphertext).into_bytes();
        text.push(FRAME_TERMINATOR);
        let text = String::from_utf8(text).expect("base64 output is ASCII");
        self.sink.send(Message::Text(text.into())).await.expect("send encrypted frame");
    }

    /// Read and decrypt the next non-empty frame, regardless of whether it
    /// is an ACK or a dispatchable envelope — the caller inspects `type_int`.
    pub async fn recv_encrypted(&mut self) -> Value {
        let key = self.key.expect("session key not yet established");
        let iv = self.iv.expect("session iv not yet established");
        loop {
            match self.stream.next().await.expect("stream ended waiting for encrypted frame").expect("ws error") {
                Message::Text(t) => {
                    let raw = t.as_bytes();
                    let trimmed = raw.strip_suffix(&[FRAME_TERMINATOR]).unwrap_or(raw);
                    let ciphertext = base64::engine::general_purpose::STANDARD
                        .decode(trimmed)
                        .expect("decode base64 ciphertext");
                    let plain = aes_decrypt(&key, &iv, &ciphertext);
                    if plain.is_empty() {
                        continue;
                    }
                    return serde_json::from_slice(&plain).expect("parse decrypted JSON");
                }
                Message::Close(_) => panic!("peer closed while a frame was expected"),
                _ => continue,
            }
        }
    }

    /// Assert that the next encrypted frame is an ACK referencing `mc`.
    pub async fn expect_ack(&mut self, mc: i64) {
        let frame = self.recv_encrypted().await;
        assert_eq!(frame["type_int"], MessageType::ACK);
        assert_eq!(frame["ref"], mc);
    }

    /// Drive S0 through S7 and the three priming sends from the server
    /// side (§4.4, §4.3), asserting every wire shape and `mc` value the
    /// client is required to produce along the way.
    pub async fn perform_handshake(&mut self, device_id: &str, auth_key: &str, connection_id: i64) {
        // S0: initial server frame.
        self.send_plain(json!({
            "type_int": 10,
            "payload": { "device_id": device_id, "connection_id": connection_id },
        }))
        .await;

        // S1: CONNECTION_HELLO.
        let hello = self.recv_plain().await;
        assert_eq!(hello["type_int"], MessageType::CONNECTION_HELLO);
        assert_eq!(hello["mc"], -1);
        assert_eq!(hello["payload"]["client_type"], "shl-app");
        assert_eq!(hello["payload"]["client_id"], "c956e43f999f8004");
        assert_eq!(hello["payload"]["client_version"], "3.0.0");
        assert_eq!(hello["payload"]["connection_id"], connection_id);
        // Any non-CONNECTION_DECLINED reply lets the client proceed.
        self.send_plain(json!({ "type_int": MessageType::CONNECTION_HELLO, "payload": {} })).await;

        // S2: SECURE_INIT, reply with a freshly generated RSA public key.
        let secure_init = self.recv_plain().await;
        assert_eq!(secure_init["type_int"], MessageType::SECURE_INIT);
        assert_eq!(secure_init["mc"], -1);

        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate RSA key");
        let public_key = RsaPublicKey::from(&private_key);
        let pem = public_key.to_public_key_pem(LineEnding::LF).expect("encode RSA public key PEM");
        self.send_plain(json!({ "type_int": MessageType::SECURE_INIT, "payload": { "public_key": pem } })).await;

        // S3: SECURE_KEY — unwrap the RSA-wrapped session key/IV.
        let secure_key = self.recv_plain().await;
        assert_eq!(secure_key["type_int"], MessageType::SECURE_KEY);
        assert_eq!(secure_key["mc"], -1);
        let secret_b64 = secure_key["payload"]["secret"].as_str().expect("secret field is a string");
        let secret_bytes = base64::engine::general_purpose::STANDARD
            .decode(secret_b64)
            .expect("decode base64 RSA ciphertext");
        let plaintext = private_key.decrypt(Pkcs1v15Encrypt, &secret_bytes).expect("RSA decrypt secret");
        let plaintext = String::from_utf8(plaintext).expect("decrypted secret is ASCII");
        let (key_hex, iv_hex) = plaintext.split_once(":::").expect("secret has hex(key):::hex(iv) shape");
        let key_bytes = hex::decode(key_hex).expect("decode key hex");
        let iv_bytes = hex::decode(iv_hex).expect("decode iv hex");
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&iv_bytes);
        self.key = Some(key);
        self.iv = Some(iv);

        self.send_encrypted(json!({ "type_int": MessageType::SECURE_READY, "payload": {} })).await;

        // S4: LOGIN_SUBMIT — first frame through the keyed connection, mc=1.
        let login = self.recv_encrypted().await;
        assert_eq!(login["type_int"], MessageType::LOGIN_SUBMIT);
        assert_eq!(login["mc"], 1);
        assert_eq!(login["payload"]["username"], "default");
        let salt = login["payload"]["salt"].as_str().expect("salt is a string").to_string();
        let expected = expected_password(device_id, auth_key, &salt);
        assert_eq!(login["payload"]["password"], expected);
        self.send_encrypted(json!({ "type_int": MessageType::LOGIN_ACCEPT, "payload": { "token": "T1" } })).await;

        // S5: TOKEN_VALIDATE(T1), mc=2 — any reply acks it.
        let validate = self.recv_encrypted().await;
        assert_eq!(validate["type_int"], MessageType::TOKEN_VALIDATE);
        assert_eq!(validate["mc"], 2);
        assert_eq!(validate["payload"]["token"], "T1");
        self.send_encrypted(json!({ "type_int": MessageType::TOKEN_VALIDATE, "payload": {} })).await;

        // S6: TOKEN_RENEW(T1), mc=3.
        let renew = self.recv_encrypted().await;
        assert_eq!(renew["type_int"], MessageType::TOKEN_RENEW);
        assert_eq!(renew["mc"], 3);
        assert_eq!(renew["payload"]["token"], "T1");
        self.send_encrypted(json!({ "type_int": MessageType::TOKEN_RENEWED, "payload": { "token": "T2" } })).await;

        // S7: TOKEN_VALIDATE(T2), mc=4 — completes the handshake.
        let validate2 = self.recv_encrypted().await;
        assert_eq!(validate2["type_int"], MessageType::TOKEN_VALIDATE);
        assert_eq!(validate2["mc"], 4);
        assert_eq!(validate2["payload"]["token"], "T2");
        self.send_encrypted(json!({ "type_int": MessageType::TOKEN_VALIDATE, "payload": {} })).await;

        // pump() priming frames: QUERY_SESSION_STATE, QUERY_CATALOGUE, LOGIN_REQUEST.
        let qss = self.recv_encrypted().await;
        assert_eq!(qss["type_int"], MessageType::QUERY_SESSION_STATE);
        assert_eq!(qss["mc"], 5);

        let qc = self.recv_encrypted().await;
        assert_eq!(qc["type_int"], MessageType::QUERY_CATALOGUE);
        assert_eq!(qc["mc"], 6);

        let lr = self.recv_encrypted().await;
        assert_eq!(lr["type_int"], MessageType::LOGIN_REQUEST);
        assert_eq!(lr["mc"], 7);
    }
}

/// A `SET_ALL_DATA` payload carrying the given devices/rooms and, if
/// `last_item` is set, the marker that advances the bridge to `Ready`.
pub fn set_all_data(mc: i64, devices: Value, rooms: Value, last_item: bool) -> Value {
    let mut payload = json!({
        "devices": devices,
        "comps": [],
        "rooms": rooms,
        "roomHeating": [],
    });
    if last_item {
        payload["lastItem"] = json!(true);
    }
    json!({ "type_int": MessageType::SET_ALL_DATA, "mc": mc, "payload": payload })
}

pub fn set_device_state(mc: i64, device_id: u64, fields: Value) -> Value {
    let mut payload = fields;
    payload["deviceId"] = json!(device_id);
    json!({ "type_int": MessageType::SET_DEVICE_STATE, "mc": mc, "payload": payload })
}
