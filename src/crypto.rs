//! Cryptography primitives for the xComfort bridge handshake and transport.
//!
//! Thin wrappers around `aes`/`cbc`, `rsa`, and `sha2`. None of the
//! primitives themselves are reimplemented here; this module only encodes
//! the bridge's specific framing choices (zero-padding instead of PKCS#7,
//! the `hex(key):::hex(iv)` RSA payload, the salted double-SHA256 password
//! scheme).

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey, pkcs8::DecodePublicKey};
use sha2::{Digest, Sha256};

use crate::error::BridgeError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Sentinel byte appended to every encrypted outbound text frame.
pub const FRAME_TERMINATOR: u8 = 0x04;

/// Encrypt `plaintext` with AES-256-CBC after zero-padding it to a 16-byte
/// boundary, then base64-encode and append the [`FRAME_TERMINATOR`] byte.
///
/// This is the exact shape of bytes sent over the WebSocket as a text
/// frame (§4.2, §6).
pub fn encrypt_frame(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let ciphertext = aes_encrypt(key, iv, plaintext);
    let mut out = base64_encode(&ciphertext).into_bytes();
    out.push(FRAME_TERMINATOR);
    out
}

/// Decrypt a base64 ciphertext (with or without the trailing
/// [`FRAME_TERMINATOR`]) back into zero-trimmed plaintext bytes.
pub fn decrypt_frame(key: &[u8; 32], iv: &[u8; 16], frame: &[u8]) -> Result<Vec<u8>, BridgeError> {
    let trimmed = frame
        .strip_suffix(&[FRAME_TERMINATOR])
        .unwrap_or(frame);
    let ciphertext = base64_decode(trimmed).map_err(|e| BridgeError::Crypto(e.to_string()))?;
    Ok(aes_decrypt(key, iv, &ciphertext))
}

/// AES-256-CBC encrypt with zero-padding (not PKCS#7): the plaintext is
/// right-padded with `0x00` bytes to the next 16-byte boundary.
pub fn aes_encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut padded = plaintext.to_vec();
    let pad_len = (16 - (padded.len() % 16)) % 16;
    padded.extend(std::iter::repeat_n(0u8, pad_len));

    let mut encryptor = Aes256CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    let mut buf = padded;
    for chunk in buf.chunks_mut(16) {
        let block = GenericArray::from_mut_slice(chunk);
        encryptor.encrypt_block_mut(block);
    }
    buf
}

/// AES-256-CBC decrypt, stripping trailing zero bytes left by zero-padding.
pub fn aes_decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Vec<u8> {
    let mut decryptor = Aes256CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    let mut buf = ciphertext.to_vec();
    for chunk in buf.chunks_mut(16) {
        let block = GenericArray::from_mut_slice(chunk);
        decryptor.decrypt_block_mut(block);
    }
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    buf.truncate(end);
    buf
}

/// Parse a PEM-encoded RSA public key and PKCS#1 v1.5-encrypt the ASCII
/// string `hex(key) + ":::" + hex(iv)`, then base64-encode the result.
///
/// This is the `SECURE_KEY` (S3) handshake payload (§4.2, §4.4).
pub fn rsa_wrap(pem_public_key: &str, key: &[u8; 32], iv: &[u8; 16]) -> Result<String, BridgeError> {
    let public_key = RsaPublicKey::from_public_key_pem(pem_public_key)
        .map_err(|e| BridgeError::Crypto(format!("invalid RSA public key: {e}")))?;

    let secret = format!("{}:::{}", hex::encode(key), hex::encode(iv));

    let mut rng = rand::rngs::OsRng;
    let encrypted = public_key
        .encrypt(&mut rng, Pkcs1v15Encrypt, secret.as_bytes())
        .map_err(|e| BridgeError::Crypto(format!("RSA encryption failed: {e}")))?;

    Ok(base64_encode(&encrypted))
}

/// `SHA256( salt || HEX_LOWER( SHA256( device_id || auth_key ) ) )`, itself
/// lowercase-hex-encoded. This is the password sent in `LOGIN_SUBMIT` (S4).
pub fn hash_password(device_id: &str, auth_key: &str, salt: &str) -> String {
    let inner = sha256_hex(format!("{device_id}{auth_key}").as_bytes());
    sha256_hex(format!("{salt}{inner}").as_bytes())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A fresh 32-byte AES key and 16-byte IV, drawn from a CSPRNG. Lifetime is
/// one connection (§3).
pub fn random_session_key() -> ([u8; 32], [u8; 16]) {
    let mut rng = rand::rngs::OsRng;
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    rng.fill(&mut key);
    rng.fill(&mut iv);
    (key, iv)
}

/// A 12-character salt drawn uniformly from `[A-Za-z0-9]` (§4.2).
pub fn random_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(data: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data)
}
