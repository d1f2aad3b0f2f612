//! # Price Payload Decryption
//!
//! The third-party price stream ships each tick encrypted with AES-256-CBC.
//! The event carries a base64 IV and a base64 ciphertext; the key is a
//! hex-encoded 32-byte secret shared out of band. The plaintext is a JSON
//! [`PricePoint`].

use aes::Aes256;
use base64::{engine::general_purpose, Engine as _};
use cbc::Decryptor;
use cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::core::errors::{StreamError, StreamResult};
use crate::models::{PriceEvent, PricePoint};

impl PriceEvent {
    /// Decrypts the payload with a hex-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// [`StreamError::Decryption`] for any encoding, key, padding or length
    /// problem; [`StreamError::Json`] when the plaintext is not a price point.
    pub fn decrypt(&self, key_hex: &str) -> StreamResult<PricePoint> {
        let plaintext = decrypt_payload(&self.iv, &self.payload, key_hex)?;
        let mut point: PricePoint = serde_json::from_slice(&plaintext)?;
        if point.symbol.is_empty() {
            point.symbol = self.symbol.clone();
        }
        if point.timestamp.is_none() {
            point.timestamp = self.timestamp;
        }
        Ok(point)
    }
}

/// Decrypts one base64 AES-256-CBC payload and strips its PKCS7 padding.
pub fn decrypt_payload(iv_b64: &str, payload_b64: &str, key_hex: &str) -> StreamResult<Vec<u8>> {
    let iv = general_purpose::STANDARD
        .decode(iv_b64.trim())
        .map_err(|e| StreamError::Decryption(format!("Invalid Base64 IV: {}", e)))?;
    let mut buf = general_purpose::STANDARD
        .decode(payload_b64.trim())
        .map_err(|e| StreamError::Decryption(format!("Invalid Base64 ciphertext: {}", e)))?;
    if buf.is_empty() {
        return Err(StreamError::Decryption("Ciphertext is empty".to_string()));
    }

    let key: [u8; 32] = hex::decode(key_hex.trim())
        .map_err(|e| StreamError::Decryption(format!("Invalid key hex: {}", e)))?
        .try_into()
        .map_err(|k: Vec<u8>| StreamError::Decryption(format!("Key must be 32 bytes, found {}", k.len())))?;
    let iv: [u8; 16] = iv
        .as_slice()
        .try_into()
        .map_err(|_| StreamError::Decryption(format!("Invalid IV length: {}", iv.len())))?;

    let decryptor = Decryptor::<Aes256>::new(&key.into(), &iv.into());
    let len = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| StreamError::Decryption(format!("Decryption failed: {:?}", e)))?
        .len();
    buf.truncate(len);
    Ok(buf)
}
