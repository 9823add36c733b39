//! Callback resource decryption (AEAD_AES_256_GCM).
//!
//! Never logs: key material and plaintext only flow through return values.

use aes_gcm::{Aes256Gcm, KeyInit, Nonce, Tag, aead::AeadInPlace};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::de::DeserializeOwned;

use crate::prelude::*;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Decrypts a notification resource. The decoded ciphertext carries the
/// 16-byte authentication tag as its suffix.
pub fn decrypt_resource(
  key: &[u8],
  ciphertext: &str,
  nonce: &str,
  associated_data: &str,
) -> Result<Vec<u8>> {
  if key.len() != KEY_LEN {
    return Err(Error::Decryption(format!("key must be {KEY_LEN} bytes")));
  }
  if nonce.len() != NONCE_LEN {
    return Err(Error::Decryption(format!("nonce must be {NONCE_LEN} bytes")));
  }

  let mut buffer = STANDARD
    .decode(ciphertext.trim())
    .map_err(|err| Error::Decryption(format!("ciphertext is not base64: {err}")))?;
  if buffer.len() < TAG_LEN {
    return Err(Error::Decryption("ciphertext shorter than tag".into()));
  }
  let tag = buffer.split_off(buffer.len() - TAG_LEN);

  let cipher = Aes256Gcm::new_from_slice(key)
    .map_err(|_| Error::Decryption("invalid key".into()))?;
  cipher
    .decrypt_in_place_detached(
      Nonce::from_slice(nonce.as_bytes()),
      associated_data.as_bytes(),
      &mut buffer,
      Tag::from_slice(&tag),
    )
    .map_err(|_| Error::Decryption("authentication tag mismatch".into()))?;

  Ok(buffer)
}

/// Decrypts and parses the resource as a JSON event.
pub fn decrypt_event<T: DeserializeOwned>(
  key: &[u8],
  ciphertext: &str,
  nonce: &str,
  associated_data: &str,
) -> Result<T> {
  let plaintext = decrypt_resource(key, ciphertext, nonce, associated_data)?;
  json::from_slice(&plaintext)
    .map_err(|err| Error::Decryption(format!("plaintext is not an event: {err}")))
}
