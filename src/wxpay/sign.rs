//! WeChat Pay V3 request signing.
//!
//! The provider authenticates every API call with an RSA-SHA256 signature
//! over `METHOD\nPATH\nTIMESTAMP\nNONCE\nBODY\n`, carried in the
//! `Authorization` header under the `WECHATPAY2-SHA256-RSA2048` schema.

use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::{
  RsaPrivateKey,
  pkcs1::DecodeRsaPrivateKey,
  pkcs1v15::SigningKey,
  pkcs8::DecodePrivateKey,
  signature::{SignatureEncoding, Signer as _},
};
use sha2::Sha256;
use uuid::Uuid;

use crate::prelude::*;

pub const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";

const PEM_MARKER: &str = "PRIVATE KEY-----";

/// Turns a configured private key into PEM text.
///
/// Precedence: literal `\n` sequences are unescaped first; then, only if no
/// PEM header is present, the value is treated as base64-encoded PEM.
pub fn normalize_private_key(raw: &str) -> Result<String> {
  let unescaped = raw.trim().replace("\\n", "\n");
  if unescaped.contains(PEM_MARKER) {
    return Ok(unescaped);
  }

  let compact: String =
    unescaped.chars().filter(|c| !c.is_whitespace()).collect();
  let decoded = STANDARD
    .decode(compact)
    .ok()
    .and_then(|bytes| String::from_utf8(bytes).ok())
    .map(|pem| pem.trim().replace("\\n", "\n"));

  match decoded {
    Some(pem) if pem.contains(PEM_MARKER) => Ok(pem),
    _ => Err(Error::Config(
      "merchant private key is neither PEM nor base64-encoded PEM".into(),
    )),
  }
}

/// Canonical string the provider expects to be signed.
pub fn canonical_message(
  method: &str,
  path: &str,
  timestamp: i64,
  nonce: &str,
  body: &str,
) -> String {
  format!("{method}\n{path}\n{timestamp}\n{nonce}\n{body}\n")
}

pub struct Signer {
  mch_id: String,
  serial_no: String,
  key: SigningKey<Sha256>,
}

impl Signer {
  pub fn new(mch_id: &str, serial_no: &str, private_key: &str) -> Result<Self> {
    if mch_id.is_empty() || serial_no.is_empty() {
      return Err(Error::Config(
        "merchant id and certificate serial are required for signing".into(),
      ));
    }

    let pem = normalize_private_key(private_key)?;
    let key = RsaPrivateKey::from_pkcs8_pem(&pem)
      .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
      .map_err(|err| {
        Error::Config(format!("invalid merchant private key: {err}"))
      })?;

    Ok(Self {
      mch_id: mch_id.to_string(),
      serial_no: serial_no.to_string(),
      key: SigningKey::<Sha256>::new(key),
    })
  }

  /// Base64 RSA-SHA256 (PKCS#1 v1.5) signature of `message`.
  pub fn sign(&self, message: &str) -> Result<String> {
    let signature = self
      .key
      .try_sign(message.as_bytes())
      .map_err(|err| Error::Internal(format!("rsa signing failed: {err}")))?;
    Ok(STANDARD.encode(signature.to_bytes()))
  }

  pub fn authorization(
    &self,
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &str,
  ) -> Result<String> {
    let message = canonical_message(method, path, timestamp, nonce, body);
    let signature = self.sign(&message)?;

    Ok(format!(
      r#"{AUTH_SCHEMA} mchid="{}",nonce_str="{nonce}",signature="{signature}",timestamp="{timestamp}",serial_no="{}""#,
      self.mch_id, self.serial_no
    ))
  }

  /// Authorization header with a fresh timestamp and nonce.
  pub fn authorize(&self, method: &str, path: &str, body: &str) -> Result<String> {
    let timestamp = Utc::now().timestamp();
    let nonce = Uuid::new_v4().simple().to_string().to_uppercase();
    self.authorization(method, path, timestamp, &nonce, body)
  }
}
