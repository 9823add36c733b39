//! Verification code delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{config::SmsConfig, prelude::*};

pub const SUBMAIL_SEND_URL: &str = "https://api-v4.mysubmail.com/message/send.json";

pub fn message(code: &str) -> String {
  format!("【PhotoTree】您的验证码是{code}，5分钟内有效。")
}

#[async_trait]
pub trait SmsSender: Send + Sync {
  async fn send(&self, phone: &str, code: &str) -> Result<()>;
}

pub fn from_config(config: &SmsConfig) -> Result<Arc<dyn SmsSender>> {
  Ok(match config {
    SmsConfig::Mock => Arc::new(LogSms),
    SmsConfig::Submail { app_id, app_key } => {
      Arc::new(Submail::new(app_id.clone(), app_key.clone())?)
    }
  })
}

/// Development sender: the code only goes to the log.
pub struct LogSms;

#[async_trait]
impl SmsSender for LogSms {
  async fn send(&self, phone: &str, code: &str) -> Result<()> {
    info!("[SMS mock] {} <- {}", phone, message(code));
    Ok(())
  }
}

pub struct Submail {
  client: Client,
  app_id: String,
  app_key: String,
}

#[derive(Debug, Deserialize)]
struct SubmailResponse {
  status: String,
  #[serde(default)]
  send_id: Option<String>,
  #[serde(default)]
  msg: Option<String>,
}

impl Submail {
  pub fn new(app_id: String, app_key: String) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { client, app_id, app_key })
  }
}

#[async_trait]
impl SmsSender for Submail {
  async fn send(&self, phone: &str, code: &str) -> Result<()> {
    let content = message(code);
    let params = [
      ("appid", self.app_id.as_str()),
      ("to", phone),
      ("content", content.as_str()),
      ("signature", self.app_key.as_str()),
    ];

    let response: SubmailResponse = self
      .client
      .post(SUBMAIL_SEND_URL)
      .form(&params)
      .send()
      .await?
      .json()
      .await?;

    if response.status != "success" {
      return Err(Error::Sms(
        response.msg.unwrap_or_else(|| "SUBMAIL send failed".into()),
      ));
    }

    debug!("SUBMAIL sent to {}, send_id {:?}", phone, response.send_id);
    Ok(())
  }
}
