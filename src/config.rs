use std::{env, fmt};

use crate::{prelude::*, wxpay::normalize_private_key};

pub const DEFAULT_PAY_BASE_URL: &str = "https://api.mch.weixin.qq.com";
pub const DEFAULT_ORDER_DESCRIPTION: &str = "Premium Product - Lifetime Access";
pub const DEFAULT_APP_TAG: &str = "phototree";

/// Credentials that must all be present for payment to be enabled.
const PAY_REQUIRED: [&str; 4] = [
  "WECHAT_APP_ID",
  "WECHAT_MCH_ID",
  "WECHAT_CERT_SERIAL_NO",
  "WECHAT_PRIVATE_KEY",
];

fn var(name: &str) -> Option<String> {
  env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct Config {
  pub port: u16,
  pub database_url: String,
  /// Public origin of the site, used for referral links and redirects.
  pub site_url: String,
  pub admin_token: Option<String>,
  pub server_secret: String,
  pub oauth: Option<OAuthConfig>,
  pub sms: SmsConfig,
  pub pay: Option<PayConfig>,
  /// 32-byte symmetric key for callback decryption. Independent of the
  /// merchant signing credentials in [`PayConfig`].
  pub api_v3_key: Option<String>,
  /// Why payment is disabled when credentials were only partially given.
  pub pay_error: Option<String>,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let site_url = var("SITE_URL")
      .unwrap_or_else(|| "http://localhost:3000".into())
      .trim_end_matches('/')
      .to_string();

    let server_secret = var("SERVER_SECRET")
      .ok_or_else(|| Error::Config("SERVER_SECRET not set".into()))?;

    let oauth = match (var("WECHAT_APP_ID"), var("WECHAT_APP_SECRET")) {
      (Some(app_id), Some(app_secret)) => {
        Some(OAuthConfig { app_id, app_secret })
      }
      _ => None,
    };

    let sms = match var("SMS_PROVIDER").as_deref() {
      Some("submail") => SmsConfig::Submail {
        app_id: var("SUBMAIL_APP_ID")
          .ok_or_else(|| Error::Config("SUBMAIL_APP_ID not set".into()))?,
        app_key: var("SUBMAIL_APP_KEY")
          .ok_or_else(|| Error::Config("SUBMAIL_APP_KEY not set".into()))?,
      },
      Some("mock") | None => SmsConfig::Mock,
      Some(other) => {
        return Err(Error::Config(format!("unknown SMS_PROVIDER `{other}`")));
      }
    };

    let (pay, pay_error) = match PayConfig::from_env(&site_url) {
      Ok(pay) => (pay, None),
      Err(err) => (None, Some(err.to_string())),
    };

    let api_v3_key = api_v3_key(var("WECHAT_API_V3_KEY"))?;

    Ok(Self {
      port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
      database_url: var("DATABASE_URL")
        .unwrap_or_else(|| "sqlite:phototree.db?mode=rwc".into()),
      site_url,
      admin_token: var("ADMIN_TOKEN"),
      server_secret,
      oauth,
      sms,
      pay,
      api_v3_key,
      pay_error,
    })
  }

  /// Presence of each payment credential, for diagnostics only.
  pub fn pay_env_report() -> Vec<(&'static str, bool)> {
    PAY_REQUIRED
      .iter()
      .chain(["WECHAT_API_V3_KEY"].iter())
      .map(|name| (*name, var(name).is_some()))
      .collect()
  }
}

fn api_v3_key(raw: Option<String>) -> Result<Option<String>> {
  match raw {
    Some(key) if key.len() != 32 => Err(Error::Config(format!(
      "WECHAT_API_V3_KEY must be 32 bytes, got {}",
      key.len()
    ))),
    key => Ok(key),
  }
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
  pub app_id: String,
  pub app_secret: String,
}

#[derive(Debug, Clone)]
pub enum SmsConfig {
  Mock,
  Submail { app_id: String, app_key: String },
}

/// WeChat Pay V3 merchant settings, validated once at construction.
#[derive(Clone)]
pub struct PayConfig {
  pub app_id: String,
  pub mch_id: String,
  pub cert_serial_no: String,
  /// PEM text, already normalised.
  pub private_key: String,
  pub notify_url: String,
  pub base_url: String,
  pub app_tag: String,
  /// Order price in fen.
  pub order_amount: i64,
  pub order_description: String,
}

impl PayConfig {
  /// `Ok(None)` when no payment credential is configured at all.
  pub fn from_env(site_url: &str) -> Result<Option<Self>> {
    let present: Vec<_> = PAY_REQUIRED.iter().filter(|n| var(n).is_some()).collect();
    if present.is_empty() {
      return Ok(None);
    }

    let missing: Vec<_> =
      PAY_REQUIRED.iter().filter(|n| var(n).is_none()).copied().collect();
    if !missing.is_empty() {
      return Err(Error::Config(format!(
        "missing WeChat Pay credentials: {}",
        missing.join(", ")
      )));
    }

    let get = |name: &str| var(name).unwrap_or_default();
    let order_amount = match var("ORDER_AMOUNT_FEN") {
      Some(raw) => raw.parse().map_err(|_| {
        Error::Config(format!("ORDER_AMOUNT_FEN is not an integer: {raw}"))
      })?,
      None => 1,
    };

    Self::new(PayConfig {
      app_id: get("WECHAT_APP_ID"),
      mch_id: get("WECHAT_MCH_ID"),
      cert_serial_no: get("WECHAT_CERT_SERIAL_NO"),
      private_key: get("WECHAT_PRIVATE_KEY"),
      notify_url: var("WECHAT_NOTIFY_URL")
        .unwrap_or_else(|| format!("{site_url}/api/pay/notify")),
      base_url: var("WECHAT_PAY_BASE_URL")
        .unwrap_or_else(|| DEFAULT_PAY_BASE_URL.into()),
      app_tag: DEFAULT_APP_TAG.into(),
      order_amount,
      order_description: DEFAULT_ORDER_DESCRIPTION.into(),
    })
    .map(Some)
  }

  /// Validates a raw config and normalises the private key.
  pub fn new(raw: PayConfig) -> Result<Self> {
    for (name, value) in [
      ("app id", &raw.app_id),
      ("merchant id", &raw.mch_id),
      ("certificate serial", &raw.cert_serial_no),
      ("private key", &raw.private_key),
    ] {
      if value.trim().is_empty() {
        return Err(Error::Config(format!("WeChat Pay {name} is empty")));
      }
    }

    if raw.order_amount < 1 {
      return Err(Error::Config("order amount must be at least 1 fen".into()));
    }

    let private_key = normalize_private_key(&raw.private_key)?;
    Ok(Self { private_key, ..raw })
  }
}

impl fmt::Debug for PayConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PayConfig")
      .field("app_id", &self.app_id)
      .field("mch_id", &self.mch_id)
      .field("cert_serial_no", &self.cert_serial_no)
      .field("private_key", &"<redacted>")
      .field("notify_url", &self.notify_url)
      .field("base_url", &self.base_url)
      .field("order_amount", &self.order_amount)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::pay_config;

  #[test]
  fn test_new_rejects_empty_merchant_id() {
    let raw = PayConfig { mch_id: "  ".into(), ..pay_config() };
    assert!(matches!(PayConfig::new(raw), Err(Error::Config(_))));
  }

  #[test]
  fn test_api_v3_key_length() {
    assert!(matches!(api_v3_key(Some("short".into())), Err(Error::Config(_))));
    let key = crate::sv::test_utils::TEST_API_V3_KEY.to_string();
    assert_eq!(api_v3_key(Some(key.clone())).unwrap(), Some(key));
    assert_eq!(api_v3_key(None).unwrap(), None);
  }

  #[test]
  fn test_new_normalises_escaped_key() {
    let escaped = pay_config().private_key.replace('\n', "\\n");
    let raw = PayConfig { private_key: escaped, ..pay_config() };
    let config = PayConfig::new(raw).unwrap();
    assert!(config.private_key.contains("\n"));
    assert!(!config.private_key.contains("\\n"));
  }

  #[test]
  fn test_debug_redacts_secrets() {
    let shown = format!("{:?}", pay_config());
    assert!(!shown.contains("BEGIN PRIVATE KEY"));
    assert!(shown.contains("<redacted>"));
  }
}
