//! Phone verification login and signed session tokens.

use hmac::{Hmac, Mac};
use sea_orm::sea_query::Expr;
use sha2::Sha256;

use super::user::User;
use crate::{
  entity::{sms_code, user},
  prelude::*,
  sms::SmsSender,
  utils,
};

type HmacSha256 = Hmac<Sha256>;

pub const SMS_CODE_LEN: usize = 6;
pub const SMS_CODE_TTL: TimeDelta = TimeDelta::minutes(5);
pub const SMS_RESEND_COOLDOWN: TimeDelta = TimeDelta::seconds(60);
pub const TOKEN_TTL: TimeDelta = TimeDelta::days(30);

/// Mainland mobile number: `1[3-9]` followed by nine digits.
pub fn validate_phone(phone: &str) -> bool {
  let bytes = phone.as_bytes();
  bytes.len() == 11
    && bytes[0] == b'1'
    && (b'3'..=b'9').contains(&bytes[1])
    && bytes.iter().all(u8::is_ascii_digit)
}

pub struct Auth<'a> {
  db: &'a DatabaseConnection,
  secret: &'a str,
}

impl<'a> Auth<'a> {
  pub fn new(db: &'a DatabaseConnection, secret: &'a str) -> Self {
    Self { db, secret }
  }

  pub async fn send_code(&self, sms: &dyn SmsSender, phone: &str) -> Result<()> {
    if !validate_phone(phone) {
      return Err(Error::InvalidArgs("手机号格式不正确".into()));
    }

    let now = utils::now();
    let recent = sms_code::Entity::find()
      .filter(sms_code::Column::Phone.eq(phone))
      .filter(sms_code::Column::CreatedAt.gt(now - SMS_RESEND_COOLDOWN))
      .count(self.db)
      .await?;
    if recent > 0 {
      return Err(Error::SmsTooFrequent);
    }

    let code = utils::random_digits(SMS_CODE_LEN);
    sms_code::ActiveModel {
      id: NotSet,
      phone: Set(phone.to_string()),
      code: Set(code.clone()),
      used: Set(false),
      expires_at: Set(now + SMS_CODE_TTL),
      created_at: Set(now),
    }
    .insert(self.db)
    .await?;

    sms.send(phone, &code).await?;
    info!("Verification code sent to {}", phone);
    Ok(())
  }

  /// Consumes the newest matching code. A code verifies at most once.
  pub async fn verify_code(&self, phone: &str, code: &str) -> Result<()> {
    let candidate = sms_code::Entity::find()
      .filter(sms_code::Column::Phone.eq(phone))
      .filter(sms_code::Column::Code.eq(code))
      .filter(sms_code::Column::Used.eq(false))
      .filter(sms_code::Column::ExpiresAt.gt(utils::now()))
      .order_by_desc(sms_code::Column::Id)
      .one(self.db)
      .await?
      .ok_or(Error::InvalidSmsCode)?;

    let result = sms_code::Entity::update_many()
      .col_expr(sms_code::Column::Used, Expr::value(true))
      .filter(sms_code::Column::Id.eq(candidate.id))
      .filter(sms_code::Column::Used.eq(false))
      .exec(self.db)
      .await?;

    if result.rows_affected == 0 {
      return Err(Error::InvalidSmsCode);
    }
    Ok(())
  }

  pub async fn login_phone(
    &self,
    phone: &str,
    code: &str,
    referrer_code: Option<&str>,
    device_type: Option<String>,
  ) -> Result<(String, user::Model)> {
    if !validate_phone(phone) || code.trim().is_empty() {
      return Err(Error::InvalidArgs("手机号或验证码格式不正确".into()));
    }
    self.verify_code(phone, code.trim()).await?;

    let user =
      User::new(self.db).login_phone(phone, device_type, referrer_code).await?;
    let token = self.issue_token(user.id)?;

    info!("User {} logged in by phone", user.id);
    Ok((token, user))
  }

  pub async fn bind_wechat(
    &self,
    token: &str,
    openid: &str,
  ) -> Result<user::Model> {
    let user_id = self.verify_token(token)?;
    let user = User::new(self.db).bind_openid(user_id, openid).await?;
    info!("User {} bound wechat {}", user_id, openid);
    Ok(user)
  }

  /// `user_id.issued_at.hmac_hex`
  pub fn issue_token(&self, user_id: i32) -> Result<String> {
    self.token_at(user_id, Utc::now().timestamp())
  }

  fn token_at(&self, user_id: i32, issued_at: i64) -> Result<String> {
    let payload = format!("{user_id}.{issued_at}");
    let mut mac = self.mac()?;
    mac.update(payload.as_bytes());
    Ok(format!("{payload}.{}", hex::encode(mac.finalize().into_bytes())))
  }

  pub fn verify_token(&self, token: &str) -> Result<i32> {
    let mut parts = token.trim().splitn(3, '.');
    let (Some(user_id), Some(issued_at), Some(signature)) =
      (parts.next(), parts.next(), parts.next())
    else {
      return Err(Error::Unauthorized);
    };

    let signature = hex::decode(signature).map_err(|_| Error::Unauthorized)?;
    let mut mac = self.mac()?;
    mac.update(format!("{user_id}.{issued_at}").as_bytes());
    mac.verify_slice(&signature).map_err(|_| Error::Unauthorized)?;

    let issued_at: i64 = issued_at.parse().map_err(|_| Error::Unauthorized)?;
    if Utc::now().timestamp() - issued_at > TOKEN_TTL.num_seconds() {
      return Err(Error::Unauthorized);
    }
    user_id.parse().map_err(|_| Error::Unauthorized)
  }

  fn mac(&self) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(self.secret.as_bytes())
      .map_err(|err| Error::Internal(format!("hmac key: {err}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    sms::tests::Outbox,
    sv::{test_utils::test_db, user::Profile},
  };

  const SECRET: &str = "test-secret";

  fn last_code(outbox: &Outbox) -> String {
    outbox.sent.lock().unwrap().last().unwrap().1.clone()
  }

  #[test]
  fn test_validate_phone() {
    assert!(validate_phone("13800138000"));
    assert!(validate_phone("19912345678"));
    assert!(!validate_phone("12800138000"));
    assert!(!validate_phone("1380013800"));
    assert!(!validate_phone("1380013800a"));
    assert!(!validate_phone("+8613800138"));
  }

  #[tokio::test]
  async fn test_send_code_cooldown() {
    let db = test_db::setup().await;
    let outbox = Outbox::default();
    let auth = Auth::new(&db, SECRET);

    auth.send_code(&outbox, "13800138000").await.unwrap();
    assert!(matches!(
      auth.send_code(&outbox, "13800138000").await,
      Err(Error::SmsTooFrequent)
    ));
    assert!(matches!(
      auth.send_code(&outbox, "123").await,
      Err(Error::InvalidArgs(_))
    ));

    let code = last_code(&outbox);
    assert_eq!(code.len(), SMS_CODE_LEN);
    assert!(code.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(outbox.sent.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_login_phone_consumes_code_once() {
    let db = test_db::setup().await;
    let outbox = Outbox::default();
    let auth = Auth::new(&db, SECRET);
    auth.send_code(&outbox, "13800138000").await.unwrap();
    let code = last_code(&outbox);

    let (token, user) =
      auth.login_phone("13800138000", &code, None, None).await.unwrap();
    assert_eq!(user.phone.as_deref(), Some("13800138000"));
    assert_eq!(auth.verify_token(&token).unwrap(), user.id);

    assert!(matches!(
      auth.login_phone("13800138000", &code, None, None).await,
      Err(Error::InvalidSmsCode)
    ));
  }

  #[tokio::test]
  async fn test_expired_code_is_rejected() {
    let db = test_db::setup().await;
    let past = utils::now() - TimeDelta::minutes(10);
    sms_code::ActiveModel {
      id: NotSet,
      phone: Set("13800138000".into()),
      code: Set("111111".into()),
      used: Set(false),
      expires_at: Set(past + SMS_CODE_TTL),
      created_at: Set(past),
    }
    .insert(&db)
    .await
    .unwrap();

    let result = Auth::new(&db, SECRET).verify_code("13800138000", "111111").await;
    assert!(matches!(result, Err(Error::InvalidSmsCode)));
  }

  #[test]
  fn test_token_tampering_and_expiry() {
    let db = DatabaseConnection::Disconnected;
    let auth = Auth::new(&db, SECRET);

    let token = auth.issue_token(42).unwrap();
    assert_eq!(auth.verify_token(&token).unwrap(), 42);

    let forged = token.replacen("42.", "43.", 1);
    assert!(matches!(auth.verify_token(&forged), Err(Error::Unauthorized)));
    assert!(matches!(
      Auth::new(&db, "other").verify_token(&token),
      Err(Error::Unauthorized)
    ));

    let stale = Utc::now().timestamp() - TOKEN_TTL.num_seconds() - 1;
    let expired = auth.token_at(42, stale).unwrap();
    assert!(matches!(auth.verify_token(&expired), Err(Error::Unauthorized)));
    assert!(matches!(auth.verify_token("garbage"), Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn test_bind_wechat() {
    let db = test_db::setup().await;
    let auth = Auth::new(&db, SECRET);
    let users = User::new(&db);
    users.login_openid("o-taken", Profile::default(), None).await.unwrap();
    let phone_user = users.login_phone("13800138000", None, None).await.unwrap();
    let token = auth.issue_token(phone_user.id).unwrap();

    assert!(matches!(
      auth.bind_wechat(&token, "o-taken").await,
      Err(Error::AlreadyBound)
    ));
    let user = auth.bind_wechat(&token, "o-new").await.unwrap();
    assert_eq!(user.openid.as_deref(), Some("o-new"));
    assert!(matches!(
      auth.bind_wechat("1.2.bad", "o-new").await,
      Err(Error::Unauthorized)
    ));
  }
}
