use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use sea_orm::DbErr;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(String),
  #[error("decryption failed: {0}")]
  Decryption(String),
  #[error("payment provider rejected request ({status}): {message}")]
  Provider { status: u16, message: String, details: json::Value },
  #[error("http request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("json error: {0}")]
  Json(#[from] json::Error),
  #[error("database error: {0}")]
  Db(#[from] DbErr),
  #[error("{0}")]
  InvalidArgs(String),
  #[error("user not found")]
  UserNotFound,
  #[error("referral code not found")]
  ReferralNotFound,
  #[error("redemption code not found")]
  RedemptionNotFound,
  #[error("redemption code already used")]
  RedemptionUsed,
  #[error("invalid or expired verification code")]
  InvalidSmsCode,
  #[error("verification code requested too frequently")]
  SmsTooFrequent,
  #[error("sms delivery failed: {0}")]
  Sms(String),
  #[error("wechat oauth failed: {0}")]
  OAuth(String),
  #[error("wechat account already bound to another user")]
  AlreadyBound,
  #[error("unauthorized")]
  Unauthorized,
  #[error("payment is not configured")]
  PayDisabled,
  #[error("internal error: {0}")]
  Internal(String),
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::InvalidArgs(_) | Error::InvalidSmsCode => StatusCode::BAD_REQUEST,
      Error::Unauthorized => StatusCode::UNAUTHORIZED,
      Error::UserNotFound
      | Error::ReferralNotFound
      | Error::RedemptionNotFound => StatusCode::NOT_FOUND,
      Error::RedemptionUsed | Error::AlreadyBound => StatusCode::CONFLICT,
      Error::SmsTooFrequent => StatusCode::TOO_MANY_REQUESTS,
      Error::Provider { .. } | Error::Http(_) | Error::OAuth(_) | Error::Sms(_) => {
        StatusCode::BAD_GATEWAY
      }
      Error::PayDisabled => StatusCode::SERVICE_UNAVAILABLE,
      Error::Config(_)
      | Error::Decryption(_)
      | Error::Json(_)
      | Error::Db(_)
      | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Text shown to end users. Internal failures stay opaque.
  pub fn public_message(&self) -> String {
    match self {
      Error::RedemptionNotFound => "兑换码不存在".into(),
      Error::RedemptionUsed => "兑换码已被使用".into(),
      Error::InvalidSmsCode => "验证码错误或已过期".into(),
      Error::SmsTooFrequent => "验证码发送过于频繁，请稍后再试".into(),
      Error::PayDisabled => {
        "WeChat Pay not configured. Please contact administrator.".into()
      }
      Error::Config(_)
      | Error::Decryption(_)
      | Error::Json(_)
      | Error::Db(_)
      | Error::Internal(_) => "internal server error".into(),
      other => other.to_string(),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!("request failed: {self}");
    }

    let mut body = json::json!({
      "success": false,
      "error": self.public_message(),
    });
    if let Error::Provider { details, .. } = self {
      body["details"] = details;
    }

    (status, Json(body)).into_response()
  }
}
