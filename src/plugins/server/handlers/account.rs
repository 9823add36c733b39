use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, header::USER_AGENT},
  response::Redirect,
};
use serde::Deserialize;

use super::{Success, ok};
use crate::{
  prelude::*,
  state::AppState,
  sv::{tracking::PageView, user::Profile},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReq {
  #[serde(default)]
  pub code: Option<String>,
  #[serde(default)]
  pub referrer_code: Option<String>,
}

/// Development login: `dev_*` codes map to mock users.
pub async fn login(
  State(app): State<Arc<AppState>>,
  Json(req): Json<LoginReq>,
) -> Result<Json<Success<json::Value>>> {
  let openid = match req.code.as_deref() {
    None | Some("") => format!("dev_user_{}", Utc::now().timestamp_millis()),
    Some(code) if code.starts_with("dev_") => format!("user_{code}"),
    Some(_) => {
      return Err(Error::InvalidArgs("Use Website QR Login instead".into()));
    }
  };

  let user = app
    .sv()
    .user
    .login_openid(&openid, Profile::default(), req.referrer_code.as_deref())
    .await?;
  Ok(ok(json::json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
  #[serde(default)]
  pub code: Option<String>,
  #[serde(default)]
  pub state: Option<String>,
}

/// WeChat QR login callback. Every path ends in a redirect to the site root.
pub async fn wechat_callback(
  State(app): State<Arc<AppState>>,
  Query(query): Query<CallbackQuery>,
) -> Redirect {
  let Some(code) = query.code.filter(|c| !c.is_empty()) else {
    return Redirect::to("/?error=no_code");
  };
  let Some(oauth) = &app.oauth else {
    error!("OAuth callback received but WECHAT_APP_SECRET is not set");
    return Redirect::to("/?error=oauth_not_configured");
  };

  let identity = match oauth.exchange(&code).await {
    Ok(identity) => identity,
    Err(err) => {
      error!("WeChat OAuth failed: {}", err);
      return Redirect::to("/?error=wechat_api_error");
    }
  };

  let login = app
    .sv()
    .user
    .login_openid(&identity.openid, identity.profile, query.state.as_deref())
    .await;

  match login {
    Ok(user) => {
      let openid = user.openid.unwrap_or(identity.openid);
      Redirect::to(&format!("/?openid={openid}&login_success=true"))
    }
    Err(err) => {
      error!("Login after OAuth failed: {}", err);
      Redirect::to("/?error=system_error")
    }
  }
}

pub async fn get_user(
  State(app): State<Arc<AppState>>,
  Path(openid): Path<String>,
) -> Result<Json<Success<json::Value>>> {
  let user =
    app.sv().user.by_openid(&openid).await?.ok_or(Error::UserNotFound)?;
  Ok(ok(json::json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct SendCodeReq {
  #[serde(default)]
  pub phone: String,
}

pub async fn send_code(
  State(app): State<Arc<AppState>>,
  Json(req): Json<SendCodeReq>,
) -> Result<Json<Success<json::Value>>> {
  app.sv().auth.send_code(app.sms.as_ref(), req.phone.trim()).await?;
  Ok(ok(json::json!({ "message": "验证码已发送" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPhoneReq {
  #[serde(default)]
  pub phone: String,
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub referrer_code: Option<String>,
  #[serde(default)]
  pub device_type: Option<String>,
}

pub async fn login_phone(
  State(app): State<Arc<AppState>>,
  Json(req): Json<LoginPhoneReq>,
) -> Result<Json<Success<json::Value>>> {
  let (token, user) = app
    .sv()
    .auth
    .login_phone(
      req.phone.trim(),
      &req.code,
      req.referrer_code.as_deref(),
      req.device_type,
    )
    .await?;
  Ok(ok(json::json!({ "token": token, "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct BindWechatReq {
  #[serde(default)]
  pub token: String,
  #[serde(default)]
  pub openid: String,
}

pub async fn bind_wechat(
  State(app): State<Arc<AppState>>,
  Json(req): Json<BindWechatReq>,
) -> Result<Json<Success<json::Value>>> {
  let user = app.sv().auth.bind_wechat(&req.token, req.openid.trim()).await?;
  Ok(ok(json::json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewReq {
  #[serde(default)]
  pub session_id: String,
  #[serde(default)]
  pub referrer_code: Option<String>,
  #[serde(default)]
  pub device_type: Option<String>,
  #[serde(default)]
  pub user_agent: Option<String>,
}

pub async fn track_pv(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(req): Json<PageViewReq>,
) -> Result<Json<Success<json::Value>>> {
  let user_agent = req.user_agent.or_else(|| {
    headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(Into::into)
  });

  app
    .sv()
    .tracking
    .page_view(PageView {
      session_id: req.session_id,
      referrer_code: req.referrer_code,
      device_type: req.device_type,
      user_agent,
    })
    .await?;
  Ok(ok(json::json!({})))
}

#[derive(Debug, Deserialize)]
pub struct RedeemReq {
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub openid: String,
}

pub async fn redeem(
  State(app): State<Arc<AppState>>,
  Json(req): Json<RedeemReq>,
) -> Result<Json<Success<json::Value>>> {
  let expiry = app.sv().redemption.redeem(&req.code, req.openid.trim()).await?;
  Ok(ok(json::json!({ "vipExpireAt": expiry })))
}
