//! Operator endpoints, all behind [`Admin`].

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;

use super::{Admin, Success, ok};
use crate::{
  prelude::*,
  state::AppState,
  sv::{Referral, referral::NewReferral},
};

#[derive(Debug, Deserialize)]
pub struct ForceVipReq {
  #[serde(default)]
  pub openid: String,
}

/// Manual entitlement after a payment confirmed out of band.
pub async fn force_vip(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Json(req): Json<ForceVipReq>,
) -> Result<Json<Success<json::Value>>> {
  let openid = req.openid.trim();
  if openid.is_empty() {
    return Err(Error::InvalidArgs("Missing openid".into()));
  }

  warn!("Manually upgrading {} to VIP", openid);
  if !app.sv().user.grant_vip(openid).await? {
    return Err(Error::UserNotFound);
  }
  Ok(ok(json::json!({ "message": "User is now Premium" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralReq {
  #[serde(default)]
  pub code: Option<String>,
  #[serde(default)]
  pub owner_name: String,
  #[serde(default)]
  pub owner_contact: Option<String>,
  #[serde(default)]
  pub owner_openid: Option<String>,
  #[serde(default)]
  pub commission_rate: i32,
}

pub async fn create_referral(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Json(req): Json<CreateReferralReq>,
) -> Result<Json<Success<json::Value>>> {
  let referral = app
    .sv()
    .referral
    .create(NewReferral {
      code: req.code,
      owner_name: req.owner_name,
      owner_contact: req.owner_contact,
      owner_openid: req.owner_openid,
      commission_rate: req.commission_rate,
    })
    .await?;

  let url = Referral::url(&app.config.site_url, &referral.code);
  Ok(ok(json::json!({ "referral": referral, "url": url })))
}

#[derive(Debug, Deserialize)]
pub struct BindReceiverReq {
  #[serde(default)]
  pub openid: String,
  #[serde(default)]
  pub percentage: i32,
}

pub async fn bind_receiver(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Path(code): Path<String>,
  Json(req): Json<BindReceiverReq>,
) -> Result<Json<Success<json::Value>>> {
  let referral = app
    .sv()
    .referral
    .bind_receiver(app.pay()?, &code, req.openid.trim(), req.percentage)
    .await?;
  Ok(ok(json::json!({ "referral": referral })))
}

pub async fn records(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Path(code): Path<String>,
) -> Result<Json<Success<json::Value>>> {
  let records = app.sv().referral.records(&code).await?;
  Ok(ok(json::json!({ "records": records })))
}

#[derive(Debug, Deserialize)]
pub struct IssueRedemptionReq {
  #[serde(default)]
  pub count: usize,
}

pub async fn issue_redemption(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Json(req): Json<IssueRedemptionReq>,
) -> Result<Json<Success<json::Value>>> {
  let codes = app.sv().redemption.issue(req.count).await?;
  Ok(ok(json::json!({ "codes": codes })))
}
