use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;

use super::{Success, ok};
use crate::{
  prelude::*,
  state::AppState,
  sv::{Referral, referral::ReferralStats},
};

#[derive(Debug, Deserialize)]
pub struct GenerateReq {
  #[serde(default)]
  pub openid: String,
}

pub async fn generate(
  State(app): State<Arc<AppState>>,
  Json(req): Json<GenerateReq>,
) -> Result<Json<Success<json::Value>>> {
  let referral = app.sv().referral.generate_for(req.openid.trim()).await?;
  let url = Referral::url(&app.config.site_url, &referral.code);
  Ok(ok(json::json!({ "code": referral.code, "url": url })))
}

pub async fn stats(
  State(app): State<Arc<AppState>>,
  Path(code): Path<String>,
) -> Result<Json<Success<ReferralStats>>> {
  Ok(ok(app.sv().referral.stats(&code).await?))
}
