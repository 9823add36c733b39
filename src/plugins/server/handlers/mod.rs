pub mod account;
pub mod admin;
pub mod pay;
pub mod referral;

use std::sync::Arc;

use axum::{Json, extract::FromRequestParts, http::request::Parts};
use serde::Serialize;

use crate::{prelude::*, state::AppState};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// `{ "success": true, ...data }`
#[derive(Debug, Serialize)]
pub struct Success<T> {
  success: bool,
  #[serde(flatten)]
  data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Success<T>> {
  Json(Success { success: true, data })
}

pub async fn health() -> &'static str {
  "OK"
}

/// Passes only when `x-admin-token` matches the configured admin token.
pub struct Admin;

impl FromRequestParts<Arc<AppState>> for Admin {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    let given =
      parts.headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());

    match (app.config.admin_token.as_deref(), given) {
      (Some(expected), Some(given)) if expected == given => Ok(Admin),
      _ => {
        warn!("Rejected admin request to {}", parts.uri.path());
        Err(Error::Unauthorized)
      }
    }
  }
}
