use std::sync::Arc;

use axum::{
  Json,
  body::Bytes,
  extract::State,
  http::HeaderMap,
};
use serde::Deserialize;

use super::{Success, ok};
use crate::{
  config::Config,
  prelude::*,
  state::AppState,
  wxpay::{ACK, Ack, Signer},
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderReq {
  #[serde(default)]
  pub openid: Option<String>,
}

pub async fn create_order(
  State(app): State<Arc<AppState>>,
  Json(req): Json<CreateOrderReq>,
) -> Result<Json<Success<json::Value>>> {
  let openid = req.openid.unwrap_or_default();
  if openid.trim().is_empty() {
    return Err(Error::InvalidArgs("Missing openid".into()));
  }

  let order = app.order()?.create(&openid).await.inspect_err(|err| {
    error!("Payment creation failed for {}: {}", openid, err);
  })?;

  Ok(ok(json::json!({
    "codeUrl": order.code_url,
    "orderId": order.out_trade_no,
  })))
}

/// Always acknowledges; the outcome only reaches the log.
pub async fn notify(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Json<Ack> {
  if let Some(from) =
    headers.get("x-forwarded-from").and_then(|v| v.to_str().ok())
  {
    info!("Payment notification forwarded from {}", from);
  }

  let outcome = app.notify().handle(&body).await;
  info!("Payment notification handled: {:?}", outcome);

  Json(ACK)
}

/// Reports credential presence and whether the key can sign. Never echoes
/// secret values.
pub async fn check_pay_config(
  State(app): State<Arc<AppState>>,
) -> Json<json::Value> {
  let env: HashMap<&str, &str> = Config::pay_env_report()
    .into_iter()
    .map(|(name, set)| (name, if set { "Set" } else { "Missing" }))
    .collect();

  let crypto_test = match &app.config.pay {
    Some(pay) => {
      let signed = Signer::new(&pay.mch_id, &pay.cert_serial_no, &pay.private_key)
        .and_then(|signer| signer.sign("test_message"));
      match signed {
        Ok(signature) => format!("Success (Sig len: {})", signature.len()),
        Err(err) => format!("FAILED: {err}"),
      }
    }
    None => "Skipped: payment not configured".to_string(),
  };

  Json(json::json!({
    "env": env,
    "enabled": app.pay.is_some(),
    "error": app.pay_error,
    "cryptoTest": crypto_test,
  }))
}
