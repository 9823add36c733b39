use serde::{Deserialize, Serialize};

pub const TRADE_STATE_SUCCESS: &str = "SUCCESS";
pub const CURRENCY_CNY: &str = "CNY";
pub const RECEIVER_PERSONAL_OPENID: &str = "PERSONAL_OPENID";
pub const RELATION_DISTRIBUTOR: &str = "DISTRIBUTOR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amount {
  pub total: i64,
  pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettleInfo {
  pub profit_sharing: bool,
}

/// Body of `POST /v3/pay/transactions/native`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeOrderRequest {
  pub appid: String,
  pub mchid: String,
  pub description: String,
  pub out_trade_no: String,
  pub notify_url: String,
  pub amount: Amount,
  /// JSON-encoded [`Attach`].
  pub attach: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub settle_info: Option<SettleInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeOrderResponse {
  pub code_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharingReceiver {
  #[serde(rename = "type")]
  pub kind: String,
  pub account: String,
  pub amount: i64,
  pub description: String,
}

/// Body of `POST /v3/profitsharing/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfitSharingRequest {
  pub appid: String,
  pub transaction_id: String,
  pub out_order_no: String,
  pub receivers: Vec<SharingReceiver>,
  /// `false` keeps the unsplit remainder frozen for later splits.
  pub unfreeze_unsplit: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfitSharingResponse {
  pub order_id: String,
  #[serde(default)]
  pub state: Option<String>,
}

/// Body of `POST /v3/profitsharing/receivers/add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddReceiverRequest {
  pub appid: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub account: String,
  pub relation_type: String,
}

/// Correlation payload echoed back by the payment notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attach {
  pub openid: String,
  #[serde(default)]
  pub app: Option<String>,
  #[serde(default)]
  pub referrer_code: Option<String>,
}

/// Inbound callback envelope. `resource` is either the encrypted block or,
/// when an intermediary already decrypted it, the event itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notification {
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default)]
  pub event_type: Option<String>,
  #[serde(default)]
  pub resource: Option<json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncryptedResource {
  pub ciphertext: String,
  pub nonce: String,
  pub associated_data: String,
  #[serde(default)]
  pub algorithm: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentEvent {
  #[serde(default)]
  pub out_trade_no: Option<String>,
  #[serde(default)]
  pub transaction_id: Option<String>,
  #[serde(default)]
  pub trade_state: Option<String>,
  #[serde(default)]
  pub attach: Option<String>,
  #[serde(default)]
  pub amount: Option<PaidAmount>,
  #[serde(default)]
  pub payer: Option<Payer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaidAmount {
  #[serde(default)]
  pub total: Option<i64>,
  #[serde(default)]
  pub payer_total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payer {
  #[serde(default)]
  pub openid: Option<String>,
}

impl PaymentEvent {
  pub fn is_paid(&self) -> bool {
    self.trade_state.as_deref() == Some(TRADE_STATE_SUCCESS)
  }

  pub fn total_amount(&self) -> Option<i64> {
    self.amount.as_ref().and_then(|a| a.total)
  }
}

/// The only response the notify endpoint ever sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
  pub code: &'static str,
  pub message: &'static str,
}

pub const ACK: Ack = Ack { code: "SUCCESS", message: "OK" };
