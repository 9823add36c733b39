use serde::Serialize;

use crate::{
  config::PayConfig,
  entity::user,
  prelude::*,
  utils,
  wxpay::{Amount, Attach, CURRENCY_CNY, NativeOrderRequest, PayApi, SettleInfo},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
  pub code_url: String,
  pub out_trade_no: String,
}

pub struct Order<'a> {
  db: &'a DatabaseConnection,
  pay: &'a dyn PayApi,
}

/// Native (QR code) order carrying `{openid, app, referrer_code}` in attach.
/// Orders with a referrer are flagged for later profit sharing.
pub fn build_request(
  config: &PayConfig,
  openid: &str,
  referrer_code: Option<&str>,
  out_trade_no: &str,
) -> Result<NativeOrderRequest> {
  let attach = Attach {
    openid: openid.to_string(),
    app: Some(config.app_tag.clone()),
    referrer_code: referrer_code.map(str::to_owned),
  };

  Ok(NativeOrderRequest {
    appid: config.app_id.clone(),
    mchid: config.mch_id.clone(),
    description: config.order_description.clone(),
    out_trade_no: out_trade_no.to_string(),
    notify_url: config.notify_url.clone(),
    amount: Amount { total: config.order_amount, currency: CURRENCY_CNY.into() },
    attach: json::to_string(&attach)?,
    settle_info: referrer_code.map(|_| SettleInfo { profit_sharing: true }),
  })
}

impl<'a> Order<'a> {
  pub fn new(db: &'a DatabaseConnection, pay: &'a dyn PayApi) -> Self {
    Self { db, pay }
  }

  pub async fn create(&self, openid: &str) -> Result<CreatedOrder> {
    if openid.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing openid".into()));
    }

    let user = user::Entity::find()
      .filter(user::Column::Openid.eq(openid))
      .one(self.db)
      .await?
      .ok_or(Error::UserNotFound)?;

    let out_trade_no = utils::trade_no("PT");
    let referrer = user.referrer_code.as_deref();
    let request =
      build_request(self.pay.config(), openid, referrer, &out_trade_no)?;

    info!(
      "Creating order {} for {} (referrer: {})",
      out_trade_no,
      openid,
      referrer.unwrap_or("-")
    );

    let response = self.pay.create_native_order(&request).await?;

    Ok(CreatedOrder { code_url: response.code_url, out_trade_no })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{
    test_utils::{FakePay, pay_config, test_db},
    user::{Profile, User},
  };

  #[test]
  fn test_request_with_referrer_enables_profit_sharing() {
    let config = pay_config();
    let req = build_request(&config, "o-1", Some("ABC123"), "PT_1").unwrap();

    assert_eq!(req.appid, "wx-test-app");
    assert_eq!(req.mchid, "1900000001");
    assert_eq!(req.amount.total, config.order_amount);
    assert_eq!(req.amount.currency, "CNY");
    assert_eq!(req.settle_info.map(|s| s.profit_sharing), Some(true));

    let attach: json::Value = json::from_str(&req.attach).unwrap();
    assert_eq!(
      attach,
      json::json!({"openid": "o-1", "app": "phototree", "referrer_code": "ABC123"})
    );
  }

  #[test]
  fn test_request_without_referrer() {
    let req = build_request(&pay_config(), "o-1", None, "PT_1").unwrap();

    assert!(req.settle_info.is_none());
    let attach: json::Value = json::from_str(&req.attach).unwrap();
    assert_eq!(attach["referrer_code"], json::Value::Null);
  }

  #[tokio::test]
  async fn test_create_order() {
    let db = test_db::setup().await;
    User::new(&db).login_openid("o-1", Profile::default(), None).await.unwrap();
    let pay = FakePay::new();

    let order = Order::new(&db, &pay).create("o-1").await.unwrap();

    assert!(order.out_trade_no.starts_with("PT_"));
    assert!(order.code_url.starts_with("weixin://wxpay/bizpayurl"));
    let orders = pay.orders.lock().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].out_trade_no, order.out_trade_no);
  }

  #[tokio::test]
  async fn test_create_order_errors() {
    let db = test_db::setup().await;
    User::new(&db).login_openid("o-1", Profile::default(), None).await.unwrap();
    let pay = FakePay::new();
    let sv = Order::new(&db, &pay);

    assert!(matches!(sv.create("").await, Err(Error::InvalidArgs(_))));
    assert!(matches!(sv.create("ghost").await, Err(Error::UserNotFound)));

    let failing = FakePay::failing();
    let result = Order::new(&db, &failing).create("o-1").await;
    let Err(Error::Provider { details, .. }) = result else {
      panic!("expected provider error");
    };
    assert_eq!(details["code"], "PARAM_ERROR");
  }
}
