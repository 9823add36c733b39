//! Shared test utilities: in-memory database and a fake payment provider

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{config::PayConfig, prelude::*, wxpay::*};

pub const TEST_API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";

pub mod test_db {
  use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema,
  };

  use crate::entity::*;

  /// Creates an in-memory SQLite database with all required tables
  pub async fn setup() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();

    let stmts = [
      schema.create_table_from_entity(user::Entity),
      schema.create_table_from_entity(referral_code::Entity),
      schema.create_table_from_entity(profit_sharing_record::Entity),
      schema.create_table_from_entity(redemption_code::Entity),
      schema.create_table_from_entity(page_view::Entity),
      schema.create_table_from_entity(sms_code::Entity),
    ];
    for stmt in &stmts {
      db.execute(backend.build(stmt)).await.unwrap();
    }

    db
  }
}

pub fn pay_config() -> PayConfig {
  PayConfig::new(PayConfig {
    app_id: "wx-test-app".into(),
    mch_id: "1900000001".into(),
    cert_serial_no: "SERIAL01".into(),
    private_key: include_str!("../wxpay/testdata/merchant_key.pem").into(),
    notify_url: "https://example.com/api/pay/notify".into(),
    base_url: "https://api.mch.weixin.qq.com".into(),
    app_tag: "phototree".into(),
    order_amount: 1,
    order_description: "Premium Product - Lifetime Access".into(),
  })
  .unwrap()
}

/// Records every call; `fail` turns each call into a provider rejection.
pub struct FakePay {
  pub config: PayConfig,
  pub fail: bool,
  pub orders: Mutex<Vec<NativeOrderRequest>>,
  pub sharings: Mutex<Vec<ProfitSharingRequest>>,
  pub receivers: Mutex<Vec<AddReceiverRequest>>,
}

impl FakePay {
  pub fn new() -> Self {
    Self {
      config: pay_config(),
      fail: false,
      orders: Mutex::default(),
      sharings: Mutex::default(),
      receivers: Mutex::default(),
    }
  }

  pub fn failing() -> Self {
    Self { fail: true, ..Self::new() }
  }

  fn rejection(&self) -> Error {
    Error::Provider {
      status: 400,
      message: "mocked rejection".into(),
      details: json::json!({"code": "PARAM_ERROR", "message": "mocked rejection"}),
    }
  }

  pub fn sharing_calls(&self) -> Vec<ProfitSharingRequest> {
    self.sharings.lock().unwrap().clone()
  }
}

#[async_trait]
impl PayApi for FakePay {
  fn config(&self) -> &PayConfig {
    &self.config
  }

  async fn create_native_order(
    &self,
    req: &NativeOrderRequest,
  ) -> Result<NativeOrderResponse> {
    self.orders.lock().unwrap().push(req.clone());
    if self.fail {
      return Err(self.rejection());
    }
    Ok(NativeOrderResponse {
      code_url: format!("weixin://wxpay/bizpayurl?pr={}", req.out_trade_no),
    })
  }

  async fn create_profit_sharing(
    &self,
    req: &ProfitSharingRequest,
  ) -> Result<ProfitSharingResponse> {
    self.sharings.lock().unwrap().push(req.clone());
    if self.fail {
      return Err(self.rejection());
    }
    Ok(ProfitSharingResponse {
      order_id: format!("3008450740201411110007820472{}", req.receivers.len()),
      state: Some("PROCESSING".into()),
    })
  }

  async fn add_receiver(&self, req: &AddReceiverRequest) -> Result<()> {
    self.receivers.lock().unwrap().push(req.clone());
    if self.fail {
      return Err(self.rejection());
    }
    Ok(())
  }
}
