//! Payment notification processing.
//!
//! `Notify::handle` never fails. Whatever happens inside, the HTTP layer
//! answers the provider with [`wxpay::ACK`](crate::wxpay::ACK); the returned
//! [`NotifyOutcome`] only feeds logs and tests.

use serde::Serialize;

use super::{
  settlement::{Settlement, SettlementOutcome, SettlementRequest},
  user::User,
};
use crate::{
  prelude::*,
  utils,
  wxpay::{
    EncryptedResource, Notification, PayApi, PaymentEvent,
    decrypt_event,
  },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
  NoResource,
  Malformed { error: String },
  KeyMissing,
  DecryptFailed { error: String },
  NotPaid { trade_state: Option<String> },
  MissingOpenid,
  Paid {
    openid: String,
    vip_granted: bool,
    settlement: Option<SettlementOutcome>,
  },
}

/// Identity recovered from the event's attach field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
  pub openid: Option<String>,
  pub referrer_code: Option<String>,
}

/// JSON attach first, then the payer block. Only an attach that is not JSON
/// at all is taken as a bare openid.
pub fn correlation(event: &PaymentEvent) -> Correlation {
  let raw = utils::non_empty(event.attach.as_deref());
  let payer = event
    .payer
    .as_ref()
    .and_then(|p| utils::non_empty(p.openid.as_deref()));
  let field = |attach: &json::Value, name: &str| {
    utils::non_empty(attach.get(name).and_then(json::Value::as_str))
  };

  match raw {
    Some(raw) => match json::from_str::<json::Value>(&raw) {
      Ok(attach) => Correlation {
        openid: field(&attach, "openid").or(payer),
        referrer_code: field(&attach, "referrer_code"),
      },
      Err(_) => Correlation { openid: Some(raw), referrer_code: None },
    },
    None => Correlation { openid: payer, referrer_code: None },
  }
}

pub struct Notify<'a> {
  db: &'a DatabaseConnection,
  pay: Option<&'a dyn PayApi>,
  api_v3_key: Option<&'a str>,
}

impl<'a> Notify<'a> {
  /// `pay` is only needed for settlement; decryption needs just the key.
  pub fn new(
    db: &'a DatabaseConnection,
    pay: Option<&'a dyn PayApi>,
    api_v3_key: Option<&'a str>,
  ) -> Self {
    Self { db, pay, api_v3_key }
  }

  pub async fn handle(&self, body: &[u8]) -> NotifyOutcome {
    let notification: Notification = match json::from_slice(body) {
      Ok(notification) => notification,
      Err(err) => {
        warn!("Malformed payment notification: {}", err);
        return NotifyOutcome::Malformed { error: err.to_string() };
      }
    };

    let Some(resource) = notification.resource else {
      debug!("Notification {:?} carries no resource", notification.id);
      return NotifyOutcome::NoResource;
    };

    let event = match self.event(resource) {
      Ok(event) => event,
      Err(outcome) => return outcome,
    };

    self.apply(event).await
  }

  fn event(&self, resource: json::Value) -> Result<PaymentEvent, NotifyOutcome> {
    let encrypted = ["ciphertext", "nonce", "associated_data"]
      .iter()
      .all(|field| resource.get(field).is_some());

    if !encrypted {
      debug!("Notification resource is already decrypted");
      return json::from_value(resource)
        .map_err(|err| NotifyOutcome::Malformed { error: err.to_string() });
    }

    let resource: EncryptedResource = json::from_value(resource)
      .map_err(|err| NotifyOutcome::Malformed { error: err.to_string() })?;

    let Some(key) = self.api_v3_key else {
      error!("Encrypted notification received but API v3 key is not set");
      return Err(NotifyOutcome::KeyMissing);
    };

    decrypt_event(
      key.as_bytes(),
      &resource.ciphertext,
      &resource.nonce,
      &resource.associated_data,
    )
    .map_err(|err| {
      error!("Failed to decrypt payment notification: {}", err);
      NotifyOutcome::DecryptFailed { error: err.to_string() }
    })
  }

  async fn apply(&self, event: PaymentEvent) -> NotifyOutcome {
    if !event.is_paid() {
      info!(
        "Order {:?} not paid, trade state {:?}",
        event.out_trade_no, event.trade_state
      );
      return NotifyOutcome::NotPaid { trade_state: event.trade_state };
    }

    let Correlation { openid, referrer_code } = correlation(&event);
    let Some(openid) = openid else {
      warn!("Paid order {:?} has no openid to credit", event.out_trade_no);
      return NotifyOutcome::MissingOpenid;
    };

    let vip_granted = match User::new(self.db).grant_vip(&openid).await {
      Ok(true) => {
        info!("VIP granted to {} for order {:?}", openid, event.out_trade_no);
        true
      }
      Ok(false) => {
        warn!("Paid order {:?} for unknown user {}", event.out_trade_no, openid);
        false
      }
      Err(err) => {
        error!("Failed to grant VIP to {}: {}", openid, err);
        false
      }
    };

    let settlement = match referrer_code {
      Some(code) => Some(self.settle(&event, code).await),
      None => None,
    };

    NotifyOutcome::Paid { openid, vip_granted, settlement }
  }

  async fn settle(
    &self,
    event: &PaymentEvent,
    referrer_code: String,
  ) -> SettlementOutcome {
    let (Some(pay), Some(transaction_id), Some(total_amount)) =
      (self.pay, event.transaction_id.clone(), event.total_amount())
    else {
      let error = "payment disabled or event lacks transaction id/amount";
      warn!("Skipping settlement for {}: {}", referrer_code, error);
      return SettlementOutcome::Failed { error: error.into() };
    };

    Settlement::new(self.db, pay)
      .settle(SettlementRequest {
        transaction_id,
        out_trade_no: event.out_trade_no.clone().unwrap_or_default(),
        referrer_code,
        total_amount,
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use base64::{Engine, engine::general_purpose::STANDARD};

  use super::*;
  use crate::{
    entity::{SharingStatus, profit_sharing_record, referral_code, user},
    sv::{
      test_utils::{FakePay, TEST_API_V3_KEY, test_db},
      user::Profile,
    },
    wxpay::crypto::tests::{AAD, NONCE, encrypt},
  };

  async fn seed(db: &DatabaseConnection) {
    User::new(db).login_openid("o-1", Profile::default(), None).await.unwrap();
    referral_code::ActiveModel {
      code: Set("REF001".into()),
      owner_name: Set("Ann".into()),
      owner_contact: Set(None),
      owner_openid: Set(None),
      commission_rate: Set(0),
      receiver_openid: Set(Some("o-recv".into())),
      sharing_percentage: Set(Some(30)),
      is_active: Set(true),
      created_at: Set(utils::now()),
    }
    .insert(db)
    .await
    .unwrap();
  }

  fn paid_event(attach: &str) -> json::Value {
    json::json!({
      "out_trade_no": "PT_1700000000000_0001",
      "transaction_id": "4200000000000000001",
      "trade_state": "SUCCESS",
      "attach": attach,
      "amount": {"total": 1800, "payer_total": 1800},
      "payer": {"openid": "o-payer"}
    })
  }

  fn attach() -> String {
    json::json!({"openid": "o-1", "app": "phototree", "referrer_code": "REF001"})
      .to_string()
  }

  fn plain(event: json::Value) -> Vec<u8> {
    json::json!({"id": "n-1", "event_type": "TRANSACTION.SUCCESS", "resource": event})
      .to_string()
      .into_bytes()
  }

  fn encrypted(ciphertext: String) -> Vec<u8> {
    json::json!({
      "id": "n-1",
      "event_type": "TRANSACTION.SUCCESS",
      "resource": {
        "algorithm": "AEAD_AES_256_GCM",
        "ciphertext": ciphertext,
        "nonce": NONCE,
        "associated_data": AAD
      }
    })
    .to_string()
    .into_bytes()
  }

  async fn is_vip(db: &DatabaseConnection, openid: &str) -> bool {
    user::Entity::find()
      .filter(user::Column::Openid.eq(openid))
      .one(db)
      .await
      .unwrap()
      .unwrap()
      .is_vip
  }

  #[test]
  fn test_correlation_fallbacks() {
    let event: PaymentEvent = json::from_value(paid_event(&attach())).unwrap();
    assert_eq!(
      correlation(&event),
      Correlation {
        openid: Some("o-1".into()),
        referrer_code: Some("REF001".into())
      }
    );

    let event: PaymentEvent = json::from_value(paid_event("o-legacy")).unwrap();
    assert_eq!(correlation(&event).openid.as_deref(), Some("o-legacy"));

    let event: PaymentEvent = json::from_value(paid_event("")).unwrap();
    assert_eq!(correlation(&event).openid.as_deref(), Some("o-payer"));
  }

  #[test]
  fn test_json_attach_without_openid_uses_payer() {
    let attach = json::json!({"app": "phototree"}).to_string();
    let event: PaymentEvent = json::from_value(paid_event(&attach)).unwrap();
    assert_eq!(
      correlation(&event),
      Correlation { openid: Some("o-payer".into()), referrer_code: None }
    );

    let attach = json::json!({"openid": 7, "referrer_code": "REF001"}).to_string();
    let event: PaymentEvent = json::from_value(paid_event(&attach)).unwrap();
    assert_eq!(
      correlation(&event),
      Correlation {
        openid: Some("o-payer".into()),
        referrer_code: Some("REF001".into())
      }
    );
  }

  #[tokio::test]
  async fn test_plain_success_grants_vip_despite_settlement_failure() {
    let db = test_db::setup().await;
    seed(&db).await;
    let pay = FakePay::failing();

    let outcome = Notify::new(&db, Some(&pay), Some(TEST_API_V3_KEY))
      .handle(&plain(paid_event(&attach())))
      .await;

    let NotifyOutcome::Paid { openid, vip_granted, settlement } = outcome else {
      panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(openid, "o-1");
    assert!(vip_granted);
    assert!(matches!(settlement, Some(SettlementOutcome::Failed { .. })));
    assert!(is_vip(&db, "o-1").await);

    let rows = profit_sharing_record::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, SharingStatus::Failed);
  }

  #[tokio::test]
  async fn test_encrypted_success_settles() {
    let db = test_db::setup().await;
    seed(&db).await;
    let pay = FakePay::new();
    let plaintext = paid_event(&attach()).to_string();
    let ciphertext =
      encrypt(TEST_API_V3_KEY.as_bytes(), NONCE, AAD, plaintext.as_bytes());

    let outcome = Notify::new(&db, Some(&pay), Some(TEST_API_V3_KEY))
      .handle(&encrypted(ciphertext))
      .await;

    assert!(matches!(
      outcome,
      NotifyOutcome::Paid {
        vip_granted: true,
        settlement: Some(SettlementOutcome::Settled { amount: 540, .. }),
        ..
      }
    ));
    assert!(is_vip(&db, "o-1").await);
  }

  #[tokio::test]
  async fn test_tampered_tag_grants_nothing() {
    let db = test_db::setup().await;
    seed(&db).await;
    let pay = FakePay::new();
    let plaintext = paid_event(&attach()).to_string();
    let ciphertext =
      encrypt(TEST_API_V3_KEY.as_bytes(), NONCE, AAD, plaintext.as_bytes());

    // flip one bit of the trailing tag
    let mut raw = STANDARD.decode(&ciphertext).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    let tampered = STANDARD.encode(raw);

    let outcome = Notify::new(&db, Some(&pay), Some(TEST_API_V3_KEY))
      .handle(&encrypted(tampered))
      .await;

    assert!(matches!(outcome, NotifyOutcome::DecryptFailed { .. }));
    assert!(!is_vip(&db, "o-1").await);
    assert!(pay.sharing_calls().is_empty());
  }

  #[tokio::test]
  async fn test_encrypted_without_key() {
    let db = test_db::setup().await;
    seed(&db).await;

    let pay = FakePay::new();

    let outcome = Notify::new(&db, Some(&pay), None)
      .handle(&encrypted("AAAA".repeat(8)))
      .await;

    assert_eq!(outcome, NotifyOutcome::KeyMissing);
    assert!(!is_vip(&db, "o-1").await);
  }

  #[tokio::test]
  async fn test_encrypted_success_without_merchant_credentials() {
    let db = test_db::setup().await;
    seed(&db).await;
    let plaintext = paid_event(&attach()).to_string();
    let ciphertext =
      encrypt(TEST_API_V3_KEY.as_bytes(), NONCE, AAD, plaintext.as_bytes());

    let outcome = Notify::new(&db, None, Some(TEST_API_V3_KEY))
      .handle(&encrypted(ciphertext))
      .await;

    assert!(matches!(
      outcome,
      NotifyOutcome::Paid {
        vip_granted: true,
        settlement: Some(SettlementOutcome::Failed { .. }),
        ..
      }
    ));
    assert!(is_vip(&db, "o-1").await);
    let rows = profit_sharing_record::Entity::find().all(&db).await.unwrap();
    assert!(rows.is_empty());
  }

  #[tokio::test]
  async fn test_non_success_and_empty_notifications() {
    let db = test_db::setup().await;
    seed(&db).await;
    let sv = Notify::new(&db, None, None);

    let mut event = paid_event(&attach());
    event["trade_state"] = "NOTPAY".into();
    assert_eq!(
      sv.handle(&plain(event)).await,
      NotifyOutcome::NotPaid { trade_state: Some("NOTPAY".into()) }
    );
    assert_eq!(sv.handle(b"{}").await, NotifyOutcome::NoResource);
    assert!(matches!(sv.handle(b"not json").await, NotifyOutcome::Malformed { .. }));
    assert!(!is_vip(&db, "o-1").await);
  }

  #[tokio::test]
  async fn test_redelivery_is_idempotent() {
    let db = test_db::setup().await;
    seed(&db).await;
    let pay = FakePay::new();
    let sv = Notify::new(&db, Some(&pay), Some(TEST_API_V3_KEY));
    let body = plain(paid_event(&attach()));

    sv.handle(&body).await;
    let outcome = sv.handle(&body).await;

    assert!(matches!(
      outcome,
      NotifyOutcome::Paid {
        vip_granted: true,
        settlement: Some(SettlementOutcome::AlreadySettled),
        ..
      }
    ));
    assert_eq!(pay.sharing_calls().len(), 1);
  }
}
