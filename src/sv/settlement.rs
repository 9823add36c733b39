//! Referral profit-sharing settlement.
//!
//! Every attempt that reaches the provider leaves exactly one ledger row,
//! success or failure. Local rejections (no receiver, bounds) leave none.
//! A split the provider accepted is never reported as failed, even when its
//! row cannot be written.

use serde::Serialize;

use crate::{
  entity::{SharingStatus, profit_sharing_record, referral_code},
  prelude::*,
  utils,
  wxpay::{PayApi, ProfitSharingRequest, RECEIVER_PERSONAL_OPENID, SharingReceiver},
};

/// Platform-enforced maximum share of a single transaction.
pub const MAX_SHARE_PERCENT: i64 = 30;

/// `floor(total * percentage / 100)` in minor units.
pub fn split_amount(total: i64, percentage: i64) -> i64 {
  total * percentage / 100
}

#[derive(Debug, Clone)]
pub struct SettlementRequest {
  pub transaction_id: String,
  pub out_trade_no: String,
  pub referrer_code: String,
  pub total_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
  NoReceiver,
  AmountTooSmall { shared: i64 },
  AmountExceedsLimit { shared: i64, limit: i64 },
  AlreadySettled,
  Settled { order_id: String, amount: i64 },
  /// Accepted by the provider, but the success row could not be written.
  SettledUnrecorded { order_id: String, amount: i64 },
  Failed { error: String },
}

pub struct Settlement<'a> {
  db: &'a DatabaseConnection,
  pay: &'a dyn PayApi,
}

impl<'a> Settlement<'a> {
  pub fn new(db: &'a DatabaseConnection, pay: &'a dyn PayApi) -> Self {
    Self { db, pay }
  }

  /// Never fails: every problem is turned into an outcome and, once the
  /// provider is involved, a ledger row.
  pub async fn settle(&self, req: SettlementRequest) -> SettlementOutcome {
    match self.try_settle(&req).await {
      Ok(outcome) => outcome,
      Err(err) => {
        error!(
          "Settlement for transaction {} failed before provider call: {}",
          req.transaction_id, err
        );
        SettlementOutcome::Failed { error: err.to_string() }
      }
    }
  }

  async fn try_settle(
    &self,
    req: &SettlementRequest,
  ) -> Result<SettlementOutcome> {
    let Some((receiver, percentage)) = self.receiver(&req.referrer_code).await?
    else {
      debug!("Referral code {} has no receiver", req.referrer_code);
      return Ok(SettlementOutcome::NoReceiver);
    };

    let shared = split_amount(req.total_amount, percentage);
    if shared < 1 {
      info!(
        "Share {} too small for transaction {}",
        shared, req.transaction_id
      );
      return Ok(SettlementOutcome::AmountTooSmall { shared });
    }

    // shared <= total * 30%, compared without division
    if shared * 100 > req.total_amount * MAX_SHARE_PERCENT {
      let limit = split_amount(req.total_amount, MAX_SHARE_PERCENT);
      warn!(
        "Share {} exceeds {}% limit {} for transaction {}",
        shared, MAX_SHARE_PERCENT, limit, req.transaction_id
      );
      return Ok(SettlementOutcome::AmountExceedsLimit { shared, limit });
    }

    if self.already_settled(&req.transaction_id).await? {
      info!("Transaction {} already settled", req.transaction_id);
      return Ok(SettlementOutcome::AlreadySettled);
    }

    let out_order_no = utils::trade_no("PS");
    let request = ProfitSharingRequest {
      appid: self.pay.config().app_id.clone(),
      transaction_id: req.transaction_id.clone(),
      out_order_no: out_order_no.clone(),
      receivers: vec![SharingReceiver {
        kind: RECEIVER_PERSONAL_OPENID.into(),
        account: receiver.clone(),
        amount: shared,
        description: format!("Referral commission - {}", req.referrer_code),
      }],
      unfreeze_unsplit: false,
    };

    let entry = LedgerEntry {
      out_trade_no: &req.out_trade_no,
      transaction_id: &req.transaction_id,
      out_order_no: &out_order_no,
      referrer_code: &req.referrer_code,
      receiver_openid: &receiver,
    };

    match self.pay.create_profit_sharing(&request).await {
      Ok(response) => {
        info!(
          "Profit sharing {} for transaction {}: {} to {}",
          response.order_id, req.transaction_id, shared, receiver
        );
        let description = &request.receivers[0].description;
        let order_id = response.order_id;
        Ok(self.record_success(&entry, shared, order_id, description).await)
      }
      Err(err) => {
        let error = err.to_string();
        error!(
          "Profit sharing for transaction {} failed: {}",
          req.transaction_id, error
        );
        if let Err(db_err) = self
          .record(&entry, 0, SharingStatus::Failed, None, error.clone())
          .await
        {
          error!(
            "Could not ledger failed settlement for {}: {}",
            req.transaction_id, db_err
          );
        }
        Ok(SettlementOutcome::Failed { error })
      }
    }
  }

  async fn receiver(&self, code: &str) -> Result<Option<(String, i64)>> {
    let referral = referral_code::Entity::find_by_id(code).one(self.db).await?;
    Ok(referral.filter(|r| r.is_active).and_then(|r| {
      match (r.receiver_openid, r.sharing_percentage) {
        (Some(openid), Some(pct)) if !openid.is_empty() && pct > 0 => {
          Some((openid, pct as i64))
        }
        _ => None,
      }
    }))
  }

  async fn already_settled(&self, transaction_id: &str) -> Result<bool> {
    let count = profit_sharing_record::Entity::find()
      .filter(profit_sharing_record::Column::TransactionId.eq(transaction_id))
      .filter(profit_sharing_record::Column::Status.eq(SharingStatus::Success))
      .count(self.db)
      .await?;
    Ok(count > 0)
  }

  /// The provider already moved the money, so a ledger error must not turn
  /// into `Failed`. One retry, then the split is reported unrecorded.
  async fn record_success(
    &self,
    entry: &LedgerEntry<'_>,
    amount: i64,
    order_id: String,
    description: &str,
  ) -> SettlementOutcome {
    for attempt in 1..=2 {
      let status = SharingStatus::Success;
      let written = self
        .record(entry, amount, status, Some(order_id.clone()), description.into())
        .await;
      match written {
        Ok(_) => return SettlementOutcome::Settled { order_id, amount },
        Err(err) => warn!(
          "Ledger write {} for transaction {} failed: {}",
          attempt, entry.transaction_id, err
        ),
      }
    }

    error!(
      "Profit sharing {} of {} for transaction {} accepted but not ledgered",
      order_id, amount, entry.transaction_id
    );
    SettlementOutcome::SettledUnrecorded { order_id, amount }
  }

  async fn record(
    &self,
    entry: &LedgerEntry<'_>,
    amount: i64,
    status: SharingStatus,
    order_id: Option<String>,
    description: String,
  ) -> Result<profit_sharing_record::Model> {
    Ok(
      profit_sharing_record::ActiveModel {
        id: NotSet,
        out_trade_no: Set(entry.out_trade_no.to_string()),
        transaction_id: Set(entry.transaction_id.to_string()),
        out_order_no: Set(entry.out_order_no.to_string()),
        referrer_code: Set(entry.referrer_code.to_string()),
        receiver_openid: Set(entry.receiver_openid.to_string()),
        amount: Set(amount),
        status: Set(status),
        order_id: Set(order_id),
        description: Set(Some(description)),
        created_at: Set(utils::now()),
      }
      .insert(self.db)
      .await?,
    )
  }
}

struct LedgerEntry<'a> {
  out_trade_no: &'a str,
  transaction_id: &'a str,
  out_order_no: &'a str,
  referrer_code: &'a str,
  receiver_openid: &'a str,
}
