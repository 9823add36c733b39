use sea_orm::{
  SqlErr,
  sea_query::{Alias, Expr, Func},
};
use serde::Serialize;

use crate::{
  entity::{
    SharingStatus, page_view, profit_sharing_record, referral_code, user,
  },
  prelude::*,
  utils,
  wxpay::{
    AddReceiverRequest, PayApi, RECEIVER_PERSONAL_OPENID, RELATION_DISTRIBUTOR,
  },
};

use super::settlement::MAX_SHARE_PERCENT;

pub const CODE_LEN: usize = 6;
pub const MAX_GENERATE_ATTEMPTS: usize = 10;

pub struct Referral<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Default, Clone)]
pub struct NewReferral {
  pub code: Option<String>,
  pub owner_name: String,
  pub owner_contact: Option<String>,
  pub owner_openid: Option<String>,
  pub commission_rate: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
  pub code: String,
  pub owner_name: String,
  pub page_views: u64,
  pub unique_visitors: u64,
  pub registered_users: u64,
  pub vip_users: u64,
  /// VIP / registered, percent with two decimals.
  pub conversion_rate: f64,
  pub total_shared: i64,
}

impl<'a> Referral<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub fn url(site_url: &str, code: &str) -> String {
    format!("{}/?ref={}", site_url.trim_end_matches('/'), code)
  }

  pub async fn by_code(&self, code: &str) -> Result<Option<referral_code::Model>> {
    Ok(referral_code::Entity::find_by_id(code).one(self.db).await?)
  }

  pub async fn by_owner(
    &self,
    openid: &str,
  ) -> Result<Option<referral_code::Model>> {
    Ok(
      referral_code::Entity::find()
        .filter(referral_code::Column::OwnerOpenid.eq(openid))
        .order_by_asc(referral_code::Column::CreatedAt)
        .one(self.db)
        .await?,
    )
  }

  /// Admin creation. A missing code is generated.
  pub async fn create(&self, new: NewReferral) -> Result<referral_code::Model> {
    if new.owner_name.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing owner name".into()));
    }
    if !(0..=100).contains(&new.commission_rate) {
      return Err(Error::InvalidArgs("Invalid commission rate".into()));
    }

    match utils::non_empty(new.code.as_deref()) {
      Some(code) => {
        let code = code.to_uppercase();
        let model = Self::active_model(code, &new);
        model.insert(self.db).await.map_err(|err| {
          match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
              Error::InvalidArgs("Referral code already exists".into())
            }
            _ => err.into(),
          }
        })
      }
      None => self.generate_with(&new, || utils::random_code(CODE_LEN)).await,
    }
  }

  /// Self-service code for a user. Returns the existing code when the user
  /// already owns one.
  pub async fn generate_for(
    &self,
    openid: &str,
  ) -> Result<referral_code::Model> {
    if openid.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing openid".into()));
    }
    if let Some(existing) = self.by_owner(openid).await? {
      return Ok(existing);
    }

    let owner = user::Entity::find()
      .filter(user::Column::Openid.eq(openid))
      .one(self.db)
      .await?
      .ok_or(Error::UserNotFound)?;

    let new = NewReferral {
      code: None,
      owner_name: owner.nickname.unwrap_or_else(|| openid.to_string()),
      owner_contact: owner.phone,
      owner_openid: Some(openid.to_string()),
      commission_rate: 0,
    };
    self.generate_with(&new, || utils::random_code(CODE_LEN)).await
  }

  /// Bounded retry against the unique primary key. The lookup is only an
  /// optimisation; the insert is what decides.
  pub async fn generate_with(
    &self,
    new: &NewReferral,
    mut next: impl FnMut() -> String,
  ) -> Result<referral_code::Model> {
    for attempt in 1..=MAX_GENERATE_ATTEMPTS {
      let code = next();
      if self.by_code(&code).await?.is_some() {
        debug!("Referral code collision on attempt {}: {}", attempt, code);
        continue;
      }

      match Self::active_model(code.clone(), new).insert(self.db).await {
        Ok(model) => {
          info!("Referral code {} created for {}", model.code, model.owner_name);
          return Ok(model);
        }
        Err(err) => match err.sql_err() {
          Some(SqlErr::UniqueConstraintViolation(_)) => {
            debug!("Referral code lost insert race: {}", code);
          }
          _ => return Err(err.into()),
        },
      }
    }

    Err(Error::Internal(format!(
      "failed to generate a unique referral code after {MAX_GENERATE_ATTEMPTS} attempts"
    )))
  }

  fn active_model(code: String, new: &NewReferral) -> referral_code::ActiveModel {
    referral_code::ActiveModel {
      code: Set(code),
      owner_name: Set(new.owner_name.trim().to_string()),
      owner_contact: Set(new.owner_contact.clone()),
      owner_openid: Set(new.owner_openid.clone()),
      commission_rate: Set(new.commission_rate),
      receiver_openid: Set(None),
      sharing_percentage: Set(None),
      is_active: Set(true),
      created_at: Set(utils::now()),
    }
  }

  /// Registers `openid` as a profit-sharing receiver with the provider, then
  /// stores it on the code.
  pub async fn bind_receiver(
    &self,
    pay: &dyn PayApi,
    code: &str,
    openid: &str,
    percentage: i32,
  ) -> Result<referral_code::Model> {
    if openid.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing receiver openid".into()));
    }
    if !(1..=MAX_SHARE_PERCENT as i32).contains(&percentage) {
      return Err(Error::InvalidArgs(format!(
        "Sharing percentage must be between 1 and {MAX_SHARE_PERCENT}"
      )));
    }

    let referral = self.by_code(code).await?.ok_or(Error::ReferralNotFound)?;

    pay
      .add_receiver(&AddReceiverRequest {
        appid: pay.config().app_id.clone(),
        kind: RECEIVER_PERSONAL_OPENID.into(),
        account: openid.to_string(),
        relation_type: RELATION_DISTRIBUTOR.into(),
      })
      .await?;

    info!(
      "Receiver {} bound to referral code {} at {}%",
      openid, code, percentage
    );
    Ok(
      referral_code::ActiveModel {
        receiver_openid: Set(Some(openid.to_string())),
        sharing_percentage: Set(Some(percentage)),
        ..referral.into()
      }
      .update(self.db)
      .await?,
    )
  }

  pub async fn stats(&self, code: &str) -> Result<ReferralStats> {
    let referral = self.by_code(code).await?.ok_or(Error::ReferralNotFound)?;

    let page_views = page_view::Entity::find()
      .filter(page_view::Column::ReferrerCode.eq(code))
      .count(self.db)
      .await?;

    let unique_visitors = page_view::Entity::find()
      .select_only()
      .column(page_view::Column::SessionId)
      .distinct()
      .filter(page_view::Column::ReferrerCode.eq(code))
      .count(self.db)
      .await?;

    let registered_users = user::Entity::find()
      .filter(user::Column::ReferrerCode.eq(code))
      .count(self.db)
      .await?;

    let vip_users = user::Entity::find()
      .filter(user::Column::ReferrerCode.eq(code))
      .filter(user::Column::IsVip.eq(true))
      .count(self.db)
      .await?;

    let total_shared: Option<i64> = profit_sharing_record::Entity::find()
      .select_only()
      .column_as(
        Expr::expr(Func::cast_as(
          Expr::col(profit_sharing_record::Column::Amount).sum(),
          Alias::new("BIGINT"),
        )),
        "total",
      )
      .filter(profit_sharing_record::Column::ReferrerCode.eq(code))
      .filter(profit_sharing_record::Column::Status.eq(SharingStatus::Success))
      .into_tuple::<Option<i64>>()
      .one(self.db)
      .await?
      .flatten();

    Ok(ReferralStats {
      code: referral.code,
      owner_name: referral.owner_name,
      page_views,
      unique_visitors,
      registered_users,
      vip_users,
      conversion_rate: conversion_rate(vip_users, registered_users),
      total_shared: total_shared.unwrap_or(0),
    })
  }

  /// Ledger rows for a code, newest first.
  pub async fn records(
    &self,
    code: &str,
  ) -> Result<Vec<profit_sharing_record::Model>> {
    Ok(
      profit_sharing_record::Entity::find()
        .filter(profit_sharing_record::Column::ReferrerCode.eq(code))
        .order_by_desc(profit_sharing_record::Column::Id)
        .all(self.db)
        .await?,
    )
  }
}

fn conversion_rate(vip: u64, registered: u64) -> f64 {
  if registered == 0 {
    return 0.0;
  }
  (vip as f64 * 10_000.0 / registered as f64).round() / 100.0
}
