use sea_orm::sea_query::Expr;

use super::user::User;
use crate::{
  entity::{RedemptionStatus, redemption_code, user},
  prelude::*,
  utils,
};

pub const REDEMPTION_CODE_LEN: usize = 8;
pub const MAX_BATCH: usize = 500;

pub struct Redemption<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Redemption<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Marks the code used and grants VIP in one transaction.
  /// Returns the new VIP expiry.
  pub async fn redeem(&self, code: &str, openid: &str) -> Result<DateTime> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || openid.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing code or openid".into()));
    }

    let txn = self.db.begin().await?;

    redemption_code::Entity::find_by_id(code.clone())
      .one(&txn)
      .await?
      .ok_or(Error::RedemptionNotFound)?;

    user::Entity::find()
      .filter(user::Column::Openid.eq(openid))
      .one(&txn)
      .await?
      .ok_or(Error::UserNotFound)?;

    // check-then-set in a single statement
    let result = redemption_code::Entity::update_many()
      .col_expr(redemption_code::Column::Status, Expr::value(RedemptionStatus::Used))
      .col_expr(redemption_code::Column::UsedBy, Expr::value(openid))
      .col_expr(redemption_code::Column::UsedAt, Expr::value(utils::now()))
      .filter(redemption_code::Column::Code.eq(code.as_str()))
      .filter(redemption_code::Column::Status.eq(RedemptionStatus::Unused))
      .exec(&txn)
      .await?;

    if result.rows_affected == 0 {
      return Err(Error::RedemptionUsed);
    }

    User::grant_vip_on(&txn, openid).await?;
    txn.commit().await?;

    info!("Redemption code {} used by {}", code, openid);
    Ok(utils::vip_forever())
  }

  /// Issues `count` fresh unused codes.
  pub async fn issue(&self, count: usize) -> Result<Vec<String>> {
    if count == 0 || count > MAX_BATCH {
      return Err(Error::InvalidArgs(format!(
        "Count must be between 1 and {MAX_BATCH}"
      )));
    }

    let mut codes = Vec::with_capacity(count);
    let txn = self.db.begin().await?;
    while codes.len() < count {
      let code = utils::random_code(REDEMPTION_CODE_LEN);
      let exists = redemption_code::Entity::find_by_id(code.clone())
        .one(&txn)
        .await?
        .is_some();
      if exists || codes.contains(&code) {
        continue;
      }

      redemption_code::ActiveModel {
        code: Set(code.clone()),
        status: Set(RedemptionStatus::Unused),
        used_by: Set(None),
        used_at: Set(None),
        created_at: Set(utils::now()),
      }
      .insert(&txn)
      .await?;
      codes.push(code);
    }
    txn.commit().await?;

    info!("Issued {} redemption codes", codes.len());
    Ok(codes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{test_utils::test_db, user::Profile};

  #[tokio::test]
  async fn test_redeem_once() {
    let db = test_db::setup().await;
    let users = User::new(&db);
    users.login_openid("o-1", Profile::default(), None).await.unwrap();
    users.login_openid("o-2", Profile::default(), None).await.unwrap();
    let sv = Redemption::new(&db);
    let code = sv.issue(1).await.unwrap().remove(0);

    let expiry = sv.redeem(&code.to_lowercase(), "o-1").await.unwrap();
    assert_eq!(expiry, utils::vip_forever());

    let user = users.by_openid("o-1").await.unwrap().unwrap();
    assert!(user.is_vip);
    assert_eq!(user.vip_expire_at, Some(expiry));

    assert!(matches!(sv.redeem(&code, "o-2").await, Err(Error::RedemptionUsed)));
    assert!(!users.by_openid("o-2").await.unwrap().unwrap().is_vip);

    let row = redemption_code::Entity::find_by_id(code).one(&db).await.unwrap();
    let row = row.unwrap();
    assert_eq!(row.status, RedemptionStatus::Used);
    assert_eq!(row.used_by.as_deref(), Some("o-1"));
    assert!(row.used_at.is_some());
  }

  #[tokio::test]
  async fn test_redeem_errors() {
    let db = test_db::setup().await;
    let sv = Redemption::new(&db);
    let code = sv.issue(1).await.unwrap().remove(0);

    assert!(matches!(sv.redeem("", "o-1").await, Err(Error::InvalidArgs(_))));
    assert!(matches!(
      sv.redeem("NOPE0000", "o-1").await,
      Err(Error::RedemptionNotFound)
    ));
    assert!(matches!(sv.redeem(&code, "ghost").await, Err(Error::UserNotFound)));

    // a failed attempt leaves the code usable
    let row = redemption_code::Entity::find_by_id(code).one(&db).await.unwrap();
    assert_eq!(row.unwrap().status, RedemptionStatus::Unused);
  }

  #[tokio::test]
  async fn test_issue_batch() {
    let db = test_db::setup().await;
    let sv = Redemption::new(&db);

    let codes = sv.issue(20).await.unwrap();
    assert_eq!(codes.len(), 20);
    assert!(codes.iter().all(|c| c.len() == REDEMPTION_CODE_LEN));
    assert_eq!(redemption_code::Entity::find().count(&db).await.unwrap(), 20);
    assert!(matches!(sv.issue(0).await, Err(Error::InvalidArgs(_))));
  }
}
