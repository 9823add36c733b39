use sea_orm::{ConnectionTrait, entity::prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SharingStatus {
  #[sea_orm(string_value = "success")]
  Success,
  #[sea_orm(string_value = "failed")]
  Failed,
  #[sea_orm(string_value = "pending")]
  #[default]
  Pending,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profit_sharing_records")]
#[serde(rename_all = "camelCase")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub out_trade_no: String,
  pub transaction_id: String,
  /// Merchant correlation number of the settlement order itself.
  pub out_order_no: String,
  pub referrer_code: String,
  pub receiver_openid: String,
  /// Minor currency units (fen).
  pub amount: i64,
  pub status: SharingStatus,
  /// Provider-assigned profit-sharing order id, set on success only.
  pub order_id: Option<String>,
  pub description: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
  async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
  where
    C: ConnectionTrait,
  {
    // ledger rows are immutable once written
    if insert {
      Ok(self)
    } else {
      Err(DbErr::Custom("profit sharing records are append-only".into()))
    }
  }
}
