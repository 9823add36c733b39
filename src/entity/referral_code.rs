use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referral_codes")]
#[serde(rename_all = "camelCase")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub code: String,
  pub owner_name: String,
  pub owner_contact: Option<String>,
  pub owner_openid: Option<String>,
  pub commission_rate: i32,
  /// Personal openid that receives the profit-sharing split.
  pub receiver_openid: Option<String>,
  pub sharing_percentage: Option<i32>,
  pub is_active: bool,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
