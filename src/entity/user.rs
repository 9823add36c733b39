use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
#[serde(rename_all = "camelCase")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub openid: Option<String>,
  #[sea_orm(unique)]
  pub phone: Option<String>,
  pub nickname: Option<String>,
  pub avatar_url: Option<String>,
  pub is_vip: bool,
  pub vip_expire_at: Option<DateTime>,
  /// Code that acquired this user. Written once, never overwritten.
  pub referrer_code: Option<String>,
  pub device_type: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
