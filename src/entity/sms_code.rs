use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sms_codes")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub phone: String,
  pub code: String,
  pub used: bool,
  pub expires_at: DateTime,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
