use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "page_views")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub session_id: String,
  pub referrer_code: Option<String>,
  pub device_type: Option<String>,
  pub user_agent: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
