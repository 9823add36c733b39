pub use sea_orm_migration::prelude::*;

mod m20260901_000001_create_users;
mod m20260901_000002_create_referral_codes;
mod m20260901_000003_create_profit_sharing_records;
mod m20260901_000004_create_redemption_codes;
mod m20260901_000005_create_page_views;
mod m20260901_000006_create_sms_codes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260901_000001_create_users::Migration),
      Box::new(m20260901_000002_create_referral_codes::Migration),
      Box::new(m20260901_000003_create_profit_sharing_records::Migration),
      Box::new(m20260901_000004_create_redemption_codes::Migration),
      Box::new(m20260901_000005_create_page_views::Migration),
      Box::new(m20260901_000006_create_sms_codes::Migration),
    ]
  }
}
