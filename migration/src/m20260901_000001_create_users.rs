use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Users::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Users::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Users::Openid).string().null().unique_key())
          .col(ColumnDef::new(Users::Phone).string().null().unique_key())
          .col(ColumnDef::new(Users::Nickname).string().null())
          .col(ColumnDef::new(Users::AvatarUrl).string().null())
          .col(
            ColumnDef::new(Users::IsVip).boolean().not_null().default(false),
          )
          .col(ColumnDef::new(Users::VipExpireAt).date_time().null())
          .col(ColumnDef::new(Users::ReferrerCode).string().null())
          .col(ColumnDef::new(Users::DeviceType).string().null())
          .col(ColumnDef::new(Users::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_users_referrer_code")
          .table(Users::Table)
          .col(Users::ReferrerCode)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Users {
  Table,
  Id,
  Openid,
  Phone,
  Nickname,
  AvatarUrl,
  IsVip,
  VipExpireAt,
  ReferrerCode,
  DeviceType,
  CreatedAt,
}
