use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(SmsCodes::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(SmsCodes::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(SmsCodes::Phone).string().not_null())
          .col(ColumnDef::new(SmsCodes::Code).string().not_null())
          .col(
            ColumnDef::new(SmsCodes::Used).boolean().not_null().default(false),
          )
          .col(ColumnDef::new(SmsCodes::ExpiresAt).date_time().not_null())
          .col(ColumnDef::new(SmsCodes::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_sms_codes_phone")
          .table(SmsCodes::Table)
          .col(SmsCodes::Phone)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(SmsCodes::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum SmsCodes {
  Table,
  Id,
  Phone,
  Code,
  Used,
  ExpiresAt,
  CreatedAt,
}
