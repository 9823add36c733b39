use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(RedemptionCodes::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(RedemptionCodes::Code)
              .string()
              .not_null()
              .primary_key(),
          )
          .col(
            ColumnDef::new(RedemptionCodes::Status)
              .string()
              .not_null()
              .default("unused"),
          )
          .col(ColumnDef::new(RedemptionCodes::UsedBy).string().null())
          .col(ColumnDef::new(RedemptionCodes::UsedAt).date_time().null())
          .col(
            ColumnDef::new(RedemptionCodes::CreatedAt).date_time().not_null(),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(RedemptionCodes::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum RedemptionCodes {
  Table,
  Code,
  Status,
  UsedBy,
  UsedAt,
  CreatedAt,
}
