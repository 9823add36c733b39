use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(ProfitSharingRecords::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(ProfitSharingRecords::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::OutTradeNo)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::TransactionId)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::OutOrderNo)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::ReferrerCode)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::ReceiverOpenid)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::Amount)
              .big_integer()
              .not_null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::Status).string().not_null(),
          )
          .col(ColumnDef::new(ProfitSharingRecords::OrderId).string().null())
          .col(
            ColumnDef::new(ProfitSharingRecords::Description).string().null(),
          )
          .col(
            ColumnDef::new(ProfitSharingRecords::CreatedAt)
              .date_time()
              .not_null(),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_profit_sharing_records_transaction")
          .table(ProfitSharingRecords::Table)
          .col(ProfitSharingRecords::TransactionId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_profit_sharing_records_referrer")
          .table(ProfitSharingRecords::Table)
          .col(ProfitSharingRecords::ReferrerCode)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ProfitSharingRecords::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum ProfitSharingRecords {
  Table,
  Id,
  OutTradeNo,
  TransactionId,
  OutOrderNo,
  ReferrerCode,
  ReceiverOpenid,
  Amount,
  Status,
  OrderId,
  Description,
  CreatedAt,
}
