use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(ReferralCodes::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(ReferralCodes::Code)
              .string()
              .not_null()
              .primary_key(),
          )
          .col(ColumnDef::new(ReferralCodes::OwnerName).string().not_null())
          .col(ColumnDef::new(ReferralCodes::OwnerContact).string().null())
          .col(ColumnDef::new(ReferralCodes::OwnerOpenid).string().null())
          .col(
            ColumnDef::new(ReferralCodes::CommissionRate)
              .integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(ReferralCodes::ReceiverOpenid).string().null())
          .col(
            ColumnDef::new(ReferralCodes::SharingPercentage).integer().null(),
          )
          .col(
            ColumnDef::new(ReferralCodes::IsActive)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(ReferralCodes::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_referral_codes_owner_openid")
          .table(ReferralCodes::Table)
          .col(ReferralCodes::OwnerOpenid)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ReferralCodes::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum ReferralCodes {
  Table,
  Code,
  OwnerName,
  OwnerContact,
  OwnerOpenid,
  CommissionRate,
  ReceiverOpenid,
  SharingPercentage,
  IsActive,
  CreatedAt,
}
