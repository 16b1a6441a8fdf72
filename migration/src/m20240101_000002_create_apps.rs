use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Apps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Apps::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Apps::OwnerUserId).big_integer().not_null())
                    .col(ColumnDef::new(Apps::Name).string().not_null())
                    .col(ColumnDef::new(Apps::Description).text())
                    .col(ColumnDef::new(Apps::ApiKey).uuid().not_null().unique_key())
                    .col(ColumnDef::new(Apps::ChainName).string().not_null())
                    .col(ColumnDef::new(Apps::ChainId).string().not_null())
                    .col(ColumnDef::new(Apps::MaxRps).integer().not_null())
                    .col(ColumnDef::new(Apps::DailyRequestsLimit).big_integer().not_null())
                    .col(
                        ColumnDef::new(Apps::TotalRequests)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Apps::DailyRequests)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Apps::LastResetDate).date().not_null())
                    .col(
                        ColumnDef::new(Apps::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Apps::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Apps::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-apps-owner_user_id")
                    .table(Apps::Table)
                    .col(Apps::OwnerUserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Apps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Apps {
    Table,
    Id,
    OwnerUserId,
    Name,
    Description,
    ApiKey,
    ChainName,
    ChainId,
    MaxRps,
    DailyRequestsLimit,
    TotalRequests,
    DailyRequests,
    LastResetDate,
    Active,
    CreatedAt,
    UpdatedAt,
}
