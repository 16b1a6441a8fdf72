use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DefaultAppSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DefaultAppSettings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DefaultAppSettings::DefaultMaxRps).integer().not_null())
                    .col(
                        ColumnDef::new(DefaultAppSettings::DefaultDailyRequestsLimit)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DefaultAppSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DefaultAppSettings {
    Table,
    Id,
    DefaultMaxRps,
    DefaultDailyRequestsLimit,
}
