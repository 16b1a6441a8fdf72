use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Chains::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Chains::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Chains::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Chains::ChainId).string().not_null().unique_key())
                    .col(ColumnDef::new(Chains::Enabled).boolean().not_null())
                    .col(ColumnDef::new(Chains::AdminNotes).text())
                    .col(ColumnDef::new(Chains::ExecutionUrls).text().not_null())
                    .col(ColumnDef::new(Chains::ConsensusUrls).text().not_null())
                    .col(ColumnDef::new(Chains::PrometheusUrls).text().not_null())
                    .col(ColumnDef::new(Chains::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Chains::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Chains::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Chains {
    Table,
    Id,
    Name,
    ChainId,
    Enabled,
    AdminNotes,
    ExecutionUrls,
    ConsensusUrls,
    PrometheusUrls,
    CreatedAt,
    UpdatedAt,
}
