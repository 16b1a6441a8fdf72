pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_chains;
mod m20240101_000002_create_apps;
mod m20240101_000003_create_default_app_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_chains::Migration),
            Box::new(m20240101_000002_create_apps::Migration),
            Box::new(m20240101_000003_create_default_app_settings::Migration),
        ]
    }
}
