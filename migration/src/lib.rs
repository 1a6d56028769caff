pub use sea_orm_migration::prelude::*;

mod m20241101_000001_create_catalog;
mod m20241101_000002_create_reviews;
mod m20241101_000003_create_cache_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241101_000001_create_catalog::Migration),
            Box::new(m20241101_000002_create_reviews::Migration),
            Box::new(m20241101_000003_create_cache_entries::Migration),
        ]
    }
}
