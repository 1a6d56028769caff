use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::error::AppResult;

const PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode=WAL",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA cache_size=-64000",
    "PRAGMA foreign_keys=ON",
];

pub async fn connect_and_migrate(database_url: &str) -> AppResult<DatabaseConnection> {
    let mut opts = ConnectOptions::new(database_url);
    opts.connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    // every pooled connection to `:memory:` would otherwise see its own empty database
    if database_url.contains(":memory:") {
        opts.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opts).await?;

    for pragma in PRAGMAS {
        db.execute_unprepared(pragma).await?;
    }

    Migrator::up(&db, None).await?;
    tracing::debug!("database migrated");

    Ok(db)
}

#[cfg(test)]
pub async fn memory() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:").await.unwrap()
}
