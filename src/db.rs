use migration::Migrator;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;

use crate::error::StoreResult;

const PRAGMAS: &[&str] =
    &["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA cache_size=-64000"];

pub async fn connect_and_migrate(database_url: &str) -> StoreResult<DatabaseConnection> {
    let in_memory = database_url.contains(":memory:");

    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.sqlx_logging(false);
    if in_memory {
        // Every pooled connection would otherwise open its own empty database.
        opt.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opt).await?;

    if !in_memory {
        for pragma in PRAGMAS {
            db.execute(Statement::from_string(db.get_database_backend(), pragma.to_string()))
                .await?;
        }
    }

    Migrator::up(&db, None).await?;
    tracing::debug!(in_memory, "catalog database ready");
    Ok(db)
}
