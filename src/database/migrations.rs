use std::str::FromStr;

use crate::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::{ADDITIVE_COLUMNS, CURRENT_SCHEMA, ColumnMigration, SEED_ADMIN};

#[instrument]
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    info!("Opening database");
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}

/// Creates missing tables, seeds the admin account and applies additive
/// column migrations. Safe to run on every start.
#[instrument(skip(pool))]
pub async fn initialize_database(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Initializing database schema");

    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;
    sqlx::query(SEED_ADMIN).execute(pool).await?;

    for migration in ADDITIVE_COLUMNS {
        add_column(pool, migration).await?;
    }

    info!("Database initialized");
    Ok(())
}

#[instrument(skip(pool))]
async fn add_column(pool: &Pool<Sqlite>, migration: &ColumnMigration) -> Result<bool, AppError> {
    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        migration.table, migration.column, migration.definition
    );

    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => {
            info!(table = %migration.table, column = %migration.column, "Added column");
            Ok(true)
        }
        Err(sqlx::Error::Database(err)) if err.message().contains("duplicate column") => {
            debug!(table = %migration.table, column = %migration.column, "Column already present");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn get_table_columns(pool: &Pool<Sqlite>, table_name: &str) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table_name))
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect())
}
