//! Database module
//!
//! This module provides all database functionality including:
//! - Schema and versioned migrations
//! - Model definitions
//! - Live queries over committed changes
//! - Repository layer for CRUD operations

pub mod live;
pub mod models;
pub mod repository;
pub mod schema;

pub use live::{LiveQuery, Table, TableChange};
pub use models::*;
pub use repository::Repository;
pub use schema::{initialize_database, schema_version};

use crate::config::{BUSY_TIMEOUT, MAX_CONNECTIONS};
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Build connection options shared by migration and application connections.
fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal)
}

/// Create a connection pool over a store migrated to `target_version`.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is created. Pooled connections opened before
/// an ALTER TABLE ADD COLUMN could otherwise keep serving the old layout.
/// A failed migration returns before any application connection exists.
pub async fn create_pool(db_path: &Path, target_version: u32) -> Result<SqlitePool> {
    tracing::info!("Opening store at {:?} (schema version {})", db_path, target_version);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path))
        .await?;

    let migrated = initialize_database(&migration_pool, target_version).await;
    migration_pool.close().await;
    migrated?;

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(connect_options(db_path))
        .await?;

    tracing::info!("Database pool created successfully");

    Ok(pool)
}

/// Open the store at `db_path`, migrating it to `target_version` first.
pub async fn open(db_path: &Path, target_version: u32) -> Result<Repository> {
    let pool = create_pool(db_path, target_version).await?;
    Ok(Repository::new(pool))
}
