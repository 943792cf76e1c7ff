//! Database schema and migrations
//!
//! The stored schema version lives in SQLite's `user_version` header field.
//! Each version step runs in its own transaction together with the version
//! bump, so a failed step leaves the store at the last completed version.
//! Step bodies guard every column and table with an existence check and can
//! be re-run over a partially applied step.

use crate::config::{DEFAULT_TAG_COLOR, LATEST_SCHEMA_VERSION};
use crate::error::{AppError, Result};
use sqlx::{SqliteConnection, SqlitePool};

/// Version steps in application order
const MIGRATIONS: &[(u32, &str)] = &[
    (1, "Create notes table"),
    (2, "Add category and updated_at to notes; create tags and note_tag_cross_ref"),
];

/// Read the stored schema version (0 for a brand-new file)
pub async fn schema_version(pool: &SqlitePool) -> Result<u32> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    u32::try_from(version).map_err(|_| AppError::UnsupportedSchemaVersion {
        found: version,
        supported: LATEST_SCHEMA_VERSION,
    })
}

/// Bring the store to `target_version`, returning the version it started at.
///
/// Fails with `UnsupportedSchemaVersion` when the store (or the request) is
/// newer than this build knows, and with `Migration` when a step fails.
pub async fn initialize_database(pool: &SqlitePool, target_version: u32) -> Result<u32> {
    if target_version > LATEST_SCHEMA_VERSION {
        return Err(AppError::UnsupportedSchemaVersion {
            found: i64::from(target_version),
            supported: LATEST_SCHEMA_VERSION,
        });
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    let current_version = schema_version(pool).await?;
    tracing::info!("Current database version: {}", current_version);

    if current_version > target_version {
        return Err(AppError::UnsupportedSchemaVersion {
            found: i64::from(current_version),
            supported: target_version,
        });
    }

    apply_migrations(pool, current_version, target_version).await?;

    tracing::info!("Database initialization complete at version {}", target_version);
    Ok(current_version)
}

async fn apply_migrations(pool: &SqlitePool, current_version: u32, target_version: u32) -> Result<()> {
    for &(version, description) in MIGRATIONS {
        if version <= current_version || version > target_version {
            continue;
        }

        tracing::info!("Applying migration version {}: {}", version, description);

        apply_step(pool, version).await.map_err(|cause| {
            tracing::error!("Migration version {} failed: {}", version, cause);
            AppError::Migration {
                from: version - 1,
                to: version,
                cause: Box::new(cause),
            }
        })?;

        tracing::info!("Migration version {} applied successfully", version);
    }

    Ok(())
}

async fn apply_step(pool: &SqlitePool, version: u32) -> Result<()> {
    let mut tx = pool.begin().await?;

    match version {
        1 => create_notes_table(&mut tx).await?,
        2 => add_categories_and_tags(&mut tx).await?,
        other => {
            return Err(AppError::UnsupportedSchemaVersion {
                found: i64::from(other),
                supported: LATEST_SCHEMA_VERSION,
            })
        }
    }

    // PRAGMA does not take bind parameters
    sqlx::query(&format!("PRAGMA user_version = {}", version))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn create_notes_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn add_categories_and_tags(conn: &mut SqliteConnection) -> Result<()> {
    if !column_exists(conn, "notes", "category").await? {
        sqlx::query("ALTER TABLE notes ADD COLUMN category TEXT NOT NULL DEFAULT ''")
            .execute(&mut *conn)
            .await?;
    }

    if !column_exists(conn, "notes", "updated_at").await? {
        sqlx::query("ALTER TABLE notes ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0")
            .execute(&mut *conn)
            .await?;
    }

    // Backfill: pre-existing notes were last touched when created
    sqlx::query("UPDATE notes SET updated_at = created_at")
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '{}'
        )
        "#,
        DEFAULT_TAG_COLOR
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_tag_cross_ref (
            note_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY(note_id, tag_id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS index_note_tag_cross_ref_tag_id ON note_tag_cross_ref(tag_id)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
        .bind(table)
        .bind(column)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Whether a table is present in the store
pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}
