/// Database layer for CertVerify
///
/// Manages the SQLite connection pool and the embedded migrations for the
/// account and certificate tables.

pub mod account;

use crate::error::{CertError, CertResult};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> CertResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> CertResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CertError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> CertResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// In-memory database with migrations applied, pinned to one connection so
/// every query sees the same database
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Insert an account row directly, bypassing signup rules
#[cfg(test)]
pub async fn insert_test_account(
    pool: &SqlitePool,
    id: &str,
    role: account::Role,
    approval_status: crate::account::ApprovalStatus,
) -> account::Account {
    sqlx::query(
        "INSERT INTO account (id, name, email, password_hash, role, approval_status, is_active, created_at)
         VALUES (?1, ?2, ?3, 'x', ?4, ?5, 1, ?6)",
    )
    .bind(id)
    .bind(format!("Account {}", id))
    .bind(format!("{}@example.com", id))
    .bind(role.as_str())
    .bind(approval_status.as_str())
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .unwrap();

    let row = sqlx::query(&format!(
        "SELECT {} FROM account WHERE id = ?1",
        account::Account::COLUMNS
    ))
    .bind(id)
    .fetch_one(pool)
    .await
    .unwrap();
    account::Account::from_row(&row).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backed_pool_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("certverify.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('account', 'certificate')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 2);
        assert!(path.exists());
    }
}
