//! Database initialization
//!
//! Creates the database file on first run, applies connection pragmas,
//! creates every table with `CREATE TABLE IF NOT EXISTS`, runs versioned
//! migrations and seeds default settings. Safe to call on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    prepare_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// The pool holds exactly one connection that never expires, because every
/// SQLite `:memory:` connection is a separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    prepare_schema(&pool).await?;

    Ok(pool)
}

async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_api_tokens_table(pool).await?;

    create_accounts_table(pool).await?;
    create_contacts_table(pool).await?;
    create_enquiries_table(pool).await?;
    create_leads_table(pool).await?;
    create_deals_table(pool).await?;
    create_jobs_table(pool).await?;
    create_surveys_table(pool).await?;
    create_activities_table(pool).await?;
    create_documents_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_api_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_tokens (
            id BLOB PRIMARY KEY,
            label TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            last_used_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_accounts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            account_type TEXT NOT NULL DEFAULT 'residential',
            email TEXT,
            phone TEXT,
            address_line1 TEXT,
            address_line2 TEXT,
            city TEXT,
            postcode TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_contacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id BLOB PRIMARY KEY,
            account_id BLOB REFERENCES accounts(id) ON DELETE CASCADE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT,
            phone TEXT,
            role TEXT,
            is_primary INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_enquiries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enquiries (
            id BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            source TEXT NOT NULL DEFAULT 'other',
            project_type TEXT NOT NULL DEFAULT 'other',
            message TEXT,
            status TEXT NOT NULL DEFAULT 'new',
            lead_id BLOB REFERENCES leads(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            id BLOB PRIMARY KEY,
            title TEXT NOT NULL,
            account_id BLOB REFERENCES accounts(id) ON DELETE SET NULL,
            contact_id BLOB REFERENCES contacts(id) ON DELETE SET NULL,
            enquiry_id BLOB REFERENCES enquiries(id) ON DELETE SET NULL,
            source TEXT NOT NULL DEFAULT 'other',
            project_type TEXT NOT NULL DEFAULT 'other',
            status TEXT NOT NULL DEFAULT 'new',
            estimated_value INTEGER NOT NULL DEFAULT 0,
            assigned_to TEXT,
            notes TEXT,
            deal_id BLOB REFERENCES deals(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_deals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deals (
            id BLOB PRIMARY KEY,
            title TEXT NOT NULL,
            account_id BLOB NOT NULL REFERENCES accounts(id),
            lead_id BLOB REFERENCES leads(id) ON DELETE SET NULL,
            contact_id BLOB REFERENCES contacts(id) ON DELETE SET NULL,
            stage TEXT NOT NULL DEFAULT 'survey',
            value INTEGER NOT NULL DEFAULT 0,
            probability INTEGER NOT NULL DEFAULT 10,
            expected_close_date TEXT,
            closed_at TEXT,
            lost_reason TEXT,
            job_id BLOB REFERENCES jobs(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id BLOB PRIMARY KEY,
            seq INTEGER NOT NULL UNIQUE,
            reference TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            account_id BLOB NOT NULL REFERENCES accounts(id),
            deal_id BLOB REFERENCES deals(id) ON DELETE SET NULL,
            job_type TEXT NOT NULL DEFAULT 'other',
            status TEXT NOT NULL DEFAULT 'scheduled',
            site_address TEXT,
            start_date TEXT,
            end_date TEXT,
            contract_value INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_surveys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys (
            id BLOB PRIMARY KEY,
            account_id BLOB NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            deal_id BLOB REFERENCES deals(id) ON DELETE SET NULL,
            job_id BLOB REFERENCES jobs(id) ON DELETE SET NULL,
            surveyor TEXT,
            room_type TEXT NOT NULL DEFAULT 'other',
            status TEXT NOT NULL DEFAULT 'scheduled',
            scheduled_at TEXT NOT NULL,
            completed_at TEXT,
            measurements TEXT NOT NULL DEFAULT '{}',
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_activities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            id BLOB PRIMARY KEY,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT,
            entity_type TEXT NOT NULL,
            entity_id BLOB NOT NULL,
            due_at TEXT,
            completed_at TEXT,
            assigned_to TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id BLOB PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id BLOB NOT NULL,
            file_name TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            uploaded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist. NULL values are reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "company_name", "CRM Nexus").await?;
    ensure_setting(pool, "currency", "GBP").await?;
    ensure_setting(pool, "job_reference_prefix", "JOB-").await?;
    ensure_setting(pool, "survey_lookahead_days", "7").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> = sqlx::query_scalar(
        "SELECT value FROM settings WHERE key = ?"
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    match value {
        None => {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            info!("Reset NULL setting '{}' to default value: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_has_all_tables() {
        let pool = init_memory_database().await.unwrap();

        for table in [
            "settings", "api_tokens", "accounts", "contacts", "enquiries", "leads",
            "deals", "jobs", "surveys", "activities", "documents",
        ] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_default_settings_seeded_and_null_reset() {
        let pool = init_memory_database().await.unwrap();

        sqlx::query("UPDATE settings SET value = NULL WHERE key = 'currency'")
            .execute(&pool)
            .await
            .unwrap();
        init_default_settings(&pool).await.unwrap();

        let currency: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'currency'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(currency, "GBP");
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = init_memory_database().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO contacts (id, account_id, first_name, created_at, updated_at)
             VALUES (?, ?, 'Ann', '2026-01-01', '2026-01-01')",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(uuid::Uuid::new_v4())
        .execute(&pool)
        .await;

        assert!(result.is_err(), "dangling account_id should be rejected");
    }
}
