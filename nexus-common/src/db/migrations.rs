//! Database schema migrations
//!
//! Tables are created in their current shape by `init`; migrations bring
//! databases created by older builds up to date. Each migration is
//! idempotent and recorded in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - they must stay stable for upgrades
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE** - prefer it over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = sqlx::query_scalar(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1"
    )
    .fetch_optional(pool)
    .await?;

    Ok(version.unwrap_or(0))
}

/// Set schema version in database
async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: lookup indexes for foreign keys, status filters and
/// polymorphic activity/document links
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Create lookup indexes");

    const INDEXES: &[&str] = &[
        "CREATE INDEX IF NOT EXISTS idx_contacts_account ON contacts(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_enquiries_status ON enquiries(status)",
        "CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status)",
        "CREATE INDEX IF NOT EXISTS idx_leads_account ON leads(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_deals_stage ON deals(stage)",
        "CREATE INDEX IF NOT EXISTS idx_deals_account ON deals(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_account ON jobs(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_surveys_account ON surveys(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_activities_entity ON activities(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_activities_due ON activities(due_at)",
        "CREATE INDEX IF NOT EXISTS idx_documents_entity ON documents(entity_type, entity_id)",
    ];

    for sql in INDEXES {
        sqlx::query(sql).execute(pool).await?;
    }

    info!("  ✓ Created {} indexes", INDEXES.len());
    Ok(())
}

/// Migration v2: Add assigned_to column to activities table
///
/// **Background:** Early databases tracked activity owners only in the body
/// text. This adds a filterable column.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add assigned_to column to activities");

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('activities') WHERE name = 'assigned_to'"
    )
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  assigned_to column already exists - skipping");
        return Ok(());
    }

    match sqlx::query("ALTER TABLE activities ADD COLUMN assigned_to TEXT")
        .execute(pool)
        .await
    {
        Ok(_) => {
            info!("  ✓ Added assigned_to column to activities table");
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  assigned_to column added concurrently - skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_schema_version_no_table() {
        let pool = setup_test_db().await;
        let version = get_schema_version(&pool).await.unwrap();
        assert_eq!(version, 0);
    }

    #[tokio::test]
    async fn test_set_and_get_schema_version() {
        let pool = setup_test_db().await;

        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
        )
        .execute(&pool)
        .await
        .unwrap();

        set_schema_version(&pool, 1).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrate_v2_adds_column_to_legacy_table() {
        let pool = setup_test_db().await;

        // Activities table as created by builds before v2
        sqlx::query(
            "CREATE TABLE activities (id BLOB PRIMARY KEY, kind TEXT NOT NULL, subject TEXT NOT NULL)"
        )
        .execute(&pool)
        .await
        .unwrap();

        migrate_v2(&pool).await.unwrap();
        // Second run is a no-op
        migrate_v2(&pool).await.unwrap();

        let has_column: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('activities') WHERE name = 'assigned_to'"
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(has_column, 1);
    }

    #[tokio::test]
    async fn test_full_schema_is_current_version() {
        let pool = crate::db::init::init_memory_database().await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

        // Re-running is idempotent
        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
