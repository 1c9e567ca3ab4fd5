//! Key/value settings stored in the `settings` table

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Settings a client may change through the API
pub const EDITABLE_SETTINGS: &[&str] = &[
    "company_name",
    "currency",
    "job_reference_prefix",
    "survey_lookahead_days",
];

/// Read a setting, `None` when absent or NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value.flatten())
}

/// Insert or replace a setting
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// All settings with a value, keyed by name
pub async fn list_settings(pool: &SqlitePool) -> Result<BTreeMap<String, String>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM settings WHERE value IS NOT NULL ORDER BY key")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Validate and store a client-supplied value for an editable setting
pub async fn update_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<String> {
    if !EDITABLE_SETTINGS.contains(&key) {
        return Err(Error::NotFound(format!("setting {}", key)));
    }
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", key)));
    }
    if key == "survey_lookahead_days" && !value.parse::<u16>().is_ok_and(|days| days > 0) {
        return Err(Error::InvalidInput(
            "survey_lookahead_days must be a positive whole number".to_string(),
        ));
    }

    set_setting(pool, key, value).await?;
    Ok(value.to_string())
}
