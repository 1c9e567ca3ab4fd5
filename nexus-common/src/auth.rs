//! API token issuing and verification
//!
//! Tokens are `nxs_` followed by 64 hex characters of OS randomness. Only
//! the SHA-256 of the full token is stored, so a leaked database does not
//! leak usable credentials.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::models::required_text;
use crate::{time, Error, Result};

pub const TOKEN_PREFIX: &str = "nxs_";
const TOKEN_BYTES: usize = 32;

/// Stored token metadata; never includes the token itself
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ApiToken {
    pub id: Uuid,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Returned once from [`create_token`]
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub id: Uuid,
    pub token: String,
}

/// Lowercase hex SHA-256 of `token`
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", TOKEN_PREFIX, hex)
}

pub async fn create_token(pool: &SqlitePool, label: &str) -> Result<IssuedToken> {
    let label = required_text("label", label)?;
    let id = Uuid::new_v4();
    let token = generate_token();

    sqlx::query(
        "INSERT INTO api_tokens (id, label, token_hash, created_at, last_used_at) VALUES (?, ?, ?, ?, NULL)",
    )
    .bind(id)
    .bind(&label)
    .bind(hash_token(&token))
    .bind(time::now())
    .execute(pool)
    .await?;

    Ok(IssuedToken { id, token })
}

/// Id of the token matching `token`, recording the use
pub async fn verify_token(pool: &SqlitePool, token: &str) -> Result<Option<Uuid>> {
    if !token.starts_with(TOKEN_PREFIX) {
        return Ok(None);
    }

    let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM api_tokens WHERE token_hash = ?")
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

    if let Some(id) = id {
        sqlx::query("UPDATE api_tokens SET last_used_at = ? WHERE id = ?")
            .bind(time::now())
            .bind(id)
            .execute(pool)
            .await?;
    }

    Ok(id)
}

pub async fn list_tokens(pool: &SqlitePool) -> Result<Vec<ApiToken>> {
    let tokens = sqlx::query_as::<_, ApiToken>(
        "SELECT id, label, created_at, last_used_at FROM api_tokens ORDER BY created_at, rowid",
    )
    .fetch_all(pool)
    .await?;
    Ok(tokens)
}

pub async fn revoke_token(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM api_tokens WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("api token", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = hash_token("nxs_abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("nxs_abc"));
        assert_ne!(hash, hash_token("nxs_abd"));
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + TOKEN_BYTES * 2);
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_create_verify_revoke() {
        let pool = init_memory_database().await.unwrap();
        let issued = create_token(&pool, "frontend").await.unwrap();

        assert_eq!(verify_token(&pool, &issued.token).await.unwrap(), Some(issued.id));
        assert_eq!(verify_token(&pool, "nxs_wrong").await.unwrap(), None);
        assert_eq!(verify_token(&pool, "Bearer nonsense").await.unwrap(), None);

        let tokens = list_tokens(&pool).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].label, "frontend");
        assert!(tokens[0].last_used_at.is_some());

        revoke_token(&pool, issued.id).await.unwrap();
        assert_eq!(verify_token(&pool, &issued.token).await.unwrap(), None);
        assert!(matches!(revoke_token(&pool, issued.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_plaintext_not_stored() {
        let pool = init_memory_database().await.unwrap();
        let issued = create_token(&pool, "cli").await.unwrap();

        let stored: String = sqlx::query_scalar("SELECT token_hash FROM api_tokens")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_ne!(stored, issued.token);
        assert_eq!(stored, hash_token(&issued.token));
    }
}
