//! Document metadata; file bytes live on disk under the documents folder
//! keyed by document id

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{entity_exists, EntityType};
use crate::db::begin_write;
use crate::{time, Error, Result};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Lowercase hex SHA-256 of the stored bytes
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
}

/// Reduce a client-supplied name to its final path component
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('.')
        .to_string();
    if base.is_empty() || base.chars().any(char::is_control) {
        return Err(Error::InvalidInput(format!("Invalid file name: {:?}", raw)));
    }
    Ok(base)
}

async fn ensure_target(conn: &mut SqliteConnection, entity_type: EntityType, entity_id: Uuid) -> Result<()> {
    if !entity_type.is_attachable() {
        return Err(Error::InvalidInput(format!(
            "Documents cannot be attached to a {}",
            entity_type
        )));
    }
    if !entity_exists(&mut *conn, entity_type, entity_id).await? {
        return Err(Error::InvalidInput(format!(
            "Referenced {} {} does not exist",
            entity_type, entity_id
        )));
    }
    Ok(())
}

impl Document {
    /// Check that `entity_type`/`entity_id` can take an attachment
    pub async fn check_target(pool: &SqlitePool, entity_type: EntityType, entity_id: Uuid) -> Result<()> {
        let mut conn = pool.acquire().await?;
        ensure_target(&mut conn, entity_type, entity_id).await
    }

    /// Insert the metadata row; the target check runs in the same write
    /// transaction as the insert
    pub async fn create(pool: &SqlitePool, data: NewDocument) -> Result<Self> {
        let file_name = sanitize_file_name(&data.file_name)?;

        let mut tx = begin_write(pool).await?;
        ensure_target(&mut *tx, data.entity_type, data.entity_id).await?;

        let document = Document {
            id: data.id,
            entity_type: data.entity_type,
            entity_id: data.entity_id,
            file_name,
            content_type: data.content_type,
            size_bytes: data.size_bytes,
            sha256: data.sha256,
            uploaded_at: time::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO documents (id, entity_type, entity_id, file_name, content_type, size_bytes,
                                   sha256, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document.id)
        .bind(document.entity_type)
        .bind(document.entity_id)
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(document.size_bytes)
        .bind(&document.sha256)
        .bind(document.uploaded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(document)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let document = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(document)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("document", id))
    }

    /// Newest first
    pub async fn list_for_entity(
        pool: &SqlitePool,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<Self>> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT * FROM documents
            WHERE entity_type = ? AND entity_id = ?
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(pool)
        .await?;
        Ok(documents)
    }

    /// Remove the metadata row, returning it so the caller can drop the file
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<Self> {
        let document = Self::get(pool, id).await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use crate::models::{Account, NewAccount};

    fn new_document(account: &Account, name: &str) -> NewDocument {
        NewDocument {
            id: Uuid::new_v4(),
            entity_type: EntityType::Account,
            entity_id: account.id,
            file_name: name.into(),
            content_type: "application/pdf".into(),
            size_bytes: 4,
            sha256: "00".repeat(32),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("quote.pdf").unwrap(), "quote.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\plans\\floor.png").unwrap(), "floor.png");
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("dir/").is_err());
    }

    #[tokio::test]
    async fn test_attach_list_delete() {
        let pool = init_memory_database().await.unwrap();
        let account = Account::create(
            &pool,
            NewAccount {
                name: "Lindqvist".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let doc = Document::create(&pool, new_document(&account, "plan.pdf")).await.unwrap();
        let docs = Document::list_for_entity(&pool, EntityType::Account, account.id)
            .await
            .unwrap();
        assert_eq!(docs, vec![doc.clone()]);

        // attached documents block deleting the parent
        assert!(matches!(
            Account::delete(&pool, account.id).await,
            Err(Error::Conflict(_))
        ));

        let removed = Document::delete(&pool, doc.id).await.unwrap();
        assert_eq!(removed.id, doc.id);
        Account::delete(&pool, account.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_target_rejected() {
        let pool = init_memory_database().await.unwrap();
        let result = Document::check_target(&pool, EntityType::Lead, Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
