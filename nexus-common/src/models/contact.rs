//! Contacts: people at an account

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{detach_children, optional_text, require_reference, validate_email, EntityType};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewContact {
    pub account_id: Option<Uuid>,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPatch {
    pub account_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_primary: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactFilter {
    pub account_id: Option<Uuid>,
    /// Substring match on first name, last name or email
    pub q: Option<String>,
}

impl Contact {
    const SORT_COLUMNS: &'static [&'static str] = &["last_name", "first_name", "created_at", "updated_at"];

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub async fn create(pool: &SqlitePool, data: NewContact) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let contact = Self::insert(&mut *tx, data).await?;
        tx.commit().await?;
        Ok(contact)
    }

    /// Insert within the caller's transaction
    pub async fn insert(conn: &mut SqliteConnection, data: NewContact) -> Result<Self> {
        require_reference(&mut *conn, EntityType::Account, data.account_id).await?;

        let email = optional_text(data.email);
        validate_email(email.as_deref())?;
        let first_name = data.first_name.trim().to_string();
        if first_name.is_empty() {
            return Err(Error::InvalidInput("first_name must not be empty".to_string()));
        }
        let now = time::now();

        let contact = Contact {
            id: Uuid::new_v4(),
            account_id: data.account_id,
            first_name,
            last_name: data.last_name.trim().to_string(),
            email,
            phone: optional_text(data.phone),
            role: optional_text(data.role),
            is_primary: data.is_primary && data.account_id.is_some(),
            created_at: now,
            updated_at: now,
        };

        if contact.is_primary {
            clear_primary(&mut *conn, contact.account_id, contact.id).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO contacts (id, account_id, first_name, last_name, email, phone, role,
                                  is_primary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contact.id)
        .bind(contact.account_id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.role)
        .bind(contact.is_primary)
        .bind(contact.created_at)
        .bind(contact.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(contact)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let contact = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(contact)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("contact", id))
    }

    pub async fn list(pool: &SqlitePool, filter: &ContactFilter, params: &ListParams) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "last_name")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("account_id", filter.account_id)
            .search(&["first_name", "last_name", "email"], filter.q.as_deref());

        fetch_page(pool, "contacts", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: ContactPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut contact = Self::get(&mut *tx, id).await?;

        if let Some(account_id) = patch.account_id {
            require_reference(&mut *tx, EntityType::Account, Some(account_id)).await?;
            contact.account_id = Some(account_id);
        }
        if let Some(first_name) = patch.first_name {
            let first_name = first_name.trim().to_string();
            if first_name.is_empty() {
                return Err(Error::InvalidInput("first_name must not be empty".to_string()));
            }
            contact.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            contact.last_name = last_name.trim().to_string();
        }
        if let Some(email) = patch.email {
            contact.email = optional_text(Some(email));
            validate_email(contact.email.as_deref())?;
        }
        if let Some(phone) = patch.phone {
            contact.phone = optional_text(Some(phone));
        }
        if let Some(role) = patch.role {
            contact.role = optional_text(Some(role));
        }
        if let Some(is_primary) = patch.is_primary {
            contact.is_primary = is_primary && contact.account_id.is_some();
        }
        contact.updated_at = time::now();

        if contact.is_primary {
            clear_primary(&mut *tx, contact.account_id, contact.id).await?;
        }

        sqlx::query(
            r#"
            UPDATE contacts
            SET account_id = ?, first_name = ?, last_name = ?, email = ?, phone = ?, role = ?,
                is_primary = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(contact.account_id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.role)
        .bind(contact.is_primary)
        .bind(contact.updated_at)
        .bind(contact.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(contact)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        Self::get(&mut *tx, id).await?;
        detach_children(&mut *tx, EntityType::Contact, id).await?;

        sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// An account has at most one primary contact
async fn clear_primary(conn: &mut SqliteConnection, account_id: Option<Uuid>, keep: Uuid) -> Result<()> {
    if let Some(account_id) = account_id {
        sqlx::query("UPDATE contacts SET is_primary = 0 WHERE account_id = ? AND id != ?")
            .bind(account_id)
            .bind(keep)
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use crate::models::{Account, NewAccount};

    async fn account(pool: &SqlitePool) -> Account {
        Account::create(
            pool,
            NewAccount {
                name: "Whitfield".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_existing_account() {
        let pool = init_memory_database().await.unwrap();
        let result = Contact::create(
            &pool,
            NewContact {
                account_id: Some(Uuid::new_v4()),
                first_name: "Jo".into(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_single_primary_contact_per_account() {
        let pool = init_memory_database().await.unwrap();
        let account = account(&pool).await;

        let first = Contact::create(
            &pool,
            NewContact {
                account_id: Some(account.id),
                first_name: "Sam".into(),
                last_name: "Whitfield".into(),
                is_primary: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(first.is_primary);
        assert_eq!(first.full_name(), "Sam Whitfield");

        let second = Contact::create(
            &pool,
            NewContact {
                account_id: Some(account.id),
                first_name: "Alex".into(),
                is_primary: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(second.is_primary);

        let first = Contact::get(&pool, first.id).await.unwrap();
        assert!(!first.is_primary);

        // Switch back through an update
        Contact::update(
            &pool,
            first.id,
            ContactPatch {
                is_primary: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!Contact::get(&pool, second.id).await.unwrap().is_primary);
    }

    #[tokio::test]
    async fn test_primary_requires_account() {
        let pool = init_memory_database().await.unwrap();
        let contact = Contact::create(
            &pool,
            NewContact {
                first_name: "Lone".into(),
                is_primary: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!contact.is_primary);
    }

    #[tokio::test]
    async fn test_list_by_account_and_search() {
        let pool = init_memory_database().await.unwrap();
        let account = account(&pool).await;
        for (first, last) in [("Ann", "Lee"), ("Bob", "Moss")] {
            Contact::create(
                &pool,
                NewContact {
                    account_id: Some(account.id),
                    first_name: first.into(),
                    last_name: last.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        Contact::create(
            &pool,
            NewContact {
                first_name: "Cat".into(),
                last_name: "Lee".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let filter = ContactFilter {
            account_id: Some(account.id),
            q: None,
        };
        let page = Contact::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let filter = ContactFilter {
            account_id: None,
            q: Some("lee".into()),
        };
        let page = Contact::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }
}
