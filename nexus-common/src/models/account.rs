//! Accounts: the households and businesses the company works for

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{detach_children, optional_text, required_text, validate_email, EntityType};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Residential,
    Commercial,
    Trade,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Residential => "residential",
            AccountType::Commercial => "commercial",
            AccountType::Trade => "trade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub account_type: AccountType,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating an account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(default)]
    pub account_type: AccountType,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; absent fields are left alone, blank strings clear
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub account_type: Option<AccountType>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFilter {
    /// Substring match on name, email or city
    pub q: Option<String>,
    pub account_type: Option<AccountType>,
}

impl Account {
    const SORT_COLUMNS: &'static [&'static str] = &["name", "created_at", "updated_at"];

    pub async fn create(pool: &SqlitePool, data: NewAccount) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        Self::insert(&mut conn, data).await
    }

    pub async fn insert(conn: &mut SqliteConnection, data: NewAccount) -> Result<Self> {
        let email = optional_text(data.email);
        validate_email(email.as_deref())?;
        let now = time::now();

        let account = Account {
            id: Uuid::new_v4(),
            name: required_text("name", &data.name)?,
            account_type: data.account_type,
            email,
            phone: optional_text(data.phone),
            address_line1: optional_text(data.address_line1),
            address_line2: optional_text(data.address_line2),
            city: optional_text(data.city),
            postcode: optional_text(data.postcode),
            notes: optional_text(data.notes),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, account_type, email, phone, address_line1,
                                  address_line2, city, postcode, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.address_line1)
        .bind(&account.address_line2)
        .bind(&account.city)
        .bind(&account.postcode)
        .bind(&account.notes)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(conn)
        .await?;

        Ok(account)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(account)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("account", id))
    }

    pub async fn list(pool: &SqlitePool, filter: &AccountFilter, params: &ListParams) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "name")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("account_type", filter.account_type.map(|t| t.as_str()))
            .search(&["name", "email", "city"], filter.q.as_deref());

        fetch_page(pool, "accounts", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: AccountPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut account = Self::get(&mut *tx, id).await?;

        if let Some(name) = patch.name {
            account.name = required_text("name", &name)?;
        }
        if let Some(account_type) = patch.account_type {
            account.account_type = account_type;
        }
        if let Some(email) = patch.email {
            account.email = optional_text(Some(email));
            validate_email(account.email.as_deref())?;
        }
        if let Some(phone) = patch.phone {
            account.phone = optional_text(Some(phone));
        }
        if let Some(line) = patch.address_line1 {
            account.address_line1 = optional_text(Some(line));
        }
        if let Some(line) = patch.address_line2 {
            account.address_line2 = optional_text(Some(line));
        }
        if let Some(city) = patch.city {
            account.city = optional_text(Some(city));
        }
        if let Some(postcode) = patch.postcode {
            account.postcode = optional_text(Some(postcode));
        }
        if let Some(notes) = patch.notes {
            account.notes = optional_text(Some(notes));
        }
        account.updated_at = time::now();

        sqlx::query(
            r#"
            UPDATE accounts
            SET name = ?, account_type = ?, email = ?, phone = ?, address_line1 = ?,
                address_line2 = ?, city = ?, postcode = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&account.name)
        .bind(account.account_type)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.address_line1)
        .bind(&account.address_line2)
        .bind(&account.city)
        .bind(&account.postcode)
        .bind(&account.notes)
        .bind(account.updated_at)
        .bind(account.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    /// Delete an account together with its contacts and surveys
    ///
    /// Refused while deals or jobs reference the account.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        Self::get(&mut *tx, id).await?;

        let (deals, jobs): (i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM deals WHERE account_id = ?1),
                   (SELECT COUNT(*) FROM jobs WHERE account_id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if deals > 0 || jobs > 0 {
            return Err(Error::Conflict(format!(
                "account {} still has {} deal(s) and {} job(s)",
                id, deals, jobs
            )));
        }

        let contact_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM contacts WHERE account_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        for contact_id in contact_ids {
            detach_children(&mut *tx, EntityType::Contact, contact_id).await?;
        }

        let survey_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM surveys WHERE account_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        for survey_id in survey_ids {
            detach_children(&mut *tx, EntityType::Survey, survey_id).await?;
        }

        detach_children(&mut *tx, EntityType::Account, id).await?;

        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    fn new_account(name: &str) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = init_memory_database().await.unwrap();

        let created = Account::create(
            &pool,
            NewAccount {
                name: "  Harper Residence ".into(),
                email: Some("harper@example.com".into()),
                city: Some("Leeds".into()),
                phone: Some("   ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(created.name, "Harper Residence");
        assert_eq!(created.account_type, AccountType::Residential);
        assert_eq!(created.phone, None);

        let loaded = Account::get(&pool, created.id).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_and_bad_email() {
        let pool = init_memory_database().await.unwrap();

        assert!(matches!(
            Account::create(&pool, new_account(" ")).await,
            Err(Error::InvalidInput(_))
        ));

        let bad_email = NewAccount {
            name: "X".into(),
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(matches!(
            Account::create(&pool, bad_email).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        assert!(matches!(
            Account::get(&pool, Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let pool = init_memory_database().await.unwrap();
        for name in ["Cedar Kitchens Ltd", "Ash Homes", "Birch Trade Supplies"] {
            Account::create(&pool, new_account(name)).await.unwrap();
        }
        Account::create(
            &pool,
            NewAccount {
                name: "Oak Lettings".into(),
                account_type: AccountType::Commercial,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = Account::list(&pool, &AccountFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        let names: Vec<_> = page.items.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Ash Homes", "Birch Trade Supplies", "Cedar Kitchens Ltd", "Oak Lettings"]);

        let filter = AccountFilter {
            account_type: Some(AccountType::Commercial),
            ..Default::default()
        };
        let page = Account::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Oak Lettings");

        let filter = AccountFilter {
            q: Some("trade".into()),
            ..Default::default()
        };
        let page = Account::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let params = ListParams {
            sort: Some("password".into()),
            ..Default::default()
        };
        assert!(matches!(
            Account::list(&pool, &AccountFilter::default(), &params).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_applies_partial_patch() {
        let pool = init_memory_database().await.unwrap();
        let account = Account::create(
            &pool,
            NewAccount {
                name: "Patel".into(),
                city: Some("York".into()),
                notes: Some("Prefers email".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = Account::update(
            &pool,
            account.id,
            AccountPatch {
                city: Some("Harrogate".into()),
                notes: Some("".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "Patel");
        assert_eq!(updated.city.as_deref(), Some("Harrogate"));
        assert_eq!(updated.notes, None);
        assert!(updated.updated_at >= account.updated_at);
        assert_eq!(Account::get(&pool, account.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_delete_cascades_contacts() {
        let pool = init_memory_database().await.unwrap();
        let account = Account::create(&pool, new_account("Green")).await.unwrap();
        crate::models::Contact::create(
            &pool,
            crate::models::NewContact {
                account_id: Some(account.id),
                first_name: "Gail".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        Account::delete(&pool, account.id).await.unwrap();

        let contacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(contacts, 0);
        assert!(Account::find(&pool, account.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_refused_with_deal() {
        let pool = init_memory_database().await.unwrap();
        let account = Account::create(&pool, new_account("Brown")).await.unwrap();
        crate::models::Deal::create(
            &pool,
            crate::models::NewDeal {
                title: "Ensuite refit".into(),
                account_id: account.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            Account::delete(&pool, account.id).await,
            Err(Error::Conflict(_))
        ));
    }
}
