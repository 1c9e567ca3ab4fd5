//! Leads: qualified sales opportunities, before a quote is in progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    detach_children, optional_text, require_reference, required_text, validate_amount, EntityType,
    LeadSource, ProjectType,
};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Qualified,
    Unqualified,
    Converted,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Unqualified => "unqualified",
            LeadStatus::Converted => "converted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub title: String,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub enquiry_id: Option<Uuid>,
    pub source: LeadSource,
    pub project_type: ProjectType,
    pub status: LeadStatus,
    /// Minor currency units
    pub estimated_value: i64,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    pub deal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLead {
    pub title: String,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    #[serde(skip)]
    pub enquiry_id: Option<Uuid>,
    #[serde(default = "default_source")]
    pub source: LeadSource,
    #[serde(default = "default_project_type")]
    pub project_type: ProjectType,
    #[serde(default)]
    pub estimated_value: i64,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

fn default_source() -> LeadSource {
    LeadSource::Other
}

fn default_project_type() -> ProjectType {
    ProjectType::Other
}

impl NewLead {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            account_id: None,
            contact_id: None,
            enquiry_id: None,
            source: default_source(),
            project_type: default_project_type(),
            estimated_value: 0,
            assigned_to: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPatch {
    pub title: Option<String>,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub source: Option<LeadSource>,
    pub project_type: Option<ProjectType>,
    pub status: Option<LeadStatus>,
    pub estimated_value: Option<i64>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub project_type: Option<ProjectType>,
    pub assigned_to: Option<String>,
    /// Substring match on title or notes
    pub q: Option<String>,
}

impl Lead {
    const SORT_COLUMNS: &'static [&'static str] =
        &["title", "status", "estimated_value", "created_at", "updated_at"];

    pub fn is_convertible(&self) -> bool {
        matches!(self.status, LeadStatus::New | LeadStatus::Qualified)
    }

    pub async fn create(pool: &SqlitePool, data: NewLead) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let lead = Self::insert(&mut *tx, data).await?;
        tx.commit().await?;
        Ok(lead)
    }

    pub async fn insert(conn: &mut SqliteConnection, data: NewLead) -> Result<Self> {
        require_reference(&mut *conn, EntityType::Account, data.account_id).await?;
        require_reference(&mut *conn, EntityType::Contact, data.contact_id).await?;
        require_reference(&mut *conn, EntityType::Enquiry, data.enquiry_id).await?;
        validate_amount("estimated_value", data.estimated_value)?;
        let now = time::now();

        let lead = Lead {
            id: Uuid::new_v4(),
            title: required_text("title", &data.title)?,
            account_id: data.account_id,
            contact_id: data.contact_id,
            enquiry_id: data.enquiry_id,
            source: data.source,
            project_type: data.project_type,
            status: LeadStatus::New,
            estimated_value: data.estimated_value,
            assigned_to: optional_text(data.assigned_to),
            notes: optional_text(data.notes),
            deal_id: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO leads (id, title, account_id, contact_id, enquiry_id, source, project_type,
                               status, estimated_value, assigned_to, notes, deal_id,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.title)
        .bind(lead.account_id)
        .bind(lead.contact_id)
        .bind(lead.enquiry_id)
        .bind(lead.source)
        .bind(lead.project_type)
        .bind(lead.status)
        .bind(lead.estimated_value)
        .bind(&lead.assigned_to)
        .bind(&lead.notes)
        .bind(lead.deal_id)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(lead)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(lead)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("lead", id))
    }

    pub async fn list(pool: &SqlitePool, filter: &LeadFilter, params: &ListParams) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "created_at")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("status", filter.status.map(|s| s.as_str()))
            .eq("source", filter.source.map(|s| s.as_str()))
            .eq("project_type", filter.project_type.map(|p| p.as_str()))
            .eq("assigned_to", filter.assigned_to.clone())
            .search(&["title", "notes"], filter.q.as_deref());

        fetch_page(pool, "leads", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: LeadPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut lead = Self::get(&mut *tx, id).await?;

        if lead.status == LeadStatus::Converted {
            return Err(Error::Conflict(format!("lead {} has been converted", id)));
        }

        if let Some(title) = patch.title {
            lead.title = required_text("title", &title)?;
        }
        if let Some(account_id) = patch.account_id {
            require_reference(&mut *tx, EntityType::Account, Some(account_id)).await?;
            lead.account_id = Some(account_id);
        }
        if let Some(contact_id) = patch.contact_id {
            require_reference(&mut *tx, EntityType::Contact, Some(contact_id)).await?;
            lead.contact_id = Some(contact_id);
        }
        if let Some(source) = patch.source {
            lead.source = source;
        }
        if let Some(project_type) = patch.project_type {
            lead.project_type = project_type;
        }
        if let Some(status) = patch.status {
            if status == LeadStatus::Converted {
                return Err(Error::InvalidInput(
                    "use the convert operation to convert a lead".to_string(),
                ));
            }
            lead.status = status;
        }
        if let Some(value) = patch.estimated_value {
            validate_amount("estimated_value", value)?;
            lead.estimated_value = value;
        }
        if let Some(assigned_to) = patch.assigned_to {
            lead.assigned_to = optional_text(Some(assigned_to));
        }
        if let Some(notes) = patch.notes {
            lead.notes = optional_text(Some(notes));
        }
        lead.updated_at = time::now();

        sqlx::query(
            r#"
            UPDATE leads
            SET title = ?, account_id = ?, contact_id = ?, source = ?, project_type = ?, status = ?,
                estimated_value = ?, assigned_to = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&lead.title)
        .bind(lead.account_id)
        .bind(lead.contact_id)
        .bind(lead.source)
        .bind(lead.project_type)
        .bind(lead.status)
        .bind(lead.estimated_value)
        .bind(&lead.assigned_to)
        .bind(&lead.notes)
        .bind(lead.updated_at)
        .bind(lead.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(lead)
    }

    /// Record the conversion; only called by the conversion workflow
    pub(crate) async fn mark_converted(
        conn: &mut SqliteConnection,
        id: Uuid,
        account_id: Uuid,
        deal_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET status = ?, account_id = ?, deal_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(LeadStatus::Converted)
        .bind(account_id)
        .bind(deal_id)
        .bind(time::now())
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        let lead = Self::get(&mut *tx, id).await?;

        if lead.status == LeadStatus::Converted {
            return Err(Error::Conflict(format!("lead {} has been converted", id)));
        }

        detach_children(&mut *tx, EntityType::Lead, id).await?;
        sqlx::query("DELETE FROM leads WHERE id = ?")
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

    #[tokio::test]
    async fn test_create_defaults() {
        let pool = init_memory_database().await.unwrap();
        let lead = Lead::create(&pool, NewLead::titled("Family bathroom")).await.unwrap();

        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.source, LeadSource::Other);
        assert!(lead.is_convertible());
        assert_eq!(Lead::get(&pool, lead.id).await.unwrap(), lead);
    }

    #[tokio::test]
    async fn test_negative_value_rejected() {
        let pool = init_memory_database().await.unwrap();
        let mut data = NewLead::titled("Kitchen");
        data.estimated_value = -1;
        assert!(matches!(
            Lead::create(&pool, data).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_qualify_and_filter() {
        let pool = init_memory_database().await.unwrap();
        let lead = Lead::create(&pool, NewLead::titled("Utility room")).await.unwrap();
        let mut other = NewLead::titled("Cloakroom");
        other.assigned_to = Some("dana".into());
        Lead::create(&pool, other).await.unwrap();

        let qualified = Lead::update(
            &pool,
            lead.id,
            LeadPatch {
                status: Some(LeadStatus::Qualified),
                estimated_value: Some(850_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(qualified.status, LeadStatus::Qualified);
        assert_eq!(qualified.estimated_value, 850_000);

        let filter = LeadFilter {
            status: Some(LeadStatus::Qualified),
            ..Default::default()
        };
        let page = Lead::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let filter = LeadFilter {
            assigned_to: Some("dana".into()),
            ..Default::default()
        };
        let page = Lead::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.items[0].title, "Cloakroom");
    }

    #[tokio::test]
    async fn test_unqualified_lead_is_not_convertible() {
        let pool = init_memory_database().await.unwrap();
        let lead = Lead::create(&pool, NewLead::titled("Wet room")).await.unwrap();
        let lead = Lead::update(
            &pool,
            lead.id,
            LeadPatch {
                status: Some(LeadStatus::Unqualified),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!lead.is_convertible());
    }
}
