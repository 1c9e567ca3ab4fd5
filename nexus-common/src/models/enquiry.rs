//! Enquiries: inbound requests that have not yet been qualified as leads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    detach_children, optional_text, required_text, validate_email, EntityType, LeadSource, ProjectType,
};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EnquiryStatus {
    New,
    Contacted,
    Converted,
    Discarded,
}

impl EnquiryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnquiryStatus::New => "new",
            EnquiryStatus::Contacted => "contacted",
            EnquiryStatus::Converted => "converted",
            EnquiryStatus::Discarded => "discarded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Enquiry {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: LeadSource,
    pub project_type: ProjectType,
    pub message: Option<String>,
    pub status: EnquiryStatus,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEnquiry {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "default_source")]
    pub source: LeadSource,
    #[serde(default = "default_project_type")]
    pub project_type: ProjectType,
    pub message: Option<String>,
}

fn default_source() -> LeadSource {
    LeadSource::Other
}

fn default_project_type() -> ProjectType {
    ProjectType::Other
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnquiryPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<LeadSource>,
    pub project_type: Option<ProjectType>,
    pub message: Option<String>,
    pub status: Option<EnquiryStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnquiryFilter {
    pub status: Option<EnquiryStatus>,
    pub source: Option<LeadSource>,
    /// Substring match on name, email or phone
    pub q: Option<String>,
}

/// An enquiry must leave some way of getting back to the customer
fn require_contact_route(email: Option<&str>, phone: Option<&str>) -> Result<()> {
    if email.is_none() && phone.is_none() {
        return Err(Error::InvalidInput(
            "an enquiry needs an email address or a phone number".to_string(),
        ));
    }
    Ok(())
}

impl Enquiry {
    const SORT_COLUMNS: &'static [&'static str] = &["name", "status", "created_at", "updated_at"];

    pub fn is_open(&self) -> bool {
        matches!(self.status, EnquiryStatus::New | EnquiryStatus::Contacted)
    }

    pub async fn create(pool: &SqlitePool, data: NewEnquiry) -> Result<Self> {
        let email = optional_text(data.email);
        let phone = optional_text(data.phone);
        validate_email(email.as_deref())?;
        require_contact_route(email.as_deref(), phone.as_deref())?;
        let now = time::now();

        let enquiry = Enquiry {
            id: Uuid::new_v4(),
            name: required_text("name", &data.name)?,
            email,
            phone,
            source: data.source,
            project_type: data.project_type,
            message: optional_text(data.message),
            status: EnquiryStatus::New,
            lead_id: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO enquiries (id, name, email, phone, source, project_type, message, status,
                                   lead_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(enquiry.id)
        .bind(&enquiry.name)
        .bind(&enquiry.email)
        .bind(&enquiry.phone)
        .bind(enquiry.source)
        .bind(enquiry.project_type)
        .bind(&enquiry.message)
        .bind(enquiry.status)
        .bind(enquiry.lead_id)
        .bind(enquiry.created_at)
        .bind(enquiry.updated_at)
        .execute(pool)
        .await?;

        Ok(enquiry)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let enquiry = sqlx::query_as::<_, Enquiry>("SELECT * FROM enquiries WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(enquiry)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("enquiry", id))
    }

    pub async fn list(pool: &SqlitePool, filter: &EnquiryFilter, params: &ListParams) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "created_at")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("status", filter.status.map(|s| s.as_str()))
            .eq("source", filter.source.map(|s| s.as_str()))
            .search(&["name", "email", "phone"], filter.q.as_deref());

        fetch_page(pool, "enquiries", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: EnquiryPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut enquiry = Self::get(&mut *tx, id).await?;

        if enquiry.status == EnquiryStatus::Converted {
            return Err(Error::Conflict(format!("enquiry {} has been converted", id)));
        }

        if let Some(name) = patch.name {
            enquiry.name = required_text("name", &name)?;
        }
        if let Some(email) = patch.email {
            enquiry.email = optional_text(Some(email));
            validate_email(enquiry.email.as_deref())?;
        }
        if let Some(phone) = patch.phone {
            enquiry.phone = optional_text(Some(phone));
        }
        require_contact_route(enquiry.email.as_deref(), enquiry.phone.as_deref())?;
        if let Some(source) = patch.source {
            enquiry.source = source;
        }
        if let Some(project_type) = patch.project_type {
            enquiry.project_type = project_type;
        }
        if let Some(message) = patch.message {
            enquiry.message = optional_text(Some(message));
        }
        if let Some(status) = patch.status {
            if status == EnquiryStatus::Converted {
                return Err(Error::InvalidInput(
                    "use the convert operation to convert an enquiry".to_string(),
                ));
            }
            enquiry.status = status;
        }
        enquiry.updated_at = time::now();

        sqlx::query(
            r#"
            UPDATE enquiries
            SET name = ?, email = ?, phone = ?, source = ?, project_type = ?, message = ?,
                status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&enquiry.name)
        .bind(&enquiry.email)
        .bind(&enquiry.phone)
        .bind(enquiry.source)
        .bind(enquiry.project_type)
        .bind(&enquiry.message)
        .bind(enquiry.status)
        .bind(enquiry.updated_at)
        .bind(enquiry.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(enquiry)
    }

    /// Record the conversion; only called by the conversion workflow
    pub(crate) async fn mark_converted(conn: &mut SqliteConnection, id: Uuid, lead_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE enquiries SET status = ?, lead_id = ?, updated_at = ? WHERE id = ?")
            .bind(EnquiryStatus::Converted)
            .bind(lead_id)
            .bind(time::now())
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        let enquiry = Self::get(&mut *tx, id).await?;

        if enquiry.status == EnquiryStatus::Converted {
            return Err(Error::Conflict(format!("enquiry {} has been converted", id)));
        }

        detach_children(&mut *tx, EntityType::Enquiry, id).await?;
        sqlx::query("DELETE FROM enquiries WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
