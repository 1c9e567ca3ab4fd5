//! CRM entity models and their queries
//!
//! Each entity owns its row struct (`FromRow`), the input types for create and
//! partial update, and `impl` blocks with the SQL. Functions that take a
//! `&mut SqliteConnection` run inside caller-owned transactions; the
//! pool-taking variants open their own.

pub mod account;
pub mod activity;
pub mod contact;
pub mod deal;
pub mod document;
pub mod enquiry;
pub mod job;
pub mod lead;
pub mod survey;

pub use account::{Account, AccountFilter, AccountPatch, AccountType, NewAccount};
pub use activity::{Activity, ActivityFilter, ActivityKind, ActivityPatch, ActivityState, NewActivity};
pub use contact::{Contact, ContactFilter, ContactPatch, NewContact};
pub use deal::{Deal, DealFilter, DealPatch, DealStage, NewDeal, StageChange};
pub use document::{Document, NewDocument};
pub use enquiry::{Enquiry, EnquiryFilter, EnquiryPatch, EnquiryStatus, NewEnquiry};
pub use job::{Job, JobFilter, JobPatch, JobStatus, NewJob};
pub use lead::{Lead, LeadFilter, LeadPatch, LeadStatus, NewLead};
pub use survey::{NewSurvey, Survey, SurveyCompletion, SurveyFilter, SurveyPatch, SurveyStatus};

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{Error, Result};

/// Where an enquiry or lead came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    Phone,
    Showroom,
    Social,
    Other,
}

impl LeadSource {
    pub const ALL: [LeadSource; 6] = [
        LeadSource::Website,
        LeadSource::Referral,
        LeadSource::Phone,
        LeadSource::Showroom,
        LeadSource::Social,
        LeadSource::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::Phone => "phone",
            LeadSource::Showroom => "showroom",
            LeadSource::Social => "social",
            LeadSource::Other => "other",
        }
    }
}

/// Kind of room or renovation a record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProjectType {
    Bathroom,
    Kitchen,
    Other,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Bathroom => "bathroom",
            ProjectType::Kitchen => "kitchen",
            ProjectType::Other => "other",
        }
    }
}

/// Entity kinds that activities and documents can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntityType {
    Account,
    Contact,
    Enquiry,
    Lead,
    Deal,
    Job,
    Survey,
    Activity,
    Document,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Account => "account",
            EntityType::Contact => "contact",
            EntityType::Enquiry => "enquiry",
            EntityType::Lead => "lead",
            EntityType::Deal => "deal",
            EntityType::Job => "job",
            EntityType::Survey => "survey",
            EntityType::Activity => "activity",
            EntityType::Document => "document",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            EntityType::Account => "accounts",
            EntityType::Contact => "contacts",
            EntityType::Enquiry => "enquiries",
            EntityType::Lead => "leads",
            EntityType::Deal => "deals",
            EntityType::Job => "jobs",
            EntityType::Survey => "surveys",
            EntityType::Activity => "activities",
            EntityType::Document => "documents",
        }
    }

    /// Whether activities and documents may be attached to this kind
    pub fn is_attachable(self) -> bool {
        !matches!(self, EntityType::Activity | EntityType::Document)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a row with `id` exists in the entity's table
pub async fn entity_exists(conn: &mut SqliteConnection, entity: EntityType, id: Uuid) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", entity.table());
    let exists: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(conn).await?;
    Ok(exists)
}

/// Fail with InvalidInput unless the referenced row exists
pub async fn require_reference(
    conn: &mut SqliteConnection,
    entity: EntityType,
    id: Option<Uuid>,
) -> Result<()> {
    if let Some(id) = id {
        if !entity_exists(conn, entity, id).await? {
            return Err(Error::InvalidInput(format!(
                "Referenced {} {} does not exist",
                entity, id
            )));
        }
    }
    Ok(())
}

/// Remove activities attached to an entity, refusing when documents are
/// still attached (their files must be deleted through the document store)
pub async fn detach_children(conn: &mut SqliteConnection, entity: EntityType, id: Uuid) -> Result<()> {
    let documents: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents WHERE entity_type = ? AND entity_id = ?",
    )
    .bind(entity)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    if documents > 0 {
        return Err(Error::Conflict(format!(
            "{} {} has {} attached document(s); delete them first",
            entity, id, documents
        )));
    }

    sqlx::query("DELETE FROM activities WHERE entity_type = ? AND entity_id = ?")
        .bind(entity)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Trim a required text field, rejecting blank values
pub fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank becomes None
pub fn optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Light email sanity check: one `@` with text on both sides
pub fn validate_email(value: Option<&str>) -> Result<()> {
    if let Some(email) = value {
        let mut parts = email.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        if local.is_empty() || domain.is_empty() || domain.contains('@') || email.contains(' ') {
            return Err(Error::InvalidInput(format!("Invalid email address: {}", email)));
        }
    }
    Ok(())
}

/// Reject negative money amounts
pub fn validate_amount(field: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::InvalidInput(format!("{} must not be negative", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("name", "  Smith  ").unwrap(), "Smith");
        assert!(matches!(required_text("name", "   "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(Some(" a ".into())), Some("a".into()));
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email(Some("ann@example.com")).is_ok());
        assert!(validate_email(None).is_ok());
        assert!(validate_email(Some("ann.example.com")).is_err());
        assert!(validate_email(Some("@example.com")).is_err());
        assert!(validate_email(Some("a@b@c")).is_err());
    }

    #[test]
    fn test_entity_type_serde_matches_as_str() {
        for entity in [EntityType::Account, EntityType::Survey, EntityType::Enquiry] {
            let json = serde_json::to_string(&entity).unwrap();
            assert_eq!(json, format!("\"{}\"", entity.as_str()));
        }
    }
}
