//! Jobs: contracted installation projects

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    detach_children, optional_text, require_reference, required_text, validate_amount, EntityType,
    ProjectType,
};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Scheduled,
        JobStatus::InProgress,
        JobStatus::OnHold,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::InProgress => "in_progress",
            JobStatus::OnHold => "on_hold",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Scheduled | JobStatus::InProgress | JobStatus::OnHold)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress | OnHold | Cancelled)
                | (InProgress, OnHold | Completed | Cancelled)
                | (OnHold, InProgress | Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(skip)]
    pub seq: i64,
    /// Human-facing job number, e.g. JOB-00042
    pub reference: String,
    pub title: String,
    pub account_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub job_type: ProjectType,
    pub status: JobStatus,
    pub site_address: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Minor currency units
    pub contract_value: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub title: String,
    pub account_id: Uuid,
    #[serde(skip)]
    pub deal_id: Option<Uuid>,
    #[serde(default = "default_job_type")]
    pub job_type: ProjectType,
    pub site_address: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub contract_value: i64,
    pub notes: Option<String>,
}

fn default_job_type() -> ProjectType {
    ProjectType::Other
}

impl Default for NewJob {
    fn default() -> Self {
        Self {
            title: String::new(),
            account_id: Uuid::nil(),
            deal_id: None,
            job_type: default_job_type(),
            site_address: None,
            start_date: None,
            end_date: None,
            contract_value: 0,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobPatch {
    pub title: Option<String>,
    pub job_type: Option<ProjectType>,
    pub status: Option<JobStatus>,
    pub site_address: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub contract_value: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub account_id: Option<Uuid>,
    pub job_type: Option<ProjectType>,
    /// Substring match on reference, title or site address
    pub q: Option<String>,
}

fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "end_date {} is before start_date {}",
                end, start
            )));
        }
    }
    Ok(())
}

/// Settings row holding the last job sequence number handed out
const REFERENCE_SEQ_KEY: &str = "job_reference_seq";

/// Next sequence number and its formatted reference
///
/// The counter only grows, so a deleted job's reference is never issued
/// again. It starts above any existing `seq`.
async fn next_reference(conn: &mut SqliteConnection) -> Result<(i64, String)> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM jobs))
        ON CONFLICT(key) DO UPDATE SET value = CAST(value AS INTEGER) + 1,
                                       updated_at = CURRENT_TIMESTAMP
        RETURNING CAST(value AS INTEGER)
        "#,
    )
    .bind(REFERENCE_SEQ_KEY)
    .fetch_one(&mut *conn)
    .await?;
    let prefix: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'job_reference_prefix'")
            .fetch_optional(&mut *conn)
            .await?;
    let prefix = prefix.flatten().unwrap_or_else(|| "JOB-".to_string());
    Ok((seq, format!("{}{:05}", prefix, seq)))
}

impl Job {
    const SORT_COLUMNS: &'static [&'static str] = &[
        "reference",
        "title",
        "status",
        "start_date",
        "contract_value",
        "created_at",
        "updated_at",
    ];

    pub async fn create(pool: &SqlitePool, data: NewJob) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let job = Self::insert(&mut *tx, data).await?;
        tx.commit().await?;
        Ok(job)
    }

    pub async fn insert(conn: &mut SqliteConnection, data: NewJob) -> Result<Self> {
        require_reference(&mut *conn, EntityType::Account, Some(data.account_id)).await?;
        require_reference(&mut *conn, EntityType::Deal, data.deal_id).await?;
        validate_amount("contract_value", data.contract_value)?;
        validate_dates(data.start_date, data.end_date)?;
        let title = required_text("title", &data.title)?;

        let (seq, reference) = next_reference(&mut *conn).await?;
        let now = time::now();

        let job = Job {
            id: Uuid::new_v4(),
            seq,
            reference,
            title,
            account_id: data.account_id,
            deal_id: data.deal_id,
            job_type: data.job_type,
            status: JobStatus::Scheduled,
            site_address: optional_text(data.site_address),
            start_date: data.start_date,
            end_date: data.end_date,
            contract_value: data.contract_value,
            completed_at: None,
            notes: optional_text(data.notes),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (id, seq, reference, title, account_id, deal_id, job_type, status,
                              site_address, start_date, end_date, contract_value, completed_at,
                              notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(job.seq)
        .bind(&job.reference)
        .bind(&job.title)
        .bind(job.account_id)
        .bind(job.deal_id)
        .bind(job.job_type)
        .bind(job.status)
        .bind(&job.site_address)
        .bind(job.start_date)
        .bind(job.end_date)
        .bind(job.contract_value)
        .bind(job.completed_at)
        .bind(&job.notes)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(job)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(job)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("job", id))
    }

    pub async fn list(pool: &SqlitePool, filter: &JobFilter, params: &ListParams) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "reference")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("status", filter.status.map(|s| s.as_str()))
            .eq("account_id", filter.account_id)
            .eq("job_type", filter.job_type.map(|t| t.as_str()))
            .search(&["reference", "title", "site_address"], filter.q.as_deref());

        fetch_page(pool, "jobs", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: JobPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut job = Self::get(&mut *tx, id).await?;

        if let Some(title) = patch.title {
            job.title = required_text("title", &title)?;
        }
        if let Some(job_type) = patch.job_type {
            job.job_type = job_type;
        }
        if let Some(status) = patch.status {
            if status != job.status {
                if !job.status.can_transition_to(status) {
                    return Err(Error::Conflict(format!(
                        "job {} cannot move from {} to {}",
                        job.reference,
                        job.status.as_str(),
                        status.as_str()
                    )));
                }
                if status == JobStatus::Completed {
                    job.completed_at = Some(time::now());
                }
                job.status = status;
            }
        }
        if let Some(address) = patch.site_address {
            job.site_address = optional_text(Some(address));
        }
        if let Some(start) = patch.start_date {
            job.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            job.end_date = Some(end);
        }
        validate_dates(job.start_date, job.end_date)?;
        if let Some(value) = patch.contract_value {
            validate_amount("contract_value", value)?;
            job.contract_value = value;
        }
        if let Some(notes) = patch.notes {
            job.notes = optional_text(Some(notes));
        }
        job.updated_at = time::now();

        sqlx::query(
            r#"
            UPDATE jobs
            SET title = ?, job_type = ?, status = ?, site_address = ?, start_date = ?, end_date = ?,
                contract_value = ?, completed_at = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.title)
        .bind(job.job_type)
        .bind(job.status)
        .bind(&job.site_address)
        .bind(job.start_date)
        .bind(job.end_date)
        .bind(job.contract_value)
        .bind(job.completed_at)
        .bind(&job.notes)
        .bind(job.updated_at)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    /// Delete a job; the deal it came from becomes convertible again
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        Self::get(&mut *tx, id).await?;
        detach_children(&mut *tx, EntityType::Job, id).await?;

        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
