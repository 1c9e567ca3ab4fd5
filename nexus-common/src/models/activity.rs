//! Activities: calls, emails, meetings, site visits, notes and tasks logged
//! against any attachable entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{entity_exists, optional_text, required_text, EntityType};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions, SqlValue};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActivityKind {
    Call,
    Email,
    Meeting,
    SiteVisit,
    Note,
    Task,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Call,
        ActivityKind::Email,
        ActivityKind::Meeting,
        ActivityKind::SiteVisit,
        ActivityKind::Note,
        ActivityKind::Task,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Call => "call",
            ActivityKind::Email => "email",
            ActivityKind::Meeting => "meeting",
            ActivityKind::SiteVisit => "site_visit",
            ActivityKind::Note => "note",
            ActivityKind::Task => "task",
        }
    }
}

/// Derived state used for filtering; not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Open,
    Completed,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub subject: String,
    pub body: Option<String>,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub subject: String,
    pub body: Option<String>,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub due_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityPatch {
    pub kind: Option<ActivityKind>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityFilter {
    pub kind: Option<ActivityKind>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    /// open, completed or overdue
    pub status: Option<ActivityState>,
    pub assigned_to: Option<String>,
    pub q: Option<String>,
}

impl Activity {
    const SORT_COLUMNS: &'static [&'static str] =
        &["due_at", "created_at", "updated_at", "completed_at", "subject"];

    pub fn is_overdue(&self, at: DateTime<Utc>) -> bool {
        self.completed_at.is_none() && self.due_at.is_some_and(|due| due < at)
    }

    pub async fn create(pool: &SqlitePool, data: NewActivity) -> Result<Self> {
        if !data.entity_type.is_attachable() {
            return Err(Error::InvalidInput(format!(
                "Activities cannot be attached to a {}",
                data.entity_type
            )));
        }
        let subject = required_text("subject", &data.subject)?;

        let mut conn = pool.acquire().await?;
        if !entity_exists(&mut conn, data.entity_type, data.entity_id).await? {
            return Err(Error::InvalidInput(format!(
                "Referenced {} {} does not exist",
                data.entity_type, data.entity_id
            )));
        }

        let now = time::now();
        let activity = Activity {
            id: Uuid::new_v4(),
            kind: data.kind,
            subject,
            body: optional_text(data.body),
            entity_type: data.entity_type,
            entity_id: data.entity_id,
            due_at: data.due_at,
            completed_at: None,
            assigned_to: optional_text(data.assigned_to),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO activities (id, kind, subject, body, entity_type, entity_id, due_at,
                                    completed_at, assigned_to, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(activity.id)
        .bind(activity.kind)
        .bind(&activity.subject)
        .bind(&activity.body)
        .bind(activity.entity_type)
        .bind(activity.entity_id)
        .bind(activity.due_at)
        .bind(activity.completed_at)
        .bind(&activity.assigned_to)
        .bind(activity.created_at)
        .bind(activity.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(activity)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let activity = sqlx::query_as::<_, Activity>("SELECT * FROM activities WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(activity)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("activity", id))
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &ActivityFilter,
        params: &ListParams,
    ) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "created_at")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("kind", filter.kind.map(|k| k.as_str()))
            .eq("entity_type", filter.entity_type.map(|e| e.as_str()))
            .eq("entity_id", filter.entity_id)
            .eq("assigned_to", filter.assigned_to.as_deref())
            .search(&["subject", "body"], filter.q.as_deref());

        match filter.status {
            Some(ActivityState::Open) => {
                conditions.push("completed_at IS NULL", vec![]);
            }
            Some(ActivityState::Completed) => {
                conditions.push("completed_at IS NOT NULL", vec![]);
            }
            Some(ActivityState::Overdue) => {
                conditions.push(
                    "completed_at IS NULL AND due_at IS NOT NULL AND due_at < ?",
                    vec![SqlValue::from(time::now())],
                );
            }
            None => {}
        }

        fetch_page(pool, "activities", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: ActivityPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut activity = Self::get(&mut *tx, id).await?;

        if let Some(kind) = patch.kind {
            activity.kind = kind;
        }
        if let Some(subject) = patch.subject {
            activity.subject = required_text("subject", &subject)?;
        }
        if let Some(body) = patch.body {
            activity.body = optional_text(Some(body));
        }
        if let Some(due_at) = patch.due_at {
            activity.due_at = Some(due_at);
        }
        if let Some(assigned_to) = patch.assigned_to {
            activity.assigned_to = optional_text(Some(assigned_to));
        }
        activity.updated_at = time::now();

        activity.write(&mut *tx).await?;
        tx.commit().await?;
        Ok(activity)
    }

    /// Mark done; completing twice keeps the first completion time
    pub async fn complete(pool: &SqlitePool, id: Uuid) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut activity = Self::get(&mut *tx, id).await?;

        if activity.completed_at.is_none() {
            let now = time::now();
            activity.completed_at = Some(now);
            activity.updated_at = now;
            activity.write(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(activity)
    }

    pub async fn reopen(pool: &SqlitePool, id: Uuid) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut activity = Self::get(&mut *tx, id).await?;

        if activity.completed_at.is_some() {
            activity.completed_at = None;
            activity.updated_at = time::now();
            activity.write(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(activity)
    }

    async fn write(&self, conn: &mut sqlx::SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE activities
            SET kind = ?, subject = ?, body = ?, due_at = ?, completed_at = ?, assigned_to = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(self.kind)
        .bind(&self.subject)
        .bind(&self.body)
        .bind(self.due_at)
        .bind(self.completed_at)
        .bind(&self.assigned_to)
        .bind(self.updated_at)
        .bind(self.id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM activities WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("activity", id));
        }
        Ok(())
    }
}
