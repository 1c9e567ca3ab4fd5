//! Site surveys: a surveyor's visit to measure up a room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{detach_children, optional_text, require_reference, EntityType, ProjectType};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions, SqlValue};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SurveyStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl SurveyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SurveyStatus::Scheduled => "scheduled",
            SurveyStatus::Completed => "completed",
            SurveyStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Survey {
    pub id: Uuid,
    pub account_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub surveyor: Option<String>,
    pub room_type: ProjectType,
    pub status: SurveyStatus,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form measurements recorded on site, always a JSON object
    pub measurements: Json<Value>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSurvey {
    pub account_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub surveyor: Option<String>,
    #[serde(default = "default_room_type")]
    pub room_type: ProjectType,
    pub scheduled_at: DateTime<Utc>,
    pub notes: Option<String>,
}

fn default_room_type() -> ProjectType {
    ProjectType::Other
}

/// Fields changeable while the survey is still scheduled
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyPatch {
    pub surveyor: Option<String>,
    pub room_type: Option<ProjectType>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub deal_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyCompletion {
    #[serde(default)]
    pub measurements: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyFilter {
    pub status: Option<SurveyStatus>,
    pub account_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub surveyor: Option<String>,
    /// Only surveys scheduled at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// Only surveys scheduled before this instant
    pub to: Option<DateTime<Utc>>,
}

fn validate_measurements(value: &Value) -> Result<()> {
    if !value.is_object() {
        return Err(Error::InvalidInput(
            "measurements must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

impl Survey {
    const SORT_COLUMNS: &'static [&'static str] =
        &["scheduled_at", "completed_at", "created_at", "updated_at"];

    pub async fn create(pool: &SqlitePool, data: NewSurvey) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        require_reference(&mut *tx, EntityType::Account, Some(data.account_id)).await?;
        require_reference(&mut *tx, EntityType::Deal, data.deal_id).await?;
        require_reference(&mut *tx, EntityType::Job, data.job_id).await?;

        let now = time::now();
        let survey = Survey {
            id: Uuid::new_v4(),
            account_id: data.account_id,
            deal_id: data.deal_id,
            job_id: data.job_id,
            surveyor: optional_text(data.surveyor),
            room_type: data.room_type,
            status: SurveyStatus::Scheduled,
            scheduled_at: data.scheduled_at,
            completed_at: None,
            measurements: Json(Value::Object(Default::default())),
            notes: optional_text(data.notes),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO surveys (id, account_id, deal_id, job_id, surveyor, room_type, status,
                                 scheduled_at, completed_at, measurements, notes, created_at,
                                 updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(survey.id)
        .bind(survey.account_id)
        .bind(survey.deal_id)
        .bind(survey.job_id)
        .bind(&survey.surveyor)
        .bind(survey.room_type)
        .bind(survey.status)
        .bind(survey.scheduled_at)
        .bind(survey.completed_at)
        .bind(&survey.measurements)
        .bind(&survey.notes)
        .bind(survey.created_at)
        .bind(survey.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(survey)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let survey = sqlx::query_as::<_, Survey>("SELECT * FROM surveys WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(survey)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("survey", id))
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &SurveyFilter,
        params: &ListParams,
    ) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "scheduled_at")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("status", filter.status.map(|s| s.as_str()))
            .eq("account_id", filter.account_id)
            .eq("deal_id", filter.deal_id)
            .eq("job_id", filter.job_id)
            .eq("surveyor", filter.surveyor.as_deref());
        if let Some(from) = filter.from {
            conditions.push("scheduled_at >= ?", vec![SqlValue::from(from)]);
        }
        if let Some(to) = filter.to {
            conditions.push("scheduled_at < ?", vec![SqlValue::from(to)]);
        }

        fetch_page(pool, "surveys", &conditions, sort, params).await
    }

    fn ensure_scheduled(&self, action: &str) -> Result<()> {
        if self.status != SurveyStatus::Scheduled {
            return Err(Error::Conflict(format!(
                "cannot {} a {} survey",
                action,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: SurveyPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut survey = Self::get(&mut *tx, id).await?;
        survey.ensure_scheduled("edit")?;

        if let Some(surveyor) = patch.surveyor {
            survey.surveyor = optional_text(Some(surveyor));
        }
        if let Some(room_type) = patch.room_type {
            survey.room_type = room_type;
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            survey.scheduled_at = scheduled_at;
        }
        if let Some(deal_id) = patch.deal_id {
            require_reference(&mut *tx, EntityType::Deal, Some(deal_id)).await?;
            survey.deal_id = Some(deal_id);
        }
        if let Some(job_id) = patch.job_id {
            require_reference(&mut *tx, EntityType::Job, Some(job_id)).await?;
            survey.job_id = Some(job_id);
        }
        if let Some(notes) = patch.notes {
            survey.notes = optional_text(Some(notes));
        }
        survey.updated_at = time::now();

        survey.write(&mut *tx).await?;
        tx.commit().await?;
        Ok(survey)
    }

    /// Record the visit; measurements replace whatever was stored
    pub async fn complete(pool: &SqlitePool, id: Uuid, completion: SurveyCompletion) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut survey = Self::get(&mut *tx, id).await?;
        survey.ensure_scheduled("complete")?;

        if let Some(measurements) = completion.measurements {
            validate_measurements(&measurements)?;
            survey.measurements = Json(measurements);
        }
        if let Some(notes) = completion.notes {
            survey.notes = optional_text(Some(notes));
        }
        let now = time::now();
        survey.status = SurveyStatus::Completed;
        survey.completed_at = Some(now);
        survey.updated_at = now;

        survey.write(&mut *tx).await?;
        tx.commit().await?;
        Ok(survey)
    }

    pub async fn cancel(pool: &SqlitePool, id: Uuid) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut survey = Self::get(&mut *tx, id).await?;
        survey.ensure_scheduled("cancel")?;

        survey.status = SurveyStatus::Cancelled;
        survey.updated_at = time::now();

        survey.write(&mut *tx).await?;
        tx.commit().await?;
        Ok(survey)
    }

    async fn write(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE surveys
            SET deal_id = ?, job_id = ?, surveyor = ?, room_type = ?, status = ?, scheduled_at = ?,
                completed_at = ?, measurements = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(self.deal_id)
        .bind(self.job_id)
        .bind(&self.surveyor)
        .bind(self.room_type)
        .bind(self.status)
        .bind(self.scheduled_at)
        .bind(self.completed_at)
        .bind(&self.measurements)
        .bind(&self.notes)
        .bind(self.updated_at)
        .bind(self.id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        Self::get(&mut *tx, id).await?;
        detach_children(&mut *tx, EntityType::Survey, id).await?;

        sqlx::query("DELETE FROM surveys WHERE id = ?")
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
    use crate::models::{Account, NewAccount};
    use chrono::Duration;
    use serde_json::json;

    async fn setup() -> (SqlitePool, Survey) {
        let pool = init_memory_database().await.unwrap();
        let account = Account::create(
            &pool,
            NewAccount {
                name: "Haddad".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let survey = Survey::create(
            &pool,
            NewSurvey {
                account_id: account.id,
                deal_id: None,
                job_id: None,
                surveyor: Some("Priya".into()),
                room_type: ProjectType::Kitchen,
                scheduled_at: time::now() + Duration::days(3),
                notes: None,
            },
        )
        .await
        .unwrap();
        (pool, survey)
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let (pool, survey) = setup().await;
        let stored = Survey::get(&pool, survey.id).await.unwrap();
        assert_eq!(stored.status, SurveyStatus::Scheduled);
        assert_eq!(stored.measurements.0, json!({}));
    }

    #[tokio::test]
    async fn test_complete_stores_measurements() {
        let (pool, survey) = setup().await;
        let completion = SurveyCompletion {
            measurements: Some(json!({"width_mm": 3200, "depth_mm": 2400})),
            notes: Some("Load-bearing wall on the north side".into()),
        };
        let done = Survey::complete(&pool, survey.id, completion).await.unwrap();
        assert_eq!(done.status, SurveyStatus::Completed);
        assert!(done.completed_at.is_some());

        let stored = Survey::get(&pool, survey.id).await.unwrap();
        assert_eq!(stored.measurements.0["width_mm"], 3200);

        assert!(matches!(Survey::cancel(&pool, survey.id).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_measurements_must_be_object() {
        let (pool, survey) = setup().await;
        let completion = SurveyCompletion {
            measurements: Some(json!([1, 2, 3])),
            notes: None,
        };
        assert!(matches!(
            Survey::complete(&pool, survey.id, completion).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_survey_is_frozen() {
        let (pool, survey) = setup().await;
        Survey::cancel(&pool, survey.id).await.unwrap();

        let patch = SurveyPatch {
            surveyor: Some("Tom".into()),
            ..Default::default()
        };
        assert!(matches!(Survey::update(&pool, survey.id, patch).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_window() {
        let (pool, survey) = setup().await;
        let now = time::now();
        let filter = SurveyFilter {
            from: Some(now),
            to: Some(now + Duration::days(7)),
            ..Default::default()
        };
        let page = Survey::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, survey.id);

        let filter = SurveyFilter {
            to: Some(now),
            ..Default::default()
        };
        let page = Survey::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }
}
