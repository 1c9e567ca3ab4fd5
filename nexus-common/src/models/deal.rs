//! Deals: quoted work moving through the sales pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    detach_children, optional_text, require_reference, required_text, validate_amount, EntityType,
};
use crate::db::begin_write;
use crate::db::query::{fetch_page, resolve_sort, Conditions};
use crate::pagination::{ListParams, Page};
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DealStage {
    Survey,
    Design,
    Quotation,
    Negotiation,
    Won,
    Lost,
}

impl DealStage {
    pub const ALL: [DealStage; 6] = [
        DealStage::Survey,
        DealStage::Design,
        DealStage::Quotation,
        DealStage::Negotiation,
        DealStage::Won,
        DealStage::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DealStage::Survey => "survey",
            DealStage::Design => "design",
            DealStage::Quotation => "quotation",
            DealStage::Negotiation => "negotiation",
            DealStage::Won => "won",
            DealStage::Lost => "lost",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, DealStage::Won | DealStage::Lost)
    }

    /// Win probability a deal gets when it (re)enters this stage
    pub fn default_probability(self) -> i64 {
        match self {
            DealStage::Survey => 10,
            DealStage::Design => 25,
            DealStage::Quotation => 50,
            DealStage::Negotiation => 75,
            DealStage::Won => 100,
            DealStage::Lost => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub account_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub stage: DealStage,
    /// Minor currency units
    pub value: i64,
    /// Percentage, 0..=100
    pub probability: i64,
    pub expected_close_date: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDeal {
    pub title: String,
    pub account_id: Uuid,
    #[serde(skip)]
    pub lead_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    #[serde(default = "default_stage")]
    pub stage: DealStage,
    #[serde(default)]
    pub value: i64,
    pub probability: Option<i64>,
    pub expected_close_date: Option<NaiveDate>,
}

fn default_stage() -> DealStage {
    DealStage::Survey
}

impl Default for NewDeal {
    fn default() -> Self {
        Self {
            title: String::new(),
            account_id: Uuid::nil(),
            lead_id: None,
            contact_id: None,
            stage: default_stage(),
            value: 0,
            probability: None,
            expected_close_date: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealPatch {
    pub title: Option<String>,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub value: Option<i64>,
    pub probability: Option<i64>,
    pub expected_close_date: Option<NaiveDate>,
}

/// Request body for moving a deal to another stage
#[derive(Debug, Clone, Deserialize)]
pub struct StageChange {
    pub stage: DealStage,
    /// Required when moving to `lost`
    pub lost_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealFilter {
    pub stage: Option<DealStage>,
    pub account_id: Option<Uuid>,
    /// `true`: only open deals, `false`: only closed deals
    pub open: Option<bool>,
    /// Substring match on title
    pub q: Option<String>,
}

fn validate_probability(value: i64) -> Result<()> {
    if !(0..=100).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "probability must be between 0 and 100, got {}",
            value
        )));
    }
    Ok(())
}

impl Deal {
    const SORT_COLUMNS: &'static [&'static str] = &[
        "title",
        "stage",
        "value",
        "probability",
        "expected_close_date",
        "created_at",
        "updated_at",
    ];

    pub async fn create(pool: &SqlitePool, data: NewDeal) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let deal = Self::insert(&mut *tx, data).await?;
        tx.commit().await?;
        Ok(deal)
    }

    pub async fn insert(conn: &mut SqliteConnection, data: NewDeal) -> Result<Self> {
        require_reference(&mut *conn, EntityType::Account, Some(data.account_id)).await?;
        require_reference(&mut *conn, EntityType::Contact, data.contact_id).await?;
        require_reference(&mut *conn, EntityType::Lead, data.lead_id).await?;
        validate_amount("value", data.value)?;

        if data.stage.is_closed() {
            return Err(Error::InvalidInput(
                "a deal must be created at an open stage".to_string(),
            ));
        }
        let probability = data
            .probability
            .unwrap_or_else(|| data.stage.default_probability());
        validate_probability(probability)?;
        let now = time::now();

        let deal = Deal {
            id: Uuid::new_v4(),
            title: required_text("title", &data.title)?,
            account_id: data.account_id,
            lead_id: data.lead_id,
            contact_id: data.contact_id,
            stage: data.stage,
            value: data.value,
            probability,
            expected_close_date: data.expected_close_date,
            closed_at: None,
            lost_reason: None,
            job_id: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO deals (id, title, account_id, lead_id, contact_id, stage, value, probability,
                               expected_close_date, closed_at, lost_reason, job_id,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(deal.id)
        .bind(&deal.title)
        .bind(deal.account_id)
        .bind(deal.lead_id)
        .bind(deal.contact_id)
        .bind(deal.stage)
        .bind(deal.value)
        .bind(deal.probability)
        .bind(deal.expected_close_date)
        .bind(deal.closed_at)
        .bind(&deal.lost_reason)
        .bind(deal.job_id)
        .bind(deal.created_at)
        .bind(deal.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(deal)
    }

    pub async fn find<'e, E>(db: E, id: Uuid) -> Result<Option<Self>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let deal = sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(deal)
    }

    pub async fn get<'e, E>(db: E, id: Uuid) -> Result<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| Error::not_found("deal", id))
    }

    pub async fn list(pool: &SqlitePool, filter: &DealFilter, params: &ListParams) -> Result<Page<Self>> {
        let sort = resolve_sort(params.sort.as_deref(), Self::SORT_COLUMNS, "created_at")?;

        let mut conditions = Conditions::new();
        conditions
            .eq("stage", filter.stage.map(|s| s.as_str()))
            .eq("account_id", filter.account_id)
            .search(&["title"], filter.q.as_deref());
        match filter.open {
            Some(true) => {
                conditions.push("stage NOT IN ('won', 'lost')", vec![]);
            }
            Some(false) => {
                conditions.push("stage IN ('won', 'lost')", vec![]);
            }
            None => {}
        }

        fetch_page(pool, "deals", &conditions, sort, params).await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, patch: DealPatch) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut deal = Self::get(&mut *tx, id).await?;

        if let Some(title) = patch.title {
            deal.title = required_text("title", &title)?;
        }
        if let Some(account_id) = patch.account_id {
            require_reference(&mut *tx, EntityType::Account, Some(account_id)).await?;
            deal.account_id = account_id;
        }
        if let Some(contact_id) = patch.contact_id {
            require_reference(&mut *tx, EntityType::Contact, Some(contact_id)).await?;
            deal.contact_id = Some(contact_id);
        }
        if let Some(value) = patch.value {
            validate_amount("value", value)?;
            deal.value = value;
        }
        if let Some(probability) = patch.probability {
            if deal.stage.is_closed() {
                return Err(Error::Conflict(format!(
                    "deal {} is {}; its probability is fixed",
                    id,
                    deal.stage.as_str()
                )));
            }
            validate_probability(probability)?;
            deal.probability = probability;
        }
        if let Some(date) = patch.expected_close_date {
            deal.expected_close_date = Some(date);
        }
        deal.updated_at = time::now();

        deal.write(&mut *tx).await?;
        tx.commit().await?;
        Ok(deal)
    }

    /// Move the deal to another pipeline stage
    pub async fn change_stage(pool: &SqlitePool, id: Uuid, change: StageChange) -> Result<Self> {
        let mut tx = begin_write(pool).await?;
        let mut deal = Self::get(&mut *tx, id).await?;

        if deal.job_id.is_some() {
            return Err(Error::Conflict(format!(
                "deal {} has been converted to a job; its stage is fixed",
                id
            )));
        }
        if deal.stage == change.stage {
            return Ok(deal);
        }

        let now = time::now();
        match change.stage {
            DealStage::Won => {
                deal.probability = 100;
                deal.closed_at = Some(now);
                deal.lost_reason = None;
            }
            DealStage::Lost => {
                let reason = optional_text(change.lost_reason).ok_or_else(|| {
                    Error::InvalidInput("lost_reason is required when losing a deal".to_string())
                })?;
                deal.probability = 0;
                deal.closed_at = Some(now);
                deal.lost_reason = Some(reason);
            }
            open_stage => {
                if deal.stage.is_closed() {
                    deal.probability = open_stage.default_probability();
                }
                deal.closed_at = None;
                deal.lost_reason = None;
            }
        }
        deal.stage = change.stage;
        deal.updated_at = now;

        deal.write(&mut *tx).await?;
        tx.commit().await?;
        Ok(deal)
    }

    /// Link the job created from this deal; only called by the conversion workflow
    pub(crate) async fn attach_job(conn: &mut SqliteConnection, id: Uuid, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE deals SET job_id = ?, updated_at = ? WHERE id = ?")
            .bind(job_id)
            .bind(time::now())
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn write(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deals
            SET title = ?, account_id = ?, contact_id = ?, stage = ?, value = ?, probability = ?,
                expected_close_date = ?, closed_at = ?, lost_reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&self.title)
        .bind(self.account_id)
        .bind(self.contact_id)
        .bind(self.stage)
        .bind(self.value)
        .bind(self.probability)
        .bind(self.expected_close_date)
        .bind(self.closed_at)
        .bind(&self.lost_reason)
        .bind(self.updated_at)
        .bind(self.id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = begin_write(pool).await?;
        let deal = Self::get(&mut *tx, id).await?;

        if deal.job_id.is_some() {
            return Err(Error::Conflict(format!(
                "deal {} has been converted to a job",
                id
            )));
        }

        detach_children(&mut *tx, EntityType::Deal, id).await?;
        sqlx::query("DELETE FROM deals WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
