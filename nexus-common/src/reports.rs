//! Dashboard counters and aggregate reports
//!
//! All money figures are minor currency units. Every report lists each enum
//! value even when it has no rows, so charts keep a stable shape.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;

use crate::db::settings::get_setting;
use crate::models::{ActivityKind, DealStage, JobStatus, LeadSource};
use crate::{time, Error, Result};

const DEFAULT_SURVEY_LOOKAHEAD_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Dashboard {
    pub open_enquiries: i64,
    pub open_leads: i64,
    pub open_deals: i64,
    pub pipeline_value: i64,
    pub weighted_pipeline: i64,
    pub won_this_month: i64,
    pub won_value_this_month: i64,
    pub active_jobs: i64,
    pub overdue_activities: i64,
    pub activities_due_today: i64,
    pub upcoming_surveys: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTotal {
    pub stage: DealStage,
    pub count: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTotal {
    pub source: LeadSource,
    pub total: i64,
    pub converted: i64,
    /// converted / total, 0.0 when there are no leads
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusTotal {
    pub status: JobStatus,
    pub count: i64,
    pub contract_value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRevenue {
    /// 1..=12
    pub month: u32,
    pub deals_won: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityKindTotal {
    pub kind: ActivityKind,
    pub total: i64,
    pub completed: i64,
    pub open: i64,
    pub overdue: i64,
}

async fn survey_lookahead_days(pool: &SqlitePool) -> Result<i64> {
    let days = get_setting(pool, "survey_lookahead_days")
        .await?
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|days| *days > 0)
        .unwrap_or(DEFAULT_SURVEY_LOOKAHEAD_DAYS);
    Ok(days)
}

/// Headline counters as of `at`
pub async fn dashboard_at(pool: &SqlitePool, at: DateTime<Utc>) -> Result<Dashboard> {
    let month_start = time::start_of_month(at);
    let day_start = time::start_of_day(at);
    let day_end = day_start + Duration::days(1);
    let survey_end = at + Duration::days(survey_lookahead_days(pool).await?);

    let dashboard = sqlx::query_as::<_, Dashboard>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM enquiries WHERE status IN ('new', 'contacted')) AS open_enquiries,
            (SELECT COUNT(*) FROM leads WHERE status IN ('new', 'qualified')) AS open_leads,
            (SELECT COUNT(*) FROM deals WHERE stage NOT IN ('won', 'lost')) AS open_deals,
            (SELECT COALESCE(SUM(value), 0) FROM deals
                WHERE stage NOT IN ('won', 'lost')) AS pipeline_value,
            (SELECT COALESCE(SUM(value * probability / 100), 0) FROM deals
                WHERE stage NOT IN ('won', 'lost')) AS weighted_pipeline,
            (SELECT COUNT(*) FROM deals
                WHERE stage = 'won' AND closed_at >= ?1) AS won_this_month,
            (SELECT COALESCE(SUM(value), 0) FROM deals
                WHERE stage = 'won' AND closed_at >= ?1) AS won_value_this_month,
            (SELECT COUNT(*) FROM jobs
                WHERE status IN ('scheduled', 'in_progress', 'on_hold')) AS active_jobs,
            (SELECT COUNT(*) FROM activities
                WHERE completed_at IS NULL AND due_at IS NOT NULL AND due_at < ?2) AS overdue_activities,
            (SELECT COUNT(*) FROM activities
                WHERE completed_at IS NULL AND due_at >= ?3 AND due_at < ?4) AS activities_due_today,
            (SELECT COUNT(*) FROM surveys
                WHERE status = 'scheduled' AND scheduled_at >= ?2 AND scheduled_at < ?5) AS upcoming_surveys
        "#,
    )
    .bind(month_start)
    .bind(at)
    .bind(day_start)
    .bind(day_end)
    .bind(survey_end)
    .fetch_one(pool)
    .await?;

    Ok(dashboard)
}

pub async fn dashboard(pool: &SqlitePool) -> Result<Dashboard> {
    dashboard_at(pool, time::now()).await
}

/// Deal count and value for every stage
pub async fn pipeline_by_stage(pool: &SqlitePool) -> Result<Vec<StageTotal>> {
    let rows: Vec<(DealStage, i64, i64)> = sqlx::query_as(
        "SELECT stage, COUNT(*), COALESCE(SUM(value), 0) FROM deals GROUP BY stage",
    )
    .fetch_all(pool)
    .await?;
    let by_stage: HashMap<DealStage, (i64, i64)> =
        rows.into_iter().map(|(stage, count, value)| (stage, (count, value))).collect();

    Ok(DealStage::ALL
        .into_iter()
        .map(|stage| {
            let (count, value) = by_stage.get(&stage).copied().unwrap_or_default();
            StageTotal { stage, count, value }
        })
        .collect())
}

/// Lead volume and conversion rate for every source
pub async fn lead_sources(pool: &SqlitePool) -> Result<Vec<SourceTotal>> {
    let rows: Vec<(LeadSource, i64, i64)> = sqlx::query_as(
        r#"
        SELECT source, COUNT(*), SUM(CASE WHEN status = 'converted' THEN 1 ELSE 0 END)
        FROM leads
        GROUP BY source
        "#,
    )
    .fetch_all(pool)
    .await?;
    let by_source: HashMap<LeadSource, (i64, i64)> = rows
        .into_iter()
        .map(|(source, total, converted)| (source, (total, converted)))
        .collect();

    Ok(LeadSource::ALL
        .into_iter()
        .map(|source| {
            let (total, converted) = by_source.get(&source).copied().unwrap_or_default();
            let conversion_rate = if total == 0 {
                0.0
            } else {
                converted as f64 / total as f64
            };
            SourceTotal {
                source,
                total,
                converted,
                conversion_rate,
            }
        })
        .collect())
}

/// Job count and contract value for every status
pub async fn jobs_by_status(pool: &SqlitePool) -> Result<Vec<JobStatusTotal>> {
    let rows: Vec<(JobStatus, i64, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*), COALESCE(SUM(contract_value), 0) FROM jobs GROUP BY status",
    )
    .fetch_all(pool)
    .await?;
    let by_status: HashMap<JobStatus, (i64, i64)> = rows
        .into_iter()
        .map(|(status, count, value)| (status, (count, value)))
        .collect();

    Ok(JobStatus::ALL
        .into_iter()
        .map(|status| {
            let (count, contract_value) = by_status.get(&status).copied().unwrap_or_default();
            JobStatusTotal {
                status,
                count,
                contract_value,
            }
        })
        .collect())
}

/// Won deal value per calendar month of `year`, by close date
pub async fn revenue_by_month(pool: &SqlitePool, year: i32) -> Result<Vec<MonthRevenue>> {
    if !(1970..=9999).contains(&year) {
        return Err(Error::InvalidInput(format!("Unsupported year: {}", year)));
    }

    // closed_at is stored as RFC 3339 text, so the month is characters 6-7
    let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT CAST(substr(closed_at, 6, 2) AS INTEGER) AS month, COUNT(*), COALESCE(SUM(value), 0)
        FROM deals
        WHERE stage = 'won' AND closed_at IS NOT NULL AND substr(closed_at, 1, 4) = ?
        GROUP BY month
        "#,
    )
    .bind(format!("{:04}", year))
    .fetch_all(pool)
    .await?;
    let by_month: HashMap<i64, (i64, i64)> = rows
        .into_iter()
        .map(|(month, count, value)| (month, (count, value)))
        .collect();

    Ok((1..=12u32)
        .map(|month| {
            let (deals_won, value) = by_month.get(&i64::from(month)).copied().unwrap_or_default();
            MonthRevenue {
                month,
                deals_won,
                value,
            }
        })
        .collect())
}

/// Activity counts per kind as of `at`
pub async fn activity_summary_at(pool: &SqlitePool, at: DateTime<Utc>) -> Result<Vec<ActivityKindTotal>> {
    let rows: Vec<(ActivityKind, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT kind,
               COUNT(*),
               SUM(CASE WHEN completed_at IS NOT NULL THEN 1 ELSE 0 END),
               SUM(CASE WHEN completed_at IS NULL AND due_at IS NOT NULL AND due_at < ? THEN 1 ELSE 0 END)
        FROM activities
        GROUP BY kind
        "#,
    )
    .bind(at)
    .fetch_all(pool)
    .await?;
    let by_kind: HashMap<ActivityKind, (i64, i64, i64)> = rows
        .into_iter()
        .map(|(kind, total, completed, overdue)| (kind, (total, completed, overdue)))
        .collect();

    Ok(ActivityKind::ALL
        .into_iter()
        .map(|kind| {
            let (total, completed, overdue) = by_kind.get(&kind).copied().unwrap_or_default();
            ActivityKindTotal {
                kind,
                total,
                completed,
                open: total - completed,
                overdue,
            }
        })
        .collect())
}

pub async fn activity_summary(pool: &SqlitePool) -> Result<Vec<ActivityKindTotal>> {
    activity_summary_at(pool, time::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use crate::models::{
        Account, Activity, Deal, EntityType, Lead, NewAccount, NewActivity, NewDeal, NewLead,
        StageChange,
    };
    use uuid::Uuid;

    async fn account(pool: &SqlitePool) -> Uuid {
        Account::create(
            pool,
            NewAccount {
                name: "Fitzgerald".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn deal(pool: &SqlitePool, account_id: Uuid, value: i64, probability: i64) -> Deal {
        Deal::create(
            pool,
            NewDeal {
                title: "Wet room".into(),
                account_id,
                value,
                probability: Some(probability),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_dashboard() {
        let pool = init_memory_database().await.unwrap();
        let dashboard = dashboard(&pool).await.unwrap();
        assert_eq!(dashboard.open_deals, 0);
        assert_eq!(dashboard.pipeline_value, 0);
        assert_eq!(dashboard.upcoming_surveys, 0);
    }

    #[tokio::test]
    async fn test_dashboard_pipeline() {
        let pool = init_memory_database().await.unwrap();
        let account_id = account(&pool).await;
        deal(&pool, account_id, 1_000_000, 50).await;
        deal(&pool, account_id, 400_000, 25).await;
        let won = deal(&pool, account_id, 700_000, 75).await;
        Deal::change_stage(
            &pool,
            won.id,
            StageChange {
                stage: DealStage::Won,
                lost_reason: None,
            },
        )
        .await
        .unwrap();

        let dashboard = dashboard(&pool).await.unwrap();
        assert_eq!(dashboard.open_deals, 2);
        assert_eq!(dashboard.pipeline_value, 1_400_000);
        assert_eq!(dashboard.weighted_pipeline, 600_000);
        assert_eq!(dashboard.won_this_month, 1);
        assert_eq!(dashboard.won_value_this_month, 700_000);
    }

    #[tokio::test]
    async fn test_dashboard_activities() {
        let pool = init_memory_database().await.unwrap();
        let account_id = account(&pool).await;
        let at = time::now();
        for due in [at - Duration::days(3), at + Duration::days(30)] {
            Activity::create(
                &pool,
                NewActivity {
                    kind: ActivityKind::Call,
                    subject: "Chase quote".into(),
                    body: None,
                    entity_type: EntityType::Account,
                    entity_id: account_id,
                    due_at: Some(due),
                    assigned_to: None,
                },
            )
            .await
            .unwrap();
        }

        let dashboard = dashboard_at(&pool, at).await.unwrap();
        assert_eq!(dashboard.overdue_activities, 1);

        let summary = activity_summary_at(&pool, at).await.unwrap();
        assert_eq!(summary.len(), ActivityKind::ALL.len());
        let calls = summary.iter().find(|s| s.kind == ActivityKind::Call).unwrap();
        assert_eq!((calls.total, calls.open, calls.overdue), (2, 2, 1));
    }

    #[tokio::test]
    async fn test_pipeline_lists_every_stage() {
        let pool = init_memory_database().await.unwrap();
        let account_id = account(&pool).await;
        deal(&pool, account_id, 250_000, 10).await;

        let report = pipeline_by_stage(&pool).await.unwrap();
        assert_eq!(report.len(), DealStage::ALL.len());
        assert_eq!(report[0].stage, DealStage::Survey);
        assert_eq!(report[0].count, 1);
        assert_eq!(report[0].value, 250_000);
        assert!(report[1..].iter().all(|s| s.count == 0));
    }

    #[tokio::test]
    async fn test_lead_source_rates() {
        let pool = init_memory_database().await.unwrap();
        for title in ["Ensuite", "Cloakroom"] {
            let mut lead = NewLead::titled(title);
            lead.source = LeadSource::Referral;
            Lead::create(&pool, lead).await.unwrap();
        }
        let referral = Lead::list(&pool, &Default::default(), &Default::default())
            .await
            .unwrap()
            .items[0]
            .id;
        crate::conversion::convert_lead(&pool, referral, Default::default())
            .await
            .unwrap();

        let report = lead_sources(&pool).await.unwrap();
        let row = report.iter().find(|s| s.source == LeadSource::Referral).unwrap();
        assert_eq!((row.total, row.converted), (2, 1));
        assert!((row.conversion_rate - 0.5).abs() < f64::EPSILON);
        let web = report.iter().find(|s| s.source == LeadSource::Website).unwrap();
        assert_eq!(web.conversion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_revenue_by_month() {
        let pool = init_memory_database().await.unwrap();
        let account_id = account(&pool).await;
        let won = deal(&pool, account_id, 900_000, 50).await;
        Deal::change_stage(
            &pool,
            won.id,
            StageChange {
                stage: DealStage::Won,
                lost_reason: None,
            },
        )
        .await
        .unwrap();
        let closed_at = Deal::get(&pool, won.id).await.unwrap().closed_at.unwrap();

        use chrono::Datelike;
        let report = revenue_by_month(&pool, closed_at.year()).await.unwrap();
        assert_eq!(report.len(), 12);
        let month = &report[closed_at.month0() as usize];
        assert_eq!(month.month, closed_at.month());
        assert_eq!((month.deals_won, month.value), (1, 900_000));
        assert_eq!(report.iter().map(|m| m.value).sum::<i64>(), 900_000);

        assert!(revenue_by_month(&pool, 12).await.is_err());
    }

    #[tokio::test]
    async fn test_jobs_by_status_shape() {
        let pool = init_memory_database().await.unwrap();
        let report = jobs_by_status(&pool).await.unwrap();
        assert_eq!(report.len(), JobStatus::ALL.len());
        assert!(report.iter().all(|row| row.count == 0 && row.contract_value == 0));
    }
}
