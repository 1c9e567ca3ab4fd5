//! Pipeline conversions: enquiry -> lead -> deal -> job
//!
//! Each step runs in a single transaction so a failure leaves no half-made
//! records behind. Callers emit [`Conversion::event`] once the step commits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db::begin_write;
use crate::events::CrmEvent;
use crate::models::{
    optional_text, require_reference, Account, Contact, Deal, DealStage, EntityType, Enquiry,
    Job, Lead, NewAccount, NewContact, NewDeal, NewJob, NewLead, ProjectType,
};
use crate::{Error, Result};

/// Probability given to deals opened from a lead
pub const CONVERTED_DEAL_PROBABILITY: i64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertEnquiry {
    /// Attach to this account instead of creating one
    pub account_id: Option<Uuid>,
    /// Lead title; defaults to the enquirer's name and project type
    pub title: Option<String>,
    #[serde(default)]
    pub estimated_value: i64,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertLead {
    /// Used only when the lead has no account of its own
    pub account_id: Option<Uuid>,
    /// Deal title; defaults to the lead title
    pub title: Option<String>,
    pub expected_close_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertDeal {
    pub start_date: Option<NaiveDate>,
    /// Defaults to the account's postal address
    pub site_address: Option<String>,
    /// Defaults to the originating lead's project type
    pub job_type: Option<ProjectType>,
}

/// Ids produced by one conversion step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub from_type: EntityType,
    pub from_id: Uuid,
    pub to_type: EntityType,
    pub to_id: Uuid,
    /// Account involved, newly created or existing
    pub account_id: Uuid,
    /// Contact created from an enquiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<Uuid>,
    /// Reference of a job created from a deal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<String>,
}

impl Conversion {
    pub fn event(&self) -> CrmEvent {
        CrmEvent::converted(self.from_type, self.from_id, self.to_type, self.to_id)
    }
}

/// Split "Jane van Dijk" into ("Jane", "van Dijk")
fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

fn postal_address(account: &Account) -> Option<String> {
    let parts: Vec<&str> = [
        &account.address_line1,
        &account.address_line2,
        &account.city,
        &account.postcode,
    ]
    .into_iter()
    .filter_map(|part| part.as_deref())
    .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Turn an open enquiry into a lead with an account and primary contact
pub async fn convert_enquiry(pool: &SqlitePool, id: Uuid, opts: ConvertEnquiry) -> Result<Conversion> {
    let mut tx = begin_write(pool).await?;
    let enquiry = Enquiry::get(&mut *tx, id).await?;
    if !enquiry.is_open() {
        return Err(Error::Conflict(format!(
            "enquiry {} is {} and cannot be converted",
            id,
            enquiry.status.as_str()
        )));
    }

    let account_id = match opts.account_id {
        Some(account_id) => {
            require_reference(&mut *tx, EntityType::Account, Some(account_id)).await?;
            account_id
        }
        None => {
            let account = Account::insert(
                &mut *tx,
                NewAccount {
                    name: enquiry.name.clone(),
                    email: enquiry.email.clone(),
                    phone: enquiry.phone.clone(),
                    ..Default::default()
                },
            )
            .await?;
            account.id
        }
    };

    let (first_name, last_name) = split_name(&enquiry.name);
    let contact = Contact::insert(
        &mut *tx,
        NewContact {
            account_id: Some(account_id),
            first_name,
            last_name,
            email: enquiry.email.clone(),
            phone: enquiry.phone.clone(),
            role: None,
            is_primary: true,
        },
    )
    .await?;

    let title = optional_text(opts.title)
        .unwrap_or_else(|| format!("{} ({})", enquiry.name, enquiry.project_type.as_str()));
    let lead = Lead::insert(
        &mut *tx,
        NewLead {
            title,
            account_id: Some(account_id),
            contact_id: Some(contact.id),
            enquiry_id: Some(enquiry.id),
            source: enquiry.source,
            project_type: enquiry.project_type,
            estimated_value: opts.estimated_value,
            assigned_to: opts.assigned_to,
            notes: enquiry.message.clone(),
        },
    )
    .await?;

    Enquiry::mark_converted(&mut *tx, enquiry.id, lead.id).await?;
    tx.commit().await?;

    info!(
        "Converted enquiry {} into lead {} with contact {}",
        enquiry.id,
        lead.id,
        contact.full_name()
    );
    Ok(Conversion {
        from_type: EntityType::Enquiry,
        from_id: enquiry.id,
        to_type: EntityType::Lead,
        to_id: lead.id,
        account_id,
        contact_id: Some(contact.id),
        job_reference: None,
    })
}

/// Open a deal from a new or qualified lead
pub async fn convert_lead(pool: &SqlitePool, id: Uuid, opts: ConvertLead) -> Result<Conversion> {
    let mut tx = begin_write(pool).await?;
    let lead = Lead::get(&mut *tx, id).await?;
    if !lead.is_convertible() {
        return Err(Error::Conflict(format!(
            "lead {} is {} and cannot be converted",
            id,
            lead.status.as_str()
        )));
    }

    let account_id = match (lead.account_id, opts.account_id) {
        (Some(account_id), _) => account_id,
        (None, Some(account_id)) => {
            require_reference(&mut *tx, EntityType::Account, Some(account_id)).await?;
            account_id
        }
        (None, None) => {
            let account = Account::insert(
                &mut *tx,
                NewAccount {
                    name: lead.title.clone(),
                    ..Default::default()
                },
            )
            .await?;
            account.id
        }
    };

    let deal = Deal::insert(
        &mut *tx,
        NewDeal {
            title: optional_text(opts.title).unwrap_or_else(|| lead.title.clone()),
            account_id,
            lead_id: Some(lead.id),
            contact_id: lead.contact_id,
            stage: DealStage::Survey,
            value: lead.estimated_value,
            probability: Some(CONVERTED_DEAL_PROBABILITY),
            expected_close_date: opts.expected_close_date,
        },
    )
    .await?;

    Lead::mark_converted(&mut *tx, lead.id, account_id, deal.id).await?;
    tx.commit().await?;

    info!("Converted lead {} into deal {}", lead.id, deal.id);
    Ok(Conversion {
        from_type: EntityType::Lead,
        from_id: lead.id,
        to_type: EntityType::Deal,
        to_id: deal.id,
        account_id,
        contact_id: None,
        job_reference: None,
    })
}

/// Create the job for a won deal
pub async fn convert_deal(pool: &SqlitePool, id: Uuid, opts: ConvertDeal) -> Result<Conversion> {
    let mut tx = begin_write(pool).await?;
    let deal = Deal::get(&mut *tx, id).await?;
    if deal.stage != DealStage::Won {
        return Err(Error::Conflict(format!(
            "deal {} is at stage {}; only won deals become jobs",
            id,
            deal.stage.as_str()
        )));
    }
    if let Some(job_id) = deal.job_id {
        return Err(Error::Conflict(format!(
            "deal {} already has job {}",
            id, job_id
        )));
    }

    let account = Account::get(&mut *tx, deal.account_id).await?;
    let job_type = match (opts.job_type, deal.lead_id) {
        (Some(job_type), _) => job_type,
        (None, Some(lead_id)) => Lead::find(&mut *tx, lead_id)
            .await?
            .map(|lead| lead.project_type)
            .unwrap_or(ProjectType::Other),
        (None, None) => ProjectType::Other,
    };

    let job = Job::insert(
        &mut *tx,
        NewJob {
            title: deal.title.clone(),
            account_id: deal.account_id,
            deal_id: Some(deal.id),
            job_type,
            site_address: optional_text(opts.site_address).or_else(|| postal_address(&account)),
            start_date: opts.start_date,
            end_date: None,
            contract_value: deal.value,
            notes: None,
        },
    )
    .await?;

    Deal::attach_job(&mut *tx, deal.id, job.id).await?;
    tx.commit().await?;

    info!("Converted deal {} into job {}", deal.id, job.reference);
    Ok(Conversion {
        from_type: EntityType::Deal,
        from_id: deal.id,
        to_type: EntityType::Job,
        to_id: job.id,
        account_id: deal.account_id,
        contact_id: None,
        job_reference: Some(job.reference),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use crate::models::{
        EnquiryStatus, JobStatus, LeadSource, LeadStatus, NewEnquiry, StageChange,
    };

    async fn enquiry(pool: &SqlitePool) -> Enquiry {
        Enquiry::create(
            pool,
            NewEnquiry {
                name: "Maria Gonzalez Ruiz".into(),
                email: Some("maria@example.com".into()),
                phone: None,
                source: LeadSource::Showroom,
                project_type: ProjectType::Kitchen,
                message: Some("Wants an island".into()),
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Ann"), ("Ann".into(), String::new()));
        assert_eq!(
            split_name(" Jan  van Dijk "),
            ("Jan".into(), "van Dijk".into())
        );
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let pool = init_memory_database().await.unwrap();
        let enquiry = enquiry(&pool).await;

        let to_lead = convert_enquiry(
            &pool,
            enquiry.id,
            ConvertEnquiry {
                estimated_value: 1_800_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let stored = Enquiry::get(&pool, enquiry.id).await.unwrap();
        assert_eq!(stored.status, EnquiryStatus::Converted);
        assert_eq!(stored.lead_id, Some(to_lead.to_id));

        let lead = Lead::get(&pool, to_lead.to_id).await.unwrap();
        assert_eq!(lead.source, LeadSource::Showroom);
        assert_eq!(lead.project_type, ProjectType::Kitchen);
        assert_eq!(lead.account_id, Some(to_lead.account_id));

        let contact = Contact::get(&pool, to_lead.contact_id.unwrap()).await.unwrap();
        assert!(contact.is_primary);
        assert_eq!(contact.first_name, "Maria");
        assert_eq!(contact.last_name, "Gonzalez Ruiz");

        let to_deal = convert_lead(&pool, lead.id, ConvertLead::default()).await.unwrap();
        let deal = Deal::get(&pool, to_deal.to_id).await.unwrap();
        assert_eq!(deal.stage, DealStage::Survey);
        assert_eq!(deal.probability, CONVERTED_DEAL_PROBABILITY);
        assert_eq!(deal.value, 1_800_000);
        assert_eq!(deal.account_id, to_lead.account_id);
        assert_eq!(
            Lead::get(&pool, lead.id).await.unwrap().status,
            LeadStatus::Converted
        );

        Deal::change_stage(
            &pool,
            deal.id,
            StageChange {
                stage: DealStage::Won,
                lost_reason: None,
            },
        )
        .await
        .unwrap();

        let to_job = convert_deal(&pool, deal.id, ConvertDeal::default()).await.unwrap();
        assert_eq!(to_job.job_reference.as_deref(), Some("JOB-00001"));
        let job = Job::get(&pool, to_job.to_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.contract_value, 1_800_000);
        assert_eq!(job.job_type, ProjectType::Kitchen);
        assert_eq!(job.deal_id, Some(deal.id));
        assert_eq!(Deal::get(&pool, deal.id).await.unwrap().job_id, Some(job.id));

        match to_job.event() {
            CrmEvent::Converted { from_type, to_type, .. } => {
                assert_eq!(from_type, EntityType::Deal);
                assert_eq!(to_type, EntityType::Job);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enquiry_converts_once() {
        let pool = init_memory_database().await.unwrap();
        let enquiry = enquiry(&pool).await;
        convert_enquiry(&pool, enquiry.id, ConvertEnquiry::default())
            .await
            .unwrap();

        let again = convert_enquiry(&pool, enquiry.id, ConvertEnquiry::default()).await;
        assert!(matches!(again, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_unknown_account_rolls_back() {
        let pool = init_memory_database().await.unwrap();
        let enquiry = enquiry(&pool).await;

        let result = convert_enquiry(
            &pool,
            enquiry.id,
            ConvertEnquiry {
                account_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let stored = Enquiry::get(&pool, enquiry.id).await.unwrap();
        assert_eq!(stored.status, EnquiryStatus::New);
        let leads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(leads, 0);
    }

    #[tokio::test]
    async fn test_lead_without_account_gets_one() {
        let pool = init_memory_database().await.unwrap();
        let lead = Lead::create(&pool, NewLead::titled("Loft ensuite")).await.unwrap();

        let conversion = convert_lead(&pool, lead.id, ConvertLead::default()).await.unwrap();
        let account = Account::get(&pool, conversion.account_id).await.unwrap();
        assert_eq!(account.name, "Loft ensuite");
    }

    #[tokio::test]
    async fn test_open_deal_cannot_become_job() {
        let pool = init_memory_database().await.unwrap();
        let lead = Lead::create(&pool, NewLead::titled("Utility room")).await.unwrap();
        let conversion = convert_lead(&pool, lead.id, ConvertLead::default()).await.unwrap();

        let result = convert_deal(&pool, conversion.to_id, ConvertDeal::default()).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
