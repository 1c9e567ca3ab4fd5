//! nexus-api library - CRM Nexus REST service
//!
//! Routes, shared state and the document store. The binary in `main.rs`
//! only resolves configuration and serves [`build_router`].

use axum::Router;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use nexus_common::EventBus;
use sqlx::SqlitePool;

pub mod api;
pub mod error;
pub mod storage;

use storage::DocumentStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Change notifications for `/api/events`
    pub events: EventBus,
    /// Uploaded document bytes
    pub documents: DocumentStore,
    /// When false every `/api/*` route is open
    pub require_auth: bool,
}

impl AppState {
    pub fn new(db: SqlitePool, events: EventBus, documents: DocumentStore, require_auth: bool) -> Self {
        Self {
            db,
            events,
            documents,
            require_auth,
        }
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` passes through
/// [`api::auth_middleware`].
pub fn build_router(state: AppState) -> Router {
    use api::{
        accounts, activities, contacts, deals, documents, enquiries, jobs, leads, reports,
        settings, surveys,
    };
    use axum::extract::DefaultBodyLimit;
    use axum::middleware;
    use axum::routing::{get, post, put};
    use tower_http::trace::TraceLayer;

    let upload_limit = DefaultBodyLimit::max(state.documents.max_upload_bytes());

    let protected = Router::new()
        .route(
            "/api/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/api/accounts/:id",
            get(accounts::get_account)
                .patch(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route("/api/accounts/:id/contacts", get(accounts::list_account_contacts))
        .route(
            "/api/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route(
            "/api/contacts/:id",
            get(contacts::get_contact)
                .patch(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route(
            "/api/enquiries",
            get(enquiries::list_enquiries).post(enquiries::create_enquiry),
        )
        .route(
            "/api/enquiries/:id",
            get(enquiries::get_enquiry)
                .patch(enquiries::update_enquiry)
                .delete(enquiries::delete_enquiry),
        )
        .route("/api/enquiries/:id/convert", post(enquiries::convert_enquiry))
        .route("/api/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/api/leads/:id",
            get(leads::get_lead)
                .patch(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route("/api/leads/:id/convert", post(leads::convert_lead))
        .route("/api/deals", get(deals::list_deals).post(deals::create_deal))
        .route(
            "/api/deals/:id",
            get(deals::get_deal)
                .patch(deals::update_deal)
                .delete(deals::delete_deal),
        )
        .route("/api/deals/:id/stage", post(deals::change_deal_stage))
        .route("/api/deals/:id/convert", post(deals::convert_deal))
        .route("/api/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/api/jobs/:id",
            get(jobs::get_job)
                .patch(jobs::update_job)
                .delete(jobs::delete_job),
        )
        .route(
            "/api/activities",
            get(activities::list_activities).post(activities::create_activity),
        )
        .route(
            "/api/activities/:id",
            get(activities::get_activity)
                .patch(activities::update_activity)
                .delete(activities::delete_activity),
        )
        .route("/api/activities/:id/complete", post(activities::complete_activity))
        .route("/api/activities/:id/reopen", post(activities::reopen_activity))
        .route(
            "/api/surveys",
            get(surveys::list_surveys).post(surveys::create_survey),
        )
        .route(
            "/api/surveys/:id",
            get(surveys::get_survey)
                .patch(surveys::update_survey)
                .delete(surveys::delete_survey),
        )
        .route("/api/surveys/:id/complete", post(surveys::complete_survey))
        .route("/api/surveys/:id/cancel", post(surveys::cancel_survey))
        .route(
            "/api/documents",
            get(documents::list_documents)
                .post(documents::upload_document)
                .layer(upload_limit),
        )
        .route(
            "/api/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/api/documents/:id/content", get(documents::download_document))
        .route("/api/dashboard", get(reports::get_dashboard))
        .route("/api/reports/pipeline", get(reports::pipeline_report))
        .route("/api/reports/lead-sources", get(reports::lead_source_report))
        .route("/api/reports/jobs", get(reports::job_status_report))
        .route("/api/reports/revenue", get(reports::revenue_report))
        .route("/api/reports/activities", get(reports::activity_report))
        .route("/api/settings", get(settings::get_settings))
        .route("/api/settings/:key", put(settings::put_setting))
        .route("/api/events", get(api::event_stream))
        .route("/api/buildinfo", get(api::get_build_info))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Socket address for a bare IPv4 or IPv6 bind address and a port
pub fn listen_addr(bind: &str, port: u16) -> Result<SocketAddr, AddrParseError> {
    let ip: IpAddr = bind.trim().trim_start_matches('[').trim_end_matches(']').parse()?;
    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr_ipv4_and_ipv6() {
        assert_eq!(listen_addr("127.0.0.1", 5780).unwrap().to_string(), "127.0.0.1:5780");
        assert_eq!(listen_addr("::1", 5780).unwrap().to_string(), "[::1]:5780");
        assert_eq!(listen_addr("[::]", 80).unwrap().to_string(), "[::]:80");
        assert!(listen_addr("localhost", 5780).is_err());
    }
}
