//! # CRM Nexus Common Library
//!
//! Everything below the HTTP layer:
//! - Database initialization, migrations and settings
//! - Entity models with their queries
//! - Enquiry -> lead -> deal -> job conversions
//! - Dashboard and report aggregates
//! - API token storage
//! - Event bus and SSE stream
//! - Configuration loading

pub mod auth;
pub mod config;
pub mod conversion;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod pagination;
pub mod reports;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{CrmEvent, EventBus};
