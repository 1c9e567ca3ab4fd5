//! HTTP API handlers for nexus-api

pub mod accounts;
pub mod activities;
pub mod auth;
pub mod buildinfo;
pub mod contacts;
pub mod deals;
pub mod documents;
pub mod enquiries;
pub mod events;
pub mod extract;
pub mod health;
pub mod jobs;
pub mod leads;
pub mod reports;
pub mod settings;
pub mod surveys;

pub use auth::auth_middleware;
pub use buildinfo::get_build_info;
pub use events::event_stream;
pub use health::health_routes;
