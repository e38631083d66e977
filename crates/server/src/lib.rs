//! HTTP service for depot.
//!
//! - Update checks for devices, by header or by CDN-cacheable path
//! - Bundle administration behind a bearer token
//! - Health and version probes

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
