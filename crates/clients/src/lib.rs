//! HTTP clients for the backend, the monitoring provider and the chat provider.

/// Backend state store client and credential holder
pub mod backend;
/// Client error type
pub mod error;
/// Retry helpers for idempotent HTTP operations
pub mod retry;
/// Sentry client
pub mod sentry;
/// Slack client
pub mod slack;

pub use backend::{BackendClient, Credentials, IncidentQuery, Location};
pub use error::{Error, Result, Service};
pub use sentry::SentryClient;
pub use slack::SlackClient;
