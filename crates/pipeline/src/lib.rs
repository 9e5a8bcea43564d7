//! Event correlation and incident lifecycle pipeline.
//!
//! [`IncidentChecker`] turns unhandled monitoring events into incidents and
//! [`AgingResolver`] closes incidents that have gone quiet. Both are [`runtime::Job`]s.

/// Auto-resolution of inactive incidents
pub mod aging;
/// Event-to-incident orchestrator
pub mod checker;
/// Incident payload assembly and submission
pub mod creator;
/// Fingerprinting and duplicate lookup
pub mod dedup;
/// Paginated event ingestion
pub mod ingest;
/// Chat notifications
pub mod notify;
/// Root cause heuristics
pub mod root_cause;
/// Team routing
pub mod routing;

pub use aging::{AgingOutcome, AgingReport, AgingResolver};
pub use checker::{CheckReport, EventOutcome, IncidentChecker, SkipReason};
pub use creator::IncidentCreator;
pub use dedup::{Deduplicator, fingerprint};
pub use ingest::EventIngestor;
pub use notify::{Delivery, NotificationDispatcher};
pub use root_cause::{Package, RootCause};
pub use routing::resolve_teams;
