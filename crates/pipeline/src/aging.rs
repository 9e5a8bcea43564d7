use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clients::{BackendClient, Credentials, IncidentQuery};
use eyre::{Result, WrapErr};
use models::Incident;
use runtime::Job;
use tracing::{debug, error, info, warn};

/// Comment posted on incidents closed for inactivity.
pub const RESOLUTION_COMMENT: &str = "Incident automatically resolved due to inactivity";

/// Default number of whole days without activity before an incident is closed.
pub const DEFAULT_INACTIVITY_DAYS: i64 = 21;

/// Default time between two resolver passes.
pub const DEFAULT_AGING_INTERVAL: Duration = Duration::from_secs(60);

/// Where an incident stands while it is being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AgingState {
    /// Untouched.
    Open,
    /// The closing comment is posted but the incident is not resolved yet.
    Resolving { comment_id: String },
    /// Closed.
    Resolved,
}

/// What happened to one incident during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgingOutcome {
    /// Recent activity, left alone.
    Active,
    /// Commented on and marked resolved.
    Resolved,
    /// The closing comment could not be posted or its id is unknown; the incident is
    /// unchanged.
    CommentFailed,
    /// Resolving failed and the closing comment was deleted again.
    RolledBack,
    /// Resolving failed and the closing comment could not be deleted.
    RollbackFailed,
}

/// Counters for one resolver pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgingReport {
    /// Unresolved incidents examined
    pub scanned: usize,
    /// Incidents with recent activity
    pub active: usize,
    /// Incidents closed
    pub resolved: usize,
    /// Incidents whose closing was rolled back
    pub rolled_back: usize,
    /// Incidents left in an inconsistent or unchanged state by a failure
    pub failed: usize,
}

impl AgingReport {
    fn record(&mut self, outcome: &AgingOutcome) {
        self.scanned += 1;
        match outcome {
            AgingOutcome::Active => self.active += 1,
            AgingOutcome::Resolved => self.resolved += 1,
            AgingOutcome::RolledBack => self.rolled_back += 1,
            AgingOutcome::CommentFailed | AgingOutcome::RollbackFailed => self.failed += 1,
        }
    }
}

/// Returns `true` if more than `threshold_days` whole days passed since the incident's
/// last activity.
pub fn is_inactive(incident: &Incident, now: DateTime<Utc>, threshold_days: i64) -> bool {
    (now - incident.last_activity()).num_days() > threshold_days
}

/// Closes incidents that have gone quiet.
///
/// Closing is a two step saga: post [`RESOLUTION_COMMENT`], then mark the incident
/// resolved. If the second step fails the comment is deleted so no incident carries a
/// closing comment without being closed.
#[derive(Debug)]
pub struct AgingResolver {
    backend: BackendClient,
    creds: Credentials,
    threshold_days: i64,
    interval: Duration,
}

impl AgingResolver {
    /// Create a resolver with its own credential holder.
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            creds: Credentials::new(),
            threshold_days: DEFAULT_INACTIVITY_DAYS,
            interval: DEFAULT_AGING_INTERVAL,
        }
    }

    /// Set the inactivity threshold in whole days.
    pub const fn with_threshold_days(mut self, days: i64) -> Self {
        self.threshold_days = days;
        self
    }

    /// Set the time between passes.
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Examine every unresolved incident as of `now`.
    pub async fn run_once_at(&mut self, now: DateTime<Utc>) -> Result<AgingReport> {
        let incidents = self
            .backend
            .list_incidents(&mut self.creds, &IncidentQuery::unresolved())
            .await
            .wrap_err("failed to list unresolved incidents")?;

        let mut report = AgingReport::default();
        for incident in incidents.iter().filter(|i| !i.is_resolved()) {
            let outcome = self.age(incident, now).await;
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Drive one incident through the closing saga.
    async fn age(&mut self, incident: &Incident, now: DateTime<Utc>) -> AgingOutcome {
        let id = incident.uuid.as_str();
        let mut state = AgingState::Open;
        loop {
            state = match state {
                AgingState::Open => {
                    if !is_inactive(incident, now, self.threshold_days) {
                        return AgingOutcome::Active;
                    }
                    debug!(incident_id = id, last_activity = %incident.last_activity(), "incident inactive");
                    match self.backend.post_comment(&mut self.creds, id, RESOLUTION_COMMENT).await {
                        Ok(location) => AgingState::Resolving { comment_id: location.id().to_owned() },
                        Err(e @ clients::Error::MissingHeader { .. }) => {
                            error!(
                                incident_id = id,
                                error = %e,
                                "closing comment posted without a location, it may be left orphaned"
                            );
                            return AgingOutcome::CommentFailed;
                        }
                        Err(e) => {
                            error!(incident_id = id, error = %e, "failed to post closing comment");
                            return AgingOutcome::CommentFailed;
                        }
                    }
                }
                AgingState::Resolving { comment_id } => {
                    let update = incident.resolved_update();
                    match self.backend.update_incident(&mut self.creds, id, &update).await {
                        Ok(()) => AgingState::Resolved,
                        Err(e) => {
                            error!(incident_id = id, error = %e, "failed to resolve incident, removing comment");
                            return self.roll_back(id, &comment_id).await;
                        }
                    }
                }
                AgingState::Resolved => {
                    info!(incident_id = id, "resolved inactive incident");
                    return AgingOutcome::Resolved;
                }
            };
        }
    }

    async fn roll_back(&mut self, incident_id: &str, comment_id: &str) -> AgingOutcome {
        match self.backend.delete_comment(&mut self.creds, incident_id, comment_id).await {
            Ok(()) => {
                warn!(incident_id, comment_id, "rolled back closing comment, incident stays open");
                AgingOutcome::RolledBack
            }
            Err(e) => {
                error!(incident_id, comment_id, error = %e, "failed to delete closing comment");
                AgingOutcome::RollbackFailed
            }
        }
    }
}

#[async_trait]
impl Job for AgingResolver {
    fn name(&self) -> &'static str {
        "aging-resolver"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&mut self) -> Result<()> {
        let report = self.run_once_at(Utc::now()).await?;
        info!(?report, "aging pass finished");
        Ok(())
    }
}
