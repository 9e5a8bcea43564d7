use std::{pin::pin, time::Duration};

use async_trait::async_trait;
use clients::{BackendClient, Credentials};
use eyre::{Result, WrapErr};
use models::{AlertProviderKind, LogProviderKind, MonitoringEvent, Provider, ProviderType};
use runtime::Job;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::{
    creator::IncidentCreator,
    dedup::{Deduplicator, fingerprint},
    ingest::EventIngestor,
    notify::{Delivery, NotificationDispatcher},
    root_cause::RootCause,
    routing::resolve_teams,
};

/// Default time between two checker passes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Why an event did not lead to a new incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An incident with the same fingerprint already exists.
    AlreadyReported {
        /// Existing incident uuid
        incident_id: String,
    },
    /// The event carries no `server_name` tag.
    NoServerName,
    /// None of the reporting servers is a known host.
    NoHosts,
    /// The backend returned no teams.
    NoTeams,
}

/// Result of processing one unhandled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A new incident was opened.
    Created {
        /// New incident uuid
        incident_id: String,
        /// Notification result, `None` when no chat provider is enabled
        delivery: Option<Delivery>,
    },
    /// The event was skipped.
    Skipped(SkipReason),
}

/// Counters for one checker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Enabled log providers that were ingested
    pub providers_checked: usize,
    /// Providers whose handling failed part way
    pub providers_failed: usize,
    /// Providers skipped as disabled, misconfigured or unsupported
    pub providers_skipped: usize,
    /// Unhandled events examined
    pub events: usize,
    /// Incidents opened
    pub created: usize,
    /// Events matching an existing incident
    pub duplicates: usize,
    /// Events skipped for lack of hosts or teams
    pub skipped: usize,
    /// Events whose handling failed
    pub failed: usize,
}

impl CheckReport {
    fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Created { .. } => self.created += 1,
            EventOutcome::Skipped(SkipReason::AlreadyReported { .. }) => self.duplicates += 1,
            EventOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Turns unhandled monitoring events into incidents.
///
/// Each pass walks every enabled log provider. Failures are contained at two boundaries:
/// a failing provider does not stop the others, and a failing event does not stop the
/// rest of its page.
#[derive(Debug)]
pub struct IncidentChecker {
    backend: BackendClient,
    ingestor: EventIngestor,
    dedup: Deduplicator,
    creator: IncidentCreator,
    dispatcher: NotificationDispatcher,
    creds: Credentials,
    interval: Duration,
}

impl IncidentChecker {
    /// Create a checker with its own credential holder.
    pub fn new(
        backend: BackendClient,
        ingestor: EventIngestor,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(backend.clone()),
            creator: IncidentCreator::new(backend.clone()),
            backend,
            ingestor,
            dispatcher,
            creds: Credentials::new(),
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the time between passes.
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one pass over every log provider.
    pub async fn run_once(&mut self) -> Result<CheckReport> {
        let notify = self.chat_enabled().await?;
        let providers = self
            .backend
            .list_providers(&mut self.creds, ProviderType::Log)
            .await
            .wrap_err("failed to list log providers")?;

        let mut report = CheckReport::default();
        for provider in &providers {
            match provider.enabled() {
                Some(true) => {}
                Some(false) => {
                    debug!(provider = %provider.name, "log provider disabled");
                    report.providers_skipped += 1;
                    continue;
                }
                None => {
                    warn!(provider = %provider.name, "log provider has no enabled field, skipping");
                    report.providers_skipped += 1;
                    continue;
                }
            }

            match provider.log_kind() {
                LogProviderKind::Sentry => {
                    report.providers_checked += 1;
                    if let Err(e) = self.check_provider(provider, notify, &mut report).await {
                        error!(provider = %provider.name, error = ?e, "log provider check failed");
                        report.providers_failed += 1;
                    }
                }
                LogProviderKind::Unsupported(name) => {
                    warn!(provider = %name, "unsupported log provider, skipping");
                    report.providers_skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Whether any enabled alert provider is one the dispatcher can notify.
    async fn chat_enabled(&mut self) -> Result<bool> {
        let providers = self
            .backend
            .list_providers(&mut self.creds, ProviderType::Alert)
            .await
            .wrap_err("failed to list alert providers")?;

        let mut enabled = false;
        for provider in providers.iter().filter(|p| p.enabled() == Some(true)) {
            match provider.alert_kind() {
                AlertProviderKind::Slack => enabled = true,
                AlertProviderKind::Unsupported(name) => {
                    warn!(provider = %name, "unsupported alert provider, ignoring");
                }
            }
        }
        Ok(enabled)
    }

    async fn check_provider(
        &mut self,
        provider: &Provider,
        notify: bool,
        report: &mut CheckReport,
    ) -> Result<()> {
        let mut pages = pin!(self.ingestor.pages(provider, 0));
        while let Some(page) = pages.next().await {
            let page = page.wrap_err("failed to fetch events")?;
            for event in page.events.iter().filter(|e| e.is_unhandled()) {
                report.events += 1;
                match self.process_event(event, notify).await {
                    Ok(outcome) => report.record(&outcome),
                    Err(e) => {
                        error!(event_id = %event.id, error = ?e, "failed to process event");
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Correlate one unhandled event, opening and announcing an incident when it is new.
    pub async fn process_event(
        &mut self,
        event: &MonitoringEvent,
        notify: bool,
    ) -> Result<EventOutcome> {
        let fingerprint = fingerprint(event);
        if let Some(existing) = self
            .dedup
            .existing(&mut self.creds, &fingerprint)
            .await
            .wrap_err("failed to look up fingerprint")?
        {
            debug!(event_id = %event.id, incident_id = %existing.uuid, "event already reported");
            return Ok(EventOutcome::Skipped(SkipReason::AlreadyReported {
                incident_id: existing.uuid,
            }));
        }

        let server_names = event.server_names();
        if server_names.is_empty() {
            warn!(event_id = %event.id, "event has no server_name tag, skipping");
            return Ok(EventOutcome::Skipped(SkipReason::NoServerName));
        }

        let hosts = self
            .backend
            .list_hosts(&mut self.creds, &server_names)
            .await
            .wrap_err("failed to list hosts")?;
        if hosts.is_empty() {
            warn!(event_id = %event.id, ?server_names, "no known host for event, skipping");
            return Ok(EventOutcome::Skipped(SkipReason::NoHosts));
        }

        let teams =
            self.backend.list_teams(&mut self.creds).await.wrap_err("failed to list teams")?;
        if teams.is_empty() {
            warn!(event_id = %event.id, "backend returned no teams, skipping");
            return Ok(EventOutcome::Skipped(SkipReason::NoTeams));
        }

        let cause = RootCause::analyze(event.origin_file.as_deref(), &event.culprit);
        let team_ids = resolve_teams(&hosts, &teams, &event.title, &cause);
        debug!(event_id = %event.id, %cause, ?team_ids, "routed event");

        let draft = IncidentCreator::draft(event, &cause, &hosts, team_ids, fingerprint);
        let location = self
            .creator
            .submit(&mut self.creds, &draft)
            .await
            .wrap_err("failed to create incident")?;
        let incident_id = location.id().to_owned();

        let delivery = if notify {
            let resolved = teams.iter().filter(|t| draft.resolution_teams.contains(&t.uuid));
            let recipients = NotificationDispatcher::recipients(&hosts, resolved);
            Some(self.dispatcher.dispatch(&incident_id, &recipients).await)
        } else {
            None
        };

        Ok(EventOutcome::Created { incident_id, delivery })
    }
}

#[async_trait]
impl Job for IncidentChecker {
    fn name(&self) -> &'static str {
        "incident-checker"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&mut self) -> Result<()> {
        let report = self.run_once().await?;
        info!(?report, "incident check finished");
        Ok(())
    }
}
