use clients::{BackendClient, Credentials, Location};
use models::{Fingerprint, Host, MonitoringEvent, NewIncident};
use tracing::info;

use crate::root_cause::RootCause;

/// Maximum length of an incident summary, in characters.
pub const SUMMARY_MAX_CHARS: usize = 100;
/// Maximum length of an incident description, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Assembles incident payloads and submits them to the backend.
#[derive(Debug, Clone)]
pub struct IncidentCreator {
    backend: BackendClient,
}

impl IncidentCreator {
    /// Create a creator backed by `backend`.
    pub const fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Build the payload for a new incident.
    pub fn draft(
        event: &MonitoringEvent,
        cause: &RootCause,
        hosts: &[Host],
        team_ids: Vec<String>,
        fingerprint: Fingerprint,
    ) -> NewIncident {
        let description = format!("{}\n{}\n{}", event.title, event.culprit, cause);
        NewIncident {
            summary: truncate(&event.title, SUMMARY_MAX_CHARS),
            description: truncate(&description, DESCRIPTION_MAX_CHARS),
            hosts_affected: hosts.iter().map(|h| h.uuid.clone()).collect(),
            resolution_teams: team_ids,
            hash: fingerprint,
        }
    }

    /// Submit `incident`, returning where the backend stored it.
    pub async fn submit(
        &self,
        creds: &mut Credentials,
        incident: &NewIncident,
    ) -> clients::Result<Location> {
        let location = self.backend.create_incident(creds, incident).await?;
        info!(incident_id = location.id(), hash = %incident.hash, "created incident");
        Ok(location)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
