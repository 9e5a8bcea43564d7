use clients::{BackendClient, Credentials, IncidentQuery};
use models::{Fingerprint, Incident, MonitoringEvent};
use tracing::debug;

/// Compute the fingerprint of an event.
///
/// The digest covers the source-context lines of every frame pointing at the event's
/// origin file, concatenated in frame order. When no frame matches (or no origin file is
/// known) the digest of the empty string is returned.
pub fn fingerprint(event: &MonitoringEvent) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    if let Some(origin) = event.origin_file.as_deref() {
        for frame in event.frames.iter().filter(|frame| frame.points_at(origin)) {
            for line in &frame.context {
                hasher.update(line.text.as_bytes());
            }
        }
    }
    Fingerprint::from_hex(hasher.finalize().to_hex().to_string())
}

/// Looks up incidents already opened for a fingerprint.
///
/// The lookup and the later creation are not atomic: two events with the same fingerprint
/// processed close together can both find nothing and both open an incident.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    backend: BackendClient,
}

impl Deduplicator {
    /// Create a deduplicator backed by `backend`.
    pub const fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Existing incident carrying `fingerprint`, if any. "Not found" is `Ok(None)`.
    pub async fn existing(
        &self,
        creds: &mut Credentials,
        fingerprint: &Fingerprint,
    ) -> clients::Result<Option<Incident>> {
        let found = self
            .backend
            .list_incidents(creds, &IncidentQuery::by_fingerprint(fingerprint))
            .await?
            .into_iter()
            .next();
        debug!(%fingerprint, found = found.is_some(), "looked up fingerprint");
        Ok(found)
    }
}
