use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deterministic digest identifying a distinct underlying fault.
///
/// This is the sole deduplication key for incidents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex representation of the digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a backend entity by its uuid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity uuid
    pub uuid: String,
}

/// Team member as seen by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member uuid, when the backend includes it
    #[serde(default)]
    pub uuid: Option<String>,
    /// Chat identity (Slack user ID)
    #[serde(default, rename = "slackID")]
    pub chat_id: Option<String>,
}

impl Member {
    /// Chat identity of the member, ignoring blank values.
    pub fn chat_identity(&self) -> Option<&str> {
        self.chat_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// A team responsible for hosts and incident resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team uuid
    pub uuid: String,
    /// Team name
    #[serde(default)]
    pub name: String,
    /// Team members
    #[serde(default)]
    pub users: Vec<Member>,
}

/// A host machine known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Host uuid
    pub uuid: String,
    /// Hostname, matched against the `server_name` tag
    #[serde(default)]
    pub hostname: String,
    /// Owning team
    pub team: Team,
}

/// A comment on an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment uuid
    #[serde(default)]
    pub uuid: String,
    /// Comment text
    #[serde(default)]
    pub comment: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// An incident stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Incident uuid
    pub uuid: String,
    /// Short summary (at most 100 characters)
    pub summary: String,
    /// Longer description (at most 500 characters)
    #[serde(default)]
    pub description: String,
    /// Deduplication fingerprint
    #[serde(default, rename = "hash")]
    pub fingerprint: Option<Fingerprint>,
    /// Hosts affected by the incident
    #[serde(default)]
    pub hosts_affected: Vec<EntityRef>,
    /// Teams responsible for resolution
    #[serde(default)]
    pub resolution_teams: Vec<EntityRef>,
    /// Explicit resolved flag, when the backend reports one
    #[serde(default)]
    pub resolved: bool,
    /// Resolution time
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Comments, most recent first
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Returns `true` once the incident has been resolved.
    pub const fn is_resolved(&self) -> bool {
        self.resolved || self.resolved_at.is_some()
    }

    /// Time of the last activity on the incident.
    ///
    /// Comments are ordered most recent first, so only the first one is consulted.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.comments.first().map_or(self.created_at, |c| c.created_at)
    }

    /// Build an update that marks the incident resolved, echoing every other field.
    pub fn resolved_update(&self) -> IncidentUpdate {
        IncidentUpdate {
            resolved: true,
            summary: self.summary.clone(),
            description: self.description.clone(),
            hosts_affected: self.hosts_affected.iter().map(|h| h.uuid.clone()).collect(),
            resolution_teams: self.resolution_teams.iter().map(|t| t.uuid.clone()).collect(),
        }
    }
}

/// Payload for creating a new incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    /// Incident summary
    pub summary: String,
    /// Incident description
    pub description: String,
    /// Affected host uuids
    pub hosts_affected: Vec<String>,
    /// Resolution team uuids
    pub resolution_teams: Vec<String>,
    /// Deduplication fingerprint
    pub hash: Fingerprint,
}

/// Payload for updating an existing incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentUpdate {
    /// Resolved flag
    pub resolved: bool,
    /// Incident summary
    pub summary: String,
    /// Incident description
    pub description: String,
    /// Affected host uuids
    pub hosts_affected: Vec<String>,
    /// Resolution team uuids
    pub resolution_teams: Vec<String>,
}

/// Payload for posting a comment on an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewComment {
    /// Comment text
    pub comment: String,
}
