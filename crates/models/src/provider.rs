use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settings field that toggles a provider.
pub const ENABLED_FIELD: &str = "enabled";

/// Kind of provider configured in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Monitoring provider events are pulled from
    Log,
    /// Chat provider incidents are announced on
    Alert,
}

impl ProviderType {
    /// Query value used by the backend for this type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single key/value setting of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderField {
    /// Setting key
    pub key: String,
    /// Setting value; the backend sends strings, older fixtures send booleans
    #[serde(default)]
    pub value: Value,
}

/// A provider configuration owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider name, e.g. `Sentry` or `Slack`
    pub name: String,
    /// Provider type
    #[serde(default, rename = "type")]
    pub provider_type: Option<ProviderType>,
    /// Ordered settings
    #[serde(default)]
    pub fields: Vec<ProviderField>,
}

impl Provider {
    /// First field named `key`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// First field named `key`, rendered as a non-empty string.
    pub fn field_str(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Value of the `enabled` field, or `None` if the field is missing.
    pub fn enabled(&self) -> Option<bool> {
        self.field(ENABLED_FIELD).map(|value| match value {
            Value::Bool(b) => *b,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        })
    }

    /// Monitoring provider kind, resolved from the provider name.
    pub fn log_kind(&self) -> LogProviderKind {
        match self.name.trim().to_lowercase().as_str() {
            "sentry" => LogProviderKind::Sentry,
            _ => LogProviderKind::Unsupported(self.name.clone()),
        }
    }

    /// Chat provider kind, resolved from the provider name.
    pub fn alert_kind(&self) -> AlertProviderKind {
        match self.name.trim().to_lowercase().as_str() {
            "slack" => AlertProviderKind::Slack,
            _ => AlertProviderKind::Unsupported(self.name.clone()),
        }
    }
}

/// Monitoring providers the pipeline knows how to ingest from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogProviderKind {
    /// Sentry
    Sentry,
    /// Any other provider, by name
    Unsupported(String),
}

/// Chat providers the pipeline knows how to notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertProviderKind {
    /// Slack
    Slack,
    /// Any other provider, by name
    Unsupported(String),
}
