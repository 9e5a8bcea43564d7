//! AIMS configuration
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

/// Default Sentry API root.
pub const DEFAULT_SENTRY_API_URL: &str = "https://sentry.io/api/0/";
/// Default Slack Web API root.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api/";

/// Deployment environment, selects the default log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Env {
    /// Debug logging
    Dev,
    /// Info logging
    Prod,
}

impl Env {
    /// Default `tracing` directive for the environment.
    pub const fn default_directive(self) -> &'static str {
        match self {
            Self::Dev => "debug",
            Self::Prod => "info",
        }
    }
}

/// Backend configuration options
#[derive(Debug, Clone, Parser)]
pub struct BackendOpts {
    /// Backend API URL
    #[clap(long = "api-host", env = "API_HOST")]
    pub url: Url,
    /// Service account email used to obtain backend tokens
    #[clap(long = "api-user-email", env = "API_USER_EMAIL")]
    pub email: String,
    /// Service account password
    #[clap(long = "api-user-pw", env = "API_USER_PW", hide_env_values = true)]
    pub password: String,
}

/// Sentry configuration options
#[derive(Debug, Clone, Parser)]
pub struct SentryOpts {
    /// Sentry user auth token
    #[clap(id = "sentry-token", long = "sentry-token", env = "SENTRY_TOKEN", hide_env_values = true, value_parser = parse_sentry_token)]
    pub token: String,
    /// Sentry API root
    #[clap(id = "sentry-api-url", long = "sentry-api-url", env = "SENTRY_API_URL", default_value = DEFAULT_SENTRY_API_URL)]
    pub api_url: Url,
    /// Maximum number of event pages fetched per provider in one pass
    #[clap(long = "sentry-max-pages", env = "SENTRY_MAX_PAGES", default_value = "100")]
    pub max_pages: usize,
}

/// Slack configuration options
#[derive(Debug, Clone, Parser)]
pub struct SlackOpts {
    /// Slack bot token
    #[clap(id = "slack-token", long = "slack-token", env = "SLACK_TOKEN", hide_env_values = true)]
    pub token: String,
    /// Slack Web API root
    #[clap(id = "slack-api-url", long = "slack-api-url", env = "SLACK_API_URL", default_value = DEFAULT_SLACK_API_URL)]
    pub api_url: Url,
}

/// Scheduling configuration options
#[derive(Debug, Clone, Parser)]
pub struct ScheduleOpts {
    /// Seconds between incident checker passes
    #[clap(
        long,
        env = "CHECKER_INTERVAL_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub checker_interval_secs: u64,
    /// Seconds between aging resolver passes
    #[clap(
        long,
        env = "RESOLVER_INTERVAL_SECS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub resolver_interval_secs: u64,
    /// Days without activity after which an incident is resolved
    #[clap(long, env = "INACTIVITY_THRESHOLD_DAYS", default_value = "21")]
    pub inactivity_threshold_days: i64,
    /// Seconds to wait for the backend before the first pass
    #[clap(long, env = "STARTUP_DELAY_SECS", default_value = "5")]
    pub startup_delay_secs: u64,
}

impl ScheduleOpts {
    /// Incident checker interval.
    pub const fn checker_interval(&self) -> Duration {
        Duration::from_secs(self.checker_interval_secs)
    }

    /// Aging resolver interval.
    pub const fn resolver_interval(&self) -> Duration {
        Duration::from_secs(self.resolver_interval_secs)
    }

    /// Delay before the first pass.
    pub const fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// CLI options for the incident processor
#[derive(Debug, Clone, Parser)]
#[clap(name = "aims", about = "Correlates unhandled exceptions into incidents")]
pub struct Opts {
    /// Backend configuration
    #[clap(flatten)]
    pub backend: BackendOpts,

    /// Sentry configuration
    #[clap(flatten)]
    pub sentry: SentryOpts,

    /// Slack configuration
    #[clap(flatten)]
    pub slack: SlackOpts,

    /// Scheduling configuration
    #[clap(flatten)]
    pub schedule: ScheduleOpts,

    /// Frontend URL used to build incident links
    #[clap(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: Url,

    /// Deployment environment
    #[clap(long, env = "AIMS_ENV", value_enum, ignore_case = true, default_value = "prod")]
    pub env: Env,
}

fn parse_sentry_token(value: &str) -> Result<String, String> {
    if value.starts_with("sntryu_") {
        Ok(value.to_owned())
    } else {
        Err("sentry token must start with `sntryu_`".to_owned())
    }
}
