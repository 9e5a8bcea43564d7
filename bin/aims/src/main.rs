//! Entrypoint.

use clap::Parser;
use clients::{BackendClient, SentryClient, SlackClient};
use config::Opts;
use dotenvy::dotenv;
use eyre::WrapErr;
use pipeline::{AgingResolver, EventIngestor, IncidentChecker, NotificationDispatcher};
use runtime::{Scheduler, ShutdownSignal};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(opts.env.default_directive())),
        )
        .init();

    info!(env = ?opts.env, backend = %opts.backend.url, "AIMS incident processor starting...");

    let backend = BackendClient::new(
        opts.backend.url.clone(),
        opts.backend.email.clone(),
        opts.backend.password.clone(),
    );
    let ingestor = EventIngestor::new(SentryClient::new(
        opts.sentry.api_url.clone(),
        opts.sentry.token.clone(),
    ))
    .with_max_pages(opts.sentry.max_pages);
    let dispatcher = NotificationDispatcher::new(
        SlackClient::new(opts.slack.api_url.clone(), opts.slack.token.clone()),
        opts.frontend_url.clone(),
    );

    let mut scheduler = Scheduler::new().with_startup_delay(opts.schedule.startup_delay());

    let checker_interval = opts.schedule.checker_interval();
    let checker_backend = backend.clone();
    scheduler.add(move || {
        IncidentChecker::new(checker_backend.clone(), ingestor.clone(), dispatcher.clone())
            .with_interval(checker_interval)
    });

    let resolver_interval = opts.schedule.resolver_interval();
    let threshold_days = opts.schedule.inactivity_threshold_days;
    scheduler.add(move || {
        AgingResolver::new(backend.clone())
            .with_threshold_days(threshold_days)
            .with_interval(resolver_interval)
    });

    let shutdown = ShutdownSignal::new().wrap_err("failed to install signal handlers")?;
    scheduler.run_until(shutdown).await
}
