use std::{future::Future, sync::Arc, time::Duration};

use eyre::Result;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, sleep},
};
use tracing::{error, info, warn};

use crate::job::Job;

/// Builds a fresh job instance; called again whenever the previous instance dies.
type JobFactory = Arc<dyn Fn() -> Box<dyn Job> + Send + Sync>;

/// Default pause before a dead job is restarted.
const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// Runs independent periodic jobs, each in its own task, until shutdown.
///
/// Every job is supervised: if its task panics a new instance is built from the job's
/// factory and started again. On shutdown no new tick is started, an in-flight tick runs
/// to completion, and [`Scheduler::run_until`] returns once every job has stopped.
pub struct Scheduler {
    factories: Vec<JobFactory>,
    startup_delay: Duration,
    restart_backoff: Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.factories.len())
            .field("startup_delay", &self.startup_delay)
            .field("restart_backoff", &self.restart_backoff)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
            startup_delay: Duration::ZERO,
            restart_backoff: DEFAULT_RESTART_BACKOFF,
        }
    }

    /// Wait `delay` before the first tick of every job.
    pub const fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Wait `backoff` before restarting a job that died.
    pub const fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// Register a job through a factory producing fresh instances.
    pub fn add<F, J>(&mut self, factory: F)
    where
        F: Fn() -> J + Send + Sync + 'static,
        J: Job,
    {
        self.factories.push(Arc::new(move || Box::new(factory()) as Box<dyn Job>));
    }

    /// Run every registered job until `shutdown` resolves.
    pub async fn run_until<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let supervisors: Vec<JoinHandle<()>> = self
            .factories
            .into_iter()
            .map(|factory| {
                tokio::spawn(supervise(
                    factory,
                    stop_rx.clone(),
                    self.startup_delay,
                    self.restart_backoff,
                ))
            })
            .collect();

        shutdown.await;
        info!("stopping scheduled jobs");
        let _ = stop_tx.send(true);

        for handle in supervisors {
            if let Err(e) = handle.await {
                error!(error = %e, "job supervisor failed");
            }
        }
        info!("all scheduled jobs stopped");
        Ok(())
    }
}

/// Keep one job alive, restarting it from its factory when its task dies.
async fn supervise(
    factory: JobFactory,
    mut stop: watch::Receiver<bool>,
    startup_delay: Duration,
    restart_backoff: Duration,
) {
    let mut delay = startup_delay;
    loop {
        let job = factory();
        let name = job.name();
        info!(job = name, interval = ?job.interval(), "starting job");

        match tokio::spawn(run_job(job, stop.clone(), delay)).await {
            Ok(()) => return,
            Err(e) if e.is_panic() => error!(job = name, "job panicked"),
            Err(e) => {
                warn!(job = name, error = %e, "job task cancelled");
                return;
            }
        }

        if *stop.borrow() {
            return;
        }
        warn!(job = name, backoff = ?restart_backoff, "restarting job");
        tokio::select! {
            _ = sleep(restart_backoff) => {}
            _ = stop.changed() => return,
        }
        delay = Duration::ZERO;
    }
}

/// Tick `job` at its interval until the stop flag is raised.
async fn run_job(mut job: Box<dyn Job>, mut stop: watch::Receiver<bool>, delay: Duration) {
    let name = job.name();

    if !delay.is_zero() {
        tokio::select! {
            _ = sleep(delay) => {}
            _ = stop.changed() => return,
        }
    }

    let period = job.interval();
    if period.is_zero() {
        error!(job = name, "job interval must be non-zero, not starting");
        return;
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {}
            _ = stop.changed() => break,
        }
        if let Err(e) = job.tick().await {
            error!(job = name, error = ?e, "job tick failed");
        }
    }
    info!(job = name, "job stopped");
}
