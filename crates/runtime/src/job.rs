use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;

/// A unit of work executed at a fixed interval by the [`Scheduler`](crate::Scheduler).
///
/// A job keeps its state (e.g. cached credentials) across ticks. A failed tick is logged
/// and the job keeps running; a tick is never interrupted once started.
#[async_trait]
pub trait Job: Send + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Time between the start of two consecutive ticks
    fn interval(&self) -> Duration;

    /// Run one pass of the job
    async fn tick(&mut self) -> Result<()>;
}
