//! Runtime utilities for AIMS: scheduled jobs, their supervisor and shutdown handling.

/// Periodic job abstraction
pub mod job;
/// Supervising scheduler for periodic jobs
pub mod scheduler;
/// OS shutdown signal
pub mod shutdown;

pub use job::Job;
pub use scheduler::Scheduler;
pub use shutdown::ShutdownSignal;
