//! fOS Jobs
//!
//! Thread-pool job system for the fOS engine.
//!
//! # Overview
//! - Jobs are closures queued on one of three priority tiers
//! - A [`JobCounter`] tracks outstanding jobs; [`JobSystem::wait`] blocks
//!   until it reaches zero
//! - Batch submission splits a range into groups for data-parallel work
//! - Work that must touch main-thread-owned resources goes through
//!   [`JobSystem::execute_in_main_thread`] and runs when the main thread
//!   calls [`JobSystem::process_main_thread_queue`], once per tick
//!
//! A job that panics or returns an error is recorded as a [`JobFailure`];
//! it never takes down its worker and its counter is still released.
//!
//! Waiting inside a job on a counter that the same job (directly or not)
//! must help decrement can deadlock the pool. This is not detected.
//!
//! # Example
//! ```rust,ignore
//! use fos_jobs::{JobSystem, JobSystemConfig, SubmitParams};
//!
//! let jobs = JobSystem::new(JobSystemConfig::default())?;
//! let counter = jobs.create_counter();
//! jobs.submit_batch(Some(&counter), 1024, 64, |range| {
//!     for i in range.range() {
//!         // process element i
//!     }
//! }, SubmitParams::default())?;
//! jobs.wait(&counter);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod config;
mod counter;
mod error;
mod failure;
mod job;
mod main_thread;
mod pool;
mod queue;
mod system;

pub use config::{
    default_worker_count, JobSystemConfig, DEFAULT_COUNTER_POOL_CAPACITY,
    DEFAULT_FAILURE_LOG_CAPACITY, DEFAULT_HOUSEKEEPING_INTERVAL,
};
pub use counter::{CounterPool, JobCounter};
pub use error::JobError;
pub use failure::{FailureLog, JobFailure};
pub use job::{BatchRange, JobDescriptor, JobFn, JobOutcome, JobPriority, SubmitParams};
pub use main_thread::{DrainReport, Dispatch, MainThreadFn, MainThreadQueue, MainThreadToken};
pub use pool::{WorkerPool, WorkerState};
pub use queue::{PendingCounts, QueueSet};
pub use system::{JobSystem, JobSystemStats, ShutdownReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lock a mutex, ignoring poisoning
///
/// Job bodies run outside every scheduler lock, so a poisoned lock never
/// guards half-updated state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
