//! Job System
//!
//! Facade owning the worker pool, counter pool, priority queues and the
//! main-thread dispatch queue, with one init and one teardown path.
//!
//! # Teardown
//!
//! Shutdown is fail-fast: jobs still queued when [`JobSystem::shutdown`]
//! runs are discarded and never execute. Their counters are decremented
//! once per discarded job, so a thread blocked in [`JobSystem::wait`] is
//! released instead of hanging. Jobs already running finish normally.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::pool::PoolCounters;
use crate::{
    BatchRange, CounterPool, DrainReport, Dispatch, FailureLog, JobCounter, JobDescriptor,
    JobError, JobFailure, JobOutcome, JobSystemConfig, MainThreadQueue, MainThreadToken,
    PendingCounts, QueueSet, SubmitParams, WorkerPool, WorkerState,
};

/// Thread-pool job system
pub struct JobSystem {
    config: JobSystemConfig,
    queues: Arc<QueueSet>,
    pool: WorkerPool,
    counters: CounterPool,
    main_thread: MainThreadQueue,
    failures: Arc<FailureLog>,
    pool_counters: Arc<PoolCounters>,
    /// Jobs dropped unexecuted at teardown
    discarded: AtomicU64,
    /// `update` calls, wrapping
    ticks: AtomicU32,
    shut_down: bool,
}

impl std::fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSystem")
            .field("pool", &self.pool)
            .field("counters", &self.counters)
            .field("main_thread", &self.main_thread)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl JobSystem {
    /// Start the worker pool
    ///
    /// The calling thread becomes the main thread.
    pub fn new(config: JobSystemConfig) -> Result<Self, JobError> {
        config.validate()?;

        let counters = CounterPool::new(config.counter_pool_capacity)?;
        let token = MainThreadToken::capture();
        let queues = Arc::new(QueueSet::new());
        let failures = Arc::new(FailureLog::new(config.failure_log_capacity));
        let pool_counters = Arc::new(PoolCounters::default());

        let pool = WorkerPool::spawn(
            &config,
            Arc::clone(&queues),
            Arc::clone(&failures),
            Arc::clone(&pool_counters),
        )?;

        tracing::info!(
            "fOS job system {} started: {} workers, {} pooled counters",
            crate::VERSION,
            pool.worker_count(),
            counters.capacity()
        );

        Ok(Self {
            main_thread: MainThreadQueue::new(token, Arc::clone(&failures)),
            config,
            queues,
            pool,
            counters,
            failures,
            pool_counters,
            discarded: AtomicU64::new(0),
            ticks: AtomicU32::new(0),
            shut_down: false,
        })
    }

    /// Start with the default configuration
    pub fn with_defaults() -> Result<Self, JobError> {
        Self::new(JobSystemConfig::default())
    }

    /// Get configuration
    pub fn config(&self) -> &JobSystemConfig {
        &self.config
    }

    /// Hand out a counter at zero, recycled from the pool when possible
    pub fn create_counter(&self) -> JobCounter {
        self.counters.acquire()
    }

    /// Queue a prepared job
    pub fn submit(&self, job: JobDescriptor) -> Result<(), JobError> {
        if !job.has_body() {
            return Err(JobError::invalid(format!("job '{}' has no body", job.name())));
        }
        self.queues.push(job)
    }

    /// Queue a closure, optionally tracked by `counter`
    pub fn submit_job<F, R>(
        &self,
        counter: Option<&JobCounter>,
        body: F,
        params: SubmitParams,
    ) -> Result<(), JobError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: JobOutcome,
    {
        let mut job = JobDescriptor::new(body).with_params(params);
        if let Some(counter) = counter {
            job = job.with_counter(counter);
        }
        self.submit(job)
    }

    /// Split `total_count` elements into groups and queue one job per group
    ///
    /// `counter` is incremented once by the number of groups before any
    /// group is queued, so a waiter never sees a partial count.
    pub fn submit_batch<F, R>(
        &self,
        counter: Option<&JobCounter>,
        total_count: usize,
        group_size: usize,
        body: F,
        params: SubmitParams,
    ) -> Result<(), JobError>
    where
        F: Fn(BatchRange) -> R + Send + Sync + 'static,
        R: JobOutcome,
    {
        if group_size == 0 {
            return Err(JobError::invalid("batch group size must be at least 1"));
        }
        let group_count = total_count.div_ceil(group_size);
        if group_count > u32::MAX as usize {
            return Err(JobError::invalid(format!("batch of {group_count} groups is too large")));
        }
        if group_count == 0 {
            return Ok(());
        }

        let body = Arc::new(body);
        let name = params.name.unwrap_or(std::borrow::Cow::Borrowed("batch"));
        let jobs = BatchRange::split(total_count, group_size)
            .map(|range| {
                let body = Arc::clone(&body);
                let mut job = JobDescriptor::new(move || (*body)(range))
                    .with_priority(params.priority)
                    .with_name(name.clone())
                    .with_group_index(range.group_index);
                if let Some(counter) = counter {
                    job = job.with_counter(counter);
                }
                job
            })
            .collect();

        self.queues.push_batch(params.priority, counter, jobs)
    }

    /// Submit a batch on a fresh counter and block until every group ran
    ///
    /// Must not be called from inside a job: the waiting worker cannot help
    /// run the groups it waits for.
    pub fn run_batch<F, R>(
        &self,
        total_count: usize,
        group_size: usize,
        body: F,
        params: SubmitParams,
    ) -> Result<(), JobError>
    where
        F: Fn(BatchRange) -> R + Send + Sync + 'static,
        R: JobOutcome,
    {
        let counter = self.create_counter();
        self.submit_batch(Some(&counter), total_count, group_size, body, params)?;
        self.wait(&counter);
        Ok(())
    }

    /// Block until `counter` reaches zero
    pub fn wait(&self, counter: &JobCounter) {
        counter.wait();
    }

    /// Run `action` on the main thread, immediately if already on it
    pub fn execute_in_main_thread<F>(&self, action: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        self.main_thread.execute(action)
    }

    /// Run the actions queued for the main thread so far
    pub fn process_main_thread_queue(&self) -> DrainReport {
        self.main_thread.process()
    }

    /// Whether the calling thread is the one that created the job system
    pub fn is_main_thread(&self) -> bool {
        self.main_thread.is_main_thread()
    }

    /// Identity of the main thread
    pub fn main_thread_token(&self) -> MainThreadToken {
        self.main_thread.token()
    }

    /// Per-tick hook, runs housekeeping every `housekeeping_interval` ticks
    pub fn update(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if tick % self.config.housekeeping_interval == 0 {
            self.housekeeping();
        }
    }

    fn housekeeping(&self) {
        self.queues.trim();
        self.main_thread.trim();
        self.failures.trim();

        let stats = self.stats();
        tracing::debug!(
            "Job system: {} submitted, {} executed, {} failed, {} pending, {} counters in use",
            stats.submitted,
            stats.executed,
            stats.failed,
            stats.pending.total(),
            self.counters.in_use()
        );
    }

    /// Remove and return recorded job failures
    pub fn take_failures(&self) -> Vec<JobFailure> {
        self.failures.take()
    }

    /// Get worker count
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Snapshot of every worker's state
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.pool.worker_states()
    }

    /// Get job system stats
    pub fn stats(&self) -> JobSystemStats {
        JobSystemStats {
            worker_count: self.pool.worker_count(),
            submitted: self.queues.total_submitted(),
            executed: self.pool_counters.executed.load(Ordering::Relaxed),
            failed: self.pool_counters.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            pending: self.queues.pending_counts(),
            main_thread_pending: self.main_thread.pending(),
            counters_recycled: self.counters.recycled_count(),
            counters_allocated: self.counters.allocated_count(),
        }
    }

    /// Whether teardown has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Stop accepting work, discard queued jobs and join the workers
    ///
    /// Jobs already running finish. Queued jobs never run, and their
    /// counters are released so waiters return. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;

        let discarded = self.queues.close();
        let discarded_count = discarded.len();
        for job in discarded {
            if let Some(counter) = &job.counter {
                counter.decrement();
            }
        }
        self.discarded
            .fetch_add(discarded_count as u64, Ordering::Relaxed);
        if discarded_count > 0 {
            tracing::warn!("Job system shutdown discarded {} queued jobs", discarded_count);
        }

        self.pool.begin_drain();
        self.pool.join();

        let report = ShutdownReport {
            discarded: discarded_count,
            executed: self.pool_counters.executed.load(Ordering::Relaxed),
            failed: self.pool_counters.failed.load(Ordering::Relaxed),
        };
        tracing::info!(
            "fOS job system stopped: {} executed, {} failed, {} discarded",
            report.executed,
            report.failed,
            report.discarded
        );
        report
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Job system statistics
#[derive(Debug, Clone, Copy)]
pub struct JobSystemStats {
    pub worker_count: usize,
    pub submitted: u64,
    pub executed: u64,
    pub failed: u64,
    pub discarded: u64,
    pub pending: PendingCounts,
    pub main_thread_pending: usize,
    pub counters_recycled: usize,
    pub counters_allocated: usize,
}

/// Outcome of a teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queued jobs that never ran
    pub discarded: usize,
    /// Jobs that completed over the system's lifetime
    pub executed: u64,
    /// Jobs that failed over the system's lifetime
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobPriority;
    use std::sync::atomic::AtomicUsize;

    fn system(workers: usize) -> JobSystem {
        JobSystem::new(
            JobSystemConfig::default()
                .with_worker_count(workers)
                .with_counter_pool_capacity(4),
        )
        .unwrap()
    }

    #[test]
    fn test_submit_and_wait() {
        let jobs = system(2);
        let counter = jobs.create_counter();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let hits = Arc::clone(&hits);
            jobs.submit_job(
                Some(&counter),
                move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                },
                SubmitParams::default(),
            )
            .unwrap();
        }

        jobs.wait(&counter);
        assert_eq!(hits.load(Ordering::SeqCst), 8);
        assert!(counter.is_done());
    }

    #[test]
    fn test_submit_rejects_empty_body() {
        let jobs = system(1);
        let counter = jobs.create_counter();

        let result = jobs.submit(JobDescriptor::default().with_counter(&counter));
        assert!(matches!(result, Err(JobError::InvalidArgument(_))));
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_submit_batch_rejects_zero_group() {
        let jobs = system(1);

        let result = jobs.submit_batch(None, 10, 0, |_| {}, SubmitParams::default());
        assert!(matches!(result, Err(JobError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let jobs = system(1);
        let counter = jobs.create_counter();

        jobs.submit_batch(Some(&counter), 0, 4, |_| {}, SubmitParams::default())
            .unwrap();
        assert!(counter.is_done());
        assert_eq!(jobs.stats().submitted, 0);
    }

    #[test]
    fn test_batch_increments_once_for_all_groups() {
        let jobs = system(1);
        let counter = jobs.create_counter();
        let gate = JobCounter::new();
        gate.increment(1);

        // Park the only worker so the batch stays queued.
        let blocker = gate.clone();
        jobs.submit_job(None, move || blocker.wait(), SubmitParams::priority(JobPriority::High))
            .unwrap();

        jobs.submit_batch(Some(&counter), 17, 5, |_| {}, SubmitParams::default())
            .unwrap();
        assert_eq!(counter.value(), 4);

        gate.decrement();
        jobs.wait(&counter);
        assert!(counter.is_done());
    }

    #[test]
    fn test_run_batch_covers_all_elements() {
        let jobs = system(3);
        let seen = Arc::new((0..100).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

        let s = Arc::clone(&seen);
        jobs.run_batch(
            100,
            7,
            move |range: BatchRange| {
                for i in range.range() {
                    s[i].fetch_add(1, Ordering::SeqCst);
                }
            },
            SubmitParams::default().named("cover"),
        )
        .unwrap();

        assert!(seen.iter().all(|hits| hits.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_failing_jobs_are_recorded() {
        let jobs = system(2);
        let counter = jobs.create_counter();

        jobs.submit_job(
            Some(&counter),
            || -> Result<(), String> { Err("bad input".to_string()) },
            SubmitParams::default().named("fallible"),
        )
        .unwrap();
        jobs.submit_job(Some(&counter), || {}, SubmitParams::default())
            .unwrap();

        jobs.wait(&counter);

        let failures = jobs.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "fallible");
        assert_eq!(failures[0].message, "bad input");
        assert_eq!(failures[0].priority, Some(JobPriority::Normal));

        let stats = jobs.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn test_update_runs_housekeeping() {
        let jobs = JobSystem::new(
            JobSystemConfig::default()
                .with_worker_count(1)
                .with_housekeeping_interval(2),
        )
        .unwrap();

        for _ in 0..5 {
            jobs.update();
        }
        assert_eq!(jobs.stats().pending.total(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut jobs = system(2);

        let first = jobs.shutdown();
        assert_eq!(first.discarded, 0);
        assert!(jobs.is_shut_down());
        assert!(jobs.worker_states().iter().all(|s| *s == WorkerState::Stopped));

        assert_eq!(jobs.shutdown(), ShutdownReport::default());
        assert_eq!(
            jobs.submit_job(None, || {}, SubmitParams::default()),
            Err(JobError::ShutDown)
        );
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_spawn_failure_is_initialization_failure() {
        let result = JobSystem::new(
            JobSystemConfig::default()
                .with_worker_count(2)
                .with_stack_size(1 << 46),
        );
        assert!(matches!(result, Err(JobError::InitializationFailure(_))));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let result = JobSystem::new(JobSystemConfig::default().with_worker_count(0));
        assert!(matches!(result, Err(JobError::InvalidArgument(_))));
    }
}
