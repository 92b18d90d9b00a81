//! Job Queue Set
//!
//! One FIFO per priority tier, each behind its own lock. Workers sleep on a
//! shared condition variable when every tier is empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::{lock, JobCounter, JobDescriptor, JobError, JobPriority};

/// Priority queues shared between submitters and workers
pub struct QueueSet {
    /// Indexed by `JobPriority::tier`, highest priority first
    tiers: [Mutex<VecDeque<JobDescriptor>>; 3],
    /// Jobs queued across all tiers
    pending: AtomicUsize,
    /// Set once at shutdown, rejects further pushes
    closed: AtomicBool,
    /// Total jobs accepted
    submitted: AtomicU64,
    wake_mutex: Mutex<()>,
    wake_condvar: Condvar,
}

impl std::fmt::Debug for QueueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSet")
            .field("pending", &self.pending_counts())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for QueueSet {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueSet {
    pub fn new() -> Self {
        Self {
            tiers: Default::default(),
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            wake_mutex: Mutex::new(()),
            wake_condvar: Condvar::new(),
        }
    }

    /// Queue a single job and wake one worker
    ///
    /// The job's counter is incremented under the tier lock, so a job is
    /// either counted and queued or rejected untouched.
    pub fn push(&self, job: JobDescriptor) -> Result<(), JobError> {
        {
            let mut tier = lock(&self.tiers[job.priority.tier()]);
            if self.is_closed() {
                return Err(JobError::ShutDown);
            }
            if let Some(counter) = &job.counter {
                counter.increment(1);
            }
            tracing::trace!("Queued job '{}' ({})", job.name, job.priority.name());
            tier.push_back(job);
            self.pending.fetch_add(1, Ordering::AcqRel);
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let _guard = lock(&self.wake_mutex);
        self.wake_condvar.notify_one();
        Ok(())
    }

    /// Queue a batch on one tier, incrementing `counter` once for all of it
    pub fn push_batch(
        &self,
        priority: JobPriority,
        counter: Option<&JobCounter>,
        jobs: Vec<JobDescriptor>,
    ) -> Result<(), JobError> {
        let count = jobs.len();
        if count == 0 {
            return Ok(());
        }

        {
            let mut tier = lock(&self.tiers[priority.tier()]);
            if self.is_closed() {
                return Err(JobError::ShutDown);
            }
            if let Some(counter) = counter {
                counter.increment(count);
            }
            tier.extend(jobs);
            self.pending.fetch_add(count, Ordering::AcqRel);
        }
        self.submitted.fetch_add(count as u64, Ordering::Relaxed);
        tracing::trace!("Queued batch of {} groups ({})", count, priority.name());

        let _guard = lock(&self.wake_mutex);
        if count == 1 {
            self.wake_condvar.notify_one();
        } else {
            self.wake_condvar.notify_all();
        }
        Ok(())
    }

    /// Pop the front job of the highest non-empty tier
    pub fn pop(&self) -> Option<JobDescriptor> {
        for tier in &self.tiers {
            if let Some(job) = lock(tier).pop_front() {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                return Some(job);
            }
        }
        None
    }

    /// Sleep until a job is queued or the set is closed
    pub fn wait_for_work(&self) {
        let mut guard = lock(&self.wake_mutex);
        while self.pending.load(Ordering::Acquire) == 0 && !self.is_closed() {
            guard = self
                .wake_condvar
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Reject further pushes and hand back every job not yet started
    pub fn close(&self) -> Vec<JobDescriptor> {
        self.closed.store(true, Ordering::SeqCst);

        let mut discarded = Vec::new();
        for tier in &self.tiers {
            let mut tier = lock(tier);
            self.pending.fetch_sub(tier.len(), Ordering::AcqRel);
            discarded.extend(tier.drain(..));
        }

        let _guard = lock(&self.wake_mutex);
        self.wake_condvar.notify_all();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Total pending jobs
    pub fn total_pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Total jobs accepted since creation
    pub fn total_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Pending count at each priority
    pub fn pending_counts(&self) -> PendingCounts {
        let len = |priority: JobPriority| lock(&self.tiers[priority.tier()]).len();
        PendingCounts {
            high: len(JobPriority::High),
            normal: len(JobPriority::Normal),
            low: len(JobPriority::Low),
        }
    }

    /// Release buffer space held by empty tiers
    pub fn trim(&self) {
        for tier in &self.tiers {
            let mut tier = lock(tier);
            if tier.is_empty() {
                tier.shrink_to_fit();
            }
        }
    }
}

/// Pending job counts by priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.high + self.normal + self.low
    }
}
