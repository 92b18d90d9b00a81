//! Worker Pool
//!
//! Fixed set of worker threads pulling from a shared [`QueueSet`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crate::failure::panic_message;
use crate::{FailureLog, JobDescriptor, JobError, JobFailure, JobSystemConfig, QueueSet};

/// Lifecycle state of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Sleeping until work is queued
    Idle = 0,
    /// Looking for the next job
    Dequeuing = 1,
    /// Running a job body
    Executing = 2,
    /// Shutdown observed, finishing the in-flight job
    Draining = 3,
    /// Thread has exited its loop
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Dequeuing,
            2 => Self::Executing,
            3 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Execution totals shared by all workers
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub executed: AtomicU64,
    pub failed: AtomicU64,
}

struct Worker {
    id: usize,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &WorkerState::from_u8(self.state.load(Ordering::Relaxed)))
            .field("running", &self.thread.is_some())
            .finish()
    }
}

/// Shared context handed to each worker thread
struct WorkerContext {
    queues: Arc<QueueSet>,
    failures: Arc<FailureLog>,
    counters: Arc<PoolCounters>,
    state: Arc<AtomicU8>,
}

impl WorkerContext {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn run(self) {
        loop {
            // Once draining, stay draining until the loop exits.
            let draining = self.queues.is_closed();
            if !draining {
                self.set_state(WorkerState::Dequeuing);
            }
            if let Some(job) = self.queues.pop() {
                if !draining {
                    self.set_state(WorkerState::Executing);
                }
                self.execute(job);
                if self.queues.is_closed() {
                    self.set_state(WorkerState::Draining);
                }
                continue;
            }

            if self.queues.is_closed() {
                break;
            }

            self.set_state(WorkerState::Idle);
            self.queues.wait_for_work();
        }

        self.set_state(WorkerState::Stopped);
    }

    /// Run a job body, record any failure, then release its counter
    fn execute(&self, job: JobDescriptor) {
        let JobDescriptor {
            body,
            counter,
            group_index,
            priority,
            name,
        } = job;

        let outcome = match body {
            Some(body) => match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(result) => result,
                Err(payload) => Err(panic_message(payload.as_ref())),
            },
            None => Err("job has no body".to_string()),
        };

        match outcome {
            Ok(()) => {
                self.counters.executed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Job '{}' (group {}) done", name, group_index);
            }
            Err(message) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.failures.record(JobFailure {
                    name: name.into_owned(),
                    group_index,
                    priority: Some(priority),
                    message,
                });
            }
        }

        // Decrement even on failure so waiters are always released.
        if let Some(counter) = counter {
            counter.decrement();
        }
    }
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    workers: Vec<Worker>,
    queues: Arc<QueueSet>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("pending", &self.queues.total_pending())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn the workers described by `config`
    ///
    /// If any thread fails to spawn, the ones already running are stopped
    /// and the queues are closed.
    pub(crate) fn spawn(
        config: &JobSystemConfig,
        queues: Arc<QueueSet>,
        failures: Arc<FailureLog>,
        counters: Arc<PoolCounters>,
    ) -> Result<Self, JobError> {
        let worker_count = config.resolved_worker_count();
        let mut pool = Self {
            workers: Vec::with_capacity(worker_count),
            queues,
        };

        for id in 0..worker_count {
            let state = Arc::new(AtomicU8::new(WorkerState::Idle as u8));
            let context = WorkerContext {
                queues: Arc::clone(&pool.queues),
                failures: Arc::clone(&failures),
                counters: Arc::clone(&counters),
                state: Arc::clone(&state),
            };

            let mut builder = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, id));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            match builder.spawn(move || context.run()) {
                Ok(thread) => pool.workers.push(Worker {
                    id,
                    state,
                    thread: Some(thread),
                }),
                Err(e) => {
                    pool.queues.close();
                    pool.join();
                    return Err(JobError::init(format!("failed to spawn worker {id}: {e}")));
                }
            }
        }

        tracing::debug!("Spawned {} job workers", worker_count);
        Ok(pool)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Snapshot of every worker's state
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers
            .iter()
            .map(|w| WorkerState::from_u8(w.state.load(Ordering::Acquire)))
            .collect()
    }

    /// Mark workers still running a job as draining
    ///
    /// Called right after the queue set is closed.
    pub(crate) fn begin_drain(&self) {
        for worker in &self.workers {
            let _ = worker.state.compare_exchange(
                WorkerState::Executing as u8,
                WorkerState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Wait for every worker thread to exit
    ///
    /// Workers only exit once the queue set is closed. When called from a
    /// worker (the last handle to the job system dropped inside a job), that
    /// worker is skipped: it exits by itself once its job returns.
    pub(crate) fn join(&mut self) {
        let current = thread::current().id();
        for worker in &mut self.workers {
            if worker
                .thread
                .as_ref()
                .is_some_and(|thread| thread.thread().id() == current)
            {
                tracing::debug!("Job worker {} tears down the pool, not joining itself", worker.id);
                worker.thread = None;
                continue;
            }
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::error!("Job worker {} exited abnormally", worker.id);
                }
                worker.state.store(WorkerState::Stopped as u8, Ordering::Release);
            }
        }
    }
}
