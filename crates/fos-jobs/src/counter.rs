//! Job Counters
//!
//! A counter tracks the number of outstanding jobs that reference it.
//! Reaching zero releases every thread blocked in [`JobCounter::wait`].
//!
//! Counters handed out by [`CounterPool`] are recycled instead of freed:
//! once the caller drops its handle and the value is back at zero, the
//! slot can be reset and given to the next caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::{lock, JobError};

struct CounterState {
    /// Outstanding job count
    value: AtomicUsize,
    /// Guards the wait/notify handshake, holds no data
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl CounterState {
    fn new() -> Self {
        Self {
            value: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}

/// Shared handle to a job counter
///
/// Cloning the handle shares the same count.
#[derive(Clone)]
pub struct JobCounter {
    state: Arc<CounterState>,
}

impl std::fmt::Debug for JobCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCounter")
            .field("value", &self.value())
            .finish()
    }
}

impl Default for JobCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl JobCounter {
    /// Create a standalone counter at zero
    pub fn new() -> Self {
        Self {
            state: Arc::new(CounterState::new()),
        }
    }

    /// Current outstanding count
    pub fn value(&self) -> usize {
        self.state.value.load(Ordering::Acquire)
    }

    /// True once every job referencing the counter has finished
    pub fn is_done(&self) -> bool {
        self.value() == 0
    }

    /// Add `n` outstanding jobs
    pub fn increment(&self, n: usize) {
        if n > 0 {
            self.state.value.fetch_add(n, Ordering::AcqRel);
        }
    }

    /// Mark one job as finished, releasing waiters at zero
    ///
    /// Returns true if this call brought the counter to zero. A decrement
    /// on a counter that is already zero is ignored.
    pub fn decrement(&self) -> bool {
        let previous = self
            .state
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));

        match previous {
            Ok(1) => {
                // Taking the lock orders the notify after any waiter's value check.
                let _guard = lock(&self.state.mutex);
                self.state.condvar.notify_all();
                true
            }
            Ok(_) => false,
            Err(_) => {
                tracing::error!("Job counter decremented below zero, ignoring");
                false
            }
        }
    }

    /// Block until the counter reaches zero
    pub fn wait(&self) {
        if self.is_done() {
            return;
        }

        let mut guard = lock(&self.state.mutex);
        while !self.is_done() {
            guard = self
                .state
                .condvar
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Block until the counter reaches zero or `timeout` elapses
    ///
    /// Returns true if the counter reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_done() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut guard = lock(&self.state.mutex);
        while !self.is_done() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .state
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Whether two handles refer to the same counter
    pub fn ptr_eq(&self, other: &JobCounter) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Fixed-capacity arena of recyclable counters
pub struct CounterPool {
    /// Each slot is claimed with `try_lock` while it is being handed out
    slots: Vec<Mutex<JobCounter>>,
    /// Wrapping allocation cursor
    next: AtomicUsize,
    recycled: AtomicUsize,
    allocated: AtomicUsize,
}

impl std::fmt::Debug for CounterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterPool")
            .field("capacity", &self.capacity())
            .field("recycled", &self.recycled.load(Ordering::Relaxed))
            .field("allocated", &self.allocated.load(Ordering::Relaxed))
            .finish()
    }
}

impl CounterPool {
    /// Preallocate `capacity` counters
    pub fn new(capacity: usize) -> Result<Self, JobError> {
        if capacity == 0 {
            return Err(JobError::invalid("counter pool capacity must be at least 1"));
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            JobError::init(format!("cannot allocate {capacity} job counters: {e}"))
        })?;
        slots.extend((0..capacity).map(|_| Mutex::new(JobCounter::new())));

        Ok(Self {
            slots,
            next: AtomicUsize::new(0),
            recycled: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        })
    }

    /// Number of recyclable slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Hand out a counter at zero, recycling a free slot when possible
    ///
    /// Probes every slot once starting at the cursor. Falls back to a fresh
    /// allocation when all slots are still referenced.
    pub fn acquire(&self) -> JobCounter {
        let capacity = self.slots.len();

        for _ in 0..capacity {
            let index = self.next.fetch_add(1, Ordering::Relaxed) % capacity;
            let Ok(slot) = self.slots[index].try_lock() else {
                continue;
            };

            // Only the pool holds the slot, and new handles are only cloned under its lock.
            if Arc::strong_count(&slot.state) == 1 {
                slot.state.value.store(0, Ordering::Release);
                self.recycled.fetch_add(1, Ordering::Relaxed);
                return slot.clone();
            }
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Counter pool exhausted, allocating a fresh counter");
        JobCounter::new()
    }

    /// Counters handed out from the pool so far
    pub fn recycled_count(&self) -> usize {
        self.recycled.load(Ordering::Relaxed)
    }

    /// Counters allocated because the pool had no free slot
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Slots currently held by callers or in-flight jobs
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| Arc::strong_count(&lock(slot).state) > 1)
            .count()
    }
}
