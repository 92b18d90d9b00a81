//! Main-Thread Dispatch
//!
//! Work that touches main-thread-owned resources (graphics context, window)
//! is queued here by workers and run when the main thread drains the queue,
//! once per tick.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::failure::panic_message;
use crate::{lock, FailureLog, JobFailure};

/// Deferred main-thread action
pub type MainThreadFn = Box<dyn FnOnce() + Send + 'static>;

/// Identity of the thread allowed to drain the dispatch queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MainThreadToken {
    id: ThreadId,
}

impl MainThreadToken {
    /// Capture the calling thread as the main thread
    pub fn capture() -> Self {
        Self {
            id: thread::current().id(),
        }
    }

    /// Whether the calling thread is the main thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.id
    }
}

/// How `execute_in_main_thread` handled an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Called on the main thread, the action already ran
    Executed,
    /// Queued for the next drain
    Queued,
}

/// Result of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions that ran to completion
    pub executed: usize,
    /// Actions that panicked
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.executed + self.failed
    }
}

/// FIFO of actions waiting for the main thread
pub struct MainThreadQueue {
    token: MainThreadToken,
    actions: Mutex<VecDeque<MainThreadFn>>,
    failures: Arc<FailureLog>,
}

impl std::fmt::Debug for MainThreadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadQueue")
            .field("token", &self.token)
            .field("pending", &self.pending())
            .finish()
    }
}

impl MainThreadQueue {
    pub fn new(token: MainThreadToken, failures: Arc<FailureLog>) -> Self {
        Self {
            token,
            actions: Mutex::new(VecDeque::new()),
            failures,
        }
    }

    pub fn token(&self) -> MainThreadToken {
        self.token
    }

    pub fn is_main_thread(&self) -> bool {
        self.token.is_current()
    }

    /// Run `action` now on the main thread, otherwise queue it
    pub fn execute<F>(&self, action: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            action();
            return Dispatch::Executed;
        }

        lock(&self.actions).push_back(Box::new(action));
        Dispatch::Queued
    }

    /// Run every action queued before this call, in order
    ///
    /// Actions queued while the pass runs wait for the next pass. Only the
    /// main thread may drain; other callers get an empty report.
    pub fn process(&self) -> DrainReport {
        if !self.is_main_thread() {
            tracing::warn!("Main-thread queue drained from another thread, ignoring");
            return DrainReport::default();
        }

        let actions = std::mem::take(&mut *lock(&self.actions));
        let mut report = DrainReport::default();

        for (index, action) in actions.into_iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(()) => report.executed += 1,
                Err(payload) => {
                    report.failed += 1;
                    self.failures.record(JobFailure {
                        name: format!("main-thread action #{index}"),
                        group_index: 0,
                        priority: None,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        }

        if report.total() > 0 {
            tracing::trace!(
                "Main-thread drain: {} executed, {} failed",
                report.executed,
                report.failed
            );
        }
        report
    }

    /// Actions waiting for the next drain
    pub fn pending(&self) -> usize {
        lock(&self.actions).len()
    }

    /// Release spare buffer space when idle
    pub fn trim(&self) {
        let mut actions = lock(&self.actions);
        if actions.is_empty() {
            actions.shrink_to_fit();
        }
    }
}
