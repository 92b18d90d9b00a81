//! Job Failure Log
//!
//! Jobs fail on worker threads where no caller can receive an error, so
//! failures are logged and kept in a bounded log for later inspection.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{lock, JobPriority};

/// A job body that panicked or returned an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Diagnostic name of the job
    pub name: String,
    /// Group index within a batch (0 for single jobs)
    pub group_index: u32,
    /// Tier the job was queued on (`None` for main-thread actions)
    pub priority: Option<JobPriority>,
    /// Panic payload or error message
    pub message: String,
}

/// Bounded record of job failures, oldest dropped first
#[derive(Debug)]
pub struct FailureLog {
    entries: Mutex<VecDeque<JobFailure>>,
    capacity: usize,
    total: AtomicU64,
}

impl FailureLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            total: AtomicU64::new(0),
        }
    }

    /// Log and store a failure
    pub fn record(&self, failure: JobFailure) {
        tracing::error!(
            "Job '{}' (group {}) failed: {}",
            failure.name,
            failure.group_index,
            failure.message
        );
        self.total.fetch_add(1, Ordering::Relaxed);

        if self.capacity == 0 {
            return;
        }
        let mut entries = lock(&self.entries);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(failure);
    }

    /// Remove and return every stored failure
    pub fn take(&self) -> Vec<JobFailure> {
        lock(&self.entries).drain(..).collect()
    }

    /// Stored failure count
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failures recorded since creation, including dropped ones
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Release spare buffer space
    pub fn trim(&self) {
        let mut entries = lock(&self.entries);
        entries.truncate(self.capacity);
        entries.shrink_to_fit();
    }
}

/// Readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(name: &str) -> JobFailure {
        JobFailure {
            name: name.to_string(),
            group_index: 0,
            priority: Some(JobPriority::Normal),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_log_is_bounded() {
        let log = FailureLog::new(2);

        log.record(failure("a"));
        log.record(failure("b"));
        log.record(failure("c"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.total(), 3);

        let names: Vec<_> = log.take().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_capacity_only_counts() {
        let log = FailureLog::new(0);
        log.record(failure("a"));

        assert!(log.is_empty());
        assert_eq!(log.total(), 1);
    }

    fn formatted_panic() {
        panic!("bad {}", 42)
    }

    fn static_panic() {
        panic!("static")
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(formatted_panic).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad 42");

        let payload = std::panic::catch_unwind(static_panic).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }
}
