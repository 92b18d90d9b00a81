//! Job System Configuration

use crate::JobError;

/// Default number of recyclable counters
pub const DEFAULT_COUNTER_POOL_CAPACITY: usize = 256;

/// Default number of `update` ticks between housekeeping passes
pub const DEFAULT_HOUSEKEEPING_INTERVAL: u32 = 60;

/// Default number of job failures kept for inspection
pub const DEFAULT_FAILURE_LOG_CAPACITY: usize = 64;

/// Job system configuration options
#[derive(Debug, Clone)]
pub struct JobSystemConfig {
    /// Number of worker threads (`None` = hardware threads minus the main thread)
    pub worker_count: Option<usize>,

    /// Stack size hint for worker threads (bytes)
    pub stack_size: Option<usize>,

    /// Number of counters preallocated for recycling
    pub counter_pool_capacity: usize,

    /// Worker thread name prefix, suffixed with the worker index
    pub thread_name_prefix: String,

    /// Ticks between housekeeping passes in `JobSystem::update`
    pub housekeeping_interval: u32,

    /// Maximum number of recorded job failures
    pub failure_log_capacity: usize,
}

impl Default for JobSystemConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            stack_size: None,
            counter_pool_capacity: DEFAULT_COUNTER_POOL_CAPACITY,
            thread_name_prefix: "fos-job".to_string(),
            housekeeping_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
            failure_log_capacity: DEFAULT_FAILURE_LOG_CAPACITY,
        }
    }
}

impl JobSystemConfig {
    /// Set an explicit worker count
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Set the worker stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Set the counter pool capacity
    pub fn with_counter_pool_capacity(mut self, capacity: usize) -> Self {
        self.counter_pool_capacity = capacity;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: &str) -> Self {
        self.thread_name_prefix = prefix.to_string();
        self
    }

    /// Set the housekeeping interval in ticks
    pub fn with_housekeeping_interval(mut self, ticks: u32) -> Self {
        self.housekeeping_interval = ticks;
        self
    }

    /// Set the failure log capacity
    pub fn with_failure_log_capacity(mut self, capacity: usize) -> Self {
        self.failure_log_capacity = capacity;
        self
    }

    /// Worker count after resolving the automatic default
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(default_worker_count)
    }

    /// Check the configuration before any resource is created
    pub fn validate(&self) -> Result<(), JobError> {
        if self.worker_count == Some(0) {
            return Err(JobError::invalid("worker count must be at least 1"));
        }
        if self.counter_pool_capacity == 0 {
            return Err(JobError::invalid("counter pool capacity must be at least 1"));
        }
        if self.housekeeping_interval == 0 {
            return Err(JobError::invalid("housekeeping interval must be at least 1 tick"));
        }
        if self.stack_size == Some(0) {
            return Err(JobError::invalid("stack size must be non-zero"));
        }
        Ok(())
    }
}

/// Hardware threads minus one reserved for the main thread
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
        .saturating_sub(1)
        .max(1)
}
