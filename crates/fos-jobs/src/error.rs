//! Job System Errors

/// Errors returned synchronously by the job system
///
/// Failures inside a job body are never returned here. They happen on a
/// worker thread and are recorded as [`JobFailure`](crate::JobFailure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// Rejected input (missing body, zero group size, bad config)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Worker threads or the counter pool could not be created
    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    /// The job system is shutting down and accepts no more work
    #[error("Job system is shut down")]
    ShutDown,
}

impl JobError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn init(message: impl Into<String>) -> Self {
        Self::InitializationFailure(message.into())
    }
}
