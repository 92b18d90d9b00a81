//! Jobs
//!
//! A job is a type-erased closure plus the metadata the scheduler needs:
//! counter, priority tier, group index and a diagnostic name.

use std::borrow::Cow;
use std::ops::Range;

use crate::JobCounter;

/// Job priority tiers, dequeued highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum JobPriority {
    /// Background work (streaming, cleanup)
    Low = 0,
    /// Regular frame work
    #[default]
    Normal = 1,
    /// Work on the critical path of the current frame
    High = 2,
}

impl JobPriority {
    /// All tiers in dequeue order
    pub const ALL: [JobPriority; 3] = [Self::High, Self::Normal, Self::Low];

    /// Get priority name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Position in the queue set, 0 is dequeued first
    pub(crate) fn tier(self) -> usize {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// Outcome of a job body
///
/// Bodies return either `()` or a `Result`; an `Err` is recorded as a job
/// failure just like a panic.
pub trait JobOutcome {
    /// Convert into `Err(message)` on failure
    fn into_outcome(self) -> Result<(), String>;
}

impl JobOutcome for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: std::fmt::Display> JobOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

/// Type-erased job body
pub type JobFn = Box<dyn FnOnce() -> Result<(), String> + Send + 'static>;

/// Optional parameters for a submission
#[derive(Debug, Clone, Default)]
pub struct SubmitParams {
    /// Queue tier
    pub priority: JobPriority,
    /// Diagnostic name
    pub name: Option<Cow<'static, str>>,
}

impl SubmitParams {
    /// Parameters with the given priority
    pub fn priority(priority: JobPriority) -> Self {
        Self {
            priority,
            name: None,
        }
    }

    /// Set the diagnostic name
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Slice of a batch handed to one group job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    /// Index of the group within the batch
    pub group_index: u32,
    /// First element index covered by the group
    pub start: usize,
    /// Number of elements in the group
    pub len: usize,
}

impl BatchRange {
    /// Element indices covered by the group
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// Split `total_count` elements into groups of `group_size`
    ///
    /// The last group is shorter when the total is not a multiple of the
    /// group size. `group_size` must be non-zero.
    pub fn split(total_count: usize, group_size: usize) -> impl Iterator<Item = BatchRange> {
        debug_assert!(group_size > 0);
        (0..total_count.div_ceil(group_size)).map(move |group| {
            let start = group * group_size;
            BatchRange {
                group_index: group as u32,
                start,
                len: group_size.min(total_count - start),
            }
        })
    }
}

/// One schedulable unit of work
pub struct JobDescriptor {
    pub(crate) body: Option<JobFn>,
    pub(crate) counter: Option<JobCounter>,
    pub(crate) group_index: u32,
    pub(crate) priority: JobPriority,
    pub(crate) name: Cow<'static, str>,
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("group_index", &self.group_index)
            .field("has_body", &self.body.is_some())
            .field("has_counter", &self.counter.is_some())
            .finish()
    }
}

impl Default for JobDescriptor {
    fn default() -> Self {
        Self {
            body: None,
            counter: None,
            group_index: 0,
            priority: JobPriority::Normal,
            name: Cow::Borrowed("job"),
        }
    }
}

impl JobDescriptor {
    /// Create a descriptor around a body
    pub fn new<F, R>(body: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: JobOutcome,
    {
        Self {
            body: Some(Box::new(move || body().into_outcome())),
            ..Self::default()
        }
    }

    /// Attach a completion counter
    pub fn with_counter(mut self, counter: &JobCounter) -> Self {
        self.counter = Some(counter.clone());
        self
    }

    /// Set the queue tier
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the diagnostic name
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Apply submission parameters
    pub fn with_params(mut self, params: SubmitParams) -> Self {
        self.priority = params.priority;
        if let Some(name) = params.name {
            self.name = name;
        }
        self
    }

    pub(crate) fn with_group_index(mut self, group_index: u32) -> Self {
        self.group_index = group_index;
        self
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue tier
    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    /// Group index within a batch (0 for single jobs)
    pub fn group_index(&self) -> u32 {
        self.group_index
    }

    /// Whether a body is attached
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}
