pub mod job;
pub mod runtime;

pub use job::{EnqueueOptions, Job, JobState, JobTransition};
pub use runtime::{Context, HandlerOutcome, JobHandler, WorkerRuntime};
