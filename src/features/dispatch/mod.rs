//! # Dispatch Feature
//!
//! Rate-limited, retrying delivery of one rendered message per recipient,
//! with every outcome checkpointed to the job store.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false

pub mod dispatcher;
pub mod job;

pub use dispatcher::{Dispatcher, RetryPolicy, StopFlag};
pub use job::{DispatchJob, DispatchStatus, DispatchSummary, FailedRecipient};
