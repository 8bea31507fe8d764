//! # Reminders Feature
//!
//! Deadline reminder jobs with at-most-once firing.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.4.0
//! - **Toggleable**: true

pub mod job;
pub mod scheduler;

pub use job::{ReminderJob, ReminderStatus};
pub use scheduler::ReminderScheduler;
