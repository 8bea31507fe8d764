//! # Features Layer
//!
//! Each submodule is one feature of the engine, with its public items
//! re-exported here.

pub mod campaigns;
pub mod dispatch;
pub mod filter;
pub mod reminders;
pub mod roster;

pub use campaigns::{Campaign, CampaignParams, CampaignService, CampaignStatus, SchedulerRuntime};
pub use dispatch::{DispatchJob, DispatchStatus, DispatchSummary, Dispatcher, RetryPolicy, StopFlag};
pub use filter::{resolve, FilterCriteria};
pub use reminders::{ReminderJob, ReminderScheduler, ReminderStatus};
pub use roster::{JsonRoster, Recipient, RosterSource};
