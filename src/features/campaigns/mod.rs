//! # Campaigns Feature
//!
//! Campaign records and the engine's command surface: dispatch, reminder
//! scheduling, scheduler lifecycle and status queries.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.5.0
//! - **Toggleable**: false

pub mod model;
pub mod service;

pub use model::{Campaign, CampaignParams, CampaignStatus};
pub use service::{CampaignService, SchedulerRuntime};
