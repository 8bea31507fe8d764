// Core layer - configuration, errors, templates
pub mod core;

// Features layer - all feature modules
pub mod features;

// Infrastructure
pub mod database;
pub mod transport;

// Re-export core config for convenience
pub use crate::core::{Config, EngineError, TemplateSet};

// Re-export feature items
pub use features::{
    // Campaigns
    Campaign, CampaignParams, CampaignService, CampaignStatus, SchedulerRuntime,
    // Dispatch
    DispatchJob, DispatchStatus, DispatchSummary, Dispatcher, RetryPolicy, StopFlag,
    // Filtering
    FilterCriteria,
    // Reminders
    ReminderJob, ReminderScheduler, ReminderStatus,
    // Roster
    JsonRoster, Recipient, RosterSource,
};

// Re-export infrastructure handles
pub use database::Database;
pub use transport::{HttpGatewayTransport, SendError, SharedGate, Transport, TransportGate};
