//! # Dispatch Job Records
//!
//! One record per (campaign, recipient) pair, persisted on every status
//! change so a crash mid-batch loses at most the in-flight send.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a dispatch job. `Sent` and `Exhausted` are terminal; `Failed`
/// marks a retryable failure checkpointed between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// Job created but no attempt made yet
    Pending,
    /// Message delivered to the transport
    Sent,
    /// Last attempt failed but the attempt budget is not spent
    Failed,
    /// Retries exhausted or the failure was permanent
    Exhausted,
}

impl DispatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchStatus::Sent | DispatchStatus::Exhausted)
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::Pending => write!(f, "pending"),
            DispatchStatus::Sent => write!(f, "sent"),
            DispatchStatus::Failed => write!(f, "failed"),
            DispatchStatus::Exhausted => write!(f, "exhausted"),
        }
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DispatchStatus::Pending),
            "sent" => Ok(DispatchStatus::Sent),
            "failed" => Ok(DispatchStatus::Failed),
            "exhausted" => Ok(DispatchStatus::Exhausted),
            _ => Err(anyhow::anyhow!("Invalid dispatch status: {}", s)),
        }
    }
}

/// A dispatch attempt record. Keyed by (campaign_id, address); mutated only
/// by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub campaign_id: String,

    /// Recipient address (the record key together with the campaign).
    pub address: String,

    /// Display name, kept for the status report.
    pub recipient_name: String,

    /// Rendered message body.
    pub body: String,

    pub status: DispatchStatus,

    /// Attempts made so far, including the first try.
    pub attempts: u32,

    pub last_attempt: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
}

impl DispatchJob {
    pub fn new(campaign_id: &str, address: &str, recipient_name: &str, body: &str) -> Self {
        DispatchJob {
            campaign_id: campaign_id.to_string(),
            address: address.to_string(),
            recipient_name: recipient_name.to_string(),
            body: body.to_string(),
            status: DispatchStatus::Pending,
            attempts: 0,
            last_attempt: None,
            last_error: None,
        }
    }
}

/// Aggregate result of one dispatch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub sent: u32,
    /// Recipients skipped because a previous run already delivered to them.
    pub skipped: u32,
    pub exhausted: u32,
    /// True when a cooperative stop ended the batch early.
    pub stopped: bool,
    pub failures: Vec<FailedRecipient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRecipient {
    pub name: String,
    pub address: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(DispatchStatus::Pending.to_string(), "pending");
        assert_eq!(DispatchStatus::Sent.to_string(), "sent");
        assert_eq!(DispatchStatus::Failed.to_string(), "failed");
        assert_eq!(DispatchStatus::Exhausted.to_string(), "exhausted");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "sent".parse::<DispatchStatus>().unwrap(),
            DispatchStatus::Sent
        );
        assert_eq!(
            "EXHAUSTED".parse::<DispatchStatus>().unwrap(),
            DispatchStatus::Exhausted
        );
        assert!("delivered".parse::<DispatchStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(DispatchStatus::Sent.is_terminal());
        assert!(DispatchStatus::Exhausted.is_terminal());
        assert!(!DispatchStatus::Pending.is_terminal());
        assert!(!DispatchStatus::Failed.is_terminal());
    }
}
