//! # Reminder Job Records
//!
//! One record per (campaign, days-before-deadline) pair. The key invariant:
//! at most one job exists per pair, and it fires at most once.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.4.0

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Status of a reminder job. `Fired`, `Skipped` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderStatus {
    /// Waiting for its fire time
    Scheduled,
    /// Fired exactly once; per-recipient outcomes live in dispatch jobs
    Fired,
    /// Deadline already past, or nobody matched the criteria at fire time
    Skipped,
    /// Withdrawn before the fire time
    Cancelled,
}

impl ReminderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReminderStatus::Scheduled)
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderStatus::Scheduled => write!(f, "scheduled"),
            ReminderStatus::Fired => write!(f, "fired"),
            ReminderStatus::Skipped => write!(f, "skipped"),
            ReminderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(ReminderStatus::Scheduled),
            "fired" => Ok(ReminderStatus::Fired),
            "skipped" => Ok(ReminderStatus::Skipped),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid reminder status: {}", s)),
        }
    }
}

/// A scheduled re-notification ahead of a campaign deadline. Recipients are
/// not stored here: the roster is re-resolved with the campaign's criteria
/// when the job fires, so only currently-eligible students are notified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJob {
    pub campaign_id: String,

    /// Days ahead of the deadline (the record key with the campaign).
    pub days_before: u32,

    /// When this job becomes due.
    pub fire_at: DateTime<Utc>,

    pub status: ReminderStatus,

    pub created_at: DateTime<Utc>,

    pub fired_at: Option<DateTime<Utc>>,
}

impl ReminderJob {
    /// Build a Scheduled job whose fire time is `deadline - days_before` at
    /// the configured time of day (UTC).
    pub fn scheduled(
        campaign_id: &str,
        days_before: u32,
        deadline: NaiveDate,
        time_of_day: NaiveTime,
        now: DateTime<Utc>,
    ) -> Self {
        let fire_date = deadline - chrono::Duration::days(days_before as i64);
        let fire_at = Utc.from_utc_datetime(&fire_date.and_time(time_of_day));
        ReminderJob {
            campaign_id: campaign_id.to_string(),
            days_before,
            fire_at,
            status: ReminderStatus::Scheduled,
            created_at: now,
            fired_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_parse() {
        for status in [
            ReminderStatus::Scheduled,
            ReminderStatus::Fired,
            ReminderStatus::Skipped,
            ReminderStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<ReminderStatus>().unwrap(), status);
        }
        assert!("done".parse::<ReminderStatus>().is_err());
    }

    #[test]
    fn test_fire_time_computation() {
        let deadline = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let job = ReminderJob::scheduled("camp", 7, deadline, nine, Utc::now());
        assert_eq!(job.fire_at.to_rfc3339(), "2024-01-08T09:00:00+00:00");
        assert_eq!(job.status, ReminderStatus::Scheduled);
    }
}
