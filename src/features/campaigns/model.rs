//! # Campaign Records
//!
//! A campaign is one placement-opportunity broadcast. Immutable after
//! creation; the criteria snapshot lets reminders re-resolve the live roster
//! later with the same filter.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.5.0

use crate::features::filter::FilterCriteria;
use crate::features::reminders::ReminderJob;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User-supplied fields for a new campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignParams {
    pub company: String,
    pub position: String,
    pub package: String,
    pub location: String,
    /// Application deadline (calendar date).
    pub deadline: NaiveDate,
    pub requirements: Option<String>,
}

/// A persisted campaign with its criteria snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub company: String,
    pub position: String,
    pub package: String,
    pub location: String,
    pub deadline: NaiveDate,
    pub requirements: Option<String>,
    pub criteria: FilterCriteria,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn create(params: CampaignParams, criteria: FilterCriteria, now: DateTime<Utc>) -> Self {
        Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            company: params.company,
            position: params.position,
            package: params.package,
            location: params.location,
            deadline: params.deadline,
            requirements: params.requirements,
            criteria,
            created_at: now,
        }
    }

    /// Template variables shared by every message of this campaign.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("company".to_string(), self.company.clone());
        vars.insert("position".to_string(), self.position.clone());
        vars.insert("package".to_string(), self.package.clone());
        vars.insert("location".to_string(), self.location.clone());
        vars.insert("last_date".to_string(), self.deadline.format("%Y-%m-%d").to_string());
        vars.insert(
            "requirements".to_string(),
            self.requirements
                .clone()
                .unwrap_or_else(|| "As per job description".to_string()),
        );
        vars
    }
}

/// Answer to a status query: per-status dispatch counts plus every reminder
/// job's state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignStatus {
    pub campaign_id: String,
    pub pending: u32,
    pub sent: u32,
    pub failed: u32,
    pub exhausted: u32,
    pub reminders: Vec<ReminderJob>,
}
