//! # Campaign Service
//!
//! The command surface behind whatever front end drives the engine. Campaign
//! setup failures (bad criteria, unreadable roster) abort before any send
//! goes out; per-recipient failures surface only in the aggregate summary.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.5.0
//!
//! ## Changelog
//! - 1.1.0: Resume command for interrupted batches
//! - 1.0.0: Initial release

use crate::core::template::{self, TemplateSet};
use crate::core::EngineError;
use crate::database::Database;
use crate::features::campaigns::model::{Campaign, CampaignParams, CampaignStatus};
use crate::features::dispatch::{DispatchSummary, Dispatcher, StopFlag};
use crate::features::filter::{self, FilterCriteria};
use crate::features::reminders::{ReminderJob, ReminderScheduler};
use crate::features::roster::{self, Recipient, RosterSource};
use anyhow::{anyhow, Result};
use chrono::Utc;
use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handle to the background reminder loop. Dropping it leaves the loop
/// running; call [`SchedulerRuntime::shutdown`] for an orderly stop.
pub struct SchedulerRuntime {
    stop: StopFlag,
    task: JoinHandle<()>,
}

impl SchedulerRuntime {
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub async fn shutdown(self) {
        self.stop.request_stop();
        if self.task.await.is_err() {
            warn!("Reminder scheduler task ended abnormally");
        }
    }
}

pub struct CampaignService {
    database: Database,
    roster: Arc<dyn RosterSource>,
    templates: TemplateSet,
    dispatcher: Dispatcher,
    scheduler: Arc<ReminderScheduler>,
    default_reminder_offsets: Vec<u32>,
    default_country_code: String,
    /// Campaigns are immutable after creation, so a read cache is safe.
    campaigns: DashMap<String, Campaign>,
}

impl CampaignService {
    pub fn new(
        database: Database,
        roster: Arc<dyn RosterSource>,
        templates: TemplateSet,
        dispatcher: Dispatcher,
        scheduler: Arc<ReminderScheduler>,
        default_reminder_offsets: Vec<u32>,
        default_country_code: String,
    ) -> Self {
        CampaignService {
            database,
            roster,
            templates,
            dispatcher,
            scheduler,
            default_reminder_offsets,
            default_country_code,
            campaigns: DashMap::new(),
        }
    }

    /// Create a campaign and dispatch its announcement to every recipient
    /// matching `criteria`. Returns the persisted campaign and the dispatch
    /// summary.
    pub async fn dispatch(
        &self,
        params: CampaignParams,
        criteria: FilterCriteria,
        stop: &StopFlag,
    ) -> Result<(Campaign, DispatchSummary)> {
        criteria.validate()?;
        let recipients = self.resolve_recipients(&criteria).await?;
        info!(
            "{} student(s) match the criteria for {} - {}",
            recipients.len(),
            params.company,
            params.position
        );

        let campaign = Campaign::create(params, criteria, Utc::now());
        self.database.insert_campaign(&campaign).await?;
        self.campaigns.insert(campaign.id.clone(), campaign.clone());

        let summary = self.run_dispatch(&campaign, &recipients, stop).await?;
        Ok((campaign, summary))
    }

    /// Resume an interrupted batch: recipients already delivered to are
    /// skipped by the dispatcher's checkpoint lookup.
    pub async fn resume(&self, campaign_id: &str, stop: &StopFlag) -> Result<DispatchSummary> {
        let campaign = self.campaign(campaign_id).await?;
        let recipients = self.resolve_recipients(&campaign.criteria).await?;
        self.run_dispatch(&campaign, &recipients, stop).await
    }

    /// Create reminder jobs for a campaign. An empty offset list falls back
    /// to the configured defaults.
    pub async fn schedule_reminders(
        &self,
        campaign_id: &str,
        offsets: &[u32],
    ) -> Result<Vec<ReminderJob>> {
        let offsets = if offsets.is_empty() {
            &self.default_reminder_offsets
        } else {
            offsets
        };
        self.scheduler.schedule(campaign_id, offsets).await
    }

    /// Cancel a Scheduled reminder ahead of its fire time.
    pub async fn cancel_reminder(&self, campaign_id: &str, days_before: u32) -> Result<bool> {
        self.scheduler.cancel(campaign_id, days_before).await
    }

    /// Spawn the background reminder tick loop.
    pub fn start_scheduler_loop(&self) -> SchedulerRuntime {
        let stop = StopFlag::default();
        let task = tokio::spawn(self.scheduler.clone().run(stop.clone()));
        SchedulerRuntime { stop, task }
    }

    /// Per-status dispatch counts plus every reminder job's state.
    pub async fn status(&self, campaign_id: &str) -> Result<CampaignStatus> {
        self.campaign(campaign_id).await?;
        self.database.campaign_status(campaign_id).await
    }

    async fn campaign(&self, campaign_id: &str) -> Result<Campaign> {
        if let Some(campaign) = self.campaigns.get(campaign_id) {
            return Ok(campaign.clone());
        }
        let campaign = self
            .database
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| anyhow!("unknown campaign {campaign_id}"))?;
        self.campaigns
            .insert(campaign.id.clone(), campaign.clone());
        Ok(campaign)
    }

    async fn resolve_recipients(&self, criteria: &FilterCriteria) -> Result<Vec<Recipient>> {
        let roster = roster::loader::load_with_override(
            self.roster.as_ref(),
            criteria.custom_file.as_deref(),
            &self.default_country_code,
        )
        .await?;
        Ok(filter::resolve(&roster, criteria))
    }

    async fn run_dispatch(
        &self,
        campaign: &Campaign,
        recipients: &[Recipient],
        stop: &StopFlag,
    ) -> Result<DispatchSummary> {
        let body_template = self
            .templates
            .get(template::PLACEMENT_ALERT)
            .ok_or_else(|| anyhow!("placement alert template missing"))?
            .to_string();
        let vars = campaign.template_vars();

        self.dispatcher
            .dispatch(
                &campaign.id,
                recipients,
                |recipient| {
                    let mut vars = vars.clone();
                    vars.insert("name".to_string(), recipient.name.clone());
                    vars.insert("course".to_string(), recipient.course.clone());
                    TemplateSet::render(&body_template, &vars)
                },
                stop,
            )
            .await
    }

    /// True when `err` is a campaign-setup failure the caller should show
    /// the user (as opposed to an internal store/transport problem).
    pub fn is_setup_failure(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidCriteria(_)) | Some(EngineError::RosterUnavailable(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dispatch::RetryPolicy;
    use crate::features::roster::JsonRoster;
    use crate::transport::testing::{gate_over, ScriptedTransport};
    use chrono::{NaiveDate, NaiveTime};
    use std::time::Duration;

    fn params() -> CampaignParams {
        CampaignParams {
            company: "TechCorp".to_string(),
            position: "Software Engineer".to_string(),
            package: "12 LPA".to_string(),
            location: "Bangalore".to_string(),
            deadline: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            requirements: Some("Rust, SQL".to_string()),
        }
    }

    fn write_roster(entries: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("roster-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, entries).unwrap();
        path
    }

    async fn service(
        roster_path: &std::path::Path,
        transport: Arc<ScriptedTransport>,
    ) -> CampaignService {
        let database = Database::new(":memory:").await.unwrap();
        let gate = gate_over(transport);
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let roster: Arc<dyn RosterSource> = Arc::new(JsonRoster::new(roster_path, "+91"));
        let dispatcher = Dispatcher::new(database.clone(), gate.clone(), retry.clone());
        let scheduler = Arc::new(ReminderScheduler::new(
            database.clone(),
            Dispatcher::new(database.clone(), gate, retry),
            roster.clone(),
            TemplateSet::builtin(),
            Duration::from_millis(10),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            "+91".to_string(),
        ));
        CampaignService::new(
            database,
            roster,
            TemplateSet::builtin(),
            dispatcher,
            scheduler,
            vec![7, 3, 1],
            "+91".to_string(),
        )
    }

    const TWO_STUDENTS: &str = r#"[
        {"name": "Asha", "phone": "9876543210", "course": "CS", "year": 4,
         "cgpa": 8.5, "skills": ["Rust"]},
        {"name": "Ravi", "phone": "9876543211", "course": "CS", "year": 4,
         "cgpa": 6.0, "skills": []}
    ]"#;

    #[tokio::test]
    async fn test_dispatch_filters_renders_and_reports() {
        let roster_path = write_roster(TWO_STUDENTS);
        let transport = ScriptedTransport::always_ok();
        let service = service(&roster_path, transport.clone()).await;

        let criteria = FilterCriteria {
            min_score: Some(7.0),
            ..Default::default()
        };
        let (campaign, summary) = service
            .dispatch(params(), criteria, &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(transport.call_log(), vec!["+919876543210"]);

        let status = service.status(&campaign.id).await.unwrap();
        assert_eq!(status.sent, 1);
        assert_eq!(status.pending, 0);

        std::fs::remove_file(&roster_path).ok();
    }

    #[tokio::test]
    async fn test_invalid_criteria_aborts_before_any_send() {
        let roster_path = write_roster(TWO_STUDENTS);
        let transport = ScriptedTransport::always_ok();
        let service = service(&roster_path, transport.clone()).await;

        let criteria = FilterCriteria {
            min_score: Some(-2.0),
            ..Default::default()
        };
        let err = service
            .dispatch(params(), criteria, &StopFlag::default())
            .await
            .unwrap_err();

        assert!(CampaignService::is_setup_failure(&err));
        assert_eq!(transport.total_calls(), 0);

        std::fs::remove_file(&roster_path).ok();
    }

    #[tokio::test]
    async fn test_missing_roster_aborts() {
        let transport = ScriptedTransport::always_ok();
        let service =
            service(std::path::Path::new("/nonexistent/students.json"), transport.clone()).await;

        let err = service
            .dispatch(params(), FilterCriteria::default(), &StopFlag::default())
            .await
            .unwrap_err();

        assert!(CampaignService::is_setup_failure(&err));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_schedule_reminders_uses_defaults_when_empty() {
        let roster_path = write_roster(TWO_STUDENTS);
        let service = service(&roster_path, ScriptedTransport::always_ok()).await;

        let (campaign, _) = service
            .dispatch(params(), FilterCriteria::default(), &StopFlag::default())
            .await
            .unwrap();

        let jobs = service.schedule_reminders(&campaign.id, &[]).await.unwrap();
        let offsets: Vec<u32> = jobs.iter().map(|j| j.days_before).collect();
        assert_eq!(offsets, vec![7, 3, 1]);

        let status = service.status(&campaign.id).await.unwrap();
        assert_eq!(status.reminders.len(), 3);

        std::fs::remove_file(&roster_path).ok();
    }

    #[tokio::test]
    async fn test_scheduler_runtime_starts_and_stops() {
        let roster_path = write_roster(TWO_STUDENTS);
        let service = service(&roster_path, ScriptedTransport::always_ok()).await;

        let runtime = service.start_scheduler_loop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        runtime.shutdown().await;

        std::fs::remove_file(&roster_path).ok();
    }

    #[tokio::test]
    async fn test_status_for_unknown_campaign_errors() {
        let roster_path = write_roster(TWO_STUDENTS);
        let service = service(&roster_path, ScriptedTransport::always_ok()).await;
        assert!(service.status("nope").await.is_err());
        std::fs::remove_file(&roster_path).ok();
    }
}
