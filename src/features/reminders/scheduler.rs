//! # Reminder Scheduler
//!
//! Owns the persisted set of reminder jobs and the periodic tick that fires
//! them. Firing re-resolves the live recipient set with the campaign's
//! original criteria (the recipient list is never cached on the job) and
//! drives the rate-limited dispatcher, whose Sent-skip makes a crash-recovery
//! re-fire harmless. The Scheduled-to-Fired transition goes through the
//! store's compare-and-set, so overlapping ticks settle a job exactly once.
//!
//! - **Version**: 2.1.0
//! - **Since**: 0.4.0
//!
//! ## Changelog
//! - 2.1.0: Daily purge of settled jobs
//! - 2.0.0: Store-backed jobs with compare-and-set firing
//! - 1.0.0: Initial in-memory release

use crate::core::template::{self, TemplateSet};
use crate::core::EngineError;
use crate::database::Database;
use crate::features::dispatch::{Dispatcher, StopFlag};
use crate::features::filter;
use crate::features::reminders::job::{ReminderJob, ReminderStatus};
use crate::features::roster::{self, RosterSource};
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Settled jobs older than this many days are purged by the daily cleanup.
const SETTLED_RETENTION_DAYS: u32 = 30;

pub struct ReminderScheduler {
    database: Database,
    dispatcher: Dispatcher,
    roster: Arc<dyn RosterSource>,
    templates: TemplateSet,
    tick_interval: Duration,
    time_of_day: NaiveTime,
    country_code: String,
}

impl ReminderScheduler {
    pub fn new(
        database: Database,
        dispatcher: Dispatcher,
        roster: Arc<dyn RosterSource>,
        templates: TemplateSet,
        tick_interval: Duration,
        time_of_day: NaiveTime,
        country_code: String,
    ) -> Self {
        ReminderScheduler {
            database,
            dispatcher,
            roster,
            templates,
            tick_interval,
            time_of_day,
            country_code,
        }
    }

    /// Create one Scheduled job per requested day offset for a campaign.
    /// Offsets are deduplicated and an existing job for a (campaign, offset)
    /// pair is left untouched, preserving the at-most-one invariant and never
    /// re-arming a job that already settled.
    pub async fn schedule(&self, campaign_id: &str, offsets: &[u32]) -> Result<Vec<ReminderJob>> {
        let campaign = self
            .database
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| anyhow!("unknown campaign {campaign_id}"))?;

        let mut seen = std::collections::HashSet::new();
        let mut jobs = Vec::new();
        let now = Utc::now();
        for &days_before in offsets {
            if !seen.insert(days_before) {
                continue;
            }
            if let Some(existing) = self.database.get_reminder_job(campaign_id, days_before).await? {
                debug!(
                    "Reminder {campaign_id}/{days_before}d already exists ({}), keeping it",
                    existing.status
                );
                jobs.push(existing);
                continue;
            }
            let job = ReminderJob::scheduled(
                campaign_id,
                days_before,
                campaign.deadline,
                self.time_of_day,
                now,
            );
            self.database.upsert_reminder_job(&job).await?;
            info!(
                "Scheduled reminder {campaign_id}/{days_before}d for {}",
                job.fire_at
            );
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Cancel a Scheduled reminder. Returns false when the job is unknown,
    /// already settled, or its fire time has passed.
    pub async fn cancel(&self, campaign_id: &str, days_before: u32) -> Result<bool> {
        let Some(job) = self.database.get_reminder_job(campaign_id, days_before).await? else {
            warn!("Cancel requested for unknown reminder {campaign_id}/{days_before}d");
            return Ok(false);
        };
        if job.status != ReminderStatus::Scheduled || job.fire_at <= Utc::now() {
            return Ok(false);
        }
        match self
            .database
            .compare_and_set_reminder_status(
                campaign_id,
                days_before,
                ReminderStatus::Scheduled,
                ReminderStatus::Cancelled,
                None,
            )
            .await
        {
            Ok(()) => {
                info!("Reminder {campaign_id}/{days_before}d cancelled");
                Ok(true)
            }
            Err(e) if EngineError::is_conflict(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run the tick loop until a stop is requested.
    pub async fn run(self: Arc<Self>, stop: StopFlag) {
        info!(
            "Reminder scheduler started (tick every {:?})",
            self.tick_interval
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        let mut last_cleanup = Utc::now().date_naive();
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.wait() => break,
            }

            match self.tick_once(Utc::now()).await {
                Ok(0) => {}
                Ok(fired) => info!("Reminder tick fired {fired} job(s)"),
                Err(e) => error!("Reminder tick failed: {e:#}"),
            }

            let today = Utc::now().date_naive();
            if today != last_cleanup {
                last_cleanup = today;
                if let Err(e) = self
                    .database
                    .purge_settled_reminder_jobs(Utc::now(), SETTLED_RETENTION_DAYS)
                    .await
                {
                    error!("Reminder cleanup failed: {e:#}");
                }
            }
        }
        info!("Reminder scheduler stopped");
    }

    /// Evaluate all due jobs once. Returns how many settled as Fired. A
    /// failure on one job is logged and never stops the others.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> Result<u32> {
        let due = self.database.due_reminder_jobs(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!("{} reminder job(s) due", due.len());

        let mut fired = 0;
        for job in due {
            match self.fire_job(&job, now).await {
                Ok(ReminderStatus::Fired) => fired += 1,
                Ok(_) => {}
                Err(e) => error!(
                    "Reminder {}/{}d failed: {e:#}",
                    job.campaign_id, job.days_before
                ),
            }
        }
        Ok(fired)
    }

    /// Drive one due job to a terminal status. Returns the status it settled
    /// into, or `Scheduled` when a concurrent tick won the race.
    async fn fire_job(&self, job: &ReminderJob, now: DateTime<Utc>) -> Result<ReminderStatus> {
        let campaign = self
            .database
            .get_campaign(&job.campaign_id)
            .await?
            .ok_or_else(|| anyhow!("campaign {} missing from store", job.campaign_id))?;

        if now.date_naive() > campaign.deadline {
            warn!(
                "Deadline for {} already passed, skipping {}d reminder",
                campaign.company, job.days_before
            );
            return self.settle(job, ReminderStatus::Skipped, None).await;
        }

        let roster = roster::loader::load_with_override(
            self.roster.as_ref(),
            campaign.criteria.custom_file.as_deref(),
            &self.country_code,
        )
        .await?;
        let recipients = filter::resolve(&roster, &campaign.criteria);
        if recipients.is_empty() {
            info!(
                "No eligible recipients left for {}, skipping {}d reminder",
                campaign.company, job.days_before
            );
            return self.settle(job, ReminderStatus::Skipped, None).await;
        }

        let body_template = self
            .templates
            .get(template::REMINDER)
            .ok_or_else(|| anyhow!("reminder template missing"))?
            .to_string();
        let days_remaining = (campaign.deadline - now.date_naive()).num_days().max(0);
        let mut vars = campaign.template_vars();
        vars.insert("days_remaining".to_string(), days_remaining.to_string());

        info!(
            "Firing {}d reminder for {} - {} ({} recipient(s))",
            job.days_before,
            campaign.company,
            campaign.position,
            recipients.len()
        );
        let stop = StopFlag::default();
        self.dispatcher
            .dispatch(
                &campaign.id,
                &recipients,
                |recipient| {
                    let mut vars = vars.clone();
                    vars.insert("name".to_string(), recipient.name.clone());
                    TemplateSet::render(&body_template, &vars)
                },
                &stop,
            )
            .await?;

        self.settle(job, ReminderStatus::Fired, Some(now)).await
    }

    /// Compare-and-set Scheduled → `status`. A conflict means another tick
    /// settled the job first; report it as still-Scheduled and move on.
    async fn settle(
        &self,
        job: &ReminderJob,
        status: ReminderStatus,
        fired_at: Option<DateTime<Utc>>,
    ) -> Result<ReminderStatus> {
        match self
            .database
            .compare_and_set_reminder_status(
                &job.campaign_id,
                job.days_before,
                ReminderStatus::Scheduled,
                status,
                fired_at,
            )
            .await
        {
            Ok(()) => Ok(status),
            Err(e) if EngineError::is_conflict(&e) => {
                debug!(
                    "Lost settle race for {}/{}d, another tick got there first",
                    job.campaign_id, job.days_before
                );
                Ok(ReminderStatus::Scheduled)
            }
            Err(e) => Err(e),
        }
    }
}
