//! # Job Store
//!
//! Durable record of campaigns, dispatch attempts and reminder jobs; the
//! single source of truth for idempotency and status queries. Key-value
//! semantics per record: dispatch jobs are keyed by (campaign, address),
//! reminder jobs by (campaign, days-before). Every write is atomic per key;
//! no cross-key transactions exist because each recipient's dispatch state
//! is independent.
//!
//! The compare-and-set operations are the at-most-once guarantee for
//! reminder firing: they fail with a conflict when the expected status no
//! longer matches, and callers treat that as a lost race.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.2.0: Settled-reminder purge for daily cleanup
//! - 1.1.0: Compare-and-set on dispatch and reminder status
//! - 1.0.0: Initial release

use crate::core::EngineError;
use crate::features::campaigns::{Campaign, CampaignStatus};
use crate::features::dispatch::{DispatchJob, DispatchStatus};
use crate::features::reminders::{ReminderJob, ReminderStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use log::{debug, info};
use sqlite::State;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    company TEXT NOT NULL,
    position TEXT NOT NULL,
    package TEXT NOT NULL,
    location TEXT NOT NULL,
    deadline TEXT NOT NULL,
    requirements TEXT,
    criteria TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS dispatch_jobs (
    campaign_id TEXT NOT NULL,
    address TEXT NOT NULL,
    recipient_name TEXT NOT NULL,
    body TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    last_attempt TEXT,
    last_error TEXT,
    PRIMARY KEY (campaign_id, address)
);
CREATE TABLE IF NOT EXISTS reminder_jobs (
    campaign_id TEXT NOT NULL,
    days_before INTEGER NOT NULL,
    fire_at TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    fired_at TEXT,
    PRIMARY KEY (campaign_id, days_before)
);
";

/// Shared handle to the SQLite store. Cheap to clone; all access funnels
/// through one connection guarded by an async mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<sqlite::Connection>>,
}

impl Database {
    /// Open (creating if needed) the store at `path`. `:memory:` is accepted
    /// for tests.
    pub async fn new(path: &str) -> Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
        }
        let conn = sqlite::open(path).with_context(|| format!("opening database {path}"))?;
        conn.execute(SCHEMA)?;
        info!("Job store ready at {path}");
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // Campaigns

    pub async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        let criteria = serde_json::to_string(&campaign.criteria)?;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO campaigns (id, company, position, package, location, deadline,
                                    requirements, criteria, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, campaign.id.as_str()))?;
        stmt.bind((2, campaign.company.as_str()))?;
        stmt.bind((3, campaign.position.as_str()))?;
        stmt.bind((4, campaign.package.as_str()))?;
        stmt.bind((5, campaign.location.as_str()))?;
        stmt.bind((6, campaign.deadline.format("%Y-%m-%d").to_string().as_str()))?;
        match &campaign.requirements {
            Some(req) => stmt.bind((7, req.as_str()))?,
            None => stmt.bind((7, ()))?,
        }
        stmt.bind((8, criteria.as_str()))?;
        stmt.bind((9, to_ts(campaign.created_at).as_str()))?;
        stmt.next()?;
        debug!("Stored campaign {} ({})", campaign.id, campaign.company);
        Ok(())
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM campaigns WHERE id = ?")?;
        stmt.bind((1, id))?;
        if let State::Row = stmt.next()? {
            Ok(Some(read_campaign(&stmt)?))
        } else {
            Ok(None)
        }
    }

    // Dispatch jobs

    pub async fn upsert_dispatch_job(&self, job: &DispatchJob) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO dispatch_jobs
                 (campaign_id, address, recipient_name, body, status, attempts,
                  last_attempt, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, job.campaign_id.as_str()))?;
        stmt.bind((2, job.address.as_str()))?;
        stmt.bind((3, job.recipient_name.as_str()))?;
        stmt.bind((4, job.body.as_str()))?;
        stmt.bind((5, job.status.to_string().as_str()))?;
        stmt.bind((6, job.attempts as i64))?;
        match job.last_attempt {
            Some(ts) => stmt.bind((7, to_ts(ts).as_str()))?,
            None => stmt.bind((7, ()))?,
        }
        match &job.last_error {
            Some(err) => stmt.bind((8, err.as_str()))?,
            None => stmt.bind((8, ()))?,
        }
        stmt.next()?;
        Ok(())
    }

    pub async fn get_dispatch_job(
        &self,
        campaign_id: &str,
        address: &str,
    ) -> Result<Option<DispatchJob>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM dispatch_jobs WHERE campaign_id = ? AND address = ?")?;
        stmt.bind((1, campaign_id))?;
        stmt.bind((2, address))?;
        if let State::Row = stmt.next()? {
            Ok(Some(read_dispatch_job(&stmt)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list_dispatch_jobs(&self, campaign_id: &str) -> Result<Vec<DispatchJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM dispatch_jobs WHERE campaign_id = ? ORDER BY recipient_name, address",
        )?;
        stmt.bind((1, campaign_id))?;
        let mut jobs = Vec::new();
        while let State::Row = stmt.next()? {
            jobs.push(read_dispatch_job(&stmt)?);
        }
        Ok(jobs)
    }

    /// Transition a dispatch job's status only when it still holds the
    /// expected one. Fails with [`EngineError::Conflict`] otherwise.
    pub async fn compare_and_set_dispatch_status(
        &self,
        campaign_id: &str,
        address: &str,
        expected: DispatchStatus,
        new: DispatchStatus,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE dispatch_jobs SET status = ?
             WHERE campaign_id = ? AND address = ? AND status = ?",
        )?;
        stmt.bind((1, new.to_string().as_str()))?;
        stmt.bind((2, campaign_id))?;
        stmt.bind((3, address))?;
        stmt.bind((4, expected.to_string().as_str()))?;
        stmt.next()?;
        if conn.change_count() == 0 {
            return Err(EngineError::Conflict {
                key: format!("{campaign_id}/{address}"),
                expected: expected.to_string(),
            }
            .into());
        }
        Ok(())
    }

    // Reminder jobs

    pub async fn upsert_reminder_job(&self, job: &ReminderJob) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO reminder_jobs
                 (campaign_id, days_before, fire_at, status, created_at, fired_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, job.campaign_id.as_str()))?;
        stmt.bind((2, job.days_before as i64))?;
        stmt.bind((3, to_ts(job.fire_at).as_str()))?;
        stmt.bind((4, job.status.to_string().as_str()))?;
        stmt.bind((5, to_ts(job.created_at).as_str()))?;
        match job.fired_at {
            Some(ts) => stmt.bind((6, to_ts(ts).as_str()))?,
            None => stmt.bind((6, ()))?,
        }
        stmt.next()?;
        Ok(())
    }

    pub async fn get_reminder_job(
        &self,
        campaign_id: &str,
        days_before: u32,
    ) -> Result<Option<ReminderJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM reminder_jobs WHERE campaign_id = ? AND days_before = ?")?;
        stmt.bind((1, campaign_id))?;
        stmt.bind((2, days_before as i64))?;
        if let State::Row = stmt.next()? {
            Ok(Some(read_reminder_job(&stmt)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list_reminder_jobs(&self, campaign_id: &str) -> Result<Vec<ReminderJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM reminder_jobs WHERE campaign_id = ? ORDER BY days_before DESC",
        )?;
        stmt.bind((1, campaign_id))?;
        let mut jobs = Vec::new();
        while let State::Row = stmt.next()? {
            jobs.push(read_reminder_job(&stmt)?);
        }
        Ok(jobs)
    }

    /// Scheduled jobs whose fire time has arrived.
    pub async fn due_reminder_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ReminderJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM reminder_jobs
             WHERE status = 'scheduled' AND fire_at <= ?
             ORDER BY fire_at",
        )?;
        stmt.bind((1, to_ts(now).as_str()))?;
        let mut jobs = Vec::new();
        while let State::Row = stmt.next()? {
            jobs.push(read_reminder_job(&stmt)?);
        }
        Ok(jobs)
    }

    /// Transition a reminder job's status only when it still holds the
    /// expected one. This is the at-most-once firing guard: concurrent
    /// callers race on the same row and exactly one UPDATE lands.
    pub async fn compare_and_set_reminder_status(
        &self,
        campaign_id: &str,
        days_before: u32,
        expected: ReminderStatus,
        new: ReminderStatus,
        fired_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET status = ?, fired_at = ?
             WHERE campaign_id = ? AND days_before = ? AND status = ?",
        )?;
        stmt.bind((1, new.to_string().as_str()))?;
        match fired_at {
            Some(ts) => stmt.bind((2, to_ts(ts).as_str()))?,
            None => stmt.bind((2, ()))?,
        }
        stmt.bind((3, campaign_id))?;
        stmt.bind((4, days_before as i64))?;
        stmt.bind((5, expected.to_string().as_str()))?;
        stmt.next()?;
        if conn.change_count() == 0 {
            return Err(EngineError::Conflict {
                key: format!("{campaign_id}/{days_before}d"),
                expected: expected.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Delete settled reminder jobs older than the retention window.
    /// Returns how many rows went away.
    pub async fn purge_settled_reminder_jobs(
        &self,
        now: DateTime<Utc>,
        retention_days: u32,
    ) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(retention_days as i64);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "DELETE FROM reminder_jobs WHERE status != 'scheduled' AND fire_at < ?",
        )?;
        stmt.bind((1, to_ts(cutoff).as_str()))?;
        stmt.next()?;
        let purged = conn.change_count();
        if purged > 0 {
            info!("Purged {purged} settled reminder job(s)");
        }
        Ok(purged)
    }

    /// Assemble the status report for one campaign.
    pub async fn campaign_status(&self, campaign_id: &str) -> Result<CampaignStatus> {
        let mut status = CampaignStatus {
            campaign_id: campaign_id.to_string(),
            ..Default::default()
        };
        for job in self.list_dispatch_jobs(campaign_id).await? {
            match job.status {
                DispatchStatus::Pending => status.pending += 1,
                DispatchStatus::Sent => status.sent += 1,
                DispatchStatus::Failed => status.failed += 1,
                DispatchStatus::Exhausted => status.exhausted += 1,
            }
        }
        status.reminders = self.list_reminder_jobs(campaign_id).await?;
        Ok(status)
    }
}

/// Fixed-width UTC timestamp so lexicographic ordering in SQL matches
/// chronological ordering.
fn to_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw}"))?
        .with_timezone(&Utc))
}

fn read_campaign(stmt: &sqlite::Statement) -> Result<Campaign> {
    Ok(Campaign {
        id: stmt.read::<String, _>("id")?,
        company: stmt.read::<String, _>("company")?,
        position: stmt.read::<String, _>("position")?,
        package: stmt.read::<String, _>("package")?,
        location: stmt.read::<String, _>("location")?,
        deadline: NaiveDate::parse_from_str(&stmt.read::<String, _>("deadline")?, "%Y-%m-%d")?,
        requirements: stmt.read::<Option<String>, _>("requirements")?,
        criteria: serde_json::from_str(&stmt.read::<String, _>("criteria")?)?,
        created_at: parse_ts(&stmt.read::<String, _>("created_at")?)?,
    })
}

fn read_dispatch_job(stmt: &sqlite::Statement) -> Result<DispatchJob> {
    Ok(DispatchJob {
        campaign_id: stmt.read::<String, _>("campaign_id")?,
        address: stmt.read::<String, _>("address")?,
        recipient_name: stmt.read::<String, _>("recipient_name")?,
        body: stmt.read::<String, _>("body")?,
        status: stmt.read::<String, _>("status")?.parse()?,
        attempts: stmt.read::<i64, _>("attempts")? as u32,
        last_attempt: stmt
            .read::<Option<String>, _>("last_attempt")?
            .map(|s| parse_ts(&s))
            .transpose()?,
        last_error: stmt.read::<Option<String>, _>("last_error")?,
    })
}

fn read_reminder_job(stmt: &sqlite::Statement) -> Result<ReminderJob> {
    Ok(ReminderJob {
        campaign_id: stmt.read::<String, _>("campaign_id")?,
        days_before: stmt.read::<i64, _>("days_before")? as u32,
        fire_at: parse_ts(&stmt.read::<String, _>("fire_at")?)?,
        status: stmt.read::<String, _>("status")?.parse()?,
        created_at: parse_ts(&stmt.read::<String, _>("created_at")?)?,
        fired_at: stmt
            .read::<Option<String>, _>("fired_at")?
            .map(|s| parse_ts(&s))
            .transpose()?,
    })
}
