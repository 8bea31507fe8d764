//! # Rate-Limited Dispatcher
//!
//! Walks a recipient list in filter order, one send at a time through the
//! shared transport gate. Recipients already delivered to in a previous run
//! are skipped, so re-running a campaign after a crash resumes from the
//! store's checkpoint instead of the top of the list. Retryable transport
//! failures back off exponentially up to the attempt budget; a recipient
//! ending in `Exhausted` never aborts the rest of the batch.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.2.0: Cooperative stop between recipients
//! - 1.1.0: Jittered exponential backoff
//! - 1.0.0: Initial release

use crate::database::Database;
use crate::features::dispatch::job::{
    DispatchJob, DispatchStatus, DispatchSummary, FailedRecipient,
};
use crate::features::roster::Recipient;
use crate::transport::{SendError, SharedGate};
use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;

/// Retry budget and backoff shape for retryable transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per recipient, including the first try.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, doubling per failed attempt and
    /// bounded by `max_delay`, with up to 25% jitter on top.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let capped = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let jitter_ms = capped.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }
}

#[derive(Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cooperative stop signal. A dispatch batch checks it between recipients;
/// the scheduler loop selects on it. Never preempts an in-flight send.
#[derive(Clone, Default)]
pub struct StopFlag {
    inner: Arc<StopInner>,
}

impl StopFlag {
    pub fn request_stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

pub struct Dispatcher {
    database: Database,
    gate: SharedGate,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(database: Database, gate: SharedGate, retry: RetryPolicy) -> Self {
        Dispatcher {
            database,
            gate,
            retry,
        }
    }

    /// Deliver `render(recipient)` to each recipient in order, checkpointing
    /// every outcome. Only store failures abort; transport failures are
    /// isolated per recipient.
    pub async fn dispatch<F>(
        &self,
        campaign_id: &str,
        recipients: &[Recipient],
        render: F,
        stop: &StopFlag,
    ) -> Result<DispatchSummary>
    where
        F: Fn(&Recipient) -> String,
    {
        let mut summary = DispatchSummary::default();
        info!(
            "Dispatching campaign {campaign_id} to {} recipient(s)",
            recipients.len()
        );

        for (index, recipient) in recipients.iter().enumerate() {
            if stop.is_stopped() {
                info!(
                    "Dispatch of {campaign_id} stopped after {index} of {} recipient(s)",
                    recipients.len()
                );
                summary.stopped = true;
                break;
            }

            if recipient.address.is_empty() {
                warn!("No phone number for {}, skipping", recipient.name);
                let mut job = DispatchJob::new(campaign_id, "", &recipient.name, "");
                job.status = DispatchStatus::Exhausted;
                job.last_error = Some("no phone number on file".to_string());
                // keyless records would collide; store under the name instead
                job.address = format!("missing:{}", recipient.name);
                self.database.upsert_dispatch_job(&job).await?;
                summary.exhausted += 1;
                summary.failures.push(FailedRecipient {
                    name: recipient.name.clone(),
                    address: String::new(),
                    reason: "no phone number on file".to_string(),
                });
                continue;
            }

            let existing = self
                .database
                .get_dispatch_job(campaign_id, &recipient.address)
                .await?;
            if let Some(job) = &existing {
                if job.status == DispatchStatus::Sent {
                    debug!("Already sent to {} for {campaign_id}, skipping", recipient.address);
                    summary.skipped += 1;
                    continue;
                }
            }

            debug!(
                "Sending {}/{} to {} ({})",
                index + 1,
                recipients.len(),
                recipient.name,
                recipient.address
            );
            let body = render(recipient);
            let job = self
                .send_with_retries(campaign_id, recipient, &body, existing)
                .await?;

            match job.status {
                DispatchStatus::Sent => {
                    info!("Message sent to {}", recipient.name);
                    summary.sent += 1;
                }
                _ => {
                    summary.exhausted += 1;
                    summary.failures.push(FailedRecipient {
                        name: recipient.name.clone(),
                        address: recipient.address.clone(),
                        reason: job
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "unknown failure".to_string()),
                    });
                }
            }
        }

        info!(
            "Dispatch of {campaign_id} finished: {} sent, {} skipped, {} exhausted",
            summary.sent, summary.skipped, summary.exhausted
        );
        Ok(summary)
    }

    /// One recipient's attempt cycle. The job row is written after every
    /// attempt, before any backoff sleep, so a crash loses at most the send
    /// currently in flight. A resumed run continues the recorded attempt
    /// budget rather than restarting it.
    async fn send_with_retries(
        &self,
        campaign_id: &str,
        recipient: &Recipient,
        body: &str,
        existing: Option<DispatchJob>,
    ) -> Result<DispatchJob> {
        let mut job = existing.unwrap_or_else(|| {
            DispatchJob::new(campaign_id, &recipient.address, &recipient.name, body)
        });
        job.body = body.to_string();
        if job.status == DispatchStatus::Exhausted {
            // explicit re-dispatch reopens the attempt budget
            job.attempts = 0;
            job.status = DispatchStatus::Pending;
            job.last_error = None;
        }

        loop {
            job.attempts += 1;
            job.last_attempt = Some(Utc::now());

            let result = {
                let mut gate = self.gate.lock().await;
                gate.send(&recipient.address, body).await
            };

            match result {
                Ok(()) => {
                    job.status = DispatchStatus::Sent;
                    job.last_error = None;
                    self.database.upsert_dispatch_job(&job).await?;
                    return Ok(job);
                }
                Err(SendError::Terminal(reason)) => {
                    warn!(
                        "Permanent failure for {} ({}): {reason}",
                        recipient.name, recipient.address
                    );
                    job.status = DispatchStatus::Exhausted;
                    job.last_error = Some(reason);
                    self.database.upsert_dispatch_job(&job).await?;
                    return Ok(job);
                }
                Err(SendError::Retryable(reason)) => {
                    if job.attempts >= self.retry.max_attempts {
                        warn!(
                            "Retries exhausted for {} after {} attempt(s): {reason}",
                            recipient.address, job.attempts
                        );
                        job.status = DispatchStatus::Exhausted;
                        job.last_error = Some(reason);
                        self.database.upsert_dispatch_job(&job).await?;
                        return Ok(job);
                    }

                    job.status = DispatchStatus::Failed;
                    job.last_error = Some(reason.clone());
                    self.database.upsert_dispatch_job(&job).await?;

                    let delay = self.retry.backoff(job.attempts);
                    debug!(
                        "Transient failure for {} (attempt {}): {reason}. Retrying in {delay:?}",
                        recipient.address, job.attempts
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{gate_over, ScriptedTransport};

    fn recipient(name: &str, address: &str) -> Recipient {
        Recipient {
            name: name.to_string(),
            address: address.to_string(),
            email: String::new(),
            course: "CS".to_string(),
            year: 4,
            score: 8.0,
            skills: vec![],
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    async fn dispatcher(
        transport: std::sync::Arc<ScriptedTransport>,
        max_attempts: u32,
    ) -> Dispatcher {
        let database = Database::new(":memory:").await.unwrap();
        Dispatcher::new(database, gate_over(transport), fast_retry(max_attempts))
    }

    #[tokio::test]
    async fn test_all_sent_happy_path() {
        let transport = ScriptedTransport::always_ok();
        let dispatcher = dispatcher(transport.clone(), 3).await;
        let recipients = vec![recipient("A", "+911"), recipient("B", "+912")];

        let summary = dispatcher
            .dispatch("camp", &recipients, |r| format!("hi {}", r.name), &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.exhausted, 0);
        assert_eq!(transport.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_rerun_with_everyone_sent_makes_no_transport_calls() {
        let transport = ScriptedTransport::always_ok();
        let dispatcher = dispatcher(transport.clone(), 3).await;
        let recipients = vec![recipient("A", "+911"), recipient("B", "+912")];

        dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();
        assert_eq!(transport.total_calls(), 2);

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(transport.total_calls(), 2, "idempotent re-run must not resend");
    }

    #[tokio::test]
    async fn test_always_retryable_exhausts_after_max_attempts() {
        let transport =
            ScriptedTransport::new(|_, _| Err(SendError::Retryable("busy".to_string())));
        let dispatcher = dispatcher(transport.clone(), 3).await;
        let recipients = vec![recipient("A", "+911")];

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.sent, 0);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(transport.calls_for("+911"), 3, "exactly max_attempts attempts");
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let transport =
            ScriptedTransport::new(|_, _| Err(SendError::Terminal("no such user".to_string())));
        let dispatcher = dispatcher(transport.clone(), 5).await;
        let recipients = vec![recipient("A", "+911")];

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.exhausted, 1);
        assert_eq!(transport.calls_for("+911"), 1);
        assert_eq!(summary.failures[0].reason, "no such user");
    }

    #[tokio::test]
    async fn test_one_bad_recipient_never_aborts_the_batch() {
        let transport = ScriptedTransport::new(|address, _| {
            if address == "+913" {
                Err(SendError::Terminal("address not resolvable".to_string()))
            } else {
                Ok(())
            }
        });
        let dispatcher = dispatcher(transport.clone(), 3).await;
        let recipients: Vec<Recipient> = (1..=10)
            .map(|i| recipient(&format!("S{i}"), &format!("+91{i}")))
            .collect();

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.sent, 9);
        assert_eq!(summary.exhausted, 1);
        // recipients after the failing one still got their attempt
        for i in 4..=10 {
            assert_eq!(transport.calls_for(&format!("+91{i}")), 1);
        }
    }

    #[tokio::test]
    async fn test_transient_then_success_recovers() {
        let transport = ScriptedTransport::new(|_, attempt| {
            if attempt < 3 {
                Err(SendError::Retryable("timeout".to_string()))
            } else {
                Ok(())
            }
        });
        let dispatcher = dispatcher(transport.clone(), 5).await;
        let recipients = vec![recipient("A", "+911")];

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(transport.calls_for("+911"), 3);
    }

    #[tokio::test]
    async fn test_missing_address_recorded_without_aborting() {
        let transport = ScriptedTransport::always_ok();
        let dispatcher = dispatcher(transport.clone(), 3).await;
        let recipients = vec![recipient("Ghost", ""), recipient("B", "+912")];

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &StopFlag::default())
            .await
            .unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.failures[0].name, "Ghost");
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_flag_halts_between_recipients() {
        let stop = StopFlag::default();
        stop.request_stop();

        let transport = ScriptedTransport::always_ok();
        let dispatcher = dispatcher(transport.clone(), 3).await;
        let recipients = vec![recipient("A", "+911"), recipient("B", "+912")];

        let summary = dispatcher
            .dispatch("camp", &recipients, |_| "hi".to_string(), &stop)
            .await
            .unwrap();

        assert!(summary.stopped);
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert!(policy.backoff(1) >= Duration::from_millis(100));
        assert!(policy.backoff(1) < Duration::from_millis(130));
        assert!(policy.backoff(2) >= Duration::from_millis(200));
        // capped regardless of attempt count
        assert!(policy.backoff(10) < Duration::from_millis(350 + 90));
    }
}
