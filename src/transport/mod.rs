//! # Transport Layer
//!
//! The messaging transport is an external capability: "send a body to an
//! address". The engine never talks to a transport directly; every send goes
//! through the [`TransportGate`], which serializes access to the single
//! shared session and enforces the anti-throttling pause between sends. The
//! gate's lock covers one send plus its pacing delay, so a manual dispatch
//! and the reminder loop can interleave at recipient granularity but never
//! mid-send.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.1.0: HTTP gateway implementation
//! - 1.0.0: Initial release with trait and pacing gate

pub mod gateway;

pub use gateway::HttpGatewayTransport;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// A transport send failure, classified for retry handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Transient (busy session, timeout); the dispatcher retries these.
    #[error("retryable transport failure: {0}")]
    Retryable(String),

    /// Permanent for this recipient (address not resolvable); never retried.
    #[error("permanent transport failure: {0}")]
    Terminal(String),
}

/// The external send capability. Implementations must tolerate repeated
/// sends of the same (address, body) pair.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, address: &str, body: &str) -> Result<(), SendError>;
}

/// Serializes transport access and paces consecutive sends.
///
/// The pause is anchored to the previous send's *completion*, and applies
/// across retries too: a retry of recipient N and the first attempt for
/// recipient N+1 are paced identically.
pub struct TransportGate {
    transport: Box<dyn Transport>,
    min_interval: Duration,
    next_slot: Option<Instant>,
}

/// Shared handle to the one gate guarding the one session.
pub type SharedGate = Arc<Mutex<TransportGate>>;

impl TransportGate {
    pub fn new(transport: Box<dyn Transport>, min_interval: Duration) -> Self {
        TransportGate {
            transport,
            min_interval,
            next_slot: None,
        }
    }

    pub fn shared(transport: Box<dyn Transport>, min_interval: Duration) -> SharedGate {
        Arc::new(Mutex::new(Self::new(transport, min_interval)))
    }

    /// Wait out the pacing window, then perform one send.
    pub async fn send(&mut self, address: &str, body: &str) -> Result<(), SendError> {
        if let Some(slot) = self.next_slot {
            let now = Instant::now();
            if slot > now {
                sleep(slot - now).await;
            }
        }
        let result = self.transport.send(address, body).await;
        self.next_slot = Some(Instant::now() + self.min_interval);
        result
    }
}
