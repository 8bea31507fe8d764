//! # Engine Configuration
//!
//! Environment-backed configuration with sensible defaults for every knob.
//! Loaded once at startup via [`Config::from_env`]; `.env` files are honored
//! through `dotenvy` in the binary entrypoint.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 1.2.0: Gateway transport settings (URL, token, request timeout)
//! - 1.1.0: Reminder time-of-day and default offsets
//! - 1.0.0: Initial release

use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::time::Duration;

/// Seconds between two outbound sends unless overridden.
const DEFAULT_MESSAGE_DELAY_SECS: u64 = 3;
/// Attempt budget per recipient, including the first try.
const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 60_000;
const DEFAULT_REMINDER_TICK_SECS: u64 = 60;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding campaigns, dispatch jobs and reminder jobs.
    pub database_path: String,

    /// JSON roster of students.
    pub roster_path: String,

    /// Optional YAML file overriding the built-in message templates.
    pub templates_path: String,

    /// Message gateway endpoint the transport posts to.
    pub gateway_url: String,

    /// Optional bearer token for the gateway.
    pub gateway_token: Option<String>,

    /// Per-request timeout for gateway calls.
    pub send_timeout: Duration,

    /// Minimum pause between two consecutive sends (anti-throttling).
    pub message_delay: Duration,

    /// Attempt budget per recipient, including the first try.
    pub max_send_attempts: u32,

    /// First retry backoff; doubles per attempt.
    pub retry_base_delay: Duration,

    /// Upper bound on any single retry backoff.
    pub retry_max_delay: Duration,

    /// Period of the reminder scheduler tick.
    pub reminder_tick: Duration,

    /// Time of day at which reminders fire (UTC).
    pub reminder_time_of_day: NaiveTime,

    /// Day offsets used when a reminder request does not name its own.
    pub default_reminder_offsets: Vec<u32>,

    /// Country prefix applied to bare local phone numbers.
    pub default_country_code: String,

    /// Default log filter when RUST_LOG is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except malformed values, which are errors.
    pub fn from_env() -> Result<Self> {
        let database_path = env_or("DATABASE_PATH", "data/herald.db");
        let roster_path = env_or("ROSTER_PATH", "data/students.json");
        let templates_path = env_or("TEMPLATES_PATH", "data/templates.yaml");
        let gateway_url = env_or("GATEWAY_URL", "http://127.0.0.1:8787/v1/messages");
        let gateway_token = std::env::var("GATEWAY_TOKEN").ok().filter(|t| !t.is_empty());

        let message_delay =
            Duration::from_secs(env_parsed("MESSAGE_DELAY_SECS", DEFAULT_MESSAGE_DELAY_SECS)?);
        let max_send_attempts = env_parsed("MAX_SEND_ATTEMPTS", DEFAULT_MAX_SEND_ATTEMPTS)?;
        let retry_base_delay =
            Duration::from_millis(env_parsed("RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS)?);
        let retry_max_delay =
            Duration::from_millis(env_parsed("RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS)?);
        let reminder_tick =
            Duration::from_secs(env_parsed("REMINDER_TICK_SECS", DEFAULT_REMINDER_TICK_SECS)?);
        let send_timeout =
            Duration::from_secs(env_parsed("SEND_TIMEOUT_SECS", DEFAULT_SEND_TIMEOUT_SECS)?);

        let reminder_time_of_day = parse_time_of_day(&env_or("REMINDER_TIME", "09:00"))?;
        let default_reminder_offsets = parse_offsets(&env_or("REMINDER_DAYS_BEFORE", "7,3,1"))?;

        Ok(Config {
            database_path,
            roster_path,
            templates_path,
            gateway_url,
            gateway_token,
            send_timeout,
            message_delay,
            max_send_attempts,
            retry_base_delay,
            retry_max_delay,
            reminder_tick,
            reminder_time_of_day,
            default_reminder_offsets,
            default_country_code: env_or("DEFAULT_COUNTRY_CODE", "+91"),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

/// Parse "HH:MM" (24-hour) into a NaiveTime.
fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("Invalid reminder time (expected HH:MM): {raw}"))
}

/// Parse a comma-separated list of day offsets, e.g. "7,3,1".
fn parse_offsets(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid reminder offset: {part}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_of_day() {
        let t = parse_time_of_day("09:00").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("morning").is_err());
    }

    #[test]
    fn test_parse_offsets() {
        assert_eq!(parse_offsets("7,3,1").unwrap(), vec![7, 3, 1]);
        assert_eq!(parse_offsets(" 14 , 2 ").unwrap(), vec![14, 2]);
        assert!(parse_offsets("7,soon").is_err());
    }
}
