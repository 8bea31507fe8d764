//! # Roster Loading
//!
//! The roster is an external collaborator: the engine only requires a list of
//! recipients. The bundled implementation reads a JSON file and normalizes
//! phone handles; alternative backings (a registrar export, an HTTP
//! directory) plug in behind [`RosterSource`].
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 1.1.0: Country-code aware address normalization
//! - 1.0.0: Initial release with JSON-backed roster

use crate::core::EngineError;
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A student as loaded from the roster. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,

    /// Normalized phone handle. Empty when the roster entry had no usable
    /// number; the dispatcher records such entries as failures instead of
    /// aborting the batch.
    #[serde(alias = "phone")]
    pub address: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub course: String,

    #[serde(default)]
    pub year: u32,

    /// Academic score (CGPA in the source data).
    #[serde(alias = "cgpa", default)]
    pub score: f64,

    #[serde(default)]
    pub skills: Vec<String>,
}

/// Loads recipients from some backing source.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Fails with [`EngineError::RosterUnavailable`] when the source is
    /// missing or corrupt.
    async fn load_roster(&self) -> Result<Vec<Recipient>, EngineError>;
}

/// JSON-file roster: an array of recipient objects.
pub struct JsonRoster {
    path: PathBuf,
    country_code: String,
}

impl JsonRoster {
    pub fn new(path: impl Into<PathBuf>, country_code: impl Into<String>) -> Self {
        JsonRoster {
            path: path.into(),
            country_code: country_code.into(),
        }
    }
}

#[async_trait]
impl RosterSource for JsonRoster {
    async fn load_roster(&self) -> Result<Vec<Recipient>, EngineError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::RosterUnavailable(format!("{}: {e}", self.path.display()))
        })?;

        let mut recipients: Vec<Recipient> = serde_json::from_str(&contents).map_err(|e| {
            EngineError::RosterUnavailable(format!("{}: {e}", self.path.display()))
        })?;

        for recipient in &mut recipients {
            match normalize_address(&recipient.address, &self.country_code) {
                Some(address) => recipient.address = address,
                None => {
                    warn!("No usable phone number for {}", recipient.name);
                    recipient.address.clear();
                }
            }
        }

        info!(
            "Loaded {} students from {}",
            recipients.len(),
            self.path.display()
        );
        Ok(recipients)
    }
}

/// Load recipients from the criteria's roster override when one is set,
/// falling back to the default source. Used both at campaign dispatch and
/// when a reminder re-resolves its recipients.
pub async fn load_with_override(
    default: &dyn RosterSource,
    custom_file: Option<&Path>,
    country_code: &str,
) -> Result<Vec<Recipient>, EngineError> {
    match custom_file {
        Some(path) => JsonRoster::new(path, country_code).load_roster().await,
        None => default.load_roster().await,
    }
}

/// Check that a roster override path is readable before a campaign starts.
pub fn check_readable(path: &Path) -> Result<(), EngineError> {
    if std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false) {
        Ok(())
    } else {
        Err(EngineError::InvalidCriteria(format!(
            "roster file not readable: {}",
            path.display()
        )))
    }
}

fn non_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9]").expect("static pattern"))
}

/// Normalize a raw phone entry to a `+`-prefixed handle.
///
/// Ten-digit bare numbers get the default country prefix; anything already
/// carrying a country code keeps it. Entries with no digits yield `None`.
pub fn normalize_address(raw: &str, country_code: &str) -> Option<String> {
    let digits = non_digits_re().replace_all(raw, "");
    if digits.is_empty() {
        return None;
    }

    let normalized = if raw.trim_start().starts_with('+') {
        format!("+{digits}")
    } else if digits.len() == 10 {
        format!("{country_code}{digits}")
    } else {
        format!("+{digits}")
    };
    debug!("Normalized address {raw} -> {normalized}");
    Some(normalized)
}
