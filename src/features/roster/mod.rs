//! # Roster Feature
//!
//! Student roster loading and phone address normalization.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false

pub mod loader;

pub use loader::{normalize_address, JsonRoster, Recipient, RosterSource};
