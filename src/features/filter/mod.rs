//! # Recipient Filter Feature
//!
//! Pure criteria matching over the loaded roster.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false

pub mod criteria;

pub use criteria::{resolve, FilterCriteria};
