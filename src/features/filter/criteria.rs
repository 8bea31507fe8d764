//! # Filter Criteria
//!
//! Criteria are a plain configuration struct; [`resolve`] is a pure function
//! from (roster, criteria) to an ordered recipient list. Supplied filters AND
//! together, absent filters impose no constraint, and roster order is
//! preserved so repeated resolutions are order-stable.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use crate::core::EngineError;
use crate::features::roster::loader::check_readable;
use crate::features::roster::Recipient;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placement eligibility criteria. Serialized as a snapshot on the campaign
/// record so reminders can re-resolve the live roster with the original
/// criteria at fire time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Inclusive lower bound on the academic score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,

    /// OR-matched course names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<String>>,

    /// OR-matched study years.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years: Option<Vec<u32>>,

    /// Every listed skill must be present on the recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,

    /// Roster source override for this campaign only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_file: Option<PathBuf>,
}

impl FilterCriteria {
    /// Reject criteria that can never be satisfied or reference an
    /// unreadable roster override. Runs before any send goes out.
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(min_score) = self.min_score {
            if min_score < 0.0 {
                return Err(EngineError::InvalidCriteria(format!(
                    "min_score must be non-negative, got {min_score}"
                )));
            }
        }
        if let Some(path) = &self.custom_file {
            check_readable(path)?;
        }
        Ok(())
    }

    fn matches(&self, recipient: &Recipient) -> bool {
        if let Some(min_score) = self.min_score {
            if recipient.score < min_score {
                return false;
            }
        }

        if let Some(courses) = &self.courses {
            if !courses.iter().any(|c| c.eq_ignore_ascii_case(&recipient.course)) {
                return false;
            }
        }

        if let Some(years) = &self.years {
            if !years.contains(&recipient.year) {
                return false;
            }
        }

        if let Some(skills) = &self.skills {
            let has = |wanted: &String| {
                recipient
                    .skills
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(wanted))
            };
            if !skills.iter().all(has) {
                return false;
            }
        }

        true
    }
}

/// Resolve the recipient set for `criteria` over `roster`, preserving roster
/// order. Deterministic for identical inputs; no side effects.
pub fn resolve(roster: &[Recipient], criteria: &FilterCriteria) -> Vec<Recipient> {
    let matched: Vec<Recipient> = roster
        .iter()
        .filter(|r| criteria.matches(r))
        .cloned()
        .collect();
    debug!("Filtered {} of {} students", matched.len(), roster.len());
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(name: &str, score: f64, course: &str, year: u32, skills: &[&str]) -> Recipient {
        Recipient {
            name: name.to_string(),
            address: format!("+91987654{}", name.len() * 1000),
            email: format!("{}@x.edu", name.to_lowercase()),
            course: course.to_string(),
            year,
            score,
            skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn roster() -> Vec<Recipient> {
        vec![
            student("A", 8.5, "CS", 4, &["Python", "Rust"]),
            student("B", 6.0, "CS", 4, &["Java"]),
            student("C", 9.1, "EC", 3, &["Python", "C++"]),
            student("D", 7.2, "IT", 4, &["Python", "Rust", "SQL"]),
        ]
    }

    #[test]
    fn test_min_score_filters_below_bound() {
        let criteria = FilterCriteria {
            min_score: Some(7.0),
            ..Default::default()
        };
        let picked = resolve(&roster(), &criteria);
        let names: Vec<&str> = picked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "D"]);
    }

    #[test]
    fn test_spec_scenario_only_a_passes() {
        let roster = vec![
            student("A", 8.5, "CS", 4, &[]),
            student("B", 6.0, "CS", 4, &[]),
        ];
        let criteria = FilterCriteria {
            min_score: Some(7.0),
            ..Default::default()
        };
        let picked = resolve(&roster, &criteria);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "A");
    }

    #[test]
    fn test_filters_and_together() {
        let criteria = FilterCriteria {
            min_score: Some(7.0),
            courses: Some(vec!["cs".to_string(), "IT".to_string()]),
            years: Some(vec![4]),
            ..Default::default()
        };
        let names: Vec<String> = resolve(&roster(), &criteria)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["A", "D"]);
    }

    #[test]
    fn test_skills_require_all() {
        let criteria = FilterCriteria {
            skills: Some(vec!["python".to_string(), "Rust".to_string()]),
            ..Default::default()
        };
        let names: Vec<String> = resolve(&roster(), &criteria)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["A", "D"]);
    }

    #[test]
    fn test_absent_filters_match_everyone_in_order() {
        let all = resolve(&roster(), &FilterCriteria::default());
        let names: Vec<String> = all.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let criteria = FilterCriteria {
            min_score: Some(7.0),
            ..Default::default()
        };
        let first = resolve(&roster(), &criteria);
        for _ in 0..5 {
            let again = resolve(&roster(), &criteria);
            let a: Vec<&str> = first.iter().map(|r| r.name.as_str()).collect();
            let b: Vec<&str> = again.iter().map(|r| r.name.as_str()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_negative_min_score_is_invalid() {
        let criteria = FilterCriteria {
            min_score: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            criteria.validate(),
            Err(EngineError::InvalidCriteria(_))
        ));
    }

    #[test]
    fn test_unreadable_custom_file_is_invalid() {
        let criteria = FilterCriteria {
            custom_file: Some(PathBuf::from("/nonexistent/roster.json")),
            ..Default::default()
        };
        assert!(matches!(
            criteria.validate(),
            Err(EngineError::InvalidCriteria(_))
        ));
    }
}
