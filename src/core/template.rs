//! # Message Templates
//!
//! Named message bodies with `{placeholder}` substitution. Templates come
//! from a YAML file when one exists; otherwise the built-in defaults are
//! used. Rendering is plain text replacement, not a template language.
//! Placeholders without a matching variable are left intact so a typo in a
//! template file shows up in the outgoing message instead of vanishing.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.4.0

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Template used for the initial campaign announcement.
pub const PLACEMENT_ALERT: &str = "placement_alert";
/// Template used for deadline reminders.
pub const REMINDER: &str = "reminder";

const DEFAULT_PLACEMENT_ALERT: &str = "\
🎯 *Placement Opportunity Alert* 🎯

Dear {name},

We have an exciting placement opportunity that matches your profile:

*Company:* {company}
*Position:* {position}
*Package:* {package}
*Location:* {location}
*Last Date to Apply:* {last_date}

*Requirements:*
{requirements}

Please reply with \"INTERESTED\" if you want to apply for this position.

Best regards,
Placement Cell";

const DEFAULT_REMINDER: &str = "\
🔔 *Placement Reminder* 🔔

Dear {name},

This is a reminder about the placement opportunity:

*Company:* {company}
*Position:* {position}
*Application Deadline:* {last_date}

⏰ Only {days_remaining} days left to apply!

Don't miss this opportunity. Apply now!

Best regards,
Placement Cell";

/// A collection of named templates.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateSet {
    templates: HashMap<String, String>,
}

impl TemplateSet {
    /// The built-in templates shipped with the engine.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(PLACEMENT_ALERT.to_string(), DEFAULT_PLACEMENT_ALERT.to_string());
        templates.insert(REMINDER.to_string(), DEFAULT_REMINDER.to_string());
        TemplateSet { templates }
    }

    /// Load templates from a YAML file mapping name to body.
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let templates: HashMap<String, String> = serde_yaml::from_str(&contents)?;
        Ok(TemplateSet { templates })
    }

    /// Load from `path` when present, merging over the built-ins so a file
    /// that only overrides one template keeps the defaults for the rest.
    pub fn load_or_builtin(path: &str) -> Self {
        let mut set = Self::builtin();
        if std::path::Path::new(path).exists() {
            match Self::load(path) {
                Ok(loaded) => {
                    info!("Loaded {} message template(s) from {path}", loaded.templates.len());
                    set.templates.extend(loaded.templates);
                }
                Err(e) => warn!("Failed to load templates from {path}: {e}. Using built-ins."),
            }
        }
        set
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Render a template body against a variable map. Unknown placeholders
    /// survive untouched.
    pub fn render(body: &str, vars: &HashMap<String, String>) -> String {
        let mut rendered = body.to_string();
        for (key, value) in vars {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_variables() {
        let out = TemplateSet::render(
            "Dear {name}, apply to {company} by {last_date}.",
            &vars(&[("name", "Asha"), ("company", "TechCorp"), ("last_date", "2024-01-15")]),
        );
        assert_eq!(out, "Dear Asha, apply to TechCorp by 2024-01-15.");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = TemplateSet::render("Hello {name}, see {venue}.", &vars(&[("name", "Ravi")]));
        assert_eq!(out, "Hello Ravi, see {venue}.");
    }

    #[test]
    fn test_builtin_templates_present() {
        let set = TemplateSet::builtin();
        assert!(set.get(PLACEMENT_ALERT).unwrap().contains("{company}"));
        assert!(set.get(REMINDER).unwrap().contains("{days_remaining}"));
        assert!(set.get("interview_schedule").is_none());
    }
}
