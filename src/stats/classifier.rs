use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::db::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Productive,
    Communication,
    Other,
}

impl ActivityCategory {
    /// Contribution of one second in this category to the focus score.
    pub fn weight(self) -> f64 {
        match self {
            ActivityCategory::Productive => 1.0,
            ActivityCategory::Communication => 0.5,
            ActivityCategory::Other => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActivityCategory::Productive => "productive",
            ActivityCategory::Communication => "communication",
            ActivityCategory::Other => "other",
        }
    }

    /// Parse a category written on a snapshot. Unrecognised labels give `None`
    /// so the app-name lookup still applies.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "productive" | "core" | "work" | "development" | "writing" | "design" => {
                Some(ActivityCategory::Productive)
            }
            "communication" | "chat" | "email" | "meeting" | "meetings" => {
                Some(ActivityCategory::Communication)
            }
            "other" | "entertainment" | "social" | "browsing" | "idle" => {
                Some(ActivityCategory::Other)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn static_table() -> &'static HashMap<&'static str, ActivityCategory> {
    static TABLE: OnceLock<HashMap<&'static str, ActivityCategory>> = OnceLock::new();
    TABLE.get_or_init(|| {
        use ActivityCategory::{Communication, Productive};

        let productive = [
            "code",
            "visual studio code",
            "cursor",
            "zed",
            "xcode",
            "android studio",
            "intellij idea",
            "pycharm",
            "webstorm",
            "rustrover",
            "sublime text",
            "vim",
            "neovim",
            "emacs",
            "terminal",
            "iterm2",
            "warp",
            "alacritty",
            "kitty",
            "ghostty",
            "notion",
            "obsidian",
            "figma",
            "linear",
            "jira",
            "microsoft word",
            "microsoft excel",
            "microsoft powerpoint",
            "pages",
            "numbers",
            "keynote",
            "libreoffice",
            "preview",
            "postman",
            "docker desktop",
        ];
        let communication = [
            "slack",
            "microsoft teams",
            "teams",
            "discord",
            "zoom",
            "zoom.us",
            "mail",
            "microsoft outlook",
            "outlook",
            "thunderbird",
            "messages",
            "telegram",
            "whatsapp",
            "signal",
            "facetime",
            "webex",
        ];

        productive
            .into_iter()
            .map(|name| (name, Productive))
            .chain(communication.into_iter().map(|name| (name, Communication)))
            .collect()
    })
}

/// App-name classification.
///
/// Lookup order: the snapshot's own category, then runtime overrides, then
/// the built-in table, then [`ActivityCategory::Other`].
#[derive(Default)]
pub struct AppClassifier {
    overrides: RwLock<HashMap<String, ActivityCategory>>,
}

impl AppClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_override(&self, app_name: &str, category: ActivityCategory) {
        let mut overrides = self
            .overrides
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        overrides.insert(normalize(app_name), category);
    }

    pub fn clear_override(&self, app_name: &str) {
        let mut overrides = self
            .overrides
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        overrides.remove(&normalize(app_name));
    }

    pub fn classify_app(&self, app_name: &str) -> ActivityCategory {
        let key = normalize(app_name);
        {
            let overrides = self
                .overrides
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(category) = overrides.get(&key) {
                return *category;
            }
        }

        static_table()
            .get(key.as_str())
            .copied()
            .unwrap_or(ActivityCategory::Other)
    }

    pub fn classify(&self, snapshot: &Snapshot) -> ActivityCategory {
        snapshot
            .category
            .as_deref()
            .and_then(ActivityCategory::parse)
            .unwrap_or_else(|| self.classify_app(&snapshot.app_name))
    }
}

fn normalize(app_name: &str) -> String {
    app_name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_apps_use_the_static_table() {
        let classifier = AppClassifier::new();
        assert_eq!(classifier.classify_app("Xcode"), ActivityCategory::Productive);
        assert_eq!(classifier.classify_app(" Slack "), ActivityCategory::Communication);
        assert_eq!(classifier.classify_app("Steam"), ActivityCategory::Other);
    }

    #[test]
    fn overrides_win_over_the_table() {
        let classifier = AppClassifier::new();
        classifier.set_override("Slack", ActivityCategory::Other);
        assert_eq!(classifier.classify_app("slack"), ActivityCategory::Other);
        classifier.clear_override("SLACK");
        assert_eq!(classifier.classify_app("slack"), ActivityCategory::Communication);
    }

    #[test]
    fn unknown_explicit_category_falls_back_to_app_name() {
        assert_eq!(ActivityCategory::parse("Core"), Some(ActivityCategory::Productive));
        assert_eq!(ActivityCategory::parse("something-new"), None);
    }

    #[test]
    fn weights() {
        assert_eq!(ActivityCategory::Productive.weight(), 1.0);
        assert_eq!(ActivityCategory::Communication.weight(), 0.5);
        assert_eq!(ActivityCategory::Other.weight(), 0.0);
    }
}
