use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

const OLLAMA_URL_ENV: &str = "GLIMPSE_OLLAMA_URL";

/// `GLIMPSE_DEBUG=1|true` turns on debug logging and verbose capture timings.
pub fn debug_mode() -> bool {
    std::env::var("GLIMPSE_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Change detection and capture-loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Normalized fingerprint distance at or below which a frame is discarded.
    pub similarity_threshold: f64,
    /// Distance above which a frame is treated as a context switch and always extracted.
    pub major_change_threshold: f64,
    pub extraction_interval_secs: u64,
    /// Minimum spacing between evaluated frames of one display.
    pub frame_interval_ms: u64,
    pub capture_timeout_secs: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.1,
            major_change_threshold: 0.5,
            extraction_interval_secs: 10,
            frame_interval_ms: 1_000,
            capture_timeout_secs: 10,
        }
    }
}

impl CaptureSettings {
    pub fn extraction_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.extraction_interval_secs as i64)
    }

    pub fn frame_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.frame_interval_ms as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacySettings {
    pub enabled: bool,
    /// Pixels added on every side of a matched text box before blacking it out.
    pub margin_px: u32,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            margin_px: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `local-hash` selects the in-process embedder; anything else is an Ollama model name.
    pub model: String,
    pub endpoint: String,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "local-hash".into(),
            endpoint: "http://localhost:11434".into(),
            dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Number of most recent embedding records scanned per search.
    pub scan_window: usize,
    pub embed_timeout_ms: u64,
    pub generate_timeout_secs: u64,
    pub generation_model: String,
    /// Semantic match text is clipped to this many characters in the prompt.
    pub max_match_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            scan_window: 1_000,
            embed_timeout_ms: 5_000,
            generate_timeout_secs: 60,
            generation_model: "llama3.2".into(),
            max_match_chars: 600,
        }
    }
}

impl RetrievalSettings {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Gaps longer than this are treated as idle time and capped.
    pub max_gap_secs: i64,
    /// Duration credited to the last snapshot of a range.
    pub tail_secs: i64,
    pub top_apps: usize,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            max_gap_secs: 60,
            tail_secs: 5,
            top_apps: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub retention_days: u32,
    /// Also delete snapshot rows (and their embeddings) past the window,
    /// not only their image files.
    pub delete_rows: bool,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            delete_rows: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub capture: CaptureSettings,
    pub privacy: PrivacySettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub stats: StatsSettings,
    pub retention: RetentionSettings,
}

impl Settings {
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
            if !url.trim().is_empty() {
                self.embedding.endpoint = url.trim().to_string();
            }
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!(
                        "Settings at {} are invalid ({err}); falling back to defaults",
                        path.display()
                    );
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };
        data.apply_env_overrides();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> Settings {
        self.read().clone()
    }

    pub fn update<F>(&self, mutate: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.write();
        mutate(&mut guard);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let mut data: Settings = serde_json::from_str(&contents)?;
        data.apply_env_overrides();
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "capture": { "similarity_threshold": 0.2 } }"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.current();
        assert!((settings.capture.similarity_threshold - 0.2).abs() < f64::EPSILON);
        assert!((settings.capture.major_change_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.retrieval.top_k, 10);
        assert_eq!(settings.stats.max_gap_secs, 60);
    }

    #[test]
    fn update_persists_and_reload_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        store.update(|s| s.retrieval.top_k = 3).unwrap();
        assert!(path.exists());

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.current().retrieval.top_k, 3);
        reopened.reload().unwrap();
        assert_eq!(reopened.current().retrieval.top_k, 3);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.current().retention.retention_days, 30);
    }
}
