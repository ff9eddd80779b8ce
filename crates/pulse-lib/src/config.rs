use crate::{
    acquisition::DEFAULT_QUEUE_CAPACITY,
    detectors::ppg::PpgDetectorConfig,
    io::history::{HistoryStore, DEFAULT_MAX_ENTRIES},
    remote::RemoteConfig,
    session::{SessionMode, SessionSettings, DEFAULT_DEADLINE_MS},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration. Every field has a default, so an empty file
/// (or none at all) is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub detector: PpgDetectorConfig,
    pub session: SessionConfig,
    pub history: HistoryConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub deadline_ms: u64,
    pub frame_period_ms: u64,
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
            frame_period_ms: 40,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: PathBuf,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pulse-history.jsonl"),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl PulseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn session_settings(&self, mode: SessionMode) -> SessionSettings {
        SessionSettings {
            mode,
            detector: self.detector,
            deadline_ms: self.session.deadline_ms,
        }
    }

    pub fn history_store(&self) -> HistoryStore {
        HistoryStore::new(&self.history.path, self.history.max_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: PulseConfig = toml::from_str("").unwrap();
        assert_eq!(config, PulseConfig::default());
        assert_eq!(config.detector.peak_threshold, 0.7);
        assert_eq!(config.session.deadline_ms, 30_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        fs::write(
            &path,
            "[detector]\nsample_rate_hz = 500.0\nqualifying_run = 100\n\n\
             [history]\nmax_entries = 10\n\n[remote]\nanalysis_type = \"stress\"\n",
        )
        .unwrap();
        let config = PulseConfig::load(&path).unwrap();
        assert_eq!(config.detector.sample_rate_hz, 500.0);
        assert_eq!(config.detector.qualifying_run, 100);
        assert_eq!(config.detector.max_interval_ms, 1700);
        assert_eq!(config.history.max_entries, 10);
        assert_eq!(config.remote.analysis_type, "stress");
        assert_eq!(config.remote.timeout_ms, 10_000);
        let settings = config.session_settings(SessionMode::Remote);
        assert_eq!(settings.detector.sample_rate_hz, 500.0);
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[detector\n").unwrap();
        let err = PulseConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
