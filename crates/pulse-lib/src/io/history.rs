use crate::record::MeasurementRecord;
use crate::sink::MeasurementSink;
use anyhow::{Context, Result};
use log::warn;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Append-only JSON-lines measurement history.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line, creating the file if needed.
    pub fn append(&self, record: &MeasurementRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating history dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening history {}", self.path.display()))?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .with_context(|| format!("appending to history {}", self.path.display()))?;
        Ok(())
    }

    /// Stored records, newest first, at most `max_entries`. A missing file is
    /// an empty history; malformed lines are skipped.
    pub fn load(&self) -> Result<Vec<MeasurementRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("opening history {}", self.path.display()))
            }
        };
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading history {}", self.path.display()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<MeasurementRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    "skipping malformed history line {} in {}: {}",
                    idx + 1,
                    self.path.display(),
                    err
                ),
            }
        }
        records.sort_by(|a, b| b.time.cmp(&a.time));
        records.truncate(self.max_entries);
        Ok(records)
    }
}

impl MeasurementSink for HistoryStore {
    fn name(&self) -> &str {
        "history"
    }

    fn submit(&mut self, record: &MeasurementRecord) -> Result<()> {
        self.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::hrv::HrvResult;
    use crate::record::BASIC_ANALYSIS;
    use tempfile::tempdir;

    fn record_at(time: u64) -> MeasurementRecord {
        let result = HrvResult {
            timestamp: time,
            mean_hr: 70.0,
            mean_ppi: 857.1,
            rmssd: 30.0,
            sdnn: 40.0,
            reliable: true,
        };
        MeasurementRecord::from_hrv(&result, BASIC_ANALYSIS)
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.jsonl"), 50);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn loads_newest_first_and_skips_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/history.jsonl");
        let store = HistoryStore::new(&path, 50);
        store.append(&record_at(100)).unwrap();
        store.append(&record_at(300)).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json\n\n")
            .unwrap();
        store.append(&record_at(200)).unwrap();

        let times: Vec<u64> = store.load().unwrap().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![300, 200, 100]);
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 5);
    }

    #[test]
    fn keeps_only_newest_entries() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::new(dir.path().join("history.jsonl"), 3);
        for t in 1..=5 {
            store.submit(&record_at(t)).unwrap();
        }
        let times: Vec<u64> = store.load().unwrap().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![5, 4, 3]);
    }
}
