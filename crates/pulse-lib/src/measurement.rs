//! Post-session glue: analysis, record building and delivery.

use crate::{
    error::{HrvError, RemoteError},
    io::history::HistoryStore,
    metrics::hrv::{hrv_time, HrvResult},
    record::{MeasurementRecord, BASIC_ANALYSIS},
    remote::{RemoteAnalyzer, Transport},
    session::SessionReport,
    signal::PeakRecord,
    sink::MeasurementSink,
};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::{info, warn};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Offer `record` to every sink. Failures are logged and skipped; returns
/// how many sinks accepted it.
pub fn deliver(record: &MeasurementRecord, sinks: &mut [&mut dyn MeasurementSink]) -> usize {
    let mut accepted = 0;
    for sink in sinks.iter_mut() {
        match sink.submit(record) {
            Ok(()) => accepted += 1,
            Err(err) => warn!(
                "failed to deliver measurement {} to {}: {err:#}",
                record.id,
                sink.name()
            ),
        }
    }
    accepted
}

/// Local HRV analysis of a finished session. The result is returned even
/// when no sink accepted the record.
pub fn analyze_session(
    report: &SessionReport,
    timestamp: u64,
    sinks: &mut [&mut dyn MeasurementSink],
) -> Result<HrvResult, HrvError> {
    let result = hrv_time(&report.intervals(), timestamp)?;
    let record = MeasurementRecord::from_hrv(&result, BASIC_ANALYSIS);
    let accepted = deliver(&record, sinks);
    info!(
        "basic analysis: HR {:.0} bpm, PPI {:.0} ms, SDNN {:.0} ms, RMSSD {:.0} ms ({accepted}/{} sinks)",
        result.mean_hr,
        result.mean_ppi,
        result.sdnn,
        result.rmssd,
        sinks.len()
    );
    Ok(result)
}

/// Send a session's intervals for remote analysis and store the reply in
/// `history`. A history write failure is logged, not returned.
pub fn request_remote_analysis<T: Transport>(
    report: &SessionReport,
    id: u64,
    analyzer: &mut RemoteAnalyzer<T>,
    history: &HistoryStore,
) -> Result<MeasurementRecord, RemoteError> {
    let request = analyzer.request_for(id, &report.intervals());
    let record = analyzer.analyze(&request)?;
    match history.append(&record) {
        Ok(()) => info!("remote results saved to {}", history.path().display()),
        Err(err) => warn!("failed to save remote results: {err:#}"),
    }
    Ok(record)
}

/// Export a peak log as CSV with a header row.
pub fn write_peak_log(path: &Path, peaks: &[PeakRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating peak log {}", path.display()))?;
    for peak in peaks {
        writer.serialize(peak)?;
    }
    writer
        .flush()
        .with_context(|| format!("writing peak log {}", path.display()))?;
    Ok(())
}

pub fn read_peak_log(path: &Path) -> Result<Vec<PeakRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening peak log {}", path.display()))?;
    let mut peaks = Vec::new();
    for (idx, row) in reader.deserialize::<PeakRecord>().enumerate() {
        peaks.push(row.with_context(|| format!("parsing peak row {}", idx + 1))?);
    }
    Ok(peaks)
}
