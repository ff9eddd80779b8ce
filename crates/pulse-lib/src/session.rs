//! Session lifecycle: the detection thread, the live state it publishes and
//! the stop protocol shared with the presentation side.

use crate::{
    acquisition::{check_rate, SampleQueue, SampleSource},
    detectors::ppg::{DetectorPhase, PeakDetector, PpgDetectorConfig},
    error::SessionError,
    signal::{PeakRecord, PpiSeries, Sample},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Recording time of a timed session (ms).
pub const DEFAULT_DEADLINE_MS: u64 = 30_000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Untimed, BPM display only.
    Live,
    /// Timed, analyzed locally.
    Basic,
    /// Timed, analyzed by the remote service.
    Remote,
}

impl SessionMode {
    pub fn is_timed(self) -> bool {
        !matches!(self, SessionMode::Live)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Live => "live",
            SessionMode::Basic => "basic",
            SessionMode::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Deadline,
    Requested,
    /// A replayed recording ran out of samples.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientReason {
    /// Stopped before the deadline.
    Aborted,
    /// Reached the deadline without a single accepted peak.
    NoPeaks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub mode: SessionMode,
    pub detector: PpgDetectorConfig,
    pub deadline_ms: u64,
}

impl SessionSettings {
    pub fn new(mode: SessionMode, detector: PpgDetectorConfig) -> Self {
        Self {
            mode,
            detector,
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }
}

/// Finalized, read-only view of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub mode: SessionMode,
    pub stop_reason: StopReason,
    pub peaks: Vec<PeakRecord>,
    pub bpm: Option<u32>,
    pub sample_count: u64,
    pub artifact_count: u32,
    pub rejected_count: u32,
    pub duration_ms: u64,
    pub dropped_samples: u64,
}

impl SessionReport {
    fn from_detector(
        mode: SessionMode,
        stop_reason: StopReason,
        detector: PeakDetector,
        dropped_samples: u64,
    ) -> Self {
        Self {
            mode,
            stop_reason,
            bpm: detector.bpm(),
            sample_count: detector.sample_count(),
            artifact_count: detector.artifact_count(),
            rejected_count: detector.rejected_count(),
            duration_ms: detector.elapsed_ms(),
            dropped_samples,
            peaks: detector.into_peaks(),
        }
    }

    pub fn intervals(&self) -> PpiSeries {
        PpiSeries::from_peaks(&self.peaks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Recorded(SessionReport),
    InsufficientData {
        reason: InsufficientReason,
        report: SessionReport,
    },
}

impl SessionOutcome {
    /// Timed sessions must have recorded for `deadline_ms`, whatever stopped
    /// them, and must hold at least one accepted peak.
    fn classify(report: SessionReport, deadline_ms: u64) -> Self {
        if !report.mode.is_timed() {
            return SessionOutcome::Recorded(report);
        }
        let reason = if report.duration_ms < deadline_ms {
            InsufficientReason::Aborted
        } else if report.peaks.is_empty() {
            InsufficientReason::NoPeaks
        } else {
            return SessionOutcome::Recorded(report);
        };
        info!("not enough data: {reason:?}");
        SessionOutcome::InsufficientData { reason, report }
    }

    pub fn report(&self) -> &SessionReport {
        match self {
            SessionOutcome::Recorded(report) => report,
            SessionOutcome::InsufficientData { report, .. } => report,
        }
    }

    pub fn into_report(self) -> SessionReport {
        match self {
            SessionOutcome::Recorded(report) => report,
            SessionOutcome::InsufficientData { report, .. } => report,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, SessionOutcome::Recorded(_))
    }
}

/// Scalars published by the detection thread for the presenter.
#[derive(Debug)]
pub struct LiveState {
    running: AtomicBool,
    phase: AtomicU8,
    bpm: AtomicU32,
    smoothed: AtomicU64,
    has_sample: AtomicBool,
    elapsed_ms: AtomicU64,
    artifacts: AtomicU32,
    peaks: AtomicU32,
    pulse_lost: AtomicBool,
    acquisition: AtomicU64,
}

/// Copy of [`LiveState`] taken at one instant. Fields may come from
/// different samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub running: bool,
    pub phase: DetectorPhase,
    pub bpm: Option<u32>,
    pub smoothed: Option<f64>,
    pub elapsed_ms: u64,
    pub artifact_count: u32,
    pub peak_count: u32,
    pub pulse_lost: bool,
    pub acquisition_progress: f64,
}

impl LiveState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            phase: AtomicU8::new(phase_code(DetectorPhase::AcquiringPulse)),
            bpm: AtomicU32::new(0),
            smoothed: AtomicU64::new(0),
            has_sample: AtomicBool::new(false),
            elapsed_ms: AtomicU64::new(0),
            artifacts: AtomicU32::new(0),
            peaks: AtomicU32::new(0),
            pulse_lost: AtomicBool::new(false),
            acquisition: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn publish(&self, detector: &PeakDetector) {
        self.phase
            .store(phase_code(detector.phase()), Ordering::Relaxed);
        self.bpm
            .store(detector.bpm().unwrap_or(0), Ordering::Relaxed);
        if let Some(smoothed) = detector.smoothed() {
            self.smoothed.store(smoothed.to_bits(), Ordering::Relaxed);
            self.has_sample.store(true, Ordering::Release);
        }
        self.elapsed_ms
            .store(detector.elapsed_ms(), Ordering::Relaxed);
        self.artifacts
            .store(detector.artifact_count(), Ordering::Relaxed);
        let peaks = u32::try_from(detector.peaks().len()).unwrap_or(u32::MAX);
        self.peaks.store(peaks, Ordering::Relaxed);
        self.pulse_lost
            .store(detector.pulse_lost(), Ordering::Relaxed);
        self.acquisition
            .store(detector.acquisition_progress().to_bits(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let bpm = self.bpm.load(Ordering::Relaxed);
        let smoothed = self
            .has_sample
            .load(Ordering::Acquire)
            .then(|| f64::from_bits(self.smoothed.load(Ordering::Relaxed)));
        LiveSnapshot {
            running: self.is_running(),
            phase: phase_from_code(self.phase.load(Ordering::Relaxed)),
            bpm: (bpm > 0).then_some(bpm),
            smoothed,
            elapsed_ms: self.elapsed_ms.load(Ordering::Relaxed),
            artifact_count: self.artifacts.load(Ordering::Relaxed),
            peak_count: self.peaks.load(Ordering::Relaxed),
            pulse_lost: self.pulse_lost.load(Ordering::Relaxed),
            acquisition_progress: f64::from_bits(self.acquisition.load(Ordering::Relaxed)),
        }
    }
}

fn phase_code(phase: DetectorPhase) -> u8 {
    match phase {
        DetectorPhase::AcquiringPulse => 0,
        DetectorPhase::Recording => 1,
        DetectorPhase::Stopped => 2,
    }
}

fn phase_from_code(code: u8) -> DetectorPhase {
    match code {
        0 => DetectorPhase::AcquiringPulse,
        1 => DetectorPhase::Recording,
        _ => DetectorPhase::Stopped,
    }
}

struct Shared {
    live: LiveState,
    source: Mutex<Option<SampleSource>>,
    // Held by the detection loop around every queue read.
    reader: Mutex<()>,
    stop_reason: Mutex<Option<StopReason>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle that ends a running session from any thread.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stop the session. Returns `false` if it was already stopped.
    ///
    /// On return the sample timer is joined, the queue is drained and the
    /// detection loop will not read the queue again.
    pub fn stop(&self, reason: StopReason) -> bool {
        let mut source = lock(&self.shared.source);
        if !self.shared.live.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        *lock(&self.shared.stop_reason) = Some(reason);
        let _reader = lock(&self.shared.reader);
        if let Some(source) = source.as_mut() {
            source.stop();
            let discarded = source.reset();
            debug!("discarded {discarded} queued samples");
        }
        info!("session stopped: {reason:?}");
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.live.is_running()
    }

    /// Why the session stopped, once it has.
    pub fn reason(&self) -> Option<StopReason> {
        *lock(&self.shared.stop_reason)
    }

    pub fn live(&self) -> &LiveState {
        &self.shared.live
    }
}

/// One acquisition run from pulse gating to stop.
pub struct Session {
    settings: SessionSettings,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<PeakDetector>>,
    // Queue drops counted before this session started.
    dropped_before: u64,
}

impl Session {
    /// Reset and start `source`, then spawn the detection thread.
    pub fn start(settings: SessionSettings, mut source: SampleSource) -> Result<Self, SessionError> {
        check_rate(settings.detector.sample_rate_hz)?;
        source.reset();
        let queue = source.queue().clone();
        let dropped_before = queue.dropped();
        source.start()?;
        let shared = Arc::new(Shared {
            live: LiveState::new(),
            source: Mutex::new(Some(source)),
            reader: Mutex::new(()),
            stop_reason: Mutex::new(None),
        });

        let detector = PeakDetector::new(settings.detector);
        let worker_shared = shared.clone();
        let spawned = std::thread::Builder::new()
            .name("pulse-detector".into())
            .spawn(move || run_detection(&worker_shared, &queue, detector));
        match spawned {
            Ok(handle) => {
                info!(
                    "{} session started (deadline {} ms)",
                    settings.mode.as_str(),
                    settings.deadline_ms
                );
                Ok(Self {
                    settings,
                    shared,
                    worker: Some(handle),
                    dropped_before,
                })
            }
            Err(err) => {
                StopHandle { shared }.stop(StopReason::Requested);
                Err(SessionError::Spawn(err))
            }
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn mode(&self) -> SessionMode {
        self.settings.mode
    }

    pub fn live(&self) -> LiveSnapshot {
        self.shared.live.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn stop(&self, reason: StopReason) -> bool {
        self.stop_handle().stop(reason)
    }

    pub fn is_running(&self) -> bool {
        self.shared.live.is_running()
    }

    /// Stop if still running, join the detection thread and hand the
    /// source back for the next session.
    pub fn finish(mut self) -> Result<(SessionOutcome, SampleSource), SessionError> {
        self.stop(StopReason::Requested);
        let detector = self
            .worker
            .take()
            .ok_or(SessionError::WorkerPanicked)?
            .join()
            .map_err(|_| SessionError::WorkerPanicked)?;
        let source = lock(&self.shared.source)
            .take()
            .ok_or(SessionError::SourceReleased)?;
        let reason = (*lock(&self.shared.stop_reason)).unwrap_or(StopReason::Requested);
        let dropped = source.queue().dropped().saturating_sub(self.dropped_before);
        if dropped > 0 {
            warn!("{dropped} samples dropped on a full queue");
        }
        let report = SessionReport::from_detector(self.settings.mode, reason, detector, dropped);
        Ok((
            SessionOutcome::classify(report, self.settings.deadline_ms),
            source,
        ))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.stop(StopReason::Requested);
            let _ = worker.join();
        }
    }
}

fn run_detection(shared: &Shared, queue: &SampleQueue, mut detector: PeakDetector) -> PeakDetector {
    loop {
        let _reader = lock(&shared.reader);
        if !shared.live.is_running() {
            break;
        }
        if let Some(sample) = queue.pop_timeout(POLL_INTERVAL) {
            detector.process(sample);
            shared.live.publish(&detector);
        }
    }
    detector.stop();
    shared.live.publish(&detector);
    detector
}

/// Run a recorded sample sequence through a fresh detector, ending at the
/// deadline in timed modes or when the samples run out.
pub fn replay(settings: &SessionSettings, samples: &[Sample]) -> Result<SessionOutcome, SessionError> {
    check_rate(settings.detector.sample_rate_hz)?;
    let mut detector = PeakDetector::new(settings.detector);
    let mut reason = StopReason::Exhausted;
    for &sample in samples {
        detector.process(sample);
        if settings.mode.is_timed() && detector.elapsed_ms() >= settings.deadline_ms {
            reason = StopReason::Deadline;
            break;
        }
    }
    detector.stop();
    let report = SessionReport::from_detector(settings.mode, reason, detector, 0);
    Ok(SessionOutcome::classify(report, settings.deadline_ms))
}
