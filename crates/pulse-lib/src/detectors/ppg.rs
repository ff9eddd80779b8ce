use crate::{
    average::RollingAverage,
    buffer::RingBuffer,
    signal::{PeakRecord, Sample, SampleClock},
};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

/// Configurable parameters for real-time PPG beat detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpgDetectorConfig {
    /// Sensor sampling frequency (Hz); drives the sample clock.
    pub sample_rate_hz: f64,
    /// A raw sample must exceed this to count towards pulse acquisition.
    pub qualifying_level: u16,
    /// Consecutive qualifying samples needed before recording starts.
    pub qualifying_run: u32,
    /// Lower bound of the plausible raw band.
    pub artifact_low: u16,
    /// Upper bound of the plausible raw band.
    pub artifact_high: u16,
    /// Minimum time between two flagged artifacts (ms).
    pub artifact_cooldown_ms: u64,
    /// Raw samples kept for min/max range tracking.
    pub raw_window: usize,
    /// Recompute the tracked range every this many processed samples.
    pub range_refresh: u64,
    /// Hysteresis threshold on the smoothed [0, 1] signal.
    pub peak_threshold: f64,
    /// Shorter intervals are treated as beat echoes (ms).
    pub min_interval_ms: u64,
    /// Longer intervals are treated as a lost pulse (ms).
    pub max_interval_ms: u64,
    /// Rolling window driving peak detection.
    pub smoothing_window: usize,
    /// Slower rolling window kept for display trends.
    pub trend_window: usize,
    /// Rolling window over accepted intervals used for BPM.
    pub interval_window: usize,
}

impl Default for PpgDetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            qualifying_level: 1000,
            qualifying_run: 500,
            artifact_low: 10_000,
            artifact_high: 60_000,
            artifact_cooldown_ms: 500,
            raw_window: 250,
            range_refresh: 250,
            peak_threshold: 0.7,
            min_interval_ms: 300,
            max_interval_ms: 1700,
            smoothing_window: 10,
            trend_window: 40,
            interval_window: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorPhase {
    AcquiringPulse,
    Recording,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Too soon after the previous detection.
    Echo,
    /// Too long since the previous detection; the pulse was probably lost.
    Gap,
}

/// What a single sample did to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Acquiring { qualifying: u32 },
    PulseAcquired { start_ms: u64 },
    Artifact,
    Smoothed(f64),
    Peak(PeakRecord),
    PeakRejected { interval_ms: u64, reason: RejectReason },
    Stopped,
}

/// Counts consecutive qualifying samples until a pulse is present.
#[derive(Debug, Clone)]
struct PulseGate {
    level: u16,
    required: u32,
    run: u32,
}

impl PulseGate {
    fn feed(&mut self, raw: Sample) -> bool {
        if raw > self.level {
            self.run += 1;
        } else {
            if self.run > 0 {
                trace!("pulse gate reset after {} qualifying samples", self.run);
            }
            self.run = 0;
        }
        self.run >= self.required
    }
}

/// Rate-limited rejection of out-of-band raw samples.
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    low: Sample,
    high: Sample,
    cooldown_ms: u64,
    count: u32,
    last_ms: Option<u64>,
}

impl ArtifactFilter {
    pub fn new(low: Sample, high: Sample, cooldown_ms: u64) -> Self {
        Self {
            low,
            high,
            cooldown_ms,
            count: 0,
            last_ms: None,
        }
    }

    /// Returns `true` when the sample is flagged and must be discarded.
    /// Out-of-band samples inside the cooldown pass through untested.
    pub fn check(&mut self, raw: Sample, now_ms: u64) -> bool {
        if raw >= self.low && raw <= self.high {
            return false;
        }
        let cooled = self
            .last_ms
            .map_or(true, |last| now_ms.saturating_sub(last) > self.cooldown_ms);
        if !cooled {
            return false;
        }
        self.count += 1;
        self.last_ms = Some(now_ms);
        debug!("pulse artifact at {now_ms} ms (raw {raw}, total {})", self.count);
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_ms(&self) -> Option<u64> {
        self.last_ms
    }
}

/// Min/max normalization against the recent raw range.
#[derive(Debug, Clone)]
pub struct AdaptiveNormalizer {
    refresh_every: u64,
    processed: u64,
    range: Option<(Sample, Sample)>,
}

impl AdaptiveNormalizer {
    pub fn new(refresh_every: u64) -> Self {
        Self {
            refresh_every: refresh_every.max(1),
            processed: 0,
            range: None,
        }
    }

    /// Map `raw` into [0, 1]. The range is refreshed from `window` on the
    /// first call and every `refresh_every` calls after that; a clamped
    /// sample becomes the new bound.
    pub fn normalize(&mut self, raw: Sample, window: &RingBuffer<Sample>) -> f64 {
        if self.processed % self.refresh_every == 0 {
            if let (Some(lo), Some(hi)) = (window.min(), window.max()) {
                self.range = Some((lo, hi));
            }
        }
        self.processed += 1;

        let (lo, hi) = match self.range {
            Some(range) => range,
            None => {
                self.range = Some((raw, raw));
                return 0.0;
            }
        };
        if raw > hi {
            self.range = Some((lo, raw));
            return 1.0;
        }
        if raw < lo {
            self.range = Some((raw, hi));
            return 0.0;
        }
        let span = hi - lo;
        if span == 0 {
            return 0.0;
        }
        f64::from(raw - lo) / f64::from(span)
    }

    pub fn range(&self) -> Option<(Sample, Sample)> {
        self.range
    }
}

/// Edge-triggered peak picker: holds the running maximum while the signal is
/// above threshold and fires once on the falling edge.
#[derive(Debug, Clone)]
pub struct HysteresisPeak {
    threshold: f64,
    running_max: Option<f64>,
}

impl HysteresisPeak {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            running_max: None,
        }
    }

    /// Returns the peak amplitude when `value` drops back below threshold.
    pub fn update(&mut self, value: f64) -> Option<f64> {
        if value > self.threshold {
            if self.running_max.map_or(true, |max| value > max) {
                self.running_max = Some(value);
            }
            None
        } else if value < self.threshold {
            self.running_max.take()
        } else {
            None
        }
    }
}

/// Single-writer state machine turning raw PPG samples into heartbeats.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    config: PpgDetectorConfig,
    phase: DetectorPhase,
    clock: SampleClock,
    gate: PulseGate,
    artifacts: ArtifactFilter,
    raw: RingBuffer<Sample>,
    normalizer: AdaptiveNormalizer,
    smooth: RollingAverage,
    trend: RollingAverage,
    hysteresis: HysteresisPeak,
    intervals: RollingAverage,
    start_ms: Option<u64>,
    last_peak_ms: Option<u64>,
    last_ms: u64,
    sample_count: u64,
    peaks: Vec<PeakRecord>,
    bpm: Option<u32>,
    rejected: u32,
    pulse_lost: bool,
}

impl PeakDetector {
    pub fn new(config: PpgDetectorConfig) -> Self {
        Self {
            phase: DetectorPhase::AcquiringPulse,
            clock: SampleClock::new(config.sample_rate_hz),
            gate: PulseGate {
                level: config.qualifying_level,
                required: config.qualifying_run,
                run: 0,
            },
            artifacts: ArtifactFilter::new(
                config.artifact_low,
                config.artifact_high,
                config.artifact_cooldown_ms,
            ),
            raw: RingBuffer::new(config.raw_window),
            normalizer: AdaptiveNormalizer::new(config.range_refresh),
            smooth: RollingAverage::new(config.smoothing_window),
            trend: RollingAverage::new(config.trend_window),
            hysteresis: HysteresisPeak::new(config.peak_threshold),
            intervals: RollingAverage::new(config.interval_window),
            start_ms: None,
            last_peak_ms: None,
            last_ms: 0,
            sample_count: 0,
            peaks: Vec::new(),
            bpm: None,
            rejected: 0,
            pulse_lost: false,
            config,
        }
    }

    /// Process the next sample off the queue, timestamped by the sample clock.
    pub fn process(&mut self, raw: Sample) -> SampleOutcome {
        let now = self.clock.tick();
        self.process_at(raw, now)
    }

    /// Process a sample with an explicit timestamp (ms).
    pub fn process_at(&mut self, raw: Sample, now_ms: u64) -> SampleOutcome {
        self.last_ms = now_ms;
        match self.phase {
            DetectorPhase::Stopped => SampleOutcome::Stopped,
            DetectorPhase::AcquiringPulse => {
                self.raw.put(raw);
                if self.gate.feed(raw) {
                    self.begin_recording(now_ms);
                    SampleOutcome::PulseAcquired { start_ms: now_ms }
                } else {
                    SampleOutcome::Acquiring {
                        qualifying: self.gate.run,
                    }
                }
            }
            DetectorPhase::Recording => self.record(raw, now_ms),
        }
    }

    fn begin_recording(&mut self, now_ms: u64) {
        info!("pulse acquired at {now_ms} ms, recording");
        self.phase = DetectorPhase::Recording;
        self.start_ms = Some(now_ms);
        self.sample_count = 0;
    }

    fn record(&mut self, raw: Sample, now_ms: u64) -> SampleOutcome {
        if self.artifacts.check(raw, now_ms) {
            return SampleOutcome::Artifact;
        }
        self.raw.put(raw);
        let normalized = self.normalizer.normalize(raw, &self.raw);
        let smoothed = self.smooth.update(normalized);
        self.trend.update(normalized);
        self.sample_count += 1;

        match self.hysteresis.update(smoothed) {
            Some(amplitude) => self.on_peak(amplitude, now_ms),
            None => SampleOutcome::Smoothed(smoothed),
        }
    }

    fn on_peak(&mut self, amplitude: f64, now_ms: u64) -> SampleOutcome {
        let since = self.last_peak_ms.or(self.start_ms).unwrap_or(now_ms);
        let interval_ms = now_ms.saturating_sub(since);
        self.last_peak_ms = Some(now_ms);

        if interval_ms < self.config.min_interval_ms {
            self.rejected += 1;
            trace!("beat echo after {interval_ms} ms ignored");
            return SampleOutcome::PeakRejected {
                interval_ms,
                reason: RejectReason::Echo,
            };
        }
        if interval_ms > self.config.max_interval_ms {
            self.rejected += 1;
            if !self.pulse_lost {
                warn!("no beat for {interval_ms} ms, pulse lost");
            }
            self.pulse_lost = true;
            return SampleOutcome::PeakRejected {
                interval_ms,
                reason: RejectReason::Gap,
            };
        }

        let record = PeakRecord {
            sample_index: self.sample_count,
            timestamp_ms: now_ms,
            interval_ms,
            peak_amplitude: amplitude,
        };
        self.peaks.push(record);
        let mean_ppi = self.intervals.update(interval_ms as f64);
        if mean_ppi > 0.0 {
            self.bpm = Some((60_000.0 / mean_ppi).round() as u32);
        }
        self.pulse_lost = false;
        SampleOutcome::Peak(record)
    }

    /// Freeze the detector; later samples are ignored.
    pub fn stop(&mut self) {
        if self.phase != DetectorPhase::Stopped {
            debug!(
                "detector stopped: {} samples, {} peaks, {} artifacts",
                self.sample_count,
                self.peaks.len(),
                self.artifacts.count()
            );
        }
        self.phase = DetectorPhase::Stopped;
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn config(&self) -> &PpgDetectorConfig {
        &self.config
    }

    pub fn bpm(&self) -> Option<u32> {
        self.bpm
    }

    /// Latest short-window smoothed sample in [0, 1].
    pub fn smoothed(&self) -> Option<f64> {
        self.smooth.get()
    }

    /// Latest long-window smoothed sample in [0, 1].
    pub fn trend(&self) -> Option<f64> {
        self.trend.get()
    }

    pub fn peaks(&self) -> &[PeakRecord] {
        &self.peaks
    }

    pub fn into_peaks(self) -> Vec<PeakRecord> {
        self.peaks
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn artifact_count(&self) -> u32 {
        self.artifacts.count()
    }

    pub fn last_artifact_ms(&self) -> Option<u64> {
        self.artifacts.last_ms()
    }

    pub fn rejected_count(&self) -> u32 {
        self.rejected
    }

    pub fn pulse_lost(&self) -> bool {
        self.pulse_lost
    }

    pub fn start_ms(&self) -> Option<u64> {
        self.start_ms
    }

    pub fn last_peak_ms(&self) -> Option<u64> {
        self.last_peak_ms
    }

    /// Recording time so far (ms); zero while acquiring.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_ms
            .map_or(0, |start| self.last_ms.saturating_sub(start))
    }

    /// Fraction of the acquisition run completed, in [0, 1].
    pub fn acquisition_progress(&self) -> f64 {
        match self.phase {
            DetectorPhase::AcquiringPulse => {
                f64::from(self.gate.run) / f64::from(self.gate.required.max(1))
            }
            _ => 1.0,
        }
    }

    pub fn normalizer_range(&self) -> Option<(Sample, Sample)> {
        self.normalizer.range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_detector() -> PeakDetector {
        let mut det = PeakDetector::new(PpgDetectorConfig::default());
        det.begin_recording(0);
        det
    }

    #[test]
    fn single_span_above_threshold_fires_once_on_falling_edge() {
        let mut peak = HysteresisPeak::new(0.7);
        let wave = [0.2, 0.5, 0.71, 0.8, 0.95, 0.9, 0.75, 0.72, 0.69, 0.4, 0.1, 0.3];
        let fired: Vec<(usize, f64)> = wave
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| peak.update(v).map(|amp| (i, amp)))
            .collect();
        assert_eq!(fired, vec![(8, 0.95)]);
    }

    #[test]
    fn value_at_threshold_neither_arms_nor_fires() {
        let mut peak = HysteresisPeak::new(0.7);
        assert_eq!(peak.update(0.7), None);
        assert_eq!(peak.update(0.5), None);
        assert_eq!(peak.update(0.8), None);
        assert_eq!(peak.update(0.7), None);
        assert_eq!(peak.update(0.6), Some(0.8));
    }

    #[test]
    fn rejected_peaks_still_move_the_reference_time() {
        let mut det = recording_detector();
        assert!(matches!(det.on_peak(0.9, 1000), SampleOutcome::Peak(p) if p.interval_ms == 1000));
        assert_eq!(
            det.on_peak(0.9, 1200),
            SampleOutcome::PeakRejected {
                interval_ms: 200,
                reason: RejectReason::Echo
            }
        );
        assert_eq!(det.last_peak_ms(), Some(1200));
        assert!(matches!(det.on_peak(0.9, 2100), SampleOutcome::Peak(p) if p.interval_ms == 900));
        assert_eq!(
            det.on_peak(0.9, 4000),
            SampleOutcome::PeakRejected {
                interval_ms: 1900,
                reason: RejectReason::Gap
            }
        );
        assert!(det.pulse_lost());
        assert!(matches!(det.on_peak(0.9, 4800), SampleOutcome::Peak(p) if p.interval_ms == 800));
        assert!(!det.pulse_lost());

        let intervals: Vec<u64> = det.peaks().iter().map(|p| p.interval_ms).collect();
        assert_eq!(intervals, vec![1000, 900, 800]);
        assert_eq!(det.rejected_count(), 2);
        assert_eq!(det.bpm(), Some(67));
    }

    #[test]
    fn first_interval_counts_from_session_start() {
        let mut det = PeakDetector::new(PpgDetectorConfig::default());
        det.begin_recording(5000);
        assert!(matches!(det.on_peak(0.8, 5750), SampleOutcome::Peak(p) if p.interval_ms == 750));
        assert_eq!(det.bpm(), Some(80));
    }

    #[test]
    fn artifact_cooldown_rate_limits_rejections() {
        let mut det = recording_detector();
        det.raw.put(20_000);
        det.raw.put(40_000);
        assert_eq!(det.process_at(5_000, 1000), SampleOutcome::Artifact);
        assert!(matches!(det.process_at(5_000, 1100), SampleOutcome::Smoothed(_)));
        assert_eq!(det.artifact_count(), 1);
        assert_eq!(det.process_at(5_000, 1600), SampleOutcome::Artifact);
        assert_eq!(det.artifact_count(), 2);
        assert_eq!(det.last_artifact_ms(), Some(1600));
    }

    #[test]
    fn clamped_sample_becomes_new_max() {
        let mut window = RingBuffer::new(8);
        for v in [20_000u16, 25_000, 30_000] {
            window.put(v);
        }
        let mut norm = AdaptiveNormalizer::new(250);
        assert_eq!(norm.normalize(25_000, &window), 0.5);
        assert_eq!(norm.normalize(35_000, &window), 1.0);
        assert_eq!(norm.range(), Some((20_000, 35_000)));
        assert_eq!(norm.normalize(35_000, &window), 1.0);
        assert_eq!(norm.normalize(15_000, &window), 0.0);
        assert_eq!(norm.range(), Some((15_000, 35_000)));
    }

    #[test]
    fn flat_range_normalizes_to_zero() {
        let mut window = RingBuffer::new(4);
        window.put(30_000u16);
        let mut norm = AdaptiveNormalizer::new(250);
        assert_eq!(norm.normalize(30_000, &window), 0.0);
    }

    #[test]
    fn gate_requires_unbroken_run() {
        let config = PpgDetectorConfig {
            qualifying_run: 5,
            ..PpgDetectorConfig::default()
        };
        let mut det = PeakDetector::new(config);
        for _ in 0..4 {
            assert!(matches!(det.process(30_000), SampleOutcome::Acquiring { .. }));
        }
        assert_eq!(
            det.process(500),
            SampleOutcome::Acquiring { qualifying: 0 }
        );
        for _ in 0..4 {
            det.process(30_000);
        }
        assert!(matches!(
            det.process(30_000),
            SampleOutcome::PulseAcquired { .. }
        ));
        assert_eq!(det.phase(), DetectorPhase::Recording);
        // Gating samples seed the range tracker.
        assert_eq!(det.raw.len(), 10);
    }

    #[test]
    fn stopped_detector_ignores_samples() {
        let mut det = recording_detector();
        det.stop();
        assert_eq!(det.process(30_000), SampleOutcome::Stopped);
        assert_eq!(det.sample_count(), 0);
    }
}
