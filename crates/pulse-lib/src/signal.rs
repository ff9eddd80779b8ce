use serde::{Deserialize, Serialize};

/// Raw ADC reading from the PPG sensor.
pub type Sample = u16;

/// One accepted heartbeat detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    /// Count of processed samples when the peak was confirmed.
    pub sample_index: u64,
    /// Sample-clock time of the confirmation (ms).
    pub timestamp_ms: u64,
    /// Distance to the previous detection (ms).
    pub interval_ms: u64,
    /// Maximum smoothed amplitude reached above threshold.
    pub peak_amplitude: f64,
}

/// Peak-to-peak intervals (ms) of a session, in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PpiSeries {
    pub ppi: Vec<f64>,
}

impl PpiSeries {
    pub fn from_peaks(peaks: &[PeakRecord]) -> Self {
        Self {
            ppi: peaks.iter().map(|p| p.interval_ms as f64).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ppi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ppi.is_empty()
    }

    /// Integer intervals as sent to remote analysis.
    pub fn as_millis(&self) -> Vec<u64> {
        self.ppi.iter().map(|v| v.round().max(0.0) as u64).collect()
    }
}

/// Sample clock derived from a count of samples at a fixed rate.
#[derive(Debug, Clone, Copy)]
pub struct SampleClock {
    sample_rate_hz: f64,
    ticks: u64,
}

impl SampleClock {
    pub fn new(sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz: sample_rate_hz.max(f64::MIN_POSITIVE),
            ticks: 0,
        }
    }

    /// Advance one sample period and return the new time (ms).
    pub fn tick(&mut self) -> u64 {
        self.ticks += 1;
        self.now_ms()
    }

    pub fn now_ms(&self) -> u64 {
        (self.ticks as f64 * 1000.0 / self.sample_rate_hz).round() as u64
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_clock_tracks_period() {
        let mut clock = SampleClock::new(250.0);
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.tick(), 4);
        for _ in 0..249 {
            clock.tick();
        }
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn ppi_series_from_peaks() {
        let peaks = [
            PeakRecord {
                sample_index: 10,
                timestamp_ms: 800,
                interval_ms: 800,
                peak_amplitude: 0.9,
            },
            PeakRecord {
                sample_index: 212,
                timestamp_ms: 1610,
                interval_ms: 810,
                peak_amplitude: 0.85,
            },
        ];
        let series = PpiSeries::from_peaks(&peaks);
        assert_eq!(series.ppi, vec![800.0, 810.0]);
        assert_eq!(series.as_millis(), vec![800, 810]);
    }
}
