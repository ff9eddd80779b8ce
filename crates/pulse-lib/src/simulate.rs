use crate::acquisition::Adc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Shape of a synthetic fingertip PPG recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub sample_rate_hz: f64,
    pub bpm: f64,
    /// Resting ADC level between beats.
    pub baseline: f64,
    /// Height of the systolic bump above baseline.
    pub amplitude: f64,
    /// Dicrotic bump height relative to the systolic one.
    pub dicrotic_ratio: f64,
    /// Uniform beat-to-beat interval jitter (± ms).
    pub jitter_ms: f64,
    /// Uniform additive noise (± ADC counts).
    pub noise: f64,
    /// Probability that a beat starts with a motion-artifact burst.
    pub artifact_rate: f64,
    pub artifact_len_ms: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            bpm: 72.0,
            baseline: 30_000.0,
            amplitude: 12_000.0,
            dicrotic_ratio: 0.25,
            jitter_ms: 15.0,
            noise: 150.0,
            artifact_rate: 0.0,
            artifact_len_ms: 200.0,
            seed: 7,
        }
    }
}

/// Seeded PPG waveform generator. Each read advances one sample period.
#[derive(Debug, Clone)]
pub struct SyntheticPpg {
    config: SyntheticConfig,
    rng: StdRng,
    period_ms: f64,
    phase_ms: f64,
    beat_ms: f64,
    artifact_left: u32,
    beats: u64,
}

impl SyntheticPpg {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let beat_ms = next_beat_len(&config, &mut rng);
        Self {
            period_ms: 1000.0 / config.sample_rate_hz.max(1.0),
            config,
            rng,
            phase_ms: 0.0,
            beat_ms,
            artifact_left: 0,
            beats: 0,
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Beats started so far, not counting the first.
    pub fn beats(&self) -> u64 {
        self.beats
    }

    pub fn next_sample(&mut self) -> u16 {
        self.phase_ms += self.period_ms;
        if self.phase_ms >= self.beat_ms {
            self.phase_ms -= self.beat_ms;
            self.beat_ms = next_beat_len(&self.config, &mut self.rng);
            self.beats += 1;
            let rate = self.config.artifact_rate.clamp(0.0, 1.0);
            if rate > 0.0 && self.rng.gen_bool(rate) {
                self.artifact_left = (self.config.artifact_len_ms / self.period_ms).ceil() as u32;
            }
        }

        if self.artifact_left > 0 {
            self.artifact_left -= 1;
            // Sensor slipped: saturate high or drop out low.
            return if self.rng.gen_bool(0.5) { 63_000 } else { 4_000 };
        }

        let x = self.phase_ms / self.beat_ms;
        let systolic = gaussian(x, 0.2, 0.06);
        let dicrotic = self.config.dicrotic_ratio * gaussian(x, 0.45, 0.07);
        let noise = if self.config.noise > 0.0 {
            self.rng.gen_range(-self.config.noise..=self.config.noise)
        } else {
            0.0
        };
        let value = self.config.baseline + self.config.amplitude * (systolic + dicrotic) + noise;
        value.round().clamp(0.0, f64::from(u16::MAX)) as u16
    }

    /// Render a whole recording of `n` samples.
    pub fn render(&mut self, n: usize) -> Vec<u16> {
        (0..n).map(|_| self.next_sample()).collect()
    }
}

impl Adc for SyntheticPpg {
    fn read_u16(&mut self) -> u16 {
        self.next_sample()
    }
}

fn next_beat_len(config: &SyntheticConfig, rng: &mut StdRng) -> f64 {
    let base = 60_000.0 / config.bpm.max(1.0);
    let jitter = if config.jitter_ms > 0.0 {
        rng.gen_range(-config.jitter_ms..=config.jitter_ms)
    } else {
        0.0
    };
    (base + jitter).max(1.0)
}

fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    (-0.5 * ((x - center) / width).powi(2)).exp()
}
