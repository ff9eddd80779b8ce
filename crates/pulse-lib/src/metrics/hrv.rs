use crate::error::HrvError;
use crate::signal::PpiSeries;
use log::warn;
use serde::{Deserialize, Serialize};

/// Below this many intervals the statistics are flagged as low reliability.
pub const RELIABLE_MIN_INTERVALS: usize = 5;

/// Time-domain HRV summary of one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvResult {
    /// Caller-supplied wall-clock time (unix seconds).
    pub timestamp: u64,
    pub mean_hr: f64,
    pub mean_ppi: f64,
    pub rmssd: f64,
    pub sdnn: f64,
    pub reliable: bool,
}

/// Compute mean PPI, mean HR, SDNN (population) and RMSSD from peak-to-peak
/// intervals in milliseconds.
pub fn hrv_time(ppi: &PpiSeries, timestamp: u64) -> Result<HrvResult, HrvError> {
    let data = &ppi.ppi;
    let n = data.len();
    if n < 2 {
        return Err(HrvError::InsufficientData(n));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(HrvError::InvalidData("non-finite interval".into()));
    }
    let reliable = n >= RELIABLE_MIN_INTERVALS;
    if !reliable {
        warn!("only {n} intervals, HRV statistics have low reliability");
    }

    let mean_ppi = data.iter().sum::<f64>() / n as f64;
    if mean_ppi <= 0.0 {
        return Err(HrvError::InvalidData(format!(
            "mean interval must be positive, got {mean_ppi}"
        )));
    }
    let mean_hr = 60_000.0 / mean_ppi;
    let sdnn = (data.iter().map(|x| (x - mean_ppi).powi(2)).sum::<f64>() / n as f64).sqrt();
    // n >= 2, so there is at least one successive difference.
    let rmssd = (data.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>()
        / (n as f64 - 1.0))
        .sqrt();

    Ok(HrvResult {
        timestamp,
        mean_hr,
        mean_ppi,
        rmssd,
        sdnn,
        reliable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> PpiSeries {
        PpiSeries {
            ppi: values.to_vec(),
        }
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn four_interval_reference() {
        let result = hrv_time(&series(&[800.0, 810.0, 790.0, 805.0]), 1_700_000_000).unwrap();
        assert_eq!(result.mean_ppi, 801.25);
        assert_close(result.mean_hr, 74.883, 0.05);
        assert_close(result.sdnn, 7.395, 0.05);
        assert_close(result.rmssd, 15.546, 0.05);
        assert_eq!(result.timestamp, 1_700_000_000);
        assert!(!result.reliable);
    }

    #[test]
    fn too_few_intervals() {
        assert_eq!(
            hrv_time(&series(&[]), 0),
            Err(HrvError::InsufficientData(0))
        );
        assert_eq!(
            hrv_time(&series(&[812.0]), 0),
            Err(HrvError::InsufficientData(1))
        );
    }

    #[test]
    fn non_positive_mean_is_invalid() {
        assert!(matches!(
            hrv_time(&series(&[0.0, 0.0, 0.0]), 0),
            Err(HrvError::InvalidData(_))
        ));
        assert!(matches!(
            hrv_time(&series(&[800.0, f64::NAN]), 0),
            Err(HrvError::InvalidData(_))
        ));
    }

    #[test]
    fn constant_intervals_have_zero_variability() {
        let result = hrv_time(&series(&[750.0; 8]), 0).unwrap();
        assert_eq!(result.sdnn, 0.0);
        assert_eq!(result.rmssd, 0.0);
        assert_eq!(result.mean_hr, 80.0);
        assert!(result.reliable);
    }
}
