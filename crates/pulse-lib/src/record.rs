use crate::metrics::hrv::HrvResult;
use serde::{Deserialize, Serialize};

/// Analysis type tag for locally computed measurements.
pub const BASIC_ANALYSIS: &str = "basic";

/// One stored or published measurement.
///
/// Locally computed records carry only the base fields; records returned by
/// remote analysis add the optional physiological indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: u64,
    /// Unix seconds.
    pub time: u64,
    pub mean_hr: f64,
    pub mean_ppi: f64,
    pub rmssd: f64,
    pub sdnn: f64,
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physiological_age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pns_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sns_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd1_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd2_ms: Option<f64>,
}

impl MeasurementRecord {
    /// Build a record from a local result, rounding values to one decimal.
    /// The result timestamp doubles as the record id.
    pub fn from_hrv(result: &HrvResult, analysis_type: &str) -> Self {
        Self {
            id: result.timestamp,
            time: result.timestamp,
            mean_hr: round1(result.mean_hr),
            mean_ppi: round1(result.mean_ppi),
            rmssd: round1(result.rmssd),
            sdnn: round1(result.sdnn),
            analysis_type: analysis_type.to_string(),
            physiological_age: None,
            pns_index: None,
            sns_index: None,
            respiratory_rate: None,
            stress_index: None,
            sd1_ms: None,
            sd2_ms: None,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.pns_index.is_some() || self.sns_index.is_some() || self.stress_index.is_some()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_record_rounds_and_omits_remote_fields() {
        let result = HrvResult {
            timestamp: 1_700_000_123,
            mean_hr: 74.883_01,
            mean_ppi: 801.25,
            rmssd: 15.546_06,
            sdnn: 7.395_94,
            reliable: false,
        };
        let record = MeasurementRecord::from_hrv(&result, BASIC_ANALYSIS);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1_700_000_123u64,
                "time": 1_700_000_123u64,
                "mean_hr": 74.9,
                "mean_ppi": 801.3,
                "rmssd": 15.5,
                "sdnn": 7.4,
                "analysis_type": "basic",
            })
        );
        assert!(!record.is_extended());
    }

    #[test]
    fn parses_extended_remote_record() {
        let text = r#"{"id":42,"time":1700000000,"mean_hr":70.2,"mean_ppi":854.7,
            "rmssd":40.1,"sdnn":52.3,"analysis_type":"readiness","physiological_age":31.0,
            "pns_index":0.8,"sns_index":-0.4,"respiratory_rate":14.2,"stress_index":9.1,
            "sd1_ms":28.4,"sd2_ms":66.0}"#;
        let record: MeasurementRecord = serde_json::from_str(text).unwrap();
        assert_eq!(record.analysis_type, "readiness");
        assert_eq!(record.sd2_ms, Some(66.0));
        assert!(record.is_extended());
    }
}
