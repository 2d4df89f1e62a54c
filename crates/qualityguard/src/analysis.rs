//! Anomaly and prediction results, and the local fallback rule.
//!
//! The measurement service's `/ml/predict` endpoint answers with an
//! [`AnalysisResult`]. When it cannot be reached, [`local_analysis`] produces
//! the same shape from two fixed rules.

use serde::{Deserialize, Deserializer, Serialize};

use crate::alerts::Severity;
use crate::measurement::{Measurement, CPK_MARGINAL};

/// Deviation above which an anomaly is rated HIGH.
pub const HIGH_DEVIATION_PERCENT: f64 = 10.0;

/// Deviation above which an anomaly is rated MEDIUM.
pub const MEDIUM_DEVIATION_PERCENT: f64 = 5.0;

/// Confidence attached to locally derived capability predictions.
pub const LOCAL_PREDICTION_CONFIDENCE: f64 = 85.0;

/// Prediction type emitted for processes with cpk below 1.0.
pub const PROCESS_CAPABILITY: &str = "process_capability";

/// Message emitted for processes with cpk below 1.0.
pub const PROCESS_NOT_CAPABLE_MESSAGE: &str = "Process not capable - risk of nonconformity";

/// A parameter whose value deviates noticeably from nominal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Parameter name or characteristic id.
    pub parameter: String,
    /// Severity assigned by the detector.
    pub severity: Severity,
    /// Deviation from nominal in percent.
    #[serde(deserialize_with = "deserialize_percent")]
    pub deviation: f64,
}

/// A forward-looking statement about a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    /// Prediction type, e.g. `process_capability`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Parameter the prediction is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Human-readable prediction.
    #[serde(alias = "prediction")]
    pub message: String,
    /// Confidence in percent, 0 to 100.
    pub confidence: f64,
    /// What the prediction is based on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<String>,
}

/// Combined output of an analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    /// Detected anomalies.
    pub anomalies: Vec<AnomalyResult>,
    /// Predictions.
    pub predictions: Vec<PredictionResult>,
    /// Free-form recommendations.
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Whether the analysis found nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty() && self.predictions.is_empty() && self.recommendations.is_empty()
    }
}

/// Bucket a deviation percentage into an anomaly severity.
///
/// `> 10` is HIGH, `> 5` is MEDIUM, anything else is not an anomaly.
#[must_use]
pub fn deviation_severity(deviation_percent: f64) -> Option<Severity> {
    if deviation_percent > HIGH_DEVIATION_PERCENT {
        Some(Severity::High)
    } else if deviation_percent > MEDIUM_DEVIATION_PERCENT {
        Some(Severity::Medium)
    } else {
        None
    }
}

/// Deterministic analysis used when the service is unavailable.
///
/// The deviation rule and the capability rule are independent; both can
/// fire for the same measurement. Measurements with a zero nominal skip the
/// deviation rule.
#[must_use]
pub fn local_analysis(measurements: &[Measurement]) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    for m in measurements {
        if let Some(deviation) = m.deviation_percent() {
            if let Some(severity) = deviation_severity(deviation) {
                result.anomalies.push(AnomalyResult {
                    parameter: m.parameter.clone(),
                    severity,
                    deviation,
                });
            }
        }

        if m.cpk < CPK_MARGINAL {
            result.predictions.push(PredictionResult {
                kind: PROCESS_CAPABILITY.to_string(),
                parameter: Some(m.parameter.clone()),
                message: PROCESS_NOT_CAPABLE_MESSAGE.to_string(),
                confidence: LOCAL_PREDICTION_CONFIDENCE,
                based_on: None,
            });
        }
    }

    result
}

/// Accept `9.1`, `"9.10"` and `"9.1%"` for a percentage.
fn deserialize_percent<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Percent {
        Number(f64),
        Text(String),
    }

    match Percent::deserialize(deserializer)? {
        Percent::Number(n) => Ok(n),
        Percent::Text(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid percentage: {s}"))),
    }
}
