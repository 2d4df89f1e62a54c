//! The remote measurement service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::analysis::{AnalysisResult, AnomalyResult, PredictionResult};
use crate::config::Config;
use crate::error::Result;
use crate::measurement::{Measurement, MeasurementBatch, SaveAck};

/// Parameters of a historical query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalQuery {
    /// Look-back window such as `7d` or `30d`.
    pub date_range: String,
    /// Restrict to one product type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
}

impl HistoricalQuery {
    /// Query over `date_range` for an optional product type.
    #[must_use]
    pub fn new(date_range: impl Into<String>, product_type: Option<String>) -> Self {
        Self {
            date_range: date_range.into(),
            product_type,
        }
    }
}

/// One point of the historical control chart series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartSample {
    /// Position in the series.
    #[serde(default)]
    pub index: usize,
    /// Observed value.
    pub value: f64,
}

/// Aggregated history returned by the service.
///
/// Every field is optional. Fields this client does not know about are kept
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoricalData {
    /// Number of measurements in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_measurements: Option<u64>,
    /// Mean Cpk over the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_cpk: Option<f64>,
    /// Predictions derived from the history.
    pub predictions: Vec<PredictionResult>,
    /// Anomalies found in the history.
    pub anomalies: Vec<AnomalyResult>,
    /// Series for the control chart.
    pub control_chart_data: Vec<ChartSample>,
    /// Unrecognised fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoricalData {
    /// Values of the control chart series in order.
    #[must_use]
    pub fn chart_values(&self) -> Vec<f64> {
        self.control_chart_data.iter().map(|s| s.value).collect()
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    measurements: &'a [Measurement],
}

/// Operations offered by the measurement service.
///
/// Any error means the call failed; the sync client decides how to degrade.
#[async_trait]
pub trait MeasurementService: Send + Sync + std::fmt::Debug {
    /// Check that the service is healthy.
    async fn health(&self) -> Result<()>;

    /// Fetch historical data. The response body is returned verbatim so it
    /// can be cached as received.
    async fn historical(&self, query: &HistoricalQuery) -> Result<String>;

    /// Run the service-side predictive analysis.
    async fn predict(&self, measurements: &[Measurement]) -> Result<AnalysisResult>;

    /// Persist a batch.
    async fn save(&self, batch: &MeasurementBatch) -> Result<SaveAck>;
}

/// [`MeasurementService`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpMeasurementService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMeasurementService {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a client from the `[service]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.service.base_url, config.request_timeout())
    }

    /// Base URL all endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl MeasurementService for HttpMeasurementService {
    async fn health(&self) -> Result<()> {
        let url = self.endpoint("health");
        debug!("GET {}", url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn historical(&self, query: &HistoricalQuery) -> Result<String> {
        let url = self.endpoint("measurements/historical");
        debug!("POST {}", url);
        let body = self
            .client
            .post(&url)
            .json(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn predict(&self, measurements: &[Measurement]) -> Result<AnalysisResult> {
        let url = self.endpoint("ml/predict");
        debug!("POST {} ({} measurements)", url, measurements.len());
        let analysis = self
            .client
            .post(&url)
            .json(&PredictRequest { measurements })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(analysis)
    }

    async fn save(&self, batch: &MeasurementBatch) -> Result<SaveAck> {
        let url = self.endpoint("measurements/save");
        debug!("POST {} ({} measurements)", url, batch.measurements.len());
        let ack = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ack)
    }
}
