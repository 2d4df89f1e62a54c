//! Alert types and the bounded alert feed.

mod feed;
mod notifier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::PredictionResult;

pub use feed::{AlertFeed, DEFAULT_CAPACITY, DEFAULT_PREDICTION_THRESHOLD};
pub use notifier::{DesktopNotifier, NotificationPermission, Notifier, SilentNotifier};

#[cfg(test)]
pub(crate) use notifier::testing;

/// Alert severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Needs immediate attention; rings the bell.
    Critical,
    /// Strong deviation.
    High,
    /// Moderate deviation or a confident prediction.
    Medium,
    /// Informational.
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Where an alert came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Derived from an anomaly.
    Anomaly,
    /// Derived from a prediction.
    Prediction,
    /// Received from the push channel.
    #[default]
    Push,
}

/// An alert before the feed assigns it an id and timestamp.
///
/// This is also the payload shape of `alert` push messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    /// Severity.
    pub severity: Severity,
    /// Short title.
    #[serde(default)]
    pub title: String,
    /// Message body.
    #[serde(default)]
    pub message: String,
    /// Origin of the alert.
    #[serde(rename = "type", default)]
    pub kind: AlertKind,
    /// Prediction that raised the alert.
    #[serde(default, alias = "predictions", skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResult>,
    /// Actions suggested to the operator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

impl RawAlert {
    /// Create an alert with a severity, title and message.
    #[must_use]
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
            kind: AlertKind::Push,
            prediction: None,
            suggested_actions: Vec::new(),
        }
    }
}

/// Identifier assigned by the feed. Strictly increasing per feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlertId(pub u64);

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An alert held in the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Feed-assigned identifier.
    pub id: AlertId,
    /// When the feed received the alert.
    pub created_at: DateTime<Utc>,
    /// Severity.
    pub severity: Severity,
    /// Short title.
    pub title: String,
    /// Message body.
    pub message: String,
    /// Origin of the alert.
    pub kind: AlertKind,
    /// Prediction that raised the alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResult>,
    /// Actions suggested to the operator.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

/// Read-side selection over the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeverityFilter {
    /// Every alert.
    #[default]
    All,
    /// Only alerts of one severity.
    Only(Severity),
}

impl SeverityFilter {
    /// Whether an alert passes this filter.
    #[must_use]
    pub fn matches(&self, alert: &Alert) -> bool {
        match self {
            Self::All => true,
            Self::Only(severity) => alert.severity == *severity,
        }
    }
}

impl std::str::FromStr for SeverityFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}
