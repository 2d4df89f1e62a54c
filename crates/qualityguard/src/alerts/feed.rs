use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::{Alert, AlertId, AlertKind, NotificationPermission, Notifier, RawAlert, Severity};
use super::{SeverityFilter, SilentNotifier};
use crate::analysis::AnalysisResult;
use crate::config::AlertConfig;

/// Number of alerts kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 20;

/// Predictions at or below this confidence never become alerts.
pub const DEFAULT_PREDICTION_THRESHOLD: f64 = 80.0;

/// A capped, most-recent-first log of alerts.
///
/// Entries leave the feed only through [`AlertFeed::dismiss`] or by being
/// evicted once the feed holds more than its capacity.
#[derive(Debug)]
pub struct AlertFeed {
    entries: VecDeque<Alert>,
    capacity: usize,
    prediction_threshold: f64,
    next_id: u64,
    notifier: Arc<dyn Notifier>,
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self::new(Arc::new(SilentNotifier))
    }
}

impl AlertFeed {
    /// Create a feed with default capacity and threshold.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            entries: VecDeque::with_capacity(DEFAULT_CAPACITY + 1),
            capacity: DEFAULT_CAPACITY,
            prediction_threshold: DEFAULT_PREDICTION_THRESHOLD,
            next_id: 1,
            notifier,
        }
    }

    /// Create a feed configured from [`AlertConfig`].
    #[must_use]
    pub fn from_config(config: &AlertConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            capacity: config.capacity.max(1),
            prediction_threshold: config.prediction_confidence_threshold,
            ..Self::new(notifier)
        }
    }

    /// Add an alert at the front of the feed.
    ///
    /// Critical alerts ring the audible notification. When the host has
    /// granted permission, a visual notification with the alert's message
    /// is shown as well. Side-effect failures are logged and ignored.
    pub fn push(&mut self, raw: RawAlert) -> AlertId {
        let id = AlertId(self.next_id);
        self.next_id += 1;

        let alert = Alert {
            id,
            created_at: Utc::now(),
            severity: raw.severity,
            title: raw.title,
            message: raw.message,
            kind: raw.kind,
            prediction: raw.prediction,
            suggested_actions: raw.suggested_actions,
        };
        debug!(id = %id, severity = %alert.severity, "Alert pushed");

        if alert.severity == Severity::Critical {
            if let Err(e) = self.notifier.play_sound() {
                warn!("Failed to play alert sound: {}", e);
            }
        }
        if self.notifier.permission() == NotificationPermission::Granted {
            if let Err(e) = self.notifier.show(&alert.message) {
                warn!("Failed to show notification: {}", e);
            }
        }

        self.entries.push_front(alert);
        self.entries.truncate(self.capacity);
        id
    }

    /// Remove the alert with the given id. Returns whether it was present.
    pub fn dismiss(&mut self, id: AlertId) -> bool {
        match self.entries.iter().position(|a| a.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Alerts passing the filter, most recent first.
    #[must_use]
    pub fn filter(&self, filter: SeverityFilter) -> Vec<&Alert> {
        self.entries.iter().filter(|a| filter.matches(a)).collect()
    }

    /// All alerts, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter()
    }

    /// Look up an alert by id.
    #[must_use]
    pub fn get(&self, id: AlertId) -> Option<&Alert> {
        self.entries.iter().find(|a| a.id == id)
    }

    /// Number of alerts in the feed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the feed holds no alerts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of alerts retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Turn an analysis result into alerts.
    ///
    /// Every anomaly becomes an alert with its own severity. Predictions
    /// become MEDIUM alerts only when their confidence is strictly above the
    /// threshold; the rest are dropped.
    pub fn ingest_analysis(&mut self, analysis: &AnalysisResult) -> Vec<AlertId> {
        let mut ids = Vec::new();

        for anomaly in &analysis.anomalies {
            let mut raw = RawAlert::new(
                anomaly.severity,
                "Anomaly detected",
                format!(
                    "{}: deviation of {:.2}%",
                    anomaly.parameter, anomaly.deviation
                ),
            );
            raw.kind = AlertKind::Anomaly;
            ids.push(self.push(raw));
        }

        for prediction in &analysis.predictions {
            if prediction.confidence <= self.prediction_threshold {
                debug!(
                    confidence = prediction.confidence,
                    "Suppressing low-confidence prediction"
                );
                continue;
            }
            let mut raw = RawAlert::new(Severity::Medium, "ML prediction", &prediction.message);
            raw.kind = AlertKind::Prediction;
            raw.prediction = Some(prediction.clone());
            ids.push(self.push(raw));
        }

        ids
    }
}
