//! A live inspection session.
//!
//! [`Dashboard`] owns the state a quality engineer looks at: the current
//! batch of measurements, which of them were exported, the historical
//! summary, and the alert feed. It keeps that state current from the push
//! channel, the periodic refresh tick, and explicit user actions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertFeed, AlertId, RawAlert, SeverityFilter};
use crate::config::DashboardConfig;
use crate::measurement::{BatchMetadata, Measurement, MeasurementBatch, SaveAck};
use crate::scheduler::{RefreshScheduler, SchedulerHandle};
use crate::sync::{
    EventKind, Historical, HistoricalQuery, RequestSequencer, Subscription, SyncClient, SyncState,
    HISTORICAL_DATASET,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Deserialize)]
struct MeasurementUpdate {
    #[serde(default)]
    measurements: Option<Vec<Measurement>>,
}

/// State of one inspection session.
#[derive(Debug)]
pub struct Dashboard {
    client: Arc<SyncClient>,
    feed: Arc<Mutex<AlertFeed>>,
    measurements: Arc<Mutex<Vec<Measurement>>>,
    metadata: Mutex<BatchMetadata>,
    exported: Mutex<HashSet<String>>,
    historical: Mutex<Option<Historical>>,
    sequencer: RequestSequencer,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    defaults: DashboardConfig,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Dashboard {
    /// Create a session over a shared client.
    #[must_use]
    pub fn new(client: Arc<SyncClient>, feed: AlertFeed, defaults: DashboardConfig) -> Self {
        Self {
            client,
            feed: Arc::new(Mutex::new(feed)),
            measurements: Arc::new(Mutex::new(Vec::new())),
            metadata: Mutex::new(BatchMetadata::default()),
            exported: Mutex::new(HashSet::new()),
            historical: Mutex::new(None),
            sequencer: RequestSequencer::new(),
            last_sync: Mutex::new(None),
            defaults,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Replace the current batch. Export marks are cleared.
    pub fn load_batch(&self, measurements: Vec<Measurement>, metadata: BatchMetadata) {
        *lock(&self.measurements) = measurements;
        *lock(&self.metadata) = metadata;
        lock(&self.exported).clear();
    }

    /// Bring the session up.
    ///
    /// Subscribes to live events, connects, loads the historical summary
    /// with the configured defaults, then analyses the current batch and
    /// feeds the result into the alert feed. Returns whether the service
    /// was reachable.
    pub async fn start(&self) -> bool {
        self.subscribe();

        let connected = self.client.connect().await;
        info!(state = %self.client.state(), "Dashboard starting");

        let range = self.defaults.date_range.clone();
        self.refresh_historical(&range).await;
        self.analyze().await;

        connected
    }

    fn subscribe(&self) {
        let mut subscriptions = lock(&self.subscriptions);
        if !subscriptions.is_empty() {
            return;
        }

        let feed = Arc::clone(&self.feed);
        subscriptions.push(self.client.on(EventKind::Alert, move |payload| {
            match serde_json::from_value::<RawAlert>(payload.clone()) {
                Ok(raw) => {
                    lock(&feed).push(raw);
                }
                Err(e) => warn!("Ignoring malformed alert: {}", e),
            }
        }));

        let measurements = Arc::clone(&self.measurements);
        subscriptions.push(self.client.on(EventKind::Measurement, move |payload| {
            match serde_json::from_value::<MeasurementUpdate>(payload.clone()) {
                Ok(MeasurementUpdate {
                    measurements: Some(update),
                }) => {
                    debug!("Received {} measurements", update.len());
                    *lock(&measurements) = update;
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring malformed measurement update: {}", e),
            }
        }));

        subscriptions.push(self.client.on(EventKind::Connection, |payload: &Value| {
            let status = payload.get("status").and_then(Value::as_str);
            info!("Connection status: {}", status.unwrap_or("unknown"));
        }));
    }

    /// Run analysis on the current batch and raise the resulting alerts.
    ///
    /// Returns the ids of the alerts raised.
    pub async fn analyze(&self) -> Vec<AlertId> {
        let measurements = self.measurements();
        if measurements.is_empty() {
            return Vec::new();
        }
        let analysis = self.client.run_analysis(&measurements).await;
        lock(&self.feed).ingest_analysis(&analysis)
    }

    /// Reload the historical summary for `date_range`.
    ///
    /// When several reloads overlap, only the most recently started one is
    /// applied. A reload that finds no data, remote or cached, leaves the
    /// current summary in place. Returns whether this call's result was
    /// applied.
    pub async fn refresh_historical(&self, date_range: &str) -> bool {
        let ticket = self.sequencer.issue(HISTORICAL_DATASET);
        let query = HistoricalQuery::new(date_range, self.defaults.product_type.clone());
        let result = self.client.fetch_historical(&query).await;

        if !self.sequencer.is_current(&ticket) {
            debug!(seq = ticket.seq(), "Discarding stale historical response");
            return false;
        }
        let Some(historical) = result else {
            debug!(range = date_range, "No historical data, keeping current summary");
            return false;
        };
        *lock(&self.historical) = Some(historical);
        true
    }

    /// Save measurements from the current batch.
    ///
    /// An empty `selection` exports the whole batch; otherwise only the
    /// listed ids. Exported measurements are remembered when the save is
    /// acknowledged, including when it was queued offline.
    pub async fn export(&self, selection: &[String]) -> SaveAck {
        let chosen: Vec<Measurement> = self
            .measurements()
            .into_iter()
            .filter(|m| selection.is_empty() || selection.contains(&m.id))
            .collect();
        let batch = MeasurementBatch::new(chosen, lock(&self.metadata).clone());

        let ack = self.client.persist(&batch).await;
        if ack.success {
            lock(&self.exported).extend(batch.ids().map(str::to_string));
            info!(
                count = batch.measurements.len(),
                offline = ack.offline,
                "Measurements exported"
            );
        }
        ack
    }

    /// One refresh tick: record the sync time and, while offline, try to
    /// reconnect (which replays the offline queue).
    pub async fn tick(&self) {
        *lock(&self.last_sync) = Some(Utc::now());
        if self.client.state() == SyncState::Offline {
            self.client.connect().await;
        }
    }

    /// Run [`tick`](Self::tick) every `interval` until the handle is shut down.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> SchedulerHandle {
        let dashboard = Arc::clone(self);
        RefreshScheduler::spawn(interval, move || {
            let dashboard = Arc::clone(&dashboard);
            async move { dashboard.tick().await }
        })
    }

    /// Drop live subscriptions and close the push channel.
    pub fn stop(&self) {
        lock(&self.subscriptions).clear();
        self.client.disconnect();
    }

    /// Whether measurement `id` has been exported.
    #[must_use]
    pub fn is_exported(&self, id: &str) -> bool {
        lock(&self.exported).contains(id)
    }

    /// Number of measurements in the batch not yet exported.
    #[must_use]
    pub fn pending_exports(&self) -> usize {
        let exported = lock(&self.exported);
        lock(&self.measurements)
            .iter()
            .filter(|m| !exported.contains(&m.id))
            .count()
    }

    /// Snapshot of the current batch.
    #[must_use]
    pub fn measurements(&self) -> Vec<Measurement> {
        lock(&self.measurements).clone()
    }

    /// The applied historical summary, if any.
    #[must_use]
    pub fn historical(&self) -> Option<Historical> {
        lock(&self.historical).clone()
    }

    /// Time of the last refresh tick.
    #[must_use]
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_sync)
    }

    /// Alerts passing `filter`, most recent first.
    #[must_use]
    pub fn alerts(&self, filter: SeverityFilter) -> Vec<Alert> {
        lock(&self.feed).filter(filter).into_iter().cloned().collect()
    }

    /// Alerts with an id greater than `after`, oldest first.
    #[must_use]
    pub fn alerts_since(&self, after: Option<AlertId>) -> Vec<Alert> {
        let feed = lock(&self.feed);
        let mut fresh: Vec<Alert> = feed
            .iter()
            .filter(|a| after.map_or(true, |after| a.id > after))
            .cloned()
            .collect();
        fresh.reverse();
        fresh
    }

    /// Dismiss an alert. Returns whether it was present.
    pub fn dismiss(&self, id: AlertId) -> bool {
        lock(&self.feed).dismiss(id)
    }

    /// Connectivity of the underlying client.
    #[must_use]
    pub fn connection(&self) -> SyncState {
        self.client.state()
    }
}
