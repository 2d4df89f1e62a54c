//! Offline-resilient access to the measurement service.
//!
//! [`SyncClient`] fronts the remote service with a uniform async interface.
//! Reads fall back to the local cache, analysis falls back to the local
//! rules, and writes fall back to a durable queue that is replayed in order
//! once the service is reachable again. None of the fallback paths return
//! an error to the caller.

pub mod events;
pub mod push;
pub mod sequence;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub use events::{EventBus, EventKind, Subscription};
pub use push::{PushChannel, PushMessage, WebSocketPush, STATUS_CONNECTED, STATUS_OFFLINE};
pub use sequence::{RequestSequencer, Ticket};
pub use service::{
    ChartSample, HistoricalData, HistoricalQuery, HttpMeasurementService, MeasurementService,
};

use crate::analysis::{local_analysis, AnalysisResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::measurement::{Measurement, MeasurementBatch, SaveAck};
use crate::storage::{CacheKey, OperationKind, QueueEntry, Storage, StorageStats};

/// Cache dataset name for historical queries.
pub const HISTORICAL_DATASET: &str = "historical";

/// Connectivity as last observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No health check has completed yet.
    Connecting,
    /// The last health check succeeded.
    Connected,
    /// The last health check failed or the push channel broke.
    Offline,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Where a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Fresh from the service.
    Remote,
    /// Read from the local cache.
    Cache,
}

/// A historical payload with its raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct Historical {
    /// Parsed payload.
    pub data: HistoricalData,
    /// Body exactly as received from the service.
    pub raw: String,
    /// Whether the payload was fetched or read from cache.
    pub source: DataSource,
    /// When the payload was stored locally, for cached payloads.
    pub cached_at: Option<DateTime<Utc>>,
}

/// Outcome of replaying the offline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries sent to the service.
    pub attempted: usize,
    /// Entries the service accepted and that left the queue.
    pub delivered: usize,
    /// Entries still queued afterwards.
    pub retained: usize,
    /// Entries dropped because their payload could not be decoded.
    pub discarded: usize,
}

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current connectivity.
    pub state: SyncState,
    /// Local store counters.
    pub storage: StorageStats,
}

/// Typed view of a historical body.
///
/// Bodies the model does not cover yield an empty summary; the raw text is
/// still kept and served by the caller.
fn parse_historical(raw: &str) -> HistoricalData {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Historical data has an unexpected shape, keeping raw body only: {}", e);
        HistoricalData::default()
    })
}

/// Client for the measurement service with local fallbacks.
///
/// Construct one per process and share it behind an [`Arc`].
#[derive(Debug)]
pub struct SyncClient {
    service: Arc<dyn MeasurementService>,
    store: Mutex<Storage>,
    push: Option<Arc<dyn PushChannel>>,
    state: Arc<Mutex<SyncState>>,
    events: EventBus,
    draining: AtomicBool,
    _connection_watch: Subscription,
}

impl SyncClient {
    /// Create a client over `service` and `store` without a push channel.
    #[must_use]
    pub fn new(service: Arc<dyn MeasurementService>, store: Storage) -> Self {
        let events = EventBus::new();
        let state = Arc::new(Mutex::new(SyncState::Connecting));

        // A broken push channel means the service is gone too.
        let watched = Arc::clone(&state);
        let connection_watch = events.on(EventKind::Connection, move |payload: &Value| {
            if payload.get("status").and_then(Value::as_str) == Some(STATUS_OFFLINE) {
                *watched.lock().unwrap_or_else(PoisonError::into_inner) = SyncState::Offline;
            }
        });

        Self {
            service,
            store: Mutex::new(store),
            push: None,
            state,
            events,
            draining: AtomicBool::new(false),
            _connection_watch: connection_watch,
        }
    }

    /// Attach a push channel, opened on every successful [`connect`](Self::connect).
    #[must_use]
    pub fn with_push(mut self, push: Arc<dyn PushChannel>) -> Self {
        self.push = Some(push);
        self
    }

    /// Build a client from configuration: HTTP service, `SQLite` store at
    /// the configured path, and a WebSocket push channel when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let service = HttpMeasurementService::from_config(config)?;
        let store = Storage::open(config.database_path())?;
        let client = Self::new(Arc::new(service), store);

        Ok(if config.service.push_enabled {
            client.with_push(Arc::new(WebSocketPush::new(
                &config.service.push_url,
                config.request_timeout(),
            )))
        } else {
            client
        })
    }

    /// Current connectivity.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SyncState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *current;
        if previous != state {
            debug!(from = %previous, to = %state, "Sync state changed");
            *current = state;
        }
    }

    fn is_offline(&self) -> bool {
        self.state() == SyncState::Offline
    }

    fn with_store<T>(&self, op: impl FnOnce(&Storage) -> Result<T>) -> Result<T> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        op(&store)
    }

    /// Check the service health and, if reachable, open the push channel and
    /// replay the offline queue.
    ///
    /// Returns whether the service was reachable. Never fails.
    pub async fn connect(&self) -> bool {
        self.connect_and_drain().await.is_some()
    }

    /// Like [`connect`](Self::connect), returning the replay outcome when
    /// the service was reachable.
    pub async fn connect_and_drain(&self) -> Option<DrainReport> {
        if let Err(e) = self.service.health().await {
            warn!("Measurement service unavailable, working offline: {}", e);
            self.set_state(SyncState::Offline);
            return None;
        }

        info!("Measurement service reachable");
        self.set_state(SyncState::Connected);

        if let Some(push) = &self.push {
            if let Err(e) = push.open(self.events.clone()).await {
                warn!("Live updates unavailable: {}", e);
            }
        }

        Some(self.drain_queue().await)
    }

    /// Close the push channel, if open.
    pub fn disconnect(&self) {
        if let Some(push) = &self.push {
            push.close();
        }
    }

    /// Fetch historical data for `query`.
    ///
    /// Online, the service is asked first and a successful answer is cached
    /// before it is returned. Offline, or when the call fails, the last
    /// cached answer for the same query is returned. `None` means there is
    /// neither.
    pub async fn fetch_historical(&self, query: &HistoricalQuery) -> Option<Historical> {
        let key = match CacheKey::new(HISTORICAL_DATASET, query) {
            Ok(key) => key,
            Err(e) => {
                error!("Cannot build cache key for historical query: {}", e);
                return None;
            }
        };

        if !self.is_offline() {
            match self.service.historical(query).await {
                Ok(raw) => {
                    // Cache the body as received, whatever its shape.
                    if let Err(e) = self.with_store(|s| s.cache_put(&key, &raw)) {
                        error!("Failed to cache historical data: {}", e);
                    }
                    return Some(Historical {
                        data: parse_historical(&raw),
                        raw,
                        source: DataSource::Remote,
                        cached_at: None,
                    });
                }
                Err(e) => warn!("Historical query failed, using cached data: {}", e),
            }
        }

        self.cached_historical(&key)
    }

    fn cached_historical(&self, key: &CacheKey) -> Option<Historical> {
        let entry = match self.with_store(|s| s.cache_get(key)) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(key = %key, "No cached data");
                return None;
            }
            Err(e) => {
                error!("Failed to read cache: {}", e);
                return None;
            }
        };

        Some(Historical {
            data: parse_historical(&entry.data),
            raw: entry.data,
            source: DataSource::Cache,
            cached_at: Some(entry.stored_at),
        })
    }

    /// Analyse measurements, remotely when possible and locally otherwise.
    pub async fn run_analysis(&self, measurements: &[Measurement]) -> AnalysisResult {
        if !self.is_offline() {
            match self.service.predict(measurements).await {
                Ok(analysis) => return analysis,
                Err(e) => warn!("Remote analysis failed, using local rules: {}", e),
            }
        }
        local_analysis(measurements)
    }

    /// Save a batch.
    ///
    /// Online, the service's acknowledgement is returned as is. If the
    /// service cannot be reached the batch is queued and `{success: true,
    /// offline: true}` is returned. While offline the batch is additionally
    /// kept in the local batch log.
    pub async fn persist(&self, batch: &MeasurementBatch) -> SaveAck {
        if self.is_offline() {
            self.queue_batch(batch, true);
            return SaveAck::queued();
        }

        match self.service.save(batch).await {
            Ok(ack) => return ack,
            Err(e) => warn!("Save failed, queueing batch for replay: {}", e),
        }
        self.queue_batch(batch, false);
        SaveAck::queued()
    }

    fn queue_batch(&self, batch: &MeasurementBatch, keep_local_copy: bool) {
        let result = serde_json::to_string(batch)
            .map_err(Error::from)
            .and_then(|payload| {
                self.with_store(|s| {
                    let id = s.enqueue(OperationKind::Save, &payload)?;
                    if keep_local_copy {
                        s.store_local_batch(id, &payload)?;
                    }
                    Ok(id)
                })
            });

        match result {
            Ok(id) => info!(
                queue_id = id,
                batch = %batch.metadata.batch_id,
                "Batch queued for replay"
            ),
            Err(e) => error!(
                batch = %batch.metadata.batch_id,
                "Failed to queue batch locally: {}", e
            ),
        }
    }

    /// Replay queued writes in the order they were made.
    ///
    /// An entry leaves the queue only once the service accepts it. Replay
    /// stops at the first failure, leaving that entry and every later one
    /// queued. While another replay is running this one attempts nothing
    /// and reports the whole queue as retained.
    pub async fn drain_queue(&self) -> DrainReport {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("Queue replay already running");
            let retained = self
                .with_store(Storage::queue_len)
                .map_or(0, |n| usize::try_from(n).unwrap_or(0));
            return DrainReport {
                retained,
                ..DrainReport::default()
            };
        }
        let report = self.replay_entries().await;
        self.draining.store(false, Ordering::SeqCst);
        report
    }

    async fn replay_entries(&self) -> DrainReport {
        let entries = match self.with_store(Storage::queue_entries) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to read offline queue: {}", e);
                return DrainReport::default();
            }
        };

        let mut report = DrainReport {
            retained: entries.len(),
            ..DrainReport::default()
        };
        if entries.is_empty() {
            return report;
        }
        info!("Replaying {} queued writes", entries.len());

        for entry in entries {
            let batch: MeasurementBatch = match serde_json::from_str(&entry.payload) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(queue_id = entry.id, "Discarding undecodable queued write: {}", e);
                    self.complete_entry(&entry);
                    report.discarded += 1;
                    report.retained -= 1;
                    continue;
                }
            };

            report.attempted += 1;
            match self.replay(&entry, &batch).await {
                Ok(()) => {
                    self.complete_entry(&entry);
                    report.delivered += 1;
                    report.retained -= 1;
                }
                Err(e) => {
                    warn!(
                        queue_id = entry.id,
                        "Replay stopped, {} writes stay queued: {}", report.retained, e
                    );
                    break;
                }
            }
        }

        info!(
            delivered = report.delivered,
            retained = report.retained,
            "Queue replay finished"
        );
        report
    }

    async fn replay(&self, entry: &QueueEntry, batch: &MeasurementBatch) -> Result<()> {
        match entry.kind {
            OperationKind::Save => {
                let ack = self.service.save(batch).await?;
                if ack.success {
                    Ok(())
                } else {
                    Err(Error::Rejected {
                        operation: format!("queued save {}", entry.id),
                    })
                }
            }
        }
    }

    fn complete_entry(&self, entry: &QueueEntry) {
        let result = self.with_store(|s| {
            s.remove_queue_entry(entry.id)?;
            s.mark_batch_synced(entry.id)
        });
        if let Err(e) = result {
            error!(queue_id = entry.id, "Failed to update offline queue: {}", e);
        }
    }

    /// Queued writes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read.
    pub fn queued(&self) -> Result<Vec<QueueEntry>> {
        self.with_store(Storage::queue_entries)
    }

    /// Connectivity and local store counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read.
    pub fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            state: self.state(),
            storage: self.with_store(Storage::stats)?,
        })
    }

    /// Register an event handler. See [`EventBus::on`].
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    /// Deliver an event to its handlers. Returns how many ran.
    pub fn emit(&self, kind: &EventKind, payload: &Value) -> usize {
        self.events.emit(kind, payload)
    }

    /// The client's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{batch, FakeService};
    use super::*;
    use crate::alerts::Severity;
    use crate::analysis::{AnomalyResult, PROCESS_CAPABILITY};
    use crate::measurement::fixtures::qg1_report;
    use serde_json::json;
    use std::time::Duration;

    fn client(service: &Arc<FakeService>) -> SyncClient {
        let service: Arc<dyn MeasurementService> = Arc::clone(service) as _;
        SyncClient::new(service, Storage::open_in_memory().unwrap())
    }

    fn queue_len(client: &SyncClient) -> usize {
        client.queued().unwrap().len()
    }

    #[tokio::test]
    async fn test_initial_state_is_connecting() {
        let service = Arc::new(FakeService::online());
        assert_eq!(client(&service).state(), SyncState::Connecting);
    }

    #[tokio::test]
    async fn test_connect_reachable() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        assert!(client.connect().await);
        assert_eq!(client.state(), SyncState::Connected);
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        assert!(!client.connect().await);
        assert_eq!(client.state(), SyncState::Offline);
    }

    #[tokio::test]
    async fn test_offline_persist_queues_exactly_once() {
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        client.connect().await;

        let ack = client.persist(&batch("B-1")).await;
        assert_eq!(
            ack,
            SaveAck {
                success: true,
                offline: true
            }
        );
        assert_eq!(queue_len(&client), 1);

        let stats = client.status().unwrap().storage;
        assert_eq!(stats.local_batches, 1);
        assert_eq!(stats.unsynced_batches, 1);
        assert!(service.saved_batch_ids().is_empty());
    }

    #[tokio::test]
    async fn test_persist_online_returns_service_ack() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        client.connect().await;

        let ack = client.persist(&batch("B-1")).await;
        assert!(ack.success);
        assert!(!ack.offline);
        assert_eq!(service.saved_batch_ids(), vec!["B-1"]);
        assert_eq!(queue_len(&client), 0);
    }

    #[tokio::test]
    async fn test_persist_remote_failure_queues() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        client.connect().await;
        service.reject_batch("B-1");

        let ack = client.persist(&batch("B-1")).await;
        assert_eq!(ack, SaveAck::queued());
        assert_eq!(queue_len(&client), 1);
        // Only offline saves are kept in the local batch log.
        assert_eq!(client.status().unwrap().storage.local_batches, 0);
    }

    #[tokio::test]
    async fn test_reconnect_replays_in_order() {
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        client.connect().await;

        for id in ["B-1", "B-2", "B-3"] {
            client.persist(&batch(id)).await;
        }
        assert_eq!(queue_len(&client), 3);

        service.set_reachable(true);
        let report = client.connect_and_drain().await.unwrap();

        assert_eq!(
            report,
            DrainReport {
                attempted: 3,
                delivered: 3,
                retained: 0,
                discarded: 0
            }
        );
        assert_eq!(service.saved_batch_ids(), vec!["B-1", "B-2", "B-3"]);
        assert_eq!(queue_len(&client), 0);
        assert_eq!(client.status().unwrap().storage.unsynced_batches, 0);
    }

    #[tokio::test]
    async fn test_replay_failure_retains_failed_and_later_entries() {
        crate::logging::init_test_logging();
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        client.connect().await;
        for id in ["B-1", "B-2", "B-3"] {
            client.persist(&batch(id)).await;
        }

        service.set_reachable(true);
        service.reject_batch("B-2");
        let report = client.connect_and_drain().await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.retained, 2);
        assert_eq!(service.saved_batch_ids(), vec!["B-1"]);

        let remaining: Vec<MeasurementBatch> = client
            .queued()
            .unwrap()
            .iter()
            .map(|e| serde_json::from_str(&e.payload).unwrap())
            .collect();
        let ids: Vec<&str> = remaining
            .iter()
            .map(|b| b.metadata.batch_id.as_str())
            .collect();
        assert_eq!(ids, vec!["B-2", "B-3"]);

        service.accept_all();
        let report = client.drain_queue().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(service.saved_batch_ids(), vec!["B-1", "B-2", "B-3"]);
    }

    #[tokio::test]
    async fn test_concurrent_drains_deliver_each_entry_once() {
        let service = Arc::new(FakeService::online());
        service.delay_saves(Duration::from_millis(30));
        let client = client(&service);
        client
            .with_store(|s| {
                for id in ["B-1", "B-2"] {
                    s.enqueue(OperationKind::Save, &serde_json::to_string(&batch(id))?)?;
                }
                Ok(())
            })
            .unwrap();

        let (first, second) = tokio::join!(client.drain_queue(), client.drain_queue());

        assert_eq!(first.delivered, 2);
        assert_eq!(second.attempted, 0);
        assert_eq!(second.delivered, 0);
        assert_eq!(second.retained, 2);
        assert_eq!(service.saved_batch_ids(), vec!["B-1", "B-2"]);
        assert_eq!(queue_len(&client), 0);

        // The guard is released once the first replay finishes.
        assert_eq!(client.drain_queue().await, DrainReport::default());
    }

    #[tokio::test]
    async fn test_undecodable_queue_entry_is_discarded() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        let valid = serde_json::to_string(&batch("B-1")).unwrap();
        client
            .with_store(|s| {
                s.enqueue(OperationKind::Save, "{broken")?;
                s.enqueue(OperationKind::Save, &valid)
            })
            .unwrap();

        let report = client.drain_queue().await;
        assert_eq!(report.discarded, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.retained, 0);
        assert_eq!(queue_len(&client), 0);
        assert_eq!(service.saved_batch_ids(), vec!["B-1"]);
    }

    #[tokio::test]
    async fn test_cache_round_trip_offline() {
        let body = r#"{"totalMeasurements":487293,"avgCpk":1.35,"controlChartData":[{"index":0,"value":25.01}]}"#;
        let service = Arc::new(FakeService::online());
        service.set_historical(body);
        let client = client(&service);
        client.connect().await;

        let query = HistoricalQuery::new("7d", Some("X".to_string()));
        let fresh = client.fetch_historical(&query).await.unwrap();
        assert_eq!(fresh.source, DataSource::Remote);
        assert_eq!(fresh.raw, body);

        service.set_reachable(false);
        client.connect().await;
        let cached = client.fetch_historical(&query).await.unwrap();
        assert_eq!(cached.source, DataSource::Cache);
        assert_eq!(cached.raw, body);
        assert_eq!(cached.data, fresh.data);
        assert!(cached.cached_at.is_some());
    }

    #[tokio::test]
    async fn test_offline_fetch_does_not_call_service() {
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        client.connect().await;

        let query = HistoricalQuery::new("30d", None);
        assert!(client.fetch_historical(&query).await.is_none());
        assert_eq!(service.historical_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_cache_on_failure() {
        crate::logging::init_test_logging();
        let service = Arc::new(FakeService::online());
        service.set_historical(r#"{"avgCpk":1.4}"#);
        let client = client(&service);

        let query = HistoricalQuery::new("7d", None);
        client.fetch_historical(&query).await.unwrap();

        // The service is down but the client has not noticed yet.
        service.set_reachable(false);
        let fallback = client.fetch_historical(&query).await.unwrap();
        assert_eq!(fallback.source, DataSource::Cache);
        assert_eq!(fallback.data.avg_cpk, Some(1.4));
        assert_eq!(service.historical_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_is_per_query() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        client
            .fetch_historical(&HistoricalQuery::new("7d", None))
            .await
            .unwrap();

        service.set_reachable(false);
        client.connect().await;
        assert!(client
            .fetch_historical(&HistoricalQuery::new("30d", None))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_unmodelled_historical_body_is_cached_and_returned() {
        crate::logging::init_test_logging();
        let body = r#"{"totalMeasurements":10,"predictions":[{"parameter":"p","confidence":90,"timeframe":"3 shifts"}]}"#;
        let service = Arc::new(FakeService::online());
        service.set_historical(body);
        let client = client(&service);
        client.connect().await;

        let query = HistoricalQuery::new("7d", None);
        let fresh = client.fetch_historical(&query).await.unwrap();
        assert_eq!(fresh.source, DataSource::Remote);
        assert_eq!(fresh.raw, body);
        assert_eq!(fresh.data, HistoricalData::default());
        assert_eq!(client.status().unwrap().storage.cached_entries, 1);

        service.set_reachable(false);
        client.connect().await;
        let cached = client.fetch_historical(&query).await.unwrap();
        assert_eq!(cached.source, DataSource::Cache);
        assert_eq!(cached.raw, body);
    }

    #[tokio::test]
    async fn test_analysis_prefers_remote() {
        let service = Arc::new(FakeService::online());
        service.set_analysis(AnalysisResult {
            anomalies: vec![AnomalyResult {
                parameter: "remote".to_string(),
                severity: Severity::Low,
                deviation: 1.0,
            }],
            ..AnalysisResult::default()
        });
        let client = client(&service);
        client.connect().await;

        let analysis = client.run_analysis(&qg1_report()).await;
        assert_eq!(analysis.anomalies[0].parameter, "remote");
    }

    #[tokio::test]
    async fn test_analysis_offline_uses_local_rules() {
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        client.connect().await;

        let analysis = client.run_analysis(&qg1_report()).await;
        assert_eq!(analysis, local_analysis(&qg1_report()));
        assert!(analysis
            .predictions
            .iter()
            .all(|p| p.kind == PROCESS_CAPABILITY));
    }

    #[tokio::test]
    async fn test_push_offline_event_marks_client_offline() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        client.connect().await;

        client.emit(&EventKind::Connection, &json!({"status": "offline"}));
        assert_eq!(client.state(), SyncState::Offline);
    }

    #[tokio::test]
    async fn test_subscriptions_through_client() {
        let service = Arc::new(FakeService::online());
        let client = client(&service);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let sub = client.on(EventKind::Alert, move |payload| {
            seen_clone.lock().unwrap().push(payload.clone());
        });
        assert_eq!(client.emit(&EventKind::Alert, &json!({"n": 1})), 1);
        sub.dispose();
        assert_eq!(client.emit(&EventKind::Alert, &json!({"n": 2})), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let service = Arc::new(FakeService::offline());
        let client = client(&service);
        client.connect().await;
        client.persist(&batch("B-1")).await;

        let status = client.status().unwrap();
        assert_eq!(status.state, SyncState::Offline);
        assert_eq!(status.storage.queued_writes, 1);
        assert_eq!(status.storage.cached_entries, 0);
    }
}
