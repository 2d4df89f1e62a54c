//! In-process stand-ins for the remote collaborators.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::service::{HistoricalQuery, MeasurementService};
use crate::analysis::AnalysisResult;
use crate::error::{Error, Result};
use crate::measurement::{Measurement, MeasurementBatch, SaveAck};

/// Scriptable measurement service.
#[derive(Debug, Default)]
pub struct FakeService {
    reachable: AtomicBool,
    historical_body: Mutex<String>,
    analysis: Mutex<AnalysisResult>,
    saved: Mutex<Vec<MeasurementBatch>>,
    rejected_batches: Mutex<HashSet<String>>,
    historical_calls: AtomicUsize,
    historical_delays: Mutex<VecDeque<Duration>>,
    save_delay: Mutex<Option<Duration>>,
}

impl FakeService {
    pub fn online() -> Self {
        let service = Self::default();
        service.set_reachable(true);
        *service.historical_body.lock().unwrap() = "{}".to_string();
        service
    }

    pub fn offline() -> Self {
        Self {
            reachable: AtomicBool::new(false),
            ..Self::online()
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_historical(&self, body: &str) {
        *self.historical_body.lock().unwrap() = body.to_string();
    }

    /// Delay successive historical answers by these amounts, in call order.
    pub fn delay_historical(&self, delays: impl IntoIterator<Item = Duration>) {
        self.historical_delays.lock().unwrap().extend(delays);
    }

    /// Delay every save by this amount.
    pub fn delay_saves(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_analysis(&self, analysis: AnalysisResult) {
        *self.analysis.lock().unwrap() = analysis;
    }

    /// Make saves of the batch with this id fail.
    pub fn reject_batch(&self, batch_id: &str) {
        self.rejected_batches
            .lock()
            .unwrap()
            .insert(batch_id.to_string());
    }

    pub fn accept_all(&self) {
        self.rejected_batches.lock().unwrap().clear();
    }

    pub fn saved_batch_ids(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.metadata.batch_id.clone())
            .collect()
    }

    pub fn historical_calls(&self) -> usize {
        self.historical_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unreachable("fake://service", "connection refused"))
        }
    }
}

#[async_trait]
impl MeasurementService for FakeService {
    async fn health(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn historical(&self, _query: &HistoricalQuery) -> Result<String> {
        self.historical_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.historical_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        Ok(self.historical_body.lock().unwrap().clone())
    }

    async fn predict(&self, _measurements: &[Measurement]) -> Result<AnalysisResult> {
        self.check_reachable()?;
        Ok(self.analysis.lock().unwrap().clone())
    }

    async fn save(&self, batch: &MeasurementBatch) -> Result<SaveAck> {
        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        if self
            .rejected_batches
            .lock()
            .unwrap()
            .contains(&batch.metadata.batch_id)
        {
            return Err(Error::ServiceStatus {
                endpoint: "fake://service/measurements/save".to_string(),
                status: 500,
            });
        }
        self.saved.lock().unwrap().push(batch.clone());
        Ok(SaveAck {
            success: true,
            offline: false,
        })
    }
}

pub fn batch(batch_id: &str) -> MeasurementBatch {
    MeasurementBatch::new(
        crate::measurement::fixtures::qg1_report(),
        crate::measurement::BatchMetadata {
            batch_id: batch_id.to_string(),
            operator: "J. Silva".to_string(),
            shift: "A".to_string(),
            timestamp: "2024-01-15T14:30:00".to_string(),
        },
    )
}
