//! Batch pipeline
//!
//! One worker task per record kind owns that kind's accumulator, so appends
//! and packaging never race. Each formed package is delivered by its own
//! task; a package stuck in retries does not hold up the next one.

use std::sync::Arc;
use std::time::Duration;

use tank_core::{MeasurementRecord, PackageRecord, TransferRecord, UploadClient, UploadPackage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::batch::RecordBatch;
use crate::config::UplinkConfig;
use crate::delivery::{deliver, DeliveryOutcome, DeliverySummary};
use crate::retry::RetryState;
use crate::store::PackageStore;

/// Handle to the running pipeline
pub struct BatchPipeline {
    measurements: mpsc::UnboundedSender<Vec<MeasurementRecord>>,
    transfers: mpsc::UnboundedSender<Vec<TransferRecord>>,
    workers: Vec<JoinHandle<DeliverySummary>>,
}

impl BatchPipeline {
    /// Start one worker per record kind
    pub fn spawn(
        config: &UplinkConfig,
        store: PackageStore,
        client: Arc<dyn UploadClient>,
        cancel: CancellationToken,
    ) -> Self {
        let (measurements, measurement_rx) = mpsc::unbounded_channel();
        let (transfers, transfer_rx) = mpsc::unbounded_channel();

        let settings = WorkerSettings {
            threshold: config.effective_threshold(),
            max_retries: config.max_retries,
            backoff: config.backoff(),
        };
        let workers = vec![
            tokio::spawn(
                KindWorker::<MeasurementRecord>::new(
                    settings,
                    store.clone(),
                    client.clone(),
                    cancel.clone(),
                )
                .run(measurement_rx),
            ),
            tokio::spawn(
                KindWorker::<TransferRecord>::new(settings, store, client, cancel).run(transfer_rx),
            ),
        ];

        Self {
            measurements,
            transfers,
            workers,
        }
    }

    /// Queue one tick's records; empty lists are ignored
    pub fn submit(&self, measurements: Vec<MeasurementRecord>, transfers: Vec<TransferRecord>) {
        if !measurements.is_empty() && self.measurements.send(measurements).is_err() {
            error!("Measurement worker has stopped, records dropped");
        }
        if !transfers.is_empty() && self.transfers.send(transfers).is_err() {
            error!("Transfer worker has stopped, records dropped");
        }
    }

    /// Stop accepting records and wait for in-flight deliveries to finish
    ///
    /// Records below the threshold are discarded. Returns counts of how the
    /// packages formed during the pipeline's life ended.
    pub async fn shutdown(self) -> DeliverySummary {
        drop(self.measurements);
        drop(self.transfers);

        let mut summary = DeliverySummary::default();
        for worker in self.workers {
            match worker.await {
                Ok(done) => summary.merge(done),
                Err(e) => error!(error = %e, "Pipeline worker failed"),
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    threshold: usize,
    max_retries: u32,
    backoff: Duration,
}

struct KindWorker<T: PackageRecord> {
    settings: WorkerSettings,
    batch: RecordBatch<T>,
    store: PackageStore,
    client: Arc<dyn UploadClient>,
    cancel: CancellationToken,
    deliveries: Vec<JoinHandle<DeliveryOutcome>>,
    summary: DeliverySummary,
}

impl<T: PackageRecord> KindWorker<T> {
    fn new(
        settings: WorkerSettings,
        store: PackageStore,
        client: Arc<dyn UploadClient>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            batch: RecordBatch::new(settings.threshold),
            store,
            client,
            cancel,
            deliveries: Vec::new(),
            summary: DeliverySummary::default(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Vec<T>>) -> DeliverySummary {
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(records) => self.accept(records).await,
                    None => break,
                },
                () = self.cancel.cancelled() => break,
            }
        }

        self.finish().await
    }

    /// Wait for in-flight deliveries
    async fn finish(mut self) -> DeliverySummary {
        let running = std::mem::take(&mut self.deliveries);
        self.collect(running).await;
        self.summary
    }

    async fn collect(&mut self, handles: Vec<JoinHandle<DeliveryOutcome>>) {
        for handle in handles {
            match handle.await {
                Ok(outcome) => {
                    debug!(kind = %T::KIND, ?outcome, "Delivery finished");
                    self.summary.record(&outcome);
                }
                Err(e) => error!(kind = %T::KIND, error = %e, "Delivery task failed"),
            }
        }
    }

    async fn accept(&mut self, records: Vec<T>) {
        self.batch.extend(records);
        let Some(records) = self.batch.take_full() else {
            debug!(kind = %T::KIND, collected = self.batch.len(), "Collecting records");
            return;
        };

        let tank_id = records.first().map(|r| r.tank_id()).unwrap_or_default();
        let package = match UploadPackage::new(tank_id, records) {
            Ok(package) => package,
            Err(e) => {
                error!(kind = %T::KIND, error = %e, "Package not formed");
                return;
            }
        };

        info!(kind = %T::KIND, package_id = %package.package_id, records = package.len(), "Preparing package");
        let path = match self.store.persist(&package).await {
            Ok(path) => path,
            Err(e) => {
                error!(
                    kind = %T::KIND,
                    error = %e,
                    "Package could not be persisted, keeping records for the next attempt"
                );
                self.batch.restore(package.records);
                return;
            }
        };

        let retry = RetryState::new(self.settings.max_retries, self.settings.backoff);
        self.deliveries.push(tokio::spawn(deliver(
            package,
            path,
            self.client.clone(),
            self.store.clone(),
            retry,
            self.cancel.clone(),
        )));

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deliveries)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.deliveries = running;
        self.collect(finished).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tank_core::UploadOutcome;

    /// Records every submitted package and answers with a fixed outcome
    #[derive(Default)]
    struct RecordingClient {
        fail_with: Option<String>,
        measurements: Mutex<Vec<UploadPackage<MeasurementRecord>>>,
        transfers: Mutex<Vec<UploadPackage<TransferRecord>>>,
    }

    impl RecordingClient {
        fn failing(error: &str) -> Self {
            Self {
                fail_with: Some(error.to_string()),
                ..Default::default()
            }
        }

        fn outcome(&self) -> UploadOutcome {
            match &self.fail_with {
                Some(e) => UploadOutcome::rejected(e.clone()),
                None => UploadOutcome::accepted(),
            }
        }
    }

    #[async_trait]
    impl UploadClient for RecordingClient {
        async fn submit_measurements(
            &self,
            package: &UploadPackage<MeasurementRecord>,
        ) -> UploadOutcome {
            self.measurements.lock().push(package.clone());
            self.outcome()
        }

        async fn submit_transfers(&self, package: &UploadPackage<TransferRecord>) -> UploadOutcome {
            self.transfers.lock().push(package.clone());
            self.outcome()
        }
    }

    fn config(dir: &std::path::Path, max_retries: u32) -> UplinkConfig {
        UplinkConfig {
            storage_dir: dir.to_path_buf(),
            threshold: 6,
            max_retries,
            backoff_secs: 60,
            backoff_ms: Some(5),
        }
    }

    fn measurement(tank_number: i32, volume: f64) -> MeasurementRecord {
        let mut record = MeasurementRecord::new(tank_number, None).with_tank_id(42);
        record.volume = Some(volume);
        record
    }

    fn transfer(volume: f64) -> TransferRecord {
        TransferRecord {
            tank_id: 42,
            tank_number: 1,
            report_time: None,
            start_time: None,
            end_time: None,
            volume,
            mass: volume * 0.8,
            level: None,
            density: None,
        }
    }

    fn start(
        dir: &std::path::Path,
        max_retries: u32,
        client: Arc<RecordingClient>,
    ) -> (BatchPipeline, PackageStore) {
        let store = PackageStore::new(dir);
        let pipeline = BatchPipeline::spawn(
            &config(dir, max_retries),
            store.clone(),
            client,
            CancellationToken::new(),
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_below_threshold_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let (pipeline, store) = start(dir.path(), 3, client.clone());

        for i in 0..5 {
            pipeline.submit(vec![measurement(1, i as f64)], Vec::new());
        }
        let summary = pipeline.shutdown().await;

        assert_eq!(summary.total(), 0);
        assert!(client.measurements.lock().is_empty());
        assert!(store.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_forms_one_package_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let (pipeline, store) = start(dir.path(), 3, client.clone());

        for i in 0..6 {
            pipeline.submit(vec![measurement(1, i as f64)], Vec::new());
        }
        let summary = pipeline.shutdown().await;

        assert_eq!(
            summary,
            DeliverySummary {
                delivered: 1,
                ..Default::default()
            }
        );
        let sent = client.measurements.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tank_id, 42);
        let volumes: Vec<_> = sent[0].records.iter().map(|r| r.volume).collect();
        assert_eq!(volumes, (0..6).map(|i| Some(i as f64)).collect::<Vec<_>>());
        // Delivered packages leave no file behind
        assert!(store.pending().await.unwrap().is_empty());
        assert!(store.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_not_sent_twice() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let (pipeline, _store) = start(dir.path(), 3, client.clone());

        // 4 + 4 crosses the threshold once, leaving nothing behind
        pipeline.submit((0..4).map(|i| measurement(1, i as f64)).collect(), Vec::new());
        pipeline.submit((4..8).map(|i| measurement(1, i as f64)).collect(), Vec::new());
        pipeline.submit((8..12).map(|i| measurement(1, i as f64)).collect(), Vec::new());
        pipeline.shutdown().await;

        let sent = client.measurements.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 8);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::failing("HTTP 503"));
        let (pipeline, store) = start(dir.path(), 3, client.clone());

        pipeline.submit(Vec::new(), (0..6).map(|i| transfer(i as f64)).collect());
        let summary = pipeline.shutdown().await;

        assert_eq!(
            summary,
            DeliverySummary {
                dead_lettered: 1,
                ..Default::default()
            }
        );
        let sent = client.transfers.lock();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|p| p.package_id == sent[0].package_id));

        assert!(store.pending().await.unwrap().is_empty());
        let dead = store.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&dead[0]).unwrap()).unwrap();
        assert_eq!(value["errorMessage"], "HTTP 503");
        assert_eq!(
            value["originalData"]["packageId"],
            serde_json::Value::String(sent[0].package_id.to_string())
        );
        assert_eq!(value["originalData"]["records"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let (pipeline, _store) = start(dir.path(), 3, client.clone());

        pipeline.submit(
            (0..6).map(|i| measurement(1, i as f64)).collect(),
            (0..5).map(|i| transfer(i as f64)).collect(),
        );
        pipeline.shutdown().await;

        assert_eq!(client.measurements.lock().len(), 1);
        assert!(client.transfers.lock().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let client = Arc::new(RecordingClient::default());
        let store = PackageStore::new(&missing);
        let pipeline = BatchPipeline::spawn(
            &config(&missing, 3),
            store.clone(),
            client.clone(),
            CancellationToken::new(),
        );

        pipeline.submit((0..6).map(|i| measurement(1, i as f64)).collect(), Vec::new());
        // Give the worker a chance to fail the write before the directory exists
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.measurements.lock().is_empty());

        store.init().await.unwrap();
        pipeline.submit(vec![measurement(1, 6.0)], Vec::new());
        pipeline.shutdown().await;

        let sent = client.measurements.lock();
        assert_eq!(sent.len(), 1);
        let volumes: Vec<_> = sent[0].records.iter().map(|r| r.volume).collect();
        assert_eq!(volumes, (0..7).map(|i| Some(i as f64)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancel_leaves_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::failing("offline"));
        let store = PackageStore::new(dir.path());
        let cancel = CancellationToken::new();
        let mut config = config(dir.path(), 10);
        config.backoff_ms = Some(60_000);
        let pipeline = BatchPipeline::spawn(&config, store.clone(), client.clone(), cancel.clone());

        pipeline.submit((0..6).map(|i| measurement(1, i as f64)).collect(), Vec::new());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let summary = pipeline.shutdown().await;

        assert_eq!(
            summary,
            DeliverySummary {
                cancelled: 1,
                ..Default::default()
            }
        );
        assert_eq!(store.pending().await.unwrap().len(), 1);
        assert!(store.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finished_deliveries_are_not_retained() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let settings = WorkerSettings {
            threshold: 6,
            max_retries: 3,
            backoff: Duration::from_millis(5),
        };
        let mut worker = KindWorker::<MeasurementRecord>::new(
            settings,
            PackageStore::new(dir.path()),
            client.clone(),
            CancellationToken::new(),
        );

        for round in 0..100 {
            worker
                .accept((0..6).map(|i| measurement(1, (round * 6 + i) as f64)).collect())
                .await;
            // Let the delivery remove its file before forming the next package
            for _ in 0..1000 {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if std::fs::read_dir(dir.path()).unwrap().next().is_none() {
                    break;
                }
            }
        }

        // Only handles still running are held; finished ones are folded into counts
        assert!(worker.deliveries.len() <= 2);
        assert_eq!(
            worker.summary.delivered + worker.deliveries.len() as u64,
            100
        );

        let summary = worker.finish().await;
        assert_eq!(summary.delivered, 100);
        assert_eq!(client.measurements.lock().len(), 100);
    }
}
