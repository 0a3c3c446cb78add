//! Delivery of one persisted package

use std::path::PathBuf;
use std::sync::Arc;

use tank_core::{PackageRecord, UploadClient, UploadPackage};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::retry::RetryState;
use crate::store::PackageStore;

/// How delivery of a package ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted upstream; the file was removed
    Delivered { attempts: u32 },
    /// Attempts exhausted; the package now sits in a dead-letter file
    DeadLettered { attempts: u32, error: String },
    /// Stopped by cancellation; the pending file is left in place
    Cancelled { attempts: u32 },
}

/// Counts of finished deliveries by how they ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: u64,
    pub dead_lettered: u64,
    pub cancelled: u64,
}

impl DeliverySummary {
    pub fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered { .. } => self.delivered += 1,
            DeliveryOutcome::DeadLettered { .. } => self.dead_lettered += 1,
            DeliveryOutcome::Cancelled { .. } => self.cancelled += 1,
        }
    }

    pub fn merge(&mut self, other: DeliverySummary) {
        self.delivered += other.delivered;
        self.dead_lettered += other.dead_lettered;
        self.cancelled += other.cancelled;
    }

    /// Packages that finished in any way
    pub fn total(&self) -> u64 {
        self.delivered + self.dead_lettered + self.cancelled
    }
}

/// Upload a persisted package until it is accepted, dead-lettered or cancelled
pub async fn deliver<T: PackageRecord>(
    package: UploadPackage<T>,
    path: PathBuf,
    client: Arc<dyn UploadClient>,
    store: PackageStore,
    mut retry: RetryState,
    cancel: CancellationToken,
) -> DeliveryOutcome {
    let package_id = package.package_id;
    let kind = T::KIND;
    info!(%kind, %package_id, records = package.len(), "Sending package");

    loop {
        let outcome = tokio::select! {
            outcome = T::submit(client.as_ref(), &package) => outcome,
            () = cancel.cancelled() => {
                return DeliveryOutcome::Cancelled { attempts: retry.attempts() };
            }
        };

        if outcome.success {
            retry.record_success();
            if let Err(e) = store.remove(&path).await {
                error!(%package_id, error = %e, "Delivered package could not be removed");
            }
            info!(%kind, %package_id, attempts = retry.attempts(), "Package accepted");
            return DeliveryOutcome::Delivered {
                attempts: retry.attempts(),
            };
        }

        let message = outcome.error_message().to_string();
        error!(%kind, %package_id, error = %message, "Package upload failed");

        let Some(delay) = retry.record_failure() else {
            error!(
                %kind,
                %package_id,
                attempts = retry.attempts(),
                "Retries exhausted, dead-lettering package"
            );
            if let Err(e) = store.dead_letter(&path, &message).await {
                error!(%package_id, error = %e, "Dead-letter write failed");
            }
            return DeliveryOutcome::DeadLettered {
                attempts: retry.attempts(),
                error: message,
            };
        };

        warn!(
            %package_id,
            remaining = retry.remaining(),
            "Retrying package in {:?}", delay
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => {
                return DeliveryOutcome::Cancelled { attempts: retry.attempts() };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_and_merges() {
        let mut summary = DeliverySummary::default();
        summary.record(&DeliveryOutcome::Delivered { attempts: 1 });
        summary.record(&DeliveryOutcome::Delivered { attempts: 3 });
        summary.record(&DeliveryOutcome::DeadLettered {
            attempts: 11,
            error: "HTTP 503".into(),
        });

        let mut other = DeliverySummary::default();
        other.record(&DeliveryOutcome::Cancelled { attempts: 0 });
        summary.merge(other);

        assert_eq!(
            summary,
            DeliverySummary {
                delivered: 2,
                dead_lettered: 1,
                cancelled: 1
            }
        );
        assert_eq!(summary.total(), 4);
    }
}
