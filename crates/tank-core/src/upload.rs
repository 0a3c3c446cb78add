//! Upstream upload contract
//!
//! The pipeline only depends on this trait. The HTTP implementation lives in
//! `tank-client`; tests use in-memory implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{MeasurementRecord, TransferRecord, UploadPackage};

/// Result of one upload attempt
///
/// Implementations report every failure through this value instead of
/// returning an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// Error message to record when the upload failed
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("upload rejected without an error message")
    }
}

/// Upstream ingestion API
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Submit a package of inventory readings
    async fn submit_measurements(
        &self,
        package: &UploadPackage<MeasurementRecord>,
    ) -> UploadOutcome;

    /// Submit a package of delivery events
    async fn submit_transfers(&self, package: &UploadPackage<TransferRecord>) -> UploadOutcome;
}
