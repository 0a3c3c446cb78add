//! Upload packages and dead-letter envelopes

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MeasurementRecord, TransferRecord};
use crate::error::{CoreError, CoreResult};
use crate::upload::{UploadClient, UploadOutcome};

/// Which kind of record a package carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Measurement,
    Transfer,
}

impl RecordKind {
    /// Prefix used when naming persisted package files
    pub fn file_prefix(&self) -> &'static str {
        match self {
            RecordKind::Measurement => "TanksIndicators",
            RecordKind::Transfer => "TanksTransfers",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Measurement => write!(f, "measurement"),
            RecordKind::Transfer => write!(f, "transfer"),
        }
    }
}

/// A record type that can be batched into an [`UploadPackage`]
///
/// Ties each record type to its [`RecordKind`] and to the matching
/// [`UploadClient`] operation.
pub trait PackageRecord:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    const KIND: RecordKind;

    /// Upstream tank the record belongs to
    fn tank_id(&self) -> i64;

    /// Submit a package of this record type through the upload client
    fn submit<'a>(
        client: &'a dyn UploadClient,
        package: &'a UploadPackage<Self>,
    ) -> BoxFuture<'a, UploadOutcome>;
}

impl PackageRecord for MeasurementRecord {
    const KIND: RecordKind = RecordKind::Measurement;

    fn tank_id(&self) -> i64 {
        self.tank_id
    }

    fn submit<'a>(
        client: &'a dyn UploadClient,
        package: &'a UploadPackage<Self>,
    ) -> BoxFuture<'a, UploadOutcome> {
        client.submit_measurements(package)
    }
}

impl PackageRecord for TransferRecord {
    const KIND: RecordKind = RecordKind::Transfer;

    fn tank_id(&self) -> i64 {
        self.tank_id
    }

    fn submit<'a>(
        client: &'a dyn UploadClient,
        package: &'a UploadPackage<Self>,
    ) -> BoxFuture<'a, UploadOutcome> {
        client.submit_transfers(package)
    }
}

/// A batch of records ready for upstream delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPackage<T> {
    /// Unique package identifier, also used in the file name
    pub package_id: Uuid,
    /// Unique request identifier sent with the upload
    #[serde(rename = "requestGuid")]
    pub request_id: Uuid,
    pub tank_id: i64,
    pub records: Vec<T>,
}

impl<T: PackageRecord> UploadPackage<T> {
    /// Form a package with fresh package and request ids
    pub fn new(tank_id: i64, records: Vec<T>) -> CoreResult<Self> {
        if records.is_empty() {
            return Err(CoreError::InvalidPackage(format!(
                "{} package for tank {} has no records",
                T::KIND,
                tank_id
            )));
        }
        Ok(Self {
            package_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            tank_id,
            records,
        })
    }

    /// File name of the pending package
    pub fn file_name(&self) -> String {
        package_file_name(T::KIND, self.package_id)
    }

    /// Serialize to human-readable JSON
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a package previously written with [`UploadPackage::to_json`]
    pub fn from_json(data: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Prefix that marks a dead-lettered package file
pub const DEAD_LETTER_PREFIX: &str = "Error_";

/// File name for a pending package
pub fn package_file_name(kind: RecordKind, package_id: Uuid) -> String {
    format!("{}_{}.json", kind.file_prefix(), package_id)
}

/// File name for a dead-lettered package given its pending file name
pub fn dead_letter_file_name(pending: &str) -> String {
    format!("{DEAD_LETTER_PREFIX}{pending}")
}

/// A package that exhausted its delivery attempts
///
/// Written next to pending packages under a [`DEAD_LETTER_PREFIX`] name and
/// never retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    /// The package exactly as it was persisted
    pub original_data: serde_json::Value,
    /// Error reported by the last delivery attempt
    pub error_message: String,
}

impl DeadLetterRecord {
    /// Wrap the persisted package JSON with an error message
    ///
    /// Content that is not valid JSON is kept as a string.
    pub fn wrap(original: &str, error_message: impl Into<String>) -> Self {
        let original_data = serde_json::from_str(original)
            .unwrap_or_else(|_| serde_json::Value::String(original.to_string()));
        Self {
            original_data,
            error_message: error_message.into(),
        }
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(tank_number: i32, volume: f64) -> MeasurementRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(10, 30, 0));
        let mut r = MeasurementRecord::new(tank_number, ts).with_tank_id(42);
        r.volume = Some(volume);
        r
    }

    #[test]
    fn test_new_package_has_distinct_ids() {
        let pkg = UploadPackage::new(42, vec![record(1, 10.0)]).unwrap();
        assert_ne!(pkg.package_id, pkg.request_id);
        assert_eq!(pkg.len(), 1);

        let other = UploadPackage::new(42, vec![record(1, 10.0)]).unwrap();
        assert_ne!(pkg.package_id, other.package_id);
    }

    #[test]
    fn test_empty_package_rejected() {
        let result = UploadPackage::<TransferRecord>::new(42, Vec::new());
        assert!(matches!(result, Err(CoreError::InvalidPackage(_))));
    }

    #[test]
    fn test_file_names() {
        let pkg = UploadPackage::new(42, vec![record(1, 10.0)]).unwrap();
        let name = pkg.file_name();
        assert_eq!(name, format!("TanksIndicators_{}.json", pkg.package_id));
        assert_eq!(
            dead_letter_file_name(&name),
            format!("Error_TanksIndicators_{}.json", pkg.package_id)
        );
        assert_eq!(
            package_file_name(RecordKind::Transfer, pkg.package_id),
            format!("TanksTransfers_{}.json", pkg.package_id)
        );
    }

    #[test]
    fn test_package_json_layout() {
        let pkg = UploadPackage::new(42, vec![record(3, 1000.0)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&pkg.to_json().unwrap()).unwrap();

        assert_eq!(value["packageId"], json!(pkg.package_id.to_string()));
        assert_eq!(value["requestGuid"], json!(pkg.request_id.to_string()));
        assert_eq!(value["tankId"], json!(42));
        assert_eq!(
            value["records"],
            json!([{
                "tankId": 42,
                "tankNumber": 3,
                "timestamp": "2024-03-15T10:30:00",
                "volume": 1000.0
            }])
        );

        let parsed = UploadPackage::<MeasurementRecord>::from_json(&pkg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, pkg);
    }

    #[test]
    fn test_dead_letter_wraps_original() {
        let dl = DeadLetterRecord::wrap(r#"{"packageId":"abc"}"#, "HTTP 503");
        let value: serde_json::Value = serde_json::from_str(&dl.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"originalData": {"packageId": "abc"}, "errorMessage": "HTTP 503"})
        );
    }

    #[test]
    fn test_dead_letter_keeps_non_json_content() {
        let dl = DeadLetterRecord::wrap("not json", "boom");
        assert_eq!(dl.original_data, json!("not json"));
    }

    #[test]
    fn test_record_kind_display() {
        assert_eq!(RecordKind::Measurement.to_string(), "measurement");
        assert_eq!(RecordKind::Transfer.to_string(), "transfer");
        assert_eq!(MeasurementRecord::KIND.file_prefix(), "TanksIndicators");
    }
}
