//! Request and response bodies of the ingestion API

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tank_core::{MeasurementRecord, TransferRecord, UploadOutcome, UploadPackage};
use uuid::Uuid;

/// Body of `POST /api/Tank/SendTankIndicators`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTankIndicatorsRequest {
    pub package_id: Uuid,
    pub request_guid: Uuid,
    pub tanks_measurements: Vec<TankMeasurements>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankMeasurements {
    pub tank_id: i64,
    pub measurements: Vec<TankMeasurementData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankMeasurementData {
    pub measurement_date: NaiveDateTime,
    pub mass: Option<f64>,
    pub volume: Option<f64>,
    pub level: Option<f64>,
    pub density: Option<f64>,
    pub temperature: Option<f64>,
}

/// Body of `POST /api/Tank/SendTankTransfers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTankTransfersRequest {
    pub package_id: Uuid,
    pub request_guid: Uuid,
    pub tanks_transfers: Vec<TankTransfers>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankTransfers {
    pub tank_id: i64,
    pub transfers: Vec<TankTransferData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankTransferData {
    pub measurement_date: NaiveDateTime,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub level: Option<f64>,
    pub mass: f64,
    pub volume: f64,
}

/// Response body shared by both upload endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<ApiResult> for UploadOutcome {
    fn from(result: ApiResult) -> Self {
        UploadOutcome {
            success: result.success,
            error: result.error,
        }
    }
}

/// Error body returned with non-success status codes
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

impl SendTankIndicatorsRequest {
    /// Build the request body
    ///
    /// Records are dated by the session when captured; `now` only covers
    /// records that reached the client without a timestamp.
    pub fn from_package(package: &UploadPackage<MeasurementRecord>, now: NaiveDateTime) -> Self {
        let measurements = package
            .records
            .iter()
            .map(|r| TankMeasurementData {
                measurement_date: r.timestamp.unwrap_or(now),
                mass: r.mass,
                volume: r.volume,
                level: r.level,
                density: r.density,
                temperature: r.temperature,
            })
            .collect();

        Self {
            package_id: package.package_id,
            request_guid: package.request_id,
            tanks_measurements: vec![TankMeasurements {
                tank_id: package.tank_id,
                measurements,
            }],
        }
    }
}

impl SendTankTransfersRequest {
    /// Build the request body; transfers are dated by their report time, or `now`
    /// when it is still missing
    pub fn from_package(package: &UploadPackage<TransferRecord>, now: NaiveDateTime) -> Self {
        let transfers = package
            .records
            .iter()
            .map(|r| TankTransferData {
                measurement_date: r.report_time.unwrap_or(now),
                start_date: r.start_time,
                end_date: r.end_time,
                level: r.level,
                mass: r.mass,
                volume: r.volume,
            })
            .collect();

        Self {
            package_id: package.package_id,
            request_guid: package.request_id,
            tanks_transfers: vec![TankTransfers {
                tank_id: package.tank_id,
                transfers,
            }],
        }
    }
}

pub(crate) fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
