//! Delivery report records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One delivery event from a delivery report
///
/// `volume` and `mass` are the difference between the end-of-delivery and
/// start-of-delivery readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Upstream tank identifier, stamped by the polling session
    #[serde(default)]
    pub tank_id: i64,
    /// Tank number as reported by the gauge
    pub tank_number: i32,
    /// Time of the report that carried this delivery
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub report_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<NaiveDateTime>,
    pub volume: f64,
    pub mass: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub density: Option<f64>,
}

impl TransferRecord {
    /// Set the upstream tank identifier
    pub fn with_tank_id(mut self, tank_id: i64) -> Self {
        self.tank_id = tank_id;
        self
    }

    /// Date a transfer whose report time was not decoded with the capture time
    pub fn with_capture_time(mut self, captured_at: NaiveDateTime) -> Self {
        self.report_time.get_or_insert(captured_at);
        self
    }
}
