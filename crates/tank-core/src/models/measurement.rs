//! Inventory snapshot records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One tank's readings from an inventory report
///
/// Readings absent from the reported group are `None`. Values are kept at
/// four decimal places, see [`crate::precision::measurement_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    /// Upstream tank identifier, stamped by the polling session
    #[serde(default)]
    pub tank_id: i64,
    /// Tank number as reported by the gauge
    pub tank_number: i32,
    /// Report time in device local time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mass: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub density: Option<f64>,
}

impl MeasurementRecord {
    /// Create an empty record for a gauge tank number
    pub fn new(tank_number: i32, timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            tank_id: 0,
            tank_number,
            timestamp,
            volume: None,
            level: None,
            temperature: None,
            mass: None,
            density: None,
        }
    }

    /// Set the upstream tank identifier
    pub fn with_tank_id(mut self, tank_id: i64) -> Self {
        self.tank_id = tank_id;
        self
    }

    /// Date an undated record with the time it was captured
    pub fn with_capture_time(mut self, captured_at: NaiveDateTime) -> Self {
        self.timestamp.get_or_insert(captured_at);
        self
    }
}
