//! Polling session
//!
//! Drives one gauge: connects with retry, issues an inventory and a delivery
//! command every period, and reconnects when the link goes bad.

mod manager;

pub use manager::PollingSession;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tank_core::{MeasurementRecord, TransferRecord};

/// Session lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Polling,
    ReconnectWait,
    Stopped,
}

/// Timing for a polling session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingOptions {
    /// Time between tick starts
    pub period: Duration,
    /// Pause between the inventory and delivery commands
    pub settle_delay: Duration,
    /// Pause between failed connect attempts
    pub connect_retry_delay: Duration,
    /// Pause after detecting a dead link before reconnecting
    pub reconnect_wait: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            settle_delay: Duration::from_millis(500),
            connect_retry_delay: Duration::from_secs(60),
            reconnect_wait: Duration::from_secs(30),
        }
    }
}

impl PollingOptions {
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

/// Records collected during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickResult {
    pub measurements: Vec<MeasurementRecord>,
    pub transfers: Vec<TransferRecord>,
    /// Wall time spent in the tick
    pub elapsed: Duration,
}

impl TickResult {
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty() && self.transfers.is_empty()
    }
}
