//! tank-veeder - Veeder-Root tank gauge link for the tank agent
//!
//! This crate talks to an automatic tank gauge over a serial line or a TCP
//! socket, decodes its fixed-format reports and drives periodic acquisition.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PollingSession                           │
//! │  connect loop, paced ticks, reconnect wait, cancellation    │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │DeviceConfig │  │CommandFrame │  │ report parsers      │ │
//! │  │ (tank, pwd) │  │ (requests)  │  │ (inventory/delivery)│ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │DeviceTransport  │                         │
//! │                 │(serial/TCP/mock)│                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{DeviceConfig, InventoryCommand, TransportConfig};
pub use error::{VeederError, VeederResult};
pub use protocol::{Command, CommandFrame, ProtocolError, Report, ResponseFrame};
pub use session::{PollingOptions, PollingSession, SessionState, TickResult};
pub use transport::{create_transport, DeviceTransport, TransportError};

// Re-export for convenience
pub use tank_core::{MeasurementRecord, TransferRecord};
