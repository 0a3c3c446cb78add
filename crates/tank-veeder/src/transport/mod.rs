//! Transport layer for gauge communication
//!
//! This module provides the links a session can poll a gauge over:
//! - Serial adapter for RS-232 lines
//! - TCP adapter for networked gauges
//! - Mock adapter for testing
//!
//! # Example
//!
//! ```ignore
//! use tank_veeder::transport::{create_transport, round_trip};
//! use tank_veeder::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let mut transport = create_transport(&config, cancel.clone())?;
//! transport.connect().await?;
//! let reply = round_trip(transport.as_mut(), &frame, false).await;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod serial;
pub mod tcp;

pub use adapter::{DeviceTransport, RECEIVE_BUFFER_SIZE};
pub use error::TransportError;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::TransportConfig;
use crate::protocol::CommandFrame;

/// Create the transport selected by configuration
///
/// `cancel` is the session's token; it bounds any reconnect cycle the
/// transport runs on its own.
pub fn create_transport(
    config: &TransportConfig,
    cancel: CancellationToken,
) -> Result<Box<dyn DeviceTransport>, TransportError> {
    match config {
        TransportConfig::Serial(cfg) => Ok(Box::new(serial::SerialTransport::new(cfg))),
        TransportConfig::Tcp(cfg) => {
            if cfg.host.is_empty() {
                return Err(TransportError::InvalidConfig("tcp host is empty".into()));
            }
            Ok(Box::new(tcp::TcpTransport::new(cfg, cancel)))
        }
        TransportConfig::Mock(cfg) => Ok(Box::new(mock::MockTransport::new(cfg))),
    }
}

/// Send one frame and collect its reply
///
/// Transport failures are logged and yield an empty reply. Frames that expect
/// no reply return immediately after sending.
pub async fn round_trip(
    transport: &mut dyn DeviceTransport,
    frame: &CommandFrame,
    log_transmission: bool,
) -> Vec<u8> {
    if log_transmission {
        info!(
            "Sent {} bytes -> {}",
            frame.len(),
            hex_dump(frame.as_bytes())
        );
    }

    if let Err(e) = transport.send(frame.as_bytes()).await {
        warn!(command = %frame.command(), error = %e, "Send failed");
        return Vec::new();
    }
    if !frame.expects_reply() {
        return Vec::new();
    }

    match transport.receive(frame.reply_delay()).await {
        Ok(reply) => {
            if log_transmission {
                info!("Received {} bytes <- {}", reply.len(), hex_dump(&reply));
            }
            reply
        }
        Err(e) => {
            warn!(command = %frame.command(), error = %e, "Receive failed");
            Vec::new()
        }
    }
}

/// Space-separated uppercase hex, e.g. `01 69 32`
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}
