//! Transport capability trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Size of the per-call receive buffer
pub const RECEIVE_BUFFER_SIZE: usize = 128 * 1024;

/// Byte link to one gauge
///
/// A session owns its transport exclusively and issues one command at a time.
#[async_trait]
pub trait DeviceTransport: Send {
    /// Open the link
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Write a complete command frame, returning the number of bytes sent
    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError>;

    /// Wait `reply_delay`, then perform a single read
    async fn receive(&mut self, reply_delay: Duration) -> Result<Vec<u8>, TransportError>;

    /// Whether the link is usable for the next command
    async fn is_healthy(&mut self) -> bool;

    /// Close the link; safe to call when already closed
    async fn disconnect(&mut self);

    /// Human-readable endpoint, for logs
    fn endpoint(&self) -> String;
}
