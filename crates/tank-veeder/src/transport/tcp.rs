//! TCP transport
//!
//! Talks to gauges reachable over the network, either through the gauge's
//! own Ethernet port or a serial-to-Ethernet converter. Repeated read
//! timeouts are taken as a dead link and trigger a reconnect cycle.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DeviceTransport, TransportError, RECEIVE_BUFFER_SIZE};
use crate::config::TcpConfig;

/// Consecutive read timeouts that trigger a reconnect cycle
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// Wait used when probing the socket for a closed peer
const LIVENESS_PROBE: Duration = Duration::from_millis(1);

pub struct TcpTransport {
    config: TcpConfig,
    stream: Option<TcpStream>,
    consecutive_timeouts: u32,
    reconnect_cycles: u64,
    cancel: CancellationToken,
}

impl TcpTransport {
    /// Create an unconnected transport; `cancel` stops an ongoing reconnect cycle
    pub fn new(config: &TcpConfig, cancel: CancellationToken) -> Self {
        Self {
            config: config.clone(),
            stream: None,
            consecutive_timeouts: 0,
            reconnect_cycles: 0,
            cancel,
        }
    }

    /// Number of reconnect cycles run since creation
    pub fn reconnect_cycles(&self) -> u64 {
        self.reconnect_cycles
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let addr = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("resolve {target}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::ConnectionFailed(format!("no address for {target}")));
        addr
    }

    /// Peer liveness: readable with nothing to read means the peer closed
    async fn peer_alive(stream: &TcpStream) -> bool {
        let mut probe = [0u8; 1];
        match tokio::time::timeout(LIVENESS_PROBE, stream.peek(&mut probe)).await {
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            Err(_) => true,
        }
    }

    /// Drop the connection and reconnect until it succeeds or the session is cancelled
    async fn reconnect_cycle(&mut self) {
        self.reconnect_cycles += 1;
        self.consecutive_timeouts = 0;
        warn!(endpoint = %self.endpoint(), "Read timeouts exceeded, reconnecting");
        self.disconnect().await;

        let delay = Duration::from_secs(self.config.reconnect_delay_secs);
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            attempt += 1;
            match self.connect().await {
                Ok(()) => {
                    info!(attempt, "Reconnected");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed, retrying in {:?}", delay);
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => return,
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let addr = self.resolve().await?;
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(format!("connect to {addr}")))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;

        info!(%addr, "Socket connected");
        self.stream = Some(stream);
        tokio::time::sleep(Duration::from_millis(self.config.post_connect_settle_ms)).await;
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream
            .write_all(frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(frame.len())
    }

    async fn receive(&mut self, reply_delay: Duration) -> Result<Vec<u8>, TransportError> {
        tokio::time::sleep(reply_delay).await;

        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        if !Self::peer_alive(stream).await {
            debug!("Peer closed before reply");
            return Err(TransportError::ConnectionClosed);
        }

        let read_timeout = Duration::from_millis(self.config.read_timeout_ms);
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
            Ok(Ok(0)) => Err(TransportError::ConnectionClosed),
            Ok(Ok(n)) => {
                self.consecutive_timeouts = 0;
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            Err(_) => {
                self.consecutive_timeouts += 1;
                error!(
                    consecutive = self.consecutive_timeouts,
                    "Receive timeout after {:?}", read_timeout
                );
                if self.consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                    self.reconnect_cycle().await;
                }
                Err(TransportError::Timeout(format!("no reply within {read_timeout:?}")))
            }
        }
    }

    async fn is_healthy(&mut self) -> bool {
        match &self.stream {
            Some(stream) => Self::peer_alive(stream).await,
            None => false,
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
            info!(endpoint = %self.endpoint(), "Socket closed");
        }
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.config.host, self.config.port)
    }
}
