//! Serial line transport

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info};

use super::{DeviceTransport, TransportError, RECEIVE_BUFFER_SIZE};
use crate::config::{Parity, SerialConfig};

pub struct SerialTransport {
    config: SerialConfig,
    port: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            config: config.clone(),
            port: None,
        }
    }

    fn data_bits(&self) -> Result<tokio_serial::DataBits, TransportError> {
        match self.config.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(TransportError::InvalidConfig(format!(
                "unsupported data bits: {other}"
            ))),
        }
    }

    fn stop_bits(&self) -> Result<tokio_serial::StopBits, TransportError> {
        match self.config.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(TransportError::InvalidConfig(format!(
                "unsupported stop bits: {other}"
            ))),
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.config.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

#[async_trait]
impl DeviceTransport for SerialTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let port = tokio_serial::new(&self.config.port_name, self.config.baud_rate)
            .data_bits(self.data_bits()?)
            .stop_bits(self.stop_bits()?)
            .parity(self.parity())
            .timeout(Duration::from_millis(self.config.read_timeout_ms))
            .open_native_async()
            .map_err(|e| {
                error!(port = %self.config.port_name, error = %e, "Cannot open serial port");
                TransportError::ConnectionFailed(format!("{}: {}", self.config.port_name, e))
            })?;

        info!(
            port = %self.config.port_name,
            baud = self.config.baud_rate,
            data_bits = self.config.data_bits,
            parity = ?self.config.parity,
            stop_bits = self.config.stop_bits,
            "Serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let write_timeout = Duration::from_millis(self.config.write_timeout_ms);
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        tokio::time::timeout(write_timeout, port.write_all(frame))
            .await
            .map_err(|_| TransportError::Timeout("serial write".into()))?
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(frame.len())
    }

    async fn receive(&mut self, reply_delay: Duration) -> Result<Vec<u8>, TransportError> {
        tokio::time::sleep(reply_delay).await;

        let read_timeout = Duration::from_millis(self.config.read_timeout_ms);
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        match tokio::time::timeout(read_timeout, port.read(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            Err(_) => {
                debug!("Serial read timeout");
                Err(TransportError::Timeout(format!("no reply within {read_timeout:?}")))
            }
        }
    }

    async fn is_healthy(&mut self) -> bool {
        self.port.is_some()
    }

    async fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.config.port_name, "Serial port closed");
        }
    }

    fn endpoint(&self) -> String {
        format!("serial://{}@{}", self.config.port_name, self.config.baud_rate)
    }
}
