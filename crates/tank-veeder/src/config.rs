//! Gauge link configuration
//!
//! Device identity, access password and transport settings for one gauge.

use serde::{Deserialize, Serialize};

use crate::error::{VeederError, VeederResult};
use crate::protocol::{Command, CommandFrame};

/// Configuration for one tank gauge link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Upstream tank identifier stamped on every decoded record
    pub tank_id: i64,
    /// Device-side tank index encoded into outbound frames (0-9)
    #[serde(default)]
    pub tank_index: u8,
    /// Optional 6-character access password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Log every sent and received frame as a hex dump
    #[serde(default)]
    pub log_transmission: bool,
    /// Inventory report requested on each tick
    #[serde(default)]
    pub inventory_command: InventoryCommand,
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

impl DeviceConfig {
    /// Password to send, treating an empty string as no password
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Build the request frame for a command using this device's tank index and password
    pub fn frame(&self, command: Command) -> VeederResult<CommandFrame> {
        Ok(CommandFrame::build(command, self.tank_index, self.password())?)
    }

    /// Check that every frame the session sends can be built
    pub fn validate(&self) -> VeederResult<()> {
        self.frame(self.inventory_command.command())?;
        self.frame(Command::MassDensityDelivery)?;
        self.transport.validate()
    }
}

/// Inventory report variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryCommand {
    /// In-tank inventory report (201)
    InTank,
    /// In-tank mass/density inventory report (231)
    #[default]
    MassDensity,
}

impl InventoryCommand {
    pub fn command(self) -> Command {
        match self {
            InventoryCommand::InTank => Command::InTankInventory,
            InventoryCommand::MassDensity => Command::MassDensityInventory,
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// RS-232 serial line
    Serial(SerialConfig),
    /// TCP socket (serial-to-Ethernet adapter or gauge network port)
    Tcp(TcpConfig),
    /// Mock transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

impl TransportConfig {
    pub fn validate(&self) -> VeederResult<()> {
        match self {
            TransportConfig::Serial(cfg) => {
                if cfg.port_name.is_empty() {
                    return Err(VeederError::Config("serial port_name is empty".into()));
                }
                if !(5..=8).contains(&cfg.data_bits) {
                    return Err(VeederError::Config(format!(
                        "serial data_bits must be 5..=8, got {}",
                        cfg.data_bits
                    )));
                }
                if !(1..=2).contains(&cfg.stop_bits) {
                    return Err(VeederError::Config(format!(
                        "serial stop_bits must be 1 or 2, got {}",
                        cfg.stop_bits
                    )));
                }
                Ok(())
            }
            TransportConfig::Tcp(cfg) => {
                if cfg.host.is_empty() {
                    return Err(VeederError::Config("tcp host is empty".into()));
                }
                if cfg.port == 0 {
                    return Err(VeederError::Config("tcp port must be non-zero".into()));
                }
                Ok(())
            }
            TransportConfig::Mock(_) => Ok(()),
        }
    }
}

/// Serial line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_write_timeout() -> u64 {
    1000
}

/// Serial parity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// TCP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Gauge IP address or hostname
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Bound on waiting for reply bytes once the reply delay has passed
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Pause between connect attempts after repeated read timeouts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Pause after a successful connect before the first command
    #[serde(default = "default_post_connect_settle")]
    pub post_connect_settle_ms: u64,
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout_ms: default_read_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            post_connect_settle_ms: default_post_connect_settle(),
        }
    }
}

fn default_tcp_port() -> u16 {
    10001
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_reconnect_delay() -> u64 {
    60
}

fn default_post_connect_settle() -> u64 {
    1000
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated reply latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}
