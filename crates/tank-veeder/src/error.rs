//! Crate-level error type

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::transport::TransportError;

pub type VeederResult<T> = Result<T, VeederError>;

/// Errors surfaced while setting up a gauge link
///
/// Once a session runs, transport and protocol failures are logged and
/// absorbed; only setup problems reach the caller.
#[derive(Debug, Error)]
pub enum VeederError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),
}
