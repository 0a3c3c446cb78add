//! Protocol codec errors

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid header for {expected}: got {actual}")]
    InvalidHeader { expected: String, actual: String },

    #[error("Reply does not end with ETX")]
    MissingTerminator,

    #[error("Reply truncated: needed {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Invalid hex float at offset {offset}: {field}")]
    InvalidHexFloat { offset: usize, field: String },

    #[error("Invalid field count: {0}")]
    InvalidFieldCount(i32),

    #[error("Password must be {expected} ASCII characters, got {actual}")]
    InvalidPassword { expected: usize, actual: usize },

    #[error("Tank index must be a single digit, got {0}")]
    InvalidTankIndex(u8),
}
