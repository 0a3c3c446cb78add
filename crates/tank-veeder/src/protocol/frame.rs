//! Request and reply frames

use std::time::Duration;

use super::error::{ProtocolError, ProtocolResult};
use super::{Command, ESC, ETX, FUNCTION_PREFIX, HEADER_LEN, PASSWORD_LEN, SOH};

/// An outbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    command: Command,
    bytes: Vec<u8>,
}

impl CommandFrame {
    /// Build a request for `command` addressed to `tank_index`
    ///
    /// Without a password the frame is 7 bytes: `SOH i C C C 0 T`. With one
    /// the 6 password characters follow SOH, giving 13 bytes.
    pub fn build(command: Command, tank_index: u8, password: Option<&str>) -> ProtocolResult<Self> {
        if command == Command::Escape {
            return Ok(Self::escape());
        }
        if tank_index > 9 {
            return Err(ProtocolError::InvalidTankIndex(tank_index));
        }

        let mut bytes = Vec::with_capacity(1 + PASSWORD_LEN + 6);
        bytes.push(SOH);
        if let Some(password) = password {
            if password.len() != PASSWORD_LEN || !password.is_ascii() {
                return Err(ProtocolError::InvalidPassword {
                    expected: PASSWORD_LEN,
                    actual: password.chars().count(),
                });
            }
            bytes.extend_from_slice(password.as_bytes());
        }
        bytes.push(FUNCTION_PREFIX);
        bytes.extend_from_slice(command.code().as_bytes());
        bytes.push(b'0');
        bytes.push(b'0' + tank_index);

        Ok(Self { command, bytes })
    }

    /// Single ESC byte; no reply is read for it
    pub fn escape() -> Self {
        Self {
            command: Command::Escape,
            bytes: vec![ESC],
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn reply_delay(&self) -> Duration {
        self.command.reply_delay()
    }

    pub fn expects_reply(&self) -> bool {
        self.command.expects_reply()
    }

    /// Command carried by raw request bytes, read the way a gauge reads them
    pub fn command_of(bytes: &[u8]) -> Option<Command> {
        let prefix = match bytes.len() {
            7 => 1,
            13 => 1 + PASSWORD_LEN,
            _ => return None,
        };
        if bytes[0] != SOH || bytes[prefix] != FUNCTION_PREFIX {
            return None;
        }
        Command::from_code(&bytes[prefix + 1..prefix + 4])
    }
}

/// A complete reply to one command
///
/// Only replies ending in ETX are accepted; anything else is treated as if
/// nothing was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    command: Command,
    bytes: Vec<u8>,
}

impl ResponseFrame {
    pub fn new(command: Command, bytes: Vec<u8>) -> ProtocolResult<Self> {
        match bytes.last() {
            Some(&ETX) => Ok(Self { command, bytes }),
            _ => Err(ProtocolError::MissingTerminator),
        }
    }

    /// Command this reply answers
    pub fn command(&self) -> Command {
        self.command
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check the `SOH i CCC` header against the command that was sent
    pub fn check_header(&self) -> ProtocolResult<()> {
        let code = self.command.code().as_bytes();
        let header = self.bytes.get(..HEADER_LEN);
        let valid = match header {
            Some(h) => h[0] == SOH && h[1] == FUNCTION_PREFIX && &h[2..] == code,
            None => false,
        };
        if valid {
            return Ok(());
        }
        let actual = &self.bytes[..self.bytes.len().min(HEADER_LEN)];
        Err(ProtocolError::InvalidHeader {
            expected: self.command.to_string(),
            actual: hex::encode_upper(actual),
        })
    }
}
