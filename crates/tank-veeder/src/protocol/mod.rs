//! Veeder-Root serial protocol
//!
//! Requests are short computer-format commands: `SOH [password] i CCC T T`
//! where `CCC` is the function code and `TT` selects the tank. Replies echo
//! the command header, carry a packed report timestamp and a list of groups
//! terminated by `&`, and end with ETX (0x03).
//!
//! Numeric readings are IEEE-754 single-precision values written as eight
//! hexadecimal characters.

pub mod error;
pub mod fields;
pub mod frame;
pub mod report;

pub use error::{ProtocolError, ProtocolResult};
pub use fields::{decode_hex_float, decode_positional, decode_timestamp, FieldCursor};
pub use frame::{CommandFrame, ResponseFrame};
pub use report::{decode_report, parse_delivery, parse_inventory, Report};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Start of heading, first byte of every request and reply
pub const SOH: u8 = 0x01;
/// End of text, last byte of a complete reply
pub const ETX: u8 = 0x03;
/// Escape, sent on its own to abort a pending command
pub const ESC: u8 = 0x1B;
/// Computer-format function prefix
pub const FUNCTION_PREFIX: u8 = b'i';
/// Marks the end of the group list
pub const GROUP_END: u8 = b'&';

/// Required length of an access password
pub const PASSWORD_LEN: usize = 6;
/// SOH, 'i' and the three-character function code
pub const HEADER_LEN: usize = 5;
/// Offset of the report timestamp in a reply
pub const TIMESTAMP_OFFSET: usize = 7;
/// Characters in a packed timestamp (YYMMDDhhmm)
pub const TIMESTAMP_LEN: usize = 10;
/// Offset of the first tank group in a reply
pub const FIRST_GROUP_OFFSET: usize = 17;
/// Characters in one hex-encoded float
pub const HEX_FLOAT_LEN: usize = 8;

/// Gauge commands used by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// 201: in-tank inventory report
    InTankInventory,
    /// 231: in-tank mass/density inventory report
    MassDensityInventory,
    /// 215: in-tank mass/density delivery report
    MassDensityDelivery,
    /// Bare ESC; the gauge does not reply
    Escape,
}

/// Report layout a command's reply follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLayout {
    Inventory,
    Delivery,
}

/// Static properties of one command
#[derive(Debug)]
pub struct CommandSpec {
    pub command: Command,
    /// Three-character function code, empty for ESC
    pub code: &'static str,
    /// Time the gauge needs before its reply can be read
    pub reply_delay: Duration,
    pub layout: Option<ReportLayout>,
}

static COMMAND_TABLE: [CommandSpec; 4] = [
    CommandSpec {
        command: Command::InTankInventory,
        code: "201",
        reply_delay: Duration::from_millis(4000),
        layout: Some(ReportLayout::Inventory),
    },
    CommandSpec {
        command: Command::MassDensityInventory,
        code: "231",
        reply_delay: Duration::from_millis(4000),
        layout: Some(ReportLayout::Inventory),
    },
    CommandSpec {
        command: Command::MassDensityDelivery,
        code: "215",
        reply_delay: Duration::from_millis(8000),
        layout: Some(ReportLayout::Delivery),
    },
    CommandSpec {
        command: Command::Escape,
        code: "",
        reply_delay: Duration::ZERO,
        layout: None,
    },
];

impl Command {
    pub fn spec(self) -> &'static CommandSpec {
        let index = match self {
            Command::InTankInventory => 0,
            Command::MassDensityInventory => 1,
            Command::MassDensityDelivery => 2,
            Command::Escape => 3,
        };
        &COMMAND_TABLE[index]
    }

    pub fn code(self) -> &'static str {
        self.spec().code
    }

    pub fn reply_delay(self) -> Duration {
        self.spec().reply_delay
    }

    pub fn layout(self) -> Option<ReportLayout> {
        self.spec().layout
    }

    /// Whether the gauge answers this command
    pub fn expects_reply(self) -> bool {
        self.spec().layout.is_some()
    }

    /// Look up a command by its function code
    pub fn from_code(code: &[u8]) -> Option<Command> {
        COMMAND_TABLE
            .iter()
            .find(|spec| !spec.code.is_empty() && spec.code.as_bytes() == code)
            .map(|spec| spec.command)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Escape => write!(f, "ESC"),
            other => write!(f, "i{}", other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_commands() {
        for command in [
            Command::InTankInventory,
            Command::MassDensityInventory,
            Command::MassDensityDelivery,
            Command::Escape,
        ] {
            assert_eq!(command.spec().command, command);
        }
    }

    #[test]
    fn test_reply_delays() {
        assert_eq!(Command::MassDensityInventory.reply_delay(), Duration::from_secs(4));
        assert_eq!(Command::InTankInventory.reply_delay(), Duration::from_secs(4));
        assert_eq!(Command::MassDensityDelivery.reply_delay(), Duration::from_secs(8));
        assert_eq!(Command::Escape.reply_delay(), Duration::ZERO);
        assert!(!Command::Escape.expects_reply());
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Command::from_code(b"231"), Some(Command::MassDensityInventory));
        assert_eq!(Command::from_code(b"215"), Some(Command::MassDensityDelivery));
        assert_eq!(Command::from_code(b"201"), Some(Command::InTankInventory));
        assert_eq!(Command::from_code(b"999"), None);
        assert_eq!(Command::from_code(b""), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::MassDensityInventory.to_string(), "i231");
        assert_eq!(Command::Escape.to_string(), "ESC");
    }
}
