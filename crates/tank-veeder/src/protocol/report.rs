//! Inventory and delivery report parsers
//!
//! Parsing never fails outright. A bad header yields no records; a problem
//! further into the reply stops decoding and keeps the records produced so
//! far, except that a malformed float inside a delivery report discards the
//! whole report.

use chrono::NaiveDateTime;
use tank_core::precision::measurement_value;
use tank_core::{MeasurementRecord, TransferRecord};
use tracing::{debug, error, warn};

use super::error::{ProtocolError, ProtocolResult};
use super::fields::{decode_timestamp, encode_hex_float, encode_timestamp, FieldCursor};
use super::frame::ResponseFrame;
use super::{
    Command, ReportLayout, ETX, FIRST_GROUP_OFFSET, FUNCTION_PREFIX, GROUP_END, SOH,
    TIMESTAMP_LEN, TIMESTAMP_OFFSET,
};

/// Float positions in an inventory group
mod inventory_field {
    pub const VOLUME: i32 = 0;
    pub const LEVEL: i32 = 3;
    pub const TEMPERATURE: i32 = 5;
    pub const MASS: i32 = 10;
    pub const DENSITY: i32 = 11;
}

/// Float positions in a delivery entry
mod delivery_field {
    pub const START_VOLUME: usize = 0;
    pub const START_MASS: usize = 1;
    pub const END_VOLUME: usize = 5;
    pub const END_MASS: usize = 6;
    pub const DENSITY: usize = 7;
    pub const LEVEL: usize = 11;
}

/// Records decoded from one reply
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Inventory(Vec<MeasurementRecord>),
    Delivery(Vec<TransferRecord>),
    Empty,
}

/// Decode a reply according to the layout of the command it answers
pub fn decode_report(frame: &ResponseFrame) -> Report {
    match frame.command().layout() {
        Some(ReportLayout::Inventory) => Report::Inventory(parse_inventory(frame)),
        Some(ReportLayout::Delivery) => Report::Delivery(parse_delivery(frame)),
        None => Report::Empty,
    }
}

/// Decode an inventory report (201 or 231)
pub fn parse_inventory(frame: &ResponseFrame) -> Vec<MeasurementRecord> {
    let mut records = Vec::new();
    if let Err(e) = frame.check_header() {
        error!(command = %frame.command(), error = %e, "Inventory reply rejected");
        return records;
    }
    if let Err(e) = read_inventory_groups(frame.as_bytes(), &mut records) {
        warn!(
            command = %frame.command(),
            decoded = records.len(),
            error = %e,
            "Inventory decode stopped early"
        );
    }
    records
}

fn read_inventory_groups(buf: &[u8], records: &mut Vec<MeasurementRecord>) -> ProtocolResult<()> {
    let timestamp = report_timestamp(buf);
    let mut cursor = FieldCursor::new(buf, FIRST_GROUP_OFFSET);

    while cursor.peek()? != GROUP_END {
        let tank_number = cursor.digits(2)?;
        // product code and four status characters
        cursor.skip(5)?;
        let field_count = cursor.digits(2)?;

        let mut record = MeasurementRecord::new(tank_number, timestamp);
        for index in 0..field_count.max(0) {
            let value = measurement_value(cursor.hex_float()?);
            match index {
                inventory_field::VOLUME => record.volume = Some(value),
                inventory_field::LEVEL => record.level = Some(value),
                inventory_field::TEMPERATURE => record.temperature = Some(value),
                inventory_field::MASS => record.mass = Some(value),
                inventory_field::DENSITY => record.density = Some(value),
                _ => {}
            }
        }
        debug!(tank = tank_number, fields = field_count, "Inventory group decoded");
        records.push(record);
    }
    Ok(())
}

/// Decode a delivery report (215)
pub fn parse_delivery(frame: &ResponseFrame) -> Vec<TransferRecord> {
    let mut records = Vec::new();
    if let Err(e) = frame.check_header() {
        error!(command = %frame.command(), error = %e, "Delivery reply rejected");
        return records;
    }
    match read_delivery_groups(frame.as_bytes(), &mut records) {
        Ok(()) => records,
        Err(e @ ProtocolError::InvalidHexFloat { .. }) => {
            error!(error = %e, discarded = records.len(), "Delivery report discarded");
            Vec::new()
        }
        Err(e) => {
            warn!(decoded = records.len(), error = %e, "Delivery decode stopped early");
            records
        }
    }
}

fn read_delivery_groups(buf: &[u8], records: &mut Vec<TransferRecord>) -> ProtocolResult<()> {
    let report_time = report_timestamp(buf);
    let mut cursor = FieldCursor::new(buf, FIRST_GROUP_OFFSET);

    while cursor.peek()? != GROUP_END {
        let tank_number = cursor.digits(2)?;
        // product code
        cursor.skip(1)?;
        let deliveries = cursor.digits(2)?;

        for _ in 0..deliveries.max(0) {
            let start_time = cursor.timestamp()?;
            let end_time = cursor.timestamp()?;
            let field_count = hex_field_count(cursor.digits(2)?)?;

            let (mut start_volume, mut start_mass, mut end_volume, mut end_mass) =
                (0f32, 0f32, 0f32, 0f32);
            let mut record = TransferRecord {
                tank_id: 0,
                tank_number,
                report_time,
                start_time,
                end_time,
                volume: 0.0,
                mass: 0.0,
                level: None,
                density: None,
            };
            for index in 0..field_count {
                let value = cursor.hex_float()?;
                match index {
                    delivery_field::START_VOLUME => start_volume = value,
                    delivery_field::START_MASS => start_mass = value,
                    delivery_field::END_VOLUME => end_volume = value,
                    delivery_field::END_MASS => end_mass = value,
                    delivery_field::DENSITY => record.density = Some(f64::from(value)),
                    delivery_field::LEVEL => record.level = Some(f64::from(value)),
                    _ => {}
                }
            }
            record.volume = f64::from(end_volume - start_volume);
            record.mass = f64::from(end_mass - start_mass);

            // trailing flag
            cursor.skip(1)?;
            records.push(record);
        }
        cursor.skip(1)?;
    }
    Ok(())
}

/// The delivery field count is decoded positionally, then its decimal
/// rendering is read again as hexadecimal ("12" means 18 fields).
fn hex_field_count(raw: i32) -> ProtocolResult<usize> {
    usize::from_str_radix(&raw.to_string(), 16).map_err(|_| ProtocolError::InvalidFieldCount(raw))
}

fn report_timestamp(buf: &[u8]) -> Option<NaiveDateTime> {
    let field = buf.get(TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + TIMESTAMP_LEN)?;
    let timestamp = decode_timestamp(field);
    if timestamp.is_none() {
        warn!(field = %String::from_utf8_lossy(field), "Report timestamp not decoded");
    }
    timestamp
}

// =============================================================================
// Reply synthesis
// =============================================================================

/// Builds gauge replies in wire format
///
/// Used by the mock transport and by tests that stand in for a gauge.
#[derive(Debug, Clone)]
pub struct ReplyBuilder {
    command: Command,
    bytes: Vec<u8>,
}

/// Readings for one synthesized delivery entry
#[derive(Debug, Clone)]
pub struct DeliveryEntry {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Float fields in wire order; 18 on a real gauge
    pub fields: Vec<f32>,
}

impl DeliveryEntry {
    /// Entry with start/end volume and mass set and every other field zero
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        volume: (f32, f32),
        mass: (f32, f32),
    ) -> Self {
        let mut fields = vec![0.0; 18];
        fields[delivery_field::START_VOLUME] = volume.0;
        fields[delivery_field::START_MASS] = mass.0;
        fields[delivery_field::END_VOLUME] = volume.1;
        fields[delivery_field::END_MASS] = mass.1;
        Self { start, end, fields }
    }
}

impl ReplyBuilder {
    /// Start a reply to `command` for all tanks, stamped with `timestamp`
    pub fn new(command: Command, timestamp: NaiveDateTime) -> Self {
        let mut bytes = vec![SOH, FUNCTION_PREFIX];
        bytes.extend_from_slice(command.code().as_bytes());
        bytes.extend_from_slice(b"00");
        bytes.extend_from_slice(encode_timestamp(&timestamp).as_bytes());
        Self { command, bytes }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Append an inventory group with the given float fields
    pub fn inventory_group(mut self, tank: u8, fields: &[f32]) -> Self {
        self.push_str(&format!("{tank:02}"));
        self.push_str("10000");
        self.push_str(&format!("{:02X}", fields.len()));
        for value in fields {
            self.push_str(&encode_hex_float(*value));
        }
        self
    }

    /// Append a delivery group
    pub fn delivery_group(mut self, tank: u8, entries: &[DeliveryEntry]) -> Self {
        self.push_str(&format!("{tank:02}"));
        self.push_str("1");
        self.push_str(&format!("{:02}", entries.len()));
        for entry in entries {
            self.push_str(&encode_timestamp(&entry.start));
            self.push_str(&encode_timestamp(&entry.end));
            self.push_str(&format!("{:02X}", entry.fields.len()));
            for value in &entry.fields {
                self.push_str(&encode_hex_float(*value));
            }
            self.push_str("0");
        }
        self.push_str("0");
        self
    }

    /// Append raw bytes, for malformed replies
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Close the group list, append the checksum and ETX
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(&[GROUP_END, GROUP_END]);
        let sum = self
            .bytes
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
        let checksum = (!sum).wrapping_add(1);
        self.push_str(&format!("{checksum:04X}"));
        self.bytes.push(ETX);
        self.bytes
    }

    fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }
}
