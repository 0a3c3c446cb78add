//! Fixed-width field decoders
//!
//! Replies are plain byte strings read at fixed offsets. [`FieldCursor`]
//! walks a reply and fails with [`ProtocolError::Truncated`] instead of
//! reading past the received bytes.

use chrono::{NaiveDate, NaiveDateTime};

use super::error::{ProtocolError, ProtocolResult};
use super::{HEX_FLOAT_LEN, TIMESTAMP_LEN};

/// Decode a positional digit field
///
/// Each byte maps to `byte - 0x30` when it is at most `'9'` and to
/// `byte - 0x37` otherwise, so `'A'..='F'` become 10..=15. Digits are then
/// weighted in base 10, not base 16: `"0A"` decodes to 10 and `"1A"` to 20.
/// Bytes below `'0'` yield negative digits.
pub fn decode_positional(field: &[u8]) -> i32 {
    let width = field.len() as u32;
    field.iter().enumerate().fold(0i32, |acc, (i, &b)| {
        let digit = if b <= b'9' {
            i32::from(b) - 0x30
        } else {
            i32::from(b) - 0x37
        };
        let weight = 10i32.saturating_pow(width - 1 - i as u32);
        acc.saturating_add(digit.saturating_mul(weight))
    })
}

/// Decode eight hex characters into a single-precision float
///
/// The characters hold four byte pairs, most significant first. The pairs are
/// placed into a buffer in reverse order and read as little-endian, which is
/// the same as reading them in order as big-endian.
pub fn decode_hex_float(field: &[u8]) -> ProtocolResult<f32> {
    let invalid = || ProtocolError::InvalidHexFloat {
        offset: 0,
        field: String::from_utf8_lossy(field).into_owned(),
    };
    if field.len() != HEX_FLOAT_LEN {
        return Err(invalid());
    }
    let mut raw = [0u8; 4];
    hex::decode_to_slice(field, &mut raw).map_err(|_| invalid())?;
    raw.reverse();
    Ok(f32::from_le_bytes(raw))
}

/// Encode a float the way the gauge writes it (uppercase hex, big-endian)
pub fn encode_hex_float(value: f32) -> String {
    hex::encode_upper(value.to_be_bytes())
}

/// Decode a packed `YYMMDDhhmm` timestamp
///
/// Each pair goes through [`decode_positional`]; the year is an offset from
/// 2000 and seconds are always zero. Returns `None` when the parts do not
/// form a valid date and time.
pub fn decode_timestamp(field: &[u8]) -> Option<NaiveDateTime> {
    if field.len() != TIMESTAMP_LEN {
        return None;
    }
    let part = |i: usize| decode_positional(&field[i * 2..i * 2 + 2]);
    let year = part(0).checked_add(2000)?;
    let month = u32::try_from(part(1)).ok()?;
    let day = u32::try_from(part(2)).ok()?;
    let hour = u32::try_from(part(3)).ok()?;
    let minute = u32::try_from(part(4)).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Encode a timestamp as `YYMMDDhhmm`
pub fn encode_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%y%m%d%H%M").to_string()
}

/// Read cursor over a reply
#[derive(Debug, Clone)]
pub struct FieldCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Byte at the cursor without advancing
    pub fn peek(&self) -> ProtocolResult<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.truncated(1))
    }

    /// Take `n` bytes and advance
    pub fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.truncated(n))?;
        let field = self.buf.get(self.pos..end).ok_or_else(|| self.truncated(n))?;
        self.pos = end;
        Ok(field)
    }

    pub fn skip(&mut self, n: usize) -> ProtocolResult<()> {
        self.take(n).map(|_| ())
    }

    /// Positional digit field of `width` characters
    pub fn digits(&mut self, width: usize) -> ProtocolResult<i32> {
        self.take(width).map(decode_positional)
    }

    pub fn hex_float(&mut self) -> ProtocolResult<f32> {
        let offset = self.pos;
        let field = self.take(HEX_FLOAT_LEN)?;
        decode_hex_float(field).map_err(|_| ProtocolError::InvalidHexFloat {
            offset,
            field: String::from_utf8_lossy(field).into_owned(),
        })
    }

    /// Packed timestamp; a malformed value is `None`, a short buffer is an error
    pub fn timestamp(&mut self) -> ProtocolResult<Option<NaiveDateTime>> {
        self.take(TIMESTAMP_LEN).map(decode_timestamp)
    }

    fn truncated(&self, needed: usize) -> ProtocolError {
        ProtocolError::Truncated {
            offset: self.pos,
            needed,
            len: self.buf.len(),
        }
    }
}
