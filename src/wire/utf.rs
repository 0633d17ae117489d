//! Character and string payloads.
//!
//! POF strings use modified UTF-8 over UTF-16 code units: NUL is written as
//! `C0 80` and supplementary characters as two three-byte surrogates. A
//! `char` value carries exactly one UTF-16 code unit.

use bytes::{Buf, BufMut};

use super::packed::{get_packed_i32, put_packed_i32};
use crate::error::PofError;

/// Encoded byte length of `s`.
pub fn utf_len(s: &str) -> usize {
    s.encode_utf16().map(unit_len).sum()
}

fn unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        _ => 3,
    }
}

pub fn put_unit(buf: &mut impl BufMut, unit: u16) {
    match unit {
        0x0001..=0x007F => buf.put_u8(unit as u8),
        0x0000 | 0x0080..=0x07FF => {
            buf.put_u8(0xC0 | ((unit >> 6) & 0x1F) as u8);
            buf.put_u8(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            buf.put_u8(0xE0 | ((unit >> 12) & 0x0F) as u8);
            buf.put_u8(0x80 | ((unit >> 6) & 0x3F) as u8);
            buf.put_u8(0x80 | (unit & 0x3F) as u8);
        }
    }
}

pub fn get_unit(buf: &mut impl Buf) -> Result<u16, PofError> {
    let b = next(buf)?;
    match b >> 4 {
        0x0..=0x7 => Ok(u16::from(b)),
        0xC | 0xD => {
            let b2 = continuation(buf)?;
            Ok((u16::from(b & 0x1F) << 6) | b2)
        }
        0xE => {
            let b2 = continuation(buf)?;
            let b3 = continuation(buf)?;
            Ok((u16::from(b & 0x0F) << 12) | (b2 << 6) | b3)
        }
        _ => Err(PofError::Corrupted(format!(
            "illegal leading UTF byte: 0x{b:02X}"
        ))),
    }
}

/// Writes a char payload. Characters outside the basic multilingual plane do
/// not fit in a single code unit and are rejected.
pub fn put_char(buf: &mut impl BufMut, ch: char) -> Result<(), PofError> {
    let unit = u16::try_from(u32::from(ch)).map_err(|_| {
        PofError::InvalidValue(format!("char U+{:04X} is outside the BMP", u32::from(ch)))
    })?;
    put_unit(buf, unit);
    Ok(())
}

pub fn get_char(buf: &mut impl Buf) -> Result<char, PofError> {
    let unit = get_unit(buf)?;
    char::from_u32(u32::from(unit))
        .ok_or_else(|| PofError::Corrupted(format!("unpaired surrogate 0x{unit:04X} in char")))
}

/// Writes `packed length · modified UTF-8 bytes`.
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    if s.bytes().all(|b| (0x01..=0x7F).contains(&b)) {
        put_packed_i32(buf, s.len() as i32);
        buf.put_slice(s.as_bytes());
        return;
    }
    put_packed_i32(buf, utf_len(s) as i32);
    for unit in s.encode_utf16() {
        put_unit(buf, unit);
    }
}

/// Reads a string payload; a negative length denotes a null string.
pub fn get_string(buf: &mut impl Buf) -> Result<Option<String>, PofError> {
    let len = get_packed_i32(buf)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(PofError::Eof {
            needed: len,
            remaining: buf.remaining(),
        });
    }
    let mut bytes = buf.take(len);
    let mut units = Vec::with_capacity(len);
    while bytes.has_remaining() {
        units.push(get_unit(&mut bytes)?);
    }
    String::from_utf16(&units)
        .map(Some)
        .map_err(|e| PofError::Corrupted(format!("invalid UTF-16 in string: {e}")))
}

fn next(buf: &mut impl Buf) -> Result<u8, PofError> {
    if !buf.has_remaining() {
        return Err(PofError::Eof {
            needed: 1,
            remaining: 0,
        });
    }
    Ok(buf.get_u8())
}

fn continuation(buf: &mut impl Buf) -> Result<u16, PofError> {
    let b = next(buf)?;
    if b & 0xC0 != 0x80 {
        return Err(PofError::Corrupted(format!(
            "illegal UTF continuation byte: 0x{b:02X}"
        )));
    }
    Ok(u16::from(b & 0x3F))
}
