//! Packed integer encoding.
//!
//! The first byte holds a continuation bit (0x80), a sign bit (0x40) and the
//! six least significant bits of the magnitude; each following byte holds a
//! continuation bit and the next seven bits. Negative values are stored as
//! their one's complement.

use bytes::{Buf, BufMut};

use crate::error::PofError;

/// Longest legal encoding: 6 bits + 18 * 7 bits covers 128 bits.
const MAX_PACKED_LEN: usize = 19;

pub fn put_packed_i32(buf: &mut impl BufMut, n: i32) {
    put_packed_i128(buf, i128::from(n));
}

pub fn put_packed_i64(buf: &mut impl BufMut, n: i64) {
    put_packed_i128(buf, i128::from(n));
}

pub fn put_packed_i128(buf: &mut impl BufMut, n: i128) {
    let (mut bits, mut b) = if n < 0 {
        ((!n) as u128, 0x40u8)
    } else {
        (n as u128, 0x00u8)
    };

    b |= (bits & 0x3F) as u8;
    bits >>= 6;

    while bits != 0 {
        buf.put_u8(b | 0x80);
        b = (bits & 0x7F) as u8;
        bits >>= 7;
    }
    buf.put_u8(b);
}

/// Number of bytes `put_packed_i128` emits for `n`.
pub fn packed_len(n: i128) -> usize {
    let magnitude = if n < 0 { (!n) as u128 } else { n as u128 };
    let mut bits = magnitude >> 6;
    let mut len = 1;
    while bits != 0 {
        bits >>= 7;
        len += 1;
    }
    len
}

pub fn get_packed_i128(buf: &mut impl Buf) -> Result<i128, PofError> {
    let mut b = next_byte(buf)?;
    let negative = b & 0x40 != 0;
    let mut bits = u128::from(b & 0x3F);
    let mut shift = 6u32;
    let mut len = 1;

    while b & 0x80 != 0 {
        if len == MAX_PACKED_LEN {
            return Err(PofError::Corrupted(
                "packed integer exceeds 128 bits".into(),
            ));
        }
        b = next_byte(buf)?;
        bits |= u128::from(b & 0x7F) << shift;
        shift += 7;
        len += 1;
    }

    let n = bits as i128;
    Ok(if negative { !n } else { n })
}

pub fn get_packed_i64(buf: &mut impl Buf) -> Result<i64, PofError> {
    let n = get_packed_i128(buf)?;
    i64::try_from(n)
        .map_err(|_| PofError::Corrupted(format!("packed integer {n} exceeds 64 bits")))
}

pub fn get_packed_i32(buf: &mut impl Buf) -> Result<i32, PofError> {
    let n = get_packed_i128(buf)?;
    i32::try_from(n)
        .map_err(|_| PofError::Corrupted(format!("packed integer {n} exceeds 32 bits")))
}

/// Reads a packed integer that must be a non-negative element count.
pub fn get_count(buf: &mut impl Buf) -> Result<usize, PofError> {
    let n = get_packed_i32(buf)?;
    usize::try_from(n).map_err(|_| PofError::Corrupted(format!("illegal element count: {n}")))
}

/// Skips `count` packed integers without decoding them.
pub fn skip_packed(buf: &mut impl Buf, count: usize) -> Result<(), PofError> {
    for _ in 0..count {
        while next_byte(buf)? & 0x80 != 0 {}
    }
    Ok(())
}

fn next_byte(buf: &mut impl Buf) -> Result<u8, PofError> {
    if !buf.has_remaining() {
        return Err(PofError::Eof {
            needed: 1,
            remaining: 0,
        });
    }
    Ok(buf.get_u8())
}
