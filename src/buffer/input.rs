//! Positioned read view over an in-memory POF stream.

use bytes::{Buf, Bytes};

use crate::error::PofError;

/// A cursor over immutable bytes with offset queries, seeking and zero-copy
/// sub-views.
///
/// `PofInput` implements [`Buf`], so the packed-integer helpers in
/// [`crate::wire::packed`] work directly on it.
#[derive(Debug, Clone)]
pub struct PofInput {
    data: Bytes,
    pos: usize,
}

impl PofInput {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Current offset from the start of this view.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Moves the cursor to `offset`.
    pub fn seek(&mut self, offset: usize) -> Result<(), PofError> {
        if offset > self.data.len() {
            return Err(PofError::Eof {
                needed: offset,
                remaining: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn ensure(&self, needed: usize) -> Result<(), PofError> {
        let remaining = self.data.len() - self.pos;
        if remaining < needed {
            Err(PofError::Eof { needed, remaining })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, PofError> {
        self.ensure(1)?;
        Ok(self.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, PofError> {
        self.ensure(2)?;
        Ok(self.get_u16())
    }

    pub fn read_i16(&mut self) -> Result<i16, PofError> {
        self.ensure(2)?;
        Ok(self.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32, PofError> {
        self.ensure(4)?;
        Ok(self.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64, PofError> {
        self.ensure(8)?;
        Ok(self.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32, PofError> {
        self.ensure(4)?;
        Ok(self.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, PofError> {
        self.ensure(8)?;
        Ok(self.get_f64())
    }

    /// Reads `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, PofError> {
        self.ensure(len)?;
        let out = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), PofError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    /// Bytes between two offsets of this view, without moving the cursor.
    pub fn slice(&self, from: usize, to: usize) -> Result<Bytes, PofError> {
        if from > to || to > self.data.len() {
            return Err(PofError::Corrupted(format!(
                "invalid range {from}..{to} in buffer of {} bytes",
                self.data.len()
            )));
        }
        Ok(self.data.slice(from..to))
    }

    /// A fresh input over `len` bytes starting at `from`, positioned at 0.
    pub fn sub_view(&self, from: usize, len: usize) -> Result<PofInput, PofError> {
        Ok(PofInput::new(self.slice(from, from + len)?))
    }
}

impl Buf for PofInput {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn chunk(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.remaining(), "advance past end of PofInput");
        self.pos += cnt;
    }
}
