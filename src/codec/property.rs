//! Read-side position tracking within one user-type property stream.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::trace;

use crate::buffer::PofInput;
use crate::error::PofError;
use crate::wire::packed::get_packed_i32;
use crate::wire::skip::skip_value;

/// Sentinel index of an exhausted property stream; sorts after every real index.
pub(crate) const EOPS: i32 = i32::MAX;

/// Walks the `(index, value)` pairs of a user type in ascending order.
///
/// The header of the next property is always consumed ahead of time, so the
/// input sits at that property's value while `next` names its index.
#[derive(Debug)]
pub(crate) struct PropertyCursor {
    type_id: i32,
    version: i32,
    next: i32,
    /// Offset of the header of `next`.
    next_offset: usize,
    prev: i32,
    /// Nesting budget for skipping property values.
    depth: usize,
    /// Value spans of properties passed over on the way to a later index.
    skipped: BTreeMap<i32, (usize, usize)>,
}

impl PropertyCursor {
    /// Starts a cursor at the first property header. Skipped values may nest
    /// at most `depth` complex values deep.
    pub fn open(
        input: &mut PofInput,
        type_id: i32,
        version: i32,
        depth: usize,
    ) -> Result<Self, PofError> {
        let mut cursor = Self::empty(type_id, version);
        cursor.depth = depth;
        cursor.read_header(input)?;
        Ok(cursor)
    }

    /// A cursor over no properties at all.
    pub fn empty(type_id: i32, version: i32) -> Self {
        Self {
            type_id,
            version,
            next: EOPS,
            next_offset: 0,
            prev: -1,
            depth: 0,
            skipped: BTreeMap::new(),
        }
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Index of the next unread property, or -1 when exhausted.
    pub fn next_index(&self) -> i32 {
        if self.next == EOPS { -1 } else { self.next }
    }

    fn read_header(&mut self, input: &mut PofInput) -> Result<(), PofError> {
        self.next_offset = input.offset();
        let index = get_packed_i32(input)?;
        self.next = if index < 0 { EOPS } else { index };
        Ok(())
    }

    /// Skips to `index` and reports whether it is present. `-1` skips to the
    /// end of the stream.
    pub fn advance_to(&mut self, input: &mut PofInput, index: i32) -> Result<bool, PofError> {
        let target = if index == -1 { EOPS } else { index };
        if target <= self.prev {
            return Err(PofError::Protocol(format!(
                "previous property index={}, requested property index={} while reading user type {}",
                self.prev, index, self.type_id
            )));
        }
        while self.next < target {
            let start = input.offset();
            skip_value(input, self.depth)?;
            let len = input.offset() - start;
            trace!(index = self.next, offset = start, len, "property skipped");
            self.skipped.insert(self.next, (start, len));
            self.read_header(input)?;
        }
        Ok(self.next == target && target != EOPS)
    }

    /// Marks `index` as done, consuming the following header if `index` was
    /// the property just read.
    pub fn complete(&mut self, input: &mut PofInput, index: i32) -> Result<(), PofError> {
        if self.next == index {
            self.read_header(input)?;
        }
        self.prev = self.prev.max(index);
        Ok(())
    }

    /// Offset and length of the value of a property skipped earlier.
    pub fn skipped_span(&self, index: i32) -> Option<(usize, usize)> {
        self.skipped.get(&index).copied()
    }

    /// The encoded properties from the next unread header up to, but not
    /// including, the terminator. `None` once the stream is exhausted.
    pub fn read_remainder(&mut self, input: &mut PofInput) -> Result<Option<Bytes>, PofError> {
        if self.next == EOPS {
            return Ok(None);
        }
        let start = self.next_offset;
        let end = loop {
            skip_value(input, self.depth)?;
            let end = input.offset();
            if get_packed_i32(input)? < 0 {
                break end;
            }
        };
        self.next = EOPS;
        self.next_offset = end;
        input.slice(start, end).map(Some)
    }
}
