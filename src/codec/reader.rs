//! Positional POF reader.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use super::StateRef;
use super::property::PropertyCursor;
use crate::buffer::PofInput;
use crate::config::PofConfig;
use crate::context::{PofSerializer, TypeContext};
use crate::error::PofError;
use crate::identity::IdentityRegistry;
use crate::types::{
    DayTimeInterval, Decimal, PofObject, PofValue, RawDate, RawDateTime, RawQuad, RawTime,
    SparseArray, TimeInterval, TimeZone, YearMonthInterval,
};
use crate::wire::catalog::*;
use crate::wire::marker::*;
use crate::wire::packed::{get_count, get_packed_i32, get_packed_i64, get_packed_i128};
use crate::wire::utf::{get_char, get_string, get_unit};

/// Read-side bookkeeping for the root stream, one user-type value, or one
/// nested reader.
#[derive(Debug)]
struct ReadFrame {
    /// `None` at the root, which holds a single value and no properties.
    cursor: Option<PropertyCursor>,
    /// Identity announced for this value, bound once the value exists.
    pending_identity: Option<i32>,
    /// Property of the parent to complete when this nested reader closes.
    nested_prop: Option<i32>,
    /// Parent input, restored when a reader over a skipped span closes.
    saved_input: Option<PofInput>,
}

impl ReadFrame {
    fn root() -> Self {
        Self {
            cursor: None,
            pending_identity: None,
            nested_prop: None,
            saved_input: None,
        }
    }

    fn user_type(cursor: PropertyCursor, identity: Option<i32>) -> Self {
        Self {
            cursor: Some(cursor),
            pending_identity: identity,
            ..Self::root()
        }
    }
}

/// State shared by a root reader and every reader nested under it.
pub(crate) struct DecodeState {
    input: PofInput,
    ctx: Arc<dyn TypeContext>,
    config: PofConfig,
    identities: IdentityRegistry,
    frames: Vec<ReadFrame>,
    nesting: usize,
}

impl DecodeState {
    /// Drains and closes every nested reader above `depth`.
    fn close_nested(&mut self, depth: usize) -> Result<(), PofError> {
        while self.frames.len() > depth + 1 {
            let Some(mut frame) = self.frames.pop() else {
                break;
            };
            if let Some(cursor) = frame.cursor.as_mut() {
                cursor.read_remainder(&mut self.input)?;
            }
            if let Some(saved) = frame.saved_input.take() {
                self.input = saved;
            }
            if let Some(index) = frame.nested_prop {
                self.complete(self.frames.len() - 1, index)?;
            }
        }
        Ok(())
    }

    fn advance_to(&mut self, depth: usize, index: i32) -> Result<bool, PofError> {
        self.close_nested(depth)?;
        match self.frames[depth].cursor.as_mut() {
            Some(cursor) => cursor.advance_to(&mut self.input, index),
            None => Ok(true),
        }
    }

    fn complete(&mut self, depth: usize, index: i32) -> Result<(), PofError> {
        match self.frames[depth].cursor.as_mut() {
            Some(cursor) => cursor.complete(&mut self.input, index),
            None => Ok(()),
        }
    }

    fn cursor(&mut self, depth: usize) -> Result<&mut PropertyCursor, PofError> {
        self.frames[depth]
            .cursor
            .as_mut()
            .ok_or_else(|| PofError::Protocol("not in a user type".into()))
    }

    fn open_nested(&mut self, depth: usize, index: i32) -> Result<usize, PofError> {
        let parent = self.cursor(depth)?;
        let parent_type = parent.type_id();
        let span = parent.skipped_span(index);
        let frame = if let Some((start, len)) = span {
            self.close_nested(depth)?;
            let view = self.input.sub_view(start, len)?;
            let saved = std::mem::replace(&mut self.input, view);
            match self.read_nested_header() {
                Ok(frame) => ReadFrame {
                    saved_input: Some(saved),
                    ..frame
                },
                Err(e) => {
                    self.input = saved;
                    return Err(e);
                }
            }
        } else if self.advance_to(depth, index)? {
            ReadFrame {
                nested_prop: Some(index),
                ..self.read_nested_header()?
            }
        } else {
            self.complete(depth, index)?;
            ReadFrame::user_type(PropertyCursor::empty(-1, 0), None)
        };
        debug!(
            parent = parent_type,
            index,
            type_id = frame.cursor.as_ref().map_or(-1, PropertyCursor::type_id),
            "nested reader opened"
        );
        self.frames.push(frame);
        Ok(self.frames.len() - 1)
    }

    fn read_nested_header(&mut self) -> Result<ReadFrame, PofError> {
        let mut tag = get_packed_i32(&mut self.input)?;
        let mut identity = None;
        if tag == T_IDENTITY {
            identity = Some(get_packed_i32(&mut self.input)?);
            tag = read_identified_tag(&mut self.input)?;
        }
        if tag == V_REFERENCE_NULL {
            return Ok(ReadFrame::user_type(PropertyCursor::empty(-1, 0), None));
        }
        if tag < 0 {
            return Err(PofError::Corrupted(format!(
                "expected a user type, found {}",
                type_name(tag)
            )));
        }
        let version = read_version(&mut self.input, tag)?;
        let budget = self.skip_budget();
        let cursor = PropertyCursor::open(&mut self.input, tag, version, budget)?;
        Ok(ReadFrame::user_type(cursor, identity))
    }

    /// Pops every frame from `depth` up, restoring any input they replaced.
    fn unwind(&mut self, depth: usize) {
        while self.frames.len() > depth {
            if let Some(frame) = self.frames.pop() {
                if let Some(saved) = frame.saved_input {
                    self.input = saved;
                }
            }
        }
    }

    fn descend<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, PofError>,
    ) -> Result<T, PofError> {
        let limit = self.config.depth_limit();
        if self.nesting >= limit {
            return Err(PofError::Protocol(format!(
                "maximum nesting depth {limit} exceeded"
            )));
        }
        self.nesting += 1;
        let result = read(self);
        self.nesting -= 1;
        result
    }

    /// Complex values that may still be entered below the current one.
    fn skip_budget(&self) -> usize {
        self.config.depth_limit().saturating_sub(self.nesting)
    }

    fn read_tagged(&mut self) -> Result<PofValue, PofError> {
        let tag = get_packed_i32(&mut self.input)?;
        self.read_value(tag)
    }

    /// Decodes the value whose tag was just consumed.
    fn read_value(&mut self, tag: i32) -> Result<PofValue, PofError> {
        let input = &mut self.input;
        Ok(match tag {
            V_REFERENCE_NULL => PofValue::Null,
            V_BOOLEAN_FALSE => PofValue::Bool(false),
            V_BOOLEAN_TRUE => PofValue::Bool(true),
            V_STRING_ZERO_LENGTH => PofValue::String(String::new()),
            V_COLLECTION_EMPTY => PofValue::Array(Vec::new()),
            V_FP_POS_INFINITY => PofValue::Float64(f64::INFINITY),
            V_FP_NEG_INFINITY => PofValue::Float64(f64::NEG_INFINITY),
            V_FP_NAN => PofValue::Float64(f64::NAN),
            t if is_tiny_int(t) => PofValue::Int32(decode_tiny_int(t)),
            T_INT16 => PofValue::Int16(read_as_i16(input, tag)?),
            T_INT32 => PofValue::Int32(get_packed_i32(input)?),
            T_INT64 => PofValue::Int64(get_packed_i64(input)?),
            T_INT128 => PofValue::Int128(get_packed_i128(input)?),
            T_FLOAT32 => PofValue::Float32(input.read_f32()?),
            T_FLOAT64 => PofValue::Float64(input.read_f64()?),
            T_FLOAT128 => PofValue::Float128(read_quad(input)?),
            T_DECIMAL32 | T_DECIMAL64 | T_DECIMAL128 => PofValue::Decimal(read_decimal(input)?),
            T_BOOLEAN => PofValue::Bool(read_as_bool(input, tag)?),
            T_OCTET => PofValue::Octet(input.read_u8()?),
            T_CHAR => PofValue::Char(get_char(input)?),
            T_OCTET_STRING => match get_packed_i32(input)? {
                len if len < 0 => PofValue::Null,
                len => PofValue::Binary(input.read_bytes(len as usize)?),
            },
            T_CHAR_STRING => get_string(input)?.map_or(PofValue::Null, PofValue::String),
            T_DATE => {
                let date = read_raw_date(input)?;
                self.date_value(date)
            }
            T_TIME => {
                let time = read_raw_time(input)?;
                self.time_value(time)
            }
            T_DATETIME => {
                let date = read_raw_date(input)?;
                let time = read_raw_time(input)?;
                self.date_time_value(RawDateTime::new(date, time))
            }
            T_YEAR_MONTH_INTERVAL => PofValue::YearMonthInterval(YearMonthInterval::new(
                get_packed_i32(input)?,
                get_packed_i32(input)?,
            )),
            T_TIME_INTERVAL => PofValue::TimeInterval(TimeInterval::new(
                get_packed_i32(input)?,
                get_packed_i32(input)?,
                get_packed_i32(input)?,
                get_packed_i32(input)?,
            )),
            T_DAY_TIME_INTERVAL => PofValue::DayTimeInterval(DayTimeInterval::new(
                get_packed_i32(input)?,
                get_packed_i32(input)?,
                get_packed_i32(input)?,
                get_packed_i32(input)?,
                get_packed_i32(input)?,
            )),
            T_COLLECTION | T_ARRAY | T_UNIFORM_COLLECTION | T_UNIFORM_ARRAY | T_SPARSE_ARRAY
            | T_UNIFORM_SPARSE_ARRAY | T_MAP | T_UNIFORM_KEYS_MAP | T_UNIFORM_MAP => {
                self.descend(|s| s.read_complex(tag))?
            }
            T_IDENTITY => {
                let id = get_packed_i32(input)?;
                let next = read_identified_tag(input)?;
                if next >= 0 {
                    let version = read_version(&mut self.input, next)?;
                    return self.read_user_type(next, version, Some(id));
                }
                let value = self.read_value(next)?;
                self.identities.bind(id, value.clone())?;
                value
            }
            T_REFERENCE => {
                let id = get_packed_i32(input)?;
                self.identities.lookup(id)?
            }
            t if t >= 0 => {
                let version = read_version(input, t)?;
                return self.read_user_type(t, version, None);
            }
            _ => {
                return Err(PofError::Corrupted(format!("illegal type {tag}")));
            }
        })
    }

    fn read_complex(&mut self, tag: i32) -> Result<PofValue, PofError> {
        Ok(match tag {
            T_COLLECTION | T_ARRAY => {
                let count = get_count(&mut self.input)?;
                let items = (0..count)
                    .map(|_| self.read_tagged())
                    .collect::<Result<Vec<_>, _>>()?;
                if tag == T_ARRAY {
                    PofValue::Array(items)
                } else {
                    PofValue::Collection(items)
                }
            }
            T_UNIFORM_ARRAY => {
                let element = read_uniform_type(&mut self.input)?;
                let count = get_count(&mut self.input)?;
                match element {
                    T_BOOLEAN => PofValue::BoolArray(self.read_elements(element, count)?),
                    T_OCTET => PofValue::ByteArray(self.input.read_bytes(count)?.to_vec()),
                    T_CHAR => PofValue::CharArray(self.read_elements(element, count)?),
                    T_INT16 => PofValue::Int16Array(self.read_elements(element, count)?),
                    T_INT32 => PofValue::Int32Array(self.read_elements(element, count)?),
                    T_INT64 => PofValue::Int64Array(self.read_elements(element, count)?),
                    T_FLOAT32 => PofValue::Float32Array(self.read_elements(element, count)?),
                    T_FLOAT64 => PofValue::Float64Array(self.read_elements(element, count)?),
                    _ => PofValue::Array(self.read_uniform_items(element, count)?),
                }
            }
            T_UNIFORM_COLLECTION => {
                let element = read_uniform_type(&mut self.input)?;
                let count = get_count(&mut self.input)?;
                PofValue::Collection(self.read_uniform_items(element, count)?)
            }
            T_SPARSE_ARRAY | T_UNIFORM_SPARSE_ARRAY => {
                let element = if tag == T_UNIFORM_SPARSE_ARRAY {
                    Some(read_uniform_type(&mut self.input)?)
                } else {
                    None
                };
                let count = get_count(&mut self.input)?;
                let mut items = SparseArray::new();
                self.read_sparse_entries(count, |s, index| {
                    let value = match element {
                        Some(t) => s.read_uniform(t)?,
                        None => s.read_tagged()?,
                    };
                    items.insert(index as i32, value);
                    Ok(())
                })?;
                PofValue::SparseArray(items)
            }
            _ => {
                let keys = match tag {
                    T_UNIFORM_KEYS_MAP | T_UNIFORM_MAP => {
                        Some(read_uniform_type(&mut self.input)?)
                    }
                    _ => None,
                };
                let values = match tag {
                    T_UNIFORM_MAP => Some(read_uniform_type(&mut self.input)?),
                    _ => None,
                };
                let count = get_count(&mut self.input)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let key = match keys {
                        Some(t) => self.read_uniform(t)?,
                        None => self.read_tagged()?,
                    };
                    let value = match values {
                        Some(t) => self.read_uniform(t)?,
                        None => self.read_tagged()?,
                    };
                    entries.push((key, value));
                }
                PofValue::Map(entries)
            }
        })
    }

    /// Reads `(index, value)` pairs until a negative index. Indices must be
    /// below `count`, and at most `count` entries precede the terminator.
    fn read_sparse_entries(
        &mut self,
        count: usize,
        mut entry: impl FnMut(&mut Self, usize) -> Result<(), PofError>,
    ) -> Result<(), PofError> {
        for _ in 0..=count {
            let index = get_packed_i32(&mut self.input)?;
            if index < 0 {
                return Ok(());
            }
            let index = index as usize;
            if index >= count {
                return Err(PofError::Corrupted(format!(
                    "sparse index {index} out of bounds for {count} elements"
                )));
            }
            entry(self, index)?;
        }
        Err(PofError::Corrupted(format!(
            "sparse array of {count} elements is not terminated"
        )))
    }

    fn read_elements<T: ArrayElement>(
        &mut self,
        element: i32,
        count: usize,
    ) -> Result<Vec<T>, PofError> {
        (0..count).map(|_| T::read(&mut self.input, element)).collect()
    }

    fn read_uniform_items(&mut self, element: i32, count: usize) -> Result<Vec<PofValue>, PofError> {
        (0..count).map(|_| self.read_uniform(element)).collect()
    }

    /// Reads an untagged element of a uniform form. User-type elements may
    /// still carry an identity before their version.
    fn read_uniform(&mut self, element: i32) -> Result<PofValue, PofError> {
        if element < 0 {
            return self.read_value(element);
        }
        let first = get_packed_i32(&mut self.input)?;
        if first == T_IDENTITY {
            let id = get_packed_i32(&mut self.input)?;
            let version = read_version(&mut self.input, element)?;
            self.read_user_type(element, version, Some(id))
        } else if first < 0 {
            Err(PofError::Corrupted(format!(
                "negative version id {first} for user type {element}"
            )))
        } else {
            self.read_user_type(element, first, None)
        }
    }

    fn read_user_type(
        &mut self,
        type_id: i32,
        version: i32,
        identity: Option<i32>,
    ) -> Result<PofValue, PofError> {
        let serializer = self.ctx.serializer_for(type_id)?;
        self.descend(|s| s.deserialize_user_type(&*serializer, type_id, version, identity))
    }

    fn deserialize_user_type(
        &mut self,
        serializer: &dyn PofSerializer,
        type_id: i32,
        version: i32,
        identity: Option<i32>,
    ) -> Result<PofValue, PofError> {
        let budget = self.skip_budget();
        let cursor = PropertyCursor::open(&mut self.input, type_id, version, budget)?;
        self.frames.push(ReadFrame::user_type(cursor, identity));
        let depth = self.frames.len() - 1;
        let result = {
            let mut reader = PofReader {
                state: StateRef::Borrowed(&mut *self),
                depth,
            };
            serializer.deserialize(&mut reader)
        }
        .and_then(|obj| self.finish_user_type(depth, obj));
        self.unwind(depth);
        result.map(PofValue::Object)
    }

    /// Skips whatever the serializer left unread and binds a still-pending
    /// identity to the finished value.
    fn finish_user_type(&mut self, depth: usize, obj: PofObject) -> Result<PofObject, PofError> {
        self.close_nested(depth)?;
        let frame = &mut self.frames[depth];
        if let Some(cursor) = frame.cursor.as_mut() {
            if let Some(rest) = cursor.read_remainder(&mut self.input)? {
                debug!(type_id = cursor.type_id(), len = rest.len(), "unread properties discarded");
            }
        }
        if let Some(id) = frame.pending_identity.take() {
            self.identities.bind(id, PofValue::Object(obj.clone()))?;
        }
        Ok(obj)
    }

    fn read_element<T: ArrayElement>(&mut self, tag: i32) -> Result<T, PofError> {
        match tag {
            T_IDENTITY | T_REFERENCE => {
                let value = self.read_value(tag)?;
                T::from_value(&value).ok_or_else(|| mismatch(T::NAME, &value))
            }
            _ => T::read(&mut self.input, tag),
        }
    }

    /// Reads a whole array of `T` from any array-like encoding.
    fn read_typed_array<T: ArrayElement>(&mut self, tag: i32) -> Result<Option<Vec<T>>, PofError> {
        let items = match tag {
            V_REFERENCE_NULL => return Ok(None),
            V_COLLECTION_EMPTY => Vec::new(),
            T_ARRAY | T_COLLECTION => {
                let count = get_count(&mut self.input)?;
                (0..count)
                    .map(|_| {
                        let tag = get_packed_i32(&mut self.input)?;
                        self.read_element(tag)
                    })
                    .collect::<Result<_, _>>()?
            }
            T_UNIFORM_ARRAY | T_UNIFORM_COLLECTION => {
                let element = read_uniform_type(&mut self.input)?;
                let count = get_count(&mut self.input)?;
                if element == T_OCTET {
                    T::read_raw(&mut self.input, count)?
                } else {
                    self.read_elements(element, count)?
                }
            }
            T_SPARSE_ARRAY | T_UNIFORM_SPARSE_ARRAY => {
                let element = if tag == T_UNIFORM_SPARSE_ARRAY {
                    Some(read_uniform_type(&mut self.input)?)
                } else {
                    None
                };
                let count = get_count(&mut self.input)?;
                check_dense_len(count, self.config.sparse_len_limit())?;
                let mut items = Vec::new();
                self.read_sparse_entries(count, |s, index| {
                    let value = match element {
                        Some(t) => T::read(&mut s.input, t)?,
                        None => {
                            let tag = get_packed_i32(&mut s.input)?;
                            s.read_element(tag)?
                        }
                    };
                    if items.len() <= index {
                        items.resize(index + 1, T::default());
                    }
                    items[index] = value;
                    Ok(())
                })?;
                items.resize(count, T::default());
                items
            }
            T_IDENTITY => {
                let id = get_packed_i32(&mut self.input)?;
                let next = read_identified_tag(&mut self.input)?;
                let items = self.read_typed_array::<T>(next)?;
                if let Some(items) = &items {
                    self.identities.bind(id, T::wrap(items.clone()))?;
                }
                return Ok(items);
            }
            T_REFERENCE => {
                let id = get_packed_i32(&mut self.input)?;
                let value = self.identities.lookup(id)?;
                return values_to_array(&value).map(Some);
            }
            _ => return Err(PofError::conversion(T::ARRAY_NAME, tag)),
        };
        Ok(Some(items))
    }

    fn date_value(&self, date: RawDate) -> PofValue {
        if self.ctx.prefer_chrono() {
            if let Ok(d) = date.to_naive() {
                return PofValue::LocalDate(d);
            }
        }
        PofValue::Date(date)
    }

    fn time_value(&self, time: RawTime) -> PofValue {
        if self.ctx.prefer_chrono() && time.zone == TimeZone::None {
            if let Ok(t) = time.to_naive() {
                return PofValue::LocalTime(t);
            }
        }
        PofValue::Time(time)
    }

    fn date_time_value(&self, dt: RawDateTime) -> PofValue {
        if self.ctx.prefer_chrono() {
            let converted = match dt.time.zone {
                TimeZone::None => dt.to_naive().map(PofValue::LocalDateTime),
                _ => dt.to_offset().map(PofValue::OffsetDateTime),
            };
            if let Ok(value) = converted {
                return value;
            }
        }
        PofValue::DateTime(dt)
    }
}

/// Tag of the value an identity marker applies to. Identities never stack
/// and never name a reference.
fn read_identified_tag(input: &mut PofInput) -> Result<i32, PofError> {
    match get_packed_i32(input)? {
        tag @ (T_IDENTITY | T_REFERENCE) => Err(PofError::Corrupted(format!(
            "{} follows an identity marker",
            type_name(tag)
        ))),
        tag => Ok(tag),
    }
}

fn read_version(input: &mut PofInput, type_id: i32) -> Result<i32, PofError> {
    let version = get_packed_i32(input)?;
    if version < 0 {
        return Err(PofError::Corrupted(format!(
            "negative version id {version} for user type {type_id}"
        )));
    }
    Ok(version)
}

fn read_raw_date(input: &mut PofInput) -> Result<RawDate, PofError> {
    Ok(RawDate::new(
        get_packed_i32(input)?,
        get_packed_i32(input)?,
        get_packed_i32(input)?,
    ))
}

/// A positive fraction counts milliseconds, a negative one nanoseconds.
fn read_raw_time(input: &mut PofInput) -> Result<RawTime, PofError> {
    let hour = get_packed_i32(input)?;
    let minute = get_packed_i32(input)?;
    let second = get_packed_i32(input)?;
    let fraction = get_packed_i32(input)?;
    let nano = if fraction < 0 {
        fraction.checked_neg()
    } else {
        fraction.checked_mul(1_000_000)
    }
    .ok_or_else(|| PofError::Corrupted(format!("illegal time fraction {fraction}")))?;
    let zone = match get_packed_i32(input)? {
        0 => TimeZone::None,
        1 => TimeZone::Utc,
        2 => TimeZone::Offset {
            hours: get_packed_i32(input)?,
            minutes: get_packed_i32(input)?,
        },
        z => {
            return Err(PofError::Corrupted(format!("illegal time zone type {z}")));
        }
    };
    Ok(RawTime::new(hour, minute, second, nano, zone))
}

fn mismatch(target: &'static str, value: &PofValue) -> PofError {
    PofError::UnsupportedConversion {
        target,
        found: value.kind().to_string(),
    }
}

fn values_to_array<T: ArrayElement>(value: &PofValue) -> Result<Vec<T>, PofError> {
    T::unwrap(value)
        .or_else(|| value.as_slice()?.iter().map(T::from_value).collect())
        .ok_or_else(|| mismatch(T::ARRAY_NAME, value))
}

/// An element type of the typed array accessors.
pub(crate) trait ArrayElement: Copy + Default {
    const NAME: &'static str;
    const ARRAY_NAME: &'static str;

    /// Reads one element whose tag is `tag`.
    fn read(input: &mut PofInput, tag: i32) -> Result<Self, PofError>;

    /// Reads `count` elements packed as big-endian octets.
    fn read_raw(input: &mut PofInput, count: usize) -> Result<Vec<Self>, PofError>;

    fn from_value(value: &PofValue) -> Option<Self>;

    fn wrap(items: Vec<Self>) -> PofValue;

    fn unwrap(value: &PofValue) -> Option<Vec<Self>>;
}

macro_rules! array_element {
    ($ty:ty, $name:literal, $variant:ident, $read:ident, |$v:ident| $from:expr, |$input:ident, $count:ident| $raw:expr) => {
        impl ArrayElement for $ty {
            const NAME: &'static str = $name;
            const ARRAY_NAME: &'static str = concat!($name, "[]");

            fn read(input: &mut PofInput, tag: i32) -> Result<Self, PofError> {
                $read(input, tag)
            }

            fn read_raw($input: &mut PofInput, $count: usize) -> Result<Vec<Self>, PofError> {
                $raw
            }

            fn from_value($v: &PofValue) -> Option<Self> {
                $from
            }

            fn wrap(items: Vec<Self>) -> PofValue {
                PofValue::$variant(items)
            }

            fn unwrap(value: &PofValue) -> Option<Vec<Self>> {
                match value {
                    PofValue::$variant(items) => Some(items.clone()),
                    _ => None,
                }
            }
        }
    };
}

array_element!(bool, "bool", BoolArray, read_as_bool, |v| v.as_bool(), |input, count| {
    Ok(input.read_bytes(count)?.iter().map(|b| *b != 0).collect())
});
array_element!(u8, "u8", ByteArray, read_as_u8, |v| v.as_i64().map(|n| n as u8), |input, count| {
    Ok(input.read_bytes(count)?.to_vec())
});
array_element!(
    char,
    "char",
    CharArray,
    read_as_char,
    |v| match v {
        PofValue::Char(c) => Some(*c),
        _ => v.as_i64().and_then(|n| char::from_u32(n as u32)),
    },
    |input, count| {
        input.ensure(count * 2)?;
        (0..count)
            .map(|_| {
                let unit = get_unit(input)?;
                char::from_u32(u32::from(unit))
                    .ok_or_else(|| PofError::Corrupted(format!("unpaired surrogate {unit:#x}")))
            })
            .collect()
    }
);
array_element!(i16, "i16", Int16Array, read_as_i16, |v| v.as_i64().map(|n| n as i16), |input, count| {
    read_raw_elements(input, count * <i16 as RawElement>::WIDTH)
});
array_element!(i32, "i32", Int32Array, read_as_i32, |v| v.as_i64().map(|n| n as i32), |input, count| {
    read_raw_elements(input, count * <i32 as RawElement>::WIDTH)
});
array_element!(i64, "i64", Int64Array, read_as_i64, |v| v.as_i64(), |input, count| {
    read_raw_elements(input, count * <i64 as RawElement>::WIDTH)
});
array_element!(f32, "f32", Float32Array, read_as_f32, |v| v.as_f64().map(|f| f as f32), |input, count| {
    read_raw_elements(input, count * <f32 as RawElement>::WIDTH)
});
array_element!(f64, "f64", Float64Array, read_as_f64, |v| v.as_f64(), |input, count| {
    read_raw_elements(input, count * <f64 as RawElement>::WIDTH)
});

/// Reads values from a POF stream, either a single top-level value or the
/// properties of a user type.
///
/// Properties are read in ascending index order. Asking for an index that
/// is absent from the stream yields the accessor's default: zero, `false`,
/// or `None`. Asking for an index at or below one already read is a
/// protocol error.
pub struct PofReader<'a> {
    state: StateRef<'a, DecodeState>,
    depth: usize,
}

impl PofReader<'static> {
    pub fn new(ctx: Arc<dyn TypeContext>, config: PofConfig, bytes: impl Into<Bytes>) -> Self {
        let state = DecodeState {
            input: PofInput::new(bytes),
            ctx,
            config,
            identities: IdentityRegistry::new(),
            frames: vec![ReadFrame::root()],
            nesting: 0,
        };
        Self {
            state: StateRef::Owned(Box::new(state)),
            depth: 0,
        }
    }
}

impl PofReader<'_> {
    /// User-type id of the value being read; -1 at the root.
    pub fn type_id(&self) -> i32 {
        self.state.frames[self.depth]
            .cursor
            .as_ref()
            .map_or(-1, PropertyCursor::type_id)
    }

    pub fn version_id(&self) -> i32 {
        self.state.frames[self.depth]
            .cursor
            .as_ref()
            .map_or(0, PropertyCursor::version)
    }

    /// Index of the next property present in the stream, or -1 when none
    /// remain.
    pub fn next_property_index(&mut self) -> Result<i32, PofError> {
        let depth = self.depth;
        self.state.close_nested(depth)?;
        Ok(self.state.frames[depth]
            .cursor
            .as_ref()
            .map_or(-1, PropertyCursor::next_index))
    }

    pub fn context(&self) -> &dyn TypeContext {
        &*self.state.ctx
    }

    /// Binds the identity announced for the value being read to `obj`, so
    /// that references to it from within its own properties resolve.
    pub fn register_identity(&mut self, obj: &PofObject) -> Result<(), PofError> {
        let state = &mut *self.state;
        if let Some(id) = state.frames[self.depth].pending_identity.take() {
            state.identities.bind(id, PofValue::Object(obj.clone()))?;
        }
        Ok(())
    }

    fn property<T>(
        &mut self,
        index: i32,
        absent: impl FnOnce() -> T,
        read: impl FnOnce(&mut DecodeState, i32) -> Result<T, PofError>,
    ) -> Result<T, PofError> {
        let depth = self.depth;
        let state = &mut *self.state;
        let value = if state.advance_to(depth, index)? {
            let tag = get_packed_i32(&mut state.input)?;
            read(state, tag)?
        } else {
            absent()
        };
        state.complete(depth, index)?;
        Ok(value)
    }

    fn scalar<T: Default>(
        &mut self,
        index: i32,
        target: &'static str,
        coerce: impl FnOnce(&mut PofInput, i32) -> Result<T, PofError>,
        from_value: impl FnOnce(&PofValue) -> Option<T>,
    ) -> Result<T, PofError> {
        self.property(index, T::default, |s, tag| match tag {
            T_IDENTITY | T_REFERENCE => {
                let value = s.read_value(tag)?;
                from_value(&value).ok_or_else(|| mismatch(target, &value))
            }
            _ => coerce(&mut s.input, tag),
        })
    }

    /// Reads any value and converts it, treating null as absent.
    fn converted<T>(
        &mut self,
        index: i32,
        target: &'static str,
        convert: impl FnOnce(PofValue) -> Option<T>,
    ) -> Result<Option<T>, PofError> {
        self.try_converted(index, target, |v| Ok(convert(v)))
    }

    fn try_converted<T>(
        &mut self,
        index: i32,
        target: &'static str,
        convert: impl FnOnce(PofValue) -> Result<Option<T>, PofError>,
    ) -> Result<Option<T>, PofError> {
        self.property(
            index,
            || None,
            |s, tag| {
                let value = s.read_value(tag)?;
                if value.is_null() {
                    return Ok(None);
                }
                let kind = value.kind();
                convert(value)?
                    .map(Some)
                    .ok_or_else(|| PofError::UnsupportedConversion {
                        target,
                        found: kind.to_string(),
                    })
            },
        )
    }

    fn typed_array<T: ArrayElement>(&mut self, index: i32) -> Result<Option<Vec<T>>, PofError> {
        self.property(index, || None, |s, tag| s.read_typed_array(tag))
    }

    pub fn read_bool(&mut self, index: i32) -> Result<bool, PofError> {
        self.scalar(index, "bool", read_as_bool, PofValue::as_bool)
    }

    pub fn read_octet(&mut self, index: i32) -> Result<u8, PofError> {
        self.scalar(index, "u8", read_as_u8, <u8 as ArrayElement>::from_value)
    }

    pub fn read_char(&mut self, index: i32) -> Result<char, PofError> {
        self.scalar(index, "char", read_as_char, <char as ArrayElement>::from_value)
    }

    pub fn read_i16(&mut self, index: i32) -> Result<i16, PofError> {
        self.scalar(index, "i16", read_as_i16, <i16 as ArrayElement>::from_value)
    }

    pub fn read_i32(&mut self, index: i32) -> Result<i32, PofError> {
        self.scalar(index, "i32", read_as_i32, <i32 as ArrayElement>::from_value)
    }

    pub fn read_i64(&mut self, index: i32) -> Result<i64, PofError> {
        self.scalar(index, "i64", read_as_i64, PofValue::as_i64)
    }

    pub fn read_i128(&mut self, index: i32) -> Result<i128, PofError> {
        self.scalar(index, "i128", read_as_i128, |v| match v {
            PofValue::Int128(n) => Some(*n),
            _ => v.as_i64().map(i128::from),
        })
    }

    pub fn read_f32(&mut self, index: i32) -> Result<f32, PofError> {
        self.scalar(index, "f32", read_as_f32, <f32 as ArrayElement>::from_value)
    }

    pub fn read_f64(&mut self, index: i32) -> Result<f64, PofError> {
        self.scalar(index, "f64", read_as_f64, PofValue::as_f64)
    }

    pub fn read_quad(&mut self, index: i32) -> Result<RawQuad, PofError> {
        self.scalar(index, "quad", read_as_quad, |v| match v {
            PofValue::Float128(q) => Some(*q),
            _ => v.as_f64().map(RawQuad::from_f64),
        })
    }

    pub fn read_decimal(&mut self, index: i32) -> Result<Option<Decimal>, PofError> {
        self.converted(index, "decimal", |v| match v {
            PofValue::Decimal(d) => Some(d),
            PofValue::Int128(n) => Some(Decimal::from(n)),
            PofValue::Float32(_) | PofValue::Float64(_) => {
                v.as_f64().and_then(|f| Decimal::from_f64(f).ok())
            }
            _ => v.as_i64().map(Decimal::from),
        })
    }

    /// Reads an octet string. The empty-string literal reads as empty bytes.
    pub fn read_binary(&mut self, index: i32) -> Result<Option<Bytes>, PofError> {
        self.converted(index, "binary", |v| match v {
            PofValue::Binary(b) => Some(b),
            PofValue::ByteArray(b) => Some(Bytes::from(b)),
            PofValue::String(s) if s.is_empty() => Some(Bytes::new()),
            _ => None,
        })
    }

    pub fn read_string(&mut self, index: i32) -> Result<Option<String>, PofError> {
        self.converted(index, "string", |v| match v {
            PofValue::String(s) => Some(s),
            PofValue::Char(c) => Some(c.to_string()),
            _ => None,
        })
    }

    /// Reads a date, accepting the date part of a date-time.
    pub fn read_date(&mut self, index: i32) -> Result<Option<RawDate>, PofError> {
        self.converted(index, "date", |v| match v {
            PofValue::Date(d) => Some(d),
            PofValue::LocalDate(d) => Some(d.into()),
            PofValue::DateTime(dt) => Some(dt.date),
            PofValue::LocalDateTime(dt) => Some(dt.date().into()),
            PofValue::OffsetDateTime(dt) => Some(RawDateTime::from(dt).date),
            _ => None,
        })
    }

    /// Reads a time, accepting the time part of a date-time.
    pub fn read_time(&mut self, index: i32) -> Result<Option<RawTime>, PofError> {
        self.converted(index, "time", |v| match v {
            PofValue::Time(t) => Some(t),
            PofValue::LocalTime(t) => Some(t.into()),
            PofValue::DateTime(dt) => Some(dt.time),
            PofValue::LocalDateTime(dt) => Some(dt.time().into()),
            PofValue::OffsetDateTime(dt) => Some(RawDateTime::from(dt).time),
            _ => None,
        })
    }

    /// Reads a date-time; a bare date reads as its midnight.
    pub fn read_date_time(&mut self, index: i32) -> Result<Option<RawDateTime>, PofError> {
        self.converted(index, "datetime", |v| match v {
            PofValue::DateTime(dt) => Some(dt),
            PofValue::LocalDateTime(dt) => Some(dt.into()),
            PofValue::OffsetDateTime(dt) => Some(dt.into()),
            PofValue::Date(d) => Some(RawDateTime::new(d, RawTime::local(0, 0, 0, 0))),
            PofValue::LocalDate(d) => Some(RawDateTime::new(d.into(), RawTime::local(0, 0, 0, 0))),
            _ => None,
        })
    }

    pub fn read_local_date(&mut self, index: i32) -> Result<Option<NaiveDate>, PofError> {
        self.read_date(index)?.map(|d| d.to_naive()).transpose()
    }

    pub fn read_local_time(&mut self, index: i32) -> Result<Option<NaiveTime>, PofError> {
        self.read_time(index)?.map(|t| t.to_naive()).transpose()
    }

    pub fn read_local_date_time(&mut self, index: i32) -> Result<Option<NaiveDateTime>, PofError> {
        self.read_date_time(index)?.map(|dt| dt.to_naive()).transpose()
    }

    /// Reads a zoned date-time. A local date-time has no offset and fails.
    pub fn read_offset_date_time(
        &mut self,
        index: i32,
    ) -> Result<Option<DateTime<FixedOffset>>, PofError> {
        self.read_date_time(index)?.map(|dt| dt.to_offset()).transpose()
    }

    pub fn read_year_month_interval(
        &mut self,
        index: i32,
    ) -> Result<Option<YearMonthInterval>, PofError> {
        self.converted(index, "year-month interval", |v| match v {
            PofValue::YearMonthInterval(i) => Some(i),
            _ => None,
        })
    }

    pub fn read_time_interval(&mut self, index: i32) -> Result<Option<TimeInterval>, PofError> {
        self.converted(index, "time interval", |v| match v {
            PofValue::TimeInterval(i) => Some(i),
            _ => None,
        })
    }

    pub fn read_day_time_interval(
        &mut self,
        index: i32,
    ) -> Result<Option<DayTimeInterval>, PofError> {
        self.converted(index, "day-time interval", |v| match v {
            PofValue::DayTimeInterval(i) => Some(i),
            _ => None,
        })
    }

    pub fn read_bool_array(&mut self, index: i32) -> Result<Option<Vec<bool>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_byte_array(&mut self, index: i32) -> Result<Option<Vec<u8>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_char_array(&mut self, index: i32) -> Result<Option<Vec<char>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_i16_array(&mut self, index: i32) -> Result<Option<Vec<i16>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_i32_array(&mut self, index: i32) -> Result<Option<Vec<i32>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_i64_array(&mut self, index: i32) -> Result<Option<Vec<i64>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_f32_array(&mut self, index: i32) -> Result<Option<Vec<f32>>, PofError> {
        self.typed_array(index)
    }

    pub fn read_f64_array(&mut self, index: i32) -> Result<Option<Vec<f64>>, PofError> {
        self.typed_array(index)
    }

    /// Reads any value in its natural representation. An absent property
    /// reads as [`PofValue::Null`].
    pub fn read_object(&mut self, index: i32) -> Result<PofValue, PofError> {
        self.property(index, || PofValue::Null, |s, tag| s.read_value(tag))
    }

    /// Reads any array-like value as a list of values. Sparse arrays are
    /// expanded with nulls.
    pub fn read_array(&mut self, index: i32) -> Result<Option<Vec<PofValue>>, PofError> {
        let limit = self.state.config.sparse_len_limit();
        self.try_converted(index, "array", |v| into_items(v, limit))
    }

    pub fn read_collection(&mut self, index: i32) -> Result<Option<Vec<PofValue>>, PofError> {
        self.read_array(index)
    }

    pub fn read_sparse_array(&mut self, index: i32) -> Result<Option<SparseArray>, PofError> {
        let limit = self.state.config.sparse_len_limit();
        self.try_converted(index, "sparse array", |v| match v {
            PofValue::SparseArray(items) => Ok(Some(items)),
            other => Ok(into_items(other, limit)?.map(|items| {
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i as i32, v))
                    .collect()
            })),
        })
    }

    pub fn read_map(&mut self, index: i32) -> Result<Option<Vec<(PofValue, PofValue)>>, PofError> {
        self.converted(index, "map", |v| match v {
            PofValue::Map(entries) => Some(entries),
            PofValue::Array(items) | PofValue::Collection(items) if items.is_empty() => {
                Some(Vec::new())
            }
            _ => None,
        })
    }

    /// Opens a reader over the user-type value at `index`, which may have
    /// been passed over already. An absent property yields a reader with no
    /// properties. The nested reader is drained and closed when this reader
    /// next moves.
    pub fn create_nested_reader(&mut self, index: i32) -> Result<PofReader<'_>, PofError> {
        let depth = self.state.open_nested(self.depth, index)?;
        Ok(PofReader {
            state: StateRef::Borrowed(&mut *self.state),
            depth,
        })
    }

    /// The encoded properties not read so far, excluding the terminator.
    /// `None` when every property was read.
    pub fn read_remainder(&mut self) -> Result<Option<Bytes>, PofError> {
        let depth = self.depth;
        let state = &mut *self.state;
        state.close_nested(depth)?;
        let cursor = state.frames[depth]
            .cursor
            .as_mut()
            .ok_or_else(|| PofError::Protocol("not in a user type".into()))?;
        let rest = cursor.read_remainder(&mut state.input)?;
        if let Some(bytes) = &rest {
            debug!(type_id = cursor.type_id(), len = bytes.len(), "remainder captured");
        }
        Ok(rest)
    }
}

/// Sparse arrays longer than `limit` once expanded are rejected.
fn into_items(value: PofValue, limit: usize) -> Result<Option<Vec<PofValue>>, PofError> {
    fn lift<T: Into<PofValue>>(items: Vec<T>) -> Vec<PofValue> {
        items.into_iter().map(Into::into).collect()
    }
    Ok(Some(match value {
        PofValue::Array(items) | PofValue::Collection(items) => items,
        PofValue::BoolArray(v) => lift(v),
        PofValue::ByteArray(v) => v.into_iter().map(PofValue::Octet).collect(),
        PofValue::CharArray(v) => lift(v),
        PofValue::Int16Array(v) => lift(v),
        PofValue::Int32Array(v) => lift(v),
        PofValue::Int64Array(v) => lift(v),
        PofValue::Float32Array(v) => lift(v),
        PofValue::Float64Array(v) => lift(v),
        PofValue::SparseArray(items) => {
            let len = items.keys().next_back().map_or(0, |&last| last.max(-1) + 1) as usize;
            check_dense_len(len, limit)?;
            let mut dense = vec![PofValue::Null; len];
            for (i, v) in items {
                if let Ok(i) = usize::try_from(i) {
                    dense[i] = v;
                }
            }
            dense
        }
        _ => return Ok(None),
    }))
}

fn check_dense_len(len: usize, limit: usize) -> Result<(), PofError> {
    if len > limit {
        return Err(PofError::Corrupted(format!(
            "sparse array of {len} elements exceeds the expansion limit {limit}"
        )));
    }
    Ok(())
}

impl std::fmt::Debug for PofReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PofReader")
            .field("type_id", &self.type_id())
            .field("depth", &self.depth)
            .field("offset", &self.state.input.offset())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimplePofContext;
    use crate::wire::packed::put_packed_i32;
    use bytes::{BufMut, BytesMut};

    fn reader_with(config: PofConfig, f: impl FnOnce(&mut BytesMut)) -> PofReader<'static> {
        let mut b = BytesMut::new();
        f(&mut b);
        let ctx = Arc::new(SimplePofContext::builder().build().unwrap());
        PofReader::new(ctx, config, b.freeze())
    }

    fn reader(f: impl FnOnce(&mut BytesMut)) -> PofReader<'static> {
        reader_with(PofConfig::default(), f)
    }

    fn packed_with(config: PofConfig, values: &[i32]) -> PofReader<'static> {
        reader_with(config, |b| {
            for n in values {
                put_packed_i32(b, *n);
            }
        })
    }

    fn packed(values: &[i32]) -> PofReader<'static> {
        packed_with(PofConfig::default(), values)
    }

    #[test]
    fn literals() {
        assert_eq!(packed(&[V_INT_0 - 5]).read_i32(-1).unwrap(), 5);
        assert_eq!(packed(&[V_INT_NEG_1]).read_i64(-1).unwrap(), -1);
        assert!(packed(&[V_BOOLEAN_TRUE]).read_bool(-1).unwrap());
        assert_eq!(packed(&[V_REFERENCE_NULL]).read_i32(-1).unwrap(), 0);
        assert_eq!(
            packed(&[V_STRING_ZERO_LENGTH]).read_string(-1).unwrap(),
            Some(String::new())
        );
        assert_eq!(packed(&[V_REFERENCE_NULL]).read_string(-1).unwrap(), None);
        assert!(packed(&[V_FP_NAN]).read_f64(-1).unwrap().is_nan());
    }

    #[test]
    fn widening_and_narrowing() {
        assert_eq!(packed(&[T_INT16, 300]).read_i64(-1).unwrap(), 300);
        assert_eq!(packed(&[T_INT32, 70000]).read_i16(-1).unwrap(), 70000_i32 as i16);
        let mut r = reader(|b| {
            put_packed_i32(b, T_FLOAT64);
            b.put_f64(2.5);
        });
        assert_eq!(r.read_i32(-1).unwrap(), 2);
    }

    #[test]
    fn natural_values() {
        assert_eq!(
            packed(&[T_INT16, 3]).read_object(-1).unwrap(),
            PofValue::Int16(3)
        );
        assert_eq!(
            packed(&[T_UNIFORM_ARRAY, T_INT32, 2, 7, 300]).read_object(-1).unwrap(),
            PofValue::Int32Array(vec![7, 300])
        );
        assert_eq!(
            packed(&[T_UNIFORM_COLLECTION, T_INT32, 1, 7]).read_object(-1).unwrap(),
            PofValue::Collection(vec![PofValue::Int32(7)])
        );
        assert_eq!(
            packed(&[T_UNIFORM_KEYS_MAP, T_INT32, 1, 4, V_BOOLEAN_TRUE]).read_object(-1).unwrap(),
            PofValue::Map(vec![(PofValue::Int32(4), PofValue::Bool(true))])
        );
        assert_eq!(
            packed(&[T_DATE, 2024, 2, 29]).read_object(-1).unwrap(),
            PofValue::LocalDate(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
    }

    #[test]
    fn sparse_reads() {
        let value = packed(&[T_SPARSE_ARRAY, 5, 1, V_INT_0 - 3, 4, T_INT32, 300, -1])
            .read_object(-1)
            .unwrap();
        let mut expected = SparseArray::new();
        expected.insert(1, PofValue::Int32(3));
        expected.insert(4, PofValue::Int32(300));
        assert_eq!(value, PofValue::SparseArray(expected));

        let dense = packed(&[T_UNIFORM_SPARSE_ARRAY, T_INT32, 4, 2, 9, -1])
            .read_i32_array(-1)
            .unwrap();
        assert_eq!(dense, Some(vec![0, 0, 9, 0]));

        let err = packed(&[T_SPARSE_ARRAY, 2, 2, V_INT_0, -1])
            .read_object(-1)
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn raw_arrays_declare_element_count() {
        let mut r = reader(|b| {
            for n in [T_UNIFORM_ARRAY, T_OCTET, 2] {
                put_packed_i32(b, n);
            }
            b.put_i32(-7);
            b.put_i32(1 << 20);
        });
        assert_eq!(r.read_i32_array(-1).unwrap(), Some(vec![-7, 1 << 20]));
    }

    #[test]
    fn identity_and_reference_outside_user_types() {
        let mut b = BytesMut::new();
        for n in [T_ARRAY, 2, T_IDENTITY, 4, T_CHAR_STRING, 1] {
            put_packed_i32(&mut b, n);
        }
        b.put_u8(b'x');
        put_packed_i32(&mut b, T_REFERENCE);
        put_packed_i32(&mut b, 4);
        let ctx = Arc::new(SimplePofContext::builder().build().unwrap());
        let value = PofReader::new(ctx, PofConfig::default(), b.freeze())
            .read_object(-1)
            .unwrap();
        assert_eq!(
            value,
            PofValue::Array(vec![PofValue::from("x"), PofValue::from("x")])
        );

        let err = packed(&[T_REFERENCE, 9]).read_object(-1).unwrap_err();
        assert!(matches!(err, PofError::MissingIdentity(9)));
    }

    #[test]
    fn malformed_input() {
        assert!(packed(&[-70]).read_object(-1).unwrap_err().is_corruption());
        assert!(packed(&[T_ARRAY, -3]).read_object(-1).unwrap_err().is_corruption());
        assert!(matches!(
            packed(&[T_ARRAY, 3, V_INT_0]).read_object(-1).unwrap_err(),
            PofError::Eof { .. }
        ));
        assert!(matches!(
            packed(&[42, 0, -1]).read_object(-1).unwrap_err(),
            PofError::UnknownUserType(_)
        ));
    }

    #[test]
    fn nesting_is_bounded() {
        let mut b = BytesMut::new();
        for _ in 0..10 {
            put_packed_i32(&mut b, T_ARRAY);
            put_packed_i32(&mut b, 1);
        }
        put_packed_i32(&mut b, V_INT_0);
        let ctx = Arc::new(SimplePofContext::builder().build().unwrap());
        let config = PofConfig::default().max_depth(4);
        let err = PofReader::new(ctx, config, b.freeze())
            .read_object(-1)
            .unwrap_err();
        assert_eq!(err.to_string(), "protocol error: maximum nesting depth 4 exceeded");
    }

    #[test]
    fn identity_markers_do_not_chain() {
        let err = packed(&[T_IDENTITY, 1, T_IDENTITY, 2, V_INT_0])
            .read_object(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));
        let err = packed(&[T_IDENTITY, 1, T_REFERENCE, 1])
            .read_object(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));
        let err = packed(&[T_IDENTITY, 1, T_IDENTITY, 2, V_COLLECTION_EMPTY])
            .read_i32_array(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));

        let config = PofConfig::default().max_depth(64);
        let mut r = reader_with(config, |b| {
            for id in 0..1_000_000 {
                put_packed_i32(b, T_IDENTITY);
                put_packed_i32(b, id);
            }
            put_packed_i32(b, V_INT_0);
        });
        assert!(r.read_object(-1).unwrap_err().is_corruption());
    }

    #[test]
    fn uniform_element_types_are_validated() {
        let err = packed(&[T_UNIFORM_COLLECTION, V_BOOLEAN_TRUE, 20_000_000])
            .read_object(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));
        let err = packed(&[T_UNIFORM_ARRAY, V_BOOLEAN_TRUE, 20_000_000])
            .read_bool_array(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));
        let err = packed(&[T_UNIFORM_MAP, T_INT32, V_INT_0, 1_000_000])
            .read_object(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));
        let err = packed(&[T_UNIFORM_SPARSE_ARRAY, T_REFERENCE, 3, 0, 1, -1])
            .read_object(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));
    }

    #[test]
    fn sparse_expansion_is_bounded() {
        let err = packed(&[T_UNIFORM_SPARSE_ARRAY, T_INT64, 100_000_000, -1])
            .read_i64_array(-1)
            .unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));

        // the generic form keeps only the entries present
        let sparse = [T_SPARSE_ARRAY, 100_000_000, 99_999_999, V_INT_0, -1];
        let value = packed(&sparse).read_object(-1).unwrap();
        assert!(matches!(&value, PofValue::SparseArray(s) if s.len() == 1));
        let err = packed(&sparse).read_array(-1).unwrap_err();
        assert!(matches!(err, PofError::Corrupted(_)));

        let small = [T_UNIFORM_SPARSE_ARRAY, T_INT32, 4, 2, 9, -1];
        let config = PofConfig::default().max_sparse_len(4);
        assert_eq!(
            packed_with(config, &small).read_i32_array(-1).unwrap(),
            Some(vec![0, 0, 9, 0])
        );
        let config = PofConfig::default().max_sparse_len(3);
        assert!(packed_with(config, &small).read_i32_array(-1).is_err());
    }

    #[test]
    fn root_has_no_properties() {
        let mut r = packed(&[V_INT_0]);
        assert_eq!(r.type_id(), -1);
        assert!(r.read_remainder().is_err());
        assert!(r.create_nested_reader(0).is_err());
    }
}
