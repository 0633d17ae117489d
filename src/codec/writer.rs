//! Positional POF writer.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use super::StateRef;
use super::handler::Emitter;
use crate::config::PofConfig;
use crate::context::TypeContext;
use crate::error::PofError;
use crate::identity::ReferenceLibrary;
use crate::types::{
    DayTimeInterval, Decimal, PofObject, PofValue, RawDate, RawDateTime, RawQuad, RawTime,
    SparseArray, TimeInterval, YearMonthInterval,
};
use crate::wire::catalog::{RawElement, common_type};
use crate::wire::marker::*;

/// Write-side bookkeeping for the root stream or one user-type value.
#[derive(Debug)]
struct WriteFrame {
    type_id: i32,
    version: i32,
    /// Position of this value within its parent.
    position: i32,
    identity: Option<i32>,
    evolvable: bool,
    header_written: bool,
    ended: bool,
    prev: i32,
}

impl WriteFrame {
    fn root() -> Self {
        Self {
            type_id: -1,
            version: 0,
            position: -1,
            identity: None,
            evolvable: false,
            header_written: true,
            ended: false,
            prev: -1,
        }
    }

    fn user_type(type_id: i32, position: i32, identity: Option<i32>, evolvable: bool) -> Self {
        Self {
            type_id,
            position,
            identity,
            evolvable,
            header_written: false,
            ..Self::root()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapForm {
    Plain,
    UniformKeys,
    Uniform,
}

/// State shared by a root writer and every writer nested under it.
pub(crate) struct EncodeState {
    emitter: Emitter,
    ctx: Arc<dyn TypeContext>,
    config: PofConfig,
    references: Option<ReferenceLibrary>,
    frames: Vec<WriteFrame>,
}

impl EncodeState {
    /// Closes every nested writer above `depth`.
    fn close_nested(&mut self, depth: usize) -> Result<(), PofError> {
        while self.frames.len() > depth + 1 {
            let top = self.frames.len() - 1;
            self.finish_frame(top)?;
            if let Some(frame) = self.frames.pop() {
                self.frames[top - 1].prev = frame.position;
            }
        }
        Ok(())
    }

    /// Terminates the user type at `depth` unless it already ended.
    fn finish_frame(&mut self, depth: usize) -> Result<(), PofError> {
        self.close_nested(depth)?;
        if !self.frames[depth].ended {
            self.write_header(depth)?;
            self.emitter.end_complex()?;
            self.frames[depth].ended = true;
        }
        Ok(())
    }

    fn write_header(&mut self, depth: usize) -> Result<(), PofError> {
        let frame = &mut self.frames[depth];
        if !frame.header_written {
            frame.header_written = true;
            let (position, identity) = (frame.position, frame.identity);
            let (type_id, version) = (frame.type_id, frame.version);
            self.emitter
                .begin_user_type(position, identity, type_id, version)?;
        }
        Ok(())
    }

    fn begin_property(&mut self, depth: usize, index: i32) -> Result<(), PofError> {
        if depth == 0 {
            if index > 0 {
                return Err(PofError::Protocol("not in a user type".into()));
            }
            return Ok(());
        }
        self.close_nested(depth)?;
        if index < 0 {
            return Err(PofError::Protocol(format!(
                "negative property index: {index}"
            )));
        }
        if self.frames[depth].ended {
            return Err(PofError::Protocol("user type POF stream terminated".into()));
        }
        self.write_header(depth)?;
        let frame = &self.frames[depth];
        if index <= frame.prev {
            return Err(PofError::Protocol(format!(
                "previous property index={}, requested property index={} while writing user type {}",
                frame.prev, index, frame.type_id
            )));
        }
        Ok(())
    }

    fn end_property(&mut self, depth: usize, index: i32) {
        if depth > 0 {
            self.frames[depth].prev = index;
        }
    }

    fn open_nested(
        &mut self,
        depth: usize,
        index: i32,
        type_id: Option<i32>,
    ) -> Result<usize, PofError> {
        if depth == 0 {
            return Err(PofError::Protocol("not in a user type".into()));
        }
        self.begin_property(depth, index)?;
        self.emitter.register_identity(-1);
        let parent = &self.frames[depth];
        let frame = WriteFrame::user_type(
            type_id.unwrap_or(parent.type_id),
            index,
            None,
            parent.evolvable,
        );
        debug!(parent = parent.type_id, index, type_id = frame.type_id, "nested writer opened");
        self.frames.push(frame);
        Ok(self.frames.len() - 1)
    }

    fn write_remainder(&mut self, depth: usize, bytes: Option<&[u8]>) -> Result<(), PofError> {
        if depth == 0 {
            return Err(PofError::Protocol("not in a user type".into()));
        }
        self.close_nested(depth)?;
        if self.frames[depth].ended {
            return Err(PofError::Protocol("user type POF stream terminated".into()));
        }
        self.write_header(depth)?;
        if let Some(bytes) = bytes {
            debug!(type_id = self.frames[depth].type_id, len = bytes.len(), "remainder written");
            self.emitter.put_raw(bytes);
        }
        self.emitter.end_complex()?;
        self.frames[depth].ended = true;
        Ok(())
    }

    /// Writes any value as an identifiable value: never omitted, never a
    /// literal, always tagged outside uniform containers.
    fn write_value(&mut self, pos: i32, value: &PofValue) -> Result<(), PofError> {
        self.emitter.register_identity(-1);
        let e = &mut self.emitter;
        match value {
            PofValue::Null => e.on_null(pos),
            PofValue::Bool(b) => e.on_bool(pos, *b),
            PofValue::Octet(b) => e.on_octet(pos, *b),
            PofValue::Char(c) => e.on_char(pos, *c),
            PofValue::Int16(n) => e.on_i16(pos, *n),
            PofValue::Int32(n) => e.on_i32(pos, *n),
            PofValue::Int64(n) => e.on_i64(pos, *n),
            PofValue::Int128(n) => e.on_i128(pos, *n),
            PofValue::Float32(f) => e.on_f32(pos, *f),
            PofValue::Float64(f) => e.on_f64(pos, *f),
            PofValue::Float128(q) => e.on_quad(pos, *q),
            PofValue::Decimal(d) => e.on_decimal(pos, *d),
            PofValue::Binary(b) => e.on_binary(pos, b),
            PofValue::String(s) => e.on_string(pos, s),
            PofValue::Date(d) => e.on_date(pos, d),
            PofValue::LocalDate(d) => e.on_date(pos, &RawDate::from(*d)),
            PofValue::Time(t) => e.on_time(pos, t),
            PofValue::LocalTime(t) => e.on_time(pos, &RawTime::from(*t)),
            PofValue::DateTime(dt) => e.on_date_time(pos, dt),
            PofValue::LocalDateTime(dt) => e.on_date_time(pos, &RawDateTime::from(*dt)),
            PofValue::OffsetDateTime(dt) => e.on_date_time(pos, &RawDateTime::from(*dt)),
            PofValue::YearMonthInterval(i) => e.on_year_month_interval(pos, i),
            PofValue::TimeInterval(i) => e.on_time_interval(pos, i),
            PofValue::DayTimeInterval(i) => e.on_day_time_interval(pos, i),
            PofValue::BoolArray(v) => self.write_elements(pos, T_BOOLEAN, v, Emitter::on_bool),
            PofValue::ByteArray(v) => self.write_octets(pos, v),
            PofValue::CharArray(v) => self.write_elements(pos, T_CHAR, v, Emitter::on_char),
            PofValue::Int16Array(v) => self.write_numbers(pos, T_INT16, v, Emitter::on_i16),
            PofValue::Int32Array(v) => self.write_numbers(pos, T_INT32, v, Emitter::on_i32),
            PofValue::Int64Array(v) => self.write_numbers(pos, T_INT64, v, Emitter::on_i64),
            PofValue::Float32Array(v) => self.write_numbers(pos, T_FLOAT32, v, Emitter::on_f32),
            PofValue::Float64Array(v) => self.write_numbers(pos, T_FLOAT64, v, Emitter::on_f64),
            PofValue::Array(items) => self.write_sequence(pos, T_ARRAY, items.iter()),
            PofValue::Collection(items) => self.write_sequence(pos, T_COLLECTION, items.iter()),
            PofValue::SparseArray(map) => self.write_sparse(pos, map, false),
            PofValue::Map(entries) => self.write_entries(pos, entries, MapForm::Plain),
            PofValue::Object(obj) => self.write_user_type(pos, obj),
        }
    }

    fn write_elements<T: Copy>(
        &mut self,
        pos: i32,
        tag: i32,
        items: &[T],
        emit: fn(&mut Emitter, i32, T) -> Result<(), PofError>,
    ) -> Result<(), PofError> {
        self.emitter.begin_uniform_array(pos, items.len(), tag)?;
        for (i, item) in items.iter().enumerate() {
            emit(&mut self.emitter, i as i32, *item)?;
        }
        self.emitter.end_complex()
    }

    /// Numeric arrays optionally travel as raw big-endian octets.
    fn write_numbers<T: RawElement>(
        &mut self,
        pos: i32,
        tag: i32,
        items: &[T],
        emit: fn(&mut Emitter, i32, T) -> Result<(), PofError>,
    ) -> Result<(), PofError> {
        if !self.config.uses_raw_arrays() {
            return self.write_elements(pos, tag, items, emit);
        }
        self.emitter.begin_uniform_array(pos, items.len(), T_OCTET)?;
        let out = self.emitter.raw_elements(items.len());
        out.reserve(items.len() * T::WIDTH);
        for item in items {
            item.put(out);
        }
        self.emitter.end_complex()
    }

    fn write_octets(&mut self, pos: i32, bytes: &[u8]) -> Result<(), PofError> {
        self.emitter.begin_uniform_array(pos, bytes.len(), T_OCTET)?;
        self.emitter.raw_elements(bytes.len()).extend_from_slice(bytes);
        self.emitter.end_complex()
    }

    fn write_sequence<'v>(
        &mut self,
        pos: i32,
        tag: i32,
        items: impl ExactSizeIterator<Item = &'v PofValue>,
    ) -> Result<(), PofError> {
        let expected = items.len();
        if tag == T_ARRAY {
            self.emitter.begin_array(pos, expected)?;
        } else {
            self.emitter.begin_collection(pos, expected)?;
        }
        let mut actual = 0;
        for item in items {
            self.write_value(actual as i32, item)?;
            actual += 1;
        }
        if actual != expected {
            return Err(PofError::ElementCountMismatch { expected, actual });
        }
        self.emitter.end_complex()
    }

    /// The element type for a uniform encoding of `items`, or `None` when
    /// the items do not share one or the encoding cannot be uniform.
    fn uniform_type<'v>(
        &self,
        items: impl IntoIterator<Item = &'v PofValue>,
    ) -> Result<Option<i32>, PofError> {
        let Some(tag) = common_type(items, &*self.ctx)? else {
            return Ok(None);
        };
        if tag >= 0 && self.references.is_some() {
            warn!(type_id = tag, "uniform encoding of user types downgraded while tracking references");
            return Ok(None);
        }
        Ok(Some(tag))
    }

    fn write_uniform_sequence(
        &mut self,
        pos: i32,
        tag: i32,
        items: &[PofValue],
    ) -> Result<(), PofError> {
        let Some(element) = self.uniform_type(items)? else {
            return self.write_sequence(pos, tag, items.iter());
        };
        if tag == T_ARRAY {
            self.emitter.begin_uniform_array(pos, items.len(), element)?;
        } else {
            self.emitter
                .begin_uniform_collection(pos, items.len(), element)?;
        }
        for (i, item) in items.iter().enumerate() {
            self.write_value(i as i32, item)?;
        }
        self.emitter.end_complex()
    }

    fn write_sparse(
        &mut self,
        pos: i32,
        map: &SparseArray,
        uniform: bool,
    ) -> Result<(), PofError> {
        let count = sparse_count(map)?;
        let element = if uniform {
            self.uniform_type(map.values())?
        } else {
            None
        };
        match element {
            Some(t) => self.emitter.begin_uniform_sparse_array(pos, count, t)?,
            None => self.emitter.begin_sparse_array(pos, count)?,
        }
        for (index, value) in map {
            self.write_value(*index, value)?;
        }
        self.emitter.end_complex()
    }

    fn write_entries(
        &mut self,
        pos: i32,
        entries: &[(PofValue, PofValue)],
        form: MapForm,
    ) -> Result<(), PofError> {
        let keys = match form {
            MapForm::Plain => None,
            _ => self.uniform_type(entries.iter().map(|(k, _)| k))?,
        };
        let values = match (form, keys) {
            (MapForm::Uniform, Some(_)) => self.uniform_type(entries.iter().map(|(_, v)| v))?,
            _ => None,
        };
        let n = entries.len();
        match (keys, values) {
            (Some(k), Some(v)) => self.emitter.begin_uniform_map(pos, n, k, v)?,
            (Some(k), None) => self.emitter.begin_uniform_keys_map(pos, n, k)?,
            _ => self.emitter.begin_map(pos, n)?,
        }
        for (key, value) in entries {
            self.write_value(-1, key)?;
            self.write_value(-1, value)?;
        }
        self.emitter.end_complex()
    }

    /// Writes a user-type value through its serializer, or a reference to
    /// it when it was already written and references are tracked.
    fn write_user_type(&mut self, pos: i32, obj: &PofObject) -> Result<(), PofError> {
        let type_id = self.ctx.type_id_for(obj)?;
        let serializer = self.ctx.serializer_for(type_id)?;
        let evolvable =
            serializer.is_evolvable() || self.frames.last().is_some_and(|f| f.evolvable);

        let mut identity = None;
        if !evolvable {
            if let Some(refs) = self.references.as_mut() {
                if let Some(id) = refs.identity_of(obj) {
                    return self.emitter.on_reference(pos, id);
                }
                identity = Some(refs.assign(obj)?);
            }
        }

        let limit = self.config.depth_limit();
        if self.frames.len() > limit {
            return Err(PofError::Protocol(format!(
                "maximum nesting depth {limit} exceeded"
            )));
        }
        self.frames
            .push(WriteFrame::user_type(type_id, pos, identity, evolvable));
        let depth = self.frames.len() - 1;
        let result = {
            let mut writer = PofWriter {
                state: StateRef::Borrowed(&mut *self),
                depth,
            };
            serializer.serialize(&mut writer, obj)
        }
        .and_then(|()| self.finish_frame(depth));
        self.frames.truncate(depth);
        result
    }
}

fn sparse_count(map: &SparseArray) -> Result<usize, PofError> {
    match (map.keys().next(), map.keys().next_back()) {
        (Some(&first), Some(&last)) => {
            if first < 0 || last == i32::MAX {
                return Err(PofError::InvalidValue(format!(
                    "cannot encode sparse array [{first}, {last}]"
                )));
            }
            Ok(last as usize + 1)
        }
        _ => Ok(0),
    }
}

/// Writes values into a POF stream, either at the top level or as the
/// properties of a user type.
///
/// The root writer, created with [`PofWriter::new`], writes a single value
/// at index `-1` or `0`. Serializers receive a writer scoped to one user
/// type, where properties must be written in strictly ascending index order.
///
/// Typed primitive accessors (`write_bool` through `write_f64`) omit default
/// values inside a user type and use single-byte literals where possible;
/// every other accessor writes its value in full.
pub struct PofWriter<'a> {
    state: StateRef<'a, EncodeState>,
    depth: usize,
}

impl PofWriter<'static> {
    /// A root writer over an empty stream.
    pub fn new(ctx: Arc<dyn TypeContext>, config: PofConfig) -> Self {
        let references = config.tracks_references().then(ReferenceLibrary::new);
        let state = EncodeState {
            emitter: Emitter::new(),
            ctx,
            config,
            references,
            frames: vec![WriteFrame::root()],
        };
        Self {
            state: StateRef::Owned(Box::new(state)),
            depth: 0,
        }
    }
}

impl PofWriter<'_> {
    /// The encoded stream. Only a root writer owns one.
    pub fn into_bytes(self) -> Result<Bytes, PofError> {
        match self.state {
            StateRef::Owned(state) => {
                if state.emitter.depth() != 0 {
                    return Err(PofError::Protocol("unterminated complex value".into()));
                }
                Ok(state.emitter.into_bytes())
            }
            StateRef::Borrowed(_) => Err(PofError::Protocol(
                "a nested writer does not own its stream".into(),
            )),
        }
    }

    /// User-type id of the value being written; -1 at the root.
    pub fn type_id(&self) -> i32 {
        self.state.frames[self.depth].type_id
    }

    pub fn version_id(&self) -> i32 {
        self.state.frames[self.depth].version
    }

    /// Sets the version id written in the user-type header. Must precede
    /// the first property.
    pub fn set_version_id(&mut self, version: i32) -> Result<(), PofError> {
        if self.depth == 0 {
            return Err(PofError::Protocol("not in a user type".into()));
        }
        if version < 0 {
            return Err(PofError::InvalidValue(format!(
                "negative version id: {version}"
            )));
        }
        let frame = &mut self.state.frames[self.depth];
        if frame.header_written {
            return Err(PofError::Protocol(
                "version id cannot change after the first property is written".into(),
            ));
        }
        frame.version = version;
        Ok(())
    }

    pub fn context(&self) -> &dyn TypeContext {
        &*self.state.ctx
    }

    fn property(
        &mut self,
        index: i32,
        write: impl FnOnce(&mut EncodeState, i32) -> Result<(), PofError>,
    ) -> Result<(), PofError> {
        let depth = self.depth;
        let state = &mut *self.state;
        state.begin_property(depth, index)?;
        write(state, index)?;
        state.end_property(depth, index);
        Ok(())
    }

    fn primitive(
        &mut self,
        index: i32,
        write: impl FnOnce(&mut Emitter, i32) -> Result<(), PofError>,
    ) -> Result<(), PofError> {
        self.property(index, |s, pos| write(&mut s.emitter, pos))
    }

    fn identified(
        &mut self,
        index: i32,
        write: impl FnOnce(&mut EncodeState, i32) -> Result<(), PofError>,
    ) -> Result<(), PofError> {
        self.property(index, |s, pos| {
            s.emitter.register_identity(-1);
            write(s, pos)
        })
    }

    pub fn write_bool(&mut self, index: i32, b: bool) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_bool(pos, b))
    }

    pub fn write_octet(&mut self, index: i32, b: u8) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_octet(pos, b))
    }

    pub fn write_char(&mut self, index: i32, c: char) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_char(pos, c))
    }

    pub fn write_i16(&mut self, index: i32, n: i16) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_i16(pos, n))
    }

    pub fn write_i32(&mut self, index: i32, n: i32) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_i32(pos, n))
    }

    pub fn write_i64(&mut self, index: i32, n: i64) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_i64(pos, n))
    }

    pub fn write_f32(&mut self, index: i32, f: f32) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_f32(pos, f))
    }

    pub fn write_f64(&mut self, index: i32, f: f64) -> Result<(), PofError> {
        self.primitive(index, |e, pos| e.on_f64(pos, f))
    }

    pub fn write_i128(&mut self, index: i32, n: i128) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_i128(pos, n))
    }

    pub fn write_quad(&mut self, index: i32, q: RawQuad) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_quad(pos, q))
    }

    pub fn write_decimal(&mut self, index: i32, d: Decimal) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_decimal(pos, d))
    }

    pub fn write_binary(&mut self, index: i32, bytes: &[u8]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_binary(pos, bytes))
    }

    pub fn write_string(&mut self, index: i32, s: &str) -> Result<(), PofError> {
        self.identified(index, |st, pos| st.emitter.on_string(pos, s))
    }

    pub fn write_date(&mut self, index: i32, date: RawDate) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_date(pos, &date))
    }

    pub fn write_time(&mut self, index: i32, time: RawTime) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_time(pos, &time))
    }

    pub fn write_date_time(&mut self, index: i32, dt: RawDateTime) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_date_time(pos, &dt))
    }

    pub fn write_local_date(&mut self, index: i32, date: NaiveDate) -> Result<(), PofError> {
        self.write_date(index, date.into())
    }

    pub fn write_local_time(&mut self, index: i32, time: NaiveTime) -> Result<(), PofError> {
        self.write_time(index, time.into())
    }

    pub fn write_local_date_time(
        &mut self,
        index: i32,
        dt: NaiveDateTime,
    ) -> Result<(), PofError> {
        self.write_date_time(index, dt.into())
    }

    pub fn write_offset_date_time(
        &mut self,
        index: i32,
        dt: DateTime<FixedOffset>,
    ) -> Result<(), PofError> {
        self.write_date_time(index, dt.into())
    }

    pub fn write_year_month_interval(
        &mut self,
        index: i32,
        interval: YearMonthInterval,
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_year_month_interval(pos, &interval))
    }

    pub fn write_time_interval(
        &mut self,
        index: i32,
        interval: TimeInterval,
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_time_interval(pos, &interval))
    }

    pub fn write_day_time_interval(
        &mut self,
        index: i32,
        interval: DayTimeInterval,
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.emitter.on_day_time_interval(pos, &interval))
    }

    pub fn write_bool_array(&mut self, index: i32, items: &[bool]) -> Result<(), PofError> {
        self.identified(index, |s, pos| {
            s.write_elements(pos, T_BOOLEAN, items, Emitter::on_bool)
        })
    }

    pub fn write_byte_array(&mut self, index: i32, items: &[u8]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_octets(pos, items))
    }

    pub fn write_char_array(&mut self, index: i32, items: &[char]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_elements(pos, T_CHAR, items, Emitter::on_char))
    }

    pub fn write_i16_array(&mut self, index: i32, items: &[i16]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_numbers(pos, T_INT16, items, Emitter::on_i16))
    }

    pub fn write_i32_array(&mut self, index: i32, items: &[i32]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_numbers(pos, T_INT32, items, Emitter::on_i32))
    }

    pub fn write_i64_array(&mut self, index: i32, items: &[i64]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_numbers(pos, T_INT64, items, Emitter::on_i64))
    }

    pub fn write_f32_array(&mut self, index: i32, items: &[f32]) -> Result<(), PofError> {
        self.identified(index, |s, pos| {
            s.write_numbers(pos, T_FLOAT32, items, Emitter::on_f32)
        })
    }

    pub fn write_f64_array(&mut self, index: i32, items: &[f64]) -> Result<(), PofError> {
        self.identified(index, |s, pos| {
            s.write_numbers(pos, T_FLOAT64, items, Emitter::on_f64)
        })
    }

    /// Writes any value with its own type tag. User-type values go through
    /// their registered serializer.
    pub fn write_object(&mut self, index: i32, value: &PofValue) -> Result<(), PofError> {
        self.property(index, |s, pos| s.write_value(pos, value))
    }

    /// Writes a heterogeneous array. The iterator must yield exactly as many
    /// items as it reports.
    pub fn write_array<'v, I>(&mut self, index: i32, items: I) -> Result<(), PofError>
    where
        I: IntoIterator<Item = &'v PofValue>,
        I::IntoIter: ExactSizeIterator,
    {
        self.identified(index, |s, pos| s.write_sequence(pos, T_ARRAY, items.into_iter()))
    }

    pub fn write_collection<'v, I>(&mut self, index: i32, items: I) -> Result<(), PofError>
    where
        I: IntoIterator<Item = &'v PofValue>,
        I::IntoIter: ExactSizeIterator,
    {
        self.identified(index, |s, pos| {
            s.write_sequence(pos, T_COLLECTION, items.into_iter())
        })
    }

    /// Writes an array whose elements share one type without repeating the
    /// tag. Falls back to [`write_array`](Self::write_array) when the items
    /// contain a null or do not share a type.
    pub fn write_uniform_array(&mut self, index: i32, items: &[PofValue]) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_uniform_sequence(pos, T_ARRAY, items))
    }

    pub fn write_uniform_collection(
        &mut self,
        index: i32,
        items: &[PofValue],
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| {
            s.write_uniform_sequence(pos, T_COLLECTION, items)
        })
    }

    pub fn write_sparse_array(&mut self, index: i32, items: &SparseArray) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_sparse(pos, items, false))
    }

    pub fn write_uniform_sparse_array(
        &mut self,
        index: i32,
        items: &SparseArray,
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_sparse(pos, items, true))
    }

    pub fn write_map(
        &mut self,
        index: i32,
        entries: &[(PofValue, PofValue)],
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_entries(pos, entries, MapForm::Plain))
    }

    pub fn write_uniform_keys_map(
        &mut self,
        index: i32,
        entries: &[(PofValue, PofValue)],
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| {
            s.write_entries(pos, entries, MapForm::UniformKeys)
        })
    }

    /// Writes a map whose keys share one type and whose values share
    /// another. Degrades to uniform keys, then to a plain map.
    pub fn write_uniform_map(
        &mut self,
        index: i32,
        entries: &[(PofValue, PofValue)],
    ) -> Result<(), PofError> {
        self.identified(index, |s, pos| s.write_entries(pos, entries, MapForm::Uniform))
    }

    /// Opens a writer for a user-type value at `index` that shares this
    /// writer's type id. It is closed when the next property of this writer
    /// begins or this user type finishes.
    pub fn create_nested_writer(&mut self, index: i32) -> Result<PofWriter<'_>, PofError> {
        self.nested(index, None)
    }

    pub fn create_nested_writer_with_type(
        &mut self,
        index: i32,
        type_id: i32,
    ) -> Result<PofWriter<'_>, PofError> {
        self.nested(index, Some(type_id))
    }

    fn nested(&mut self, index: i32, type_id: Option<i32>) -> Result<PofWriter<'_>, PofError> {
        let depth = self.state.open_nested(self.depth, index, type_id)?;
        Ok(PofWriter {
            state: StateRef::Borrowed(&mut *self.state),
            depth,
        })
    }

    /// Appends previously captured properties and terminates the user type.
    pub fn write_remainder(&mut self, bytes: Option<&[u8]>) -> Result<(), PofError> {
        self.state.write_remainder(self.depth, bytes)
    }
}

impl std::fmt::Debug for PofWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PofWriter")
            .field("type_id", &self.type_id())
            .field("depth", &self.depth)
            .field("written", &self.state.emitter.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PofReader;
    use crate::context::{PofSerializer, PortableObject, SimplePofContext};

    fn root() -> PofWriter<'static> {
        let ctx = Arc::new(SimplePofContext::builder().build().unwrap());
        PofWriter::new(ctx, PofConfig::default())
    }

    #[derive(Debug, Default)]
    struct Pair {
        id: i32,
        name: String,
        score: i32,
    }

    impl PortableObject for Pair {
        fn read_external(&mut self, reader: &mut PofReader<'_>) -> Result<(), PofError> {
            self.id = reader.read_i32(0)?;
            self.name = reader.read_string(1)?.unwrap_or_default();
            self.score = reader.read_i32(2)?;
            Ok(())
        }

        fn write_external(&self, writer: &mut PofWriter<'_>) -> Result<(), PofError> {
            writer.write_i32(0, self.id)?;
            writer.write_string(1, &self.name)?;
            writer.write_i32(2, self.score)
        }
    }

    /// Writes whatever its function writes; used to drive misuse cases.
    struct Scripted(fn(&mut PofWriter<'_>) -> Result<(), PofError>);

    impl PofSerializer for Scripted {
        fn serialize(&self, writer: &mut PofWriter<'_>, _: &PofObject) -> Result<(), PofError> {
            (self.0)(writer)
        }

        fn deserialize(&self, _: &mut PofReader<'_>) -> Result<PofObject, PofError> {
            Err(PofError::Unsupported("write only".into()))
        }
    }

    struct Marker;

    fn scripted(f: fn(&mut PofWriter<'_>) -> Result<(), PofError>) -> Result<Bytes, PofError> {
        let ctx = SimplePofContext::builder()
            .register::<Marker>(9, Scripted(f))
            .build()
            .unwrap();
        let mut writer = PofWriter::new(Arc::new(ctx), PofConfig::default());
        writer.write_object(-1, &PofValue::Object(PofObject::new(Marker)))?;
        writer.into_bytes()
    }

    fn pair_bytes(pair: Pair) -> Vec<u8> {
        let ctx = SimplePofContext::builder()
            .register_portable::<Pair>(7)
            .build()
            .unwrap();
        let mut writer = PofWriter::new(Arc::new(ctx), PofConfig::default());
        writer
            .write_object(-1, &PofValue::Object(PofObject::new(pair)))
            .unwrap();
        writer.into_bytes().unwrap().to_vec()
    }

    #[test]
    fn root_values() {
        let mut w = root();
        w.write_i32(-1, 300).unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x41, 0xAC, 0x04]);

        let mut w = root();
        w.write_i32(-1, 0).unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x69]);

        // strings are always written in full
        let mut w = root();
        w.write_string(-1, "").unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x4E, 0x00]);

        let mut w = root();
        w.write_object(-1, &PofValue::Int16(2)).unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x40, 0x02]);
    }

    #[test]
    fn root_rejects_properties() {
        let mut w = root();
        let err = w.write_i32(1, 5).unwrap_err();
        assert_eq!(err.to_string(), "protocol error: not in a user type");
        assert!(w.create_nested_writer(0).is_err());
        assert!(w.write_remainder(None).is_err());
        assert!(w.set_version_id(1).is_err());
    }

    #[test]
    fn user_type_properties() {
        let bytes = pair_bytes(Pair {
            id: 5,
            name: String::new(),
            score: 0,
        });
        // type 7, version 0, [0]=int32 5, [1]="" in full, [2] omitted, terminator
        assert_eq!(bytes, [0x07, 0x00, 0x00, 0x41, 0x05, 0x01, 0x4E, 0x00, 0x40]);

        let bytes = pair_bytes(Pair {
            id: 0,
            name: "a".into(),
            score: 3,
        });
        assert_eq!(
            bytes,
            [0x07, 0x00, 0x00, 0x41, 0x00, 0x01, 0x4E, 0x01, b'a', 0x02, 0x6C, 0x40]
        );
    }

    #[test]
    fn indices_must_ascend() {
        let err = scripted(|w| {
            w.write_i32(3, 1)?;
            w.write_i32(2, 1)
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "protocol error: previous property index=3, requested property index=2 while writing user type 9"
        );
        assert!(scripted(|w| {
            w.write_i32(3, 1)?;
            w.write_i32(3, 1)
        })
        .is_err());
        assert!(scripted(|w| w.write_i32(-2, 1)).is_err());
    }

    #[test]
    fn terminated_stream_rejects_writes() {
        let err = scripted(|w| {
            w.write_remainder(None)?;
            w.write_i32(0, 1)
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "protocol error: user type POF stream terminated");
    }

    #[test]
    fn version_is_fixed_by_first_property() {
        let bytes = scripted(|w| {
            w.set_version_id(2)?;
            w.write_bool(0, true)
        })
        .unwrap();
        assert_eq!(&bytes[..], &[0x09, 0x02, 0x00, 0x4A, 0x01, 0x40]);

        assert!(scripted(|w| {
            w.write_bool(0, true)?;
            w.set_version_id(2)
        })
        .is_err());
    }

    #[test]
    fn nested_writer_closes_with_parent() {
        let bytes = scripted(|w| {
            let mut nested = w.create_nested_writer(1)?;
            assert_eq!(nested.type_id(), 9);
            nested.write_i32(0, 4)
        })
        .unwrap();
        assert_eq!(
            &bytes[..],
            &[0x09, 0x00, 0x01, 0x09, 0x00, 0x00, 0x41, 0x04, 0x40, 0x40]
        );

        // the next sibling closes the nested writer first; the empty nested
        // value leaves its identity slot pending, so the sibling is not a literal
        let bytes = scripted(|w| {
            w.create_nested_writer_with_type(0, 3)?;
            w.write_i32(1, 2)
        })
        .unwrap();
        assert_eq!(
            &bytes[..],
            &[0x09, 0x00, 0x00, 0x03, 0x00, 0x40, 0x01, 0x41, 0x02, 0x40]
        );
    }

    #[test]
    fn collection_count_must_match() {
        struct Lying<'a>(std::slice::Iter<'a, PofValue>);

        impl<'a> Iterator for Lying<'a> {
            type Item = &'a PofValue;

            fn next(&mut self) -> Option<Self::Item> {
                self.0.next()
            }
        }

        impl ExactSizeIterator for Lying<'_> {
            fn len(&self) -> usize {
                self.0.len() + 1
            }
        }

        let items = [PofValue::Int32(1)];
        let mut w = root();
        let err = w.write_collection(-1, Lying(items.iter())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected to write 2 objects but actually wrote 1"
        );
    }

    #[test]
    fn uniform_falls_back_on_null() {
        let mut w = root();
        w.write_uniform_collection(-1, &[PofValue::Int32(1), PofValue::Null])
            .unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x55, 0x02, 0x41, 0x01, 0x64]);

        let mut w = root();
        w.write_uniform_collection(-1, &[PofValue::Int32(1), PofValue::Int32(2)])
            .unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x56, 0x41, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn sparse_arrays() {
        let mut items = SparseArray::new();
        items.insert(2, PofValue::Int32(0));
        let mut w = root();
        w.write_sparse_array(-1, &items).unwrap();
        // element values carry an identity slot, so defaults are kept
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x59, 0x03, 0x02, 0x41, 0x00, 0x40]);

        let mut items = SparseArray::new();
        items.insert(-1, PofValue::Int32(0));
        assert!(matches!(
            root().write_sparse_array(-1, &items),
            Err(PofError::InvalidValue(_))
        ));
    }

    #[test]
    fn raw_numeric_arrays() {
        let ctx = Arc::new(SimplePofContext::builder().build().unwrap());
        let mut w = PofWriter::new(ctx, PofConfig::default().raw_arrays(true));
        w.write_i16_array(-1, &[1, -2]).unwrap();
        assert_eq!(
            &w.into_bytes().unwrap()[..],
            &[0x58, 0x4B, 0x02, 0x00, 0x01, 0xFF, 0xFE]
        );

        let mut w = root();
        w.write_i16_array(-1, &[1, -2]).unwrap();
        assert_eq!(&w.into_bytes().unwrap()[..], &[0x58, 0x40, 0x02, 0x01, 0x41]);
    }
}
