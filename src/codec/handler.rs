//! Event-driven POF encoding.
//!
//! The [`Emitter`] turns a sequence of value events into bytes. It tracks the
//! stack of open complex values so that it knows, for each value, whether a
//! position must precede it (sparse forms), whether its tag is implied
//! (uniform forms) and whether a default value may be omitted.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PofError;
use crate::types::{
    DayTimeInterval, Decimal, RawDate, RawDateTime, RawQuad, RawTime, TimeInterval, TimeZone,
    YearMonthInterval,
};
use crate::wire::marker::*;
use crate::wire::packed::{put_packed_i32, put_packed_i128};
use crate::wire::utf::{put_char, put_string};

/// One open complex value.
#[derive(Debug, Clone, Copy)]
struct Complex {
    sparse: bool,
    /// Element type, or key type for maps.
    uniform: Option<i32>,
    /// `Some` for maps; holds the uniform value type, if any.
    map_values: Option<Option<i32>>,
    at_key: bool,
    /// Entries a dense form declared; sparse forms declare only a bound.
    declared: Option<usize>,
    /// Values written so far; two per map entry.
    written: usize,
}

impl Complex {
    fn plain() -> Self {
        Self {
            sparse: false,
            uniform: None,
            map_values: None,
            at_key: false,
            declared: None,
            written: 0,
        }
    }

    /// A form holding nothing at all.
    fn empty() -> Self {
        Self {
            declared: Some(0),
            ..Self::plain()
        }
    }

    fn values_per_entry(&self) -> usize {
        if self.map_values.is_some() { 2 } else { 1 }
    }

    fn sparse() -> Self {
        Self {
            sparse: true,
            ..Self::plain()
        }
    }

    fn uniform(element: Option<i32>) -> Self {
        Self {
            uniform: element,
            ..Self::plain()
        }
    }

    fn map(keys: Option<i32>, values: Option<i32>) -> Self {
        Self {
            uniform: keys,
            map_values: Some(values),
            ..Self::plain()
        }
    }

    /// Maps alternate between key and value positions.
    fn on_value(&mut self) {
        self.written += 1;
        if self.map_values.is_some() {
            self.at_key = !self.at_key;
        }
    }

    fn uniform_type(&self) -> Option<i32> {
        match self.map_values {
            Some(values) if !self.at_key => values,
            _ => self.uniform,
        }
    }
}

/// How the value being opened is written.
#[derive(Debug, Clone, Copy)]
struct Form {
    tagged: bool,
    literal: bool,
}

/// Encodes value events into a POF byte stream.
#[derive(Debug, Default)]
pub(crate) struct Emitter {
    out: BytesMut,
    stack: Vec<Complex>,
    has_identity: bool,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open complex values.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.out.freeze()
    }

    /// Direct access to the output for a bulk payload of `count` elements
    /// whose envelope was already emitted.
    pub fn raw_elements(&mut self, count: usize) -> &mut BytesMut {
        if let Some(c) = self.stack.last_mut() {
            c.written += count * c.values_per_entry();
        }
        &mut self.out
    }

    /// Marks the next value as carrying an identity. A non-negative `id` is
    /// written as an identity marker. Either way the next value is written in
    /// full: never omitted and never as a literal.
    pub fn register_identity(&mut self, id: i32) {
        if id >= 0 {
            put_packed_i32(&mut self.out, T_IDENTITY);
            put_packed_i32(&mut self.out, id);
        }
        self.has_identity = true;
    }

    fn is_skippable(&self) -> bool {
        !self.has_identity && self.stack.last().is_some_and(|c| c.sparse)
    }

    fn encode_position(&mut self, pos: i32) {
        if let Some(c) = self.stack.last_mut() {
            c.on_value();
            if pos >= 0 && c.sparse {
                put_packed_i32(&mut self.out, pos);
            }
        }
        self.has_identity = false;
    }

    fn is_type_encoded(&self, tag: i32) -> Result<bool, PofError> {
        match self.stack.last().and_then(Complex::uniform_type) {
            None => Ok(true),
            Some(t) if t == tag => Ok(false),
            Some(t) => Err(PofError::Protocol(format!(
                "{} value in a uniform {} container",
                type_name(tag),
                type_name(t)
            ))),
        }
    }

    /// Writes the position and, unless implied, the tag. Literals are
    /// allowed only when the tag is written and no identity is pending.
    fn open(&mut self, pos: i32, tag: i32) -> Result<Form, PofError> {
        let compressible = !self.has_identity;
        self.encode_position(pos);
        let tagged = self.is_type_encoded(tag)?;
        Ok(Form {
            tagged,
            literal: tagged && compressible,
        })
    }

    fn put_tag(&mut self, form: Form, tag: i32) {
        if form.tagged {
            put_packed_i32(&mut self.out, tag);
        }
    }

    fn put_int(&mut self, form: Form, tag: i32, n: i128) {
        if form.literal && (i128::from(TINY_MIN)..=i128::from(TINY_MAX)).contains(&n) {
            put_packed_i32(&mut self.out, encode_tiny_int(n as i32));
        } else {
            self.put_tag(form, tag);
            put_packed_i128(&mut self.out, n);
        }
    }

    pub fn on_null(&mut self, pos: i32) -> Result<(), PofError> {
        if self.is_skippable() {
            return Ok(());
        }
        self.encode_position(pos);
        if let Some(t) = self.stack.last().and_then(Complex::uniform_type) {
            return Err(PofError::Protocol(format!(
                "null value in a uniform {} container",
                type_name(t)
            )));
        }
        put_packed_i32(&mut self.out, V_REFERENCE_NULL);
        Ok(())
    }

    pub fn on_reference(&mut self, pos: i32, id: i32) -> Result<(), PofError> {
        let form = self.open(pos, T_REFERENCE)?;
        self.put_tag(form, T_REFERENCE);
        put_packed_i32(&mut self.out, id);
        Ok(())
    }

    pub fn on_bool(&mut self, pos: i32, b: bool) -> Result<(), PofError> {
        if !b && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_BOOLEAN)?;
        if form.literal {
            let literal = if b { V_BOOLEAN_TRUE } else { V_BOOLEAN_FALSE };
            put_packed_i32(&mut self.out, literal);
        } else {
            self.put_tag(form, T_BOOLEAN);
            put_packed_i32(&mut self.out, i32::from(b));
        }
        Ok(())
    }

    pub fn on_octet(&mut self, pos: i32, b: u8) -> Result<(), PofError> {
        if b == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_OCTET)?;
        match b {
            0..=22 if form.literal => put_packed_i32(&mut self.out, encode_tiny_int(b.into())),
            0xFF if form.literal => put_packed_i32(&mut self.out, V_INT_NEG_1),
            _ => {
                self.put_tag(form, T_OCTET);
                self.out.put_u8(b);
            }
        }
        Ok(())
    }

    pub fn on_char(&mut self, pos: i32, ch: char) -> Result<(), PofError> {
        if ch == '\0' && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_CHAR)?;
        match u32::from(ch) {
            n @ 0..=22 if form.literal => put_packed_i32(&mut self.out, encode_tiny_int(n as i32)),
            0xFFFF if form.literal => put_packed_i32(&mut self.out, V_INT_NEG_1),
            // a char value, unlike a string unit, writes NUL as one byte
            0 => {
                self.put_tag(form, T_CHAR);
                self.out.put_u8(0);
            }
            _ => {
                self.put_tag(form, T_CHAR);
                put_char(&mut self.out, ch)?;
            }
        }
        Ok(())
    }

    pub fn on_i16(&mut self, pos: i32, n: i16) -> Result<(), PofError> {
        if n == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_INT16)?;
        self.put_int(form, T_INT16, n.into());
        Ok(())
    }

    pub fn on_i32(&mut self, pos: i32, n: i32) -> Result<(), PofError> {
        if n == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_INT32)?;
        self.put_int(form, T_INT32, n.into());
        Ok(())
    }

    pub fn on_i64(&mut self, pos: i32, n: i64) -> Result<(), PofError> {
        if n == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_INT64)?;
        self.put_int(form, T_INT64, n.into());
        Ok(())
    }

    pub fn on_i128(&mut self, pos: i32, n: i128) -> Result<(), PofError> {
        if n == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_INT128)?;
        self.put_int(form, T_INT128, n);
        Ok(())
    }

    pub fn on_f32(&mut self, pos: i32, f: f32) -> Result<(), PofError> {
        // only +0.0 is a default; -0.0 keeps its sign on the wire
        if f.to_bits() == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_FLOAT32)?;
        let literal = if f.to_bits() == 0x7FC0_0000 {
            Some(V_FP_NAN)
        } else {
            float_literal(f64::from(f))
        };
        match literal {
            Some(lit) if form.literal => put_packed_i32(&mut self.out, lit),
            _ => {
                self.put_tag(form, T_FLOAT32);
                self.out.put_f32(f);
            }
        }
        Ok(())
    }

    pub fn on_f64(&mut self, pos: i32, f: f64) -> Result<(), PofError> {
        if f.to_bits() == 0 && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_FLOAT64)?;
        let literal = if f.to_bits() == 0x7FF8_0000_0000_0000 {
            Some(V_FP_NAN)
        } else {
            float_literal(f)
        };
        match literal {
            Some(lit) if form.literal => put_packed_i32(&mut self.out, lit),
            _ => {
                self.put_tag(form, T_FLOAT64);
                self.out.put_f64(f);
            }
        }
        Ok(())
    }

    pub fn on_quad(&mut self, pos: i32, q: RawQuad) -> Result<(), PofError> {
        if q == RawQuad::ZERO && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_FLOAT128)?;
        self.put_tag(form, T_FLOAT128);
        self.out.put_slice(q.as_bytes());
        Ok(())
    }

    /// Decimals take the smallest width that holds them, or the declared
    /// width inside a uniform decimal container.
    pub fn on_decimal(&mut self, pos: i32, d: Decimal) -> Result<(), PofError> {
        if d.is_zero() && d.scale() == 0 && self.is_skippable() {
            return Ok(());
        }
        let compressible = !self.has_identity;
        self.encode_position(pos);
        let needed = d.wire_size()?;
        let tag = match self.stack.last().and_then(Complex::uniform_type) {
            Some(t @ (T_DECIMAL32 | T_DECIMAL64 | T_DECIMAL128)) => {
                if needed > decimal_width(t) {
                    return Err(PofError::InvalidValue(format!(
                        "decimal {d} does not fit a {} container",
                        type_name(t)
                    )));
                }
                t
            }
            _ => match needed {
                4 => T_DECIMAL32,
                8 => T_DECIMAL64,
                _ => T_DECIMAL128,
            },
        };
        let tagged = self.is_type_encoded(tag)?;
        let unscaled = d.unscaled();
        if tagged && compressible && d.scale() == 0 && (-1..=22).contains(&unscaled) {
            put_packed_i32(&mut self.out, encode_tiny_int(unscaled as i32));
        } else {
            if tagged {
                put_packed_i32(&mut self.out, tag);
            }
            put_packed_i128(&mut self.out, unscaled);
            put_packed_i32(&mut self.out, d.scale());
        }
        Ok(())
    }

    pub fn on_binary(&mut self, pos: i32, bytes: &[u8]) -> Result<(), PofError> {
        if bytes.is_empty() && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_OCTET_STRING)?;
        if bytes.is_empty() && form.literal {
            put_packed_i32(&mut self.out, V_STRING_ZERO_LENGTH);
        } else {
            self.put_tag(form, T_OCTET_STRING);
            put_packed_i32(&mut self.out, checked_len(bytes.len())?);
            self.out.put_slice(bytes);
        }
        Ok(())
    }

    pub fn on_string(&mut self, pos: i32, s: &str) -> Result<(), PofError> {
        if s.is_empty() && self.is_skippable() {
            return Ok(());
        }
        let form = self.open(pos, T_CHAR_STRING)?;
        if s.is_empty() && form.literal {
            put_packed_i32(&mut self.out, V_STRING_ZERO_LENGTH);
        } else {
            self.put_tag(form, T_CHAR_STRING);
            put_string(&mut self.out, s);
        }
        Ok(())
    }

    pub fn on_date(&mut self, pos: i32, date: &RawDate) -> Result<(), PofError> {
        date.validate()?;
        let form = self.open(pos, T_DATE)?;
        self.put_tag(form, T_DATE);
        self.put_date(date);
        Ok(())
    }

    pub fn on_time(&mut self, pos: i32, time: &RawTime) -> Result<(), PofError> {
        time.validate()?;
        let form = self.open(pos, T_TIME)?;
        self.put_tag(form, T_TIME);
        self.put_time(time);
        Ok(())
    }

    pub fn on_date_time(&mut self, pos: i32, dt: &RawDateTime) -> Result<(), PofError> {
        dt.validate()?;
        let form = self.open(pos, T_DATETIME)?;
        self.put_tag(form, T_DATETIME);
        self.put_date(&dt.date);
        self.put_time(&dt.time);
        Ok(())
    }

    pub fn on_year_month_interval(
        &mut self,
        pos: i32,
        interval: &YearMonthInterval,
    ) -> Result<(), PofError> {
        interval.validate()?;
        let form = self.open(pos, T_YEAR_MONTH_INTERVAL)?;
        self.put_tag(form, T_YEAR_MONTH_INTERVAL);
        self.put_all(&[interval.years, interval.months]);
        Ok(())
    }

    pub fn on_time_interval(&mut self, pos: i32, interval: &TimeInterval) -> Result<(), PofError> {
        interval.validate()?;
        let form = self.open(pos, T_TIME_INTERVAL)?;
        self.put_tag(form, T_TIME_INTERVAL);
        self.put_all(&[
            interval.hours,
            interval.minutes,
            interval.seconds,
            interval.nanos,
        ]);
        Ok(())
    }

    pub fn on_day_time_interval(
        &mut self,
        pos: i32,
        interval: &DayTimeInterval,
    ) -> Result<(), PofError> {
        interval.validate()?;
        let form = self.open(pos, T_DAY_TIME_INTERVAL)?;
        self.put_tag(form, T_DAY_TIME_INTERVAL);
        self.put_all(&[
            interval.days,
            interval.hours,
            interval.minutes,
            interval.seconds,
            interval.nanos,
        ]);
        Ok(())
    }

    fn put_all(&mut self, values: &[i32]) {
        for n in values {
            put_packed_i32(&mut self.out, *n);
        }
    }

    fn put_date(&mut self, date: &RawDate) {
        self.put_all(&[date.year, date.month, date.day]);
    }

    /// Whole milliseconds travel as a positive count, anything finer as
    /// negated nanoseconds.
    fn put_time(&mut self, time: &RawTime) {
        let fraction = if time.nano % 1_000_000 == 0 {
            time.nano / 1_000_000
        } else {
            -time.nano
        };
        self.put_all(&[time.hour, time.minute, time.second, fraction]);
        match time.zone {
            TimeZone::None => self.put_all(&[0]),
            TimeZone::Utc => self.put_all(&[1]),
            TimeZone::Offset { hours, minutes } => self.put_all(&[2, hours, minutes]),
        }
    }

    /// Opens a complex value. An empty value is omitted when skippable, or
    /// written as the empty-collection literal when compressible.
    fn begin_complex(
        &mut self,
        pos: i32,
        tag: i32,
        count: usize,
        header: &[i32],
        complex: Complex,
    ) -> Result<(), PofError> {
        let entries = count;
        let count = checked_len(count)?;
        if count == 0 && self.is_skippable() {
            self.stack.push(Complex::empty());
            return Ok(());
        }
        let form = self.open(pos, tag)?;
        if count == 0 && form.literal {
            put_packed_i32(&mut self.out, V_COLLECTION_EMPTY);
            self.stack.push(Complex::empty());
            return Ok(());
        }
        self.put_tag(form, tag);
        for t in header {
            check_uniform(*t)?;
        }
        self.put_all(header);
        put_packed_i32(&mut self.out, count);
        let declared = if complex.sparse { None } else { Some(entries) };
        self.stack.push(Complex {
            declared,
            ..complex
        });
        Ok(())
    }

    pub fn begin_collection(&mut self, pos: i32, count: usize) -> Result<(), PofError> {
        self.begin_complex(pos, T_COLLECTION, count, &[], Complex::plain())
    }

    pub fn begin_uniform_collection(
        &mut self,
        pos: i32,
        count: usize,
        element: i32,
    ) -> Result<(), PofError> {
        let complex = Complex::uniform(Some(element));
        self.begin_complex(pos, T_UNIFORM_COLLECTION, count, &[element], complex)
    }

    pub fn begin_array(&mut self, pos: i32, count: usize) -> Result<(), PofError> {
        self.begin_complex(pos, T_ARRAY, count, &[], Complex::plain())
    }

    pub fn begin_uniform_array(
        &mut self,
        pos: i32,
        count: usize,
        element: i32,
    ) -> Result<(), PofError> {
        let complex = Complex::uniform(Some(element));
        self.begin_complex(pos, T_UNIFORM_ARRAY, count, &[element], complex)
    }

    pub fn begin_sparse_array(&mut self, pos: i32, count: usize) -> Result<(), PofError> {
        self.begin_complex(pos, T_SPARSE_ARRAY, count, &[], Complex::sparse())
    }

    pub fn begin_uniform_sparse_array(
        &mut self,
        pos: i32,
        count: usize,
        element: i32,
    ) -> Result<(), PofError> {
        let complex = Complex {
            sparse: true,
            ..Complex::uniform(Some(element))
        };
        self.begin_complex(pos, T_UNIFORM_SPARSE_ARRAY, count, &[element], complex)
    }

    pub fn begin_map(&mut self, pos: i32, count: usize) -> Result<(), PofError> {
        self.begin_complex(pos, T_MAP, count, &[], Complex::map(None, None))
    }

    pub fn begin_uniform_keys_map(
        &mut self,
        pos: i32,
        count: usize,
        keys: i32,
    ) -> Result<(), PofError> {
        let complex = Complex::map(Some(keys), None);
        self.begin_complex(pos, T_UNIFORM_KEYS_MAP, count, &[keys], complex)
    }

    pub fn begin_uniform_map(
        &mut self,
        pos: i32,
        count: usize,
        keys: i32,
        values: i32,
    ) -> Result<(), PofError> {
        let complex = Complex::map(Some(keys), Some(values));
        self.begin_complex(pos, T_UNIFORM_MAP, count, &[keys, values], complex)
    }

    /// Opens a user-type value. The value after the header is never omitted
    /// nor written as a literal.
    pub fn begin_user_type(
        &mut self,
        pos: i32,
        identity: Option<i32>,
        type_id: i32,
        version: i32,
    ) -> Result<(), PofError> {
        self.encode_position(pos);
        self.register_identity(identity.unwrap_or(-1));
        if self.is_type_encoded(type_id)? {
            put_packed_i32(&mut self.out, type_id);
        }
        put_packed_i32(&mut self.out, version);
        self.stack.push(Complex::sparse());
        Ok(())
    }

    /// Closes the innermost complex value, terminating sparse forms.
    pub fn end_complex(&mut self) -> Result<(), PofError> {
        let complex = self
            .stack
            .pop()
            .ok_or_else(|| PofError::Protocol("no complex value is open".into()))?;
        if let Some(expected) = complex.declared {
            let width = complex.values_per_entry();
            if complex.written != expected * width {
                return Err(PofError::ElementCountMismatch {
                    expected,
                    actual: complex.written / width,
                });
            }
        }
        if complex.sparse {
            put_packed_i32(&mut self.out, TERMINATOR);
        }
        Ok(())
    }

    /// Appends pre-encoded properties or elements that are not counted.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.out.put_slice(bytes);
    }
}

/// Literal form of a float that is infinite or a whole number in the tiny
/// range. Negative zero has none.
fn float_literal(f: f64) -> Option<i32> {
    if f == f64::INFINITY {
        Some(V_FP_POS_INFINITY)
    } else if f == f64::NEG_INFINITY {
        Some(V_FP_NEG_INFINITY)
    } else if f.fract() == 0.0
        && (f64::from(TINY_MIN)..=f64::from(TINY_MAX)).contains(&f)
        && f.to_bits() != (-0.0f64).to_bits()
    {
        Some(encode_tiny_int(f as i32))
    } else {
        None
    }
}

fn decimal_width(tag: i32) -> usize {
    match tag {
        T_DECIMAL32 => 4,
        T_DECIMAL64 => 8,
        _ => 16,
    }
}

fn check_uniform(tag: i32) -> Result<(), PofError> {
    if is_valid_uniform_type(tag) {
        Ok(())
    } else {
        Err(PofError::Protocol(format!(
            "{} is not a valid uniform element type",
            type_name(tag)
        )))
    }
}

pub(crate) fn checked_len(len: usize) -> Result<i32, PofError> {
    i32::try_from(len).map_err(|_| PofError::InvalidValue(format!("length {len} exceeds i32")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(f: impl FnOnce(&mut Emitter) -> Result<(), PofError>) -> Vec<u8> {
        let mut e = Emitter::new();
        f(&mut e).unwrap();
        e.into_bytes().to_vec()
    }

    #[test]
    fn top_level_scalars() {
        // literals at the top level
        assert_eq!(bytes(|e| e.on_i32(-1, 0)), [0x69]);
        assert_eq!(bytes(|e| e.on_i32(-1, 22)), [0x7F]);
        assert_eq!(bytes(|e| e.on_i32(-1, 23)), [0x41, 0x17]);
        assert_eq!(bytes(|e| e.on_i32(-1, -1)), [0x68]);
        assert_eq!(bytes(|e| e.on_bool(-1, true)), [0x61]);
        assert_eq!(bytes(|e| e.on_string(-1, "")), [0x62]);
        assert_eq!(bytes(|e| e.on_string(-1, "hi")), [0x4E, 0x02, b'h', b'i']);
    }

    #[test]
    fn identity_suppresses_literals() {
        let out = bytes(|e| {
            e.register_identity(-1);
            e.on_i32(-1, 5)
        });
        assert_eq!(out, [0x41, 0x05]);
        let out = bytes(|e| {
            e.register_identity(3);
            e.on_string(-1, "")
        });
        assert_eq!(out, [0x5E, 0x03, 0x4E, 0x00]);
    }

    #[test]
    fn floats() {
        assert_eq!(bytes(|e| e.on_f64(-1, 1.0)), [0x6A]);
        assert_eq!(bytes(|e| e.on_f32(-1, f32::NAN)), [0x67]);
        assert_eq!(bytes(|e| e.on_f64(-1, f64::NEG_INFINITY)), [0x66]);
        let mut expected = vec![0x45];
        expected.extend_from_slice(&(-0.0f64).to_be_bytes());
        assert_eq!(bytes(|e| e.on_f64(-1, -0.0)), expected);
        assert_eq!(
            bytes(|e| e.on_f32(-1, 1.5)),
            [0x44, 0x3F, 0xC0, 0x00, 0x00]
        );
    }

    #[test]
    fn sparse_defaults_are_omitted() {
        let out = bytes(|e| {
            e.begin_sparse_array(-1, 4)?;
            e.on_i32(0, 0)?;
            e.on_i32(1, 7)?;
            e.on_string(2, "")?;
            e.register_identity(-1);
            e.on_string(3, "")?;
            e.end_complex()
        });
        // T_SPARSE_ARRAY, count 4, [1]=7, [3]="" in full form, terminator
        assert_eq!(out, [0x59, 0x04, 0x01, 0x70, 0x03, 0x4E, 0x00, 0x40]);
    }

    #[test]
    fn first_property_after_header_is_written_in_full() {
        let out = bytes(|e| {
            e.begin_user_type(-1, None, 5, 0)?;
            e.on_i32(0, 0)?;
            e.on_i32(1, 0)?;
            e.on_i32(2, 3)?;
            e.end_complex()
        });
        assert_eq!(out, [0x05, 0x00, 0x00, 0x41, 0x00, 0x02, 0x6C, 0x40]);
    }

    #[test]
    fn uniform_elements_have_no_tags() {
        let out = bytes(|e| {
            e.begin_uniform_array(-1, 2, T_INT32)?;
            e.on_i32(0, 1)?;
            e.on_i32(1, 300)?;
            e.end_complex()
        });
        assert_eq!(out, [0x58, 0x41, 0x02, 0x01, 0xAC, 0x04]);

        let mut e = Emitter::new();
        e.begin_uniform_collection(-1, 1, T_INT32).unwrap();
        assert!(matches!(e.on_string(0, "x"), Err(PofError::Protocol(_))));
    }

    #[test]
    fn empty_collections() {
        assert_eq!(
            bytes(|e| {
                e.begin_collection(-1, 0)?;
                e.end_complex()
            }),
            [0x63]
        );
        // omitted entirely inside a sparse form
        assert_eq!(
            bytes(|e| {
                e.begin_user_type(-1, None, 1, 0)?;
                e.on_i32(0, 9)?;
                e.begin_array(1, 0)?;
                e.end_complex()?;
                e.end_complex()
            }),
            [0x01, 0x00, 0x00, 0x41, 0x09, 0x40]
        );
    }

    #[test]
    fn uniform_maps_alternate_key_and_value_types() {
        let out = bytes(|e| {
            e.begin_uniform_map(-1, 1, T_CHAR_STRING, T_INT32)?;
            e.on_string(-1, "a")?;
            e.on_i32(-1, 2)?;
            e.end_complex()
        });
        assert_eq!(out, [0x5D, 0x4E, 0x41, 0x01, 0x01, b'a', 0x02]);

        let out = bytes(|e| {
            e.begin_uniform_keys_map(-1, 1, T_INT32)?;
            e.on_i32(-1, 2)?;
            e.on_i32(-1, 2)?;
            e.end_complex()
        });
        assert_eq!(out, [0x5C, 0x41, 0x01, 0x02, 0x6B]);
    }

    #[test]
    fn decimals_pick_their_width() {
        assert_eq!(bytes(|e| e.on_decimal(-1, Decimal::new(5, 0))), [0x6E]);
        assert_eq!(
            bytes(|e| e.on_decimal(-1, Decimal::new(123, 2))),
            [0x47, 0xBB, 0x01, 0x02]
        );
        let mut e = Emitter::new();
        e.begin_uniform_array(-1, 1, T_DECIMAL32).unwrap();
        let big = Decimal::new(123_456_789_012, 0);
        assert!(matches!(e.on_decimal(0, big), Err(PofError::InvalidValue(_))));
    }

    #[test]
    fn times() {
        let t = RawTime::new(10, 30, 0, 5_000_000, TimeZone::Offset { hours: -5, minutes: 30 });
        assert_eq!(
            bytes(|e| e.on_time(-1, &t)),
            [0x51, 0x0A, 0x1E, 0x00, 0x05, 0x02, 0x44, 0x1E]
        );
        let t = RawTime::local(0, 0, 0, 1);
        assert_eq!(
            bytes(|e| e.on_time(-1, &t)),
            [0x51, 0x00, 0x00, 0x00, 0x40, 0x00]
        );
        assert!(bytes_err(|e| e.on_time(-1, &RawTime::local(24, 0, 0, 0))));
    }

    fn bytes_err(f: impl FnOnce(&mut Emitter) -> Result<(), PofError>) -> bool {
        let mut e = Emitter::new();
        f(&mut e).is_err()
    }

    #[test]
    fn chars() {
        assert_eq!(bytes(|e| e.on_char(-1, 'A')), [0x4D, 0x41]);
        assert_eq!(bytes(|e| e.on_char(-1, '\u{3}')), [0x6C]);
        let out = bytes(|e| {
            e.begin_uniform_array(-1, 1, T_CHAR)?;
            e.on_char(0, '\0')?;
            e.end_complex()
        });
        assert_eq!(out, [0x58, 0x4D, 0x01, 0x00]);
    }

    #[test]
    fn unbalanced_end_is_an_error() {
        let mut e = Emitter::new();
        assert!(e.end_complex().is_err());
    }

    #[test]
    fn declared_counts_are_enforced() {
        let mut e = Emitter::new();
        e.begin_array(-1, 3).unwrap();
        e.on_i32(0, 5).unwrap();
        assert!(matches!(
            e.end_complex(),
            Err(PofError::ElementCountMismatch { expected: 3, actual: 1 })
        ));

        let mut e = Emitter::new();
        e.begin_map(-1, 1).unwrap();
        e.on_i32(-1, 1).unwrap();
        assert!(matches!(
            e.end_complex(),
            Err(PofError::ElementCountMismatch { expected: 1, actual: 0 })
        ));

        let mut e = Emitter::new();
        e.begin_collection(-1, 0).unwrap();
        e.on_bool(0, true).unwrap();
        assert!(e.end_complex().is_err());

        // nested values count once toward their parent
        let out = bytes(|e| {
            e.begin_array(-1, 2)?;
            e.begin_uniform_array(0, 1, T_INT32)?;
            e.on_i32(0, 1)?;
            e.end_complex()?;
            e.begin_user_type(1, None, 5, 0)?;
            e.end_complex()?;
            e.end_complex()
        });
        assert_eq!(out, [0x57, 0x02, 0x58, 0x41, 0x01, 0x01, 0x05, 0x00, 0x40]);

        // sparse forms declare only an upper bound
        let out = bytes(|e| {
            e.begin_sparse_array(-1, 4)?;
            e.on_i32(2, 1)?;
            e.end_complex()
        });
        assert_eq!(out, [0x59, 0x04, 0x02, 0x6A, 0x40]);
    }

    #[test]
    fn raw_payloads_count_their_elements() {
        let out = bytes(|e| {
            e.begin_uniform_array(-1, 2, T_OCTET)?;
            e.raw_elements(2).put_slice(&[7, 8]);
            e.end_complex()
        });
        assert_eq!(out, [0x58, 0x4B, 0x02, 0x07, 0x08]);

        let mut e = Emitter::new();
        e.begin_uniform_array(-1, 2, T_OCTET).unwrap();
        e.raw_elements(1).put_slice(&[7]);
        assert!(e.end_complex().is_err());
    }
}
