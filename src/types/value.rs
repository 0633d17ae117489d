//! POF value model.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use super::numeric::{Decimal, RawQuad};
use super::object::PofObject;
use super::temporal::{
    DayTimeInterval, RawDate, RawDateTime, RawTime, TimeInterval, YearMonthInterval,
};

/// Sparse array contents keyed by element index.
pub type SparseArray = BTreeMap<i32, PofValue>;

/// A value that can be written to or read from a POF stream.
///
/// Each variant corresponds to one wire type; user types travel as
/// [`PofObject`] handles and are encoded by the serializer registered for
/// their Rust type.
#[derive(Debug, Clone, PartialEq)]
pub enum PofValue {
    Null,
    Bool(bool),
    Octet(u8),
    Char(char),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Float32(f32),
    Float64(f64),
    Float128(RawQuad),
    Decimal(Decimal),
    /// An octet-string.
    Binary(Bytes),
    String(String),
    // Temporal, raw POF layout
    Date(RawDate),
    Time(RawTime),
    DateTime(RawDateTime),
    // Temporal, chrono
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    LocalDateTime(NaiveDateTime),
    OffsetDateTime(DateTime<FixedOffset>),
    YearMonthInterval(YearMonthInterval),
    TimeInterval(TimeInterval),
    DayTimeInterval(DayTimeInterval),
    // Uniform primitive arrays
    BoolArray(Vec<bool>),
    ByteArray(Vec<u8>),
    CharArray(Vec<char>),
    Int16Array(Vec<i16>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float32Array(Vec<f32>),
    Float64Array(Vec<f64>),
    // Complex
    Array(Vec<PofValue>),
    Collection(Vec<PofValue>),
    SparseArray(SparseArray),
    Map(Vec<(PofValue, PofValue)>),
    Object(PofObject),
}

impl PofValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns any integer variant widened to `i64`; `Int128` only if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Octet(n) => Some(i64::from(n)),
            Self::Int16(n) => Some(i64::from(n)),
            Self::Int32(n) => Some(i64::from(n)),
            Self::Int64(n) => Some(n),
            Self::Int128(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(f) => Some(f64::from(f)),
            Self::Float64(f) => Some(f),
            Self::Float128(q) => Some(q.to_f64()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PofObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Elements of an `Array` or `Collection`.
    pub fn as_slice(&self) -> Option<&[PofValue]> {
        match self {
            Self::Array(v) | Self::Collection(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Octet(_) => "octet",
            Self::Char(_) => "char",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Int128(_) => "int128",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Float128(_) => "float128",
            Self::Decimal(_) => "decimal",
            Self::Binary(_) => "binary",
            Self::String(_) => "string",
            Self::Date(_) | Self::LocalDate(_) => "date",
            Self::Time(_) | Self::LocalTime(_) => "time",
            Self::DateTime(_) | Self::LocalDateTime(_) | Self::OffsetDateTime(_) => "datetime",
            Self::YearMonthInterval(_) => "year-month-interval",
            Self::TimeInterval(_) => "time-interval",
            Self::DayTimeInterval(_) => "day-time-interval",
            Self::BoolArray(_) => "bool[]",
            Self::ByteArray(_) => "octet[]",
            Self::CharArray(_) => "char[]",
            Self::Int16Array(_) => "int16[]",
            Self::Int32Array(_) => "int32[]",
            Self::Int64Array(_) => "int64[]",
            Self::Float32Array(_) => "float32[]",
            Self::Float64Array(_) => "float64[]",
            Self::Array(_) => "array",
            Self::Collection(_) => "collection",
            Self::SparseArray(_) => "sparse-array",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }
}

macro_rules! from_impls {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PofValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

from_impls! {
    bool => Bool,
    u8 => Octet,
    char => Char,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    f32 => Float32,
    f64 => Float64,
    RawQuad => Float128,
    Decimal => Decimal,
    Bytes => Binary,
    String => String,
    RawDate => Date,
    RawTime => Time,
    RawDateTime => DateTime,
    NaiveDate => LocalDate,
    NaiveTime => LocalTime,
    NaiveDateTime => LocalDateTime,
    DateTime<FixedOffset> => OffsetDateTime,
    YearMonthInterval => YearMonthInterval,
    TimeInterval => TimeInterval,
    DayTimeInterval => DayTimeInterval,
    Vec<bool> => BoolArray,
    Vec<char> => CharArray,
    Vec<i16> => Int16Array,
    Vec<i32> => Int32Array,
    Vec<i64> => Int64Array,
    Vec<f32> => Float32Array,
    Vec<f64> => Float64Array,
    Vec<PofValue> => Collection,
    SparseArray => SparseArray,
    PofObject => Object,
}

impl From<&str> for PofValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<Vec<u8>> for PofValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(b))
    }
}

impl<T: Into<PofValue>> From<Option<T>> for PofValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = impl fmt::Display>) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

impl fmt::Display for PofValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Octet(b) => write!(f, "0x{b:02X}"),
            Self::Char(c) => write!(f, "'{c}'"),
            Self::Int16(n) => write!(f, "{n}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::Int128(n) => write!(f, "{n}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Float128(q) => write!(f, "{}", q.to_f64()),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::LocalDate(d) => write!(f, "{d}"),
            Self::LocalTime(t) => write!(f, "{t}"),
            Self::LocalDateTime(dt) => write!(f, "{dt}"),
            Self::OffsetDateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::YearMonthInterval(i) => write!(f, "P{}Y{}M", i.years, i.months),
            Self::TimeInterval(i) => {
                write!(f, "PT{}H{}M{}.{:09}S", i.hours, i.minutes, i.seconds, i.nanos.abs())
            }
            Self::DayTimeInterval(i) => write!(
                f,
                "P{}DT{}H{}M{}.{:09}S",
                i.days,
                i.hours,
                i.minutes,
                i.seconds,
                i.nanos.abs()
            ),
            Self::BoolArray(v) => write_list(f, v.iter()),
            Self::ByteArray(v) => write!(f, "<{} octets>", v.len()),
            Self::CharArray(v) => write!(f, "{:?}", v.iter().collect::<String>()),
            Self::Int16Array(v) => write_list(f, v.iter()),
            Self::Int32Array(v) => write_list(f, v.iter()),
            Self::Int64Array(v) => write_list(f, v.iter()),
            Self::Float32Array(v) => write_list(f, v.iter()),
            Self::Float64Array(v) => write_list(f, v.iter()),
            Self::Array(v) | Self::Collection(v) => write_list(f, v.iter()),
            Self::SparseArray(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{k}]: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Object(o) => write!(f, "{o:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert_eq!(PofValue::Int16(-3).as_i64(), Some(-3));
        assert_eq!(PofValue::Octet(200).as_i64(), Some(200));
        assert_eq!(PofValue::Int128(i128::MAX).as_i64(), None);
        assert_eq!(PofValue::Float32(1.5).as_f64(), Some(1.5));
        assert_eq!(PofValue::from("hi").as_str(), Some("hi"));
        assert!(PofValue::from(None::<i32>).is_null());
        assert_eq!(PofValue::from(Some(7i32)), PofValue::Int32(7));
        let list = PofValue::from(vec![PofValue::Null]);
        assert_eq!(list.as_slice().map(<[_]>::len), Some(1));
    }

    #[test]
    fn conversions_pick_variants() {
        assert_eq!(PofValue::from(vec![1u8, 2]), PofValue::Binary(Bytes::from_static(&[1, 2])));
        assert_eq!(PofValue::from(vec![1i64]), PofValue::Int64Array(vec![1]));
        assert_eq!(PofValue::from(b'x').kind(), "octet");
    }

    #[test]
    fn display() {
        let v = PofValue::Collection(vec![
            PofValue::Int32(1),
            PofValue::from("two"),
            PofValue::Null,
        ]);
        assert_eq!(v.to_string(), "[1, \"two\", null]");
        let mut sparse = SparseArray::new();
        sparse.insert(4, PofValue::Bool(true));
        assert_eq!(PofValue::SparseArray(sparse).to_string(), "{[4]: true}");
        assert_eq!(
            PofValue::Decimal(Decimal::new(-125, 2)).to_string(),
            "-1.25"
        );
    }
}
