//! Mapping between wire types and native values.
//!
//! The `read_as_*` functions read the payload of a value whose tag has
//! already been consumed and coerce it to the requested native type. They
//! also serve uniform elements, whose payload follows the declared element
//! type with no tag of its own.

use bytes::{BufMut, BytesMut};

use super::marker::*;
use super::packed::{get_packed_i32, get_packed_i128};
use super::utf::{get_char, get_unit};
use crate::buffer::PofInput;
use crate::context::TypeContext;
use crate::error::PofError;
use crate::types::{DECIMAL128_SCALE, Decimal, PofValue, RawQuad};

/// Intermediate numeric reading shared by the coercions.
enum Number {
    Int(i128),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    /// One of the infinity or NaN literals.
    NonFinite(f64),
}

fn read_number(input: &mut PofInput, tag: i32, target: &'static str) -> Result<Number, PofError> {
    Ok(match tag {
        T_INT16 | T_INT32 | T_INT64 | T_INT128 | T_BOOLEAN => Number::Int(get_packed_i128(input)?),
        T_FLOAT32 => Number::F32(input.read_f32()?),
        T_FLOAT64 => Number::F64(input.read_f64()?),
        T_FLOAT128 => Number::F64(read_quad(input)?.to_f64()),
        T_DECIMAL32 | T_DECIMAL64 | T_DECIMAL128 => Number::Decimal(read_decimal(input)?),
        T_OCTET => Number::Int(i128::from(input.read_u8()?)),
        T_CHAR => Number::Int(i128::from(get_unit(input)?)),
        V_REFERENCE_NULL | V_BOOLEAN_FALSE => Number::Int(0),
        V_BOOLEAN_TRUE => Number::Int(1),
        V_FP_POS_INFINITY => Number::NonFinite(f64::INFINITY),
        V_FP_NEG_INFINITY => Number::NonFinite(f64::NEG_INFINITY),
        V_FP_NAN => Number::NonFinite(f64::NAN),
        t if is_tiny_int(t) => Number::Int(i128::from(decode_tiny_int(t))),
        _ => return Err(PofError::conversion(target, tag)),
    })
}

pub fn read_decimal(input: &mut PofInput) -> Result<Decimal, PofError> {
    let unscaled = get_packed_i128(input)?;
    let scale = get_packed_i32(input)?;
    let (lo, hi) = DECIMAL128_SCALE;
    if !(lo..=hi).contains(&scale) {
        return Err(PofError::Corrupted(format!("decimal scale {scale} out of range")));
    }
    Ok(Decimal::new(unscaled, scale))
}

/// Reads the element, key or value type declared by a uniform form.
pub fn read_uniform_type(input: &mut PofInput) -> Result<i32, PofError> {
    let tag = get_packed_i32(input)?;
    if is_valid_uniform_type(tag) {
        Ok(tag)
    } else {
        Err(PofError::Corrupted(format!(
            "{} is not a valid uniform element type",
            type_name(tag)
        )))
    }
}

pub fn read_quad(input: &mut PofInput) -> Result<RawQuad, PofError> {
    let bytes = input.read_bytes(16)?;
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&bytes);
    Ok(RawQuad::from_bytes(raw))
}

/// Integer coercion: integers narrow by truncation, floats saturate, and the
/// non-finite literals are rejected.
pub fn read_as_i128(input: &mut PofInput, tag: i32) -> Result<i128, PofError> {
    Ok(match read_number(input, tag, "i128")? {
        Number::Int(n) => n,
        Number::F32(f) => f as i128,
        Number::F64(f) => f as i128,
        Number::Decimal(d) => d.to_i128(),
        Number::NonFinite(_) => return Err(PofError::conversion("i128", tag)),
    })
}

pub fn read_as_i64(input: &mut PofInput, tag: i32) -> Result<i64, PofError> {
    Ok(match read_number(input, tag, "i64")? {
        Number::Int(n) => n as i64,
        Number::F32(f) => f as i64,
        Number::F64(f) => f as i64,
        Number::Decimal(d) => d.to_i128() as i64,
        Number::NonFinite(_) => return Err(PofError::conversion("i64", tag)),
    })
}

pub fn read_as_i32(input: &mut PofInput, tag: i32) -> Result<i32, PofError> {
    Ok(match read_number(input, tag, "i32")? {
        Number::Int(n) => n as i32,
        Number::F32(f) => f as i32,
        Number::F64(f) => f as i32,
        Number::Decimal(d) => d.to_i128() as i32,
        Number::NonFinite(_) => return Err(PofError::conversion("i32", tag)),
    })
}

pub fn read_as_i16(input: &mut PofInput, tag: i32) -> Result<i16, PofError> {
    read_as_i32(input, tag).map(|n| n as i16)
}

pub fn read_as_u8(input: &mut PofInput, tag: i32) -> Result<u8, PofError> {
    if tag == T_OCTET {
        return input.read_u8();
    }
    read_as_i32(input, tag).map(|n| n as u8)
}

pub fn read_as_bool(input: &mut PofInput, tag: i32) -> Result<bool, PofError> {
    read_as_i32(input, tag).map(|n| n != 0)
}

pub fn read_as_f64(input: &mut PofInput, tag: i32) -> Result<f64, PofError> {
    Ok(match read_number(input, tag, "f64")? {
        Number::Int(n) => n as f64,
        Number::F32(f) => f64::from(f),
        Number::F64(f) | Number::NonFinite(f) => f,
        Number::Decimal(d) => d.to_f64(),
    })
}

pub fn read_as_f32(input: &mut PofInput, tag: i32) -> Result<f32, PofError> {
    Ok(match read_number(input, tag, "f32")? {
        Number::Int(n) => n as f32,
        Number::F32(f) => f,
        Number::F64(f) | Number::NonFinite(f) => f as f32,
        Number::Decimal(d) => d.to_f64() as f32,
    })
}

pub fn read_as_quad(input: &mut PofInput, tag: i32) -> Result<RawQuad, PofError> {
    if tag == T_FLOAT128 {
        return read_quad(input);
    }
    read_as_f64(input, tag).map(RawQuad::from_f64)
}

/// Floats convert through their shortest decimal rendering.
pub fn read_as_decimal(input: &mut PofInput, tag: i32) -> Result<Decimal, PofError> {
    match read_number(input, tag, "decimal")? {
        Number::Int(n) => Ok(Decimal::from(n)),
        Number::F32(f) => format!("{f}").parse(),
        Number::F64(f) => Decimal::from_f64(f),
        Number::Decimal(d) => Ok(d),
        Number::NonFinite(_) => Err(PofError::conversion("decimal", tag)),
    }
}

pub fn read_as_char(input: &mut PofInput, tag: i32) -> Result<char, PofError> {
    match tag {
        T_OCTET => Ok(char::from(input.read_u8()?)),
        T_CHAR => get_char(input),
        _ => {
            let unit = read_as_i32(input, tag)? as u16;
            char::from_u32(u32::from(unit)).ok_or_else(|| PofError::conversion("char", tag))
        }
    }
}

/// The tag `value` is encoded with when written through `write_object`.
///
/// Decimals report `T_DECIMAL128`, the width that holds any decimal; the
/// encoder still picks the smallest width for a tagged value.
pub fn wire_type_of(value: &PofValue, ctx: &dyn TypeContext) -> Result<i32, PofError> {
    Ok(match value {
        PofValue::Null => V_REFERENCE_NULL,
        PofValue::Bool(_) => T_BOOLEAN,
        PofValue::Octet(_) => T_OCTET,
        PofValue::Char(_) => T_CHAR,
        PofValue::Int16(_) => T_INT16,
        PofValue::Int32(_) => T_INT32,
        PofValue::Int64(_) => T_INT64,
        PofValue::Int128(_) => T_INT128,
        PofValue::Float32(_) => T_FLOAT32,
        PofValue::Float64(_) => T_FLOAT64,
        PofValue::Float128(_) => T_FLOAT128,
        PofValue::Decimal(_) => T_DECIMAL128,
        PofValue::Binary(_) => T_OCTET_STRING,
        PofValue::String(_) => T_CHAR_STRING,
        PofValue::Date(_) | PofValue::LocalDate(_) => T_DATE,
        PofValue::Time(_) | PofValue::LocalTime(_) => T_TIME,
        PofValue::DateTime(_) | PofValue::LocalDateTime(_) | PofValue::OffsetDateTime(_) => {
            T_DATETIME
        }
        PofValue::YearMonthInterval(_) => T_YEAR_MONTH_INTERVAL,
        PofValue::TimeInterval(_) => T_TIME_INTERVAL,
        PofValue::DayTimeInterval(_) => T_DAY_TIME_INTERVAL,
        PofValue::BoolArray(_)
        | PofValue::ByteArray(_)
        | PofValue::CharArray(_)
        | PofValue::Int16Array(_)
        | PofValue::Int32Array(_)
        | PofValue::Int64Array(_)
        | PofValue::Float32Array(_)
        | PofValue::Float64Array(_) => T_UNIFORM_ARRAY,
        PofValue::Array(_) => T_ARRAY,
        PofValue::Collection(_) => T_COLLECTION,
        PofValue::SparseArray(_) => T_SPARSE_ARRAY,
        PofValue::Map(_) => T_MAP,
        PofValue::Object(o) => ctx.type_id_for(o)?,
    })
}

/// The element tag every item of `items` shares, if any. Nulls never
/// qualify, since a uniform element cannot be null.
pub fn common_type<'a>(
    items: impl IntoIterator<Item = &'a PofValue>,
    ctx: &dyn TypeContext,
) -> Result<Option<i32>, PofError> {
    let mut common = None;
    for item in items {
        if item.is_null() {
            return Ok(None);
        }
        let tag = wire_type_of(item, ctx)?;
        match common {
            None => common = Some(tag),
            Some(t) if t == tag => {}
            Some(_) => return Ok(None),
        }
    }
    Ok(common)
}

/// A fixed-width element of a raw octet array: a uniform octet array whose
/// bytes hold big-endian numbers of `WIDTH` bytes each.
pub trait RawElement: Copy + Sized {
    const WIDTH: usize;

    fn put(self, buf: &mut BytesMut);

    fn get(input: &mut PofInput) -> Result<Self, PofError>;
}

macro_rules! raw_element {
    ($ty:ty, $width:expr, $put:ident, $get:ident) => {
        impl RawElement for $ty {
            const WIDTH: usize = $width;

            fn put(self, buf: &mut BytesMut) {
                buf.$put(self);
            }

            fn get(input: &mut PofInput) -> Result<Self, PofError> {
                input.$get()
            }
        }
    };
}

raw_element!(i16, 2, put_i16, read_i16);
raw_element!(i32, 4, put_i32, read_i32);
raw_element!(i64, 8, put_i64, read_i64);
raw_element!(f32, 4, put_f32, read_f32);
raw_element!(f64, 8, put_f64, read_f64);

/// Decodes `octets` bytes of raw elements.
pub fn read_raw_elements<T: RawElement>(
    input: &mut PofInput,
    octets: usize,
) -> Result<Vec<T>, PofError> {
    if octets % T::WIDTH != 0 {
        return Err(PofError::Corrupted(format!(
            "raw array of {octets} octets is not a multiple of element width {}",
            T::WIDTH
        )));
    }
    input.ensure(octets)?;
    (0..octets / T::WIDTH).map(|_| T::get(input)).collect()
}
