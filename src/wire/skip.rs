//! Skipping values without materializing them.
//!
//! Every function takes `depth`, the number of complex values that may still
//! be entered below the current position.

use super::catalog::read_uniform_type;
use super::marker::*;
use super::packed::{get_count, get_packed_i32, skip_packed};
use crate::buffer::PofInput;
use crate::error::PofError;

/// Skips one tagged value, including a leading identity marker.
pub fn skip_value(input: &mut PofInput, depth: usize) -> Result<(), PofError> {
    let mut tag = get_packed_i32(input)?;
    if tag == T_IDENTITY {
        skip_packed(input, 1)?;
        tag = get_packed_i32(input)?;
    }
    skip_uniform_value(input, tag, depth)
}

/// Skips the payload of a value whose tag is `tag`.
pub fn skip_uniform_value(input: &mut PofInput, tag: i32, depth: usize) -> Result<(), PofError> {
    match tag {
        T_INT16 | T_INT32 | T_INT64 | T_INT128 | T_REFERENCE | T_BOOLEAN => skip_packed(input, 1),
        T_YEAR_MONTH_INTERVAL | T_DECIMAL32 | T_DECIMAL64 | T_DECIMAL128 => skip_packed(input, 2),
        T_DATE => skip_packed(input, 3),
        T_TIME_INTERVAL => skip_packed(input, 4),
        T_DAY_TIME_INTERVAL => skip_packed(input, 5),
        T_FLOAT32 => input.skip(4),
        T_FLOAT64 => input.skip(8),
        T_FLOAT128 => input.skip(16),
        T_OCTET => input.skip(1),
        T_CHAR => {
            let extra = match input.read_u8()? & 0xF0 {
                0xC0 | 0xD0 => 1,
                0xE0 => 2,
                _ => 0,
            };
            input.skip(extra)
        }
        T_OCTET_STRING | T_CHAR_STRING => {
            let len = get_packed_i32(input)?;
            // negative length: null
            if len > 0 {
                input.skip(len as usize)?;
            }
            Ok(())
        }
        T_DATETIME => {
            skip_packed(input, 3)?;
            skip_time(input)
        }
        T_TIME => skip_time(input),
        T_COLLECTION | T_ARRAY => {
            let depth = enter(depth)?;
            for _ in 0..get_count(input)? {
                skip_value(input, depth)?;
            }
            Ok(())
        }
        T_UNIFORM_COLLECTION | T_UNIFORM_ARRAY => {
            let depth = enter(depth)?;
            let element = read_uniform_type(input)?;
            for _ in 0..get_count(input)? {
                skip_uniform_value(input, element, depth)?;
            }
            Ok(())
        }
        T_SPARSE_ARRAY => skip_sparse(input, None, enter(depth)?),
        T_UNIFORM_SPARSE_ARRAY => {
            let depth = enter(depth)?;
            let element = read_uniform_type(input)?;
            skip_sparse(input, Some(element), depth)
        }
        T_MAP => {
            let depth = enter(depth)?;
            for _ in 0..get_count(input)? {
                skip_value(input, depth)?;
                skip_value(input, depth)?;
            }
            Ok(())
        }
        T_UNIFORM_KEYS_MAP => {
            let depth = enter(depth)?;
            let key = read_uniform_type(input)?;
            for _ in 0..get_count(input)? {
                skip_uniform_value(input, key, depth)?;
                skip_value(input, depth)?;
            }
            Ok(())
        }
        T_UNIFORM_MAP => {
            let depth = enter(depth)?;
            let key = read_uniform_type(input)?;
            let value = read_uniform_type(input)?;
            for _ in 0..get_count(input)? {
                skip_uniform_value(input, key, depth)?;
                skip_uniform_value(input, value, depth)?;
            }
            Ok(())
        }
        // single-value literals carry no payload
        V_INT_22..=V_BOOLEAN_FALSE => Ok(()),
        t if t >= 0 => {
            let depth = enter(depth)?;
            // version id, or an identity marker inside a uniform container
            if get_packed_i32(input)? == T_IDENTITY {
                return Err(PofError::Unsupported(
                    "object identity inside a uniform container".into(),
                ));
            }
            while get_packed_i32(input)? >= 0 {
                skip_value(input, depth)?;
            }
            Ok(())
        }
        _ => Err(PofError::Corrupted(format!("type={tag}"))),
    }
}

fn enter(depth: usize) -> Result<usize, PofError> {
    depth
        .checked_sub(1)
        .ok_or_else(|| PofError::Protocol("maximum nesting depth exceeded while skipping".into()))
}

fn skip_time(input: &mut PofInput) -> Result<(), PofError> {
    skip_packed(input, 4)?;
    if get_packed_i32(input)? == 2 {
        skip_packed(input, 2)?;
    }
    Ok(())
}

/// Sparse forms hold at most `count` entries followed by a negative index.
fn skip_sparse(input: &mut PofInput, element: Option<i32>, depth: usize) -> Result<(), PofError> {
    for _ in 0..=get_count(input)? {
        if get_packed_i32(input)? < 0 {
            break;
        }
        match element {
            Some(tag) => skip_uniform_value(input, tag, depth)?,
            None => skip_value(input, depth)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::packed::put_packed_i32;
    use bytes::{BufMut, BytesMut};

    fn stream(f: impl FnOnce(&mut BytesMut)) -> PofInput {
        let mut buf = BytesMut::new();
        f(&mut buf);
        // sentinel after the value under test
        buf.put_u8(0x7E);
        PofInput::new(buf.freeze())
    }

    const DEPTH: usize = 16;

    fn assert_skips(mut input: PofInput) {
        skip_value(&mut input, DEPTH).unwrap();
        assert_eq!(input.read_u8().unwrap(), 0x7E);
    }

    #[test]
    fn primitives() {
        assert_skips(stream(|b| {
            put_packed_i32(b, T_INT64);
            put_packed_i32(b, 1 << 30);
        }));
        assert_skips(stream(|b| {
            put_packed_i32(b, T_FLOAT128);
            b.put_slice(&[0; 16]);
        }));
        assert_skips(stream(|b| {
            put_packed_i32(b, T_CHAR);
            b.put_slice(&[0xE2, 0x82, 0xAC]);
        }));
        assert_skips(stream(|b| put_packed_i32(b, V_INT_22)));
        assert_skips(stream(|b| put_packed_i32(b, V_BOOLEAN_FALSE)));
    }

    #[test]
    fn strings_and_null_strings() {
        assert_skips(stream(|b| {
            put_packed_i32(b, T_CHAR_STRING);
            put_packed_i32(b, 3);
            b.put_slice(b"abc");
        }));
        assert_skips(stream(|b| {
            put_packed_i32(b, T_OCTET_STRING);
            put_packed_i32(b, -1);
        }));
    }

    #[test]
    fn zoned_datetime() {
        assert_skips(stream(|b| {
            put_packed_i32(b, T_DATETIME);
            for n in [2024, 2, 29, 10, 30, 0, 0, 2, -5, 30] {
                put_packed_i32(b, n);
            }
        }));
    }

    #[test]
    fn nested_complex_values() {
        assert_skips(stream(|b| {
            put_packed_i32(b, T_MAP);
            put_packed_i32(b, 1);
            put_packed_i32(b, T_UNIFORM_ARRAY);
            put_packed_i32(b, T_INT32);
            put_packed_i32(b, 2);
            put_packed_i32(b, 500);
            put_packed_i32(b, -500);
            put_packed_i32(b, T_SPARSE_ARRAY);
            put_packed_i32(b, 10);
            put_packed_i32(b, 4);
            put_packed_i32(b, V_INT_1);
            put_packed_i32(b, -1);
        }));
    }

    #[test]
    fn user_type_with_identity() {
        assert_skips(stream(|b| {
            put_packed_i32(b, T_IDENTITY);
            put_packed_i32(b, 1);
            put_packed_i32(b, 7); // type id
            put_packed_i32(b, 0); // version
            put_packed_i32(b, 0);
            put_packed_i32(b, T_REFERENCE);
            put_packed_i32(b, 1);
            put_packed_i32(b, -1);
        }));
    }

    #[test]
    fn identity_in_uniform_user_type_is_unsupported() {
        let mut input = stream(|b| {
            put_packed_i32(b, T_IDENTITY);
            put_packed_i32(b, 3);
        });
        assert!(matches!(
            skip_uniform_value(&mut input, 5, DEPTH),
            Err(PofError::Unsupported(_))
        ));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let mut input = stream(|b| put_packed_i32(b, -70));
        assert!(matches!(skip_value(&mut input, DEPTH), Err(PofError::Corrupted(_))));
        let mut input = stream(|b| put_packed_i32(b, T_UNKNOWN));
        assert!(skip_value(&mut input, DEPTH).unwrap_err().is_corruption());
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |levels: usize| {
            stream(|b| {
                for _ in 0..levels {
                    put_packed_i32(b, T_ARRAY);
                    put_packed_i32(b, 1);
                }
                put_packed_i32(b, V_INT_0);
            })
        };
        assert_skips(nested(DEPTH));
        let err = skip_value(&mut nested(DEPTH + 1), DEPTH).unwrap_err();
        assert!(matches!(err, PofError::Protocol(_)));
        // far deeper than any stack could recurse
        assert!(skip_value(&mut nested(1_000_000), DEPTH).is_err());

        let mut user_types = stream(|b| {
            for _ in 0..=DEPTH {
                put_packed_i32(b, 7); // type id
                put_packed_i32(b, 0); // version
                put_packed_i32(b, 0); // property index
            }
        });
        assert!(matches!(
            skip_value(&mut user_types, DEPTH),
            Err(PofError::Protocol(_))
        ));
    }

    #[test]
    fn identity_chains_are_corrupt() {
        let mut input = stream(|b| {
            for n in [T_IDENTITY, 1, T_IDENTITY, 2, V_INT_0] {
                put_packed_i32(b, n);
            }
        });
        assert!(skip_value(&mut input, DEPTH).unwrap_err().is_corruption());
    }

    #[test]
    fn uniform_literal_elements_are_corrupt() {
        let mut input = stream(|b| {
            for n in [T_UNIFORM_COLLECTION, V_BOOLEAN_TRUE, 20_000_000] {
                put_packed_i32(b, n);
            }
        });
        assert!(matches!(skip_value(&mut input, DEPTH), Err(PofError::Corrupted(_))));
        let mut input = stream(|b| {
            for n in [T_UNIFORM_MAP, T_INT32, T_REFERENCE, 0] {
                put_packed_i32(b, n);
            }
        });
        assert!(matches!(skip_value(&mut input, DEPTH), Err(PofError::Corrupted(_))));
    }
}
