//! POF type tags and single-value literal constants.

// Intrinsic types
pub const T_INT16: i32 = -1;
pub const T_INT32: i32 = -2;
pub const T_INT64: i32 = -3;
pub const T_INT128: i32 = -4;
pub const T_FLOAT32: i32 = -5;
pub const T_FLOAT64: i32 = -6;
pub const T_FLOAT128: i32 = -7;
pub const T_DECIMAL32: i32 = -8;
pub const T_DECIMAL64: i32 = -9;
pub const T_DECIMAL128: i32 = -10;
pub const T_BOOLEAN: i32 = -11;
pub const T_OCTET: i32 = -12;
pub const T_OCTET_STRING: i32 = -13;
pub const T_CHAR: i32 = -14;
pub const T_CHAR_STRING: i32 = -15;
pub const T_DATE: i32 = -16;
pub const T_YEAR_MONTH_INTERVAL: i32 = -17;
pub const T_TIME: i32 = -18;
pub const T_TIME_INTERVAL: i32 = -19;
pub const T_DATETIME: i32 = -20;
pub const T_DAY_TIME_INTERVAL: i32 = -21;

// Complex types
pub const T_COLLECTION: i32 = -22;
pub const T_UNIFORM_COLLECTION: i32 = -23;
pub const T_ARRAY: i32 = -24;
pub const T_UNIFORM_ARRAY: i32 = -25;
pub const T_SPARSE_ARRAY: i32 = -26;
pub const T_UNIFORM_SPARSE_ARRAY: i32 = -27;
pub const T_MAP: i32 = -28;
pub const T_UNIFORM_KEYS_MAP: i32 = -29;
pub const T_UNIFORM_MAP: i32 = -30;

// Identity and reference markers
pub const T_IDENTITY: i32 = -31;
pub const T_REFERENCE: i32 = -32;

// Single-value literals
pub const V_BOOLEAN_FALSE: i32 = -33;
pub const V_BOOLEAN_TRUE: i32 = -34;
pub const V_STRING_ZERO_LENGTH: i32 = -35;
pub const V_COLLECTION_EMPTY: i32 = -36;
pub const V_REFERENCE_NULL: i32 = -37;
pub const V_FP_POS_INFINITY: i32 = -38;
pub const V_FP_NEG_INFINITY: i32 = -39;
pub const V_FP_NAN: i32 = -40;

// Tiny integers: V_INT_NEG_1 (-41) down to V_INT_22 (-64).
pub const V_INT_NEG_1: i32 = -41;
pub const V_INT_0: i32 = -42;
pub const V_INT_1: i32 = -43;
pub const V_INT_22: i32 = -64;

/// Never written; used as "no type" in uniform slots.
pub const T_UNKNOWN: i32 = -65;

/// Index value that terminates a sparse property or element stream.
pub const TERMINATOR: i32 = -1;

/// Smallest and largest values expressible as a tiny-integer literal.
pub const TINY_MIN: i32 = -1;
pub const TINY_MAX: i32 = 22;

/// Returns the literal tag for a tiny integer in `-1..=22`.
pub fn encode_tiny_int(n: i32) -> i32 {
    debug_assert!((TINY_MIN..=TINY_MAX).contains(&n));
    V_INT_0 - n
}

/// Returns the integer carried by a tiny-integer literal tag.
pub fn decode_tiny_int(tag: i32) -> i32 {
    debug_assert!(is_tiny_int(tag));
    V_INT_0 - tag
}

pub fn is_tiny_int(tag: i32) -> bool {
    (V_INT_22..=V_INT_NEG_1).contains(&tag)
}

pub fn fits_tiny(n: i64) -> bool {
    (i64::from(TINY_MIN)..=i64::from(TINY_MAX)).contains(&n)
}

/// True for tags a value may legally start with (user types included).
pub fn is_valid_tag(tag: i32) -> bool {
    tag >= 0 || (V_INT_22..=T_INT16).contains(&tag)
}

/// True for tags that may be declared as the element type of a uniform form.
pub fn is_valid_uniform_type(tag: i32) -> bool {
    tag >= 0 || (T_UNIFORM_MAP..=T_INT16).contains(&tag)
}

/// Human-readable name of a tag, used in error messages.
pub fn type_name(tag: i32) -> &'static str {
    match tag {
        T_INT16 => "int16",
        T_INT32 => "int32",
        T_INT64 => "int64",
        T_INT128 => "int128",
        T_FLOAT32 => "float32",
        T_FLOAT64 => "float64",
        T_FLOAT128 => "float128",
        T_DECIMAL32 => "decimal32",
        T_DECIMAL64 => "decimal64",
        T_DECIMAL128 => "decimal128",
        T_BOOLEAN => "boolean",
        T_OCTET => "octet",
        T_OCTET_STRING => "octet-string",
        T_CHAR => "char",
        T_CHAR_STRING => "char-string",
        T_DATE => "date",
        T_YEAR_MONTH_INTERVAL => "year-month-interval",
        T_TIME => "time",
        T_TIME_INTERVAL => "time-interval",
        T_DATETIME => "datetime",
        T_DAY_TIME_INTERVAL => "day-time-interval",
        T_COLLECTION => "collection",
        T_UNIFORM_COLLECTION => "uniform-collection",
        T_ARRAY => "array",
        T_UNIFORM_ARRAY => "uniform-array",
        T_SPARSE_ARRAY => "sparse-array",
        T_UNIFORM_SPARSE_ARRAY => "uniform-sparse-array",
        T_MAP => "map",
        T_UNIFORM_KEYS_MAP => "uniform-keys-map",
        T_UNIFORM_MAP => "uniform-map",
        T_IDENTITY => "identity",
        T_REFERENCE => "reference",
        V_BOOLEAN_FALSE => "boolean:false",
        V_BOOLEAN_TRUE => "boolean:true",
        V_STRING_ZERO_LENGTH => "string:zero-length",
        V_COLLECTION_EMPTY => "collection:empty",
        V_REFERENCE_NULL => "reference:null",
        V_FP_POS_INFINITY => "floating-point:+infinity",
        V_FP_NEG_INFINITY => "floating-point:-infinity",
        V_FP_NAN => "floating-point:NaN",
        t if is_tiny_int(t) => "int:tiny",
        t if t >= 0 => "user-type",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_int_mapping() {
        assert_eq!(encode_tiny_int(-1), V_INT_NEG_1);
        assert_eq!(encode_tiny_int(0), V_INT_0);
        assert_eq!(encode_tiny_int(1), V_INT_1);
        assert_eq!(encode_tiny_int(22), V_INT_22);
        for n in TINY_MIN..=TINY_MAX {
            assert_eq!(decode_tiny_int(encode_tiny_int(n)), n);
        }
        assert!(!is_tiny_int(V_FP_NAN));
        assert!(!is_tiny_int(T_UNKNOWN));
    }

    #[test]
    fn tag_validity() {
        assert!(is_valid_tag(0));
        assert!(is_valid_tag(1000));
        assert!(is_valid_tag(T_REFERENCE));
        assert!(is_valid_tag(V_INT_22));
        assert!(!is_valid_tag(T_UNKNOWN));
        assert!(!is_valid_tag(-100));
        assert!(is_valid_uniform_type(T_INT32));
        assert!(!is_valid_uniform_type(T_IDENTITY));
        assert!(!is_valid_uniform_type(V_INT_0));
    }

    #[test]
    fn names() {
        assert_eq!(type_name(T_OCTET_STRING), "octet-string");
        assert_eq!(type_name(V_INT_0), "int:tiny");
        assert_eq!(type_name(42), "user-type");
        assert_eq!(type_name(-99), "unknown");
    }
}
