//! POF value types.

mod numeric;
mod object;
mod temporal;
mod value;

pub use numeric::{
    DECIMAL32_SCALE, DECIMAL64_SCALE, DECIMAL128_SCALE, Decimal, MAX_DECIMAL32_UNSCALED,
    MAX_DECIMAL64_UNSCALED, MAX_DECIMAL128_UNSCALED, RawQuad,
};
pub use object::PofObject;
pub use temporal::{
    DayTimeInterval, RawDate, RawDateTime, RawTime, TimeInterval, TimeZone, YearMonthInterval,
};
pub use value::{PofValue, SparseArray};
