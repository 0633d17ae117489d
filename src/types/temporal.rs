//! POF date, time and interval values.
//!
//! The raw structs mirror the wire layout field for field. Conversions to
//! and from `chrono` are provided for the cases `chrono` can represent.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::PofError;

const MAX_DAYS_PER_MONTH: [i32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn invalid(msg: String) -> PofError {
    PofError::InvalidValue(msg)
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub(crate) fn check_date(year: i32, month: i32, day: i32) -> Result<(), PofError> {
    if !(1..=12).contains(&month) {
        return Err(invalid(format!("month is out of range: {month}")));
    }
    if day < 1 || day > MAX_DAYS_PER_MONTH[(month - 1) as usize] {
        return Err(invalid(format!("day is out of range: {day}")));
    }
    if month == 2 && day == 29 && !is_leap_year(year) {
        return Err(invalid(format!("not a leap year: {year}")));
    }
    Ok(())
}

pub(crate) fn check_time(hour: i32, minute: i32, second: i32, nano: i32) -> Result<(), PofError> {
    if !(0..=23).contains(&hour) {
        if hour == 24 && minute == 0 && second == 0 && nano == 0 {
            return Err(invalid(
                "end-of-day midnight (24:00:00.0) is not supported, use 00:00:00.0 instead".into(),
            ));
        }
        return Err(invalid(format!("hour is out of range: {hour}")));
    }
    if !(0..=59).contains(&minute) {
        return Err(invalid(format!("minute is out of range: {minute}")));
    }
    // 60 only as a leap second
    if !(0..=60).contains(&second) || (second == 60 && nano > 0) {
        return Err(invalid(format!("second is out of range: {second}")));
    }
    if !(0..=999_999_999).contains(&nano) {
        return Err(invalid(format!("nanosecond is out of range: {nano}")));
    }
    Ok(())
}

/// Intervals may be negative; only the leading non-zero field carries the sign.
fn check_time_interval(hours: i32, minutes: i32, seconds: i32, nanos: i32) -> Result<(), PofError> {
    let (mut h, mut m, mut s, mut n) = (hours, minutes, seconds, nanos);
    if h != 0 {
        h = h.saturating_abs();
    } else if m != 0 {
        m = m.saturating_abs();
    } else if s != 0 {
        s = s.saturating_abs();
    } else {
        n = n.saturating_abs();
    }
    check_time(h, m, s, n)
}

/// A calendar date with no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawDate {
    pub year: i32,
    pub month: i32,
    pub day: i32,
}

impl RawDate {
    pub fn new(year: i32, month: i32, day: i32) -> Self {
        Self { year, month, day }
    }

    pub fn validate(&self) -> Result<(), PofError> {
        check_date(self.year, self.month, self.day)
    }

    pub fn to_naive(&self) -> Result<NaiveDate, PofError> {
        u32::try_from(self.month)
            .ok()
            .zip(u32::try_from(self.day).ok())
            .and_then(|(m, d)| NaiveDate::from_ymd_opt(self.year, m, d))
            .ok_or_else(|| invalid(format!("date {self} is outside the chrono range")))
    }
}

impl From<NaiveDate> for RawDate {
    fn from(d: NaiveDate) -> Self {
        Self::new(d.year(), d.month() as i32, d.day() as i32)
    }
}

impl fmt::Display for RawDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Zone information carried by a time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeZone {
    /// Local time; no zone was recorded.
    #[default]
    None,
    Utc,
    /// `hours` carries the sign; `minutes` is always 0..=59.
    Offset { hours: i32, minutes: i32 },
}

impl TimeZone {
    /// Splits a UTC offset in seconds into the wire representation.
    pub fn from_offset_seconds(seconds: i32) -> Self {
        let total_minutes = seconds / 60;
        Self::Offset {
            hours: total_minutes / 60,
            minutes: total_minutes.abs() % 60,
        }
    }

    /// Offset east of UTC in seconds, or `None` for a local time.
    pub fn offset_seconds(&self) -> Option<i32> {
        match *self {
            Self::None => None,
            Self::Utc => Some(0),
            Self::Offset { hours, minutes } => {
                let magnitude = hours
                    .checked_abs()?
                    .checked_mul(3600)?
                    .checked_add(minutes.checked_mul(60)?)?;
                Some(if hours < 0 { -magnitude } else { magnitude })
            }
        }
    }

    pub fn to_fixed_offset(&self) -> Result<FixedOffset, PofError> {
        self.offset_seconds()
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| invalid(format!("time zone {self:?} has no fixed offset")))
    }

    pub fn validate(&self) -> Result<(), PofError> {
        if let Self::Offset { hours, minutes } = *self {
            if !(-23..=23).contains(&hours) {
                return Err(invalid(format!("invalid hour offset: {hours}")));
            }
            if !(0..=59).contains(&minutes) {
                return Err(invalid(format!("invalid minute offset: {minutes}")));
            }
        }
        Ok(())
    }
}

/// A time of day with optional zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTime {
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    pub nano: i32,
    pub zone: TimeZone,
}

impl RawTime {
    pub fn new(hour: i32, minute: i32, second: i32, nano: i32, zone: TimeZone) -> Self {
        Self {
            hour,
            minute,
            second,
            nano,
            zone,
        }
    }

    pub fn local(hour: i32, minute: i32, second: i32, nano: i32) -> Self {
        Self::new(hour, minute, second, nano, TimeZone::None)
    }

    pub fn validate(&self) -> Result<(), PofError> {
        check_time(self.hour, self.minute, self.second, self.nano)?;
        self.zone.validate()
    }

    /// The wall-clock part; a leap second maps onto chrono's 59.x representation.
    pub fn to_naive(&self) -> Result<NaiveTime, PofError> {
        let (second, nano) = if self.second == 60 {
            (59, self.nano + 1_000_000_000)
        } else {
            (self.second, self.nano)
        };
        NaiveTime::from_hms_nano_opt(
            self.hour as u32,
            self.minute as u32,
            second as u32,
            nano as u32,
        )
        .filter(|_| self.hour >= 0 && self.minute >= 0 && self.second >= 0 && self.nano >= 0)
        .ok_or_else(|| invalid(format!("time {self} is not representable")))
    }

    pub fn from_naive(t: NaiveTime, zone: TimeZone) -> Self {
        let (second, nano) = if t.nanosecond() >= 1_000_000_000 {
            (60, t.nanosecond() - 1_000_000_000)
        } else {
            (t.second(), t.nanosecond())
        };
        Self::new(
            t.hour() as i32,
            t.minute() as i32,
            second as i32,
            nano as i32,
            zone,
        )
    }
}

impl From<NaiveTime> for RawTime {
    fn from(t: NaiveTime) -> Self {
        Self::from_naive(t, TimeZone::None)
    }
}

impl fmt::Display for RawTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        if self.nano != 0 {
            write!(f, ".{:09}", self.nano)?;
        }
        match self.zone {
            TimeZone::None => Ok(()),
            TimeZone::Utc => f.write_str("Z"),
            TimeZone::Offset { hours, minutes } => {
                let sign = if hours < 0 { '-' } else { '+' };
                write!(f, "{sign}{:02}:{minutes:02}", hours.abs())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawDateTime {
    pub date: RawDate,
    pub time: RawTime,
}

impl RawDateTime {
    pub fn new(date: RawDate, time: RawTime) -> Self {
        Self { date, time }
    }

    pub fn validate(&self) -> Result<(), PofError> {
        self.date.validate()?;
        self.time.validate()
    }

    pub fn to_naive(&self) -> Result<NaiveDateTime, PofError> {
        Ok(NaiveDateTime::new(self.date.to_naive()?, self.time.to_naive()?))
    }

    /// Interprets the wall clock in the recorded zone.
    pub fn to_offset(&self) -> Result<DateTime<FixedOffset>, PofError> {
        let offset = self.time.zone.to_fixed_offset()?;
        self.to_naive()?
            .and_local_timezone(offset)
            .single()
            .ok_or_else(|| invalid(format!("datetime {self} is not representable")))
    }
}

impl From<NaiveDateTime> for RawDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        Self::new(dt.date().into(), dt.time().into())
    }
}

impl From<DateTime<FixedOffset>> for RawDateTime {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        let zone = TimeZone::from_offset_seconds(dt.offset().local_minus_utc());
        let local = dt.naive_local();
        Self::new(local.date().into(), RawTime::from_naive(local.time(), zone))
    }
}

impl fmt::Display for RawDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct YearMonthInterval {
    pub years: i32,
    pub months: i32,
}

impl YearMonthInterval {
    pub fn new(years: i32, months: i32) -> Self {
        Self { years, months }
    }

    pub fn validate(&self) -> Result<(), PofError> {
        if self.years == 0 && !(-11..=11).contains(&self.months) {
            return Err(invalid(format!(
                "month interval is out of range: {}",
                self.months
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeInterval {
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub nanos: i32,
}

impl TimeInterval {
    pub fn new(hours: i32, minutes: i32, seconds: i32, nanos: i32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            nanos,
        }
    }

    pub fn validate(&self) -> Result<(), PofError> {
        check_time_interval(self.hours, self.minutes, self.seconds, self.nanos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DayTimeInterval {
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub nanos: i32,
}

impl DayTimeInterval {
    pub fn new(days: i32, hours: i32, minutes: i32, seconds: i32, nanos: i32) -> Self {
        Self {
            days,
            hours,
            minutes,
            seconds,
            nanos,
        }
    }

    pub fn validate(&self) -> Result<(), PofError> {
        if self.days == 0 {
            check_time_interval(self.hours, self.minutes, self.seconds, self.nanos)
        } else {
            check_time(self.hours, self.minutes, self.seconds, self.nanos)
        }
    }
}
