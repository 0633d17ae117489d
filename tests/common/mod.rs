#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use pofr::{
    DayTimeInterval, Decimal, Evolvable, EvolvablePortableObject, PofError, PofReader, PofValue,
    PofWriter, PortableObject, SimplePofContext, TypeContext,
};

pub const NODE: i32 = 1001;
pub const SAMPLE: i32 = 1002;
pub const CONTACT: i32 = 1003;

/// A linked node; `next` may point anywhere, including back at itself.
#[derive(Debug)]
pub struct Node {
    pub label: String,
    pub next: PofValue,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            label: String::new(),
            next: PofValue::Null,
        }
    }
}

impl PortableObject for Node {
    fn read_external(&mut self, reader: &mut PofReader<'_>) -> Result<(), PofError> {
        self.label = reader.read_string(0)?.unwrap_or_default();
        self.next = reader.read_object(1)?;
        Ok(())
    }

    fn write_external(&self, writer: &mut PofWriter<'_>) -> Result<(), PofError> {
        writer.write_string(0, &self.label)?;
        writer.write_object(1, &self.next)
    }
}

/// One property of nearly every kind.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Sample {
    pub flag: bool,
    pub octet: u8,
    pub letter: char,
    pub short: i16,
    pub int: i32,
    pub long: i64,
    pub huge: i128,
    pub single: f32,
    pub double: f64,
    pub amount: Option<Decimal>,
    pub text: Option<String>,
    pub blob: Option<Bytes>,
    pub day: Option<NaiveDate>,
    pub clock: Option<NaiveTime>,
    pub stamp: Option<DateTime<FixedOffset>>,
    pub span: Option<DayTimeInterval>,
    pub scores: Option<Vec<i32>>,
    pub ratios: Option<Vec<f64>>,
    pub labels: Option<Vec<PofValue>>,
    pub lookup: Option<Vec<(PofValue, PofValue)>>,
}

impl PortableObject for Sample {
    fn read_external(&mut self, reader: &mut PofReader<'_>) -> Result<(), PofError> {
        self.flag = reader.read_bool(0)?;
        self.octet = reader.read_octet(1)?;
        self.letter = reader.read_char(2)?;
        self.short = reader.read_i16(3)?;
        self.int = reader.read_i32(4)?;
        self.long = reader.read_i64(5)?;
        self.huge = reader.read_i128(6)?;
        self.single = reader.read_f32(7)?;
        self.double = reader.read_f64(8)?;
        self.amount = reader.read_decimal(9)?;
        self.text = reader.read_string(10)?;
        self.blob = reader.read_binary(11)?;
        self.day = reader.read_local_date(12)?;
        self.clock = reader.read_local_time(13)?;
        self.stamp = reader.read_offset_date_time(14)?;
        self.span = reader.read_day_time_interval(15)?;
        self.scores = reader.read_i32_array(16)?;
        self.ratios = reader.read_f64_array(17)?;
        self.labels = reader.read_collection(18)?;
        self.lookup = reader.read_map(19)?;
        Ok(())
    }

    fn write_external(&self, writer: &mut PofWriter<'_>) -> Result<(), PofError> {
        writer.write_bool(0, self.flag)?;
        writer.write_octet(1, self.octet)?;
        writer.write_char(2, self.letter)?;
        writer.write_i16(3, self.short)?;
        writer.write_i32(4, self.int)?;
        writer.write_i64(5, self.long)?;
        writer.write_i128(6, self.huge)?;
        writer.write_f32(7, self.single)?;
        writer.write_f64(8, self.double)?;
        if let Some(d) = self.amount {
            writer.write_decimal(9, d)?;
        }
        if let Some(s) = &self.text {
            writer.write_string(10, s)?;
        }
        if let Some(b) = &self.blob {
            writer.write_binary(11, b)?;
        }
        if let Some(d) = self.day {
            writer.write_local_date(12, d)?;
        }
        if let Some(t) = self.clock {
            writer.write_local_time(13, t)?;
        }
        if let Some(dt) = self.stamp {
            writer.write_offset_date_time(14, dt)?;
        }
        if let Some(i) = self.span {
            writer.write_day_time_interval(15, i)?;
        }
        if let Some(v) = &self.scores {
            writer.write_i32_array(16, v)?;
        }
        if let Some(v) = &self.ratios {
            writer.write_f64_array(17, v)?;
        }
        if let Some(v) = &self.labels {
            writer.write_uniform_collection(18, v)?;
        }
        if let Some(m) = &self.lookup {
            writer.write_uniform_map(19, m)?;
        }
        Ok(())
    }
}

/// First published version of a contact.
#[derive(Debug, Default)]
pub struct ContactV1 {
    pub name: String,
    pub email: Option<String>,
    pub evolvable: Evolvable,
}

impl PortableObject for ContactV1 {
    fn read_external(&mut self, reader: &mut PofReader<'_>) -> Result<(), PofError> {
        self.name = reader.read_string(0)?.unwrap_or_default();
        self.email = reader.read_string(1)?;
        Ok(())
    }

    fn write_external(&self, writer: &mut PofWriter<'_>) -> Result<(), PofError> {
        writer.write_string(0, &self.name)?;
        if let Some(email) = &self.email {
            writer.write_string(1, email)?;
        }
        Ok(())
    }
}

impl EvolvablePortableObject for ContactV1 {
    fn implementation_version(&self) -> i32 {
        1
    }

    fn evolvable(&self) -> &Evolvable {
        &self.evolvable
    }

    fn evolvable_mut(&mut self) -> &mut Evolvable {
        &mut self.evolvable
    }
}

/// The same contact with two more properties.
#[derive(Debug, Default)]
pub struct ContactV2 {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub rank: i32,
    pub evolvable: Evolvable,
}

impl PortableObject for ContactV2 {
    fn read_external(&mut self, reader: &mut PofReader<'_>) -> Result<(), PofError> {
        self.name = reader.read_string(0)?.unwrap_or_default();
        self.email = reader.read_string(1)?;
        self.phone = reader.read_string(2)?;
        self.rank = reader.read_i32(3)?;
        Ok(())
    }

    fn write_external(&self, writer: &mut PofWriter<'_>) -> Result<(), PofError> {
        writer.write_string(0, &self.name)?;
        if let Some(email) = &self.email {
            writer.write_string(1, email)?;
        }
        if let Some(phone) = &self.phone {
            writer.write_string(2, phone)?;
        }
        writer.write_i32(3, self.rank)
    }
}

impl EvolvablePortableObject for ContactV2 {
    fn implementation_version(&self) -> i32 {
        2
    }

    fn evolvable(&self) -> &Evolvable {
        &self.evolvable
    }

    fn evolvable_mut(&mut self) -> &mut Evolvable {
        &mut self.evolvable
    }
}

/// Context knowing the current version of every test type.
pub fn ctx() -> Arc<dyn TypeContext> {
    Arc::new(
        SimplePofContext::builder()
            .register_portable::<Node>(NODE)
            .register_portable::<Sample>(SAMPLE)
            .register_evolvable::<ContactV2>(CONTACT)
            .build()
            .unwrap(),
    )
}

/// Context of an older deployment that only knows `ContactV1`.
pub fn legacy_ctx() -> Arc<dyn TypeContext> {
    Arc::new(
        SimplePofContext::builder()
            .register_portable::<Node>(NODE)
            .register_evolvable::<ContactV1>(CONTACT)
            .build()
            .unwrap(),
    )
}

pub fn empty_ctx() -> Arc<dyn TypeContext> {
    Arc::new(SimplePofContext::builder().build().unwrap())
}
