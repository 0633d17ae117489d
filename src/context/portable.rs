//! Serializers for types that read and write their own properties.

use std::any::type_name;
use std::marker::PhantomData;

use bytes::Bytes;

use super::PofSerializer;
use crate::codec::{PofReader, PofWriter};
use crate::error::PofError;
use crate::types::PofObject;

/// A user type that reads and writes its own properties.
pub trait PortableObject {
    fn read_external(&mut self, reader: &mut PofReader<'_>) -> Result<(), PofError>;

    fn write_external(&self, writer: &mut PofWriter<'_>) -> Result<(), PofError>;
}

/// Version bookkeeping for a type whose schema may grow.
///
/// `future_data` holds the properties a newer version wrote that this
/// version does not know about; they are written back unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evolvable {
    data_version: i32,
    future_data: Option<Bytes>,
}

impl Evolvable {
    /// Version of the data this value was read from.
    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    pub fn set_data_version(&mut self, version: i32) {
        self.data_version = version;
    }

    pub fn future_data(&self) -> Option<&Bytes> {
        self.future_data.as_ref()
    }

    pub fn set_future_data(&mut self, data: Option<Bytes>) {
        self.future_data = data;
    }
}

/// A [`PortableObject`] that round-trips data from newer versions of itself.
pub trait EvolvablePortableObject: PortableObject {
    /// Version of the schema this type implements.
    fn implementation_version(&self) -> i32;

    fn evolvable(&self) -> &Evolvable;

    fn evolvable_mut(&mut self) -> &mut Evolvable;
}

fn mismatch<T>(value: &PofObject) -> PofError {
    PofError::Serializer(format!(
        "expected {}, found {}",
        type_name::<T>(),
        value.type_name()
    ))
}

/// Serializer for [`PortableObject`] types.
pub struct PortableObjectSerializer<T> {
    _type: PhantomData<fn() -> T>,
}

impl<T> PortableObjectSerializer<T> {
    pub fn new() -> Self {
        Self { _type: PhantomData }
    }
}

impl<T> Default for PortableObjectSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PortableObject + Default + 'static> PofSerializer for PortableObjectSerializer<T> {
    fn serialize(&self, writer: &mut PofWriter<'_>, value: &PofObject) -> Result<(), PofError> {
        let obj = value.borrow::<T>().ok_or_else(|| mismatch::<T>(value))?;
        obj.write_external(writer)?;
        writer.write_remainder(None)
    }

    fn deserialize(&self, reader: &mut PofReader<'_>) -> Result<PofObject, PofError> {
        let obj = PofObject::new(T::default());
        // bound before the fields so that references back to it resolve
        reader.register_identity(&obj)?;
        {
            let mut value = obj.borrow_mut::<T>().ok_or_else(|| mismatch::<T>(&obj))?;
            value.read_external(reader)?;
        }
        reader.read_remainder()?;
        Ok(obj)
    }
}

/// Serializer for [`EvolvablePortableObject`] types.
pub struct EvolvableObjectSerializer<T> {
    _type: PhantomData<fn() -> T>,
}

impl<T> EvolvableObjectSerializer<T> {
    pub fn new() -> Self {
        Self { _type: PhantomData }
    }
}

impl<T> Default for EvolvableObjectSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EvolvablePortableObject + Default + 'static> PofSerializer for EvolvableObjectSerializer<T> {
    fn serialize(&self, writer: &mut PofWriter<'_>, value: &PofObject) -> Result<(), PofError> {
        let obj = value.borrow::<T>().ok_or_else(|| mismatch::<T>(value))?;
        let evolvable = obj.evolvable();
        writer.set_version_id(obj.implementation_version().max(evolvable.data_version()))?;
        obj.write_external(writer)?;
        writer.write_remainder(evolvable.future_data().map(|b| &b[..]))
    }

    fn deserialize(&self, reader: &mut PofReader<'_>) -> Result<PofObject, PofError> {
        let obj = PofObject::new(T::default());
        reader.register_identity(&obj)?;
        {
            let mut value = obj.borrow_mut::<T>().ok_or_else(|| mismatch::<T>(&obj))?;
            value.evolvable_mut().set_data_version(reader.version_id());
            value.read_external(reader)?;
            let remainder = reader.read_remainder()?;
            value.evolvable_mut().set_future_data(remainder);
        }
        Ok(obj)
    }

    fn is_evolvable(&self) -> bool {
        true
    }
}
