//! The `TypeContext` and `PofSerializer` traits: the registry of user types
//! that the encoder and decoder consult.

mod portable;
mod simple;

pub use portable::{
    Evolvable, EvolvableObjectSerializer, EvolvablePortableObject, PortableObject,
    PortableObjectSerializer,
};
pub use simple::{SimplePofContext, SimplePofContextBuilder};

use std::sync::Arc;

use crate::codec::{PofReader, PofWriter};
use crate::error::PofError;
use crate::types::PofObject;

/// Encodes and decodes one user type as a property stream.
///
/// `serialize` writes the properties of `value` in ascending index order;
/// `deserialize` reads them back in the same order. Both see a reader or
/// writer scoped to the user type, so property indices start fresh.
pub trait PofSerializer: Send + Sync + 'static {
    fn serialize(&self, writer: &mut PofWriter<'_>, value: &PofObject) -> Result<(), PofError>;

    fn deserialize(&self, reader: &mut PofReader<'_>) -> Result<PofObject, PofError>;

    /// Evolvable types carry data written by newer versions and are never
    /// reference-tracked, nor is anything nested inside them.
    fn is_evolvable(&self) -> bool {
        false
    }
}

/// Maps between user-type ids and the Rust types that implement them.
pub trait TypeContext: Send + Sync {
    /// The serializer registered for `type_id`.
    fn serializer_for(&self, type_id: i32) -> Result<Arc<dyn PofSerializer>, PofError>;

    /// The user-type id of `value`.
    fn type_id_for(&self, value: &PofObject) -> Result<i32, PofError>;

    fn is_user_type(&self, value: &PofObject) -> bool {
        self.type_id_for(value).is_ok()
    }

    /// Whether decoded dates and times become chrono values (`true`) or the
    /// raw POF temporal structs (`false`).
    fn prefer_chrono(&self) -> bool {
        true
    }
}
