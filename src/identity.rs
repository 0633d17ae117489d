//! Object identity tracking for shared and cyclic graphs.
//!
//! The encoder keeps a [`ReferenceLibrary`] that assigns an id to each
//! user-type instance the first time it is written; later occurrences are
//! written as references to that id. The decoder keeps the mirror
//! [`IdentityRegistry`] from id to the value it constructed.

use std::collections::HashMap;

use tracing::debug;

use crate::error::PofError;
use crate::types::{PofObject, PofValue};

/// Encode-side map from object identity to assigned id.
#[derive(Debug, Default)]
pub struct ReferenceLibrary {
    // holds a clone so an address is never reused while tracked
    ids: HashMap<usize, (i32, PofObject)>,
    next_id: i32,
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id previously assigned to `obj`, if any.
    pub fn identity_of(&self, obj: &PofObject) -> Option<i32> {
        self.ids.get(&obj.addr()).map(|(id, _)| *id)
    }

    /// Assigns the next id to `obj`. Ids start at 1.
    pub fn assign(&mut self, obj: &PofObject) -> Result<i32, PofError> {
        let addr = obj.addr();
        if self.ids.contains_key(&addr) {
            return Err(PofError::Protocol(format!(
                "object already registered: {obj:?}"
            )));
        }
        self.next_id += 1;
        let id = self.next_id;
        self.ids.insert(addr, (id, obj.clone()));
        debug!(id, object = ?obj, "identity assigned");
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Decode-side map from id to constructed value.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    values: HashMap<i32, PofValue>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `id` to `value`. Rebinding the same value is a no-op; binding a
    /// different value is a corruption.
    pub fn bind(&mut self, id: i32, value: PofValue) -> Result<(), PofError> {
        match self.values.get(&id) {
            Some(existing) if same_value(existing, &value) => Ok(()),
            Some(_) => Err(PofError::DuplicateIdentity(id)),
            None => {
                debug!(id, kind = value.kind(), "identity bound");
                self.values.insert(id, value);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, id: i32) -> Result<PofValue, PofError> {
        let value = self
            .values
            .get(&id)
            .cloned()
            .ok_or(PofError::MissingIdentity(id))?;
        debug!(id, kind = value.kind(), "reference resolved");
        Ok(value)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.values.contains_key(&id)
    }
}

fn same_value(a: &PofValue, b: &PofValue) -> bool {
    match (a, b) {
        (PofValue::Object(x), PofValue::Object(y)) => x.ptr_eq(y),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_assigns_from_one() {
        let mut lib = ReferenceLibrary::new();
        let a = PofObject::new(1u32);
        let b = PofObject::new(2u32);
        assert_eq!(lib.identity_of(&a), None);
        assert_eq!(lib.assign(&a).unwrap(), 1);
        assert_eq!(lib.assign(&b).unwrap(), 2);
        assert_eq!(lib.identity_of(&a), Some(1));
        assert_eq!(lib.identity_of(&a.clone()), Some(1));
        assert_eq!(lib.len(), 2);
        assert!(matches!(lib.assign(&a), Err(PofError::Protocol(_))));
    }

    #[test]
    fn registry_binds_once() {
        let mut reg = IdentityRegistry::new();
        let obj = PofObject::new("x");
        reg.bind(1, PofValue::Object(obj.clone())).unwrap();
        reg.bind(1, PofValue::Object(obj.clone())).unwrap();
        assert!(matches!(
            reg.bind(1, PofValue::Object(PofObject::new("x"))),
            Err(PofError::DuplicateIdentity(1))
        ));
        assert_eq!(reg.lookup(1).unwrap(), PofValue::Object(obj));

        reg.bind(2, PofValue::Int32(5)).unwrap();
        reg.bind(2, PofValue::Int32(5)).unwrap();
        assert!(reg.bind(2, PofValue::Int32(6)).is_err());
    }

    #[test]
    fn missing_identity() {
        let reg = IdentityRegistry::new();
        assert!(!reg.contains(9));
        let err = reg.lookup(9).unwrap_err();
        assert!(matches!(err, PofError::MissingIdentity(9)));
        assert!(err.is_corruption());
    }
}
