//! Shared handle to a user-type instance.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

struct Slot<T: ?Sized> {
    type_id: TypeId,
    type_name: &'static str,
    value: RefCell<T>,
}

/// A reference-counted, interior-mutable user-type instance.
///
/// Equality is identity: two handles are equal when they point at the same
/// allocation. This is what reference tracking keys on, and it lets a
/// deserializer hand out the handle before its fields are filled in, which
/// is how cyclic graphs are rebuilt.
///
/// Cycles built from `PofObject` handles are not collected; break them by
/// clearing a field when the graph is no longer needed.
#[derive(Clone)]
pub struct PofObject(Rc<Slot<dyn Any>>);

impl PofObject {
    pub fn new<T: Any>(value: T) -> Self {
        let slot: Rc<Slot<dyn Any>> = Rc::new(Slot {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: RefCell::new(value),
        });
        Self(slot)
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }

    /// Borrows the value as `T`; `None` if the handle holds another type.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed.
    pub fn borrow<T: Any>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.0.value.borrow(), |v| v.downcast_ref::<T>()).ok()
    }

    /// Mutably borrows the value as `T`; `None` if the handle holds another type.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently borrowed.
    pub fn borrow_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.0.value.borrow_mut(), |v| v.downcast_mut::<T>()).ok()
    }

    /// `TypeId` of the value the handle was created with.
    pub fn concrete_type_id(&self) -> TypeId {
        self.0.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    /// Address of the shared allocation; stable for the handle's lifetime.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &PofObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for PofObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for PofObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PofObject({}@{:#x})", self.type_name(), self.addr())
    }
}
