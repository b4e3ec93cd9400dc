//! Single-assignment completion handle.
//!
//! Cloning a [`Completion`] yields another handle to the same slot. The
//! first `complete` wins; later calls are ignored and return `false`.
//! Single-threaded by construction (`Rc`), matching the cooperative
//! scheduling model of the host.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub struct Completion<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self { slot: Rc::clone(&self.slot) }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self { slot: Rc::new(RefCell::new(None)) }
    }

    /// Whether a value has been assigned.
    pub fn test(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Assign `value` unless already resolved. Returns whether this call won.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.slot.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// Whether both handles refer to the same slot.
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: Clone> Completion<T> {
    /// The assigned value, if resolved.
    pub fn result(&self) -> Option<T> {
        self.slot.borrow().clone()
    }
}
