use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Shared single-threaded cell (`Rc<RefCell<T>>`) used for the state owned
/// by the master reactor. Equality and hashing are by pointer identity.
#[derive(Default, Debug)]
pub struct WrappedRcRefCell<T: ?Sized> {
    inner: Rc<RefCell<T>>,
}

impl<T> WrappedRcRefCell<T> {
    #[inline]
    pub fn wrap(value: T) -> Self {
        WrappedRcRefCell {
            inner: Rc::new(RefCell::new(value)),
        }
    }
}

impl<T: ?Sized> WrappedRcRefCell<T> {
    /// Borrows the contents. Panics whenever `RefCell::borrow` would.
    #[inline]
    #[track_caller]
    pub fn get(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// Mutably borrows the contents. Panics whenever `RefCell::borrow_mut` would.
    #[inline]
    #[track_caller]
    pub fn get_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }
}

impl<T: ?Sized> Clone for WrappedRcRefCell<T> {
    #[inline]
    fn clone(&self) -> Self {
        WrappedRcRefCell {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> PartialEq for WrappedRcRefCell<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: ?Sized> Eq for WrappedRcRefCell<T> {}
