//! Native objects as seen by the dynamic runtime.
//!
//! A [`BoxedValue`] couples a native object with an [`Ownership`] tag that
//! decides what happens when the runtime collects the value. The tag is fixed
//! when the box is created and never reinterpreted.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::type_key::TypeKey;

/// Shared storage for a native object.
pub type ObjectCell = Rc<RefCell<dyn Any>>;

/// Lifetime policy of a boxed native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// A fresh copy was made for the runtime; the runtime frees it
    Copied,
    /// Points at storage owned by the host; the runtime never frees it
    Referenced,
    /// Handed over by the host to be freed exactly once on collection
    CallerOwned,
    /// Allocated by a constructor dispatch; the runtime frees it
    RuntimeOwned,
}

impl Ownership {
    /// Whether releasing a box with this tag frees the native object.
    pub fn frees_on_release(self) -> bool {
        match self {
            Ownership::Copied | Ownership::CallerOwned | Ownership::RuntimeOwned => true,
            Ownership::Referenced => false,
        }
    }
}

enum Storage {
    Owned(ObjectCell),
    Borrowed(Weak<RefCell<dyn Any>>),
    Released,
}

/// A native object tagged with its ownership policy.
///
/// Dynamic values share a box through `Rc<BoxedValue>`; dropping the last
/// share is the runtime's collection callback and runs [`release`](Self::release).
pub struct BoxedValue {
    key: TypeKey,
    ownership: Ownership,
    read_only: bool,
    storage: RefCell<Storage>,
    released: Cell<bool>,
}

impl BoxedValue {
    fn owned<T: Any>(value: T, ownership: Ownership) -> Self {
        let cell: ObjectCell = Rc::new(RefCell::new(value));
        Self {
            key: TypeKey::of::<T>(),
            ownership,
            read_only: false,
            storage: RefCell::new(Storage::Owned(cell)),
            released: Cell::new(false),
        }
    }

    /// Box a copy of a native value; the runtime owns the copy.
    pub fn copied<T: Any>(value: T) -> Self {
        Self::owned(value, Ownership::Copied)
    }

    /// Box an object produced by a constructor dispatch.
    pub fn runtime_owned<T: Any>(value: T) -> Self {
        Self::owned(value, Ownership::RuntimeOwned)
    }

    /// Take over a host allocation that the runtime must free exactly once.
    pub fn caller_owned<T: Any>(value: Box<T>) -> Self {
        let cell: Rc<RefCell<T>> = Rc::new(RefCell::new(*value));
        let cell: ObjectCell = cell;
        Self {
            key: TypeKey::of::<T>(),
            ownership: Ownership::CallerOwned,
            read_only: false,
            storage: RefCell::new(Storage::Owned(cell)),
            released: Cell::new(false),
        }
    }

    /// Reference host-owned storage without taking ownership.
    ///
    /// The box only keeps a weak link: if the host drops the object first,
    /// [`object`](Self::object) returns `None` instead of dangling.
    pub fn referenced<T: Any>(target: &Rc<RefCell<T>>) -> Self {
        Self::borrowed(target, false)
    }

    /// Like [`referenced`](Self::referenced), but only const methods may use it.
    pub fn referenced_const<T: Any>(target: &Rc<RefCell<T>>) -> Self {
        Self::borrowed(target, true)
    }

    fn borrowed<T: Any>(target: &Rc<RefCell<T>>, read_only: bool) -> Self {
        let strong: ObjectCell = target.clone();
        Self {
            key: TypeKey::of::<T>(),
            ownership: Ownership::Referenced,
            read_only,
            storage: RefCell::new(Storage::Borrowed(Rc::downgrade(&strong))),
            released: Cell::new(false),
        }
    }

    /// Identity of the boxed object's concrete type.
    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// The ownership tag chosen at creation.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether only const methods may receive this object.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether [`release`](Self::release) has already run.
    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// The object cell, or `None` once released or when a referenced
    /// object no longer exists.
    pub fn object(&self) -> Option<ObjectCell> {
        match &*self.storage.borrow() {
            Storage::Owned(cell) => Some(cell.clone()),
            Storage::Borrowed(weak) => weak.upgrade(),
            Storage::Released => None,
        }
    }

    /// Whether this box points at the same object as `target`.
    pub fn points_to<T: Any>(&self, target: &Rc<RefCell<T>>) -> bool {
        self.object()
            .is_some_and(|cell| std::ptr::addr_eq(Rc::as_ptr(&cell), Rc::as_ptr(target)))
    }

    /// Collection callback.
    ///
    /// Frees the native object for `Copied`, `CallerOwned` and `RuntimeOwned`
    /// boxes; for `Referenced` boxes only the weak link is dropped. Returns
    /// `true` if this call gave up ownership of the object. Subsequent calls
    /// are no-ops.
    pub fn release(&self) -> bool {
        if self.released.replace(true) {
            return false;
        }
        let storage = std::mem::replace(&mut *self.storage.borrow_mut(), Storage::Released);
        let freed = match self.ownership {
            Ownership::Copied | Ownership::CallerOwned | Ownership::RuntimeOwned => {
                matches!(storage, Storage::Owned(_))
            }
            Ownership::Referenced => false,
        };
        tracing::trace!(
            type_name = self.key.rust_name(),
            ownership = ?self.ownership,
            freed,
            "released boxed value"
        );
        drop(storage);
        freed
    }
}

impl Drop for BoxedValue {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BoxedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedValue")
            .field("type", &self.key)
            .field("ownership", &self.ownership)
            .field("read_only", &self.read_only)
            .field("released", &self.released.get())
            .finish()
    }
}
