//! Core traits for converting between dynamic values and native types.
//!
//! - [`FromSlot`]: read a native argument from a stack slot
//! - [`IntoSlot`]: turn a native value into a stack slot
//! - [`ReturnValue`]: how many results a native return pushes
//! - [`NativeType`]: marker for types that can be registered with [`Class`](super::Class)
//! - [`Inherits`]: the native "is-a" relation used for inheritance edges
//!
//! Object types convert through [`Object<T>`], a typed handle that upcasts along
//! the registry's inheritance edges.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use stackbind_core::{BoxedValue, ConversionError, ObjectCell, Ownership, TypeKey, Value};

use super::ffi_registry::{TypeRegistry, Upcast};

/// Marker trait for native types that can be exposed to the runtime.
///
/// # Example
///
/// ```ignore
/// struct Point { x: i32, y: i32 }
///
/// impl NativeType for Point {
///     const NAME: &'static str = "Point";
/// }
/// ```
pub trait NativeType: 'static {
    /// Fallback name used in diagnostics before the type is declared.
    const NAME: &'static str;
}

/// Native "is-a" relation between a derived type and one of its bases.
///
/// Every type trivially inherits from itself. Declaring a base with
/// `Class::inherits::<Base>()` requires an implementation of this trait.
///
/// # Example
///
/// ```ignore
/// struct Derived { base: Base }
///
/// impl Inherits<Base> for Derived {
///     fn upcast(&self) -> &Base { &self.base }
///     fn upcast_mut(&mut self) -> &mut Base { &mut self.base }
/// }
/// ```
pub trait Inherits<B: ?Sized> {
    fn upcast(&self) -> &B;
    fn upcast_mut(&mut self) -> &mut B;
}

impl<T: ?Sized> Inherits<T> for T {
    fn upcast(&self) -> &T {
        self
    }

    fn upcast_mut(&mut self) -> &mut T {
        self
    }
}

/// Read a native value from a stack slot.
///
/// The registry is available so object conversions can follow inheritance
/// edges.
pub trait FromSlot: Sized {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError>;
}

/// Turn a native value into a stack slot.
pub trait IntoSlot {
    fn into_slot(self) -> Value;
}

/// A native return value: `()` pushes nothing, everything else pushes one slot.
pub trait ReturnValue {
    /// Rust name of the returned type, `None` for `()`.
    fn type_name() -> Option<&'static str>;

    /// The slot to push, if any.
    fn into_result(self) -> Option<Value>;
}

impl ReturnValue for () {
    fn type_name() -> Option<&'static str> {
        None
    }

    fn into_result(self) -> Option<Value> {
        None
    }
}

impl<T: IntoSlot> ReturnValue for T {
    fn type_name() -> Option<&'static str> {
        Some(std::any::type_name::<T>())
    }

    fn into_result(self) -> Option<Value> {
        Some(self.into_slot())
    }
}

fn mismatch(expected: &str, slot: &Value, types: &TypeRegistry) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        actual: types.describe(slot),
    }
}

// =============================================================================
// Primitive conversions
// =============================================================================

macro_rules! impl_slot_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromSlot for $ty {
                fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
                    match slot {
                        Value::Int(v) => <$ty>::try_from(*v).map_err(|_| {
                            ConversionError::IntegerOverflow {
                                value: *v,
                                target_type: $name,
                            }
                        }),
                        _ => Err(mismatch($name, slot, types)),
                    }
                }
            }

            impl IntoSlot for $ty {
                fn into_slot(self) -> Value {
                    Value::Int(self as i64)
                }
            }
        )*
    };
}

impl_slot_int!(
    i8 => "int8",
    i16 => "int16",
    i32 => "int",
    i64 => "int64",
    u8 => "uint8",
    u16 => "uint16",
    u32 => "uint",
);

// u64 round-trips through the i64 bit pattern
impl FromSlot for u64 {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        match slot {
            Value::Int(v) => Ok(*v as u64),
            _ => Err(mismatch("uint64", slot, types)),
        }
    }
}

impl IntoSlot for u64 {
    fn into_slot(self) -> Value {
        Value::Int(self as i64)
    }
}

impl FromSlot for f32 {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        match slot {
            Value::Float(v) if v.is_finite() && v.abs() > f32::MAX as f64 => {
                Err(ConversionError::FloatConversion {
                    value: *v,
                    target_type: "float",
                })
            }
            Value::Float(v) => Ok(*v as f32),
            Value::Int(v) => Ok(*v as f32),
            _ => Err(mismatch("float", slot, types)),
        }
    }
}

impl IntoSlot for f32 {
    fn into_slot(self) -> Value {
        Value::Float(self as f64)
    }
}

impl FromSlot for f64 {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        match slot {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            _ => Err(mismatch("double", slot, types)),
        }
    }
}

impl IntoSlot for f64 {
    fn into_slot(self) -> Value {
        Value::Float(self)
    }
}

impl FromSlot for bool {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        match slot {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch("bool", slot, types)),
        }
    }
}

impl IntoSlot for bool {
    fn into_slot(self) -> Value {
        Value::Bool(self)
    }
}

impl FromSlot for String {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        match slot {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("string", slot, types)),
        }
    }
}

impl IntoSlot for String {
    fn into_slot(self) -> Value {
        Value::String(self)
    }
}

// Note: &str cannot implement FromSlot because it would borrow from the
// stack slot. Bind a String parameter instead.
impl IntoSlot for &str {
    fn into_slot(self) -> Value {
        Value::String(self.to_string())
    }
}

impl FromSlot for Value {
    fn from_slot(slot: &Value, _types: &TypeRegistry) -> Result<Self, ConversionError> {
        Ok(slot.clone())
    }
}

impl IntoSlot for Value {
    fn into_slot(self) -> Value {
        self
    }
}

/// `nil` maps to `None`.
impl<T: FromSlot> FromSlot for Option<T> {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        match slot {
            Value::Nil => Ok(None),
            _ => T::from_slot(slot, types).map(Some),
        }
    }
}

impl<T: IntoSlot> IntoSlot for Option<T> {
    fn into_slot(self) -> Value {
        match self {
            Some(value) => value.into_slot(),
            None => Value::Nil,
        }
    }
}

// =============================================================================
// Object conversions
// =============================================================================

/// Object parameters taken by value receive a copy of the (upcast) object.
impl<T: NativeType + Clone> FromSlot for T {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        let object = Object::<T>::from_value(slot, types)?;
        let copy = object.borrow()?.clone();
        Ok(copy)
    }
}

/// Returning a native object by value boxes it with `Copied` ownership.
impl<T: NativeType> IntoSlot for T {
    fn into_slot(self) -> Value {
        Value::copy(self)
    }
}

/// Returning shared host storage boxes it with `Referenced` ownership.
impl<T: NativeType> IntoSlot for Rc<RefCell<T>> {
    fn into_slot(self) -> Value {
        Value::reference(&self)
    }
}

impl<T: NativeType> FromSlot for Object<T> {
    fn from_slot(slot: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        Object::from_value(slot, types)
    }
}

/// Returning a handle re-pushes the original box, ownership unchanged.
impl<T: NativeType> IntoSlot for Object<T> {
    fn into_slot(self) -> Value {
        Value::Object(self.boxed)
    }
}

/// Typed handle to a boxed native object.
///
/// Created by unboxing a [`Value`]: the object's concrete type must be `T` or
/// reach `T` through the registry's inheritance edges. Borrowing walks those
/// edges, so a `Derived` object can be used wherever `Object<Base>` is expected.
pub struct Object<T> {
    boxed: Rc<BoxedValue>,
    cell: ObjectCell,
    path: Rc<[Upcast]>,
    name: Rc<str>,
    concrete: Rc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NativeType> Object<T> {
    /// Unbox `value` as a `T`.
    pub fn from_value(value: &Value, types: &TypeRegistry) -> Result<Self, ConversionError> {
        let target = TypeKey::of::<T>();
        let Value::Object(boxed) = value else {
            return Err(ConversionError::TypeMismatch {
                expected: types.display_name(target),
                actual: types.describe(value),
            });
        };
        let path = types.upcast_path(boxed.type_key(), target).ok_or_else(|| {
            ConversionError::TypeMismatch {
                expected: types.display_name(target),
                actual: types.display_name(boxed.type_key()),
            }
        })?;
        let cell = match boxed.object() {
            Some(cell) => cell,
            None if boxed.is_released() => {
                return Err(ConversionError::Released {
                    type_name: types.display_name(boxed.type_key()),
                });
            }
            None => {
                return Err(ConversionError::Dangling {
                    type_name: types.display_name(boxed.type_key()),
                });
            }
        };
        Ok(Self {
            boxed: boxed.clone(),
            cell,
            path: path.into(),
            name: types.display_name(target).into(),
            concrete: types.display_name(boxed.type_key()).into(),
            _marker: PhantomData,
        })
    }

    /// Borrow the object as `T`.
    pub fn borrow(&self) -> Result<Ref<'_, T>, ConversionError> {
        let guard = self
            .cell
            .try_borrow()
            .map_err(|_| self.already_borrowed())?;
        Ref::filter_map(guard, |object| {
            upcast_ref(object, &self.path).and_then(|base| base.downcast_ref::<T>())
        })
        .map_err(|_| self.mismatch())
    }

    /// Mutably borrow the object as `T`.
    ///
    /// Read-only references (see [`Value::const_reference`]) cannot be
    /// borrowed mutably.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, T>, ConversionError> {
        if self.boxed.is_read_only() {
            return Err(ConversionError::TypeMismatch {
                expected: format!("mutable {}", self.name),
                actual: format!("const {}", self.name),
            });
        }
        let guard = self
            .cell
            .try_borrow_mut()
            .map_err(|_| self.already_borrowed())?;
        RefMut::filter_map(guard, |object| {
            upcast_mut(object, &self.path).and_then(|base| base.downcast_mut::<T>())
        })
        .map_err(|_| self.mismatch())
    }

    /// Whether only const methods may use this object.
    pub fn is_read_only(&self) -> bool {
        self.boxed.is_read_only()
    }

    pub fn ownership(&self) -> Ownership {
        self.boxed.ownership()
    }

    /// Concrete type of the boxed object, which may be a subtype of `T`.
    pub fn type_key(&self) -> TypeKey {
        self.boxed.type_key()
    }

    /// The dynamic value this handle was unboxed from.
    pub fn value(&self) -> Value {
        Value::Object(self.boxed.clone())
    }

    fn already_borrowed(&self) -> ConversionError {
        ConversionError::AlreadyBorrowed {
            type_name: self.name.to_string(),
        }
    }

    fn mismatch(&self) -> ConversionError {
        ConversionError::TypeMismatch {
            expected: self.name.to_string(),
            actual: self.concrete.to_string(),
        }
    }
}

impl<T> Clone for Object<T> {
    fn clone(&self) -> Self {
        Self {
            boxed: self.boxed.clone(),
            cell: self.cell.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
            concrete: self.concrete.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.boxed.type_key())
            .field("ownership", &self.boxed.ownership())
            .field("upcasts", &self.path.len())
            .finish()
    }
}

fn upcast_ref<'a>(
    object: &'a (dyn Any + 'static),
    path: &[Upcast],
) -> Option<&'a (dyn Any + 'static)> {
    path.iter().try_fold(object, |current, step| step.apply(current))
}

fn upcast_mut<'a>(
    object: &'a mut (dyn Any + 'static),
    path: &[Upcast],
) -> Option<&'a mut (dyn Any + 'static)> {
    let mut current = object;
    for step in path {
        current = step.apply_mut(current)?;
    }
    Some(current)
}
