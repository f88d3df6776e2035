//! Dynamic stack values.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::boxed::BoxedValue;
use crate::type_key::TypeKey;

/// A slot on the runtime's dynamic stack.
///
/// Native objects are shared through a reference-counted [`BoxedValue`];
/// cloning a `Value::Object` shares the box, it never copies the object.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean value
    Bool(bool),
    /// Integer value (all native integer widths are stored as i64)
    Int(i64),
    /// Floating point value (f32 and f64 are stored as f64)
    Float(f64),
    /// String value (owned)
    String(String),
    /// Class descriptor, used as the leading slot of constructor calls
    Class(TypeKey),
    /// Boxed native object
    Object(Rc<BoxedValue>),
}

impl Value {
    /// Box a copy of `value`.
    pub fn copy<T: Any>(value: T) -> Self {
        Value::Object(Rc::new(BoxedValue::copied(value)))
    }

    /// Reference host storage; the runtime never frees it.
    pub fn reference<T: Any>(target: &Rc<RefCell<T>>) -> Self {
        Value::Object(Rc::new(BoxedValue::referenced(target)))
    }

    /// Reference host storage that only const methods may use.
    pub fn const_reference<T: Any>(target: &Rc<RefCell<T>>) -> Self {
        Value::Object(Rc::new(BoxedValue::referenced_const(target)))
    }

    /// Hand a host allocation to the runtime to free on collection.
    pub fn auto_delete<T: Any>(value: Box<T>) -> Self {
        Value::Object(Rc::new(BoxedValue::caller_owned(value)))
    }

    /// Class descriptor slot for `T`.
    pub fn class_of<T: Any>() -> Self {
        Value::Class(TypeKey::of::<T>())
    }

    /// Get a human-readable name for this value's dynamic type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Class(_) => "class",
            Value::Object(_) => "object",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The boxed object, if this is an object value.
    pub fn as_object(&self) -> Option<&Rc<BoxedValue>> {
        match self {
            Value::Object(boxed) => Some(boxed),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Runtime equality: numbers compare numerically across int/float, objects
/// compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Int(v) => write!(f, "Int({})", v),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Class(key) => write!(f, "Class({})", key),
            Value::Object(boxed) => write!(
                f,
                "Object({}, {:?})",
                boxed.type_key(),
                boxed.ownership()
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
