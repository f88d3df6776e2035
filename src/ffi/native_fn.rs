//! Native function storage and execution context.
//!
//! This module provides the infrastructure for storing native Rust functions
//! and calling them with arguments taken from the runtime's value stack.

use std::fmt;
use std::rc::Rc;

use stackbind_core::{NativeError, Stack, TypeKey, Value};

use super::ffi_registry::TypeRegistry;
use super::traits::{FromSlot, NativeType, Object, ReturnValue};

/// How a native function uses the leading stack slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// Free function: arguments start at slot 1
    Function,
    /// Method taking `&mut C`: slot 1 is the receiver
    Method,
    /// Method taking `&C`: slot 1 is the receiver
    ConstMethod,
    /// Constructor: slot 1 is the class descriptor
    Constructor,
    /// Reads the stack itself
    Raw,
}

impl CallShape {
    /// Number of slots before the first declared parameter.
    pub fn arg_offset(self) -> usize {
        match self {
            CallShape::Function | CallShape::Raw => 0,
            CallShape::Method | CallShape::ConstMethod | CallShape::Constructor => 1,
        }
    }

    pub fn has_receiver(self) -> bool {
        matches!(self, CallShape::Method | CallShape::ConstMethod)
    }
}

/// Declared shape of a bound function, used for arity checks and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub shape: CallShape,
    /// Rust type names of the declared parameters
    pub params: Vec<&'static str>,
    /// Rust type name of the result, `None` for `()`
    pub returns: Option<&'static str>,
}

impl Signature {
    pub fn new(shape: CallShape, params: Vec<&'static str>, returns: Option<&'static str>) -> Self {
        Self {
            shape,
            params,
            returns,
        }
    }

    /// Signature of a raw function, which checks its own arguments.
    pub fn raw() -> Self {
        Self::new(CallShape::Raw, Vec::new(), None)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Stack depth a call with this signature must have.
    pub fn expected_top(&self) -> usize {
        self.arity() + self.shape.arg_offset()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape == CallShape::Raw {
            return f.write_str("(...)");
        }
        write!(f, "({})", self.params.join(", "))?;
        if let Some(returns) = self.returns {
            write!(f, " -> {}", returns)?;
        }
        Ok(())
    }
}

/// Trait for callable native functions.
///
/// `call` reads its arguments through the [`CallContext`], pushes its results
/// and returns how many it pushed.
pub trait NativeCallable {
    fn call(&self, ctx: &mut CallContext<'_>) -> Result<usize, NativeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext<'_>) -> Result<usize, NativeError>,
{
    fn call(&self, ctx: &mut CallContext<'_>) -> Result<usize, NativeError> {
        (self)(ctx)
    }
}

/// Type-erased native function.
///
/// This wraps any callable that implements `NativeCallable`, so functions of
/// different signatures can be stored uniformly in member tables. Cloning
/// shares the callable.
#[derive(Clone)]
pub struct NativeFn {
    signature: Rc<Signature>,
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    pub fn new<F>(signature: Signature, f: F) -> Self
    where
        F: NativeCallable + 'static,
    {
        Self {
            signature: Rc::new(signature),
            inner: Rc::new(f),
        }
    }

    /// Wrap a closure over the call context.
    ///
    /// Unlike [`new`](Self::new), the closure's argument type is inferred.
    pub fn from_fn<F>(signature: Signature, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<usize, NativeError> + 'static,
    {
        Self::new(signature, f)
    }

    /// Raw function with full access to the stack.
    pub fn raw<F>(signature: Signature, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<usize, NativeError> + 'static,
    {
        Self::from_fn(
            Signature {
                shape: CallShape::Raw,
                ..signature
            },
            f,
        )
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Call this native function with the given context.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, ctx: &mut CallContext<'_>) -> Result<usize, NativeError> {
        tracing::trace!(signature = %self.signature, top = ctx.top(), "native call");
        self.inner.call(ctx)
    }

    /// Whether both handles share one callable.
    pub fn ptr_eq(&self, other: &NativeFn) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// What a method needs from its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Execution context for one native call.
///
/// Pairs the runtime's stack window with the registry that describes the
/// native types on it.
pub struct CallContext<'a> {
    stack: &'a mut dyn Stack,
    registry: &'a TypeRegistry,
}

impl<'a> CallContext<'a> {
    pub fn new(stack: &'a mut dyn Stack, registry: &'a TypeRegistry) -> Self {
        Self { stack, registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    /// Number of values in the call's window.
    pub fn top(&self) -> usize {
        self.stack.top()
    }

    /// Value at a 1-based stack index.
    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.stack.get(index)
    }

    /// Check the stack depth against `expected` parameters after `offset`
    /// leading slots.
    pub fn expect_args(&self, expected: usize, offset: usize) -> Result<(), NativeError> {
        let top = self.top();
        if top == expected + offset {
            return Ok(());
        }
        Err(NativeError::ArgumentCount {
            given: top.saturating_sub(offset),
            expected,
        })
    }

    /// Convert the 1-based parameter `index`, found at stack slot
    /// `index + offset`.
    pub fn arg<T: FromSlot>(&self, index: usize, offset: usize) -> Result<T, NativeError> {
        let slot = self
            .slot(index + offset)
            .ok_or(NativeError::ArgumentCount {
                given: self.top().saturating_sub(offset),
                expected: index,
            })?;
        T::from_slot(slot, self.registry)
            .map_err(|source| NativeError::InvalidArgument { index, source })
    }

    /// Unbox slot 1 as the receiver of a method on `C`.
    pub fn receiver<C: NativeType>(&self, access: Access) -> Result<Object<C>, NativeError> {
        let expected = self.registry.display_name(TypeKey::of::<C>());
        let Some(slot) = self.slot(1) else {
            return Err(NativeError::invalid_receiver(expected, "no receiver"));
        };
        if slot.as_object().is_none() {
            let message = format!("got {}", self.registry.describe(slot));
            return Err(NativeError::invalid_receiver(expected, message));
        }
        let object = Object::<C>::from_value(slot, self.registry)
            .map_err(|err| NativeError::invalid_receiver(expected.clone(), err.to_string()))?;
        if access == Access::ReadWrite && object.is_read_only() {
            return Err(NativeError::invalid_receiver(expected, "object is read-only"));
        }
        Ok(object)
    }

    /// Push a native return value; returns the number of results pushed.
    pub fn push_return<R: ReturnValue>(&mut self, value: R) -> usize {
        match value.into_result() {
            Some(slot) => {
                self.stack.push(slot);
                1
            }
            None => 0,
        }
    }

    pub fn push_value(&mut self, value: Value) {
        self.stack.push(value);
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("top", &self.top())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
    }

    impl NativeType for Counter {
        const NAME: &'static str = "Counter";
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.set_name(TypeKey::of::<Counter>(), "Counter");
        registry
    }

    #[test]
    fn shape_offsets() {
        assert_eq!(CallShape::Function.arg_offset(), 0);
        assert_eq!(CallShape::Raw.arg_offset(), 0);
        assert_eq!(CallShape::Method.arg_offset(), 1);
        assert_eq!(CallShape::ConstMethod.arg_offset(), 1);
        assert_eq!(CallShape::Constructor.arg_offset(), 1);
        assert!(CallShape::Method.has_receiver());
        assert!(!CallShape::Constructor.has_receiver());
    }

    #[test]
    fn signature_display() {
        let sig = Signature::new(CallShape::Function, vec!["i32", "f64"], Some("bool"));
        assert_eq!(sig.to_string(), "(i32, f64) -> bool");
        assert_eq!(sig.expected_top(), 2);
        assert_eq!(Signature::raw().to_string(), "(...)");
    }

    #[test]
    fn expect_args_reports_counts() {
        let registry = registry();
        let mut stack: Vec<Value> = vec![Value::Nil];
        let ctx = CallContext::new(&mut stack, &registry);
        assert!(ctx.expect_args(0, 1).is_ok());
        match ctx.expect_args(2, 1) {
            Err(NativeError::ArgumentCount { given, expected }) => {
                assert_eq!(given, 0);
                assert_eq!(expected, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arg_conversion_error_names_index() {
        let registry = registry();
        let mut stack: Vec<Value> = vec![Value::Int(1), Value::from("x")];
        let ctx = CallContext::new(&mut stack, &registry);
        assert_eq!(ctx.arg::<i32>(1, 0).ok(), Some(1));
        match ctx.arg::<i32>(2, 0) {
            Err(NativeError::InvalidArgument { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn receiver_checks() {
        let registry = registry();
        let host = Rc::new(RefCell::new(Counter { value: 3 }));

        let mut stack: Vec<Value> = vec![Value::const_reference(&host)];
        let ctx = CallContext::new(&mut stack, &registry);
        let object = ctx.receiver::<Counter>(Access::ReadOnly).unwrap();
        assert_eq!(object.borrow().unwrap().value, 3);
        assert!(matches!(
            ctx.receiver::<Counter>(Access::ReadWrite),
            Err(NativeError::InvalidReceiver { .. })
        ));

        let mut stack: Vec<Value> = vec![Value::Int(1)];
        let ctx = CallContext::new(&mut stack, &registry);
        let err = ctx.receiver::<Counter>(Access::ReadOnly).unwrap_err();
        assert!(err.to_string().contains("expected Counter"));
        assert!(err.to_string().contains("got int"));

        let mut stack: Vec<Value> = Vec::new();
        let ctx = CallContext::new(&mut stack, &registry);
        assert!(matches!(
            ctx.receiver::<Counter>(Access::ReadOnly),
            Err(NativeError::InvalidReceiver { .. })
        ));
    }

    #[test]
    fn push_return_counts_results() {
        let registry = registry();
        let mut stack: Vec<Value> = Vec::new();
        let mut ctx = CallContext::new(&mut stack, &registry);
        assert_eq!(ctx.push_return(()), 0);
        assert_eq!(ctx.push_return(7i32), 1);
        ctx.push_value(Value::Bool(true));
        assert_eq!(ctx.top(), 2);
        drop(ctx);
        assert_eq!(stack, vec![Value::Int(7), Value::Bool(true)]);
    }

    #[test]
    fn native_fn_call_and_share() {
        let registry = registry();
        let f = NativeFn::from_fn(Signature::new(CallShape::Function, vec![], Some("i64")), |ctx| {
            ctx.push_value(Value::Int(42));
            Ok(1)
        });
        let shared = f.clone();
        assert!(f.ptr_eq(&shared));

        let mut stack: Vec<Value> = Vec::new();
        let mut ctx = CallContext::new(&mut stack, &registry);
        assert_eq!(shared.call(&mut ctx).ok(), Some(1));
        drop(ctx);
        assert_eq!(stack, vec![Value::Int(42)]);
    }

    #[test]
    fn raw_forces_shape() {
        let f = NativeFn::raw(
            Signature::new(CallShape::Method, vec!["i32"], None),
            |_ctx| Ok(0),
        );
        assert_eq!(f.signature().shape, CallShape::Raw);
    }
}
