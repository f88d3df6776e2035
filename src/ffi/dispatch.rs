//! Typed adapters from Rust callables to [`NativeFn`].
//!
//! One macro expansion per parameter count (0 to 8) implements the four call
//! shapes:
//!
//! | trait               | callable              | leading slot      |
//! |---------------------|-----------------------|-------------------|
//! | [`IntoFunction`]    | `Fn(A..) -> R`        | none              |
//! | [`IntoMethod`]      | `Fn(&C, A..) -> R`    | receiver          |
//! | [`IntoMethodMut`]   | `Fn(&mut C, A..) -> R`| receiver          |
//! | [`IntoConstructor`] | `Fn(A..) -> T`        | class descriptor  |
//!
//! Every adapter checks the stack depth first, then the receiver, then
//! converts parameters left to right, invokes the callable and pushes the
//! result.

use std::any::type_name;
use std::rc::Rc;

use stackbind_core::{BoxedValue, NativeError, TypeKey, Value};

use super::native_fn::{Access, CallShape, NativeFn, Signature};
use super::traits::{FromSlot, NativeType, ReturnValue};

/// A free function `Fn(A..) -> R`.
pub trait IntoFunction<Args, R> {
    fn into_function(self) -> NativeFn;
}

/// A method taking its receiver by shared reference.
pub trait IntoMethod<C, Args, R> {
    fn into_method(self) -> NativeFn;
}

/// A method taking its receiver by mutable reference.
///
/// Read-only receivers are rejected with `InvalidReceiver`.
pub trait IntoMethodMut<C, Args, R> {
    fn into_method_mut(self) -> NativeFn;
}

/// A constructor `Fn(A..) -> T` whose result is boxed as runtime-owned.
pub trait IntoConstructor<T, Args> {
    fn into_constructor(self) -> NativeFn;
}

macro_rules! count_args {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count_args!($($tail)*) };
}

fn missing_receiver<C: NativeType>(ctx: &super::native_fn::CallContext<'_>) -> NativeError {
    NativeError::invalid_receiver(
        ctx.registry().display_name(TypeKey::of::<C>()),
        "no receiver",
    )
}

fn unregistered<T: NativeType>() -> NativeError {
    NativeError::UnregisteredType {
        name: T::NAME.to_string(),
    }
}

macro_rules! impl_dispatch {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoFunction<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: ReturnValue,
            $($arg: FromSlot,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_function(self) -> NativeFn {
                let arity = count_args!($($arg)*);
                let signature = Signature::new(
                    CallShape::Function,
                    vec![$(type_name::<$arg>()),*],
                    R::type_name(),
                );
                NativeFn::from_fn(signature, move |ctx| {
                    ctx.expect_args(arity, 0)?;
                    let mut index = 0usize;
                    $(
                        index += 1;
                        let $arg = ctx.arg::<$arg>(index, 0)?;
                    )*
                    let result = (self)($($arg),*);
                    Ok(ctx.push_return(result))
                })
            }
        }

        impl<F, C, R, $($arg,)*> IntoMethod<C, ($($arg,)*), R> for F
        where
            F: Fn(&C, $($arg),*) -> R + 'static,
            C: NativeType,
            R: ReturnValue,
            $($arg: FromSlot,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_method(self) -> NativeFn {
                let arity = count_args!($($arg)*);
                let signature = Signature::new(
                    CallShape::ConstMethod,
                    vec![$(type_name::<$arg>()),*],
                    R::type_name(),
                );
                NativeFn::from_fn(signature, move |ctx| {
                    if ctx.top() == 0 {
                        return Err(missing_receiver::<C>(ctx));
                    }
                    if !ctx.registry().is_declared(TypeKey::of::<C>()) {
                        return Err(unregistered::<C>());
                    }
                    ctx.expect_args(arity, 1)?;
                    let receiver = ctx.receiver::<C>(Access::ReadOnly)?;
                    let mut index = 0usize;
                    $(
                        index += 1;
                        let $arg = ctx.arg::<$arg>(index, 1)?;
                    )*
                    let result = {
                        let this = receiver.borrow().map_err(|err| {
                            NativeError::invalid_receiver(
                                ctx.registry().display_name(TypeKey::of::<C>()),
                                err.to_string(),
                            )
                        })?;
                        (self)(&*this, $($arg),*)
                    };
                    Ok(ctx.push_return(result))
                })
            }
        }

        impl<F, C, R, $($arg,)*> IntoMethodMut<C, ($($arg,)*), R> for F
        where
            F: Fn(&mut C, $($arg),*) -> R + 'static,
            C: NativeType,
            R: ReturnValue,
            $($arg: FromSlot,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_method_mut(self) -> NativeFn {
                let arity = count_args!($($arg)*);
                let signature = Signature::new(
                    CallShape::Method,
                    vec![$(type_name::<$arg>()),*],
                    R::type_name(),
                );
                NativeFn::from_fn(signature, move |ctx| {
                    if ctx.top() == 0 {
                        return Err(missing_receiver::<C>(ctx));
                    }
                    if !ctx.registry().is_declared(TypeKey::of::<C>()) {
                        return Err(unregistered::<C>());
                    }
                    ctx.expect_args(arity, 1)?;
                    let receiver = ctx.receiver::<C>(Access::ReadWrite)?;
                    let mut index = 0usize;
                    $(
                        index += 1;
                        let $arg = ctx.arg::<$arg>(index, 1)?;
                    )*
                    let result = {
                        let mut this = receiver.borrow_mut().map_err(|err| {
                            NativeError::invalid_receiver(
                                ctx.registry().display_name(TypeKey::of::<C>()),
                                err.to_string(),
                            )
                        })?;
                        (self)(&mut *this, $($arg),*)
                    };
                    Ok(ctx.push_return(result))
                })
            }
        }

        impl<F, T, $($arg,)*> IntoConstructor<T, ($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> T + 'static,
            T: NativeType,
            $($arg: FromSlot,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_constructor(self) -> NativeFn {
                let arity = count_args!($($arg)*);
                let signature = Signature::new(
                    CallShape::Constructor,
                    vec![$(type_name::<$arg>()),*],
                    Some(type_name::<T>()),
                );
                NativeFn::from_fn(signature, move |ctx| {
                    if !ctx.registry().is_declared(TypeKey::of::<T>()) {
                        return Err(unregistered::<T>());
                    }
                    ctx.expect_args(arity, 1)?;
                    let mut index = 0usize;
                    $(
                        index += 1;
                        let $arg = ctx.arg::<$arg>(index, 1)?;
                    )*
                    let object = (self)($($arg),*);
                    ctx.push_value(Value::Object(Rc::new(BoxedValue::runtime_owned(object))));
                    Ok(1)
                })
            }
        }
    };
}

impl_dispatch!();
impl_dispatch!(A1);
impl_dispatch!(A1, A2);
impl_dispatch!(A1, A2, A3);
impl_dispatch!(A1, A2, A3, A4);
impl_dispatch!(A1, A2, A3, A4, A5);
impl_dispatch!(A1, A2, A3, A4, A5, A6);
impl_dispatch!(A1, A2, A3, A4, A5, A6, A7);
impl_dispatch!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::ffi_registry::TypeRegistry;
    use crate::ffi::native_fn::CallContext;
    use crate::ffi::traits::Object;
    use stackbind_core::{ConversionError, Ownership};

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl NativeType for Point {
        const NAME: &'static str = "Point";
    }

    impl Point {
        fn new(x: i32, y: i32) -> Self {
            Self { x, y }
        }

        fn sum(&self) -> i32 {
            self.x + self.y
        }

        fn shift(&mut self, dx: i32, dy: i32) {
            self.x += dx;
            self.y += dy;
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.set_name(TypeKey::of::<Point>(), "Point");
        registry
    }

    fn run(f: &NativeFn, registry: &TypeRegistry, stack: &mut Vec<Value>) -> Result<usize, NativeError> {
        let mut ctx = CallContext::new(stack, registry);
        f.call(&mut ctx)
    }

    #[test]
    fn function_converts_and_pushes() {
        let registry = registry();
        let add = (|a: i32, b: i32| a + b).into_function();
        assert_eq!(add.signature().arity(), 2);

        let mut stack = vec![Value::Int(2), Value::Int(3)];
        assert_eq!(run(&add, &registry, &mut stack).ok(), Some(1));
        assert_eq!(stack.last(), Some(&Value::Int(5)));
    }

    #[test]
    fn unit_return_pushes_nothing() {
        let registry = registry();
        let noop = (|_flag: bool| ()).into_function();
        let mut stack = vec![Value::Bool(true)];
        assert_eq!(run(&noop, &registry, &mut stack).ok(), Some(0));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn argument_count_off_by_one() {
        let registry = registry();
        let add = (|a: i32, b: i32| a + b).into_function();

        for stack in [vec![Value::Int(1)], vec![Value::Int(1), Value::Int(2), Value::Int(3)]] {
            let given = stack.len();
            let mut stack = stack;
            match run(&add, &registry, &mut stack) {
                Err(NativeError::ArgumentCount { given: g, expected }) => {
                    assert_eq!(g, given);
                    assert_eq!(expected, 2);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn invalid_argument_names_index_and_types() {
        let registry = registry();
        let add = (|a: i32, b: i32| a + b).into_function();
        let mut stack = vec![Value::Int(1), Value::from("two")];
        match run(&add, &registry, &mut stack) {
            Err(NativeError::InvalidArgument { index, source }) => {
                assert_eq!(index, 2);
                assert_eq!(
                    source,
                    ConversionError::TypeMismatch {
                        expected: "int".into(),
                        actual: "string".into(),
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arguments_convert_left_to_right() {
        let registry = registry();
        let f = (|_a: i32, _b: i32, _c: i32| ()).into_function();
        let mut stack = vec![Value::Nil, Value::Nil, Value::Int(1)];
        match run(&f, &registry, &mut stack) {
            Err(NativeError::InvalidArgument { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn const_method_reads_receiver() {
        let registry = registry();
        let sum = IntoMethod::<Point, (), i32>::into_method(Point::sum);
        let mut stack = vec![Value::copy(Point::new(2, 3))];
        assert_eq!(run(&sum, &registry, &mut stack).ok(), Some(1));
        assert_eq!(stack.last(), Some(&Value::Int(5)));
    }

    #[test]
    fn method_on_empty_stack_has_no_receiver() {
        let registry = registry();
        let sum = IntoMethod::<Point, (), i32>::into_method(Point::sum);
        let mut stack = Vec::new();
        assert!(matches!(
            run(&sum, &registry, &mut stack),
            Err(NativeError::InvalidReceiver { .. })
        ));
    }

    #[test]
    fn method_argument_count_excludes_receiver() {
        let registry = registry();
        let shift = IntoMethodMut::<Point, (i32, i32), ()>::into_method_mut(Point::shift);
        let mut stack = vec![Value::copy(Point::new(0, 0))];
        match run(&shift, &registry, &mut stack) {
            Err(NativeError::ArgumentCount { given, expected }) => {
                assert_eq!(given, 0);
                assert_eq!(expected, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mut_method_edits_receiver() {
        let registry = registry();
        let shift = IntoMethodMut::<Point, (i32, i32), ()>::into_method_mut(Point::shift);
        let point = Value::copy(Point::new(1, 1));
        let mut stack = vec![point.clone(), Value::Int(2), Value::Int(3)];
        assert_eq!(run(&shift, &registry, &mut stack).ok(), Some(0));

        let object = Object::<Point>::from_value(&point, &registry).unwrap();
        assert_eq!(*object.borrow().unwrap(), Point::new(3, 4));
    }

    #[test]
    fn mut_method_rejects_read_only_receiver() {
        let registry = registry();
        let shift = IntoMethodMut::<Point, (i32, i32), ()>::into_method_mut(Point::shift);
        let host = Rc::new(std::cell::RefCell::new(Point::new(0, 0)));
        let mut stack = vec![Value::const_reference(&host), Value::Int(1), Value::Int(1)];
        assert!(matches!(
            run(&shift, &registry, &mut stack),
            Err(NativeError::InvalidReceiver { .. })
        ));
        assert_eq!(*host.borrow(), Point::new(0, 0));
    }

    #[test]
    fn method_rejects_wrong_receiver() {
        let registry = registry();
        let sum = IntoMethod::<Point, (), i32>::into_method(Point::sum);
        let mut stack = vec![Value::copy(String::from("not a point"))];
        assert!(matches!(
            run(&sum, &registry, &mut stack),
            Err(NativeError::InvalidReceiver { .. })
        ));
    }

    #[test]
    fn methods_require_declared_receiver_type() {
        let registry = TypeRegistry::new();
        let sum = IntoMethod::<Point, (), i32>::into_method(Point::sum);
        let shift = IntoMethodMut::<Point, (i32, i32), ()>::into_method_mut(Point::shift);
        let point = Value::copy(Point::new(2, 3));

        let mut stack = vec![point.clone()];
        match run(&sum, &registry, &mut stack) {
            Err(err @ NativeError::UnregisteredType { .. }) => {
                assert_eq!(err.to_string(), "Class Point is not available");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stack.len(), 1);

        let mut stack = vec![point.clone(), Value::Int(1), Value::Int(1)];
        assert!(matches!(
            run(&shift, &registry, &mut stack),
            Err(NativeError::UnregisteredType { .. })
        ));
        let object = Object::<Point>::from_value(&point, &registry).unwrap();
        assert_eq!(*object.borrow().unwrap(), Point::new(2, 3));
    }

    #[test]
    fn constructor_boxes_runtime_owned() {
        let registry = registry();
        let ctor = IntoConstructor::<Point, (i32, i32)>::into_constructor(Point::new);
        let mut stack = vec![Value::class_of::<Point>(), Value::Int(4), Value::Int(5)];
        assert_eq!(run(&ctor, &registry, &mut stack).ok(), Some(1));

        let created = stack.last().cloned().unwrap_or_default();
        assert_eq!(
            created.as_object().map(|b| b.ownership()),
            Some(Ownership::RuntimeOwned)
        );
        let object = Object::<Point>::from_value(&created, &registry).unwrap();
        assert_eq!(object.borrow().unwrap().sum(), 9);
    }

    #[test]
    fn constructor_requires_declared_type() {
        let registry = TypeRegistry::new();
        let ctor = IntoConstructor::<Point, (i32, i32)>::into_constructor(Point::new);
        let mut stack = vec![Value::class_of::<Point>(), Value::Int(4), Value::Int(5)];
        match run(&ctor, &registry, &mut stack) {
            Err(err @ NativeError::UnregisteredType { .. }) => {
                assert_eq!(err.to_string(), "Class Point is not available");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn constructor_counts_after_descriptor() {
        let registry = registry();
        let ctor = IntoConstructor::<Point, (i32, i32)>::into_constructor(Point::new);
        let mut stack = vec![Value::class_of::<Point>()];
        assert!(matches!(
            run(&ctor, &registry, &mut stack),
            Err(NativeError::ArgumentCount {
                given: 0,
                expected: 2
            })
        ));
    }

    #[test]
    fn eight_arguments() {
        let registry = registry();
        let f = (|a: i32, b: i32, c: i32, d: i32, e: i32, g: i32, h: i32, i: i32| {
            a + b + c + d + e + g + h + i
        })
        .into_function();
        let mut stack: Vec<Value> = (1..=8).map(Value::Int).collect();
        assert_eq!(run(&f, &registry, &mut stack).ok(), Some(1));
        assert_eq!(stack.last(), Some(&Value::Int(36)));
    }
}
