//! Class builder for declaring native types in a [`TypeRegistry`].
//!
//! `Class` provides a fluent API for exposing a Rust type with constructors,
//! methods, properties, static functions, stored values and base classes.
//! Every call is applied to the registry immediately.
//!
//! # Example
//!
//! ```ignore
//! Class::<Vec3>::new(&mut registry, "Vec3")
//!     .constructor(Vec3::new)
//!     .method("length", Vec3::length)
//!     .method_mut("normalize", Vec3::normalize)
//!     .property("x", |v: &Vec3| v.x, |v: &mut Vec3, x: f64| v.x = x)
//!     .function("zero", Vec3::zero)
//!     .set_value("UNIT", 1.0)
//!     .copyable();
//!
//! Class::<Player>::new(&mut registry, "Player")
//!     .inherits::<Entity>()
//!     .method("name", |p: &Player| p.name.clone());
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use stackbind_core::{NativeError, TypeKey, Value};

use super::dispatch::{IntoConstructor, IntoFunction, IntoMethod, IntoMethodMut};
use super::ffi_registry::{InstanceFactory, Member, TypeRegistry, Upcast};
use super::native_fn::{CallContext, NativeFn, Signature};
use super::traits::{FromSlot, Inherits, IntoSlot, NativeType};

/// Builder for declaring a native type.
///
/// # Type Parameters
///
/// - `'r`: Lifetime of the mutable borrow of the registry
/// - `T`: The Rust type being declared
pub struct Class<'r, T: NativeType> {
    registry: &'r mut TypeRegistry,
    key: TypeKey,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: NativeType> Class<'r, T> {
    /// Declare `T` under `name`, or reopen an existing declaration.
    pub fn new(registry: &'r mut TypeRegistry, name: &str) -> Self {
        let key = TypeKey::of::<T>();
        registry.set_name(key, name);
        if registry
            .get(key)
            .is_none_or(|entry| entry.instance_factory().is_none())
        {
            registry.set_instance_factory(InstanceFactory::new(key));
        }
        tracing::debug!(class = name, rust_type = key.rust_name(), "declared class");
        Self {
            registry,
            key,
            _marker: PhantomData,
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// Register the constructor called when the runtime creates a `T`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// Class::<Vec3>::new(&mut registry, "Vec3")
    ///     .constructor(|x: f64, y: f64, z: f64| Vec3 { x, y, z });
    /// ```
    pub fn constructor<Args, F>(self, f: F) -> Self
    where
        F: IntoConstructor<T, Args>,
    {
        let constructor = f.into_constructor();
        tracing::trace!(
            class = self.key.rust_name(),
            signature = %constructor.signature(),
            "bound constructor"
        );
        self.registry.set_constructor(self.key, constructor);
        self
    }

    /// Register `T::default` as the constructor.
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(T::default)
    }

    /// Register a method that takes `&C`, where `C` is `T` or one of its bases.
    ///
    /// # Example
    ///
    /// ```ignore
    /// Class::<Vec3>::new(&mut registry, "Vec3")
    ///     .method("length", Vec3::length)
    ///     .method("dot", |a: &Vec3, b: Vec3| a.dot(&b));
    /// ```
    pub fn method<C, Args, R, F>(mut self, name: &str, f: F) -> Self
    where
        C: NativeType,
        T: Inherits<C>,
        F: IntoMethod<C, Args, R>,
    {
        self.record_receiver::<C>();
        self.bind(name, Member::Function(f.into_method()))
    }

    /// Register a method that takes `&mut C`.
    ///
    /// Read-only references cannot call these methods.
    pub fn method_mut<C, Args, R, F>(mut self, name: &str, f: F) -> Self
    where
        C: NativeType,
        T: Inherits<C>,
        F: IntoMethodMut<C, Args, R>,
    {
        self.record_receiver::<C>();
        self.bind(name, Member::Function(f.into_method_mut()))
    }

    /// Register a class-scoped function that takes no receiver.
    pub fn function<Args, R, F>(self, name: &str, f: F) -> Self
    where
        F: IntoFunction<Args, R>,
    {
        self.bind(name, Member::Function(f.into_function()))
    }

    /// Register a function with raw [`CallContext`] access.
    ///
    /// The function reads the stack itself and returns the number of results
    /// it pushed.
    pub fn raw<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<usize, NativeError> + 'static,
    {
        self.bind(name, Member::Function(NativeFn::raw(Signature::raw(), f)))
    }

    /// Register a field with a getter and a setter.
    ///
    /// # Example
    ///
    /// ```ignore
    /// Class::<Vec3>::new(&mut registry, "Vec3")
    ///     .property("x", |v: &Vec3| v.x, |v: &mut Vec3, x: f64| v.x = x);
    /// ```
    pub fn property<V, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        V: FromSlot + IntoSlot + 'static,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let getter = IntoMethod::<T, (), V>::into_method(get);
        let setter = IntoMethodMut::<T, (V,), ()>::into_method_mut(set);
        self.bind(
            name,
            Member::Property {
                getter,
                setter: Some(setter),
            },
        )
    }

    /// Register a read-only field.
    pub fn property_get<V, G>(self, name: &str, get: G) -> Self
    where
        V: IntoSlot + 'static,
        G: Fn(&T) -> V + 'static,
    {
        let getter = IntoMethod::<T, (), V>::into_method(get);
        self.bind(
            name,
            Member::Property {
                getter,
                setter: None,
            },
        )
    }

    /// Store a copy of `value` in the class table.
    pub fn set_value<V: IntoSlot>(self, name: &str, value: V) -> Self {
        self.bind(name, Member::Value(value.into_slot()))
    }

    /// Store a reference to host-owned storage in the class table.
    ///
    /// The runtime never frees the referenced object.
    pub fn set_ref<U: Any>(self, name: &str, target: &Rc<RefCell<U>>) -> Self {
        self.bind(name, Member::Value(Value::reference(target)))
    }

    /// Hand `value` to the runtime; it is freed when the class table entry
    /// is replaced or the registry is dropped.
    pub fn set_auto_delete<U: Any>(self, name: &str, value: Box<U>) -> Self {
        self.bind(name, Member::Value(Value::auto_delete(value)))
    }

    /// Store an arbitrary member.
    pub fn raw_set(self, name: &str, member: Member) -> Self {
        self.bind(name, member)
    }

    /// Declare `B` as a base class of `T`.
    ///
    /// Members of `B` become visible on `T`, and `T` objects are accepted
    /// wherever a `B` is expected.
    pub fn inherits<B>(self) -> Self
    where
        B: NativeType,
        T: Inherits<B>,
    {
        if self.registry.add_base(Upcast::new::<T, B>()) {
            tracing::debug!(
                class = self.key.rust_name(),
                base = std::any::type_name::<B>(),
                "declared base class"
            );
        }
        self
    }

    /// Let the host duplicate boxed `T` objects through the instance factory.
    pub fn copyable(self) -> Self
    where
        T: Clone,
    {
        self.registry
            .set_instance_factory(InstanceFactory::new(self.key).with_copy::<T>());
        self
    }

    fn record_receiver<C>(&mut self)
    where
        C: NativeType,
        T: Inherits<C>,
    {
        if TypeKey::of::<C>() != self.key {
            self.registry.add_base(Upcast::new::<T, C>());
        }
    }

    fn bind(self, name: &str, member: Member) -> Self {
        tracing::trace!(
            class = self.key.rust_name(),
            member = name,
            kind = member.kind(),
            "bound member"
        );
        self.registry.set(self.key, name, member);
        self
    }
}
