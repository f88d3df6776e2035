//! Per-runtime registry of native types, members and free functions.
//!
//! This module provides `TypeRegistry`, the explicit context object that
//! replaces a process-wide class table. Every runtime owns one registry;
//! [`Class`](super::Class) builders populate it and dispatch reads from it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      TypeRegistry                        │
//! │  types: TypeKey ──► TypeEntry                            │
//! │                      ├─ name                             │
//! │                      ├─ members: name ──► Member         │
//! │                      ├─ constructor                      │
//! │                      ├─ bases: [Upcast]   (edges)        │
//! │                      └─ factory: InstanceFactory         │
//! │  functions: name ──► NativeFn                            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Member lookup walks the type first, then its bases depth-first in
//! declaration order. Each type is visited at most once, so cyclic
//! inheritance declarations terminate.

use std::any::Any;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use stackbind_core::{BoxedValue, ConversionError, TypeKey, Value};

use super::native_fn::NativeFn;
use super::traits::{Inherits, NativeType, Object};

/// A named entry in a type's member table.
#[derive(Clone)]
pub enum Member {
    /// Callable member: method, static function or raw function
    Function(NativeFn),
    /// Field exposed through accessor functions
    Property {
        getter: NativeFn,
        setter: Option<NativeFn>,
    },
    /// Plain value stored in the table (constants, shared references)
    Value(Value),
}

impl Member {
    pub fn as_function(&self) -> Option<&NativeFn> {
        match self {
            Member::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Short description used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Member::Function(_) => "function",
            Member::Property { .. } => "property",
            Member::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Function(func) => f.debug_tuple("Function").field(func).finish(),
            Member::Property { setter, .. } => f
                .debug_struct("Property")
                .field("writable", &setter.is_some())
                .finish(),
            Member::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

type CastRef = for<'a> fn(&'a (dyn Any + 'static)) -> Option<&'a (dyn Any + 'static)>;
type CastMut = for<'a> fn(&'a mut (dyn Any + 'static)) -> Option<&'a mut (dyn Any + 'static)>;

/// One inheritance edge: how to view a `from` object as its `to` base.
#[derive(Clone, Copy)]
pub struct Upcast {
    from: TypeKey,
    to: TypeKey,
    cast: CastRef,
    cast_mut: CastMut,
}

impl Upcast {
    /// Edge from `D` to its base `B`.
    pub fn new<D, B>() -> Self
    where
        D: Inherits<B> + 'static,
        B: 'static,
    {
        Self {
            from: TypeKey::of::<D>(),
            to: TypeKey::of::<B>(),
            cast: cast_ref::<D, B>,
            cast_mut: cast_mut::<D, B>,
        }
    }

    pub fn from(&self) -> TypeKey {
        self.from
    }

    pub fn to(&self) -> TypeKey {
        self.to
    }

    /// View `object` (a `from`) as its base.
    pub fn apply<'a>(&self, object: &'a (dyn Any + 'static)) -> Option<&'a (dyn Any + 'static)> {
        (self.cast)(object)
    }

    pub fn apply_mut<'a>(
        &self,
        object: &'a mut (dyn Any + 'static),
    ) -> Option<&'a mut (dyn Any + 'static)> {
        (self.cast_mut)(object)
    }
}

impl fmt::Debug for Upcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upcast({} -> {})", self.from, self.to)
    }
}

fn cast_ref<'a, D, B>(object: &'a (dyn Any + 'static)) -> Option<&'a (dyn Any + 'static)>
where
    D: Inherits<B> + 'static,
    B: 'static,
{
    object
        .downcast_ref::<D>()
        .map(|derived| <D as Inherits<B>>::upcast(derived) as &'a (dyn Any + 'static))
}

fn cast_mut<'a, D, B>(
    object: &'a mut (dyn Any + 'static),
) -> Option<&'a mut (dyn Any + 'static)>
where
    D: Inherits<B> + 'static,
    B: 'static,
{
    object
        .downcast_mut::<D>()
        .map(|derived| <D as Inherits<B>>::upcast_mut(derived) as &'a mut (dyn Any + 'static))
}

/// Host-side lifecycle hooks for one registered type.
///
/// Lets a host runtime create, copy and destroy boxed instances without
/// knowing the concrete Rust type.
#[derive(Clone, Copy)]
pub struct InstanceFactory {
    key: TypeKey,
    duplicate: Option<fn(&(dyn Any + 'static)) -> Option<BoxedValue>>,
}

impl InstanceFactory {
    pub(crate) fn new(key: TypeKey) -> Self {
        Self {
            key,
            duplicate: None,
        }
    }

    pub(crate) fn with_copy<T: Clone + 'static>(mut self) -> Self {
        self.duplicate = Some(duplicate::<T>);
        self
    }

    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// Whether [`copy`](Self::copy) is available.
    pub fn is_copyable(&self) -> bool {
        self.duplicate.is_some()
    }

    /// Box a fresh copy of the object held by `value`.
    ///
    /// Returns `None` if the type is not copyable, the value does not hold an
    /// object of this exact type, or the object no longer exists.
    pub fn copy(&self, value: &Value) -> Option<Value> {
        let duplicate = self.duplicate?;
        let boxed = value.as_object()?;
        if boxed.type_key() != self.key {
            return None;
        }
        let cell = boxed.object()?;
        let guard = cell.try_borrow().ok()?;
        let copy = duplicate(&*guard)?;
        Some(Value::Object(std::rc::Rc::new(copy)))
    }

    /// Destroy the object held by `value` according to its ownership tag.
    pub fn destroy(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|boxed| boxed.release())
    }
}

impl fmt::Debug for InstanceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceFactory")
            .field("type", &self.key)
            .field("copyable", &self.is_copyable())
            .finish()
    }
}

fn duplicate<T: Clone + 'static>(object: &(dyn Any + 'static)) -> Option<BoxedValue> {
    object
        .downcast_ref::<T>()
        .map(|value| BoxedValue::copied(value.clone()))
}

/// Everything registered for one native type.
#[derive(Debug)]
pub struct TypeEntry {
    key: TypeKey,
    name: Option<String>,
    members: FxHashMap<String, Member>,
    constructor: Option<NativeFn>,
    bases: Vec<Upcast>,
    factory: Option<InstanceFactory>,
}

impl TypeEntry {
    fn new(key: TypeKey) -> Self {
        Self {
            key,
            name: None,
            members: FxHashMap::default(),
            constructor: None,
            bases: Vec::new(),
            factory: None,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Script-visible name, `None` until declared.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn constructor(&self) -> Option<&NativeFn> {
        self.constructor.as_ref()
    }

    /// Direct bases, in declaration order.
    pub fn bases(&self) -> &[Upcast] {
        &self.bases
    }

    pub fn instance_factory(&self) -> Option<&InstanceFactory> {
        self.factory.as_ref()
    }

    /// Own member, without walking bases.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// The runtime's table of native types and global functions.
#[derive(Default)]
pub struct TypeRegistry {
    // === Type Storage ===
    types: FxHashMap<TypeKey, TypeEntry>,
    /// Declared name to type key
    names: FxHashMap<String, TypeKey>,

    // === Function Storage ===
    functions: FxHashMap<String, NativeFn>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Type table
    // =========================================================================

    /// The entry for `key`, created empty on first use.
    ///
    /// Two calls with the same key always return the same entry.
    pub fn get_or_create(&mut self, key: TypeKey) -> &mut TypeEntry {
        self.types.entry(key).or_insert_with(|| {
            tracing::trace!(type_name = key.rust_name(), "created type entry");
            TypeEntry::new(key)
        })
    }

    pub fn get(&self, key: TypeKey) -> Option<&TypeEntry> {
        self.types.get(&key)
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.types.contains_key(&key)
    }

    /// Whether `key` was declared with a name.
    pub fn is_declared(&self, key: TypeKey) -> bool {
        self.get(key).is_some_and(|entry| entry.name.is_some())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TypeEntry> {
        self.types.values()
    }

    /// Declare the script-visible name of a type.
    ///
    /// A name resolves to the type that declared it last. Renaming a type
    /// frees its previous name unless another type has claimed it since.
    pub fn set_name(&mut self, key: TypeKey, name: impl Into<String>) {
        let name = name.into();
        let entry = self.get_or_create(key);
        let previous = entry.name.replace(name.clone());
        if let Some(previous) = previous.filter(|p| *p != name)
            && self.names.get(&previous) == Some(&key)
        {
            self.names.remove(&previous);
        }
        self.names.insert(name, key);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&TypeEntry> {
        self.names.get(name).and_then(|key| self.types.get(key))
    }

    pub fn set_constructor(&mut self, key: TypeKey, constructor: NativeFn) {
        self.get_or_create(key).constructor = Some(constructor);
    }

    pub fn set_instance_factory(&mut self, factory: InstanceFactory) {
        self.get_or_create(factory.type_key()).factory = Some(factory);
    }

    /// Insert or replace a member of `key`.
    pub fn set(&mut self, key: TypeKey, name: impl Into<String>, member: Member) {
        let name = name.into();
        tracing::trace!(
            type_name = key.rust_name(),
            member = %name,
            kind = member.kind(),
            "set member"
        );
        self.get_or_create(key).members.insert(name, member);
    }

    /// Record an inheritance edge.
    ///
    /// Declaring the same edge twice keeps one; an edge from a type to
    /// itself is ignored. Returns whether the edge was added.
    pub fn add_base(&mut self, edge: Upcast) -> bool {
        if edge.from == edge.to {
            return false;
        }
        self.get_or_create(edge.to);
        let entry = self.get_or_create(edge.from);
        if entry.bases.iter().any(|base| base.to == edge.to) {
            return false;
        }
        entry.bases.push(edge);
        true
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find `name` on `key` or, failing that, on its bases depth-first.
    ///
    /// Returns the member together with the type that actually defines it.
    pub fn resolve_member(&self, key: TypeKey, name: &str) -> Option<(TypeKey, &Member)> {
        let mut visited = FxHashSet::default();
        self.resolve_in(key, name, &mut visited)
    }

    fn resolve_in<'a>(
        &'a self,
        key: TypeKey,
        name: &str,
        visited: &mut FxHashSet<TypeKey>,
    ) -> Option<(TypeKey, &'a Member)> {
        if !visited.insert(key) {
            return None;
        }
        let entry = self.types.get(&key)?;
        if let Some(member) = entry.members.get(name) {
            return Some((key, member));
        }
        entry
            .bases
            .iter()
            .find_map(|base| self.resolve_in(base.to, name, visited))
    }

    /// Chain of edges leading from `from` to `to`.
    ///
    /// The chain is empty when both keys are equal and `None` when `to` is
    /// not reachable.
    pub fn upcast_path(&self, from: TypeKey, to: TypeKey) -> Option<Vec<Upcast>> {
        let mut visited = FxHashSet::default();
        let mut path = Vec::new();
        self.path_in(from, to, &mut visited, &mut path)
            .then_some(path)
    }

    fn path_in(
        &self,
        from: TypeKey,
        to: TypeKey,
        visited: &mut FxHashSet<TypeKey>,
        path: &mut Vec<Upcast>,
    ) -> bool {
        if from == to {
            return true;
        }
        if !visited.insert(from) {
            return false;
        }
        let Some(entry) = self.types.get(&from) else {
            return false;
        };
        for base in &entry.bases {
            path.push(*base);
            if self.path_in(base.to, to, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Unbox `value` as a `T`, following inheritance edges.
    pub fn unbox<T: NativeType>(&self, value: &Value) -> Result<Object<T>, ConversionError> {
        Object::from_value(value, self)
    }

    /// Whether `derived` is `base` or inherits from it.
    pub fn is_subtype(&self, derived: TypeKey, base: TypeKey) -> bool {
        self.upcast_path(derived, base).is_some()
    }

    // =========================================================================
    // Naming
    // =========================================================================

    /// Declared name of `key`, or its Rust name if undeclared.
    pub fn display_name(&self, key: TypeKey) -> String {
        match self.get(key).and_then(TypeEntry::name) {
            Some(name) => name.to_string(),
            None => key.rust_name().to_string(),
        }
    }

    /// Type of a dynamic value as shown in diagnostics.
    ///
    /// Objects and class descriptors report their registered type name.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Object(boxed) => self.display_name(boxed.type_key()),
            Value::Class(key) => format!("class {}", self.display_name(*key)),
            other => other.type_name().to_string(),
        }
    }

    // =========================================================================
    // Global functions
    // =========================================================================

    pub fn register_function(&mut self, name: impl Into<String>, function: NativeFn) {
        let name = name.into();
        tracing::debug!(function = %name, "registered global function");
        self.functions.insert(name, function);
    }

    pub fn function(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}
