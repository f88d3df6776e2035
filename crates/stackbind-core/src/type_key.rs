//! Interned identity for native types.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a native type.
///
/// Every [`BoxedValue`](crate::BoxedValue) carries the key of the type it was
/// created from, and the binder's registry is keyed by it. Two keys compare
/// equal if and only if they were produced from the same Rust type; the
/// stored name is only used for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    rust_name: &'static str,
}

impl TypeKey {
    /// Key for the Rust type `T`.
    #[inline]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified Rust name of the type.
    #[inline]
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Whether this key identifies `T`.
    #[inline]
    pub fn is<T: Any + ?Sized>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.rust_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rust_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Point;
    struct Other;

    #[test]
    fn same_type_same_key() {
        assert_eq!(TypeKey::of::<Point>(), TypeKey::of::<Point>());
        assert!(TypeKey::of::<Point>().is::<Point>());
    }

    #[test]
    fn different_types_differ() {
        assert_ne!(TypeKey::of::<Point>(), TypeKey::of::<Other>());
        assert!(!TypeKey::of::<Point>().is::<Other>());
    }

    #[test]
    fn usable_as_set_key() {
        let mut keys = HashSet::new();
        keys.insert(TypeKey::of::<Point>());
        keys.insert(TypeKey::of::<Point>());
        keys.insert(TypeKey::of::<Other>());
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn display_uses_rust_name() {
        let key = TypeKey::of::<i32>();
        assert_eq!(key.to_string(), "i32");
        assert!(format!("{:?}", key).contains("i32"));
    }
}
