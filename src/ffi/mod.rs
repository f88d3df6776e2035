//! Native binding layer: exposing Rust types and functions to the runtime.
//!
//! This module provides:
//!
//! - Type conversion traits (`FromSlot`, `IntoSlot`, `ReturnValue`)
//! - Typed object handles with inheritance (`Object`, `Inherits`)
//! - Native function storage (`NativeFn`, `CallContext`)
//! - Typed dispatch adapters for every arity (`IntoFunction`, `IntoMethod`, ...)
//! - The per-runtime type table (`TypeRegistry`)
//! - The declaration builder (`Class`)
//!
//! ```text
//! Class (declaration) -> TypeRegistry -> NativeFn::call(CallContext)
//! ```

mod class_builder;
mod dispatch;
mod ffi_registry;
mod native_fn;
mod traits;

pub use class_builder::Class;
pub use dispatch::{IntoConstructor, IntoFunction, IntoMethod, IntoMethodMut};
pub use ffi_registry::{InstanceFactory, Member, TypeEntry, TypeRegistry, Upcast};
pub use native_fn::{Access, CallContext, CallShape, NativeCallable, NativeFn, Signature};
pub use traits::{FromSlot, Inherits, IntoSlot, NativeType, Object, ReturnValue};
