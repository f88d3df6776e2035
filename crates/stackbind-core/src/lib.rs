//! Runtime-facing building blocks for the stackbind binder.
//!
//! This crate holds the pieces that the dynamic runtime and the binder both
//! need to agree on:
//!
//! - [`Value`]: a dynamic stack slot
//! - [`BoxedValue`] and [`Ownership`]: a native object tagged with its lifetime policy
//! - [`TypeKey`]: the interned identity of a native type
//! - [`Stack`] and [`Introspect`]: the capabilities a runtime exposes to native code
//! - [`NativeError`], [`ConversionError`], [`DebugError`]: the error taxonomy
//!
//! Registration, dispatch and diagnostics live in the `stackbind` crate.

mod boxed;
mod error;
mod stack;
mod type_key;
mod value;

pub use boxed::{BoxedValue, ObjectCell, Ownership};
pub use error::{ConversionError, DebugError, NativeError};
pub use stack::{CallKind, FrameFields, FrameInfo, Introspect, NameKind, Stack};
pub use type_key::TypeKey;
pub use value::Value;
