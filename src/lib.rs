//! Native binding layer for an embedded, stack-based scripting runtime.
//!
//! Rust types are declared once with [`ffi::Class`] into a per-runtime
//! [`ffi::TypeRegistry`]. Every bound member becomes a [`ffi::NativeFn`] that
//! checks the stack depth, unboxes its receiver, converts its arguments,
//! calls the Rust code and pushes the result. Failures cross a single error
//! boundary ([`error_handler::protected_call`]) and reach the application as
//! one [`error_handler::ScriptError`] with a formatted traceback.
//!
//! [`state::ScriptState`] is a small reference runtime that drives all of
//! this end to end.

pub mod error_handler;
pub mod ffi;
pub mod state;

pub use stackbind_core as core;

// Re-export main types
pub mod prelude {
    pub use crate::error_handler::{
        DefaultErrorHandler, Diagnostic, ErrorHandler, ScriptError, ScriptResult,
        TracebackOptions, TracingErrorHandler, protected_call, protected_call_with,
    };
    pub use crate::ffi::{
        Access, CallContext, CallShape, Class, FromSlot, Inherits, IntoConstructor,
        IntoFunction, IntoMethod, IntoMethodMut, IntoSlot, Member, NativeFn, NativeType,
        Object, ReturnValue, Signature, TypeRegistry,
    };
    pub use crate::state::{ScriptState, StateConfig};
    pub use stackbind_core::{
        BoxedValue, CallKind, ConversionError, DebugError, FrameFields, FrameInfo,
        Introspect, NameKind, NativeError, Ownership, Stack, TypeKey, Value,
    };
}
