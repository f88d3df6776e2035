//! A minimal embedded runtime that drives native dispatch.
//!
//! `ScriptState` owns a [`TypeRegistry`], a value stack and a call stack, and
//! performs the requests a script would make: constructing objects, calling
//! methods and functions, and reading or writing fields. Every request runs
//! behind the error boundary, so failures come back as a single
//! [`ScriptError`] carrying a formatted traceback.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = TypeRegistry::new();
//! Class::<Point>::new(&mut registry, "Point")
//!     .constructor(Point::new)
//!     .method("sum", Point::sum);
//!
//! let mut state = ScriptState::new(registry);
//! let p = state.construct("Point", vec![Value::Int(2), Value::Int(3)])?;
//! let sum = state.call_method(&p, "sum", vec![])?;
//! assert_eq!(sum, vec![Value::Int(5)]);
//! ```

use std::any::Any;
use std::fmt;

use stackbind_core::{
    DebugError, FrameFields, FrameInfo, Introspect, NameKind, NativeError, Stack, TypeKey, Value,
};

use crate::error_handler::{
    DefaultErrorHandler, ErrorHandler, ScriptError, ScriptResult, TracebackOptions, protected_call_with,
    report,
};
use crate::ffi::{CallContext, Member, NativeFn, TypeRegistry};

/// Runtime limits and diagnostic settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    /// Maximum depth of the call stack before a call fails with `StackOverflow`
    pub frame_limit: usize,
    /// Maximum number of frames rendered in a traceback
    pub traceback_limit: usize,
    /// Frame attributes requested when building a traceback
    pub field_requests: FrameFields,
}

impl StateConfig {
    pub fn new() -> Self {
        Self {
            frame_limit: 200,
            traceback_limit: 32,
            field_requests: FrameFields::all(),
        }
    }

    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn with_traceback_limit(mut self, limit: usize) -> Self {
        self.traceback_limit = limit;
        self
    }

    pub fn with_field_requests(mut self, fields: FrameFields) -> Self {
        self.field_requests = fields;
        self
    }

    fn traceback(&self) -> TracebackOptions {
        TracebackOptions {
            fields: self.field_requests,
            limit: self.traceback_limit,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The value stack, seen through the window of the running call.
#[derive(Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
    base: usize,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a window holding `args`; returns the previous base.
    fn enter(&mut self, args: Vec<Value>) -> usize {
        let previous = self.base;
        self.base = self.values.len();
        self.values.extend(args);
        previous
    }

    /// Close the current window, keeping its top `results` values.
    fn leave(&mut self, previous: usize, results: usize) -> Vec<Value> {
        let start = self.values.len().saturating_sub(results).max(self.base);
        let kept = self.values.split_off(start);
        self.values.truncate(self.base);
        self.base = previous;
        kept
    }

    /// Total number of values, across all windows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Stack for ValueStack {
    fn top(&self) -> usize {
        self.values.len() - self.base
    }

    fn get(&self, index: usize) -> Option<&Value> {
        index
            .checked_sub(1)
            .and_then(|i| self.values.as_slice().get(self.base + i))
    }

    fn push(&mut self, value: Value) {
        self.values.push(value);
    }
}

/// Active call frames, innermost last.
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<FrameInfo>,
}

impl CallStack {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Introspect for CallStack {
    fn frame(&self, level: usize, fields: FrameFields) -> Option<Result<FrameInfo, DebugError>> {
        self.frames
            .iter()
            .rev()
            .nth(level)
            .map(|frame| Ok(frame.select(fields)))
    }
}

/// A single-threaded runtime instance.
pub struct ScriptState {
    registry: TypeRegistry,
    stack: ValueStack,
    frames: CallStack,
    handler: Box<dyn ErrorHandler>,
    config: StateConfig,
}

impl ScriptState {
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_config(registry, StateConfig::default())
    }

    pub fn with_config(registry: TypeRegistry, config: StateConfig) -> Self {
        Self {
            registry,
            stack: ValueStack::new(),
            frames: CallStack::default(),
            handler: Box::new(DefaultErrorHandler::new()),
            config,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Mutable access for declaring more types after creation.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.handler = handler;
    }

    // =========================================================================
    // Call stack
    // =========================================================================

    /// Enter a script frame; it shows up in tracebacks until popped.
    pub fn push_frame(&mut self, frame: FrameInfo) {
        self.frames.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<FrameInfo> {
        self.frames.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.depth()
    }

    pub fn frames(&self) -> &CallStack {
        &self.frames
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Create an object through the constructor registered for `type_name`.
    pub fn construct(&mut self, type_name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        let Some(key) = self.registry.find_by_name(type_name).map(|entry| entry.key()) else {
            return Err(self.fail(NativeError::UnknownType {
                name: type_name.to_string(),
            }));
        };
        self.construct_key(key, args)
    }

    /// Create a `T` through its registered constructor.
    pub fn construct_type<T: Any>(&mut self, args: Vec<Value>) -> ScriptResult<Value> {
        self.construct_key(TypeKey::of::<T>(), args)
    }

    fn construct_key(&mut self, key: TypeKey, args: Vec<Value>) -> ScriptResult<Value> {
        let type_name = self.registry.display_name(key);
        let Some(entry) = self.registry.get(key).filter(|e| e.name().is_some()) else {
            return Err(self.fail(NativeError::UnregisteredType { name: type_name }));
        };
        let Some(constructor) = entry.constructor().cloned() else {
            return Err(self.fail(NativeError::NotCallable {
                type_name,
                member: "constructor".to_string(),
            }));
        };

        let mut slots = Vec::with_capacity(args.len() + 1);
        slots.push(Value::Class(key));
        slots.extend(args);
        let frame = FrameInfo::native(type_name, NameKind::Global);
        let results = self.invoke(&constructor, frame, slots)?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Call method `name` on `receiver`, searching its type and bases.
    pub fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> ScriptResult<Vec<Value>> {
        let member = self.resolve_on_receiver(receiver, name)?;
        let function = self.callable(receiver_key(receiver), name, member)?;

        let mut slots = Vec::with_capacity(args.len() + 1);
        slots.push(receiver.clone());
        slots.extend(args);
        self.invoke(&function, FrameInfo::native(name, NameKind::Method), slots)
    }

    /// Call a class-scoped function such as `Point.origin()`.
    pub fn call_static(
        &mut self,
        type_name: &str,
        name: &str,
        args: Vec<Value>,
    ) -> ScriptResult<Vec<Value>> {
        let Some(key) = self.registry.find_by_name(type_name).map(|entry| entry.key()) else {
            return Err(self.fail(NativeError::UnknownType {
                name: type_name.to_string(),
            }));
        };
        let member = self.resolve(key, name)?;
        let function = self.callable(Some(key), name, member)?;
        self.invoke(&function, FrameInfo::native(name, NameKind::Field), args)
    }

    /// Call a global function.
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Vec<Value>> {
        let Some(function) = self.registry.function(name).cloned() else {
            return Err(self.fail(NativeError::MemberNotFound {
                type_name: "global scope".to_string(),
                member: name.to_string(),
            }));
        };
        self.invoke(&function, FrameInfo::native(name, NameKind::Global), args)
    }

    /// Read field `name` of `receiver`.
    ///
    /// Properties call their getter; stored values are returned as is.
    pub fn get_field(&mut self, receiver: &Value, name: &str) -> ScriptResult<Value> {
        match self.resolve_on_receiver(receiver, name)? {
            Member::Property { getter, .. } => {
                let results = self.invoke(
                    &getter,
                    FrameInfo::native(name, NameKind::Field),
                    vec![receiver.clone()],
                )?;
                Ok(results.into_iter().next().unwrap_or_default())
            }
            Member::Value(value) => Ok(value),
            Member::Function(_) => Err(self.fail(NativeError::NotAField {
                type_name: self.receiver_name(receiver),
                member: name.to_string(),
            })),
        }
    }

    /// Write field `name` of `receiver` through its setter.
    pub fn set_field(&mut self, receiver: &Value, name: &str, value: Value) -> ScriptResult<()> {
        match self.resolve_on_receiver(receiver, name)? {
            Member::Property {
                setter: Some(setter),
                ..
            } => {
                self.invoke(
                    &setter,
                    FrameInfo::native(name, NameKind::Field),
                    vec![receiver.clone(), value],
                )?;
                Ok(())
            }
            Member::Property { setter: None, .. } => Err(self.fail(NativeError::ReadOnlyField {
                type_name: self.receiver_name(receiver),
                member: name.to_string(),
            })),
            Member::Value(_) | Member::Function(_) => Err(self.fail(NativeError::NotAField {
                type_name: self.receiver_name(receiver),
                member: name.to_string(),
            })),
        }
    }

    /// Call `callable` in a fresh native frame with `args` as its stack window.
    ///
    /// Returns the values the callable pushed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke(
        &mut self,
        callable: &NativeFn,
        frame: FrameInfo,
        args: Vec<Value>,
    ) -> ScriptResult<Vec<Value>> {
        if self.frames.depth() >= self.config.frame_limit {
            return Err(self.fail(NativeError::StackOverflow {
                limit: self.config.frame_limit,
            }));
        }

        let Self {
            registry,
            stack,
            frames,
            handler,
            config,
        } = self;

        tracing::trace!(
            function = frame.name.as_deref().unwrap_or("?"),
            args = args.len(),
            depth = frames.depth(),
            "invoke"
        );
        frames.frames.push(frame);
        let previous = stack.enter(args);
        let result = protected_call_with(handler.as_mut(), &*frames, config.traceback(), || {
            let mut ctx = CallContext::new(&mut *stack, &*registry);
            callable.call(&mut ctx)
        });
        let count = *result.as_ref().unwrap_or(&0);
        let results = stack.leave(previous, count);
        frames.frames.pop();
        result.map(|_| results)
    }

    // =========================================================================
    // Lookup helpers
    // =========================================================================

    fn fail(&mut self, cause: NativeError) -> ScriptError {
        report(
            self.handler.as_mut(),
            &self.frames,
            self.config.traceback(),
            cause,
        )
    }

    fn resolve(&mut self, key: TypeKey, name: &str) -> ScriptResult<Member> {
        match self.registry.resolve_member(key, name) {
            Some((_, member)) => Ok(member.clone()),
            None => {
                let type_name = self.registry.display_name(key);
                Err(self.fail(NativeError::MemberNotFound {
                    type_name,
                    member: name.to_string(),
                }))
            }
        }
    }

    fn resolve_on_receiver(&mut self, receiver: &Value, name: &str) -> ScriptResult<Member> {
        match receiver_key(receiver) {
            Some(key) => self.resolve(key, name),
            None => {
                let actual = self.registry.describe(receiver);
                Err(self.fail(NativeError::invalid_receiver(
                    "object",
                    format!("got {} while looking up '{}'", actual, name),
                )))
            }
        }
    }

    fn callable(
        &mut self,
        key: Option<TypeKey>,
        name: &str,
        member: Member,
    ) -> ScriptResult<NativeFn> {
        match member {
            Member::Function(function) => Ok(function),
            Member::Property { .. } | Member::Value(_) => {
                let type_name = key
                    .map(|key| self.registry.display_name(key))
                    .unwrap_or_default();
                Err(self.fail(NativeError::NotCallable {
                    type_name,
                    member: name.to_string(),
                }))
            }
        }
    }

    fn receiver_name(&self, receiver: &Value) -> String {
        self.registry.describe(receiver)
    }
}

fn receiver_key(receiver: &Value) -> Option<TypeKey> {
    receiver.as_object().map(|boxed| boxed.type_key())
}

impl fmt::Debug for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptState")
            .field("registry", &self.registry)
            .field("stack", &self.stack.len())
            .field("depth", &self.frames.depth())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
