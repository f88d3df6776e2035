//! Capabilities the embedded runtime exposes to native code.
//!
//! The binder never owns the runtime. It only needs:
//!
//! - [`Stack`]: typed access to the current call's arguments and a way to push results
//! - [`Introspect`]: per-frame debug information for diagnostics
//!
//! Raising an error is plain `Result` propagation: a native call that returns
//! `Err(NativeError)` unwinds to the nearest protected call.

use std::fmt;

use bitflags::bitflags;

use crate::error::DebugError;
use crate::value::Value;

/// The runtime's value stack, as seen from inside one native call.
///
/// Indices are 1-based and relative to the current call: slot 1 is the first
/// value the caller pushed.
pub trait Stack {
    /// Number of values in the current call's window.
    fn top(&self) -> usize;

    /// Value at a 1-based index, or `None` past the top.
    fn get(&self, index: usize) -> Option<&Value>;

    /// Push a result.
    fn push(&mut self, value: Value);
}

/// A plain vector works as a stack whose window starts at its first element.
impl Stack for Vec<Value> {
    fn top(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> Option<&Value> {
        index.checked_sub(1).and_then(|i| self.as_slice().get(i))
    }

    fn push(&mut self, value: Value) {
        Vec::push(self, value);
    }
}

bitflags! {
    /// Which frame attributes a diagnostic walk requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFields: u8 {
        /// Source descriptor and defined-line range
        const SOURCE = 1 << 0;
        /// Current line
        const LINE = 1 << 1;
        /// Declared name and name kind
        const NAME = 1 << 2;
        /// Upvalue count
        const UPVALUES = 1 << 3;
    }
}

impl Default for FrameFields {
    fn default() -> Self {
        FrameFields::all()
    }
}

/// How the name of a frame's function was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NameKind {
    Global,
    Local,
    Method,
    Field,
    Upvalue,
    #[default]
    Unknown,
}

impl NameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NameKind::Global => "global",
            NameKind::Local => "local",
            NameKind::Method => "method",
            NameKind::Field => "field",
            NameKind::Upvalue => "upvalue",
            NameKind::Unknown => "",
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of function a frame is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallKind {
    /// A script function
    #[default]
    Script,
    /// A native function entered through dispatch
    Native,
    /// The main chunk
    Main,
    /// A tail call whose caller frame is gone
    Tail,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Script => "script",
            CallKind::Native => "native",
            CallKind::Main => "main",
            CallKind::Tail => "tail",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debug information about one call-stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub name: Option<String>,
    pub name_kind: NameKind,
    pub call_kind: CallKind,
    /// Source the function was defined in; files start with `@`
    pub source: String,
    pub short_source: String,
    pub current_line: Option<u32>,
    pub line_defined: Option<u32>,
    pub last_line_defined: Option<u32>,
    pub upvalues: u32,
}

impl FrameInfo {
    /// Frame for a native function entered through dispatch.
    pub fn native(name: impl Into<String>, name_kind: NameKind) -> Self {
        Self {
            name: Some(name.into()),
            name_kind,
            call_kind: CallKind::Native,
            source: "=[native]".to_string(),
            short_source: "[native]".to_string(),
            ..Self::default()
        }
    }

    /// Frame for a script function defined in `source`.
    pub fn script(source: impl Into<String>) -> Self {
        let source = source.into();
        let short_source = short_source(&source);
        Self {
            call_kind: CallKind::Script,
            source,
            short_source,
            ..Self::default()
        }
    }

    /// Frame for the main chunk of `source`.
    pub fn main(source: impl Into<String>) -> Self {
        Self {
            call_kind: CallKind::Main,
            ..Self::script(source)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>, kind: NameKind) -> Self {
        self.name = Some(name.into());
        self.name_kind = kind;
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.current_line = Some(line);
        self
    }

    pub fn defined_at(mut self, first: u32, last: u32) -> Self {
        self.line_defined = Some(first);
        self.last_line_defined = Some(last);
        self
    }

    pub fn with_upvalues(mut self, upvalues: u32) -> Self {
        self.upvalues = upvalues;
        self
    }

    /// Copy of this frame keeping only the requested attributes.
    pub fn select(&self, fields: FrameFields) -> Self {
        let mut frame = Self {
            call_kind: self.call_kind,
            ..Self::default()
        };
        if fields.contains(FrameFields::SOURCE) {
            frame.source = self.source.clone();
            frame.short_source = self.short_source.clone();
            frame.line_defined = self.line_defined;
            frame.last_line_defined = self.last_line_defined;
        }
        if fields.contains(FrameFields::LINE) {
            frame.current_line = self.current_line;
        }
        if fields.contains(FrameFields::NAME) {
            frame.name = self.name.clone();
            frame.name_kind = self.name_kind;
        }
        if fields.contains(FrameFields::UPVALUES) {
            frame.upvalues = self.upvalues;
        }
        frame
    }
}

fn short_source(source: &str) -> String {
    match source.strip_prefix('@') {
        Some(path) => path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .to_string(),
        None => {
            let line = source.lines().next().unwrap_or_default();
            format!("[string \"{}\"]", line)
        }
    }
}

/// Debug introspection over the runtime's call stack.
pub trait Introspect {
    /// Frame at `level`, where level 0 is the innermost running function.
    ///
    /// Returns `None` past the outermost frame and `Some(Err(_))` if the
    /// runtime cannot describe an existing frame.
    fn frame(&self, level: usize, fields: FrameFields) -> Option<Result<FrameInfo, DebugError>>;
}
