//! Error boundary between native dispatch and the embedding application.
//!
//! [`protected_call`] runs native code, captures both `Err` results and
//! panics, and turns them into a [`ScriptError`] whose message is produced by
//! an [`ErrorHandler`] walking the runtime's call stack.
//!
//! # Example
//!
//! ```ignore
//! let mut handler = DefaultErrorHandler::new();
//! let result = protected_call(&mut handler, &frames, || native.call(&mut ctx));
//! if let Err(err) = result {
//!     eprintln!("{err}");
//! }
//! ```

use std::any::Any;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};

use stackbind_core::{DebugError, FrameFields, FrameInfo, Introspect, NativeError};
use thiserror::Error;

/// A failed native call, as seen by the embedding application.
///
/// `Display` is the formatted diagnostic.
#[derive(Debug, Clone, Error)]
#[error("{diagnostic}")]
pub struct ScriptError {
    /// The error raised by native code
    #[source]
    pub cause: NativeError,
    /// Traceback rendered by the error handler
    pub diagnostic: String,
    /// Set when the call stack could not be fully described
    pub introspection: Option<DebugError>,
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// How much of the call stack a traceback covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracebackOptions {
    /// Frame attributes requested from the runtime
    pub fields: FrameFields,
    /// Maximum number of frames passed to the handler
    pub limit: usize,
}

impl Default for TracebackOptions {
    fn default() -> Self {
        Self {
            fields: FrameFields::all(),
            limit: usize::MAX,
        }
    }
}

/// Result of walking the call stack for one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    /// Frames passed to [`ErrorHandler::stack_element`]
    pub frames: usize,
    pub introspection: Option<DebugError>,
}

/// Formats a traceback for a failed call.
///
/// The boundary calls `begin` with the error message, `stack_element` once
/// per frame from the innermost (level 0) outwards, then `end` for the final
/// text.
pub trait ErrorHandler {
    fn begin(&mut self, error: &str);

    fn stack_element(&mut self, level: usize, frame: &FrameInfo);

    fn end(&mut self) -> String;

    /// Walk `frames` and produce the diagnostic for `error`.
    ///
    /// A frame the runtime cannot describe stops the walk; the diagnostic is
    /// still built from the frames seen so far.
    fn process(
        &mut self,
        error: &str,
        frames: &dyn Introspect,
        options: TracebackOptions,
    ) -> Diagnostic {
        self.begin(error);
        let mut introspection = None;
        let mut level = 0;
        while level < options.limit {
            match frames.frame(level, options.fields) {
                None => break,
                Some(Ok(frame)) => self.stack_element(level, &frame),
                Some(Err(err)) => {
                    tracing::error!(level, error = %err, "debug introspection failed");
                    introspection = Some(err);
                    break;
                }
            }
            level += 1;
        }
        if level == options.limit && frames.frame(level, FrameFields::empty()).is_some() {
            tracing::trace!(limit = options.limit, "traceback truncated");
        }
        Diagnostic {
            message: self.end(),
            frames: level,
            introspection,
        }
    }
}

/// Plain-text traceback, one line per frame.
///
/// ```text
/// Script Exception:
/// -------------------------------------------------------
/// Error:
///     Error number of arguments (given 0 -> expected 2)
/// Traceback:
///      [ 0 (native) ] @ move(method)
///      [ 1 (script) ] game.lua:14 @ update(global)
/// ```
#[derive(Debug, Default)]
pub struct DefaultErrorHandler {
    out: String,
}

impl DefaultErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn begin(&mut self, error: &str) {
        self.out.clear();
        let _ = writeln!(self.out, "Script Exception:");
        let _ = writeln!(
            self.out,
            "-------------------------------------------------------"
        );
        let _ = writeln!(self.out, "Error:\n\t{}", error);
        let _ = writeln!(self.out, "Traceback:");
    }

    fn stack_element(&mut self, level: usize, frame: &FrameInfo) {
        let _ = write!(self.out, "\t [ {} ({}) ] ", level, frame.call_kind);
        if let Some(line) = frame.current_line.filter(|line| *line > 0) {
            let _ = write!(self.out, "{}:{}", frame.short_source, line);
        }
        if let Some(name) = &frame.name {
            let _ = write!(self.out, " @ {}", name);
            if !frame.name_kind.as_str().is_empty() {
                let _ = write!(self.out, "({})", frame.name_kind);
            }
        }
        self.out.push('\n');
    }

    fn end(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

/// Emits one `tracing` event per frame and returns a one-line message.
#[derive(Debug, Default)]
pub struct TracingErrorHandler {
    error: String,
    frames: usize,
}

impl TracingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorHandler for TracingErrorHandler {
    fn begin(&mut self, error: &str) {
        self.error = error.to_string();
        self.frames = 0;
        tracing::error!(error, "native call failed");
    }

    fn stack_element(&mut self, level: usize, frame: &FrameInfo) {
        self.frames += 1;
        tracing::error!(
            level,
            kind = %frame.call_kind,
            source = %frame.short_source,
            line = ?frame.current_line,
            name = ?frame.name,
            name_kind = %frame.name_kind,
            "traceback frame"
        );
    }

    fn end(&mut self) -> String {
        format!("{} ({} frames)", std::mem::take(&mut self.error), self.frames)
    }
}

/// Run `f` behind the error boundary with default traceback options.
pub fn protected_call<T, F>(
    handler: &mut dyn ErrorHandler,
    frames: &dyn Introspect,
    f: F,
) -> ScriptResult<T>
where
    F: FnOnce() -> Result<T, NativeError>,
{
    protected_call_with(handler, frames, TracebackOptions::default(), f)
}

/// Run `f` behind the error boundary.
///
/// Errors and panics raised by `f` are reported through `handler` while the
/// call stack is still intact.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn protected_call_with<T, F>(
    handler: &mut dyn ErrorHandler,
    frames: &dyn Introspect,
    options: TracebackOptions,
    f: F,
) -> ScriptResult<T>
where
    F: FnOnce() -> Result<T, NativeError>,
{
    let cause = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => err,
        Err(payload) => NativeError::Panic {
            message: panic_message(payload.as_ref()),
        },
    };
    Err(report(handler, frames, options, cause))
}

/// Build the [`ScriptError`] for `cause` from the current call stack.
pub fn report(
    handler: &mut dyn ErrorHandler,
    frames: &dyn Introspect,
    options: TracebackOptions,
    cause: NativeError,
) -> ScriptError {
    let diagnostic = handler.process(&cause.to_string(), frames, options);
    tracing::debug!(error = %cause, frames = diagnostic.frames, "reported native error");
    ScriptError {
        cause,
        diagnostic: diagnostic.message,
        introspection: diagnostic.introspection,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackbind_core::NameKind;

    struct Frames(Vec<Result<FrameInfo, DebugError>>);

    impl Introspect for Frames {
        fn frame(&self, level: usize, fields: FrameFields) -> Option<Result<FrameInfo, DebugError>> {
            self.0
                .get(level)
                .map(|frame| frame.clone().map(|f| f.select(fields)))
        }
    }

    fn sample_frames() -> Frames {
        Frames(vec![
            Ok(FrameInfo::native("move", NameKind::Method)),
            Ok(FrameInfo::script("@scripts/game.lua")
                .with_name("update", NameKind::Global)
                .at_line(14)),
            Ok(FrameInfo::main("@scripts/main.lua").at_line(2)),
        ])
    }

    #[test]
    fn default_handler_formats_traceback() {
        let mut handler = DefaultErrorHandler::new();
        let diagnostic = handler.process("boom", &sample_frames(), TracebackOptions::default());

        assert_eq!(diagnostic.frames, 3);
        assert!(diagnostic.introspection.is_none());
        let text = diagnostic.message;
        assert!(text.starts_with("Script Exception:\n"));
        assert!(text.contains("Error:\n\tboom\n"));
        assert!(text.contains("\t [ 0 (native) ]  @ move(method)\n"));
        assert!(text.contains("\t [ 1 (script) ] game.lua:14 @ update(global)\n"));
        assert!(text.contains("\t [ 2 (main) ] main.lua:2\n"));
    }

    #[test]
    fn traceback_limit_stops_walk() {
        let mut handler = DefaultErrorHandler::new();
        let options = TracebackOptions {
            limit: 1,
            ..TracebackOptions::default()
        };
        let diagnostic = handler.process("boom", &sample_frames(), options);
        assert_eq!(diagnostic.frames, 1);
        assert!(!diagnostic.message.contains("[ 1 "));
    }

    #[test]
    fn field_requests_are_forwarded() {
        let mut handler = DefaultErrorHandler::new();
        let options = TracebackOptions {
            fields: FrameFields::NAME,
            ..TracebackOptions::default()
        };
        let diagnostic = handler.process("boom", &sample_frames(), options);
        assert!(!diagnostic.message.contains("game.lua"));
        assert!(diagnostic.message.contains("@ update(global)"));
    }

    #[test]
    fn introspection_failure_keeps_collected_frames() {
        let frames = Frames(vec![
            Ok(FrameInfo::native("move", NameKind::Method)),
            Err(DebugError {
                level: 1,
                message: "frame vanished".into(),
            }),
            Ok(FrameInfo::main("@never.lua")),
        ]);
        let mut handler = DefaultErrorHandler::new();
        let diagnostic = handler.process("boom", &frames, TracebackOptions::default());

        assert_eq!(diagnostic.frames, 1);
        assert!(diagnostic.message.contains("@ move(method)"));
        assert!(!diagnostic.message.contains("never.lua"));
        assert_eq!(diagnostic.introspection.map(|e| e.level), Some(1));
    }

    #[test]
    fn protected_call_passes_values_through() {
        let mut handler = DefaultErrorHandler::new();
        let result = protected_call(&mut handler, &sample_frames(), || Ok(7));
        assert_eq!(result.ok(), Some(7));
    }

    #[test]
    fn protected_call_reports_errors() {
        let mut handler = DefaultErrorHandler::new();
        let result: ScriptResult<()> = protected_call(&mut handler, &sample_frames(), || {
            Err(NativeError::ArgumentCount {
                given: 0,
                expected: 2,
            })
        });
        let err = result.unwrap_err();
        assert!(matches!(err.cause, NativeError::ArgumentCount { .. }));
        assert!(err.to_string().contains("(given 0 -> expected 2)"));
        assert!(err.to_string().contains("Traceback:"));
    }

    #[test]
    fn protected_call_traps_panics() {
        let mut handler = DefaultErrorHandler::new();
        let result: ScriptResult<()> =
            protected_call(&mut handler, &sample_frames(), || panic!("native blew up"));
        match result {
            Err(ScriptError {
                cause: NativeError::Panic { message },
                ..
            }) => assert_eq!(message, "native blew up"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tracing_handler_returns_one_line() {
        let mut handler = TracingErrorHandler::new();
        let diagnostic = handler.process("boom", &sample_frames(), TracebackOptions::default());
        assert_eq!(diagnostic.message, "boom (3 frames)");
    }
}
