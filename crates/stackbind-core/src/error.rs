//! Error types shared by the runtime and the binder.

use thiserror::Error;

/// Errors that can occur when converting between dynamic values and native types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The slot holds a value of another type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Integer does not fit in the target type
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow { value: i64, target_type: &'static str },

    /// Float cannot be represented in the target type
    #[error("float conversion error: value {value} cannot be represented as {target_type}")]
    FloatConversion { value: f64, target_type: &'static str },

    /// The boxed object was already released by the collector
    #[error("object of type {type_name} has been released")]
    Released { type_name: String },

    /// A referenced object was destroyed by its owner
    #[error("referenced object of type {type_name} no longer exists")]
    Dangling { type_name: String },

    /// The object is mutably borrowed elsewhere in the current call
    #[error("object of type {type_name} is already borrowed")]
    AlreadyBorrowed { type_name: String },
}

/// Errors raised by native dispatch.
///
/// Every variant propagates to the runtime as a single error; the call
/// boundary turns it into a formatted diagnostic.
#[derive(Debug, Clone, Error)]
pub enum NativeError {
    /// Stack depth at call time did not match the bound signature
    #[error("Error number of arguments (given {given} -> expected {expected})")]
    ArgumentCount { given: usize, expected: usize },

    /// A parameter could not be converted to its native type
    #[error("invalid argument #{index}: {source}")]
    InvalidArgument {
        index: usize,
        #[source]
        source: ConversionError,
    },

    /// Slot 1 does not hold a usable receiver for this method
    #[error("Invalid object for this method (expected {expected}): {message}")]
    InvalidReceiver { expected: String, message: String },

    /// A constructor or method targets a type that was never declared
    #[error("Class {name} is not available")]
    UnregisteredType { name: String },

    /// No registered type carries this name
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    /// Member lookup failed on the type and all of its bases
    #[error("'{member}' is not a member of {type_name}")]
    MemberNotFound { type_name: String, member: String },

    /// The member exists but cannot be called
    #[error("member '{member}' of {type_name} is not callable")]
    NotCallable { type_name: String, member: String },

    /// The member exists but is not a field
    #[error("member '{member}' of {type_name} is not a field")]
    NotAField { type_name: String, member: String },

    /// Property has no setter
    #[error("field '{member}' of {type_name} is read-only")]
    ReadOnlyField { type_name: String, member: String },

    /// Nested native calls exceeded the configured limit
    #[error("stack overflow: more than {limit} nested calls")]
    StackOverflow { limit: usize },

    /// Conversion failure outside of parameter marshalling
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Native code panicked
    #[error("native function panicked: {message}")]
    Panic { message: String },

    /// Generic native error
    #[error("{message}")]
    Other { message: String },
}

impl NativeError {
    /// Create an "invalid receiver" error.
    pub fn invalid_receiver(expected: impl Into<String>, message: impl Into<String>) -> Self {
        NativeError::InvalidReceiver {
            expected: expected.into(),
            message: message.into(),
        }
    }

    /// Create a generic native error.
    pub fn other(message: impl Into<String>) -> Self {
        NativeError::Other {
            message: message.into(),
        }
    }
}

/// The runtime's debug interface failed while a call stack was being walked.
///
/// This means the runtime and the binder disagree about the shape of the call
/// stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("debug introspection failed at level {level}: {message}")]
pub struct DebugError {
    pub level: usize,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_count_names_both_counts() {
        let err = NativeError::ArgumentCount {
            given: 0,
            expected: 2,
        };
        let message = err.to_string();
        assert!(message.contains("given 0"));
        assert!(message.contains("expected 2"));
    }

    #[test]
    fn invalid_argument_carries_index_and_types() {
        let err = NativeError::InvalidArgument {
            index: 2,
            source: ConversionError::TypeMismatch {
                expected: "int".into(),
                actual: "string".into(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("#2"));
        assert!(message.contains("int"));
        assert!(message.contains("string"));
    }

    #[test]
    fn conversion_error_converts_into_native_error() {
        let err: NativeError = ConversionError::Released {
            type_name: "Point".into(),
        }
        .into();
        assert!(matches!(err, NativeError::Conversion(_)));
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn invalid_receiver_helper() {
        let err = NativeError::invalid_receiver("Point", "no receiver");
        assert!(err.to_string().contains("Invalid object for this method"));
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn unregistered_type_message() {
        let err = NativeError::UnregisteredType {
            name: "Widget".into(),
        };
        assert_eq!(err.to_string(), "Class Widget is not available");
    }

    #[test]
    fn debug_error_message() {
        let err = DebugError {
            level: 3,
            message: "no frame info".into(),
        };
        assert!(err.to_string().contains("level 3"));
    }
}
