//! Runtime error taxonomy and results surfaced to the host.
//!
//! Every fallible operation in the interpreter returns [`RunResult`]. A
//! [`RunError`] is either a native error (an error-kind symbol plus a
//! message, not yet reified as a Smile object) or a thrown Smile value that
//! is already unwinding toward the nearest protected boundary. The VM turns
//! native errors into user objects (with `kind`, `message`, and `stack-trace`
//! properties) at its single throw point, so natives never need heap access
//! to fail.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::value::Value;

/// Result type alias for operations that can raise a Smile error.
pub type RunResult<T> = Result<T, RunError>;

/// The error kinds surfaced as symbols on thrown error objects.
///
/// The string form of each variant is its canonical Smile spelling, e.g.
/// `ErrorKind::NativeMethodError` ↔ `"native-method-error"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    CompileError,
    ConfigurationError,
    EvalError,
    ExecError,
    JsonError,
    LexerError,
    LoadError,
    NativeMethodError,
    ObjectSecurityError,
    PostConditionAssertion,
    PreConditionAssertion,
    PropertyError,
    SyntaxError,
    SystemException,
    TypeAssertion,
    UserException,
}

/// An in-flight runtime error.
#[derive(Debug, Clone)]
pub enum RunError {
    /// A native-level failure that has not yet been reified as a Smile
    /// object. The VM attaches a stack trace and builds the error object at
    /// its throw point.
    Raise {
        /// Which error-kind symbol the resulting object will carry.
        kind: ErrorKind,
        /// Human-readable message.
        message: String,
    },
    /// A Smile value already thrown and unwinding. Carries the (boxed)
    /// error object, stack trace included.
    Thrown(Value),
}

impl RunError {
    /// Builds a native error of the given kind.
    pub fn raise(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Raise {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for `native-method-error`, the kind used by argument and
    /// range violations inside built-in methods.
    pub fn native(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::NativeMethodError, message)
    }

    /// Shorthand for `eval-error`.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::EvalError, message)
    }

    /// Shorthand for `property-error`.
    pub fn property(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::PropertyError, message)
    }

    /// Shorthand for `configuration-error` (bad regex flags and the like).
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::ConfigurationError, message)
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raise { kind, message } => write!(f, "{kind}: {message}"),
            Self::Thrown(_) => write!(f, "uncaught Smile exception"),
        }
    }
}

/// A single diagnostic produced by the lexer or parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseMessage {
    /// Where the problem was detected.
    pub position: SourcePos,
    /// Human-readable description.
    pub message: String,
}

impl Display for ParseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.position.line > 0 {
            write!(f, "line {}:{}: {}", self.position.line, self.position.column, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// A compact line/column pair attached to tokens and parsed list cells.
///
/// Both fields are 1-based; zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub const UNKNOWN: Self = Self { line: 0, column: 0 };

    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Index into a compiled unit's source-location table. Zero is "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct LocId(pub u32);

impl LocId {
    pub const UNKNOWN: Self = Self(0);
}

/// A full source-location record stored in compiled tables and referenced
/// by bytecode instructions via [`LocId`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Filename, if known.
    pub filename: Option<String>,
    /// 1-based line, or 0 if unknown.
    pub line: u32,
    /// 1-based column, or 0 if unknown.
    pub column: u32,
    /// Byte offset into the original source text.
    pub offset: u32,
}

/// The outcome of a top-level evaluation, as seen by the host.
#[derive(Debug)]
pub enum EvalResult {
    /// Normal completion; carries the resulting value.
    Value(Value),
    /// An uncaught exception; carries the thrown error object.
    Exception(Value),
    /// Parsing failed; carries the accumulated diagnostics.
    ParseErrors(Vec<ParseMessage>),
    /// Execution hit a `Brk` instruction and control returned to the host.
    /// The VM can be resumed.
    Break,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_round_trip_their_spellings() {
        assert_eq!(ErrorKind::NativeMethodError.to_string(), "native-method-error");
        assert_eq!(ErrorKind::EvalError.to_string(), "eval-error");
        assert_eq!("property-error".parse::<ErrorKind>().unwrap(), ErrorKind::PropertyError);
        assert_eq!("type-assertion".parse::<ErrorKind>().unwrap(), ErrorKind::TypeAssertion);
    }
}
