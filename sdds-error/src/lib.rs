#![deny(missing_docs)]
#![feature(error_generic_member_access)]

//! Error handling for the SDDS toolkit.
//!
//! Every fallible operation in the workspace returns an [`SddsResult`]. Errors carry one of the
//! kinds in [`ErrorKind`], a message, and a captured backtrace. Callers add context as errors
//! propagate, building the same error stack the command-line utilities print on failure.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::io::Write;
use std::ops::Deref;
use std::{fmt, io};

use thiserror::Error;

/// A string that may be borrowed from a static or owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The closed set of failure kinds surfaced by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation invoked outside the allowed dataset state.
    WrongState,
    /// A definition with the same name already exists.
    DuplicateName,
    /// A named entity does not exist.
    NotFound,
    /// A type tag is outside the closed set, or not acceptable here.
    InvalidType,
    /// Units do not match the caller's constraint.
    WrongUnits,
    /// A value does not have the type the operation requires.
    TypeMismatch,
    /// A value or index is outside the permitted range.
    ValueOutOfRange,
    /// The header of a stream could not be parsed.
    MalformedHeader,
    /// A page ended before all of its data was read.
    TruncatedPage,
    /// The input ended unexpectedly.
    UnexpectedEof,
    /// An RPN stack had too few items.
    StackUnderflow,
    /// An RPN stack exceeded its depth.
    StackOverflow,
    /// An RPN division or modulus by zero.
    DivisionByZero,
    /// An RPN token could not be resolved.
    UnknownToken,
    /// An RPN evaluation executed more opcodes than allowed.
    CycleLimitExceeded,
    /// A sorter was handed no rows.
    EmptyInput,
    /// A sorter objective was not numeric.
    NonNumericObjective,
    /// Storage could not be reserved.
    AllocationFailure,
    /// Any other invalid argument.
    InvalidArgument,
    /// An underlying I/O failure.
    Io,
}

/// The top-level error type for the SDDS toolkit.
#[derive(Error)]
#[non_exhaustive]
pub enum SddsError {
    /// Operation invoked outside the allowed dataset state.
    #[error("wrong state: {0}")]
    WrongState(ErrString, Backtrace),
    /// A definition with the same name already exists.
    #[error("duplicate name: {0}")]
    DuplicateName(ErrString, Backtrace),
    /// A named entity does not exist.
    #[error("not found: {0}")]
    NotFound(ErrString, Backtrace),
    /// A type tag is outside the closed set, or not acceptable here.
    #[error("invalid type: {0}")]
    InvalidType(ErrString, Backtrace),
    /// Units do not match the caller's constraint.
    #[error("wrong units: {0}")]
    WrongUnits(ErrString, Backtrace),
    /// A value does not have the type the operation requires.
    #[error("type mismatch: {0}")]
    TypeMismatch(ErrString, Backtrace),
    /// A value or index is outside the permitted range.
    #[error("value out of range: {0}")]
    ValueOutOfRange(ErrString, Backtrace),
    /// The header of a stream could not be parsed.
    #[error("malformed header: {0}")]
    MalformedHeader(ErrString, Backtrace),
    /// A page ended before all of its data was read.
    #[error("truncated page: {0}")]
    TruncatedPage(ErrString, Backtrace),
    /// The input ended unexpectedly.
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(ErrString, Backtrace),
    /// An RPN stack had too few items.
    #[error("stack underflow: {0}")]
    StackUnderflow(ErrString, Backtrace),
    /// An RPN stack exceeded its depth.
    #[error("stack overflow: {0}")]
    StackOverflow(ErrString, Backtrace),
    /// An RPN division or modulus by zero.
    #[error("division by zero: {0}")]
    DivisionByZero(ErrString, Backtrace),
    /// An RPN token could not be resolved.
    #[error("unknown token: {0}")]
    UnknownToken(ErrString, Backtrace),
    /// An RPN evaluation executed more opcodes than allowed.
    #[error("cycle limit exceeded: {0}")]
    CycleLimitExceeded(ErrString, Backtrace),
    /// A sorter was handed no rows.
    #[error("empty input: {0}")]
    EmptyInput(ErrString, Backtrace),
    /// A sorter objective was not numeric.
    #[error("non-numeric objective: {0}")]
    NonNumericObjective(ErrString, Backtrace),
    /// Storage could not be reserved.
    #[error("allocation failure: {0}")]
    AllocationFailure(ErrString, Backtrace),
    /// Any other invalid argument.
    #[error("{0}")]
    InvalidArgument(ErrString, Backtrace),
    /// An underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A wrapped error with additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<SddsError>),
}

impl SddsError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        SddsError::Context(msg.into(), Box::new(self))
    }

    /// The kind of the innermost error, looking through any context layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SddsError::WrongState(..) => ErrorKind::WrongState,
            SddsError::DuplicateName(..) => ErrorKind::DuplicateName,
            SddsError::NotFound(..) => ErrorKind::NotFound,
            SddsError::InvalidType(..) => ErrorKind::InvalidType,
            SddsError::WrongUnits(..) => ErrorKind::WrongUnits,
            SddsError::TypeMismatch(..) => ErrorKind::TypeMismatch,
            SddsError::ValueOutOfRange(..) => ErrorKind::ValueOutOfRange,
            SddsError::MalformedHeader(..) => ErrorKind::MalformedHeader,
            SddsError::TruncatedPage(..) => ErrorKind::TruncatedPage,
            SddsError::UnexpectedEof(..) => ErrorKind::UnexpectedEof,
            SddsError::StackUnderflow(..) => ErrorKind::StackUnderflow,
            SddsError::StackOverflow(..) => ErrorKind::StackOverflow,
            SddsError::DivisionByZero(..) => ErrorKind::DivisionByZero,
            SddsError::UnknownToken(..) => ErrorKind::UnknownToken,
            SddsError::CycleLimitExceeded(..) => ErrorKind::CycleLimitExceeded,
            SddsError::EmptyInput(..) => ErrorKind::EmptyInput,
            SddsError::NonNumericObjective(..) => ErrorKind::NonNumericObjective,
            SddsError::AllocationFailure(..) => ErrorKind::AllocationFailure,
            SddsError::InvalidArgument(..) => ErrorKind::InvalidArgument,
            SddsError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ErrorKind::UnexpectedEof
            }
            SddsError::Io(_) => ErrorKind::Io,
            SddsError::Context(_, inner) => inner.kind(),
        }
    }

    /// The backtrace captured where the innermost error was raised, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            SddsError::WrongState(_, bt)
            | SddsError::DuplicateName(_, bt)
            | SddsError::NotFound(_, bt)
            | SddsError::InvalidType(_, bt)
            | SddsError::WrongUnits(_, bt)
            | SddsError::TypeMismatch(_, bt)
            | SddsError::ValueOutOfRange(_, bt)
            | SddsError::MalformedHeader(_, bt)
            | SddsError::TruncatedPage(_, bt)
            | SddsError::UnexpectedEof(_, bt)
            | SddsError::StackUnderflow(_, bt)
            | SddsError::StackOverflow(_, bt)
            | SddsError::DivisionByZero(_, bt)
            | SddsError::UnknownToken(_, bt)
            | SddsError::CycleLimitExceeded(_, bt)
            | SddsError::EmptyInput(_, bt)
            | SddsError::NonNumericObjective(_, bt)
            | SddsError::AllocationFailure(_, bt)
            | SddsError::InvalidArgument(_, bt) => Some(bt),
            SddsError::Io(_) => None,
            SddsError::Context(_, inner) => inner.backtrace(),
        }
    }

    /// The messages of this error from the outermost context inwards.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = self;
        loop {
            match current {
                SddsError::Context(msg, inner) => {
                    out.push(msg.to_string());
                    current = inner;
                }
                other => {
                    out.push(other.to_string());
                    return out;
                }
            }
        }
    }
}

impl Debug for SddsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return SddsErrors as their error type.
pub type SddsResult<T> = Result<T, SddsError>;

/// How [`print_errors`] reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintErrors {
    /// Print only the outermost message.
    Terse,
    /// Print every level of the error stack.
    Verbose,
    /// Print every level of the error stack, then exit the process with a failure code.
    Exit,
}

/// Write the error stack to standard error as `Error: ...` lines.
#[allow(clippy::exit)]
pub fn print_errors(err: &SddsError, level: PrintErrors) {
    let mut stderr = io::stderr().lock();
    let messages = err.messages();
    let shown = match level {
        PrintErrors::Terse => &messages[..messages.len().min(1)],
        PrintErrors::Verbose | PrintErrors::Exit => &messages[..],
    };
    for msg in shown {
        // Nothing useful can be done if stderr itself is gone.
        let _ = writeln!(stderr, "Error: {msg}");
    }
    if level == PrintErrors::Exit {
        std::process::exit(1);
    }
}

/// A convenient macro for creating an SddsError.
#[macro_export]
macro_rules! sdds_err {
    (Context: $msg:literal, $err:expr) => {
        $crate::SddsError::Context($msg.into(), Box::new($err))
    };
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::SddsError::$variant(format!($fmt $(, $arg)*).into(), Backtrace::capture())
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::sdds_err!(InvalidArgument: $fmt $(, $arg)*)
    };
}

/// A convenient macro for returning an SddsError.
#[macro_export]
macro_rules! sdds_bail {
    ($($tt:tt)+) => {
        return Err($crate::sdds_err!($($tt)+))
    };
}
