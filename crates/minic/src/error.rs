//! Error types for parsing and evaluation.
//!
//! Both layers hand-roll plain enums with `Display` impls: parse errors
//! carry a file and line (the front end knows where it is), run errors do
//! not (the evaluator aborts on the first semantic violation and names the
//! violation, not the source location).

use std::error::Error;
use std::fmt;

/// A front-end failure, located in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub kind: ParseErrorKind,
}

/// What went wrong while lexing or parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedChar(char),
    UnterminatedComment,
    UnterminatedChar,
    BadEscape(char),
    IntOutOfRange,
    Expected { expected: &'static str, found: String },
    UnknownName(String),
    InvalidAssignTarget,
    CallTarget,
    UnnamedParameter,
    FileScopeVla,
    BadGlobalInit,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.kind)
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedChar(c) => write!(f, "unexpected character {c:?}"),
            Self::UnterminatedComment => write!(f, "unterminated block comment"),
            Self::UnterminatedChar => write!(f, "unterminated character literal"),
            Self::BadEscape(c) => write!(f, "unknown escape sequence \\{c}"),
            Self::IntOutOfRange => write!(f, "integer literal out of range"),
            Self::Expected { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::UnknownName(name) => write!(f, "unknown name `{name}`"),
            Self::InvalidAssignTarget => {
                write!(f, "assignment target must be a variable, subscript, or dereference")
            }
            Self::CallTarget => write!(f, "called expression is not a function name"),
            Self::UnnamedParameter => write!(f, "parameter in a function definition must be named"),
            Self::FileScopeVla => write!(f, "variable-length array at file scope"),
            Self::BadGlobalInit => {
                write!(f, "global initialiser must be an integer or character literal")
            }
        }
    }
}

impl Error for ParseError {}

/// A fatal evaluation failure; execution does not continue past one.
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// Integer division or remainder with a zero divisor.
    DivisionByZero,
    /// `FREE` of an address the allocator never issued (or already released).
    UnknownFree(i64),
    /// A name was referenced before anything bound it.
    UnboundVariable(String),
    /// A primitive consumed the cache slot of a node that was never
    /// evaluated; the payload names the consuming operand.
    UncachedValue(&'static str),
    /// `return` with no frame left to pop.
    StackUnderflow,
    /// A null or negative word was used as an address.
    BadAddress(i64),
    /// A load or store fell outside the owning byte store.
    OutOfBounds { arena: &'static str, addr: i64 },
    /// A negative (or unrepresentable) allocation or array length.
    NegativeSize(i64),
    /// No function named `main` in the translation unit.
    MissingEntry,
    /// A call to a prototype that has no body and is not an intrinsic.
    UndefinedFunction(String),
    /// `GET` could not produce an integer (end of input, unparsable token,
    /// or an I/O failure underneath).
    Input(String),
    /// An invariant the front end is supposed to uphold was violated.
    Internal(&'static str),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::UnknownFree(addr) => {
                write!(f, "FREE of address {addr} which was never allocated")
            }
            Self::UnboundVariable(name) => write!(f, "variable `{name}` is not bound"),
            Self::UncachedValue(what) => {
                write!(f, "{what} was never evaluated")
            }
            Self::StackUnderflow => write!(f, "return with an empty call stack"),
            Self::BadAddress(addr) => write!(f, "invalid address {addr}"),
            Self::OutOfBounds { arena, addr } => {
                write!(f, "address {addr} is outside the {arena} store")
            }
            Self::NegativeSize(size) => write!(f, "invalid allocation size {size}"),
            Self::MissingEntry => write!(f, "no `main` function in the translation unit"),
            Self::UndefinedFunction(name) => {
                write!(f, "call to `{name}` which has no body")
            }
            Self::Input(reason) => write!(f, "GET failed: {reason}"),
            Self::Internal(what) => write!(f, "internal error: {what}"),
        }
    }
}

impl Error for RunError {}

/// Result alias used throughout evaluation.
pub type RunResult<T> = Result<T, RunError>;

/// Either half of the pipeline failing, for callers that run both.
#[derive(Debug, Clone, PartialEq)]
pub enum MinicError {
    Parse(ParseError),
    Run(RunError),
}

impl fmt::Display for MinicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::Run(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MinicError {}

impl From<ParseError> for MinicError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<RunError> for MinicError {
    fn from(err: RunError) -> Self {
        Self::Run(err)
    }
}
