//! Error taxonomy (§7).
//!
//! Every pass returns its own narrow error type so callers inside the
//! pipeline can match on exactly the kinds that pass can produce; [`CompileError`]
//! is the facade-level aggregate that the outer `compile` entry point returns,
//! the same way `ReplError` aggregates per-stage errors elsewhere in this
//! codebase's error layering.

use std::fmt;

use crate::span::Location;

/// Errors the lexer (C1) can raise.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnexpectedChar(char),
    UnterminatedString,
    InvalidEscape(char),
    InvalidNumber,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self.kind {
            LexErrorKind::UnexpectedChar(c) => format!("unexpected character {c:?}"),
            LexErrorKind::UnterminatedString => "unterminated string literal".to_owned(),
            LexErrorKind::InvalidEscape(c) => format!("invalid escape sequence '\\{c}'"),
            LexErrorKind::InvalidNumber => "invalid number literal".to_owned(),
        };
        write!(f, "{}: lexError: {msg}", self.location)
    }
}

impl std::error::Error for LexError {}

/// Errors the parser (C2) can raise.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: parseError: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}

/// The closed set of semantic-error kinds produced from lowering (C3)
/// through cache analysis (C8). One Rust enum covers every pass after
/// parsing because the spec's taxonomy does not distinguish them by pass,
/// only by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum SemaErrorKind {
    UnknownBundle,
    UnknownStrand,
    UnknownSpindle,
    UnknownIdentifier,
    DuplicateSpindle,
    MissingReturnIndex,
    WidthMismatch,
    RangeOutOfBounds,
    RangeOutsidePattern,
    BareStrandOutsidePattern,
    InvalidRemapArg,
    CircularDependency,
    InvalidExpression,
    Internal,
}

/// Errors raised by the lowerer, dependency graph, annotation pass,
/// partitioner, IR rewriter, and cache analyzer (C3-C8).
#[derive(Debug, Clone, PartialEq)]
pub struct SemaError {
    pub kind: SemaErrorKind,
    pub location: Option<Location>,
    pub message: String,
}

impl SemaError {
    #[must_use]
    pub fn new(kind: SemaErrorKind, location: Option<Location>, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }

    /// An `internal` error: a pipeline invariant was violated. Per §7 these
    /// must carry enough context (pass name, bundle name) to debug without
    /// ever being mistaken for a user-facing mistake.
    #[must_use]
    pub fn internal(pass: &str, context: impl fmt::Display) -> Self {
        Self {
            kind: SemaErrorKind::Internal,
            location: None,
            message: format!("internal error in {pass}: {context}"),
        }
    }
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str: &'static str = self.kind.into();
        match self.location {
            Some(loc) => write!(f, "{loc}: {kind_str}: {}", self.message),
            None => write!(f, "{kind_str}: {}", self.message),
        }
    }
}

impl std::error::Error for SemaError {}

/// The aggregate error type returned by the facade (C10).
///
/// Carries exactly one of the pass-local errors above, still rendered with
/// the `line:column: kind: message` contract §7 requires of the facade
/// regardless of which pass raised it.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Sema(SemaError),
}

impl CompileError {
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Lex(e) => Some(e.location),
            Self::Parse(e) => Some(e.location),
            Self::Sema(e) => e.location,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Sema(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(error: LexError) -> Self {
        Self::Lex(error)
    }
}

impl From<ParseError> for CompileError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<SemaError> for CompileError {
    fn from(error: SemaError) -> Self {
        Self::Sema(error)
    }
}
