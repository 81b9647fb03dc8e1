//! Tagged translation errors (spec §7). Every error carries `{kind, message,
//! source_position?, hint?}`; nothing is retried or partially applied — the
//! engine either produces a complete `Invocation` or returns one of these.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ErrorKind {
    #[error("expected {expected}, found {found}")]
    SyntaxError { expected: String, found: String },

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unclosed {0}")]
    UnclosedConstruct(String),

    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("{name} expects between {min} and {max} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("unsupported argument to {function}: {message}")]
    UnsupportedArgument { function: String, message: String },

    #[error("projection `{0}` is neither an aggregate nor present in GROUP BY")]
    GroupByMismatch(String),

    #[error("SELECT DISTINCT cannot be combined with an incompatible GROUP BY")]
    DistinctGroupByConflict,

    #[error("unresolved identifier `{0}`")]
    UnresolvedIdentifier(String),

    #[error("ambiguous identifier `{name}` matches {candidates:?}")]
    AmbiguousIdentifier {
        name: String,
        candidates: Vec<String>,
    },

    #[error("recursive CTE `{0}` is not expressible as a single self-referential $graphLookup")]
    UnsupportedCTE(String),

    #[error("correlated reference `{0}` escapes more than one nesting level")]
    CorrelationEscapes(String),

    #[error("{function} has no MongoDB equivalent for format specifier `{specifier}`")]
    UnsupportedFormatSpecifier { function: String, specifier: String },
}

/// A reported translation failure. Carries the tagged `kind`, an optional
/// byte offset into the original source, and an optional human-readable hint.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}")]
pub struct TranslationError {
    pub kind: ErrorKind,
    pub source_position: Option<usize>,
    pub hint: Option<String>,
}

impl TranslationError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            source_position: None,
            hint: None,
        }
    }

    pub fn at(kind: ErrorKind, position: usize) -> Self {
        Self {
            kind,
            source_position: Some(position),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ErrorKind> for TranslationError {
    fn from(kind: ErrorKind) -> Self {
        TranslationError::new(kind)
    }
}

pub type TranslationResult<T> = Result<T, TranslationError>;
