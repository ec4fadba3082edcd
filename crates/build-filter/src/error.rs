use thiserror::Error;

/// Errors raised while compiling a filter expression.
///
/// Evaluation itself never fails; every error surfaces at compile time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter expression is empty")]
    Empty,

    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid escape sequence \\{ch} at offset {offset}")]
    InvalidEscape { ch: char, offset: usize },

    #[error("invalid integer literal {literal:?} at offset {offset}")]
    InvalidInteger { literal: String, offset: usize },

    #[error("expression nested deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },

    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("unknown {namespace} constant `{name}`")]
    UnknownConstant { namespace: String, name: String },

    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("filter must evaluate to a boolean, found {0}")]
    NotBoolean(String),
}

impl FilterError {
    pub(crate) fn unexpected(
        expected: impl Into<String>,
        found: impl Into<String>,
        offset: usize,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            offset,
        }
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }
}
