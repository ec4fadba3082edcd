use thiserror::Error;

/// Malformed template source. Raised by [`crate::Template::parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("template: {name}:{line}: {message}")]
pub struct ParseError {
    pub name: String,
    pub line: usize,
    pub message: String,
}

/// Failure while rendering a parsed template against a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("template: {name}:{line}: can't evaluate field {path}: missing from view")]
    MissingField {
        name: String,
        line: usize,
        path: String,
    },

    #[error("template: {name}:{line}: {message}")]
    Invalid {
        name: String,
        line: usize,
        message: String,
    },
}
