//! Boolean filter expressions over build event fields.
//!
//! Expressions use a small CEL-like syntax:
//!
//! ```text
//! build.status == Build.Status.SUCCESS && build.substitutions["BRANCH_NAME"] == "main"
//! status in [FAILURE, TIMEOUT] || build.tags.size() > 0
//! has(build.build_trigger_id) && build.project_id.matches("^prod-")
//! ```
//!
//! Compilation checks every field, enum constant, method and regular
//! expression against a [`Schema`], so a [`Predicate`] that compiles can be
//! applied to any [`Record`] without failing. When an expression depends on an
//! optional field the record does not carry, the result is unknown and
//! [`Predicate::apply`] returns `false`.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use build_filter::{EnumType, FieldType, Predicate, Schema, Value};
//!
//! let schema = Schema::new()
//!     .with_root("build")
//!     .field("status", FieldType::Enum(EnumType::new("Build.Status", ["SUCCESS", "FAILURE"])));
//! let predicate = Predicate::compile("build.status == SUCCESS", &schema).unwrap();
//!
//! let mut record = BTreeMap::new();
//! record.insert("status".to_string(), Value::from("SUCCESS"));
//! assert!(predicate.apply(&record));
//! ```

mod compile;
mod error;
mod eval;
mod lexer;
mod parser;
mod schema;

use std::fmt;

use tracing::trace;

pub use error::FilterError;
pub use schema::{EnumType, FieldType, Record, Schema, Value};

use compile::{Compiler, Node};

/// A compiled, immutable filter. Cheap to share across threads.
#[derive(Clone)]
pub struct Predicate {
    source: String,
    root: Node,
}

impl Predicate {
    /// Parse and type-check `expr` against `schema`.
    pub fn compile(expr: &str, schema: &Schema) -> Result<Self, FilterError> {
        let parsed = parser::parse(expr)?;
        let root = Compiler::new(schema).compile(&parsed)?;
        Ok(Self {
            source: expr.trim().to_string(),
            root,
        })
    }

    /// Evaluate against `record`. Unknown results count as `false`.
    pub fn apply<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.evaluate(record).unwrap_or(false)
    }

    /// Evaluate against `record`, returning `None` when the outcome depends on
    /// an absent field.
    pub fn evaluate<R: Record + ?Sized>(&self, record: &R) -> Option<bool> {
        let result = match eval::eval(&self.root, record) {
            Some(Value::Bool(b)) => Some(b),
            _ => None,
        };
        if result.is_none() {
            trace!(filter = %self.source, "filter result unknown");
        }
        result
    }

    /// The expression this predicate was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
