//! Field declarations and runtime values.

use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    String,
    /// String-valued enumeration, e.g. a build status.
    Enum(EnumType),
    StringList,
    StringMap,
}

/// An enumeration with a namespace used for qualified constants
/// (`Build.Status.SUCCESS`) and its set of variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub namespace: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(namespace: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// The set of fields a filter may reference.
///
/// An optional root name lets expressions qualify fields (`build.status`)
/// as well as use them bare (`status`).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    root: Option<String>,
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow fields to be qualified with `root.`.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub(crate) fn enums(&self) -> impl Iterator<Item = &EnumType> {
        self.fields.values().filter_map(|ty| match ty {
            FieldType::Enum(e) => Some(e),
            _ => None,
        })
    }
}

/// A runtime value read from a record or produced by a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Something a compiled predicate can be applied to.
///
/// `field` returns `None` when an optional field is absent; the evaluator
/// treats that as unknown rather than an error.
pub trait Record {
    fn field(&self, name: &str) -> Option<Value>;
}

impl Record for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}
