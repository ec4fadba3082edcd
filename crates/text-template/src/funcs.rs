//! Built-in template functions.

use serde_json::Value;

use crate::exec::{is_true, print};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func {
    And,
    Default,
    Eq,
    Index,
    Json,
    Len,
    Lower,
    Ne,
    Not,
    Or,
    Upper,
}

impl Func {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "and" => Self::And,
            "default" => Self::Default,
            "eq" => Self::Eq,
            "index" => Self::Index,
            "json" => Self::Json,
            "len" => Self::Len,
            "lower" => Self::Lower,
            "ne" => Self::Ne,
            "not" => Self::Not,
            "or" => Self::Or,
            "upper" => Self::Upper,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Default => "default",
            Self::Eq => "eq",
            Self::Index => "index",
            Self::Json => "json",
            Self::Len => "len",
            Self::Lower => "lower",
            Self::Ne => "ne",
            Self::Not => "not",
            Self::Or => "or",
            Self::Upper => "upper",
        }
    }

    /// Apply the function. Errors are plain messages; the executor adds location.
    pub(crate) fn call(self, mut args: Vec<Value>) -> Result<Value, String> {
        let arity = |min: usize, max: usize| {
            if args.len() < min || args.len() > max {
                Err(format!(
                    "wrong number of args for {}: got {}",
                    self.name(),
                    args.len()
                ))
            } else {
                Ok(())
            }
        };

        match self {
            Self::And => {
                arity(1, usize::MAX)?;
                let last = args.len() - 1;
                let pick = args.iter().position(|v| !is_true(v)).unwrap_or(last);
                Ok(args.swap_remove(pick))
            }
            Self::Or => {
                arity(1, usize::MAX)?;
                let last = args.len() - 1;
                let pick = args.iter().position(is_true).unwrap_or(last);
                Ok(args.swap_remove(pick))
            }
            Self::Not => {
                arity(1, 1)?;
                Ok(Value::Bool(!is_true(&args[0])))
            }
            Self::Default => {
                arity(2, 2)?;
                let given = args.pop().unwrap_or(Value::Null);
                let fallback = args.pop().unwrap_or(Value::Null);
                Ok(if is_true(&given) { given } else { fallback })
            }
            Self::Eq => {
                arity(2, usize::MAX)?;
                let first = &args[0];
                Ok(Value::Bool(args[1..].iter().any(|v| loose_eq(first, v))))
            }
            Self::Ne => {
                arity(2, 2)?;
                Ok(Value::Bool(!loose_eq(&args[0], &args[1])))
            }
            Self::Len => {
                arity(1, 1)?;
                let len = match &args[0] {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => return Err(format!("len of {}", kind(other))),
                };
                Ok(Value::from(len))
            }
            Self::Index => {
                arity(1, usize::MAX)?;
                let mut rest = args.drain(..);
                let mut current = rest.next().unwrap_or(Value::Null);
                for key in rest {
                    current = match (current, &key) {
                        (Value::Object(mut map), Value::String(k)) => map
                            .remove(k)
                            .ok_or_else(|| format!("map has no entry for key {k:?}"))?,
                        (Value::Array(mut items), Value::Number(n)) => {
                            let i = n
                                .as_u64()
                                .and_then(|i| usize::try_from(i).ok())
                                .filter(|&i| i < items.len())
                                .ok_or_else(|| format!("index out of range: {n}"))?;
                            items.swap_remove(i)
                        }
                        (other, key) => {
                            return Err(format!(
                                "can't index item of type {} with {}",
                                kind(&other),
                                kind(key)
                            ));
                        }
                    };
                }
                Ok(current)
            }
            Self::Json => {
                arity(1, 1)?;
                serde_json::to_string(&args[0])
                    .map(Value::String)
                    .map_err(|e| format!("json: {e}"))
            }
            Self::Upper | Self::Lower => {
                arity(1, 1)?;
                let s = print(&args[0]);
                Ok(Value::String(if self == Self::Upper {
                    s.to_uppercase()
                } else {
                    s.to_lowercase()
                }))
            }
        }
    }
}

/// Equality that treats numbers by value regardless of integer/float encoding.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}
