//! Three-valued evaluation of compiled nodes.
//!
//! `None` means "unknown": the expression read an absent optional field.
//! Boolean connectives short-circuit on known operands, so
//! `false && unknown` is `false` and `true || unknown` is `true`.

use std::cmp::Ordering;

use crate::compile::{CmpOp, Node};
use crate::schema::{Record, Value};

pub(crate) fn eval<R: Record + ?Sized>(node: &Node, record: &R) -> Option<Value> {
    match node {
        Node::Lit(v) => Some(v.clone()),
        Node::Field(name) => record.field(name),
        Node::List(items) => items
            .iter()
            .map(|item| eval(item, record))
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        Node::Index(target, key) => match (eval(target, record)?, eval(key, record)?) {
            (Value::Map(mut map), Value::Str(key)) => map.remove(&key),
            (Value::List(mut items), Value::Int(i)) => {
                let i = usize::try_from(i).ok()?;
                (i < items.len()).then(|| items.swap_remove(i))
            }
            _ => None,
        },
        Node::Not(inner) => Some(Value::Bool(!truth(eval(inner, record))?)),
        Node::And(lhs, rhs) => match truth(eval(lhs, record)) {
            Some(false) => Some(Value::Bool(false)),
            Some(true) => truth(eval(rhs, record)).map(Value::Bool),
            None => match truth(eval(rhs, record)) {
                Some(false) => Some(Value::Bool(false)),
                _ => None,
            },
        },
        Node::Or(lhs, rhs) => match truth(eval(lhs, record)) {
            Some(true) => Some(Value::Bool(true)),
            Some(false) => truth(eval(rhs, record)).map(Value::Bool),
            None => match truth(eval(rhs, record)) {
                Some(true) => Some(Value::Bool(true)),
                _ => None,
            },
        },
        Node::Compare(op, lhs, rhs) => {
            let lhs = eval(lhs, record)?;
            let rhs = eval(rhs, record)?;
            compare(*op, &lhs, &rhs).map(Value::Bool)
        }
        Node::In(needle, haystack) => {
            let needle = eval(needle, record)?;
            match eval(haystack, record)? {
                Value::List(items) => Some(Value::Bool(items.contains(&needle))),
                Value::Map(map) => match needle {
                    Value::Str(key) => Some(Value::Bool(map.contains_key(&key))),
                    _ => None,
                },
                _ => None,
            }
        }
        Node::StartsWith(s, prefix) => {
            string_op(record, s, prefix, |s, prefix| s.starts_with(prefix))
        }
        Node::EndsWith(s, suffix) => string_op(record, s, suffix, |s, suffix| s.ends_with(suffix)),
        Node::Contains(s, needle) => string_op(record, s, needle, |s, needle| s.contains(needle)),
        Node::Matches(s, regex) => match eval(s, record)? {
            Value::Str(s) => Some(Value::Bool(regex.is_match(&s))),
            _ => None,
        },
        Node::Size(inner) => {
            let len = match eval(inner, record)? {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                _ => return None,
            };
            i64::try_from(len).ok().map(Value::Int)
        }
        Node::Has(inner) => Some(Value::Bool(eval(inner, record).is_some())),
    }
}

fn truth(value: Option<Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(b),
        _ => None,
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Option<bool> {
    match op {
        CmpOp::Eq => return Some(lhs == rhs),
        CmpOp::Ne => return Some(lhs != rhs),
        _ => {}
    }
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => return None,
    };
    Some(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn string_op<R: Record + ?Sized>(
    record: &R,
    lhs: &Node,
    rhs: &Node,
    f: impl Fn(&str, &str) -> bool,
) -> Option<Value> {
    match (eval(lhs, record)?, eval(rhs, record)?) {
        (Value::Str(a), Value::Str(b)) => Some(Value::Bool(f(&a, &b))),
        _ => None,
    }
}
