//! Type checking and lowering of parsed expressions.
//!
//! Every field reference, enum constant and method is resolved against the
//! [`Schema`] here, so evaluation only ever sees well-typed nodes.

use regex::Regex;

use crate::error::FilterError;
use crate::parser::{BinaryOp, Expr};
use crate::schema::{EnumType, FieldType, Schema, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Lit(Value),
    Field(String),
    List(Vec<Node>),
    Index(Box<Node>, Box<Node>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare(CmpOp, Box<Node>, Box<Node>),
    In(Box<Node>, Box<Node>),
    StartsWith(Box<Node>, Box<Node>),
    EndsWith(Box<Node>, Box<Node>),
    Contains(Box<Node>, Box<Node>),
    Matches(Box<Node>, Regex),
    Size(Box<Node>),
    Has(Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Ty {
    Bool,
    Int,
    String,
    Enum(EnumType),
    List(Box<Ty>),
    Map(Box<Ty>),
    /// Element type of an empty list literal.
    Any,
}

impl Ty {
    fn from_field(ty: &FieldType) -> Self {
        match ty {
            FieldType::Bool => Self::Bool,
            FieldType::Int => Self::Int,
            FieldType::String => Self::String,
            FieldType::Enum(e) => Self::Enum(e.clone()),
            FieldType::StringList => Self::List(Box::new(Self::String)),
            FieldType::StringMap => Self::Map(Box::new(Self::String)),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Bool => "bool".into(),
            Self::Int => "int".into(),
            Self::String => "string".into(),
            Self::Enum(e) => e.namespace.clone(),
            Self::List(t) => format!("list({})", t.name()),
            Self::Map(t) => format!("map(string, {})", t.name()),
            Self::Any => "dyn".into(),
        }
    }

    fn is_stringish(&self) -> bool {
        matches!(self, Self::String | Self::Enum(_))
    }

    fn compatible(&self, other: &Ty) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Enum(a), Self::Enum(b)) => a.namespace == b.namespace,
            (Self::Enum(_), Self::String) | (Self::String, Self::Enum(_)) => true,
            (Self::List(a), Self::List(b)) | (Self::Map(a), Self::Map(b)) => a.compatible(b),
            (a, b) => a == b,
        }
    }
}

/// A checked sub-expression, or a bare path that may still turn out to be an
/// enum constant once the type on the other side of a comparison is known.
enum Checked {
    Typed(Node, Ty),
    Constant(Vec<String>),
}

pub(crate) struct Compiler<'a> {
    schema: &'a Schema,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Lower a whole expression, requiring a boolean result.
    pub(crate) fn compile(&self, expr: &Expr) -> Result<Node, FilterError> {
        let (node, ty) = self.typed(expr, None)?;
        if ty != Ty::Bool {
            return Err(FilterError::NotBoolean(ty.name()));
        }
        Ok(node)
    }

    fn typed(&self, expr: &Expr, hint: Option<&Ty>) -> Result<(Node, Ty), FilterError> {
        match self.check(expr, hint)? {
            Checked::Typed(node, ty) => Ok((node, ty)),
            Checked::Constant(path) => Err(self.unresolved(&path)),
        }
    }

    fn check(&self, expr: &Expr, hint: Option<&Ty>) -> Result<Checked, FilterError> {
        match expr {
            Expr::Bool(b) => Ok(Checked::Typed(Node::Lit(Value::Bool(*b)), Ty::Bool)),
            Expr::Int(i) => Ok(Checked::Typed(Node::Lit(Value::Int(*i)), Ty::Int)),
            Expr::Str(s) => {
                if let Some(Ty::Enum(e)) = hint {
                    if !e.contains(s) {
                        return Err(FilterError::UnknownConstant {
                            namespace: e.namespace.clone(),
                            name: s.clone(),
                        });
                    }
                    return Ok(Checked::Typed(
                        Node::Lit(Value::Str(s.clone())),
                        Ty::Enum(e.clone()),
                    ));
                }
                Ok(Checked::Typed(Node::Lit(Value::Str(s.clone())), Ty::String))
            }
            Expr::List(items) => {
                let elem_hint = match hint {
                    Some(Ty::List(t)) => Some(t.as_ref()),
                    _ => None,
                };
                let mut nodes = Vec::with_capacity(items.len());
                let mut elem_ty = elem_hint.cloned().unwrap_or(Ty::Any);
                for item in items {
                    let (node, ty) = self.typed(item, elem_hint)?;
                    if !elem_ty.compatible(&ty) {
                        return Err(FilterError::mismatch(format!(
                            "list mixes {} and {}",
                            elem_ty.name(),
                            ty.name()
                        )));
                    }
                    if elem_ty == Ty::Any {
                        elem_ty = ty;
                    }
                    nodes.push(node);
                }
                Ok(Checked::Typed(Node::List(nodes), Ty::List(Box::new(elem_ty))))
            }
            Expr::Path(segments) => self.check_path(segments, hint),
            Expr::Index { target, key } => {
                let (target, target_ty) = self.typed(target, None)?;
                match target_ty {
                    Ty::Map(value_ty) => {
                        let (key, key_ty) = self.typed(key, Some(&Ty::String))?;
                        expect_type(&key_ty, &Ty::String, "map key")?;
                        Ok(Checked::Typed(
                            Node::Index(Box::new(target), Box::new(key)),
                            *value_ty,
                        ))
                    }
                    Ty::List(elem_ty) => {
                        let (key, key_ty) = self.typed(key, Some(&Ty::Int))?;
                        expect_type(&key_ty, &Ty::Int, "list index")?;
                        Ok(Checked::Typed(
                            Node::Index(Box::new(target), Box::new(key)),
                            *elem_ty,
                        ))
                    }
                    other => Err(FilterError::mismatch(format!(
                        "cannot index into {}",
                        other.name()
                    ))),
                }
            }
            Expr::Not(inner) => {
                let (node, ty) = self.typed(inner, None)?;
                expect_type(&ty, &Ty::Bool, "operand of `!`")?;
                Ok(Checked::Typed(Node::Not(Box::new(node)), Ty::Bool))
            }
            Expr::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs),
            Expr::Call {
                receiver,
                name,
                args,
            } => self.check_call(receiver.as_deref(), name, args),
        }
    }

    fn check_path(&self, segments: &[String], hint: Option<&Ty>) -> Result<Checked, FilterError> {
        let mut rest = segments;
        if let Some(root) = self.schema.root()
            && rest.len() > 1
            && rest[0] == root
            && self.schema.field_type(root).is_none()
        {
            rest = &rest[1..];
        }

        let Some(field_ty) = self.schema.field_type(&rest[0]) else {
            if let Some(Ty::Enum(e)) = hint {
                let node = self.enum_constant(segments, e)?;
                return Ok(Checked::Typed(node, Ty::Enum(e.clone())));
            }
            return Ok(Checked::Constant(segments.to_vec()));
        };

        let mut node = Node::Field(rest[0].clone());
        let mut ty = Ty::from_field(field_ty);
        for segment in &rest[1..] {
            match ty {
                Ty::Map(value_ty) => {
                    node = Node::Index(
                        Box::new(node),
                        Box::new(Node::Lit(Value::Str(segment.clone()))),
                    );
                    ty = *value_ty;
                }
                _ => return Err(FilterError::UnknownField(segments.join("."))),
            }
        }
        Ok(Checked::Typed(node, ty))
    }

    fn enum_constant(&self, path: &[String], e: &EnumType) -> Result<Node, FilterError> {
        let (name, prefix) = path
            .split_last()
            .ok_or_else(|| FilterError::UnknownField(String::new()))?;
        if !prefix.is_empty() && prefix.join(".") != e.namespace {
            return Err(FilterError::UnknownField(path.join(".")));
        }
        if !e.contains(name) {
            return Err(FilterError::UnknownConstant {
                namespace: e.namespace.clone(),
                name: name.clone(),
            });
        }
        Ok(Node::Lit(Value::Str(name.clone())))
    }

    /// Error for a path that resolved to neither a field nor a constant.
    fn unresolved(&self, path: &[String]) -> FilterError {
        let joined = path.join(".");
        // A qualified constant used without an enum on the other side.
        for e in self.schema.enums() {
            if joined.starts_with(&format!("{}.", e.namespace)) {
                return FilterError::mismatch(format!(
                    "constant `{joined}` must be compared with a {} field",
                    e.namespace
                ));
            }
        }
        FilterError::UnknownField(joined)
    }

    /// Check both operands, letting a typed side resolve a constant on the other.
    ///
    /// With `membership` the right operand is a collection of the left's type.
    fn check_pair(
        &self,
        lhs: &Expr,
        rhs: &Expr,
        membership: bool,
    ) -> Result<((Node, Ty), (Node, Ty)), FilterError> {
        match self.check(lhs, None)? {
            Checked::Typed(lnode, lty) => {
                let hint = if membership {
                    Ty::List(Box::new(lty.clone()))
                } else {
                    lty.clone()
                };
                let right = self.typed(rhs, Some(&hint))?;
                Ok(((lnode, lty), right))
            }
            Checked::Constant(path) => {
                let (rnode, rty) = match self.check(rhs, None)? {
                    Checked::Typed(node, ty) => (node, ty),
                    // Neither side is a field; blame the left one.
                    Checked::Constant(_) => return Err(self.unresolved(&path)),
                };
                let lhs_hint = match &rty {
                    Ty::List(elem) if membership => (**elem).clone(),
                    other => other.clone(),
                };
                let left = self.typed(&Expr::Path(path), Some(&lhs_hint))?;
                Ok((left, (rnode, rty)))
            }
        }
    }

    fn check_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Checked, FilterError> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let (lnode, lty) = self.typed(lhs, None)?;
                let (rnode, rty) = self.typed(rhs, None)?;
                expect_type(&lty, &Ty::Bool, op.symbol())?;
                expect_type(&rty, &Ty::Bool, op.symbol())?;
                let node = if op == BinaryOp::And {
                    Node::And(Box::new(lnode), Box::new(rnode))
                } else {
                    Node::Or(Box::new(lnode), Box::new(rnode))
                };
                Ok(Checked::Typed(node, Ty::Bool))
            }
            BinaryOp::In => {
                let ((lnode, lty), (rnode, rty)) =
                    self.check_pair(lhs, rhs, true)?;
                match &rty {
                    Ty::List(elem) if elem.compatible(&lty) => {}
                    Ty::Map(_) if lty.is_stringish() => {}
                    _ => {
                        return Err(FilterError::mismatch(format!(
                            "cannot test {} membership in {}",
                            lty.name(),
                            rty.name()
                        )));
                    }
                }
                Ok(Checked::Typed(
                    Node::In(Box::new(lnode), Box::new(rnode)),
                    Ty::Bool,
                ))
            }
            _ => {
                let ((lnode, lty), (rnode, rty)) = self.check_pair(lhs, rhs, false)?;
                if !lty.compatible(&rty) {
                    return Err(FilterError::mismatch(format!(
                        "cannot compare {} {} {}",
                        lty.name(),
                        op.symbol(),
                        rty.name()
                    )));
                }
                let cmp = match op {
                    BinaryOp::Eq => CmpOp::Eq,
                    BinaryOp::Ne => CmpOp::Ne,
                    BinaryOp::Lt => CmpOp::Lt,
                    BinaryOp::Le => CmpOp::Le,
                    BinaryOp::Gt => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                if !matches!(cmp, CmpOp::Eq | CmpOp::Ne)
                    && !matches!(lty, Ty::Int | Ty::String)
                {
                    return Err(FilterError::mismatch(format!(
                        "operator `{}` is not defined for {}",
                        op.symbol(),
                        lty.name()
                    )));
                }
                Ok(Checked::Typed(
                    Node::Compare(cmp, Box::new(lnode), Box::new(rnode)),
                    Ty::Bool,
                ))
            }
        }
    }

    fn check_call(
        &self,
        receiver: Option<&Expr>,
        name: &str,
        args: &[Expr],
    ) -> Result<Checked, FilterError> {
        let Some(receiver) = receiver else {
            return match (name, args) {
                ("has", [arg @ (Expr::Path(_) | Expr::Index { .. })]) => {
                    let (node, _) = self.typed(arg, None)?;
                    Ok(Checked::Typed(Node::Has(Box::new(node)), Ty::Bool))
                }
                ("has", _) => Err(FilterError::mismatch(
                    "has() takes a single field reference",
                )),
                ("size", [arg]) => self.check_size(arg),
                _ => Err(FilterError::UnknownMethod(name.to_string())),
            };
        };

        if name == "size" && args.is_empty() {
            return self.check_size(receiver);
        }

        let (recv, recv_ty) = self.typed(receiver, None)?;
        let [arg] = args else {
            return Err(FilterError::UnknownMethod(format!(
                "{name}/{} arguments",
                args.len()
            )));
        };
        if !recv_ty.is_stringish() {
            return Err(FilterError::mismatch(format!(
                "method `{name}` is not defined for {}",
                recv_ty.name()
            )));
        }

        let node = match name {
            "startsWith" | "endsWith" | "contains" => {
                let (arg, arg_ty) = self.typed(arg, None)?;
                expect_type(&arg_ty, &Ty::String, name)?;
                let (recv, arg) = (Box::new(recv), Box::new(arg));
                match name {
                    "startsWith" => Node::StartsWith(recv, arg),
                    "endsWith" => Node::EndsWith(recv, arg),
                    _ => Node::Contains(recv, arg),
                }
            }
            "matches" => {
                let Expr::Str(pattern) = arg else {
                    return Err(FilterError::mismatch(
                        "matches() requires a string literal pattern",
                    ));
                };
                let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Node::Matches(Box::new(recv), regex)
            }
            _ => return Err(FilterError::UnknownMethod(name.to_string())),
        };
        Ok(Checked::Typed(node, Ty::Bool))
    }

    fn check_size(&self, arg: &Expr) -> Result<Checked, FilterError> {
        let (node, ty) = self.typed(arg, None)?;
        match ty {
            Ty::String | Ty::Enum(_) | Ty::List(_) | Ty::Map(_) => {
                Ok(Checked::Typed(Node::Size(Box::new(node)), Ty::Int))
            }
            other => Err(FilterError::mismatch(format!(
                "size() is not defined for {}",
                other.name()
            ))),
        }
    }
}

fn expect_type(actual: &Ty, expected: &Ty, context: &str) -> Result<(), FilterError> {
    if actual.compatible(expected) {
        Ok(())
    } else {
        Err(FilterError::mismatch(format!(
            "{context} expects {}, found {}",
            expected.name(),
            actual.name()
        )))
    }
}
