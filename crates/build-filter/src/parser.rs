//! Recursive-descent parser producing an untyped expression tree.

use crate::error::FilterError;
use crate::lexer::{Token, TokenKind, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Expr>),
    /// Dotted identifier chain such as `build.status` or `Build.Status.SUCCESS`.
    Path(Vec<String>),
    Index {
        target: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Deepest nesting of parentheses, brackets and `!` the parser accepts.
pub(crate) const MAX_NESTING: usize = 100;

/// Parse a complete filter expression.
pub(crate) fn parse(input: &str) -> Result<Expr, FilterError> {
    if input.trim().is_empty() {
        return Err(FilterError::Empty);
    }
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    parser.expect(TokenKind::Eof, "end of input")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, FilterError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(FilterError::unexpected(
                expected,
                token.kind.to_string(),
                token.offset,
            ))
        }
    }

    fn or(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.relation()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.relation()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Expr, FilterError> {
        let lhs = self.unary()?;
        let op = match self.peek().kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::In => BinaryOp::In,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.unary()?;
        Ok(binary(op, lhs, rhs))
    }

    fn unary(&mut self) -> Result<Expr, FilterError> {
        if self.depth == MAX_NESTING {
            return Err(FilterError::TooDeep {
                limit: MAX_NESTING,
                offset: self.peek().offset,
            });
        }
        self.depth += 1;
        let expr = if self.eat(&TokenKind::Bang) {
            self.unary().map(|inner| Expr::Not(Box::new(inner)))
        } else {
            self.postfix()
        };
        self.depth -= 1;
        expr
    }

    fn postfix(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let token = self.advance();
                let TokenKind::Ident(name) = token.kind else {
                    return Err(FilterError::unexpected(
                        "field or method name",
                        token.kind.to_string(),
                        token.offset,
                    ));
                };
                if self.eat(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        receiver: Some(Box::new(expr)),
                        name,
                        args,
                    };
                } else if let Expr::Path(segments) = &mut expr {
                    segments.push(name);
                } else {
                    return Err(FilterError::unexpected(
                        "method call",
                        format!("field selection `.{name}`"),
                        token.offset,
                    ));
                }
            } else if self.eat(&TokenKind::LBracket) {
                let key = self.or()?;
                self.expect(TokenKind::RBracket, "`]`")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    key: Box::new(key),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, FilterError> {
        let token = self.advance();
        match token.kind {
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Int(v) => Ok(Expr::Int(v)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    Ok(Expr::Call {
                        receiver: None,
                        name,
                        args,
                    })
                } else {
                    Ok(Expr::Path(vec![name]))
                }
            }
            TokenKind::LParen => {
                let inner = self.or()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.or()?);
                        if self.eat(&TokenKind::RBracket) {
                            break;
                        }
                        self.expect(TokenKind::Comma, "`,` or `]`")?;
                    }
                }
                Ok(Expr::List(items))
            }
            other => Err(FilterError::unexpected(
                "expression",
                other.to_string(),
                token.offset,
            )),
        }
    }

    /// Parse call arguments; the opening parenthesis is already consumed.
    fn arguments(&mut self) -> Result<Vec<Expr>, FilterError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(TokenKind::Comma, "`,` or `)`")?;
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
