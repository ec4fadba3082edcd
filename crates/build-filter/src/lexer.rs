//! Tokenizer for filter expressions.

use std::fmt;

use crate::error::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    True,
    False,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Bang,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "identifier `{name}`"),
            Self::Int(v) => write!(f, "integer {v}"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::True => f.write_str("`true`"),
            Self::False => f.write_str("`false`"),
            Self::In => f.write_str("`in`"),
            Self::LParen => f.write_str("`(`"),
            Self::RParen => f.write_str("`)`"),
            Self::LBracket => f.write_str("`[`"),
            Self::RBracket => f.write_str("`]`"),
            Self::Comma => f.write_str("`,`"),
            Self::Dot => f.write_str("`.`"),
            Self::Bang => f.write_str("`!`"),
            Self::Eq => f.write_str("`==`"),
            Self::Ne => f.write_str("`!=`"),
            Self::Lt => f.write_str("`<`"),
            Self::Le => f.write_str("`<=`"),
            Self::Gt => f.write_str("`>`"),
            Self::Ge => f.write_str("`>=`"),
            Self::And => f.write_str("`&&`"),
            Self::Or => f.write_str("`||`"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Split `input` into tokens, always terminated by [`TokenKind::Eof`].
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match ch {
            '(' => single(&mut chars, TokenKind::LParen),
            ')' => single(&mut chars, TokenKind::RParen),
            '[' => single(&mut chars, TokenKind::LBracket),
            ']' => single(&mut chars, TokenKind::RBracket),
            ',' => single(&mut chars, TokenKind::Comma),
            '.' => single(&mut chars, TokenKind::Dot),
            '=' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=') {
                    Some(_) => TokenKind::Eq,
                    None => return Err(FilterError::UnexpectedChar { ch, offset }),
                }
            }
            '!' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=') {
                    Some(_) => TokenKind::Ne,
                    None => TokenKind::Bang,
                }
            }
            '<' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=') {
                    Some(_) => TokenKind::Le,
                    None => TokenKind::Lt,
                }
            }
            '>' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=') {
                    Some(_) => TokenKind::Ge,
                    None => TokenKind::Gt,
                }
            }
            '&' | '|' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == ch) {
                    Some(_) if ch == '&' => TokenKind::And,
                    Some(_) => TokenKind::Or,
                    None => return Err(FilterError::UnexpectedChar { ch, offset }),
                }
            }
            '"' | '\'' => {
                chars.next();
                TokenKind::Str(read_string(&mut chars, ch, offset)?)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some((_, d)) = chars.next_if(|&(_, d)| d.is_ascii_digit()) {
                    literal.push(d);
                }
                match literal.parse::<i64>() {
                    Ok(v) => TokenKind::Int(v),
                    Err(_) => return Err(FilterError::InvalidInteger { literal, offset }),
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some((_, d)) = chars.next_if(|&(_, d)| d.is_alphanumeric() || d == '_')
                {
                    ident.push(d);
                }
                match ident.as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "in" => TokenKind::In,
                    _ => TokenKind::Ident(ident),
                }
            }
            _ => return Err(FilterError::UnexpectedChar { ch, offset }),
        };

        tokens.push(Token { kind, offset });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
    });
    Ok(tokens)
}

fn single(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    kind: TokenKind,
) -> TokenKind {
    chars.next();
    kind
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, FilterError> {
    let mut out = String::new();
    loop {
        let Some((offset, c)) = chars.next() else {
            return Err(FilterError::UnterminatedString { offset: start });
        };
        match c {
            c if c == quote => return Ok(out),
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    return Err(FilterError::UnterminatedString { offset: start });
                };
                out.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    other => return Err(FilterError::InvalidEscape { ch: other, offset }),
                });
            }
            c => out.push(c),
        }
    }
}
