//! Template lexing and parsing.

use crate::funcs::Func;

/// A parse failure before it is tagged with the template name.
#[derive(Debug)]
pub(crate) struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, SyntaxError>;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Field(Vec<String>),
    Dot,
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug)]
enum Item {
    Text(String),
    Action { line: usize, tokens: Vec<Tok> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    /// `.A.B`; an empty path is the dot itself.
    Field(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Func(Func),
    Sub(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action {
        line: usize,
        pipeline: Pipeline,
    },
    If {
        line: usize,
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Range {
        line: usize,
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    With {
        line: usize,
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
}

/// Deepest nesting of control blocks, and separately of parenthesized
/// pipelines, that a template may use.
pub(crate) const MAX_NESTING: usize = 100;

pub(crate) fn parse(source: &str) -> Result<Vec<Node>> {
    let items = lex(source)?;
    let mut parser = Parser {
        items: items.into_iter(),
        depth: 0,
    };
    let (nodes, terminator) = parser.list()?;
    match terminator {
        None => Ok(nodes),
        Some((line, Terminator::End)) => Err(SyntaxError::new(line, "unexpected {{end}}")),
        Some((line, Terminator::Else(_))) => Err(SyntaxError::new(line, "unexpected {{else}}")),
    }
}

fn count_lines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}

/// Split the source into text runs and tokenized actions, applying trim markers
/// and dropping comments.
fn lex(source: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        let after = &rest[start + 2..];
        let trim_left = after.starts_with('-') && after[1..].starts_with(char::is_whitespace);

        if trim_next {
            text = text.trim_start();
        }
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }
        line += count_lines(&rest[..start]);

        let body = if trim_left { &after[1..] } else { after };
        let action = lex_action(body, line)?;
        if !action.tokens.is_empty() {
            items.push(Item::Action {
                line,
                tokens: action.tokens,
            });
        }
        line += count_lines(&body[..action.consumed]);
        trim_next = action.trim_right;
        rest = &body[action.consumed..];
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        items.push(Item::Text(tail.to_string()));
    }
    Ok(items)
}

struct LexedAction {
    tokens: Vec<Tok>,
    /// Bytes consumed, including the closing delimiter.
    consumed: usize,
    trim_right: bool,
}

fn lex_action(body: &str, line: usize) -> Result<LexedAction> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    let bytes = body.as_bytes();
    let err_line = |pos: usize| line + count_lines(&body[..pos]);

    loop {
        let rest = &body[pos..];
        let Some(c) = rest.chars().next() else {
            return Err(SyntaxError::new(line, "unclosed action"));
        };

        if rest.starts_with("}}") {
            return Ok(LexedAction {
                tokens,
                consumed: pos + 2,
                trim_right: false,
            });
        }
        if rest.starts_with("-}}") && pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
            return Ok(LexedAction {
                tokens,
                consumed: pos + 3,
                trim_right: true,
            });
        }
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        if rest.starts_with("/*") {
            if !tokens.is_empty() {
                return Err(SyntaxError::new(err_line(pos), "comment must be the whole action"));
            }
            let Some(end) = rest.find("*/") else {
                return Err(SyntaxError::new(line, "unclosed comment"));
            };
            pos += end + 2;
            continue;
        }

        match c {
            '|' => {
                tokens.push(Tok::Pipe);
                pos += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                pos += 1;
            }
            '.' => {
                let (path, len) = lex_field(rest);
                tokens.push(if path.is_empty() {
                    Tok::Dot
                } else {
                    Tok::Field(path)
                });
                pos += len;
            }
            '"' => {
                let (s, len) = lex_quoted(rest).ok_or_else(|| {
                    SyntaxError::new(err_line(pos), "unterminated quoted string")
                })?;
                tokens.push(Tok::Str(s));
                pos += len;
            }
            '`' => {
                let Some(end) = rest[1..].find('`') else {
                    return Err(SyntaxError::new(err_line(pos), "unterminated raw string"));
                };
                tokens.push(Tok::Str(rest[1..1 + end].to_string()));
                pos += end + 2;
            }
            c if c.is_ascii_digit() || (c == '-' && rest[1..].starts_with(|d: char| d.is_ascii_digit())) => {
                let len = rest
                    .char_indices()
                    .skip(1)
                    .find(|&(_, d)| !(d.is_ascii_digit() || d == '.'))
                    .map_or(rest.len(), |(i, _)| i);
                let literal = &rest[..len];
                let tok = if let Ok(i) = literal.parse::<i64>() {
                    Tok::Int(i)
                } else if let Ok(f) = literal.parse::<f64>() {
                    Tok::Float(f)
                } else {
                    return Err(SyntaxError::new(
                        err_line(pos),
                        format!("bad number syntax: {literal:?}"),
                    ));
                };
                tokens.push(tok);
                pos += len;
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .char_indices()
                    .find(|&(_, d)| !(d.is_alphanumeric() || d == '_'))
                    .map_or(rest.len(), |(i, _)| i);
                let word = &rest[..len];
                tokens.push(match word {
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    "nil" => Tok::Nil,
                    _ => Tok::Ident(word.to_string()),
                });
                pos += len;
            }
            other => {
                return Err(SyntaxError::new(
                    err_line(pos),
                    format!("unexpected {other:?} in action"),
                ));
            }
        }
    }
}

/// Lex `.A.B.C` (or a lone `.`), returning the path and its byte length.
fn lex_field(s: &str) -> (Vec<String>, usize) {
    let mut path = Vec::new();
    let mut pos = 0;
    while s[pos..].starts_with('.') {
        let name_len = s[pos + 1..]
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
            .map_or(s.len() - pos - 1, |(i, _)| i);
        if name_len == 0 {
            // A lone dot only counts when nothing precedes it.
            if path.is_empty() {
                pos += 1;
            }
            break;
        }
        path.push(s[pos + 1..pos + 1 + name_len].to_string());
        pos += 1 + name_len;
    }
    (path, pos)
}

fn lex_quoted(s: &str) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((out, i + 1)),
            '\\' => {
                let (_, esc) = chars.next()?;
                out.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            '\n' => return None,
            c => out.push(c),
        }
    }
    None
}

enum Terminator {
    End,
    Else(Option<Pipeline>),
}

struct Parser {
    items: std::vec::IntoIter<Item>,
    depth: usize,
}

impl Parser {
    /// Run `parse` one block level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(&mut self, line: usize, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth == MAX_NESTING {
            return Err(SyntaxError::new(line, "control blocks nested too deeply"));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    /// Parse nodes until `{{end}}`, `{{else}}` or end of input.
    fn list(&mut self) -> Result<(Vec<Node>, Option<(usize, Terminator)>)> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (line, tokens) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { line, tokens } => (line, tokens),
            };

            let keyword = match tokens.first() {
                Some(Tok::Ident(word)) => word.as_str(),
                _ => "",
            };
            match keyword {
                "end" => {
                    expect_no_args(&tokens, line, "end")?;
                    return Ok((nodes, Some((line, Terminator::End))));
                }
                "else" => {
                    let chained = match tokens.get(1) {
                        Some(Tok::Ident(word)) if word == "if" => {
                            Some(pipeline(&tokens[2..], line, 0)?)
                        }
                        _ => {
                            expect_no_args(&tokens, line, "else")?;
                            None
                        }
                    };
                    return Ok((nodes, Some((line, Terminator::Else(chained)))));
                }
                "if" => {
                    let condition = pipeline(&tokens[1..], line, 0)?;
                    nodes.push(self.nested(line, |p| p.if_chain(line, condition))?);
                }
                "range" | "with" => {
                    let control = pipeline(&tokens[1..], line, 0)?;
                    let (body, otherwise) = self.nested(line, |p| p.block(line, keyword))?;
                    nodes.push(if keyword == "range" {
                        Node::Range {
                            line,
                            pipeline: control,
                            body,
                            otherwise,
                        }
                    } else {
                        Node::With {
                            line,
                            pipeline: control,
                            body,
                            otherwise,
                        }
                    });
                }
                _ => nodes.push(Node::Action {
                    line,
                    pipeline: pipeline(&tokens, line, 0)?,
                }),
            }
        }
        Ok((nodes, None))
    }

    fn if_chain(&mut self, line: usize, first: Pipeline) -> Result<Node> {
        let mut branches = Vec::new();
        let mut condition = first;
        loop {
            let (body, terminator) = self.list()?;
            branches.push((condition, body));
            match terminator {
                None => return Err(SyntaxError::new(line, "unexpected EOF in {{if}}")),
                Some((_, Terminator::End)) => {
                    return Ok(Node::If {
                        line,
                        branches,
                        otherwise: None,
                    });
                }
                Some((_, Terminator::Else(Some(next)))) => condition = next,
                Some((_, Terminator::Else(None))) => {
                    let otherwise = self.closing_branch(line, "if")?;
                    return Ok(Node::If {
                        line,
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
            }
        }
    }

    fn block(&mut self, line: usize, keyword: &str) -> Result<(Vec<Node>, Option<Vec<Node>>)> {
        let (body, terminator) = self.list()?;
        match terminator {
            None => Err(SyntaxError::new(
                line,
                format!("unexpected EOF in {{{{{keyword}}}}}"),
            )),
            Some((_, Terminator::End)) => Ok((body, None)),
            Some((else_line, Terminator::Else(Some(_)))) => Err(SyntaxError::new(
                else_line,
                format!("{{{{else if}}}} is not allowed in {{{{{keyword}}}}}"),
            )),
            Some((_, Terminator::Else(None))) => {
                let otherwise = self.closing_branch(line, keyword)?;
                Ok((body, Some(otherwise)))
            }
        }
    }

    /// Parse an `{{else}}` branch, which must be closed by `{{end}}`.
    fn closing_branch(&mut self, line: usize, keyword: &str) -> Result<Vec<Node>> {
        let (nodes, terminator) = self.list()?;
        match terminator {
            Some((_, Terminator::End)) => Ok(nodes),
            Some((else_line, Terminator::Else(_))) => Err(SyntaxError::new(
                else_line,
                format!("expected end; found {{{{else}}}} in {{{{{keyword}}}}}"),
            )),
            None => Err(SyntaxError::new(
                line,
                format!("unexpected EOF in {{{{{keyword}}}}}"),
            )),
        }
    }
}

fn expect_no_args(tokens: &[Tok], line: usize, keyword: &str) -> Result<()> {
    if tokens.len() > 1 {
        return Err(SyntaxError::new(
            line,
            format!("unexpected arguments after {keyword}"),
        ));
    }
    Ok(())
}

fn pipeline(tokens: &[Tok], line: usize, depth: usize) -> Result<Pipeline> {
    if depth > MAX_NESTING {
        return Err(SyntaxError::new(line, "parenthesized pipeline nested too deeply"));
    }
    if tokens.is_empty() {
        return Err(SyntaxError::new(line, "missing value for command"));
    }
    let mut commands = Vec::new();
    let mut args = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let arg = match &tokens[i] {
            Tok::Pipe => {
                commands.push(command(std::mem::take(&mut args), line)?);
                i += 1;
                continue;
            }
            Tok::Field(path) => Arg::Field(path.clone()),
            Tok::Dot => Arg::Field(Vec::new()),
            Tok::Str(s) => Arg::Str(s.clone()),
            Tok::Int(v) => Arg::Int(*v),
            Tok::Float(v) => Arg::Float(*v),
            Tok::Bool(b) => Arg::Bool(*b),
            Tok::Nil => Arg::Nil,
            Tok::Ident(name) => Arg::Func(Func::from_name(name).ok_or_else(|| {
                SyntaxError::new(line, format!("function {name:?} not defined"))
            })?),
            Tok::LParen => {
                let close = matching_paren(tokens, i)
                    .ok_or_else(|| SyntaxError::new(line, "unclosed left paren"))?;
                let sub = pipeline(&tokens[i + 1..close], line, depth + 1)?;
                i = close;
                Arg::Sub(sub)
            }
            Tok::RParen => return Err(SyntaxError::new(line, "unexpected right paren")),
        };
        args.push(arg);
        i += 1;
    }
    commands.push(command(args, line)?);

    for cmd in &commands[1..] {
        if !matches!(cmd.args.first(), Some(Arg::Func(_))) {
            return Err(SyntaxError::new(
                line,
                "non-function command in pipeline stage",
            ));
        }
    }
    Ok(Pipeline { commands })
}

fn command(args: Vec<Arg>, line: usize) -> Result<Command> {
    match args.first() {
        None => Err(SyntaxError::new(line, "missing command in pipeline")),
        Some(Arg::Func(_)) => Ok(Command { args }),
        Some(_) if args.len() > 1 => Err(SyntaxError::new(
            line,
            "can't give argument to non-function",
        )),
        Some(_) => Ok(Command { args }),
    }
}

fn matching_paren(tokens: &[Tok], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok {
            Tok::LParen => depth += 1,
            Tok::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
