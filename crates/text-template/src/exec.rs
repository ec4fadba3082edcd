//! Template execution against a `serde_json::Value`.

use serde_json::Value;

use crate::error::ExecError;
use crate::funcs::{Func, kind};
use crate::parse::{Arg, Command, Node, Pipeline};

/// Truthiness: false, zero, null and empty strings, arrays and maps are false.
pub(crate) fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form of a value. Null prints as nothing; composites print as JSON.
pub(crate) fn print(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        composite => composite.to_string(),
    }
}

pub(crate) struct Executor<'a> {
    name: &'a str,
    out: String,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(name: &'a str) -> Self {
        Self {
            name,
            out: String::new(),
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    pub(crate) fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<(), ExecError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action { line, pipeline } => {
                    let value = self.pipeline(pipeline, dot, *line)?;
                    self.out.push_str(&print(&value));
                }
                Node::If {
                    line,
                    branches,
                    otherwise,
                } => {
                    let mut taken = false;
                    for (condition, body) in branches {
                        if is_true(&self.pipeline(condition, dot, *line)?) {
                            self.walk(body, dot)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken && let Some(otherwise) = otherwise {
                        self.walk(otherwise, dot)?;
                    }
                }
                Node::With {
                    line,
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let value = self.pipeline(pipeline, dot, *line)?;
                    if is_true(&value) {
                        self.walk(body, &value)?;
                    } else if let Some(otherwise) = otherwise {
                        self.walk(otherwise, dot)?;
                    }
                }
                Node::Range {
                    line,
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let value = self.pipeline(pipeline, dot, *line)?;
                    let items: Vec<&Value> = match &value {
                        Value::Array(items) => items.iter().collect(),
                        // Maps range in sorted key order.
                        Value::Object(map) => {
                            let mut entries: Vec<_> = map.iter().collect();
                            entries.sort_by(|a, b| a.0.cmp(b.0));
                            entries.into_iter().map(|(_, v)| v).collect()
                        }
                        Value::Null => Vec::new(),
                        other => {
                            return Err(self.invalid(
                                *line,
                                format!("range can't iterate over {}", kind(other)),
                            ));
                        }
                    };
                    if items.is_empty() {
                        if let Some(otherwise) = otherwise {
                            self.walk(otherwise, dot)?;
                        }
                    } else {
                        for item in items {
                            self.walk(body, item)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &Pipeline, dot: &Value, line: usize) -> Result<Value, ExecError> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, dot, piped, line)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(
        &self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, ExecError> {
        match command.args.split_first() {
            // `and` and `or` stop at the first operand that decides the result.
            Some((Arg::Func(func @ (Func::And | Func::Or)), rest))
                if !rest.is_empty() || piped.is_some() =>
            {
                let decides = |value: &Value| is_true(value) == (*func == Func::Or);
                let mut last = None;
                for arg in rest {
                    let value = self.arg(arg, dot, line)?;
                    if decides(&value) {
                        return Ok(value);
                    }
                    last = Some(value);
                }
                Ok(piped.or(last).unwrap_or(Value::Null))
            }
            Some((Arg::Func(func), rest)) => {
                let mut args = rest
                    .iter()
                    .map(|arg| self.arg(arg, dot, line))
                    .collect::<Result<Vec<_>, _>>()?;
                args.extend(piped);
                func.call(args)
                    .map_err(|message| self.invalid(line, format!("{}: {message}", func.name())))
            }
            Some((arg, [])) => {
                if piped.is_some() {
                    return Err(self.invalid(line, "can't give argument to non-function"));
                }
                self.arg(arg, dot, line)
            }
            _ => Err(self.invalid(line, "can't give argument to non-function")),
        }
    }

    fn arg(&self, arg: &Arg, dot: &Value, line: usize) -> Result<Value, ExecError> {
        Ok(match arg {
            Arg::Field(path) => self.field(dot, path, line)?.clone(),
            Arg::Str(s) => Value::String(s.clone()),
            Arg::Int(i) => Value::from(*i),
            Arg::Float(f) => Value::from(*f),
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Nil => Value::Null,
            Arg::Func(func) => func
                .call(Vec::new())
                .map_err(|message| self.invalid(line, format!("{}: {message}", func.name())))?,
            Arg::Sub(pipeline) => self.pipeline(pipeline, dot, line)?,
        })
    }

    fn field<'v>(&self, dot: &'v Value, path: &[String], line: usize) -> Result<&'v Value, ExecError> {
        let mut current = dot;
        for (depth, segment) in path.iter().enumerate() {
            current = match current {
                Value::Object(map) => map.get(segment),
                _ => None,
            }
            .ok_or_else(|| ExecError::MissingField {
                name: self.name.to_string(),
                line,
                path: format!(".{}", path[..=depth].join(".")),
            })?;
        }
        Ok(current)
    }

    fn invalid(&self, line: usize, message: impl Into<String>) -> ExecError {
        ExecError::Invalid {
            name: self.name.to_string(),
            line,
            message: message.into(),
        }
    }
}
