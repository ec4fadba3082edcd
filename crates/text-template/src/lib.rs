//! Go-style text templates rendered against JSON values.
//!
//! Supports the subset of Go's `text/template` used by notification
//! templates: `{{.Field.Path}}`, `{{if}}`/`{{else if}}`/`{{else}}`,
//! `{{range}}`, `{{with}}`, comments, `{{-`/`-}}` trim markers, `|`
//! pipelines and a handful of built-in functions (`and`, `default`, `eq`,
//! `index`, `json`, `len`, `lower`, `ne`, `not`, `or`, `upper`).
//!
//! ```
//! use serde_json::json;
//! use text_template::Template;
//!
//! let tmpl = Template::parse("http_template", "Build {{.Build.Id}} {{.Build.Status | lower}}").unwrap();
//! let out = tmpl.render(&json!({"Build": {"Id": "b-1", "Status": "SUCCESS"}})).unwrap();
//! assert_eq!(out, "Build b-1 success");
//! ```

mod error;
mod exec;
mod funcs;
mod parse;

use serde::Serialize;

pub use error::{ExecError, ParseError};

use exec::Executor;
use parse::Node;

/// A parsed template. Immutable and shareable across threads.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`. `name` only appears in error messages.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, ParseError> {
        let name = name.into();
        let nodes = parse::parse(source).map_err(|e| ParseError {
            name: name.clone(),
            line: e.line,
            message: e.message,
        })?;
        Ok(Self { name, nodes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render against `data`.
    ///
    /// Referencing a field that `data` does not contain is an error.
    pub fn render(&self, data: &serde_json::Value) -> Result<String, ExecError> {
        let mut executor = Executor::new(&self.name);
        executor.walk(&self.nodes, data)?;
        Ok(executor.finish())
    }

    /// Serialize `view` to JSON and render against it.
    pub fn render_view<T: Serialize + ?Sized>(&self, view: &T) -> Result<String, ExecError> {
        let data = serde_json::to_value(view).map_err(|e| ExecError::Invalid {
            name: self.name.clone(),
            line: 0,
            message: format!("view is not serializable: {e}"),
        })?;
        self.render(&data)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    fn view() -> Value {
        json!({
            "Build": {
                "Id": "b-1",
                "Status": "SUCCESS",
                "LogUrl": "https://x/log?utm_medium=http",
                "Tags": ["nightly", "web"],
                "Substitutions": {"BRANCH_NAME": "main", "_ENV": "prod"},
                "BuildTriggerId": null,
                "Attempt": 2
            },
            "Params": {"team": "infra"}
        })
    }

    fn render(source: &str) -> Result<String, ExecError> {
        Template::parse("t", source).unwrap().render(&view())
    }

    #[rstest]
    #[case("Build {{.Build.Id}} succeeded", "Build b-1 succeeded")]
    #[case("{{.Params.team}}", "infra")]
    #[case("{{.Build.Attempt}}", "2")]
    #[case("[{{.Build.BuildTriggerId}}]", "[]")]
    #[case("{{if eq .Build.Status \"SUCCESS\"}}ok{{else}}bad{{end}}", "ok")]
    #[case("{{if .Build.BuildTriggerId}}t{{else if .Params.team}}p{{end}}", "p")]
    #[case("{{range .Build.Tags}}<{{.}}>{{end}}", "<nightly><web>")]
    #[case("{{range .Build.Substitutions}}{{.}};{{end}}", "main;prod;")]
    #[case("{{range .Build.BuildTriggerId}}x{{else}}none{{end}}", "none")]
    #[case("{{with .Build}}{{.Id}}{{end}}", "b-1")]
    #[case("{{.Build.Status | lower}}", "success")]
    #[case("{{.Build.BuildTriggerId | default \"manual\"}}", "manual")]
    #[case("{{index .Build.Substitutions \"_ENV\"}}", "prod")]
    #[case("{{len .Build.Tags}}", "2")]
    #[case("{{.Build.Id | json}}", "\"b-1\"")]
    #[case("{{upper (index .Build.Tags 1)}}", "WEB")]
    #[case("{{if and .Params.team (not .Build.BuildTriggerId)}}y{{end}}", "y")]
    #[case("{{if and .Build.BuildTriggerId .Build.BuildTriggerId.Name}}y{{else}}n{{end}}", "n")]
    #[case("{{or .Params.team .Params.absent}}", "infra")]
    #[case("{{and .Params.team .Build.Id}}", "b-1")]
    #[case("{{.Build.BuildTriggerId | or \"manual\"}}", "manual")]
    #[case("a\n  {{- /* dropped */ -}}\n  b", "ab")]
    fn renders(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(render(source).unwrap(), expected, "{source}");
    }

    #[test]
    fn literal_text_round_trips() {
        let literal = "plain text with { braces } and \"quotes\"\nacross lines";
        assert_eq!(render(literal).unwrap(), literal);
        assert_eq!(
            Template::parse("t", literal).unwrap().render(&Value::Null).unwrap(),
            literal
        );
    }

    #[test]
    fn missing_field_is_exec_error() {
        let err = render("ok\n{{.Build.Missing}}").unwrap_err();
        assert_eq!(
            err,
            ExecError::MissingField {
                name: "t".into(),
                line: 2,
                path: ".Build.Missing".into(),
            }
        );
    }

    #[test]
    fn missing_param_is_exec_error() {
        assert!(matches!(
            render("{{.Params.absent}}"),
            Err(ExecError::MissingField { .. })
        ));
    }

    #[test]
    fn range_over_scalar_fails() {
        assert!(matches!(
            render("{{range .Build.Id}}{{end}}"),
            Err(ExecError::Invalid { .. })
        ));
    }

    #[test]
    fn parse_error_names_template_and_line() {
        let err = Template::parse("http_template", "line one\n{{if .X}}").unwrap_err();
        assert_eq!(err.name, "http_template");
        assert_eq!(err.line, 2);
        assert!(err.to_string().starts_with("template: http_template:2:"));
    }

    #[test]
    fn unknown_function_fails_parse() {
        let err = Template::parse("t", "{{.X | shout}}").unwrap_err();
        assert!(err.message.contains("shout"));
    }

    #[test]
    fn render_view_serializes_structs() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct View {
            build_id: &'static str,
        }
        let tmpl = Template::parse("t", "{{.BuildId}}").unwrap();
        assert_eq!(tmpl.render_view(&View { build_id: "b-9" }).unwrap(), "b-9");
    }
}
