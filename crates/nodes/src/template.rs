//! Template rendering and expression evaluation for node form values.
//!
//! Form fields may contain `{{ … }}` expressions referencing the incoming
//! payload under the `data` name (`{{ data.name|upper }}`). Conditional
//! and loop nodes additionally evaluate bare expressions
//! (`data.counter.current > 2`) against the same context.
//!
//! Environments are built per call: expression sources live only for the
//! duration of the evaluation, so nothing borrows past the node's run.

use minijinja::{context, Environment};
use serde_json::Value;

use crate::payload::DataMap;

/// Whether a raw form value contains template syntax.
pub fn contains_template(raw: &str) -> bool {
    raw.contains("{{") && raw.contains("}}")
}

/// Render a template string against `{"data": data}`.
pub fn render(raw: &str, data: &DataMap) -> Result<String, minijinja::Error> {
    let env = Environment::new();
    env.render_str(raw, context! { data => data })
}

/// Evaluate an expression against `{"data": data}` and return its value.
pub fn eval_expression(expr: &str, data: &DataMap) -> Result<Value, minijinja::Error> {
    let env = Environment::new();
    let compiled = env.compile_expression(expr)?;
    let result = compiled.eval(context! { data => data })?;
    Ok(serde_json::to_value(&result).unwrap_or(Value::Null))
}

/// Evaluate an expression and reduce it to its truthiness.
pub fn eval_bool(expr: &str, data: &DataMap) -> Result<bool, minijinja::Error> {
    let env = Environment::new();
    let compiled = env.compile_expression(expr)?;
    Ok(compiled.eval(context! { data => data })?.is_true())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> DataMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn detects_template_syntax() {
        assert!(contains_template("{{ data.name }}"));
        assert!(!contains_template("plain text"));
        assert!(!contains_template("{{unclosed"));
    }

    #[test]
    fn renders_with_filters() {
        let d = data(json!({ "name": "Ada" }));
        assert_eq!(render("{{ data.name|upper }}", &d).unwrap(), "ADA");
    }

    #[test]
    fn evaluates_comparison_expressions() {
        let d = data(json!({ "counter": { "current": 3 } }));
        assert!(eval_bool("data.counter.current > 2", &d).unwrap());
        assert!(!eval_bool("data.counter.current > 5", &d).unwrap());
    }

    #[test]
    fn evaluates_path_expressions_to_values() {
        let d = data(json!({ "list": [1, 2, 3] }));
        assert_eq!(eval_expression("data.list", &d).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn invalid_expression_is_an_error() {
        assert!(eval_bool("data.(", &DataMap::new()).is_err());
    }
}
