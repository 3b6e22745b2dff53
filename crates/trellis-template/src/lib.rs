//! Trellis Template
//!
//! Recursive expansion of `{{input.*}}`, `{{context.*}}`, and `{{state.*}}`
//! expressions inside JSON values, used by fixed-input nodes.
//!
//! Strings are rendered with minijinja; before rendering, every expression
//! rooted at one of the three namespaces is checked against the bindings so
//! that a missing path surfaces as a typed [`TemplateError::Reference`]
//! instead of engine output. A string that consists of a single expression
//! resolves to the referenced value itself, preserving its type:
//!
//! ```
//! use serde_json::json;
//! use trellis_template::{Bindings, resolve};
//!
//! let bindings = Bindings::new(json!({"count": 3}), json!({}), json!({}));
//! let rendered = resolve(&json!("{{input.count}}"), &bindings).unwrap();
//! assert_eq!(rendered, json!(3));
//! ```

mod error;

use minijinja::Environment;
use serde_json::Value;

pub use error::{KNOWN_CONTEXT_FIELDS, Namespace, TemplateError};

/// The values template expressions resolve against.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
  pub input: Value,
  pub context: Value,
  pub state: Value,
}

impl Bindings {
  pub fn new(input: Value, context: Value, state: Value) -> Self {
    Self {
      input,
      context,
      state,
    }
  }
}

/// Recursively expand template expressions in `value`.
///
/// Arrays map element-wise, objects value-wise, and non-string primitives
/// pass through untouched. String handling is described at the crate level.
pub fn resolve(value: &Value, bindings: &Bindings) -> Result<Value, TemplateError> {
  match value {
    Value::String(text) => resolve_string(text, bindings),
    Value::Array(items) => items
      .iter()
      .map(|item| resolve(item, bindings))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(entries) => {
      let mut resolved = serde_json::Map::with_capacity(entries.len());
      for (key, entry) in entries {
        resolved.insert(key.clone(), resolve(entry, bindings)?);
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}

fn resolve_string(text: &str, bindings: &Bindings) -> Result<Value, TemplateError> {
  if !text.contains("{{") && !text.contains("{%") {
    return Ok(Value::String(text.to_string()));
  }

  // A lone expression resolves to the referenced value, keeping its type.
  if let Some(expression) = pure_expression(text) {
    if let Some((namespace, path)) = parse_reference(expression) {
      return lookup(namespace, &path, bindings).cloned();
    }
  }

  // Check every namespace reference before handing the string to the
  // template engine, so misses carry the namespace and dotted path.
  for expression in expressions(text) {
    if let Some((namespace, path)) = parse_reference(expression) {
      lookup(namespace, &path, bindings)?;
    }
  }

  let env = Environment::new();
  let rendered = env
    .render_str(
      text,
      minijinja::context! {
        input => bindings.input,
        context => bindings.context,
        state => bindings.state,
      },
    )
    .map_err(|e| TemplateError::Render {
      message: e.to_string(),
    })?;
  Ok(Value::String(rendered))
}

/// The inner text when the whole string is a single `{{ ... }}` expression.
fn pure_expression(text: &str) -> Option<&str> {
  let trimmed = text.trim();
  let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") {
    return None;
  }
  Some(inner.trim())
}

/// All `{{ ... }}` expression bodies in order of appearance.
fn expressions(text: &str) -> Vec<&str> {
  let mut found = Vec::new();
  let mut rest = text;
  while let Some(start) = rest.find("{{") {
    let after = &rest[start + 2..];
    let Some(end) = after.find("}}") else {
      break;
    };
    found.push(after[..end].trim());
    rest = &after[end + 2..];
  }
  found
}

/// Split a bare dotted path rooted at one of the namespaces.
///
/// Expressions carrying filters are validated on the path before the first
/// `|`; anything that is not a plain dotted path (literals, arithmetic,
/// unknown roots) is left to the template engine.
fn parse_reference(expression: &str) -> Option<(Namespace, Vec<String>)> {
  let path = expression.split('|').next().unwrap_or("").trim();
  if path.is_empty()
    || !path
      .chars()
      .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '$'))
  {
    return None;
  }
  let mut segments = path.split('.');
  let namespace = match segments.next()? {
    "input" => Namespace::Input,
    "context" => Namespace::Context,
    "state" => Namespace::State,
    _ => return None,
  };
  let rest: Vec<String> = segments.map(str::to_string).collect();
  if rest.iter().any(String::is_empty) {
    return None;
  }
  Some((namespace, rest))
}

fn lookup<'a>(
  namespace: Namespace,
  path: &[String],
  bindings: &'a Bindings,
) -> Result<&'a Value, TemplateError> {
  let mut current = match namespace {
    Namespace::Input => &bindings.input,
    Namespace::Context => &bindings.context,
    Namespace::State => &bindings.state,
  };
  for segment in path {
    let next = match current {
      Value::Object(entries) => entries.get(segment),
      Value::Array(items) => segment
        .parse::<usize>()
        .ok()
        .and_then(|index| items.get(index)),
      _ => None,
    };
    current = next.ok_or_else(|| TemplateError::Reference {
      field: namespace,
      reference: path.join("."),
    })?;
  }
  Ok(current)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn bindings() -> Bindings {
    Bindings::new(
      json!({"firstName": "John", "price": 42000, "nested": {"symbol": "BTCUSDT"}}),
      json!({"lastName": "Doe"}),
      json!({"hasSent": true}),
    )
  }

  #[test]
  fn plain_strings_pass_through() {
    let b = bindings();
    assert_eq!(resolve(&json!("hello"), &b).unwrap(), json!("hello"));
    assert_eq!(resolve(&json!(""), &b).unwrap(), json!(""));
  }

  #[test]
  fn non_strings_pass_through() {
    let b = bindings();
    assert_eq!(resolve(&json!(7), &b).unwrap(), json!(7));
    assert_eq!(resolve(&json!(null), &b).unwrap(), json!(null));
    assert_eq!(resolve(&json!(true), &b).unwrap(), json!(true));
  }

  #[test]
  fn renders_mixed_string_across_namespaces() {
    let b = bindings();
    let rendered = resolve(
      &json!({"fullName": "{{input.firstName}} {{context.lastName}}"}),
      &b,
    )
    .unwrap();
    assert_eq!(rendered, json!({"fullName": "John Doe"}));
  }

  #[test]
  fn pure_template_preserves_value_type() {
    let b = bindings();
    assert_eq!(resolve(&json!("{{input.price}}"), &b).unwrap(), json!(42000));
    assert_eq!(resolve(&json!("{{state.hasSent}}"), &b).unwrap(), json!(true));
    assert_eq!(
      resolve(&json!("{{input.nested}}"), &b).unwrap(),
      json!({"symbol": "BTCUSDT"})
    );
  }

  #[test]
  fn whole_input_reference_returns_the_value() {
    let b = bindings();
    let rendered = resolve(&json!("{{input}}"), &b).unwrap();
    assert_eq!(rendered, b.input);
  }

  #[test]
  fn missing_input_path_is_a_reference_error() {
    let b = bindings();
    let err = resolve(&json!("{{input.missing}}"), &b).unwrap_err();
    assert_eq!(
      err,
      TemplateError::Reference {
        field: Namespace::Input,
        reference: "missing".to_string(),
      }
    );
  }

  #[test]
  fn missing_deep_path_reports_full_reference() {
    let b = Bindings::new(json!(null), json!({}), json!({}));
    let err = resolve(&json!("{{input.x.y}}"), &b).unwrap_err();
    assert_eq!(
      err,
      TemplateError::Reference {
        field: Namespace::Input,
        reference: "x.y".to_string(),
      }
    );
  }

  #[test]
  fn missing_reference_inside_mixed_string_is_detected() {
    let b = bindings();
    let err = resolve(&json!("Hello {{context.firstName}}!"), &b).unwrap_err();
    assert_eq!(
      err,
      TemplateError::Reference {
        field: Namespace::Context,
        reference: "firstName".to_string(),
      }
    );
  }

  #[test]
  fn context_miss_lists_known_fields() {
    let err = TemplateError::Reference {
      field: Namespace::Context,
      reference: "missing".to_string(),
    };
    let message = err.human_readable_message();
    assert!(message.contains("{{context.missing}}"));
    assert!(message.contains("firstName"));
  }

  #[test]
  fn walks_arrays_and_objects() {
    let b = bindings();
    let rendered = resolve(
      &json!({"symbols": ["{{input.nested.symbol}}", "static"], "depth": {"price": "{{input.price}}"}}),
      &b,
    )
    .unwrap();
    assert_eq!(
      rendered,
      json!({"symbols": ["BTCUSDT", "static"], "depth": {"price": 42000}})
    );
  }

  #[test]
  fn array_index_segments_resolve() {
    let b = Bindings::new(json!({"items": ["a", "b"]}), json!({}), json!({}));
    assert_eq!(resolve(&json!("{{input.items.1}}"), &b).unwrap(), json!("b"));
  }

  #[test]
  fn unknown_roots_are_left_to_the_engine() {
    let b = bindings();
    let rendered = resolve(&json!("{{other}}"), &b).unwrap();
    assert_eq!(rendered, json!(""));
  }

  #[test]
  fn number_interpolated_into_text() {
    let b = bindings();
    let rendered = resolve(&json!("BTC {{input.price}}"), &b).unwrap();
    assert_eq!(rendered, json!("BTC 42000"));
  }
}
