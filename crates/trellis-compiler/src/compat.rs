//! Schema compatibility between a producer's output and a consumer's input.
//!
//! Only the `type`, `properties`, and `items` keywords are inspected; the
//! check is a recursive structural fit, not full JSON Schema validation.
//! Every error is paired with a suggestion the caller can surface verbatim.

use serde_json::Value;

/// Outcome of a compatibility check.
#[derive(Debug, Clone, Default)]
pub struct SchemaCheck {
  pub compatible: bool,
  pub errors: Vec<String>,
  pub suggestions: Vec<String>,
}

/// Check whether `producer_output` structurally satisfies `consumer_input`.
pub fn check_compatibility(producer_output: &Value, consumer_input: &Value) -> SchemaCheck {
  let mut check = SchemaCheck {
    compatible: true,
    errors: Vec::new(),
    suggestions: Vec::new(),
  };

  let Some(required) = properties(consumer_input).filter(|props| !props.is_empty()) else {
    // A consumer without required properties accepts anything.
    return check;
  };

  let Some(produced) = properties(producer_output).filter(|props| !props.is_empty()) else {
    check.compatible = false;
    check
      .errors
      .push("The parent node produces no output properties but this node requires input".to_string());
    check
      .suggestions
      .push("Define output properties on the parent node's schema".to_string());
    return check;
  };

  for (name, consumer_schema) in required {
    match produced.get(name) {
      None => record_missing(&mut check, name, name, Some(produced)),
      Some(producer_schema) => {
        check_property(&mut check, name, producer_schema, consumer_schema);
      }
    }
  }

  check.compatible = check.errors.is_empty();
  check
}

fn check_property(check: &mut SchemaCheck, path: &str, producer: &Value, consumer: &Value) {
  let producer_type = producer.get("type").and_then(Value::as_str);
  let consumer_type = consumer.get("type").and_then(Value::as_str);

  if let (Some(produced), Some(required)) = (producer_type, consumer_type) {
    if produced != required {
      check.errors.push(format!(
        "Property '{path}' has type '{produced}' but '{required}' is required"
      ));
      check.suggestions.push(format!(
        "Convert '{path}' to '{required}' before this node"
      ));
      // A mismatched type makes any nested comparison meaningless.
      return;
    }
  }

  if consumer_type == Some("object") || consumer.get("properties").is_some() {
    let Some(required) = properties(consumer) else {
      return;
    };
    let produced = properties(producer);
    for (name, consumer_schema) in required {
      let nested_path = format!("{path}.{name}");
      match produced.and_then(|props| props.get(name)) {
        None => record_missing(check, &nested_path, name, produced),
        Some(producer_schema) => {
          check_property(check, &nested_path, producer_schema, consumer_schema);
        }
      }
    }
    return;
  }

  if consumer_type == Some("array") {
    match (producer.get("items"), consumer.get("items")) {
      (_, None) => {}
      (None, Some(_)) => {
        check.errors.push(format!(
          "Property '{path}' items are unspecified in the parent output"
        ));
        check.suggestions.push(format!(
          "Describe the items of '{path}' in the parent output schema"
        ));
      }
      (Some(producer_items), Some(consumer_items)) => {
        check_property(check, &format!("{path}[]"), producer_items, consumer_items);
      }
    }
  }
}

fn record_missing(
  check: &mut SchemaCheck,
  path: &str,
  name: &str,
  produced: Option<&serde_json::Map<String, Value>>,
) {
  check
    .errors
    .push(format!("Required property '{path}' is missing from the parent output"));
  check.suggestions.push(match similar_field(name, produced) {
    Some(candidate) => format!("Consider mapping '{candidate}' to '{name}'"),
    None => format!("Add a '{name}' field to the parent output"),
  });
}

/// A produced field whose name contains, or is contained in, `name`.
fn similar_field<'a>(
  name: &str,
  produced: Option<&'a serde_json::Map<String, Value>>,
) -> Option<&'a str> {
  let wanted = name.to_lowercase();
  produced?
    .keys()
    .find(|key| {
      let key = key.to_lowercase();
      key.contains(&wanted) || wanted.contains(&key)
    })
    .map(String::as_str)
}

fn properties(schema: &Value) -> Option<&serde_json::Map<String, Value>> {
  schema.get("properties").and_then(Value::as_object)
}
