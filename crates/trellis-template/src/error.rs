use std::fmt;

use thiserror::Error;

/// The three namespaces a template expression can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
  Input,
  Context,
  State,
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Namespace::Input => "input",
      Namespace::Context => "context",
      Namespace::State => "state",
    };
    f.write_str(name)
  }
}

/// Context fields callers are expected to provide, used to enrich
/// reference errors against the `context` namespace.
pub const KNOWN_CONTEXT_FIELDS: &[&str] = &["userId", "username", "firstName", "lastName", "email"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
  /// A `{{namespace.path}}` expression pointed at a value that is absent.
  #[error("missing reference '{reference}' on {field}")]
  Reference { field: Namespace, reference: String },

  /// The template engine rejected the string.
  #[error("template rendering failed: {message}")]
  Render { message: String },
}

impl TemplateError {
  /// A message suitable for surfacing to the workflow author. Misses on the
  /// `context` namespace list the fields callers are known to provide.
  pub fn human_readable_message(&self) -> String {
    match self {
      TemplateError::Reference {
        field: Namespace::Context,
        reference,
      } => format!(
        "The reference '{{{{context.{reference}}}}}' could not be resolved. \
         Known context fields are: {}.",
        KNOWN_CONTEXT_FIELDS.join(", ")
      ),
      TemplateError::Reference { field, reference } => format!(
        "The reference '{{{{{field}.{reference}}}}}' could not be resolved: \
         '{reference}' is not present on the {field} value."
      ),
      TemplateError::Render { message } => message.clone(),
    }
  }
}
