//! Field extraction from JSON documents.
//!
//! Repositories address documents by dotted field paths (`a.b.c`). Values are
//! rendered to text for key derivation: strings verbatim, numbers and bools
//! via their display form. A null value counts as absent — a document never
//! gets indexed under an empty key.

use serde_json::Value;

use crate::{Error, Result};

/// Look up a dotted path inside a document. Returns `None` for a missing or
/// explicitly null field.
pub fn field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
  let mut current = doc;
  for part in path.split('.') {
    current = current.get(part)?;
  }
  if current.is_null() { None } else { Some(current) }
}

/// Text rendering of a field value, used to derive index keys.
pub fn field_text(doc: &Value, path: &str) -> Option<String> {
  field(doc, path).map(value_text)
}

fn value_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Resolve the primary key value of a document.
///
/// `primary` may be composite — parts joined by `+` in the field name produce
/// a derived value with parts joined by `_`. Any absent part fails with
/// [`Error::MissingPrimaryKey`].
pub fn primary_key_value(doc: &Value, primary: &str) -> Result<String> {
  let mut parts = Vec::new();
  for part in primary.split('+') {
    let text = field_text(doc, part)
      .ok_or_else(|| Error::MissingPrimaryKey(part.to_owned()))?;
    parts.push(text);
  }
  Ok(parts.join("_"))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn extracts_nested_and_scalar_fields() {
    let doc = json!({"id": "7", "count": 3, "ok": true, "meta": {"zone": "eu"}});

    assert_eq!(field_text(&doc, "id").as_deref(), Some("7"));
    assert_eq!(field_text(&doc, "count").as_deref(), Some("3"));
    assert_eq!(field_text(&doc, "ok").as_deref(), Some("true"));
    assert_eq!(field_text(&doc, "meta.zone").as_deref(), Some("eu"));
    assert_eq!(field_text(&doc, "missing"), None);
  }

  #[test]
  fn null_counts_as_absent() {
    let doc = json!({"id": null});
    assert_eq!(field_text(&doc, "id"), None);
  }

  #[test]
  fn composite_primary_key() {
    let doc = json!({"tenant": "acme", "id": 42});
    assert_eq!(primary_key_value(&doc, "tenant+id").unwrap(), "acme_42");
  }

  #[test]
  fn missing_composite_part_fails() {
    let doc = json!({"tenant": "acme"});
    let err = primary_key_value(&doc, "tenant+id").unwrap_err();
    assert!(matches!(err, Error::MissingPrimaryKey(ref f) if f == "id"));
  }
}
