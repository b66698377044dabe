//! Query-string parameters built from filter structs.
//!
//! Filters are flattened into a sorted map so two deep-equal filters always
//! produce the same query string and the same cache key, whatever order the
//! caller set their fields in.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::error::ClientError;

/// Sorted, null-free query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Flatten a serializable filter into parameters.
  ///
  /// `null` fields are dropped, arrays become comma-joined values, and nested
  /// objects are flattened with dotted names (`range.from`).
  pub fn from_filter<F: Serialize + ?Sized>(filter: &F) -> Result<Self, ClientError> {
    let value =
      serde_json::to_value(filter).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
    let mut params = Self::new();
    match value {
      Value::Null => {}
      Value::Object(map) => {
        for (name, value) in map {
          params.insert_value(&name, value);
        }
      }
      other => {
        return Err(ClientError::InvalidRequest(format!(
          "query filter must serialize to an object, got {}",
          other
        )))
      }
    }
    Ok(params)
  }

  /// Builder-style insert, skipping `None`.
  pub fn with(mut self, name: &str, value: Option<impl ToString>) -> Self {
    if let Some(value) = value {
      self.0.insert(name.to_string(), value.to_string());
    }
    self
  }

  fn insert_value(&mut self, name: &str, value: Value) {
    match value {
      Value::Null => {}
      Value::String(s) => {
        self.0.insert(name.to_string(), s);
      }
      Value::Bool(b) => {
        self.0.insert(name.to_string(), b.to_string());
      }
      Value::Number(n) => {
        self.0.insert(name.to_string(), n.to_string());
      }
      Value::Array(items) => {
        let joined: Vec<String> = items
          .into_iter()
          .filter_map(|item| match item {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
          })
          .collect();
        if !joined.is_empty() {
          self.0.insert(name.to_string(), joined.join(","));
        }
      }
      Value::Object(map) => {
        for (child, value) in map {
          self.insert_value(&format!("{}.{}", name, child), value);
        }
      }
    }
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// URL-encoded query string without the leading `?`.
  pub fn to_query_string(&self) -> String {
    url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.iter())
      .finish()
  }
}

/// Canonical `name=value&...` form (unencoded), used for cache keys.
impl fmt::Display for QueryParams {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    write!(f, "{}", parts.join("&"))
  }
}
