//! Cache keys and invalidation filters.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::api::{ClientError, QueryParams};

/// Identifies one cached resource: a resource path plus canonical parameters.
///
/// The resource is a slash-separated path without leading or trailing slashes
/// (`laboratory/orders`, `radiology/reports/42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  resource: String,
  params: QueryParams,
}

impl CacheKey {
  pub fn new(resource: impl AsRef<str>) -> Self {
    Self::with_params(resource, QueryParams::new())
  }

  pub fn with_params(resource: impl AsRef<str>, params: QueryParams) -> Self {
    Self {
      resource: normalize_resource(resource.as_ref()),
      params,
    }
  }

  /// Key for a resource filtered by any serializable filter object.
  pub fn from_filter<F: Serialize + ?Sized>(
    resource: impl AsRef<str>,
    filter: &F,
  ) -> Result<Self, ClientError> {
    Ok(Self::with_params(resource, QueryParams::from_filter(filter)?))
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn params(&self) -> &QueryParams {
    &self.params
  }

  /// Does this key fall under `filter`?
  pub fn matches(&self, filter: &KeyFilter) -> bool {
    match filter {
      KeyFilter::Exact(key) => key == self,
      KeyFilter::Resource(prefix) => {
        self.resource == *prefix
          || (self.resource.starts_with(prefix.as_str())
            && self.resource.as_bytes().get(prefix.len()) == Some(&b'/'))
      }
    }
  }

  /// SHA-256 of the canonical key, for log lines that must not carry
  /// patient identifiers from filter parameters.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.params.is_empty() {
      write!(f, "{}", self.resource)
    } else {
      write!(f, "{}?{}", self.resource, self.params)
    }
  }
}

/// Selects cache entries to invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
  /// Exactly this key
  Exact(CacheKey),
  /// Every key whose resource equals the prefix or lies beneath it,
  /// with any parameters
  Resource(String),
}

impl KeyFilter {
  pub fn resource(prefix: impl AsRef<str>) -> Self {
    Self::Resource(normalize_resource(prefix.as_ref()))
  }

  pub fn exact(key: CacheKey) -> Self {
    Self::Exact(key)
  }
}

fn normalize_resource(resource: &str) -> String {
  resource.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_equivalent_filters_share_a_key() {
    let a = CacheKey::from_filter(
      "patients",
      &json!({"page": 1, "page_size": 10, "search": null}),
    )
    .unwrap();
    let b = CacheKey::from_filter("/patients/", &json!({"page_size": 10, "page": 1})).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.to_string(), "patients?page=1&page_size=10");
  }

  #[test]
  fn test_different_params_differ() {
    let a = CacheKey::from_filter("patients", &json!({"page": 1})).unwrap();
    let b = CacheKey::from_filter("patients", &json!({"page": 2})).unwrap();
    assert_ne!(a, b);
    assert_ne!(a.fingerprint(), b.fingerprint());
  }

  #[test]
  fn test_resource_filter_matches_children_by_segment() {
    let filter = KeyFilter::resource("radiology/reports");

    assert!(CacheKey::new("radiology/reports").matches(&filter));
    assert!(CacheKey::new("radiology/reports/42").matches(&filter));
    assert!(CacheKey::from_filter("radiology/reports", &json!({"status": "draft"}))
      .unwrap()
      .matches(&filter));
    assert!(!CacheKey::new("radiology/reports-archive").matches(&filter));
    assert!(!CacheKey::new("radiology").matches(&filter));
  }

  #[test]
  fn test_exact_filter_requires_same_params() {
    let key = CacheKey::from_filter("laboratory/orders", &json!({"status": "pending"})).unwrap();
    assert!(key.matches(&KeyFilter::exact(key.clone())));
    assert!(!CacheKey::new("laboratory/orders").matches(&KeyFilter::exact(key)));
  }

  #[test]
  fn test_fingerprint_is_hex_sha256() {
    let fp = CacheKey::new("dashboard/stats").fingerprint();
    assert_eq!(fp.len(), 64);
    assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
