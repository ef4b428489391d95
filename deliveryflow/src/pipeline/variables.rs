//! Cross-stage variable namespaces.
//!
//! A deploy action publishes its stack outputs under its namespace; later
//! actions reference them as `#{Namespace.Key}`. Lookups are exact and
//! case-sensitive.

use crate::errors::VariableError;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-]+)\}").expect("valid reference pattern")
});

/// Formats a `#{Namespace.Key}` reference.
#[must_use]
pub fn variable_reference(namespace: &str, key: &str) -> String {
    format!("#{{{namespace}.{key}}}")
}

/// Returns the `(namespace, key)` pairs referenced anywhere in a JSON value,
/// in document order.
#[must_use]
pub fn references(value: &serde_json::Value) -> Vec<(String, String)> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &serde_json::Value, found: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::String(s) => {
            for caps in REFERENCE.captures_iter(s) {
                found.push((caps[1].to_string(), caps[2].to_string()));
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_references(item, found);
            }
        }
        _ => {}
    }
}

/// Variables published during one run.
#[derive(Debug, Default)]
pub struct VariableStore {
    namespaces: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes outputs under a namespace, replacing earlier values of the
    /// same keys.
    pub fn publish(&self, namespace: &str, outputs: &BTreeMap<String, String>) {
        let mut namespaces = self.namespaces.write();
        let entry = namespaces.entry(namespace.to_string()).or_default();
        for (key, value) in outputs {
            entry.insert(key.clone(), value.clone());
        }
    }

    /// Returns true if a namespace has been published.
    #[must_use]
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.read().contains_key(namespace)
    }

    /// Returns the published namespaces.
    #[must_use]
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.namespaces.read().keys().cloned().collect()
    }

    /// Looks up one variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace or key was never published.
    pub fn get(&self, namespace: &str, key: &str) -> Result<String, VariableError> {
        let namespaces = self.namespaces.read();
        let outputs = namespaces
            .get(namespace)
            .ok_or_else(|| VariableError::UnknownNamespace {
                namespace: namespace.to_string(),
            })?;
        outputs
            .get(key)
            .cloned()
            .ok_or_else(|| VariableError::UnknownKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    /// Returns a copy of every variable, keyed by namespace.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.namespaces.read().clone()
    }

    /// Replaces every reference inside a JSON value with its published
    /// value. Non-string values pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the first reference that cannot be resolved.
    pub fn resolve(&self, value: &serde_json::Value) -> Result<serde_json::Value, VariableError> {
        match value {
            serde_json::Value::String(s) => Ok(serde_json::Value::String(self.resolve_str(s)?)),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve(item)?);
                }
                Ok(serde_json::Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_str(&self, input: &str) -> Result<String, VariableError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in REFERENCE.captures_iter(input) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&input[last..whole.start]);
            out.push_str(&self.get(&caps[1], &caps[2])?);
            last = whole.end;
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> VariableStore {
        let store = VariableStore::new();
        store.publish(
            "Deploy_Application_Ns",
            &BTreeMap::from([
                ("KinesisInputStreamName".to_string(), "input-X".to_string()),
                ("FirehoseOutputBucket".to_string(), "bucket-Y".to_string()),
            ]),
        );
        store
    }

    #[test]
    fn test_reference_format() {
        assert_eq!(
            variable_reference("Deploy_Application_Ns", "KinesisInputStreamName"),
            "#{Deploy_Application_Ns.KinesisInputStreamName}"
        );
    }

    #[test]
    fn test_resolve_object() {
        let input = json!({
            "KinesisInputStreamName": "#{Deploy_Application_Ns.KinesisInputStreamName}",
            "FirehoseOutputBucket": "#{Deploy_Application_Ns.FirehoseOutputBucket}",
            "waitSeconds": "30",
            "record_count": 1000,
        });

        assert_eq!(
            store().resolve(&input).unwrap(),
            json!({
                "KinesisInputStreamName": "input-X",
                "FirehoseOutputBucket": "bucket-Y",
                "waitSeconds": "30",
                "record_count": 1000,
            })
        );
    }

    #[test]
    fn test_resolve_embedded_reference() {
        let value = json!(["s3://#{Deploy_Application_Ns.FirehoseOutputBucket}/out"]);
        assert_eq!(store().resolve(&value).unwrap(), json!(["s3://bucket-Y/out"]));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let err = store()
            .get("Deploy_Application_Ns", "kinesisInputStreamName")
            .unwrap_err();
        assert!(matches!(err, VariableError::UnknownKey { .. }));
    }

    #[test]
    fn test_unknown_namespace() {
        let err = store()
            .resolve(&json!("#{Other_Ns.Key}"))
            .unwrap_err();
        assert_eq!(
            err,
            VariableError::UnknownNamespace {
                namespace: "Other_Ns".to_string()
            }
        );
    }

    #[test]
    fn test_references_in_document_order() {
        let value = json!({
            "a": "#{Ns1.A}",
            "b": ["#{Ns2.B} and #{Ns1.C}"],
            "c": 3,
        });
        assert_eq!(
            references(&value),
            vec![
                ("Ns1".to_string(), "A".to_string()),
                ("Ns2".to_string(), "B".to_string()),
                ("Ns1".to_string(), "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_publish_merges() {
        let store = store();
        store.publish(
            "Deploy_Application_Ns",
            &BTreeMap::from([("FirehoseOutputBucket".to_string(), "bucket-Z".to_string())]),
        );
        assert_eq!(store.get("Deploy_Application_Ns", "FirehoseOutputBucket").unwrap(), "bucket-Z");
        assert_eq!(store.get("Deploy_Application_Ns", "KinesisInputStreamName").unwrap(), "input-X");
        assert!(store.has_namespace("Deploy_Application_Ns"));
    }
}
