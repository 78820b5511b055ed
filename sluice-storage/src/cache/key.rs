//! Deterministic cache keys.
//!
//! A key is derived from a namespace plus a parameter mapping. Parameters
//! are sorted by name before serialization, so two mappings holding the
//! same pairs always produce the same key no matter how they were built.
//!
//! # Format
//!
//! - Parameterised keys: `<namespace>:<canonical json object>`, e.g.
//!   `dataflow-search:{"limit":50,"offset":0,"query":"sales"}`
//! - Single-entity merged responses: `dual:<kind>:<id>`

use serde_json::Value;
use sluice_core::EntityKind;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of keys holding merged single-entity responses.
pub const DUAL_PREFIX: &str = "dual";

/// A cache key string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a namespace and parameter pairs.
    ///
    /// Parameters whose value is `null` are left out, so an unset optional
    /// parameter and a missing one produce the same key.
    pub fn generate<I, K, V>(namespace: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let canonical: BTreeMap<String, Value> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_null())
            .collect();
        // A BTreeMap of strings and JSON values always serializes
        let body = serde_json::to_string(&canonical).unwrap_or_else(|_| "{}".to_string());
        Self(format!("{}:{}", namespace, body))
    }

    /// Key for the merged response of one entity: `dual:<kind>:<id>`.
    pub fn dual(kind: EntityKind, id: &str) -> Self {
        Self(format!("{}:{}:{}", DUAL_PREFIX, kind.as_str(), id))
    }

    /// Wrap an already-formed key.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_generate_sorts_fields() {
        let key = CacheKey::generate(
            "dataflow-search",
            [("query", json!("sales")), ("limit", json!(50)), ("offset", json!(0))],
        );
        assert_eq!(
            key.as_str(),
            r#"dataflow-search:{"limit":50,"offset":0,"query":"sales"}"#
        );
    }

    #[test]
    fn test_null_params_are_omitted() {
        let with_null = CacheKey::generate("ns", [("a", json!(1)), ("sort", Value::Null)]);
        let without = CacheKey::generate("ns", [("a", json!(1))]);
        assert_eq!(with_null, without);
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let a = CacheKey::generate("dataflow-search", [("q", "x")]);
        let b = CacheKey::generate("dataset-search", [("q", "x")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_dual_key_format() {
        assert_eq!(
            CacheKey::dual(EntityKind::Dataflow, "123").as_str(),
            "dual:dataflow:123"
        );
    }

    fn scalar_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::from),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: key generation is independent of parameter order.
        #[test]
        fn prop_key_is_order_independent(
            params in proptest::collection::btree_map("[a-z]{1,8}", scalar_strategy(), 0..8),
        ) {
            let forward: Vec<(String, Value)> =
                params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            prop_assert_eq!(
                CacheKey::generate("ns", forward),
                CacheKey::generate("ns", reversed)
            );
        }

        /// Property: different parameter sets produce different keys.
        #[test]
        fn prop_key_distinguishes_values(a in any::<i64>(), b in any::<i64>()) {
            let ka = CacheKey::generate("ns", [("limit", a)]);
            let kb = CacheKey::generate("ns", [("limit", b)]);
            prop_assert_eq!(a == b, ka == kb);
        }
    }
}
