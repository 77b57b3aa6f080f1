//! Structural helpers for JSON-like configuration documents.
//!
//! The diff engine compares open-ended nested documents, so these operate on
//! [`serde_json::Value`] rather than fixed types. "Emptiness" here means
//! "the caller supplied nothing meaningful": null, empty string, and
//! containers holding only empty values. An explicitly-empty network config
//! block is the one carve-out, because empty subnet/security-group lists are
//! a meaningful detach instruction rather than an absence of input.

use serde_json::{Map, Value};

/// The two keys identifying a network configuration block.
const SUBNET_IDS: &str = "SubnetIds";
const SECURITY_GROUP_IDS: &str = "SecurityGroupIds";

/// Structural equality for JSON-like values.
///
/// Scalars compare by value; arrays are order-sensitive; maps compare by key
/// set and pairwise values. An array and a non-array object are never equal.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left.iter().zip(right.iter()).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| deep_equal(value, other)))
        }
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        (left, right) => left == right,
    }
}

/// Whether a value carries no meaningful content.
///
/// `0` and `false` are meaningful; a map carrying a network-config key is
/// never empty, whatever its contents.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.iter().all(is_empty_value),
        Value::Object(map) => {
            if map.contains_key(SUBNET_IDS) || map.contains_key(SECURITY_GROUP_IDS) {
                return false;
            }
            map.values().all(is_empty_value)
        }
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Recursively strip meaningless leaves and containers from a document.
///
/// Returns `None` when nothing meaningful remains. Network-config keys are
/// preserved verbatim (defaulted to empty arrays when absent or non-array)
/// so that "detach from network" survives the pruning.
#[must_use]
pub fn clean_null_keys(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let filtered: Vec<Value> = items
                .iter()
                .filter(|item| !is_empty_value(item))
                .cloned()
                .collect();
            if filtered.is_empty() {
                None
            } else {
                Some(Value::Array(filtered))
            }
        }
        Value::Object(map) => {
            let is_network_config =
                map.contains_key(SUBNET_IDS) || map.contains_key(SECURITY_GROUP_IDS);
            let mut result = Map::new();

            for (key, entry) in map {
                if is_network_config && (key == SUBNET_IDS || key == SECURITY_GROUP_IDS) {
                    let preserved = match entry {
                        Value::Array(_) => entry.clone(),
                        _ => Value::Array(Vec::new()),
                    };
                    result.insert(key.clone(), preserved);
                    continue;
                }

                if entry.is_null() || entry.as_str().is_some_and(str::is_empty) {
                    continue;
                }

                if let Some(cleaned) = clean_null_keys(entry) {
                    result.insert(key.clone(), cleaned);
                }
            }

            if result.is_empty() {
                None
            } else {
                Some(Value::Object(result))
            }
        }
        scalar => Some(scalar.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_equal_is_reflexive_and_symmetric() {
        let samples = vec![
            json!(null),
            json!(true),
            json!(0),
            json!("text"),
            json!([1, 2, [3]]),
            json!({"a": {"b": [1, 2]}, "c": null}),
        ];

        for a in &samples {
            assert!(deep_equal(a, a));
            for b in &samples {
                assert_eq!(deep_equal(a, b), deep_equal(b, a));
            }
        }
    }

    #[test]
    fn deep_equal_arrays_of_different_length() {
        assert!(!deep_equal(&json!([1, 2]), &json!([1, 2, 3])));
    }

    #[test]
    fn deep_equal_arrays_are_order_sensitive() {
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(deep_equal(&json!([1, 2]), &json!([1, 2])));
    }

    #[test]
    fn deep_equal_maps_ignore_key_order() {
        assert!(deep_equal(
            &json!({"a": 1, "b": 2}),
            &json!({"b": 2, "a": 1})
        ));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn deep_equal_array_never_equals_map() {
        assert!(!deep_equal(&json!([1]), &json!({"0": 1})));
    }

    #[test]
    fn deep_equal_object_never_equals_scalar() {
        assert!(!deep_equal(&json!({}), &json!(0)));
        assert!(!deep_equal(&json!("x"), &json!({"x": 1})));
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!(["", null])));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!({"a": "", "b": null})));

        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!("x")));
        assert!(!is_empty_value(&json!([0])));
    }

    #[test]
    fn network_config_is_never_empty() {
        assert!(!is_empty_value(&json!({
            "SubnetIds": [],
            "SecurityGroupIds": []
        })));
        assert!(!is_empty_value(&json!({"SubnetIds": []})));
    }

    #[test]
    fn clean_strips_meaningless_leaves() {
        let cleaned = clean_null_keys(&json!({"a": null, "b": "", "d": 1}));
        assert_eq!(cleaned, Some(json!({"d": 1})));
    }

    #[test]
    fn clean_keeps_zero_and_false() {
        let cleaned = clean_null_keys(&json!({"retries": 0, "flag": false}));
        assert_eq!(cleaned, Some(json!({"retries": 0, "flag": false})));
    }

    #[test]
    fn clean_returns_none_when_nothing_remains() {
        assert_eq!(clean_null_keys(&json!(null)), None);
        assert_eq!(clean_null_keys(&json!("")), None);
        assert_eq!(clean_null_keys(&json!({"a": null, "b": ""})), None);
        assert_eq!(clean_null_keys(&json!({"a": {"b": []}})), None);
    }

    #[test]
    fn clean_preserves_explicit_network_detach() {
        let cleaned = clean_null_keys(&json!({
            "VpcConfig": {"SubnetIds": [], "SecurityGroupIds": []}
        }));
        assert_eq!(
            cleaned,
            Some(json!({
                "VpcConfig": {"SubnetIds": [], "SecurityGroupIds": []}
            }))
        );
    }

    #[test]
    fn clean_defaults_missing_network_key_to_empty_array() {
        let cleaned = clean_null_keys(&json!({"SubnetIds": null, "SecurityGroupIds": ["sg-1"]}));
        assert_eq!(
            cleaned,
            Some(json!({"SubnetIds": [], "SecurityGroupIds": ["sg-1"]}))
        );
    }

    #[test]
    fn clean_filters_empty_array_elements() {
        let cleaned = clean_null_keys(&json!(["", "a", null, "b"]));
        assert_eq!(cleaned, Some(json!(["a", "b"])));
        assert_eq!(clean_null_keys(&json!(["", null])), None);
    }
}
