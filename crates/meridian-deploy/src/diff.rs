//! Configuration drift detection.
//!
//! Compares the desired configuration document against the remote snapshot
//! field by field. Only fields present in the desired document participate;
//! remote fields the caller never mentioned are left alone.

use serde_json::Value;
use tracing::info;

use crate::client::FunctionConfig;
use crate::value::{clean_null_keys, deep_equal};

/// Whether the desired configuration differs from the remote snapshot.
///
/// An empty snapshot always counts as changed so a freshly created function
/// gets its configuration applied. Desired fields that clean down to nothing
/// are ignored entirely.
#[must_use]
pub fn has_configuration_changed(current: &FunctionConfig, desired: &Value) -> bool {
    if current.is_empty() {
        return true;
    }

    let Some(Value::Object(desired)) = clean_null_keys(desired) else {
        return false;
    };

    let mut changed = false;
    for (key, desired_value) in &desired {
        let current_value = current.get(key);

        match desired_value {
            Value::Object(_) | Value::Array(_) => {
                // A null remote field compares as an empty block, so setting
                // a block on a function that never had one registers as drift.
                let empty = Value::Object(serde_json::Map::new());
                let current_value = match current_value {
                    Some(Value::Null) | None => &empty,
                    Some(v) => v,
                };
                if !deep_equal(desired_value, current_value) {
                    info!(field = %key, "configuration change detected");
                    changed = true;
                }
            }
            scalar => match current_value {
                Some(current_scalar) if current_scalar == scalar => {}
                Some(current_scalar) => {
                    info!(
                        field = %key,
                        from = %current_scalar,
                        to = %scalar,
                        "configuration change detected"
                    );
                    changed = true;
                }
                None => {
                    info!(field = %key, to = %scalar, "configuration change detected");
                    changed = true;
                }
            },
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(body: serde_json::Value) -> FunctionConfig {
        FunctionConfig::from_value(body)
    }

    #[test]
    fn empty_snapshot_always_changed() {
        let current = FunctionConfig::default();
        assert!(has_configuration_changed(&current, &json!({})));
    }

    #[test]
    fn identical_scalars_are_unchanged() {
        let current = snapshot(json!({"MemorySize": 256, "Timeout": 30}));
        assert!(!has_configuration_changed(
            &current,
            &json!({"MemorySize": 256, "Timeout": 30})
        ));
    }

    #[test]
    fn scalar_drift_is_detected() {
        let current = snapshot(json!({"MemorySize": 256}));
        assert!(has_configuration_changed(
            &current,
            &json!({"MemorySize": 512})
        ));
    }

    #[test]
    fn zero_and_false_participate() {
        let current = snapshot(json!({"Retries": 3, "Flag": true}));
        assert!(has_configuration_changed(&current, &json!({"Retries": 0})));
        assert!(has_configuration_changed(&current, &json!({"Flag": false})));
    }

    #[test]
    fn absent_remote_field_is_drift() {
        let current = snapshot(json!({"MemorySize": 256}));
        assert!(has_configuration_changed(&current, &json!({"Timeout": 30})));
    }

    #[test]
    fn nested_blocks_compare_structurally() {
        let current = snapshot(json!({
            "Environment": {"Variables": {"A": "1"}}
        }));
        assert!(!has_configuration_changed(
            &current,
            &json!({"Environment": {"Variables": {"A": "1"}}})
        ));
        assert!(has_configuration_changed(
            &current,
            &json!({"Environment": {"Variables": {"A": "2"}}})
        ));
    }

    #[test]
    fn null_remote_block_compares_as_empty() {
        let current = snapshot(json!({"TracingConfig": null, "MemorySize": 128}));
        assert!(has_configuration_changed(
            &current,
            &json!({"TracingConfig": {"Mode": "Active"}})
        ));
    }

    #[test]
    fn meaningless_desired_fields_are_ignored() {
        let current = snapshot(json!({"MemorySize": 256}));
        assert!(!has_configuration_changed(
            &current,
            &json!({"Description": "", "Handler": null})
        ));
    }

    #[test]
    fn network_detach_registers_as_drift() {
        let current = snapshot(json!({
            "VpcConfig": {"SubnetIds": ["subnet-1"], "SecurityGroupIds": ["sg-1"]},
            "MemorySize": 128
        }));
        assert!(has_configuration_changed(
            &current,
            &json!({"VpcConfig": {"SubnetIds": [], "SecurityGroupIds": []}})
        ));
    }
}
