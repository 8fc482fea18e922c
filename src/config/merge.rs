//! Configuration merge logic
//!
//! Layers merge with:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values.
///
/// An ancillary suffix list in a config file replaces the built-in list
/// rather than extending it.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        // Null overlays carry no information; keep the base value.
        (base, Value::Null) => base,

        (_, overlay) => overlay,
    }
}

/// Merge config layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"max_errors": 5}), json!({"max_errors": 10}));
        assert_eq!(result["max_errors"], 10);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({"run": {"is_paired_read": true, "is_aligned": true}});
        let overlay = json!({"run": {"is_aligned": false}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["run"]["is_aligned"], false);
        assert_eq!(result["run"]["is_paired_read"], true);
    }

    #[test]
    fn test_array_replace() {
        let base = json!({"formats": {"genotype": ["bcf", "vcf", "geno"]}});
        let overlay = json!({"formats": {"genotype": ["vcf"]}});
        let result = deep_merge(base, overlay);

        let genotype = result["formats"]["genotype"].as_array().unwrap();
        assert_eq!(genotype.len(), 1);
        assert_eq!(genotype[0], "vcf");
    }

    #[test]
    fn test_null_overlay_keeps_base() {
        let result = deep_merge(json!({"alt_process": "x"}), json!({"alt_process": null}));
        assert_eq!(result["alt_process"], "x");
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({"force": false, "formats": {"qc_subdir": "qc"}});
        let file = json!({"force": true, "id_run": 12345});
        let cli = json!({"force": false});

        let result = merge_layers(vec![builtin, file, cli]);

        assert_eq!(result["force"], false);
        assert_eq!(result["id_run"], 12345);
        assert_eq!(result["formats"]["qc_subdir"], "qc");
    }
}
