//! Layered JSON configuration loader for Zero services.
//!
//! Configuration is assembled from several JSON files merged in order
//! (later files win), followed by environment variable overrides of the form
//! `PREFIX__SECTION__FIELD=value`.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
pub fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => {
                        merge_json(target_value, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load and deep-merge the given files in order. Missing files are skipped.
pub fn load_layered(paths: &[PathBuf]) -> Result<Value> {
    let mut config = Value::Object(Map::new());

    for path in paths {
        if let Some(layer) = load_json_file(path)? {
            if !layer.is_object() {
                anyhow::bail!("{} must contain a JSON object", path.display());
            }
            merge_json(&mut config, layer);
            tracing::debug!(path = %path.display(), "Merged config layer");
        } else {
            tracing::debug!(path = %path.display(), "Config layer not found, skipping");
        }
    }

    Ok(config)
}

/// Apply overrides from `(key, value)` pairs, typically `std::env::vars()`.
///
/// A key `ZERO_BACKTEST__PORTFOLIO__LOT_SIZE` with prefix `ZERO_BACKTEST`
/// sets `portfolio.lot_size`. Values are parsed as JSON when possible so that
/// numbers and booleans keep their type; otherwise they are stored as strings.
/// Returns the number of overrides applied.
pub fn apply_overrides<I>(config: &mut Value, prefix: &str, vars: I) -> usize
where
    I: IntoIterator<Item = (String, String)>,
{
    let marker = format!("{}__", prefix);
    let mut applied = 0;

    for (key, raw) in vars {
        let Some(path) = key.strip_prefix(&marker) else {
            continue;
        };
        let segments: Vec<String> = path
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }

        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        set_path(config, &segments, value);
        applied += 1;
    }

    applied
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut Value, prefix: &str) -> usize {
    let applied = apply_overrides(config, prefix, std::env::vars());
    if applied > 0 {
        tracing::debug!(prefix, applied, "Applied environment overrides");
    }
    applied
}

fn set_path(config: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if !config.is_object() {
        *config = Value::Object(Map::new());
    }
    if let Value::Object(map) = config {
        if rest.is_empty() {
            map.insert(head.clone(), value);
        } else {
            let child = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(child, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_objects() {
        let mut target = json!({
            "a": 1,
            "b": {
                "x": 10,
                "y": 20
            }
        });

        let source = json!({
            "b": {
                "y": 25,
                "z": 30
            },
            "c": 3
        });

        merge_json(&mut target, source);

        assert_eq!(target["a"], 1);
        assert_eq!(target["b"]["x"], 10);
        assert_eq!(target["b"]["y"], 25);
        assert_eq!(target["b"]["z"], 30);
        assert_eq!(target["c"], 3);
    }

    #[test]
    fn test_merge_json_overwrite_non_object() {
        let mut target = json!({ "a": [1, 2, 3] });
        let source = json!({ "a": [4, 5] });

        merge_json(&mut target, source);

        assert_eq!(target["a"], json!([4, 5]));
    }

    #[test]
    fn test_load_layered_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.json");
        fs::write(&base, r#"{"portfolio": {"lot_size": 100, "commission_rate": 0.0003}}"#).unwrap();
        fs::write(&local, r#"{"portfolio": {"commission_rate": 0.0005}}"#).unwrap();

        let missing = dir.path().join("missing.json");
        let merged = load_layered(&[base, missing, local]).unwrap();

        assert_eq!(merged["portfolio"]["lot_size"], 100);
        assert_eq!(merged["portfolio"]["commission_rate"], 0.0005);
    }

    #[test]
    fn test_load_layered_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2]").unwrap();

        assert!(load_layered(&[path]).is_err());
    }

    #[test]
    fn test_apply_overrides_typed_values() {
        let mut config = json!({ "portfolio": { "lot_size": 100 } });
        let vars = vec![
            ("ZERO_BACKTEST__PORTFOLIO__LOT_SIZE".to_string(), "200".to_string()),
            ("ZERO_BACKTEST__RUN__PARALLEL_ANALYSIS".to_string(), "false".to_string()),
            ("ZERO_BACKTEST__LABEL".to_string(), "nightly".to_string()),
            ("UNRELATED".to_string(), "1".to_string()),
        ];

        let applied = apply_overrides(&mut config, "ZERO_BACKTEST", vars);

        assert_eq!(applied, 3);
        assert_eq!(config["portfolio"]["lot_size"], 200);
        assert_eq!(config["run"]["parallel_analysis"], false);
        assert_eq!(config["label"], "nightly");
    }
}
