// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dotted-field access over the configuration document, implemented by
//! round-tripping through `serde_json::Value` rather than reflection: the
//! document is serialized, walked, optionally mutated, then deserialized
//! back into [`autobuild_config::AutobuildConfig`].

use anyhow::{anyhow, Context, Result};
use autobuild_config::AutobuildConfig;
use serde_json::Value;

/// Every leaf field of the document, in `field.subfield` form, sorted by
/// name.
pub fn leaves(config: &AutobuildConfig) -> Result<Vec<(String, Value)>> {
    let value = serde_json::to_value(config)?;
    let mut out = Vec::new();
    collect_leaves(&value, String::new(), &mut out);
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn collect_leaves(value: &Value, prefix: String, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaves(child, path, out);
            }
        }
        Value::Array(_) => {}
        other => out.push((prefix, other.clone())),
    }
}

/// Read the current value of a dotted field name.
pub fn get(config: &AutobuildConfig, field: &str) -> Result<Value> {
    let value = serde_json::to_value(config)?;
    navigate(&value, field).cloned()
}

/// Parse `raw` according to the field's current JSON type and write it
/// back into `config`.
pub fn set(config: &mut AutobuildConfig, field: &str, raw: &str) -> Result<()> {
    let mut value = serde_json::to_value(&*config)?;
    let current = navigate(&value, field)?.clone();
    let parsed = match current {
        Value::String(_) => Value::String(raw.to_string()),
        Value::Bool(_) => Value::Bool(raw.parse::<bool>().context("expected true or false")?),
        Value::Number(_) => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Number(i.into())
            } else {
                Value::Number(
                    serde_json::Number::from_f64(raw.parse::<f64>().context("expected a number")?)
                        .ok_or_else(|| anyhow!("`{raw}` is not a finite number"))?,
                )
            }
        }
        other => return Err(anyhow!("field `{field}` has unsupported type {other:?}")),
    };
    assign(&mut value, field, parsed)?;
    *config = serde_json::from_value(value).context("document no longer matches schema")?;
    Ok(())
}

fn navigate<'a>(value: &'a Value, field: &str) -> Result<&'a Value> {
    let mut current = value;
    for segment in field.split('.') {
        current = current
            .get(segment)
            .ok_or_else(|| anyhow!("no such configuration field `{field}`"))?;
    }
    Ok(current)
}

fn assign(value: &mut Value, field: &str, new_value: Value) -> Result<()> {
    let segments: Vec<&str> = field.split('.').collect();
    let mut current = value;
    for segment in &segments[..segments.len() - 1] {
        current = current
            .get_mut(*segment)
            .ok_or_else(|| anyhow!("no such configuration field `{field}`"))?;
    }
    let last = segments[segments.len() - 1];
    let slot = current
        .get_mut(last)
        .ok_or_else(|| anyhow!("no such configuration field `{field}`"))?;
    *slot = new_value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_are_sorted_and_dotted() {
        let config = AutobuildConfig::default();
        let names: Vec<String> = leaves(&config).unwrap().into_iter().map(|(k, _)| k).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"repository.listen-port".to_string()));
    }

    #[test]
    fn get_reads_nested_field() {
        let config = AutobuildConfig::default();
        assert_eq!(get(&config, "repository.listen-port").unwrap(), Value::String("8080".into()));
    }

    #[test]
    fn set_writes_nested_string_field() {
        let mut config = AutobuildConfig::default();
        set(&mut config, "group", "autobuild").unwrap();
        assert_eq!(config.group, "autobuild");
    }

    #[test]
    fn set_rejects_unknown_field() {
        let mut config = AutobuildConfig::default();
        assert!(set(&mut config, "nonexistent", "x").unwrap_err().to_string().contains("no such"));
    }

    #[test]
    fn set_parses_bool_field() {
        let mut config = AutobuildConfig::default();
        set(&mut config, "use-tmpfs", "true").unwrap();
        assert!(config.use_tmpfs);
    }
}
