use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dag_flow::spec::JsonMap;
use crate::registry::Tool;

/// jq-like field extractor.
///
/// A path is a dot-separated list of segments. A segment is an object key,
/// `key[i]` for a key followed by a list index, `[i]` alone, or a bare
/// number which indexes the current list. A missing key (or a key looked up
/// on `null`) yields `null`; an index that is out of range or applied to
/// something other than a list is an error.
pub struct JsonPick;

#[async_trait]
impl Tool for JsonPick {
    fn name(&self) -> &str {
        "json.pick"
    }

    fn description(&self) -> &str {
        "Extracts values from JSON data by dotted paths such as items[0].name"
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "data": {},
                "paths": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["data", "paths"]
        }))
    }

    async fn run(&self, args: JsonMap) -> anyhow::Result<JsonMap> {
        let data = args.get("data").unwrap_or(&Value::Null);
        let paths = args
            .get("paths")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("paths must be an array of strings"))?;

        let mut picked = JsonMap::new();
        for path in paths {
            let path = path
                .as_str()
                .ok_or_else(|| anyhow!("paths must be an array of strings"))?;
            let value = pick(data, path).with_context(|| format!("path '{path}'"))?;
            picked.insert(path.to_string(), value);
        }

        let mut out = JsonMap::new();
        out.insert("picked".to_string(), Value::Object(picked));
        Ok(out)
    }
}

/// Resolve one path against `data`
pub fn pick(data: &Value, path: &str) -> anyhow::Result<Value> {
    let mut current = data;
    if path.is_empty() {
        return Ok(current.clone());
    }
    for segment in path.split('.') {
        let (key, index) = split_segment(segment)?;
        if !key.is_empty() {
            current = match current {
                Value::Object(map) => match map.get(key) {
                    Some(v) => v,
                    None => return Ok(Value::Null),
                },
                Value::Array(items) if index.is_none() && is_index(key) => {
                    let i: usize = key.parse()?;
                    items
                        .get(i)
                        .ok_or_else(|| anyhow!("index {i} out of range (len {})", items.len()))?
                }
                Value::Null => return Ok(Value::Null),
                other => bail!("cannot look up key '{key}' in {}", kind(other)),
            };
        }
        if let Some(i) = index {
            current = match current {
                Value::Array(items) => items
                    .get(i)
                    .ok_or_else(|| anyhow!("index {i} out of range (len {})", items.len()))?,
                other => bail!("cannot index {} with [{i}]", kind(other)),
            };
        }
    }
    Ok(current.clone())
}

// "items[2]" -> ("items", Some(2)), "name" -> ("name", None)
fn split_segment(segment: &str) -> anyhow::Result<(&str, Option<usize>)> {
    match segment.find('[') {
        Some(open) if segment.ends_with(']') => {
            let raw = &segment[open + 1..segment.len() - 1];
            let index = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("invalid list index '{raw}'"))?;
            Ok((&segment[..open], Some(index)))
        }
        _ => Ok((segment, None)),
    }
}

fn is_index(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
