use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::path;
use crate::schema::{Schema, TIMESTAMP_FIELDS};

// ---------------------------------------------------------------------------
// Filter sanitization
// ---------------------------------------------------------------------------

fn filterable(schema: &Schema, key: &str) -> bool {
    key == "_id"
        || schema.fields.contains(key)
        || (schema.timestamps && TIMESTAMP_FIELDS.contains(&key))
}

/// Normalize and sanitize a raw filter against the schema's declared
/// fields. A bare string or number is shorthand for `{_id: value}`. In
/// strict mode, object keys naming neither `_id`, a declared field, nor an
/// implicit timestamp field are dropped; in non-strict mode unknown keys
/// pass through unchanged. `$`-prefixed logical operator keys always pass
/// through — sanitization only interprets plain field keys.
pub fn sanitize_filter(schema: &Schema, raw: &Value, strict: bool) -> Result<Map<String, Value>> {
    match raw {
        Value::String(_) | Value::Number(_) => {
            let mut filter = Map::new();
            filter.insert("_id".to_string(), raw.clone());
            Ok(filter)
        }
        Value::Object(obj) => {
            let mut filter = Map::new();
            for (key, value) in obj {
                if key.starts_with('$') || !strict || filterable(schema, key) {
                    filter.insert(key.clone(), value.clone());
                }
            }
            Ok(filter)
        }
        _ => Err(Error::InvalidFilter(
            "filter must be an object or an id value".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// $match stage factory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Prefix (with trailing dot) applied to every surviving filter key.
    pub to_prefix: String,
    /// When false, unknown keys survive sanitization.
    pub strict: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            to_prefix: String::new(),
            strict: true,
        }
    }
}

/// Compile a filter into a single-element `$match` stage sequence, with
/// surviving keys rewritten under `to_prefix`.
pub fn match_stage(schema: &Schema, filter: &Value, opts: &MatchOptions) -> Result<Vec<Value>> {
    let sanitized = sanitize_filter(schema, filter, opts.strict)?;
    let mut rewritten = Map::new();
    for (key, value) in sanitized {
        let key = if key.starts_with('$') {
            key
        } else {
            path::prefixed(&opts.to_prefix, &key)
        };
        rewritten.insert(key, value);
    }
    Ok(vec![json!({ "$match": rewritten })])
}
