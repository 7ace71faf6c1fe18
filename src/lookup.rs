use serde_json::{Value, json};

use crate::MAX_SPEC_DEPTH;
use crate::error::{Error, Result};
use crate::path;
use crate::registry::SchemaRegistry;
use crate::schema::Schema;

// ---------------------------------------------------------------------------
// Lookup specification
// ---------------------------------------------------------------------------

/// What to do with one foreign-key field: leave it alone, expand it with
/// defaults, or expand it with explicit options.
#[derive(Debug, Clone)]
pub enum LookupField {
    Skip,
    Default,
    Detailed(LookupOptions),
}

#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Foreign-side join key; defaults to `_id`.
    pub foreign: Option<String>,
    /// Keep the joined documents as an array (no `$unwind`).
    pub is_array: bool,
    /// Path the joined sub-document lands under; defaults to the field name.
    pub as_field: Option<String>,
    /// Nested lookups evaluated against the target schema.
    pub lookup: Option<LookupSpec>,
}

/// Ordered lookup specification: field name → [`LookupField`]. Order is
/// the order stages are emitted in.
#[derive(Debug, Clone, Default)]
pub struct LookupSpec(Vec<(String, LookupField)>);

impl LookupSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, entry: LookupField) -> Self {
        self.0.push((name.into(), entry));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LookupField)> {
        self.0.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the JSON shape `{field: true | false | {foreign?, isArray?,
    /// as?, lookup?}}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::MalformedSpec("lookup spec must be an object".into()))?;

        let mut spec = LookupSpec::new();
        for (field, entry) in obj {
            let parsed = match entry {
                Value::Bool(false) => LookupField::Skip,
                Value::Bool(true) => LookupField::Default,
                Value::Object(options) => {
                    let mut parsed = LookupOptions::default();
                    for (key, val) in options {
                        match key.as_str() {
                            "foreign" => parsed.foreign = Some(expect_string(field, key, val)?),
                            "as" => parsed.as_field = Some(expect_string(field, key, val)?),
                            "isArray" => {
                                parsed.is_array = val.as_bool().ok_or_else(|| {
                                    Error::MalformedSpec(format!(
                                        "'isArray' for field '{}' must be a boolean",
                                        field
                                    ))
                                })?;
                            }
                            "lookup" => parsed.lookup = Some(LookupSpec::from_value(val)?),
                            _ => {
                                return Err(Error::MalformedSpec(format!(
                                    "unknown lookup option '{}' for field '{}'",
                                    key, field
                                )));
                            }
                        }
                    }
                    LookupField::Detailed(parsed)
                }
                _ => {
                    return Err(Error::MalformedSpec(format!(
                        "lookup entry for '{}' must be a boolean or an object",
                        field
                    )));
                }
            };
            spec.0.push((field.clone(), parsed));
        }
        Ok(spec)
    }
}

fn expect_string(field: &str, key: &str, val: &Value) -> Result<String> {
    val.as_str().map(str::to_string).ok_or_else(|| {
        Error::MalformedSpec(format!("'{}' for field '{}' must be a string", key, field))
    })
}

// ---------------------------------------------------------------------------
// $lookup / $unwind stage factory
// ---------------------------------------------------------------------------

/// Compile a lookup specification into paired `$lookup`/`$unwind` stage
/// sequences, recursing into target schemas for nested specs. Fails
/// atomically: the first invalid field aborts the whole call before any
/// stage is handed out.
pub fn lookup_stages(
    registry: &SchemaRegistry,
    schema: &Schema,
    spec: &LookupSpec,
    from_prefix: &str,
    to_prefix: &str,
) -> Result<Vec<Value>> {
    compile(registry, schema, spec, from_prefix, to_prefix, 0)
}

fn compile(
    registry: &SchemaRegistry,
    schema: &Schema,
    spec: &LookupSpec,
    from_prefix: &str,
    to_prefix: &str,
    depth: usize,
) -> Result<Vec<Value>> {
    if depth >= MAX_SPEC_DEPTH {
        return Err(Error::DepthExceeded(MAX_SPEC_DEPTH));
    }

    let mut stages = Vec::new();
    for (field, entry) in spec.iter() {
        let options = match entry {
            LookupField::Skip => continue,
            LookupField::Default => None,
            LookupField::Detailed(options) => Some(options),
        };

        let descriptor = schema.fields.get(field).ok_or_else(|| Error::MissingField {
            schema: schema.model.clone(),
            field: field.to_string(),
        })?;
        let Some((model, array_typed)) = descriptor.target() else {
            return Err(Error::MissingReference {
                schema: schema.model.clone(),
                field: field.to_string(),
            });
        };
        let target = registry
            .resolve(model)
            .map_err(|_| Error::UnresolvedReference {
                schema: schema.model.clone(),
                field: field.to_string(),
                model: model.to_string(),
            })?;

        let foreign = options
            .and_then(|o| o.foreign.as_deref())
            .unwrap_or("_id");
        let as_name = options.and_then(|o| o.as_field.as_deref()).unwrap_or(field);
        let as_path = path::prefixed(to_prefix, as_name);

        stages.push(json!({
            "$lookup": {
                "from": target.collection,
                "localField": path::prefixed(from_prefix, field),
                "foreignField": foreign,
                "as": as_path,
            }
        }));

        // Outer-join semantics: a missing or empty lookup must not drop
        // the parent document.
        let is_array = array_typed || options.is_some_and(|o| o.is_array);
        if !is_array {
            stages.push(json!({
                "$unwind": {
                    "path": format!("${}", as_path),
                    "preserveNullAndEmptyArrays": true,
                }
            }));
        }

        if let Some(nested) = options.and_then(|o| o.lookup.as_ref()) {
            // Subsequent lookups address the already-looked-up sub-document.
            let nested_prefix = path::child_prefix(to_prefix, as_name);
            stages.extend(compile(
                registry,
                target,
                nested,
                &nested_prefix,
                &nested_prefix,
                depth + 1,
            )?);
        }
    }
    Ok(stages)
}
