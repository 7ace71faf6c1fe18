use serde_json::{Map, Value, json};

use crate::MAX_SPEC_DEPTH;
use crate::error::{Error, Result};
use crate::path;
use crate::registry::SchemaRegistry;
use crate::schema::{Schema, TIMESTAMP_FIELDS};

// ---------------------------------------------------------------------------
// Populate specification
// ---------------------------------------------------------------------------

/// Per-field populate decision: leave the foreign key as-is, substitute
/// the target's full projection, or substitute a customized one.
#[derive(Debug, Clone)]
pub enum PopulateField {
    Skip,
    Default,
    Detailed(PopulateOptions),
}

#[derive(Debug, Clone, Default)]
pub struct PopulateOptions {
    /// Populate entries applied inside the target schema.
    pub populate: Option<PopulateSpec>,
    /// Target-schema field names left out of the sub-projection.
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PopulateSpec(Vec<(String, PopulateField)>);

impl PopulateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, entry: PopulateField) -> Self {
        self.0.push((name.into(), entry));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PopulateField> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PopulateField)> {
        self.0.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Parse the JSON shape `{field: true | false | {populate?, exclude?}}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::MalformedSpec("populate spec must be an object".into()))?;

        let mut spec = PopulateSpec::new();
        for (field, entry) in obj {
            let parsed = match entry {
                Value::Bool(false) => PopulateField::Skip,
                Value::Bool(true) => PopulateField::Default,
                Value::Object(options) => {
                    let mut parsed = PopulateOptions::default();
                    for (key, val) in options {
                        match key.as_str() {
                            "populate" => parsed.populate = Some(PopulateSpec::from_value(val)?),
                            "exclude" => {
                                let arr = val.as_array().ok_or_else(|| {
                                    Error::MalformedSpec(format!(
                                        "'exclude' for field '{}' must be an array",
                                        field
                                    ))
                                })?;
                                for name in arr {
                                    let name = name.as_str().ok_or_else(|| {
                                        Error::MalformedSpec(format!(
                                            "'exclude' entries for field '{}' must be strings",
                                            field
                                        ))
                                    })?;
                                    parsed.exclude.push(name.to_string());
                                }
                            }
                            _ => {
                                return Err(Error::MalformedSpec(format!(
                                    "unknown populate option '{}' for field '{}'",
                                    key, field
                                )));
                            }
                        }
                    }
                    PopulateField::Detailed(parsed)
                }
                _ => {
                    return Err(Error::MalformedSpec(format!(
                        "populate entry for '{}' must be a boolean or an object",
                        field
                    )));
                }
            };
            spec.0.push((field.clone(), parsed));
        }
        Ok(spec)
    }
}

// ---------------------------------------------------------------------------
// $project stage factory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Prefix (with trailing dot) under which source fields are read.
    pub from_prefix: String,
    /// Prefix (with trailing dot) under which projected keys are written.
    pub to_prefix: String,
    pub populate: Option<PopulateSpec>,
    /// Field names left out of the projection entirely.
    pub exclude: Vec<String>,
}

/// Compile a `$project` stage. An explicit specification passes through
/// verbatim; otherwise the projection is built from the schema's declared
/// fields, recursively substituting nested projections for populated
/// foreign keys.
pub fn project_stage(
    registry: &SchemaRegistry,
    schema: &Schema,
    explicit: Option<&Value>,
    opts: &ProjectOptions,
) -> Result<Vec<Value>> {
    if let Some(spec) = explicit {
        return Ok(vec![json!({ "$project": spec })]);
    }
    let body = build(registry, schema, opts, 0)?;
    Ok(vec![json!({ "$project": body })])
}

fn build(
    registry: &SchemaRegistry,
    schema: &Schema,
    opts: &ProjectOptions,
    depth: usize,
) -> Result<Map<String, Value>> {
    if depth >= MAX_SPEC_DEPTH {
        return Err(Error::DepthExceeded(MAX_SPEC_DEPTH));
    }

    // Populate keys must name declared fields.
    if let Some(populate) = &opts.populate {
        for (name, _) in populate.iter() {
            if !schema.fields.contains(name) {
                return Err(Error::MissingField {
                    schema: schema.model.clone(),
                    field: name.to_string(),
                });
            }
        }
    }

    let excluded = |name: &str| opts.exclude.iter().any(|e| e == name);
    let rewrite = |name: &str| Value::String(path::field_ref(&opts.from_prefix, name));

    let mut body = Map::new();
    if !excluded("_id") {
        body.insert(path::prefixed(&opts.to_prefix, "_id"), rewrite("_id"));
    }

    for (name, descriptor) in schema.fields.iter() {
        if excluded(name) {
            continue;
        }
        let entry = opts.populate.as_ref().and_then(|p| p.get(name));
        match entry {
            Some(PopulateField::Skip) => continue,
            None => {
                body.insert(path::prefixed(&opts.to_prefix, name), rewrite(name));
            }
            Some(entry) => {
                let Some((model, _)) = descriptor.target() else {
                    return Err(Error::MissingReference {
                        schema: schema.model.clone(),
                        field: name.to_string(),
                    });
                };
                let target = registry
                    .resolve(model)
                    .map_err(|_| Error::UnresolvedReference {
                        schema: schema.model.clone(),
                        field: name.to_string(),
                        model: model.to_string(),
                    })?;

                // Sub-projection keys are bare; their values address the
                // looked-up sub-document under this field's path.
                let nested = match entry {
                    PopulateField::Detailed(options) => ProjectOptions {
                        from_prefix: path::child_prefix(&opts.from_prefix, name),
                        to_prefix: String::new(),
                        populate: options.populate.clone(),
                        exclude: options.exclude.clone(),
                    },
                    _ => ProjectOptions {
                        from_prefix: path::child_prefix(&opts.from_prefix, name),
                        ..Default::default()
                    },
                };
                let sub = build(registry, target, &nested, depth + 1)?;
                body.insert(path::prefixed(&opts.to_prefix, name), Value::Object(sub));
            }
        }
    }

    if schema.timestamps {
        for name in TIMESTAMP_FIELDS {
            if !excluded(name) {
                body.insert(path::prefixed(&opts.to_prefix, name), rewrite(name));
            }
        }
    }

    Ok(body)
}
