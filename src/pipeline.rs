use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::filter::{self, MatchOptions};
use crate::lookup::{self, LookupSpec};
use crate::registry::SchemaRegistry;
use crate::schema::Schema;

// ---------------------------------------------------------------------------
// $group / $sort stage factories
// ---------------------------------------------------------------------------

/// Compile a `$group` stage. A bare field name groups on that field; an
/// object passes through verbatim — `$group` bodies use accumulator
/// expressions that sanitization cannot safely interpret.
pub fn group_stage(_schema: &Schema, spec: &Value) -> Result<Vec<Value>> {
    match spec {
        Value::String(field) => Ok(vec![json!({
            "$group": { "_id": format!("${}", field) }
        })]),
        Value::Object(_) => Ok(vec![json!({ "$group": spec })]),
        _ => Err(Error::MalformedSpec(
            "$group spec must be a field name or an object".into(),
        )),
    }
}

/// Compile a `$sort` stage verbatim.
pub fn sort_stage(_schema: &Schema, spec: &Value) -> Result<Vec<Value>> {
    match spec {
        Value::Object(_) => Ok(vec![json!({ "$sort": spec })]),
        _ => Err(Error::MalformedSpec("$sort spec must be an object".into())),
    }
}

// ---------------------------------------------------------------------------
// Pipeline orchestrator
// ---------------------------------------------------------------------------

/// Declarative operator bundle compiled by [`auto_pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineSpec {
    pub lookup: Option<LookupSpec>,
    /// Leading `$match` filter.
    pub filter: Option<Value>,
    /// Trailing `$match` filter, applied after the seed pipeline.
    pub prune: Option<Value>,
    pub group: Option<Value>,
    pub sort: Option<Value>,
}

impl PipelineSpec {
    /// Parse the operator-bundle shape
    /// `{"$lookup": …, "$match": …, "$prune": …, "$group": …, "$sort": …}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::MalformedSpec("pipeline spec must be an object".into()))?;

        let mut spec = PipelineSpec::default();
        for (key, val) in obj {
            match key.as_str() {
                "$lookup" => spec.lookup = Some(LookupSpec::from_value(val)?),
                "$match" => spec.filter = Some(val.clone()),
                "$prune" => spec.prune = Some(val.clone()),
                "$group" => spec.group = Some(val.clone()),
                "$sort" => spec.sort = Some(val.clone()),
                _ => {
                    return Err(Error::MalformedSpec(format!(
                        "unknown pipeline operator: {}",
                        key
                    )));
                }
            }
        }
        Ok(spec)
    }
}

/// Options for [`auto_pipeline`]: the field prefix shared by the lookup
/// and match compilations, and a seed pipeline to extend.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub prefix: String,
    pub pipeline: Vec<Value>,
}

/// Compose the stage factories into one ordered pipeline:
/// lookups first, then the leading match (so it can filter on looked-up
/// fields), then the seed pipeline, then prune, group, and sort. The
/// order is fixed; factory errors abort the whole compilation.
pub fn auto_pipeline(
    registry: &SchemaRegistry,
    schema: &Schema,
    spec: &PipelineSpec,
    opts: &PipelineOptions,
) -> Result<Vec<Value>> {
    let match_opts = MatchOptions {
        to_prefix: opts.prefix.clone(),
        ..Default::default()
    };

    let mut pipeline = Vec::new();
    if let Some(lookup_spec) = &spec.lookup {
        pipeline.extend(lookup::lookup_stages(
            registry,
            schema,
            lookup_spec,
            &opts.prefix,
            &opts.prefix,
        )?);
    }
    if let Some(raw) = &spec.filter {
        pipeline.extend(filter::match_stage(schema, raw, &match_opts)?);
    }
    pipeline.extend(opts.pipeline.iter().cloned());
    if let Some(raw) = &spec.prune {
        pipeline.extend(filter::match_stage(schema, raw, &match_opts)?);
    }
    if let Some(raw) = &spec.group {
        pipeline.extend(group_stage(schema, raw)?);
    }
    if let Some(raw) = &spec.sort {
        pipeline.extend(sort_stage(schema, raw)?);
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::match_stage;
    use crate::lookup::LookupField;
    use crate::schema::FieldDescriptor;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(
            Schema::new("Foo")
                .field("aString", FieldDescriptor::string())
                .field("aBar", FieldDescriptor::reference("Bar")),
        );
        registry.register(Schema::new("Bar").field("name", FieldDescriptor::string()));
        registry
    }

    fn foo(registry: &SchemaRegistry) -> &Schema {
        registry.resolve("Foo").unwrap()
    }

    // -----------------------------------------------------------------------
    // $group / $sort factories
    // -----------------------------------------------------------------------

    #[test]
    fn group_by_field_name() {
        let registry = registry();
        let stages = group_stage(foo(&registry), &json!("aString")).unwrap();
        assert_eq!(stages, vec![json!({"$group": {"_id": "$aString"}})]);
    }

    #[test]
    fn group_object_verbatim() {
        let registry = registry();
        let spec = json!({"_id": "$aString", "total": {"$sum": "$n"}});
        let stages = group_stage(foo(&registry), &spec).unwrap();
        assert_eq!(stages, vec![json!({"$group": spec})]);
    }

    #[test]
    fn group_rejects_other_shapes() {
        let registry = registry();
        assert!(group_stage(foo(&registry), &json!(1)).is_err());
        assert!(group_stage(foo(&registry), &json!([])).is_err());
    }

    #[test]
    fn sort_verbatim() {
        let registry = registry();
        let spec = json!({"aString": 1, "createdAt": -1});
        let stages = sort_stage(foo(&registry), &spec).unwrap();
        assert_eq!(stages, vec![json!({"$sort": spec})]);
    }

    #[test]
    fn sort_rejects_non_object() {
        let registry = registry();
        assert!(sort_stage(foo(&registry), &json!("aString")).is_err());
    }

    // -----------------------------------------------------------------------
    // Orchestrator
    // -----------------------------------------------------------------------

    #[test]
    fn empty_spec_yields_empty_pipeline() {
        let registry = registry();
        let pipeline = auto_pipeline(
            &registry,
            foo(&registry),
            &PipelineSpec::default(),
            &PipelineOptions::default(),
        )
        .unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn match_only_equals_direct_factory() {
        let registry = registry();
        let schema = foo(&registry);
        let spec = PipelineSpec {
            filter: Some(json!("abc")),
            ..Default::default()
        };
        let pipeline =
            auto_pipeline(&registry, schema, &spec, &PipelineOptions::default()).unwrap();
        let direct = match_stage(schema, &json!("abc"), &Default::default()).unwrap();
        assert_eq!(pipeline, direct);
    }

    #[test]
    fn lookup_lands_before_match() {
        let registry = registry();
        let spec = PipelineSpec {
            lookup: Some(LookupSpec::new().field("aBar", LookupField::Default)),
            filter: Some(json!({"aString": "x"})),
            ..Default::default()
        };
        let pipeline = auto_pipeline(
            &registry,
            foo(&registry),
            &spec,
            &PipelineOptions::default(),
        )
        .unwrap();

        assert_eq!(pipeline.len(), 3);
        assert!(pipeline[0].get("$lookup").is_some());
        assert!(pipeline[1].get("$unwind").is_some());
        assert_eq!(pipeline[2], json!({"$match": {"aString": "x"}}));
    }

    #[test]
    fn full_bundle_ordering_around_seed() {
        let registry = registry();
        let seed = vec![json!({"$limit": 5})];
        let spec = PipelineSpec {
            lookup: Some(LookupSpec::new().field("aBar", LookupField::Default)),
            filter: Some(json!({"aString": "x"})),
            prune: Some(json!({"aString": "y"})),
            group: Some(json!("aString")),
            sort: Some(json!({"_id": 1})),
        };
        let opts = PipelineOptions {
            prefix: String::new(),
            pipeline: seed,
        };
        let pipeline = auto_pipeline(&registry, foo(&registry), &spec, &opts).unwrap();

        let operators: Vec<&str> = pipeline
            .iter()
            .map(|stage| stage.as_object().unwrap().keys().next().unwrap().as_str())
            .collect();
        assert_eq!(
            operators,
            ["$lookup", "$unwind", "$match", "$limit", "$match", "$group", "$sort"]
        );
        assert_eq!(pipeline[4], json!({"$match": {"aString": "y"}}));
        assert_eq!(pipeline[5], json!({"$group": {"_id": "$aString"}}));
    }

    #[test]
    fn prefix_threads_through_lookup_and_match() {
        let registry = registry();
        let spec = PipelineSpec {
            lookup: Some(LookupSpec::new().field("aBar", LookupField::Default)),
            filter: Some(json!({"aString": "x"})),
            ..Default::default()
        };
        let opts = PipelineOptions {
            prefix: "doc.".into(),
            pipeline: Vec::new(),
        };
        let pipeline = auto_pipeline(&registry, foo(&registry), &spec, &opts).unwrap();

        assert_eq!(pipeline[0]["$lookup"]["localField"], "doc.aBar");
        assert_eq!(pipeline[0]["$lookup"]["as"], "doc.aBar");
        assert_eq!(pipeline[2], json!({"$match": {"doc.aString": "x"}}));
    }

    #[test]
    fn seed_pipeline_passes_through_untouched() {
        let registry = registry();
        let seed = vec![json!({"$skip": 2}), json!({"$limit": 3})];
        let opts = PipelineOptions {
            prefix: String::new(),
            pipeline: seed.clone(),
        };
        let pipeline = auto_pipeline(
            &registry,
            foo(&registry),
            &PipelineSpec::default(),
            &opts,
        )
        .unwrap();
        assert_eq!(pipeline, seed);
    }

    #[test]
    fn factory_errors_abort_compilation() {
        let registry = registry();
        let spec = PipelineSpec {
            lookup: Some(LookupSpec::new().field("aString", LookupField::Default)),
            group: Some(json!("aString")),
            ..Default::default()
        };
        let err = auto_pipeline(
            &registry,
            foo(&registry),
            &spec,
            &PipelineOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingReference { .. }));
    }

    // -----------------------------------------------------------------------
    // Bundle parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parse_operator_bundle() {
        let spec = PipelineSpec::from_value(&json!({
            "$lookup": {"aBar": true},
            "$match": {"aString": "x"},
            "$prune": {"aString": "y"},
            "$group": "aString",
            "$sort": {"_id": -1}
        }))
        .unwrap();

        assert!(spec.lookup.is_some());
        assert_eq!(spec.filter, Some(json!({"aString": "x"})));
        assert_eq!(spec.prune, Some(json!({"aString": "y"})));
        assert_eq!(spec.group, Some(json!("aString")));
        assert_eq!(spec.sort, Some(json!({"_id": -1})));
    }

    #[test]
    fn parse_rejects_unknown_operator() {
        let err = PipelineSpec::from_value(&json!({"$explode": {}})).unwrap_err();
        assert!(matches!(err, Error::MalformedSpec(_)));
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(PipelineSpec::from_value(&json!([])).is_err());
    }
}
