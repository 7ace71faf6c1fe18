use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Model name → Schema lookup used to resolve foreign-key targets during
/// pipeline compilation. Populated during configuration, then treated as
/// read-only shared state; pass `&SchemaRegistry` into the factories.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its model name. Re-registering a model
    /// replaces the previous definition.
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.model.clone(), schema);
    }

    pub fn resolve(&self, model: &str) -> Result<&Schema> {
        self.schemas
            .get(model)
            .ok_or_else(|| Error::UnknownSchema(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.schemas.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
