use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};

/// Implicit fields present on every document of a schema with
/// `timestamps` enabled, even though they are absent from `fields`.
pub const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Array(Box<FieldDescriptor>),
    Nested(Fields),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Target model name; only meaningful on object-id fields.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encrypted: bool,
}

impl FieldDescriptor {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            reference: None,
            required: false,
            encrypted: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn object_id() -> Self {
        Self::new(FieldType::ObjectId)
    }

    /// An object-id field that is a foreign key into `model`.
    pub fn reference(model: impl Into<String>) -> Self {
        Self {
            reference: Some(model.into()),
            ..Self::new(FieldType::ObjectId)
        }
    }

    pub fn array(inner: FieldDescriptor) -> Self {
        Self::new(FieldType::Array(Box::new(inner)))
    }

    pub fn nested(fields: Fields) -> Self {
        Self::new(FieldType::Nested(fields))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Reference target, looking through one level of array nesting.
    /// Returns the model name and whether the field is array-valued.
    pub fn target(&self) -> Option<(&str, bool)> {
        if let Some(model) = self.reference.as_deref() {
            return Some((model, matches!(self.ty, FieldType::Array(_))));
        }
        if let FieldType::Array(inner) = &self.ty {
            if let Some(model) = inner.reference.as_deref() {
                return Some((model, true));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Ordered field map
// ---------------------------------------------------------------------------

/// Field name → descriptor mapping that preserves declaration order.
/// Declaration order is the iteration order used to build projections,
/// so it must be stable for deterministic output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldDescriptor)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing an existing descriptor in place.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: FieldDescriptor) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = descriptor;
        } else {
            self.0.push((name, descriptor));
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.0.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, descriptor) in &self.0 {
            map.serialize_entry(name, descriptor)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Fields;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field name to field descriptor")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Fields, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, descriptor)) = access.next_entry()? {
                    entries.push((name, descriptor));
                }
                Ok(Fields(entries))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Index spec; carried for the external connection layer, inert during
/// pipeline compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

/// Static description of one collection. Defined once, registered before
/// any pipeline compilation, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub model: String,
    /// Physical collection name; defaults to the lowercased, pluralized
    /// model name.
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexSpec>,

    // Behavioral flags consumed by the external CRUD layer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_inserts: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_updates: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_deletes: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_upserts: bool,
}

fn default_collection(model: &str) -> String {
    format!("{}s", model.to_lowercase())
}

impl Schema {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let collection = default_collection(&model);
        Self {
            model,
            collection,
            timestamps: false,
            fields: Fields::new(),
            indexes: Vec::new(),
            no_inserts: false,
            no_updates: false,
            no_deletes: false,
            allow_upserts: false,
        }
    }

    /// Parse a declarative JSON schema definition. An omitted or empty
    /// `collection` falls back to the default derived from `model`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut schema: Schema = serde_json::from_value(value.clone())
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;
        if schema.collection.is_empty() {
            schema.collection = default_collection(&schema.model);
        }
        Ok(schema)
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }

    pub fn timestamps(mut self, on: bool) -> Self {
        self.timestamps = on;
        self
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name, descriptor);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }
}
