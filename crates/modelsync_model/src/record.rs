//! Type-erased records and their identifiers.

use crate::error::{ModelError, ModelResult};
use crate::schema::{FieldType, ModelSchema};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a record within its model.
///
/// A record's identity is the tuple of its primary-key field values, in the
/// order the schema declares them. Single-field keys are the common case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Vec<String>);

impl RecordId {
    /// Creates an identifier from a single key value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(vec![id.into()])
    }

    /// Creates a composite identifier from its parts.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Generates a new random identifier.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the key parts.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns true if this identifier spans more than one field.
    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("#"))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// One instance of a model, as a mapping from field name to value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    model_name: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a record with a freshly generated `id` field.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self::with_id(model_name, uuid::Uuid::new_v4().to_string())
    }

    /// Creates a record with the given `id` field.
    pub fn with_id(model_name: impl Into<String>, id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::String(id.into()));
        Self {
            model_name: model_name.into(),
            fields,
        }
    }

    /// Creates a record from an existing field map.
    pub fn from_fields(model_name: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            model_name: model_name.into(),
            fields,
        }
    }

    /// Builds a record from a JSON object using the schema's field types.
    ///
    /// Integer values of timestamp fields become [`Value::Timestamp`].
    /// Fields the schema does not declare are kept as they are.
    pub fn from_json(schema: &ModelSchema, json: serde_json::Value) -> ModelResult<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(ModelError::invalid_document(format!(
                "expected an object for model {}",
                schema.name()
            )));
        };

        let mut fields = BTreeMap::new();
        for (name, raw) in map {
            let value = match (schema.field(&name).map(|f| f.field_type), Value::from_json(raw)) {
                (Some(FieldType::Timestamp), Value::Int(ms)) => Value::Timestamp(ms),
                (_, value) => value,
            };
            fields.insert(name, value);
        }

        let record = Self::from_fields(schema.name(), fields);
        record.identifier(schema)?;
        Ok(record)
    }

    /// Converts this record into a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Sets a field, returning the record for chaining.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns the model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns all fields.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Computes this record's identifier from the schema's primary key.
    pub fn identifier(&self, schema: &ModelSchema) -> ModelResult<RecordId> {
        let mut parts = Vec::with_capacity(schema.primary_key().len());
        for field in schema.primary_key() {
            let value = self
                .fields
                .get(field)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ModelError::MissingPrimaryKey {
                    model: schema.name().to_string(),
                    field: field.clone(),
                })?;
            let part = value
                .identifier_part()
                .ok_or_else(|| ModelError::InvalidIdentifier {
                    model: schema.name().to_string(),
                    field: field.clone(),
                })?;
            parts.push(part);
        }
        Ok(RecordId(parts))
    }
}

/// A record as delivered by the remote service, with its sync fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// The record's field data.
    pub record: Record,
    /// Server-assigned version. Higher versions win.
    pub version: u64,
    /// Whether this delivery is a tombstone.
    pub deleted: bool,
    /// Server time of the last change, in epoch millis.
    pub last_changed_at: i64,
}

impl RemoteRecord {
    /// Creates a live (non-deleted) remote record.
    pub fn new(record: Record, version: u64, last_changed_at: i64) -> Self {
        Self {
            record,
            version,
            deleted: false,
            last_changed_at,
        }
    }

    /// Creates a tombstone for a record.
    pub fn tombstone(record: Record, version: u64, last_changed_at: i64) -> Self {
        Self {
            record,
            version,
            deleted: true,
            last_changed_at,
        }
    }

    /// Returns the model name of the carried record.
    pub fn model_name(&self) -> &str {
        self.record.model_name()
    }
}
