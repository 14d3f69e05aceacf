//! Static model descriptions.

use serde::{Deserialize, Serialize};

/// Declared type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Int,
    /// Double-precision float.
    Double,
    /// Boolean.
    Bool,
    /// Epoch-millisecond timestamp.
    Timestamp,
    /// List of values.
    List,
    /// Nested object.
    Nested,
}

/// A named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether the field may be absent or null.
    pub optional: bool,
}

impl Field {
    /// Creates a required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
        }
    }

    /// Creates an optional field.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            optional: true,
            ..Self::new(name, field_type)
        }
    }
}

/// Kind of an association edge between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// This model holds a reference to the target.
    BelongsTo,
    /// The target holds a reference to this model, at most one.
    HasOne,
    /// The target holds references to this model, any number.
    HasMany,
}

/// Association edge from one model to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Field carrying the association.
    pub field: String,
    /// Edge kind.
    pub kind: AssociationKind,
    /// Name of the associated model.
    pub target: String,
}

impl Association {
    /// Returns true if the target must be present locally before this model.
    ///
    /// `belongsTo` and `hasOne` edges make this model depend on the target.
    pub fn is_dependency(&self) -> bool {
        matches!(self.kind, AssociationKind::BelongsTo | AssociationKind::HasOne)
    }
}

/// Static description of a model type.
///
/// Built once at startup with the `with_*` builder methods and registered
/// in a [`crate::SchemaCatalog`].
///
/// ```
/// use modelsync_model::{Field, FieldType, ModelSchema};
///
/// let comment = ModelSchema::new("Comment")
///     .with_field(Field::new("id", FieldType::String))
///     .with_field(Field::new("postId", FieldType::String))
///     .belongs_to("postId", "Post");
///
/// assert_eq!(comment.primary_key(), ["id"]);
/// assert_eq!(comment.dependencies().collect::<Vec<_>>(), ["Post"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    name: String,
    fields: Vec<Field>,
    primary_key: Vec<String>,
    associations: Vec<Association>,
    syncable: bool,
}

impl ModelSchema {
    /// Creates a syncable schema keyed by `id`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: vec!["id".to_string()],
            associations: Vec::new(),
            syncable: true,
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Replaces the primary key with the given fields, in order.
    #[must_use]
    pub fn with_primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a `belongsTo` association.
    #[must_use]
    pub fn belongs_to(self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_association(field, AssociationKind::BelongsTo, target)
    }

    /// Adds a `hasOne` association.
    #[must_use]
    pub fn has_one(self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_association(field, AssociationKind::HasOne, target)
    }

    /// Adds a `hasMany` association.
    #[must_use]
    pub fn has_many(self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_association(field, AssociationKind::HasMany, target)
    }

    fn with_association(
        mut self,
        field: impl Into<String>,
        kind: AssociationKind,
        target: impl Into<String>,
    ) -> Self {
        self.associations.push(Association {
            field: field.into(),
            kind,
            target: target.into(),
        });
        self
    }

    /// Marks whether this model takes part in sync.
    #[must_use]
    pub fn with_syncable(mut self, syncable: bool) -> Self {
        self.syncable = syncable;
        self
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a declared field.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary-key field names, in identifier order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Association edges.
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Whether this model takes part in sync.
    pub fn is_syncable(&self) -> bool {
        self.syncable
    }

    /// Names of the models this one depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.associations
            .iter()
            .filter(|a| a.is_dependency())
            .map(|a| a.target.as_str())
    }
}
