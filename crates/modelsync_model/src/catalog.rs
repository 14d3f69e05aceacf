//! Registry of model schemas.

use crate::error::{ModelError, ModelResult};
use crate::schema::ModelSchema;
use std::collections::HashMap;

/// Explicit registry of every model the application declares.
///
/// Passed by value into the sync engine; there is no process-wide registry.
/// Registration order is kept and used as the tie-breaker for sync ordering.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: Vec<ModelSchema>,
    index: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateModel` if a schema with the same name exists.
    pub fn register(&mut self, schema: ModelSchema) -> ModelResult<()> {
        if self.index.contains_key(schema.name()) {
            return Err(ModelError::DuplicateModel {
                name: schema.name().to_string(),
            });
        }
        self.index
            .insert(schema.name().to_string(), self.schemas.len());
        self.schemas.push(schema);
        Ok(())
    }

    /// Builds a catalog from schemas in registration order.
    pub fn from_schemas(schemas: impl IntoIterator<Item = ModelSchema>) -> ModelResult<Self> {
        let mut catalog = Self::new();
        for schema in schemas {
            catalog.register(schema)?;
        }
        Ok(catalog)
    }

    /// Looks up a schema by model name.
    pub fn get(&self, name: &str) -> ModelResult<&ModelSchema> {
        self.index
            .get(name)
            .map(|&i| &self.schemas[i])
            .ok_or_else(|| ModelError::unknown_model(name))
    }

    /// Returns true if the model is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All schemas in registration order.
    pub fn schemas(&self) -> &[ModelSchema] {
        &self.schemas
    }

    /// Syncable schemas in registration order.
    pub fn syncable(&self) -> impl Iterator<Item = &ModelSchema> {
        self.schemas.iter().filter(|s| s.is_syncable())
    }

    /// Returns true if any syncable model declares an association.
    pub fn has_associations(&self) -> bool {
        self.syncable().any(|s| !s.associations().is_empty())
    }

    /// Syncable schemas ordered so that every dependency comes first.
    ///
    /// A model referenced through `belongsTo` or `hasOne` is placed before
    /// the models referencing it. Unrelated models keep registration order.
    /// Cycles are broken at the edge that closes them, so the result is
    /// deterministic for a given registration order.
    pub fn sync_order(&self) -> Vec<&ModelSchema> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Visiting,
            Done,
        }

        fn visit<'a>(
            catalog: &'a SchemaCatalog,
            i: usize,
            marks: &mut [Mark],
            order: &mut Vec<&'a ModelSchema>,
        ) {
            if marks[i] != Mark::New {
                return;
            }
            marks[i] = Mark::Visiting;
            let schema = &catalog.schemas[i];
            for target in schema.dependencies() {
                if let Some(&j) = catalog.index.get(target) {
                    if catalog.schemas[j].is_syncable() {
                        visit(catalog, j, marks, order);
                    }
                }
            }
            marks[i] = Mark::Done;
            order.push(schema);
        }

        let mut marks = vec![Mark::New; self.schemas.len()];
        let mut order = Vec::with_capacity(self.schemas.len());
        for (i, schema) in self.schemas.iter().enumerate() {
            if schema.is_syncable() {
                visit(self, i, &mut marks, &mut order);
            }
        }
        order
    }
}
