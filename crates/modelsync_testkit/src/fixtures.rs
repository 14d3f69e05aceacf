//! Schema and record fixtures.
//!
//! The blog fixtures model three associated types: a `Blog` has many
//! `Post`s and a `Post` has many `Comment`s. Comments and posts point back
//! at their parent with a `belongsTo` field, which makes the parent a sync
//! dependency.

use modelsync_engine::Page;
use modelsync_model::{Field, FieldType, ModelSchema, Record, RemoteRecord, SchemaCatalog};

/// `Blog` schema.
pub fn blog_schema() -> ModelSchema {
    ModelSchema::new("Blog")
        .with_field(Field::new("id", FieldType::String))
        .with_field(Field::new("name", FieldType::String))
        .has_many("posts", "Post")
}

/// `Post` schema without associations.
pub fn post_schema() -> ModelSchema {
    ModelSchema::new("Post")
        .with_field(Field::new("id", FieldType::String))
        .with_field(Field::new("title", FieldType::String))
        .with_field(Field::optional("rating", FieldType::Int))
        .with_field(Field::optional("createdAt", FieldType::Timestamp))
}

/// `Comment` schema belonging to a `Post`.
pub fn comment_schema() -> ModelSchema {
    ModelSchema::new("Comment")
        .with_field(Field::new("id", FieldType::String))
        .with_field(Field::new("content", FieldType::String))
        .with_field(Field::new("postId", FieldType::String))
        .belongs_to("postId", "Post")
}

/// Catalog of unrelated models, all synced concurrently.
///
/// # Panics
///
/// Panics if a name is repeated.
pub fn flat_catalog(names: &[&str]) -> SchemaCatalog {
    SchemaCatalog::from_schemas(names.iter().map(|name| ModelSchema::new(*name)))
        .expect("model names must be unique")
}

/// Catalog holding only [`post_schema`].
pub fn post_catalog() -> SchemaCatalog {
    SchemaCatalog::from_schemas([post_schema()]).expect("single schema")
}

/// Blog, post and comment catalog, registered children first.
///
/// Registration order is the reverse of dependency order, so a correct
/// sync order can only come from the association graph.
pub fn blog_catalog() -> SchemaCatalog {
    let post = post_schema()
        .with_field(Field::new("blogId", FieldType::String))
        .belongs_to("blogId", "Blog");
    SchemaCatalog::from_schemas([comment_schema(), post, blog_schema()])
        .expect("fixture schemas are unique")
}

/// A record of `model_name` with the given id.
pub fn record(model_name: &str, id: &str) -> Record {
    Record::with_id(model_name, id)
}

/// A live `Post` at `version`, titled after the version.
pub fn post(id: &str, version: u64) -> RemoteRecord {
    RemoteRecord::new(
        record("Post", id).set("title", format!("post {id} v{version}")),
        version,
        version as i64 * 100,
    )
}

/// A live record of any model at `version`.
pub fn remote(model_name: &str, id: &str, version: u64) -> RemoteRecord {
    RemoteRecord::new(record(model_name, id), version, version as i64 * 100)
}

/// A tombstone of `model_name` at `version`.
pub fn tombstone(model_name: &str, id: &str, version: u64) -> RemoteRecord {
    RemoteRecord::tombstone(record(model_name, id), version, version as i64 * 100)
}

/// A page of records.
pub fn page(items: Vec<RemoteRecord>, next_token: Option<&str>, started_at: i64) -> Page {
    Page {
        items,
        next_token: next_token.map(str::to_string),
        started_at,
    }
}
