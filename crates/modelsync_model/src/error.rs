//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while describing or addressing models.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The model name is not registered in the catalog.
    #[error("unknown model: {name}")]
    UnknownModel {
        /// Name that was looked up.
        name: String,
    },

    /// A model with the same name was registered twice.
    #[error("model already registered: {name}")]
    DuplicateModel {
        /// Name of the duplicate model.
        name: String,
    },

    /// A record is missing one of its primary-key fields.
    #[error("record of model {model} is missing primary-key field {field}")]
    MissingPrimaryKey {
        /// Model name.
        model: String,
        /// Name of the missing field.
        field: String,
    },

    /// A primary-key field holds a value that cannot form an identifier.
    #[error("field {field} of model {model} cannot be used as an identifier")]
    InvalidIdentifier {
        /// Model name.
        model: String,
        /// Name of the offending field.
        field: String,
    },

    /// A JSON document could not be turned into a record.
    #[error("invalid record document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },
}

impl ModelError {
    /// Creates an unknown model error.
    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}
