//! Error types for document schemas and instances

use std::path::PathBuf;
use thiserror::Error;

/// Result type for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Errors that can occur while declaring schemas or working with documents.
///
/// Validation itself never produces one of these; `Document::validate` only
/// answers with a boolean. `ValidationFailed` is raised by exports that were
/// asked to validate first.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Field not declared on the schema
    #[error("field not found on '{schema}': {name}")]
    FieldNotFound { schema: String, name: String },

    /// Schema not present in the registry
    #[error("schema not found: {name}")]
    SchemaNotFound { name: String },

    /// No source or view registered under this name
    #[error("{direction} pipeline '{name}' not registered on '{schema}'")]
    PipelineNotFound {
        schema: String,
        direction: &'static str,
        name: String,
    },

    /// Same field declared twice in one schema builder
    #[error("duplicate field name: {name}")]
    DuplicateFieldName { name: String },

    /// A field descriptor was configured with constraints it cannot honor
    #[error("invalid field descriptor: {message}")]
    InvalidDescriptor { message: String },

    /// Export refused because the document did not validate
    #[error("document '{schema}' failed validation")]
    ValidationFailed { schema: String },

    /// Linking a value would make a structure its own descendant
    #[error("cyclic ownership: value assigned to '{field}' already contains its owner")]
    CyclicOwnership { field: String },

    /// List index past the end
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Schema definitions that extend or embed each other in a loop
    #[error("circular schema definition involving '{name}'")]
    CircularDefinition { name: String },

    /// Definitions directory not found
    #[error("definitions directory not found: {}", path.display())]
    NotInitialized { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl DocumentError {
    pub(crate) fn invalid_descriptor(message: impl Into<String>) -> Self {
        DocumentError::InvalidDescriptor {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DocumentError::FieldNotFound {
            schema: "User".into(),
            name: "status".into(),
        };
        assert_eq!(err.to_string(), "field not found on 'User': status");
    }

    #[test]
    fn test_pipeline_error() {
        let err = DocumentError::PipelineNotFound {
            schema: "User".into(),
            direction: "view",
            name: "public".into(),
        };
        assert!(err.to_string().contains("view pipeline 'public'"));
        assert!(err.to_string().contains("User"));
    }
}
