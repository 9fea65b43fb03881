//! Typed documents with change tracking and named source/view pipelines
//!
//! `swissarmyhammer-documents` declares record types as schemas of named,
//! typed, constrained fields, then builds, mutates, validates and converts
//! instances of those types to and from plain records.
//!
//! # Architecture
//!
//! - **Schemas are frozen**: a [`Schema`] is compiled once from a builder (or a
//!   YAML [`SchemaDef`]) and its field table never changes afterwards
//! - **Permissive intake, strict validation**: `Document::set` accepts any value;
//!   only `validate()` rejects values that do not fit their field
//! - **Changes climb**: lists, maps and embedded documents carry weak links to
//!   every `(document, field)` holding them, so a mutation at any depth marks
//!   the top-level field modified on every owner
//! - **Named pipelines**: each schema has a registry of sources (record in) and
//!   views (record out); `record` is always registered
//!
//! ```rust,ignore
//! let user = Schema::builder("User")
//!     .field("id", Field::integer().required(true))
//!     .field("name", Field::string().with_length_range(None, Some(8)))
//!     .build()?;
//!
//! let doc = Document::from_record(&user, record_from_json(json!({"id": 4})))?;
//! assert!(doc.validate());
//! doc.set("name", "too long a name")?;
//! assert!(!doc.validate());
//! ```
//!
//! Everything here is single-threaded: values are `Rc`-shared, not `Send`.

pub mod container;
pub mod definition;
pub mod document;
pub mod error;
pub mod field;
mod links;
pub mod pipeline;
pub mod registry;
pub mod schema;
mod validation;
pub mod value;

pub use container::{List, Map};
pub use definition::{FieldDef, FieldKindDef, SchemaDef};
pub use document::Document;
pub use error::{DocumentError, Result};
pub use field::{Constraints, Field, FieldDefault, FieldKind, FieldValidator};
pub use pipeline::{
    format_field, rename_field, ComputedFn, ExportOptions, Filter, PipelineSpec, BASELINE,
};
pub use registry::SchemaRegistry;
pub use schema::{Schema, SchemaBuilder};
pub use value::{record_from_json, record_to_json, CustomValue, Record, Value};
