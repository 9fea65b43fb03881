//! Storage-engine field types for `swissarmyhammer-documents`
//!
//! Built only on the public field contract: [`object_id_field`] plugs a
//! [`FieldValidator`](swissarmyhammer_documents::FieldValidator) in for
//! [`ObjectId`] values, and [`geo_point_field`] is a constrained float list.

pub mod error;
pub mod geo;
pub mod object_id;

pub use error::{Result, StorageError};
pub use geo::{geo_point, geo_point_field};
pub use object_id::{object_id_field, parse_object_id, ObjectId, ObjectIdValidator};
