//! Document instances.
//!
//! A [`Document`] is a shared handle: cloning it gives another reference to
//! the same instance, which is how one document can be embedded under
//! several owners at once. Each instance keeps its stored values, the set of
//! fields modified since construction, a cached validity flag and the owner
//! links used to propagate changes upward.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::Result;
use crate::field::Field;
use crate::links::{self, OwnerLinks};
use crate::pipeline::BASELINE;
use crate::schema::Schema;
use crate::value::{Record, Value};

pub(crate) struct DocumentState {
    pub(crate) schema: Schema,
    pub(crate) values: IndexMap<String, Value>,
    pub(crate) modified: BTreeSet<String>,
    pub(crate) valid: bool,
    pub(crate) links: OwnerLinks,
}

/// An instance of a [`Schema`].
#[derive(Clone)]
pub struct Document {
    pub(crate) state: Rc<RefCell<DocumentState>>,
}

impl Document {
    /// An empty instance. Nothing is set, nothing is modified.
    pub fn new(schema: &Schema) -> Self {
        Self {
            state: Rc::new(RefCell::new(DocumentState {
                schema: schema.clone(),
                values: IndexMap::new(),
                modified: BTreeSet::new(),
                valid: false,
                links: OwnerLinks::default(),
            })),
        }
    }

    pub fn schema(&self) -> Schema {
        self.state.borrow().schema.clone()
    }

    /// Read a field.
    ///
    /// An unset field materialises its default (calling a factory if there is
    /// one), which is then stored without marking anything modified. Unset
    /// fields without a default read as `Value::Null`.
    pub fn get(&self, name: &str) -> Result<Value> {
        let schema = self.schema();
        let field = schema.lookup(name)?;
        if let Some(value) = self.state.borrow().values.get(name) {
            return Ok(value.clone());
        }
        let Some(default) = field.default_value() else {
            return Ok(Value::Null);
        };
        let value = default.resolve();
        if value.is_null() {
            return Ok(value);
        }
        let value = field.prepare(value, self, name, BASELINE)?;
        self.state
            .borrow_mut()
            .values
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Assign a field and mark it modified.
    ///
    /// Raw maps become embedded documents and containers are rewrapped for
    /// this field. The value is not checked against the field kind; that is
    /// left to validation. `Value::Null` stores an explicit absence.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let schema = self.schema();
        let field = schema.lookup(name)?;
        let value = field.prepare(value.into(), self, name, BASELINE)?;
        self.state
            .borrow_mut()
            .values
            .insert(name.to_string(), value);
        links::mark_changed(self, name);
        Ok(())
    }

    /// Strict validation: every required field must be set and every set
    /// value must pass its field. A success is cached until the next change.
    pub fn validate(&self) -> bool {
        if self.state.borrow().valid {
            return true;
        }
        let valid = self.walk(true);
        if valid {
            self.state.borrow_mut().valid = true;
        }
        valid
    }

    /// Format-only validation: missing required fields are not failures.
    pub fn validate_partial(&self) -> bool {
        self.walk(false)
    }

    /// Validate the named fields only. Undeclared names are an error.
    pub fn validate_fields<I, S>(&self, names: I, strict: bool) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let schema = self.schema();
        for name in names {
            let name = name.as_ref();
            let field = schema.lookup(name)?;
            if !self.check_field(name, field, strict) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Names of the fields modified since construction.
    pub fn modified_fields(&self) -> BTreeSet<String> {
        self.state.borrow().modified.clone()
    }

    /// Number of live `(document, field)` pairs holding this document.
    pub fn owner_count(&self) -> usize {
        self.state.borrow().links.owners().len()
    }

    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Snapshot of the stored values, without materialising defaults.
    pub fn stored_values(&self) -> Record {
        self.state.borrow().values.clone()
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.state) as *const () as usize
    }

    fn walk(&self, strict: bool) -> bool {
        let schema = self.schema();
        schema
            .fields()
            .iter()
            .all(|(name, field)| self.check_field(name, field, strict))
    }

    fn check_field(&self, name: &str, field: &Field, strict: bool) -> bool {
        let value = match self.get(name) {
            Ok(value) => value,
            Err(e) => {
                debug!(schema = %self.schema().name(), field = name, error = %e, "default could not be materialised");
                return false;
            }
        };
        if value.is_null() {
            if strict && field.is_required() {
                debug!(schema = %self.schema().name(), field = name, "required field missing");
                return false;
            }
            return true;
        }
        if !field.validate(&value) {
            debug!(
                schema = %self.schema().name(),
                field = name,
                kind = field.kind().name(),
                value = ?value,
                "field failed validation"
            );
            return false;
        }
        true
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.state.borrow(), other.state.borrow());
        a.schema.name() == b.schema.name() && a.values == b.values
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Document")
            .field("schema", &state.schema.name())
            .field("values", &state.values)
            .field("modified", &state.modified)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentError;
    use crate::value::record_from_json;
    use serde_json::json;

    fn user() -> Schema {
        Schema::builder("User")
            .field("id", Field::integer().required(true))
            .field("name", Field::string().with_length_range(None, Some(8)))
            .field("age", Field::integer().with_default(18))
            .build()
            .unwrap()
    }

    #[test]
    fn undeclared_names_are_lookup_failures() {
        let doc = Document::new(&user());
        assert!(matches!(
            doc.get("nope"),
            Err(DocumentError::FieldNotFound { .. })
        ));
        assert!(doc.set("nope", 1).is_err());
        assert!(doc.validate_fields(["id", "nope"], false).is_err());
        assert_eq!(doc.get("name").unwrap(), Value::Null);
    }

    #[test]
    fn defaults_materialise_without_marking() {
        let doc = Document::new(&user());
        assert_eq!(doc.get("age").unwrap(), Value::from(18));
        assert!(doc.modified_fields().is_empty());
        assert_eq!(doc.stored_values().get("age"), Some(&Value::from(18)));
    }

    #[test]
    fn explicit_null_hides_the_default() {
        let doc = Document::new(&user());
        doc.set("age", Value::Null).unwrap();
        assert_eq!(doc.get("age").unwrap(), Value::Null);
        assert!(doc.modified_fields().contains("age"));
    }

    #[test]
    fn assignment_is_permissive() {
        let doc = Document::from_record(&user(), record_from_json(json!({"id": 1}))).unwrap();
        assert!(doc.validate());
        doc.set("id", "not a number").unwrap();
        assert!(!doc.validate());
        doc.set("id", 2).unwrap();
        assert!(doc.validate());
        assert!(doc.validate());
    }

    #[test]
    fn required_only_matters_when_strict() {
        let doc = Document::new(&user());
        assert!(!doc.validate());
        assert!(doc.validate_partial());
        assert!(doc.validate_fields(["name"], true).unwrap());
        assert!(!doc.validate_fields(["id"], true).unwrap());
        assert!(doc.validate_fields(["id"], false).unwrap());

        doc.set("name", "far too long").unwrap();
        assert!(!doc.validate_partial());
    }

    #[test]
    fn unknown_keys_are_ignored_on_construction() {
        let doc = Document::from_record(&user(), record_from_json(json!({"id": 1, "bogus": true}))).unwrap();
        assert_eq!(doc.stored_values().keys().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn equality_is_structural() {
        let schema = user();
        let a = Document::from_record(&schema, record_from_json(json!({"id": 1}))).unwrap();
        let b = Document::from_record(&schema, record_from_json(json!({"id": 1}))).unwrap();
        assert_eq!(a, b);
        b.set("id", 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn self_embedding_is_rejected() {
        let node = Schema::builder("Node").field("name", Field::string()).build().unwrap();
        let tree = Schema::builder("Tree")
            .field("child", Field::embedded(&node))
            .field("peer", Field::embedded(&node))
            .build()
            .unwrap();
        let doc = Document::new(&tree);
        let err = doc.set("child", Value::Document(doc.clone())).unwrap_err();
        assert!(matches!(err, DocumentError::CyclicOwnership { .. }));
        assert!(doc.modified_fields().is_empty());
        assert_eq!(doc.get("child").unwrap(), Value::Null);
    }
}
