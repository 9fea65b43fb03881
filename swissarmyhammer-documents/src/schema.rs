//! Compiled schemas: the frozen field table of a document type plus its
//! registry of named source and view pipelines.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{DocumentError, Result};
use crate::field::Field;
use crate::pipeline::{Pipeline, PipelineSpec, BASELINE};

struct SchemaInner {
    name: String,
    parent: Option<Schema>,
    fields: IndexMap<String, Field>,
    sources: RefCell<IndexMap<String, Rc<Pipeline>>>,
    views: RefCell<IndexMap<String, Rc<Pipeline>>>,
}

/// A compiled document type.
///
/// The field table is immutable once built. Pipelines can be registered at
/// any time; every schema starts with the `record` source and view covering
/// all fields.
#[derive(Clone)]
pub struct Schema {
    inner: Rc<SchemaInner>,
}

impl Schema {
    /// Start declaring a schema called `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Schema> {
        self.inner.parent.as_ref()
    }

    /// Get a field descriptor by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inner.fields.get(name)
    }

    /// All field descriptors, inherited ones first, in declaration order.
    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.inner.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.inner.fields.keys().cloned().collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.inner.fields.contains_key(name)
    }

    /// Whether this schema is `other` or extends it, directly or not.
    pub fn is_a(&self, other: &Schema) -> bool {
        let mut current = Some(self);
        while let Some(schema) = current {
            if schema.ptr_eq(other) {
                return true;
            }
            current = schema.parent();
        }
        false
    }

    pub fn ptr_eq(&self, other: &Schema) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register (or replace) the import pipeline `name`.
    pub fn add_source(&self, name: &str, spec: PipelineSpec) -> Result<()> {
        let pipeline = Pipeline::resolve(self, name, spec, false)?;
        debug!(schema = %self.name(), source = name, fields = ?pipeline.field_names(), "source registered");
        self.inner
            .sources
            .borrow_mut()
            .insert(name.to_string(), Rc::new(pipeline));
        Ok(())
    }

    /// Register (or replace) the export pipeline `name`.
    pub fn add_view(&self, name: &str, spec: PipelineSpec) -> Result<()> {
        let pipeline = Pipeline::resolve(self, name, spec, true)?;
        debug!(schema = %self.name(), view = name, fields = ?pipeline.field_names(), "view registered");
        self.inner
            .views
            .borrow_mut()
            .insert(name.to_string(), Rc::new(pipeline));
        Ok(())
    }

    /// Resolved field list of the source `name`.
    pub fn source_fields(&self, name: &str) -> Option<Vec<String>> {
        self.inner.sources.borrow().get(name).map(|p| p.field_names())
    }

    /// Resolved entry list of the view `name`, computed entries included.
    pub fn view_fields(&self, name: &str) -> Option<Vec<String>> {
        self.inner.views.borrow().get(name).map(|p| p.field_names())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.inner.sources.borrow().keys().cloned().collect()
    }

    pub fn view_names(&self) -> Vec<String> {
        self.inner.views.borrow().keys().cloned().collect()
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| DocumentError::FieldNotFound {
            schema: self.name().to_string(),
            name: name.to_string(),
        })
    }

    pub(crate) fn source(&self, name: &str) -> Result<Rc<Pipeline>> {
        self.inner
            .sources
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing("source", name))
    }

    pub(crate) fn view(&self, name: &str) -> Result<Rc<Pipeline>> {
        self.inner
            .views
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing("view", name))
    }

    /// The source `name`, registering an all-fields one first if missing.
    pub(crate) fn source_or_default(&self, name: &str) -> Rc<Pipeline> {
        if let Ok(pipeline) = self.source(name) {
            return pipeline;
        }
        debug!(schema = %self.name(), source = name, "registering default nested source");
        let pipeline = Rc::new(Pipeline::all_fields(self, name));
        self.inner
            .sources
            .borrow_mut()
            .insert(name.to_string(), pipeline.clone());
        pipeline
    }

    /// The view `name`, registering an all-fields one first if missing.
    pub(crate) fn view_or_default(&self, name: &str) -> Rc<Pipeline> {
        if let Ok(pipeline) = self.view(name) {
            return pipeline;
        }
        debug!(schema = %self.name(), view = name, "registering default nested view");
        let pipeline = Rc::new(Pipeline::all_fields(self, name));
        self.inner
            .views
            .borrow_mut()
            .insert(name.to_string(), pipeline.clone());
        pipeline
    }

    fn missing(&self, direction: &'static str, name: &str) -> DocumentError {
        DocumentError::PipelineNotFound {
            schema: self.name().to_string(),
            direction,
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Schema`]. Created by `Schema::builder()`.
pub struct SchemaBuilder {
    name: String,
    parent: Option<Schema>,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    /// Inherit every field of `parent`. Fields declared here override
    /// same-named parent fields in place.
    pub fn extends(mut self, parent: &Schema) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Freeze the field table and register the baseline pipelines.
    pub fn build(self) -> Result<Schema> {
        let mut fields = self
            .parent
            .as_ref()
            .map(|p| p.inner.fields.clone())
            .unwrap_or_default();

        let mut declared = HashSet::new();
        for (name, field) in self.fields {
            if !declared.insert(name.clone()) {
                return Err(DocumentError::DuplicateFieldName { name });
            }
            if let Some(problem) = field.problem() {
                return Err(DocumentError::invalid_descriptor(format!(
                    "field '{name}': {problem}"
                )));
            }
            fields.insert(name, field);
        }

        let schema = Schema {
            inner: Rc::new(SchemaInner {
                name: self.name,
                parent: self.parent,
                fields,
                sources: RefCell::new(IndexMap::new()),
                views: RefCell::new(IndexMap::new()),
            }),
        };
        schema.add_source(BASELINE, PipelineSpec::new())?;
        schema.add_view(BASELINE, PipelineSpec::new())?;

        debug!(
            schema = %schema.name(),
            fields = schema.fields().len(),
            parent = ?schema.parent().map(|p| p.name().to_string()),
            "schema compiled"
        );
        Ok(schema)
    }
}
