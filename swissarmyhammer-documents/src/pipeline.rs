//! Named transformation pipelines between documents and external records.
//!
//! A schema holds two registries keyed by pipeline name: *sources* turn a
//! [`Record`] into field values, *views* turn a document back into a record.
//! Both resolve their field subset once, at registration:
//!
//! 1. an explicit allow-list (`keep`) wins,
//! 2. otherwise an explicit deny-list (`remove`) is subtracted,
//! 3. otherwise every field of the schema is used.
//!
//! Filters run over the raw record before import and over the assembled
//! record after export. Embedded documents are imported and exported through
//! the pipeline of the same name on their own schema.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::container::{List, Map};
use crate::document::Document;
use crate::error::{DocumentError, Result};
use crate::links;
use crate::schema::Schema;
use crate::value::{Record, Value};

/// Name of the pipeline every schema registers for both directions.
pub const BASELINE: &str = "record";

/// A record-to-record transformation applied by a pipeline.
pub type Filter = Rc<dyn Fn(Record) -> Record>;

/// A view entry derived from the whole document rather than stored.
pub type ComputedFn = Rc<dyn Fn(&Document) -> Value>;

/// Declaration of a pipeline's field subset, filters and computed entries.
#[derive(Clone, Default)]
pub struct PipelineSpec {
    keep: Option<Vec<String>>,
    remove: Vec<String>,
    filters: Vec<Filter>,
    computed: Vec<(String, ComputedFn)>,
}

impl PipelineSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use exactly these fields, in this order.
    pub fn keep<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.keep = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Use every field except these. Ignored when `keep` is set.
    pub fn remove<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.remove = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Append a filter closure. Filters run in the order they were added,
    /// first added first.
    pub fn filter(mut self, filter: impl Fn(Record) -> Record + 'static) -> Self {
        self.filters.push(Rc::new(filter));
        self
    }

    /// Append an already shared filter, such as one from [`rename_field`].
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a view entry computed from the document. Views only.
    pub fn computed(
        mut self,
        name: impl Into<String>,
        compute: impl Fn(&Document) -> Value + 'static,
    ) -> Self {
        self.computed.push((name.into(), Rc::new(compute)));
        self
    }
}

impl fmt::Debug for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSpec")
            .field("keep", &self.keep)
            .field("remove", &self.remove)
            .field("filters", &self.filters.len())
            .field(
                "computed",
                &self.computed.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

enum Entry {
    Field(String),
    Computed(String, ComputedFn),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Field(name) | Entry::Computed(name, _) => name,
        }
    }
}

/// A resolved pipeline as stored in a schema's registry.
pub(crate) struct Pipeline {
    name: String,
    entries: Vec<Entry>,
    filters: Vec<Filter>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl Pipeline {
    pub(crate) fn resolve(schema: &Schema, name: &str, spec: PipelineSpec, view: bool) -> Result<Self> {
        for field in spec.keep.iter().flatten().chain(&spec.remove) {
            schema.lookup(field)?;
        }
        if !view && !spec.computed.is_empty() {
            return Err(DocumentError::invalid_descriptor(format!(
                "source '{name}' cannot have computed entries"
            )));
        }

        let fields = match spec.keep {
            Some(keep) => keep,
            None => schema
                .field_names()
                .into_iter()
                .filter(|f| !spec.remove.contains(f))
                .collect(),
        };
        let entries = fields
            .into_iter()
            .map(Entry::Field)
            .chain(spec.computed.into_iter().map(|(n, f)| Entry::Computed(n, f)))
            .collect();

        Ok(Self {
            name: name.to_string(),
            entries,
            filters: spec.filters,
        })
    }

    /// Every field, no filters.
    pub(crate) fn all_fields(schema: &Schema, name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: schema.field_names().into_iter().map(Entry::Field).collect(),
            filters: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    pub(crate) fn apply_filters(&self, record: Record) -> Record {
        self.filters.iter().fold(record, |record, filter| filter(record))
    }
}

/// Filter moving the value under `old` to `new`. Absent or null values are
/// left alone.
pub fn rename_field(old: impl Into<String>, new: impl Into<String>) -> Filter {
    let (old, new) = (old.into(), new.into());
    Rc::new(move |mut record: Record| {
        if let Some(value) = record.shift_remove(&old) {
            if !value.is_null() {
                record.insert(new.clone(), value);
            }
        }
        record
    })
}

/// Filter replacing the value under `name` with `format(value)`. Absent or
/// null values are left alone.
pub fn format_field(name: impl Into<String>, format: impl Fn(Value) -> Value + 'static) -> Filter {
    let name = name.into();
    Rc::new(move |mut record: Record| {
        if let Some(slot) = record.get_mut(&name) {
            if !slot.is_null() {
                let value = std::mem::take(slot);
                *slot = format(value);
            }
        }
        record
    })
}

/// Options for [`Document::export`].
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Export only the fields in `modified_fields()`
    pub only_modified: bool,

    /// Run strict validation first and fail if it does not pass
    pub validate: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            only_modified: false,
            validate: true,
        }
    }
}

impl ExportOptions {
    pub fn only_modified(mut self, only_modified: bool) -> Self {
        self.only_modified = only_modified;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

impl Document {
    /// Build a document through the baseline source. Nothing is marked
    /// modified. Keys outside the field table are ignored.
    pub fn from_record(schema: &Schema, record: Record) -> Result<Self> {
        Self::from_source(schema, BASELINE, record)
    }

    /// Build a document through the source `name`. Nothing is marked modified.
    pub fn from_source(schema: &Schema, name: &str, record: Record) -> Result<Self> {
        let pipeline = schema.source(name)?;
        let doc = Document::new(schema);
        doc.apply_source(&pipeline, record, false)?;
        Ok(doc)
    }

    /// Import for an embedded field; registers a default source on first use.
    pub(crate) fn import_nested(schema: &Schema, name: &str, record: Record) -> Result<Self> {
        let pipeline = schema.source_or_default(name);
        let doc = Document::new(schema);
        doc.apply_source(&pipeline, record, false)?;
        Ok(doc)
    }

    /// Load `record` into this document through the source `name`.
    ///
    /// With `changed` the imported fields are marked modified; without it the
    /// validity cache is still dropped but nothing is marked.
    pub fn update_from(&self, name: &str, record: Record, changed: bool) -> Result<()> {
        let pipeline = self.schema().source(name)?;
        self.apply_source(&pipeline, record, changed)
    }

    fn apply_source(&self, pipeline: &Pipeline, record: Record, changed: bool) -> Result<()> {
        let schema = self.schema();
        let mut record = pipeline.apply_filters(record);
        for name in pipeline.field_names() {
            let Some(value) = record.swap_remove(&name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let field = schema.lookup(&name)?;
            let value = field.prepare(value, self, &name, pipeline.name())?;
            self.state.borrow_mut().values.insert(name.clone(), value);
            if changed {
                links::mark_changed(self, &name);
            }
        }
        if !changed {
            links::invalidate(self);
        }
        Ok(())
    }

    /// Render this document through the view `name`.
    pub fn export(&self, name: &str, options: ExportOptions) -> Result<Record> {
        let pipeline = self.schema().view(name)?;
        self.apply_view(&pipeline, options)
    }

    fn apply_view(&self, pipeline: &Pipeline, options: ExportOptions) -> Result<Record> {
        if options.validate && !self.validate() {
            debug!(schema = %self.schema().name(), view = pipeline.name(), "export refused");
            return Err(DocumentError::ValidationFailed {
                schema: self.schema().name().to_string(),
            });
        }

        let modified = self.modified_fields();
        let mut record = Record::new();
        for entry in &pipeline.entries {
            let value = match entry {
                Entry::Field(name) => {
                    if options.only_modified && !modified.contains(name) {
                        continue;
                    }
                    export_value(&self.get(name)?, pipeline.name(), options.validate)?
                }
                Entry::Computed(name, compute) => {
                    if options.only_modified {
                        continue;
                    }
                    let value = compute(self);
                    export_value(&value, pipeline.name(), options.validate).inspect_err(|e| {
                        debug!(entry = %name, error = %e, "computed entry failed")
                    })?
                }
            };
            if !value.is_null() {
                record.insert(entry.name().to_string(), value);
            }
        }
        Ok(pipeline.apply_filters(record))
    }
}

/// Plain data for a stored value: nested documents go through the view of the
/// same name, containers are copied element by element.
fn export_value(value: &Value, name: &str, validate: bool) -> Result<Value> {
    match value {
        Value::Document(doc) => {
            let pipeline = doc.schema().view_or_default(name);
            let options = ExportOptions::default().validate(validate);
            Ok(Value::Map(Map::from(doc.apply_view(&pipeline, options)?)))
        }
        Value::List(list) => list
            .to_vec()
            .iter()
            .map(|item| export_value(item, name, validate))
            .collect::<Result<List>>()
            .map(Value::List),
        Value::Map(map) => map
            .to_record()
            .iter()
            .map(|(k, v)| export_value(v, name, validate).map(|v| (k.clone(), v)))
            .collect::<Result<Map>>()
            .map(Value::Map),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::value::record_from_json;
    use serde_json::json;

    fn user() -> Schema {
        Schema::builder("User")
            .field("id", Field::integer().required(true))
            .field("name", Field::string())
            .field("email", Field::email())
            .build()
            .unwrap()
    }

    #[test]
    fn keep_wins_over_remove() {
        let schema = user();
        schema
            .add_view(
                "short",
                PipelineSpec::new().keep(["name", "id"]).remove(["id"]),
            )
            .unwrap();
        schema
            .add_source("public", PipelineSpec::new().remove(["email"]))
            .unwrap();
        assert_eq!(schema.view_fields("short").unwrap(), vec!["name", "id"]);
        assert_eq!(schema.source_fields("public").unwrap(), vec!["id", "name"]);
    }

    #[test]
    fn unknown_field_in_subset_is_rejected() {
        let err = user()
            .add_view("bad", PipelineSpec::new().keep(["nope"]))
            .unwrap_err();
        assert!(matches!(err, DocumentError::FieldNotFound { name, .. } if name == "nope"));
    }

    #[test]
    fn computed_entries_are_views_only() {
        let schema = user();
        let spec = PipelineSpec::new().computed("label", |_| Value::from("x"));
        assert!(schema.add_source("bad", spec.clone()).is_err());
        schema.add_view("labelled", spec).unwrap();
        assert_eq!(
            schema.view_fields("labelled").unwrap(),
            vec!["id", "name", "email", "label"]
        );
    }

    #[test]
    fn rename_and_format_filters() {
        let record = record_from_json(json!({"_id": 4, "name": "bob"}));
        let record = rename_field("_id", "id")(record);
        let record = format_field("name", |v| Value::from(v.as_str().unwrap_or("").to_uppercase()))(record);
        assert_eq!(record.get("id"), Some(&Value::from(4)));
        assert_eq!(record.get("name"), Some(&Value::from("BOB")));
        assert!(!record.contains_key("_id"));

        let untouched = rename_field("missing", "id")(Record::new());
        assert!(untouched.is_empty());
    }

    #[test]
    fn filters_run_in_registration_order() {
        let schema = user();
        schema
            .add_source(
                "api",
                PipelineSpec::new()
                    .with_filter(rename_field("_id", "id"))
                    .filter(|mut r| {
                        if let Some(Value::Int(i)) = r.get("id").cloned() {
                            r.insert("id".into(), Value::from(i * 10));
                        }
                        r
                    }),
            )
            .unwrap();
        let doc = Document::from_source(&schema, "api", record_from_json(json!({"_id": 4}))).unwrap();
        assert_eq!(doc.get("id").unwrap(), Value::from(40));
        assert!(doc.modified_fields().is_empty());
    }

    #[test]
    fn unregistered_top_level_pipeline_is_an_error() {
        let schema = user();
        assert!(matches!(
            Document::from_source(&schema, "mongo", Record::new()),
            Err(DocumentError::PipelineNotFound { direction: "source", .. })
        ));
        let doc = Document::new(&schema);
        assert!(matches!(
            doc.export("mongo", ExportOptions::default()),
            Err(DocumentError::PipelineNotFound { direction: "view", .. })
        ));
    }

    #[test]
    fn update_marks_only_when_changed() {
        let schema = user();
        let doc = Document::from_record(&schema, record_from_json(json!({"id": 1}))).unwrap();
        assert!(doc.validate());

        doc.update_from(BASELINE, record_from_json(json!({"name": "bob"})), false)
            .unwrap();
        assert!(doc.modified_fields().is_empty());

        doc.update_from(BASELINE, record_from_json(json!({"email": "bob@sponge.com"})), true)
            .unwrap();
        assert_eq!(
            doc.modified_fields().into_iter().collect::<Vec<_>>(),
            vec!["email".to_string()]
        );
    }

    #[test]
    fn export_options() {
        let schema = user();
        let doc = Document::from_record(&schema, record_from_json(json!({"name": "bob"}))).unwrap();
        assert!(matches!(
            doc.export(BASELINE, ExportOptions::default()),
            Err(DocumentError::ValidationFailed { .. })
        ));

        let all = doc
            .export(BASELINE, ExportOptions::default().validate(false))
            .unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["name"]);

        doc.set("id", Value::from(3)).unwrap();
        let changed = doc
            .export(BASELINE, ExportOptions::default().only_modified(true))
            .unwrap();
        assert_eq!(changed.keys().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn computed_entry_in_output() {
        let schema = user();
        schema
            .add_view(
                "display",
                PipelineSpec::new().keep(["id"]).computed("label", |doc| {
                    let id = doc.get("id").ok().and_then(|v| v.as_i64()).unwrap_or(0);
                    Value::from(format!("user-{id}"))
                }),
            )
            .unwrap();
        let doc = Document::from_record(&schema, record_from_json(json!({"id": 7}))).unwrap();
        let out = doc.export("display", ExportOptions::default()).unwrap();
        assert_eq!(out.get("label"), Some(&Value::from("user-7")));
        assert_eq!(out.len(), 2);
    }
}
