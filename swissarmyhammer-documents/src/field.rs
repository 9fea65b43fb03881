//! Field descriptors: one attribute's kind, default, required flag and
//! constraints.
//!
//! Descriptors are built with chained modifiers in the same way as a
//! parameter definition:
//!
//! ```rust,ignore
//! let name = Field::string().required(true).with_length_range(Some(3), Some(8));
//! let tags = Field::list(Field::string())?.with_length_range(None, Some(4));
//! ```
//!
//! Composite constructors check their subfields immediately, so a
//! misconfigured descriptor fails where it is written rather than at
//! validation time.

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::container::{List, Map};
use crate::document::Document;
use crate::error::{DocumentError, Result};
use crate::links::{self, OwnerLinks};
use crate::schema::Schema;
use crate::validation;
use crate::value::Value;

/// Validator for a field kind defined outside this crate.
pub trait FieldValidator: fmt::Debug {
    /// Short kind name used in diagnostics and definitions
    fn kind_name(&self) -> &str;

    /// Whether a present value conforms to the kind
    fn validate(&self, value: &Value) -> bool;
}

/// The kind of a field. Determines what shape the value takes.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Boolean,
    String,
    Integer,
    Float,
    DateTime,
    IpAddress,
    Url,
    Email,
    List(Box<Field>),
    Map { key: Box<Field>, value: Box<Field> },
    Embedded(Schema),
    Custom(Rc<dyn FieldValidator>),
}

impl FieldKind {
    pub fn name(&self) -> &str {
        match self {
            FieldKind::Boolean => "boolean",
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::DateTime => "datetime",
            FieldKind::IpAddress => "ip-address",
            FieldKind::Url => "url",
            FieldKind::Email => "email",
            FieldKind::List(_) => "list",
            FieldKind::Map { .. } => "map",
            FieldKind::Embedded(_) => "embedded",
            FieldKind::Custom(v) => v.kind_name(),
        }
    }

    fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldKind::String | FieldKind::Url | FieldKind::Email | FieldKind::IpAddress
        )
    }

    fn has_length(&self) -> bool {
        matches!(
            self,
            FieldKind::String | FieldKind::Url | FieldKind::Email | FieldKind::List(_)
        )
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float)
    }
}

/// A field's default: a fixed value or a zero-argument factory called on
/// every materialisation.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Factory(Rc<dyn Fn() -> Value>),
}

impl FieldDefault {
    /// The value to store. Fixed defaults come back as a fresh copy, with
    /// documents unpacked to raw maps so each materialisation imports its
    /// own document.
    pub fn resolve(&self) -> Value {
        match self {
            FieldDefault::Value(v) => fresh(v),
            FieldDefault::Factory(f) => f(),
        }
    }
}

fn fresh(value: &Value) -> Value {
    match value {
        Value::Document(doc) => Value::Map(
            doc.stored_values()
                .iter()
                .map(|(k, v)| (k.clone(), fresh(v)))
                .collect(),
        ),
        Value::List(list) => Value::List(list.to_vec().iter().map(fresh).collect()),
        Value::Map(map) => Value::Map(
            map.to_record()
                .iter()
                .map(|(k, v)| (k.clone(), fresh(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Length, pattern and numeric range constraints.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Minimum length (characters for strings, elements for lists)
    pub min_length: Option<usize>,

    /// Maximum length (characters for strings, elements for lists)
    pub max_length: Option<usize>,

    /// Pattern a non-empty string must match from its first character
    pub pattern: Option<Regex>,

    /// Minimum numeric value
    pub min: Option<f64>,

    /// Maximum numeric value
    pub max: Option<f64>,
}

/// The complete description of a single named attribute.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    default: Option<FieldDefault>,
    required: bool,
    choices: Option<Vec<Value>>,
    constraints: Constraints,
}

impl Field {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            default: None,
            required: false,
            choices: None,
            constraints: Constraints::default(),
        }
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    /// Floats; integral values are accepted too.
    pub fn float() -> Self {
        Self::of(FieldKind::Float)
    }

    pub fn datetime() -> Self {
        Self::of(FieldKind::DateTime)
    }

    /// IPv4 or IPv6 literal.
    pub fn ip_address() -> Self {
        Self::of(FieldKind::IpAddress)
    }

    /// http(s) URL.
    pub fn url() -> Self {
        Self::of(FieldKind::Url)
    }

    pub fn email() -> Self {
        Self::of(FieldKind::Email)
    }

    /// Ordered sequence of `subfield` values, defaulting to an empty list.
    pub fn list(subfield: Field) -> Result<Self> {
        if let Some(problem) = subfield.problem() {
            return Err(DocumentError::invalid_descriptor(format!(
                "list subfield: {problem}"
            )));
        }
        Ok(Self::of(FieldKind::List(Box::new(subfield)))
            .with_default_fn(|| Value::List(List::new())))
    }

    /// String-keyed mapping, defaulting to an empty map. `key` must be a
    /// string-valued kind.
    pub fn map(key: Field, value: Field) -> Result<Self> {
        if !key.kind.is_textual() {
            return Err(DocumentError::invalid_descriptor(format!(
                "map keys are strings, got a {} key field",
                key.kind.name()
            )));
        }
        if let Some(problem) = key.problem().or_else(|| value.problem()) {
            return Err(DocumentError::invalid_descriptor(format!(
                "map subfield: {problem}"
            )));
        }
        Ok(Self::of(FieldKind::Map {
            key: Box::new(key),
            value: Box::new(value),
        })
        .with_default_fn(|| Value::Map(Map::new())))
    }

    /// A nested document of `schema` (or a schema extending it).
    pub fn embedded(schema: &Schema) -> Self {
        Self::of(FieldKind::Embedded(schema.clone()))
    }

    /// A kind validated by an external validator.
    pub fn custom(validator: Rc<dyn FieldValidator>) -> Self {
        Self::of(FieldKind::Custom(validator))
    }

    /// Mark the field as required for strict validation
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Fixed default value. Every materialisation gets its own copy, so a
    /// document default is never shared between owners.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Default produced by calling `factory` each time the field materialises
    pub fn with_default_fn(mut self, factory: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(FieldDefault::Factory(Rc::new(factory)));
        self
    }

    /// Closed set of allowed values, checked before the kind validator
    pub fn with_choices<V: Into<Value>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Set length constraints
    pub fn with_length_range(mut self, min_length: Option<usize>, max_length: Option<usize>) -> Self {
        self.constraints.min_length = min_length;
        self.constraints.max_length = max_length;
        self
    }

    /// Set numeric range constraints
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.min = min;
        self.constraints.max = max;
        self
    }

    /// Set regex pattern validation. Fails on an invalid pattern.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            DocumentError::invalid_descriptor(format!("invalid pattern '{pattern}': {e}"))
        })?;
        self.constraints.pattern = Some(regex);
        Ok(self)
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    pub fn choices(&self) -> Option<&[Value]> {
        self.choices.as_deref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Check that every constraint fits the kind and that bounds are ordered.
    pub fn check(&self) -> Result<()> {
        match self.problem() {
            Some(message) => Err(DocumentError::invalid_descriptor(message)),
            None => Ok(()),
        }
    }

    /// First configuration problem found, if any.
    pub(crate) fn problem(&self) -> Option<String> {
        let c = &self.constraints;
        let kind = self.kind.name();
        if (c.min_length.is_some() || c.max_length.is_some()) && !self.kind.has_length() {
            return Some(format!("length constraint on a {kind} field"));
        }
        if let (Some(min), Some(max)) = (c.min_length, c.max_length) {
            if min > max {
                return Some(format!("min length {min} exceeds max length {max}"));
            }
        }
        if c.pattern.is_some() && !matches!(self.kind, FieldKind::String) {
            return Some(format!("pattern on a {kind} field"));
        }
        if (c.min.is_some() || c.max.is_some()) && !self.kind.is_numeric() {
            return Some(format!("numeric range on a {kind} field"));
        }
        if let (Some(min), Some(max)) = (c.min, c.max) {
            if min > max {
                return Some(format!("min {min} exceeds max {max}"));
            }
        }
        match &self.kind {
            FieldKind::List(sub) => sub.problem().map(|p| format!("list subfield: {p}")),
            FieldKind::Map { key, value } => key
                .problem()
                .or_else(|| value.problem())
                .map(|p| format!("map subfield: {p}")),
            _ => None,
        }
    }

    /// Full check of a present value: choices first, then the kind validator.
    pub fn validate(&self, value: &Value) -> bool {
        if let Some(choices) = &self.choices {
            if !choices.contains(value) {
                return false;
            }
        }
        self.validate_kind(value)
    }

    fn validate_kind(&self, value: &Value) -> bool {
        let c = &self.constraints;
        match &self.kind {
            FieldKind::Boolean => matches!(value, Value::Bool(_)),
            FieldKind::String => validation::string(value, c, None, self.required),
            FieldKind::Url => validation::string(value, c, Some(validation::url_regex()), self.required),
            FieldKind::Email => {
                validation::string(value, c, Some(validation::email_regex()), self.required)
            }
            FieldKind::IpAddress => validation::ip_address(value),
            FieldKind::Integer => match value {
                Value::Int(i) => validation::in_range(*i as f64, c),
                _ => false,
            },
            FieldKind::Float => match value {
                Value::Float(_) | Value::Int(_) => {
                    value.as_f64().is_some_and(|f| validation::in_range(f, c))
                }
                _ => false,
            },
            FieldKind::DateTime => matches!(value, Value::DateTime(_)),
            FieldKind::List(sub) => match value {
                Value::List(list) => {
                    validation::length_ok(list.len(), c)
                        && list.to_vec().iter().all(|item| sub.validate(item))
                }
                _ => false,
            },
            FieldKind::Map { key, value: sub } => match value {
                Value::Map(map) => map
                    .to_record()
                    .iter()
                    .all(|(k, v)| key.validate(&Value::String(k.clone())) && sub.validate(v)),
                _ => false,
            },
            FieldKind::Embedded(schema) => match value {
                Value::Document(doc) => doc.schema().is_a(schema) && doc.validate(),
                _ => false,
            },
            FieldKind::Custom(validator) => validator.validate(value),
        }
    }

    /// Shape a value for this field without linking it anywhere.
    ///
    /// Raw maps for embedded fields become documents imported through
    /// `pipeline`; list and map values become fresh proxies remembering their
    /// element descriptor. Values of the wrong shape pass through untouched so
    /// that validation, not assignment, reports them.
    pub(crate) fn convert(&self, value: Value, pipeline: &str) -> Result<Value> {
        match (&self.kind, value) {
            (FieldKind::Embedded(schema), Value::Map(raw)) => Ok(Value::Document(
                Document::import_nested(schema, pipeline, raw.to_record())?,
            )),
            (FieldKind::List(sub), Value::List(list)) => {
                let items = list
                    .to_vec()
                    .into_iter()
                    .map(|item| sub.convert(item, pipeline))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(List::for_field(items, sub)))
            }
            (FieldKind::Map { value: sub, .. }, Value::Map(map)) => {
                let items = map
                    .to_record()
                    .into_iter()
                    .map(|(k, v)| sub.convert(v, pipeline).map(|v| (k, v)))
                    .collect::<Result<_>>()?;
                Ok(Value::Map(Map::for_field(items, sub)))
            }
            (_, value) => Ok(value),
        }
    }

    /// Convert a value for storage in `owner.field` and link it there.
    pub(crate) fn prepare(
        &self,
        value: Value,
        owner: &Document,
        field: &str,
        pipeline: &str,
    ) -> Result<Value> {
        let value = self.convert(value, pipeline)?;
        if matches!(
            self.kind,
            FieldKind::Embedded(_) | FieldKind::List(_) | FieldKind::Map { .. }
        ) {
            links::attach(&value, &OwnerLinks::single(owner, field), None, field)?;
        }
        Ok(value)
    }
}
