//! Declarative schema definitions.
//!
//! All types serialize to/from YAML via serde. A schema definition names its
//! parent and embedded schemas by name; [`SchemaRegistry`](crate::SchemaRegistry)
//! resolves those names and compiles definitions in dependency order.
//!
//! ```yaml
//! name: User
//! extends: Entity
//! fields:
//!   - name: name
//!     type: { kind: string }
//!     required: true
//!     max_length: 8
//!   - name: tags
//!     type:
//!       kind: list
//!       item: { type: { kind: string } }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, Result};
use crate::field::Field;
use crate::schema::Schema;
use crate::value::Value;

/// The kind of a field as written in a definition file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldKindDef {
    Boolean,
    String,
    Integer,
    Float,
    Datetime,
    IpAddress,
    Url,
    Email,
    List {
        item: Box<FieldDef>,
    },
    Map {
        key: Box<FieldDef>,
        value: Box<FieldDef>,
    },
    /// A nested document of the named schema.
    Embedded {
        schema: String,
    },
}

/// A field definition. `name` may be left out for list items and map
/// keys or values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldKindDef,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldDef {
    /// Names of the schemas this field embeds, at any depth.
    pub fn embedded_schemas(&self) -> Vec<String> {
        match &self.type_ {
            FieldKindDef::Embedded { schema } => vec![schema.clone()],
            FieldKindDef::List { item } => item.embedded_schemas(),
            FieldKindDef::Map { key, value } => {
                let mut names = key.embedded_schemas();
                names.extend(value.embedded_schemas());
                names
            }
            _ => Vec::new(),
        }
    }

    /// Build the descriptor, resolving embedded schemas among `known`.
    pub fn to_field(&self, known: &IndexMap<String, Schema>) -> Result<Field> {
        let mut field = match &self.type_ {
            FieldKindDef::Boolean => Field::boolean(),
            FieldKindDef::String => Field::string(),
            FieldKindDef::Integer => Field::integer(),
            FieldKindDef::Float => Field::float(),
            FieldKindDef::Datetime => Field::datetime(),
            FieldKindDef::IpAddress => Field::ip_address(),
            FieldKindDef::Url => Field::url(),
            FieldKindDef::Email => Field::email(),
            FieldKindDef::List { item } => Field::list(item.to_field(known)?)?,
            FieldKindDef::Map { key, value } => {
                Field::map(key.to_field(known)?, value.to_field(known)?)?
            }
            FieldKindDef::Embedded { schema } => {
                let schema = known
                    .get(schema)
                    .ok_or_else(|| DocumentError::SchemaNotFound {
                        name: schema.clone(),
                    })?;
                Field::embedded(schema)
            }
        };

        field = field.required(self.required);
        if let Some(default) = &self.default {
            field = field.with_default(Value::from_json(default.clone()));
        }
        if let Some(choices) = &self.choices {
            field = field.with_choices(choices.iter().cloned().map(Value::from_json));
        }
        if self.min_length.is_some() || self.max_length.is_some() {
            field = field.with_length_range(self.min_length, self.max_length);
        }
        if self.min.is_some() || self.max.is_some() {
            field = field.with_range(self.min, self.max);
        }
        if let Some(pattern) = &self.pattern {
            field = field.with_pattern(pattern)?;
        }
        Ok(field)
    }
}

/// A schema definition: its name, optional parent and fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl SchemaDef {
    /// Schemas that must be compiled before this one.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = self.extends.iter().cloned().collect();
        for field in &self.fields {
            for name in field.embedded_schemas() {
                if !deps.contains(&name) {
                    deps.push(name);
                }
            }
        }
        deps
    }

    /// Compile against already compiled schemas.
    pub fn compile(&self, known: &IndexMap<String, Schema>) -> Result<Schema> {
        let mut builder = Schema::builder(&self.name);
        if let Some(parent) = &self.extends {
            let parent = known
                .get(parent)
                .ok_or_else(|| DocumentError::SchemaNotFound {
                    name: parent.clone(),
                })?;
            builder = builder.extends(parent);
        }
        for def in &self.fields {
            if def.name.is_empty() {
                return Err(DocumentError::invalid_descriptor(format!(
                    "unnamed field in schema '{}'",
                    self.name
                )));
            }
            builder = builder.field(def.name.clone(), def.to_field(known)?);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;

    #[test]
    fn field_def_yaml_round_trip() {
        let yaml = r#"
name: tags
type:
  kind: list
  item:
    type: { kind: string }
    max_length: 10
max_length: 4
"#;
        let def: FieldDef = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(def.name, "tags");
        assert_eq!(def.max_length, Some(4));
        let FieldKindDef::List { item } = &def.type_ else {
            panic!("expected a list kind");
        };
        assert_eq!(item.type_, FieldKindDef::String);
        assert!(item.name.is_empty());

        let out = serde_yaml_ng::to_string(&def).unwrap();
        let again: FieldDef = serde_yaml_ng::from_str(&out).unwrap();
        assert_eq!(def, again);
    }

    #[test]
    fn kebab_case_kinds() {
        let def: FieldDef =
            serde_yaml_ng::from_str("name: host\ntype: { kind: ip-address }").unwrap();
        assert_eq!(def.type_, FieldKindDef::IpAddress);
    }

    #[test]
    fn constraints_carry_into_the_field() {
        let yaml = r#"
name: role
type: { kind: string }
required: true
default: guest
choices: [guest, admin]
pattern: "^[a-z]+$"
"#;
        let def: FieldDef = serde_yaml_ng::from_str(yaml).unwrap();
        let field = def.to_field(&IndexMap::new()).unwrap();
        assert!(field.is_required());
        assert!(matches!(field.kind(), FieldKind::String));
        assert_eq!(field.default_value().unwrap().resolve(), Value::from("guest"));
        assert!(field.validate(&Value::from("admin")));
        assert!(!field.validate(&Value::from("root")));
    }

    #[test]
    fn unknown_embedded_schema() {
        let def: FieldDef =
            serde_yaml_ng::from_str("name: owner\ntype: { kind: embedded, schema: User }").unwrap();
        assert_eq!(def.embedded_schemas(), vec!["User"]);
        assert!(matches!(
            def.to_field(&IndexMap::new()),
            Err(DocumentError::SchemaNotFound { name }) if name == "User"
        ));
    }

    #[test]
    fn misconfigured_definition_fails() {
        let def: FieldDef =
            serde_yaml_ng::from_str("name: flag\ntype: { kind: boolean }\nmin: 1").unwrap();
        let err = SchemaDef {
            name: "Bad".into(),
            extends: None,
            fields: vec![def],
        }
        .compile(&IndexMap::new())
        .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDescriptor { .. }));
    }
}
