//! Named registry of compiled schemas.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::definition::SchemaDef;
use crate::error::{DocumentError, Result};
use crate::schema::Schema;

/// Compiled schemas by name.
///
/// Schemas can be registered directly or compiled from [`SchemaDef`]s, which
/// refer to their parent and embedded schemas by name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an already compiled schema, replacing any with the same name.
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.name().to_string(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Like `get`, but a missing name is an error.
    pub fn schema(&self, name: &str) -> Result<&Schema> {
        self.get(name).ok_or_else(|| DocumentError::SchemaNotFound {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Compile a batch of definitions.
    ///
    /// Definitions may reference each other in any order and may reference
    /// schemas already in the registry. Nothing from the batch is kept if any
    /// definition fails.
    pub fn compile(&mut self, defs: impl IntoIterator<Item = SchemaDef>) -> Result<()> {
        let pending: IndexMap<String, SchemaDef> =
            defs.into_iter().map(|d| (d.name.clone(), d)).collect();
        let mut compiled = IndexMap::new();
        let mut stack = Vec::new();
        for name in pending.keys() {
            self.compile_one(name, &pending, &mut compiled, &mut stack)?;
        }
        self.schemas.extend(compiled);
        Ok(())
    }

    fn compile_one(
        &self,
        name: &str,
        pending: &IndexMap<String, SchemaDef>,
        compiled: &mut IndexMap<String, Schema>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        if compiled.contains_key(name) {
            return Ok(());
        }
        if stack.iter().any(|n| n == name) {
            return Err(DocumentError::CircularDefinition {
                name: name.to_string(),
            });
        }
        let Some(def) = pending.get(name) else {
            return Ok(());
        };

        stack.push(name.to_string());
        for dep in def.dependencies() {
            if pending.contains_key(&dep) {
                self.compile_one(&dep, pending, compiled, stack)?;
            } else if !self.schemas.contains_key(&dep) {
                return Err(DocumentError::SchemaNotFound { name: dep });
            }
        }
        stack.pop();

        let mut known = self.schemas.clone();
        known.extend(compiled.iter().map(|(k, v)| (k.clone(), v.clone())));
        let schema = def.compile(&known)?;
        debug!(schema = %name, fields = schema.fields().len(), "compiled schema definition");
        compiled.insert(name.to_string(), schema);
        Ok(())
    }

    /// Parse one YAML schema definition and compile it.
    pub fn load_str(&mut self, yaml: &str) -> Result<()> {
        let def: SchemaDef = serde_yaml_ng::from_str(yaml)?;
        self.compile([def])
    }

    /// Compile every `.yaml` definition in `dir`. Files that do not parse
    /// are skipped with a warning.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(DocumentError::NotInitialized {
                path: dir.to_path_buf(),
            });
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml")
            ) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut defs = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            match serde_yaml_ng::from_str::<SchemaDef>(&content) {
                Ok(def) => {
                    debug!(?path, schema = %def.name, "loaded schema definition");
                    defs.push(def);
                }
                Err(e) => {
                    warn!(?path, %e, "skipping invalid schema definition");
                }
            }
        }
        self.compile(defs)
    }
}
