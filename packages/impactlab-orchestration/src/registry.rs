//! Name -> variable lookup and archive resolution
//!
//! Lifecycle: register superindices and variables (`&mut self`), then run
//! pipeline steps against a shared `&Registry`; archives live as long as the
//! registry does.

use impactlab_storage::{Archive, ArchiveKey, ArchiveStore, InMemoryArchiveStore, Indices};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{split_expression, RegistryConfig};
use crate::error::{OrchestratorError, Result};
use crate::index::SuperIndex;
use crate::variable::Variable;

/// Registry of variables, superindices and the archive cache
pub struct Registry {
    superindices: IndexMap<String, SuperIndex>,
    variables: IndexMap<String, Variable>,
    store: Arc<dyn ArchiveStore>,
}

impl Registry {
    /// Empty registry with an in-memory archive store
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryArchiveStore::new()))
    }

    pub fn with_store(store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            superindices: IndexMap::new(),
            variables: IndexMap::new(),
            store,
        }
    }

    /// Bootstrap from a validated configuration
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;

        let store = InMemoryArchiveStore::with_suffix(config.archive_suffix.clone());
        let mut registry = Self::with_store(Arc::new(store));

        for index in &config.superindices {
            let superindex = match (&index.values, &index.components) {
                (Some(values), None) => SuperIndex::from_values(
                    &index.name,
                    &index.description,
                    values.iter().cloned(),
                )?,
                (None, Some(components)) => SuperIndex::from_components(
                    &index.name,
                    &index.description,
                    components.clone(),
                )?,
                _ => {
                    return Err(OrchestratorError::invalid_superindex(
                        &index.name,
                        "provide values or components but not both",
                    ))
                }
            };
            registry.register_superindex(superindex);
        }

        for declared in &config.variables {
            let superindex =
                registry.parse_superindex(declared.superindex.as_deref().unwrap_or(""))?;
            let mut variable = Variable::new(&declared.name, superindex);
            if let Some(slice) = &declared.slice {
                variable = variable.slice_value(slice)?;
            }
            registry.register_variable(variable);
        }

        debug!(
            "registry bootstrapped: {} superindices, {} variables",
            registry.superindices.len(),
            registry.variables.len()
        );
        Ok(registry)
    }

    /// Registry holding the rcp × ssp impact-lab variables
    pub fn impactlab_default() -> Result<Self> {
        Self::from_config(&RegistryConfig::impactlab_default())
    }

    /// Register a superindex under its own name, replacing any previous one
    pub fn register_superindex(&mut self, superindex: SuperIndex) -> &SuperIndex {
        let name = superindex.name().to_string();
        if self.superindices.contains_key(&name) {
            warn!("replacing superindex {}", name);
        }
        self.superindices.insert(name.clone(), superindex);
        &self.superindices[&name]
    }

    /// Register a variable under its own name, replacing any previous one
    pub fn register_variable(&mut self, variable: Variable) -> Variable {
        if self.variables.contains_key(variable.name()) {
            warn!("replacing variable {}", variable.name());
        }
        self.variables
            .insert(variable.name().to_string(), variable.clone());
        variable
    }

    pub fn superindex(&self, name: &str) -> Result<&SuperIndex> {
        self.superindices
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownSuperIndex(name.to_string()))
    }

    /// Evaluate a product expression such as `rcp*ssp` over registered
    /// superindices; an empty expression (or `empty`) is the empty index
    pub fn parse_superindex(&self, expr: &str) -> Result<SuperIndex> {
        split_expression(expr)
            .into_iter()
            .try_fold(SuperIndex::empty(), |acc, name| {
                Ok(acc.multiply(self.superindex(name)?))
            })
    }

    pub fn superindices(&self) -> impl Iterator<Item = &SuperIndex> {
        self.superindices.values()
    }

    pub fn get_variable(&self, name: &str) -> Result<Variable> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownVariable(name.to_string()))
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Resolve (creating on first use) the archive for `name` at `indices`.
    ///
    /// Idempotent per `(name, indices)`; no dimension validation happens
    /// here, see [`Variable::get_archive`].
    pub fn get_archive(&self, name: &str, indices: &Indices) -> Arc<Archive> {
        self.store.get_or_create(ArchiveKey::new(name, indices.clone()))
    }

    /// The archive for `name` at `indices` if it has been resolved before
    pub fn find_archive(&self, name: &str, indices: &Indices) -> Option<Arc<Archive>> {
        self.store.get(&ArchiveKey::new(name, indices.clone()))
    }

    /// Every archive resolved so far, ordered by name
    pub fn archives(&self) -> Vec<Arc<Archive>> {
        self.store.archives()
    }

    /// Archives resolved so far for one variable
    pub fn archives_for(&self, variable: &str) -> Vec<Arc<Archive>> {
        self.store
            .archives()
            .into_iter()
            .filter(|archive| archive.variable() == variable)
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("superindices", &self.superindices.keys().collect::<Vec<_>>())
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("archives", &self.store.len())
            .finish()
    }
}
