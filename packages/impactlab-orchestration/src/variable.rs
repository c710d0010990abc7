//! Index-aware handles to families of archives

use impactlab_storage::{Archive, Indices};
use std::fmt;
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};
use crate::index::SuperIndex;
use crate::registry::Registry;

/// A named data source whose archives are addressed by its superindex
///
/// Variables are cheap to clone; slicing produces an independent handle with
/// the same name and a restricted superindex.
///
/// ```rust
/// use impactlab_orchestration::{SuperIndex, Variable};
///
/// let rcp = SuperIndex::from_values("rcp", "RCPs", ["rcp26", "rcp85"]).unwrap();
/// let ssp = SuperIndex::from_values("ssp", "SSPs", ["ssp1", "ssp2", "ssp3"]).unwrap();
/// let mort = Variable::new("mortality", &ssp * &rcp);
///
/// let key = [("rcp".to_string(), "rcp85".to_string())].into_iter().collect();
/// let mort_rcp85 = mort.slice(&key);
/// assert_eq!(mort_rcp85.superindex().len(), 3);
/// assert_eq!(mort_rcp85.name(), "mortality");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    superindex: Arc<SuperIndex>,
}

impl Variable {
    pub fn new(name: impl Into<String>, superindex: SuperIndex) -> Self {
        Self {
            name: name.into(),
            superindex: Arc::new(superindex),
        }
    }

    /// Variable with the empty superindex
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, SuperIndex::empty())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superindex(&self) -> &SuperIndex {
        &self.superindex
    }

    /// Same variable with its superindex restricted by `key`
    pub fn slice(&self, key: &Indices) -> Variable {
        Self {
            name: self.name.clone(),
            superindex: Arc::new(self.superindex.restrict(key)),
        }
    }

    /// [`Variable::slice`] with a dynamically typed key
    pub fn slice_value(&self, key: &serde_json::Value) -> Result<Variable> {
        Ok(Self {
            name: self.name.clone(),
            superindex: Arc::new(self.superindex.restrict_value(key)?),
        })
    }

    /// Fail with `UnknownDimension` if `indices` names a dimension this
    /// variable's superindex does not declare
    pub fn check_indices(&self, indices: &Indices) -> Result<()> {
        match indices.keys().find(|dim| !self.superindex.has_dimension(dim)) {
            Some(dim) => Err(OrchestratorError::UnknownDimension {
                variable: self.name.clone(),
                dimension: dim.clone(),
                declared: self.superindex.dimensions().join(", "),
            }),
            None => Ok(()),
        }
    }

    /// Resolve the archive holding this variable at `indices`.
    ///
    /// Repeated calls with equal indices return the same archive.
    pub fn get_archive(&self, registry: &Registry, indices: &Indices) -> Result<Arc<Archive>> {
        self.check_indices(indices)?;
        Ok(registry.get_archive(&self.name, indices))
    }

    /// Keep only the entries of `element` that are dimensions of this variable
    pub fn project(&self, element: &Indices) -> Indices {
        element
            .iter()
            .filter(|(dim, _)| self.superindex.has_dimension(dim))
            .map(|(dim, value)| (dim.clone(), value.clone()))
            .collect()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Variable {}>", self.name)
    }
}
