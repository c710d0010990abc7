//! Superindex algebra
//!
//! A [`SuperIndex`] is a set of named, independently enumerable dimensions.
//! Multiplying two superindices composes their dimensions; slicing pins some
//! dimensions to a single value. Enumeration yields the cartesian product.
//!
//! # Examples
//!
//! ```rust
//! use impactlab_orchestration::SuperIndex;
//!
//! let rcp = SuperIndex::from_values(
//!     "rcp",
//!     "Representative Concentration Pathways",
//!     ["rcp26", "rcp45", "rcp60", "rcp85"],
//! ).unwrap();
//! let ssp = SuperIndex::from_values(
//!     "ssp",
//!     "Shared Socioeconomic Pathway",
//!     ["ssp1", "ssp2", "ssp3", "ssp4", "ssp5"],
//! ).unwrap();
//!
//! let combined = &rcp * &ssp;
//! assert_eq!(combined.name(), "rcp*ssp");
//! assert_eq!(combined.iter().count(), 20);
//!
//! let key = [("rcp".to_string(), "rcp85".to_string())].into_iter().collect();
//! let filtered = combined.restrict(&key);
//! assert!(filtered.iter().all(|element| element["rcp"] == "rcp85"));
//! assert_eq!(filtered.len(), 5);
//! ```

use impactlab_storage::Indices;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;

use crate::error::{OrchestratorError, Result};

/// One value assignment within a component, typically `{dimension: value}`
pub type Assignment = Indices;

/// Ordered mapping from component name to its assignments
pub type Components = IndexMap<String, Vec<Assignment>>;

/// Name given to the empty superindex
pub const EMPTY_NAME: &str = "empty";

/// Named, possibly multi-dimensional enumerable index space
///
/// Immutable: [`SuperIndex::multiply`] and [`SuperIndex::restrict`] build new
/// instances.
///
/// Deserialization goes through the same checks as
/// [`SuperIndex::from_components`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SuperIndexRepr")]
pub struct SuperIndex {
    name: String,
    description: Option<String>,
    components: Components,
}

impl SuperIndex {
    /// The index with no components: "no indexing", enumerates nothing
    pub fn empty() -> Self {
        Self {
            name: EMPTY_NAME.to_string(),
            description: None,
            components: Components::new(),
        }
    }

    /// Single-component index named `name` whose assignments are
    /// `{name: value}` for each value
    pub fn from_values<I, V>(
        name: impl Into<String>,
        description: impl Into<String>,
        values: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let assignments = values
            .into_iter()
            .map(|value| Assignment::from([(name.clone(), value.into())]))
            .collect();
        Self::from_assignments(name, description, assignments)
    }

    /// Single-component index with explicit (possibly multi-dimension)
    /// assignments
    pub fn from_assignments(
        name: impl Into<String>,
        description: impl Into<String>,
        assignments: Vec<Assignment>,
    ) -> Result<Self> {
        let name = name.into();
        let mut components = Components::new();
        components.insert(name.clone(), assignments);
        Self::from_components(name, description, components)
    }

    /// Index from an explicit component map
    pub fn from_components(
        name: impl Into<String>,
        description: impl Into<String>,
        components: Components,
    ) -> Result<Self> {
        let name = name.into();
        check_components(&name, &components)?;

        Ok(Self {
            name,
            description: Some(description.into()),
            components,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&[Assignment]> {
        self.components.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of elements the enumeration yields (0 for the empty index).
    ///
    /// Saturates at `usize::MAX`; see [`SuperIndex::checked_len`].
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    /// [`SuperIndex::len`], failing with `InvalidSuperIndex` when the
    /// enumeration size does not fit in `usize`
    pub fn checked_len(&self) -> Result<usize> {
        if self.components.is_empty() {
            return Ok(0);
        }
        self.components
            .values()
            .try_fold(1usize, |acc, assignments| acc.checked_mul(assignments.len()))
            .ok_or_else(|| {
                OrchestratorError::invalid_superindex(&self.name, "too many combinations")
            })
    }

    /// Dimension names appearing in the assignments, in first-seen order
    pub fn dimensions(&self) -> Vec<&str> {
        let mut dims: Vec<&str> = Vec::new();
        for assignment in self.components.values().flatten() {
            for dim in assignment.keys() {
                if !dims.contains(&dim.as_str()) {
                    dims.push(dim);
                }
            }
        }
        dims
    }

    pub fn has_dimension(&self, dimension: &str) -> bool {
        self.components
            .values()
            .flatten()
            .any(|assignment| assignment.contains_key(dimension))
    }

    /// Compose two indices.
    ///
    /// Components are merged in order; when both declare the same component
    /// name, `other`'s component replaces `self`'s in place (last writer
    /// wins). The empty index is the identity and leaves the other operand
    /// untouched, name and description included.
    pub fn multiply(&self, other: &SuperIndex) -> SuperIndex {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }

        let mut components = self.components.clone();
        for (name, assignments) in &other.components {
            components.insert(name.clone(), assignments.clone());
        }

        let name = components
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("*");
        let description = format!("combinatorial product of ({})", name);

        SuperIndex {
            name,
            description: Some(description),
            components,
        }
    }

    /// Pin every component named in `key` to the single assignment
    /// `{component: key[component]}`; other components are kept.
    pub fn restrict(&self, key: &Indices) -> SuperIndex {
        let components = self
            .components
            .iter()
            .map(|(component, assignments)| match key.get(component) {
                Some(value) => (
                    component.clone(),
                    vec![Assignment::from([(component.clone(), value.clone())])],
                ),
                None => (component.clone(), assignments.clone()),
            })
            .collect();

        SuperIndex {
            name: self.name.clone(),
            description: Some(format!("({}) sliced with {:?}", self.name, key)),
            components,
        }
    }

    /// [`SuperIndex::restrict`] with a dynamically typed key.
    ///
    /// Fails with [`OrchestratorError::InvalidKey`] unless `key` is a mapping
    /// of dimension names to scalar values.
    pub fn restrict_value(&self, key: &serde_json::Value) -> Result<SuperIndex> {
        Ok(self.restrict(&key_from_value(key)?))
    }

    /// Lazy cartesian enumeration; the last component varies fastest
    pub fn iter(&self) -> SuperIndexIter<'_> {
        SuperIndexIter::new(self)
    }
}

fn check_components(name: &str, components: &Components) -> Result<()> {
    for (component, assignments) in components {
        if assignments.is_empty() {
            return Err(OrchestratorError::invalid_superindex(
                name,
                format!("component '{}' has no values", component),
            ));
        }
        if assignments.iter().any(|a| a.is_empty()) {
            return Err(OrchestratorError::invalid_superindex(
                name,
                format!("component '{}' has an empty assignment", component),
            ));
        }
    }
    Ok(())
}

/// Unchecked wire form of [`SuperIndex`]
#[derive(Deserialize)]
struct SuperIndexRepr {
    name: String,
    description: Option<String>,
    components: Components,
}

impl TryFrom<SuperIndexRepr> for SuperIndex {
    type Error = OrchestratorError;

    fn try_from(repr: SuperIndexRepr) -> Result<Self> {
        check_components(&repr.name, &repr.components)?;
        Ok(Self {
            name: repr.name,
            description: repr.description,
            components: repr.components,
        })
    }
}

impl Default for SuperIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for SuperIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SuperIndex {}>", self.name)
    }
}

impl Mul for &SuperIndex {
    type Output = SuperIndex;

    fn mul(self, rhs: &SuperIndex) -> SuperIndex {
        self.multiply(rhs)
    }
}

impl Mul for SuperIndex {
    type Output = SuperIndex;

    fn mul(self, rhs: SuperIndex) -> SuperIndex {
        self.multiply(&rhs)
    }
}

impl<'a> IntoIterator for &'a SuperIndex {
    type Item = Indices;
    type IntoIter = SuperIndexIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the elements of a [`SuperIndex`]
#[derive(Debug, Clone)]
pub struct SuperIndexIter<'a> {
    components: Vec<&'a [Assignment]>,
    positions: Vec<usize>,
    remaining: usize,
}

impl<'a> SuperIndexIter<'a> {
    fn new(index: &'a SuperIndex) -> Self {
        Self {
            components: index.components.values().map(Vec::as_slice).collect(),
            positions: vec![0; index.components.len()],
            remaining: index.len(),
        }
    }

    fn advance(&mut self) {
        for slot in (0..self.positions.len()).rev() {
            self.positions[slot] += 1;
            if self.positions[slot] < self.components[slot].len() {
                return;
            }
            self.positions[slot] = 0;
        }
    }
}

impl Iterator for SuperIndexIter<'_> {
    type Item = Indices;

    fn next(&mut self) -> Option<Indices> {
        if self.remaining == 0 {
            return None;
        }

        let mut element = Indices::new();
        for (assignments, &pos) in self.components.iter().zip(&self.positions) {
            for (dim, value) in &assignments[pos] {
                element.insert(dim.clone(), value.clone());
            }
        }

        self.remaining -= 1;
        self.advance();
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SuperIndexIter<'_> {}

/// Convert a dynamically typed slice key into concrete indices
pub fn key_from_value(key: &serde_json::Value) -> Result<Indices> {
    let map = key
        .as_object()
        .ok_or_else(|| OrchestratorError::invalid_key(key, "slice key must be a mapping"))?;

    map.iter()
        .map(|(dim, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(OrchestratorError::invalid_key(
                        key,
                        format!("value for '{}' must be a scalar, got {}", dim, other),
                    ))
                }
            };
            Ok((dim.clone(), value))
        })
        .collect()
}

/// Parse a textual slice key such as `rcp=rcp85,ssp=ssp3`
pub fn parse_key(text: &str) -> Result<Indices> {
    let mut key = Indices::new();
    for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (dim, value) = pair
            .split_once('=')
            .ok_or_else(|| OrchestratorError::invalid_key(text, "expected dimension=value"))?;
        let (dim, value) = (dim.trim(), value.trim());
        if dim.is_empty() || value.is_empty() {
            return Err(OrchestratorError::invalid_key(
                text,
                "dimension and value must be non-empty",
            ));
        }
        key.insert(dim.to_string(), value.to_string());
    }
    Ok(key)
}
