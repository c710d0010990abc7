//! Named step arguments
//!
//! A step argument is one of three kinds. Only bound variables carry a
//! superindex (and so drive iteration); only resolved archives carry concrete
//! indices (and so key writes).

use impactlab_storage::{Archive, Indices, Payload};
use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::Result;
use crate::index::SuperIndex;
use crate::registry::Registry;
use crate::variable::Variable;

/// One named argument of a pipeline step
#[derive(Debug, Clone)]
pub enum StepArg {
    /// An unresolved variable; index-bearing
    Variable(Variable),
    /// An archive resolved for concrete indices
    Archive(Arc<Archive>),
    /// A plain value passed through untouched
    Scalar(Payload),
}

impl StepArg {
    pub fn kind(&self) -> &'static str {
        match self {
            StepArg::Variable(_) => "variable",
            StepArg::Archive(_) => "archive",
            StepArg::Scalar(_) => "scalar",
        }
    }

    /// Does this argument contribute to an iteration product?
    pub fn is_index_bearing(&self) -> bool {
        matches!(self, StepArg::Variable(_))
    }

    pub fn superindex(&self) -> Option<&SuperIndex> {
        match self {
            StepArg::Variable(variable) => Some(variable.superindex()),
            _ => None,
        }
    }

    /// Concrete indices, for arguments that have them
    pub fn indices(&self) -> Option<&Indices> {
        match self {
            StepArg::Archive(archive) => Some(archive.indices()),
            _ => None,
        }
    }

    /// Name of the variable this argument reads, if any
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            StepArg::Variable(variable) => Some(variable.name()),
            StepArg::Archive(archive) => Some(archive.variable()),
            StepArg::Scalar(_) => None,
        }
    }

    /// Resolve a variable to its archive at `element` (restricted to the
    /// variable's own dimensions); other kinds pass through.
    pub fn resolve(&self, registry: &Registry, element: &Indices) -> Result<StepArg> {
        match self {
            StepArg::Variable(variable) => {
                let indices = variable.project(element);
                Ok(StepArg::Archive(variable.get_archive(registry, &indices)?))
            }
            other => Ok(other.clone()),
        }
    }
}

impl From<Variable> for StepArg {
    fn from(variable: Variable) -> Self {
        StepArg::Variable(variable)
    }
}

impl From<Arc<Archive>> for StepArg {
    fn from(archive: Arc<Archive>) -> Self {
        StepArg::Archive(archive)
    }
}

impl From<Payload> for StepArg {
    fn from(value: Payload) -> Self {
        StepArg::Scalar(value)
    }
}

/// Ordered set of named step arguments
#[derive(Debug, Clone, Default)]
pub struct StepArgs {
    args: IndexMap<String, StepArg>,
}

impl StepArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, arg: impl Into<StepArg>) -> Self {
        self.insert(name, arg);
        self
    }

    /// Insert or replace an argument
    pub fn insert(&mut self, name: impl Into<String>, arg: impl Into<StepArg>) {
        self.args.insert(name.into(), arg.into());
    }

    /// Merge `other` into `self`; `other` wins on name collision
    pub fn merge(&mut self, other: &StepArgs) {
        for (name, arg) in &other.args {
            self.args.insert(name.clone(), arg.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&StepArg> {
        self.args.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StepArg)> {
        self.args.iter().map(|(name, arg)| (name.as_str(), arg))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Superindices of the index-bearing arguments, in argument order
    pub fn superindices(&self) -> impl Iterator<Item = &SuperIndex> {
        self.args.values().filter_map(StepArg::superindex)
    }

    /// Per-iteration argument set: every variable resolved at `element`
    pub fn resolve(&self, registry: &Registry, element: &Indices) -> Result<StepArgs> {
        let args = self
            .args
            .iter()
            .map(|(name, arg)| Ok((name.clone(), arg.resolve(registry, element)?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(StepArgs { args })
    }
}

impl<K, A> FromIterator<(K, A)> for StepArgs
where
    K: Into<String>,
    A: Into<StepArg>,
{
    fn from_iter<T: IntoIterator<Item = (K, A)>>(iter: T) -> Self {
        let mut args = StepArgs::new();
        for (name, arg) in iter {
            args.insert(name, arg);
        }
        args
    }
}
