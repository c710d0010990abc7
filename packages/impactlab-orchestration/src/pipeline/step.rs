//! Pipeline steps: a function body plus an ordered list of stages
//!
//! Stages are listed outermost first and run in that order when the step is
//! called:
//!
//! - `Bind` injects named arguments (bindings override caller values)
//! - `Iterate` runs the rest of the step once per element of the product of
//!   every bound variable's superindex, with those variables resolved to
//!   archives
//! - `Write` runs the rest of the step and stores its result in the target
//!   variable's archive, keyed by the union of the archive arguments' indices
//!
//! The body itself only sees resolved arguments through [`StepContext`].
//!
//! ```rust
//! use impactlab_orchestration::{Registry, Step, StepArg};
//! use serde_json::json;
//!
//! let registry = Registry::impactlab_default().unwrap();
//! let tas = registry.get_variable("/GCP/climate/tas").unwrap();
//! let tas2 = registry.get_variable("/GCP/climate/tas2_ir").unwrap();
//!
//! let square = Step::builder("tas2_ir")
//!     .uses([("tas", StepArg::from(tas))])
//!     .iters()
//!     .updates(tas2)
//!     .params(["tas"])
//!     .body(|ctx| {
//!         let t: f64 = ctx.archive("tas")?.decode().unwrap_or(1.5);
//!         Ok(json!(t * t))
//!     })
//!     .unwrap();
//!
//! square.call(&registry).unwrap();
//! assert_eq!(registry.archives_for("/GCP/climate/tas2_ir").len(), 4);
//! ```

use impactlab_storage::{Archive, Indices, Payload, StorageError};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::args::{StepArg, StepArgs};
use crate::error::{OrchestratorError, Result};
use crate::index::SuperIndex;
use crate::registry::Registry;
use crate::variable::Variable;

/// What `Iterate` does when there is nothing to iterate over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyProduct {
    /// Run the inner stages once with the arguments unchanged
    #[default]
    RunOnce,
    /// Fail with `NoIndexDimensions`
    Fail,
}

/// What `Iterate` does when one iteration fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnError {
    /// Abort the remaining iterations and return the error
    #[default]
    FailFast,
    /// Record the failure in the step metrics and keep iterating
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterOptions {
    pub empty: EmptyProduct,
    pub on_error: OnError,
}

/// One stage of a step
#[derive(Debug, Clone)]
pub enum Stage {
    Bind(StepArgs),
    Iterate(IterOptions),
    Write(Variable),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Bind(_) => "bind",
            Stage::Iterate(_) => "iterate",
            Stage::Write(_) => "write",
        }
    }
}

/// Counters collected while a step runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Times the body ran
    pub invocations: usize,
    /// Archive updates performed by `Write`
    pub archives_updated: usize,
    /// Iterations attempted by `Iterate`
    pub iterations: usize,
    /// Iterations that failed under `OnError::Continue`
    pub iterations_failed: usize,
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

/// Result of [`Step::run`]
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The body's return value, unless a `Write` or `Iterate` consumed it
    pub value: Option<Payload>,
    pub metrics: StepMetrics,
}

/// Everything a step body can see
pub struct StepContext<'a> {
    step: &'a str,
    registry: &'a Registry,
    args: &'a StepArgs,
}

impl<'a> StepContext<'a> {
    pub fn step(&self) -> &str {
        self.step
    }

    /// Registry for resolving further archives or running inner steps
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn args(&self) -> &'a StepArgs {
        self.args
    }

    pub fn arg(&self, name: &str) -> Result<&'a StepArg> {
        self.args
            .get(name)
            .ok_or_else(|| OrchestratorError::MissingBinding {
                step: self.step.to_string(),
                parameter: name.to_string(),
            })
    }

    pub fn archive(&self, name: &str) -> Result<&'a Arc<Archive>> {
        match self.arg(name)? {
            StepArg::Archive(archive) => Ok(archive),
            other => Err(self.kind_error(name, "archive", other)),
        }
    }

    pub fn variable(&self, name: &str) -> Result<&'a Variable> {
        match self.arg(name)? {
            StepArg::Variable(variable) => Ok(variable),
            other => Err(self.kind_error(name, "variable", other)),
        }
    }

    pub fn scalar(&self, name: &str) -> Result<&'a Payload> {
        match self.arg(name)? {
            StepArg::Scalar(value) => Ok(value),
            other => Err(self.kind_error(name, "scalar", other)),
        }
    }

    /// Decode the archive bound to `name` into `T`
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(self.archive(name)?.decode()?)
    }

    fn kind_error(
        &self,
        name: &str,
        expected: &'static str,
        found: &StepArg,
    ) -> OrchestratorError {
        OrchestratorError::ArgumentKind {
            step: self.step.to_string(),
            parameter: name.to_string(),
            expected,
            found: found.kind(),
        }
    }
}

type StepBody = dyn Fn(&StepContext<'_>) -> anyhow::Result<Payload> + Send + Sync;

/// An index-aware pipeline step
#[derive(Clone)]
pub struct Step {
    name: String,
    stages: Vec<Stage>,
    params: Vec<String>,
    declared_writes: Vec<String>,
    body: Arc<StepBody>,
}

impl Step {
    pub fn builder(name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages, outermost first
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Variables bound by this step's `Bind` stages
    pub fn reads(&self) -> Vec<&str> {
        let mut reads: Vec<&str> = Vec::new();
        for stage in &self.stages {
            if let Stage::Bind(bindings) = stage {
                for (_, arg) in bindings.iter() {
                    if let Some(name) = arg.variable_name() {
                        if !reads.contains(&name) {
                            reads.push(name);
                        }
                    }
                }
            }
        }
        reads
    }

    /// Variables this step writes: its `Write` target plus any declared with
    /// [`StepBuilder::writes`]
    pub fn writes(&self) -> Vec<&str> {
        let mut writes: Vec<&str> = self
            .stages
            .iter()
            .filter_map(|stage| match stage {
                Stage::Write(target) => Some(target.name()),
                _ => None,
            })
            .collect();
        for name in &self.declared_writes {
            if !writes.contains(&name.as_str()) {
                writes.push(name);
            }
        }
        writes
    }

    /// Call with no caller-supplied arguments
    pub fn call(&self, registry: &Registry) -> Result<Option<Payload>> {
        self.call_with(registry, StepArgs::new())
    }

    /// Call with named arguments; bindings override them.
    ///
    /// Returns the body's value for steps without `Write`/`Iterate`. Fails
    /// with `IterationsFailed` if any iteration failed under
    /// `OnError::Continue`.
    pub fn call_with(&self, registry: &Registry, args: StepArgs) -> Result<Option<Payload>> {
        let output = self.run(registry, args)?;
        if output.metrics.iterations_failed > 0 {
            return Err(OrchestratorError::IterationsFailed {
                step: self.name.clone(),
                failed: output.metrics.iterations_failed,
                total: output.metrics.iterations,
            });
        }
        Ok(output.value)
    }

    /// Call and report metrics
    pub fn run(&self, registry: &Registry, args: StepArgs) -> Result<StepOutput> {
        let start = Instant::now();
        let mut metrics = StepMetrics::default();

        debug!("step '{}' started", self.name);
        let value = self.exec(0, registry, args, &mut metrics)?;
        metrics.duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            "step '{}' finished - {} invocations, {} archives updated in {}ms",
            self.name, metrics.invocations, metrics.archives_updated, metrics.duration_ms
        );
        Ok(StepOutput { value, metrics })
    }

    fn exec(
        &self,
        depth: usize,
        registry: &Registry,
        mut args: StepArgs,
        metrics: &mut StepMetrics,
    ) -> Result<Option<Payload>> {
        match self.stages.get(depth) {
            None => self.execute(registry, args, metrics).map(Some),
            Some(Stage::Bind(bindings)) => {
                args.merge(bindings);
                self.exec(depth + 1, registry, args, metrics)
            }
            Some(Stage::Write(target)) => {
                let indices = merge_indices(&args);
                let value = self
                    .exec(depth + 1, registry, args, metrics)?
                    .ok_or_else(|| {
                        OrchestratorError::invalid_composition(&self.name, "nothing to write")
                    })?;

                let archive = target.get_archive(registry, &indices)?;
                archive.update(value);
                metrics.archives_updated += 1;
                Ok(None)
            }
            Some(Stage::Iterate(options)) => {
                self.iterate(depth, *options, registry, args, metrics)?;
                Ok(None)
            }
        }
    }

    fn iterate(
        &self,
        depth: usize,
        options: IterOptions,
        registry: &Registry,
        args: StepArgs,
        metrics: &mut StepMetrics,
    ) -> Result<()> {
        let product = args
            .superindices()
            .fold(SuperIndex::empty(), |acc, index| acc.multiply(index));

        let total = product.checked_len()?;
        if total == 0 {
            return match options.empty {
                EmptyProduct::RunOnce => {
                    debug!("step '{}': no index dimensions, running once", self.name);
                    self.exec(depth + 1, registry, args, metrics).map(|_| ())
                }
                EmptyProduct::Fail => Err(OrchestratorError::NoIndexDimensions {
                    step: self.name.clone(),
                }),
            };
        }

        info!(
            "step '{}': iterating {} combinations of {}",
            self.name,
            total,
            product.name()
        );

        for element in product.iter() {
            metrics.iterations += 1;
            let result = args
                .resolve(registry, &element)
                .and_then(|resolved| self.exec(depth + 1, registry, resolved, metrics));

            if let Err(err) = result {
                match options.on_error {
                    OnError::FailFast => return Err(err),
                    OnError::Continue => {
                        warn!("step '{}' failed at {:?}: {}", self.name, element, err);
                        metrics.iterations_failed += 1;
                        metrics.failures.push(format!("{:?}: {}", element, err));
                    }
                }
            }
        }

        Ok(())
    }

    fn execute(
        &self,
        registry: &Registry,
        args: StepArgs,
        metrics: &mut StepMetrics,
    ) -> Result<Payload> {
        if let Some(missing) = self.params.iter().find(|p| !args.contains(p)) {
            return Err(OrchestratorError::MissingBinding {
                step: self.name.clone(),
                parameter: missing.clone(),
            });
        }

        let ctx = StepContext {
            step: &self.name,
            registry,
            args: &args,
        };

        metrics.invocations += 1;
        (self.body)(&ctx).map_err(|err| self.surface(err))
    }
}

impl Step {
    /// Orchestrator and storage errors raised by the body keep their
    /// variant; anything else becomes `StepFailed`
    fn surface(&self, err: anyhow::Error) -> OrchestratorError {
        let err = match err.downcast::<OrchestratorError>() {
            Ok(inner) => return inner,
            Err(err) => err,
        };
        match err.downcast::<StorageError>() {
            Ok(storage) => OrchestratorError::Storage(storage),
            Err(err) => OrchestratorError::step_failed(&self.name, err),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(Stage::name).collect::<Vec<_>>(),
            )
            .field("params", &self.params)
            .finish()
    }
}

/// Union of the indices of every archive argument; later arguments win on
/// collision
fn merge_indices(args: &StepArgs) -> Indices {
    let mut merged = Indices::new();
    for (name, arg) in args.iter() {
        let Some(indices) = arg.indices() else {
            continue;
        };
        for (dim, value) in indices {
            if let Some(previous) = merged.insert(dim.clone(), value.clone()) {
                if previous != *value {
                    debug!(
                        "argument '{}' overrides {}={} with {}={}",
                        name, dim, previous, dim, value
                    );
                }
            }
        }
    }
    merged
}

/// Declarative builder for [`Step`]; stage methods are called outermost first
#[derive(Debug, Clone)]
pub struct StepBuilder {
    name: String,
    stages: Vec<Stage>,
    params: Vec<String>,
    declared_writes: Vec<String>,
}

impl StepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            params: Vec::new(),
            declared_writes: Vec::new(),
        }
    }

    /// Add a `Bind` stage
    pub fn uses<I, K, A>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: Into<StepArg>,
    {
        self.stages.push(Stage::Bind(bindings.into_iter().collect()));
        self
    }

    /// Add a `Write` stage targeting `target`
    pub fn updates(mut self, target: Variable) -> Self {
        self.stages.push(Stage::Write(target));
        self
    }

    /// Add an `Iterate` stage with default options
    pub fn iters(self) -> Self {
        self.iters_with(IterOptions::default())
    }

    pub fn iters_with(mut self, options: IterOptions) -> Self {
        self.stages.push(Stage::Iterate(options));
        self
    }

    /// Parameters the body requires
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Declare a variable written by inner steps run from the body
    pub fn writes(mut self, variable: impl Into<String>) -> Self {
        self.declared_writes.push(variable.into());
        self
    }

    /// Attach the body and validate the stage composition
    pub fn body<F>(self, body: F) -> Result<Step>
    where
        F: Fn(&StepContext<'_>) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        let position = |wanted: &str| self.stages.iter().position(|s| s.name() == wanted);
        let count = |wanted: &str| self.stages.iter().filter(|s| s.name() == wanted).count();

        if count("write") > 1 {
            return Err(OrchestratorError::invalid_composition(
                &self.name,
                "a step can update only one variable",
            ));
        }
        if count("iterate") > 1 {
            return Err(OrchestratorError::invalid_composition(
                &self.name,
                "a step can iterate only once",
            ));
        }
        if let (Some(write), Some(iterate)) = (position("write"), position("iterate")) {
            if write < iterate {
                return Err(OrchestratorError::invalid_composition(
                    &self.name,
                    "updates must run inside iters, declare iters first",
                ));
            }
        }

        Ok(Step {
            name: self.name,
            stages: self.stages,
            params: self.params,
            declared_writes: self.declared_writes,
            body: Arc::new(body),
        })
    }
}
