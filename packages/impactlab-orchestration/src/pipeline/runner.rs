//! Multi-step pipelines ordered by the variables they read and write

use impactlab_storage::Payload;
use indexmap::IndexMap;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::args::StepArgs;
use super::step::{Step, StepMetrics};
use crate::error::{OrchestratorError, Result};
use crate::registry::Registry;

/// Aggregated metrics from all steps of a run
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub steps_run: usize,
    pub invocations: usize,
    pub archives_updated: usize,
    pub iterations: usize,
    /// Iterations that failed in steps iterating with `OnError::Continue`
    pub iterations_failed: usize,
    pub duration_ms: u64,
    pub failures: Vec<String>,
    /// Return values of steps that produce one directly
    pub outputs: IndexMap<String, Payload>,
}

impl PipelineResult {
    pub fn merge_metrics(&mut self, metrics: &StepMetrics) {
        self.steps_run += 1;
        self.invocations += metrics.invocations;
        self.archives_updated += metrics.archives_updated;
        self.iterations += metrics.iterations;
        self.iterations_failed += metrics.iterations_failed;
        self.failures.extend(metrics.failures.iter().cloned());
    }
}

/// A named set of steps run in dependency order
///
/// Step `b` depends on step `a` when `b` reads a variable `a` writes. Steps
/// with no dependency between them share a phase; phases run in order and
/// steps within a phase run in insertion order.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: IndexMap<String, Step>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_step(&mut self, step: Step) -> Result<()> {
        if self.steps.contains_key(step.name()) {
            return Err(OrchestratorError::DuplicateStep(step.name().to_string()));
        }
        self.steps.insert(step.name().to_string(), step);
        Ok(())
    }

    /// Builder-style [`Pipeline::add_step`]
    pub fn with_step(mut self, step: Step) -> Result<Self> {
        self.add_step(step)?;
        Ok(self)
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the steps `step` depends on
    fn dependencies(&self, step: &Step) -> Vec<&str> {
        let reads = step.reads();
        self.steps
            .values()
            .filter(|other| other.name() != step.name())
            .filter(|other| other.writes().iter().any(|w| reads.contains(w)))
            .map(Step::name)
            .collect()
    }

    /// Topological sort into phases of independent steps
    pub fn plan(&self) -> Result<Vec<Vec<&str>>> {
        let dependencies: IndexMap<&str, Vec<&str>> = self
            .steps
            .values()
            .map(|step| (step.name(), self.dependencies(step)))
            .collect();

        let mut phases: Vec<Vec<&str>> = Vec::new();
        let mut done: Vec<&str> = Vec::new();

        while done.len() < dependencies.len() {
            let ready: Vec<&str> = dependencies
                .iter()
                .filter(|(name, _)| !done.contains(*name))
                .filter(|(_, deps)| deps.iter().all(|dep| done.contains(dep)))
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                return Err(OrchestratorError::DagCycleDetected);
            }

            done.extend(ready.iter().copied());
            phases.push(ready);
        }

        Ok(phases)
    }

    /// Execution plan as text, one line per phase
    pub fn execution_plan(&self) -> Result<String> {
        let plan = self
            .plan()?
            .iter()
            .enumerate()
            .map(|(i, group)| {
                if group.len() > 1 {
                    format!("Phase {}: {} (independent)", i + 1, group.join(" | "))
                } else {
                    format!("Phase {}: {}", i + 1, group.join(""))
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(plan)
    }

    /// Run every step once, stopping at the first failed step.
    ///
    /// Iterations that fail inside a step iterating with `OnError::Continue`
    /// do not stop the run; they are counted in the result.
    pub fn run(&self, registry: &Registry) -> Result<PipelineResult> {
        let start = Instant::now();
        let plan = self.plan()?;
        let mut result = PipelineResult {
            run_id: Uuid::new_v4(),
            ..Default::default()
        };

        info!(
            "Starting pipeline '{}' (run {}) - {} steps in {} phases",
            self.name,
            result.run_id,
            self.steps.len(),
            plan.len()
        );

        for (phase_idx, group) in plan.iter().enumerate() {
            info!("Pipeline '{}': phase {} - {:?}", self.name, phase_idx + 1, group);

            for name in group {
                let Some(step) = self.steps.get(*name) else {
                    continue;
                };

                let output = step.run(registry, StepArgs::new()).map_err(|e| {
                    error!("Pipeline '{}': step '{}' failed: {}", self.name, name, e);
                    e
                })?;

                result.merge_metrics(&output.metrics);
                if let Some(value) = output.value {
                    result.outputs.insert(name.to_string(), value);
                }

                info!(
                    "Pipeline '{}': step '{}' completed - {} invocations, {} archives updated in {}ms",
                    self.name,
                    name,
                    output.metrics.invocations,
                    output.metrics.archives_updated,
                    output.metrics.duration_ms
                );
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Pipeline '{}' completed - {} steps, {} archives updated in {}ms",
            self.name, result.steps_run, result.archives_updated, result.duration_ms
        );

        if result.iterations_failed > 0 {
            warn!(
                "Pipeline '{}': {} of {} iterations failed",
                self.name, result.iterations_failed, result.iterations
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Variable;
    use serde_json::json;

    fn step(name: &str, reads: &[&str], writes: &[&str]) -> Step {
        let mut builder = Step::builder(name)
            .uses(reads.iter().map(|r| (r.to_string(), Variable::scalar(*r))));
        for w in writes {
            builder = builder.writes(*w);
        }
        builder.body(|_| Ok(json!(null))).unwrap()
    }

    #[test]
    fn test_plan_orders_by_data_flow() {
        let pipeline = Pipeline::new("p")
            .with_step(step("mortality", &["tas2"], &["mort"]))
            .unwrap()
            .with_step(step("square", &["tas"], &["tas2"]))
            .unwrap()
            .with_step(step("pop", &[], &["popop"]))
            .unwrap();

        let plan = pipeline.plan().unwrap();
        assert_eq!(plan, vec![vec!["square", "pop"], vec!["mortality"]]);

        let text = pipeline.execution_plan().unwrap();
        assert!(text.contains("Phase 1: square | pop (independent)"));
        assert!(text.contains("Phase 2: mortality"));
    }

    #[test]
    fn test_plan_cycle_detected() {
        let pipeline = Pipeline::new("p")
            .with_step(step("a", &["x"], &["y"]))
            .unwrap()
            .with_step(step("b", &["y"], &["x"]))
            .unwrap();

        assert!(matches!(
            pipeline.plan(),
            Err(OrchestratorError::DagCycleDetected)
        ));
    }

    #[test]
    fn test_self_read_is_not_a_cycle() {
        let pipeline = Pipeline::new("p")
            .with_step(step("inplace", &["x"], &["x"]))
            .unwrap();
        assert_eq!(pipeline.plan().unwrap(), vec![vec!["inplace"]]);
    }

    #[test]
    fn test_duplicate_step() {
        let mut pipeline = Pipeline::new("p");
        pipeline.add_step(step("a", &[], &[])).unwrap();
        assert!(matches!(
            pipeline.add_step(step("a", &[], &[])),
            Err(OrchestratorError::DuplicateStep(_))
        ));
    }

    #[test]
    fn test_run_collects_outputs() {
        let registry = Registry::new();
        let answer = Step::builder("answer")
            .uses([("x", json!(41))])
            .body(|ctx| Ok(json!(ctx.scalar("x")?.as_i64().unwrap_or_default() + 1)))
            .unwrap();

        let result = Pipeline::new("p").with_step(answer).unwrap().run(&registry).unwrap();
        assert_eq!(result.steps_run, 1);
        assert_eq!(result.invocations, 1);
        assert_eq!(result.outputs["answer"], json!(42));
    }
}
