/*
 * impactlab-orchestration - index-aware scenario pipelines
 *
 * Architecture:
 * - SuperIndex algebra (product, slicing, enumeration)
 * - Variables addressed by superindex, resolved to versioned archives
 * - Registry bootstrapped from versioned YAML
 * - Steps composed from bind / iterate / write stages
 * - Pipelines ordered by the variables each step reads and writes
 */

// Public modules
pub mod config;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod registry;
pub mod variable;

// Re-exports
pub use config::{ConfigError, RegistryConfig, SuperIndexConfig, VariableConfig};
pub use error::{OrchestratorError, Result};
pub use index::{key_from_value, parse_key, Assignment, Components, SuperIndex, SuperIndexIter};
pub use pipeline::{
    EmptyProduct, IterOptions, OnError, Pipeline, PipelineResult, Stage, Step, StepArg,
    StepArgs, StepBuilder, StepContext, StepMetrics, StepOutput,
};
pub use registry::Registry;
pub use variable::Variable;

pub use impactlab_storage::{Archive, ArchiveReader, Indices, Payload, Version};
