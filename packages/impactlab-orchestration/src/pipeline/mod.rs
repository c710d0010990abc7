//! Index-aware pipeline steps and multi-step runs

pub mod args;
pub mod runner;
pub mod step;

pub use args::{StepArg, StepArgs};
pub use runner::{Pipeline, PipelineResult};
pub use step::{
    EmptyProduct, IterOptions, OnError, Stage, Step, StepBuilder, StepContext, StepMetrics,
    StepOutput,
};
