//! Pipeline subsystem
//!
//! The control plane drives pipelines through two capabilities:
//! - `PipelineEngine`: start/stop/is_running per destination
//! - `MessageForwarder`: optional, follows the engine
//!
//! Definitions come from `DefinitionProvider`s (local templates or a remote
//! manager), selected per destination by `ModeGenerator`. `EmbeddedEngine`
//! is the in-process engine.

mod definition;
mod embedded;
mod engine;
mod errors;
mod generator;

pub use definition::PipelineDefinition;
pub use embedded::{EmbeddedEngine, RunningPipeline};
pub use engine::{MessageForwarder, PipelineEngine};
pub use errors::{PipelineError, PipelineResult};
pub use generator::{
    DefinitionProvider, InstanceGenerator, LocalDefinitionProvider, ManagerDefinitionProvider,
    ModeGenerator, DEFAULT_TEMPLATE, DESTINATION_PLACEHOLDER,
};
