//! Pipeline engine and message forwarder capabilities

use super::errors::PipelineResult;

/// Executes CDC pipelines, one per destination
pub trait PipelineEngine: Send + Sync {
    /// Start process-wide resources.
    fn start_engine(&self) -> PipelineResult<()>;

    /// Stop every pipeline and release process-wide resources.
    fn stop_engine(&self) -> PipelineResult<()>;

    /// Start the destination's pipeline. Fails with `UnknownDestination`
    /// when no instance config is loaded for it.
    fn start(&self, destination: &str) -> PipelineResult<()>;

    /// Stop the destination's pipeline; stopping a pipeline that is not
    /// running is not an error.
    fn stop(&self, destination: &str) -> PipelineResult<()>;

    /// Whether the destination's pipeline runs in this process
    fn is_running(&self, destination: &str) -> bool;
}

/// Optional message-queue forwarder, driven right after the engine starts a
/// destination and right before it stops one
pub trait MessageForwarder: Send + Sync {
    fn start_destination(&self, destination: &str) -> PipelineResult<()>;

    fn stop_destination(&self, destination: &str) -> PipelineResult<()>;
}
