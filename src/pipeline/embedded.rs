//! Embedded pipeline engine
//!
//! Keeps the pipelines of this process in memory. Starting a destination
//! generates its definition through the configured `InstanceGenerator`;
//! the definition and start time are kept while the pipeline runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::definition::PipelineDefinition;
use super::engine::PipelineEngine;
use super::errors::{PipelineError, PipelineResult};
use super::generator::InstanceGenerator;
use crate::observability::{log_destination_event, Event, Logger};

/// A pipeline running in this process
#[derive(Debug, Clone, Serialize)]
pub struct RunningPipeline {
    pub definition: PipelineDefinition,
    pub started_at: DateTime<Utc>,
}

/// In-process pipeline engine
pub struct EmbeddedEngine {
    generator: Arc<dyn InstanceGenerator>,
    started: AtomicBool,
    running: RwLock<HashMap<String, RunningPipeline>>,
}

impl EmbeddedEngine {
    pub fn new(generator: Arc<dyn InstanceGenerator>) -> Self {
        Self {
            generator,
            started: AtomicBool::new(false),
            running: RwLock::new(HashMap::new()),
        }
    }

    /// Whether process-wide resources are started
    pub fn is_engine_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Running pipeline of one destination
    pub fn pipeline(&self, destination: &str) -> Option<RunningPipeline> {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .cloned()
    }

    /// Every running pipeline, sorted by destination
    pub fn running_pipelines(&self) -> BTreeMap<String, RunningPipeline> {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl PipelineEngine for EmbeddedEngine {
    fn start_engine(&self) -> PipelineResult<()> {
        if !self.started.swap(true, Ordering::SeqCst) {
            Logger::info("PIPELINE_ENGINE_STARTED", &[]);
        }
        Ok(())
    }

    fn stop_engine(&self) -> PipelineResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let stopped: Vec<String> = self
            .running
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(destination, _)| destination)
            .collect();
        for destination in &stopped {
            log_destination_event(Event::PipelineStopped, destination, &[]);
        }
        Logger::info("PIPELINE_ENGINE_STOPPED", &[]);
        Ok(())
    }

    fn start(&self, destination: &str) -> PipelineResult<()> {
        if !self.is_engine_started() {
            return Err(PipelineError::EngineNotStarted);
        }
        if self.is_running(destination) {
            return Ok(());
        }

        // Generation may do I/O; no engine lock is held meanwhile
        let definition = self.generator.generate(destination)?;
        let source = definition.source.clone();

        self.running
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(destination.to_string())
            .or_insert_with(|| RunningPipeline {
                definition,
                started_at: Utc::now(),
            });

        log_destination_event(Event::PipelineStarted, destination, &[("source", &source)]);
        Ok(())
    }

    fn stop(&self, destination: &str) -> PipelineResult<()> {
        let removed = self
            .running
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(destination);
        if removed.is_some() {
            log_destination_event(Event::PipelineStopped, destination, &[]);
        }
        Ok(())
    }

    fn is_running(&self, destination: &str) -> bool {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(destination)
    }
}
