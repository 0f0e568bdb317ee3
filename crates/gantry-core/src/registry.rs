//! Class registries: explicit symbolic-name resolution.
//!
//! Workflow and job classes are registered up front by the embedding
//! application; nothing is resolved reflectively at run time. An unknown
//! workflow name surfaces as [`EngineError::WorkflowNotFound`], an unknown
//! job class as [`EngineError::UnknownJobClass`].

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::blueprint::WorkflowBlueprint;
use crate::error::{EngineError, EngineResult};
use crate::handler::JobHandler;

/// Constructor producing a blueprint from captured workflow arguments.
type BlueprintCtor = Box<dyn Fn(&[Value]) -> EngineResult<WorkflowBlueprint> + Send + Sync>;

/// Registry of workflow classes.
#[derive(Default)]
pub struct WorkflowRegistry {
    ctors: FxHashMap<String, BlueprintCtor>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow class under its symbolic name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        ctor: impl Fn(&[Value]) -> EngineResult<WorkflowBlueprint> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!(workflow = %name, "registering workflow class");
        self.ctors.insert(name, Box::new(ctor));
    }

    /// Build the blueprint for a workflow class.
    pub fn blueprint(&self, name: &str, arguments: &[Value]) -> EngineResult<WorkflowBlueprint> {
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| EngineError::WorkflowNotFound(name.to_string()))?;
        ctor(arguments)
    }

    /// Check whether a workflow class is registered.
    pub fn has(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Registered workflow class names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.ctors.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Registry of job classes.
#[derive(Default, Clone)]
pub struct JobRegistry {
    handlers: FxHashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its job class name.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        debug!(job = %name, "registering job class");
        self.handlers.insert(name, handler);
    }

    /// Resolve the handler for a job class.
    pub fn get(&self, name: &str) -> EngineResult<Arc<dyn JobHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownJobClass(name.to_string()))
    }

    /// Check whether a job class is registered.
    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}
