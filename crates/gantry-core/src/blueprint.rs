//! Blueprint: the declared shape of a workflow before ids are assigned.

/// Handle to a job declared on a [`BlueprintBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle(pub(crate) usize);

/// One declared job of a blueprint.
#[derive(Debug, Clone)]
pub struct BlueprintNode {
    /// Symbolic job class.
    pub klass: String,

    /// Optional target queue for this job.
    pub queue: Option<String>,

    /// Indices of the nodes this job depends on.
    pub deps: Vec<usize>,
}

/// The declared DAG shape registered under a workflow class name.
///
/// Blueprints carry no ids and no state; [`crate::Workflow::materialize`]
/// turns one into a concrete workflow.
#[derive(Debug, Clone)]
pub struct WorkflowBlueprint {
    /// Symbolic workflow class.
    pub klass: String,

    /// Declared jobs, in declaration order.
    pub nodes: Vec<BlueprintNode>,
}

/// Builder for declaring workflow shapes.
pub struct BlueprintBuilder {
    klass: String,
    nodes: Vec<BlueprintNode>,
}

impl BlueprintBuilder {
    /// Start a blueprint for the given workflow class.
    pub fn new(klass: impl Into<String>) -> Self {
        Self {
            klass: klass.into(),
            nodes: Vec::new(),
        }
    }

    /// Declare a job with no dependencies.
    pub fn add_job(&mut self, klass: impl Into<String>) -> JobHandle {
        self.add_job_after(klass, &[])
    }

    /// Declare a job depending on previously declared jobs.
    pub fn add_job_after(
        &mut self,
        klass: impl Into<String>,
        deps: &[JobHandle],
    ) -> JobHandle {
        self.nodes.push(BlueprintNode {
            klass: klass.into(),
            queue: None,
            deps: deps.iter().map(|h| h.0).collect(),
        });
        JobHandle(self.nodes.len() - 1)
    }

    /// Route a declared job to a specific queue.
    pub fn on_queue(&mut self, handle: JobHandle, queue: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(handle.0) {
            node.queue = Some(queue.into());
        }
    }

    /// Finish the declaration.
    pub fn build(self) -> WorkflowBlueprint {
        WorkflowBlueprint {
            klass: self.klass,
            nodes: self.nodes,
        }
    }
}
