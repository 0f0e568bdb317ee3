//! Client: CRUD and orchestration over persisted workflows.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use gantry_core::codec::{self, WorkflowHeader};
use gantry_core::{
    EngineConfig, EngineError, EngineResult, Job, JobId, JobRef, JobRegistry, Workflow,
    WorkflowBlueprint, WorkflowId, WorkflowRegistry,
};
use gantry_store::KvStore;

use crate::enqueuer::{Enqueuer, JobEnvelope};
use crate::ids;
use crate::keys;
use crate::observer::{LinkedRecordProbe, NoLinkedRecords, NoopObserver, Observer};

/// Orchestrator over one store.
///
/// All reads and writes of workflow state go through here; the worker
/// runtime is a thin protocol on top. Cheap to share behind an `Arc`.
pub struct Client {
    config: EngineConfig,
    store: Arc<dyn KvStore>,
    enqueuer: Arc<dyn Enqueuer>,
    workflows: Arc<WorkflowRegistry>,
    jobs: Arc<JobRegistry>,
    observer: Arc<dyn Observer>,
    probe: Arc<dyn LinkedRecordProbe>,
}

impl Client {
    /// Create a client with no-op observer and linked-record seams.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KvStore>,
        enqueuer: Arc<dyn Enqueuer>,
        workflows: Arc<WorkflowRegistry>,
        jobs: Arc<JobRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            enqueuer,
            workflows,
            jobs,
            observer: Arc::new(NoopObserver),
            probe: Arc::new(NoLinkedRecords),
        }
    }

    /// Inject an observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Inject a linked-record probe.
    pub fn with_probe(mut self, probe: Arc<dyn LinkedRecordProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The enqueuer seam.
    pub fn enqueuer(&self) -> &Arc<dyn Enqueuer> {
        &self.enqueuer
    }

    /// The job class registry.
    pub fn job_registry(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Build a fresh, unpersisted workflow from a registered class.
    ///
    /// Assigns a collision-checked workflow id and one job id per declared
    /// node. Unknown class names surface as
    /// [`EngineError::WorkflowNotFound`].
    pub async fn create_workflow(
        &self,
        name: &str,
        arguments: Vec<Value>,
    ) -> EngineResult<Workflow> {
        let blueprint = self.workflows.blueprint(name, &arguments)?;
        let id = ids::next_workflow_id(self.store.as_ref()).await?;

        // The probe loop checks the store, but ids assigned within this
        // batch are not persisted yet, so track them here as well.
        let mut assigned: FxHashMap<&str, FxHashSet<JobId>> = FxHashMap::default();
        let mut job_ids = Vec::with_capacity(blueprint.nodes.len());
        for node in &blueprint.nodes {
            let taken = assigned.entry(node.klass.as_str()).or_default();
            loop {
                let job_id = ids::next_job_id(self.store.as_ref(), &id, &node.klass).await?;
                if taken.insert(job_id.clone()) {
                    job_ids.push(job_id);
                    break;
                }
            }
        }

        let workflow = Workflow::materialize(&blueprint, id, &job_ids, arguments)?;
        info!(workflow = %workflow.id, klass = %workflow.klass, jobs = workflow.jobs.len(),
            "created workflow");
        Ok(workflow)
    }

    /// Mark a workflow started, persist it, and enqueue its entry points.
    ///
    /// With an empty `only`, every job with no incoming edges is enqueued;
    /// otherwise just the named subset. Returns how many jobs were actually
    /// handed to the enqueuer.
    pub async fn start_workflow(
        &self,
        workflow: &mut Workflow,
        only: &[&str],
    ) -> EngineResult<usize> {
        workflow.mark_as_started();
        self.persist_workflow(workflow).await?;

        let refs: Vec<JobRef> = if only.is_empty() {
            workflow
                .initial_jobs()
                .map(|j| JobRef::Exact {
                    klass: j.klass.clone(),
                    id: j.id.clone(),
                })
                .collect()
        } else {
            only.iter()
                .map(|name| JobRef::parse(name))
                .collect::<EngineResult<_>>()?
        };

        let workflow_id = workflow.id.clone();
        let mut dispatched = 0;
        for job_ref in &refs {
            match workflow.find_job_mut(job_ref) {
                Some(job) => {
                    if self.enqueue_job(&workflow_id, job).await? {
                        dispatched += 1;
                    }
                }
                None => warn!(workflow = %workflow_id, job = %job_ref, "start skipped unknown job"),
            }
        }
        info!(workflow = %workflow_id, dispatched, "started workflow");
        Ok(dispatched)
    }

    /// Load a workflow, mark it stopped and persist it.
    pub async fn stop_workflow(&self, id: &WorkflowId) -> EngineResult<Workflow> {
        let mut workflow = self.find_workflow(id).await?;
        workflow.mark_as_stopped();
        self.persist_workflow(&mut workflow).await?;
        info!(workflow = %id, "stopped workflow");
        Ok(workflow)
    }

    /// Load a workflow: header plus every persisted job, reconstructed
    /// through the workflow registry.
    pub async fn find_workflow(&self, id: &WorkflowId) -> EngineResult<Workflow> {
        let raw = self
            .store
            .get(&keys::workflow(id))
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;
        let header = codec::decode_workflow_header(&raw)?;

        // Resolving the class rebuilds the declared shape and rejects
        // workflows whose class is no longer registered.
        let blueprint = self.workflows.blueprint(&header.klass, &header.arguments)?;

        let mut decoded = Vec::new();
        for key in self.store.scan(&keys::jobs_scan(id)).await? {
            for raw_job in self.store.hvals(&key).await? {
                decoded.push(codec::decode_job(&raw_job)?);
            }
        }

        let mut workflow = Workflow::restore(
            header.id,
            header.klass,
            header.arguments,
            order_jobs(&blueprint, decoded),
            header.stopped,
            header.linked_type,
            header.linked_id,
        )?;

        if let Some(monitor) = self.observer.load_for(&workflow.id).await? {
            workflow.attach_monitor(monitor);
        }
        Ok(workflow)
    }

    /// Write the header and every job, then mark the snapshot clean.
    pub async fn persist_workflow(&self, workflow: &mut Workflow) -> EngineResult<()> {
        self.store
            .set(&keys::workflow(&workflow.id), &codec::encode_workflow(workflow)?)
            .await?;
        let workflow_id = workflow.id.clone();
        for job in &workflow.jobs {
            self.persist_job(&workflow_id, job).await?;
        }
        workflow.persisted = true;
        debug!(workflow = %workflow_id, "persisted workflow");
        Ok(())
    }

    /// Write one job into its `(workflow, klass)` hash.
    pub async fn persist_job(&self, workflow_id: &WorkflowId, job: &Job) -> EngineResult<()> {
        self.store
            .hset(
                &keys::jobs_hash(workflow_id, &job.klass),
                &job.id.to_string(),
                &codec::encode_job(job)?,
            )
            .await?;
        Ok(())
    }

    /// Load one job. Absence is an `Ok(None)`, never an error.
    pub async fn find_job(
        &self,
        workflow_id: &WorkflowId,
        job_ref: &JobRef,
    ) -> EngineResult<Option<Job>> {
        let hash = keys::jobs_hash(workflow_id, job_ref.klass());
        let raw = match job_ref {
            JobRef::Exact { id, .. } => self.store.hget(&hash, &id.to_string()).await?,
            JobRef::Class(_) => self
                .store
                .hscan(&hash)
                .await?
                .into_iter()
                .next()
                .map(|(_, value)| value),
        };
        raw.map(|raw| codec::decode_job(&raw)).transpose()
    }

    /// Delete the header and every per-class job hash.
    pub async fn destroy_workflow(&self, workflow: &Workflow) -> EngineResult<()> {
        self.store.del(&keys::workflow(&workflow.id)).await?;
        for key in self.store.scan(&keys::jobs_scan(&workflow.id)).await? {
            self.store.del(&key).await?;
        }
        info!(workflow = %workflow.id, "destroyed workflow");
        Ok(())
    }

    /// Apply a TTL to the header and every per-class job hash.
    pub async fn expire_workflow(&self, workflow: &Workflow, ttl: Duration) -> EngineResult<()> {
        self.store.expire(&keys::workflow(&workflow.id), ttl).await?;
        for key in self.store.scan(&keys::jobs_scan(&workflow.id)).await? {
            self.store.expire(&key, ttl).await?;
        }
        debug!(workflow = %workflow.id, ttl_secs = ttl.as_secs(), "expiring workflow keys");
        Ok(())
    }

    /// Transition a job to enqueued, persist it, and dispatch it.
    ///
    /// Re-reads the header first and refuses against a stopped workflow;
    /// this is the single choke point every enqueue funnels through, so the
    /// worker needs no stop-check of its own. Returns whether the job was
    /// dispatched.
    pub async fn enqueue_job(&self, workflow_id: &WorkflowId, job: &mut Job) -> EngineResult<bool> {
        let raw = self
            .store
            .get(&keys::workflow(workflow_id))
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        if codec::decode_workflow_header(&raw)?.stopped {
            warn!(workflow = %workflow_id, job = %job.name, "refusing enqueue on stopped workflow");
            return Ok(false);
        }

        job.mark_enqueued()?;
        self.persist_job(workflow_id, job).await?;

        let queue = job.queue.as_deref().unwrap_or(&self.config.namespace);
        self.enqueuer
            .enqueue(
                queue,
                self.config.job_delay(),
                JobEnvelope::new(workflow_id.clone(), job.name.clone()),
            )
            .await?;
        info!(workflow = %workflow_id, job = %job.name, queue, "enqueued job");
        Ok(true)
    }

    /// Load every workflow in the store, skipping entries that vanished
    /// between scan and load.
    pub async fn all_workflows(&self) -> EngineResult<Vec<Workflow>> {
        let mut out = Vec::new();
        for key in self.store.scan(keys::WORKFLOW_SCAN).await? {
            let Some(id) = keys::workflow_id_of(&key) else {
                warn!(key = %key, "skipping unparseable workflow key");
                continue;
            };
            match self.find_workflow(&id).await {
                Ok(workflow) => out.push(workflow),
                Err(EngineError::WorkflowNotFound(_)) => {
                    warn!(workflow = %id, "workflow vanished during scan");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Linear scan for the first unfinished workflow whose header matches
    /// every `params` entry.
    ///
    /// When `linked_type` is among the params, the linked external record
    /// must also exist according to the injected probe; a missing record is
    /// a non-match, not an error.
    pub async fn find_not_finished_workflow_by(
        &self,
        params: &Map<String, Value>,
    ) -> EngineResult<Option<Workflow>> {
        for workflow in self.all_workflows().await? {
            let header = serde_json::to_value(WorkflowHeader::of(&workflow))?;
            if !params.iter().all(|(k, v)| header.get(k) == Some(v)) {
                continue;
            }
            if workflow.finished() {
                continue;
            }
            if params.contains_key("linked_type") {
                let (Some(linked_type), Some(linked_id)) =
                    (&workflow.linked_type, &workflow.linked_id)
                else {
                    continue;
                };
                if !self.probe.exists(linked_type, linked_id).await? {
                    debug!(workflow = %workflow.id, "linked record missing, skipping");
                    continue;
                }
            }
            return Ok(Some(workflow));
        }
        Ok(None)
    }
}

/// Restore declaration order: persisted jobs come back from the store
/// grouped by class in scan order, so walk the blueprint and take one
/// decoded job per declared node. Leftovers (which only appear if the
/// stored set diverged from the class definition) are appended sorted.
fn order_jobs(blueprint: &WorkflowBlueprint, decoded: Vec<Job>) -> Vec<Job> {
    let mut by_klass: FxHashMap<String, Vec<Job>> = FxHashMap::default();
    for job in decoded {
        by_klass.entry(job.klass.clone()).or_default().push(job);
    }
    for group in by_klass.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut ordered = Vec::new();
    for node in &blueprint.nodes {
        if let Some(group) = by_klass.get_mut(&node.klass) {
            if !group.is_empty() {
                ordered.push(group.remove(0));
            }
        }
    }

    let mut leftovers: Vec<Job> = by_klass.into_values().flatten().collect();
    leftovers.sort_by(|a, b| a.name.cmp(&b.name));
    ordered.extend(leftovers);
    ordered
}
