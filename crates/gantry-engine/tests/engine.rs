//! End-to-end scenarios over an in-memory store and in-process delivery.

mod common;

use std::sync::Arc;

use serde_json::{Map, Value};

use common::{
    all_succeed_registry, client_with, envelope_for, workflow_registry, Counting, Fails, Outputs,
    RecordingEnqueuer,
};
use gantry_core::{EngineConfig, EngineError, JobRegistry, JobState, Monitor};
use gantry_engine::{
    ChannelEnqueuer, Client, InlineRunner, LinkedRecordProbe, Observer, Worker,
};
use gantry_store::MemoryStore;

fn inline_setup(jobs: JobRegistry, config: EngineConfig) -> (Arc<Client>, InlineRunner) {
    let (enqueuer, rx) = ChannelEnqueuer::unbounded();
    let client = client_with(Arc::new(enqueuer), jobs, config);
    let runner = InlineRunner::new(client.clone(), rx);
    (client, runner)
}

#[tokio::test]
async fn linear_chain_runs_to_completion_and_expires() {
    // TTL of zero makes expiry observable immediately.
    let config = EngineConfig::default().with_ttl(0);
    let (client, mut runner) = inline_setup(all_succeed_registry(), config);

    let mut workflow = client.create_workflow("Linear", Vec::new()).await.unwrap();
    let id = workflow.id.clone();

    let dispatched = client.start_workflow(&mut workflow, &[]).await.unwrap();
    assert_eq!(dispatched, 1, "only A has no incoming edges");

    let processed = runner.run_until_idle().await.unwrap();
    assert_eq!(processed, 3, "A, B and C each delivered once");

    // Finished: TTL applied, keys gone.
    assert!(matches!(
        client.find_workflow(&id).await,
        Err(EngineError::WorkflowNotFound(_))
    ));
}

#[tokio::test]
async fn payloads_flow_downstream() {
    let mut jobs = JobRegistry::new();
    jobs.register("A", Arc::new(Outputs(21)));
    let sink = Arc::new(Counting::default());
    jobs.register("B", sink.clone());
    jobs.register("C", sink.clone());
    let (client, mut runner) = inline_setup(jobs, EngineConfig::default());

    let mut workflow = client.create_workflow("Linear", Vec::new()).await.unwrap();
    client.start_workflow(&mut workflow, &[]).await.unwrap();
    runner.run_until_idle().await.unwrap();

    let workflow = client.find_workflow(&workflow.id).await.unwrap();
    let b = workflow.jobs.iter().find(|j| j.klass == "B").unwrap();
    // B summed A's output.
    assert_eq!(b.output_payload, Some(Value::from(21)));
    assert!(workflow.finished());
}

#[tokio::test]
async fn fan_in_waits_for_all_predecessors() {
    let recorder = Arc::new(RecordingEnqueuer::default());
    let client = client_with(
        recorder.clone(),
        all_succeed_registry(),
        EngineConfig::default(),
    );
    let worker = Worker::new(client.clone());

    let mut workflow = client.create_workflow("FanIn", Vec::new()).await.unwrap();
    client.start_workflow(&mut workflow, &[]).await.unwrap();

    let c_name = envelope_for(&workflow, "C").job_name;
    assert_eq!(recorder.dispatches_of(&c_name), 0);

    // B finishes first: C must stay pending, A is still outstanding.
    worker.perform(envelope_for(&workflow, "B")).await.unwrap();
    assert_eq!(recorder.dispatches_of(&c_name), 0);
    let snapshot = client.find_workflow(&workflow.id).await.unwrap();
    let c = snapshot.jobs.iter().find(|j| j.klass == "C").unwrap();
    assert_eq!(c.state(), JobState::Pending);

    // A finishes: C becomes ready, enqueued exactly once.
    worker.perform(envelope_for(&workflow, "A")).await.unwrap();
    assert_eq!(recorder.dispatches_of(&c_name), 1);
}

#[tokio::test]
async fn failed_branch_blocks_downstream_and_finishes() {
    let mut jobs = JobRegistry::new();
    jobs.register("A", Arc::new(Outputs(1)));
    jobs.register("B", Arc::new(Fails));
    jobs.register("C", Arc::new(Outputs(1)));
    jobs.register("D", Arc::new(Outputs(1)));
    let (client, mut runner) = inline_setup(jobs, EngineConfig::default());

    let mut workflow = client.create_workflow("Diamond", Vec::new()).await.unwrap();
    client.start_workflow(&mut workflow, &[]).await.unwrap();
    let processed = runner.run_until_idle().await.unwrap();
    // A, B, C delivered; D never enqueued.
    assert_eq!(processed, 3);

    let workflow = client.find_workflow(&workflow.id).await.unwrap();
    let state_of = |klass: &str| {
        workflow
            .jobs
            .iter()
            .find(|j| j.klass == klass)
            .unwrap()
            .state()
    };
    assert_eq!(state_of("A"), JobState::Succeeded);
    assert_eq!(state_of("B"), JobState::Failed);
    assert_eq!(state_of("C"), JobState::Succeeded);
    assert_eq!(state_of("D"), JobState::Pending);

    // D can never run, so the workflow counts as finished.
    assert!(workflow.finished());
}

#[tokio::test]
async fn stopped_workflow_enqueues_no_successors() {
    let recorder = Arc::new(RecordingEnqueuer::default());
    let client = client_with(
        recorder.clone(),
        all_succeed_registry(),
        EngineConfig::default(),
    );
    let worker = Worker::new(client.clone());

    let mut workflow = client.create_workflow("Linear", Vec::new()).await.unwrap();
    client.start_workflow(&mut workflow, &[]).await.unwrap();

    // Stop while A is in flight; A still completes.
    client.stop_workflow(&workflow.id).await.unwrap();
    worker.perform(envelope_for(&workflow, "A")).await.unwrap();

    let snapshot = client.find_workflow(&workflow.id).await.unwrap();
    let a = snapshot.jobs.iter().find(|j| j.klass == "A").unwrap();
    let b = snapshot.jobs.iter().find(|j| j.klass == "B").unwrap();
    assert_eq!(a.state(), JobState::Succeeded);
    assert_eq!(b.state(), JobState::Pending);
    assert_eq!(recorder.dispatches_of(&b.name), 0);
}

#[tokio::test]
async fn selective_start_enqueues_only_named_jobs() {
    let recorder = Arc::new(RecordingEnqueuer::default());
    let client = client_with(
        recorder.clone(),
        all_succeed_registry(),
        EngineConfig::default(),
    );

    let mut workflow = client.create_workflow("TwoRoots", Vec::new()).await.unwrap();
    let dispatched = client.start_workflow(&mut workflow, &["JobX"]).await.unwrap();

    assert_eq!(dispatched, 1);
    let names = recorder.job_names();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("JobX|"));
}

#[tokio::test]
async fn single_job_workflow_finishes() {
    let (client, mut runner) = inline_setup(all_succeed_registry(), EngineConfig::default());

    let mut workflow = client.create_workflow("Single", Vec::new()).await.unwrap();
    let dispatched = client.start_workflow(&mut workflow, &[]).await.unwrap();
    assert_eq!(dispatched, 1);

    runner.run_until_idle().await.unwrap();
    let workflow = client.find_workflow(&workflow.id).await.unwrap();
    assert!(workflow.finished());
    assert_eq!(workflow.status_counts().succeeded, 1);
}

#[tokio::test]
async fn replay_of_succeeded_job_skips_user_code() {
    let mut jobs = JobRegistry::new();
    let counter = Arc::new(Counting::default());
    jobs.register("A", counter.clone());
    let (client, mut runner) = inline_setup(jobs, EngineConfig::default());

    let mut workflow = client.create_workflow("Single", Vec::new()).await.unwrap();
    client.start_workflow(&mut workflow, &[]).await.unwrap();
    runner.run_until_idle().await.unwrap();
    assert_eq!(counter.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Redeliver the same envelope: no second execution, no error.
    let worker = Worker::new(client.clone());
    worker.perform(envelope_for(&workflow, "A")).await.unwrap();
    assert_eq!(counter.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn create_persist_find_roundtrip() {
    let client = client_with(
        Arc::new(RecordingEnqueuer::default()),
        all_succeed_registry(),
        EngineConfig::default(),
    );

    let mut workflow = client
        .create_workflow("Diamond", vec![Value::from("arg")])
        .await
        .unwrap();
    assert!(!workflow.persisted);
    client.persist_workflow(&mut workflow).await.unwrap();
    assert!(workflow.persisted);

    let loaded = client.find_workflow(&workflow.id).await.unwrap();
    assert_eq!(loaded.id, workflow.id);
    assert_eq!(loaded.klass, workflow.klass);
    assert_eq!(loaded.arguments, workflow.arguments);
    assert_eq!(loaded.stopped, workflow.stopped);
    assert_eq!(loaded.jobs.len(), workflow.jobs.len());
    for (a, b) in loaded.jobs.iter().zip(&workflow.jobs) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.incoming, b.incoming);
        assert_eq!(a.outgoing, b.outgoing);
        assert_eq!(a.state(), b.state());
    }
}

#[tokio::test]
async fn destroy_removes_all_keys() {
    let client = client_with(
        Arc::new(RecordingEnqueuer::default()),
        all_succeed_registry(),
        EngineConfig::default(),
    );

    let mut workflow = client.create_workflow("Linear", Vec::new()).await.unwrap();
    client.persist_workflow(&mut workflow).await.unwrap();
    client.destroy_workflow(&workflow).await.unwrap();

    assert!(matches!(
        client.find_workflow(&workflow.id).await,
        Err(EngineError::WorkflowNotFound(_))
    ));
    assert!(client
        .store()
        .scan(&gantry_engine::keys::jobs_scan(&workflow.id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_names_surface_as_not_found() {
    let client = client_with(
        Arc::new(RecordingEnqueuer::default()),
        all_succeed_registry(),
        EngineConfig::default(),
    );

    assert!(matches!(
        client.create_workflow("Ghost", Vec::new()).await,
        Err(EngineError::WorkflowNotFound(_))
    ));
    assert!(matches!(
        client.stop_workflow(&gantry_core::WorkflowId::new()).await,
        Err(EngineError::WorkflowNotFound(_))
    ));
}

struct AlwaysExists;

#[async_trait::async_trait]
impl LinkedRecordProbe for AlwaysExists {
    async fn exists(&self, _t: &str, _id: &str) -> gantry_core::EngineResult<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn lookup_by_params_respects_finish_and_linked_record() {
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(
        Client::new(
            EngineConfig::default(),
            store,
            Arc::new(RecordingEnqueuer::default()),
            Arc::new(workflow_registry()),
            Arc::new(all_succeed_registry()),
        )
        .with_probe(Arc::new(AlwaysExists)),
    );

    let mut unfinished = client.create_workflow("Single", Vec::new()).await.unwrap();
    unfinished.link("Order", "42");
    client.persist_workflow(&mut unfinished).await.unwrap();

    let mut params = Map::new();
    params.insert("klass".to_string(), Value::from("Single"));
    let found = client
        .find_not_finished_workflow_by(&params)
        .await
        .unwrap()
        .expect("unfinished workflow matches");
    assert_eq!(found.id, unfinished.id);

    params.insert("linked_type".to_string(), Value::from("Order"));
    assert!(client
        .find_not_finished_workflow_by(&params)
        .await
        .unwrap()
        .is_some());

    params.insert("linked_type".to_string(), Value::from("Invoice"));
    assert!(client
        .find_not_finished_workflow_by(&params)
        .await
        .unwrap()
        .is_none());
}

struct FixedMonitor;

#[async_trait::async_trait]
impl Observer for FixedMonitor {
    async fn load_for(
        &self,
        _id: &gantry_core::WorkflowId,
    ) -> gantry_core::EngineResult<Option<Monitor>> {
        Ok(Some(Monitor {
            monitorable_type: "Order".to_string(),
            monitorable_id: "7".to_string(),
        }))
    }
}

#[tokio::test]
async fn observer_monitor_attaches_on_load() {
    let client = Arc::new(
        Client::new(
            EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingEnqueuer::default()),
            Arc::new(workflow_registry()),
            Arc::new(all_succeed_registry()),
        )
        .with_observer(Arc::new(FixedMonitor)),
    );

    let mut workflow = client.create_workflow("Single", Vec::new()).await.unwrap();
    client.persist_workflow(&mut workflow).await.unwrap();

    let loaded = client.find_workflow(&workflow.id).await.unwrap();
    assert!(loaded.monitor.is_some());
    assert_eq!(loaded.linked_type.as_deref(), Some("Order"));
    assert_eq!(loaded.linked_id.as_deref(), Some("7"));
}
