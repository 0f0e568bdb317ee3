//! ETL pipeline demo: extract -> {clean, enrich} -> load, run in-process.
//!
//! ```text
//! GANTRY_STORE_URL=sqlite:/tmp/gantry-demo.db cargo run --bin etl-pipeline
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gantry_core::{
    BlueprintBuilder, EngineConfig, JobContext, JobHandler, JobOutcome, JobRegistry,
    WorkflowRegistry,
};
use gantry_engine::{ChannelEnqueuer, Client, InlineRunner};
use gantry_store::StoreCache;

/// Pretends to read raw order rows from the source named in the workflow
/// arguments.
struct ExtractOrders;

#[async_trait]
impl JobHandler for ExtractOrders {
    async fn perform(&self, ctx: JobContext) -> JobOutcome {
        info!(job = %ctx.job_name, "extracting");
        Ok(Some(json!({ "rows": [12, -3, 40, 7, -1, 25] })))
    }
}

/// Drops rows that fail validation.
struct CleanRows;

#[async_trait]
impl JobHandler for CleanRows {
    async fn perform(&self, ctx: JobContext) -> JobOutcome {
        let rows = upstream_rows(&ctx);
        let kept: Vec<i64> = rows.into_iter().filter(|r| *r >= 0).collect();
        info!(job = %ctx.job_name, kept = kept.len(), "cleaned");
        Ok(Some(json!({ "rows": kept })))
    }
}

/// Derives summary statistics from the raw rows.
struct EnrichRows;

#[async_trait]
impl JobHandler for EnrichRows {
    async fn perform(&self, ctx: JobContext) -> JobOutcome {
        let rows = upstream_rows(&ctx);
        let total: i64 = rows.iter().sum();
        info!(job = %ctx.job_name, total, "enriched");
        Ok(Some(json!({ "row_count": rows.len(), "total": total })))
    }
}

/// Combines both branches into the final record.
struct LoadReport;

#[async_trait]
impl JobHandler for LoadReport {
    async fn perform(&self, ctx: JobContext) -> JobOutcome {
        let mut report = serde_json::Map::new();
        for payload in &ctx.payloads {
            if let Some(output) = &payload.output {
                report.insert(payload.klass.clone(), output.clone());
            }
        }
        info!(job = %ctx.job_name, branches = report.len(), "loaded report");
        Ok(Some(Value::Object(report)))
    }
}

fn upstream_rows(ctx: &JobContext) -> Vec<i64> {
    ctx.payloads
        .iter()
        .filter_map(|p| p.output.as_ref())
        .filter_map(|o| o.get("rows"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_i64)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut workflows = WorkflowRegistry::new();
    workflows.register("EtlPipeline", |_args| {
        let mut b = BlueprintBuilder::new("EtlPipeline");
        let extract = b.add_job("ExtractOrders");
        let clean = b.add_job_after("CleanRows", &[extract]);
        let enrich = b.add_job_after("EnrichRows", &[extract]);
        b.add_job_after("LoadReport", &[clean, enrich]);
        Ok(b.build())
    });

    let mut jobs = JobRegistry::new();
    jobs.register("ExtractOrders", Arc::new(ExtractOrders));
    jobs.register("CleanRows", Arc::new(CleanRows));
    jobs.register("EnrichRows", Arc::new(EnrichRows));
    jobs.register("LoadReport", Arc::new(LoadReport));

    let config = EngineConfig::from_env();
    let cache = StoreCache::new();
    let store = cache.get(&config.store_url).await?;

    let (enqueuer, rx) = ChannelEnqueuer::unbounded();
    let client = Arc::new(Client::new(
        config,
        store,
        Arc::new(enqueuer),
        Arc::new(workflows),
        Arc::new(jobs),
    ));

    let mut workflow = client
        .create_workflow("EtlPipeline", vec![json!("orders.csv")])
        .await?;
    client.start_workflow(&mut workflow, &[]).await?;

    let mut runner = InlineRunner::new(client.clone(), rx);
    let processed = runner.run_until_idle().await?;

    let workflow = client.find_workflow(&workflow.id).await?;
    let counts = workflow.status_counts();
    let report = workflow
        .jobs
        .iter()
        .find(|j| j.klass == "LoadReport")
        .and_then(|j| j.output_payload.clone());

    info!(
        workflow = %workflow.id,
        processed,
        succeeded = counts.succeeded,
        failed = counts.failed,
        finished = workflow.finished(),
        "pipeline done"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
