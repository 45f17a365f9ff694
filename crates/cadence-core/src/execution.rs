//! Execution engine: runs materialization jobs with bounded concurrency.
//!
//! Jobs partition disjoint (organization, base event) instance rows, so
//! concurrent jobs never write the same rows. A failing job is isolated:
//! caught, logged with its job context, and counted, without cancelling
//! siblings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::MaterializationJob;
use crate::repository::{SqliteRepository, WindowRepository};

const DEFAULT_MAX_INSTANCES_PER_RUN: usize = 1000;

/// Tuning for one batch execution.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub max_concurrent_jobs: usize,
    /// When set, any failed job marks the whole batch unsuccessful
    pub require_full_success: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            require_full_success: false,
        }
    }
}

/// Aggregated counters for one batch execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    pub organizations_processed: u64,
    pub instances_created: u64,
    pub errors_encountered: u64,
    pub events_processed: u64,
}

/// Coarse resource telemetry captured alongside the metrics.
#[derive(Debug, Clone, Default)]
pub struct ResourceUsage {
    pub database_connections: u32,
    /// Instances created per second over the whole batch
    pub processing_throughput: f64,
}

/// Result of one job, success or failure.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub organization_id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub instances_created: u64,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// Result of a whole batch execution.
#[derive(Debug, Clone)]
pub struct BatchExecutionResult {
    pub success: bool,
    pub outcomes: Vec<JobOutcome>,
    pub metrics: ExecutionMetrics,
    pub resource_usage: ResourceUsage,
}

/// Runs the given jobs with at most `max_concurrent_jobs` in flight.
///
/// Never fails as a whole: per-job errors are recorded in the outcomes and
/// counted in `errors_encountered`.
pub async fn execute_batch_materialization(
    jobs: Vec<MaterializationJob>,
    config: &ExecutionConfig,
    repo: &SqliteRepository,
) -> BatchExecutionResult {
    let started = Instant::now();
    let total_jobs = jobs.len();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
    let mut join_set = JoinSet::new();

    for job in jobs {
        let semaphore = Arc::clone(&semaphore);
        let repo = repo.clone();
        join_set.spawn(async move {
            // The semaphore is never closed; a failed acquire would only
            // mean running unthrottled
            let _permit = semaphore.acquire_owned().await.ok();
            run_single_job(&repo, job).await
        });
    }

    let mut outcomes = Vec::with_capacity(total_jobs);
    let mut panicked_jobs: u64 = 0;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!(error = %e, "materialization job task aborted");
                panicked_jobs += 1;
            }
        }
    }

    let elapsed = started.elapsed();
    let mut metrics = ExecutionMetrics {
        errors_encountered: panicked_jobs,
        ..ExecutionMetrics::default()
    };
    let mut successful_organizations = HashSet::new();

    for outcome in &outcomes {
        if outcome.error.is_some() {
            metrics.errors_encountered += 1;
        } else {
            metrics.events_processed += 1;
            metrics.instances_created += outcome.instances_created;
            successful_organizations.insert(outcome.organization_id);
        }
    }
    metrics.organizations_processed = successful_organizations.len() as u64;

    let elapsed_secs = elapsed.as_secs_f64();
    let resource_usage = ResourceUsage {
        database_connections: repo.pool().size(),
        processing_throughput: if elapsed_secs > 0.0 {
            metrics.instances_created as f64 / elapsed_secs
        } else {
            0.0
        },
    };

    info!(
        total_jobs,
        organizations_processed = metrics.organizations_processed,
        instances_created = metrics.instances_created,
        errors_encountered = metrics.errors_encountered,
        elapsed_ms = elapsed.as_millis() as u64,
        "batch materialization finished"
    );

    BatchExecutionResult {
        success: !(config.require_full_success && metrics.errors_encountered > 0),
        outcomes,
        metrics,
        resource_usage,
    }
}

/// Runs one job, converting any failure into an error outcome.
async fn run_single_job(repo: &SqliteRepository, job: MaterializationJob) -> JobOutcome {
    let started = Instant::now();

    let max_instances = match repo.find_window_by_organization(job.organization_id).await {
        Ok(Some(window)) => window.max_instances_per_run.max(1) as usize,
        Ok(None) => DEFAULT_MAX_INSTANCES_PER_RUN,
        Err(e) => {
            error!(
                organization_id = %job.organization_id,
                base_recurring_event_id = %job.base_recurring_event_id,
                error = %e,
                "failed to load window configuration for job"
            );
            return JobOutcome {
                organization_id: job.organization_id,
                base_recurring_event_id: job.base_recurring_event_id,
                instances_created: 0,
                execution_time_ms: started.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            };
        }
    };

    match repo.materialize_event_window(&job, max_instances).await {
        Ok(created) => JobOutcome {
            organization_id: job.organization_id,
            base_recurring_event_id: job.base_recurring_event_id,
            instances_created: created,
            execution_time_ms: started.elapsed().as_millis() as u64,
            error: None,
        },
        Err(e) => {
            error!(
                organization_id = %job.organization_id,
                base_recurring_event_id = %job.base_recurring_event_id,
                window_start = %job.window_start_date,
                window_end = %job.window_end_date,
                error = %e,
                "materialization job failed"
            );
            JobOutcome {
                organization_id: job.organization_id,
                base_recurring_event_id: job.base_recurring_event_id,
                instances_created: 0,
                execution_time_ms: started.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            }
        }
    }
}
