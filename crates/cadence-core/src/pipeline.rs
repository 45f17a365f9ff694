//! The materialization worker pipeline: discovery, execution, window
//! advancement, and optional post-processing, stitched together behind a
//! crash-proof boundary for the external scheduler.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cleanup::{execute_post_processing, PostProcessingConfig};
use crate::discovery::{
    create_materialization_jobs, discover_materialization_workloads,
    discover_organization_workload, JobDiscoveryConfig,
};
use crate::error::CoreError;
use crate::execution::{execute_batch_materialization, BatchExecutionResult, ExecutionConfig};
use crate::models::DiscoveredWorkload;
use crate::repository::{OrganizationRepository, SqliteRepository, WindowRepository};
use crate::window::{update_window_after_processing, WindowProcessingResult};

/// Tunables for one worker run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_concurrent_jobs: usize,
    pub max_organizations: i64,
    pub enable_post_processing: bool,
    pub require_full_success: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            max_organizations: 50,
            enable_post_processing: true,
            require_full_success: false,
        }
    }
}

/// Shape returned to scheduling and ops tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerResult {
    pub organizations_processed: u64,
    pub instances_created: u64,
    pub windows_updated: u64,
    pub errors_encountered: u64,
    pub processing_time_ms: u64,
}

/// Runs the full materialization pipeline.
///
/// Never propagates an error to the scheduler: a top-level failure is
/// logged and reported as a zeroed result with one error counted.
pub async fn run_materialization_worker(
    config: &WorkerConfig,
    repo: &SqliteRepository,
) -> WorkerResult {
    let started = Instant::now();
    match run_pipeline(config, repo).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "materialization worker failed");
            WorkerResult {
                errors_encountered: 1,
                processing_time_ms: started.elapsed().as_millis() as u64,
                ..WorkerResult::default()
            }
        }
    }
}

async fn run_pipeline(
    config: &WorkerConfig,
    repo: &SqliteRepository,
) -> Result<WorkerResult, CoreError> {
    let started = Instant::now();
    info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        max_organizations = config.max_organizations,
        "starting materialization worker run"
    );

    let discovery_config = JobDiscoveryConfig {
        max_organizations: config.max_organizations,
        ..JobDiscoveryConfig::default()
    };
    let workloads = discover_materialization_workloads(&discovery_config, repo).await?;

    if workloads.is_empty() {
        info!("No materialization work discovered");
        return Ok(WorkerResult {
            processing_time_ms: started.elapsed().as_millis() as u64,
            ..WorkerResult::default()
        });
    }

    let jobs = create_materialization_jobs(&workloads);
    info!(
        "Created {} materialization jobs from {} workloads",
        jobs.len(),
        workloads.len()
    );

    let execution_config = ExecutionConfig {
        max_concurrent_jobs: config.max_concurrent_jobs,
        require_full_success: config.require_full_success,
    };
    let execution = execute_batch_materialization(jobs, &execution_config, repo).await;

    let mut result = WorkerResult {
        organizations_processed: execution.metrics.organizations_processed,
        instances_created: execution.metrics.instances_created,
        windows_updated: 0,
        errors_encountered: execution.metrics.errors_encountered,
        processing_time_ms: 0,
    };

    result.windows_updated =
        advance_windows(&workloads, &execution, started, repo, &mut result.errors_encountered)
            .await;

    if config.enable_post_processing {
        match execute_post_processing(&PostProcessingConfig::default(), repo).await {
            Ok(post) => {
                result.errors_encountered += post.errors.len() as u64;
                info!(
                    cleanup_performed = post.cleanup_performed,
                    windows_cleaned = post.windows_updated,
                    "post-processing finished"
                );
            }
            Err(e) => {
                error!(error = %e, "post-processing failed");
                result.errors_encountered += 1;
            }
        }
    }

    result.processing_time_ms = started.elapsed().as_millis() as u64;
    info!(
        organizations_processed = result.organizations_processed,
        instances_created = result.instances_created,
        windows_updated = result.windows_updated,
        errors_encountered = result.errors_encountered,
        processing_time_ms = result.processing_time_ms,
        "materialization worker completed"
    );

    Ok(result)
}

/// Advances the window of every organization that had at least one
/// successful job. Per-window failures are counted, not propagated.
async fn advance_windows(
    workloads: &[DiscoveredWorkload],
    execution: &BatchExecutionResult,
    started: Instant,
    repo: &SqliteRepository,
    errors_encountered: &mut u64,
) -> u64 {
    let mut per_organization: HashMap<Uuid, (u64, u64)> = HashMap::new();
    for outcome in execution.outcomes.iter().filter(|o| o.error.is_none()) {
        let entry = per_organization.entry(outcome.organization_id).or_default();
        entry.0 += outcome.instances_created;
        entry.1 += 1;
    }

    let mut windows_updated = 0;
    for workload in workloads {
        let Some((instances_created, events_processed)) =
            per_organization.get(&workload.organization_id).copied()
        else {
            continue;
        };

        let processing_result = WindowProcessingResult {
            window_id: workload.window_config.id,
            organization_id: workload.organization_id,
            instances_created,
            events_processed,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        match update_window_after_processing(workload.window_config.id, &processing_result, repo)
            .await
        {
            Ok(()) => windows_updated += 1,
            Err(e) => {
                error!(
                    organization_id = %workload.organization_id,
                    window_id = %workload.window_config.id,
                    error = %e,
                    "failed to advance window after processing"
                );
                *errors_encountered += 1;
            }
        }
    }

    windows_updated
}

/// Runs the pipeline stages for a single organization, initializing its
/// window on first need. Same result shape as the full worker.
pub async fn run_single_organization_worker(
    organization_id: Uuid,
    repo: &SqliteRepository,
) -> WorkerResult {
    let started = Instant::now();
    match run_single_organization(organization_id, repo).await {
        Ok(result) => result,
        Err(e) => {
            error!(
                organization_id = %organization_id,
                error = %e,
                "single organization worker failed"
            );
            WorkerResult {
                errors_encountered: 1,
                processing_time_ms: started.elapsed().as_millis() as u64,
                ..WorkerResult::default()
            }
        }
    }
}

async fn run_single_organization(
    organization_id: Uuid,
    repo: &SqliteRepository,
) -> Result<WorkerResult, CoreError> {
    let started = Instant::now();
    let config = WorkerConfig::default();

    if repo.find_organization_by_id(organization_id).await?.is_none() {
        warn!(organization_id = %organization_id, "organization not found");
        return Ok(WorkerResult {
            errors_encountered: 1,
            processing_time_ms: started.elapsed().as_millis() as u64,
            ..WorkerResult::default()
        });
    }

    let window = match repo.find_window_by_organization(organization_id).await? {
        Some(window) => window,
        None => {
            info!(
                organization_id = %organization_id,
                "initializing generation window on first materialization need"
            );
            repo.initialize_generation_window(organization_id, None)
                .await?
        }
    };

    if !window.is_enabled {
        warn!(
            organization_id = %organization_id,
            "generation window is disabled, skipping"
        );
        return Ok(WorkerResult {
            processing_time_ms: started.elapsed().as_millis() as u64,
            ..WorkerResult::default()
        });
    }

    let Some(workload) = discover_organization_workload(window, repo).await? else {
        info!(
            organization_id = %organization_id,
            "no recurring events to materialize"
        );
        return Ok(WorkerResult {
            processing_time_ms: started.elapsed().as_millis() as u64,
            ..WorkerResult::default()
        });
    };

    let workloads = vec![workload];
    let jobs = create_materialization_jobs(&workloads);
    let execution_config = ExecutionConfig {
        max_concurrent_jobs: config.max_concurrent_jobs,
        require_full_success: config.require_full_success,
    };
    let execution = execute_batch_materialization(jobs, &execution_config, repo).await;

    let mut result = WorkerResult {
        organizations_processed: execution.metrics.organizations_processed,
        instances_created: execution.metrics.instances_created,
        windows_updated: 0,
        errors_encountered: execution.metrics.errors_encountered,
        processing_time_ms: 0,
    };
    result.windows_updated =
        advance_windows(&workloads, &execution, started, repo, &mut result.errors_encountered)
            .await;

    result.processing_time_ms = started.elapsed().as_millis() as u64;
    Ok(result)
}
