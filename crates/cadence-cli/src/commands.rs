use cadence_core::cleanup::{execute_post_processing, PostProcessingConfig};
use cadence_core::error::CoreError;
use cadence_core::pipeline::{
    run_materialization_worker, run_single_organization_worker, WorkerConfig, WorkerResult,
};
use cadence_core::repository::SqliteRepository;
use cadence_core::window::{
    get_organization_materialization_status, get_processing_statistics,
    validate_window_configuration,
};
use owo_colors::OwoColorize;
use uuid::Uuid;

fn print_worker_result(result: &WorkerResult) {
    println!("{}", "Materialization run finished".green().bold());
    println!("  organizations processed: {}", result.organizations_processed);
    println!("  instances created:       {}", result.instances_created);
    println!("  windows updated:         {}", result.windows_updated);
    if result.errors_encountered > 0 {
        println!(
            "  errors encountered:      {}",
            result.errors_encountered.to_string().red()
        );
    } else {
        println!("  errors encountered:      0");
    }
    println!("  processing time:         {}ms", result.processing_time_ms);
}

pub async fn run_worker(repo: &SqliteRepository, config: &WorkerConfig) -> Result<(), CoreError> {
    let result = run_materialization_worker(config, repo).await;
    print_worker_result(&result);
    Ok(())
}

pub async fn run_single_organization(
    repo: &SqliteRepository,
    organization_id: Uuid,
) -> Result<(), CoreError> {
    let result = run_single_organization_worker(organization_id, repo).await;
    print_worker_result(&result);
    Ok(())
}

pub async fn show_status(
    repo: &SqliteRepository,
    organization_id: Uuid,
) -> Result<(), CoreError> {
    let status = get_organization_materialization_status(organization_id, repo).await?;

    println!("{} {}", "Organization".bold(), organization_id);
    println!("  recurring events:       {}", status.recurring_events_count);
    println!(
        "  materialized instances: {}",
        status.materialized_instances_count
    );
    println!(
        "  last processed:         {}",
        status
            .last_processed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  processing priority:    {}", status.processing_priority);
    if status.needs_processing {
        println!("  needs processing:       {}", "yes".yellow());
    } else {
        println!("  needs processing:       no");
    }

    match status.window_config {
        Some(window) => {
            println!(
                "  window end:             {}",
                window.current_window_end_date.to_rfc3339()
            );
            let validation = validate_window_configuration(&window);
            if !validation.is_valid {
                println!("  {}", "window configuration issues:".red().bold());
                for error in validation.errors {
                    println!("    - {error}");
                }
            }
        }
        None => println!("  window:                 not yet initialized"),
    }

    Ok(())
}

pub async fn show_stats(repo: &SqliteRepository) -> Result<(), CoreError> {
    let stats = get_processing_statistics(repo).await?;

    println!("{}", "Processing statistics".bold());
    println!("  organizations:          {}", stats.total_organizations);
    println!("  enabled:                {}", stats.enabled_organizations);
    println!(
        "  needing processing:     {}",
        stats.organizations_needing_processing
    );
    println!(
        "  avg instances per run:  {:.1}",
        stats.average_instances_per_run
    );
    println!(
        "  last processing run:    {}",
        stats
            .last_processing_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );

    Ok(())
}

pub async fn run_cleanup(repo: &SqliteRepository) -> Result<(), CoreError> {
    let result = execute_post_processing(&PostProcessingConfig::default(), repo).await?;

    println!("{}", "Retention cleanup finished".green().bold());
    println!("  windows updated: {}", result.windows_updated);
    if !result.errors.is_empty() {
        println!("  {}", "errors:".red().bold());
        for error in &result.errors {
            println!("    - {error}");
        }
    }

    Ok(())
}
