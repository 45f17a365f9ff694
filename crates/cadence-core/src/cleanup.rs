//! Post-processing: retention cleanup of old materialized instances.

use chrono::{Months, Utc};
use tracing::{debug, error, info};

use crate::error::CoreError;
use crate::repository::{InstanceRepository, SqliteRepository, WindowRepository};

/// Tuning for the post-processing stage.
#[derive(Debug, Clone)]
pub struct PostProcessingConfig {
    pub enable_cleanup: bool,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            enable_cleanup: true,
        }
    }
}

/// Result of one post-processing pass.
#[derive(Debug, Clone, Default)]
pub struct PostProcessingResult {
    pub cleanup_performed: bool,
    pub windows_updated: u64,
    pub errors: Vec<String>,
}

/// Removes instances that start before each organization's retention
/// cutoff and advances the window's retention boundary.
///
/// Per-organization failures are recorded and skipped; they never abort
/// cleanup for other organizations.
pub async fn execute_post_processing(
    config: &PostProcessingConfig,
    repo: &SqliteRepository,
) -> Result<PostProcessingResult, CoreError> {
    if !config.enable_cleanup {
        debug!("post-processing disabled, skipping cleanup");
        return Ok(PostProcessingResult::default());
    }

    let windows = repo.list_windows(true).await?;
    info!(
        "Found {} organizations for cleanup processing",
        windows.len()
    );

    let mut result = PostProcessingResult {
        cleanup_performed: true,
        ..PostProcessingResult::default()
    };
    let now = Utc::now();

    for window in windows {
        let cutoff = now - Months::new(window.history_retention_months.max(1) as u32);

        let cleaned: Result<u64, CoreError> = async {
            let deleted = repo
                .delete_instances_before(window.organization_id, cutoff)
                .await?;
            repo.update_retention_start(window.id, cutoff).await?;
            Ok(deleted)
        }
        .await;

        match cleaned {
            Ok(deleted) => {
                result.windows_updated += 1;
                if deleted > 0 {
                    info!(
                        organization_id = %window.organization_id,
                        deleted,
                        cutoff = %cutoff,
                        "cleaned up instances past retention"
                    );
                } else {
                    debug!(
                        organization_id = %window.organization_id,
                        "no old instances to clean up"
                    );
                }
            }
            Err(e) => {
                error!(
                    organization_id = %window.organization_id,
                    error = %e,
                    "failed to clean up instances for organization"
                );
                result
                    .errors
                    .push(format!("{}: {e}", window.organization_id));
            }
        }
    }

    Ok(result)
}
