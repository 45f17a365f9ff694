//! Window manager: per-organization generation window bookkeeping, status,
//! and statistics.

use chrono::{DateTime, Duration, Months, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::EventGenerationWindow;
use crate::repository::{
    EventRepository, InstanceRepository, SqliteRepository, WindowRepository,
};

/// How many rolling note entries a window row may accumulate.
const MAX_CONFIGURATION_NOTE_LINES: usize = 5;

/// Fixed thresholds for window processing decisions.
#[derive(Debug, Clone)]
pub struct WindowProcessingConfig {
    pub max_organizations_per_run: i64,
    /// Staleness threshold: an organization unprocessed for longer than
    /// this is overdue. Never used to preempt in-flight work.
    pub processing_timeout_hours: i64,
    pub priority_threshold_weeks: i64,
}

impl Default for WindowProcessingConfig {
    fn default() -> Self {
        Self {
            max_organizations_per_run: 50,
            processing_timeout_hours: 1,
            priority_threshold_weeks: 2,
        }
    }
}

/// Per-organization outcome handed to `update_window_after_processing`.
#[derive(Debug, Clone)]
pub struct WindowProcessingResult {
    pub window_id: Uuid,
    pub organization_id: Uuid,
    pub instances_created: u64,
    pub events_processed: u64,
    pub processing_time_ms: u64,
}

/// Result value of window configuration validation; collects every
/// violated rule.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Observability snapshot for one organization.
#[derive(Debug, Clone)]
pub struct MaterializationStatus {
    pub window_config: Option<EventGenerationWindow>,
    pub recurring_events_count: i64,
    pub materialized_instances_count: i64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub needs_processing: bool,
    pub processing_priority: i32,
}

/// Aggregate counters across all organizations.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingStatistics {
    pub total_organizations: i64,
    pub enabled_organizations: i64,
    pub organizations_needing_processing: i64,
    pub average_instances_per_run: f64,
    pub last_processing_run: Option<DateTime<Utc>>,
}

/// Whether a window is due (horizon closing within a month) or stale
/// (never processed, or unprocessed past the timeout).
fn window_needs_processing(
    window: &EventGenerationWindow,
    now: DateTime<Utc>,
    config: &WindowProcessingConfig,
) -> bool {
    if !window.is_enabled {
        return false;
    }
    let due = window.current_window_end_date < now + Months::new(1);
    let stale = window
        .last_processed_at
        .map_or(true, |t| t < now - Duration::hours(config.processing_timeout_hours));
    due || stale
}

/// Organizations whose windows need processing, capped and ordered by
/// stored priority. Exposed independently of discovery for status tooling.
pub async fn get_organizations_needing_materialization(
    config: &WindowProcessingConfig,
    repo: &SqliteRepository,
) -> Result<Vec<EventGenerationWindow>, CoreError> {
    let now = Utc::now();
    let due_before = now + Months::new(1);
    let stale_before = now - Duration::hours(config.processing_timeout_hours);

    debug!(
        due_before = %due_before,
        stale_before = %stale_before,
        max_organizations = config.max_organizations_per_run,
        "getting organizations needing materialization"
    );

    let windows = repo
        .find_windows_needing_processing(due_before, stale_before, config.max_organizations_per_run)
        .await?;

    info!(
        "Found {} organizations needing materialization processing",
        windows.len()
    );
    Ok(windows)
}

/// Advances a window after a processing run.
///
/// The window row must exist; a missing row is a fatal precondition
/// violation surfaced as `unexpected` after an error-level log, never
/// swallowed. The new end is anchored at `max(now, old end)` so the horizon
/// never moves backwards.
pub async fn update_window_after_processing(
    window_id: Uuid,
    result: &WindowProcessingResult,
    repo: &SqliteRepository,
) -> Result<(), CoreError> {
    let now = Utc::now();

    let window = repo.find_window_by_id(window_id).await?.ok_or_else(|| {
        error!(window_id = %window_id, "window configuration not found during update");
        CoreError::Unexpected(format!("Window configuration not found: {window_id}"))
    })?;

    let anchor = now.max(window.current_window_end_date);
    let new_window_end = anchor + Months::new(window.hot_window_months_ahead.max(1) as u32);
    let notes = build_processing_notes(window.configuration_notes.as_deref(), result, now);

    repo.update_window_after_run(
        window_id,
        new_window_end,
        now,
        result.instances_created as i64,
        notes,
    )
    .await?;

    info!(
        window_id = %window_id,
        organization_id = %result.organization_id,
        new_window_end_date = %new_window_end,
        instances_created = result.instances_created,
        events_processed = result.events_processed,
        processing_time_ms = result.processing_time_ms,
        "updated materialization window"
    );

    Ok(())
}

/// Appends a run summary to the rolling notes, keeping only the newest
/// entries so the row cannot grow without bound.
fn build_processing_notes(
    existing: Option<&str>,
    result: &WindowProcessingResult,
    now: DateTime<Utc>,
) -> String {
    let entry = format!(
        "[{}] Processed {} events, created {} instances in {}ms",
        now.format("%Y-%m-%dT%H:%M:%SZ"),
        result.events_processed,
        result.instances_created,
        result.processing_time_ms
    );

    let mut lines: Vec<String> = existing
        .map(|notes| notes.lines().map(str::to_string).collect())
        .unwrap_or_default();
    lines.push(entry);

    if lines.len() > MAX_CONFIGURATION_NOTE_LINES {
        lines.drain(..lines.len() - MAX_CONFIGURATION_NOTE_LINES);
    }
    lines.join("\n")
}

/// Pure structural checks over a window row; returns every violated rule.
pub fn validate_window_configuration(window: &EventGenerationWindow) -> WindowValidation {
    let mut errors = Vec::new();

    if !window.is_enabled {
        errors.push("Window is not enabled for processing".to_string());
    }
    if window.hot_window_months_ahead < 1 {
        errors.push("Hot window months ahead must be at least 1".to_string());
    }
    if window.max_instances_per_run < 1 {
        errors.push("Max instances per run must be at least 1".to_string());
    }
    if !(1..=10).contains(&window.processing_priority) {
        errors.push("Processing priority must be between 1 and 10".to_string());
    }

    WindowValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Status for one organization. An organization with no window row reports
/// `needs_processing = true`: absence means it has never been processed.
pub async fn get_organization_materialization_status(
    organization_id: Uuid,
    repo: &SqliteRepository,
) -> Result<MaterializationStatus, CoreError> {
    let config = WindowProcessingConfig::default();
    let window = repo.find_window_by_organization(organization_id).await?;
    let recurring_events_count = repo.count_recurring_templates(organization_id).await?;
    let materialized_instances_count =
        repo.count_instances_for_organization(organization_id).await?;

    let now = Utc::now();
    let (needs_processing, last_processed_at, processing_priority) = match &window {
        Some(window) => (
            window_needs_processing(window, now, &config),
            window.last_processed_at,
            window.processing_priority,
        ),
        None => (true, None, 5),
    };

    Ok(MaterializationStatus {
        window_config: window,
        recurring_events_count,
        materialized_instances_count,
        last_processed_at,
        needs_processing,
        processing_priority,
    })
}

/// Aggregate statistics across all organizations. Averages and the last
/// run timestamp only consider enabled windows.
pub async fn get_processing_statistics(
    repo: &SqliteRepository,
) -> Result<ProcessingStatistics, CoreError> {
    let config = WindowProcessingConfig::default();
    let all_windows = repo.list_windows(false).await?;
    let enabled: Vec<_> = all_windows.iter().filter(|w| w.is_enabled).collect();

    let now = Utc::now();
    let needing_processing = enabled
        .iter()
        .filter(|w| window_needs_processing(w, now, &config))
        .count() as i64;

    let average_instances_per_run = if enabled.is_empty() {
        0.0
    } else {
        enabled
            .iter()
            .map(|w| w.last_processed_instance_count as f64)
            .sum::<f64>()
            / enabled.len() as f64
    };

    let last_processing_run = enabled.iter().filter_map(|w| w.last_processed_at).max();

    Ok(ProcessingStatistics {
        total_organizations: all_windows.len() as i64,
        enabled_organizations: enabled.len() as i64,
        organizations_needing_processing: needing_processing,
        average_instances_per_run,
        last_processing_run,
    })
}
