//! Job discovery: finds organizations and series with pending
//! materialization work and ranks them.
//!
//! Discovery is read only. A failure while examining one organization is
//! logged with the organization id and excluded from the result; it never
//! aborts discovery for the others.

use chrono::{DateTime, Duration, Months, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::error::CoreError;
use crate::models::{
    DiscoveredRecurringEvent, DiscoveredWorkload, EventGenerationWindow, MaterializationJob,
    RecurrenceRule,
};
use crate::recurrence::{estimate_instance_count, normalize_recurrence_rule};
use crate::repository::{EventRepository, RuleRepository, SqliteRepository, WindowRepository};
use crate::window::WindowProcessingConfig;

/// Configuration for the job discovery process, defining limits and
/// thresholds.
#[derive(Debug, Clone)]
pub struct JobDiscoveryConfig {
    pub max_organizations: i64,
    pub look_ahead_months: u32,
    pub priority_threshold: f64,
}

impl Default for JobDiscoveryConfig {
    fn default() -> Self {
        Self {
            max_organizations: 50,
            look_ahead_months: 1,
            priority_threshold: 5.0,
        }
    }
}

/// Discovers organizations and their recurring events that require
/// materialization, producing a list of workloads sorted by computed
/// priority, highest first.
pub async fn discover_materialization_workloads(
    config: &JobDiscoveryConfig,
    repo: &SqliteRepository,
) -> Result<Vec<DiscoveredWorkload>, CoreError> {
    let now = Utc::now();
    let due_before = now + Months::new(config.look_ahead_months);
    let stale_before =
        now - Duration::hours(WindowProcessingConfig::default().processing_timeout_hours);

    let organization_windows = repo
        .find_windows_needing_processing(due_before, stale_before, config.max_organizations)
        .await?;

    if organization_windows.is_empty() {
        info!("No organizations need materialization work");
        return Ok(Vec::new());
    }

    let mut workloads = Vec::new();

    for window_config in organization_windows {
        let organization_id = window_config.organization_id;
        match discover_organization_workload(window_config, repo).await {
            Ok(Some(workload)) => workloads.push(workload),
            Ok(None) => {}
            Err(e) => {
                error!(
                    organization_id = %organization_id,
                    error = %e,
                    "failed to discover workload for organization"
                );
            }
        }
    }

    // Highest computed priority first; the query layer already capped the
    // candidate set in ascending stored priority order
    workloads.sort_by(|a, b| b.priority.total_cmp(&a.priority));

    let total_events: usize = workloads.iter().map(|w| w.recurring_events.len()).sum();
    let high_priority = workloads
        .iter()
        .filter(|w| w.priority > config.priority_threshold)
        .count();
    info!(
        total_events,
        high_priority_workloads = high_priority,
        "discovered {} materialization workloads",
        workloads.len()
    );

    Ok(workloads)
}

/// Loads one organization's recurring templates and their rules. Templates
/// without a matching rule are logged and skipped rather than treated as
/// errors; an organization with nothing to generate yields `None`.
pub(crate) async fn discover_organization_workload(
    window_config: EventGenerationWindow,
    repo: &SqliteRepository,
) -> Result<Option<DiscoveredWorkload>, CoreError> {
    let templates = repo
        .find_recurring_templates(window_config.organization_id)
        .await?;
    if templates.is_empty() {
        return Ok(None);
    }

    let event_ids: Vec<_> = templates.iter().map(|e| e.id).collect();
    let rules = repo.find_rules_for_events(&event_ids).await?;
    let mut rule_map: HashMap<_, _> = rules
        .into_iter()
        .map(|rule| (rule.base_recurring_event_id, rule))
        .collect();

    let mut recurring_events = Vec::new();
    for template in templates {
        let Some(rule) = rule_map.remove(&template.id) else {
            debug!(
                event_id = %template.id,
                "recurring template has no matching rule, skipping"
            );
            continue;
        };

        recurring_events.push(DiscoveredRecurringEvent {
            event_id: template.id,
            event_name: template.name,
            rule_id: rule.id,
            is_never_ending: rule.is_never_ending(),
            estimated_instances: estimate_instance_count(&rule, None),
            recurrence_rule: rule,
        });
    }

    if recurring_events.is_empty() {
        return Ok(None);
    }

    let priority = calculate_workload_priority(&window_config, &recurring_events);
    let estimated_duration_ms = estimate_workload_duration(&recurring_events);

    Ok(Some(DiscoveredWorkload {
        organization_id: window_config.organization_id,
        window_config,
        recurring_events,
        priority,
        estimated_duration_ms,
    }))
}

/// Converts discovered workloads into executable jobs, one per
/// (organization, base event) pair.
pub fn create_materialization_jobs(workloads: &[DiscoveredWorkload]) -> Vec<MaterializationJob> {
    let now = Utc::now();
    let mut jobs = Vec::new();

    for workload in workloads {
        for event in &workload.recurring_events {
            // Count-limited rules are folded into an end date first so every
            // finite series gets the same window treatment
            let normalized = match normalize_recurrence_rule(&event.recurrence_rule) {
                Ok(rule) => rule,
                Err(e) => {
                    error!(
                        rule_id = %event.rule_id,
                        error = %e,
                        "skipping event with unusable recurrence rule"
                    );
                    continue;
                }
            };

            let window_end_date =
                calculate_window_end_date_for_event(&normalized, &workload.window_config, now);
            let window_start_date = event
                .recurrence_rule
                .latest_instance_date
                .max(workload.window_config.current_window_end_date);

            jobs.push(MaterializationJob {
                organization_id: workload.organization_id,
                base_recurring_event_id: event.event_id,
                window_start_date,
                window_end_date,
            });
        }
    }

    jobs
}

/// Window end for one event: the organization's hot-window horizon, or the
/// event's own end plus a one week buffer when that reaches further.
/// Finite series are never cut off early.
fn calculate_window_end_date_for_event(
    normalized_rule: &RecurrenceRule,
    window_config: &EventGenerationWindow,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let default_window_end = now + Months::new(window_config.hot_window_months_ahead.max(1) as u32);

    if let Some(end_date) = normalized_rule.recurrence_end_date {
        let end_with_buffer = end_date + Duration::weeks(1);
        if end_with_buffer > default_window_end {
            return end_with_buffer;
        }
    }

    default_window_end
}

/// Priority of a workload: stored base priority plus bonuses for
/// never-ending series, a closing window, and sheer size, clamped to 10.
/// Never-ending series depend entirely on periodic advancement, so they
/// always outrank an otherwise equal workload without one.
fn calculate_workload_priority(
    window_config: &EventGenerationWindow,
    recurring_events: &[DiscoveredRecurringEvent],
) -> f64 {
    let base = if window_config.processing_priority > 0 {
        window_config.processing_priority as f64
    } else {
        5.0
    };
    let mut priority = base;

    let never_ending_count = recurring_events.iter().filter(|e| e.is_never_ending).count();
    if never_ending_count > 0 {
        priority += (never_ending_count as f64 * 0.5).min(2.0);
    }

    let now = Utc::now();
    let days_until_window_end =
        (window_config.current_window_end_date - now).num_seconds() as f64 / 86_400.0;
    if days_until_window_end < 7.0 {
        priority += ((7.0 - days_until_window_end) / 7.0) * 2.0;
    }

    let total_events = recurring_events.len();
    if total_events > 10 {
        priority += (total_events as f64 / 50.0).min(1.0);
    }

    priority.min(10.0)
}

/// Duration estimate in milliseconds, from a fixed per-run base plus
/// per-event and per-instance costs.
fn estimate_workload_duration(recurring_events: &[DiscoveredRecurringEvent]) -> u64 {
    const BASE_TIME_MS: u64 = 5_000;
    const TIME_PER_EVENT_MS: u64 = 1_000;
    const TIME_PER_INSTANCE_MS: u64 = 10;

    let total_instances: u64 = recurring_events
        .iter()
        .map(|e| e.estimated_instances.max(0) as u64)
        .sum();

    BASE_TIME_MS
        + recurring_events.len() as u64 * TIME_PER_EVENT_MS
        + total_instances * TIME_PER_INSTANCE_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use uuid::Uuid;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid RFC 3339 timestamp")
    }

    fn window_config(priority: i32, window_end: DateTime<Utc>) -> EventGenerationWindow {
        EventGenerationWindow {
            id: Uuid::now_v7(),
            organization_id: Uuid::now_v7(),
            hot_window_months_ahead: 12,
            history_retention_months: 3,
            current_window_end_date: window_end,
            retention_start_date: Utc::now(),
            processing_priority: priority,
            is_enabled: true,
            last_processed_at: Some(Utc::now()),
            last_processed_instance_count: 0,
            max_instances_per_run: 1000,
            configuration_notes: None,
            created_by_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn discovered_event(rule: RecurrenceRule) -> DiscoveredRecurringEvent {
        DiscoveredRecurringEvent {
            event_id: rule.base_recurring_event_id,
            event_name: "Event".to_string(),
            rule_id: rule.id,
            is_never_ending: rule.is_never_ending(),
            estimated_instances: estimate_instance_count(&rule, None),
            recurrence_rule: rule,
        }
    }

    #[test]
    fn test_never_ending_series_outranks_equal_priority() {
        let far_end = Utc::now() + Months::new(6);
        let with_never_ending = calculate_workload_priority(
            &window_config(5, far_end),
            &[discovered_event(RecurrenceRule::default())],
        );
        let finite = calculate_workload_priority(
            &window_config(5, far_end),
            &[discovered_event(RecurrenceRule {
                count: Some(10),
                ..RecurrenceRule::default()
            })],
        );
        assert!(with_never_ending > finite);
    }

    #[test]
    fn test_closing_window_raises_priority() {
        let events = [discovered_event(RecurrenceRule {
            count: Some(10),
            ..RecurrenceRule::default()
        })];
        let closing = calculate_workload_priority(
            &window_config(5, Utc::now() + Duration::days(2)),
            &events,
        );
        let comfortable = calculate_workload_priority(
            &window_config(5, Utc::now() + Months::new(6)),
            &events,
        );
        assert!(closing > comfortable);
    }

    #[test]
    fn test_priority_is_clamped_to_ten() {
        let events: Vec<_> = (0..60)
            .map(|_| discovered_event(RecurrenceRule::default()))
            .collect();
        let priority = calculate_workload_priority(
            &window_config(10, Utc::now() - Duration::days(30)),
            &events,
        );
        assert!(priority <= 10.0);
    }

    #[test]
    fn test_job_window_starts_at_high_water_mark() {
        let window_end = utc("2024-06-01T00:00:00Z");
        let mut config = window_config(5, window_end);
        config.hot_window_months_ahead = 12;

        let rule = RecurrenceRule {
            latest_instance_date: utc("2024-08-01T00:00:00Z"),
            ..RecurrenceRule::default()
        };
        let workload = DiscoveredWorkload {
            organization_id: config.organization_id,
            window_config: config,
            recurring_events: vec![discovered_event(rule)],
            priority: 5.0,
            estimated_duration_ms: 0,
        };

        let jobs = create_materialization_jobs(&[workload]);
        assert_eq!(jobs.len(), 1);
        // The rule's high-water mark is past the organization window start
        assert_eq!(jobs[0].window_start_date, utc("2024-08-01T00:00:00Z"));
    }

    #[test]
    fn test_window_end_extends_past_hot_horizon_for_late_ending_rules() {
        let now = Utc::now();
        let config = window_config(5, now);

        let far_end = now + Months::new(24);
        let rule = RecurrenceRule {
            recurrence_end_date: Some(far_end),
            ..RecurrenceRule::default()
        };
        let end = calculate_window_end_date_for_event(&rule, &config, now);
        assert_eq!(end, far_end + Duration::weeks(1));

        // An early-ending rule still gets the full hot window
        let near_rule = RecurrenceRule {
            recurrence_end_date: Some(now + Duration::days(10)),
            ..RecurrenceRule::default()
        };
        let end = calculate_window_end_date_for_event(&near_rule, &config, now);
        assert_eq!(end, now + Months::new(12));
    }

    #[test]
    fn test_duration_estimate_scales_with_events_and_instances() {
        let rule = RecurrenceRule {
            frequency: Frequency::Daily,
            count: Some(100),
            ..RecurrenceRule::default()
        };
        let events = vec![discovered_event(rule)];
        // 5000 base + 1000 per event + 10 per instance
        assert_eq!(estimate_workload_duration(&events), 5_000 + 1_000 + 1_000);
    }
}
