use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Administrator,
    Regular,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid user role: {0}")]
pub struct ParseUserRoleError(String);

impl FromStr for UserRole {
    type Err = ParseUserRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "administrator" => Ok(UserRole::Administrator),
            "regular" => Ok(UserRole::Regular),
            _ => Err(ParseUserRoleError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganizationMembership {
    pub organization_id: Uuid,
    pub member_id: Uuid,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// An event row. Recurring series are anchored by a template event
/// (`is_recurring_template = true`) that is never shown directly; concrete
/// occurrences live in [`RecurringEventInstance`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub location: Option<String>,
    pub is_recurring_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "DAILY"),
            Frequency::Weekly => write!(f, "WEEKLY"),
            Frequency::Monthly => write!(f, "MONTHLY"),
            Frequency::Yearly => write!(f, "YEARLY"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

/// Classification of a rule by how its series ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceKind {
    NeverEnding,
    CountBased,
    EndDateBased,
    Hybrid,
}

/// A declarative recurrence rule owned by a template event.
///
/// `latest_instance_date` is the high-water mark of generation progress and
/// is only advanced by materialization. `original_series_id` is the root of
/// a split chain; a rule created by a split roots a new chain with its own
/// id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurrenceRule {
    #[serde(with = "uuid::serde::compact")]
    pub id: Uuid,
    /// Canonical serialization, e.g. `RRULE:FREQ=WEEKLY;BYDAY=MO`
    pub recurrence_rule_string: String,
    pub frequency: Frequency,
    pub interval: i32,
    pub count: Option<i32>,
    pub recurrence_start_date: DateTime<Utc>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub latest_instance_date: DateTime<Utc>,
    pub by_day: Option<Json<Vec<String>>>,
    pub by_month: Option<Json<Vec<i32>>>,
    pub by_month_day: Option<Json<Vec<i32>>>,
    #[serde(with = "uuid::serde::compact")]
    pub base_recurring_event_id: Uuid,
    #[serde(with = "uuid::serde::compact")]
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecurrenceRule {
    fn has_count(&self) -> bool {
        self.count.map_or(false, |c| c > 0)
    }

    /// Neither a count nor an end date: the series only ends when its
    /// organization disables generation.
    pub fn is_never_ending(&self) -> bool {
        !self.has_count() && self.recurrence_end_date.is_none()
    }

    pub fn is_count_based(&self) -> bool {
        self.has_count() && self.recurrence_end_date.is_none()
    }

    pub fn is_end_date_based(&self) -> bool {
        self.recurrence_end_date.is_some()
    }

    pub fn kind(&self) -> RecurrenceKind {
        match (self.has_count(), self.recurrence_end_date.is_some()) {
            (false, false) => RecurrenceKind::NeverEnding,
            (true, false) => RecurrenceKind::CountBased,
            (false, true) => RecurrenceKind::EndDateBased,
            (true, true) => RecurrenceKind::Hybrid,
        }
    }
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            recurrence_rule_string: "RRULE:FREQ=DAILY".to_string(),
            frequency: Frequency::Daily,
            interval: 1,
            count: None,
            recurrence_start_date: Utc::now(),
            recurrence_end_date: None,
            latest_instance_date: Utc::now(),
            by_day: None,
            by_month: None,
            by_month_day: None,
            base_recurring_event_id: Uuid::now_v7(),
            original_series_id: id,
            organization_id: Uuid::now_v7(),
            creator_id: Uuid::now_v7(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// A single materialized occurrence of a recurring series.
///
/// `original_instance_start_time` is the time predicted by the rule and is
/// the dedup key together with `base_recurring_event_id`; the actual times
/// may diverge after per-instance edits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurringEventInstance {
    pub id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub recurrence_rule_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    pub original_instance_start_time: DateTime<Utc>,
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    pub is_cancelled: bool,
    pub sequence_number: i32,
    /// Null for never-ending series
    pub total_count: Option<i32>,
    pub generated_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Per-organization generation window bookkeeping; one row per organization,
/// created lazily on first materialization need.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventGenerationWindow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub hot_window_months_ahead: i32,
    pub history_retention_months: i32,
    pub current_window_end_date: DateTime<Utc>,
    pub retention_start_date: DateTime<Utc>,
    pub processing_priority: i32,
    pub is_enabled: bool,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_processed_instance_count: i32,
    pub max_instances_per_run: i32,
    pub configuration_notes: Option<String>,
    pub created_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A work item attached to one materialized instance; deleted in cascade
/// when a split removes the instance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionItem {
    pub id: Uuid,
    pub recurring_event_instance_id: Uuid,
    pub organization_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Data Transfer Objects
// ============================================================================

/// Structured recurrence description consumed by the codec. `never` is an
/// explicit marker for a series without a count or an end date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurrenceInput {
    pub frequency: Frequency,
    pub interval: Option<i32>,
    pub end_date: Option<DateTime<Utc>>,
    pub count: Option<i32>,
    pub never: bool,
    pub by_day: Option<Vec<String>>,
    pub by_month: Option<Vec<i32>>,
    pub by_month_day: Option<Vec<i32>>,
}

impl Default for RecurrenceInput {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            interval: None,
            end_date: None,
            count: None,
            never: false,
            by_day: None,
            by_month: None,
            by_month_day: None,
        }
    }
}

/// Result value of recurrence validation. Validation never fails as an
/// error; every violated rule is collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecurrenceValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Data for creating an event row.
#[derive(Debug, Clone)]
pub struct NewEventData {
    pub organization_id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub location: Option<String>,
    pub is_recurring_template: bool,
}

/// Edit request for the current instance and everything after it. `None`
/// fields inherit the template; there is no way to clear a field to null
/// through this input.
#[derive(Debug, Clone, Default)]
pub struct UpdateThisAndFollowingEventsInput {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub is_public: Option<bool>,
    pub is_invite_only: Option<bool>,
    pub is_registerable: Option<bool>,
    pub all_day: Option<bool>,
    pub location: Option<String>,
    pub recurrence: Option<RecurrenceInput>,
}

/// Event-shaped view returned across the transport boundary: one instance
/// merged with its template's fields.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    pub id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub recurrence_rule_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub location: Option<String>,
    pub is_cancelled: bool,
    pub sequence_number: i32,
    pub total_count: Option<i32>,
    pub original_instance_start_time: DateTime<Utc>,
}

impl EventView {
    pub fn from_instance_and_template(
        instance: &RecurringEventInstance,
        template: &Event,
    ) -> Self {
        Self {
            id: instance.id,
            base_recurring_event_id: instance.base_recurring_event_id,
            recurrence_rule_id: instance.recurrence_rule_id,
            original_series_id: instance.original_series_id,
            organization_id: instance.organization_id,
            creator_id: template.creator_id,
            name: template.name.clone(),
            description: template.description.clone(),
            start_at: instance.actual_start_time,
            end_at: instance.actual_end_time,
            all_day: template.all_day,
            is_public: template.is_public,
            is_registerable: template.is_registerable,
            is_invite_only: template.is_invite_only,
            location: template.location.clone(),
            is_cancelled: instance.is_cancelled,
            sequence_number: instance.sequence_number,
            total_count: instance.total_count,
            original_instance_start_time: instance.original_instance_start_time,
        }
    }
}

/// One unit of executable generation work, always scoped to a single
/// (organization, base event) pair so concurrent jobs never touch the same
/// instance rows.
#[derive(Debug, Clone)]
pub struct MaterializationJob {
    pub organization_id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub window_start_date: DateTime<Utc>,
    pub window_end_date: DateTime<Utc>,
}

/// A recurring event surfaced by discovery together with its rule.
#[derive(Debug, Clone)]
pub struct DiscoveredRecurringEvent {
    pub event_id: Uuid,
    pub event_name: String,
    pub rule_id: Uuid,
    pub is_never_ending: bool,
    pub estimated_instances: i64,
    pub recurrence_rule: RecurrenceRule,
}

/// An organization's pending generation work, ranked by computed priority.
#[derive(Debug, Clone)]
pub struct DiscoveredWorkload {
    pub organization_id: Uuid,
    pub window_config: EventGenerationWindow,
    pub recurring_events: Vec<DiscoveredRecurringEvent>,
    pub priority: f64,
    pub estimated_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_round_trip() {
        for (s, f) in [
            ("DAILY", Frequency::Daily),
            ("WEEKLY", Frequency::Weekly),
            ("MONTHLY", Frequency::Monthly),
            ("YEARLY", Frequency::Yearly),
        ] {
            assert_eq!(s.parse::<Frequency>().unwrap(), f);
            assert_eq!(f.to_string(), s);
        }
        assert!("HOURLY".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_recurrence_kind_classification() {
        let rule = RecurrenceRule::default();
        assert!(rule.is_never_ending());
        assert_eq!(rule.kind(), RecurrenceKind::NeverEnding);

        let counted = RecurrenceRule {
            count: Some(10),
            ..RecurrenceRule::default()
        };
        assert!(counted.is_count_based());
        assert_eq!(counted.kind(), RecurrenceKind::CountBased);

        let ended = RecurrenceRule {
            recurrence_end_date: Some(Utc::now()),
            ..RecurrenceRule::default()
        };
        assert!(ended.is_end_date_based());
        assert_eq!(ended.kind(), RecurrenceKind::EndDateBased);

        let hybrid = RecurrenceRule {
            count: Some(10),
            recurrence_end_date: Some(Utc::now()),
            ..RecurrenceRule::default()
        };
        assert!(!hybrid.is_count_based());
        assert!(hybrid.is_end_date_based());
        assert_eq!(hybrid.kind(), RecurrenceKind::Hybrid);
    }

    #[test]
    fn test_zero_count_is_treated_as_absent() {
        let rule = RecurrenceRule {
            count: Some(0),
            ..RecurrenceRule::default()
        };
        assert!(rule.is_never_ending());
        assert_eq!(rule.kind(), RecurrenceKind::NeverEnding);
    }
}
