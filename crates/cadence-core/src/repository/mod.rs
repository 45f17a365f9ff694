use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    ActionItem, Event, EventGenerationWindow, NewEventData, Organization,
    OrganizationMembership, RecurrenceInput, RecurrenceRule, RecurringEventInstance, User,
    UserRole,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// Re-export domain modules
pub mod events;
pub mod instances;
pub mod materialization;
pub mod organizations;
pub mod rules;
pub mod windows;

/// Domain-specific trait for organization, user, and membership lookups.
/// The engine only needs these to resolve authorization and ownership.
#[async_trait]
pub trait OrganizationRepository {
    async fn create_organization(&self, name: String) -> Result<Organization, CoreError>;
    async fn find_organization_by_id(&self, id: Uuid) -> Result<Option<Organization>, CoreError>;
    async fn create_user(&self, name: String, role: UserRole) -> Result<User, CoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, CoreError>;
    async fn add_membership(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
        role: UserRole,
    ) -> Result<OrganizationMembership, CoreError>;
    async fn find_membership(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<OrganizationMembership>, CoreError>;
}

/// Domain-specific trait for event rows.
#[async_trait]
pub trait EventRepository {
    async fn create_event(&self, data: NewEventData) -> Result<Event, CoreError>;
    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError>;
    /// Recurring template events for one organization, in stable id order.
    async fn find_recurring_templates(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Event>, CoreError>;
    async fn count_recurring_templates(&self, organization_id: Uuid) -> Result<i64, CoreError>;
}

/// Domain-specific trait for recurrence rules.
#[async_trait]
pub trait RuleRepository {
    /// Creates a recurring series: the template event plus its rule, in one
    /// transaction. The rule roots its own split chain.
    async fn create_recurring_event(
        &self,
        event: NewEventData,
        recurrence: RecurrenceInput,
    ) -> Result<(Event, RecurrenceRule), CoreError>;
    async fn find_rule_by_id(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError>;
    async fn find_rule_for_event(
        &self,
        base_recurring_event_id: Uuid,
    ) -> Result<Option<RecurrenceRule>, CoreError>;
    async fn find_rules_for_events(
        &self,
        event_ids: &[Uuid],
    ) -> Result<Vec<RecurrenceRule>, CoreError>;
}

/// Domain-specific trait for materialized instances and their action items.
#[async_trait]
pub trait InstanceRepository {
    async fn find_instance_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<RecurringEventInstance>, CoreError>;
    async fn find_instances_for_event(
        &self,
        base_recurring_event_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RecurringEventInstance>, CoreError>;
    async fn count_instances_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<i64, CoreError>;
    async fn mark_instance_cancelled(
        &self,
        id: Uuid,
    ) -> Result<RecurringEventInstance, CoreError>;
    async fn create_action_item(
        &self,
        recurring_event_instance_id: Uuid,
        organization_id: Uuid,
        assignee_id: Option<Uuid>,
    ) -> Result<ActionItem, CoreError>;
    async fn count_action_items_for_instance(
        &self,
        recurring_event_instance_id: Uuid,
    ) -> Result<i64, CoreError>;
    /// Retention cleanup: removes instances starting before the cutoff.
    async fn delete_instances_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CoreError>;
}

/// Domain-specific trait for per-organization generation windows.
#[async_trait]
pub trait WindowRepository {
    async fn initialize_generation_window(
        &self,
        organization_id: Uuid,
        created_by_id: Option<Uuid>,
    ) -> Result<EventGenerationWindow, CoreError>;
    async fn find_window_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<EventGenerationWindow>, CoreError>;
    async fn find_window_by_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<EventGenerationWindow>, CoreError>;
    async fn list_windows(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<EventGenerationWindow>, CoreError>;
    /// Enabled windows that are due (`current_window_end_date < due_before`)
    /// or stale (never processed, or `last_processed_at < stale_before`),
    /// in ascending stored priority order, capped at `limit`.
    async fn find_windows_needing_processing(
        &self,
        due_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventGenerationWindow>, CoreError>;
    async fn update_window_after_run(
        &self,
        window_id: Uuid,
        new_window_end: DateTime<Utc>,
        processed_at: DateTime<Utc>,
        instance_count: i64,
        notes: String,
    ) -> Result<(), CoreError>;
    async fn update_retention_start(
        &self,
        window_id: Uuid,
        retention_start: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository:
    OrganizationRepository + EventRepository + RuleRepository + InstanceRepository + WindowRepository
{
}

/// SQLite implementation of the repository pattern. Cloning is cheap: the
/// pool is internally reference counted, which is what lets the execution
/// engine hand one repository to each spawned job.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Repository for SqliteRepository {}
