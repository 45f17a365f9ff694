use crate::error::CoreError;
use crate::models::{Event, NewEventData, RecurrenceInput, RecurrenceRule};
use crate::recurrence::{build_rrule_string, validate_recurrence_input};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

/// Fully resolved rule fields for insertion; built by callers that already
/// merged and validated their input.
#[derive(Debug, Clone)]
pub(crate) struct NewRuleRecord {
    pub id: Uuid,
    pub recurrence_rule_string: String,
    pub frequency: crate::models::Frequency,
    pub interval: i32,
    pub count: Option<i32>,
    pub recurrence_start_date: DateTime<Utc>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub latest_instance_date: DateTime<Utc>,
    pub by_day: Option<Vec<String>>,
    pub by_month: Option<Vec<i32>>,
    pub by_month_day: Option<Vec<i32>>,
    pub base_recurring_event_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    pub creator_id: Uuid,
}

impl NewRuleRecord {
    /// Derives the record from a validated recurrence input. The rule's end
    /// date comes from the input; a `never` input leaves it null.
    pub(crate) fn from_input(
        input: &RecurrenceInput,
        anchor_start: DateTime<Utc>,
        base_recurring_event_id: Uuid,
        original_series_id: Option<Uuid>,
        organization_id: Uuid,
        creator_id: Uuid,
    ) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            recurrence_rule_string: build_rrule_string(input, anchor_start),
            frequency: input.frequency,
            interval: input.interval.unwrap_or(1),
            count: input.count,
            recurrence_start_date: anchor_start,
            recurrence_end_date: input.end_date,
            latest_instance_date: anchor_start,
            by_day: input.by_day.clone(),
            by_month: input.by_month.clone(),
            by_month_day: input.by_month_day.clone(),
            base_recurring_event_id,
            // A rule without an inherited chain root roots its own chain
            original_series_id: original_series_id.unwrap_or(id),
            organization_id,
            creator_id,
        }
    }
}

#[async_trait]
impl super::RuleRepository for SqliteRepository {
    async fn create_recurring_event(
        &self,
        event: NewEventData,
        recurrence: RecurrenceInput,
    ) -> Result<(Event, RecurrenceRule), CoreError> {
        let validation = validate_recurrence_input(&recurrence, event.start_at);
        if !validation.is_valid {
            return Err(CoreError::InvalidArguments(validation.errors));
        }

        let mut tx = self.pool().begin().await?;

        let template = Self::create_event_in_transaction(
            &mut tx,
            NewEventData {
                is_recurring_template: true,
                ..event
            },
        )
        .await?;

        let record = NewRuleRecord::from_input(
            &recurrence,
            template.start_at,
            template.id,
            None,
            template.organization_id,
            template.creator_id,
        );
        let rule = Self::insert_rule_in_transaction(&mut tx, record).await?;

        tx.commit().await?;
        Ok((template, rule))
    }

    async fn find_rule_by_id(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError> {
        let rule = sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(rule)
    }

    async fn find_rule_for_event(
        &self,
        base_recurring_event_id: Uuid,
    ) -> Result<Option<RecurrenceRule>, CoreError> {
        let rule =
            sqlx::query_as("SELECT * FROM recurrence_rules WHERE base_recurring_event_id = $1")
                .bind(base_recurring_event_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(rule)
    }

    async fn find_rules_for_events(
        &self,
        event_ids: &[Uuid],
    ) -> Result<Vec<RecurrenceRule>, CoreError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM recurrence_rules WHERE base_recurring_event_id IN (");
        let mut separated = qb.separated(", ");
        for event_id in event_ids {
            separated.push_bind(*event_id);
        }
        qb.push(")");

        let rules: Vec<RecurrenceRule> = qb.build_query_as().fetch_all(self.pool()).await?;
        Ok(rules)
    }
}

impl SqliteRepository {
    /// Insert a recurrence rule within an existing transaction
    pub(crate) async fn insert_rule_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        record: NewRuleRecord,
    ) -> Result<RecurrenceRule, CoreError> {
        let rule = RecurrenceRule {
            id: record.id,
            recurrence_rule_string: record.recurrence_rule_string,
            frequency: record.frequency,
            interval: record.interval,
            count: record.count,
            recurrence_start_date: record.recurrence_start_date,
            recurrence_end_date: record.recurrence_end_date,
            latest_instance_date: record.latest_instance_date,
            by_day: record.by_day.map(Json),
            by_month: record.by_month.map(Json),
            by_month_day: record.by_month_day.map(Json),
            base_recurring_event_id: record.base_recurring_event_id,
            original_series_id: record.original_series_id,
            organization_id: record.organization_id,
            creator_id: record.creator_id,
            created_at: Utc::now(),
            updated_at: None,
        };

        sqlx::query(
            r#"INSERT INTO recurrence_rules (id, recurrence_rule_string, frequency, interval,
                count, recurrence_start_date, recurrence_end_date, latest_instance_date,
                by_day, by_month, by_month_day, base_recurring_event_id, original_series_id,
                organization_id, creator_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"#,
        )
        .bind(rule.id)
        .bind(&rule.recurrence_rule_string)
        .bind(&rule.frequency)
        .bind(rule.interval)
        .bind(rule.count)
        .bind(rule.recurrence_start_date)
        .bind(rule.recurrence_end_date)
        .bind(rule.latest_instance_date)
        .bind(&rule.by_day)
        .bind(&rule.by_month)
        .bind(&rule.by_month_day)
        .bind(rule.base_recurring_event_id)
        .bind(rule.original_series_id)
        .bind(rule.organization_id)
        .bind(rule.creator_id)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(rule)
    }

    /// Truncate a rule's end date within an existing transaction. Ending the
    /// rule before its own start is allowed: after a split the old rule may
    /// have no valid occurrences left.
    pub(crate) async fn truncate_rule_end_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule_id: Uuid,
        new_end_date: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE recurrence_rules SET recurrence_end_date = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(new_end_date)
        .bind(Utc::now())
        .bind(rule_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ResourceNotFound(format!(
                "Recurrence rule with id {rule_id} not found"
            )));
        }

        Ok(())
    }

    /// Advance a rule's generation high-water mark within an existing
    /// transaction.
    pub(crate) async fn advance_latest_instance_date_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule_id: Uuid,
        latest_instance_date: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE recurrence_rules SET latest_instance_date = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(latest_instance_date)
        .bind(Utc::now())
        .bind(rule_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
