use crate::error::CoreError;
use crate::models::{Event, MaterializationJob, RecurrenceRule, RecurringEventInstance};
use crate::occurrence::expand_occurrences;
use crate::repository::SqliteRepository;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;
use tracing::{debug, error};
use uuid::Uuid;

impl SqliteRepository {
    /// Materialize one job's window: expand the rule and insert every
    /// occurrence that does not already exist. Returns the number of
    /// instances created.
    pub async fn materialize_event_window(
        &self,
        job: &MaterializationJob,
        max_instances: usize,
    ) -> Result<u64, CoreError> {
        let mut tx = self.pool().begin().await?;
        let created =
            Self::materialize_event_window_in_transaction(&mut tx, job, max_instances).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Materialize one job's window within an existing transaction.
    ///
    /// Insertion is idempotent on `(base_recurring_event_id,
    /// original_instance_start_time)`: occurrences that already have an
    /// instance row are left untouched, so re-running over an already
    /// processed range creates nothing.
    pub(crate) async fn materialize_event_window_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        job: &MaterializationJob,
        max_instances: usize,
    ) -> Result<u64, CoreError> {
        let rule: RecurrenceRule =
            sqlx::query_as("SELECT * FROM recurrence_rules WHERE base_recurring_event_id = $1")
                .bind(job.base_recurring_event_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| {
                    CoreError::ResourceNotFound(format!(
                        "Recurrence rule for event {} not found",
                        job.base_recurring_event_id
                    ))
                })?;

        let template: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(job.base_recurring_event_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| {
                error!(
                    base_recurring_event_id = %job.base_recurring_event_id,
                    rule_id = %rule.id,
                    "recurrence rule references a missing template event"
                );
                CoreError::Unexpected(format!(
                    "Template event {} referenced by rule {} is missing",
                    job.base_recurring_event_id, rule.id
                ))
            })?;

        let occurrences = expand_occurrences(
            &rule,
            &template,
            job.window_start_date,
            job.window_end_date,
            max_instances,
        )?;

        let existing: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"SELECT original_instance_start_time FROM recurring_event_instances
            WHERE base_recurring_event_id = $1
            AND original_instance_start_time BETWEEN $2 AND $3"#,
        )
        .bind(job.base_recurring_event_id)
        .bind(job.window_start_date)
        .bind(job.window_end_date)
        .fetch_all(&mut **tx)
        .await?;
        let existing_start_times: HashSet<DateTime<Utc>> =
            existing.into_iter().map(|row| row.0).collect();

        let mut created: u64 = 0;
        let mut high_water_mark: Option<DateTime<Utc>> = None;

        for occurrence in occurrences {
            if existing_start_times.contains(&occurrence.original_start_time) {
                continue; // Already materialized
            }

            let instance = RecurringEventInstance {
                id: Uuid::now_v7(),
                base_recurring_event_id: job.base_recurring_event_id,
                recurrence_rule_id: rule.id,
                original_series_id: rule.original_series_id,
                organization_id: job.organization_id,
                original_instance_start_time: occurrence.original_start_time,
                actual_start_time: occurrence.actual_start_time,
                actual_end_time: occurrence.actual_end_time,
                is_cancelled: false,
                sequence_number: occurrence.sequence_number,
                total_count: occurrence.total_count,
                generated_at: Utc::now(),
                last_updated_at: None,
                version: 1,
            };

            sqlx::query(
                r#"INSERT INTO recurring_event_instances (id, base_recurring_event_id,
                    recurrence_rule_id, original_series_id, organization_id,
                    original_instance_start_time, actual_start_time, actual_end_time,
                    is_cancelled, sequence_number, total_count, generated_at,
                    last_updated_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
            )
            .bind(instance.id)
            .bind(instance.base_recurring_event_id)
            .bind(instance.recurrence_rule_id)
            .bind(instance.original_series_id)
            .bind(instance.organization_id)
            .bind(instance.original_instance_start_time)
            .bind(instance.actual_start_time)
            .bind(instance.actual_end_time)
            .bind(instance.is_cancelled)
            .bind(instance.sequence_number)
            .bind(instance.total_count)
            .bind(instance.generated_at)
            .bind(instance.last_updated_at)
            .bind(instance.version)
            .execute(&mut **tx)
            .await?;

            created += 1;
            high_water_mark = Some(match high_water_mark {
                Some(mark) => mark.max(occurrence.original_start_time),
                None => occurrence.original_start_time,
            });

            if created as usize >= max_instances {
                break;
            }
        }

        if let Some(mark) = high_water_mark {
            Self::advance_latest_instance_date_in_transaction(tx, rule.id, mark).await?;
        }

        debug!(
            base_recurring_event_id = %job.base_recurring_event_id,
            window_start = %job.window_start_date,
            window_end = %job.window_end_date,
            created,
            "materialized event window"
        );

        Ok(created)
    }
}
