use crate::error::CoreError;
use crate::models::{ActionItem, RecurringEventInstance};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::InstanceRepository for SqliteRepository {
    async fn find_instance_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<RecurringEventInstance>, CoreError> {
        let instance = sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(instance)
    }

    async fn find_instances_for_event(
        &self,
        base_recurring_event_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RecurringEventInstance>, CoreError> {
        let instances = sqlx::query_as(
            r#"SELECT * FROM recurring_event_instances
            WHERE base_recurring_event_id = $1
            AND actual_start_time BETWEEN $2 AND $3
            ORDER BY actual_start_time"#,
        )
        .bind(base_recurring_event_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        Ok(instances)
    }

    async fn count_instances_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<i64, CoreError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recurring_event_instances WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count.0)
    }

    async fn mark_instance_cancelled(
        &self,
        id: Uuid,
    ) -> Result<RecurringEventInstance, CoreError> {
        let result = sqlx::query(
            r#"UPDATE recurring_event_instances
            SET is_cancelled = TRUE, last_updated_at = $1, version = version + 1
            WHERE id = $2"#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ResourceNotFound(format!(
                "Recurring event instance with id {id} not found"
            )));
        }

        let instance = sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(instance)
    }

    async fn create_action_item(
        &self,
        recurring_event_instance_id: Uuid,
        organization_id: Uuid,
        assignee_id: Option<Uuid>,
    ) -> Result<ActionItem, CoreError> {
        let action_item = ActionItem {
            id: Uuid::now_v7(),
            recurring_event_instance_id,
            organization_id,
            assignee_id,
            is_completed: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO action_items (id, recurring_event_instance_id, organization_id,
                assignee_id, is_completed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(action_item.id)
        .bind(action_item.recurring_event_instance_id)
        .bind(action_item.organization_id)
        .bind(action_item.assignee_id)
        .bind(action_item.is_completed)
        .bind(action_item.created_at)
        .execute(self.pool())
        .await?;

        Ok(action_item)
    }

    async fn count_action_items_for_instance(
        &self,
        recurring_event_instance_id: Uuid,
    ) -> Result<i64, CoreError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM action_items WHERE recurring_event_instance_id = $1",
        )
        .bind(recurring_event_instance_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count.0)
    }

    async fn delete_instances_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"DELETE FROM action_items WHERE recurring_event_instance_id IN (
                SELECT id FROM recurring_event_instances
                WHERE organization_id = $1 AND actual_start_time < $2
            )"#,
        )
        .bind(organization_id)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM recurring_event_instances WHERE organization_id = $1 AND actual_start_time < $2",
        )
        .bind(organization_id)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

impl SqliteRepository {
    /// Delete every instance of a series at or after the split instant,
    /// together with dependent action items, within an existing transaction.
    pub(crate) async fn delete_instances_from_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        base_recurring_event_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        sqlx::query(
            r#"DELETE FROM action_items WHERE recurring_event_instance_id IN (
                SELECT id FROM recurring_event_instances
                WHERE base_recurring_event_id = $1 AND actual_start_time >= $2
            )"#,
        )
        .bind(base_recurring_event_id)
        .bind(from)
        .execute(&mut **tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM recurring_event_instances WHERE base_recurring_event_id = $1 AND actual_start_time >= $2",
        )
        .bind(base_recurring_event_id)
        .bind(from)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Instances of a series at or after an instant, within an existing
    /// transaction.
    pub(crate) async fn find_instances_from_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        base_recurring_event_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<RecurringEventInstance>, CoreError> {
        let instances = sqlx::query_as(
            r#"SELECT * FROM recurring_event_instances
            WHERE base_recurring_event_id = $1 AND actual_start_time >= $2
            ORDER BY actual_start_time"#,
        )
        .bind(base_recurring_event_id)
        .bind(from)
        .fetch_all(&mut **tx)
        .await?;
        Ok(instances)
    }

    /// Earliest instance of a series, within an existing transaction.
    pub(crate) async fn find_first_instance_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        base_recurring_event_id: Uuid,
    ) -> Result<Option<RecurringEventInstance>, CoreError> {
        let instance = sqlx::query_as(
            r#"SELECT * FROM recurring_event_instances
            WHERE base_recurring_event_id = $1
            ORDER BY actual_start_time
            LIMIT 1"#,
        )
        .bind(base_recurring_event_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(instance)
    }

    /// Rewrite one instance's actual times within an existing transaction.
    pub(crate) async fn shift_instance_times_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        instance_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE recurring_event_instances
            SET actual_start_time = $1, actual_end_time = $2, last_updated_at = $3,
                version = version + 1
            WHERE id = $4"#,
        )
        .bind(new_start)
        .bind(new_end)
        .bind(Utc::now())
        .bind(instance_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Touch the bookkeeping columns of every future instance of a series
    /// within an existing transaction.
    pub(crate) async fn touch_instances_from_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        base_recurring_event_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE recurring_event_instances
            SET last_updated_at = $1
            WHERE base_recurring_event_id = $2 AND actual_start_time >= $3"#,
        )
        .bind(Utc::now())
        .bind(base_recurring_event_id)
        .bind(from)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
