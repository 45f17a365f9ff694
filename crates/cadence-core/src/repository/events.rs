use crate::error::CoreError;
use crate::models::{Event, NewEventData};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::EventRepository for SqliteRepository {
    async fn create_event(&self, data: NewEventData) -> Result<Event, CoreError> {
        let mut tx = self.pool().begin().await?;
        let event = Self::create_event_in_transaction(&mut tx, data).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError> {
        let event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(event)
    }

    async fn find_recurring_templates(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Event>, CoreError> {
        let events = sqlx::query_as(
            r#"SELECT * FROM events
            WHERE organization_id = $1 AND is_recurring_template = TRUE
            ORDER BY id"#,
        )
        .bind(organization_id)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }

    async fn count_recurring_templates(&self, organization_id: Uuid) -> Result<i64, CoreError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM events WHERE organization_id = $1 AND is_recurring_template = TRUE",
        )
        .bind(organization_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count.0)
    }
}

impl SqliteRepository {
    /// Create an event row within an existing transaction
    pub(crate) async fn create_event_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        data: NewEventData,
    ) -> Result<Event, CoreError> {
        let event = Event {
            id: Uuid::now_v7(),
            organization_id: data.organization_id,
            creator_id: data.creator_id,
            name: data.name,
            description: data.description,
            start_at: data.start_at,
            end_at: data.end_at,
            all_day: data.all_day,
            is_public: data.is_public,
            is_registerable: data.is_registerable,
            is_invite_only: data.is_invite_only,
            location: data.location,
            is_recurring_template: data.is_recurring_template,
            created_at: Utc::now(),
            updated_at: None,
        };

        sqlx::query(
            r#"INSERT INTO events (id, organization_id, creator_id, name, description, start_at,
                end_at, all_day, is_public, is_registerable, is_invite_only, location,
                is_recurring_template, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(event.id)
        .bind(event.organization_id)
        .bind(event.creator_id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.all_day)
        .bind(event.is_public)
        .bind(event.is_registerable)
        .bind(event.is_invite_only)
        .bind(&event.location)
        .bind(event.is_recurring_template)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(event)
    }

    /// Merge the non-null fields of an update over an event row within an
    /// existing transaction.
    pub(crate) async fn update_event_fields_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        event: &Event,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE events SET name = $1, description = $2, start_at = $3, end_at = $4,
                all_day = $5, is_public = $6, is_registerable = $7, is_invite_only = $8,
                location = $9, updated_at = $10
            WHERE id = $11"#,
        )
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.all_day)
        .bind(event.is_public)
        .bind(event.is_registerable)
        .bind(event.is_invite_only)
        .bind(&event.location)
        .bind(Utc::now())
        .bind(event.id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
