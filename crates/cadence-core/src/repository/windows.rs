use crate::error::CoreError;
use crate::models::EventGenerationWindow;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

const DEFAULT_HOT_WINDOW_MONTHS_AHEAD: i32 = 12;
const DEFAULT_HISTORY_RETENTION_MONTHS: i32 = 3;
const DEFAULT_PROCESSING_PRIORITY: i32 = 5;
const DEFAULT_MAX_INSTANCES_PER_RUN: i32 = 1000;

#[async_trait]
impl super::WindowRepository for SqliteRepository {
    async fn initialize_generation_window(
        &self,
        organization_id: Uuid,
        created_by_id: Option<Uuid>,
    ) -> Result<EventGenerationWindow, CoreError> {
        let mut tx = self.pool().begin().await?;
        let window =
            Self::initialize_generation_window_in_transaction(&mut tx, organization_id, created_by_id)
                .await?;
        tx.commit().await?;
        Ok(window)
    }

    async fn find_window_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<EventGenerationWindow>, CoreError> {
        let window = sqlx::query_as("SELECT * FROM event_generation_windows WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(window)
    }

    async fn find_window_by_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<EventGenerationWindow>, CoreError> {
        let window =
            sqlx::query_as("SELECT * FROM event_generation_windows WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(window)
    }

    async fn list_windows(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<EventGenerationWindow>, CoreError> {
        let query = if enabled_only {
            "SELECT * FROM event_generation_windows WHERE is_enabled = TRUE ORDER BY organization_id"
        } else {
            "SELECT * FROM event_generation_windows ORDER BY organization_id"
        };
        let windows = sqlx::query_as(query).fetch_all(self.pool()).await?;
        Ok(windows)
    }

    async fn find_windows_needing_processing(
        &self,
        due_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventGenerationWindow>, CoreError> {
        let windows = sqlx::query_as(
            r#"SELECT * FROM event_generation_windows
            WHERE is_enabled = TRUE
            AND (current_window_end_date < $1
                 OR last_processed_at IS NULL
                 OR last_processed_at < $2)
            ORDER BY processing_priority
            LIMIT $3"#,
        )
        .bind(due_before)
        .bind(stale_before)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(windows)
    }

    async fn update_window_after_run(
        &self,
        window_id: Uuid,
        new_window_end: DateTime<Utc>,
        processed_at: DateTime<Utc>,
        instance_count: i64,
        notes: String,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"UPDATE event_generation_windows
            SET current_window_end_date = $1, last_processed_at = $2,
                last_processed_instance_count = $3, configuration_notes = $4, updated_at = $5
            WHERE id = $6"#,
        )
        .bind(new_window_end)
        .bind(processed_at)
        .bind(instance_count)
        .bind(&notes)
        .bind(Utc::now())
        .bind(window_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ResourceNotFound(format!(
                "Generation window with id {window_id} not found"
            )));
        }

        Ok(())
    }

    async fn update_retention_start(
        &self,
        window_id: Uuid,
        retention_start: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE event_generation_windows SET retention_start_date = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(retention_start)
        .bind(Utc::now())
        .bind(window_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ResourceNotFound(format!(
                "Generation window with id {window_id} not found"
            )));
        }

        Ok(())
    }
}

impl SqliteRepository {
    /// Find a window row within an existing transaction.
    pub(crate) async fn find_window_by_organization_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        organization_id: Uuid,
    ) -> Result<Option<EventGenerationWindow>, CoreError> {
        let window =
            sqlx::query_as("SELECT * FROM event_generation_windows WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(window)
    }

    /// Create the lazily initialized window row for an organization within
    /// an existing transaction. The window starts at now so the first run
    /// fills the full hot horizon.
    pub(crate) async fn initialize_generation_window_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        organization_id: Uuid,
        created_by_id: Option<Uuid>,
    ) -> Result<EventGenerationWindow, CoreError> {
        let now = Utc::now();
        let window = EventGenerationWindow {
            id: Uuid::now_v7(),
            organization_id,
            hot_window_months_ahead: DEFAULT_HOT_WINDOW_MONTHS_AHEAD,
            history_retention_months: DEFAULT_HISTORY_RETENTION_MONTHS,
            current_window_end_date: now,
            retention_start_date: now - Months::new(DEFAULT_HISTORY_RETENTION_MONTHS as u32),
            processing_priority: DEFAULT_PROCESSING_PRIORITY,
            is_enabled: true,
            last_processed_at: None,
            last_processed_instance_count: 0,
            max_instances_per_run: DEFAULT_MAX_INSTANCES_PER_RUN,
            configuration_notes: None,
            created_by_id,
            created_at: now,
            updated_at: None,
        };

        sqlx::query(
            r#"INSERT INTO event_generation_windows (id, organization_id, hot_window_months_ahead,
                history_retention_months, current_window_end_date, retention_start_date,
                processing_priority, is_enabled, last_processed_at, last_processed_instance_count,
                max_instances_per_run, configuration_notes, created_by_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(window.id)
        .bind(window.organization_id)
        .bind(window.hot_window_months_ahead)
        .bind(window.history_retention_months)
        .bind(window.current_window_end_date)
        .bind(window.retention_start_date)
        .bind(window.processing_priority)
        .bind(window.is_enabled)
        .bind(window.last_processed_at)
        .bind(window.last_processed_instance_count)
        .bind(window.max_instances_per_run)
        .bind(&window.configuration_notes)
        .bind(window.created_by_id)
        .bind(window.created_at)
        .bind(window.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(window)
    }

    /// Test and ops tooling helper: rewrite the tunable columns of a window
    /// row directly.
    pub async fn configure_window(
        &self,
        window_id: Uuid,
        hot_window_months_ahead: i32,
        history_retention_months: i32,
        processing_priority: i32,
        is_enabled: bool,
        current_window_end_date: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"UPDATE event_generation_windows
            SET hot_window_months_ahead = $1, history_retention_months = $2,
                processing_priority = $3, is_enabled = $4, current_window_end_date = $5,
                updated_at = $6
            WHERE id = $7"#,
        )
        .bind(hot_window_months_ahead)
        .bind(history_retention_months)
        .bind(processing_priority)
        .bind(is_enabled)
        .bind(current_window_end_date)
        .bind(Utc::now())
        .bind(window_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ResourceNotFound(format!(
                "Generation window with id {window_id} not found"
            )));
        }

        Ok(())
    }
}
