//! Series splitter: "update this and all following occurrences".
//!
//! A recurrence change splits the series at the target instance: the old
//! rule is truncated just before the split instant and a new template plus
//! rule carry the future forward. Metadata or timing changes without a
//! recurrence change are applied in place to the existing template and its
//! future instances.
//!
//! All writes of one request happen inside a single transaction; dropping
//! the transaction on any error path rolls everything back, so no partial
//! split is ever observable.

use chrono::{Duration, Months, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    Event, EventView, MaterializationJob, NewEventData, RecurrenceRule,
    RecurringEventInstance, UpdateThisAndFollowingEventsInput, UserRole,
};
use crate::recurrence::{apply_recurrence_overrides, validate_recurrence_input};
use crate::repository::rules::NewRuleRecord;
use crate::repository::{
    EventRepository, InstanceRepository, OrganizationRepository, RuleRepository,
    SqliteRepository,
};

/// Applies an edit to the target instance and everything after it.
///
/// Validation and authorization run before any mutation. The returned value
/// is the (possibly newly generated) instance at the edit point merged with
/// its template, shaped like a public event.
pub async fn update_this_and_following(
    input: UpdateThisAndFollowingEventsInput,
    actor_id: Uuid,
    repo: &SqliteRepository,
) -> Result<EventView, CoreError> {
    let instance = repo
        .find_instance_by_id(input.id)
        .await?
        .ok_or_else(|| {
            CoreError::ResourceNotFound(format!(
                "Recurring event instance with id {} not found",
                input.id
            ))
        })?;

    if instance.is_cancelled {
        return Err(CoreError::invalid_arguments(
            "Cannot update a cancelled recurring event instance.",
        ));
    }

    let template = repo
        .find_event_by_id(instance.base_recurring_event_id)
        .await?
        .ok_or_else(|| {
            error!(
                instance_id = %instance.id,
                base_recurring_event_id = %instance.base_recurring_event_id,
                "instance references a missing template event"
            );
            CoreError::Unexpected(format!(
                "Template event {} referenced by instance {} is missing",
                instance.base_recurring_event_id, instance.id
            ))
        })?;

    let rule = repo
        .find_rule_by_id(instance.recurrence_rule_id)
        .await?
        .ok_or_else(|| {
            error!(
                instance_id = %instance.id,
                recurrence_rule_id = %instance.recurrence_rule_id,
                "instance references a missing recurrence rule"
            );
            CoreError::Unexpected(format!(
                "Recurrence rule {} referenced by instance {} is missing",
                instance.recurrence_rule_id, instance.id
            ))
        })?;

    authorize_series_edit(&template, actor_id, repo).await?;

    let merged_is_public = input.is_public.unwrap_or(template.is_public);
    let merged_is_invite_only = input.is_invite_only.unwrap_or(template.is_invite_only);
    if merged_is_public && merged_is_invite_only {
        return Err(CoreError::invalid_arguments(
            "An event cannot be public and invite-only at the same time.",
        ));
    }

    // Only a recurrence change needs the split; timing and metadata changes
    // apply to the existing template
    if input.recurrence.is_some() {
        split_series(input, instance, template, rule, actor_id, repo).await
    } else {
        update_without_split(input, instance, template, repo).await
    }
}

/// Caller must be a platform administrator, an administrator of the
/// template's organization, or the template's creator.
async fn authorize_series_edit(
    template: &Event,
    actor_id: Uuid,
    repo: &SqliteRepository,
) -> Result<(), CoreError> {
    let actor = repo
        .find_user_by_id(actor_id)
        .await?
        .ok_or_else(|| CoreError::Unauthorized("Acting user does not exist".to_string()))?;

    if actor.role == UserRole::Administrator {
        return Ok(());
    }
    if template.creator_id == actor_id {
        return Ok(());
    }
    let membership = repo
        .find_membership(template.organization_id, actor_id)
        .await?;
    if membership.map_or(false, |m| m.role == UserRole::Administrator) {
        return Ok(());
    }

    Err(CoreError::Unauthorized(
        "Only administrators or the event creator may update this and following instances"
            .to_string(),
    ))
}

/// Metadata and timing edits without a recurrence change: the template is
/// rewritten in place and every future instance is shifted by the timing
/// deltas.
async fn update_without_split(
    input: UpdateThisAndFollowingEventsInput,
    instance: RecurringEventInstance,
    template: Event,
    repo: &SqliteRepository,
) -> Result<EventView, CoreError> {
    let mut tx = repo.pool().begin().await?;

    let mut updated = template.clone();
    if let Some(name) = input.name {
        updated.name = name;
    }
    if let Some(description) = input.description {
        updated.description = Some(description);
    }
    if let Some(location) = input.location {
        updated.location = Some(location);
    }
    if let Some(all_day) = input.all_day {
        updated.all_day = all_day;
    }
    if let Some(is_public) = input.is_public {
        updated.is_public = is_public;
    }
    if let Some(is_registerable) = input.is_registerable {
        updated.is_registerable = is_registerable;
    }
    if let Some(is_invite_only) = input.is_invite_only {
        updated.is_invite_only = is_invite_only;
    }

    if input.start_at.is_some() || input.end_at.is_some() {
        let original_duration = template.end_at - template.start_at;
        let new_start = input.start_at.unwrap_or(template.start_at);
        let new_end = input.end_at.unwrap_or(new_start + original_duration);
        let start_delta = new_start - template.start_at;
        let end_delta = new_end - template.end_at;

        updated.start_at = new_start;
        updated.end_at = new_end;

        let future_instances = SqliteRepository::find_instances_from_in_transaction(
            &mut tx,
            instance.base_recurring_event_id,
            instance.actual_start_time,
        )
        .await?;

        for future in &future_instances {
            SqliteRepository::shift_instance_times_in_transaction(
                &mut tx,
                future.id,
                future.actual_start_time + start_delta,
                future.actual_end_time + end_delta,
            )
            .await?;
        }

        info!(
            base_recurring_event_id = %instance.base_recurring_event_id,
            future_instances = future_instances.len(),
            start_delta_ms = start_delta.num_milliseconds(),
            end_delta_ms = end_delta.num_milliseconds(),
            "shifted timing for future instances"
        );
    } else {
        SqliteRepository::touch_instances_from_in_transaction(
            &mut tx,
            instance.base_recurring_event_id,
            instance.actual_start_time,
        )
        .await?;
    }

    SqliteRepository::update_event_fields_in_transaction(&mut tx, &updated).await?;
    tx.commit().await?;

    let refreshed_instance = repo
        .find_instance_by_id(instance.id)
        .await?
        .ok_or_else(|| {
            CoreError::Unexpected(format!("Instance {} vanished during update", instance.id))
        })?;
    let refreshed_template = repo
        .find_event_by_id(template.id)
        .await?
        .ok_or_else(|| {
            CoreError::Unexpected(format!("Template {} vanished during update", template.id))
        })?;

    info!(
        base_recurring_event_id = %refreshed_template.id,
        "updated base template and future instances"
    );

    Ok(EventView::from_instance_and_template(
        &refreshed_instance,
        &refreshed_template,
    ))
}

/// The split proper. The old series ends one millisecond before the split
/// instant; the new series starts at the (possibly shifted) edit point and
/// is materialized immediately so the edit is visible without waiting for
/// the next batch run.
async fn split_series(
    input: UpdateThisAndFollowingEventsInput,
    instance: RecurringEventInstance,
    template: Event,
    rule: RecurrenceRule,
    actor_id: Uuid,
    repo: &SqliteRepository,
) -> Result<EventView, CoreError> {
    let recurrence_input =
        apply_recurrence_overrides(input.start_at, &rule, input.recurrence.as_ref());

    let original_duration = instance.actual_end_time - instance.actual_start_time;
    let new_start = input.start_at.unwrap_or(instance.actual_start_time);
    let new_end = input.end_at.unwrap_or(new_start + original_duration);

    let validation = validate_recurrence_input(&recurrence_input, new_start);
    if !validation.is_valid {
        return Err(CoreError::InvalidArguments(validation.errors));
    }

    let mut tx = repo.pool().begin().await?;

    let deleted = SqliteRepository::delete_instances_from_in_transaction(
        &mut tx,
        instance.base_recurring_event_id,
        instance.actual_start_time,
    )
    .await?;
    info!(
        base_recurring_event_id = %instance.base_recurring_event_id,
        deleted,
        from = %instance.actual_start_time,
        "deleted old instances for split"
    );

    // The old rule may end before its own start after this; that is fine,
    // it simply has no occurrences left
    let truncated_end = instance.actual_start_time - Duration::milliseconds(1);
    SqliteRepository::truncate_rule_end_in_transaction(&mut tx, rule.id, truncated_end).await?;

    let new_template = SqliteRepository::create_event_in_transaction(
        &mut tx,
        NewEventData {
            organization_id: template.organization_id,
            creator_id: actor_id,
            name: input.name.unwrap_or_else(|| template.name.clone()),
            description: input.description.or_else(|| template.description.clone()),
            start_at: new_start,
            end_at: new_end,
            all_day: input.all_day.unwrap_or(template.all_day),
            is_public: input.is_public.unwrap_or(template.is_public),
            is_registerable: input.is_registerable.unwrap_or(template.is_registerable),
            is_invite_only: input.is_invite_only.unwrap_or(template.is_invite_only),
            location: input.location.or_else(|| template.location.clone()),
            is_recurring_template: true,
        },
    )
    .await?;

    // The new rule roots a new split chain: its original_series_id is its
    // own id
    let record = NewRuleRecord::from_input(
        &recurrence_input,
        new_start,
        new_template.id,
        None,
        template.organization_id,
        actor_id,
    );
    let new_rule = SqliteRepository::insert_rule_in_transaction(&mut tx, record).await?;

    let window = match SqliteRepository::find_window_by_organization_in_transaction(
        &mut tx,
        template.organization_id,
    )
    .await?
    {
        Some(window) => window,
        None => {
            SqliteRepository::initialize_generation_window_in_transaction(
                &mut tx,
                template.organization_id,
                Some(actor_id),
            )
            .await?
        }
    };

    // Generate the new series across a sub-window right away
    let now = Utc::now();
    let window_start = new_start.min(now);
    let window_end = window_start + Months::new(window.hot_window_months_ahead.max(1) as u32);
    let generated = SqliteRepository::materialize_event_window_in_transaction(
        &mut tx,
        &MaterializationJob {
            organization_id: template.organization_id,
            base_recurring_event_id: new_template.id,
            window_start_date: window_start,
            window_end_date: window_end,
        },
        window.max_instances_per_run.max(1) as usize,
    )
    .await?;

    let first_instance =
        SqliteRepository::find_first_instance_in_transaction(&mut tx, new_template.id)
            .await?
            .ok_or_else(|| {
                error!(
                    new_base_recurring_event_id = %new_template.id,
                    new_rule_id = %new_rule.id,
                    "split generated no instances for the new series"
                );
                CoreError::Unexpected(format!(
                    "Split of series {} produced no instances for new series {}",
                    instance.base_recurring_event_id, new_template.id
                ))
            })?;

    tx.commit().await?;

    info!(
        old_base_recurring_event_id = %instance.base_recurring_event_id,
        new_base_recurring_event_id = %new_template.id,
        new_rule_id = %new_rule.id,
        generated,
        window_start = %window_start,
        window_end = %window_end,
        "split series and generated new instances"
    );

    Ok(EventView::from_instance_and_template(
        &first_instance,
        &new_template,
    ))
}
