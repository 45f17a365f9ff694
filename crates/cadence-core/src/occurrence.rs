//! Deterministic occurrence expansion for materialization.
//!
//! Expansion always starts from the series anchor so `sequence_number` is a
//! lifetime index and a rule with `COUNT=N` can never yield more than `N`
//! occurrences no matter which window is being filled. The structured
//! `recurrence_end_date` clamps the serialized rule's own bounds because a
//! split truncates only the structured field.

use chrono::{DateTime, Utc};
use rrule::RRuleSet;

use crate::error::CoreError;
use crate::models::{Event, RecurrenceRule};

/// Hard cap on occurrences expanded for a single rule in one pass.
pub const MAX_EXPANSION_PER_RULE: u16 = 10_000;

/// One occurrence produced by expansion, ready to become an instance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOccurrence {
    /// The time predicted by the rule; dedup key member
    pub original_start_time: DateTime<Utc>,
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    /// 1-based lifetime index within the series
    pub sequence_number: i32,
    /// Null for never-ending series
    pub total_count: Option<i32>,
}

/// Builds the parseable rule document: the stored canonical string prefixed
/// with a DTSTART line derived from the rule's anchor.
fn rrule_document(rule: &RecurrenceRule) -> String {
    if rule.recurrence_rule_string.contains("DTSTART") {
        return rule.recurrence_rule_string.clone();
    }
    let rrule_line = if rule.recurrence_rule_string.starts_with("RRULE:") {
        rule.recurrence_rule_string.clone()
    } else {
        format!("RRULE:{}", rule.recurrence_rule_string)
    };
    format!(
        "DTSTART:{}\n{}",
        rule.recurrence_start_date.format("%Y%m%dT%H%M%SZ"),
        rrule_line
    )
}

fn parse_rule_set(rule: &RecurrenceRule) -> Result<RRuleSet, CoreError> {
    let document = rrule_document(rule);
    document.parse::<RRuleSet>().map_err(|e| {
        CoreError::Unexpected(format!(
            "Stored recurrence rule {} failed to parse ('{}'): {e}",
            rule.id, document
        ))
    })
}

/// Total number of occurrences the whole series will produce, or `None` for
/// a never-ending series.
fn series_total_count(
    rule: &RecurrenceRule,
    expanded: &[DateTime<rrule::Tz>],
) -> Option<i32> {
    if let Some(count) = rule.count {
        if count > 0 {
            return Some(count);
        }
    }
    if let Some(end_date) = rule.recurrence_end_date {
        let total = expanded
            .iter()
            .take_while(|dt| dt.with_timezone(&Utc) <= end_date)
            .count();
        return Some(total as i32);
    }
    None
}

/// Expands a rule into concrete occurrences within `[window_start,
/// window_end]`.
///
/// Occurrences inherit the template's duration; `actual_*` times start out
/// equal to the predicted time and only diverge through later per-instance
/// edits. `max_occurrences` caps how many occurrences this call may return;
/// expansion stops early once the cap is reached.
pub fn expand_occurrences(
    rule: &RecurrenceRule,
    template: &Event,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    max_occurrences: usize,
) -> Result<Vec<GeneratedOccurrence>, CoreError> {
    let duration = template.end_at - template.start_at;
    let rule_set = parse_rule_set(rule)?;

    let (dates, _) = rule_set.all(MAX_EXPANSION_PER_RULE);
    let total_count = series_total_count(rule, &dates);

    let mut occurrences = Vec::new();
    for (index, dt) in dates.iter().enumerate() {
        let start = dt.with_timezone(&Utc);

        // A split may have truncated the structured end date below the
        // serialized rule's own COUNT/UNTIL bounds.
        if let Some(end_date) = rule.recurrence_end_date {
            if start > end_date {
                break;
            }
        }
        if start > window_end {
            break;
        }
        if start < window_start {
            continue;
        }

        occurrences.push(GeneratedOccurrence {
            original_start_time: start,
            actual_start_time: start,
            actual_end_time: start + duration,
            sequence_number: (index + 1) as i32,
            total_count,
        });

        if occurrences.len() >= max_occurrences {
            break;
        }
    }

    Ok(occurrences)
}
