//! Recurrence codec: validation, canonical serialization, and the pure
//! helpers used by discovery and the series splitter.
//!
//! Everything in this module is side-effect free. Validation returns a
//! result value listing every violated rule instead of failing on the
//! first; serialization is deterministic so equal inputs always produce
//! byte-identical rule strings, which the idempotence checks depend on.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use tracing::warn;

use crate::error::CoreError;
use crate::models::{Frequency, RecurrenceInput, RecurrenceRule, RecurrenceValidation};

const DAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// Two-letter day code for a UTC timestamp.
fn weekday_code(date: DateTime<Utc>) -> &'static str {
    DAY_CODES[date.weekday().num_days_from_sunday() as usize]
}

fn is_valid_day_code(code: &str) -> bool {
    if !code.is_ascii() || code.len() < 2 {
        return false;
    }
    let (ordinal, day) = code.split_at(code.len() - 2);
    if !DAY_CODES.contains(&day) {
        return false;
    }
    if ordinal.is_empty() {
        return true;
    }
    // Ordinal prefixes like 1MO or -1SU select the nth weekday of the month
    matches!(ordinal.parse::<i32>(), Ok(n) if n != 0 && n.abs() <= 5)
}

/// Validates a structured recurrence description against an anchor start.
///
/// Collects every violated rule; never fails as an error. Callers decide
/// what to do with a non-empty error list.
pub fn validate_recurrence_input(
    input: &RecurrenceInput,
    anchor_start: DateTime<Utc>,
) -> RecurrenceValidation {
    let mut errors = Vec::new();

    if let Some(interval) = input.interval {
        if interval < 1 {
            errors.push("Recurrence interval must be at least 1".to_string());
        }
    }

    if let Some(count) = input.count {
        if count < 1 {
            errors.push("Recurrence count must be at least 1".to_string());
        }
    }

    if let Some(end_date) = input.end_date {
        if end_date <= anchor_start {
            errors.push("Recurrence end date must be after event start date".to_string());
        }
    }

    if input.count.is_some() && input.end_date.is_some() {
        errors.push("Recurrence cannot specify both a count and an end date".to_string());
    }

    if let Some(by_day) = &input.by_day {
        for code in by_day {
            if !is_valid_day_code(code) {
                errors.push(format!("Invalid day code: {code}"));
            }
        }
    }

    if let Some(by_month) = &input.by_month {
        for month in by_month {
            if !(1..=12).contains(month) {
                errors.push(format!("Invalid month: {month}"));
            }
        }
    }

    if let Some(by_month_day) = &input.by_month_day {
        for day in by_month_day {
            if !(1..=31).contains(day) {
                errors.push(format!("Invalid month day: {day}"));
            }
        }
    }

    if input.frequency == Frequency::Yearly && input.count.is_none() && input.end_date.is_none() {
        errors.push(
            "Yearly events cannot be never-ending. Please specify an end date or count."
                .to_string(),
        );
    }

    RecurrenceValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Serializes a recurrence description to its canonical rule string.
///
/// Field order is fixed (FREQ, INTERVAL, COUNT, UNTIL, BYDAY, BYMONTH,
/// BYMONTHDAY) so equal inputs always serialize identically.
pub fn build_rrule_string(input: &RecurrenceInput, _anchor_start: DateTime<Utc>) -> String {
    let mut parts = vec![format!("FREQ={}", input.frequency)];

    if let Some(interval) = input.interval {
        parts.push(format!("INTERVAL={interval}"));
    }
    if let Some(count) = input.count {
        parts.push(format!("COUNT={count}"));
    }
    if let Some(end_date) = input.end_date {
        parts.push(format!("UNTIL={}", end_date.format("%Y%m%dT%H%M%SZ")));
    }
    if let Some(by_day) = &input.by_day {
        if !by_day.is_empty() {
            parts.push(format!("BYDAY={}", by_day.join(",")));
        }
    }
    if let Some(by_month) = &input.by_month {
        if !by_month.is_empty() {
            let joined: Vec<String> = by_month.iter().map(|m| m.to_string()).collect();
            parts.push(format!("BYMONTH={}", joined.join(",")));
        }
    }
    if let Some(by_month_day) = &input.by_month_day {
        if !by_month_day.is_empty() {
            let joined: Vec<String> = by_month_day.iter().map(|d| d.to_string()).collect();
            parts.push(format!("BYMONTHDAY={}", joined.join(",")));
        }
    }

    format!("RRULE:{}", parts.join(";"))
}

/// Merges an edit's recurrence input over the original rule, calendar
/// style: when the series start moves, the day constraints follow it.
///
/// Constraint derivation consults the ORIGINAL rule's fields, so an input
/// that explicitly sets a constraint the original never had is left alone.
pub fn apply_recurrence_overrides(
    new_start_at: Option<DateTime<Utc>>,
    original: &RecurrenceRule,
    input: Option<&RecurrenceInput>,
) -> RecurrenceInput {
    let mut merged = match input {
        Some(input) => input.clone(),
        None => RecurrenceInput {
            frequency: original.frequency,
            interval: Some(original.interval),
            end_date: original.recurrence_end_date,
            count: original.count,
            never: original.count.is_none() && original.recurrence_end_date.is_none(),
            by_day: original.by_day.as_ref().map(|j| j.0.clone()),
            by_month: original.by_month.as_ref().map(|j| j.0.clone()),
            by_month_day: original.by_month_day.as_ref().map(|j| j.0.clone()),
        },
    };

    let Some(start) = new_start_at else {
        return merged;
    };

    let original_by_day_nonempty = original
        .by_day
        .as_ref()
        .map_or(false, |j| !j.0.is_empty());
    let original_by_month_day_present = original.by_month_day.is_some();
    let original_by_month_day_nonempty = original
        .by_month_day
        .as_ref()
        .map_or(false, |j| !j.0.is_empty());
    let original_by_month_nonempty = original
        .by_month
        .as_ref()
        .map_or(false, |j| !j.0.is_empty());

    match merged.frequency {
        Frequency::Weekly => {
            merged.by_day = Some(vec![weekday_code(start).to_string()]);
        }
        Frequency::Monthly => {
            if original_by_day_nonempty || !original_by_month_day_present {
                merged.by_day = Some(vec![weekday_code(start).to_string()]);
            }
            if original_by_month_day_nonempty {
                merged.by_month_day = Some(vec![start.day() as i32]);
            }
        }
        Frequency::Yearly => {
            if original_by_month_nonempty {
                merged.by_month = Some(vec![start.month() as i32]);
            }
        }
        Frequency::Daily => {}
    }

    merged
}

/// Completion date of a count-limited series: the start of its final
/// occurrence, assuming the frequency's nominal step.
pub fn calculate_completion_date_from_count(
    start: DateTime<Utc>,
    count: i32,
    frequency: Frequency,
    interval: i32,
) -> DateTime<Utc> {
    let steps = (count.max(1) - 1) as i64 * interval.max(1) as i64;
    match frequency {
        Frequency::Daily => start + Duration::days(steps),
        Frequency::Weekly => start + Duration::weeks(steps),
        Frequency::Monthly => start + Months::new(steps as u32),
        Frequency::Yearly => start + Months::new(steps as u32 * 12),
    }
}

/// Converts a count-limited rule into an equivalent end-dated one so window
/// calculations can treat every finite series uniformly. Rules that already
/// carry an end date, and never-ending rules, pass through unchanged.
pub fn normalize_recurrence_rule(rule: &RecurrenceRule) -> Result<RecurrenceRule, CoreError> {
    if let Some(count) = rule.count {
        if count < 0 {
            return Err(CoreError::Unexpected(format!(
                "Invalid recurrence count {count} on rule {}",
                rule.id
            )));
        }
    }
    if rule.interval < 1 {
        return Err(CoreError::Unexpected(format!(
            "Invalid recurrence interval {} on rule {}",
            rule.interval, rule.id
        )));
    }

    let mut normalized = rule.clone();
    if let (Some(count), None) = (rule.count, rule.recurrence_end_date) {
        if count > 0 {
            normalized.recurrence_end_date = Some(calculate_completion_date_from_count(
                rule.recurrence_start_date,
                count,
                rule.frequency,
                rule.interval,
            ));
        }
    }
    Ok(normalized)
}

/// Nominal occurrences per month for a frequency and interval.
pub fn calculate_instances_per_month(
    frequency: Frequency,
    interval: i32,
) -> Result<f64, CoreError> {
    if interval < 1 {
        return Err(CoreError::invalid_arguments(
            "interval must be a positive number",
        ));
    }
    let per_month = match frequency {
        Frequency::Daily => 30.0,
        Frequency::Weekly => 4.33,
        Frequency::Monthly => 1.0,
        Frequency::Yearly => 1.0 / 12.0,
    };
    Ok(per_month / interval as f64)
}

/// Rough instance count for workload sizing. Count-limited rules report
/// their count; end-dated rules derive from the covered span; never-ending
/// rules assume the estimation window (12 months unless given).
pub fn estimate_instance_count(rule: &RecurrenceRule, estimation_window_months: Option<u32>) -> i64 {
    if let Some(count) = rule.count {
        if count > 0 {
            return count as i64;
        }
    }

    let interval = rule.interval.max(1) as i64;

    if let Some(end_date) = rule.recurrence_end_date {
        let days = (end_date - rule.recurrence_start_date).num_days().max(0);
        return match rule.frequency {
            Frequency::Daily => days / interval + 1,
            Frequency::Weekly => days / (7 * interval) + 1,
            Frequency::Monthly => days / (30 * interval) + 1,
            Frequency::Yearly => (days as f64 / (365.25 * interval as f64)).floor() as i64 + 1,
        };
    }

    let months = estimation_window_months.unwrap_or(12) as f64;
    match calculate_instances_per_month(rule.frequency, rule.interval.max(1)) {
        Ok(per_month) => (per_month * months).round().max(1.0) as i64,
        Err(_) => {
            warn!(rule_id = %rule.id, "falling back to daily estimate for invalid interval");
            (30.0 * months).round() as i64
        }
    }
}

/// Structural checks for a stored rule; used to surface corrupt rows before
/// they reach generation.
pub fn validate_recurrence_rule(rule: &RecurrenceRule) -> RecurrenceValidation {
    let mut errors = Vec::new();

    if rule.interval < 1 {
        errors.push("Interval must be at least 1".to_string());
    }
    if let Some(count) = rule.count {
        if count < 1 {
            errors.push("Count must be at least 1".to_string());
        }
    }
    if let Some(end_date) = rule.recurrence_end_date {
        if end_date <= rule.recurrence_start_date {
            errors.push("End date must be after start date".to_string());
        }
    }

    RecurrenceValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid RFC 3339 timestamp")
    }

    mod build_rrule_string_tests {
        use super::*;

        #[test]
        fn test_builds_canonical_strings() {
            let start = utc("2025-01-01T00:00:00Z");
            let cases = [
                (
                    RecurrenceInput {
                        frequency: Frequency::Daily,
                        ..Default::default()
                    },
                    "RRULE:FREQ=DAILY",
                ),
                (
                    RecurrenceInput {
                        frequency: Frequency::Weekly,
                        interval: Some(2),
                        by_day: Some(vec!["MO".into(), "WE".into(), "FR".into()]),
                        ..Default::default()
                    },
                    "RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE,FR",
                ),
                (
                    RecurrenceInput {
                        frequency: Frequency::Monthly,
                        end_date: Some(utc("2025-06-01T00:00:00Z")),
                        ..Default::default()
                    },
                    "RRULE:FREQ=MONTHLY;UNTIL=20250601T000000Z",
                ),
                (
                    RecurrenceInput {
                        frequency: Frequency::Yearly,
                        count: Some(5),
                        ..Default::default()
                    },
                    "RRULE:FREQ=YEARLY;COUNT=5",
                ),
                (
                    RecurrenceInput {
                        frequency: Frequency::Monthly,
                        interval: Some(3),
                        count: Some(10),
                        by_month: Some(vec![1, 2, 3]),
                        by_month_day: Some(vec![1, 15]),
                        ..Default::default()
                    },
                    "RRULE:FREQ=MONTHLY;INTERVAL=3;COUNT=10;BYMONTH=1,2,3;BYMONTHDAY=1,15",
                ),
            ];

            for (input, expected) in cases {
                assert_eq!(build_rrule_string(&input, start), expected);
            }
        }

        #[test]
        fn test_serialization_is_deterministic() {
            let start = utc("2025-01-01T00:00:00Z");
            let input = RecurrenceInput {
                frequency: Frequency::Weekly,
                interval: Some(1),
                by_day: Some(vec!["TU".into(), "TH".into()]),
                ..Default::default()
            };
            assert_eq!(
                build_rrule_string(&input, start),
                build_rrule_string(&input.clone(), start)
            );
        }
    }

    mod validate_recurrence_input_tests {
        use super::*;

        fn anchor() -> DateTime<Utc> {
            utc("2025-01-01T00:00:00Z")
        }

        #[test]
        fn test_accepts_weekly_with_end_date() {
            let input = RecurrenceInput {
                frequency: Frequency::Weekly,
                end_date: Some(utc("2025-02-01T00:00:00Z")),
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert!(result.is_valid);
            assert!(result.errors.is_empty());
        }

        #[test]
        fn test_rejects_end_date_before_start() {
            let input = RecurrenceInput {
                frequency: Frequency::Daily,
                end_date: Some(utc("2024-12-31T00:00:00Z")),
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert!(!result.is_valid);
            assert_eq!(
                result.errors,
                vec!["Recurrence end date must be after event start date".to_string()]
            );
        }

        #[test]
        fn test_rejects_end_date_equal_to_start() {
            let input = RecurrenceInput {
                frequency: Frequency::Daily,
                end_date: Some(anchor()),
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert!(!result.is_valid);
        }

        #[test]
        fn test_rejects_zero_count() {
            let input = RecurrenceInput {
                frequency: Frequency::Daily,
                count: Some(0),
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert_eq!(
                result.errors,
                vec!["Recurrence count must be at least 1".to_string()]
            );
        }

        #[test]
        fn test_rejects_zero_interval() {
            let input = RecurrenceInput {
                frequency: Frequency::Daily,
                interval: Some(0),
                never: true,
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert_eq!(
                result.errors,
                vec!["Recurrence interval must be at least 1".to_string()]
            );
        }

        #[test]
        fn test_rejects_invalid_day_code() {
            let input = RecurrenceInput {
                frequency: Frequency::Weekly,
                by_day: Some(vec!["MO".into(), "INVALID".into()]),
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert_eq!(result.errors, vec!["Invalid day code: INVALID".to_string()]);
        }

        #[test]
        fn test_accepts_ordinal_day_codes() {
            let input = RecurrenceInput {
                frequency: Frequency::Monthly,
                by_day: Some(vec!["1MO".into(), "-1SU".into(), "2WE".into()]),
                never: true,
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert!(result.is_valid);
        }

        #[test]
        fn test_rejects_ordinal_with_bad_day_code() {
            let input = RecurrenceInput {
                frequency: Frequency::Monthly,
                by_day: Some(vec!["1XX".into()]),
                never: true,
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert_eq!(result.errors, vec!["Invalid day code: 1XX".to_string()]);
        }

        #[test]
        fn test_rejects_out_of_range_month_and_month_day() {
            let month_input = RecurrenceInput {
                frequency: Frequency::Monthly,
                by_month: Some(vec![1, 13]),
                never: true,
                ..Default::default()
            };
            assert_eq!(
                validate_recurrence_input(&month_input, anchor()).errors,
                vec!["Invalid month: 13".to_string()]
            );

            let day_input = RecurrenceInput {
                frequency: Frequency::Monthly,
                by_month_day: Some(vec![1, 32]),
                never: true,
                ..Default::default()
            };
            assert_eq!(
                validate_recurrence_input(&day_input, anchor()).errors,
                vec!["Invalid month day: 32".to_string()]
            );
        }

        #[test]
        fn test_rejects_never_ending_yearly() {
            let input = RecurrenceInput {
                frequency: Frequency::Yearly,
                never: true,
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert_eq!(
                result.errors,
                vec![
                    "Yearly events cannot be never-ending. Please specify an end date or count."
                        .to_string()
                ]
            );
        }

        #[test]
        fn test_rejects_count_and_end_date_together() {
            let input = RecurrenceInput {
                frequency: Frequency::Daily,
                count: Some(10),
                end_date: Some(utc("2025-06-01T00:00:00Z")),
                ..Default::default()
            };
            let result = validate_recurrence_input(&input, anchor());
            assert!(!result.is_valid);
            assert!(result
                .errors
                .contains(&"Recurrence cannot specify both a count and an end date".to_string()));
        }
    }

    mod apply_recurrence_overrides_tests {
        use super::*;

        fn weekly_rule() -> RecurrenceRule {
            RecurrenceRule {
                frequency: Frequency::Weekly,
                interval: 1,
                recurrence_end_date: Some(utc("2025-06-01T00:00:00Z")),
                by_day: Some(Json(vec!["MO".to_string()])),
                ..RecurrenceRule::default()
            }
        }

        #[test]
        fn test_derives_by_day_from_new_start_for_weekly() {
            // 2025-01-07 is a Tuesday
            let result = apply_recurrence_overrides(
                Some(utc("2025-01-07T10:00:00Z")),
                &weekly_rule(),
                None,
            );
            assert_eq!(result.by_day, Some(vec!["TU".to_string()]));
            assert_eq!(result.frequency, Frequency::Weekly);
        }

        #[test]
        fn test_weekly_derivation_handles_week_boundaries() {
            let sunday = apply_recurrence_overrides(
                Some(utc("2025-01-05T10:00:00Z")),
                &weekly_rule(),
                None,
            );
            assert_eq!(sunday.by_day, Some(vec!["SU".to_string()]));

            let saturday = apply_recurrence_overrides(
                Some(utc("2025-01-04T10:00:00Z")),
                &weekly_rule(),
                None,
            );
            assert_eq!(saturday.by_day, Some(vec!["SA".to_string()]));
        }

        #[test]
        fn test_monthly_derives_by_day_when_original_had_by_day() {
            let rule = RecurrenceRule {
                frequency: Frequency::Monthly,
                by_day: Some(Json(vec!["MO".to_string()])),
                ..weekly_rule()
            };
            // 2025-01-08 is a Wednesday
            let result =
                apply_recurrence_overrides(Some(utc("2025-01-08T10:00:00Z")), &rule, None);
            assert_eq!(result.by_day, Some(vec!["WE".to_string()]));
        }

        #[test]
        fn test_monthly_keeps_by_day_untouched_when_original_had_by_month_day() {
            let rule = RecurrenceRule {
                frequency: Frequency::Monthly,
                by_day: None,
                by_month_day: Some(Json(vec![15])),
                ..weekly_rule()
            };
            let result =
                apply_recurrence_overrides(Some(utc("2025-01-10T10:00:00Z")), &rule, None);
            assert_eq!(result.by_day, None);
            assert_eq!(result.by_month_day, Some(vec![10]));
        }

        #[test]
        fn test_monthly_updates_both_constraints_when_both_present() {
            let rule = RecurrenceRule {
                frequency: Frequency::Monthly,
                by_day: Some(Json(vec!["WE".to_string()])),
                by_month_day: Some(Json(vec![15])),
                ..weekly_rule()
            };
            // 2025-01-20 is a Monday, the 20th
            let result =
                apply_recurrence_overrides(Some(utc("2025-01-20T10:00:00Z")), &rule, None);
            assert_eq!(result.by_day, Some(vec!["MO".to_string()]));
            assert_eq!(result.by_month_day, Some(vec![20]));
        }

        #[test]
        fn test_yearly_updates_by_month_only_when_original_had_one() {
            let with_month = RecurrenceRule {
                frequency: Frequency::Yearly,
                by_day: None,
                by_month: Some(Json(vec![6])),
                ..weekly_rule()
            };
            let result = apply_recurrence_overrides(
                Some(utc("2025-03-15T10:00:00Z")),
                &with_month,
                None,
            );
            assert_eq!(result.by_month, Some(vec![3]));

            let without_month = RecurrenceRule {
                frequency: Frequency::Yearly,
                by_day: None,
                by_month: None,
                ..weekly_rule()
            };
            let result = apply_recurrence_overrides(
                Some(utc("2025-05-15T10:00:00Z")),
                &without_month,
                None,
            );
            assert_eq!(result.by_month, None);
        }

        #[test]
        fn test_daily_is_untouched_by_new_start() {
            let rule = RecurrenceRule {
                frequency: Frequency::Daily,
                by_day: Some(Json(vec!["MO".to_string()])),
                ..weekly_rule()
            };
            let result =
                apply_recurrence_overrides(Some(utc("2025-01-15T10:00:00Z")), &rule, None);
            assert_eq!(result.by_day, Some(vec!["MO".to_string()]));
        }

        #[test]
        fn test_derives_input_from_original_rule_when_no_input_given() {
            let rule = RecurrenceRule {
                frequency: Frequency::Daily,
                interval: 2,
                recurrence_end_date: Some(utc("2025-12-31T00:00:00Z")),
                count: Some(50),
                by_day: Some(Json(vec!["MO".to_string(), "WE".to_string()])),
                by_month: Some(Json(vec![1, 6, 12])),
                by_month_day: Some(Json(vec![1, 15])),
                ..RecurrenceRule::default()
            };
            let result = apply_recurrence_overrides(None, &rule, None);
            assert_eq!(result.frequency, Frequency::Daily);
            assert_eq!(result.interval, Some(2));
            assert_eq!(result.end_date, Some(utc("2025-12-31T00:00:00Z")));
            assert_eq!(result.count, Some(50));
            assert!(!result.never);
            assert_eq!(
                result.by_day,
                Some(vec!["MO".to_string(), "WE".to_string()])
            );
            assert_eq!(result.by_month, Some(vec![1, 6, 12]));
            assert_eq!(result.by_month_day, Some(vec![1, 15]));
        }

        #[test]
        fn test_never_flag_set_when_original_has_no_end() {
            let rule = RecurrenceRule {
                frequency: Frequency::Weekly,
                count: None,
                recurrence_end_date: None,
                by_day: None,
                ..RecurrenceRule::default()
            };
            let result = apply_recurrence_overrides(None, &rule, None);
            assert!(result.never);
            assert_eq!(result.end_date, None);
            assert_eq!(result.count, None);
        }

        #[test]
        fn test_explicit_input_passes_through() {
            let input = RecurrenceInput {
                frequency: Frequency::Daily,
                interval: Some(3),
                end_date: Some(utc("2025-12-25T00:00:00Z")),
                count: Some(25),
                never: false,
                by_day: Some(vec!["TU".into(), "TH".into()]),
                by_month: Some(vec![3, 9]),
                by_month_day: Some(vec![5, 20]),
            };
            let result = apply_recurrence_overrides(None, &weekly_rule(), Some(&input));
            assert_eq!(result, input);
        }

        #[test]
        fn test_new_start_overrides_by_day_even_with_explicit_input() {
            let input = RecurrenceInput {
                frequency: Frequency::Weekly,
                interval: Some(2),
                count: Some(10),
                ..Default::default()
            };
            // 2025-01-08 is a Wednesday
            let result = apply_recurrence_overrides(
                Some(utc("2025-01-08T10:00:00Z")),
                &weekly_rule(),
                Some(&input),
            );
            assert_eq!(result.by_day, Some(vec!["WE".to_string()]));
            assert_eq!(result.interval, Some(2));
            assert_eq!(result.count, Some(10));
        }

        #[test]
        fn test_empty_original_arrays_block_derivation() {
            let rule = RecurrenceRule {
                frequency: Frequency::Monthly,
                by_day: Some(Json(vec![])),
                by_month: Some(Json(vec![])),
                by_month_day: Some(Json(vec![])),
                ..weekly_rule()
            };
            let result =
                apply_recurrence_overrides(Some(utc("2025-01-15T10:00:00Z")), &rule, None);
            assert_eq!(result.by_day, Some(vec![]));
            assert_eq!(result.by_month, Some(vec![]));
            assert_eq!(result.by_month_day, Some(vec![]));
        }
    }

    mod normalization_tests {
        use super::*;

        #[test]
        fn test_completion_date_from_count() {
            let start = utc("2025-01-01T00:00:00Z");
            let cases = [
                (10, Frequency::Daily, 1, utc("2025-01-10T00:00:00Z")),
                (5, Frequency::Weekly, 2, utc("2025-02-26T00:00:00Z")),
                (6, Frequency::Monthly, 1, utc("2025-06-01T00:00:00Z")),
                (3, Frequency::Yearly, 1, utc("2027-01-01T00:00:00Z")),
            ];
            for (count, frequency, interval, expected) in cases {
                assert_eq!(
                    calculate_completion_date_from_count(start, count, frequency, interval),
                    expected
                );
            }
        }

        #[test]
        fn test_normalize_converts_count_to_end_date() {
            let rule = RecurrenceRule {
                count: Some(5),
                recurrence_start_date: utc("2025-01-01T00:00:00Z"),
                recurrence_rule_string: "RRULE:FREQ=DAILY;COUNT=5".to_string(),
                ..RecurrenceRule::default()
            };
            let normalized = normalize_recurrence_rule(&rule).unwrap();
            assert_eq!(
                normalized.recurrence_end_date,
                Some(utc("2025-01-05T00:00:00Z"))
            );
        }

        #[test]
        fn test_normalize_keeps_existing_end_date() {
            let rule = RecurrenceRule {
                count: Some(5),
                recurrence_start_date: utc("2025-01-01T00:00:00Z"),
                recurrence_end_date: Some(utc("2025-01-05T00:00:00Z")),
                ..RecurrenceRule::default()
            };
            let normalized = normalize_recurrence_rule(&rule).unwrap();
            assert_eq!(
                normalized.recurrence_end_date,
                Some(utc("2025-01-05T00:00:00Z"))
            );
        }

        #[test]
        fn test_normalize_passes_never_ending_through() {
            let rule = RecurrenceRule {
                recurrence_start_date: utc("2025-01-01T00:00:00Z"),
                ..RecurrenceRule::default()
            };
            let normalized = normalize_recurrence_rule(&rule).unwrap();
            assert_eq!(normalized.recurrence_end_date, None);
        }

        #[test]
        fn test_normalize_rejects_negative_count() {
            let rule = RecurrenceRule {
                count: Some(-5),
                ..RecurrenceRule::default()
            };
            let result = normalize_recurrence_rule(&rule);
            assert!(matches!(result, Err(CoreError::Unexpected(_))));
        }

        #[test]
        fn test_normalize_rejects_zero_interval() {
            let rule = RecurrenceRule {
                count: Some(5),
                interval: 0,
                ..RecurrenceRule::default()
            };
            let result = normalize_recurrence_rule(&rule);
            assert!(matches!(result, Err(CoreError::Unexpected(_))));
        }
    }

    mod estimation_tests {
        use super::*;

        fn daily_rule() -> RecurrenceRule {
            RecurrenceRule {
                frequency: Frequency::Daily,
                interval: 1,
                recurrence_start_date: utc("2025-01-01T00:00:00Z"),
                ..RecurrenceRule::default()
            }
        }

        #[test]
        fn test_count_based_estimate() {
            let rule = RecurrenceRule {
                count: Some(10),
                ..daily_rule()
            };
            assert_eq!(estimate_instance_count(&rule, None), 10);
        }

        #[test]
        fn test_end_date_based_estimates() {
            let cases = [
                (Frequency::Daily, "2025-01-10T00:00:00Z", 10),
                (Frequency::Weekly, "2025-03-01T00:00:00Z", 9),
                (Frequency::Monthly, "2026-01-01T00:00:00Z", 13),
                (Frequency::Yearly, "2027-01-01T00:00:00Z", 2),
            ];
            for (frequency, end, expected) in cases {
                let rule = RecurrenceRule {
                    frequency,
                    recurrence_end_date: Some(utc(end)),
                    ..daily_rule()
                };
                assert_eq!(estimate_instance_count(&rule, None), expected);
            }
        }

        #[test]
        fn test_never_ending_estimates_over_default_window() {
            let cases = [
                (Frequency::Daily, 360),
                (Frequency::Weekly, 52),
                (Frequency::Monthly, 12),
                (Frequency::Yearly, 1),
            ];
            for (frequency, expected) in cases {
                let rule = RecurrenceRule {
                    frequency,
                    ..daily_rule()
                };
                assert_eq!(estimate_instance_count(&rule, None), expected);
            }
        }

        #[test]
        fn test_instances_per_month() {
            assert!((calculate_instances_per_month(Frequency::Daily, 1).unwrap() - 30.0).abs() < 0.01);
            assert!((calculate_instances_per_month(Frequency::Daily, 2).unwrap() - 15.0).abs() < 0.01);
            assert!((calculate_instances_per_month(Frequency::Weekly, 1).unwrap() - 4.33).abs() < 0.01);
            assert!((calculate_instances_per_month(Frequency::Monthly, 3).unwrap() - 0.33).abs() < 0.01);
            assert!((calculate_instances_per_month(Frequency::Yearly, 1).unwrap() - 0.083).abs() < 0.01);
            assert!(calculate_instances_per_month(Frequency::Daily, 0).is_err());
        }
    }

    mod validate_recurrence_rule_tests {
        use super::*;

        fn base_rule() -> RecurrenceRule {
            RecurrenceRule {
                frequency: Frequency::Daily,
                interval: 1,
                recurrence_start_date: utc("2025-01-01T00:00:00Z"),
                recurrence_end_date: Some(utc("2025-01-10T00:00:00Z")),
                ..RecurrenceRule::default()
            }
        }

        #[test]
        fn test_valid_rule_passes() {
            let result = validate_recurrence_rule(&base_rule());
            assert!(result.is_valid);
            assert!(result.errors.is_empty());
        }

        #[test]
        fn test_collects_all_violations() {
            let rule = RecurrenceRule {
                interval: 0,
                count: Some(0),
                recurrence_end_date: Some(utc("2024-01-01T00:00:00Z")),
                ..base_rule()
            };
            let result = validate_recurrence_rule(&rule);
            assert_eq!(
                result.errors,
                vec![
                    "Interval must be at least 1".to_string(),
                    "Count must be at least 1".to_string(),
                    "End date must be after start date".to_string(),
                ]
            );
        }

        #[test]
        fn test_end_date_equal_to_start_is_rejected() {
            let rule = RecurrenceRule {
                recurrence_end_date: Some(utc("2025-01-01T00:00:00Z")),
                ..base_rule()
            };
            assert!(!validate_recurrence_rule(&rule).is_valid);
        }

        #[test]
        fn test_absent_optionals_pass() {
            let rule = RecurrenceRule {
                count: None,
                recurrence_end_date: None,
                ..base_rule()
            };
            assert!(validate_recurrence_rule(&rule).is_valid);
        }
    }
}
